//! Minimal mutation plans between the remote state and the expected one.
//!
//! Both engines are total: identical inputs give identical plans and
//! `diff(x, x)` never reports a difference.

use crate::centreon::{Macro, Service, ServiceGroup, MACRO_SOURCE_DIRECT};
use std::collections::{BTreeMap, BTreeSet};

/// Field names usable in a policy `excludeFields`
pub mod fields {
    pub const HOST: &str = "host";
    pub const NAME: &str = "name";
    pub const ACTIVATE: &str = "activate";
    pub const TEMPLATE: &str = "template";
    pub const CHECK_COMMAND: &str = "checkCommand";
    pub const NORMAL_CHECK_INTERVAL: &str = "normalCheckInterval";
    pub const RETRY_CHECK_INTERVAL: &str = "retryCheckInterval";
    pub const MAX_CHECK_ATTEMPTS: &str = "maxCheckAttempts";
    pub const ACTIVE_CHECKS_ENABLED: &str = "activeChecksEnabled";
    pub const PASSIVE_CHECKS_ENABLED: &str = "passiveChecksEnabled";
    pub const ARGUMENTS: &str = "arguments";
    pub const COMMENT: &str = "comment";
    pub const GROUPS: &str = "groups";
    pub const CATEGORIES: &str = "categories";
    pub const MACROS: &str = "macros";
    pub const DESCRIPTION: &str = "description";

    pub const SERVICE: [&str; 15] = [
        HOST,
        NAME,
        ACTIVATE,
        TEMPLATE,
        CHECK_COMMAND,
        NORMAL_CHECK_INTERVAL,
        RETRY_CHECK_INTERVAL,
        MAX_CHECK_ATTEMPTS,
        ACTIVE_CHECKS_ENABLED,
        PASSIVE_CHECKS_ENABLED,
        ARGUMENTS,
        COMMENT,
        GROUPS,
        CATEGORIES,
        MACROS,
    ];
    pub const SERVICE_GROUP: [&str; 4] = [NAME, ACTIVATE, DESCRIPTION, COMMENT];
}

/// Centreon parameter used to rename a service
pub static SERVICE_RENAME_PARAM: &str = "description";
/// Centreon parameter used to rename a service group
pub static GROUP_RENAME_PARAM: &str = "name";

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ServiceDiff {
    pub is_diff: bool,
    pub params_to_set: BTreeMap<String, String>,
    pub host_to_set: Option<String>,
    pub groups_to_set: Vec<String>,
    pub groups_to_delete: Vec<String>,
    pub categories_to_set: Vec<String>,
    pub categories_to_delete: Vec<String>,
    pub macros_to_set: Vec<Macro>,
    pub macros_to_delete: Vec<Macro>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ServiceGroupDiff {
    pub is_diff: bool,
    pub params_to_set: BTreeMap<String, String>,
}

fn is_ignored(ignored: &[String], field: &str) -> bool {
    ignored.iter().any(|f| f == field)
}

/// Elements of `left` missing from `right`, as a sorted set
fn minus(left: &[String], right: &[String]) -> Vec<String> {
    let right: BTreeSet<&String> = right.iter().collect();
    left.iter()
        .filter(|e| !right.contains(e))
        .cloned()
        .collect::<BTreeSet<String>>()
        .into_iter()
        .collect()
}

fn diff_macros(actual: &[Macro], expected: &[Macro]) -> (Vec<Macro>, Vec<Macro>) {
    let mut remaining: Vec<&Macro> = actual.iter().collect();
    let mut to_set = Vec::new();
    for wanted in expected {
        match remaining.iter().position(|m| m.name == wanted.name) {
            Some(pos) => {
                let current = remaining.remove(pos);
                if current.value != wanted.value || current.password_flag() != wanted.password_flag() {
                    to_set.push(wanted.clone());
                }
            }
            None => to_set.push(wanted.clone()),
        }
    }
    // Macros inherited from a template or a command are not ours to remove.
    // An empty direct macro is treated the same way.
    let to_delete = remaining
        .into_iter()
        .filter(|m| m.source == MACRO_SOURCE_DIRECT && !m.value.is_empty())
        .cloned()
        .collect();
    (to_set, to_delete)
}

pub fn diff_service(actual: &Service, expected: &Service, ignored: &[String]) -> ServiceDiff {
    let mut diff = ServiceDiff::default();

    if !is_ignored(ignored, fields::NAME) && actual.name != expected.name {
        diff.params_to_set
            .insert(SERVICE_RENAME_PARAM.to_string(), expected.name.clone());
    }
    if !is_ignored(ignored, fields::HOST) && actual.host != expected.host {
        diff.host_to_set = Some(expected.host.clone());
    }

    let scalars: [(&str, &str, &String, &String); 10] = [
        (fields::ACTIVATE, "activate", &actual.activated, &expected.activated),
        (
            fields::ACTIVE_CHECKS_ENABLED,
            "active_checks_enabled",
            &actual.active_check_enabled,
            &expected.active_check_enabled,
        ),
        (fields::CHECK_COMMAND, "check_command", &actual.check_command, &expected.check_command),
        (
            fields::ARGUMENTS,
            "check_command_arguments",
            &actual.check_command_args,
            &expected.check_command_args,
        ),
        (
            fields::MAX_CHECK_ATTEMPTS,
            "max_check_attempts",
            &actual.max_check_attempts,
            &expected.max_check_attempts,
        ),
        (
            fields::NORMAL_CHECK_INTERVAL,
            "normal_check_interval",
            &actual.normal_check_interval,
            &expected.normal_check_interval,
        ),
        (
            fields::PASSIVE_CHECKS_ENABLED,
            "passive_checks_enabled",
            &actual.passive_check_enabled,
            &expected.passive_check_enabled,
        ),
        (
            fields::RETRY_CHECK_INTERVAL,
            "retry_check_interval",
            &actual.retry_check_interval,
            &expected.retry_check_interval,
        ),
        (fields::TEMPLATE, "template", &actual.template, &expected.template),
        (fields::COMMENT, "comment", &actual.comment, &expected.comment),
    ];
    for (field, param, current, wanted) in scalars {
        if !is_ignored(ignored, field) && current != wanted {
            diff.params_to_set.insert(param.to_string(), wanted.clone());
        }
    }

    if !is_ignored(ignored, fields::GROUPS) {
        diff.groups_to_set = minus(&expected.groups, &actual.groups);
        diff.groups_to_delete = minus(&actual.groups, &expected.groups);
    }
    if !is_ignored(ignored, fields::CATEGORIES) {
        diff.categories_to_set = minus(&expected.categories, &actual.categories);
        diff.categories_to_delete = minus(&actual.categories, &expected.categories);
    }
    if !is_ignored(ignored, fields::MACROS) {
        (diff.macros_to_set, diff.macros_to_delete) = diff_macros(&actual.macros, &expected.macros);
    }

    diff.is_diff = !diff.params_to_set.is_empty()
        || diff.host_to_set.is_some()
        || !diff.groups_to_set.is_empty()
        || !diff.groups_to_delete.is_empty()
        || !diff.categories_to_set.is_empty()
        || !diff.categories_to_delete.is_empty()
        || !diff.macros_to_set.is_empty()
        || !diff.macros_to_delete.is_empty();
    diff
}

pub fn diff_service_group(actual: &ServiceGroup, expected: &ServiceGroup, ignored: &[String]) -> ServiceGroupDiff {
    let mut diff = ServiceGroupDiff::default();
    let scalars: [(&str, &str, &String, &String); 4] = [
        (fields::NAME, GROUP_RENAME_PARAM, &actual.name, &expected.name),
        (fields::ACTIVATE, "activate", &actual.activated, &expected.activated),
        (fields::DESCRIPTION, "alias", &actual.description, &expected.description),
        (fields::COMMENT, "comment", &actual.comment, &expected.comment),
    ];
    for (field, param, current, wanted) in scalars {
        if !is_ignored(ignored, field) && current != wanted {
            diff.params_to_set.insert(param.to_string(), wanted.clone());
        }
    }
    diff.is_diff = !diff.params_to_set.is_empty();
    diff
}

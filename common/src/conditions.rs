use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

#[derive(Serialize, Deserialize, Eq, PartialEq, Clone, Debug, JsonSchema, Default)]
pub enum ConditionsType {
    #[default]
    Ready,
    Synchronized,
    Error,
}

#[derive(Serialize, Deserialize, Eq, PartialEq, Clone, Debug, JsonSchema, Default)]
pub enum ConditionsStatus {
    #[default]
    True,
    False,
}

/// ApplicationCondition contains details about the synchronization state, which is usually an error or warning
#[derive(Serialize, Deserialize, Eq, PartialEq, Clone, Debug, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ApplicationCondition {
    /// LastTransitionTime is the time the condition was last observed
    pub last_transition_time: Option<DateTime<Utc>>,
    /// Message contains human-readable message indicating details about condition
    pub message: String,
    /// Type is an application condition type
    #[serde(rename = "type")]
    pub condition_type: ConditionsType,
    /// Status ("True" or "False") describe if the condition is enabled
    pub status: ConditionsStatus,
    /// Generation for that status
    pub generation: i64,
}

impl ApplicationCondition {
    #[must_use]
    pub fn new(
        message: &str,
        status: ConditionsStatus,
        condition_type: ConditionsType,
        generation: i64,
    ) -> ApplicationCondition {
        ApplicationCondition {
            last_transition_time: Some(Utc::now()),
            status,
            condition_type,
            message: message.to_string(),
            generation,
        }
    }

    /// Equal but for the transition time
    pub fn same_state(&self, other: &ApplicationCondition) -> bool {
        self.condition_type == other.condition_type
            && self.status == other.status
            && self.message == other.message
            && self.generation == other.generation
    }

    pub fn ready_ok(generation: i64) -> ApplicationCondition {
        ApplicationCondition::new(
            "Synchronized succesfully",
            ConditionsStatus::True,
            ConditionsType::Ready,
            generation,
        )
    }

    pub fn ready_ko(generation: i64) -> ApplicationCondition {
        ApplicationCondition::new(
            "No successful synchronization",
            ConditionsStatus::False,
            ConditionsType::Ready,
            generation,
        )
    }

    pub fn synchronized(message: &str, generation: i64) -> ApplicationCondition {
        ApplicationCondition::new(
            message,
            ConditionsStatus::True,
            ConditionsType::Synchronized,
            generation,
        )
    }

    pub fn failed(message: &str, generation: i64) -> ApplicationCondition {
        ApplicationCondition::new(message, ConditionsStatus::False, ConditionsType::Error, generation)
    }
}

/// Keep every condition but the given types
pub fn conditions_excluding(
    conditions: &[ApplicationCondition],
    exclude: &[ConditionsType],
) -> Vec<ApplicationCondition> {
    conditions
        .iter()
        .filter(|c| !exclude.contains(&c.condition_type))
        .cloned()
        .collect()
}

/// A condition observed again keeps the time it was first seen
fn keep_transition_times(
    previous: &[ApplicationCondition],
    conditions: Vec<ApplicationCondition>,
) -> Vec<ApplicationCondition> {
    conditions
        .into_iter()
        .map(|c| match previous.iter().find(|p| p.same_state(&c)) {
            Some(p) => p.clone(),
            None => c,
        })
        .collect()
}

/// Conditions after a successful pass: any previous error is dropped
pub fn conditions_on_success(
    previous: &[ApplicationCondition],
    generation: i64,
    message: &str,
) -> Vec<ApplicationCondition> {
    keep_transition_times(previous, vec![
        ApplicationCondition::synchronized(message, generation),
        ApplicationCondition::ready_ok(generation),
    ])
}

/// Conditions after a failed pass: keep a previous Ready condition if any
pub fn conditions_on_failure(
    previous: &[ApplicationCondition],
    generation: i64,
    reason: &str,
) -> Vec<ApplicationCondition> {
    let mut conditions = conditions_excluding(previous, &[ConditionsType::Error, ConditionsType::Synchronized]);
    conditions.push(ApplicationCondition::failed(reason, generation));
    if !conditions.iter().any(|c| c.condition_type == ConditionsType::Ready) {
        conditions.push(ApplicationCondition::ready_ko(generation));
    }
    keep_transition_times(previous, conditions)
}

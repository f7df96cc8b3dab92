use k8s_openapi::api::core::v1::ObjectReference;
use kube::runtime::events::{Event, EventType};

#[must_use]
pub fn from_create(src_type: &str, src_name: &str, child_type: &str, child_name: &str, child: Option<ObjectReference>) -> Event {
    Event {
        type_: EventType::Normal,
        reason: "Created".to_string(),
        note: Some(format!("Creating `{child_name}` {child_type} for `{src_name}` {src_type}")),
        action: format!("Creating {child_type}"),
        secondary: child,
    }
}

#[must_use]
pub fn from_update(src_type: &str, src_name: &str, child_type: &str, child_name: &str, child: Option<ObjectReference>) -> Event {
    Event {
        type_: EventType::Normal,
        reason: "Updated".to_string(),
        note: Some(format!("Updating `{child_name}` {child_type} for `{src_name}` {src_type}")),
        action: format!("Updating {child_type}"),
        secondary: child,
    }
}

#[must_use]
pub fn from_delete(src_type: &str, src_name: &str, child_type: &str, child_name: &str, child: Option<ObjectReference>) -> Event {
    Event {
        type_: EventType::Normal,
        reason: "Deleted".to_string(),
        note: Some(format!("Deleting `{child_name}` {child_type} for `{src_name}` {src_type}")),
        action: format!("Deleting {child_type}"),
        secondary: child,
    }
}

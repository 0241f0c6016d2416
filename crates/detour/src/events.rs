//! Change notifications from the rules source.

use crate::model::SiteId;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ChangeKind {
    Created,
    Modified,
    Deleted,
    /// Hard deletion; the event carries only the rule id.
    Destroyed,
}

impl ChangeKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChangeKind::Created => "created",
            ChangeKind::Modified => "modified",
            ChangeKind::Deleted => "deleted",
            ChangeKind::Destroyed => "destroyed",
        }
    }

    pub fn is_removal(&self) -> bool {
        matches!(self, ChangeKind::Deleted | ChangeKind::Destroyed)
    }
}

/// One rule changed in the source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangeEvent {
    pub rule_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub site_id: Option<SiteId>,
    pub kind: ChangeKind,
}

impl ChangeEvent {
    pub fn new(rule_id: impl Into<String>, site_id: Option<&str>, kind: ChangeKind) -> Self {
        Self {
            rule_id: rule_id.into(),
            site_id: site_id.map(str::to_string),
            kind,
        }
    }
}

/// Admin API bodies may hold a single event or a batch.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum EventBatch {
    One(ChangeEvent),
    Many(Vec<ChangeEvent>),
}

impl EventBatch {
    pub fn into_events(self) -> Vec<ChangeEvent> {
        match self {
            EventBatch::One(event) => vec![event],
            EventBatch::Many(events) => events,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_event() {
        let event: ChangeEvent =
            serde_json::from_str(r#"{"ruleId": "42", "siteId": "corporate", "kind": "modified"}"#)
                .unwrap();
        assert_eq!(event, ChangeEvent::new("42", Some("corporate"), ChangeKind::Modified));
    }

    #[test]
    fn test_destroyed_without_site() {
        let event: ChangeEvent =
            serde_json::from_str(r#"{"ruleId": "42", "kind": "destroyed"}"#).unwrap();
        assert!(event.site_id.is_none());
        assert!(event.kind.is_removal());
        assert!(!ChangeKind::Created.is_removal());
    }

    #[test]
    fn test_event_batch() {
        let one: EventBatch =
            serde_json::from_str(r#"{"ruleId": "1", "kind": "created"}"#).unwrap();
        assert_eq!(one.into_events().len(), 1);

        let many: EventBatch = serde_json::from_str(
            r#"[{"ruleId": "1", "kind": "created"}, {"ruleId": "2", "kind": "deleted"}]"#,
        )
        .unwrap();
        let events = many.into_events();
        assert_eq!(events.len(), 2);
        assert_eq!(events[1].kind, ChangeKind::Deleted);
    }
}

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Event id carried by the placeholder entry of an externalized session stub.
pub const SENTINEL_EVENT_ID: i64 = -1;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrchestrationStatus {
    Completed,
    Failed,
    Terminated,
    ContinuedAsNew,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum HistoryEvent {
    ExecutionStarted {
        event_id: i64,
        input: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        name: Option<String>,
        #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
        tags: BTreeMap<String, String>,
    },
    TaskScheduled {
        event_id: i64,
        name: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        input: Option<String>,
    },
    TaskCompleted {
        event_id: i64,
        task_scheduled_id: i64,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        result: Option<String>,
    },
    TaskFailed {
        event_id: i64,
        task_scheduled_id: i64,
        reason: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        details: Option<String>,
    },
    TimerCreated {
        event_id: i64,
        fire_at: DateTime<Utc>,
    },
    TimerFired {
        event_id: i64,
        timer_id: i64,
        fire_at: DateTime<Utc>,
    },
    EventRaised {
        event_id: i64,
        name: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        input: Option<String>,
    },
    ExecutionCompleted {
        event_id: i64,
        status: OrchestrationStatus,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        result: Option<String>,
    },
}

impl HistoryEvent {
    pub fn execution_started(event_id: i64, input: impl Into<String>) -> Self {
        HistoryEvent::ExecutionStarted {
            event_id,
            input: input.into(),
            name: None,
            tags: BTreeMap::new(),
        }
    }

    /// Placeholder that keeps a stub's event list non-empty.
    pub fn sentinel() -> Self {
        Self::execution_started(SENTINEL_EVENT_ID, "")
    }

    pub fn event_id(&self) -> i64 {
        match self {
            HistoryEvent::ExecutionStarted { event_id, .. }
            | HistoryEvent::TaskScheduled { event_id, .. }
            | HistoryEvent::TaskCompleted { event_id, .. }
            | HistoryEvent::TaskFailed { event_id, .. }
            | HistoryEvent::TimerCreated { event_id, .. }
            | HistoryEvent::TimerFired { event_id, .. }
            | HistoryEvent::EventRaised { event_id, .. }
            | HistoryEvent::ExecutionCompleted { event_id, .. } => *event_id,
        }
    }

    pub fn is_sentinel(&self) -> bool {
        matches!(
            self,
            HistoryEvent::ExecutionStarted { event_id, input, .. }
                if *event_id == SENTINEL_EVENT_ID && input.is_empty()
        )
    }
}

/// Ordered history of one orchestration session.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuntimeState {
    pub events: Vec<HistoryEvent>,
}

impl RuntimeState {
    pub fn new(events: Vec<HistoryEvent>) -> Self {
        Self { events }
    }

    pub fn push(&mut self, event: HistoryEvent) {
        self.events.push(event);
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn events_serialize_with_kind_tag() {
        let event = HistoryEvent::TaskScheduled {
            event_id: 3,
            name: "charge-card".to_string(),
            input: None,
        };
        let value = serde_json::to_value(&event).expect("event should serialize");
        assert_eq!(value["kind"], "task_scheduled");
        assert_eq!(value["event_id"], 3);
        assert!(value.get("input").is_none());
    }

    #[test]
    fn sentinel_is_recognized() {
        assert!(HistoryEvent::sentinel().is_sentinel());
        assert_eq!(HistoryEvent::sentinel().event_id(), SENTINEL_EVENT_ID);
        assert!(!HistoryEvent::execution_started(0, "").is_sentinel());
        assert!(!HistoryEvent::execution_started(SENTINEL_EVENT_ID, "x").is_sentinel());
    }

    #[test]
    fn timer_events_round_trip_timestamps() {
        let fire_at = Utc
            .with_ymd_and_hms(2015, 5, 17, 8, 0, 0)
            .single()
            .expect("valid timestamp");
        let event = HistoryEvent::TimerFired {
            event_id: 9,
            timer_id: 4,
            fire_at,
        };
        let encoded = serde_json::to_string(&event).expect("serialize");
        let decoded: HistoryEvent = serde_json::from_str(&encoded).expect("deserialize");
        assert_eq!(decoded, event);
        assert_eq!(decoded.event_id(), 9);
    }
}

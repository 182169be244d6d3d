//! Result event types and EventBus
//!
//! Every successful mutation in the result services is announced on the
//! EventBus. Publishing never blocks and never fails the mutation.

use crate::models::StatusCode;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

/// Result service events
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ResultEvent {
    /// New OPEN ResultSet
    ResultSetCreated {
        result_set_id: i64,
        protocol_id: i64,
        plate_id: i64,
        meas_id: i64,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// ResultSet transitioned OPEN -> COMPLETED
    ResultSetCompleted {
        result_set_id: i64,
        plate_id: i64,
        outcome: StatusCode,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// ResultSet and its children were removed
    ResultSetDeleted {
        result_set_id: i64,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    ResultDataCreated {
        result_set_id: i64,
        result_data_id: i64,
        feature_id: i64,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    ResultDataDeleted {
        result_set_id: i64,
        result_data_id: i64,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// One batch of feature stats committed
    FeatureStatsCreated {
        result_set_id: i64,
        feature_stat_ids: Vec<i64>,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    FeatureStatDeleted {
        result_set_id: i64,
        result_feature_stat_id: i64,
        timestamp: chrono::DateTime<chrono::Utc>,
    },
}

impl ResultEvent {
    /// Event type name, as serialized in the `type` tag
    pub fn event_type(&self) -> &'static str {
        match self {
            ResultEvent::ResultSetCreated { .. } => "ResultSetCreated",
            ResultEvent::ResultSetCompleted { .. } => "ResultSetCompleted",
            ResultEvent::ResultSetDeleted { .. } => "ResultSetDeleted",
            ResultEvent::ResultDataCreated { .. } => "ResultDataCreated",
            ResultEvent::ResultDataDeleted { .. } => "ResultDataDeleted",
            ResultEvent::FeatureStatsCreated { .. } => "FeatureStatsCreated",
            ResultEvent::FeatureStatDeleted { .. } => "FeatureStatDeleted",
        }
    }
}

/// Central event distribution bus
///
/// Uses tokio::broadcast internally:
/// - Non-blocking publish (slow subscribers don't block producers)
/// - Multiple concurrent subscribers
/// - Lagged message detection for slow subscribers
///
/// # Examples
///
/// ```
/// use phd_common::events::{EventBus, ResultEvent};
///
/// let event_bus = EventBus::new(100);
/// let mut rx = event_bus.subscribe();
///
/// event_bus.emit_lossy(ResultEvent::ResultSetDeleted {
///     result_set_id: 7,
///     timestamp: chrono::Utc::now(),
/// });
///
/// assert_eq!(rx.try_recv().unwrap().event_type(), "ResultSetDeleted");
/// ```
#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<ResultEvent>,
}

impl EventBus {
    /// Creates a new EventBus buffering `capacity` events per subscriber
    ///
    /// `capacity` must be at least 1.
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    /// Subscribe to all future events
    pub fn subscribe(&self) -> broadcast::Receiver<ResultEvent> {
        self.tx.subscribe()
    }

    /// Emit an event, ignoring if no subscribers are listening
    pub fn emit_lossy(&self, event: ResultEvent) {
        let _ = self.tx.send(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_emit_without_subscribers_is_dropped() {
        let bus = EventBus::new(10);
        bus.emit_lossy(ResultEvent::ResultSetDeleted {
            result_set_id: 1,
            timestamp: chrono::Utc::now(),
        });

        // Only events after subscribing are delivered
        let mut rx = bus.subscribe();
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_subscribers_receive_events_in_order() {
        let bus = EventBus::new(10);
        let mut rx = bus.subscribe();

        bus.emit_lossy(ResultEvent::ResultDataCreated {
            result_set_id: 1,
            result_data_id: 10,
            feature_id: 42,
            timestamp: chrono::Utc::now(),
        });
        bus.emit_lossy(ResultEvent::ResultSetCompleted {
            result_set_id: 1,
            plate_id: 2,
            outcome: StatusCode::Success,
            timestamp: chrono::Utc::now(),
        });

        assert_eq!(rx.recv().await.unwrap().event_type(), "ResultDataCreated");
        assert_eq!(rx.recv().await.unwrap().event_type(), "ResultSetCompleted");
    }

    #[test]
    fn test_serialized_type_tag() {
        let event = ResultEvent::FeatureStatsCreated {
            result_set_id: 4,
            feature_stat_ids: vec![1, 2],
            timestamp: chrono::Utc::now(),
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "FeatureStatsCreated");
        assert_eq!(json["feature_stat_ids"], serde_json::json!([1, 2]));
    }
}

//! Alert event types

use serde::{Deserialize, Serialize};

use crate::histogram::TargetId;

/// Alert lifecycle status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum EventStatus {
    Abnormal,
    Recovered,
    Closed,
}

impl EventStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventStatus::Abnormal => "ABNORMAL",
            EventStatus::Recovered => "RECOVERED",
            EventStatus::Closed => "CLOSED",
        }
    }

    /// Recovered and closed alerts count as closing events
    pub fn is_closed(&self) -> bool {
        matches!(self, EventStatus::Recovered | EventStatus::Closed)
    }

    pub fn closed_statuses() -> [EventStatus; 2] {
        [EventStatus::Recovered, EventStatus::Closed]
    }
}

impl std::fmt::Display for EventStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An alert as stored in the event store
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AlertEvent {
    pub id: String,
    pub bk_biz_id: i64,
    pub strategy_id: i64,
    /// Host or entity the alert is attached to
    pub target_key: TargetId,
    /// Open time (epoch seconds)
    pub begin_time: i64,
    /// Close time (epoch seconds), absent while open
    #[serde(default)]
    pub end_time: Option<i64>,
    pub status: EventStatus,
}

impl AlertEvent {
    /// Create an open alert
    pub fn new(
        id: impl Into<String>,
        bk_biz_id: i64,
        strategy_id: i64,
        target_key: impl Into<TargetId>,
        begin_time: i64,
    ) -> Self {
        Self {
            id: id.into(),
            bk_biz_id,
            strategy_id,
            target_key: target_key.into(),
            begin_time,
            end_time: None,
            status: EventStatus::Abnormal,
        }
    }

    /// Close the alert at `end_time` with a closing status
    pub fn closed_at(mut self, end_time: i64, status: EventStatus) -> Self {
        self.end_time = Some(end_time);
        self.status = status;
        self
    }

    /// Whether the alert was open at some point in `[start_time, end_time]`
    pub fn overlaps(&self, start_time: i64, end_time: i64) -> bool {
        self.begin_time <= end_time && self.end_time.map_or(true, |closed| closed >= start_time)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_serde() {
        let json = serde_json::to_string(&EventStatus::Recovered).unwrap();
        assert_eq!(json, "\"RECOVERED\"");
        let status: EventStatus = serde_json::from_str("\"ABNORMAL\"").unwrap();
        assert_eq!(status, EventStatus::Abnormal);
        assert!(!status.is_closed());
        assert!(EventStatus::Closed.is_closed());
    }

    #[test]
    fn test_overlaps() {
        let open = AlertEvent::new("1", 2, 10, "host-1", 100);
        assert!(open.overlaps(0, 100));
        assert!(open.overlaps(500, 600));
        assert!(!open.overlaps(0, 99));

        let closed = open.closed_at(200, EventStatus::Recovered);
        assert!(closed.overlaps(200, 300));
        assert!(!closed.overlaps(201, 300));
    }
}

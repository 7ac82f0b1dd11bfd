//! Emits a heartbeat Health Record onto `health_feed_handler` every fixed
//! interval (§4.5). Counters are read straight off the handler's own
//! mutable state — no locking, since the publisher lives on the same
//! pipeline task.

use std::time::{Duration, Instant};

use crate::records::{ConnState, HealthRecord};

pub const HEALTH_INTERVAL: Duration = Duration::from_secs(5);

pub struct HealthReporter {
    handler_name: String,
    start_utc_ns: u64,
    start_instant: Instant,
    last_emit: Instant,
    symbol_count: i32,
}

impl HealthReporter {
    pub fn new(handler_name: impl Into<String>, start_utc_ns: u64, symbol_count: i32) -> Self {
        let now = Instant::now();
        Self {
            handler_name: handler_name.into(),
            start_utc_ns,
            start_instant: now,
            last_emit: now,
            symbol_count,
        }
    }

    pub fn is_due(&self, now: Instant) -> bool {
        now.duration_since(self.last_emit) >= HEALTH_INTERVAL
    }

    #[allow(clippy::too_many_arguments)]
    pub fn build(
        &mut self,
        now: Instant,
        now_utc_ns: u64,
        msgs_received: i64,
        msgs_published: i64,
        last_msg_utc_ns: u64,
        last_pub_utc_ns: u64,
        conn_state: ConnState,
    ) -> HealthRecord {
        let uptime_sec = now.duration_since(self.start_instant).as_secs() as i64;
        self.last_emit = now;
        HealthRecord {
            now_utc_ns,
            handler_name: self.handler_name.clone(),
            start_utc_ns: self.start_utc_ns,
            uptime_sec,
            msgs_received,
            msgs_published,
            last_msg_utc_ns,
            last_pub_utc_ns,
            conn_state,
            symbol_count: self.symbol_count,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn s6_due_after_five_seconds() {
        let mut reporter = HealthReporter::new("quote_feed_handler", 0, 2);
        let t0 = Instant::now();
        assert!(!reporter.is_due(t0 + Duration::from_millis(100)));
        let t1 = t0 + Duration::from_secs(5);
        assert!(reporter.is_due(t1));

        let record = reporter.build(t1, 0, 10, 10, 0, 0, ConnState::Connected);
        assert!(record.uptime_sec >= 5);
        assert_eq!(record.conn_state, ConnState::Connected);
        assert!(!reporter.is_due(t1 + Duration::from_millis(100)));
    }
}

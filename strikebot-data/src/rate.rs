use crate::store;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use smol_str::SmolStr;
use std::{collections::HashSet, path::PathBuf};
use tracing::{error, warn};

/// One rate-limit event, appended to the process-wide rate log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RateLimitEvent {
    pub timestamp: DateTime<Utc>,
    pub service: SmolStr,
    pub endpoint: String,
    pub status: u16,
}

/// Tracks sources that answered HTTP 429. A cooled source is skipped for the rest of the tick
/// and the event is appended to the rate log.
#[derive(Debug, Clone, Default)]
pub struct SourceCooldown {
    cooling: HashSet<SmolStr>,
    rate_log: Option<PathBuf>,
}

impl SourceCooldown {
    pub fn new(rate_log: Option<PathBuf>) -> Self {
        Self {
            cooling: HashSet::new(),
            rate_log,
        }
    }

    pub fn is_cooling(&self, service: &str) -> bool {
        self.cooling.contains(service)
    }

    /// Put `service` in cool-down and record the event.
    pub fn mark(&mut self, service: &str, endpoint: &str) {
        warn!(%service, %endpoint, "rate limited, cooling down source for the rest of the tick");
        self.cooling.insert(SmolStr::new(service));

        if let Some(path) = &self.rate_log {
            let event = RateLimitEvent {
                timestamp: Utc::now(),
                service: SmolStr::new(service),
                endpoint: endpoint.to_string(),
                status: 429,
            };
            if let Err(e) = store::append_jsonl(path, &event) {
                error!(?path, %e, "failed to append rate-limit event");
            }
        }
    }

    /// Start of a new tick: every source is eligible again.
    pub fn clear(&mut self) {
        self.cooling.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mark_logs_and_clear_resets() {
        let dir = tempfile::tempdir().unwrap();
        let log = dir.path().join("rate.jsonl");
        let mut cooldown = SourceCooldown::new(Some(log.clone()));

        cooldown.mark("binance", "/api/v3/ticker/price");
        assert!(cooldown.is_cooling("binance"));
        assert!(!cooldown.is_cooling("coinbase"));

        let events: Vec<RateLimitEvent> = store::read_jsonl(&log).unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].status, 429);

        cooldown.clear();
        assert!(!cooldown.is_cooling("binance"));
    }
}

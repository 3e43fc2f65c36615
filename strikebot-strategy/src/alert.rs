//! Alert marker files with per-tag cooldowns.
//!
//! An alert file represents a still-active condition: raising the same tag while its file
//! exists overwrites it in place, clearing removes it. A new file for a tag is only emitted
//! once the tag's cooldown has elapsed since the previous emission, unless the condition was
//! cleared in between.

use crate::{config::AlertConfig, error::AlertError};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use strikebot_data::{PathsConfig, store};
use tracing::{debug, info, warn};

/// Contents of `scripts/kalshi-{tag}.alert`.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct AlertFile {
    pub tag: String,
    /// When the condition was first raised.
    pub timestamp: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub message: String,
}

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum AlertOutcome {
    /// A new alert file was written.
    Emitted,
    /// The existing file for the tag was overwritten.
    Refreshed,
    /// Within the cooldown since the last emission; nothing written.
    Suppressed,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
struct LedgerEntry {
    last_emitted: DateTime<Utc>,
    cleared: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
struct AlertLedger {
    tags: BTreeMap<String, LedgerEntry>,
}

#[derive(Debug, Clone)]
pub struct AlertBook {
    paths: PathsConfig,
    config: AlertConfig,
}

impl AlertBook {
    pub fn new(paths: PathsConfig, config: AlertConfig) -> Self {
        Self { paths, config }
    }

    pub fn raise(
        &self,
        tag: &str,
        message: &str,
        now: DateTime<Utc>,
    ) -> Result<AlertOutcome, AlertError> {
        let path = self.paths.alert_file(tag);
        if let Some(existing) = store::read_json::<AlertFile>(&path)? {
            let refreshed = AlertFile {
                updated_at: now,
                message: message.to_string(),
                ..existing
            };
            store::write_json_atomic(&path, &refreshed)?;
            debug!(%tag, "alert refreshed");
            return Ok(AlertOutcome::Refreshed);
        }

        let mut ledger = self.ledger()?;
        let cooldown = self.config.cooldown_for(tag);
        let eligible = match ledger.tags.get(tag) {
            None => true,
            Some(entry) => entry.cleared || now - entry.last_emitted >= cooldown,
        };
        if !eligible {
            debug!(%tag, cooldown_minutes = cooldown.num_minutes(), "alert suppressed by cooldown");
            return Ok(AlertOutcome::Suppressed);
        }

        let file = AlertFile {
            tag: tag.to_string(),
            timestamp: now,
            updated_at: now,
            message: message.to_string(),
        };
        store::write_json_atomic(&path, &file)?;
        ledger.tags.insert(
            tag.to_string(),
            LedgerEntry {
                last_emitted: now,
                cleared: false,
            },
        );
        self.write_ledger(&ledger)?;
        warn!(%tag, %message, "alert emitted");
        Ok(AlertOutcome::Emitted)
    }

    /// The condition behind `tag` no longer holds. Returns true if a file was removed.
    pub fn clear(&self, tag: &str) -> Result<bool, AlertError> {
        let removed = self.remove_file(tag)?;
        let mut ledger = self.ledger()?;
        if let Some(entry) = ledger.tags.get_mut(tag) {
            if !entry.cleared {
                entry.cleared = true;
                self.write_ledger(&ledger)?;
            }
        }
        if removed {
            info!(%tag, "alert cleared");
        }
        Ok(removed)
    }

    /// Remove alert files not refreshed within their tag's cooldown.
    pub fn expire(&self, now: DateTime<Utc>) -> Result<Vec<String>, AlertError> {
        let mut expired = Vec::new();
        for alert in self.outstanding()? {
            if now - alert.updated_at >= self.config.cooldown_for(&alert.tag) {
                self.remove_file(&alert.tag)?;
                info!(tag = %alert.tag, "alert expired");
                expired.push(alert.tag);
            }
        }
        Ok(expired)
    }

    /// Alert files currently present, ordered by tag.
    pub fn outstanding(&self) -> Result<Vec<AlertFile>, AlertError> {
        let dir = &self.paths.alerts_dir;
        let entries = match std::fs::read_dir(dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => {
                return Err(AlertError::Io {
                    path: dir.display().to_string(),
                    message: e.to_string(),
                });
            }
        };

        let mut alerts = entries
            .filter_map(Result::ok)
            .map(|entry| entry.path())
            .filter(|path| path.extension().is_some_and(|ext| ext == "alert"))
            .filter_map(|path| match store::read_json::<AlertFile>(&path) {
                Ok(alert) => alert,
                Err(error) => {
                    warn!(?path, %error, "unreadable alert file");
                    None
                }
            })
            .collect::<Vec<_>>();
        alerts.sort_by(|a, b| a.tag.cmp(&b.tag));
        Ok(alerts)
    }

    pub fn is_active(&self, tag: &str) -> bool {
        self.paths.alert_file(tag).exists()
    }

    /// Consume the alert file for `tag` without marking the condition cleared, so the cooldown
    /// still applies to the next emission.
    pub fn acknowledge(&self, tag: &str) -> Result<Option<AlertFile>, AlertError> {
        let path = self.paths.alert_file(tag);
        let alert = store::read_json::<AlertFile>(&path)?;
        if alert.is_some() {
            self.remove_file(tag)?;
        }
        Ok(alert)
    }

    fn remove_file(&self, tag: &str) -> Result<bool, AlertError> {
        let path = self.paths.alert_file(tag);
        match std::fs::remove_file(&path) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(AlertError::Io {
                path: path.display().to_string(),
                message: e.to_string(),
            }),
        }
    }

    fn ledger(&self) -> Result<AlertLedger, AlertError> {
        Ok(store::read_json(self.paths.alert_ledger())?.unwrap_or_default())
    }

    fn write_ledger(&self, ledger: &AlertLedger) -> Result<(), AlertError> {
        Ok(store::write_json_atomic(self.paths.alert_ledger(), ledger)?)
    }
}

//! Volatility recalibration: propose, apply, revert.
//!
//! A batch job, never run inside a trading tick. A dry run only raises an alert naming the
//! exact command to apply the proposal.

use crate::{
    alert::AlertBook,
    config::VolatilityConfig,
    error::EngineError,
    volatility::{VolatilityModel, VolatilityStats},
};
use chrono::{DateTime, Utc};
use derive_more::Display;
use serde::{Deserialize, Serialize};
use strikebot_data::{PathsConfig, store};
use strikebot_instrument::Asset;
use tracing::info;

pub const RECALIBRATION_TAG: &str = "recalibration";
pub const APPLY_COMMAND: &str = "strikebot recalibrate --apply";

const LONG_WINDOW_DAYS: i64 = 30;
const SHORT_WINDOW_DAYS: i64 = 14;

/// Proposals closer than this to the current sigma are dropped, so a value already held at the
/// clamp is never re-applied.
const MIN_CHANGE: f64 = 1e-9;

/// Proposed replacement of one asset's assumed hourly sigma.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct Proposal {
    pub asset: Asset,
    pub current: f64,
    pub proposed: f64,
    pub realized_30d: f64,
    pub realized_14d: f64,
    pub deviation_30d: f64,
    pub deviation_14d: f64,
}

impl Proposal {
    pub fn rationale(&self) -> String {
        format!(
            "{}: realized sigma {:.5} (30d, {:+.0}%) / {:.5} (14d, {:+.0}%) vs assumed {:.5}, propose {:.5}",
            self.asset,
            self.realized_30d,
            self.deviation_30d * 100.0,
            self.realized_14d,
            self.deviation_14d * 100.0,
            self.current,
            self.proposed
        )
    }
}

/// Assets whose realized sigma deviates beyond the threshold, in the same direction, on both
/// the 30d and 14d windows. Deviations are measured against `model`, not the stats snapshot.
pub fn propose(stats: &VolatilityStats, model: &VolatilityModel, config: &VolatilityConfig) -> Vec<Proposal> {
    stats
        .assets
        .iter()
        .filter_map(|asset_stats| {
            let asset = asset_stats.asset;
            let current = model.assumed_hourly_vol(asset);
            if current <= 0.0 {
                return None;
            }
            let realized_30d = asset_stats.period(LONG_WINDOW_DAYS)?.realized_hourly?;
            let realized_14d = asset_stats.period(SHORT_WINDOW_DAYS)?.realized_hourly?;
            let deviation_30d = (realized_30d - current) / current;
            let deviation_14d = (realized_14d - current) / current;

            let threshold = config.recalibration_threshold;
            let consistent = deviation_30d.signum() == deviation_14d.signum();
            if deviation_30d.abs() <= threshold || deviation_14d.abs() <= threshold || !consistent {
                return None;
            }

            let proposed = (realized_30d * (1.0 + config.safety_buffer))
                .clamp(config.min_hourly, config.max_hourly);
            if (proposed - current).abs() < MIN_CHANGE {
                return None;
            }
            Some(Proposal {
                asset,
                current,
                proposed,
                realized_30d,
                realized_14d,
                deviation_30d,
                deviation_14d,
            })
        })
        .collect()
}

#[derive(Debug, Copy, Clone, Eq, PartialEq, Display, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum HistoryAction {
    #[display("applied")]
    Applied,
    #[display("reverted")]
    Reverted,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct SigmaChange {
    pub asset: Asset,
    pub from: f64,
    pub to: f64,
}

/// One line of `volatility-recalibration-history.jsonl`.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct HistoryEntry {
    pub timestamp: DateTime<Utc>,
    pub action: HistoryAction,
    pub changes: Vec<SigmaChange>,
    #[serde(default)]
    pub rationale: Vec<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum RecalibrationOutcome {
    NoChange,
    /// Dry run found changes; the alert names the apply command.
    Proposed(Vec<Proposal>),
    Applied(Vec<Proposal>),
}

impl RecalibrationOutcome {
    pub fn proposals(&self) -> &[Proposal] {
        match self {
            RecalibrationOutcome::NoChange => &[],
            RecalibrationOutcome::Proposed(proposals) | RecalibrationOutcome::Applied(proposals) => {
                proposals
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RecalibrationStatus {
    pub model: VolatilityModel,
    pub backup: Option<VolatilityModel>,
    pub last: Option<HistoryEntry>,
    pub history_len: usize,
}

#[derive(Debug, Clone)]
pub struct Recalibrator {
    paths: PathsConfig,
    config: VolatilityConfig,
    alerts: AlertBook,
}

impl Recalibrator {
    pub fn new(paths: PathsConfig, config: VolatilityConfig, alerts: AlertBook) -> Self {
        Self {
            paths,
            config,
            alerts,
        }
    }

    pub fn run(
        &self,
        stats: &VolatilityStats,
        apply: bool,
        now: DateTime<Utc>,
    ) -> Result<RecalibrationOutcome, EngineError> {
        let model = VolatilityModel::load(&self.paths, &self.config)?;
        let proposals = propose(stats, &model, &self.config);

        if proposals.is_empty() {
            self.alerts.clear(RECALIBRATION_TAG)?;
            info!("volatility model within tolerance, nothing to recalibrate");
            return Ok(RecalibrationOutcome::NoChange);
        }

        let rationale = proposals.iter().map(Proposal::rationale).collect::<Vec<_>>();
        if !apply {
            let message = format!("{}\nrun: {APPLY_COMMAND}", rationale.join("\n"));
            self.alerts.raise(RECALIBRATION_TAG, &message, now)?;
            info!(proposals = proposals.len(), "recalibration proposed");
            return Ok(RecalibrationOutcome::Proposed(proposals));
        }

        store::write_json_atomic(self.paths.volatility_model_backup(), &model)?;
        let mut updated = model.clone();
        for proposal in &proposals {
            updated.hourly.insert(proposal.asset, proposal.proposed);
        }
        updated.updated_at = Some(now);
        updated.save(&self.paths)?;

        let entry = HistoryEntry {
            timestamp: now,
            action: HistoryAction::Applied,
            changes: proposals
                .iter()
                .map(|proposal| SigmaChange {
                    asset: proposal.asset,
                    from: proposal.current,
                    to: proposal.proposed,
                })
                .collect(),
            rationale,
        };
        store::append_jsonl(self.paths.recalibration_history(), &entry)?;
        self.alerts.clear(RECALIBRATION_TAG)?;
        info!(changes = entry.changes.len(), "recalibration applied");
        Ok(RecalibrationOutcome::Applied(proposals))
    }

    /// Restore the model saved by the last apply. `None` when no backup exists.
    pub fn revert(&self, now: DateTime<Utc>) -> Result<Option<VolatilityModel>, EngineError> {
        let Some(backup) = store::read_json::<VolatilityModel>(self.paths.volatility_model_backup())? else {
            return Ok(None);
        };
        let current = VolatilityModel::load(&self.paths, &self.config)?;
        backup.save(&self.paths)?;

        let changes = backup
            .hourly
            .iter()
            .filter_map(|(asset, to)| {
                let from = current.assumed_hourly_vol(*asset);
                (from != *to).then_some(SigmaChange {
                    asset: *asset,
                    from,
                    to: *to,
                })
            })
            .collect();
        store::append_jsonl(
            self.paths.recalibration_history(),
            &HistoryEntry {
                timestamp: now,
                action: HistoryAction::Reverted,
                changes,
                rationale: Vec::new(),
            },
        )?;
        info!("volatility model reverted to backup");
        Ok(Some(backup))
    }

    pub fn status(&self) -> Result<RecalibrationStatus, EngineError> {
        let history = store::read_jsonl::<HistoryEntry>(self.paths.recalibration_history())?;
        Ok(RecalibrationStatus {
            model: VolatilityModel::load(&self.paths, &self.config)?,
            backup: store::read_json(self.paths.volatility_model_backup())?,
            history_len: history.len(),
            last: history.into_iter().last(),
        })
    }
}

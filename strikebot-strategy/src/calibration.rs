//! Probability calibration of settled trades: Brier score, expected calibration error,
//! calibration curve and per-regime / per-side win rates.

use crate::{
    config::CalibrationConfig,
    journal::{TradeRecord, settled_chronologically},
    regime::Regime,
};
use chrono::{DateTime, Utc};
use derive_more::Display;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use strikebot_data::{DataError, PathsConfig, store};
use strikebot_instrument::{Cents, Side};

/// Alert tag raised when the model is systematically over or under confident.
pub const CALIBRATION_TAG: &str = "calibration";

#[derive(Debug, Copy, Clone, Eq, PartialEq, Display, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ConfidenceAssessment {
    #[display("overconfident")]
    Overconfident,
    #[display("underconfident")]
    Underconfident,
    #[display("balanced")]
    Balanced,
}

/// One equal-width bucket of the calibration curve.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct CalibrationBucket {
    pub lower: f64,
    pub upper: f64,
    pub count: usize,
    pub mean_prob: Option<f64>,
    pub actual_rate: Option<f64>,
    /// `actual_rate - mean_prob`; negative when we were overconfident.
    pub gap: Option<f64>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct GroupStats {
    pub trades: usize,
    pub wins: usize,
    pub win_rate: Option<f64>,
    pub pnl_cents: Cents,
    pub brier_score: Option<f64>,
}

impl GroupStats {
    fn from_trades(trades: &[&TradeRecord]) -> Self {
        let pairs = prediction_pairs(trades.iter().copied());
        let wins = pairs.iter().filter(|(_, outcome)| *outcome == 1.0).count();
        Self {
            trades: pairs.len(),
            wins,
            win_rate: (!pairs.is_empty()).then(|| wins as f64 / pairs.len() as f64),
            pnl_cents: trades.iter().filter_map(|trade| trade.profit_cents).sum(),
            brier_score: brier_score(&pairs),
        }
    }
}

/// Contents of `calibration-analysis.json`.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct CalibrationReport {
    pub timestamp: DateTime<Utc>,
    pub settled: usize,
    pub brier_score: Option<f64>,
    pub ece: Option<f64>,
    pub assessment: ConfidenceAssessment,
    pub buckets: Vec<CalibrationBucket>,
    pub by_regime: BTreeMap<Regime, GroupStats>,
    pub by_side: BTreeMap<Side, GroupStats>,
}

impl CalibrationReport {
    pub fn write(&self, paths: &PathsConfig) -> Result<(), DataError> {
        store::write_json_atomic(paths.calibration_analysis(), self)
    }

    /// Alert body when the assessment is not balanced.
    pub fn alert_message(&self) -> Option<String> {
        (self.assessment != ConfidenceAssessment::Balanced).then(|| {
            format!(
                "model {} over {} settled trades: brier {:.4}, ece {:.4}",
                self.assessment,
                self.settled,
                self.brier_score.unwrap_or_default(),
                self.ece.unwrap_or_default()
            )
        })
    }
}

/// `(our_prob, outcome)` of every settled trade.
pub fn prediction_pairs<'a>(trades: impl IntoIterator<Item = &'a TradeRecord>) -> Vec<(f64, f64)> {
    trades
        .into_iter()
        .filter_map(|trade| trade.outcome().map(|outcome| (trade.our_prob, outcome)))
        .collect()
}

/// Mean of `(p - outcome)^2`.
pub fn brier_score(pairs: &[(f64, f64)]) -> Option<f64> {
    if pairs.is_empty() {
        return None;
    }
    let total = pairs
        .iter()
        .map(|(prob, outcome)| (prob - outcome).powi(2))
        .sum::<f64>();
    Some(total / pairs.len() as f64)
}

/// Bucket index of `prob` among `k` equal-width buckets over [0, 1].
pub fn bucket_index(prob: f64, k: usize) -> usize {
    let k = k.max(1);
    let scaled = (prob.clamp(0.0, 1.0) * k as f64).floor() as usize;
    scaled.min(k - 1)
}

pub fn calibration_buckets(pairs: &[(f64, f64)], k: usize) -> Vec<CalibrationBucket> {
    let k = k.max(1);
    let mut sums = vec![(0usize, 0.0_f64, 0.0_f64); k];
    for (prob, outcome) in pairs {
        let slot = &mut sums[bucket_index(*prob, k)];
        slot.0 += 1;
        slot.1 += prob;
        slot.2 += outcome;
    }

    sums.into_iter()
        .enumerate()
        .map(|(index, (count, prob_sum, outcome_sum))| {
            let mean_prob = (count > 0).then(|| prob_sum / count as f64);
            let actual_rate = (count > 0).then(|| outcome_sum / count as f64);
            CalibrationBucket {
                lower: index as f64 / k as f64,
                upper: (index + 1) as f64 / k as f64,
                count,
                mean_prob,
                actual_rate,
                gap: actual_rate.zip(mean_prob).map(|(actual, mean)| actual - mean),
            }
        })
        .collect()
}

/// Count-weighted mean of `|gap|` over the buckets.
pub fn expected_calibration_error(buckets: &[CalibrationBucket]) -> Option<f64> {
    let total = buckets.iter().map(|bucket| bucket.count).sum::<usize>();
    if total == 0 {
        return None;
    }
    let weighted = buckets
        .iter()
        .filter_map(|bucket| bucket.gap.map(|gap| gap.abs() * bucket.count as f64))
        .sum::<f64>();
    Some(weighted / total as f64)
}

/// Compare the trade weight of buckets where we predicted too high against those where we
/// predicted too low.
pub fn assess_confidence(buckets: &[CalibrationBucket], tolerance: f64) -> ConfidenceAssessment {
    let (over, under) = buckets.iter().fold((0, 0), |(over, under), bucket| match bucket.gap {
        Some(gap) if gap < -tolerance => (over + bucket.count, under),
        Some(gap) if gap > tolerance => (over, under + bucket.count),
        _ => (over, under),
    });
    match over.cmp(&under) {
        std::cmp::Ordering::Greater => ConfidenceAssessment::Overconfident,
        std::cmp::Ordering::Less => ConfidenceAssessment::Underconfident,
        std::cmp::Ordering::Equal => ConfidenceAssessment::Balanced,
    }
}

pub fn analyse(trades: &[TradeRecord], config: &CalibrationConfig, now: DateTime<Utc>) -> CalibrationReport {
    let settled = settled_chronologically(trades);
    let pairs = prediction_pairs(settled.iter().copied());
    let buckets = calibration_buckets(&pairs, config.buckets);

    let mut regimes = BTreeMap::<Regime, Vec<&TradeRecord>>::new();
    let mut sides = BTreeMap::<Side, Vec<&TradeRecord>>::new();
    for trade in settled.iter().copied() {
        regimes.entry(trade.regime).or_default().push(trade);
        sides.entry(trade.side).or_default().push(trade);
    }

    CalibrationReport {
        timestamp: now,
        settled: pairs.len(),
        brier_score: brier_score(&pairs),
        ece: expected_calibration_error(&buckets),
        assessment: assess_confidence(&buckets, config.gap_tolerance),
        by_regime: regimes
            .into_iter()
            .map(|(regime, trades)| (regime, GroupStats::from_trades(&trades)))
            .collect(),
        by_side: sides
            .into_iter()
            .map(|(side, trades)| (side, GroupStats::from_trades(&trades)))
            .collect(),
        buckets,
    }
}

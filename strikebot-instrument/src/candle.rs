use chrono::{DateTime, Duration, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Granularity of a candle series.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Deserialize, Serialize)]
pub enum CandleInterval {
    #[serde(rename = "1h")]
    Hour1,
    #[serde(rename = "4h")]
    Hour4,
}

impl CandleInterval {
    pub fn duration(&self) -> Duration {
        match self {
            CandleInterval::Hour1 => Duration::hours(1),
            CandleInterval::Hour4 => Duration::hours(4),
        }
    }

    pub fn hours(&self) -> i64 {
        self.duration().num_hours()
    }

    /// Number of candles covering `days` days.
    pub fn per_days(&self, days: i64) -> usize {
        (days * 24 / self.hours()).max(0) as usize
    }

    /// Start of the period containing `time`.
    pub fn period_start(&self, time: DateTime<Utc>) -> DateTime<Utc> {
        let step = self.duration().num_seconds();
        let secs = time.timestamp().div_euclid(step) * step;
        Utc.timestamp_opt(secs, 0).single().unwrap_or(time)
    }
}

/// OHLCV bar for one period of an asset series.
///
/// Serialised in the on-disk cache format: `{timestamp, datetime, open, high, low, close, volume}`
/// where `timestamp` is the period start in epoch milliseconds.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct Candle {
    #[serde(rename = "timestamp", with = "chrono::serde::ts_milliseconds")]
    pub period_start: DateTime<Utc>,
    #[serde(default)]
    pub datetime: String,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    #[serde(default)]
    pub volume: f64,
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum CandleError {
    #[error("candle at {0} contains a non-finite value")]
    NonFinite(DateTime<Utc>),

    #[error("candle at {0} contains a non-positive price")]
    NonPositive(DateTime<Utc>),

    #[error("candle at {0} violates low <= min(open, close) <= max(open, close) <= high")]
    Range(DateTime<Utc>),

    #[error("candle at {0} has negative volume")]
    Volume(DateTime<Utc>),

    #[error("candle at {actual} does not follow {previous} contiguously")]
    Gap {
        previous: DateTime<Utc>,
        actual: DateTime<Utc>,
    },
}

impl Candle {
    pub fn new(
        period_start: DateTime<Utc>,
        open: f64,
        high: f64,
        low: f64,
        close: f64,
        volume: f64,
    ) -> Self {
        Self {
            period_start,
            datetime: period_start.to_rfc3339(),
            open,
            high,
            low,
            close,
            volume,
        }
    }

    /// Check the OHLC ordering invariant and sign constraints.
    pub fn validate(&self) -> Result<(), CandleError> {
        let at = self.period_start;
        let values = [self.open, self.high, self.low, self.close, self.volume];
        if values.iter().any(|value| !value.is_finite()) {
            return Err(CandleError::NonFinite(at));
        }
        if self.low <= 0.0 {
            return Err(CandleError::NonPositive(at));
        }
        let body_high = self.open.max(self.close);
        let body_low = self.open.min(self.close);
        if !(self.low <= body_low && body_high <= self.high) {
            return Err(CandleError::Range(at));
        }
        if self.volume < 0.0 {
            return Err(CandleError::Volume(at));
        }
        Ok(())
    }

    /// Relative high-low range of the bar, `(high - low) / low`.
    pub fn range_pct(&self) -> f64 {
        (self.high - self.low) / self.low
    }
}

/// Validate every candle and the contiguity of the series (each period follows the previous by
/// exactly one interval).
pub fn validate_series(candles: &[Candle], interval: CandleInterval) -> Result<(), CandleError> {
    candles.iter().try_for_each(Candle::validate)?;
    candles.windows(2).try_for_each(|pair| {
        if pair[1].period_start - pair[0].period_start == interval.duration() {
            Ok(())
        } else {
            Err(CandleError::Gap {
                previous: pair[0].period_start,
                actual: pair[1].period_start,
            })
        }
    })
}

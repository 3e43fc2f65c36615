use statrs::distribution::{ContinuousCDF, Normal};
use tracing::warn;

pub const MIN_PROBABILITY: f64 = 0.01;
pub const MAX_PROBABILITY: f64 = 0.99;

/// Probability that spot `spot` finishes above `strike` after `hours`, given hourly sigma.
///
/// Lognormal with zero drift: `d = ln(S/K)/tau - tau/2`, `tau = sqrt(T) * sigma`. A degenerate
/// `tau` returns the indicator `S > K`. The result is clamped to `[0.01, 0.99]`.
pub fn probability_above_strike(spot: f64, strike: f64, hours: f64, hourly_sigma: f64) -> f64 {
    let tau = hours.max(0.0).sqrt() * hourly_sigma;
    if !tau.is_finite() || tau <= 0.0 || spot <= 0.0 || strike <= 0.0 {
        let indicator = if spot > strike { 1.0 } else { 0.0 };
        return clamp_probability(indicator);
    }

    let d = (spot / strike).ln() / tau - tau / 2.0;
    clamp_probability(standard_normal_cdf(d))
}

pub fn clamp_probability(probability: f64) -> f64 {
    if probability.is_nan() {
        return 0.5;
    }
    probability.clamp(MIN_PROBABILITY, MAX_PROBABILITY)
}

fn standard_normal_cdf(x: f64) -> f64 {
    match Normal::new(0.0, 1.0) {
        Ok(normal) => normal.cdf(x),
        Err(error) => {
            warn!(%error, "standard normal unavailable, using neutral probability");
            0.5
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scenario_probabilities() {
        // ln(100000/101000)/0.005 = -1.99; far below the 8c ask gate once clamped.
        let below = probability_above_strike(100_000.0, 101_000.0, 1.0, 0.005);
        assert!((below - 0.0233).abs() < 0.001, "{below}");

        let above = probability_above_strike(100_000.0, 99_000.0, 1.0, 0.005);
        assert!(above > 0.97, "{above}");
    }

    #[test]
    fn test_degenerate_tau_is_indicator() {
        assert_eq!(probability_above_strike(101.0, 100.0, 0.0, 0.005), MAX_PROBABILITY);
        assert_eq!(probability_above_strike(99.0, 100.0, 1.0, 0.0), MIN_PROBABILITY);
        assert_eq!(probability_above_strike(100.0, 100.0, -1.0, 0.005), MIN_PROBABILITY);
    }

    #[test]
    fn test_monotone_in_spot() {
        let mut previous = 0.0;
        for spot in [98_500.0, 99_000.0, 99_500.0, 100_000.0, 100_500.0, 101_000.0] {
            let p = probability_above_strike(spot, 100_000.0, 4.0, 0.005);
            assert!(p > previous, "{spot}: {p} <= {previous}");
            previous = p;
        }
    }

    #[test]
    fn test_time_symmetry() {
        let short_itm = probability_above_strike(100_500.0, 100_000.0, 1.0, 0.005);
        let long_itm = probability_above_strike(100_500.0, 100_000.0, 9.0, 0.005);
        assert!(long_itm < short_itm);

        let short_otm = probability_above_strike(99_500.0, 100_000.0, 1.0, 0.005);
        let long_otm = probability_above_strike(99_500.0, 100_000.0, 9.0, 0.005);
        assert!(long_otm > short_otm);
    }

    #[test]
    fn test_output_is_clamped() {
        for (spot, strike) in [(1.0, 1_000_000.0), (1_000_000.0, 1.0)] {
            let p = probability_above_strike(spot, strike, 24.0, 0.01);
            assert!((MIN_PROBABILITY..=MAX_PROBABILITY).contains(&p));
        }
    }
}

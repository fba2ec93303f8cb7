//! Poisson traffic generation.
//!
//! A traffic generator with rate λ emits on average λ requests per
//! simulated second. The time to the next request follows the exponential
//! distribution, whose cumulative probability is `x = 1 - e^(-λt)`.
//! Inverting it gives `t = -ln(1 - x) / λ`, and since `1 - x` is uniform on
//! `(0, 1)` whenever `x` is, [`ArrivalRate::sample`] uses `t = -ln(x) / λ`.
//!
//! The process is memoryless: the next delay never depends on the
//! previous ones.

use rand_core::Rng;
use std::{fmt, str::FromStr, time::Duration};

/// Rate parameter λ of a traffic generator, in requests per simulated second.
///
/// ```
/// use ibrsim_core::ArrivalRate;
///
/// let rate = ArrivalRate::new(2.0).unwrap();
/// assert_eq!(rate.mean_interval().as_millis(), 500);
///
/// let parsed: ArrivalRate = "2.0".parse().unwrap();
/// assert_eq!(parsed, rate);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd)]
pub struct ArrivalRate(f64);

/// Ratio of wall-clock time to simulated time.
///
/// `1.0` (the default) runs in real time; `0.5` runs twice as fast.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd)]
pub struct TimeScale(f64);

/// Error returned when constructing an [`ArrivalRate`] with a value that is
/// not a finite, strictly positive number.
#[derive(Debug, Clone, Copy, thiserror::Error)]
#[error("arrival rate must be a finite number > 0, got {0}")]
pub struct ArrivalRateError(f64);

/// Error returned when constructing a [`TimeScale`] with a value that is
/// not a finite, strictly positive number.
#[derive(Debug, Clone, Copy, thiserror::Error)]
#[error("time scale must be a finite number > 0, got {0}")]
pub struct TimeScaleError(f64);

#[derive(Debug, Clone, thiserror::Error)]
pub enum ParseRateError {
    #[error("invalid number `{0}'")]
    InvalidNumber(String),
    #[error("{0}")]
    OutOfRange(#[from] ArrivalRateError),
}

/// draw `x` uniformly from the open interval `(0, 1)`
///
/// The 53 high bits of a `u64` fill the mantissa; the half-step offset
/// keeps both `0.0` and `1.0` out of reach so `ln(x)` is always finite.
pub fn open_unit<R: Rng>(rng: &mut R) -> f64 {
    const SCALE: f64 = 1.0 / (1u64 << 53) as f64;
    let bits = rng.next_u64() >> 11;
    (bits as f64 + 0.5) * SCALE
}

fn duration_from_secs(seconds: f64) -> Duration {
    Duration::try_from_secs_f64(seconds).unwrap_or(Duration::MAX)
}

impl ArrivalRate {
    /// Create a new validated rate.
    ///
    /// # Errors
    ///
    /// Returns [`ArrivalRateError`] if `lambda` is NaN, infinite, zero
    /// or negative.
    pub fn new(lambda: f64) -> Result<Self, ArrivalRateError> {
        if !lambda.is_finite() || lambda <= 0.0 {
            return Err(ArrivalRateError(lambda));
        }
        Ok(Self(lambda))
    }

    /// Returns the inner `f64` value.
    pub fn value(self) -> f64 {
        self.0
    }

    /// The expected time between two requests, `1/λ`.
    pub fn mean_interval(self) -> Duration {
        duration_from_secs(1.0 / self.0)
    }

    /// Sample the simulated time until the next request, in seconds.
    ///
    /// The caller provides `rng` so that all simulation randomness is
    /// controlled from a single, seedable source in [`Network`].
    ///
    /// [`Network`]: crate::network::Network
    pub fn sample_secs<R: Rng>(self, rng: &mut R) -> f64 {
        -open_unit(rng).ln() / self.0
    }

    /// Same as [`ArrivalRate::sample_secs`] as a [`Duration`].
    pub fn sample<R: Rng>(self, rng: &mut R) -> Duration {
        duration_from_secs(self.sample_secs(rng))
    }
}

impl TimeScale {
    pub const REAL_TIME: Self = Self(1.0);

    pub fn new(ratio: f64) -> Result<Self, TimeScaleError> {
        if !ratio.is_finite() || ratio <= 0.0 {
            return Err(TimeScaleError(ratio));
        }
        Ok(Self(ratio))
    }

    pub fn value(self) -> f64 {
        self.0
    }

    /// convert a simulated duration into the wall-clock time to wait for
    pub fn to_wall_clock(self, simulated: Duration) -> Duration {
        if self == Self::REAL_TIME {
            return simulated;
        }
        duration_from_secs(simulated.as_secs_f64() * self.0)
    }

    /// convert a measured wall-clock duration into simulated time
    pub fn to_simulated(self, wall_clock: Duration) -> Duration {
        if self == Self::REAL_TIME {
            return wall_clock;
        }
        duration_from_secs(wall_clock.as_secs_f64() / self.0)
    }
}

impl Default for TimeScale {
    fn default() -> Self {
        Self::REAL_TIME
    }
}

impl fmt::Display for ArrivalRate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "λ={}", self.0)
    }
}

impl FromStr for ArrivalRate {
    type Err = ParseRateError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let lambda: f64 = s
            .parse()
            .map_err(|_| ParseRateError::InvalidNumber(s.to_owned()))?;
        Ok(Self::new(lambda)?)
    }
}

impl fmt::Display for TimeScale {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "x{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use rand_chacha::ChaChaRng;
    use rand_core::SeedableRng as _;

    use super::*;

    fn rng() -> ChaChaRng {
        ChaChaRng::seed_from_u64(42)
    }

    #[test]
    fn open_unit_stays_inside_the_interval() {
        let mut rng = rng();
        for _ in 0..100_000 {
            let x = open_unit(&mut rng);
            assert!(x > 0.0 && x < 1.0, "{x} is outside of (0, 1)");
        }
    }

    #[test]
    fn sample_mean_matches_rate() {
        let rate = ArrivalRate::new(2.0).unwrap();
        let mut rng = rng();

        const SAMPLES: usize = 100_000;
        let total: f64 = (0..SAMPLES).map(|_| rate.sample_secs(&mut rng)).sum();
        let mean = total / SAMPLES as f64;
        let expected = 1.0 / rate.value();

        assert!(
            (mean - expected).abs() < expected * 0.05,
            "mean {mean} is more than 5% away from {expected}"
        );
    }

    #[test]
    fn samples_are_never_negative() {
        let rate = ArrivalRate::new(5.0).unwrap();
        let mut rng = rng();
        for _ in 0..10_000 {
            assert!(rate.sample_secs(&mut rng) >= 0.0);
        }
    }

    #[test]
    fn reproducible_with_same_seed() {
        let rate = ArrivalRate::new(3.0).unwrap();
        let a: Vec<Duration> = {
            let mut rng = ChaChaRng::seed_from_u64(99);
            (0..100).map(|_| rate.sample(&mut rng)).collect()
        };
        let b: Vec<Duration> = {
            let mut rng = ChaChaRng::seed_from_u64(99);
            (0..100).map(|_| rate.sample(&mut rng)).collect()
        };
        assert_eq!(a, b);
    }

    #[test]
    fn tiny_rate_saturates() {
        let rate = ArrivalRate::new(f64::MIN_POSITIVE).unwrap();
        let mut rng = rng();

        assert_eq!(rate.sample(&mut rng), Duration::MAX);
    }

    #[test]
    fn rate_rejected() {
        assert!(ArrivalRate::new(0.0).is_err());
        assert!(ArrivalRate::new(-1.0).is_err());
        assert!(ArrivalRate::new(f64::NAN).is_err());
        assert!(ArrivalRate::new(f64::INFINITY).is_err());
    }

    #[test]
    fn error_display() {
        let err = ArrivalRate::new(-2.0).unwrap_err();
        assert_eq!(err.to_string(), "arrival rate must be a finite number > 0, got -2");
    }

    #[test]
    fn parse() {
        assert_eq!(
            " 5.0 ".parse::<ArrivalRate>().unwrap(),
            ArrivalRate::new(5.0).unwrap()
        );
        assert!("five".parse::<ArrivalRate>().is_err());
        assert!("0".parse::<ArrivalRate>().is_err());
    }

    #[test]
    fn time_scale_conversions() {
        let scale = TimeScale::new(0.5).unwrap();

        assert_eq!(
            scale.to_wall_clock(Duration::from_secs(2)),
            Duration::from_secs(1)
        );
        assert_eq!(
            scale.to_simulated(Duration::from_secs(1)),
            Duration::from_secs(2)
        );
        assert_eq!(
            TimeScale::default().to_wall_clock(Duration::from_millis(3)),
            Duration::from_millis(3)
        );
    }

    #[test]
    fn time_scale_rejected() {
        assert!(TimeScale::new(0.0).is_err());
        assert!(TimeScale::new(f64::NAN).is_err());
    }
}

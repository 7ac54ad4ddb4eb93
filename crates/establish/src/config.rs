//! Polling budget: attempt count, first interval, and growth factor.

use std::time::Duration;

use tracing::warn;

pub const ENV_MAX_ATTEMPTS: &str = "CRDREADY_MAX_ATTEMPTS";
pub const ENV_INTERVAL_MS: &str = "CRDREADY_INTERVAL_MS";
pub const ENV_BACKOFF_FACTOR: &str = "CRDREADY_BACKOFF_FACTOR";

#[derive(Debug, Clone, PartialEq)]
pub struct PollConfig {
    /// Total fetches before giving up (at least one is always made).
    pub max_attempts: u32,
    /// Sleep after the first unsuccessful attempt.
    pub initial_interval: Duration,
    /// Multiplier applied to the interval after every sleep; values below 1.0 act as 1.0.
    pub factor: f64,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self { max_attempts: 5, initial_interval: Duration::from_millis(100), factor: 2.0 }
    }
}

impl PollConfig {
    pub fn new(max_attempts: u32, initial_interval: Duration, factor: f64) -> Self {
        Self { max_attempts, initial_interval, factor }
    }

    /// Defaults overlaid with `CRDREADY_*` environment variables.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Like [`PollConfig::from_env`] with an explicit variable source.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut cfg = Self::default();
        if let Some(v) = parse_var::<u32>(&lookup, ENV_MAX_ATTEMPTS) {
            cfg.max_attempts = v;
        }
        if let Some(v) = parse_var::<u64>(&lookup, ENV_INTERVAL_MS) {
            cfg.initial_interval = Duration::from_millis(v);
        }
        if let Some(v) = parse_var::<f64>(&lookup, ENV_BACKOFF_FACTOR) {
            cfg.factor = v;
        }
        cfg
    }

    pub fn attempts(&self) -> u32 {
        self.max_attempts.max(1)
    }

    fn growth(&self) -> f64 {
        if self.factor.is_finite() && self.factor > 1.0 { self.factor } else { 1.0 }
    }

    /// Sleeps between consecutive attempts: `attempts() - 1` intervals, each
    /// `factor` times the previous one.
    pub fn backoff(&self) -> impl Iterator<Item = Duration> {
        let growth = self.growth();
        std::iter::successors(Some(self.initial_interval), move |d| {
            Some(Duration::try_from_secs_f64(d.as_secs_f64() * growth).unwrap_or(Duration::MAX))
        })
        .take(self.attempts() as usize - 1)
    }
}

fn parse_var<T: std::str::FromStr>(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Option<T> {
    let raw = lookup(key)?;
    match raw.trim().parse::<T>() {
        Ok(v) => Some(v),
        Err(_) => {
            warn!(var = key, value = %raw, "ignoring invalid value");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ms(v: u64) -> Duration { Duration::from_millis(v) }

    #[test]
    fn backoff_grows_geometrically() {
        let cfg = PollConfig::new(4, ms(100), 2.0);
        let sleeps: Vec<_> = cfg.backoff().collect();
        assert_eq!(sleeps, vec![ms(100), ms(200), ms(400)]);
    }

    #[test]
    fn single_attempt_never_sleeps() {
        assert_eq!(PollConfig::new(1, ms(100), 2.0).backoff().count(), 0);
        assert_eq!(PollConfig::new(0, ms(100), 2.0).attempts(), 1);
        assert_eq!(PollConfig::new(0, ms(100), 2.0).backoff().count(), 0);
    }

    #[test]
    fn shrinking_factor_is_clamped() {
        let sleeps: Vec<_> = PollConfig::new(3, ms(10), 0.5).backoff().collect();
        assert_eq!(sleeps, vec![ms(10), ms(10)]);
        let sleeps: Vec<_> = PollConfig::new(3, ms(10), f64::NAN).backoff().collect();
        assert_eq!(sleeps, vec![ms(10), ms(10)]);
    }

    #[test]
    fn env_overrides_and_ignores_garbage() {
        let cfg = PollConfig::from_lookup(|k| match k {
            ENV_MAX_ATTEMPTS => Some("1".into()),
            ENV_INTERVAL_MS => Some(" 1 ".into()),
            ENV_BACKOFF_FACTOR => Some("fast".into()),
            _ => None,
        });
        assert_eq!(cfg, PollConfig::new(1, ms(1), 2.0));
        assert_eq!(PollConfig::from_lookup(|_| None), PollConfig::default());
    }
}

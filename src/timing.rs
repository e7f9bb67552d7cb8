//! Lightweight per-pass timing, reported at `debug` level rather than
//! collected into anything the rest of the crate depends on.

use std::collections::BTreeMap;
use std::time::{Duration, Instant};

/// Accumulates wall-clock time spent in each named pass across one
/// compilation.
#[derive(Default)]
pub struct PassTimes {
    totals: BTreeMap<&'static str, Duration>,
}

impl PassTimes {
    pub fn new() -> Self {
        Self::default()
    }

    /// Time `f`, crediting its duration to `pass`.
    pub fn record<T>(&mut self, pass: &'static str, f: impl FnOnce() -> T) -> T {
        let start = Instant::now();
        let result = f();
        let elapsed = start.elapsed();
        *self.totals.entry(pass).or_insert(Duration::ZERO) += elapsed;
        log::debug!("{}: {:?}", pass, elapsed);
        result
    }

    pub fn total(&self, pass: &str) -> Duration {
        self.totals.get(pass).copied().unwrap_or(Duration::ZERO)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&'static str, Duration)> + '_ {
        self.totals.iter().map(|(&k, &v)| (k, v))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn records_time_under_the_given_pass_name() {
        let mut times = PassTimes::new();
        let value = times.record("cfg", || 1 + 1);
        assert_eq!(value, 2);
        assert!(times.total("cfg") >= Duration::ZERO);
        assert_eq!(times.total("unknown"), Duration::ZERO);
    }
}

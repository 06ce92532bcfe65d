// ABOUTME: Cumulative per-plugin timings across build passes
// ABOUTME: Reported through tracing after every pass

use std::time::Duration;
use tracing::info;

#[derive(Debug, Default, Clone)]
pub struct Performance {
    /// Plugin name and total time, in first-run order.
    timings: Vec<(String, Duration)>,
}

impl Performance {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, name: &str, elapsed: Duration) {
        match self.timings.iter_mut().find(|(n, _)| n == name) {
            Some((_, total)) => *total += elapsed,
            None => self.timings.push((name.to_string(), elapsed)),
        }
    }

    pub fn total(&self, name: &str) -> Option<Duration> {
        self.timings
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, total)| *total)
    }

    pub fn lines(&self) -> Vec<String> {
        self.timings
            .iter()
            .map(|(name, total)| format!("{:<20}{:>6} ms", name, total.as_millis()))
            .collect()
    }

    pub fn report(&self, pass: Duration) {
        for line in self.lines() {
            info!("{}", line);
        }
        info!("Pass finished in {} ms", pass.as_millis());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timings_accumulate_per_name() {
        let mut perf = Performance::new();
        perf.record("combine-js", Duration::from_millis(5));
        perf.record("hash", Duration::from_millis(1));
        perf.record("combine-js", Duration::from_millis(7));

        assert_eq!(perf.total("combine-js"), Some(Duration::from_millis(12)));
        assert_eq!(perf.total("missing"), None);
        assert_eq!(
            perf.lines(),
            vec![
                "combine-js              12 ms".to_string(),
                "hash                     1 ms".to_string(),
            ]
        );
    }
}

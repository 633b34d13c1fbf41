use std::time::{Duration, Instant};

/// Rate limiter for repeated diagnostics.
///
/// [ready](Throttle::ready) returns true at most once per interval.
#[derive(Debug, Clone)]
pub struct Throttle {
    interval: Duration,
    last: Option<Instant>,
}

impl Throttle {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            last: None,
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn ready(&mut self) -> bool {
        self.ready_at(Instant::now())
    }

    /// Same as [ready](Throttle::ready) with an explicit clock.
    pub fn ready_at(&mut self, now: Instant) -> bool {
        match self.last {
            Some(last) if now.saturating_duration_since(last) < self.interval => false,
            _ => {
                self.last = Some(now);
                true
            }
        }
    }

    /// Forget the last emission so the next call fires.
    pub fn reset(&mut self) {
        self.last = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fires_once_per_interval() {
        let mut throttle = Throttle::new(Duration::from_secs(30));
        let start = Instant::now();

        assert!(throttle.ready_at(start));
        assert!(!throttle.ready_at(start + Duration::from_secs(1)));
        assert!(!throttle.ready_at(start + Duration::from_secs(29)));
        assert!(throttle.ready_at(start + Duration::from_secs(30)));
        assert!(!throttle.ready_at(start + Duration::from_secs(31)));
    }

    #[test]
    fn test_reset() {
        let mut throttle = Throttle::new(Duration::from_secs(60));
        let start = Instant::now();

        assert!(throttle.ready_at(start));
        throttle.reset();
        assert!(throttle.ready_at(start));
    }
}

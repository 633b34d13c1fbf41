use std::time::{Duration, Instant};
use stereo_proc_core::Throttle;
use tracing::warn;

/// Warns, at most once per interval, about required inputs that no
/// publisher advertises.
#[derive(Debug, Clone)]
pub struct AdvertisementChecker {
    required: Vec<String>,
    throttle: Throttle,
}

impl AdvertisementChecker {
    pub fn new<I>(required: I, interval: Duration) -> Self
    where
        I: IntoIterator,
        I::Item: Into<String>,
    {
        Self {
            required: required.into_iter().map(Into::into).collect(),
            throttle: Throttle::new(interval),
        }
    }

    pub fn interval(&self) -> Duration {
        self.throttle.interval()
    }

    pub fn required(&self) -> &[String] {
        &self.required
    }

    /// Required topics absent from `advertised`.
    pub fn missing<'a>(&'a self, advertised: &[String]) -> Vec<&'a str> {
        self.required
            .iter()
            .filter(|&topic| !advertised.contains(topic))
            .map(String::as_str)
            .collect()
    }

    /// Returns the missing topics and logs them unless a warning went
    /// out less than one interval ago.
    pub fn check(&mut self, advertised: &[String]) -> Vec<String> {
        self.check_at(advertised, Instant::now())
    }

    pub fn check_at(&mut self, advertised: &[String], now: Instant) -> Vec<String> {
        let missing: Vec<String> = self
            .missing(advertised)
            .into_iter()
            .map(str::to_string)
            .collect();

        if !missing.is_empty() && self.throttle.ready_at(now) {
            warn!(
                missing = ?missing,
                "Required input topics are not advertised, check the topic namespaces"
            );
        }
        missing
    }

    /// Lets the next check warn immediately, e.g. after the inputs were
    /// subscribed again.
    pub fn reset(&mut self) {
        self.throttle.reset();
    }
}

use std::time::Duration;

/// Default wait between a fault and the next attempt.
pub const DEFAULT_RESTART_DELAY: Duration = Duration::from_secs(5);

/// Decides how long a session waits before recreating its pairing.
///
/// There is no give-up answer: a session keeps retrying until its connection
/// is destroyed.
pub trait RestartPolicy: Send + Sync {
    /// `attempt` is 1 for the first restart of a session and counts up from there.
    fn next_delay(&self, attempt: u32) -> Duration;
}

/// Same delay every time, without growth or cap.
#[derive(Debug, Clone, Copy)]
pub struct FixedDelay {
    delay: Duration,
}

impl FixedDelay {
    pub fn new(delay: Duration) -> Self {
        Self { delay }
    }
}

impl Default for FixedDelay {
    fn default() -> Self {
        Self::new(DEFAULT_RESTART_DELAY)
    }
}

impl RestartPolicy for FixedDelay {
    fn next_delay(&self, _attempt: u32) -> Duration {
        self.delay
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fixed_delay_never_grows() {
        let policy = FixedDelay::default();
        assert_eq!(policy.next_delay(1), Duration::from_secs(5));
        assert_eq!(policy.next_delay(1_000), Duration::from_secs(5));
    }
}

use std::time::Duration;

/// Which failure or signal caused a cooldown
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CooldownKind {
    /// A request timed out
    Timeout,
    /// The connection was refused, reset or aborted
    Connection,
    /// Latency jumped or the server answered with a throttling status
    Slowdown,
}

impl CooldownKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Timeout => "timeout",
            Self::Connection => "connection",
            Self::Slowdown => "slowdown",
        }
    }
}

/// Counts of cooldowns taken, by kind
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CooldownCounts {
    pub timeout: u64,
    pub connection: u64,
    pub slowdown: u64,
}

impl CooldownCounts {
    pub fn record(&mut self, kind: CooldownKind) {
        match kind {
            CooldownKind::Timeout => self.timeout += 1,
            CooldownKind::Connection => self.connection += 1,
            CooldownKind::Slowdown => self.slowdown += 1,
        }
    }

    pub fn total(&self) -> u64 {
        self.timeout + self.connection + self.slowdown
    }
}

/// Mutable pacing state owned by the rate controller
///
/// Nothing here survives a restart; a fresh state assumes the server is slow.
#[derive(Debug, Clone)]
pub struct RateState {
    /// Configured minimum delay between paced requests
    pub min_delay: Duration,

    /// Latency of the most recent network round trip
    pub last_latency: Duration,

    /// Slowdown signals seen back to back
    pub consecutive_slowdowns: u32,

    /// An extended cooldown is owed before the next request
    pub pending_cooldown: bool,

    /// Paced waits performed
    pub waits: u64,

    pub cooldowns: CooldownCounts,
}

impl RateState {
    /// Creates a conservative initial state
    pub fn new(min_delay: Duration, assumed_latency: Duration) -> Self {
        Self {
            min_delay,
            last_latency: assumed_latency,
            consecutive_slowdowns: 0,
            pending_cooldown: false,
            waits: 0,
            cooldowns: CooldownCounts::default(),
        }
    }

    /// Base wait before jitter: the larger of the minimum delay and the last latency
    pub fn base_delay(&self) -> Duration {
        std::cmp::max(self.min_delay, self.last_latency)
    }
}

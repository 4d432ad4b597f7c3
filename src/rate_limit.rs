/// Throttling window state reported by the likers endpoint.
///
/// Only the API client feeds it and only the poll loop clears it; the
/// quota counters are advisory and never gate calls.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RateLimiter {
    active: bool,
    reset_window_end: Option<i64>,
    limit: Option<u64>,
    remaining: Option<u64>,
}

impl RateLimiter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    /// Returns `true` when this call switched limiting on.
    pub fn activate(&mut self) -> bool {
        if self.active {
            return false;
        }
        self.active = true;
        true
    }

    pub fn record_quota(&mut self, limit: Option<u64>, remaining: Option<u64>) {
        if let Some(limit) = limit {
            self.limit = Some(limit);
        }
        if let Some(remaining) = remaining {
            self.remaining = Some(remaining);
        }
    }

    /// Moves the reset point forward. Earlier or equal candidates are ignored.
    pub fn record_reset_window(&mut self, candidate: Option<i64>) -> bool {
        match (candidate, self.reset_window_end) {
            (Some(candidate), Some(current)) if candidate <= current => false,
            (Some(candidate), _) => {
                self.reset_window_end = Some(candidate);
                true
            }
            (None, _) => false,
        }
    }

    /// Clears limiting once `now` is past the known reset point. An unknown
    /// reset point counts as already passed.
    pub fn tick(&mut self, now: i64) -> bool {
        if !self.active {
            return false;
        }
        if now > self.reset_window_end.unwrap_or(i64::MIN) {
            self.active = false;
            return true;
        }
        false
    }

    pub fn reset_window_end(&self) -> Option<i64> {
        self.reset_window_end
    }

    pub fn limit(&self) -> Option<u64> {
        self.limit
    }

    pub fn remaining(&self) -> Option<u64> {
        self.remaining
    }
}

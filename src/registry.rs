use std::collections::HashMap;
use std::fmt;
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ItemId(String);

impl ItemId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ItemId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ItemId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Status {
    Checking,
    NotSelfLiked,
    SelfLiked,
}

impl Status {
    pub fn as_str(&self) -> &'static str {
        match self {
            Status::Checking => "checking",
            Status::NotSelfLiked => "not-self-liked",
            Status::SelfLiked => "self-liked",
        }
    }
}

/// Classification status of every item seen on this page load. An id that
/// is not in the registry has not been seen (or its last attempt failed).
#[derive(Debug, Default)]
pub struct Registry {
    items: HashMap<ItemId, Status>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, id: &ItemId) -> Option<Status> {
        self.items.get(id).copied()
    }

    pub fn contains(&self, id: &ItemId) -> bool {
        self.items.contains_key(id)
    }

    pub fn set(&mut self, id: ItemId, status: Status) -> Option<Status> {
        self.items.insert(id, status)
    }

    pub fn remove(&mut self, id: &ItemId) -> Option<Status> {
        self.items.remove(id)
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn count(&self, status: Status) -> usize {
        self.items.values().filter(|s| **s == status).count()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&ItemId, Status)> {
        self.items.iter().map(|(id, status)| (id, *status))
    }
}

/// Remembers when an item's last analysis failed so it can be held back
/// for a minimum delay. A zero delay retries on the very next cycle.
#[derive(Debug, Default)]
pub struct RetryBackoff {
    delay_secs: i64,
    failures: HashMap<ItemId, i64>,
}

impl RetryBackoff {
    pub fn new(delay: Duration) -> Self {
        Self {
            delay_secs: i64::try_from(delay.as_secs()).unwrap_or(i64::MAX),
            failures: HashMap::new(),
        }
    }

    pub fn record_failure(&mut self, id: ItemId, now: i64) {
        self.failures.insert(id, now);
    }

    pub fn clear(&mut self, id: &ItemId) {
        self.failures.remove(id);
    }

    pub fn is_ready(&self, id: &ItemId, now: i64) -> bool {
        match self.failures.get(id) {
            Some(failed_at) => now.saturating_sub(*failed_at) >= self.delay_secs,
            None => true,
        }
    }

    pub fn pending(&self) -> usize {
        self.failures.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn absent_ids_are_unseen() {
        let mut registry = Registry::new();
        let id = ItemId::from("42");
        assert_eq!(registry.get(&id), None);

        registry.set(id.clone(), Status::Checking);
        registry.set(id.clone(), Status::SelfLiked);
        assert_eq!(registry.get(&id), Some(Status::SelfLiked));
        assert_eq!(registry.len(), 1);

        assert_eq!(registry.remove(&id), Some(Status::SelfLiked));
        assert!(!registry.contains(&id));
    }

    #[test]
    fn counts_by_status() {
        let mut registry = Registry::new();
        registry.set("1".into(), Status::SelfLiked);
        registry.set("2".into(), Status::NotSelfLiked);
        registry.set("3".into(), Status::NotSelfLiked);
        assert_eq!(registry.count(Status::NotSelfLiked), 2);
        assert_eq!(registry.count(Status::Checking), 0);
    }

    #[test]
    fn zero_delay_retries_immediately() {
        let mut backoff = RetryBackoff::new(Duration::ZERO);
        backoff.record_failure("3".into(), 100);
        assert!(backoff.is_ready(&"3".into(), 100));
    }

    #[test]
    fn delay_holds_failed_items_back() {
        let mut backoff = RetryBackoff::new(Duration::from_secs(30));
        let id = ItemId::from("3");
        backoff.record_failure(id.clone(), 100);
        assert!(!backoff.is_ready(&id, 129));
        assert!(backoff.is_ready(&id, 130));

        backoff.clear(&id);
        assert!(backoff.is_ready(&id, 100));
        assert_eq!(backoff.pending(), 0);
    }
}

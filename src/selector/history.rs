use std::collections::VecDeque;

/// Number of recent picks remembered per session.
pub const RECENT_HISTORY_CAPACITY: usize = 15;

/// Bounded FIFO of recently chosen disease names for one session.
///
/// Pushing past capacity evicts the oldest name.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecentHistory {
    names: VecDeque<String>,
}

impl RecentHistory {
    pub fn new() -> Self {
        Self { names: VecDeque::with_capacity(RECENT_HISTORY_CAPACITY) }
    }

    pub fn push(&mut self, name: impl Into<String>) {
        self.names.push_back(name.into());
        while self.names.len() > RECENT_HISTORY_CAPACITY {
            self.names.pop_front();
        }
    }

    pub fn contains(&self, name: &str) -> bool {
        self.names.iter().any(|n| n == name)
    }

    /// Oldest first.
    pub fn iter(&self) -> impl Iterator<Item = &str> + '_ {
        self.names.iter().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    pub fn clear(&mut self) {
        self.names.clear();
    }
}

/// Restores a history carried by the session, keeping only the newest names.
impl From<Vec<String>> for RecentHistory {
    fn from(names: Vec<String>) -> Self {
        let mut history = Self::new();
        for name in names {
            history.push(name);
        }
        history
    }
}

impl From<RecentHistory> for Vec<String> {
    fn from(history: RecentHistory) -> Self {
        history.names.into()
    }
}

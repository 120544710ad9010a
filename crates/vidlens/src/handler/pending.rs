use std::collections::{HashMap, VecDeque};

use crate::ResourceKey;

/// Work deferred until the resource it depends on has been handled.
///
/// Items waiting on one key are kept in registration order.
#[derive(Debug)]
pub struct PendingHandlers<T> {
    waiting: HashMap<ResourceKey, VecDeque<(ResourceKey, T)>>,
}

impl<T> Default for PendingHandlers<T> {
    fn default() -> Self {
        Self {
            waiting: HashMap::new(),
        }
    }
}

impl<T> PendingHandlers<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Defer `item`, identified by `key`, until `dependency` is handled.
    pub fn register(&mut self, dependency: ResourceKey, key: ResourceKey, item: T) {
        tracing::trace!("Waiting to process \"{key}\" until init segment \"{dependency}\" is processed");
        self.waiting.entry(dependency).or_default().push_back((key, item));
    }

    /// Remove and return everything waiting on `dependency`.
    pub fn take(&mut self, dependency: &ResourceKey) -> VecDeque<(ResourceKey, T)> {
        self.waiting.remove(dependency).unwrap_or_default()
    }

    pub fn is_waiting_on(&self, dependency: &ResourceKey) -> bool {
        self.waiting.contains_key(dependency)
    }

    pub fn len(&self) -> usize {
        self.waiting.values().map(VecDeque::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.waiting.is_empty()
    }
}

use std::collections::HashSet;

/// First-write-wins set of business keys for one run, seeded with the keys
/// already persisted in the store.
#[derive(Debug, Default)]
pub(crate) struct Deduplicator {
    seen: HashSet<String>,
}

impl Deduplicator {
    pub fn seeded<I>(keys: I) -> Self
    where
        I: IntoIterator<Item = String>,
    {
        Self {
            seen: keys.into_iter().collect(),
        }
    }

    pub fn is_duplicate(&self, key: &str) -> bool {
        self.seen.contains(key)
    }

    /// Records a key once its row has been committed.
    pub fn accept(&mut self, key: &str) -> bool {
        self.seen.insert(key.to_string())
    }

    pub fn len(&self) -> usize {
        self.seen.len()
    }
}

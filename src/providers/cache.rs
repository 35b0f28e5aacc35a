use std::sync::Arc;

use dashmap::DashMap;

/// instanceId -> client handle. Entries live until invalidated explicitly;
/// there is no expiry. Concurrent population of the same key is last write
/// wins, the values being equivalent.
pub struct ClientCache<C> {
    entries: DashMap<String, Arc<C>>,
}

impl<C> Default for ClientCache<C> {
    fn default() -> Self {
        Self {
            entries: DashMap::new(),
        }
    }
}

impl<C> ClientCache<C> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, instance_id: &str) -> Option<Arc<C>> {
        self.entries.get(instance_id).map(|entry| Arc::clone(entry.value()))
    }

    pub fn insert(&self, instance_id: &str, client: C) -> Arc<C> {
        let client = Arc::new(client);
        self.entries
            .insert(instance_id.to_string(), Arc::clone(&client));
        client
    }

    pub fn invalidate(&self, instance_id: &str) -> bool {
        self.entries.remove(instance_id).is_some()
    }

    pub fn clear(&self) {
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

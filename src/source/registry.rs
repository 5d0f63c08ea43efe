//! Source registry
//!
//! Makes media sources discoverable by `(schema, key)` so transport
//! sessions can find the ring to attach to. Entries are weak: the registry
//! never keeps a torn-down source alive, and a dead entry never blocks a
//! new source from registering under the same key.

use std::any::Any;
use std::collections::HashMap;
use std::sync::{Arc, Weak};

use parking_lot::RwLock;

use crate::media::{Schema, SourceKey};

use super::error::RegistryError;
use super::media_source::MediaSource;
use super::track::MediaPacket;

type AnySource = Weak<dyn Any + Send + Sync>;

/// Registry of every discoverable source of the running instance
#[derive(Default)]
pub struct SourceRegistry {
    sources: RwLock<HashMap<(Schema, SourceKey), AnySource>>,
}

impl SourceRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a source
    ///
    /// Fails if a live source is already registered under the same schema
    /// and key. A dead entry is replaced.
    pub fn register(&self, schema: Schema, key: &SourceKey, source: AnySource) -> Result<(), RegistryError> {
        let mut sources = self.sources.write();
        let slot = (schema, key.clone());

        if let Some(existing) = sources.get(&slot) {
            if existing.strong_count() > 0 && !Weak::ptr_eq(existing, &source) {
                tracing::debug!(schema = %schema, stream = %key, "Source already registered");
                return Err(RegistryError::AlreadyRegistered(schema, key.clone()));
            }
        }

        sources.insert(slot, source);
        tracing::info!(schema = %schema, stream = %key, "Source registered");
        Ok(())
    }

    /// Remove a source, only if the entry still belongs to it
    pub fn unregister(&self, schema: Schema, key: &SourceKey, source: &AnySource) -> bool {
        let mut sources = self.sources.write();
        let slot = (schema, key.clone());

        match sources.get(&slot) {
            Some(existing) if Weak::ptr_eq(existing, source) => {
                sources.remove(&slot);
                tracing::info!(schema = %schema, stream = %key, "Source unregistered");
                true
            }
            _ => false,
        }
    }

    /// Look up a live source of the given packet type
    pub fn find<P: MediaPacket>(&self, schema: Schema, key: &SourceKey) -> Option<Arc<MediaSource<P>>> {
        let source = self.sources.read().get(&(schema, key.clone()))?.upgrade()?;
        source.downcast::<MediaSource<P>>().ok()
    }

    /// Whether a live source is registered under schema and key
    pub fn contains(&self, schema: Schema, key: &SourceKey) -> bool {
        self.sources
            .read()
            .get(&(schema, key.clone()))
            .map(|source| source.strong_count() > 0)
            .unwrap_or(false)
    }

    /// Number of live sources
    pub fn len(&self) -> usize {
        self.sources
            .read()
            .values()
            .filter(|source| source.strong_count() > 0)
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Keys of every live source
    pub fn keys(&self) -> Vec<(Schema, SourceKey)> {
        self.sources
            .read()
            .iter()
            .filter(|(_, source)| source.strong_count() > 0)
            .map(|(slot, _)| slot.clone())
            .collect()
    }

    /// Drop entries whose source is gone
    pub fn prune(&self) -> usize {
        let mut sources = self.sources.write();
        let before = sources.len();
        sources.retain(|_, source| source.strong_count() > 0);
        let removed = before - sources.len();
        if removed > 0 {
            tracing::debug!(removed = removed, "Pruned dead sources");
        }
        removed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn weak_of(value: &Arc<String>) -> AnySource {
        let any: Arc<dyn Any + Send + Sync> = value.clone();
        Arc::downgrade(&any)
    }

    #[test]
    fn test_register_and_contains() {
        let registry = SourceRegistry::new();
        let key = SourceKey::new("vhost", "live", "cam");
        let source = Arc::new(String::from("a"));

        registry.register(Schema::Rtsp, &key, weak_of(&source)).unwrap();

        assert!(registry.contains(Schema::Rtsp, &key));
        assert!(!registry.contains(Schema::Rtmp, &key));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_register_conflict() {
        let registry = SourceRegistry::new();
        let key = SourceKey::new("vhost", "live", "cam");
        let first = Arc::new(String::from("a"));
        let second = Arc::new(String::from("b"));

        registry.register(Schema::Rtsp, &key, weak_of(&first)).unwrap();
        let result = registry.register(Schema::Rtsp, &key, weak_of(&second));

        assert!(matches!(result, Err(RegistryError::AlreadyRegistered(Schema::Rtsp, _))));
    }

    #[test]
    fn test_dead_entry_is_replaced() {
        let registry = SourceRegistry::new();
        let key = SourceKey::new("vhost", "live", "cam");
        let first = Arc::new(String::from("a"));
        registry.register(Schema::Rtmp, &key, weak_of(&first)).unwrap();
        drop(first);

        assert!(!registry.contains(Schema::Rtmp, &key));
        let second = Arc::new(String::from("b"));
        assert!(registry.register(Schema::Rtmp, &key, weak_of(&second)).is_ok());
    }

    #[test]
    fn test_unregister_only_own_entry() {
        let registry = SourceRegistry::new();
        let key = SourceKey::new("vhost", "live", "cam");
        let owner = Arc::new(String::from("a"));
        let stranger = Arc::new(String::from("b"));
        registry.register(Schema::Rtsp, &key, weak_of(&owner)).unwrap();

        assert!(!registry.unregister(Schema::Rtsp, &key, &weak_of(&stranger)));
        assert!(registry.unregister(Schema::Rtsp, &key, &weak_of(&owner)));
        assert!(registry.is_empty());
    }

    #[test]
    fn test_prune() {
        let registry = SourceRegistry::new();
        let alive = Arc::new(String::from("a"));
        let dead = Arc::new(String::from("b"));
        registry.register(Schema::Rtsp, &SourceKey::new("v", "a", "1"), weak_of(&alive)).unwrap();
        registry.register(Schema::Rtsp, &SourceKey::new("v", "a", "2"), weak_of(&dead)).unwrap();
        drop(dead);

        assert_eq!(registry.prune(), 1);
        assert_eq!(registry.keys(), vec![(Schema::Rtsp, SourceKey::new("v", "a", "1"))]);
    }
}

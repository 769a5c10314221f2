use super::model::LogisticModel;
use crate::error::{AnalysisError, Result};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, RwLock};

/// Keyed storage for trained models.
///
/// Stored models are immutable; readers get a shared handle.
pub trait ModelStore: Send + Sync {
    fn get(&self, id: &str) -> Result<Option<Arc<LogisticModel>>>;

    /// Insert under a fresh identifier; an existing identifier is an error.
    fn put(&self, id: String, model: Arc<LogisticModel>) -> Result<()>;

    /// Returns whether something was removed.
    fn delete(&self, id: &str) -> Result<bool>;

    fn len(&self) -> Result<usize>;

    fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }
}

/// How many models a store keeps before dropping the oldest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum EvictionPolicy {
    #[default]
    Unbounded,
    /// Keep at most this many models, evicting in insertion order.
    MaxModels(usize),
}

#[derive(Default)]
struct StoreInner {
    models: HashMap<String, Arc<LogisticModel>>,
    insertion_order: VecDeque<String>,
}

/// Process-lifetime store backed by a map.
#[derive(Default)]
pub struct InMemoryModelStore {
    inner: RwLock<StoreInner>,
    eviction: EvictionPolicy,
}

impl InMemoryModelStore {
    pub fn new(eviction: EvictionPolicy) -> Self {
        Self {
            inner: RwLock::new(StoreInner::default()),
            eviction,
        }
    }
}

fn poisoned() -> AnalysisError {
    AnalysisError::processing("model store lock poisoned")
}

impl ModelStore for InMemoryModelStore {
    fn get(&self, id: &str) -> Result<Option<Arc<LogisticModel>>> {
        let inner = self.inner.read().map_err(|_| poisoned())?;
        Ok(inner.models.get(id).cloned())
    }

    fn put(&self, id: String, model: Arc<LogisticModel>) -> Result<()> {
        let mut inner = self.inner.write().map_err(|_| poisoned())?;
        if inner.models.contains_key(&id) {
            return Err(AnalysisError::processing(format!("model id {} is already in use", id)));
        }

        inner.models.insert(id.clone(), model);
        inner.insertion_order.push_back(id);

        if let EvictionPolicy::MaxModels(max) = self.eviction {
            while inner.models.len() > max {
                let Some(oldest) = inner.insertion_order.pop_front() else {
                    break;
                };
                if inner.models.remove(&oldest).is_some() {
                    tracing::info!("Evicted model {} (store limit {})", oldest, max);
                }
            }
        }
        Ok(())
    }

    fn delete(&self, id: &str) -> Result<bool> {
        let mut inner = self.inner.write().map_err(|_| poisoned())?;
        let removed = inner.models.remove(id).is_some();
        if removed {
            inner.insertion_order.retain(|existing| existing != id);
        }
        Ok(removed)
    }

    fn len(&self) -> Result<usize> {
        Ok(self.inner.read().map_err(|_| poisoned())?.models.len())
    }
}

//! Typed, layered per-request capability bag (spec.md §4.7).

use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::sync::Arc;

type Boxed = Arc<dyn Any + Send + Sync>;

/// A mapping from capability type to one instance of that type, with a
/// chained "base collection" fallback. `get` checks the own map, then the
/// base; `set(None)` removes from the own map, reverting to the base's
/// default (if any). Collections may be nested to any depth.
#[derive(Clone, Default)]
pub struct FeatureCollection {
    own: HashMap<TypeId, Boxed>,
    base: Option<Arc<FeatureCollection>>,
}

impl FeatureCollection {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a scoped collection that falls back to `base` for any
    /// capability not overridden locally. This is how a per-request
    /// `FeatureCollection` wraps the host's shared defaults.
    pub fn scoped(base: Arc<FeatureCollection>) -> Self {
        Self {
            own: HashMap::new(),
            base: Some(base),
        }
    }

    pub fn get<T: Send + Sync + 'static>(&self) -> Option<Arc<T>> {
        if let Some(value) = self.own.get(&TypeId::of::<T>()) {
            return value.clone().downcast::<T>().ok();
        }
        self.base.as_ref().and_then(|base| base.get::<T>())
    }

    /// Store an instance under its own type. Passing `None` removes any
    /// local override, letting the base collection's value (if any) show
    /// through again.
    pub fn set<T: Send + Sync + 'static>(&mut self, instance: Option<T>) {
        let key = TypeId::of::<T>();
        match instance {
            Some(value) => {
                self.own.insert(key, Arc::new(value));
            }
            None => {
                self.own.remove(&key);
            }
        }
    }

    pub fn contains<T: Send + Sync + 'static>(&self) -> bool {
        self.get::<T>().is_some()
    }
}

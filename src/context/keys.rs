//! Typed attribute keys.
//!
//! Attributes are keyed by the identity of a [`ContextKey`], not by its name,
//! so two features that both pick the name `"user"` can never collide.

use std::any::Any;
use std::collections::HashMap;
use std::marker::PhantomData;
use std::sync::atomic::{AtomicU64, Ordering};

/// Global counter for key identities. Relaxed is enough: only uniqueness matters.
static NEXT_KEY_ID: AtomicU64 = AtomicU64::new(1);

/// Identity of a typed context attribute.
///
/// Keys are usually created once and kept in a static:
///
/// ```
/// use std::sync::LazyLock;
/// use edge_gateway::context::ContextKey;
///
/// static TENANT: LazyLock<ContextKey<String>> = LazyLock::new(|| ContextKey::new("tenant"));
/// ```
pub struct ContextKey<T> {
    id: u64,
    name: &'static str,
    _marker: PhantomData<fn() -> T>,
}

impl<T: Send + Sync + 'static> ContextKey<T> {
    pub fn new(name: &'static str) -> Self {
        Self {
            id: NEXT_KEY_ID.fetch_add(1, Ordering::Relaxed),
            name,
            _marker: PhantomData,
        }
    }
}

impl<T> ContextKey<T> {
    /// Debug name; not used for lookup.
    pub fn name(&self) -> &'static str {
        self.name
    }
}

impl<T> Clone for ContextKey<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for ContextKey<T> {}

impl<T> std::fmt::Debug for ContextKey<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "ContextKey({}#{})", self.name, self.id)
    }
}

/// Heterogeneous attribute store.
#[derive(Default)]
pub struct Attributes {
    values: HashMap<u64, (&'static str, Box<dyn Any + Send + Sync>)>,
}

impl Attributes {
    pub fn get<T: Send + Sync + 'static>(&self, key: &ContextKey<T>) -> Option<&T> {
        self.values
            .get(&key.id)
            .and_then(|(_, v)| v.downcast_ref::<T>())
    }

    pub fn get_mut<T: Send + Sync + 'static>(&mut self, key: &ContextKey<T>) -> Option<&mut T> {
        self.values
            .get_mut(&key.id)
            .and_then(|(_, v)| v.downcast_mut::<T>())
    }

    /// Store a value, returning the previous one.
    pub fn put<T: Send + Sync + 'static>(&mut self, key: &ContextKey<T>, value: T) -> Option<T> {
        self.values
            .insert(key.id, (key.name, Box::new(value)))
            .and_then(|(_, v)| v.downcast::<T>().ok())
            .map(|b| *b)
    }

    pub fn remove<T: Send + Sync + 'static>(&mut self, key: &ContextKey<T>) -> Option<T> {
        self.values
            .remove(&key.id)
            .and_then(|(_, v)| v.downcast::<T>().ok())
            .map(|b| *b)
    }

    pub fn contains<T>(&self, key: &ContextKey<T>) -> bool {
        self.values.contains_key(&key.id)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Debug names of all stored attributes.
    pub fn names(&self) -> Vec<&'static str> {
        let mut names: Vec<_> = self.values.values().map(|(n, _)| *n).collect();
        names.sort_unstable();
        names
    }
}

impl std::fmt::Debug for Attributes {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_set().entries(self.names()).finish()
    }
}

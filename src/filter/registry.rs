//! Filter registry with atomic generation swap.
//!
//! # Responsibilities
//! - Hold the active sorted [`FilterSet`] per [`FilterType`]
//! - Look up endpoint filters by name in O(1)
//! - Replace the whole set of filters atomically on reload
//!
//! # Design Decisions
//! - Readers take an `Arc<Generation>` snapshot and never block
//! - Writers are serialized and build the next generation off to the side
//! - Duplicate (type, name) registrations: last write wins, logged at WARN

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use arc_swap::ArcSwap;
use serde::Serialize;

use crate::config::FilterConfig;
use crate::filter::{Filter, FilterSyncType, FilterType};

/// Filters of one type, sorted ascending by (order, name). Immutable.
#[derive(Debug, Default)]
pub struct FilterSet {
    filters: Vec<Arc<dyn Filter>>,
}

impl FilterSet {
    fn sorted(mut filters: Vec<Arc<dyn Filter>>) -> Self {
        filters.sort_by(|a, b| {
            a.order()
                .cmp(&b.order())
                .then_with(|| a.name().cmp(b.name()))
        });
        Self { filters }
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<dyn Filter>> {
        self.filters.iter()
    }

    pub fn len(&self) -> usize {
        self.filters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.filters.is_empty()
    }

    pub fn names(&self) -> Vec<&str> {
        self.filters.iter().map(|f| f.name()).collect()
    }
}

/// One consistent view of every registered filter.
#[derive(Debug)]
pub struct Generation {
    id: u64,
    sets: HashMap<FilterType, Arc<FilterSet>>,
    by_name: HashMap<FilterType, HashMap<String, Arc<dyn Filter>>>,
}

impl Generation {
    fn build(id: u64, filters: Vec<Arc<dyn Filter>>) -> Self {
        let mut by_name: HashMap<FilterType, HashMap<String, Arc<dyn Filter>>> = HashMap::new();
        for filter in filters {
            let named = by_name.entry(filter.filter_type()).or_default();
            if let Some(previous) = named.insert(filter.name().to_string(), filter.clone()) {
                tracing::warn!(
                    filter = %previous.name(),
                    filter_type = %previous.filter_type(),
                    "Duplicate filter registration, replacing previous instance"
                );
            }
        }

        let sets = FilterType::ALL
            .iter()
            .map(|t| {
                let filters = by_name
                    .get(t)
                    .map(|m| m.values().cloned().collect())
                    .unwrap_or_default();
                (*t, Arc::new(FilterSet::sorted(filters)))
            })
            .collect();

        Self { id, sets, by_name }
    }

    /// Monotonic generation number.
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn filters(&self, filter_type: FilterType) -> Arc<FilterSet> {
        self.sets.get(&filter_type).cloned().unwrap_or_default()
    }

    pub fn filter_by_name_and_type(
        &self,
        name: &str,
        filter_type: FilterType,
    ) -> Option<Arc<dyn Filter>> {
        self.by_name.get(&filter_type)?.get(name).cloned()
    }

    pub fn endpoint(&self, name: &str) -> Option<Arc<dyn Filter>> {
        self.filter_by_name_and_type(name, FilterType::Endpoint)
    }

    fn all(&self) -> Vec<Arc<dyn Filter>> {
        FilterType::ALL
            .iter()
            .flat_map(|t| self.filters(*t).filters.clone())
            .collect()
    }
}

/// Where filters come from.
pub trait FilterSource: Send + Sync {
    fn current_filter_set(&self, filter_type: FilterType) -> Vec<Arc<dyn Filter>>;
}

/// A fixed list of filter instances.
#[derive(Default)]
pub struct StaticFilterSource {
    filters: Vec<Arc<dyn Filter>>,
}

impl StaticFilterSource {
    pub fn new(filters: Vec<Arc<dyn Filter>>) -> Self {
        Self { filters }
    }
}

impl FilterSource for StaticFilterSource {
    fn current_filter_set(&self, filter_type: FilterType) -> Vec<Arc<dyn Filter>> {
        self.filters
            .iter()
            .filter(|f| f.filter_type() == filter_type)
            .cloned()
            .collect()
    }
}

/// Registration metadata exposed through the admin API.
#[derive(Debug, Clone, Serialize)]
pub struct FilterInfo {
    pub name: String,
    pub filter_type: FilterType,
    pub order: i32,
    pub sync_type: FilterSyncType,
    pub disabled: bool,
}

/// Holds the current [`Generation`].
pub struct FilterRegistry {
    current: ArcSwap<Generation>,
    write_lock: Mutex<()>,
    next_id: AtomicU64,
}

impl FilterRegistry {
    pub fn new(filters: Vec<Arc<dyn Filter>>) -> Self {
        Self {
            current: ArcSwap::from_pointee(Generation::build(1, filters)),
            write_lock: Mutex::new(()),
            next_id: AtomicU64::new(2),
        }
    }

    pub fn from_source(source: &dyn FilterSource) -> Self {
        Self::new(collect(source))
    }

    /// Snapshot of every filter set. Hold it for the whole request so that a
    /// concurrent reload never mixes generations.
    pub fn generation(&self) -> Arc<Generation> {
        self.current.load_full()
    }

    pub fn filters_by_type(&self, filter_type: FilterType) -> Arc<FilterSet> {
        self.current.load().filters(filter_type)
    }

    pub fn filter_by_name_and_type(
        &self,
        name: &str,
        filter_type: FilterType,
    ) -> Option<Arc<dyn Filter>> {
        self.current.load().filter_by_name_and_type(name, filter_type)
    }

    pub fn register(&self, filter: Arc<dyn Filter>) {
        self.update(|mut filters| {
            filters.push(filter);
            filters
        });
    }

    /// Returns whether a filter was removed.
    pub fn remove(&self, name: &str, filter_type: FilterType) -> bool {
        let mut removed = false;
        self.update(|filters| {
            let before = filters.len();
            let kept: Vec<_> = filters
                .into_iter()
                .filter(|f| !(f.filter_type() == filter_type && f.name() == name))
                .collect();
            removed = kept.len() != before;
            kept
        });
        removed
    }

    pub fn replace_all(&self, filters: Vec<Arc<dyn Filter>>) {
        self.update(|_| filters);
    }

    pub fn reload_from(&self, source: &dyn FilterSource) {
        let filters = collect(source);
        self.replace_all(filters);
    }

    pub fn filter_infos(&self, config: &FilterConfig) -> Vec<FilterInfo> {
        let generation = self.generation();
        FilterType::ALL
            .iter()
            .flat_map(|t| {
                generation
                    .filters(*t)
                    .iter()
                    .map(|f| FilterInfo {
                        name: f.name().to_string(),
                        filter_type: f.filter_type(),
                        order: f.order(),
                        sync_type: f.sync_type(),
                        disabled: f.is_disabled() || config.is_disabled(f.filter_type(), f.name()),
                    })
                    .collect::<Vec<_>>()
            })
            .collect()
    }

    fn update(&self, f: impl FnOnce(Vec<Arc<dyn Filter>>) -> Vec<Arc<dyn Filter>>) {
        let _guard = self.write_lock.lock().expect("filter registry mutex poisoned");
        let filters = f(self.current.load().all());
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let next = Generation::build(id, filters);
        tracing::info!(
            generation = id,
            inbound = next.filters(FilterType::Inbound).len(),
            endpoint = next.filters(FilterType::Endpoint).len(),
            outbound = next.filters(FilterType::Outbound).len(),
            "Filter generation installed"
        );
        self.current.store(Arc::new(next));
    }
}

impl std::fmt::Debug for FilterRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FilterRegistry")
            .field("generation", &self.current.load().id())
            .finish()
    }
}

fn collect(source: &dyn FilterSource) -> Vec<Arc<dyn Filter>> {
    FilterType::ALL
        .iter()
        .flat_map(|t| source.current_filter_set(*t))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Named(&'static str, FilterType, i32);

    impl Filter for Named {
        fn name(&self) -> &str {
            self.0
        }

        fn filter_type(&self) -> FilterType {
            self.1
        }

        fn order(&self) -> i32 {
            self.2
        }
    }

    fn named(name: &'static str, t: FilterType, order: i32) -> Arc<dyn Filter> {
        Arc::new(Named(name, t, order))
    }

    #[test]
    fn test_sorted_by_order_then_name() {
        let registry = FilterRegistry::new(vec![
            named("c", FilterType::Inbound, 10),
            named("b", FilterType::Inbound, 5),
            named("a", FilterType::Inbound, 10),
            named("z", FilterType::Outbound, 0),
        ]);
        let set = registry.filters_by_type(FilterType::Inbound);
        assert_eq!(set.names(), vec!["b", "a", "c"]);
        assert_eq!(registry.filters_by_type(FilterType::Outbound).len(), 1);
        assert!(registry.filters_by_type(FilterType::Endpoint).is_empty());
    }

    #[test]
    fn test_duplicate_registration_last_wins() {
        let registry = FilterRegistry::new(vec![named("dup", FilterType::Inbound, 1)]);
        registry.register(named("dup", FilterType::Inbound, 7));
        let set = registry.filters_by_type(FilterType::Inbound);
        assert_eq!(set.len(), 1);
        assert_eq!(set.iter().next().unwrap().order(), 7);
    }

    #[test]
    fn test_same_name_different_type_coexist() {
        let registry = FilterRegistry::new(vec![
            named("x", FilterType::Inbound, 1),
            named("x", FilterType::Endpoint, 1),
        ]);
        assert!(registry.filter_by_name_and_type("x", FilterType::Inbound).is_some());
        assert!(registry.generation().endpoint("x").is_some());
        assert!(registry.filter_by_name_and_type("x", FilterType::Outbound).is_none());
    }

    #[test]
    fn test_snapshot_survives_replace() {
        let registry = FilterRegistry::new(vec![named("old", FilterType::Inbound, 1)]);
        let snapshot = registry.generation();
        registry.replace_all(vec![named("new", FilterType::Inbound, 1)]);
        assert_eq!(snapshot.filters(FilterType::Inbound).names(), vec!["old"]);
        assert_eq!(registry.filters_by_type(FilterType::Inbound).names(), vec!["new"]);
        assert!(registry.generation().id() > snapshot.id());
    }

    #[test]
    fn test_remove_and_reload() {
        let registry = FilterRegistry::new(vec![named("a", FilterType::Inbound, 1)]);
        assert!(registry.remove("a", FilterType::Inbound));
        assert!(!registry.remove("a", FilterType::Inbound));
        registry.reload_from(&StaticFilterSource::new(vec![
            named("e", FilterType::Endpoint, 0),
            named("o", FilterType::Outbound, 0),
        ]));
        assert!(registry.filters_by_type(FilterType::Inbound).is_empty());
        assert!(registry.filter_by_name_and_type("e", FilterType::Endpoint).is_some());
    }
}

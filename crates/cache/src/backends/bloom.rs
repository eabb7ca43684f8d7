//! Named in-process bloom filters.
//!
//! Each name owns an independently sized filter, so domains never share bits.
//! Filters only grow; rebuilding means creating a fresh registry and
//! re-adding every element from the authoritative store.

use crate::error::{CacheError, CacheResult};
use crate::traits::ExistenceFilter;
use async_trait::async_trait;
use bloomfilter::Bloom;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;

struct NamedFilter {
    bloom: Bloom<[u8]>,
    inserted: u64,
    expected_insertions: usize,
}

/// Registry of named bloom filters.
#[derive(Default)]
pub struct BloomFilters {
    filters: DashMap<String, NamedFilter>,
}

impl BloomFilters {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of `add` calls a filter has absorbed (duplicates included).
    pub fn inserted(&self, name: &str) -> Option<u64> {
        self.filters.get(name).map(|f| f.inserted)
    }

    /// Names of all initialized filters, sorted.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.filters.iter().map(|f| f.key().clone()).collect();
        names.sort();
        names
    }

    fn with_filter<T>(&self, name: &str, f: impl FnOnce(&mut NamedFilter) -> T) -> CacheResult<T> {
        let mut filter = self
            .filters
            .get_mut(name)
            .ok_or_else(|| CacheError::FilterNotInitialized(name.to_string()))?;
        let before = filter.inserted;
        let out = f(&mut filter);
        let capacity = filter.expected_insertions as u64;
        if before < capacity && filter.inserted >= capacity {
            tracing::warn!(
                filter = %name,
                expected_insertions = filter.expected_insertions,
                "Existence filter reached its sized capacity, false-positive rate will climb"
            );
        }
        Ok(out)
    }
}

#[async_trait]
impl ExistenceFilter for BloomFilters {
    async fn init_filter(
        &self,
        name: &str,
        expected_insertions: usize,
        false_positive_rate: f64,
    ) -> CacheResult<bool> {
        if expected_insertions == 0 || !(false_positive_rate > 0.0 && false_positive_rate < 1.0) {
            return Err(CacheError::Config(format!(
                "invalid filter sizing for {name}: {expected_insertions} items at rate {false_positive_rate}"
            )));
        }
        match self.filters.entry(name.to_string()) {
            Entry::Occupied(_) => Ok(false),
            Entry::Vacant(vacant) => {
                vacant.insert(NamedFilter {
                    bloom: Bloom::new_for_fp_rate(expected_insertions, false_positive_rate),
                    inserted: 0,
                    expected_insertions,
                });
                tracing::info!(
                    filter = %name,
                    expected_insertions,
                    false_positive_rate,
                    "Existence filter created"
                );
                Ok(true)
            }
        }
    }

    async fn contains(&self, name: &str, element: &str) -> CacheResult<bool> {
        Ok(self
            .filters
            .get(name)
            .is_some_and(|f| f.bloom.check(element.as_bytes())))
    }

    async fn add(&self, name: &str, element: &str) -> CacheResult<()> {
        self.with_filter(name, |f| {
            f.bloom.set(element.as_bytes());
            f.inserted += 1;
        })
    }

    async fn add_all(&self, name: &str, elements: &[String]) -> CacheResult<()> {
        self.with_filter(name, |f| {
            for element in elements {
                f.bloom.set(element.as_bytes());
            }
            f.inserted += elements.len() as u64;
        })
    }
}

// Copyright 2025 STARGA Inc.
// Licensed under the Apache License, Version 2.0 (the “License”);
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at:
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an “AS IS” BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

// Part of the symkern project.

//! Process-wide memo of index tables.
//!
//! A table depends only on its [`ContractionSpec`], so the first request for a
//! spec builds it and every later request gets the same `Arc`. Entries are
//! never invalidated.
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use symkern::tensordot::{cached_index_table, ContractionSpec};
//!
//! let spec = ContractionSpec::new(vec![4, 3], vec![3, 5], vec![1], vec![0]).unwrap();
//! let t1 = cached_index_table(&spec).unwrap();
//! let t2 = cached_index_table(&spec).unwrap();
//! assert!(Arc::ptr_eq(&t1, &t2));
//! ```

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, OnceLock};

use log::{debug, warn};

use super::spec::{ContractionError, ContractionSpec};
use super::table::IndexTable;

static TABLES: OnceLock<Mutex<TableCache>> = OnceLock::new();

/// Maximum number of memoized tables. Past this, tables are still built but
/// handed out uncached.
const MAX_CACHED_TABLES: usize = 4_096;

#[derive(Default)]
struct TableCache {
    tables: HashMap<ContractionSpec, Arc<IndexTable>>,
    hits: u64,
    misses: u64,
}

/// Snapshot of cache counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TableCacheStats {
    pub entries: usize,
    pub hits: u64,
    pub misses: u64,
}

fn lock_cache() -> MutexGuard<'static, TableCache> {
    let cache = TABLES.get_or_init(|| Mutex::new(TableCache::default()));
    match cache.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

/// Return the shared table for `spec`, building it on first use.
///
/// The lock is not held while building, so distinct specs build in parallel.
/// If two threads race on the same spec the first insert wins and both get
/// that table.
pub fn cached_index_table(spec: &ContractionSpec) -> Result<Arc<IndexTable>, ContractionError> {
    {
        let mut cache = lock_cache();
        if let Some(table) = cache.tables.get(spec).cloned() {
            cache.hits += 1;
            debug!("index table cache hit for {spec}");
            return Ok(table);
        }
        cache.misses += 1;
    }

    let built = Arc::new(IndexTable::build(spec)?);

    let mut cache = lock_cache();
    if cache.tables.len() >= MAX_CACHED_TABLES && !cache.tables.contains_key(spec) {
        warn!(
            "index table cache at capacity ({MAX_CACHED_TABLES}); handing out {spec} uncached"
        );
        return Ok(built);
    }
    let shared = cache
        .tables
        .entry(spec.clone())
        .or_insert(built)
        .clone();
    Ok(shared)
}

/// Current cache counters.
pub fn cache_stats() -> TableCacheStats {
    let cache = lock_cache();
    TableCacheStats {
        entries: cache.tables.len(),
        hits: cache.hits,
        misses: cache.misses,
    }
}

// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
// http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! A thread-safe, size-bounded LRU cache of compiled statements.
//!
//! Keys are exact SQL strings. The map and the recency list live behind one
//! mutex, so promotion and eviction are a single short exclusive section.
//! Parsing happens outside the lock; a second lookup after reacquiring it
//! keeps racing compilers from inserting duplicates.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use log::debug;
use parking_lot::Mutex;

use crate::ast::Statement;
use crate::error::Result;
use crate::parser::Parser;

/// Default capacity of [`StatementCache`].
pub const DEFAULT_CACHE_CAPACITY: usize = 1000;

/// A parsed statement together with its source text.
#[derive(Debug, Clone, PartialEq)]
pub struct CompiledStatement {
    pub sql: String,
    pub statement: Statement,
    pub parsed_at: DateTime<Utc>,
}

/// Point-in-time cache counters.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub size: usize,
    pub capacity: usize,
}

const NIL: usize = usize::MAX;

struct Entry {
    key: String,
    statement: Arc<CompiledStatement>,
    prev: usize,
    next: usize,
}

/// Map + intrusive recency list. `head` is the most recently used entry.
struct Inner {
    map: HashMap<String, usize>,
    entries: Vec<Entry>,
    free: Vec<usize>,
    head: usize,
    tail: usize,
    hits: u64,
    misses: u64,
}

impl Inner {
    fn detach(&mut self, idx: usize) {
        let (prev, next) = (self.entries[idx].prev, self.entries[idx].next);
        if prev != NIL {
            self.entries[prev].next = next;
        } else {
            self.head = next;
        }
        if next != NIL {
            self.entries[next].prev = prev;
        } else {
            self.tail = prev;
        }
    }

    fn attach_front(&mut self, idx: usize) {
        self.entries[idx].prev = NIL;
        self.entries[idx].next = self.head;
        if self.head != NIL {
            self.entries[self.head].prev = idx;
        }
        self.head = idx;
        if self.tail == NIL {
            self.tail = idx;
        }
    }

    fn promote(&mut self, idx: usize) {
        if self.head != idx {
            self.detach(idx);
            self.attach_front(idx);
        }
    }

    fn lookup(&mut self, sql: &str) -> Option<Arc<CompiledStatement>> {
        let idx = *self.map.get(sql)?;
        self.promote(idx);
        Some(Arc::clone(&self.entries[idx].statement))
    }

    fn insert(&mut self, sql: String, statement: Arc<CompiledStatement>, capacity: usize) {
        if capacity == 0 {
            return;
        }
        if self.map.len() >= capacity {
            let victim = self.tail;
            self.detach(victim);
            let key = std::mem::take(&mut self.entries[victim].key);
            self.map.remove(&key);
            self.free.push(victim);
            debug!("statement cache evicted {key:?}");
        }
        let entry = Entry {
            key: sql.clone(),
            statement,
            prev: NIL,
            next: NIL,
        };
        let idx = match self.free.pop() {
            Some(idx) => {
                self.entries[idx] = entry;
                idx
            }
            None => {
                self.entries.push(entry);
                self.entries.len() - 1
            }
        };
        self.map.insert(sql, idx);
        self.attach_front(idx);
    }
}

/// The compile cache. Cheap to share; all methods take `&self`.
pub struct StatementCache {
    capacity: usize,
    inner: Mutex<Inner>,
}

impl StatementCache {
    pub fn new(capacity: usize) -> Self {
        StatementCache {
            capacity,
            inner: Mutex::new(Inner {
                map: HashMap::new(),
                entries: Vec::new(),
                free: Vec::new(),
                head: NIL,
                tail: NIL,
                hits: 0,
                misses: 0,
            }),
        }
    }

    /// Parses `sql`, consulting the cache first. A hit promotes the entry to
    /// most recently used.
    pub fn compile(&self, sql: &str) -> Result<Arc<CompiledStatement>> {
        {
            let mut inner = self.inner.lock();
            if let Some(found) = inner.lookup(sql) {
                inner.hits += 1;
                debug!("statement cache hit for {sql:?}");
                return Ok(found);
            }
            inner.misses += 1;
        }

        // Parse outside the lock; parsing is deterministic, so two racing
        // compilers produce interchangeable results.
        let statement = Parser::parse_sql(sql)?;
        let compiled = Arc::new(CompiledStatement {
            sql: sql.to_string(),
            statement,
            parsed_at: Utc::now(),
        });

        let mut inner = self.inner.lock();
        if let Some(existing) = inner.lookup(sql) {
            return Ok(existing);
        }
        inner.insert(sql.to_string(), Arc::clone(&compiled), self.capacity);
        Ok(compiled)
    }

    /// Like [`compile`](Self::compile), but treats a parse failure as a
    /// programmer error. This is the crate's only panicking entry point.
    pub fn must_compile(&self, sql: &str) -> Arc<CompiledStatement> {
        match self.compile(sql) {
            Ok(compiled) => compiled,
            Err(err) => panic!("must_compile({sql:?}): {err}"),
        }
    }

    pub fn clear(&self) {
        let mut inner = self.inner.lock();
        inner.map.clear();
        inner.entries.clear();
        inner.free.clear();
        inner.head = NIL;
        inner.tail = NIL;
    }

    pub fn len(&self) -> usize {
        self.inner.lock().map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// True if `sql` is currently cached; does not touch recency order.
    pub fn contains(&self, sql: &str) -> bool {
        self.inner.lock().map.contains_key(sql)
    }

    pub fn stats(&self) -> CacheStats {
        let inner = self.inner.lock();
        CacheStats {
            hits: inner.hits,
            misses: inner.misses,
            size: inner.map.len(),
            capacity: self.capacity,
        }
    }

    /// Cached SQL texts from most to least recently used.
    pub fn keys(&self) -> Vec<String> {
        let inner = self.inner.lock();
        let mut keys = Vec::with_capacity(inner.map.len());
        let mut idx = inner.head;
        while idx != NIL {
            keys.push(inner.entries[idx].key.clone());
            idx = inner.entries[idx].next;
        }
        keys
    }
}

impl Default for StatementCache {
    fn default() -> Self {
        StatementCache::new(DEFAULT_CACHE_CAPACITY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lru_eviction_order() {
        let cache = StatementCache::new(2);
        cache.compile("SELECT 1").unwrap();
        cache.compile("SELECT 2").unwrap();
        cache.compile("SELECT 1").unwrap();
        cache.compile("SELECT 3").unwrap();
        assert_eq!(cache.len(), 2);
        assert!(cache.contains("SELECT 1"));
        assert!(cache.contains("SELECT 3"));
        assert!(!cache.contains("SELECT 2"));
        assert_eq!(cache.keys(), vec!["SELECT 3".to_string(), "SELECT 1".to_string()]);
    }

    #[test]
    fn hits_share_the_parsed_statement() {
        let cache = StatementCache::new(8);
        let a = cache.compile("SELECT 1").unwrap();
        let b = cache.compile("SELECT 1").unwrap();
        assert!(Arc::ptr_eq(&a, &b));
        let stats = cache.stats();
        assert_eq!((stats.hits, stats.misses, stats.size), (1, 1, 1));
    }

    #[test]
    fn parse_errors_propagate_and_cache_nothing() {
        let cache = StatementCache::new(8);
        assert!(cache.compile("SELEC 1").is_err());
        assert_eq!(cache.len(), 0);
    }

    #[test]
    fn clear_resets_entries() {
        let cache = StatementCache::new(4);
        cache.compile("SELECT 1").unwrap();
        cache.clear();
        assert!(cache.is_empty());
        cache.compile("SELECT 2").unwrap();
        assert_eq!(cache.len(), 1);
    }

    #[test]
    #[should_panic(expected = "must_compile")]
    fn must_compile_panics_on_bad_sql() {
        StatementCache::new(4).must_compile("NOT SQL");
    }
}

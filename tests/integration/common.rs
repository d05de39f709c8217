//! Shared fixtures: an in-memory fetcher and frontier construction

use async_trait::async_trait;
use ghgraph::config::CrawlerConfig;
use ghgraph::crawler::{Frontier, RateBudget};
use ghgraph::fetch::{FetchError, Fetcher, Page, Record, Relation};
use ghgraph::storage::SqliteGraphStore;
use ghgraph::EntityKind;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

type Key = (String, Relation);

/// Serves a fixed graph, paginated by offset cursors
pub struct FakeFetcher {
    page_size: usize,
    entities: HashMap<String, Record>,
    relations: HashMap<Key, Vec<Record>>,
    total_counts: HashMap<Key, u64>,
    failures: HashMap<Key, String>,
    flaky: Mutex<HashMap<Key, usize>>,
    delays: HashMap<Key, Duration>,
    pages_served: AtomicUsize,
}

impl FakeFetcher {
    pub fn new() -> Self {
        Self {
            page_size: 100,
            entities: HashMap::new(),
            relations: HashMap::new(),
            total_counts: HashMap::new(),
            failures: HashMap::new(),
            flaky: Mutex::new(HashMap::new()),
            delays: HashMap::new(),
            pages_served: AtomicUsize::new(0),
        }
    }

    pub fn page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size;
        self
    }

    /// Makes `record` resolvable through `fetch_entity(_, id_or_url)`
    pub fn entity(mut self, id_or_url: &str, record: Record) -> Self {
        self.entities.insert(id_or_url.to_string(), record);
        self
    }

    pub fn relation(mut self, parent: &str, relation: Relation, records: Vec<Record>) -> Self {
        self.relations
            .insert((parent.to_string(), relation), records);
        self
    }

    /// Overrides the `total_count` declared for a relation
    pub fn declaring(mut self, parent: &str, relation: Relation, total_count: u64) -> Self {
        self.total_counts
            .insert((parent.to_string(), relation), total_count);
        self
    }

    pub fn failing(mut self, parent: &str, relation: Relation, message: &str) -> Self {
        self.failures
            .insert((parent.to_string(), relation), message.to_string());
        self
    }

    /// Fails the first `times` requests for a relation, then serves it
    pub fn flaky(self, parent: &str, relation: Relation, times: usize) -> Self {
        self.flaky
            .lock()
            .unwrap()
            .insert((parent.to_string(), relation), times);
        self
    }

    pub fn delayed(mut self, parent: &str, relation: Relation, delay: Duration) -> Self {
        self.delays.insert((parent.to_string(), relation), delay);
        self
    }

    pub fn pages_served(&self) -> usize {
        self.pages_served.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Fetcher for FakeFetcher {
    async fn fetch_page(
        &self,
        parent: &str,
        relation: Relation,
        cursor: Option<&str>,
    ) -> Result<Page, FetchError> {
        let key = (parent.to_string(), relation);
        self.pages_served.fetch_add(1, Ordering::SeqCst);

        if let Some(delay) = self.delays.get(&key) {
            tokio::time::sleep(*delay).await;
        }

        if let Some(message) = self.failures.get(&key) {
            return Err(FetchError::Api(message.clone()));
        }

        if let Some(remaining) = self.flaky.lock().unwrap().get_mut(&key) {
            if *remaining > 0 {
                *remaining -= 1;
                return Err(FetchError::Api(format!("{} is flaky", parent)));
            }
        }

        let all = self.relations.get(&key).map(Vec::as_slice).unwrap_or(&[]);
        let offset: usize = cursor.map(|c| c.parse().unwrap()).unwrap_or(0);
        let end = (offset + self.page_size).min(all.len());

        Ok(Page {
            records: all[offset..end].to_vec(),
            total_count: self
                .total_counts
                .get(&key)
                .copied()
                .unwrap_or(all.len() as u64),
            end_cursor: Some(end.to_string()),
            has_next_page: end < all.len(),
        })
    }

    async fn fetch_entity(&self, _kind: EntityKind, id_or_url: &str) -> Result<Record, FetchError> {
        self.entities
            .get(id_or_url)
            .cloned()
            .ok_or_else(|| FetchError::Api(format!("Could not resolve to a node: {}", id_or_url)))
    }

    async fn remaining_quota(&self) -> Result<u32, FetchError> {
        Ok(5000)
    }

    fn switch_credential(&self, _token: &str) {}
}

/// Crawler settings with a deterministic pass order
pub fn settings() -> CrawlerConfig {
    CrawlerConfig {
        shuffle: false,
        node_timeout_secs: 10,
        ..Default::default()
    }
}

pub fn frontier(
    store: &Arc<SqliteGraphStore>,
    fetcher: &Arc<FakeFetcher>,
    settings: CrawlerConfig,
) -> Frontier {
    Frontier::new(
        store.clone(),
        fetcher.clone(),
        RateBudget::new(vec!["token".to_string()], 100, 50),
        settings,
        "test-config",
    )
}

pub fn memory_store() -> Arc<SqliteGraphStore> {
    Arc::new(SqliteGraphStore::new_in_memory().unwrap())
}

pub fn users(prefix: &str, n: usize) -> Vec<Record> {
    (0..n)
        .map(|i| {
            let login = format!("{}{}", prefix, i);
            Record::new(login.clone()).with_attribute("login", login)
        })
        .collect()
}

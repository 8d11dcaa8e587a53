use std::collections::HashSet;

use async_trait::async_trait;
use chrono::{NaiveDate, Utc};
use tokio::sync::RwLock;

use crate::entity::{Appendable, Entity, EntityKey};
use crate::error::{Error, Result};

/// Read side of a domain's records.
#[async_trait]
pub trait EntityStore<T: Entity>: Send + Sync {
    /// Every record in insertion order.
    async fn list_all(&self) -> Vec<T>;

    async fn get_by_id(&self, id: &str) -> Option<T>;

    /// The first `limit` records in insertion order.
    async fn list_first(&self, limit: usize) -> Vec<T> {
        let mut records = self.list_all().await;
        records.truncate(limit);
        records
    }

    /// Federation reference resolver. A key for another type, or an id that
    /// is not stored, is a miss rather than an error.
    async fn resolve_reference(&self, key: &EntityKey) -> Option<T> {
        if !key.is_for::<T>() {
            return None;
        }
        self.get_by_id(&key.id).await
    }
}

/// Write side, only implemented for domains that accept new records.
#[async_trait]
pub trait AppendStore<T: Appendable>: EntityStore<T> {
    /// Mints a fresh id and creation date and stores the record at the end.
    async fn append(&self, draft: T::Draft) -> T;
}

type Clock = Box<dyn Fn() -> NaiveDate + Send + Sync>;

struct Records<T> {
    items: Vec<T>,
    next_seq: u64,
}

pub struct InMemoryStore<T> {
    records: RwLock<Records<T>>,
    clock: Clock,
}

impl<T: Entity> InMemoryStore<T> {
    pub fn new(seed: Vec<T>) -> Result<Self> {
        let mut seen = HashSet::with_capacity(seed.len());
        for record in &seed {
            if !seen.insert(record.id()) {
                return Err(Error::DuplicateId {
                    typename: T::TYPENAME,
                    id: record.id().to_string(),
                });
            }
        }

        let next_seq = seed.len() as u64 + 1;
        Ok(InMemoryStore {
            records: RwLock::new(Records {
                items: seed,
                next_seq,
            }),
            clock: Box::new(|| Utc::now().date_naive()),
        })
    }

    /// Replaces the source of creation dates.
    pub fn with_clock(mut self, clock: impl Fn() -> NaiveDate + Send + Sync + 'static) -> Self {
        self.clock = Box::new(clock);
        self
    }

    pub async fn len(&self) -> usize {
        self.records.read().await.items.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

#[async_trait]
impl<T: Entity> EntityStore<T> for InMemoryStore<T> {
    async fn list_all(&self) -> Vec<T> {
        self.records.read().await.items.clone()
    }

    async fn get_by_id(&self, id: &str) -> Option<T> {
        let records = self.records.read().await;
        records.items.iter().find(|r| r.id() == id).cloned()
    }

    async fn list_first(&self, limit: usize) -> Vec<T> {
        let records = self.records.read().await;
        records.items.iter().take(limit).cloned().collect()
    }
}

#[async_trait]
impl<T: Appendable> AppendStore<T> for InMemoryStore<T> {
    async fn append(&self, draft: T::Draft) -> T {
        // Id assignment happens entirely under the write lock.
        let mut records = self.records.write().await;
        let id = loop {
            let candidate = format!("{}{}", T::ID_PREFIX, records.next_seq);
            records.next_seq += 1;
            if !records.items.iter().any(|r| r.id() == candidate) {
                break candidate;
            }
        };

        let record = T::assemble(id, (self.clock)(), draft);
        records.items.push(record.clone());
        tracing::debug!(typename = T::TYPENAME, id = record.id(), "appended record");
        record
    }
}

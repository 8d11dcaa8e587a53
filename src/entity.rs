//! Entity identity shared by every subgraph.
//!
//! A subgraph that only knows the key of a foreign record hands out an
//! [`EntityRef::Reference`]; turning it into a full record is the job of the
//! subgraph owning the type, through its reference resolver.

use std::fmt;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::store::EntityStore;

/// Wire format of every `createdAt` field.
pub const DATE_FORMAT: &str = "%Y-%m-%d";

pub fn format_date(date: NaiveDate) -> String {
    date.format(DATE_FORMAT).to_string()
}

/// A record owned by exactly one subgraph and addressable by its id.
pub trait Entity: Clone + Send + Sync + 'static {
    /// GraphQL type name, matched against `__typename` of incoming keys.
    const TYPENAME: &'static str;

    fn id(&self) -> &str;
}

/// An entity that can be created at runtime.
pub trait Appendable: Entity {
    /// Caller-supplied part of a new record.
    type Draft: Send + 'static;

    /// Prefix of the ids minted by the store (`r` gives `r11`, `r12`...).
    const ID_PREFIX: &'static str;

    fn assemble(id: String, created_at: NaiveDate, draft: Self::Draft) -> Self;
}

/// The `{ __typename, id }` representation used to defer resolution.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EntityKey {
    #[serde(rename = "__typename")]
    pub typename: String,
    pub id: String,
}

impl EntityKey {
    pub fn new(typename: impl Into<String>, id: impl Into<String>) -> Self {
        EntityKey {
            typename: typename.into(),
            id: id.into(),
        }
    }

    pub fn is_for<T: Entity>(&self) -> bool {
        self.typename == T::TYPENAME
    }
}

impl fmt::Display for EntityKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.typename, self.id)
    }
}

/// Either a full record or a stub that still needs a second resolution step.
#[derive(Clone, Debug, PartialEq)]
pub enum EntityRef<T> {
    Resolved(T),
    Reference(EntityKey),
}

impl<T: Entity> EntityRef<T> {
    pub fn reference(id: impl Into<String>) -> Self {
        EntityRef::Reference(EntityKey::new(T::TYPENAME, id))
    }

    pub fn id(&self) -> &str {
        match self {
            EntityRef::Resolved(record) => record.id(),
            EntityRef::Reference(key) => &key.id,
        }
    }

    /// Runs the second step against the owning store. A dangling key gives `None`.
    pub async fn resolve<S>(self, store: &S) -> Option<T>
    where
        S: EntityStore<T> + ?Sized,
    {
        match self {
            EntityRef::Resolved(record) => Some(record),
            EntityRef::Reference(key) => store.resolve_reference(&key).await,
        }
    }
}

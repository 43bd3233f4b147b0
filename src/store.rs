//! Abstract document store used by the journal, and an in-memory
//! implementation of it.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use getrandom::fill;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap};
use tokio::sync::RwLock;

use crate::error::StoreError;

pub const ENTRIES: &str = "entries";
pub const CHATS: &str = "chats";
pub const USERS: &str = "users";

/// A single document field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "camelCase")]
pub enum FieldValue {
    Text(String),
    Timestamp(DateTime<Utc>),
}

impl FieldValue {
    pub fn as_text(&self) -> Option<&str> {
        match self {
            FieldValue::Text(s) => Some(s),
            FieldValue::Timestamp(_) => None,
        }
    }

    pub fn as_timestamp(&self) -> Option<DateTime<Utc>> {
        match self {
            FieldValue::Timestamp(t) => Some(*t),
            FieldValue::Text(_) => None,
        }
    }
}


impl From<&str> for FieldValue {
    fn from(value: &str) -> Self {
        FieldValue::Text(value.to_string())
    }
}

impl From<String> for FieldValue {
    fn from(value: String) -> Self {
        FieldValue::Text(value)
    }
}

impl From<DateTime<Utc>> for FieldValue {
    fn from(value: DateTime<Utc>) -> Self {
        FieldValue::Timestamp(value)
    }
}

pub type Fields = BTreeMap<String, FieldValue>;

/// A stored document and its identifier.
#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    pub id: String,
    pub fields: Fields,
}

impl Record {
    pub fn text(&self, name: &str) -> Option<&str> {
        self.fields.get(name).and_then(FieldValue::as_text)
    }

    pub fn timestamp(&self, name: &str) -> Option<DateTime<Utc>> {
        self.fields.get(name).and_then(FieldValue::as_timestamp)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Ascending,
    Descending,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderBy {
    pub field: String,
    pub direction: Direction,
}

impl OrderBy {
    pub fn descending(field: &str) -> Self {
        Self {
            field: field.to_string(),
            direction: Direction::Descending,
        }
    }

    pub fn ascending(field: &str) -> Self {
        Self {
            field: field.to_string(),
            direction: Direction::Ascending,
        }
    }
}

/// Key/value document storage with query-by-field.
///
/// Every write replaces one document atomically. Implementations must offer
/// read-your-writes consistency to a single caller.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Insert a document under a generated id.
    async fn create(&self, collection: &str, fields: Fields) -> Result<String, StoreError>;

    /// Insert or fully replace the document at `id`.
    async fn put(&self, collection: &str, id: &str, fields: Fields) -> Result<(), StoreError>;

    /// Merge `fields` into an existing document.
    async fn update(&self, collection: &str, id: &str, fields: Fields) -> Result<(), StoreError>;

    async fn delete(&self, collection: &str, id: &str) -> Result<(), StoreError>;

    async fn get_by_id(&self, collection: &str, id: &str) -> Result<Option<Record>, StoreError>;

    /// All documents whose `field` equals `value`, optionally ordered.
    async fn query_by_field(
        &self,
        collection: &str,
        field: &str,
        value: &FieldValue,
        order_by: Option<OrderBy>,
    ) -> Result<Vec<Record>, StoreError>;
}

/// Generate a 20-character hex document id from the OS random source.
pub(crate) fn generate_id() -> Result<String, StoreError> {
    let mut buf = [0u8; 10];
    fill(&mut buf).map_err(|_| StoreError::Random)?;
    Ok(buf.iter().map(|b| format!("{b:02x}")).collect())
}

/// The documents of every collection, keyed by collection then id.
#[derive(Serialize, Deserialize, Debug, Default, Clone)]
pub(crate) struct Collections {
    collections: HashMap<String, BTreeMap<String, Fields>>,
}

impl Collections {
    pub fn create(&mut self, collection: &str, fields: Fields) -> Result<String, StoreError> {
        let docs = self.collections.entry(collection.to_string()).or_default();
        let mut id = generate_id()?;
        while docs.contains_key(&id) {
            id = generate_id()?;
        }
        docs.insert(id.clone(), fields);
        Ok(id)
    }

    pub fn put(&mut self, collection: &str, id: &str, fields: Fields) {
        self.collections
            .entry(collection.to_string())
            .or_default()
            .insert(id.to_string(), fields);
    }

    pub fn update(&mut self, collection: &str, id: &str, fields: Fields) -> Result<(), StoreError> {
        match self
            .collections
            .get_mut(collection)
            .and_then(|docs| docs.get_mut(id))
        {
            Some(doc) => {
                doc.extend(fields);
                Ok(())
            }
            None => Err(not_found(collection, id)),
        }
    }

    pub fn delete(&mut self, collection: &str, id: &str) -> Result<(), StoreError> {
        match self
            .collections
            .get_mut(collection)
            .and_then(|docs| docs.remove(id))
        {
            Some(_) => Ok(()),
            None => Err(not_found(collection, id)),
        }
    }

    pub fn get(&self, collection: &str, id: &str) -> Option<Record> {
        self.collections
            .get(collection)
            .and_then(|docs| docs.get(id))
            .map(|fields| Record {
                id: id.to_string(),
                fields: fields.clone(),
            })
    }

    pub fn query(
        &self,
        collection: &str,
        field: &str,
        value: &FieldValue,
        order_by: Option<&OrderBy>,
    ) -> Vec<Record> {
        let mut records: Vec<Record> = self
            .collections
            .get(collection)
            .into_iter()
            .flat_map(|docs| docs.iter())
            .filter(|(_, fields)| fields.get(field) == Some(value))
            .map(|(id, fields)| Record {
                id: id.clone(),
                fields: fields.clone(),
            })
            .collect();

        if let Some(order) = order_by {
            records.sort_by(|a, b| compare_by(a, b, order));
        }
        records
    }
}

/// Sort tier of a field: timestamps, then text, then missing. Tiers never
/// swap with the direction, so odd records always sort last.
fn tier(value: Option<&FieldValue>) -> u8 {
    match value {
        Some(FieldValue::Timestamp(_)) => 0,
        Some(FieldValue::Text(_)) => 1,
        None => 2,
    }
}

/// Total order over records by `order.field`.
fn compare_by(a: &Record, b: &Record, order: &OrderBy) -> Ordering {
    let (x, y) = (a.fields.get(&order.field), b.fields.get(&order.field));
    tier(x).cmp(&tier(y)).then_with(|| {
        let ord = match (x, y) {
            (Some(FieldValue::Timestamp(x)), Some(FieldValue::Timestamp(y))) => x.cmp(y),
            (Some(FieldValue::Text(x)), Some(FieldValue::Text(y))) => x.cmp(y),
            _ => Ordering::Equal,
        };
        match order.direction {
            Direction::Ascending => ord,
            Direction::Descending => ord.reverse(),
        }
    })
}

fn not_found(collection: &str, id: &str) -> StoreError {
    StoreError::NotFound {
        collection: collection.to_string(),
        id: id.to_string(),
    }
}

/// A [`DocumentStore`] held entirely in memory.
#[derive(Debug, Default)]
pub struct MemoryStore {
    inner: RwLock<Collections>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl DocumentStore for MemoryStore {
    async fn create(&self, collection: &str, fields: Fields) -> Result<String, StoreError> {
        self.inner.write().await.create(collection, fields)
    }

    async fn put(&self, collection: &str, id: &str, fields: Fields) -> Result<(), StoreError> {
        self.inner.write().await.put(collection, id, fields);
        Ok(())
    }

    async fn update(&self, collection: &str, id: &str, fields: Fields) -> Result<(), StoreError> {
        self.inner.write().await.update(collection, id, fields)
    }

    async fn delete(&self, collection: &str, id: &str) -> Result<(), StoreError> {
        self.inner.write().await.delete(collection, id)
    }

    async fn get_by_id(&self, collection: &str, id: &str) -> Result<Option<Record>, StoreError> {
        Ok(self.inner.read().await.get(collection, id))
    }

    async fn query_by_field(
        &self,
        collection: &str,
        field: &str,
        value: &FieldValue,
        order_by: Option<OrderBy>,
    ) -> Result<Vec<Record>, StoreError> {
        Ok(self
            .inner
            .read()
            .await
            .query(collection, field, value, order_by.as_ref()))
    }
}

use std::{
    collections::HashMap,
    sync::{Arc, RwLock},
};

use async_trait::async_trait;
use chrono::NaiveDate;

use crate::error::StoreError;

/// Value bound to a filter condition.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    U64(u64),
    Str(String),
    Date(NaiveDate),
    Bool(bool),
}

impl From<u64> for FieldValue {
    fn from(v: u64) -> Self {
        FieldValue::U64(v)
    }
}

impl From<&str> for FieldValue {
    fn from(v: &str) -> Self {
        FieldValue::Str(v.to_string())
    }
}

impl From<String> for FieldValue {
    fn from(v: String) -> Self {
        FieldValue::Str(v)
    }
}

impl From<NaiveDate> for FieldValue {
    fn from(v: NaiveDate) -> Self {
        FieldValue::Date(v)
    }
}

impl From<bool> for FieldValue {
    fn from(v: bool) -> Self {
        FieldValue::Bool(v)
    }
}

/// Conjunction of `field = value` conditions, the equivalent of
/// `WHERE 1=1 AND a = ? AND b = ?`.
#[derive(Debug, Clone, Default)]
pub struct Filter {
    conditions: Vec<(&'static str, FieldValue)>,
}

impl Filter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn eq(mut self, field: &'static str, value: impl Into<FieldValue>) -> Self {
        self.conditions.push((field, value.into()));
        self
    }

    /// Adds the condition only when a value is present.
    pub fn eq_opt<V: Into<FieldValue>>(self, field: &'static str, value: Option<V>) -> Self {
        match value {
            Some(v) => self.eq(field, v),
            None => self,
        }
    }

    pub fn matches<T: Document>(&self, doc: &T) -> bool {
        self.conditions
            .iter()
            .all(|(field, expected)| doc.field(field).as_ref() == Some(expected))
    }
}

/// A record persisted in a [`DocumentStore`] collection.
pub trait Document: Clone + Send + Sync + 'static {
    const COLLECTION: &'static str;

    fn id(&self) -> u64;
    fn set_id(&mut self, id: u64);

    /// Key of the collection's unique index, if the document participates in one.
    fn unique_key(&self) -> Option<String> {
        None
    }

    /// Value of a filterable field; `None` for unknown or empty fields.
    fn field(&self, name: &str) -> Option<FieldValue>;
}

#[async_trait]
pub trait DocumentStore<T: Document>: Send + Sync {
    /// Inserts a new document and returns it with its assigned id.
    async fn create(&self, doc: T) -> Result<T, StoreError>;

    async fn find_by_id(&self, id: u64) -> Result<Option<T>, StoreError>;

    async fn find(&self, filter: &Filter) -> Result<Vec<T>, StoreError>;

    /// Replaces the stored document with the same id.
    async fn update(&self, doc: T) -> Result<T, StoreError>;

    /// Replaces the stored document only if it currently matches `guard`.
    /// Returns `None` when the guard did not match.
    async fn update_where(&self, doc: T, guard: &Filter) -> Result<Option<T>, StoreError>;

    /// Deletes the document only if it currently matches `guard`.
    /// Returns false when the guard did not match.
    async fn delete_where(&self, id: u64, guard: &Filter) -> Result<bool, StoreError>;
}

struct Collection<T> {
    next_id: u64,
    docs: HashMap<u64, T>,
    unique: HashMap<String, u64>,
}

impl<T> Default for Collection<T> {
    fn default() -> Self {
        Self {
            next_id: 1,
            docs: HashMap::new(),
            unique: HashMap::new(),
        }
    }
}

impl<T: Document> Collection<T> {
    fn check_unique(&self, doc: &T) -> Result<(), StoreError> {
        if let Some(key) = doc.unique_key() {
            match self.unique.get(&key) {
                Some(owner) if *owner != doc.id() => {
                    return Err(StoreError::UniqueViolation {
                        collection: T::COLLECTION,
                        key,
                    });
                }
                _ => {}
            }
        }
        Ok(())
    }

    fn replace(&mut self, doc: T) -> Result<T, StoreError> {
        let id = doc.id();
        let old_key = match self.docs.get(&id) {
            Some(existing) => existing.unique_key(),
            None => {
                return Err(StoreError::Missing {
                    collection: T::COLLECTION,
                    id,
                });
            }
        };
        self.check_unique(&doc)?;

        if let Some(old) = old_key {
            self.unique.remove(&old);
        }
        if let Some(key) = doc.unique_key() {
            self.unique.insert(key, id);
        }
        self.docs.insert(id, doc.clone());
        Ok(doc)
    }

    fn remove(&mut self, id: u64) -> bool {
        match self.docs.remove(&id) {
            Some(doc) => {
                if let Some(key) = doc.unique_key() {
                    self.unique.remove(&key);
                }
                true
            }
            None => false,
        }
    }
}

/// In-memory store with auto-increment ids and a unique index. Every
/// operation runs under one lock, so each write is atomic per document.
pub struct MemoryStore<T> {
    inner: RwLock<Collection<T>>,
}

impl<T> Default for MemoryStore<T> {
    fn default() -> Self {
        Self {
            inner: RwLock::new(Collection::default()),
        }
    }
}

impl<T: Document> MemoryStore<T> {
    pub fn new() -> Self {
        Self::default()
    }

    fn poisoned() -> StoreError {
        StoreError::Backend(format!("{} store lock poisoned", T::COLLECTION))
    }
}

#[async_trait]
impl<T: Document> DocumentStore<T> for MemoryStore<T> {
    async fn create(&self, mut doc: T) -> Result<T, StoreError> {
        let mut inner = self.inner.write().map_err(|_| Self::poisoned())?;

        let id = inner.next_id;
        doc.set_id(id);
        inner.check_unique(&doc)?;

        inner.next_id += 1;
        if let Some(key) = doc.unique_key() {
            inner.unique.insert(key, id);
        }
        inner.docs.insert(id, doc.clone());
        Ok(doc)
    }

    async fn find_by_id(&self, id: u64) -> Result<Option<T>, StoreError> {
        let inner = self.inner.read().map_err(|_| Self::poisoned())?;
        Ok(inner.docs.get(&id).cloned())
    }

    async fn find(&self, filter: &Filter) -> Result<Vec<T>, StoreError> {
        let inner = self.inner.read().map_err(|_| Self::poisoned())?;
        let mut found: Vec<T> = inner
            .docs
            .values()
            .filter(|doc| filter.matches(*doc))
            .cloned()
            .collect();
        found.sort_by_key(|doc| doc.id());
        Ok(found)
    }

    async fn update(&self, doc: T) -> Result<T, StoreError> {
        let mut inner = self.inner.write().map_err(|_| Self::poisoned())?;
        inner.replace(doc)
    }

    async fn update_where(&self, doc: T, guard: &Filter) -> Result<Option<T>, StoreError> {
        let mut inner = self.inner.write().map_err(|_| Self::poisoned())?;
        let matches = match inner.docs.get(&doc.id()) {
            Some(current) => guard.matches(current),
            None => {
                return Err(StoreError::Missing {
                    collection: T::COLLECTION,
                    id: doc.id(),
                });
            }
        };
        if !matches {
            return Ok(None);
        }
        inner.replace(doc).map(Some)
    }

    async fn delete_where(&self, id: u64, guard: &Filter) -> Result<bool, StoreError> {
        let mut inner = self.inner.write().map_err(|_| Self::poisoned())?;
        let matches = match inner.docs.get(&id) {
            Some(current) => guard.matches(current),
            None => {
                return Err(StoreError::Missing {
                    collection: T::COLLECTION,
                    id,
                });
            }
        };
        Ok(matches && inner.remove(id))
    }
}

pub fn init_db<T: Document>() -> Arc<dyn DocumentStore<T>> {
    Arc::new(MemoryStore::<T>::new())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, PartialEq)]
    struct Shift {
        id: u64,
        employee_id: u64,
        date: NaiveDate,
        status: String,
    }

    impl Document for Shift {
        const COLLECTION: &'static str = "shifts";

        fn id(&self) -> u64 {
            self.id
        }

        fn set_id(&mut self, id: u64) {
            self.id = id;
        }

        fn unique_key(&self) -> Option<String> {
            Some(format!("{}:{}", self.employee_id, self.date))
        }

        fn field(&self, name: &str) -> Option<FieldValue> {
            match name {
                "employee_id" => Some(self.employee_id.into()),
                "date" => Some(self.date.into()),
                "status" => Some(self.status.as_str().into()),
                _ => None,
            }
        }
    }

    fn shift(employee_id: u64, day: u32, status: &str) -> Shift {
        Shift {
            id: 0,
            employee_id,
            date: NaiveDate::from_ymd_opt(2026, 3, day).unwrap(),
            status: status.to_string(),
        }
    }

    #[tokio::test]
    async fn create_assigns_increasing_ids() {
        let store = MemoryStore::new();
        let a = store.create(shift(1, 2, "open")).await.unwrap();
        let b = store.create(shift(1, 3, "open")).await.unwrap();
        assert_eq!(a.id, 1);
        assert_eq!(b.id, 2);
    }

    #[tokio::test]
    async fn duplicate_unique_key_is_rejected() {
        let store = MemoryStore::new();
        store.create(shift(1, 2, "open")).await.unwrap();
        let err = store.create(shift(1, 2, "open")).await.unwrap_err();
        assert!(matches!(err, StoreError::UniqueViolation { .. }));

        // a failed insert does not burn the slot for other keys
        assert!(store.create(shift(2, 2, "open")).await.is_ok());
    }

    #[tokio::test]
    async fn find_filters_by_every_condition() {
        let store = MemoryStore::new();
        store.create(shift(1, 2, "open")).await.unwrap();
        store.create(shift(1, 3, "closed")).await.unwrap();
        store.create(shift(2, 2, "open")).await.unwrap();

        let filter = Filter::new().eq("employee_id", 1u64).eq("status", "open");
        let found = store.find(&filter).await.unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].date, NaiveDate::from_ymd_opt(2026, 3, 2).unwrap());

        let all = store.find(&Filter::new().eq_opt::<u64>("employee_id", None)).await.unwrap();
        assert_eq!(all.len(), 3);
    }

    #[tokio::test]
    async fn update_where_only_applies_when_guard_matches() {
        let store = MemoryStore::new();
        let mut doc = store.create(shift(1, 2, "open")).await.unwrap();
        doc.status = "closed".to_string();

        let guard = Filter::new().eq("status", "open");
        assert!(store.update_where(doc.clone(), &guard).await.unwrap().is_some());

        // second attempt sees "closed" and is refused
        assert!(store.update_where(doc, &guard).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn update_moving_onto_taken_key_conflicts() {
        let store = MemoryStore::new();
        store.create(shift(1, 2, "open")).await.unwrap();
        let mut second = store.create(shift(1, 3, "open")).await.unwrap();
        second.date = NaiveDate::from_ymd_opt(2026, 3, 2).unwrap();

        let err = store.update(second).await.unwrap_err();
        assert!(matches!(err, StoreError::UniqueViolation { .. }));
    }

    #[tokio::test]
    async fn delete_where_keeps_documents_that_moved_on() {
        let store = MemoryStore::new();
        let mut doc = store.create(shift(1, 2, "open")).await.unwrap();
        let guard = Filter::new().eq("status", "open");

        doc.status = "closed".to_string();
        store.update(doc.clone()).await.unwrap();
        assert!(!store.delete_where(doc.id, &guard).await.unwrap());
        assert!(store.find_by_id(doc.id).await.unwrap().is_some());

        let open = store.create(shift(1, 3, "open")).await.unwrap();
        assert!(store.delete_where(open.id, &guard).await.unwrap());
        assert!(matches!(
            store.delete_where(open.id, &guard).await,
            Err(StoreError::Missing { .. })
        ));
    }

    #[tokio::test]
    async fn delete_frees_unique_key() {
        let store = MemoryStore::new();
        let doc = store.create(shift(1, 2, "open")).await.unwrap();
        assert!(store.delete_where(doc.id, &Filter::new()).await.unwrap());
        assert!(store.find_by_id(doc.id).await.unwrap().is_none());
        assert!(store.create(shift(1, 2, "open")).await.is_ok());
    }
}

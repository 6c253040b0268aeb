use std::sync::{
    Arc,
    atomic::{AtomicUsize, Ordering},
};

use async_trait::async_trait;
use chrono::{NaiveDate, NaiveDateTime};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

use crate::{
    config::Config,
    context::{AppContext, Stores},
    db::{Document, DocumentStore, Filter, MemoryStore},
    directory::StaticDirectory,
    error::StoreError,
    model::{
        employee::{Employee, EmploymentStatus},
        role::Role,
    },
    utils::clock::FixedClock,
};

pub fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

pub fn at(y: i32, m: u32, d: u32, h: u32, min: u32) -> NaiveDateTime {
    date(y, m, d).and_hms_opt(h, min, 0).unwrap()
}

pub fn employee(id: u64, position: &str, role: Option<Role>, salary: Decimal) -> Employee {
    Employee {
        id,
        employee_code: format!("EMP{id:04}"),
        first_name: format!("First{id}"),
        last_name: format!("Last{id}"),
        email: format!("emp{id}@example.com"),
        position: position.to_string(),
        role,
        salary,
        status: EmploymentStatus::Active,
        hire_date: date(2022, 1, 10),
    }
}

/// Services over empty stores, a clock pinned to Monday 2026-03-02 08:45
/// and a small staff.
pub struct Fixture {
    pub ctx: AppContext,
    pub clock: FixedClock,
    pub directory: Arc<StaticDirectory>,
    pub alice: u64,
    pub bob: u64,
    pub hr: u64,
    pub intern: u64,
    pub admin: u64,
}

impl Fixture {
    pub fn new() -> Self {
        Self::with_stores(Stores::in_memory())
    }

    pub fn with_stores(stores: Stores) -> Self {
        let directory = Arc::new(StaticDirectory::new([
            employee(1, "Software Engineer", None, dec!(75000)),
            employee(2, "Accountant", None, dec!(60000)),
            employee(3, "HR Manager", Some(Role::Hr), dec!(90000)),
            employee(4, "HR Intern", None, dec!(30000)),
            employee(5, "admin", None, dec!(120000)),
        ]));
        let clock = FixedClock::new(at(2026, 3, 2, 8, 45));
        let ctx = AppContext::new(
            Config::default(),
            stores,
            directory.clone(),
            Arc::new(clock.clone()),
        );
        Self {
            ctx,
            clock,
            directory,
            alice: 1,
            bob: 2,
            hr: 3,
            intern: 4,
            admin: 5,
        }
    }
}

pub enum Fault<T> {
    /// `find` succeeds this many times, then fails.
    FindFailsAfter(usize),
    /// `find` sees nothing and `create` hits the unique index, as when a
    /// concurrent writer got there first.
    LostCreateRace,
    /// `find_by_id` returns this snapshot instead of the stored document.
    StaleRead(T),
}

/// Memory store that misbehaves in one scripted way.
pub struct FaultyStore<T> {
    inner: MemoryStore<T>,
    fault: Fault<T>,
    finds: AtomicUsize,
}

impl<T: Document> FaultyStore<T> {
    pub fn new(inner: MemoryStore<T>, fault: Fault<T>) -> Self {
        Self {
            inner,
            fault,
            finds: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl<T: Document> DocumentStore<T> for FaultyStore<T> {
    async fn create(&self, doc: T) -> Result<T, StoreError> {
        if let Fault::LostCreateRace = self.fault {
            return Err(StoreError::UniqueViolation {
                collection: T::COLLECTION,
                key: doc.unique_key().unwrap_or_default(),
            });
        }
        self.inner.create(doc).await
    }

    async fn find_by_id(&self, id: u64) -> Result<Option<T>, StoreError> {
        match &self.fault {
            Fault::StaleRead(snapshot) if snapshot.id() == id => Ok(Some(snapshot.clone())),
            _ => self.inner.find_by_id(id).await,
        }
    }

    async fn find(&self, filter: &Filter) -> Result<Vec<T>, StoreError> {
        match self.fault {
            Fault::FindFailsAfter(ok_calls) => {
                if self.finds.fetch_add(1, Ordering::SeqCst) >= ok_calls {
                    return Err(StoreError::Backend("connection reset".into()));
                }
                self.inner.find(filter).await
            }
            Fault::LostCreateRace => Ok(Vec::new()),
            Fault::StaleRead(_) => self.inner.find(filter).await,
        }
    }

    async fn update(&self, doc: T) -> Result<T, StoreError> {
        self.inner.update(doc).await
    }

    async fn update_where(&self, doc: T, guard: &Filter) -> Result<Option<T>, StoreError> {
        self.inner.update_where(doc, guard).await
    }

    async fn delete_where(&self, id: u64, guard: &Filter) -> Result<bool, StoreError> {
        self.inner.delete_where(id, guard).await
    }
}

use std::sync::Arc;

use async_trait::async_trait;
use moka::future::Cache;
use tracing::debug;

use crate::{
    config::Config, directory::EmployeeDirectory, error::HrmError, model::employee::Employee,
};

/// Read-through TTL cache in front of a slower employee directory.
/// Only found employees are cached; misses and failures always go upstream.
pub struct CachedDirectory {
    upstream: Arc<dyn EmployeeDirectory>,
    cache: Cache<u64, Employee>,
}

impl CachedDirectory {
    pub fn new(upstream: Arc<dyn EmployeeDirectory>, config: &Config) -> Self {
        let cache = Cache::builder()
            .max_capacity(config.directory_cache_capacity)
            .time_to_live(config.directory_cache_ttl)
            .build();
        Self { upstream, cache }
    }
}

#[async_trait]
impl EmployeeDirectory for CachedDirectory {
    async fn get_employee(&self, id: u64) -> Result<Option<Employee>, HrmError> {
        if let Some(hit) = self.cache.get(&id).await {
            debug!(employee_id = id, "Employee directory cache hit");
            return Ok(Some(hit));
        }

        let found = self.upstream.get_employee(id).await?;
        if let Some(employee) = &found {
            self.cache.insert(id, employee.clone()).await;
        }
        Ok(found)
    }
}

use std::sync::Arc;

use async_trait::async_trait;
use shared::domain::{MainCriterion, SubCriterion};
use tokio::sync::RwLock;
use tracing::debug;

use crate::transport::TransportError;

/// Source of the criteria taxonomy. Sub criteria come back with their
/// parent already resolved to an id.
#[async_trait]
pub trait CriteriaLookup: Send + Sync {
    async fn main_criteria(&self) -> Result<Vec<MainCriterion>, TransportError>;
    async fn sub_criteria(&self) -> Result<Vec<SubCriterion>, TransportError>;
}

/// Read-only cache over a [`CriteriaLookup`]. Each list is fetched on first
/// use and kept until [`CriteriaCache::invalidate`]; failed fetches are not
/// cached.
pub struct CriteriaCache {
    source: Arc<dyn CriteriaLookup>,
    main: RwLock<Option<Arc<Vec<MainCriterion>>>>,
    sub: RwLock<Option<Arc<Vec<SubCriterion>>>>,
}

impl CriteriaCache {
    pub fn new(source: Arc<dyn CriteriaLookup>) -> Arc<Self> {
        Arc::new(Self {
            source,
            main: RwLock::new(None),
            sub: RwLock::new(None),
        })
    }

    pub async fn main_criteria(&self) -> Result<Arc<Vec<MainCriterion>>, TransportError> {
        if let Some(cached) = self.main.read().await.as_ref() {
            return Ok(Arc::clone(cached));
        }
        let mut guard = self.main.write().await;
        if let Some(cached) = guard.as_ref() {
            return Ok(Arc::clone(cached));
        }
        let fetched = Arc::new(self.source.main_criteria().await?);
        debug!(count = fetched.len(), "main criteria loaded");
        *guard = Some(Arc::clone(&fetched));
        Ok(fetched)
    }

    pub async fn all_sub_criteria(&self) -> Result<Arc<Vec<SubCriterion>>, TransportError> {
        if let Some(cached) = self.sub.read().await.as_ref() {
            return Ok(Arc::clone(cached));
        }
        let mut guard = self.sub.write().await;
        if let Some(cached) = guard.as_ref() {
            return Ok(Arc::clone(cached));
        }
        let fetched = Arc::new(self.source.sub_criteria().await?);
        debug!(count = fetched.len(), "sub criteria loaded");
        *guard = Some(Arc::clone(&fetched));
        Ok(fetched)
    }

    /// Sub criteria under `main_id`. A blank id matches nothing and does not
    /// hit the source.
    pub async fn sub_criteria_for(&self, main_id: &str) -> Result<Vec<SubCriterion>, TransportError> {
        if main_id.trim().is_empty() {
            return Ok(Vec::new());
        }
        let all = self.all_sub_criteria().await?;
        Ok(filter_sub_criteria(&all, main_id))
    }

    pub async fn main_name(&self, id: &str) -> Option<String> {
        let main = self.main_criteria().await.ok()?;
        main.iter()
            .find(|criterion| criterion.id.as_str() == id)
            .map(|criterion| criterion.name.clone())
    }

    pub async fn sub_name(&self, id: &str) -> Option<String> {
        let sub = self.all_sub_criteria().await.ok()?;
        sub.iter()
            .find(|criterion| criterion.id.as_str() == id)
            .map(|criterion| criterion.name.clone())
    }

    pub async fn invalidate(&self) {
        *self.main.write().await = None;
        *self.sub.write().await = None;
    }
}

pub fn filter_sub_criteria(all: &[SubCriterion], main_id: &str) -> Vec<SubCriterion> {
    let main_id = main_id.trim();
    if main_id.is_empty() {
        return Vec::new();
    }
    all.iter()
        .filter(|sub| sub.main_criterion_id.as_str() == main_id)
        .cloned()
        .collect()
}

#[cfg(test)]
#[path = "tests/criteria_tests.rs"]
mod tests;

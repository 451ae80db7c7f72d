//! Request-scoped state threaded explicitly through the repository contract.

use std::future::Future;
use std::time::Duration;

use tokio::time::Instant;

use crate::cache::CacheMetadata;
use crate::error::{LineageError, Result};

/// Per-request state: the bypass flag, the cache outcome and an optional deadline.
///
/// The bypass flag is fixed at construction. Cache metadata is only written by
/// the cache-aside layer and read back by the caller once the call returns.
#[derive(Debug, Default)]
pub struct RequestContext {
    bypass_cache: bool,
    metadata: CacheMetadata,
    deadline: Option<Instant>,
}

impl RequestContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Context whose cached operations skip the cache read but still refresh it.
    pub fn force_refresh() -> Self {
        Self {
            bypass_cache: true,
            ..Self::default()
        }
    }

    pub fn with_bypass(mut self, bypass: bool) -> Self {
        self.bypass_cache = bypass;
        self
    }

    pub fn with_deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(deadline);
        self
    }

    pub fn with_timeout(self, timeout: Duration) -> Self {
        self.with_deadline(Instant::now() + timeout)
    }

    pub fn bypass_cache(&self) -> bool {
        self.bypass_cache
    }

    pub fn metadata(&self) -> &CacheMetadata {
        &self.metadata
    }

    pub(crate) fn metadata_mut(&mut self) -> &mut CacheMetadata {
        &mut self.metadata
    }

    pub fn into_metadata(self) -> CacheMetadata {
        self.metadata
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Fail fast when the deadline has already passed.
    pub fn check_deadline(&self) -> Result<()> {
        match self.deadline {
            Some(deadline) if Instant::now() >= deadline => {
                Err(LineageError::Cancelled("deadline exceeded".to_string()))
            }
            _ => Ok(()),
        }
    }

    /// Run `fut` under this request's deadline, if any.
    pub async fn run<F, T>(&self, fut: F) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        match self.deadline {
            Some(deadline) => tokio::time::timeout_at(deadline, fut)
                .await
                .map_err(|_| LineageError::Cancelled("deadline exceeded".to_string()))?,
            None => fut.await,
        }
    }
}

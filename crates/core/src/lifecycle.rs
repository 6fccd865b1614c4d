use crate::models::IndexDescriptor;
use crate::traits::IndexAdmin;
use crate::StoreError;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::{debug, info, warn};

pub const DEFAULT_DELETION_GRACE: Duration = Duration::from_secs(5);
pub const DEFAULT_READY_POLL_INTERVAL: Duration = Duration::from_secs(1);
pub const DEFAULT_READY_POLL_ATTEMPTS: usize = 60;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexState {
    Unknown,
    Absent,
    Creating,
    Ready,
    Deleting,
}

/// Drives the one vector index through `absent -> creating -> ready`, and
/// `ready -> deleting -> absent -> creating -> ready` for a full retrain.
pub struct IndexLifecycleManager<A> {
    admin: Arc<A>,
    grace_period: Duration,
    ready_poll_interval: Duration,
    ready_poll_attempts: usize,
    state: Mutex<IndexState>,
    resolved: tokio::sync::Mutex<Option<IndexDescriptor>>,
}

impl<A> IndexLifecycleManager<A>
where
    A: IndexAdmin,
{
    pub fn new(admin: Arc<A>) -> Self {
        Self {
            admin,
            grace_period: DEFAULT_DELETION_GRACE,
            ready_poll_interval: DEFAULT_READY_POLL_INTERVAL,
            ready_poll_attempts: DEFAULT_READY_POLL_ATTEMPTS,
            state: Mutex::new(IndexState::Unknown),
            resolved: tokio::sync::Mutex::new(None),
        }
    }

    pub fn with_grace_period(mut self, grace_period: Duration) -> Self {
        self.grace_period = grace_period;
        self
    }

    /// How often, and how many times, to ask the store whether a new index is ready.
    pub fn with_readiness_polling(mut self, interval: Duration, attempts: usize) -> Self {
        self.ready_poll_interval = interval;
        self.ready_poll_attempts = attempts.max(1);
        self
    }

    pub fn state(&self) -> IndexState {
        *self
            .state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn set_state(&self, next: IndexState) {
        *self
            .state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = next;
    }

    /// Creates the index when absent. An existing index with the same
    /// dimension, or a create that loses a race, both count as success once
    /// the store reports the index ready.
    pub async fn ensure_exists(
        &self,
        name: &str,
        dimension: usize,
        force_recreate: bool,
    ) -> Result<bool, StoreError> {
        if force_recreate {
            self.recreate_for_full_retrain(name, dimension).await?;
            return Ok(true);
        }

        match self.admin.describe_index(name).await? {
            Some(existing) => {
                if existing.dimension != dimension {
                    return Err(StoreError::DimensionMismatch {
                        expected: existing.dimension,
                        actual: dimension,
                    });
                }
                if !existing.ready {
                    self.set_state(IndexState::Creating);
                    self.wait_until_ready(name).await?;
                }
                self.set_state(IndexState::Ready);
                Ok(true)
            }
            None => {
                self.set_state(IndexState::Absent);
                self.create(name, dimension).await?;
                Ok(true)
            }
        }
    }

    pub async fn recreate_for_full_retrain(
        &self,
        name: &str,
        dimension: usize,
    ) -> Result<(), StoreError> {
        let mut resolved = self.resolved.lock().await;
        *resolved = None;

        self.set_state(IndexState::Deleting);
        info!(index = name, "deleting index for full retrain");
        if let Err(error) = self.admin.delete_index(name).await {
            self.set_state(IndexState::Unknown);
            return Err(error);
        }

        // Deletion completes asynchronously on the store side.
        tokio::time::sleep(self.grace_period).await;
        self.set_state(IndexState::Absent);

        self.create(name, dimension).await?;
        *resolved = Some(IndexDescriptor::cosine(name, dimension));
        Ok(())
    }

    /// Lazily ensures the index once per manager and caches its descriptor.
    pub async fn resolve(
        &self,
        name: &str,
        dimension: usize,
    ) -> Result<IndexDescriptor, StoreError> {
        let mut resolved = self.resolved.lock().await;
        if let Some(descriptor) = resolved.as_ref() {
            return Ok(descriptor.clone());
        }

        self.ensure_exists(name, dimension, false).await?;
        let descriptor = IndexDescriptor::cosine(name, dimension);
        *resolved = Some(descriptor.clone());
        Ok(descriptor)
    }

    async fn create(&self, name: &str, dimension: usize) -> Result<(), StoreError> {
        self.set_state(IndexState::Creating);
        let descriptor = IndexDescriptor::cosine(name, dimension);

        match self.admin.create_index(&descriptor).await {
            Ok(()) => info!(index = name, dimension, "created index"),
            Err(StoreError::AlreadyExists(details)) => {
                warn!(index = name, %details, "index already exists, treating as created");
            }
            Err(error) => {
                self.set_state(IndexState::Unknown);
                return Err(error);
            }
        }

        self.wait_until_ready(name).await?;
        self.set_state(IndexState::Ready);
        Ok(())
    }

    /// State stays `Creating` on timeout; the next `resolve` checks again.
    async fn wait_until_ready(&self, name: &str) -> Result<(), StoreError> {
        for attempt in 1..=self.ready_poll_attempts {
            match self.admin.describe_index(name).await? {
                Some(descriptor) if descriptor.ready => return Ok(()),
                _ => debug!(index = name, attempt, "index not ready yet"),
            }
            if attempt < self.ready_poll_attempts {
                tokio::time::sleep(self.ready_poll_interval).await;
            }
        }

        Err(StoreError::NotReady(format!(
            "index {name} not ready after {} checks",
            self.ready_poll_attempts
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::IndexStats;
    use async_trait::async_trait;

    /// Records every control-plane call. A successful create makes the index
    /// visible, reported as not ready for the first `not_ready_checks` describes.
    struct ScriptedAdmin {
        existing: Mutex<Option<IndexDescriptor>>,
        create_result: fn() -> Result<(), StoreError>,
        not_ready_checks: Mutex<usize>,
        delete_fails: bool,
        calls: Mutex<Vec<String>>,
    }

    impl ScriptedAdmin {
        fn new(
            existing: Option<IndexDescriptor>,
            create_result: fn() -> Result<(), StoreError>,
        ) -> Self {
            Self {
                existing: Mutex::new(existing),
                create_result,
                not_ready_checks: Mutex::new(0),
                delete_fails: false,
                calls: Mutex::new(Vec::new()),
            }
        }

        fn not_ready_for(mut self, checks: usize) -> Self {
            self.not_ready_checks = Mutex::new(checks);
            self
        }

        fn failing_deletes(mut self) -> Self {
            self.delete_fails = true;
            self
        }

        fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl IndexAdmin for ScriptedAdmin {
        async fn describe_index(&self, name: &str) -> Result<Option<IndexDescriptor>, StoreError> {
            self.calls.lock().unwrap().push(format!("describe {name}"));
            let mut described = self.existing.lock().unwrap().clone();
            if let Some(descriptor) = described.as_mut() {
                let mut pending = self.not_ready_checks.lock().unwrap();
                if *pending > 0 {
                    *pending -= 1;
                    descriptor.ready = false;
                }
            }
            Ok(described)
        }

        async fn create_index(&self, descriptor: &IndexDescriptor) -> Result<(), StoreError> {
            self.calls
                .lock()
                .unwrap()
                .push(format!("create {} {}", descriptor.name, descriptor.dimension));
            let result = (self.create_result)();
            if matches!(result, Ok(()) | Err(StoreError::AlreadyExists(_))) {
                let mut existing = self.existing.lock().unwrap();
                if existing.is_none() {
                    *existing = Some(descriptor.clone());
                }
            }
            result
        }

        async fn delete_index(&self, name: &str) -> Result<(), StoreError> {
            self.calls.lock().unwrap().push(format!("delete {name}"));
            if self.delete_fails {
                return Err(StoreError::BackendResponse {
                    backend: "pinecone".to_string(),
                    details: "500 Internal Server Error".to_string(),
                });
            }
            *self.existing.lock().unwrap() = None;
            Ok(())
        }

        async fn describe_stats(&self) -> Result<IndexStats, StoreError> {
            Ok(IndexStats::default())
        }
    }

    fn manager(admin: &Arc<ScriptedAdmin>) -> IndexLifecycleManager<ScriptedAdmin> {
        IndexLifecycleManager::new(Arc::clone(admin))
            .with_grace_period(Duration::ZERO)
            .with_readiness_polling(Duration::ZERO, 5)
    }

    #[tokio::test]
    async fn absent_index_is_created_with_cosine_metric() {
        let admin = Arc::new(ScriptedAdmin::new(None, || Ok(())));
        let manager = manager(&admin);

        assert!(manager.ensure_exists("docs", 3072, false).await.unwrap());
        assert_eq!(
            admin.calls(),
            vec!["describe docs", "create docs 3072", "describe docs"]
        );
        assert_eq!(manager.state(), IndexState::Ready);
    }

    #[tokio::test]
    async fn existing_index_is_left_alone() {
        let admin = Arc::new(ScriptedAdmin::new(
            Some(IndexDescriptor::cosine("docs", 3072)),
            || panic!("create must not be called"),
        ));
        let manager = manager(&admin);

        assert!(manager.ensure_exists("docs", 3072, false).await.unwrap());
        assert!(manager.ensure_exists("docs", 3072, false).await.unwrap());
        assert_eq!(admin.calls(), vec!["describe docs", "describe docs"]);
    }

    #[tokio::test]
    async fn new_index_is_ready_only_after_the_store_says_so() {
        let admin = Arc::new(ScriptedAdmin::new(None, || Ok(())).not_ready_for(2));
        let manager = manager(&admin);

        assert!(manager.ensure_exists("docs", 3072, false).await.unwrap());
        assert_eq!(
            admin.calls(),
            vec![
                "describe docs",
                "create docs 3072",
                "describe docs",
                "describe docs",
                "describe docs"
            ]
        );
        assert_eq!(manager.state(), IndexState::Ready);
    }

    #[tokio::test]
    async fn index_that_never_becomes_ready_times_out() {
        let admin = Arc::new(ScriptedAdmin::new(None, || Ok(())).not_ready_for(10));
        let manager = manager(&admin);

        let result = manager.ensure_exists("docs", 3072, false).await;

        assert!(matches!(result, Err(StoreError::NotReady(_))));
        assert_eq!(manager.state(), IndexState::Creating);
        // one existence check, one create, five readiness checks
        assert_eq!(admin.calls().len(), 7);
    }

    #[tokio::test]
    async fn existing_index_still_provisioning_is_waited_for() {
        let admin = Arc::new(
            ScriptedAdmin::new(Some(IndexDescriptor::cosine("docs", 3072)), || {
                panic!("create must not be called")
            })
            .not_ready_for(1),
        );
        let manager = manager(&admin);

        assert!(manager.ensure_exists("docs", 3072, false).await.unwrap());
        assert_eq!(admin.calls(), vec!["describe docs", "describe docs"]);
        assert_eq!(manager.state(), IndexState::Ready);
    }

    #[tokio::test]
    async fn already_exists_on_create_counts_as_success() {
        let admin = Arc::new(ScriptedAdmin::new(None, || {
            Err(StoreError::AlreadyExists("ALREADY_EXISTS".to_string()))
        }));
        let manager = manager(&admin);

        assert!(manager.ensure_exists("docs", 3072, false).await.unwrap());
        assert_eq!(manager.state(), IndexState::Ready);
    }

    #[tokio::test]
    async fn other_create_failures_propagate() {
        let admin = Arc::new(ScriptedAdmin::new(None, || {
            Err(StoreError::BackendResponse {
                backend: "pinecone".to_string(),
                details: "500".to_string(),
            })
        }));
        let manager = manager(&admin);

        assert!(manager.ensure_exists("docs", 3072, false).await.is_err());
        assert_eq!(manager.state(), IndexState::Unknown);
    }

    #[tokio::test]
    async fn existing_index_with_other_dimension_is_fatal() {
        let admin = Arc::new(ScriptedAdmin::new(
            Some(IndexDescriptor::cosine("docs", 1536)),
            || Ok(()),
        ));
        let manager = manager(&admin);

        let result = manager.ensure_exists("docs", 3072, false).await;
        assert!(matches!(
            result,
            Err(StoreError::DimensionMismatch {
                expected: 1536,
                actual: 3072
            })
        ));
    }

    #[tokio::test]
    async fn full_retrain_deletes_before_creating() {
        let admin = Arc::new(ScriptedAdmin::new(
            Some(IndexDescriptor::cosine("docs", 3072)),
            || Ok(()),
        ));
        let manager = manager(&admin);

        manager.recreate_for_full_retrain("docs", 3072).await.unwrap();
        assert_eq!(
            admin.calls(),
            vec!["delete docs", "create docs 3072", "describe docs"]
        );
        assert_eq!(manager.state(), IndexState::Ready);

        assert!(manager.ensure_exists("docs", 3072, true).await.unwrap());
        assert_eq!(admin.calls().len(), 6);
    }

    #[tokio::test]
    async fn failed_delete_leaves_state_unknown() {
        let admin = Arc::new(
            ScriptedAdmin::new(Some(IndexDescriptor::cosine("docs", 3072)), || Ok(()))
                .failing_deletes(),
        );
        let manager = manager(&admin);

        let result = manager.recreate_for_full_retrain("docs", 3072).await;

        assert!(matches!(result, Err(StoreError::BackendResponse { .. })));
        assert_eq!(manager.state(), IndexState::Unknown);
        assert_eq!(admin.calls(), vec!["delete docs"]);
    }

    #[tokio::test]
    async fn resolve_checks_the_store_only_once() {
        let admin = Arc::new(ScriptedAdmin::new(None, || Ok(())));
        let manager = manager(&admin);

        let first = manager.resolve("docs", 8).await.unwrap();
        let second = manager.resolve("docs", 8).await.unwrap();

        assert_eq!(first, second);
        assert_eq!(
            admin.calls(),
            vec!["describe docs", "create docs 8", "describe docs"]
        );
    }
}

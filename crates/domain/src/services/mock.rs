//! In-memory implementations of the cloud collaborators.
//!
//! Used for development dry runs and for testing the components without
//! network access.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};

use crate::error::ArchiveError;
use crate::models::{BlobRecord, ExportProgress, ExportRequest, ExportStatus, OperationHandle};
use crate::services::clock::Clock;
use crate::services::identity::{
    AccessToken, IdentityProvider, Session, SessionIdentity, Subscription, UserIdentity,
};
use crate::services::sql_export::SqlExportService;
use crate::services::storage::{BlobStore, ContainerCreation};

const SYSTEM_TOKEN: &str = "mock-token-system";

/// Clock frozen at a fixed instant.
#[derive(Debug, Clone, Copy)]
pub struct FixedClock {
    now: DateTime<Utc>,
}

impl FixedClock {
    pub fn new(now: DateTime<Utc>) -> Self {
        Self { now }
    }
}

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        self.now
    }
}

/// Session bound to a fake subscription, for driving components directly.
pub fn test_session() -> Session {
    Session {
        token: AccessToken::new(SYSTEM_TOKEN),
        subscription: Subscription {
            subscription_id: "sub-test".to_string(),
            tenant_id: None,
            display_name: None,
        },
        identity: SessionIdentity::System,
    }
}

#[derive(Debug, Clone)]
struct MockUserIdentity {
    resource_group: String,
    name: String,
    client_id: String,
    subscription_id: String,
}

/// Identity provider with a system identity and optional user identities.
#[derive(Debug, Default)]
pub struct MockIdentityProvider {
    subscription_id: String,
    users: Vec<MockUserIdentity>,
    fail_authentication: bool,
    token_requests: Mutex<Vec<Option<String>>>,
}

impl MockIdentityProvider {
    /// System identity bound to `subscription_id`.
    pub fn new(subscription_id: &str) -> Self {
        Self {
            subscription_id: subscription_id.to_string(),
            ..Default::default()
        }
    }

    /// Provider whose ambient identity cannot authenticate.
    pub fn failing() -> Self {
        Self {
            fail_authentication: true,
            ..Default::default()
        }
    }

    pub fn with_user_identity(
        mut self,
        resource_group: &str,
        name: &str,
        client_id: &str,
        subscription_id: &str,
    ) -> Self {
        self.users.push(MockUserIdentity {
            resource_group: resource_group.to_string(),
            name: name.to_string(),
            client_id: client_id.to_string(),
            subscription_id: subscription_id.to_string(),
        });
        self
    }

    /// Client ids tokens were requested for, in order (`None` = system).
    pub fn token_requests(&self) -> Vec<Option<String>> {
        self.token_requests.lock().unwrap().clone()
    }
}

#[async_trait::async_trait]
impl IdentityProvider for MockIdentityProvider {
    async fn acquire_token(&self, client_id: Option<&str>) -> Result<AccessToken, ArchiveError> {
        self.token_requests
            .lock()
            .unwrap()
            .push(client_id.map(str::to_string));

        if self.fail_authentication {
            return Err(ArchiveError::Authentication(
                "Mock: ambient identity unavailable".to_string(),
            ));
        }

        match client_id {
            None => Ok(AccessToken::new(SYSTEM_TOKEN)),
            Some(id) => Ok(AccessToken::new(format!("mock-token-{}", id))),
        }
    }

    async fn resolve_subscription(&self, token: &AccessToken) -> Result<Subscription, ArchiveError> {
        let subscription_id = if token.token.expose() == SYSTEM_TOKEN {
            self.subscription_id.clone()
        } else {
            self.users
                .iter()
                .find(|u| token.token.expose() == format!("mock-token-{}", u.client_id))
                .map(|u| u.subscription_id.clone())
                .ok_or_else(|| {
                    ArchiveError::Authentication("Mock: token has no subscription".to_string())
                })?
        };

        Ok(Subscription {
            subscription_id,
            tenant_id: None,
            display_name: None,
        })
    }

    async fn find_user_identity(
        &self,
        _token: &AccessToken,
        _subscription_id: &str,
        resource_group: &str,
        name: &str,
    ) -> Result<UserIdentity, ArchiveError> {
        self.users
            .iter()
            .find(|u| u.resource_group == resource_group && u.name == name)
            .map(|u| UserIdentity {
                name: u.name.clone(),
                client_id: u.client_id.clone(),
                principal_id: None,
            })
            .ok_or_else(|| {
                ArchiveError::IdentityNotFound(format!(
                    "'{}' in resource group '{}'",
                    name, resource_group
                ))
            })
    }
}

/// Blob store kept in memory. Blobs are listed in name order.
#[derive(Debug)]
pub struct InMemoryBlobStore {
    account: String,
    containers: Mutex<BTreeMap<String, BTreeMap<String, BlobRecord>>>,
    failing_deletes: HashSet<String>,
    deny_access: bool,
    create_calls: AtomicUsize,
}

impl Default for InMemoryBlobStore {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryBlobStore {
    pub fn new() -> Self {
        Self {
            account: "mockaccount".to_string(),
            containers: Mutex::new(BTreeMap::new()),
            failing_deletes: HashSet::new(),
            deny_access: false,
            create_calls: AtomicUsize::new(0),
        }
    }

    pub fn with_container(self, container: &str) -> Self {
        self.containers
            .lock()
            .unwrap()
            .entry(container.to_string())
            .or_default();
        self
    }

    /// Every operation fails as if the account key were wrong.
    pub fn denying_access(mut self) -> Self {
        self.deny_access = true;
        self
    }

    /// Deleting `blob` fails.
    pub fn failing_delete(mut self, blob: &str) -> Self {
        self.failing_deletes.insert(blob.to_string());
        self
    }

    pub fn put_blob(&self, container: &str, blob: BlobRecord) {
        self.containers
            .lock()
            .unwrap()
            .entry(container.to_string())
            .or_default()
            .insert(blob.name.clone(), blob);
    }

    pub fn blob_names(&self, container: &str) -> Vec<String> {
        self.containers
            .lock()
            .unwrap()
            .get(container)
            .map(|blobs| blobs.keys().cloned().collect())
            .unwrap_or_default()
    }

    pub fn create_calls(&self) -> usize {
        self.create_calls.load(Ordering::SeqCst)
    }

    fn check_access(&self) -> Result<(), ArchiveError> {
        if self.deny_access {
            Err(ArchiveError::StorageAccess(
                "Mock: authorization failure".to_string(),
            ))
        } else {
            Ok(())
        }
    }
}

#[async_trait::async_trait]
impl BlobStore for InMemoryBlobStore {
    async fn container_exists(&self, container: &str) -> Result<bool, ArchiveError> {
        self.check_access()?;
        Ok(self.containers.lock().unwrap().contains_key(container))
    }

    async fn create_container(&self, container: &str) -> Result<ContainerCreation, ArchiveError> {
        self.check_access()?;
        self.create_calls.fetch_add(1, Ordering::SeqCst);

        let mut containers = self.containers.lock().unwrap();
        if containers.contains_key(container) {
            return Ok(ContainerCreation::AlreadyExists);
        }
        containers.insert(container.to_string(), BTreeMap::new());
        Ok(ContainerCreation::Created)
    }

    async fn list_blobs(&self, container: &str) -> Result<Vec<BlobRecord>, ArchiveError> {
        self.check_access()?;
        self.containers
            .lock()
            .unwrap()
            .get(container)
            .map(|blobs| blobs.values().cloned().collect())
            .ok_or_else(|| {
                ArchiveError::StorageAccess(format!("Mock: container '{}' not found", container))
            })
    }

    async fn delete_blob(&self, container: &str, blob: &str) -> Result<(), ArchiveError> {
        self.check_access()?;
        if self.failing_deletes.contains(blob) {
            return Err(ArchiveError::BlobDeletion {
                blob: blob.to_string(),
                message: "Mock: blob is leased".to_string(),
            });
        }

        let mut containers = self.containers.lock().unwrap();
        match containers.get_mut(container).and_then(|b| b.remove(blob)) {
            Some(_) => Ok(()),
            None => Err(ArchiveError::BlobDeletion {
                blob: blob.to_string(),
                message: "Mock: blob not found".to_string(),
            }),
        }
    }

    fn container_url(&self, container: &str) -> String {
        format!("https://{}.blob.core.windows.net/{}", self.account, container)
    }
}

/// Where accepted exports drop their archive file.
struct ExportSink {
    store: Arc<InMemoryBlobStore>,
    container: String,
    clock: Arc<dyn Clock>,
}

/// SQL export service that records requests and reports scripted statuses.
///
/// By default every export is accepted and reported `InProgress`.
#[derive(Default)]
pub struct MockSqlExportService {
    rejected: HashSet<String>,
    failing: HashMap<String, String>,
    complete_after: Option<usize>,
    status_unavailable: bool,
    sink: Option<ExportSink>,
    requests: Mutex<Vec<ExportRequest>>,
    operations: Mutex<HashMap<String, String>>,
    queries_per_operation: Mutex<HashMap<String, usize>>,
    status_queries: AtomicUsize,
}

impl MockSqlExportService {
    pub fn new() -> Self {
        Self::default()
    }

    /// Submissions for `database` are rejected.
    pub fn rejecting(mut self, database: &str) -> Self {
        self.rejected.insert(database.to_string());
        self
    }

    /// Exports of `database` report `Failed` with `message`.
    pub fn failing_status(mut self, database: &str, message: &str) -> Self {
        self.failing
            .insert(database.to_string(), message.to_string());
        self
    }

    /// Every export reports `Succeeded` on its `n`-th status query.
    pub fn completing_after(mut self, n: usize) -> Self {
        self.complete_after = Some(n);
        self
    }

    /// Status queries fail.
    pub fn status_unavailable(mut self) -> Self {
        self.status_unavailable = true;
        self
    }

    /// Accepted exports write their blob into `container` of `store`,
    /// stamped with `clock`.
    pub fn writing_to(
        mut self,
        store: Arc<InMemoryBlobStore>,
        container: &str,
        clock: Arc<dyn Clock>,
    ) -> Self {
        self.sink = Some(ExportSink {
            store,
            container: container.to_string(),
            clock,
        });
        self
    }

    pub fn requests(&self) -> Vec<ExportRequest> {
        self.requests.lock().unwrap().clone()
    }

    /// Target blob URIs of all submissions, in order.
    pub fn submitted_uris(&self) -> Vec<String> {
        self.requests()
            .into_iter()
            .map(|r| r.storage_uri)
            .collect()
    }

    pub fn status_queries(&self) -> usize {
        self.status_queries.load(Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl SqlExportService for MockSqlExportService {
    async fn submit_export(
        &self,
        _session: &Session,
        request: &ExportRequest,
    ) -> Result<OperationHandle, ArchiveError> {
        let index = {
            let mut requests = self.requests.lock().unwrap();
            requests.push(request.clone());
            requests.len()
        };

        if self.rejected.contains(&request.database_name) {
            return Err(ArchiveError::ExportSubmission {
                database: request.database_name.clone(),
                message: "Mock: database not found".to_string(),
            });
        }

        if let Some(sink) = &self.sink {
            let blob_name = request
                .storage_uri
                .rsplit('/')
                .next()
                .unwrap_or_default()
                .to_string();
            sink.store
                .put_blob(&sink.container, BlobRecord::new(blob_name, sink.clock.now()));
        }

        let handle = format!("mock-operation-{}", index);
        self.operations
            .lock()
            .unwrap()
            .insert(handle.clone(), request.database_name.clone());

        Ok(OperationHandle(handle))
    }

    async fn export_status(
        &self,
        _session: &Session,
        operation: &OperationHandle,
    ) -> Result<ExportProgress, ArchiveError> {
        self.status_queries.fetch_add(1, Ordering::SeqCst);

        let database = self
            .operations
            .lock()
            .unwrap()
            .get(&operation.0)
            .cloned()
            .unwrap_or_default();

        if self.status_unavailable {
            return Err(ArchiveError::ExportStatusQuery {
                operation: operation.to_string(),
                message: "Mock: status endpoint unavailable".to_string(),
            });
        }

        if let Some(message) = self.failing.get(&database) {
            return Ok(ExportProgress::failed(message.clone()));
        }

        let queries = {
            let mut counts = self.queries_per_operation.lock().unwrap();
            let count = counts.entry(operation.0.clone()).or_insert(0);
            *count += 1;
            *count
        };

        match self.complete_after {
            Some(n) if queries >= n => Ok(ExportProgress::new(ExportStatus::Succeeded)),
            _ => Ok(ExportProgress::new(ExportStatus::InProgress)),
        }
    }
}

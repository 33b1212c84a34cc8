//! Domain services for the bacpac archiver.
//!
//! Traits describe the cloud collaborators; the remaining modules sequence
//! them into an archive run.

pub mod clock;
pub mod export_driver;
pub mod identity;
pub mod mock;
pub mod pipeline;
pub mod provisioner;
pub mod retention;
pub mod sql_export;
pub mod storage;

pub use clock::{Clock, SystemClock};
pub use export_driver::{ExportDriver, ExportOptions};
pub use identity::{
    resolve_session, AccessToken, IdentityProvider, Session, SessionIdentity, Subscription,
    UserIdentity,
};
pub use mock::{FixedClock, InMemoryBlobStore, MockIdentityProvider, MockSqlExportService};
pub use pipeline::{ArchivePipeline, RunOptions};
pub use provisioner::{ensure_container, ProvisionOutcome};
pub use retention::enforce_retention;
pub use sql_export::SqlExportService;
pub use storage::{BlobStore, ContainerCreation};

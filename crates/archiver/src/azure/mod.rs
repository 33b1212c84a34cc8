//! REST clients for the cloud services an archive run talks to.
//!
//! Each client implements one of the domain collaborator traits and maps
//! [`AzureError`] into the run's error taxonomy.

pub mod blob;
pub mod error;
pub mod identity;
pub mod management;
pub mod shared_key;
pub mod sql;

pub use blob::BlobServiceClient;
pub use error::AzureError;
pub use identity::ManagedIdentityClient;
pub use management::ManagementClient;
pub use sql::SqlExportClient;

use std::time::Duration;

use reqwest::{Client, RequestBuilder, Response};

use crate::config::AzureConfig;

pub(crate) const CLIENT_REQUEST_ID: &str = "x-ms-client-request-id";

pub(crate) fn http_client(config: &AzureConfig) -> Result<Client, AzureError> {
    Client::builder()
        .timeout(Duration::from_secs(config.request_timeout_secs))
        .user_agent(concat!("bacpac-archiver/", env!("CARGO_PKG_VERSION")))
        .build()
        .map_err(AzureError::Http)
}

pub(crate) fn new_request_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

/// Sends a request once. The response is returned as is, success or not.
pub(crate) async fn send(request: RequestBuilder) -> Result<Response, AzureError> {
    request.send().await.map_err(AzureError::Http)
}

//! Blob service client authorized with the storage account key.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use domain::models::BlobRecord;
use domain::services::{BlobStore, ContainerCreation};
use domain::ArchiveError;
use reqwest::header::{AUTHORIZATION, CONTENT_LENGTH};
use reqwest::{Client, Method, RequestBuilder, Response, StatusCode, Url};
use serde::Deserialize;
use shared::secret::Secret;
use tracing::{debug, warn};

use super::{http_client, new_request_id, shared_key, AzureError, CLIENT_REQUEST_ID};
use crate::config::AzureConfig;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct ContainerEnumeration {
    #[serde(default)]
    containers: ContainerList,
}

#[derive(Debug, Default, Deserialize)]
struct ContainerList {
    #[serde(rename = "Container", default)]
    items: Vec<ContainerItem>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct ContainerItem {
    name: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct BlobEnumeration {
    #[serde(default)]
    blobs: BlobList,
    #[serde(default)]
    next_marker: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct BlobList {
    #[serde(rename = "Blob", default)]
    items: Vec<BlobItem>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct BlobItem {
    name: String,
    properties: BlobProperties,
}

#[derive(Debug, Deserialize)]
struct BlobProperties {
    #[serde(rename = "Last-Modified")]
    last_modified: String,
}

fn parse_xml<T: for<'de> Deserialize<'de>>(body: &str) -> Result<T, AzureError> {
    quick_xml::de::from_str(body.trim_start_matches('\u{feff}'))
        .map_err(|e| AzureError::Decode(format!("XML: {}", e)))
}

fn parse_blob_listing(body: &str) -> Result<(Vec<BlobRecord>, Option<String>), AzureError> {
    let listing: BlobEnumeration = parse_xml(body)?;

    let blobs = listing
        .blobs
        .items
        .into_iter()
        .map(|item| {
            DateTime::parse_from_rfc2822(&item.properties.last_modified)
                .map(|t| BlobRecord::new(item.name.clone(), t.with_timezone(&Utc)))
                .map_err(|e| {
                    AzureError::Decode(format!(
                        "Last-Modified '{}' of blob '{}': {}",
                        item.properties.last_modified, item.name, e
                    ))
                })
        })
        .collect::<Result<Vec<_>, _>>()?;

    let next_marker = listing.next_marker.filter(|m| !m.trim().is_empty());
    Ok((blobs, next_marker))
}

/// Blob REST client for one storage account.
pub struct BlobServiceClient {
    http: Client,
    account: String,
    key: Secret,
    endpoint: Url,
    api_version: String,
}

impl BlobServiceClient {
    /// The endpoint is `https://{account}.blob.{suffix}` unless
    /// `storage_endpoint` overrides it (emulators, sovereign clouds).
    pub fn new(account: &str, key: Secret, config: &AzureConfig) -> Result<Self, AzureError> {
        let endpoint = config
            .storage_endpoint
            .clone()
            .filter(|e| !e.trim().is_empty())
            .unwrap_or_else(|| format!("https://{}.blob.{}", account, config.storage_endpoint_suffix));
        let endpoint =
            Url::parse(&endpoint).map_err(|e| AzureError::Url(format!("{}: {}", endpoint, e)))?;

        Ok(Self {
            http: http_client(config)?,
            account: account.to_string(),
            key,
            endpoint,
            api_version: config.storage_api_version.clone(),
        })
    }

    fn url(&self, segments: &[&str], query: &[(&str, &str)]) -> Result<Url, AzureError> {
        let mut url = self.endpoint.clone();
        url.path_segments_mut()
            .map_err(|_| AzureError::Url(self.endpoint.to_string()))?
            .pop_if_empty()
            .extend(segments.iter().flat_map(|s| s.split('/')));
        if !query.is_empty() {
            url.query_pairs_mut().extend_pairs(query);
        }
        Ok(url)
    }

    fn signed_request(
        &self,
        method: &Method,
        url: &Url,
        request_id: &str,
    ) -> Result<RequestBuilder, AzureError> {
        let date = Utc::now().format("%a, %d %b %Y %H:%M:%S GMT").to_string();
        let ms_headers = [
            ("x-ms-date", date.as_str()),
            ("x-ms-version", self.api_version.as_str()),
            (CLIENT_REQUEST_ID, request_id),
        ];

        let string_to_sign = shared_key::string_to_sign(method, 0, &ms_headers, &self.account, url);
        let authorization =
            shared_key::authorization(&self.account, self.key.expose(), &string_to_sign)?;

        let mut request = self
            .http
            .request(method.clone(), url.clone())
            .header(AUTHORIZATION, authorization);
        for (name, value) in ms_headers {
            request = request.header(name, value);
        }
        if *method == Method::PUT {
            request = request.header(CONTENT_LENGTH, "0");
        }
        Ok(request)
    }

    async fn send(&self, method: Method, url: Url) -> Result<(Response, String), AzureError> {
        let request_id = new_request_id();
        let response = super::send(self.signed_request(&method, &url, &request_id)?).await?;
        Ok((response, request_id))
    }

    async fn list_container_names(&self, prefix: &str) -> Result<Vec<String>, AzureError> {
        let url = self.url(&[], &[("comp", "list"), ("prefix", prefix)])?;
        let (response, request_id) = self.send(Method::GET, url).await?;
        if !response.status().is_success() {
            return Err(AzureError::from_response(response, &request_id).await);
        }

        let listing: ContainerEnumeration = parse_xml(&response.text().await?)?;
        Ok(listing.containers.items.into_iter().map(|c| c.name).collect())
    }

    async fn list_blob_page(&self, container: &str) -> Result<Vec<BlobRecord>, AzureError> {
        let url = self.url(&[container], &[("restype", "container"), ("comp", "list")])?;
        let (response, request_id) = self.send(Method::GET, url).await?;
        if !response.status().is_success() {
            return Err(AzureError::from_response(response, &request_id).await);
        }

        let (blobs, next_marker) = parse_blob_listing(&response.text().await?)?;
        if let Some(marker) = next_marker {
            warn!(
                container = %container,
                listed = blobs.len(),
                next_marker = %marker,
                "Blob listing truncated; only the first page is considered"
            );
        }
        Ok(blobs)
    }
}

#[async_trait]
impl BlobStore for BlobServiceClient {
    async fn container_exists(&self, container: &str) -> Result<bool, ArchiveError> {
        let names = self
            .list_container_names(container)
            .await
            .map_err(|e| ArchiveError::StorageAccess(format!("listing containers failed: {}", e)))?;

        Ok(names.iter().any(|name| name == container))
    }

    async fn create_container(&self, container: &str) -> Result<ContainerCreation, ArchiveError> {
        let url = self
            .url(&[container], &[("restype", "container")])
            .map_err(|e| ArchiveError::StorageAccess(e.to_string()))?;
        let (response, request_id) = self
            .send(Method::PUT, url)
            .await
            .map_err(|e| ArchiveError::StorageAccess(e.to_string()))?;

        if response.status() == StatusCode::CREATED {
            return Ok(ContainerCreation::Created);
        }

        let err = AzureError::from_response(response, &request_id).await;
        if err.status() == Some(409) && err.code() == Some("ContainerAlreadyExists") {
            return Ok(ContainerCreation::AlreadyExists);
        }
        Err(ArchiveError::StorageAccess(format!(
            "creating container '{}' failed: {}",
            container, err
        )))
    }

    async fn list_blobs(&self, container: &str) -> Result<Vec<BlobRecord>, ArchiveError> {
        let blobs = self.list_blob_page(container).await.map_err(|e| {
            ArchiveError::StorageAccess(format!("listing blobs of '{}' failed: {}", container, e))
        })?;

        debug!(container = %container, count = blobs.len(), "Listed blobs");
        Ok(blobs)
    }

    async fn delete_blob(&self, container: &str, blob: &str) -> Result<(), ArchiveError> {
        let deletion_error = |message: String| ArchiveError::BlobDeletion {
            blob: blob.to_string(),
            message,
        };

        let url = self
            .url(&[container, blob], &[])
            .map_err(|e| deletion_error(e.to_string()))?;
        let (response, request_id) = self
            .send(Method::DELETE, url)
            .await
            .map_err(|e| deletion_error(e.to_string()))?;

        if response.status().is_success() {
            return Ok(());
        }

        let err = AzureError::from_response(response, &request_id).await;
        if err.status() == Some(404) {
            // Gone already, e.g. removed by an earlier attempt of this request.
            warn!(container = %container, blob = %blob, "Blob to delete was not found");
            return Ok(());
        }
        Err(deletion_error(err.to_string()))
    }

    fn container_url(&self, container: &str) -> String {
        format!(
            "{}/{}",
            self.endpoint.as_str().trim_end_matches('/'),
            container
        )
    }

    fn blob_url(&self, container: &str, blob: &str) -> String {
        match self.url(&[container, blob], &[]) {
            Ok(url) => url.into(),
            Err(_) => format!("{}/{}", self.container_url(container), blob),
        }
    }
}

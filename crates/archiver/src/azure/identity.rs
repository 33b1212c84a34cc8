//! Managed identity token acquisition and identity lookups.

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use domain::services::{AccessToken, IdentityProvider, Subscription, UserIdentity};
use domain::ArchiveError;
use reqwest::{Client, Url};
use serde::Deserialize;
use shared::secret::Secret;
use tracing::{debug, warn};

use super::{
    http_client, new_request_id, send, AzureError, ManagementClient, CLIENT_REQUEST_ID,
};
use crate::config::AzureConfig;

const IMDS_API_VERSION: &str = "2018-02-01";
const IDENTITY_ENDPOINT_API_VERSION: &str = "2019-08-01";

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    /// Epoch seconds, sent as a string by most hosts.
    #[serde(default)]
    expires_on: Option<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct SubscriptionList {
    #[serde(default)]
    value: Vec<SubscriptionEntry>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SubscriptionEntry {
    subscription_id: String,
    #[serde(default)]
    tenant_id: Option<String>,
    #[serde(default)]
    display_name: Option<String>,
    #[serde(default)]
    state: Option<String>,
}

impl SubscriptionEntry {
    fn is_enabled(&self) -> bool {
        self.state
            .as_deref()
            .map_or(true, |s| s.eq_ignore_ascii_case("Enabled"))
    }
}

impl From<SubscriptionEntry> for Subscription {
    fn from(entry: SubscriptionEntry) -> Self {
        Subscription {
            subscription_id: entry.subscription_id,
            tenant_id: entry.tenant_id,
            display_name: entry.display_name,
        }
    }
}

#[derive(Debug, Deserialize)]
struct UserAssignedIdentity {
    name: String,
    properties: UserAssignedIdentityProperties,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UserAssignedIdentityProperties {
    client_id: String,
    #[serde(default)]
    principal_id: Option<String>,
}

/// Managed identity client for the host the run executes on.
///
/// Speaks the IMDS protocol, or the identity-endpoint protocol when an
/// identity header is configured.
pub struct ManagedIdentityClient {
    http: Client,
    token_endpoint: String,
    identity_header: Option<Secret>,
    resource: String,
    management: ManagementClient,
    pinned_subscription: Option<String>,
    subscription_api_version: String,
    identity_api_version: String,
}

impl ManagedIdentityClient {
    pub fn new(config: &AzureConfig) -> Result<Self, AzureError> {
        Ok(Self {
            http: http_client(config)?,
            token_endpoint: config.identity_endpoint.clone(),
            identity_header: config.identity_header.clone().filter(|h| !h.is_empty()),
            resource: config.management_resource.clone(),
            management: ManagementClient::new(config)?,
            pinned_subscription: config
                .subscription_id
                .clone()
                .filter(|s| !s.trim().is_empty()),
            subscription_api_version: config.subscription_api_version.clone(),
            identity_api_version: config.identity_api_version.clone(),
        })
    }

    fn token_url(&self, client_id: Option<&str>) -> Result<Url, AzureError> {
        let api_version = if self.identity_header.is_some() {
            IDENTITY_ENDPOINT_API_VERSION
        } else {
            IMDS_API_VERSION
        };

        let mut url = Url::parse(&self.token_endpoint)
            .map_err(|e| AzureError::Url(format!("{}: {}", self.token_endpoint, e)))?;
        {
            let mut query = url.query_pairs_mut();
            query.append_pair("api-version", api_version);
            query.append_pair("resource", &self.resource);
            if let Some(client_id) = client_id {
                query.append_pair("client_id", client_id);
            }
        }
        Ok(url)
    }

    async fn request_token(&self, client_id: Option<&str>) -> Result<AccessToken, AzureError> {
        let url = self.token_url(client_id)?;
        let request_id = new_request_id();

        let request = self
            .http
            .get(url)
            .header(CLIENT_REQUEST_ID, &request_id);
        let request = match &self.identity_header {
            Some(header) => request.header("X-IDENTITY-HEADER", header.expose()),
            None => request.header("Metadata", "true"),
        };
        let response = send(request).await?;

        if !response.status().is_success() {
            return Err(AzureError::from_response(response, &request_id).await);
        }

        let body: TokenResponse = response
            .json()
            .await
            .map_err(|e| AzureError::Decode(format!("token response: {}", e)))?;

        Ok(AccessToken {
            token: Secret::new(body.access_token),
            expires_on: body.expires_on.as_ref().and_then(parse_expires_on),
        })
    }
}

fn parse_expires_on(value: &serde_json::Value) -> Option<DateTime<Utc>> {
    let seconds = match value {
        serde_json::Value::Number(n) => n.as_i64(),
        serde_json::Value::String(s) => s.trim().parse::<i64>().ok(),
        _ => None,
    }?;
    Utc.timestamp_opt(seconds, 0).single()
}

#[async_trait]
impl IdentityProvider for ManagedIdentityClient {
    async fn acquire_token(&self, client_id: Option<&str>) -> Result<AccessToken, ArchiveError> {
        let token = self.request_token(client_id).await.map_err(|e| {
            ArchiveError::Authentication(format!(
                "token request for {} identity failed: {}",
                if client_id.is_some() { "user-assigned" } else { "system-assigned" },
                e
            ))
        })?;

        debug!(
            user_assigned = client_id.is_some(),
            expires_on = ?token.expires_on,
            "Acquired management token"
        );
        Ok(token)
    }

    async fn resolve_subscription(&self, token: &AccessToken) -> Result<Subscription, ArchiveError> {
        let url = self
            .management
            .resource_url(&["subscriptions"], &self.subscription_api_version)
            .map_err(|e| ArchiveError::Authentication(e.to_string()))?;

        let list: SubscriptionList = self
            .management
            .get_json(token, &url)
            .await
            .map_err(|e| ArchiveError::Authentication(format!("listing subscriptions failed: {}", e)))?;

        if let Some(pinned) = &self.pinned_subscription {
            return list
                .value
                .into_iter()
                .find(|s| s.subscription_id.eq_ignore_ascii_case(pinned))
                .map(Subscription::from)
                .ok_or_else(|| {
                    ArchiveError::Authentication(format!(
                        "subscription {} is not accessible to the identity",
                        pinned
                    ))
                });
        }

        if list.value.len() > 1 {
            warn!(
                count = list.value.len(),
                "Identity sees several subscriptions; using the first enabled one"
            );
        }

        list.value
            .into_iter()
            .find(SubscriptionEntry::is_enabled)
            .map(Subscription::from)
            .ok_or_else(|| {
                ArchiveError::Authentication("no enabled subscription is accessible to the identity".to_string())
            })
    }

    async fn find_user_identity(
        &self,
        token: &AccessToken,
        subscription_id: &str,
        resource_group: &str,
        name: &str,
    ) -> Result<UserIdentity, ArchiveError> {
        let url = self
            .management
            .resource_url(
                &[
                    "subscriptions",
                    subscription_id,
                    "resourceGroups",
                    resource_group,
                    "providers",
                    "Microsoft.ManagedIdentity",
                    "userAssignedIdentities",
                    name,
                ],
                &self.identity_api_version,
            )
            .map_err(|e| ArchiveError::Authentication(e.to_string()))?;

        let identity: UserAssignedIdentity = match self.management.get_json(token, &url).await {
            Ok(identity) => identity,
            Err(e) if e.status() == Some(404) => {
                return Err(ArchiveError::IdentityNotFound(format!(
                    "'{}' in resource group '{}'",
                    name, resource_group
                )))
            }
            Err(e) => {
                return Err(ArchiveError::Authentication(format!(
                    "looking up identity '{}' failed: {}",
                    name, e
                )))
            }
        };

        Ok(UserIdentity {
            name: identity.name,
            client_id: identity.properties.client_id,
            principal_id: identity.properties.principal_id,
        })
    }
}

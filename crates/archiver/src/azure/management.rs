//! Resource-manager plumbing shared by the identity and SQL clients.

use domain::services::AccessToken;
use reqwest::{Client, Response, Url};
use serde::de::DeserializeOwned;
use serde::Serialize;

use super::{http_client, new_request_id, send, AzureError, CLIENT_REQUEST_ID};
use crate::config::AzureConfig;

/// Authenticated JSON calls against the management endpoint.
#[derive(Debug, Clone)]
pub struct ManagementClient {
    http: Client,
    endpoint: Url,
}

impl ManagementClient {
    pub fn new(config: &AzureConfig) -> Result<Self, AzureError> {
        let endpoint = Url::parse(&config.management_endpoint)
            .map_err(|e| AzureError::Url(format!("{}: {}", config.management_endpoint, e)))?;

        Ok(Self {
            http: http_client(config)?,
            endpoint,
        })
    }

    /// `{endpoint}/{segments...}?api-version={api_version}` with each
    /// segment percent-encoded.
    pub fn resource_url(&self, segments: &[&str], api_version: &str) -> Result<Url, AzureError> {
        let mut url = self.endpoint.clone();
        url.path_segments_mut()
            .map_err(|_| AzureError::Url(self.endpoint.to_string()))?
            .pop_if_empty()
            .extend(segments);
        url.query_pairs_mut().append_pair("api-version", api_version);
        Ok(url)
    }

    /// GET; non-success responses become [`AzureError::Api`].
    pub async fn get(&self, token: &AccessToken, url: &Url) -> Result<Response, AzureError> {
        let request_id = new_request_id();
        let response = send(
            self.http
                .get(url.clone())
                .bearer_auth(token.token.expose())
                .header(CLIENT_REQUEST_ID, &request_id),
        )
        .await?;

        if !response.status().is_success() {
            return Err(AzureError::from_response(response, &request_id).await);
        }
        Ok(response)
    }

    pub async fn get_json<T: DeserializeOwned>(
        &self,
        token: &AccessToken,
        url: &Url,
    ) -> Result<T, AzureError> {
        let response = self.get(token, url).await?;
        response
            .json::<T>()
            .await
            .map_err(|e| AzureError::Decode(e.to_string()))
    }

    /// POST a JSON body; non-success responses become [`AzureError::Api`].
    pub async fn post_json<B: Serialize + ?Sized>(
        &self,
        token: &AccessToken,
        url: &Url,
        body: &B,
    ) -> Result<Response, AzureError> {
        let request_id = new_request_id();
        let response = send(
            self.http
                .post(url.clone())
                .bearer_auth(token.token.expose())
                .header(CLIENT_REQUEST_ID, &request_id)
                .json(body),
        )
        .await?;

        if !response.status().is_success() {
            return Err(AzureError::from_response(response, &request_id).await);
        }
        Ok(response)
    }
}

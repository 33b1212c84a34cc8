//! In-process fake of the cloud endpoints an archive run talks to.
//!
//! Serves the token endpoint under `/identity`, the management plane under
//! `/mgmt` and a single blob account under `/blob`, and records what the
//! clients sent so tests can assert on it.

#![allow(dead_code)]

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex};

use axum::extract::{Path, Query, State};
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use bacpac_archiver::config::Config;
use chrono::{DateTime, Duration, Utc};
use serde_json::{json, Value};

pub const USER_IDENTITY: &str = "id-backup";
pub const USER_CLIENT_ID: &str = "client-1";
pub const DENIED_ACCOUNT: &str = "stdenied";

#[derive(Debug, Clone)]
pub struct RecordedExport {
    pub subscription_id: String,
    pub resource_group: String,
    pub server: String,
    pub database: String,
    pub body: Value,
}

#[derive(Debug, Default)]
pub struct FakeState {
    pub base_url: String,
    /// (api-version, client_id) per token request
    pub token_requests: Vec<(String, Option<String>)>,
    pub containers: BTreeMap<String, BTreeMap<String, DateTime<Utc>>>,
    pub container_creates: usize,
    pub exports: Vec<RecordedExport>,
    pub status_queries: usize,
    pub deleted: Vec<String>,
    /// Databases whose export submission answers 404
    pub missing_databases: Vec<String>,
    /// Operations report Failed instead of InProgress
    pub fail_operations: bool,
    /// Delete requests to answer 503 before deleting normally
    pub unavailable_deletes: usize,
    pub delete_requests: usize,
    pub broken_token_requests: usize,
}

pub type SharedState = Arc<Mutex<FakeState>>;

pub struct FakeAzure {
    pub base_url: String,
    pub state: SharedState,
}

impl FakeAzure {
    pub async fn start() -> Self {
        Self::start_with(FakeState::default()).await
    }

    pub async fn start_with(state: FakeState) -> Self {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let base_url = format!("http://{}", listener.local_addr().unwrap());
        let state = Arc::new(Mutex::new(FakeState {
            base_url: base_url.clone(),
            ..state
        }));

        let app = router(state.clone());
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self { base_url, state }
    }

    /// Adds a container holding blobs aged the given number of days.
    pub fn seed_container(&self, container: &str, blobs: &[(&str, i64)]) {
        let now = Utc::now();
        let mut state = self.state.lock().unwrap();
        let entry = state.containers.entry(container.to_string()).or_default();
        for (name, days) in blobs {
            entry.insert(name.to_string(), now - Duration::days(*days));
        }
    }

    pub fn blob_names(&self, container: &str) -> Vec<String> {
        self.state
            .lock()
            .unwrap()
            .containers
            .get(container)
            .map(|blobs| blobs.keys().cloned().collect())
            .unwrap_or_default()
    }

    /// Config pointing every client at this fake, plus `overrides`.
    pub fn config(&self, overrides: &[(&str, &str)]) -> Config {
        let toml = format!(
            r#"
            [logging]
            level = "debug"
            format = "pretty"

            [azure]
            identity_endpoint = "{base}/identity/token"
            management_endpoint = "{base}/mgmt"
            storage_endpoint = "{base}/blob"
            request_timeout_secs = 10

            [archive]
            resource_group_name = "rg-data"
            managed_identity_type = "System"
            sql_server_name = "sql-prod"
            sql_server_admin = "sqladmin"
            sql_server_admin_pw = "P@ssw0rd!"
            database_names = "Sales, Inventory"
            storage_account_name = "stbackups"
            storage_account_key = "c2VjcmV0LWtleQ=="
            blob_container_name = "sql-backups"
            retention_days = 30
            "#,
            base = self.base_url
        );

        let config = Config::from_toml(&toml, overrides).unwrap();
        config.validate().unwrap();
        config
    }
}

fn router(state: SharedState) -> Router {
    Router::new()
        .route("/identity/token", get(token))
        .route("/identity/broken", get(broken))
        .route("/mgmt/subscriptions", get(subscriptions))
        .route(
            "/mgmt/subscriptions/:sub/resourceGroups/:rg/providers/Microsoft.ManagedIdentity/userAssignedIdentities/:name",
            get(user_identity),
        )
        .route(
            "/mgmt/subscriptions/:sub/resourceGroups/:rg/providers/Microsoft.Sql/servers/:server/databases/:db/export",
            post(submit_export),
        )
        .route("/mgmt/operations/:id", get(operation_status))
        .route("/blob", get(list_containers))
        .route("/blob/:container", get(list_blobs).put(create_container))
        .route("/blob/:container/*blob", axum::routing::delete(delete_blob))
        .with_state(state)
}

fn arm_error(status: StatusCode, code: &str, message: &str) -> Response {
    (
        status,
        Json(json!({ "error": { "code": code, "message": message } })),
    )
        .into_response()
}

fn storage_error(status: StatusCode, code: &str) -> Response {
    let body = format!(
        "\u{feff}<?xml version=\"1.0\" encoding=\"utf-8\"?><Error><Code>{}</Code><Message>{}\nRequestId:fake</Message></Error>",
        code, code
    );
    (
        status,
        [
            (header::CONTENT_TYPE, "application/xml".to_string()),
            (header::HeaderName::from_static("x-ms-error-code"), code.to_string()),
        ],
        body,
    )
        .into_response()
}

fn xml(body: String) -> Response {
    ([(header::CONTENT_TYPE, "application/xml")], body).into_response()
}

fn bearer(headers: &HeaderMap) -> Option<String> {
    headers
        .get(header::AUTHORIZATION)?
        .to_str()
        .ok()?
        .strip_prefix("Bearer ")
        .map(str::to_string)
}

async fn token(
    State(state): State<SharedState>,
    Query(query): Query<HashMap<String, String>>,
    headers: HeaderMap,
) -> Response {
    let api_version = query.get("api-version").cloned().unwrap_or_default();
    let protocol_ok = match headers.get("x-identity-header") {
        Some(value) => value == "hdr-secret" && api_version == "2019-08-01",
        None => headers.get("metadata").is_some_and(|v| v == "true") && api_version == "2018-02-01",
    };
    if !protocol_ok || query.get("resource").is_none() {
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({ "error": "invalid_request", "error_description": "bad token request" })),
        )
            .into_response();
    }

    let client_id = query.get("client_id").cloned();
    state
        .lock()
        .unwrap()
        .token_requests
        .push((api_version, client_id.clone()));

    let access_token = match client_id {
        Some(id) => format!("token-{}", id),
        None => "token-system".to_string(),
    };
    let expires_on = (Utc::now() + Duration::hours(1)).timestamp().to_string();
    Json(json!({
        "access_token": access_token,
        "expires_on": expires_on,
        "resource": query.get("resource"),
        "token_type": "Bearer",
    }))
    .into_response()
}

async fn broken(State(state): State<SharedState>) -> Response {
    state.lock().unwrap().broken_token_requests += 1;
    (StatusCode::INTERNAL_SERVER_ERROR, "identity endpoint unavailable").into_response()
}

async fn subscriptions(headers: HeaderMap) -> Response {
    let value = match bearer(&headers).as_deref() {
        Some("token-system") => json!([
            { "subscriptionId": "sub-disabled", "state": "Disabled" },
            { "subscriptionId": "sub-system", "state": "Enabled", "tenantId": "tenant-1" },
        ]),
        Some(t) if t == format!("token-{}", USER_CLIENT_ID) => {
            json!([{ "subscriptionId": "sub-user", "state": "Enabled", "tenantId": "tenant-1" }])
        }
        _ => return arm_error(StatusCode::UNAUTHORIZED, "InvalidAuthenticationToken", "no token"),
    };
    Json(json!({ "value": value })).into_response()
}

async fn user_identity(
    Path((_sub, rg, name)): Path<(String, String, String)>,
    headers: HeaderMap,
) -> Response {
    if bearer(&headers).is_none() {
        return arm_error(StatusCode::UNAUTHORIZED, "AuthenticationFailed", "no token");
    }
    if name != USER_IDENTITY {
        return arm_error(
            StatusCode::NOT_FOUND,
            "ResourceNotFound",
            &format!("The Resource '{}' under resource group '{}' was not found.", name, rg),
        );
    }
    Json(json!({
        "name": name,
        "location": "westeurope",
        "properties": {
            "tenantId": "tenant-1",
            "principalId": "principal-1",
            "clientId": USER_CLIENT_ID,
        }
    }))
    .into_response()
}

async fn submit_export(
    State(state): State<SharedState>,
    Path((sub, rg, server, db)): Path<(String, String, String, String)>,
    Query(query): Query<HashMap<String, String>>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Response {
    if bearer(&headers).is_none() {
        return arm_error(StatusCode::UNAUTHORIZED, "AuthenticationFailed", "no token");
    }
    if query.get("api-version").map(String::as_str) != Some("2021-11-01") {
        return arm_error(StatusCode::BAD_REQUEST, "InvalidApiVersion", "api-version");
    }

    let mut state = state.lock().unwrap();
    if state.missing_databases.contains(&db) {
        return arm_error(
            StatusCode::NOT_FOUND,
            "DatabaseDoesNotExist",
            &format!("Database '{}' does not exist.", db),
        );
    }

    // The service writes the bacpac to storageUri.
    let storage_uri = body["storageUri"].as_str().unwrap_or_default().to_string();
    let mut parts = storage_uri.rsplit('/');
    if let (Some(blob), Some(container)) = (parts.next(), parts.next()) {
        if let Some(blobs) = state.containers.get_mut(container) {
            blobs.insert(blob.to_string(), Utc::now());
        }
    }

    state.exports.push(RecordedExport {
        subscription_id: sub,
        resource_group: rg,
        server,
        database: db,
        body,
    });
    let handle = format!("{}/mgmt/operations/{}", state.base_url, state.exports.len());

    (
        StatusCode::ACCEPTED,
        [("Azure-AsyncOperation", handle.clone()), ("Location", handle)],
    )
        .into_response()
}

async fn operation_status(
    State(state): State<SharedState>,
    Path(id): Path<String>,
) -> Response {
    let mut state = state.lock().unwrap();
    state.status_queries += 1;

    if state.fail_operations {
        return Json(json!({
            "name": id,
            "status": "Failed",
            "error": { "code": "ExportFailed", "message": "Login failed for user 'sqladmin'." }
        }))
        .into_response();
    }
    Json(json!({ "name": id, "status": "InProgress" })).into_response()
}

/// Checks the Shared Key headers; answers 403 for the denied account.
fn check_shared_key(headers: &HeaderMap) -> Result<(), Response> {
    let has_signing_headers = headers.contains_key("x-ms-date")
        && headers.contains_key("x-ms-version")
        && headers.contains_key("x-ms-client-request-id");
    let account = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("SharedKey "))
        .and_then(|v| v.split(':').next())
        .map(str::to_string);

    match account {
        Some(account) if has_signing_headers && account != DENIED_ACCOUNT => Ok(()),
        _ => Err(storage_error(StatusCode::FORBIDDEN, "AuthenticationFailed")),
    }
}

fn rfc1123(t: &DateTime<Utc>) -> String {
    t.format("%a, %d %b %Y %H:%M:%S GMT").to_string()
}

async fn list_containers(
    State(state): State<SharedState>,
    Query(query): Query<HashMap<String, String>>,
    headers: HeaderMap,
) -> Response {
    if let Err(denied) = check_shared_key(&headers) {
        return denied;
    }
    if query.get("comp").map(String::as_str) != Some("list") {
        return storage_error(StatusCode::BAD_REQUEST, "InvalidQueryParameterValue");
    }

    let prefix = query.get("prefix").cloned().unwrap_or_default();
    let state = state.lock().unwrap();
    let containers: String = state
        .containers
        .keys()
        .filter(|name| name.starts_with(&prefix))
        .map(|name| format!("<Container><Name>{}</Name><Properties /></Container>", name))
        .collect();

    xml(format!(
        "\u{feff}<?xml version=\"1.0\" encoding=\"utf-8\"?><EnumerationResults ServiceEndpoint=\"{}/blob/\"><Prefix>{}</Prefix><Containers>{}</Containers><NextMarker /></EnumerationResults>",
        state.base_url, prefix, containers
    ))
}

async fn create_container(
    State(state): State<SharedState>,
    Path(container): Path<String>,
    Query(query): Query<HashMap<String, String>>,
    headers: HeaderMap,
) -> Response {
    if let Err(denied) = check_shared_key(&headers) {
        return denied;
    }
    if query.get("restype").map(String::as_str) != Some("container") {
        return storage_error(StatusCode::BAD_REQUEST, "InvalidQueryParameterValue");
    }

    let mut state = state.lock().unwrap();
    if state.containers.contains_key(&container) {
        return storage_error(StatusCode::CONFLICT, "ContainerAlreadyExists");
    }
    state.container_creates += 1;
    state.containers.insert(container, BTreeMap::new());
    StatusCode::CREATED.into_response()
}

async fn list_blobs(
    State(state): State<SharedState>,
    Path(container): Path<String>,
    Query(query): Query<HashMap<String, String>>,
    headers: HeaderMap,
) -> Response {
    if let Err(denied) = check_shared_key(&headers) {
        return denied;
    }
    if query.get("restype").map(String::as_str) != Some("container")
        || query.get("comp").map(String::as_str) != Some("list")
    {
        return storage_error(StatusCode::BAD_REQUEST, "InvalidQueryParameterValue");
    }

    let state = state.lock().unwrap();
    let Some(blobs) = state.containers.get(&container) else {
        return storage_error(StatusCode::NOT_FOUND, "ContainerNotFound");
    };
    let items: String = blobs
        .iter()
        .map(|(name, modified)| {
            format!(
                "<Blob><Name>{}</Name><Properties><Last-Modified>{}</Last-Modified><BlobType>BlockBlob</BlobType></Properties></Blob>",
                name,
                rfc1123(modified)
            )
        })
        .collect();

    xml(format!(
        "\u{feff}<?xml version=\"1.0\" encoding=\"utf-8\"?><EnumerationResults ServiceEndpoint=\"{}/blob/\" ContainerName=\"{}\"><Blobs>{}</Blobs><NextMarker /></EnumerationResults>",
        state.base_url, container, items
    ))
}

async fn delete_blob(
    State(state): State<SharedState>,
    Path((container, blob)): Path<(String, String)>,
    headers: HeaderMap,
) -> Response {
    if let Err(denied) = check_shared_key(&headers) {
        return denied;
    }

    let mut state = state.lock().unwrap();
    state.delete_requests += 1;
    if state.unavailable_deletes > 0 {
        state.unavailable_deletes -= 1;
        return storage_error(StatusCode::SERVICE_UNAVAILABLE, "ServerBusy");
    }
    let removed = state
        .containers
        .get_mut(&container)
        .and_then(|blobs| blobs.remove(&blob));
    match removed {
        Some(_) => {
            state.deleted.push(blob);
            StatusCode::ACCEPTED.into_response()
        }
        None => storage_error(StatusCode::NOT_FOUND, "BlobNotFound"),
    }
}

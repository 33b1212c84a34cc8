//! Identity resolution.
//!
//! Turns a managed identity into an authenticated [`Session`] bound to a
//! subscription. The session is an explicit value handed to every component
//! that calls the management plane; nothing is cached between runs.

use chrono::{DateTime, Utc};
use shared::secret::Secret;
use tracing::info;

use crate::error::ArchiveError;
use crate::models::{IdentityMode, RunParameters};

/// Bearer token for the management plane.
#[derive(Debug, Clone)]
pub struct AccessToken {
    pub token: Secret,
    pub expires_on: Option<DateTime<Utc>>,
}

impl AccessToken {
    pub fn new(token: impl Into<Secret>) -> Self {
        Self {
            token: token.into(),
            expires_on: None,
        }
    }
}

/// A subscription the identity can see.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Subscription {
    pub subscription_id: String,
    pub tenant_id: Option<String>,
    pub display_name: Option<String>,
}

/// A user-assigned identity resolved in a resource group.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserIdentity {
    pub name: String,
    pub client_id: String,
    pub principal_id: Option<String>,
}

/// Which identity a session was obtained with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionIdentity {
    System,
    User { name: String, client_id: String },
}

/// Authenticated management-plane session for one run.
#[derive(Debug, Clone)]
pub struct Session {
    pub token: AccessToken,
    pub subscription: Subscription,
    pub identity: SessionIdentity,
}

impl Session {
    pub fn subscription_id(&self) -> &str {
        &self.subscription.subscription_id
    }
}

/// Cloud identity collaborator.
#[async_trait::async_trait]
pub trait IdentityProvider: Send + Sync {
    /// Acquire a token for the ambient system identity, or for the
    /// user-assigned identity with `client_id` when given.
    async fn acquire_token(&self, client_id: Option<&str>) -> Result<AccessToken, ArchiveError>;

    /// Resolve the subscription the token is bound to.
    async fn resolve_subscription(&self, token: &AccessToken) -> Result<Subscription, ArchiveError>;

    /// Look up a user-assigned identity by name.
    ///
    /// Returns `IdentityNotFound` when it does not exist in the resource group.
    async fn find_user_identity(
        &self,
        token: &AccessToken,
        subscription_id: &str,
        resource_group: &str,
        name: &str,
    ) -> Result<UserIdentity, ArchiveError>;
}

/// Resolves the session for a run.
///
/// `System` authenticates once. `User` authenticates with the system identity
/// first to look up the user identity's client id, then authenticates again
/// as that identity and rebinds to its subscription.
pub async fn resolve_session(
    provider: &dyn IdentityProvider,
    params: &RunParameters,
) -> Result<Session, ArchiveError> {
    let system_token = provider.acquire_token(None).await?;
    let system_subscription = provider.resolve_subscription(&system_token).await?;

    info!(
        subscription_id = %system_subscription.subscription_id,
        "Authenticated with system-assigned identity"
    );

    match params.identity_mode {
        IdentityMode::System => Ok(Session {
            token: system_token,
            subscription: system_subscription,
            identity: SessionIdentity::System,
        }),
        IdentityMode::User => {
            let name = params.user_identity().ok_or_else(|| {
                ArchiveError::InvalidParameters(
                    "UserIdentityName is required when ManagedIdentityType is User".to_string(),
                )
            })?;

            let user = provider
                .find_user_identity(
                    &system_token,
                    &system_subscription.subscription_id,
                    &params.resource_group_name,
                    name,
                )
                .await?;

            let user_token = provider.acquire_token(Some(&user.client_id)).await?;
            let user_subscription = provider.resolve_subscription(&user_token).await?;

            info!(
                identity = %user.name,
                client_id = %user.client_id,
                subscription_id = %user_subscription.subscription_id,
                "Authenticated with user-assigned identity"
            );

            Ok(Session {
                token: user_token,
                subscription: user_subscription,
                identity: SessionIdentity::User {
                    name: user.name,
                    client_id: user.client_id,
                },
            })
        }
    }
}

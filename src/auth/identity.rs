use super::{AuthError, AuthUser};
use async_trait::async_trait;
use reqwest::StatusCode;
use serde::Deserialize;
use tracing::{instrument, warn};

/// Resolves a caller's bearer token into an identity
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    async fn verify(&self, access_token: &str) -> Result<AuthUser, AuthError>;
}

/// Supabase Auth: `GET {base}/auth/v1/user` with the caller's token
#[derive(Clone)]
pub struct SupabaseIdentity {
    client: reqwest::Client,
    user_endpoint: String,
    api_key: String,
}

#[derive(Debug, Deserialize)]
struct SupabaseUser {
    id: String,
    #[serde(default)]
    email: Option<String>,
}

impl SupabaseIdentity {
    pub fn new(client: reqwest::Client, base_url: &str, api_key: impl Into<String>) -> Self {
        Self {
            client,
            user_endpoint: format!("{}/auth/v1/user", base_url.trim_end_matches('/')),
            api_key: api_key.into(),
        }
    }
}

#[async_trait]
impl IdentityProvider for SupabaseIdentity {
    #[instrument(skip_all)]
    async fn verify(&self, access_token: &str) -> Result<AuthUser, AuthError> {
        let response = self
            .client
            .get(&self.user_endpoint)
            .header("apikey", &self.api_key)
            .bearer_auth(access_token)
            .send()
            .await
            .map_err(|e| AuthError::ProviderUnavailable(e.to_string()))?;

        match response.status() {
            status if status.is_success() => {
                let user: SupabaseUser = response
                    .json()
                    .await
                    .map_err(|e| AuthError::ProviderUnavailable(e.to_string()))?;
                if user.id.trim().is_empty() {
                    return Err(AuthError::InvalidToken);
                }
                Ok(AuthUser {
                    user_id: user.id,
                    email: user.email,
                })
            }
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN | StatusCode::BAD_REQUEST
            | StatusCode::NOT_FOUND => Err(AuthError::InvalidToken),
            status => {
                warn!(status = status.as_u16(), "identity provider returned an unexpected status");
                Err(AuthError::ProviderUnavailable(format!(
                    "identity provider returned {}",
                    status
                )))
            }
        }
    }
}

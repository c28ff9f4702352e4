use super::AuthError;
use crate::config::AppConfig;
use chrono::Utc;
use jsonwebtoken::{
    decode, encode, errors::ErrorKind, Algorithm, DecodingKey, EncodingKey, Header, Validation,
};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use uuid::Uuid;

/// Who and what a hand-off token speaks for
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HandoffSubject {
    pub user_id: String,
    pub user_email: String,
    /// Storage object key
    pub file_name: String,
    pub file_url: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HandoffClaims {
    pub sub: String,
    pub user_id: String,
    pub user_email: String,
    pub file_name: String,
    pub file_url: String,
    pub iss: String,
    pub aud: String,
    pub iat: i64,
    pub exp: i64,
    pub jti: String,
}

/// Signs short-lived HS256 tokens that let the extraction workflow act on one upload.
#[derive(Clone)]
pub struct HandoffTokenIssuer {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    issuer: String,
    audience: String,
    ttl: Duration,
}

impl std::fmt::Debug for HandoffTokenIssuer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HandoffTokenIssuer")
            .field("issuer", &self.issuer)
            .field("audience", &self.audience)
            .field("ttl", &self.ttl)
            .finish_non_exhaustive()
    }
}

impl HandoffTokenIssuer {
    /// Fails when the signing secret is blank; the service cannot hand off uploads without it.
    pub fn new(
        secret: &str,
        issuer: impl Into<String>,
        audience: impl Into<String>,
        ttl: Duration,
    ) -> Result<Self, AuthError> {
        if secret.trim().is_empty() {
            return Err(AuthError::TokenCreation(
                "hand-off signing secret is not configured".into(),
            ));
        }
        if ttl.is_zero() {
            return Err(AuthError::TokenCreation(
                "hand-off token lifetime must be positive".into(),
            ));
        }
        Ok(Self {
            encoding_key: EncodingKey::from_secret(secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(secret.as_bytes()),
            issuer: issuer.into(),
            audience: audience.into(),
            ttl,
        })
    }

    pub fn from_config(config: &AppConfig) -> Result<Self, AuthError> {
        Self::new(
            &config.handoff_jwt_secret,
            config.handoff_issuer.clone(),
            config.handoff_audience.clone(),
            Duration::from_secs(config.handoff_ttl_secs),
        )
    }

    pub fn issue(&self, subject: &HandoffSubject) -> Result<String, AuthError> {
        let now = Utc::now().timestamp();
        let claims = HandoffClaims {
            sub: subject.user_id.clone(),
            user_id: subject.user_id.clone(),
            user_email: subject.user_email.clone(),
            file_name: subject.file_name.clone(),
            file_url: subject.file_url.clone(),
            iss: self.issuer.clone(),
            aud: self.audience.clone(),
            iat: now,
            exp: now + self.ttl.as_secs() as i64,
            jti: Uuid::new_v4().to_string(),
        };

        encode(&Header::new(Algorithm::HS256), &claims, &self.encoding_key)
            .map_err(|e| AuthError::TokenCreation(e.to_string()))
    }

    /// Decodes a token minted by this issuer, checking signature, issuer, audience and expiry.
    pub fn verify(&self, token: &str) -> Result<HandoffClaims, AuthError> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.set_issuer(&[self.issuer.as_str()]);
        validation.set_audience(&[self.audience.as_str()]);

        decode::<HandoffClaims>(token, &self.decoding_key, &validation)
            .map(|data| data.claims)
            .map_err(|e| match e.kind() {
                ErrorKind::ExpiredSignature => AuthError::TokenExpired,
                _ => AuthError::InvalidToken,
            })
    }
}

//! GCP authentication using a service account key
//!
//! Exchanges a self-signed RS256 JWT for an OAuth2 access token and caches it
//! until shortly before expiry. Used by the Firestore REST client.

use base64::Engine;
use std::path::Path;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;

use crate::error::{Error, Result};

const FIRESTORE_SCOPE: &str = "https://www.googleapis.com/auth/datastore";
const JWT_BEARER_GRANT: &str = "urn:ietf:params:oauth:grant-type:jwt-bearer";

/// Tokens are refreshed once less than this much lifetime remains
const REFRESH_MARGIN: Duration = Duration::from_secs(60);

/// GCP authentication manager
pub struct GcpAuth {
    /// Service account key path
    key_path: String,
    /// Project ID
    project_id: String,
    /// Shared HTTP client for token exchange
    http: reqwest::Client,
    /// Cached access token
    token: RwLock<Option<CachedToken>>,
}

#[derive(Clone)]
struct CachedToken {
    access_token: String,
    expires_at: Instant,
}

#[derive(serde::Deserialize)]
struct ServiceAccountKey {
    client_email: String,
    private_key: String,
    token_uri: String,
}

#[derive(serde::Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default = "default_expires_in")]
    expires_in: u64,
}

fn default_expires_in() -> u64 {
    3600
}

impl GcpAuth {
    /// Create from service account JSON key file
    pub fn from_service_account(key_path: impl AsRef<Path>, project_id: String) -> Result<Self> {
        let key_path = key_path.as_ref();
        if !key_path.exists() {
            return Err(Error::Config(format!(
                "Service account key not found: {}",
                key_path.display()
            )));
        }

        Ok(Self {
            key_path: key_path.to_string_lossy().to_string(),
            project_id,
            http: reqwest::Client::new(),
            token: RwLock::new(None),
        })
    }

    /// Get project ID
    pub fn project_id(&self) -> &str {
        &self.project_id
    }

    /// Get a valid access token (refreshing if needed)
    pub async fn get_token(&self) -> Result<String> {
        if let Some(cached) = self.token.read().await.as_ref() {
            if cached.expires_at > Instant::now() + REFRESH_MARGIN {
                return Ok(cached.access_token.clone());
            }
        }

        let mut slot = self.token.write().await;
        // Another request may have refreshed while we waited for the lock
        if let Some(cached) = slot.as_ref() {
            if cached.expires_at > Instant::now() + REFRESH_MARGIN {
                return Ok(cached.access_token.clone());
            }
        }

        let fresh = self.refresh_token().await?;
        let access_token = fresh.access_token.clone();
        *slot = Some(fresh);
        Ok(access_token)
    }

    async fn read_key(&self) -> Result<ServiceAccountKey> {
        let content = tokio::fs::read_to_string(&self.key_path).await.map_err(|e| {
            Error::Config(format!(
                "Failed to read service account key {}: {}",
                self.key_path, e
            ))
        })?;

        serde_json::from_str(&content)
            .map_err(|e| Error::Config(format!("Invalid service account key format: {}", e)))
    }

    /// Build and sign the JWT assertion
    fn signed_assertion(key: &ServiceAccountKey) -> Result<String> {
        let now = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map_err(|e| Error::Internal(format!("System clock before epoch: {}", e)))?
            .as_secs() as i64;

        let claims = serde_json::json!({
            "iss": key.client_email,
            "scope": FIRESTORE_SCOPE,
            "aud": key.token_uri,
            "iat": now,
            "exp": now + 3600,
        });

        let b64 = base64::engine::general_purpose::URL_SAFE_NO_PAD;
        let signing_input = format!(
            "{}.{}",
            b64.encode(r#"{"alg":"RS256","typ":"JWT"}"#.as_bytes()),
            b64.encode(claims.to_string().as_bytes())
        );

        let private_key = key.private_key.replace("\\n", "\n");
        let der = pem::parse(&private_key)
            .map_err(|e| Error::Config(format!("Failed to parse private key PEM: {}", e)))?;
        let key_pair = ring::signature::RsaKeyPair::from_pkcs8(der.contents())
            .map_err(|e| Error::Config(format!("Failed to parse private key: {:?}", e)))?;

        let mut signature = vec![0u8; key_pair.public().modulus_len()];
        key_pair
            .sign(
                &ring::signature::RSA_PKCS1_SHA256,
                &ring::rand::SystemRandom::new(),
                signing_input.as_bytes(),
                &mut signature,
            )
            .map_err(|e| Error::Config(format!("Failed to sign JWT: {:?}", e)))?;

        Ok(format!("{}.{}", signing_input, b64.encode(&signature)))
    }

    /// Exchange a fresh assertion for an access token
    async fn refresh_token(&self) -> Result<CachedToken> {
        let key = self.read_key().await?;
        let assertion = Self::signed_assertion(&key)?;

        let response = self
            .http
            .post(&key.token_uri)
            .form(&[("grant_type", JWT_BEARER_GRANT), ("assertion", assertion.as_str())])
            .send()
            .await
            .map_err(|e| Error::Config(format!("Token exchange request failed: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Config(format!(
                "Token exchange failed ({}): {}",
                status, body
            )));
        }

        let token: TokenResponse = response
            .json()
            .await
            .map_err(|e| Error::Config(format!("Failed to parse token response: {}", e)))?;

        tracing::debug!("Refreshed GCP access token (expires in {}s)", token.expires_in);

        Ok(CachedToken {
            access_token: token.access_token,
            expires_at: Instant::now() + Duration::from_secs(token.expires_in),
        })
    }

    /// Authorization header value for the current token
    pub async fn bearer(&self) -> Result<String> {
        Ok(format!("Bearer {}", self.get_token().await?))
    }
}

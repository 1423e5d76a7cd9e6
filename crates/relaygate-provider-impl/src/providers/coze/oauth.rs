use std::sync::Arc;

use bytes::Bytes;
use jsonwebtoken::{Algorithm, EncodingKey, Header};
use tokio::sync::RwLock;

use relaygate_protocol::coze::oauth::{
    GRANT_TYPE_JWT_BEARER, JwtClaims, TOKEN_ENDPOINT, TokenRequest, TokenResponse,
};
use relaygate_provider_core::{ProviderError, ProviderResult, UpstreamClient, UpstreamHttpRequest};

use super::config::{ClientFingerprint, CozeJwtConfig};

/// Cached tokens are dropped this long before the upstream says they expire.
pub const TOKEN_EXPIRY_MARGIN_SECS: i64 = 300;
const ASSERTION_TTL_SECS: i64 = 3600;
const TOKEN_DURATION_SECS: i64 = 900;
/// `expires_in` at or above this is an absolute unix timestamp.
const ABSOLUTE_EXPIRY_FLOOR: i64 = 1_000_000_000;

pub type Clock = Arc<dyn Fn() -> i64 + Send + Sync>;

fn system_clock() -> i64 {
    time::OffsetDateTime::now_utc().unix_timestamp()
}

/// Signs RS256 assertions for one (client id, key id, base URL) identity.
pub struct JwtOAuthClient {
    fingerprint: ClientFingerprint,
    audience: String,
    key: EncodingKey,
}

impl JwtOAuthClient {
    pub fn new(config: &CozeJwtConfig, base_url: &str) -> ProviderResult<Self> {
        let key = EncodingKey::from_rsa_pem(config.private_key.as_bytes())
            .map_err(|err| ProviderError::Credential(format!("invalid private key: {err}")))?;
        Ok(Self {
            fingerprint: config.fingerprint(base_url),
            audience: audience(base_url),
            key,
        })
    }

    pub fn fingerprint(&self) -> &ClientFingerprint {
        &self.fingerprint
    }

    pub fn assertion(&self, now: i64) -> ProviderResult<String> {
        let mut header = Header::new(Algorithm::RS256);
        header.kid = Some(self.fingerprint.public_key_id.clone());
        let claims = JwtClaims {
            iss: self.fingerprint.client_id.clone(),
            aud: self.audience.clone(),
            iat: now,
            exp: now + ASSERTION_TTL_SECS,
            jti: uuid::Uuid::new_v4().simple().to_string(),
        };
        jsonwebtoken::encode(&header, &claims, &self.key)
            .map_err(|err| ProviderError::Credential(format!("sign assertion: {err}")))
    }

    pub fn token_request(
        &self,
        now: i64,
        proxy: Option<String>,
    ) -> ProviderResult<UpstreamHttpRequest> {
        let body = serde_json::to_vec(&TokenRequest {
            grant_type: GRANT_TYPE_JWT_BEARER.to_string(),
            duration_seconds: TOKEN_DURATION_SECS,
        })
        .map_err(|err| ProviderError::Credential(err.to_string()))?;
        let mut req = UpstreamHttpRequest::post_json(
            format!("{}{}", self.fingerprint.base_url, TOKEN_ENDPOINT),
            Bytes::from(body),
        )
        .with_proxy(proxy);
        crate::auth_extractor::set_bearer(&mut req.headers, &self.assertion(now)?);
        Ok(req)
    }
}

/// Host part of `base_url`, used as the assertion audience.
fn audience(base_url: &str) -> String {
    let rest = base_url
        .split_once("://")
        .map(|(_, rest)| rest)
        .unwrap_or(base_url);
    let authority = rest.split('/').next().unwrap_or_default();
    authority
        .rsplit_once(':')
        .map(|(host, _)| host)
        .unwrap_or(authority)
        .to_string()
}

/// Provider expiry minus the safety margin.
pub fn cache_expiry(now: i64, expires_in: i64) -> i64 {
    let provider_expiry = if expires_in >= ABSOLUTE_EXPIRY_FLOOR {
        expires_in
    } else {
        now + expires_in
    };
    provider_expiry - TOKEN_EXPIRY_MARGIN_SECS
}

#[derive(Clone)]
struct TokenEntry {
    token: String,
    expires_at: i64,
    fingerprint: ClientFingerprint,
}

#[derive(Clone)]
struct ClientEntry {
    client: Arc<JwtOAuthClient>,
    fingerprint: ClientFingerprint,
}

/// Bearer token and OAuth client cache owned by one provider instance.
///
/// Reads share the lock; refreshes take it exclusively only to store the
/// result, never across the network call. Concurrent misses may each
/// refresh; the last stored token wins.
pub struct CredentialCache {
    token: RwLock<Option<TokenEntry>>,
    client: RwLock<Option<ClientEntry>>,
    clock: Clock,
}

impl Default for CredentialCache {
    fn default() -> Self {
        Self::new()
    }
}

impl CredentialCache {
    pub fn new() -> Self {
        Self::with_clock(Arc::new(system_clock))
    }

    pub fn with_clock(clock: Clock) -> Self {
        Self {
            token: RwLock::new(None),
            client: RwLock::new(None),
            clock,
        }
    }

    fn now(&self) -> i64 {
        (self.clock)()
    }

    pub async fn clear(&self) {
        *self.token.write().await = None;
        *self.client.write().await = None;
    }

    pub async fn get_client(
        &self,
        config: &CozeJwtConfig,
        base_url: &str,
    ) -> ProviderResult<Arc<JwtOAuthClient>> {
        let fingerprint = config.fingerprint(base_url);
        if let Some(entry) = self.client.read().await.as_ref()
            && entry.fingerprint == fingerprint
        {
            return Ok(entry.client.clone());
        }

        tracing::info!(
            client_id = %fingerprint.client_id,
            public_key_id = %fingerprint.public_key_id,
            base_url = %fingerprint.base_url,
            "building oauth client"
        );
        let client = Arc::new(JwtOAuthClient::new(config, &fingerprint.base_url)?);
        *self.client.write().await = Some(ClientEntry {
            client: client.clone(),
            fingerprint,
        });
        Ok(client)
    }

    pub async fn get_token(
        &self,
        upstream: &dyn UpstreamClient,
        config: &CozeJwtConfig,
        base_url: &str,
    ) -> ProviderResult<String> {
        let fingerprint = config.fingerprint(base_url);
        if let Some(entry) = self.token.read().await.as_ref()
            && entry.fingerprint == fingerprint
            && !entry.token.is_empty()
            && self.now() < entry.expires_at
        {
            return Ok(entry.token.clone());
        }

        let client = self.get_client(config, base_url).await?;
        let now = self.now();
        let req = client.token_request(now, config.proxy_url.clone())?;
        let resp = upstream
            .send(req)
            .await
            .map_err(|err| ProviderError::Credential(format!("token request failed: {err}")))?;
        let status = resp.status;
        let body = resp
            .into_bytes()
            .await
            .map_err(|err| ProviderError::Credential(format!("token response read failed: {err}")))?;
        let token: TokenResponse = serde_json::from_slice(&body).map_err(|err| {
            ProviderError::Credential(format!("token response {status} not decodable: {err}"))
        })?;
        if token.access_token.trim().is_empty() {
            let reason = token
                .error_text()
                .unwrap_or_else(|| format!("status {status}"));
            tracing::warn!(
                client_id = %fingerprint.client_id,
                status,
                "oauth token request returned no token"
            );
            return Err(ProviderError::Credential(format!(
                "no access token: {reason}"
            )));
        }

        let expires_at = cache_expiry(now, token.expires_in);
        tracing::info!(
            client_id = %fingerprint.client_id,
            public_key_id = %fingerprint.public_key_id,
            expires_at,
            "oauth token refreshed"
        );
        *self.token.write().await = Some(TokenEntry {
            token: token.access_token.clone(),
            expires_at,
            fingerprint,
        });
        Ok(token.access_token)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn audience_is_bare_host() {
        assert_eq!(audience("https://api.coze.cn"), "api.coze.cn");
        assert_eq!(audience("https://api.coze.cn:8443/v1"), "api.coze.cn");
        assert_eq!(audience("api.coze.com/"), "api.coze.com");
    }

    #[test]
    fn expiry_applies_margin_to_both_forms() {
        assert_eq!(cache_expiry(1_700_000_000, 900), 1_700_000_600);
        assert_eq!(cache_expiry(1_700_000_000, 1_700_003_600), 1_700_003_300);
    }
}

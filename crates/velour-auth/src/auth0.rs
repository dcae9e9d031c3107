//! Auth0 identity provider using the OAuth 2.0 device authorization grant.
//!
//! The refresh token never leaves this module: it is kept in the credential
//! store under its own key and exchanged for fresh credentials on lookup.

use crate::gateway::with_store;
use crate::{AuthError, AuthResult, Credentials, IdentityProvider, UserProfile};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};
use url::Url;
use velour_config::IdentityProviderConfig;
use velour_storage::CredentialStore;

const DEVICE_CODE_GRANT: &str = "urn:ietf:params:oauth:grant-type:device_code";

/// Interval used when the server does not send one.
const DEFAULT_POLL_INTERVAL_SECS: u64 = 5;

/// Added to the poll interval on every `slow_down` response.
const SLOW_DOWN_STEP: Duration = Duration::from_secs(5);

/// What the user needs in order to approve this device.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceAuthorization {
    pub user_code: String,
    pub verification_uri: String,
    #[serde(default)]
    pub verification_uri_complete: Option<String>,
    pub expires_in: u64,
    #[serde(default = "default_interval")]
    pub interval: u64,
}

impl DeviceAuthorization {
    /// URL to open in a browser, with the code pre-filled when available.
    pub fn browser_url(&self) -> &str {
        self.verification_uri_complete
            .as_deref()
            .unwrap_or(&self.verification_uri)
    }
}

fn default_interval() -> u64 {
    DEFAULT_POLL_INTERVAL_SECS
}

/// Host hook that shows the device code to the user.
pub type DevicePrompt = Arc<dyn Fn(&DeviceAuthorization) + Send + Sync>;

#[derive(Debug, Deserialize)]
struct DeviceCodeResponse {
    device_code: String,
    #[serde(flatten)]
    authorization: DeviceAuthorization,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    id_token: Option<String>,
    #[serde(default)]
    refresh_token: Option<String>,
    #[serde(default)]
    expires_in: Option<i64>,
}

#[derive(Debug, Deserialize)]
struct OAuthErrorBody {
    error: String,
    #[serde(default)]
    error_description: Option<String>,
}

impl std::fmt::Display for OAuthErrorBody {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.error_description {
            Some(description) => write!(f, "{}: {}", self.error, description),
            None => f.write_str(&self.error),
        }
    }
}

#[derive(Debug, Deserialize)]
struct UserInfo {
    sub: String,
    #[serde(default)]
    email: Option<String>,
    #[serde(default)]
    email_verified: Option<bool>,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    nickname: Option<String>,
    #[serde(default)]
    picture: Option<String>,
    #[serde(default)]
    created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    updated_at: Option<DateTime<Utc>>,
}

impl From<UserInfo> for UserProfile {
    fn from(info: UserInfo) -> Self {
        Self {
            id: info.sub,
            email: info.email,
            display_name: info.name.or(info.nickname),
            avatar_url: info.picture,
            email_verified: info.email_verified.unwrap_or(false),
            created_at: info.created_at,
            updated_at: info.updated_at,
        }
    }
}

#[derive(Serialize)]
struct RevokeRequest<'a> {
    client_id: &'a str,
    token: &'a str,
}

/// [`IdentityProvider`] backed by an Auth0 tenant.
pub struct Auth0Gateway {
    http: Client,
    base_url: Url,
    client_id: String,
    audience: String,
    scope: String,
    store: CredentialStore,
    prompt: DevicePrompt,
    slow_down_step: Duration,
}

impl Auth0Gateway {
    pub fn new(
        config: &IdentityProviderConfig,
        store: CredentialStore,
        request_timeout: Duration,
    ) -> AuthResult<Self> {
        let base_url = config
            .base_url()
            .map_err(|e| AuthError::Config(e.to_string()))?;
        let http = Client::builder().timeout(request_timeout).build()?;

        Ok(Self {
            http,
            base_url,
            client_id: config.client_id.clone(),
            audience: config.audience.clone(),
            scope: config.scope.clone(),
            store,
            prompt: Arc::new(|auth: &DeviceAuthorization| {
                info!(
                    user_code = %auth.user_code,
                    url = %auth.browser_url(),
                    "Approve this device to finish signing in"
                );
            }),
            slow_down_step: SLOW_DOWN_STEP,
        })
    }

    /// Replace how the device code is shown to the user.
    pub fn with_prompt<F>(mut self, prompt: F) -> Self
    where
        F: Fn(&DeviceAuthorization) + Send + Sync + 'static,
    {
        self.prompt = Arc::new(prompt);
        self
    }

    fn endpoint(&self, path: &str) -> AuthResult<Url> {
        Ok(self.base_url.join(path)?)
    }

    async fn request_device_code(&self) -> AuthResult<DeviceCodeResponse> {
        let url = self.endpoint("oauth/device/code")?;
        debug!(url = %url, "Requesting device code");

        let response = self
            .http
            .post(url)
            .form(&[
                ("client_id", self.client_id.as_str()),
                ("scope", self.scope.as_str()),
                ("audience", self.audience.as_str()),
            ])
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(classify_failure(status, &body));
        }
        Ok(response.json().await?)
    }

    /// POST to the token endpoint. OAuth error bodies come back as `Ok(Err(..))`.
    async fn token_request(
        &self,
        form: &[(&str, &str)],
    ) -> AuthResult<Result<TokenResponse, OAuthErrorBody>> {
        let url = self.endpoint("oauth/token")?;
        let response = self.http.post(url).form(form).send().await?;

        let status = response.status();
        if status.is_success() {
            return Ok(Ok(response.json().await?));
        }

        let body = response.text().await.unwrap_or_default();
        match serde_json::from_str::<OAuthErrorBody>(&body) {
            Ok(oauth) if status.is_client_error() => Ok(Err(oauth)),
            _ => Err(classify_failure(status, &body)),
        }
    }

    async fn fetch_user(&self, access_token: &str) -> AuthResult<UserProfile> {
        let url = self.endpoint("userinfo")?;
        let response = self.http.get(url).bearer_auth(access_token).send().await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(classify_failure(status, &body));
        }
        let info: UserInfo = response.json().await?;
        Ok(info.into())
    }

    async fn keep_refresh_token(&self, refresh_token: Option<String>) -> AuthResult<()> {
        let Some(refresh_token) = refresh_token else {
            return Ok(());
        };
        with_store(&self.store, move |store| {
            store.set_refresh_token(&refresh_token)
        })
        .await
    }

    /// Turn a token response into credentials. Does not touch the store.
    async fn credentials_from(&self, tokens: TokenResponse) -> AuthResult<Credentials> {
        let user = self.fetch_user(&tokens.access_token).await?;
        let expires_at = tokens
            .expires_in
            .and_then(chrono::Duration::try_seconds)
            .and_then(|ttl| Utc::now().checked_add_signed(ttl));

        Ok(Credentials {
            user,
            access_token: tokens.access_token,
            id_token: tokens.id_token,
            expires_at,
        })
    }

    async fn poll_for_tokens(
        &self,
        device_code: &str,
        authorization: &DeviceAuthorization,
    ) -> AuthResult<TokenResponse> {
        let deadline = Instant::now()
            .checked_add(Duration::from_secs(authorization.expires_in))
            .ok_or_else(|| {
                AuthError::Provider(format!(
                    "device code lifetime out of range: {}s",
                    authorization.expires_in
                ))
            })?;
        let mut interval = Duration::from_secs(authorization.interval);

        loop {
            tokio::time::sleep(interval).await;
            if Instant::now() >= deadline {
                return Err(AuthError::Provider("device code expired".to_string()));
            }

            let form = [
                ("grant_type", DEVICE_CODE_GRANT),
                ("device_code", device_code),
                ("client_id", self.client_id.as_str()),
            ];
            match self.token_request(&form).await {
                Ok(Ok(tokens)) => return Ok(tokens),
                Ok(Err(oauth)) => match oauth.error.as_str() {
                    "authorization_pending" => continue,
                    "slow_down" => {
                        interval = interval.saturating_add(self.slow_down_step);
                        debug!(interval_secs = interval.as_secs(), "Provider asked to slow down");
                    }
                    "access_denied" => return Err(AuthError::UserCancelled),
                    "expired_token" => {
                        return Err(AuthError::Provider("device code expired".to_string()))
                    }
                    _ => return Err(AuthError::Provider(oauth.to_string())),
                },
                Err(e) if e.is_transient() => {
                    warn!(error = %e, "Device poll failed, will retry");
                }
                Err(e) => return Err(e),
            }
        }
    }
}

/// Map a non-OAuth HTTP failure onto the error taxonomy.
fn classify_failure(status: reqwest::StatusCode, body: &str) -> AuthError {
    let detail = match serde_json::from_str::<OAuthErrorBody>(body) {
        Ok(oauth) => oauth.to_string(),
        Err(_) => body.trim().to_string(),
    };
    if status.is_server_error() {
        AuthError::Network(format!("HTTP {}: {}", status, detail))
    } else {
        AuthError::Provider(format!("HTTP {}: {}", status, detail))
    }
}

#[async_trait]
impl IdentityProvider for Auth0Gateway {
    async fn lookup_session(&self) -> AuthResult<Option<Credentials>> {
        let Some(refresh_token) = with_store(&self.store, |store| store.refresh_token()).await?
        else {
            debug!("No refresh token stored");
            return Ok(None);
        };

        let form = [
            ("grant_type", "refresh_token"),
            ("client_id", self.client_id.as_str()),
            ("refresh_token", refresh_token.as_str()),
        ];
        match self.token_request(&form).await? {
            Ok(tokens) => {
                // The old token is spent once the provider rotates it
                self.keep_refresh_token(tokens.refresh_token.clone()).await?;
                self.credentials_from(tokens).await.map(Some)
            }
            Err(oauth) if oauth.error == "invalid_grant" => {
                info!(reason = %oauth, "Refresh token rejected, session is gone");
                with_store(&self.store, |store| store.delete_refresh_token()).await?;
                Ok(None)
            }
            Err(oauth) => Err(AuthError::Provider(oauth.to_string())),
        }
    }

    async fn interactive_login(&self) -> AuthResult<Credentials> {
        let DeviceCodeResponse {
            device_code,
            authorization,
        } = self.request_device_code().await?;

        (self.prompt)(&authorization);

        let tokens = self.poll_for_tokens(&device_code, &authorization).await?;
        let refresh_token = tokens.refresh_token.clone();
        // Stored only once the sign-in can no longer fail
        let credentials = self.credentials_from(tokens).await?;
        self.keep_refresh_token(refresh_token).await?;
        Ok(credentials)
    }

    async fn clear_session(&self) -> AuthResult<()> {
        let refresh_token = with_store(&self.store, |store| store.refresh_token()).await?;

        let revoked = match refresh_token {
            Some(token) => self.revoke(&token).await,
            None => Ok(()),
        };

        with_store(&self.store, |store| store.delete_refresh_token()).await?;
        revoked
    }
}

impl Auth0Gateway {
    async fn revoke(&self, token: &str) -> AuthResult<()> {
        let url = self.endpoint("oauth/revoke")?;
        let response = self
            .http
            .post(url)
            .json(&RevokeRequest {
                client_id: &self.client_id,
                token,
            })
            .send()
            .await
            .map_err(|e| AuthError::Network(e.to_string()))?;

        let status = response.status();
        if status.is_success() {
            debug!("Refresh token revoked");
            return Ok(());
        }
        let body = response.text().await.unwrap_or_default();
        Err(classify_failure(status, &body))
    }
}

//! HTTP client for the backend profile service.

use crate::{AuthError, AuthResult, ProfileSync, UserProfile};
use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;
use std::time::Duration;
use tracing::debug;
use url::Url;

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct SyncRequest<'a> {
    user_id: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    email: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    name: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    picture: Option<&'a str>,
    email_verified: bool,
}

impl<'a> From<&'a UserProfile> for SyncRequest<'a> {
    fn from(user: &'a UserProfile) -> Self {
        Self {
            user_id: &user.id,
            email: user.email.as_deref(),
            name: user.display_name.as_deref(),
            picture: user.avatar_url.as_deref(),
            email_verified: user.email_verified,
        }
    }
}

/// Posts the signed-in identity to `{base}/users/sync`.
#[derive(Debug, Clone)]
pub struct ProfileClient {
    http: Client,
    sync_url: Url,
}

impl ProfileClient {
    pub fn new(base: Url, timeout: Duration) -> AuthResult<Self> {
        let base = if base.path().ends_with('/') {
            base
        } else {
            let mut base = base;
            let path = format!("{}/", base.path());
            base.set_path(&path);
            base
        };
        let sync_url = base.join("users/sync")?;
        let http = Client::builder().timeout(timeout).build()?;
        Ok(Self { http, sync_url })
    }

    pub fn sync_url(&self) -> &Url {
        &self.sync_url
    }
}

#[async_trait]
impl ProfileSync for ProfileClient {
    async fn sync_identity(&self, user: &UserProfile, access_token: &str) -> AuthResult<()> {
        let response = self
            .http
            .post(self.sync_url.clone())
            .bearer_auth(access_token)
            .json(&SyncRequest::from(user))
            .send()
            .await?;

        let status = response.status();
        if status.is_success() {
            debug!(user_id = %user.id, "Profile synced");
            return Ok(());
        }

        let body = response.text().await.unwrap_or_default();
        let message = format!("profile sync returned HTTP {}: {}", status, body.trim());
        if status.is_server_error() {
            Err(AuthError::Network(message))
        } else {
            Err(AuthError::Provider(message))
        }
    }
}

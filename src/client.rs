// Authorized request dispatch
//
// Every outgoing call picks up the current access credential as a bearer
// header. A 401 on the first attempt enters the single-flight renewal path
// and the call is redispatched exactly once; a second 401, or a failed
// renewal, tears the session down. A 403 goes straight to the
// permission-denied path: the credential is valid and renewing it cannot
// help.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use once_cell::sync::Lazy;
use reqwest::{Client, Method, Response, StatusCode};
use serde_json::Value;

use crate::config::Config;
use crate::error::{ApiError, AuthError, RefreshError};
use crate::session::{
    extract_error_message, AuthService, RefreshCoordinator, Role, Session, SessionFailureHandler,
    TokenStore, View,
};

/// User-Agent carrying a stable per-machine fingerprint
static USER_AGENT: Lazy<String> = Lazy::new(|| {
    use std::collections::hash_map::DefaultHasher;
    use std::hash::{Hash, Hasher};

    let host = hostname::get()
        .ok()
        .and_then(|h| h.into_string().ok())
        .unwrap_or_else(|| "unknown".to_string());
    let mut hasher = DefaultHasher::new();
    host.hash(&mut hasher);
    format!(
        "elearn-client/{}-{:x}",
        env!("CARGO_PKG_VERSION"),
        hasher.finish()
    )
});

/// Description of an outgoing call. Immutable; retry state lives in the
/// dispatch loop, never on the request itself.
#[derive(Debug, Clone)]
pub struct ApiRequest {
    pub method: Method,
    pub path: String,
    pub body: Option<Value>,
}

impl ApiRequest {
    pub fn get(path: impl Into<String>) -> ApiRequest {
        ApiRequest {
            method: Method::GET,
            path: path.into(),
            body: None,
        }
    }

    pub fn post(path: impl Into<String>, body: Value) -> ApiRequest {
        ApiRequest {
            method: Method::POST,
            path: path.into(),
            body: Some(body),
        }
    }

    pub fn patch(path: impl Into<String>, body: Value) -> ApiRequest {
        ApiRequest {
            method: Method::PATCH,
            path: path.into(),
            body: Some(body),
        }
    }

    pub fn delete(path: impl Into<String>) -> ApiRequest {
        ApiRequest {
            method: Method::DELETE,
            path: path.into(),
            body: None,
        }
    }
}

/// Attempt state of a single call; moves forward once, never back
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Attempt {
    First,
    Retried,
}

/// HTTP client for the elearn backend with session handling
pub struct ElearnClient {
    http: Client,
    base_url: String,
    store: Arc<TokenStore>,
    auth: Arc<AuthService>,
    refresher: RefreshCoordinator,
    failure: SessionFailureHandler,
}

impl ElearnClient {
    /// Build the client: pooled connections, storage opened and read once,
    /// initial view derived from whether a session was resumed.
    pub async fn new(config: &Config) -> Result<ElearnClient> {
        let store = Arc::new(TokenStore::open(&config.storage_path)?);
        Self::with_store(config, store).await
    }

    /// Same, over an already-opened store (tests, ephemeral sessions)
    pub async fn with_store(config: &Config, store: Arc<TokenStore>) -> Result<ElearnClient> {
        let http = Client::builder()
            .user_agent(USER_AGENT.as_str())
            .connect_timeout(Duration::from_secs(config.http_connect_timeout))
            .timeout(Duration::from_secs(config.http_request_timeout))
            .build()
            .context("failed to create HTTP client")?;

        let base_url = config.base_url.trim_end_matches('/').to_string();
        let auth = Arc::new(AuthService::new(http.clone(), base_url.clone()));
        let refresher = RefreshCoordinator::new(
            store.clone(),
            auth.clone(),
            Duration::from_secs(config.refresh_timeout),
        );
        let initial = if store.get().await.is_some() {
            View::Dashboard
        } else {
            View::Login
        };
        let failure = SessionFailureHandler::new(store.clone(), initial);

        Ok(ElearnClient {
            http,
            base_url,
            store,
            auth,
            refresher,
            failure,
        })
    }

    pub fn store(&self) -> &Arc<TokenStore> {
        &self.store
    }

    pub fn failure(&self) -> &SessionFailureHandler {
        &self.failure
    }

    /// The public authentication calls (password reset flow)
    pub fn auth(&self) -> &AuthService {
        &self.auth
    }

    /// Sign in and publish the session
    pub async fn login(
        &self,
        identifier: &str,
        secret: &str,
        expected_role: Role,
    ) -> Result<Session, AuthError> {
        let session = self.auth.login(identifier, secret, expected_role).await?;
        self.store
            .set(session.credentials.clone(), Some(session.identity.clone()))
            .await
            .map_err(|e| AuthError::Storage(e.to_string()))?;
        self.failure.signed_in();
        Ok(session)
    }

    /// Local-only logout: clears stored credentials, no network call
    pub async fn logout(&self) -> Result<()> {
        self.store.clear().await?;
        self.failure.signed_out();
        tracing::info!("signed out");
        Ok(())
    }

    /// Execute a call through the authorized path. Statuses other than
    /// 401/403 are returned to the caller untouched.
    pub async fn execute(&self, request: ApiRequest) -> Result<Response, ApiError> {
        let request_id = short_request_id();
        let mut attempt = Attempt::First;

        loop {
            let response = self.dispatch(&request, &request_id).await?;
            match response.status() {
                StatusCode::UNAUTHORIZED => match attempt {
                    Attempt::First => {
                        tracing::debug!(request_id = %request_id, "401 received, renewing credential");
                        if let Err(e) = self.refresher.renewed_access().await {
                            tracing::warn!(request_id = %request_id, error = %e, "renewal failed");
                            self.failure.on_unauthenticated().await;
                            return Err(ApiError::SessionReset(e));
                        }
                        attempt = Attempt::Retried;
                    }
                    Attempt::Retried => {
                        tracing::warn!(request_id = %request_id, "renewed credential rejected");
                        self.failure.on_unauthenticated().await;
                        return Err(ApiError::SessionReset(RefreshError::AccessRejected));
                    }
                },
                StatusCode::FORBIDDEN => {
                    let text = response.text().await.unwrap_or_default();
                    let message = extract_error_message(&text)
                        .unwrap_or_else(|| "insufficient permission".to_string());
                    tracing::warn!(request_id = %request_id, "403 received: {message}");
                    self.failure.on_forbidden();
                    return Err(ApiError::PermissionDenied(message));
                }
                _ => return Ok(response),
            }
        }
    }

    /// Execute and decode a JSON body; non-success statuses become
    /// `ApiError::Api` carrying the backend's message.
    pub async fn execute_value(&self, request: ApiRequest) -> Result<Value, ApiError> {
        let response = self.execute(request).await?;
        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            let message = extract_error_message(&text).unwrap_or(text);
            return Err(ApiError::Api {
                status: status.as_u16(),
                message,
            });
        }
        let body = response
            .json()
            .await
            .context("failed to decode response body")?;
        Ok(body)
    }

    async fn dispatch(
        &self,
        request: &ApiRequest,
        request_id: &str,
    ) -> Result<Response, reqwest::Error> {
        let url = format!("{}/{}", self.base_url, request.path.trim_start_matches('/'));
        let mut builder = self.http.request(request.method.clone(), &url);
        if let Some(pair) = self.store.get().await {
            builder = builder.bearer_auth(&pair.access);
        }
        if let Some(body) = &request.body {
            builder = builder.json(body);
        }
        tracing::debug!(
            request_id = %request_id,
            method = %request.method,
            url = %url,
            "dispatching"
        );
        builder.send().await
    }
}

fn short_request_id() -> String {
    uuid::Uuid::new_v4().to_string()[..8].to_string()
}

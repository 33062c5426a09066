// Wire-level authentication calls
//
// The only network-facing primitives the renewal path and the login UI
// depend on. Stateless: holds the shared HTTP client and the base URL.

use reqwest::Client;
use serde::Serialize;
use serde_json::Value;

use crate::error::{AuthError, RefreshError};

use super::types::{
    extract_access, extract_error_message, ConfirmPasswordResetRequest, CredentialPair,
    LoginPayload, LoginRequest, PasswordResetRequest, RefreshRequest, Role, Session, UserIdentity,
    VerifyOtpRequest,
};

const LOGIN_PATH: &str = "login";
const REFRESH_PATH: &str = "token/refresh";
const RESET_REQUEST_PATH: &str = "password-reset/request";
const RESET_VERIFY_PATH: &str = "password-reset/verify";
const RESET_CONFIRM_PATH: &str = "password-reset/confirm";

pub struct AuthService {
    http: Client,
    base_url: String,
}

impl AuthService {
    pub fn new(http: Client, base_url: impl Into<String>) -> AuthService {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        AuthService { http, base_url }
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path)
    }

    /// Issue the initial credential pair. The backend echoes the role; a
    /// response for a different role than the one asked for is a failure
    /// and nothing gets stored.
    pub async fn login(
        &self,
        identifier: &str,
        secret: &str,
        expected_role: Role,
    ) -> Result<Session, AuthError> {
        tracing::debug!(role = %expected_role, "logging in");
        let request = LoginRequest {
            identifier,
            secret,
            expected_role: expected_role.as_backend(),
        };
        let response = self
            .http
            .post(self.endpoint(LOGIN_PATH))
            .json(&request)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            let message = extract_error_message(&text)
                .unwrap_or_else(|| format!("login failed with status {status}"));
            tracing::warn!(%status, "login rejected: {message}");
            return Err(AuthError::InvalidCredentials(message));
        }

        let body: Value = response
            .json()
            .await
            .map_err(|_| AuthError::MalformedResponse)?;
        let payload = LoginPayload::from_body(&body).ok_or(AuthError::MalformedResponse)?;

        let role = Role::parse(&payload.role).ok_or_else(|| AuthError::RoleMismatch {
            expected: expected_role,
            actual: payload.role.clone(),
        })?;
        if role != expected_role {
            return Err(AuthError::RoleMismatch {
                expected: expected_role,
                actual: payload.role,
            });
        }

        tracing::info!(user = %payload.display_name, %role, "login successful");
        Ok(Session {
            identity: UserIdentity {
                user_id: payload.user_id,
                email: payload.email,
                avatar: UserIdentity::avatar_url(&payload.display_name),
                display_name: payload.display_name,
                role,
            },
            credentials: CredentialPair {
                access: payload.access,
                refresh: payload.refresh,
            },
        })
    }

    /// Mint a new access credential from a refresh credential. The bounded
    /// timeout is applied by the renewal coordinator.
    pub async fn renew(&self, refresh: &str) -> Result<String, RefreshError> {
        tracing::debug!("renewing access credential");
        let request = RefreshRequest { refresh };
        let response = self
            .http
            .post(self.endpoint(REFRESH_PATH))
            .json(&request)
            .send()
            .await
            .map_err(|e| RefreshError::Network(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            let message =
                extract_error_message(&text).unwrap_or_else(|| format!("status {status}"));
            tracing::warn!(%status, "refresh rejected: {message}");
            return Err(RefreshError::Rejected(message));
        }

        let body: Value = response
            .json()
            .await
            .map_err(|e| RefreshError::Network(e.to_string()))?;
        extract_access(&body).ok_or_else(|| {
            RefreshError::Rejected("renewal response carried no access credential".to_string())
        })
    }

    /// Password reset step 1: have an OTP mailed to the address
    pub async fn request_password_reset(&self, email: &str) -> Result<String, AuthError> {
        let body = self
            .public_post(RESET_REQUEST_PATH, &PasswordResetRequest { email })
            .await?;
        Ok(response_message(&body, "OTP sent"))
    }

    /// Password reset step 2: check the 6-digit OTP
    pub async fn verify_reset_otp(&self, email: &str, otp: &str) -> Result<String, AuthError> {
        let body = self
            .public_post(RESET_VERIFY_PATH, &VerifyOtpRequest { email, otp })
            .await?;
        Ok(response_message(&body, "OTP verified"))
    }

    /// Password reset step 3: set the new secret. The backend re-checks
    /// the OTP, so it travels again.
    pub async fn confirm_password_reset(
        &self,
        email: &str,
        otp: &str,
        new_password: &str,
        confirm_password: &str,
    ) -> Result<String, AuthError> {
        let request = ConfirmPasswordResetRequest {
            email,
            otp,
            new_password,
            confirm_password,
        };
        let body = self.public_post(RESET_CONFIRM_PATH, &request).await?;
        Ok(response_message(&body, "Password reset"))
    }

    async fn public_post<T: Serialize>(&self, path: &str, request: &T) -> Result<Value, AuthError> {
        let response = self
            .http
            .post(self.endpoint(path))
            .json(request)
            .send()
            .await?;
        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            let message =
                extract_error_message(&text).unwrap_or_else(|| format!("status {status}"));
            return Err(AuthError::Rejected(message));
        }
        response.json().await.map_err(|_| AuthError::MalformedResponse)
    }
}

fn response_message(body: &Value, fallback: &str) -> String {
    body.get("message")
        .and_then(Value::as_str)
        .unwrap_or(fallback)
        .to_string()
}

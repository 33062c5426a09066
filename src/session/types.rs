// Session data and wire types

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Avatar service the dashboard seeds with the user's display name.
const AVATAR_URL_BASE: &str = "https://api.dicebear.com/7.x/avataaars/svg?seed=";

/// Role a dashboard user signs in as
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Admin,
    Teacher,
    Student,
}

impl Role {
    /// Parse any spelling the backend or a user may produce
    /// ("Admin", "TEACHER", "student", ...)
    pub fn parse(s: &str) -> Option<Role> {
        match s.to_lowercase().as_str() {
            "admin" => Some(Role::Admin),
            "teacher" => Some(Role::Teacher),
            "student" => Some(Role::Student),
            _ => None,
        }
    }

    /// Spelling the backend expects in `expected_role`
    pub fn as_backend(&self) -> &'static str {
        match self {
            Role::Admin => "Admin",
            Role::Teacher => "Teacher",
            Role::Student => "Student",
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Role::Admin => "admin",
            Role::Teacher => "teacher",
            Role::Student => "student",
        };
        f.write_str(name)
    }
}

/// Access/refresh credential pair.
/// Both are opaque to the client; the store only ever holds the two
/// together (no access credential without a refresh capable of renewing it).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CredentialPair {
    pub access: String,
    pub refresh: String,
}

/// Cached identity of the signed-in user
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserIdentity {
    pub user_id: String,
    pub email: String,
    pub display_name: String,
    pub role: Role,
    pub avatar: String,
}

impl UserIdentity {
    /// Derived avatar URL, seeded the way the dashboard seeds it
    pub fn avatar_url(display_name: &str) -> String {
        format!("{}{}", AVATAR_URL_BASE, display_name)
    }
}

/// A signed-in session: identity plus the credentials that authorize it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    pub identity: UserIdentity,
    pub credentials: CredentialPair,
}

// === Wire types ===

/// Login request body
#[derive(Debug, Serialize)]
pub struct LoginRequest<'a> {
    pub identifier: &'a str,
    pub secret: &'a str,
    pub expected_role: &'a str,
}

/// Credential renewal request body
#[derive(Debug, Serialize)]
pub struct RefreshRequest<'a> {
    pub refresh: &'a str,
}

/// Password reset step 1: request an OTP for an email
#[derive(Debug, Serialize)]
pub struct PasswordResetRequest<'a> {
    pub email: &'a str,
}

/// Password reset step 2: verify the 6-digit OTP
#[derive(Debug, Serialize)]
pub struct VerifyOtpRequest<'a> {
    pub email: &'a str,
    pub otp: &'a str,
}

/// Password reset step 3: set the new secret (the backend re-checks the OTP)
#[derive(Debug, Serialize)]
pub struct ConfirmPasswordResetRequest<'a> {
    pub email: &'a str,
    pub otp: &'a str,
    pub new_password: &'a str,
    pub confirm_password: &'a str,
}

// === Response envelope handling ===
//
// The backend wraps every response in `{success, message, data, ...}` and is
// not consistent about whether token fields live inside `data` or at the top
// level, so extraction checks both, nested first.

/// Look a key up inside `data`, then at the top level
pub fn envelope_field<'a>(body: &'a Value, key: &str) -> Option<&'a Value> {
    body.get("data")
        .and_then(|data| data.get(key))
        .or_else(|| body.get(key))
}

fn first_string(body: &Value, keys: &[&str]) -> Option<String> {
    keys.iter()
        .find_map(|key| envelope_field(body, key))
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .map(str::to_owned)
}

/// Access credential from a login or renewal response
pub fn extract_access(body: &Value) -> Option<String> {
    first_string(body, &["access", "access_token"])
}

/// Refresh credential from a login response
pub fn extract_refresh(body: &Value) -> Option<String> {
    first_string(body, &["refresh", "refresh_token"])
}

/// Human-readable message from an error body.
/// The backend uses `message` for its own service errors and `detail` for
/// framework-generated ones.
pub fn extract_error_message(text: &str) -> Option<String> {
    let body: Value = serde_json::from_str(text).ok()?;
    ["message", "detail"]
        .iter()
        .find_map(|key| body.get(key))
        .and_then(Value::as_str)
        .map(str::to_owned)
}

/// Fields of a successful login, flattened out of the envelope
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoginPayload {
    pub access: String,
    pub refresh: String,
    pub user_id: String,
    pub email: String,
    pub display_name: String,
    pub role: String,
}

impl LoginPayload {
    /// Flatten a login response body. Identity fields arrive under `data`
    /// and tokens at the top level, but any mix is accepted.
    pub fn from_body(body: &Value) -> Option<LoginPayload> {
        Some(LoginPayload {
            access: extract_access(body)?,
            refresh: extract_refresh(body)?,
            user_id: first_string(body, &["user_id", "user_code"])?,
            email: first_string(body, &["email"]).unwrap_or_default(),
            display_name: first_string(body, &["display_name", "fullname"])?,
            role: first_string(body, &["role"])?,
        })
    }
}

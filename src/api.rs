// Typed wrappers over the authorized request path
//
// Page-level callers (courses, batches, users, content) dispatch through
// the shared client the same way; only the auth-domain endpoints live in
// this crate.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::client::{ApiRequest, ElearnClient};
use crate::error::ApiError;
use crate::session::{Role, UserIdentity};

const PROFILE_PATH: &str = "profile";

/// User profile as served by the profile endpoint
#[derive(Debug, Clone, Deserialize)]
pub struct UserProfile {
    #[serde(alias = "user_code")]
    pub user_id: String,
    pub email: String,
    #[serde(alias = "fullname")]
    pub display_name: String,
    #[serde(default)]
    pub role: Option<String>,
    #[serde(default)]
    pub phone_number_code: Option<String>,
    #[serde(default)]
    pub contact_number: Option<String>,
}

/// Profile fields a user may change about themselves
#[derive(Debug, Clone, Default, Serialize)]
pub struct ProfileUpdate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fullname: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phone_number_code: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub contact_number: Option<String>,
}

/// Fetch the signed-in user's profile. A successful fetch also refreshes
/// the cached identity.
pub async fn fetch_profile(client: &ElearnClient) -> Result<UserProfile, ApiError> {
    let body = client.execute_value(ApiRequest::get(PROFILE_PATH)).await?;
    let profile = decode_profile(&body)?;
    cache_identity(client, &profile).await;
    Ok(profile)
}

/// Update profile fields; the cached identity follows the response
pub async fn update_profile(
    client: &ElearnClient,
    update: &ProfileUpdate,
) -> Result<UserProfile, ApiError> {
    let payload = serde_json::to_value(update)
        .map_err(|e| ApiError::Internal(anyhow::anyhow!("failed to encode profile update: {e}")))?;
    let body = client
        .execute_value(ApiRequest::patch(PROFILE_PATH, payload))
        .await?;
    let profile = decode_profile(&body)?;
    cache_identity(client, &profile).await;
    Ok(profile)
}

fn decode_profile(body: &Value) -> Result<UserProfile, ApiError> {
    let data = body.get("data").unwrap_or(body);
    serde_json::from_value(data.clone())
        .map_err(|e| ApiError::Internal(anyhow::anyhow!("failed to decode profile: {e}")))
}

async fn cache_identity(client: &ElearnClient, profile: &UserProfile) {
    let cached_role = client
        .store()
        .identity()
        .await
        .map(|identity| identity.role);
    let Some(role) = profile.role.as_deref().and_then(Role::parse).or(cached_role) else {
        tracing::debug!("profile carried no usable role, identity cache left alone");
        return;
    };
    let identity = UserIdentity {
        user_id: profile.user_id.clone(),
        email: profile.email.clone(),
        display_name: profile.display_name.clone(),
        role,
        avatar: UserIdentity::avatar_url(&profile.display_name),
    };
    if let Err(e) = client.store().set_identity(identity).await {
        tracing::error!("failed to cache identity: {e:#}");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_decode_profile_from_envelope() {
        let body = json!({
            "success": true,
            "message": "Profile retrieved successfully",
            "data": {
                "user_code": "U-9",
                "email": "jane@example.com",
                "fullname": "Jane Doe",
                "role": "Teacher",
                "phone_number_code": "+62",
                "contact_number": "81234"
            }
        });
        let profile = decode_profile(&body).unwrap();
        assert_eq!(profile.user_id, "U-9");
        assert_eq!(profile.display_name, "Jane Doe");
        assert_eq!(profile.role.as_deref(), Some("Teacher"));
        assert_eq!(profile.phone_number_code.as_deref(), Some("+62"));
    }

    #[test]
    fn test_decode_profile_flat_body() {
        let body = json!({
            "user_id": "U-1",
            "email": "x@example.com",
            "display_name": "X"
        });
        let profile = decode_profile(&body).unwrap();
        assert_eq!(profile.user_id, "U-1");
        assert!(profile.role.is_none());
    }

    #[test]
    fn test_decode_profile_missing_fields_fails() {
        let body = json!({"data": {"email": "x@example.com"}});
        assert!(decode_profile(&body).is_err());
    }

    #[test]
    fn test_profile_update_skips_unset_fields() {
        let update = ProfileUpdate {
            fullname: Some("New Name".to_string()),
            ..ProfileUpdate::default()
        };
        let payload = serde_json::to_value(&update).unwrap();
        assert_eq!(payload, json!({"fullname": "New Name"}));
    }
}

// Integration tests for the session layer
//
// These drive the full client against a mock backend: bearer attachment,
// single-flight renewal, retry-once semantics, permission-denied routing,
// session teardown and storage resumption.

use std::sync::Arc;

use mockito::Matcher;
use serde_json::json;

use elearn_client::client::{ApiRequest, ElearnClient};
use elearn_client::config::Config;
use elearn_client::error::{ApiError, RefreshError};
use elearn_client::session::{CredentialPair, Role, TokenStore, UserIdentity, View};

// ==================================================================================================
// Test Helpers
// ==================================================================================================

fn test_config(base_url: String) -> Config {
    Config {
        base_url,
        storage_path: std::path::PathBuf::from("unused.sqlite3"),
        log_level: "info".to_string(),
        http_connect_timeout: 5,
        http_request_timeout: 10,
        refresh_timeout: 5,
    }
}

fn pair(access: &str, refresh: &str) -> CredentialPair {
    CredentialPair {
        access: access.to_string(),
        refresh: refresh.to_string(),
    }
}

fn identity() -> UserIdentity {
    UserIdentity {
        user_id: "U-1".to_string(),
        email: "jane@example.com".to_string(),
        display_name: "Jane Doe".to_string(),
        role: Role::Teacher,
        avatar: UserIdentity::avatar_url("Jane Doe"),
    }
}

/// Client with a volatile store already holding {A1, R1}
async fn signed_in_client(base_url: String) -> ElearnClient {
    let store = Arc::new(TokenStore::in_memory().expect("in-memory store"));
    store
        .set(pair("A1", "R1"), Some(identity()))
        .await
        .expect("seed store");
    ElearnClient::with_store(&test_config(base_url), store)
        .await
        .expect("build client")
}

/// Client with an empty volatile store
async fn signed_out_client(base_url: String) -> ElearnClient {
    let store = Arc::new(TokenStore::in_memory().expect("in-memory store"));
    ElearnClient::with_store(&test_config(base_url), store)
        .await
        .expect("build client")
}

// ==================================================================================================
// Single-Flight Renewal
// ==================================================================================================

#[tokio::test]
async fn test_concurrent_401s_issue_one_renewal() {
    let mut server = mockito::Server::new_async().await;

    // Old credential is rejected everywhere
    for path in ["/courses", "/batches", "/users"] {
        server
            .mock("GET", path)
            .match_header("authorization", "Bearer A1")
            .with_status(401)
            .create_async()
            .await;
        server
            .mock("GET", path)
            .match_header("authorization", "Bearer A2")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"success": true, "data": []}"#)
            .create_async()
            .await;
    }
    let refresh = server
        .mock("POST", "/token/refresh")
        .match_body(Matcher::PartialJson(json!({"refresh": "R1"})))
        .with_status(200)
        .with_body(r#"{"success": true, "message": "Token refreshed", "access": "A2"}"#)
        .expect(1)
        .create_async()
        .await;

    let client = signed_in_client(server.url()).await;
    let (a, b, c) = tokio::join!(
        client.execute(ApiRequest::get("courses")),
        client.execute(ApiRequest::get("batches")),
        client.execute(ApiRequest::get("users")),
    );

    assert_eq!(a.expect("call a").status(), 200);
    assert_eq!(b.expect("call b").status(), 200);
    assert_eq!(c.expect("call c").status(), 200);
    assert_eq!(client.store().get().await, Some(pair("A2", "R1")));
    refresh.assert_async().await;
}

#[tokio::test]
async fn test_single_call_renews_and_redispatches_once() {
    let mut server = mockito::Server::new_async().await;
    let stale = server
        .mock("GET", "/dashboard")
        .match_header("authorization", "Bearer A1")
        .with_status(401)
        .expect(1)
        .create_async()
        .await;
    let fresh = server
        .mock("GET", "/dashboard")
        .match_header("authorization", "Bearer A2")
        .with_status(200)
        .with_body(r#"{"success": true, "data": {"courses": 3}}"#)
        .expect(1)
        .create_async()
        .await;
    let refresh = server
        .mock("POST", "/token/refresh")
        .with_status(200)
        .with_body(r#"{"access": "A2"}"#)
        .expect(1)
        .create_async()
        .await;

    let client = signed_in_client(server.url()).await;
    let response = client
        .execute(ApiRequest::get("dashboard"))
        .await
        .expect("redispatched call");

    assert_eq!(response.status(), 200);
    // The refresh credential is untouched by a renewal
    assert_eq!(client.store().get().await, Some(pair("A2", "R1")));
    stale.assert_async().await;
    fresh.assert_async().await;
    refresh.assert_async().await;
}

// ==================================================================================================
// Retry-Once and Teardown
// ==================================================================================================

#[tokio::test]
async fn test_second_401_escalates_without_second_renewal() {
    let mut server = mockito::Server::new_async().await;
    // Rejects the old and the renewed credential alike
    let rejected = server
        .mock("GET", "/courses")
        .with_status(401)
        .expect(2)
        .create_async()
        .await;
    let refresh = server
        .mock("POST", "/token/refresh")
        .with_status(200)
        .with_body(r#"{"access": "A2"}"#)
        .expect(1)
        .create_async()
        .await;

    let client = signed_in_client(server.url()).await;
    let err = client
        .execute(ApiRequest::get("courses"))
        .await
        .expect_err("second 401 must escalate");

    match err {
        ApiError::SessionReset(reason) => assert_eq!(reason, RefreshError::AccessRejected),
        other => panic!("unexpected error: {other:?}"),
    }
    assert!(client.store().get().await.is_none());
    assert_eq!(client.failure().current(), View::Login);
    rejected.assert_async().await;
    refresh.assert_async().await;
}

#[tokio::test]
async fn test_expired_refresh_tears_down_every_waiter() {
    let mut server = mockito::Server::new_async().await;
    let domain = server
        .mock("GET", Matcher::Any)
        .with_status(401)
        .expect(3)
        .create_async()
        .await;
    let refresh = server
        .mock("POST", "/token/refresh")
        .with_status(401)
        .with_body(r#"{"detail": "Invalid refresh token"}"#)
        .expect(1)
        .create_async()
        .await;

    let client = signed_in_client(server.url()).await;
    let (a, b, c) = tokio::join!(
        client.execute(ApiRequest::get("courses")),
        client.execute(ApiRequest::get("batches")),
        client.execute(ApiRequest::get("users")),
    );

    for result in [a, b, c] {
        match result.expect_err("waiters share the failure") {
            ApiError::SessionReset(RefreshError::Rejected(message)) => {
                assert_eq!(message, "Invalid refresh token");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }
    assert!(client.store().get().await.is_none());
    assert_eq!(client.failure().current(), View::Login);
    domain.assert_async().await;
    refresh.assert_async().await;
}

#[tokio::test]
async fn test_after_reset_next_call_is_unauthenticated() {
    let mut server = mockito::Server::new_async().await;
    server
        .mock("GET", "/courses")
        .with_status(401)
        .create_async()
        .await;
    server
        .mock("POST", "/token/refresh")
        .with_status(401)
        .with_body(r#"{"detail": "Invalid refresh token"}"#)
        .create_async()
        .await;
    let public = server
        .mock("GET", "/announcements")
        .match_header("authorization", Matcher::Missing)
        .with_status(200)
        .with_body(r#"{"success": true, "data": []}"#)
        .expect(1)
        .create_async()
        .await;

    let client = signed_in_client(server.url()).await;
    let _ = client.execute(ApiRequest::get("courses")).await;
    assert!(client.store().get().await.is_none());

    let response = client
        .execute(ApiRequest::get("announcements"))
        .await
        .expect("unauthenticated dispatch");
    assert_eq!(response.status(), 200);
    public.assert_async().await;
}

// ==================================================================================================
// Permission Denied
// ==================================================================================================

#[tokio::test]
async fn test_403_never_enters_renewal() {
    let mut server = mockito::Server::new_async().await;
    let forbidden = server
        .mock("GET", "/users")
        .with_status(403)
        .with_body(r#"{"detail": "You do not have permission to perform this action."}"#)
        .expect(1)
        .create_async()
        .await;
    let refresh = server
        .mock("POST", "/token/refresh")
        .expect(0)
        .create_async()
        .await;

    let client = signed_in_client(server.url()).await;
    let err = client
        .execute(ApiRequest::get("users"))
        .await
        .expect_err("403 is terminal");

    match err {
        ApiError::PermissionDenied(message) => {
            assert_eq!(message, "You do not have permission to perform this action.");
        }
        other => panic!("unexpected error: {other:?}"),
    }
    // Still authenticated, only not permitted
    assert_eq!(client.store().get().await, Some(pair("A1", "R1")));
    assert_eq!(client.failure().current(), View::AccessDenied);
    forbidden.assert_async().await;
    refresh.assert_async().await;
}

// ==================================================================================================
// Login / Logout
// ==================================================================================================

#[tokio::test]
async fn test_login_publishes_the_session() {
    let mut server = mockito::Server::new_async().await;
    server
        .mock("POST", "/login")
        .match_body(Matcher::PartialJson(json!({
            "identifier": "jane@example.com",
            "expected_role": "Teacher"
        })))
        .with_status(200)
        .with_body(
            r#"{"success": true, "message": "Login successful",
                "data": {"user_code": "U-7", "email": "jane@example.com",
                         "fullname": "Jane Doe", "role": "Teacher"},
                "access": "A1", "refresh": "R1"}"#,
        )
        .create_async()
        .await;

    let client = signed_out_client(server.url()).await;
    assert_eq!(client.failure().current(), View::Login);

    let session = client
        .login("jane@example.com", "pw", Role::Teacher)
        .await
        .expect("login");

    assert_eq!(session.identity.user_id, "U-7");
    assert_eq!(client.store().get().await, Some(pair("A1", "R1")));
    assert_eq!(
        client.store().identity().await.map(|i| i.display_name),
        Some("Jane Doe".to_string())
    );
    assert_eq!(client.failure().current(), View::Dashboard);
}

#[tokio::test]
async fn test_role_mismatch_stores_nothing() {
    let mut server = mockito::Server::new_async().await;
    server
        .mock("POST", "/login")
        .with_status(200)
        .with_body(
            r#"{"data": {"user_code": "U-1", "fullname": "Sam", "role": "Student"},
                "access": "A", "refresh": "R"}"#,
        )
        .create_async()
        .await;

    let client = signed_out_client(server.url()).await;
    let err = client
        .login("sam@example.com", "pw", Role::Admin)
        .await
        .expect_err("role mismatch");

    assert!(err.to_string().contains("expected admin"));
    assert!(client.store().get().await.is_none());
    assert_eq!(client.failure().current(), View::Login);
}

#[tokio::test]
async fn test_logout_is_local_only() {
    let mut server = mockito::Server::new_async().await;
    let logout_endpoint = server
        .mock("POST", "/logout")
        .expect(0)
        .create_async()
        .await;

    let client = signed_in_client(server.url()).await;
    assert_eq!(client.failure().current(), View::Dashboard);

    client.logout().await.expect("logout");
    assert!(client.store().get().await.is_none());
    assert!(client.store().identity().await.is_none());
    assert_eq!(client.failure().current(), View::Login);
    logout_endpoint.assert_async().await;
}

// ==================================================================================================
// Storage Resumption
// ==================================================================================================

#[tokio::test]
async fn test_session_resumes_from_storage() {
    let mut server = mockito::Server::new_async().await;
    server
        .mock("POST", "/login")
        .with_status(200)
        .with_body(
            r#"{"data": {"user_code": "U-7", "email": "jane@example.com",
                         "fullname": "Jane Doe", "role": "Teacher"},
                "access": "A1", "refresh": "R1"}"#,
        )
        .create_async()
        .await;

    let dir = tempfile::tempdir().expect("tempdir");
    let mut config = test_config(server.url());
    config.storage_path = dir.path().join("session.sqlite3");

    {
        let client = ElearnClient::new(&config).await.expect("first client");
        client
            .login("jane@example.com", "pw", Role::Teacher)
            .await
            .expect("login");
    }

    let resumed = ElearnClient::new(&config).await.expect("second client");
    assert_eq!(resumed.store().get().await, Some(pair("A1", "R1")));
    assert_eq!(
        resumed.store().identity().await.map(|i| i.user_id),
        Some("U-7".to_string())
    );
    assert_eq!(resumed.failure().current(), View::Dashboard);
}

// ==================================================================================================
// Profile Wrappers
// ==================================================================================================

#[tokio::test]
async fn test_profile_fetch_refreshes_cached_identity() {
    let mut server = mockito::Server::new_async().await;
    server
        .mock("GET", "/profile")
        .match_header("authorization", "Bearer A1")
        .with_status(200)
        .with_body(
            r#"{"success": true, "message": "Profile retrieved successfully",
                "data": {"user_code": "U-1", "email": "jane@example.com",
                         "fullname": "Jane Renamed", "role": "Teacher"}}"#,
        )
        .create_async()
        .await;

    let client = signed_in_client(server.url()).await;
    let profile = elearn_client::api::fetch_profile(&client)
        .await
        .expect("profile");

    assert_eq!(profile.display_name, "Jane Renamed");
    assert_eq!(
        client.store().identity().await.map(|i| i.display_name),
        Some("Jane Renamed".to_string())
    );
}

#[tokio::test]
async fn test_profile_update_sends_only_changed_fields() {
    let mut server = mockito::Server::new_async().await;
    let patch = server
        .mock("PATCH", "/profile")
        .match_body(Matcher::Json(json!({"fullname": "New Name"})))
        .with_status(200)
        .with_body(
            r#"{"success": true, "message": "Profile updated successfully",
                "data": {"user_code": "U-1", "email": "jane@example.com",
                         "fullname": "New Name", "role": "Teacher"}}"#,
        )
        .expect(1)
        .create_async()
        .await;

    let client = signed_in_client(server.url()).await;
    let update = elearn_client::api::ProfileUpdate {
        fullname: Some("New Name".to_string()),
        ..Default::default()
    };
    let profile = elearn_client::api::update_profile(&client, &update)
        .await
        .expect("update");

    assert_eq!(profile.display_name, "New Name");
    patch.assert_async().await;
}

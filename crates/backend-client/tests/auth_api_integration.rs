//! Integration tests for the backend agent
//!
//! A wiremock server stands in for the identity and data services so the
//! full request/response cycle is exercised, including persistence of the
//! session file between agent instances.

use backend_client::session::AuthSession;
use backend_client::{
    AuthEvent, BackendAgent, BackendConfig, Error, Identity, IdentityProvider, RoleRecord,
    SessionStore, SignUpRequest, UserRole,
};
use chrono::Utc;
use serde_json::json;
use tempfile::TempDir;
use wiremock::matchers::{body_partial_json, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

const API_KEY: &str = "anon-key";

fn config_for(server: &MockServer) -> BackendConfig {
    BackendConfig::new(server.uri(), API_KEY).without_persistence()
}

fn token_body(user_id: &str, email: &str, access: &str) -> serde_json::Value {
    json!({
        "access_token": access,
        "token_type": "bearer",
        "expires_in": 3600,
        "refresh_token": format!("{}-refresh", access),
        "user": { "id": user_id, "email": email }
    })
}

fn profile_body(user_id: &str, role: &str) -> serde_json::Value {
    json!({
        "id": user_id,
        "full_name": "Mona Ali",
        "email": "mona@example.com",
        "phone": null,
        "avatar_url": null,
        "role": role,
        "is_active": true,
        "created_at": "2024-01-10T08:00:00+00:00",
        "updated_at": "2024-01-10T08:00:00+00:00"
    })
}

fn stored_session(expires_in: i64) -> AuthSession {
    AuthSession {
        access_token: "stored-token".to_string(),
        refresh_token: "stored-refresh".to_string(),
        token_type: "bearer".to_string(),
        expires_at: Some(Utc::now().timestamp() + expires_in),
        identity: Identity::new("u1", "mona@example.com"),
    }
}

// =============================================================================
// Sign-in
// =============================================================================

#[tokio::test]
async fn test_authenticate_success() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/auth/v1/token"))
        .and(query_param("grant_type", "password"))
        .and(header("apikey", API_KEY))
        .and(body_partial_json(json!({ "email": "mona@example.com", "password": "secret123" })))
        .respond_with(ResponseTemplate::new(200).set_body_json(token_body(
            "u1",
            "mona@example.com",
            "t1",
        )))
        .expect(1)
        .mount(&server)
        .await;

    let agent = BackendAgent::connect(config_for(&server)).await.unwrap();
    let mut events = agent.subscribe();

    let session = agent.authenticate("mona@example.com", "secret123").await.unwrap();

    assert_eq!(session.identity, Identity::new("u1", "mona@example.com"));
    assert_eq!(session.access_token, "t1");
    assert!(!session.is_expired());
    assert_eq!(agent.current_session().await, Some(session.clone()));
    assert_eq!(
        events.try_recv().unwrap(),
        AuthEvent::SignedIn(Identity::new("u1", "mona@example.com"))
    );
}

#[tokio::test]
async fn test_authenticate_invalid_credentials() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/auth/v1/token"))
        .respond_with(ResponseTemplate::new(400).set_body_json(json!({
            "error": "invalid_grant",
            "error_description": "Invalid login credentials"
        })))
        .mount(&server)
        .await;

    let agent = BackendAgent::connect(config_for(&server)).await.unwrap();
    let mut events = agent.subscribe();

    let err = agent.authenticate("mona@example.com", "wrong").await.unwrap_err();

    assert!(err.is_rejection());
    assert_eq!(err.to_string(), "Invalid login credentials");
    assert!(agent.current_session().await.is_none());
    assert!(events.try_recv().is_err());
}

#[tokio::test]
async fn test_authenticate_server_error_is_not_a_rejection() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/auth/v1/token"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let agent = BackendAgent::connect(config_for(&server)).await.unwrap();
    let err = agent.authenticate("mona@example.com", "secret123").await.unwrap_err();

    assert!(matches!(err, Error::Network(_)));
}

#[tokio::test]
async fn test_authenticate_persists_session() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();
    let session_path = dir.path().join("session.json");

    Mock::given(method("POST"))
        .and(path("/auth/v1/token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(token_body(
            "u1",
            "mona@example.com",
            "t1",
        )))
        .mount(&server)
        .await;

    let config = BackendConfig::new(server.uri(), API_KEY).with_session_path(&session_path);
    {
        let agent = BackendAgent::connect(config.clone()).await.unwrap();
        agent.authenticate("mona@example.com", "secret123").await.unwrap();
    }

    let store = SessionStore::open(&session_path).await.unwrap();
    let stored = store.load().await.unwrap().unwrap();
    assert_eq!(stored.access_token, "t1");
    assert_eq!(stored.identity.id, "u1");
}

// =============================================================================
// Sign-up
// =============================================================================

#[tokio::test]
async fn test_register_teacher_creates_rows() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/auth/v1/signup"))
        .and(body_partial_json(json!({
            "email": "mona@example.com",
            "data": { "full_name": "Mona Ali", "role": "teacher" }
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(token_body(
            "u7",
            "mona@example.com",
            "signup-token",
        )))
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("POST"))
        .and(path("/rest/v1/user_profiles"))
        .and(header("Authorization", "Bearer signup-token"))
        .and(body_partial_json(json!({ "id": "u7", "role": "teacher", "full_name": "Mona Ali" })))
        .respond_with(ResponseTemplate::new(201))
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("POST"))
        .and(path("/rest/v1/teacher_profiles"))
        .and(body_partial_json(json!({ "id": "u7" })))
        .respond_with(ResponseTemplate::new(201))
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("POST"))
        .and(path("/rest/v1/student_profiles"))
        .respond_with(ResponseTemplate::new(201))
        .expect(0)
        .mount(&server)
        .await;

    let agent = BackendAgent::connect(config_for(&server)).await.unwrap();
    let mut events = agent.subscribe();

    let identity = agent
        .register(&SignUpRequest {
            email: "mona@example.com".to_string(),
            password: "secret123".to_string(),
            full_name: "Mona Ali".to_string(),
            role: UserRole::Teacher,
        })
        .await
        .unwrap();

    assert_eq!(identity, Identity::new("u7", "mona@example.com"));
    // Registration never signs the user in
    assert!(agent.current_session().await.is_none());
    assert!(events.try_recv().is_err());
}

#[tokio::test]
async fn test_register_without_session_uses_api_key() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/auth/v1/signup"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({ "id": "u8", "email": "sami@example.com" })),
        )
        .mount(&server)
        .await;

    Mock::given(method("POST"))
        .and(path("/rest/v1/user_profiles"))
        .and(header("Authorization", format!("Bearer {}", API_KEY).as_str()))
        .respond_with(ResponseTemplate::new(201))
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("POST"))
        .and(path("/rest/v1/student_profiles"))
        .respond_with(ResponseTemplate::new(201))
        .expect(1)
        .mount(&server)
        .await;

    let agent = BackendAgent::connect(config_for(&server)).await.unwrap();
    let identity = agent
        .register(&SignUpRequest {
            email: "sami@example.com".to_string(),
            password: "secret123".to_string(),
            full_name: "Sami".to_string(),
            role: UserRole::Student,
        })
        .await
        .unwrap();

    assert_eq!(identity.id, "u8");
}

#[tokio::test]
async fn test_register_duplicate_email() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/auth/v1/signup"))
        .respond_with(ResponseTemplate::new(422).set_body_json(json!({
            "code": 422,
            "error_code": "user_already_exists",
            "msg": "User already registered"
        })))
        .mount(&server)
        .await;

    Mock::given(method("POST"))
        .and(path("/rest/v1/user_profiles"))
        .respond_with(ResponseTemplate::new(201))
        .expect(0)
        .mount(&server)
        .await;

    let agent = BackendAgent::connect(config_for(&server)).await.unwrap();
    let err = agent
        .register(&SignUpRequest {
            email: "mona@example.com".to_string(),
            password: "secret123".to_string(),
            full_name: "Mona".to_string(),
            role: UserRole::Student,
        })
        .await
        .unwrap_err();

    assert_eq!(err.provider_message(), Some("User already registered"));
}

// =============================================================================
// Profile
// =============================================================================

#[tokio::test]
async fn test_fetch_profile_uses_user_token() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/auth/v1/token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(token_body(
            "u1",
            "mona@example.com",
            "user-token",
        )))
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/rest/v1/user_profiles"))
        .and(query_param("id", "eq.u1"))
        .and(query_param("select", "*"))
        .and(header("Accept", "application/vnd.pgrst.object+json"))
        .and(header("Authorization", "Bearer user-token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(profile_body("u1", "admin")))
        .expect(1)
        .mount(&server)
        .await;

    let agent = BackendAgent::connect(config_for(&server)).await.unwrap();
    agent.authenticate("mona@example.com", "secret123").await.unwrap();

    let profile = agent.fetch_profile("u1").await.unwrap();
    assert_eq!(profile.id, "u1");
    assert_eq!(profile.role, UserRole::Admin);
}

#[tokio::test]
async fn test_fetch_profile_missing_row() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/rest/v1/user_profiles"))
        .respond_with(ResponseTemplate::new(406).set_body_json(json!({
            "code": "PGRST116",
            "message": "JSON object requested, multiple (or no) rows returned",
            "details": "The result contains 0 rows",
            "hint": null
        })))
        .mount(&server)
        .await;

    let agent = BackendAgent::connect(config_for(&server)).await.unwrap();
    let err = agent.fetch_profile("ghost").await.unwrap_err();

    assert!(err.is_rejection());
    assert!(err.to_string().contains("no) rows"));
}

#[tokio::test]
async fn test_fetch_teacher_record() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/rest/v1/teacher_profiles"))
        .and(query_param("id", "eq.t1"))
        .and(header("Accept", "application/vnd.pgrst.object+json"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": "t1",
            "bio": "Maths and physics",
            "years_of_experience": 7,
            "hourly_rate": 25.5,
            "is_verified": true,
            "is_available": true
        })))
        .expect(1)
        .mount(&server)
        .await;

    let agent = BackendAgent::connect(config_for(&server)).await.unwrap();
    let record = agent.fetch_role_record("t1", UserRole::Teacher).await.unwrap();

    match record {
        Some(RoleRecord::Teacher(teacher)) => {
            assert_eq!(teacher.years_of_experience, 7);
            assert_eq!(teacher.bio.as_deref(), Some("Maths and physics"));
            assert!(teacher.is_verified);
            assert_eq!(teacher.total_sessions, 0);
        }
        other => panic!("expected teacher record, got {:?}", other),
    }
}

#[tokio::test]
async fn test_fetch_student_record_and_admin_has_none() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/rest/v1/student_profiles"))
        .and(query_param("id", "eq.s1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": "s1",
            "grade_level": "10",
            "total_sessions": 3
        })))
        .expect(1)
        .mount(&server)
        .await;

    let agent = BackendAgent::connect(config_for(&server)).await.unwrap();

    let record = agent.fetch_role_record("s1", UserRole::Student).await.unwrap().unwrap();
    assert_eq!(record.id(), "s1");
    assert!(matches!(record, RoleRecord::Student(ref s) if s.grade_level.as_deref() == Some("10")));

    // No request goes out for admins
    assert!(agent.fetch_role_record("a1", UserRole::Admin).await.unwrap().is_none());
}

#[tokio::test]
async fn test_signup_response_without_user_writes_nothing() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/auth/v1/signup"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
        .mount(&server)
        .await;

    Mock::given(method("POST"))
        .and(path("/rest/v1/user_profiles"))
        .respond_with(ResponseTemplate::new(201))
        .expect(0)
        .mount(&server)
        .await;

    let agent = BackendAgent::connect(config_for(&server)).await.unwrap();
    let err = agent
        .register(&SignUpRequest {
            email: "mona@example.com".to_string(),
            password: "secret123".to_string(),
            full_name: "Mona".to_string(),
            role: UserRole::Teacher,
        })
        .await
        .unwrap_err();

    assert!(matches!(err, Error::InvalidResponse(_)));
}

// =============================================================================
// Sign-out
// =============================================================================

#[tokio::test]
async fn test_sign_out_clears_even_when_remote_fails() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();
    let session_path = dir.path().join("session.json");

    Mock::given(method("POST"))
        .and(path("/auth/v1/token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(token_body(
            "u1",
            "mona@example.com",
            "t1",
        )))
        .mount(&server)
        .await;

    Mock::given(method("POST"))
        .and(path("/auth/v1/logout"))
        .and(header("Authorization", "Bearer t1"))
        .respond_with(ResponseTemplate::new(503))
        .expect(1)
        .mount(&server)
        .await;

    let config = BackendConfig::new(server.uri(), API_KEY).with_session_path(&session_path);
    let agent = BackendAgent::connect(config).await.unwrap();
    agent.authenticate("mona@example.com", "secret123").await.unwrap();
    let mut events = agent.subscribe();

    let result = agent.sign_out().await;

    assert!(result.is_err());
    assert!(agent.current_session().await.is_none());
    assert_eq!(events.try_recv().unwrap(), AuthEvent::SignedOut);
    assert!(!session_path.exists());
}

#[tokio::test]
async fn test_sign_out_success() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/auth/v1/token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(token_body(
            "u1",
            "mona@example.com",
            "t1",
        )))
        .mount(&server)
        .await;

    Mock::given(method("POST"))
        .and(path("/auth/v1/logout"))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&server)
        .await;

    let agent = BackendAgent::connect(config_for(&server)).await.unwrap();
    agent.authenticate("mona@example.com", "secret123").await.unwrap();

    agent.sign_out().await.unwrap();
    assert!(agent.current_session().await.is_none());
}

// =============================================================================
// Restore and refresh
// =============================================================================

#[tokio::test]
async fn test_restore_valid_session_without_network() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();
    let session_path = dir.path().join("session.json");

    SessionStore::open(&session_path)
        .await
        .unwrap()
        .save(&stored_session(3600))
        .await
        .unwrap();

    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let config = BackendConfig::new(server.uri(), API_KEY).with_session_path(&session_path);
    let agent = BackendAgent::connect(config).await.unwrap();
    let mut events = agent.subscribe();

    let restored = agent.restore_session().await.unwrap().unwrap();

    assert_eq!(restored.access_token, "stored-token");
    assert_eq!(agent.current_session().await, Some(restored));
    assert_eq!(
        events.try_recv().unwrap(),
        AuthEvent::SignedIn(Identity::new("u1", "mona@example.com"))
    );
}

#[tokio::test]
async fn test_restore_expired_session_refreshes() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();
    let session_path = dir.path().join("session.json");

    SessionStore::open(&session_path)
        .await
        .unwrap()
        .save(&stored_session(-60))
        .await
        .unwrap();

    Mock::given(method("POST"))
        .and(path("/auth/v1/token"))
        .and(query_param("grant_type", "refresh_token"))
        .and(body_partial_json(json!({ "refresh_token": "stored-refresh" })))
        .respond_with(ResponseTemplate::new(200).set_body_json(token_body(
            "u1",
            "mona@example.com",
            "fresh",
        )))
        .expect(1)
        .mount(&server)
        .await;

    let config = BackendConfig::new(server.uri(), API_KEY).with_session_path(&session_path);
    let agent = BackendAgent::connect(config).await.unwrap();

    let restored = agent.restore_session().await.unwrap().unwrap();
    assert_eq!(restored.access_token, "fresh");

    let on_disk = SessionStore::open(&session_path).await.unwrap().load().await.unwrap();
    assert_eq!(on_disk.map(|s| s.access_token), Some("fresh".to_string()));
}

#[tokio::test]
async fn test_restore_rejected_refresh_discards_session() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();
    let session_path = dir.path().join("session.json");

    SessionStore::open(&session_path)
        .await
        .unwrap()
        .save(&stored_session(-60))
        .await
        .unwrap();

    Mock::given(method("POST"))
        .and(path("/auth/v1/token"))
        .respond_with(ResponseTemplate::new(400).set_body_json(json!({
            "error": "invalid_grant",
            "error_description": "Invalid Refresh Token: Already Used"
        })))
        .mount(&server)
        .await;

    let config = BackendConfig::new(server.uri(), API_KEY).with_session_path(&session_path);
    let agent = BackendAgent::connect(config).await.unwrap();

    assert!(agent.restore_session().await.unwrap().is_none());
    assert!(agent.current_session().await.is_none());
    assert!(!session_path.exists());
}

#[tokio::test]
async fn test_refresh_session_emits_token_refreshed() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/auth/v1/token"))
        .and(query_param("grant_type", "password"))
        .respond_with(ResponseTemplate::new(200).set_body_json(token_body(
            "u1",
            "mona@example.com",
            "t1",
        )))
        .mount(&server)
        .await;

    Mock::given(method("POST"))
        .and(path("/auth/v1/token"))
        .and(query_param("grant_type", "refresh_token"))
        .and(body_partial_json(json!({ "refresh_token": "t1-refresh" })))
        .respond_with(ResponseTemplate::new(200).set_body_json(token_body(
            "u1",
            "mona@example.com",
            "t2",
        )))
        .expect(1)
        .mount(&server)
        .await;

    let agent = BackendAgent::connect(config_for(&server)).await.unwrap();
    agent.authenticate("mona@example.com", "secret123").await.unwrap();
    let mut events = agent.subscribe();

    let fresh = agent.refresh_session().await.unwrap();

    assert_eq!(fresh.access_token, "t2");
    assert_eq!(
        events.try_recv().unwrap(),
        AuthEvent::TokenRefreshed(Identity::new("u1", "mona@example.com"))
    );
}

#[tokio::test]
async fn test_refresh_rejected_signs_out() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/auth/v1/token"))
        .and(query_param("grant_type", "password"))
        .respond_with(ResponseTemplate::new(200).set_body_json(token_body(
            "u1",
            "mona@example.com",
            "t1",
        )))
        .mount(&server)
        .await;

    Mock::given(method("POST"))
        .and(path("/auth/v1/token"))
        .and(query_param("grant_type", "refresh_token"))
        .respond_with(ResponseTemplate::new(401).set_body_json(json!({
            "error": "invalid_grant",
            "error_description": "Refresh Token Not Found"
        })))
        .mount(&server)
        .await;

    let agent = BackendAgent::connect(config_for(&server)).await.unwrap();
    agent.authenticate("mona@example.com", "secret123").await.unwrap();
    let mut events = agent.subscribe();

    let err = agent.refresh_session().await.unwrap_err();

    assert!(err.is_rejection());
    assert!(agent.current_session().await.is_none());
    assert_eq!(events.try_recv().unwrap(), AuthEvent::SignedOut);
}

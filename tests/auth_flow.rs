use chrono::{Duration, Utc};
use rocket::http::{ContentType, Cookie, SameSite, Status};
use rocket::local::asynchronous::{Client, LocalResponse};
use rocket::routes;
use svego_api::auth::config::ExpiredSessionPolicy;
use svego_api::auth::jwt::UserIdentity;
use svego_api::auth::renewal::renew_session;
use svego_api::auth::routes::{login, logout};
use svego_api::auth::{AuthConfig, AuthError, AuthState};
use svego_api::models::{ErrorResponse, MessageResponse, UserProfile};
use svego_api::routes::users::me;
use svego_api::test_support::{
    TestDatabase, TestFixtures, TestRocketBuilder, test_auth_config, test_auth_state_with,
};

struct Harness {
    db: TestDatabase,
    state: AuthState,
    client: Client,
    alice_id: i64,
}

impl Harness {
    async fn new() -> Self {
        Self::with_config(test_auth_config()).await
    }

    async fn with_config(config: AuthConfig) -> Self {
        let db = TestDatabase::new().await.expect("test database");
        let fixtures = TestFixtures::new(db.pool());
        let alice_id = fixtures
            .insert_user("alice", "alice@example.com", "correct-pw", true)
            .await
            .expect("insert alice");
        fixtures
            .insert_user("carol", "carol@example.com", "carol-pw", false)
            .await
            .expect("insert carol");

        let state = test_auth_state_with(config, db.pool_clone());
        let client = TestRocketBuilder::new()
            .manage_auth_state(state.clone())
            .mount_api_routes(routes![login, logout, me])
            .untracked_client()
            .await;

        Self {
            db,
            state,
            client,
            alice_id,
        }
    }

    fn fixtures(&self) -> TestFixtures<'_> {
        TestFixtures::new(self.db.pool())
    }

    async fn login(&self, username: &str, password: &str) -> LocalResponse<'_> {
        self.client
            .post("/v1/login")
            .header(ContentType::Form)
            .body(format!("username={username}&password={password}"))
            .dispatch()
            .await
    }

    /// Logs alice in and returns (access token, refresh token).
    async fn alice_session(&self) -> (String, String) {
        let response = self.login("alice", "correct-pw").await;
        assert_eq!(response.status(), Status::Ok);
        let access = cookie_value(&response, "token").expect("access cookie");
        let refresh = cookie_value(&response, "refreshToken").expect("refresh cookie");
        (access, refresh)
    }

    async fn me(&self, access: Option<&str>, refresh: Option<&str>) -> LocalResponse<'_> {
        let mut request = self.client.get("/v1/me");
        if let Some(access) = access {
            request = request.cookie(Cookie::new("token", access.to_string()));
        }
        if let Some(refresh) = refresh {
            request = request.cookie(Cookie::new("refreshToken", refresh.to_string()));
        }
        request.dispatch().await
    }

    fn jti_of(&self, access: &str) -> String {
        self.state
            .jwt_service
            .decode_access_token(access)
            .expect("valid access token")
            .jti
    }
}

fn cookie_value(response: &LocalResponse<'_>, name: &str) -> Option<String> {
    response
        .cookies()
        .get(name)
        .map(|cookie| cookie.value().to_string())
}

#[tokio::test]
async fn login_sets_both_carriers_and_records_one_session() {
    let harness = Harness::new().await;

    let response = harness.login("alice", "correct-pw").await;
    assert_eq!(response.status(), Status::Ok);

    let access_cookie = response.cookies().get("token").cloned().expect("access cookie");
    let refresh_cookie = response
        .cookies()
        .get("refreshToken")
        .cloned()
        .expect("refresh cookie");

    for cookie in [&access_cookie, &refresh_cookie] {
        assert_eq!(cookie.path(), Some("/"));
        assert_eq!(cookie.http_only(), Some(true));
        assert_eq!(cookie.same_site(), Some(SameSite::Strict));
        assert_eq!(cookie.domain(), None);
    }
    assert_eq!(
        access_cookie.max_age(),
        Some(time::Duration::seconds(60 * 60))
    );
    assert_eq!(
        refresh_cookie.max_age(),
        Some(time::Duration::seconds(30 * 24 * 60 * 60))
    );

    let body = response.into_string().await.expect("body");
    assert!(!body.contains(access_cookie.value()));
    assert!(!body.contains(refresh_cookie.value()));
    let message: MessageResponse = serde_json::from_str(&body).expect("json body");
    assert_eq!(message.message, "logged in");

    assert_eq!(
        harness
            .fixtures()
            .count_refresh_tokens(harness.alice_id)
            .await
            .expect("count"),
        1
    );

    let record = harness
        .state
        .refresh_store
        .lookup(refresh_cookie.value())
        .await
        .expect("lookup")
        .expect("record stored");
    assert_eq!(record.user_id, harness.alice_id);
    assert!(record.active);

    let claims = harness
        .state
        .jwt_service
        .decode_access_token(access_cookie.value())
        .expect("access token decodes");
    assert_eq!(claims.user_id, harness.alice_id);
    assert_eq!(claims.username, "alice");
    assert_eq!(claims.jti, record.jwt_id);
}

#[tokio::test]
async fn credential_failures_are_indistinguishable() {
    let harness = Harness::new().await;

    let mut bodies = Vec::new();
    for (username, password) in [
        ("nobody", "whatever-pw"),
        ("carol", "carol-pw"),
        ("alice", "wrong-pw"),
    ] {
        let response = harness.login(username, password).await;
        assert_eq!(response.status(), Status::Unauthorized);
        assert!(response.cookies().get("token").is_none());
        assert!(response.cookies().get("refreshToken").is_none());
        bodies.push(response.into_string().await.expect("body"));
    }

    assert_eq!(bodies[0], bodies[1]);
    assert_eq!(bodies[1], bodies[2]);
    let error: ErrorResponse = serde_json::from_str(&bodies[0]).expect("json body");
    assert_eq!(error.error, "invalid username or password");
}

#[tokio::test]
async fn login_form_lengths_are_enforced() {
    let harness = Harness::new().await;
    let too_long = "a".repeat(17);

    // Two characters, four bytes once encoded.
    let two_chars = "%C3%A9".repeat(2);
    let seventeen_chars = "%C3%A9".repeat(17);

    for (username, password) in [
        ("abc", "correct-pw"),
        ("alice", "four"),
        (too_long.as_str(), "correct-pw"),
        (two_chars.as_str(), "correct-pw"),
        (seventeen_chars.as_str(), "correct-pw"),
        ("alice", "%C3%A9%C3%A9%C3%A9%C3%A9"),
    ] {
        let response = harness.login(username, password).await;
        assert_eq!(response.status(), Status::BadRequest);
        let error: ErrorResponse = response.into_json().await.expect("json body");
        assert_eq!(error.error, "invalid login form");
    }
}

#[tokio::test]
async fn multibyte_usernames_are_measured_in_characters() {
    let harness = Harness::new().await;
    harness
        .fixtures()
        .insert_user(&"é".repeat(9), "e@example.com", "correct-pw", true)
        .await
        .expect("insert multibyte user");

    // Nine characters, eighteen bytes.
    let response = harness.login(&"%C3%A9".repeat(9), "correct-pw").await;
    assert_eq!(response.status(), Status::Ok);
    assert!(response.cookies().get("token").is_some());

    // Sixteen characters passes the form check and fails as an unknown user.
    let response = harness.login(&"%C3%A9".repeat(16), "correct-pw").await;
    assert_eq!(response.status(), Status::Unauthorized);
    let error: ErrorResponse = response.into_json().await.expect("json body");
    assert_eq!(error.error, "invalid username or password");
}

#[tokio::test]
async fn logged_in_caller_is_not_issued_a_second_session() {
    let harness = Harness::new().await;
    let (access, refresh) = harness.alice_session().await;

    let with_access = harness
        .client
        .post("/v1/login")
        .header(ContentType::Form)
        .cookie(Cookie::new("token", access))
        .body("username=alice&password=correct-pw")
        .dispatch()
        .await;
    assert_eq!(with_access.status(), Status::Found);
    assert_eq!(with_access.headers().get_one("Location"), Some("/"));

    let with_refresh = harness
        .client
        .post("/v1/login")
        .header(ContentType::Form)
        .cookie(Cookie::new("refreshToken", refresh))
        .body("username=alice&password=correct-pw")
        .dispatch()
        .await;
    assert_eq!(with_refresh.status(), Status::Found);

    assert_eq!(
        harness
            .fixtures()
            .count_refresh_tokens(harness.alice_id)
            .await
            .expect("count"),
        1
    );
}

#[tokio::test]
async fn alice_keeps_her_session_across_a_lost_access_cookie() {
    let harness = Harness::new().await;
    let (access, refresh) = harness.alice_session().await;
    let original_jti = harness.jti_of(&access);

    let response = harness.me(Some(&access), None).await;
    assert_eq!(response.status(), Status::Ok);
    assert!(response.cookies().get("token").is_none());
    let profile: UserProfile = response.into_json().await.expect("profile");
    assert_eq!(profile.id, harness.alice_id);
    assert_eq!(profile.username, "alice");
    assert_eq!(profile.email, "alice@example.com");

    let response = harness.me(None, Some(&refresh)).await;
    assert_eq!(response.status(), Status::Ok);
    let renewed = cookie_value(&response, "token").expect("renewed access cookie");
    assert_eq!(harness.jti_of(&renewed), original_jti);
    let profile: UserProfile = response.into_json().await.expect("profile");
    assert_eq!(profile.id, harness.alice_id);

    let response = harness.me(None, None).await;
    assert_eq!(response.status(), Status::Unauthorized);
    let error: ErrorResponse = response.into_json().await.expect("json body");
    assert_eq!(error.error, "unauthorized");

    assert_eq!(
        harness
            .fixtures()
            .count_refresh_tokens(harness.alice_id)
            .await
            .expect("count"),
        1
    );
}

#[tokio::test]
async fn valid_access_token_leaves_the_store_untouched() {
    let harness = Harness::new().await;
    let (access, refresh) = harness.alice_session().await;
    let before = harness.fixtures().refresh_token_rows().await.expect("rows");

    for _ in 0..3 {
        let response = harness.me(Some(&access), Some(&refresh)).await;
        assert_eq!(response.status(), Status::Ok);
        assert!(response.cookies().get("token").is_none());
    }

    let after = harness.fixtures().refresh_token_rows().await.expect("rows");
    assert_eq!(before, after);
}

#[tokio::test]
async fn expired_access_token_is_renewed_from_the_refresh_cookie() {
    let harness = Harness::new().await;
    let (access, refresh) = harness.alice_session().await;
    let jti = harness.jti_of(&access);

    let identity = UserIdentity {
        user_id: harness.alice_id,
        username: "alice".into(),
        email: "alice@example.com".into(),
    };
    let stale = harness
        .state
        .jwt_service
        .issue_access_token_at(
            &identity,
            &jti,
            Utc::now() - harness.state.jwt_service.access_token_ttl() - Duration::seconds(1),
        )
        .expect("stale token");

    let response = harness.me(Some(&stale.token), Some(&refresh)).await;
    assert_eq!(response.status(), Status::Ok);
    let renewed = cookie_value(&response, "token").expect("renewed access cookie");
    assert_ne!(renewed, stale.token);
    assert_eq!(harness.jti_of(&renewed), jti);

    let response = harness.me(Some(&stale.token), None).await;
    assert_eq!(response.status(), Status::Unauthorized);
}

#[tokio::test]
async fn tampered_access_token_is_rejected_without_renewal() {
    let harness = Harness::new().await;
    let (access, refresh) = harness.alice_session().await;

    let mut tampered = access.clone();
    tampered.push('x');

    let response = harness.me(Some(&tampered), Some(&refresh)).await;
    assert_eq!(response.status(), Status::Unauthorized);
    assert!(response.cookies().get("token").is_none());
}

#[tokio::test]
async fn expired_refresh_record_is_deactivated_and_stays_dead() {
    let harness = Harness::new().await;
    let (_, refresh) = harness.alice_session().await;
    harness
        .fixtures()
        .expire_refresh_tokens(harness.alice_id)
        .await
        .expect("expire records");

    let response = harness.me(None, Some(&refresh)).await;
    assert_eq!(response.status(), Status::Unauthorized);
    assert!(response.cookies().get("token").is_none());

    let record = harness
        .state
        .refresh_store
        .lookup(&refresh)
        .await
        .expect("lookup")
        .expect("record kept");
    assert!(!record.active);

    let response = harness.me(None, Some(&refresh)).await;
    assert_eq!(response.status(), Status::Unauthorized);

    assert!(matches!(
        renew_session(&harness.state, Some(&refresh), Utc::now()).await,
        Err(AuthError::SessionRevoked)
    ));
}

#[tokio::test]
async fn disabled_user_cannot_renew() {
    let harness = Harness::new().await;
    let (access, refresh) = harness.alice_session().await;
    harness
        .state
        .users
        .set_active(harness.alice_id, false, Utc::now())
        .await
        .expect("disable alice");

    // A still-valid access token is self-contained and keeps working.
    let response = harness.me(Some(&access), None).await;
    assert_eq!(response.status(), Status::Ok);

    let response = harness.me(None, Some(&refresh)).await;
    assert_eq!(response.status(), Status::Unauthorized);
}

#[tokio::test]
async fn logout_revokes_the_session_and_clears_both_carriers() {
    let harness = Harness::new().await;
    let (access, refresh) = harness.alice_session().await;

    let response = harness
        .client
        .get("/v1/logout")
        .cookie(Cookie::new("token", access))
        .cookie(Cookie::new("refreshToken", refresh.clone()))
        .dispatch()
        .await;
    assert_eq!(response.status(), Status::SeeOther);
    assert_eq!(response.headers().get_one("Location"), Some("/"));
    for name in ["token", "refreshToken"] {
        let cleared = response.cookies().get(name).cloned().expect("removal cookie");
        assert!(cleared.value().is_empty());
        assert_eq!(cleared.max_age(), Some(time::Duration::ZERO));
    }

    let record = harness
        .state
        .refresh_store
        .lookup(&refresh)
        .await
        .expect("lookup")
        .expect("record kept");
    assert!(!record.active);

    let response = harness.me(None, Some(&refresh)).await;
    assert_eq!(response.status(), Status::Unauthorized);
}

#[tokio::test]
async fn logout_with_only_the_access_cookie_revokes_its_session() {
    let harness = Harness::new().await;
    let (access, refresh) = harness.alice_session().await;

    let response = harness
        .client
        .get("/v1/logout")
        .cookie(Cookie::new("token", access))
        .dispatch()
        .await;
    assert_eq!(response.status(), Status::SeeOther);

    let response = harness.me(None, Some(&refresh)).await;
    assert_eq!(response.status(), Status::Unauthorized);
}

#[tokio::test]
async fn logout_without_credentials_still_redirects() {
    let harness = Harness::new().await;
    let response = harness.client.get("/v1/logout").dispatch().await;
    assert_eq!(response.status(), Status::SeeOther);
    assert_eq!(response.headers().get_one("Location"), Some("/"));
}

#[tokio::test]
async fn redirect_policy_sends_expired_sessions_to_logout() {
    let mut config = test_auth_config();
    config.expired_session_policy = ExpiredSessionPolicy::RedirectToLogout;
    let harness = Harness::with_config(config).await;
    let (access, refresh) = harness.alice_session().await;
    let jti = harness.jti_of(&access);

    harness
        .state
        .refresh_store
        .deactivate(&refresh, Utc::now())
        .await
        .expect("revoke");

    let identity = UserIdentity {
        user_id: harness.alice_id,
        username: "alice".into(),
        email: "alice@example.com".into(),
    };
    let stale = harness
        .state
        .jwt_service
        .issue_access_token_at(&identity, &jti, Utc::now() - Duration::days(1))
        .expect("stale token");

    let response = harness.me(Some(&stale.token), Some(&refresh)).await;
    assert_eq!(response.status(), Status::SeeOther);
    assert_eq!(response.headers().get_one("Location"), Some("/v1/logout"));

    // Without an expired access token the plain rejection applies.
    let response = harness.me(None, Some(&refresh)).await;
    assert_eq!(response.status(), Status::Unauthorized);
}

#[tokio::test]
async fn storage_failure_during_renewal_fails_closed() {
    let harness = Harness::new().await;
    let (_, refresh) = harness.alice_session().await;

    harness.db.pool().close().await;

    let response = harness.me(None, Some(&refresh)).await;
    assert_eq!(response.status(), Status::InternalServerError);
    assert!(response.cookies().get("token").is_none());
    assert_eq!(
        response.into_string().await.as_deref(),
        Some(r#"{"error":"internal server error"}"#)
    );
}

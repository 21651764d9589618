use async_trait::async_trait;
use chrono::{Duration, Utc};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use strava_api::testing::{json_body, MockTransport};
use strava_api::transport::{HttpRequest, HttpResponse, Transport, TransportError};
use strava_api::{
    ApiConfig, AuthStage, Client, ClientCredentials, Credential, ProfileSummary, StatusCode,
    StravaError,
};
use stravup_auth::testing::{
    token_json, ConsentScript, MemoryTokenStore, ScriptedConsent, ScriptedLauncher,
};
use stravup_auth::{LifecycleState, OAuthConfig, TokenLifecycleManager, TokenStore};
use url::Url;

const REDIRECT: &str = "travaartje://www.travaartje.net";

fn oauth() -> OAuthConfig {
    OAuthConfig::new(ClientCredentials::new("21314", "client-secret"), REDIRECT)
}

fn manager(transport: &Arc<MockTransport>) -> TokenLifecycleManager {
    let client = Client::with_transport(
        transport.clone(),
        ApiConfig::new("https://www.strava.com/api/v3"),
    );
    TokenLifecycleManager::new(client, oauth())
}

fn athlete() -> ProfileSummary {
    ProfileSummary {
        id: 99,
        username: Some("rider".to_string()),
        firstname: Some("Marianne".to_string()),
        lastname: Some("Vos".to_string()),
        city: None,
        country: None,
        profile_medium: None,
        profile: None,
    }
}

fn valid_credential() -> Credential {
    Credential {
        access_token: "valid-access".to_string(),
        expires_at: Utc::now() + Duration::hours(6),
        refresh_token: "valid-refresh".to_string(),
        subject: Some(athlete()),
    }
}

fn expired_credential() -> Credential {
    Credential {
        access_token: "old-access".to_string(),
        expires_at: Utc::now() - Duration::minutes(1),
        refresh_token: "old-refresh".to_string(),
        subject: Some(athlete()),
    }
}

fn future_timestamp() -> i64 {
    (Utc::now() + Duration::hours(6)).timestamp()
}

fn callback(query: &str) -> Url {
    Url::parse(&format!("{}?{}", REDIRECT, query)).unwrap()
}

// ensure_valid

#[tokio::test]
async fn valid_credential_needs_no_network() {
    let transport = Arc::new(MockTransport::new());
    let manager = manager(&transport).with_credential(valid_credential());

    let credential = manager.ensure_valid().await.unwrap().unwrap();

    assert_eq!(credential, valid_credential());
    assert_eq!(transport.request_count(), 0);
    assert_eq!(manager.state(), LifecycleState::Valid);
}

#[tokio::test]
async fn expired_credential_is_refreshed_with_original_refresh_token() {
    let transport = Arc::new(MockTransport::new());
    transport.push_json(
        StatusCode::OK,
        token_json("new-access", "new-refresh", future_timestamp(), None),
    );
    let manager = manager(&transport).with_credential(expired_credential());
    assert_eq!(manager.state(), LifecycleState::Expired);
    let mut updates = manager.subscribe();

    let credential = manager.ensure_valid().await.unwrap().unwrap();

    assert_eq!(credential.access_token, "new-access");
    assert_eq!(credential.refresh_token, "new-refresh");
    assert_eq!(credential.subject, Some(athlete()));
    assert_eq!(manager.current_credential(), Some(credential.clone()));
    assert_eq!(manager.state(), LifecycleState::Valid);
    assert!(updates.has_changed().unwrap());
    assert_eq!(*updates.borrow_and_update(), Some(credential));

    let requests = transport.requests();
    assert_eq!(requests.len(), 1);
    assert!(requests[0].url.ends_with("/oauth/token"));
    assert_eq!(requests[0].header_value("Accept"), Some("application/json"));
    let body = json_body(&requests[0]);
    assert_eq!(body["grant_type"], "refresh_token");
    assert_eq!(body["refresh_token"], "old-refresh");
    assert_eq!(body["client_id"], "21314");
    assert_eq!(body["client_secret"], "client-secret");
}

#[tokio::test]
async fn rejected_refresh_invalidates_credential() {
    let transport = Arc::new(MockTransport::new());
    transport.push_status(StatusCode::UNAUTHORIZED);
    let store = Arc::new(MemoryTokenStore::with_credential(expired_credential()));
    let manager = manager(&transport).with_store(store.clone());

    let err = manager.ensure_valid().await.unwrap_err();

    assert_eq!(err.status(), Some(StatusCode::UNAUTHORIZED));
    assert_eq!(manager.current_credential(), None);
    assert_eq!(manager.state(), LifecycleState::Invalidated);
    assert_eq!(store.stored(), None);

    // Nothing left to refresh
    assert!(manager.ensure_valid().await.unwrap().is_none());
    assert_eq!(manager.current_credential(), None);
    assert_eq!(transport.request_count(), 1);
}

#[tokio::test]
async fn refresh_keeps_profile_even_when_response_names_an_athlete() {
    let transport = Arc::new(MockTransport::new());
    transport.push_json(
        StatusCode::OK,
        token_json("new-access", "new-refresh", future_timestamp(), Some(555)),
    );
    let manager = manager(&transport).with_credential(expired_credential());

    let credential = manager.ensure_valid().await.unwrap().unwrap();

    assert_eq!(credential.subject, Some(athlete()));
    assert_eq!(manager.current_credential().unwrap().subject, Some(athlete()));
}

#[tokio::test]
async fn refresh_retries_transport_failure_once() {
    let transport = Arc::new(MockTransport::new());
    transport.push_error(TransportError::Timeout);
    transport.push_json(
        StatusCode::OK,
        token_json("new-access", "new-refresh", future_timestamp(), None),
    );
    let manager = manager(&transport).with_credential(expired_credential());

    let credential = manager.ensure_valid().await.unwrap().unwrap();

    assert_eq!(credential.access_token, "new-access");
    assert_eq!(transport.request_count(), 2);
}

#[tokio::test]
async fn repeated_transport_failure_invalidates() {
    let transport = Arc::new(MockTransport::new());
    transport.push_error(TransportError::Timeout);
    transport.push_error(TransportError::Connect("refused".to_string()));
    let manager = manager(&transport).with_credential(expired_credential());

    let err = manager.ensure_valid().await.unwrap_err();

    assert!(err.is_transport());
    assert_eq!(manager.current_credential(), None);
}

#[tokio::test]
async fn no_credential_asks_for_authorization() {
    let transport = Arc::new(MockTransport::new());
    let manager = manager(&transport);

    assert!(manager.ensure_valid().await.unwrap().is_none());
    assert_eq!(manager.state(), LifecycleState::NoCredential);
    assert_eq!(transport.request_count(), 0);
}

#[tokio::test]
async fn concurrent_callers_share_one_refresh() {
    let transport = Arc::new(MockTransport::new());
    transport.push_json(
        StatusCode::OK,
        token_json("new-access", "new-refresh", future_timestamp(), None),
    );
    let manager = manager(&transport).with_credential(expired_credential());

    let (a, b) = tokio::join!(manager.ensure_valid(), manager.ensure_valid());

    assert_eq!(a.unwrap(), b.unwrap());
    assert_eq!(transport.request_count(), 1);
}

// authorize

#[tokio::test]
async fn web_consent_exchanges_code() {
    let transport = Arc::new(MockTransport::new());
    transport.push_json(
        StatusCode::OK,
        token_json("access", "refresh", future_timestamp(), Some(99)),
    );
    let consent = Arc::new(ScriptedConsent::approve("01020304"));
    let manager = manager(&transport).with_web_consent(consent.clone());

    let credential = manager.authorize().await.unwrap();

    assert_eq!(credential.access_token, "access");
    assert_eq!(credential.subject.as_ref().map(|s| s.id), Some(99));
    assert_eq!(manager.current_credential(), Some(credential));
    assert_eq!(manager.state(), LifecycleState::Valid);

    let presented = consent.presented();
    assert_eq!(presented.len(), 1);
    assert!(presented[0]
        .as_str()
        .starts_with("https://www.strava.com/oauth/mobile/authorize?"));

    let body = json_body(&transport.requests()[0]);
    assert_eq!(body["grant_type"], "authorization_code");
    assert_eq!(body["code"], "01020304");
}

#[tokio::test]
async fn authorization_url_carries_oauth_parameters() {
    let transport = Arc::new(MockTransport::new());
    let consent = Arc::new(ScriptedConsent::new(ConsentScript::Cancel));
    let manager = manager(&transport).with_web_consent(consent.clone());

    let _ = manager.authorize().await;

    let url = &consent.presented()[0];
    let param = |name: &str| {
        url.query_pairs()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.into_owned())
    };
    assert_eq!(param("client_id").as_deref(), Some("21314"));
    assert_eq!(param("redirect_uri").as_deref(), Some(REDIRECT));
    assert_eq!(param("scope").as_deref(), Some("read_all,activity:write"));
    assert_eq!(param("approval_prompt").as_deref(), Some("force"));
    assert_eq!(param("response_type").as_deref(), Some("code"));
    assert!(param("state").is_some_and(|s| !s.is_empty()));
}

#[tokio::test]
async fn app_handoff_skips_web_consent() {
    let transport = Arc::new(MockTransport::new());
    transport.push_json(
        StatusCode::OK,
        token_json("access", "refresh", future_timestamp(), Some(99)),
    );
    let consent = Arc::new(ScriptedConsent::approve("unused"));
    let launcher = Arc::new(ScriptedLauncher::new(true));
    let manager = manager(&transport)
        .with_web_consent(consent.clone())
        .with_app_handoff(launcher.clone());

    let mut state = manager.watch_state();
    let (authorized, processed) = tokio::join!(manager.authorize(), async {
        state
            .wait_for(|s| *s == LifecycleState::Authorizing)
            .await
            .unwrap();
        manager.process_authorization_code("app-code").await
    });

    assert_eq!(authorized.unwrap(), processed.unwrap());
    assert!(consent.presented().is_empty());

    let opened = launcher.opened();
    assert_eq!(opened.len(), 1);
    assert_eq!(opened[0].scheme(), "strava");
    assert_eq!(json_body(&transport.requests()[0])["code"], "app-code");
}

#[tokio::test]
async fn declined_handoff_falls_back_to_web() {
    let transport = Arc::new(MockTransport::new());
    transport.push_json(
        StatusCode::OK,
        token_json("access", "refresh", future_timestamp(), None),
    );
    let consent = Arc::new(ScriptedConsent::approve("web-code"));
    let launcher = Arc::new(ScriptedLauncher::new(false));
    let manager = manager(&transport)
        .with_app_handoff(launcher.clone())
        .with_web_consent(consent.clone());

    manager.authorize().await.unwrap();

    assert_eq!(launcher.opened().len(), 1);
    assert_eq!(consent.presented().len(), 1);
    assert_eq!(json_body(&transport.requests()[0])["code"], "web-code");
}

#[tokio::test]
async fn cancelled_consent() {
    let transport = Arc::new(MockTransport::new());
    let manager = manager(&transport)
        .with_web_consent(Arc::new(ScriptedConsent::new(ConsentScript::Cancel)));

    let err = manager.authorize().await.unwrap_err();

    assert!(matches!(err, StravaError::AuthorizationCancelled));
    assert_eq!(manager.current_credential(), None);
    assert_eq!(manager.state(), LifecycleState::NoCredential);
    assert_eq!(transport.request_count(), 0);
}

#[tokio::test]
async fn consent_error_is_authorization_failure() {
    let transport = Arc::new(MockTransport::new());
    let manager = manager(&transport).with_web_consent(Arc::new(ScriptedConsent::new(
        ConsentScript::Fail("network unreachable".to_string()),
    )));

    let err = manager.authorize().await.unwrap_err();

    assert!(matches!(
        err,
        StravaError::AuthorizationFailed { stage: AuthStage::Consent, ref detail }
            if detail == "network unreachable"
    ));
}

#[tokio::test]
async fn callback_without_code_fails() {
    let transport = Arc::new(MockTransport::new());
    let manager = manager(&transport).with_web_consent(Arc::new(ScriptedConsent::new(
        ConsentScript::Callback(callback("scope=read")),
    )));

    let err = manager.authorize().await.unwrap_err();

    assert!(matches!(
        err,
        StravaError::AuthorizationFailed { stage: AuthStage::Callback, .. }
    ));
    assert_eq!(transport.request_count(), 0);
}

#[tokio::test]
async fn callback_with_foreign_state_fails() {
    let transport = Arc::new(MockTransport::new());
    let manager = manager(&transport).with_web_consent(Arc::new(ScriptedConsent::new(
        ConsentScript::Callback(callback("state=forged&code=123")),
    )));

    let err = manager.authorize().await.unwrap_err();

    assert!(matches!(
        err,
        StravaError::AuthorizationFailed { stage: AuthStage::Callback, .. }
    ));
    assert_eq!(transport.request_count(), 0);
}

#[tokio::test]
async fn access_denied_callback_is_cancellation() {
    let transport = Arc::new(MockTransport::new());
    let manager = manager(&transport).with_web_consent(Arc::new(ScriptedConsent::new(
        ConsentScript::Callback(callback("error=access_denied")),
    )));

    let err = manager.authorize().await.unwrap_err();

    assert!(matches!(err, StravaError::AuthorizationCancelled));
}

#[tokio::test]
async fn rejected_code_exchange_is_invalid_status() {
    let transport = Arc::new(MockTransport::new());
    transport.push_json(
        StatusCode::BAD_REQUEST,
        serde_json::json!({"message": "Bad Request", "errors": []}),
    );
    let manager =
        manager(&transport).with_web_consent(Arc::new(ScriptedConsent::approve("expired-code")));

    let err = manager.authorize().await.unwrap_err();

    assert_eq!(err.status(), Some(StatusCode::BAD_REQUEST));
    assert_eq!(manager.current_credential(), None);
    assert_eq!(manager.state(), LifecycleState::NoCredential);
}

#[tokio::test]
async fn no_strategy_fails_authorization() {
    let transport = Arc::new(MockTransport::new());
    let manager = manager(&transport).with_app_handoff(Arc::new(ScriptedLauncher::new(false)));

    let err = manager.authorize().await.unwrap_err();

    assert!(matches!(
        err,
        StravaError::AuthorizationFailed { stage: AuthStage::Consent, .. }
    ));
}

#[tokio::test]
async fn newer_authorize_supersedes_pending_one() {
    let transport = Arc::new(MockTransport::new());
    transport.push_json(
        StatusCode::OK,
        token_json("access", "refresh", future_timestamp(), None),
    );
    let manager = manager(&transport).with_app_handoff(Arc::new(ScriptedLauncher::new(true)));

    let (first, second) = tokio::join!(manager.authorize(), async {
        tokio::task::yield_now().await;
        let (second, _) = tokio::join!(manager.authorize(), async {
            tokio::task::yield_now().await;
            manager.process_authorization_code("code").await
        });
        second
    });

    assert!(matches!(
        first.unwrap_err(),
        StravaError::AuthorizationFailed { stage: AuthStage::Superseded, .. }
    ));
    assert_eq!(second.unwrap().access_token, "access");
    assert_eq!(transport.request_count(), 1);
}

/// Holds every request until the test hands out a permit
struct GatedTransport {
    inner: MockTransport,
    permits: tokio::sync::Semaphore,
    seen: AtomicUsize,
}

impl GatedTransport {
    fn new() -> Self {
        Self {
            inner: MockTransport::new(),
            permits: tokio::sync::Semaphore::new(0),
            seen: AtomicUsize::new(0),
        }
    }

    fn seen(&self) -> usize {
        self.seen.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Transport for GatedTransport {
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse, TransportError> {
        self.seen.fetch_add(1, Ordering::SeqCst);
        if let Ok(permit) = self.permits.acquire().await {
            permit.forget();
        }
        self.inner.send(request).await
    }
}

#[tokio::test]
async fn code_exchange_in_flight_does_not_resolve_newer_authorize() {
    let transport = Arc::new(GatedTransport::new());
    transport.inner.push_json(
        StatusCode::OK,
        token_json("first", "refresh-1", future_timestamp(), None),
    );
    transport.inner.push_json(
        StatusCode::OK,
        token_json("second", "refresh-2", future_timestamp(), None),
    );
    let client = Client::with_transport(
        transport.clone(),
        ApiConfig::new("https://www.strava.com/api/v3"),
    );
    let manager = TokenLifecycleManager::new(client, oauth())
        .with_web_consent(Arc::new(ScriptedConsent::approve("code")));

    let (first, second, _) = tokio::join!(
        manager.authorize(),
        async {
            // The first exchange is on the wire; start over while it waits
            while transport.seen() < 1 {
                tokio::task::yield_now().await;
            }
            manager.authorize().await
        },
        async {
            while transport.seen() < 1 {
                tokio::task::yield_now().await;
            }
            transport.permits.add_permits(2);
        }
    );

    assert!(matches!(
        first.unwrap_err(),
        StravaError::AuthorizationFailed { stage: AuthStage::Superseded, .. }
    ));
    assert_eq!(second.unwrap().access_token, "second");
    assert_eq!(manager.current_credential().unwrap().access_token, "second");
}

#[tokio::test]
async fn token_falls_back_to_authorize() {
    let transport = Arc::new(MockTransport::new());
    transport.push_json(
        StatusCode::OK,
        token_json("access", "refresh", future_timestamp(), None),
    );
    let manager =
        manager(&transport).with_web_consent(Arc::new(ScriptedConsent::approve("code")));

    let credential = manager.token().await.unwrap();

    assert_eq!(credential.access_token, "access");
}

// deauthorize

#[tokio::test]
async fn deauthorize_revokes_and_clears() {
    let transport = Arc::new(MockTransport::new());
    transport.push_json(StatusCode::OK, serde_json::json!({"access_token": "valid-access"}));
    let store = Arc::new(MemoryTokenStore::with_credential(valid_credential()));
    let manager = manager(&transport).with_store(store.clone());

    manager.deauthorize().await.unwrap();

    let request = &transport.requests()[0];
    assert!(request.url.ends_with("/oauth/deauthorize"));
    assert_eq!(request.header_value("Authorization"), Some("Bearer valid-access"));
    assert_eq!(manager.current_credential(), None);
    assert_eq!(manager.state(), LifecycleState::NoCredential);
    assert_eq!(store.stored(), None);
}

#[tokio::test]
async fn deauthorize_clears_even_when_revocation_fails() {
    let transport = Arc::new(MockTransport::new());
    transport.push_status(StatusCode::INTERNAL_SERVER_ERROR);
    let manager = manager(&transport).with_credential(valid_credential());

    let err = manager.deauthorize().await.unwrap_err();

    assert_eq!(err.status(), Some(StatusCode::INTERNAL_SERVER_ERROR));
    assert_eq!(manager.current_credential(), None);
}

#[tokio::test]
async fn deauthorize_without_credential_is_a_no_op() {
    let transport = Arc::new(MockTransport::new());
    let manager = manager(&transport);

    manager.deauthorize().await.unwrap();

    assert_eq!(transport.request_count(), 0);
}

// persistence

#[tokio::test]
async fn stored_credential_is_adopted_and_new_ones_saved() {
    let transport = Arc::new(MockTransport::new());
    transport.push_json(
        StatusCode::OK,
        token_json("new-access", "new-refresh", future_timestamp(), None),
    );
    let store = Arc::new(MemoryTokenStore::with_credential(expired_credential()));
    let manager = manager(&transport).with_store(store.clone());

    assert_eq!(manager.current_credential(), Some(expired_credential()));

    let refreshed = manager.ensure_valid().await.unwrap().unwrap();

    assert_eq!(store.stored(), Some(refreshed));
    assert_eq!(store.save_count(), 1);
}

#[tokio::test]
async fn store_failures_are_not_fatal() {
    let transport = Arc::new(MockTransport::new());
    transport.push_json(
        StatusCode::OK,
        token_json("access", "refresh", future_timestamp(), None),
    );
    let store = Arc::new(MemoryTokenStore::failing());
    assert!(store.load().is_err());
    let manager = manager(&transport)
        .with_store(store)
        .with_web_consent(Arc::new(ScriptedConsent::approve("code")));

    let credential = manager.authorize().await.unwrap();

    assert_eq!(manager.current_credential(), Some(credential));
}

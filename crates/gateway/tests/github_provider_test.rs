use std::time::Duration;

use gateway::auth::{
    verify_identity, AuthError, DomainPolicy, GithubProvider, IdentityProvider, ProviderCredential,
};
use gateway::config::ProviderConfig;
use secrecy::Secret;
use serde_json::json;
use wiremock::matchers::{body_string_contains, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn provider_for(server: &MockServer, timeout: Duration) -> GithubProvider {
    GithubProvider::new(ProviderConfig {
        client_id: "test-client".to_string(),
        client_secret: Secret::new("test-secret".to_string()),
        redirect_uri: "http://gateway.test/auth/callback".to_string(),
        authorize_url: format!("{}/login/oauth/authorize", server.uri()),
        token_url: format!("{}/login/oauth/access_token", server.uri()),
        api_url: server.uri(),
        scope: "user:email".to_string(),
        timeout,
    })
    .expect("provider should build")
}

#[tokio::test]
async fn test_exchange_code_success() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/login/oauth/access_token"))
        .and(header("accept", "application/json"))
        .and(body_string_contains("code=abc123"))
        .and(body_string_contains("client_id=test-client"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "access_token": "gho_token",
            "token_type": "bearer",
            "scope": "user:email"
        })))
        .expect(1)
        .mount(&server)
        .await;

    let provider = provider_for(&server, Duration::from_secs(5));
    let credential = provider.exchange_code("abc123").await.unwrap();
    assert_eq!(credential.access_token(), "gho_token");
}

#[tokio::test]
async fn test_exchange_code_error_payload() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/login/oauth/access_token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "error": "bad_verification_code",
            "error_description": "The code passed is incorrect or expired."
        })))
        .mount(&server)
        .await;

    let provider = provider_for(&server, Duration::from_secs(5));
    match provider.exchange_code("stale").await {
        Err(AuthError::OAuthExchangeFailed(reason)) => {
            assert!(reason.contains("bad_verification_code"))
        }
        other => panic!("expected exchange failure, got {:?}", other.map(|_| ())),
    }
}

#[tokio::test]
async fn test_exchange_code_server_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/login/oauth/access_token"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let provider = provider_for(&server, Duration::from_secs(5));
    let result = provider.exchange_code("abc123").await;
    assert!(matches!(result, Err(AuthError::OAuthExchangeFailed(_))));
}

#[tokio::test]
async fn test_exchange_code_times_out() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/login/oauth/access_token"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({ "access_token": "late" }))
                .set_delay(Duration::from_secs(2)),
        )
        .mount(&server)
        .await;

    let provider = provider_for(&server, Duration::from_millis(200));
    let result = provider.exchange_code("abc123").await;
    assert!(matches!(result, Err(AuthError::OAuthExchangeFailed(_))));
}

#[tokio::test]
async fn test_fetch_emails_sends_bearer() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/user/emails"))
        .and(header("authorization", "Bearer gho_token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            { "email": "dev@users.noreply.github.com", "primary": false, "verified": true },
            { "email": "dev@allowed_domain.com", "primary": true, "verified": true, "visibility": "private" }
        ])))
        .expect(1)
        .mount(&server)
        .await;

    let provider = provider_for(&server, Duration::from_secs(5));
    let credential = ProviderCredential::new("gho_token");
    let emails = provider.fetch_emails(&credential).await.unwrap();

    assert_eq!(emails.len(), 2);
    assert_eq!(emails[1].address, "dev@allowed_domain.com");
    assert!(emails[1].is_primary && emails[1].is_verified);
}

#[tokio::test]
async fn test_fetch_emails_unauthorized() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/user/emails"))
        .respond_with(ResponseTemplate::new(401).set_body_json(json!({
            "message": "Bad credentials"
        })))
        .mount(&server)
        .await;

    let provider = provider_for(&server, Duration::from_secs(5));
    let result = provider
        .fetch_emails(&ProviderCredential::new("revoked"))
        .await;
    assert!(matches!(result, Err(AuthError::IdentityFetchFailed(_))));
}

#[tokio::test]
async fn test_verify_identity_against_provider() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/user/emails"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            { "email": "dev@elsewhere.org", "primary": true, "verified": true }
        ])))
        .mount(&server)
        .await;

    let provider = provider_for(&server, Duration::from_secs(5));
    let policy = DomainPolicy::new("allowed_domain.com");
    let result = verify_identity(&provider, &ProviderCredential::new("gho_token"), &policy).await;

    match result {
        Err(AuthError::DomainNotAllowed { domain, allowed }) => {
            assert_eq!(domain, "elsewhere.org");
            assert_eq!(allowed, "allowed_domain.com");
        }
        other => panic!("expected domain rejection, got {:?}", other),
    }
}

#[tokio::test]
async fn test_authorization_url_carries_parameters() {
    let server = MockServer::start().await;
    let provider = provider_for(&server, Duration::from_secs(5));

    let url = provider.authorization_url("state-xyz");
    assert!(url.starts_with(&format!("{}/login/oauth/authorize?", server.uri())));
    assert!(url.contains("client_id=test-client"));
    assert!(url.contains("scope=user%3Aemail"));
    assert!(url.contains("state=state-xyz"));
    assert!(url.contains("redirect_uri=http%3A%2F%2Fgateway.test%2Fauth%2Fcallback"));
}

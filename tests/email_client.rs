use webscan_server::config::EmailConfig;
use webscan_server::email::{EmailClient, EmailError, EmailSender};
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn client_for(server: &MockServer) -> EmailClient {
    EmailClient::new(EmailConfig {
        api_endpoint: format!("{}/api/send", server.uri()),
        api_key: "test-key".to_string(),
        from_address: "no-reply@webscan.local".to_string(),
        from_name: "Webscan".to_string(),
    })
}

#[tokio::test]
async fn test_send_posts_json_with_bearer_auth() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/api/send"))
        .and(header("Authorization", "Bearer test-key"))
        .and(header("Content-Type", "application/json"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    let client = client_for(&server);
    client
        .send("alice@example.com", "Webscan || Verify your email", "body")
        .await
        .unwrap();
}

#[tokio::test]
async fn test_api_error_status_is_reported() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/api/send"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let client = client_for(&server);
    let err = client.send("alice@example.com", "s", "b").await.unwrap_err();
    assert!(matches!(err, EmailError::ApiError(500)));
}

//! Guild lookup against a mock REST API

use presence_core::Error;
use presence_source_discord::RestClient;
use std::time::Duration;
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn client(server: &MockServer) -> RestClient {
    RestClient::new(server.uri(), "test-token", Duration::from_secs(2)).unwrap()
}

#[tokio::test]
async fn resolves_guild_name() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/guilds/1000"))
        .and(header("Authorization", "Bot test-token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "id": "1000",
            "name": "Test Guild",
            "owner_id": "1",
        })))
        .expect(1)
        .mount(&server)
        .await;

    let guild = client(&server).guild("1000").await.unwrap();

    assert_eq!(guild.id, "1000");
    assert_eq!(guild.name, "Test Guild");
}

#[tokio::test]
async fn unknown_guild_is_a_lookup_error() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/guilds/404"))
        .respond_with(
            ResponseTemplate::new(404)
                .set_body_json(serde_json::json!({"message": "Unknown Guild", "code": 10004})),
        )
        .mount(&server)
        .await;

    let result = client(&server).guild("404").await;

    assert!(matches!(result, Err(Error::Lookup(_))));
}

#[tokio::test]
async fn rejected_token_is_an_authentication_error() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(401))
        .mount(&server)
        .await;

    let result = client(&server).guild("1000").await;

    assert!(matches!(result, Err(Error::Authentication(_))));
}

#[tokio::test]
async fn server_errors_are_lookup_errors() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(502))
        .mount(&server)
        .await;

    let result = client(&server).guild("1000").await;

    assert!(matches!(result, Err(Error::Lookup(msg)) if msg.contains("502")));
}

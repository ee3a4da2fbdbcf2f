//! Integration tests for the action API against a mock GraphQL endpoint.

use kslive::api::{ActionApi, LiveHttp};
use kslive::LiveError;
use serde_json::json;
use wiremock::matchers::{body_partial_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn api(server: &MockServer) -> ActionApi {
    let page_url = format!("{}/u/streamer", server.uri());
    let http = LiveHttp::new(&server.uri(), &page_url, "userId=42", None).unwrap();
    ActionApi::new(http)
}

#[tokio::test]
async fn test_submit_chat_message_sends_operation() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/live_graphql"))
        .and(body_partial_json(json!({
            "operationName": "SendLiveComment",
            "variables": { "liveStreamId": "live-123", "content": "hi", "color": null }
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": { "sendLiveComment": { "result": 1, "__typename": "SendLiveCommentResult" } }
        })))
        .expect(1)
        .mount(&server)
        .await;

    let result = api(&server)
        .submit_chat_message("hi", "live-123", None)
        .await
        .unwrap();
    assert!(result.accepted());
}

#[tokio::test]
async fn test_rejected_comment_is_not_an_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/live_graphql"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": { "sendLiveComment": { "result": 2 } }
        })))
        .mount(&server)
        .await;

    let result = api(&server)
        .submit_chat_message("hi", "live-123", Some("#FF0000"))
        .await
        .unwrap();
    assert!(!result.accepted());
}

#[tokio::test]
async fn test_follow_and_unfollow_types() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/live_graphql"))
        .and(body_partial_json(json!({
            "operationName": "UserFollow",
            "variables": { "principalId": "star", "type": 1 }
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": { "webFollow": { "followStatus": 1 } }
        })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/live_graphql"))
        .and(body_partial_json(json!({
            "operationName": "UserFollow",
            "variables": { "principalId": "star", "type": 2 }
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": { "webFollow": { "followStatus": 0 } }
        })))
        .expect(1)
        .mount(&server)
        .await;

    let api = api(&server);
    assert_eq!(api.set_follow("star", true).await.unwrap().follow_status, 1);
    assert_eq!(api.set_follow("star", false).await.unwrap().follow_status, 0);
}

#[tokio::test]
async fn test_fetch_user_profile() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/live_graphql"))
        .and(body_partial_json(json!({
            "operationName": "UserCardInfoById",
            "variables": { "principalId": "star", "count": 3 }
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": { "userCardInfo": {
                "id": "star",
                "name": "Star",
                "cityName": "Hangzhou",
                "feeds": [{ "photoId": "p1", "timestamp": 1700000000000_i64 }],
                "counts": { "fan": "1.2w", "follow": 10 }
            } }
        })))
        .mount(&server)
        .await;

    let profile = api(&server).fetch_user_profile("star").await.unwrap();
    assert_eq!(profile.name, "Star");
    assert_eq!(profile.city_name, "Hangzhou");
    assert_eq!(profile.feeds[0].photo_id, "p1");
    assert_eq!(profile.counts.unwrap().fan, Some(json!("1.2w")));
}

#[tokio::test]
async fn test_graphql_errors_become_request_errors() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/live_graphql"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": null,
            "errors": [{ "message": "rate limited" }]
        })))
        .mount(&server)
        .await;

    let err = api(&server).set_follow("star", true).await.unwrap_err();
    match err {
        LiveError::Request(msg) => assert!(msg.contains("rate limited"), "{msg}"),
        other => panic!("expected request error, got {other:?}"),
    }
}

#[tokio::test]
async fn test_unauthorized_is_session_invalid() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/live_graphql"))
        .respond_with(ResponseTemplate::new(401))
        .mount(&server)
        .await;

    let err = api(&server)
        .submit_chat_message("hi", "live-123", None)
        .await
        .unwrap_err();
    assert!(matches!(err, LiveError::SessionInvalid(_)), "got {err:?}");
}

#[tokio::test]
async fn test_fetch_gift_catalog() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/live_api/emoji/allgifts"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": {
                "10": { "name": "Rose", "unitPrice": 1 },
                "2": { "name": "Heart" }
            }
        })))
        .mount(&server)
        .await;

    let catalog = api(&server).fetch_gift_catalog().await.unwrap();
    let gifts = catalog.gifts();
    assert_eq!(gifts.len(), 2);
    assert_eq!(gifts[0].name, "Heart");
    assert_eq!(gifts[1].unit_price, Some(1));
    assert_eq!(catalog.get(10).unwrap().name, "Rose");
}

//! Mutations and lookups through the live site's GraphQL endpoint.
//!
//! All operations are plain request/response calls on the shared
//! [`LiveHttp`] session and may run while a room session is open.

use reqwest::header::ACCEPT;
use serde::de::DeserializeOwned;
use serde_json::json;

use super::client::{check_status, LiveHttp};
use super::types::{
    CommentResult, FollowResult, GiftCatalog, GraphqlRequest, GraphqlResponse,
    SendLiveCommentData, UserCardInfoData, UserProfile, WebFollowData,
};
use crate::constants::{ALL_GIFTS_PATH, GRAPHQL_PATH, JSON_ACCEPT};
use crate::error::LiveError;

const SEND_LIVE_COMMENT: &str = "mutation SendLiveComment($liveStreamId: String, $content: String, $color: String) {\n  sendLiveComment(liveStreamId: $liveStreamId, content: $content, color: $color) {\n    result\n    __typename\n  }\n}\n";

const USER_FOLLOW: &str = "mutation UserFollow($principalId: String, $type: Int) {\n  webFollow(principalId: $principalId, type: $type) {\n    followStatus\n    __typename\n  }\n}\n";

const USER_CARD_INFO: &str = "query UserCardInfoById($principalId: String, $count: Int) {\n  userCardInfo(principalId: $principalId, count: $count) {\n    id\n    originUserId\n    avatar\n    name\n    description\n    sex\n    constellation\n    cityName\n    followStatus\n    privacy\n    feeds {\n      eid\n      photoId\n      thumbnailUrl\n      timestamp\n      __typename\n    }\n    counts {\n      fan\n      follow\n      photo\n      __typename\n    }\n    __typename\n  }\n}\n";

/// `webFollow` type for following.
const FOLLOW: u8 = 1;
/// `webFollow` type for unfollowing.
const UNFOLLOW: u8 = 2;
/// Recent posts requested with a profile card.
const PROFILE_FEED_COUNT: u8 = 3;

/// Client for chat, follow, profile and gift calls.
#[derive(Debug, Clone)]
pub struct ActionApi {
    http: LiveHttp,
}

impl ActionApi {
    /// Action client over `http`.
    pub fn new(http: LiveHttp) -> Self {
        Self { http }
    }

    /// Run one GraphQL operation and return its `data`.
    ///
    /// # Errors
    ///
    /// [`LiveError::SessionInvalid`] on 401/403, otherwise
    /// [`LiveError::Request`] for transport failures, GraphQL errors or a
    /// response without data.
    pub async fn graphql<T: DeserializeOwned>(
        &self,
        operation_name: &str,
        variables: serde_json::Value,
        query: &str,
    ) -> Result<T, LiveError> {
        let body = GraphqlRequest {
            operation_name,
            variables,
            query,
        };
        let response = self
            .http
            .client()
            .post(self.http.url(GRAPHQL_PATH))
            .header(ACCEPT, JSON_ACCEPT)
            .json(&body)
            .send()
            .await?;
        let raw: serde_json::Value = check_status(response, operation_name)?.json().await?;
        log::debug!("[Api] {operation_name} -> {raw}");

        let parsed: GraphqlResponse<T> = serde_json::from_value(raw)
            .map_err(|e| LiveError::Request(format!("{operation_name}: unexpected response: {e}")))?;
        if !parsed.errors.is_empty() {
            let messages: Vec<_> = parsed.errors.into_iter().map(|e| e.message).collect();
            return Err(LiveError::Request(format!(
                "{operation_name}: {}",
                messages.join("; ")
            )));
        }
        parsed
            .data
            .ok_or_else(|| LiveError::Request(format!("{operation_name}: response has no data")))
    }

    /// Post a chat message to `room_id`, optionally coloured (`#RRGGBB`).
    ///
    /// # Errors
    ///
    /// See [`graphql`](Self::graphql).
    pub async fn submit_chat_message(
        &self,
        content: &str,
        room_id: &str,
        color: Option<&str>,
    ) -> Result<CommentResult, LiveError> {
        let variables = json!({
            "color": color,
            "content": content,
            "liveStreamId": room_id,
        });
        let data: SendLiveCommentData = self
            .graphql("SendLiveComment", variables, SEND_LIVE_COMMENT)
            .await?;
        if !data.send_live_comment.accepted() {
            log::warn!(
                "[Api] Comment to {room_id} not accepted (result {})",
                data.send_live_comment.result
            );
        }
        Ok(data.send_live_comment)
    }

    /// Follow (`true`) or unfollow (`false`) a user.
    ///
    /// # Errors
    ///
    /// See [`graphql`](Self::graphql).
    pub async fn set_follow(&self, target_id: &str, follow: bool) -> Result<FollowResult, LiveError> {
        let variables = json!({
            "principalId": target_id,
            "type": if follow { FOLLOW } else { UNFOLLOW },
        });
        let data: WebFollowData = self.graphql("UserFollow", variables, USER_FOLLOW).await?;
        Ok(data.web_follow)
    }

    /// Profile card of a user.
    ///
    /// # Errors
    ///
    /// See [`graphql`](Self::graphql). A null card is a
    /// [`LiveError::Request`].
    pub async fn fetch_user_profile(&self, target_id: &str) -> Result<UserProfile, LiveError> {
        let variables = json!({
            "principalId": target_id,
            "count": PROFILE_FEED_COUNT,
        });
        let data: UserCardInfoData = self
            .graphql("UserCardInfoById", variables, USER_CARD_INFO)
            .await?;
        data.user_card_info
            .ok_or_else(|| LiveError::Request(format!("no profile for {target_id}")))
    }

    /// Full gift catalog.
    ///
    /// # Errors
    ///
    /// [`LiveError::SessionInvalid`] on 401/403, otherwise
    /// [`LiveError::Request`].
    pub async fn fetch_gift_catalog(&self) -> Result<GiftCatalog, LiveError> {
        let response = self
            .http
            .client()
            .get(self.http.url(ALL_GIFTS_PATH))
            .header(ACCEPT, JSON_ACCEPT)
            .send()
            .await?;
        let catalog: GiftCatalog = check_status(response, "gift catalog")?.json().await?;
        log::debug!("[Api] Gift catalog has {} entries", catalog.gifts().len());
        Ok(catalog)
    }
}

//! Response types for the live site's HTTP endpoints.
//!
//! Fields the site sometimes omits are optional or defaulted, so a sparse
//! response still deserializes.

use serde::{Deserialize, Serialize};

/// Envelope of the socket discovery endpoint.
#[derive(Debug, Clone, Deserialize)]
pub struct WebSocketInfoResponse {
    /// Payload.
    pub data: WebSocketInfo,
}

/// Token and socket URLs for one room.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WebSocketInfo {
    /// `1` on success; anything else means the cookie was refused.
    #[serde(default)]
    pub result: i64,
    /// Room-entry token.
    #[serde(default)]
    pub token: String,
    /// Candidate socket URLs; the first one is used.
    #[serde(default)]
    pub websocket_urls: Vec<String>,
}

/// GraphQL request body.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GraphqlRequest<'a> {
    /// Operation name, e.g. `SendLiveComment`.
    pub operation_name: &'a str,
    /// Operation variables.
    pub variables: serde_json::Value,
    /// Query document.
    pub query: &'a str,
}

/// GraphQL response body.
#[derive(Debug, Clone, Deserialize)]
pub struct GraphqlResponse<T> {
    /// Result data, absent on failure.
    pub data: Option<T>,
    /// Reported errors.
    #[serde(default)]
    pub errors: Vec<GraphqlError>,
}

/// One GraphQL error.
#[derive(Debug, Clone, Deserialize)]
pub struct GraphqlError {
    /// Error message.
    #[serde(default)]
    pub message: String,
}

/// `SendLiveComment` result.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct SendLiveCommentData {
    pub send_live_comment: CommentResult,
}

/// Outcome of posting a chat message.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct CommentResult {
    /// `1` when the comment was accepted.
    #[serde(default)]
    pub result: i64,
}

impl CommentResult {
    /// Whether the site accepted the comment.
    pub fn accepted(&self) -> bool {
        self.result == 1
    }
}

/// `UserFollow` result.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct WebFollowData {
    pub web_follow: FollowResult,
}

/// Outcome of a follow/unfollow call.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FollowResult {
    /// Follow status after the call.
    #[serde(default)]
    pub follow_status: i64,
}

/// `UserCardInfoById` result.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct UserCardInfoData {
    pub user_card_info: Option<UserProfile>,
}

/// Public profile card of a user.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase", default)]
pub struct UserProfile {
    /// Principal id.
    pub id: String,
    /// Numeric user id.
    pub origin_user_id: Option<serde_json::Value>,
    /// Avatar URL.
    pub avatar: String,
    /// Display name.
    pub name: String,
    /// Bio.
    pub description: String,
    /// `M`, `F` or empty.
    pub sex: String,
    /// Star sign.
    pub constellation: String,
    /// City.
    pub city_name: String,
    /// Whether the session user follows this user.
    pub follow_status: Option<serde_json::Value>,
    /// Profile privacy flag.
    pub privacy: Option<bool>,
    /// Recent posts.
    pub feeds: Vec<ProfileFeed>,
    /// Follower and post counts.
    pub counts: Option<ProfileCounts>,
}

/// One recent post on a profile card.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ProfileFeed {
    /// Encrypted id.
    pub eid: String,
    /// Post id.
    pub photo_id: String,
    /// Thumbnail URL.
    pub thumbnail_url: String,
    /// Post time (epoch milliseconds).
    pub timestamp: Option<i64>,
}

/// Counts on a profile card. The site sends abbreviated strings (`1.2w`)
/// or plain numbers depending on the value.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct ProfileCounts {
    /// Followers.
    pub fan: Option<serde_json::Value>,
    /// Following.
    pub follow: Option<serde_json::Value>,
    /// Posts.
    pub photo: Option<serde_json::Value>,
}

/// One gift in the catalog.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Gift {
    /// Catalog id, as referenced by gift feeds.
    pub id: String,
    /// Display name.
    pub name: String,
    /// Price in coins, when listed.
    pub unit_price: Option<u64>,
}

/// Gift catalog as returned by the site.
///
/// The raw document is kept; [`GiftCatalog::gifts`] extracts the entries.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(transparent)]
pub struct GiftCatalog(pub serde_json::Value);

impl GiftCatalog {
    /// Gifts keyed by id under `data`, sorted by numeric id.
    pub fn gifts(&self) -> Vec<Gift> {
        let Some(entries) = self.0.get("data").and_then(serde_json::Value::as_object) else {
            return Vec::new();
        };
        let mut gifts: Vec<Gift> = entries
            .iter()
            .map(|(id, entry)| Gift {
                id: id.clone(),
                name: entry
                    .get("name")
                    .and_then(serde_json::Value::as_str)
                    .unwrap_or_default()
                    .to_string(),
                unit_price: entry.get("unitPrice").and_then(serde_json::Value::as_u64),
            })
            .collect();
        gifts.sort_by_key(|g| (g.id.parse::<u64>().unwrap_or(u64::MAX), g.id.clone()));
        gifts
    }

    /// Look up one gift by catalog id.
    pub fn get(&self, id: u32) -> Option<Gift> {
        self.gifts().into_iter().find(|g| g.id == id.to_string())
    }
}

//! One-shot account actions: chat, follow, profile lookup and gift catalog.

use anyhow::{Context, Result};

use crate::api::{ActionApi, HttpRoomDirectory, RoomDirectory};
use crate::config::Config;

fn action_api(config: &Config) -> Result<ActionApi> {
    Ok(ActionApi::new(super::http_session(config)?))
}

/// Post `content` to the live room. The room id comes from `room_id` or,
/// when absent, from the configured room page.
pub async fn send(config: &Config, content: &str, room_id: Option<&str>, color: Option<&str>) -> Result<()> {
    let http = super::http_session(config)?;
    let room_id = match room_id {
        Some(id) => id.to_string(),
        None => {
            super::require_page_url(config)?;
            HttpRoomDirectory::new(http.clone())
                .resolve_room_id(&config.page_url)
                .await?
        }
    };

    let result = ActionApi::new(http)
        .submit_chat_message(content, &room_id, color)
        .await?;
    if result.accepted() {
        println!("Sent to {room_id}");
    } else {
        anyhow::bail!("Comment rejected by the site (result {})", result.result);
    }
    Ok(())
}

/// Follow or unfollow `target_id`.
pub async fn follow(config: &Config, target_id: &str, follow: bool) -> Result<()> {
    let result = action_api(config)?.set_follow(target_id, follow).await?;
    let verb = if follow { "Followed" } else { "Unfollowed" };
    println!("{verb} {target_id} (status {})", result.follow_status);
    Ok(())
}

/// Print a profile card as JSON.
pub async fn profile(config: &Config, target_id: &str) -> Result<()> {
    let profile = action_api(config)?.fetch_user_profile(target_id).await?;
    let json = serde_json::to_string_pretty(&profile).context("Failed to render profile")?;
    println!("{json}");
    Ok(())
}

/// Print the gift catalog, or the raw document with `raw`.
pub async fn gifts(config: &Config, raw: bool) -> Result<()> {
    let catalog = action_api(config)?.fetch_gift_catalog().await?;
    if raw {
        println!("{}", serde_json::to_string_pretty(&catalog)?);
        return Ok(());
    }
    for gift in catalog.gifts() {
        match gift.unit_price {
            Some(price) => println!("{:>6}  {}  ({price})", gift.id, gift.name),
            None => println!("{:>6}  {}", gift.id, gift.name),
        }
    }
    Ok(())
}

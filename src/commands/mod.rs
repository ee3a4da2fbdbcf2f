//! CLI subcommand implementations for kslive.
//!
//! Commands are organized into submodules by domain:
//!
//! - [`watch`] - follow a live room and print its chat
//! - [`actions`] - chat, follow, profile and gift calls
//! - [`inspect`] - decode captured frames
//! - [`settings`] - show and edit the configuration file

pub mod actions;
pub mod inspect;
pub mod settings;
pub mod watch;

use anyhow::{Context, Result};

use crate::api::LiveHttp;
use crate::config::Config;

/// Build the HTTP session from the configuration and its cookie source.
pub(crate) fn http_session(config: &Config) -> Result<LiveHttp> {
    let cookie = config
        .credential_provider()
        .cookie()
        .context("No usable session cookie (set KSLIVE_COOKIE or cookie_file)")?;
    let http = LiveHttp::new(
        &config.api_base,
        &config.page_url,
        &cookie,
        config.proxy().as_ref(),
    )?;
    Ok(http)
}

/// Fail early when no room page is configured.
pub(crate) fn require_page_url(config: &Config) -> Result<()> {
    if config.page_url.trim().is_empty() {
        anyhow::bail!("No room page configured (set page_url or KSLIVE_PAGE_URL)");
    }
    Ok(())
}

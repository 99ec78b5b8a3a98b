use crate::config::Config;
use crate::youtube_api::client::{TimeBoundAccessToken, YouTubeClient};
use eyre::Context;
use oauth2::basic::BasicTokenResponse;
use std::ops::AsyncFnMut;
use std::sync::Arc;

pub mod config;
pub mod error;
pub mod event;
pub mod lifecycle;
pub mod live;
pub mod notifications;
pub mod oauth;
pub mod publisher;
pub mod remote;
pub mod session;
pub mod youtube_api;

pub use error::{Error, Fault, FaultKind, Result};
pub use event::{BroadcastEvent, EventStatus, IngestionTarget, UpcomingEvent};
pub use lifecycle::BroadcastLifecycleManager;
pub use live::LiveSession;
pub use remote::{RemoteBroadcastClient, YouTubeBroadcastClient};
pub use session::{StreamSession, StreamSessionController};

/// Gets an authenticated YouTube client, authorizing in the browser when needed.
///
/// `stored_token` is the JSON of a previously persisted token, if any. A stored token is
/// refreshed up front; if that fails the user is sent through the full OAuth flow again.
/// `notify_callback` is told (id, title, message) whenever the user has to act.
///
/// Returns the client and the token to persist for next time.
pub async fn setup_youtube_client<F>(
    config: &Config,
    stored_token: Option<&str>,
    mut notify_callback: F,
) -> eyre::Result<(YouTubeClient, BasicTokenResponse)>
where
    F: AsyncFnMut(&str, &str, &str),
{
    let oauth_manager = Arc::new(oauth::OAuthManager::new(&config.oauth));

    let token = match stored_token.map(str::trim).filter(|s| !s.is_empty()) {
        None => {
            notify_callback(
                "wm_auth",
                "Check your browser",
                "You need to authenticate to YouTube to give access to your channel.",
            )
            .await;
            let token = oauth_manager
                .authenticate()
                .await
                .context("authorize user to YouTube")?;
            TimeBoundAccessToken::new(token)
        }
        Some(stored) => {
            let token: BasicTokenResponse =
                serde_json::from_str(stored).context("parse YouTube access token")?;
            let mut token = TimeBoundAccessToken::expired(token);
            if token
                .refresh(&oauth_manager)
                .await
                .context("refresh token")?
            {
                tracing::debug!("refreshed stored token");
                token
            } else {
                notify_callback(
                    "wm_reauth",
                    "Check your browser",
                    "YouTube token refresh failed. You need to re-authenticate to YouTube.",
                )
                .await;
                tracing::warn!("token refresh failed, getting new token via full OAuth");
                let token = oauth_manager
                    .authenticate()
                    .await
                    .context("authorize user to YouTube")?;
                TimeBoundAccessToken::new(token)
            }
        }
    };

    let raw_token = token.raw_token().clone();
    let client = YouTubeClient::new(token, oauth_manager, config)?;
    if !client
        .validate_token()
        .await
        .context("validate YouTube token")?
    {
        eyre::bail!("YouTube token failed validation");
    }

    Ok((client, raw_token))
}

//! Authenticated HTTP access to the YouTube Data API.

use crate::config::{Config, RetryConfig};
use crate::error::{Error, Result};
use crate::oauth::OAuthManager;
use crate::youtube_api::broadcasts::{
    BroadcastStatus, LiveBroadcast, LiveBroadcastInsertRequest, LiveBroadcastListResponse,
};
use crate::youtube_api::streams::{LiveStream, LiveStreamInsertRequest, LiveStreamListResponse};
use crate::youtube_api::types::{ErrorResponse, PagedStream};
use http::Method;
use oauth2::TokenResponse;
use oauth2::basic::BasicTokenResponse;
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::sync::Arc;
use std::time::{Duration, SystemTime};
use tokio::sync::Mutex;
use tokio_stream::Stream;
use tracing::instrument;

/// Tokens are treated as expired this long before Google says they are.
const EXPIRY_SAFETY_BUFFER: Duration = Duration::from_secs(300);

/// An OAuth token together with the moment it should be considered stale.
#[derive(Debug, Clone)]
pub struct TimeBoundAccessToken {
    token: BasicTokenResponse,
    expires_at: SystemTime,
}

impl TimeBoundAccessToken {
    /// Wraps a freshly issued token.
    pub fn new(token: BasicTokenResponse) -> Self {
        Self {
            expires_at: Self::expiry_of(&token),
            token,
        }
    }

    /// Wraps a token of unknown age (e.g. loaded from disk) so that it gets refreshed
    /// before first use.
    pub fn expired(token: BasicTokenResponse) -> Self {
        Self {
            expires_at: SystemTime::UNIX_EPOCH,
            token,
        }
    }

    pub fn raw_token(&self) -> &BasicTokenResponse {
        &self.token
    }

    pub fn is_expired(&self) -> bool {
        SystemTime::now() >= self.expires_at
    }

    /// Refreshes in place. Returns `Ok(false)` when the refresh token is missing or no
    /// longer accepted.
    pub async fn refresh(&mut self, oauth: &OAuthManager) -> eyre::Result<bool> {
        let Some(new_token) = oauth.refresh_token(&self.token).await? else {
            return Ok(false);
        };
        let old_token = std::mem::replace(&mut self.token, new_token);
        // Google usually omits the refresh token from refresh responses
        if self.token.refresh_token().is_none() {
            self.token
                .set_refresh_token(old_token.refresh_token().cloned());
        }
        self.expires_at = Self::expiry_of(&self.token);
        Ok(true)
    }

    fn expiry_of(token: &BasicTokenResponse) -> SystemTime {
        let lifetime = token
            .expires_in()
            .unwrap_or(Duration::from_secs(3600))
            .saturating_sub(EXPIRY_SAFETY_BUFFER);
        SystemTime::now() + lifetime
    }
}

/// Client for the subset of the YouTube Data API needed to run a live broadcast.
///
/// Access tokens are refreshed transparently before each request. Reads that fail without
/// producing a response are retried with exponential backoff as configured by
/// [`RetryConfig`]. Inserts, binds and transitions are sent once, since a timed out POST
/// may still have been applied. Responses with an error status are never retried.
#[derive(Debug, Clone)]
pub struct YouTubeClient {
    token: Arc<Mutex<TimeBoundAccessToken>>,
    oauth: Arc<OAuthManager>,
    http: reqwest::Client,
    base_url: String,
    retry: RetryConfig,
}

impl YouTubeClient {
    pub fn new(
        token: TimeBoundAccessToken,
        oauth: Arc<OAuthManager>,
        config: &Config,
    ) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(config.request_timeout())
            .build()
            .map_err(|e| Error::Configuration(format!("build HTTP client: {e}")))?;
        Ok(Self {
            token: Arc::new(Mutex::new(token)),
            oauth,
            http,
            base_url: config.api_base_url.trim_end_matches('/').to_string(),
            retry: config.retry.clone(),
        })
    }

    /// The current token, e.g. for persisting after a refresh.
    pub async fn token(&self) -> BasicTokenResponse {
        self.token.lock().await.token.clone()
    }

    async fn fresh_access_token(&self) -> Result<String> {
        let mut token = self.token.lock().await;
        if token.is_expired() {
            tracing::debug!("access token expired, refreshing");
            let refreshed = token
                .refresh(&self.oauth)
                .await
                .map_err(|e| Error::Auth(format!("{e:#}")))?;
            if !refreshed {
                return Err(Error::Auth(
                    "access token expired and could not be refreshed".to_string(),
                ));
            }
        }
        Ok(token.token.access_token().secret().to_string())
    }

    /// Sends an authenticated request and returns the successful response.
    ///
    /// Transport failures of idempotent requests are retried up to `retry.max_attempts`
    /// times in total; anything else gets a single attempt. A non-2xx
    /// response becomes [`Error::RemoteService`] with the message from Google's error
    /// envelope when one is present.
    #[instrument(skip(self, json_body), level = tracing::Level::TRACE)]
    async fn request(
        &self,
        method: Method,
        path: &str,
        query: &[(&str, &str)],
        json_body: Option<&(impl Serialize + Sync)>,
    ) -> Result<reqwest::Response> {
        let url = format!("{}/{}", self.base_url, path);
        let access_token = self.fresh_access_token().await?;
        let max_attempts = if method.is_idempotent() {
            self.retry.max_attempts
        } else {
            1
        };

        let mut attempt = 1;
        loop {
            let mut request = self
                .http
                .request(method.clone(), &url)
                .bearer_auth(&access_token)
                .query(query);
            if let Some(body) = json_body {
                request = request.json(body);
            }

            match request.send().await {
                Ok(response) => return Self::check_status(&method, &url, response).await,
                Err(e) => {
                    let error = Error::from(e);
                    if attempt >= max_attempts {
                        tracing::error!(%error, attempt, %url, "giving up on request");
                        return Err(error);
                    }
                    let backoff = self.retry.backoff(attempt);
                    tracing::warn!(%error, attempt, ?backoff, %url, "request failed, retrying");
                    tokio::time::sleep(backoff).await;
                    attempt += 1;
                }
            }
        }
    }

    async fn check_status(
        method: &Method,
        url: &str,
        response: reqwest::Response,
    ) -> Result<reqwest::Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        let message = match serde_json::from_str::<ErrorResponse>(&body) {
            Ok(envelope) => envelope.error.message,
            Err(_) if body.is_empty() => status
                .canonical_reason()
                .unwrap_or("unknown error")
                .to_string(),
            Err(_) => body,
        };
        tracing::error!(
            %method,
            url,
            code = status.as_u16(),
            %message,
            "YouTube API request failed"
        );
        Err(Error::RemoteService {
            code: status.as_u16(),
            message,
        })
    }

    async fn parse<T: DeserializeOwned>(response: reqwest::Response) -> Result<T> {
        let status = response.status();
        let bytes = response.bytes().await?;
        serde_json::from_slice(&bytes).map_err(|e| Error::RemoteService {
            code: status.as_u16(),
            message: format!("malformed response body: {e}"),
        })
    }

    /// Checks that the token works by listing at most one of the user's broadcasts.
    #[instrument(skip(self), ret)]
    pub async fn validate_token(&self) -> Result<bool> {
        let query = [("part", "id"), ("mine", "true"), ("maxResults", "1")];
        match self
            .request(Method::GET, "liveBroadcasts", &query, None::<&()>)
            .await
        {
            Ok(_) => Ok(true),
            Err(Error::RemoteService { code: 401 | 403, message }) => {
                tracing::warn!(%message, "token rejected by YouTube");
                Ok(false)
            }
            Err(e) => Err(e),
        }
    }

    /// `liveBroadcasts.insert`
    ///
    /// <https://developers.google.com/youtube/v3/live/docs/liveBroadcasts/insert>
    #[instrument(skip(self, broadcast), fields(title = %broadcast.snippet.title))]
    pub async fn insert_live_broadcast(
        &self,
        broadcast: &LiveBroadcastInsertRequest,
    ) -> Result<LiveBroadcast> {
        let query = [("part", "id,snippet,status,contentDetails")];
        let response = self
            .request(Method::POST, "liveBroadcasts", &query, Some(broadcast))
            .await?;
        let broadcast: LiveBroadcast = Self::parse(response).await?;
        tracing::debug!(broadcast_id = %broadcast.id, "inserted broadcast");
        Ok(broadcast)
    }

    /// `liveStreams.insert`
    ///
    /// <https://developers.google.com/youtube/v3/live/docs/liveStreams/insert>
    #[instrument(skip(self, stream), fields(title = %stream.snippet.title))]
    pub async fn insert_live_stream(&self, stream: &LiveStreamInsertRequest) -> Result<LiveStream> {
        let query = [("part", "id,snippet,cdn")];
        let response = self
            .request(Method::POST, "liveStreams", &query, Some(stream))
            .await?;
        let stream: LiveStream = Self::parse(response).await?;
        tracing::debug!(stream_id = %stream.id, "inserted stream");
        Ok(stream)
    }

    /// `liveBroadcasts.bind`: attaches a stream to a broadcast.
    ///
    /// <https://developers.google.com/youtube/v3/live/docs/liveBroadcasts/bind>
    #[instrument(skip(self))]
    pub async fn bind_live_broadcast(
        &self,
        broadcast_id: &str,
        stream_id: &str,
    ) -> Result<LiveBroadcast> {
        let query = [
            ("part", "id,contentDetails"),
            ("id", broadcast_id),
            ("streamId", stream_id),
        ];
        let response = self
            .request(Method::POST, "liveBroadcasts/bind", &query, None::<&()>)
            .await?;
        let broadcast: LiveBroadcast = Self::parse(response).await?;
        tracing::debug!(broadcast_id, stream_id, "bound stream to broadcast");
        Ok(broadcast)
    }

    /// Broadcasts that are scheduled but have not started, across all result pages.
    ///
    /// `broadcastStatus` cannot be combined with `mine`; the filter already limits results
    /// to the authenticated user's broadcasts.
    ///
    /// <https://developers.google.com/youtube/v3/live/docs/liveBroadcasts/list>
    pub fn list_upcoming_live_broadcasts(
        &self,
    ) -> impl Stream<Item = Result<LiveBroadcast>> + use<'_> {
        PagedStream::new(move |page_token: Option<String>| async move {
            let mut query = vec![
                ("part", "id,snippet,status,contentDetails"),
                ("broadcastStatus", "upcoming"),
                ("broadcastType", "all"),
                ("maxResults", "50"),
            ];
            if let Some(token) = page_token.as_deref() {
                query.push(("pageToken", token));
            }
            let response = self
                .request(Method::GET, "liveBroadcasts", &query, None::<&()>)
                .await?;
            let page: LiveBroadcastListResponse = Self::parse(response).await?;
            tracing::debug!(
                total_results = page.page_info.total_results,
                returned_items = page.items.len(),
                "fetched upcoming broadcasts"
            );
            Ok((page.items, page.next_page_token))
        })
    }

    /// `liveStreams.list` for a single stream id. `Ok(None)` if no such stream exists.
    ///
    /// <https://developers.google.com/youtube/v3/live/docs/liveStreams/list>
    #[instrument(skip(self))]
    pub async fn get_live_stream(&self, stream_id: &str) -> Result<Option<LiveStream>> {
        let query = [("part", "id,cdn"), ("id", stream_id)];
        let response = self
            .request(Method::GET, "liveStreams", &query, None::<&()>)
            .await?;
        let streams: LiveStreamListResponse = Self::parse(response).await?;
        Ok(streams.items.into_iter().next())
    }

    /// `liveBroadcasts.transition`
    ///
    /// <https://developers.google.com/youtube/v3/live/docs/liveBroadcasts/transition>
    #[instrument(skip(self), fields(status = %status))]
    pub async fn transition_live_broadcast(
        &self,
        broadcast_id: &str,
        status: BroadcastStatus,
    ) -> Result<LiveBroadcast> {
        let query = [
            ("part", "id,status"),
            ("id", broadcast_id),
            ("broadcastStatus", status.as_str()),
        ];
        let response = self
            .request(Method::POST, "liveBroadcasts/transition", &query, None::<&()>)
            .await?;
        let broadcast: LiveBroadcast = Self::parse(response).await?;
        tracing::info!(broadcast_id, %status, "transitioned broadcast");
        Ok(broadcast)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::config::OAuthConfig;
    use crate::youtube_api::broadcasts::{
        LiveBroadcastInsertContentDetails, LiveBroadcastInsertSnippet, LiveBroadcastInsertStatus,
        MonitorStreamInfo, PrivacyStatus,
    };
    use oauth2::basic::BasicTokenType;
    use oauth2::{AccessToken, EmptyExtraTokenFields};
    use tokio_stream::StreamExt;
    use wiremock::matchers::{header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    pub(crate) fn test_config(server: &MockServer) -> Config {
        Config {
            api_base_url: server.uri(),
            request_timeout_ms: 250,
            retry: RetryConfig {
                max_attempts: 3,
                initial_backoff_ms: 1,
                max_backoff_ms: 4,
            },
            ..Config::default()
        }
    }

    pub(crate) fn test_client(server: &MockServer) -> YouTubeClient {
        let token = BasicTokenResponse::new(
            AccessToken::new("test-token".to_string()),
            BasicTokenType::Bearer,
            EmptyExtraTokenFields {},
        );
        YouTubeClient::new(
            TimeBoundAccessToken::new(token),
            Arc::new(OAuthManager::new(&OAuthConfig::default())),
            &test_config(server),
        )
        .unwrap()
    }

    fn broadcast_json(id: &str, life_cycle: &str) -> serde_json::Value {
        serde_json::json!({
            "id": id,
            "snippet": { "title": format!("broadcast {id}") },
            "status": { "lifeCycleStatus": life_cycle }
        })
    }

    #[tokio::test]
    async fn transition_sends_status_and_bearer_token() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/liveBroadcasts/transition"))
            .and(query_param("id", "b1"))
            .and(query_param("broadcastStatus", "live"))
            .and(header("authorization", "Bearer test-token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(broadcast_json("b1", "live")))
            .expect(1)
            .mount(&server)
            .await;

        let broadcast = test_client(&server)
            .transition_live_broadcast("b1", BroadcastStatus::Live)
            .await
            .unwrap();
        assert_eq!(broadcast.id, "b1");
    }

    #[tokio::test]
    async fn error_envelope_becomes_remote_service_error_without_retry() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/liveBroadcasts/transition"))
            .respond_with(ResponseTemplate::new(403).set_body_json(serde_json::json!({
                "error": {
                    "code": 403,
                    "message": "Invalid transition",
                    "errors": [{ "reason": "invalidTransition" }]
                }
            })))
            .expect(1)
            .mount(&server)
            .await;

        let err = test_client(&server)
            .transition_live_broadcast("b1", BroadcastStatus::Complete)
            .await
            .unwrap_err();
        match err {
            Error::RemoteService { code, message } => {
                assert_eq!(code, 403);
                assert_eq!(message, "Invalid transition");
            }
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[tokio::test]
    async fn timeouts_are_retried_then_succeed() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/liveStreams"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(serde_json::json!({ "items": [] }))
                    .set_delay(Duration::from_secs(2)),
            )
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/liveStreams"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "items": [{ "id": "s1" }]
            })))
            .mount(&server)
            .await;

        let stream = test_client(&server).get_live_stream("s1").await.unwrap();
        assert_eq!(stream.unwrap().id, "s1");
    }

    #[tokio::test]
    async fn persistent_timeouts_surface_as_transient() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/liveStreams"))
            .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(2)))
            .expect(3)
            .mount(&server)
            .await;

        let err = test_client(&server).get_live_stream("s1").await.unwrap_err();
        assert!(err.is_transient(), "{err:?}");
    }

    #[tokio::test]
    async fn timed_out_insert_is_sent_once() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/liveBroadcasts"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(broadcast_json("b1", "created"))
                    .set_delay(Duration::from_secs(2)),
            )
            .expect(1)
            .mount(&server)
            .await;

        let request = LiveBroadcastInsertRequest {
            snippet: LiveBroadcastInsertSnippet {
                title: "My Show".to_string(),
                description: String::new(),
                scheduled_start_time: jiff::Timestamp::now(),
            },
            status: LiveBroadcastInsertStatus {
                privacy_status: PrivacyStatus::Public,
            },
            content_details: LiveBroadcastInsertContentDetails {
                monitor_stream: MonitorStreamInfo {
                    enable_monitor_stream: false,
                },
            },
        };
        let err = test_client(&server)
            .insert_live_broadcast(&request)
            .await
            .unwrap_err();
        assert!(err.is_transient(), "{err:?}");
    }

    #[tokio::test]
    async fn upcoming_listing_follows_page_tokens() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/liveBroadcasts"))
            .and(query_param("broadcastStatus", "upcoming"))
            .and(query_param("pageToken", "page-2"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "items": [broadcast_json("b3", "ready")]
            })))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/liveBroadcasts"))
            .and(query_param("broadcastStatus", "upcoming"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "items": [broadcast_json("b1", "created"), broadcast_json("b2", "ready")],
                "nextPageToken": "page-2"
            })))
            .expect(1)
            .mount(&server)
            .await;

        let client = test_client(&server);
        let ids: Vec<String> = client
            .list_upcoming_live_broadcasts()
            .map(|b| b.map(|b| b.id))
            .collect::<Result<_>>()
            .await
            .unwrap();
        assert_eq!(ids, ["b1", "b2", "b3"]);
    }

    #[tokio::test]
    async fn missing_stream_is_none() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/liveStreams"))
            .and(query_param("id", "gone"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "kind": "youtube#liveStreamListResponse",
                "items": []
            })))
            .mount(&server)
            .await;

        assert!(
            test_client(&server)
                .get_live_stream("gone")
                .await
                .unwrap()
                .is_none()
        );
    }

    #[tokio::test]
    async fn malformed_success_body_is_a_remote_service_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/liveBroadcasts/bind"))
            .respond_with(ResponseTemplate::new(200).set_body_string("not json"))
            .mount(&server)
            .await;

        let err = test_client(&server)
            .bind_live_broadcast("b1", "s1")
            .await
            .unwrap_err();
        assert!(matches!(err, Error::RemoteService { code: 200, .. }));
    }
}

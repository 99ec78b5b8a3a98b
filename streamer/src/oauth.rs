//! OAuth 2.0 for the broadcasting service.
//!
//! Installed-application flow with PKCE: the user authorizes in their browser, Google
//! redirects to a one-shot loopback server, and the code is exchanged for tokens. Stored
//! tokens are renewed through their refresh token.

use crate::config::OAuthConfig;
use eyre::Context;
use http_body_util::Full;
use hyper::body::Bytes;
use hyper::service::service_fn;
use hyper::{Request, Response, body};
use oauth2::basic::{BasicClient, BasicTokenResponse};
use oauth2::{
    AuthUrl, AuthorizationCode, ClientId, ClientSecret, CsrfToken, PkceCodeChallenge,
    RedirectUrl, RevocationUrl, Scope, TokenResponse, TokenUrl, reqwest,
};
use std::future::Future;

const AUTH_URL: &str = "https://accounts.google.com/o/oauth2/v2/auth";
const TOKEN_URL: &str = "https://www.googleapis.com/oauth2/v3/token";
const REVOCATION_URL: &str = "https://oauth2.googleapis.com/revoke";

/// Managing broadcasts and streams needs full (non-readonly) YouTube access.
const YOUTUBE_SCOPE: &str = "https://www.googleapis.com/auth/youtube";

const AUTHORIZED_HTML: &str = "<!doctype html><html><body>\
    <p>Authorization complete. You can close this window and return to watchme.</p>\
    </body></html>";

/// Runs authorization and refresh flows against Google's OAuth endpoints.
#[derive(Debug, Clone)]
pub struct OAuthManager {
    client_id: String,
    client_secret: String,
}

impl OAuthManager {
    pub fn new(config: &OAuthConfig) -> Self {
        Self {
            client_id: config.client_id.clone(),
            client_secret: config.client_secret.clone(),
        }
    }

    fn http_client() -> eyre::Result<reqwest::Client> {
        reqwest::ClientBuilder::new()
            // token endpoints never legitimately redirect
            .redirect(reqwest::redirect::Policy::none())
            .build()
            .context("build OAuth HTTP client")
    }

    /// Performs the full browser-based authorization and returns a fresh token.
    #[tracing::instrument(skip(self))]
    pub async fn authenticate(&self) -> eyre::Result<BasicTokenResponse> {
        if self.client_id.is_empty() {
            eyre::bail!("no OAuth client id configured (set WATCHME_CLIENT_ID)");
        }

        let csrf = CsrfToken::new_random();
        let (redirect_url, authorization_code) = self
            .listen_for_redirect(csrf.clone())
            .await
            .context("set up redirect endpoint")?;

        let client = BasicClient::new(ClientId::new(self.client_id.clone()))
            .set_client_secret(ClientSecret::new(self.client_secret.clone()))
            .set_auth_uri(AuthUrl::new(AUTH_URL.to_string()).context("parse auth url")?)
            .set_token_uri(TokenUrl::new(TOKEN_URL.to_string()).context("parse token url")?)
            .set_redirect_uri(redirect_url)
            .set_revocation_url(
                RevocationUrl::new(REVOCATION_URL.to_string()).context("parse revocation url")?,
            );

        let (pkce_challenge, pkce_verifier) = PkceCodeChallenge::new_random_sha256();
        let (auth_url, _) = client
            .authorize_url(move || csrf.clone())
            .add_scope(Scope::new(YOUTUBE_SCOPE.to_string()))
            .set_pkce_challenge(pkce_challenge)
            .url();

        tracing::info!(url = %auth_url, "waiting for user to authorize in browser");
        webbrowser::open(auth_url.as_ref()).context("open user's browser")?;
        let code = authorization_code
            .await
            .context("await authorization code")?;

        let token = client
            .exchange_code(code)
            .set_pkce_verifier(pkce_verifier)
            .request_async(&Self::http_client()?)
            .await
            .context("exchange authorization code for access token")?;

        Ok(token)
    }

    /// Exchanges the refresh token held by `token` for a new access token.
    ///
    /// Returns `Ok(None)` when there is no refresh token or Google rejects it as an invalid
    /// grant; the caller must then re-run [`Self::authenticate`].
    pub async fn refresh_token(
        &self,
        token: &BasicTokenResponse,
    ) -> eyre::Result<Option<BasicTokenResponse>> {
        let Some(refresh_token) = token.refresh_token() else {
            tracing::warn!("token has no refresh token");
            return Ok(None);
        };

        let client = BasicClient::new(ClientId::new(self.client_id.clone()))
            .set_client_secret(ClientSecret::new(self.client_secret.clone()))
            .set_token_uri(TokenUrl::new(TOKEN_URL.to_string()).context("parse token url")?);

        match client
            .exchange_refresh_token(refresh_token)
            .request_async(&Self::http_client()?)
            .await
        {
            Ok(new_token) => {
                tracing::debug!("refreshed OAuth token");
                Ok(Some(new_token))
            }
            Err(ref e @ oauth2::RequestTokenError::ServerResponse(ref response))
                if matches!(
                    response.error(),
                    oauth2::basic::BasicErrorResponseType::InvalidGrant
                ) =>
            {
                tracing::warn!(error = %e, "refresh token rejected as invalid grant");
                Ok(None)
            }
            Err(e) => Err(e).context("exchange refresh token"),
        }
    }

    /// Binds a loopback listener and returns its URL along with a future that resolves to
    /// the authorization code once Google redirects the browser to it.
    async fn listen_for_redirect(
        &self,
        csrf: CsrfToken,
    ) -> eyre::Result<(
        RedirectUrl,
        impl Future<Output = eyre::Result<AuthorizationCode>>,
    )> {
        let socket = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .context("bind to localhost")?;
        let addr = socket.local_addr().context("get local address")?;
        let url = RedirectUrl::new(format!("http://{}:{}", addr.ip(), addr.port()))
            .context("construct redirect url")?;

        let (tx, rx) = tokio::sync::oneshot::channel();
        tokio::spawn(async move {
            let result = async move {
                let (conn, _) = socket.accept().await.context("accept")?;
                let conn = hyper_util::rt::TokioIo::new(conn);
                let (got, mut gotten) = tokio::sync::mpsc::channel(1);
                let service = service_fn(move |req: Request<body::Incoming>| {
                    let csrf = csrf.clone();
                    let got = got.clone();
                    async move {
                        let query = req.uri().query().unwrap_or("");
                        let mut state = None;
                        let mut code = None;
                        for (k, v) in form_urlencoded::parse(query.as_bytes()) {
                            match &*k {
                                "state" => state = Some(v),
                                "code" => code = Some(v),
                                _ => {}
                            }
                        }
                        if state.as_deref() != Some(csrf.secret().as_str()) {
                            return Err("state does not match csrf token");
                        }
                        let Some(code) = code else {
                            return Err("redirect carried no authorization code");
                        };
                        if got
                            .send(AuthorizationCode::new(code.into_owned()))
                            .await
                            .is_err()
                        {
                            return Err("authorization code receiver went away");
                        }
                        Ok(Response::new(Full::<Bytes>::from(AUTHORIZED_HTML)))
                    }
                });
                let mut serve = std::pin::pin!(
                    hyper::server::conn::http1::Builder::new().serve_connection(conn, service)
                );

                tokio::select! {
                    exit = &mut serve => {
                        exit.context("redirect server got bad request")?;
                        eyre::bail!("redirect server exited before receiving a code");
                    }
                    code = gotten.recv() => {
                        serve.as_mut().graceful_shutdown();
                        code.ok_or_else(|| eyre::eyre!("redirect handler dropped without a code"))
                    }
                }
            };
            let _ = tx.send(result.await);
        });

        Ok((url, async move {
            rx.await.context("redirect listener dropped prematurely")?
        }))
    }
}

use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use reqwest::blocking::{Client as HttpClient, RequestBuilder};
use reqwest::header::{AUTHORIZATION, USER_AGENT};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use tracing::{debug, warn};
use url::Url;

use crate::error::FeedError;
use crate::types::{AuthorFeedParams, AuthorFeedResponse, GetPostsResponse, PostView};

pub const DEFAULT_SERVICE_URL: &str = "https://bsky.social/xrpc";
pub const PUBLIC_API_BASE: &str = "https://api.bsky.app/xrpc";
pub const DEFAULT_LABELER: &str = "did:plc:ar7c4by46qjdydhdevvrndac";
pub const LABELERS_HEADER: &str = "atproto-accept-labelers";
pub const MAX_POSTS_PER_REQUEST: usize = 25;

const GET_AUTHOR_FEED: &str = "app.bsky.feed.getAuthorFeed";
const GET_POSTS: &str = "app.bsky.feed.getPosts";

pub trait TokenProvider: Send + Sync {
    fn token(&self) -> Result<String>;
}

#[derive(Debug, Clone)]
pub struct StaticToken(pub String);

impl TokenProvider for StaticToken {
    fn token(&self) -> Result<String> {
        if self.0.trim().is_empty() {
            bail!(FeedError::MissingCredentials);
        }
        Ok(self.0.clone())
    }
}

pub trait AuthorFeedApi: Send + Sync {
    fn get_author_feed(&self, params: &AuthorFeedParams) -> Result<AuthorFeedResponse>;
}

#[derive(Debug, Clone, Default)]
pub struct ClientConfig {
    pub user_agent: String,
    pub base_url: Option<String>,
    pub labelers: Vec<String>,
    pub timeout: Option<Duration>,
    pub http_client: Option<HttpClient>,
}

impl ClientConfig {
    fn build_http(&self) -> Result<HttpClient> {
        match self.http_client.clone() {
            Some(client) => Ok(client),
            None => HttpClient::builder()
                .timeout(self.timeout.unwrap_or(Duration::from_secs(20)))
                .build()
                .context("xrpc: build http client"),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct XrpcErrorBody {
    #[serde(default)]
    error: String,
    #[serde(default)]
    message: String,
}

pub struct XrpcClient {
    token_provider: Arc<dyn TokenProvider>,
    http: HttpClient,
    user_agent: String,
    base_url: Url,
}

impl XrpcClient {
    pub fn new(token_provider: Arc<dyn TokenProvider>, config: ClientConfig) -> Result<Self> {
        if config.user_agent.trim().is_empty() {
            bail!("xrpc client user agent required");
        }
        let base = config
            .base_url
            .clone()
            .unwrap_or_else(|| DEFAULT_SERVICE_URL.to_string());
        Ok(XrpcClient {
            token_provider,
            http: config.build_http()?,
            user_agent: config.user_agent,
            base_url: xrpc_base(&base)?,
        })
    }

    fn get<T>(&self, method: &str, params: &[(String, String)]) -> Result<T>
    where
        T: DeserializeOwned,
    {
        let token = self.token_provider.token()?;
        let url = method_url(&self.base_url, method, params)?;
        let req = self
            .http
            .get(url)
            .header(USER_AGENT, self.user_agent.clone())
            .header(AUTHORIZATION, format!("Bearer {token}"));
        send_json(req, method)
    }
}

impl AuthorFeedApi for XrpcClient {
    fn get_author_feed(&self, params: &AuthorFeedParams) -> Result<AuthorFeedResponse> {
        self.get(GET_AUTHOR_FEED, &params.clone().into_params())
            .map_err(|err| match err.downcast_ref::<FeedError>() {
                Some(FeedError::Xrpc { error, .. }) if error == "BlockedByActor" => {
                    FeedError::BlockedByActor {
                        actor: params.actor.clone(),
                    }
                    .into()
                }
                _ => err,
            })
    }
}

pub struct PublicClient {
    http: HttpClient,
    user_agent: String,
    base_url: Url,
    labelers: Vec<String>,
}

impl PublicClient {
    pub fn new(config: ClientConfig) -> Result<Self> {
        if config.user_agent.trim().is_empty() {
            bail!("public client user agent required");
        }
        let base = config
            .base_url
            .clone()
            .unwrap_or_else(|| PUBLIC_API_BASE.to_string());
        Ok(PublicClient {
            http: config.build_http()?,
            user_agent: config.user_agent,
            base_url: xrpc_base(&base)?,
            labelers: config.labelers,
        })
    }

    pub fn labelers_header(&self) -> Option<String> {
        labelers_header(&self.labelers)
    }

    pub fn fetch_posts(&self, uris: &[String]) -> Option<Vec<PostView>> {
        let params: Vec<(String, String)> = uris
            .iter()
            .take(MAX_POSTS_PER_REQUEST)
            .map(|uri| ("uris".to_string(), uri.clone()))
            .collect();
        match self.get::<GetPostsResponse>(GET_POSTS, &params) {
            Ok(resp) => Some(resp.posts),
            Err(err) => {
                warn!(error = %err, "public getPosts failed");
                None
            }
        }
    }

    fn get<T>(&self, method: &str, params: &[(String, String)]) -> Result<T>
    where
        T: DeserializeOwned,
    {
        let url = method_url(&self.base_url, method, params)?;
        let mut req = self
            .http
            .get(url)
            .header(USER_AGENT, self.user_agent.clone());
        if let Some(value) = self.labelers_header() {
            req = req.header(LABELERS_HEADER, value);
        }
        send_json(req, method)
    }
}

impl AuthorFeedApi for PublicClient {
    fn get_author_feed(&self, params: &AuthorFeedParams) -> Result<AuthorFeedResponse> {
        self.get(GET_AUTHOR_FEED, &params.clone().into_params())
    }
}

/// Fallback fetch: every failure mode, and an empty feed, collapse to `None`.
pub fn fetch_or_none(api: &dyn AuthorFeedApi, params: &AuthorFeedParams) -> Option<AuthorFeedResponse> {
    match api.get_author_feed(params) {
        Ok(resp) if !resp.feed.is_empty() => Some(resp),
        Ok(_) => {
            debug!(actor = %params.actor, "fallback feed empty");
            None
        }
        Err(err) => {
            warn!(actor = %params.actor, error = %err, "fallback feed unavailable");
            None
        }
    }
}

pub fn labelers_header(labelers: &[String]) -> Option<String> {
    if labelers.is_empty() {
        return None;
    }
    Some(
        labelers
            .iter()
            .map(|labeler| format!("{labeler};redact"))
            .collect::<Vec<_>>()
            .join(", "),
    )
}

fn xrpc_base(raw: &str) -> Result<Url> {
    let mut base = raw.trim().to_string();
    if !base.ends_with('/') {
        base.push('/');
    }
    Url::parse(&base).with_context(|| format!("xrpc: parse base url {raw:?}"))
}

fn method_url(base: &Url, method: &str, params: &[(String, String)]) -> Result<Url> {
    let mut url = base.join(method)?;
    if !params.is_empty() {
        let mut pairs = url.query_pairs_mut();
        for (k, v) in params {
            pairs.append_pair(k, v);
        }
    }
    Ok(url)
}

fn send_json<T>(req: RequestBuilder, method: &str) -> Result<T>
where
    T: DeserializeOwned,
{
    let resp = req
        .send()
        .map_err(|err| FeedError::SourceUnavailable {
            reason: err.to_string(),
        })
        .with_context(|| format!("xrpc: request {method}"))?;
    let status = resp.status();
    if status.is_success() {
        return resp
            .json()
            .with_context(|| format!("xrpc: decode {method} response"));
    }
    let body: XrpcErrorBody = resp.json().unwrap_or_default();
    Err(FeedError::Xrpc {
        status: status.as_u16(),
        error: body.error,
        message: body.message,
    }
    .into())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::is_blocked_by_actor;
    use crate::types::AuthorFeedFilter;
    use std::thread;
    use tiny_http::{Header, Response, Server};

    struct Captured {
        url: String,
        headers: Vec<(String, String)>,
    }

    fn serve_once(status: u16, body: &'static str) -> (String, thread::JoinHandle<Captured>) {
        let server = Server::http("127.0.0.1:0").unwrap();
        let addr = server.server_addr().to_ip().unwrap();
        let handle = thread::spawn(move || {
            let request = server.recv().unwrap();
            let captured = Captured {
                url: request.url().to_string(),
                headers: request
                    .headers()
                    .iter()
                    .map(|h| (h.field.as_str().as_str().to_ascii_lowercase(), h.value.as_str().to_string()))
                    .collect(),
            };
            let response = Response::from_string(body)
                .with_status_code(status)
                .with_header(Header::from_bytes("Content-Type", "application/json").unwrap());
            request.respond(response).unwrap();
            captured
        });
        (format!("http://{addr}/xrpc"), handle)
    }

    fn config(base: String, labelers: Vec<String>) -> ClientConfig {
        ClientConfig {
            user_agent: "feedmux-test/0.1".into(),
            base_url: Some(base),
            labelers,
            timeout: Some(Duration::from_secs(5)),
            http_client: None,
        }
    }

    fn params() -> AuthorFeedParams {
        AuthorFeedParams {
            actor: "did:plc:alice".into(),
            limit: 15,
            cursor: Some("abc".into()),
            filter: Some(AuthorFeedFilter::PostsAndAuthorThreads),
            include_pins: true,
        }
    }

    #[test]
    fn public_client_sends_query_and_redaction_header() {
        let (base, handle) = serve_once(
            200,
            r#"{"feed":[{"post":{"uri":"at://did:plc:alice/app.bsky.feed.post/1","author":{"did":"did:plc:alice"},"indexedAt":"2024-05-01T10:00:00Z"}}],"cursor":"next"}"#,
        );
        let client = PublicClient::new(config(
            base,
            vec!["did:plc:one".into(), "did:plc:two".into()],
        ))
        .unwrap();
        let resp = client.get_author_feed(&params()).unwrap();
        assert_eq!(resp.feed.len(), 1);
        assert_eq!(resp.cursor.as_deref(), Some("next"));

        let captured = handle.join().unwrap();
        assert!(captured.url.starts_with("/xrpc/app.bsky.feed.getAuthorFeed?"));
        assert!(captured.url.contains("actor=did%3Aplc%3Aalice"));
        assert!(captured.url.contains("filter=posts_and_author_threads"));
        assert!(captured.url.contains("includePins=true"));
        assert!(captured.url.contains("cursor=abc"));
        let labelers = captured
            .headers
            .iter()
            .find(|(k, _)| k == LABELERS_HEADER)
            .map(|(_, v)| v.clone());
        assert_eq!(
            labelers.as_deref(),
            Some("did:plc:one;redact, did:plc:two;redact")
        );
    }

    #[test]
    fn fallback_collapses_failures_to_none() {
        let (base, handle) = serve_once(500, r#"{"error":"InternalServerError"}"#);
        let client = PublicClient::new(config(base, vec![])).unwrap();
        assert!(fetch_or_none(&client, &params()).is_none());
        handle.join().unwrap();

        let (base, handle) = serve_once(200, "not json");
        let client = PublicClient::new(config(base, vec![])).unwrap();
        assert!(fetch_or_none(&client, &params()).is_none());
        handle.join().unwrap();

        let (base, handle) = serve_once(200, r#"{"feed":[]}"#);
        let client = PublicClient::new(config(base, vec![])).unwrap();
        assert!(fetch_or_none(&client, &params()).is_none());
        handle.join().unwrap();
    }

    #[test]
    fn authenticated_client_maps_blocked_by_actor() {
        let (base, handle) = serve_once(
            400,
            r#"{"error":"BlockedByActor","message":"Requester is blocked by actor"}"#,
        );
        let client = XrpcClient::new(
            Arc::new(StaticToken("token-1".into())),
            config(base, vec![]),
        )
        .unwrap();
        let err = client.get_author_feed(&params()).unwrap_err();
        assert!(is_blocked_by_actor(&err));

        let captured = handle.join().unwrap();
        let auth = captured
            .headers
            .iter()
            .find(|(k, _)| k == "authorization")
            .map(|(_, v)| v.clone());
        assert_eq!(auth.as_deref(), Some("Bearer token-1"));
    }

    #[test]
    fn authenticated_client_keeps_other_errors() {
        let (base, handle) = serve_once(401, r#"{"error":"ExpiredToken","message":"expired"}"#);
        let client = XrpcClient::new(
            Arc::new(StaticToken("token-1".into())),
            config(base, vec![]),
        )
        .unwrap();
        let err = client.get_author_feed(&params()).unwrap_err();
        assert!(!is_blocked_by_actor(&err));
        match err.downcast_ref::<FeedError>() {
            Some(FeedError::Xrpc { status, error, .. }) => {
                assert_eq!(*status, 401);
                assert_eq!(error, "ExpiredToken");
            }
            other => panic!("unexpected error {other:?}"),
        }
        handle.join().unwrap();
    }

    #[test]
    fn unreachable_host_is_source_unavailable() {
        let addr = {
            let server = Server::http("127.0.0.1:0").unwrap();
            server.server_addr().to_ip().unwrap()
        };
        let client = PublicClient::new(config(format!("http://{addr}/xrpc"), vec![])).unwrap();
        let err = client.get_author_feed(&params()).unwrap_err();
        assert!(err
            .chain()
            .any(|cause| matches!(cause.downcast_ref::<FeedError>(), Some(FeedError::SourceUnavailable { .. }))));
        assert!(fetch_or_none(&client, &params()).is_none());
    }

    #[test]
    fn authenticated_transport_failure_keeps_request_context() {
        let addr = {
            let server = Server::http("127.0.0.1:0").unwrap();
            server.server_addr().to_ip().unwrap()
        };
        let client = XrpcClient::new(
            Arc::new(StaticToken("token-1".into())),
            config(format!("http://{addr}/xrpc"), vec![]),
        )
        .unwrap();
        let err = client.get_author_feed(&params()).unwrap_err();
        assert!(!is_blocked_by_actor(&err));
        assert_eq!(err.to_string(), format!("xrpc: request {GET_AUTHOR_FEED}"));
        assert!(matches!(
            err.downcast_ref::<FeedError>(),
            Some(FeedError::SourceUnavailable { .. })
        ));
    }

    #[test]
    fn fetch_posts_sends_each_uri() {
        let (base, handle) = serve_once(
            200,
            r#"{"posts":[{"uri":"at://did:plc:alice/app.bsky.feed.post/1","author":{"did":"did:plc:alice"},"indexedAt":"2024-05-01T10:00:00Z"}]}"#,
        );
        let client = PublicClient::new(config(base, vec![DEFAULT_LABELER.into()])).unwrap();
        let uris: Vec<String> = (0..30).map(|i| format!("at://did:plc:alice/app.bsky.feed.post/{i}")).collect();
        let posts = client.fetch_posts(&uris).unwrap();
        assert_eq!(posts.len(), 1);

        let captured = handle.join().unwrap();
        assert!(captured.url.starts_with("/xrpc/app.bsky.feed.getPosts?uris="));
        assert_eq!(captured.url.matches("uris=").count(), MAX_POSTS_PER_REQUEST);
    }

    #[test]
    fn missing_token_is_reported() {
        let err = StaticToken(" ".into()).token().unwrap_err();
        assert!(matches!(
            err.downcast_ref::<FeedError>(),
            Some(FeedError::MissingCredentials)
        ));
    }

    #[test]
    fn labelers_header_is_absent_without_labelers() {
        assert_eq!(labelers_header(&[]), None);
        assert_eq!(
            labelers_header(&["did:plc:x".to_string()]).as_deref(),
            Some("did:plc:x;redact")
        );
    }
}

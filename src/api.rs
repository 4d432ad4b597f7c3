use std::cell::RefCell;
use std::collections::BTreeMap;
use std::rc::Rc;
use std::time::Duration;

use anyhow::{bail, Result};
use async_trait::async_trait;
use reqwest::header::{HeaderMap, AUTHORIZATION, COOKIE, USER_AGENT};
use reqwest::Client as HttpClient;
use serde::Deserialize;
use url::Url;

use crate::credentials::Credentials;
use crate::rate_limit::RateLimiter;
use crate::registry::ItemId;

pub const DEFAULT_BASE_URL: &str = "https://api.twitter.com/";
pub const LIKERS_PATH: &str = "2/timeline/liked_by.json";
pub const RATE_LIMIT_ERROR_CODE: i64 = 88;

const CSRF_HEADER: &str = "x-csrf-token";
const RESET_HEADER: &str = "x-rate-limit-reset";
const LIMIT_HEADER: &str = "x-rate-limit-limit";
const REMAINING_HEADER: &str = "x-rate-limit-remaining";

#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    #[error("rate limit exceeded")]
    RateLimited,
    #[error("errors fetching likers: {0}")]
    Api(String),
    #[error("transport failure: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("malformed likers response: {0}")]
    Malformed(String),
    #[error("no csrf token in the session cookies")]
    MissingCsrf,
}

/// One authenticated likers request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LikersRequest {
    pub item_id: ItemId,
    pub bearer_token: String,
    pub csrf_token: String,
    pub cookie: Option<String>,
}

/// Rate limit headers of a response; absent or unparsable headers are `None`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RateHeaders {
    pub reset: Option<i64>,
    pub limit: Option<u64>,
    pub remaining: Option<u64>,
}

impl RateHeaders {
    pub fn from_headers(headers: &HeaderMap) -> Self {
        Self {
            reset: header_int(headers, RESET_HEADER),
            limit: header_int(headers, LIMIT_HEADER),
            remaining: header_int(headers, REMAINING_HEADER),
        }
    }
}

fn header_int<T: std::str::FromStr>(headers: &HeaderMap, key: &str) -> Option<T> {
    headers
        .get(key)
        .and_then(|value| value.to_str().ok())
        .and_then(|s| s.trim().parse::<T>().ok())
}

/// A response as it came off the wire. The status and rate headers are kept
/// even when reading the body failed.
#[derive(Debug)]
pub struct RawResponse {
    pub status: u16,
    pub rate: RateHeaders,
    pub body: Result<String, reqwest::Error>,
}

/// Sends likers requests. Implementations only move bytes; interpreting the
/// response is left to [`ApiClient`].
#[async_trait(?Send)]
pub trait Transport {
    async fn get_likers(&self, request: &LikersRequest) -> Result<RawResponse, FetchError>;
}

#[derive(Debug, Clone, Default)]
pub struct ClientConfig {
    pub user_agent: String,
    pub base_url: Option<String>,
    pub timeout: Option<Duration>,
    pub http_client: Option<HttpClient>,
}

pub struct HttpTransport {
    http: HttpClient,
    user_agent: String,
    likers_url: Url,
}

impl HttpTransport {
    pub fn new(config: ClientConfig) -> Result<Self> {
        if config.user_agent.trim().is_empty() {
            bail!("api client user agent required");
        }
        let base = config
            .base_url
            .unwrap_or_else(|| DEFAULT_BASE_URL.to_string());
        let likers_url = Url::parse(&base)?.join(LIKERS_PATH)?;
        let http = match config.http_client {
            Some(client) => client,
            None => HttpClient::builder()
                .timeout(config.timeout.unwrap_or(Duration::from_secs(20)))
                .build()?,
        };

        Ok(Self {
            http,
            user_agent: config.user_agent,
            likers_url,
        })
    }

    pub fn http(&self) -> &HttpClient {
        &self.http
    }

    pub fn likers_url(&self, id: &ItemId) -> Url {
        let mut url = self.likers_url.clone();
        url.query_pairs_mut().append_pair("tweet_id", id.as_str());
        url
    }
}

#[async_trait(?Send)]
impl Transport for HttpTransport {
    async fn get_likers(&self, request: &LikersRequest) -> Result<RawResponse, FetchError> {
        let mut req = self
            .http
            .get(self.likers_url(&request.item_id))
            .header(USER_AGENT, self.user_agent.clone())
            .header(AUTHORIZATION, format!("Bearer {}", request.bearer_token))
            .header(CSRF_HEADER, request.csrf_token.clone());
        if let Some(cookie) = &request.cookie {
            req = req.header(COOKIE, cookie.clone());
        }

        let resp = req.send().await?;
        let status = resp.status().as_u16();
        let rate = RateHeaders::from_headers(resp.headers());
        let body = resp.text().await;
        Ok(RawResponse { status, rate, body })
    }
}

#[derive(Debug, Deserialize)]
struct LikersEnvelope {
    #[serde(default)]
    errors: Option<Vec<ApiErrorEntry>>,
    #[serde(default, rename = "globalObjects")]
    global_objects: Option<GlobalObjects>,
}

#[derive(Debug, Deserialize)]
struct ApiErrorEntry {
    code: i64,
    #[serde(default)]
    message: String,
}

#[derive(Debug, Deserialize)]
struct GlobalObjects {
    #[serde(default)]
    users: Option<BTreeMap<String, UserEntry>>,
}

#[derive(Debug, Deserialize)]
struct UserEntry {
    screen_name: String,
}

/// Fetches the accounts that liked an item and keeps the rate limiter in
/// sync with every response.
pub struct ApiClient {
    transport: Rc<dyn Transport>,
    rate_limit_code: i64,
}

impl ApiClient {
    pub fn new(transport: Rc<dyn Transport>) -> Self {
        Self {
            transport,
            rate_limit_code: RATE_LIMIT_ERROR_CODE,
        }
    }

    pub fn with_rate_limit_code(mut self, code: i64) -> Self {
        self.rate_limit_code = code;
        self
    }

    /// Handles of the accounts on the first page of likers for `id`.
    pub async fn fetch_likers(
        &self,
        id: &ItemId,
        credentials: &Credentials,
        limiter: &RefCell<RateLimiter>,
    ) -> Result<Vec<String>, FetchError> {
        let csrf_token = credentials.csrf_token().ok_or(FetchError::MissingCsrf)?;
        let request = LikersRequest {
            item_id: id.clone(),
            bearer_token: credentials.bearer_token().to_string(),
            csrf_token,
            cookie: credentials.cookie_header(),
        };

        let response = self.transport.get_likers(&request).await?;

        {
            let mut limiter = limiter.borrow_mut();
            let previous = limiter.reset_window_end();
            if limiter.record_reset_window(response.rate.reset) {
                tracing::debug!(
                    reset = ?response.rate.reset,
                    previous = ?previous,
                    "updated rate limit reset time"
                );
            }
            limiter.record_quota(response.rate.limit, response.rate.remaining);
        }

        self.interpret(response, limiter)
    }

    fn interpret(
        &self,
        response: RawResponse,
        limiter: &RefCell<RateLimiter>,
    ) -> Result<Vec<String>, FetchError> {
        let body = response.body?;
        let envelope: LikersEnvelope = match serde_json::from_str(&body) {
            Ok(envelope) => envelope,
            Err(err) if !(200..300).contains(&response.status) => {
                return Err(FetchError::Api(format!(
                    "status {} with undecodable body: {}",
                    response.status, err
                )));
            }
            Err(err) => return Err(FetchError::Malformed(err.to_string())),
        };

        if let Some(errors) = envelope.errors {
            if errors.iter().any(|e| e.code == self.rate_limit_code) {
                if limiter.borrow_mut().activate() {
                    tracing::warn!("rate limit exceeded");
                }
                return Err(FetchError::RateLimited);
            }
            let joined = errors
                .iter()
                .map(|e| format!("{} - {}", e.code, e.message))
                .collect::<Vec<_>>()
                .join(", ");
            return Err(FetchError::Api(joined));
        }

        let users = envelope
            .global_objects
            .and_then(|objects| objects.users)
            .ok_or_else(|| FetchError::Malformed("missing globalObjects.users".into()))?;
        Ok(users.into_values().map(|user| user.screen_name).collect())
    }
}

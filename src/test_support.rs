use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::rc::Rc;
use std::time::Duration;

use async_trait::async_trait;
use url::Url;

use crate::api::{ApiClient, FetchError, LikersRequest, RateHeaders, RawResponse, Transport};
use crate::context::{Clock, Context, Flags};
use crate::credentials::{CookieJar, Credentials};
use crate::page::Page;
use crate::scanner::Scanner;

pub(crate) const PAGE_ONE_POST: &str = r#"<html><head></head><body>
    <article><a href="/alice">Alice</a><a href="/alice/status/42">2h</a></article>
</body></html>"#;

#[derive(Debug)]
pub(crate) struct ManualClock(Cell<i64>);

impl ManualClock {
    pub(crate) fn new(now: i64) -> Self {
        Self(Cell::new(now))
    }

    pub(crate) fn set(&self, now: i64) {
        self.0.set(now);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> i64 {
        self.0.get()
    }
}

#[derive(Debug, Clone)]
struct Canned {
    status: u16,
    rate: RateHeaders,
    body: String,
}

/// Canned likers responses keyed by item id.
#[derive(Default)]
pub(crate) struct FakeTransport {
    responses: RefCell<HashMap<String, Result<Canned, String>>>,
    requests: RefCell<Vec<LikersRequest>>,
}

impl FakeTransport {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn respond(&self, id: &str, response: RawResponse) {
        let canned = Canned {
            status: response.status,
            rate: response.rate,
            body: response.body.expect("canned responses carry a body"),
        };
        self.responses
            .borrow_mut()
            .insert(id.to_string(), Ok(canned));
    }

    pub(crate) fn fail(&self, id: &str, message: &str) {
        self.responses
            .borrow_mut()
            .insert(id.to_string(), Err(message.to_string()));
    }

    pub(crate) fn likers(handles: &[&str]) -> RawResponse {
        let users: serde_json::Map<String, serde_json::Value> = handles
            .iter()
            .enumerate()
            .map(|(idx, handle)| {
                (
                    (1_000 + idx).to_string(),
                    serde_json::json!({ "screen_name": handle }),
                )
            })
            .collect();
        RawResponse {
            status: 200,
            rate: RateHeaders::default(),
            body: Ok(serde_json::json!({ "globalObjects": { "users": users } }).to_string()),
        }
    }

    pub(crate) fn errors(errors: &[(i64, &str)]) -> RawResponse {
        let errors: Vec<_> = errors
            .iter()
            .map(|(code, message)| serde_json::json!({ "code": code, "message": message }))
            .collect();
        RawResponse {
            status: 429,
            rate: RateHeaders::default(),
            body: Ok(serde_json::json!({ "errors": errors }).to_string()),
        }
    }

    pub(crate) fn requests(&self) -> Vec<LikersRequest> {
        self.requests.borrow().clone()
    }

    pub(crate) fn calls(&self) -> usize {
        self.requests.borrow().len()
    }
}

#[async_trait(?Send)]
impl Transport for FakeTransport {
    async fn get_likers(&self, request: &LikersRequest) -> Result<RawResponse, FetchError> {
        self.requests.borrow_mut().push(request.clone());
        tokio::task::yield_now().await;
        match self.responses.borrow().get(request.item_id.as_str()) {
            Some(Ok(canned)) => Ok(RawResponse {
                status: canned.status,
                rate: canned.rate,
                body: Ok(canned.body.clone()),
            }),
            Some(Err(message)) => Err(FetchError::Api(message.clone())),
            None => Err(FetchError::Api(format!(
                "no canned response for {}",
                request.item_id
            ))),
        }
    }
}

impl RawResponse {
    pub(crate) fn with_rate(
        mut self,
        reset: Option<i64>,
        limit: Option<u64>,
        remaining: Option<u64>,
    ) -> Self {
        self.rate = RateHeaders {
            reset,
            limit,
            remaining,
        };
        self
    }
}

pub(crate) fn context(html: &str, transport: FakeTransport) -> (Rc<Context>, Rc<FakeTransport>) {
    context_with_clock(html, transport, Rc::new(ManualClock::new(1_000)))
}

pub(crate) fn context_with_clock(
    html: &str,
    transport: FakeTransport,
    clock: Rc<ManualClock>,
) -> (Rc<Context>, Rc<FakeTransport>) {
    context_with_retry(html, transport, clock, Duration::ZERO)
}

pub(crate) fn context_with_retry(
    html: &str,
    transport: FakeTransport,
    clock: Rc<ManualClock>,
    retry_delay: Duration,
) -> (Rc<Context>, Rc<FakeTransport>) {
    let transport = Rc::new(transport);
    let page = Page::parse(html, Url::parse("https://twitter.com/home").unwrap());
    let scanner = Scanner::new("twitter.com", "article").unwrap();
    let api = ApiClient::new(transport.clone());
    let credentials = Credentials::new("token", Rc::new(CookieJar::new("ct0=csrf")));
    let ctx = Context::new(page, scanner, api, credentials, Flags::default())
        .with_clock(clock)
        .with_retry_delay(retry_delay);
    (Rc::new(ctx), transport)
}

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::thread;

use crossbeam_channel::{unbounded, Receiver};
use tiny_http::{Header, Response, Server};
use url::Url;

/// What the fake API saw for one request.
#[derive(Debug, Clone)]
pub struct Captured {
    pub tweet_id: Option<String>,
    pub authorization: Option<String>,
    pub csrf: Option<String>,
    pub cookie: Option<String>,
}

#[derive(Debug, Clone)]
pub struct Canned {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: String,
}

impl Canned {
    pub fn likers(handles: &[&str]) -> Self {
        let users: serde_json::Map<String, serde_json::Value> = handles
            .iter()
            .enumerate()
            .map(|(idx, handle)| (idx.to_string(), serde_json::json!({ "screen_name": handle })))
            .collect();
        Self {
            status: 200,
            headers: Vec::new(),
            body: serde_json::json!({ "globalObjects": { "users": users } }).to_string(),
        }
    }

    pub fn errors(errors: &[(i64, &str)]) -> Self {
        let errors: Vec<_> = errors
            .iter()
            .map(|(code, message)| serde_json::json!({ "code": code, "message": message }))
            .collect();
        Self {
            status: 429,
            headers: Vec::new(),
            body: serde_json::json!({ "errors": errors }).to_string(),
        }
    }

    pub fn with_header(mut self, name: &str, value: impl ToString) -> Self {
        self.headers.push((name.to_string(), value.to_string()));
        self
    }
}

/// A likers endpoint served by `tiny_http` on a background thread.
pub struct FakeApi {
    pub base_url: String,
    responses: Arc<Mutex<HashMap<String, Canned>>>,
    requests: Receiver<Captured>,
}

impl FakeApi {
    pub fn start() -> Self {
        let server = Server::http("127.0.0.1:0").expect("bind fake api");
        let base_url = format!("http://{}/", server.server_addr());
        let responses: Arc<Mutex<HashMap<String, Canned>>> = Arc::default();
        let (tx, rx) = unbounded();

        let canned = Arc::clone(&responses);
        thread::spawn(move || {
            for request in server.incoming_requests() {
                let url = Url::parse(&format!("http://fake{}", request.url())).expect("request url");
                let tweet_id = url
                    .query_pairs()
                    .find(|(key, _)| key == "tweet_id")
                    .map(|(_, value)| value.into_owned());
                let header = |name: &'static str| {
                    request
                        .headers()
                        .iter()
                        .find(|h| h.field.equiv(name))
                        .map(|h| h.value.as_str().to_string())
                };
                let captured = Captured {
                    tweet_id: tweet_id.clone(),
                    authorization: header("Authorization"),
                    csrf: header("x-csrf-token"),
                    cookie: header("Cookie"),
                };
                let _ = tx.send(captured);

                let reply = tweet_id
                    .and_then(|id| canned.lock().unwrap().get(&id).cloned())
                    .unwrap_or_else(|| Canned::errors(&[(144, "No status found with that ID.")]));
                let mut response = Response::from_string(reply.body).with_status_code(reply.status);
                response.add_header(
                    Header::from_bytes(&b"Content-Type"[..], &b"application/json"[..]).unwrap(),
                );
                for (name, value) in reply.headers {
                    response.add_header(Header::from_bytes(name.as_bytes(), value.as_bytes()).unwrap());
                }
                let _ = request.respond(response);
            }
        });

        Self {
            base_url,
            responses,
            requests: rx,
        }
    }

    pub fn respond(&self, id: &str, canned: Canned) {
        self.responses.lock().unwrap().insert(id.to_string(), canned);
    }

    /// Requests received since the last call.
    pub fn take_requests(&self) -> Vec<Captured> {
        self.requests.try_iter().collect()
    }
}

pub const FEED: &str = r#"<!DOCTYPE html>
<html>
  <head><title>Home</title></head>
  <body>
    <main>
      <article><a href="/alice">Alice</a><a href="/alice/status/42">2h</a></article>
      <article><a href="/dave">Dave</a><a href="/dave/status/9">5m</a></article>
      <article><a href="/who">promoted</a></article>
    </main>
  </body>
</html>"#;

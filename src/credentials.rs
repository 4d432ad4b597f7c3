use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;

use once_cell::sync::Lazy;
use regex::Regex;

use crate::page::Page;

pub const CSRF_COOKIE: &str = "ct0";

static BEARER_TOKEN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#""(AAAA[a-zA-Z0-9%]*)"#).expect("valid bearer token pattern"));

/// Where the per-request CSRF token and session cookies come from. Both are
/// read again for every request.
pub trait CsrfSource {
    fn csrf_token(&self) -> Option<String>;
    fn cookie_header(&self) -> Option<String>;
}

/// The session's cookie string, as a browser exposes it to page scripts.
#[derive(Debug, Default)]
pub struct CookieJar {
    raw: RefCell<String>,
}

impl CookieJar {
    pub fn new(raw: impl Into<String>) -> Self {
        Self {
            raw: RefCell::new(raw.into()),
        }
    }

    /// Replaces the cookie string, e.g. after the session rotated its token.
    pub fn update(&self, raw: impl Into<String>) {
        *self.raw.borrow_mut() = raw.into();
    }

    pub fn get(&self, name: &str) -> Option<String> {
        parse_cookies(&self.raw.borrow()).remove(name)
    }
}

impl CsrfSource for CookieJar {
    fn csrf_token(&self) -> Option<String> {
        self.get(CSRF_COOKIE)
    }

    fn cookie_header(&self) -> Option<String> {
        let raw = self.raw.borrow();
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(trimmed.to_string())
        }
    }
}

/// Parses a `name=value; name2=value2` cookie string. Entries without a
/// value or with a single-character name are ignored.
pub fn parse_cookies(raw: &str) -> HashMap<String, String> {
    raw.split(';')
        .filter_map(|pair| {
            let mut parts = pair.split('=');
            let name = parts.next()?;
            let value = parts.next()?;
            if name.len() > 1 && !value.is_empty() {
                Some((name.trim().to_string(), value.to_string()))
            } else {
                None
            }
        })
        .collect()
}

#[derive(Clone)]
pub struct Credentials {
    bearer_token: String,
    csrf: Rc<dyn CsrfSource>,
}

impl Credentials {
    pub fn new(bearer_token: impl Into<String>, csrf: Rc<dyn CsrfSource>) -> Self {
        Self {
            bearer_token: bearer_token.into(),
            csrf,
        }
    }

    pub fn bearer_token(&self) -> &str {
        &self.bearer_token
    }

    pub fn csrf_token(&self) -> Option<String> {
        self.csrf.csrf_token()
    }

    pub fn cookie_header(&self) -> Option<String> {
        self.csrf.cookie_header()
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("bearer_token", &"<redacted>")
            .finish()
    }
}

#[derive(Debug, thiserror::Error)]
pub enum BootstrapError {
    #[error("client script link with prefix {0:?} not found on the page")]
    ScriptNotFound(String),
    #[error("fetch client script: {0}")]
    Fetch(#[from] reqwest::Error),
    #[error("bearer token not found in client script")]
    TokenNotFound,
}

/// Finds the href of the first `<link>` whose href starts with `prefix`.
pub fn find_client_script(page: &Page, prefix: &str) -> Option<String> {
    page.select("link")
        .into_iter()
        .filter_map(|link| link.attr("href"))
        .find(|href| href.starts_with(prefix))
}

/// Pulls the first bearer token literal out of a script body.
pub fn extract_bearer_token(script: &str) -> Option<String> {
    BEARER_TOKEN
        .captures(script)
        .map(|caps| caps[1].to_string())
}

/// Obtains the session's bearer token from the client script the page loads.
pub async fn bootstrap_bearer_token(
    page: &Page,
    http: &reqwest::Client,
    script_prefix: &str,
) -> Result<String, BootstrapError> {
    tracing::debug!("obtaining bearer token");
    let script_url = find_client_script(page, script_prefix)
        .ok_or_else(|| BootstrapError::ScriptNotFound(script_prefix.to_string()))?;
    let script = http
        .get(&script_url)
        .send()
        .await?
        .error_for_status()?
        .text()
        .await?;
    let token = extract_bearer_token(&script).ok_or(BootstrapError::TokenNotFound)?;
    tracing::info!(script = %script_url, "bearer token obtained");
    Ok(token)
}

#[cfg(test)]
mod tests {
    use super::*;
    use url::Url;

    #[test]
    fn parses_cookie_strings() {
        let cookies = parse_cookies("x=1; ct0=abc123; lang=en; empty=; guest_id=v1%3A99");
        assert_eq!(cookies.get("ct0").map(String::as_str), Some("abc123"));
        assert_eq!(cookies.get("lang").map(String::as_str), Some("en"));
        assert_eq!(cookies.get("guest_id").map(String::as_str), Some("v1%3A99"));
        assert!(!cookies.contains_key("x"));
        assert!(!cookies.contains_key("empty"));
    }

    #[test]
    fn csrf_token_is_read_fresh() {
        let jar = CookieJar::new("ct0=first");
        assert_eq!(jar.csrf_token().as_deref(), Some("first"));
        jar.update("ct0=second; lang=en");
        assert_eq!(jar.csrf_token().as_deref(), Some("second"));
        assert_eq!(jar.cookie_header().as_deref(), Some("ct0=second; lang=en"));
    }

    #[test]
    fn empty_jar_has_no_cookie_header() {
        let jar = CookieJar::default();
        assert_eq!(jar.cookie_header(), None);
        assert_eq!(jar.csrf_token(), None);
    }

    #[test]
    fn finds_client_script_link() {
        let page = Page::parse(
            r#"<html><head>
                 <link rel="preload" href="https://abs.twimg.com/responsive-web/client-web/vendor.1.js">
                 <link rel="preload" href="https://abs.twimg.com/responsive-web/client-web/main.abc.js">
               </head><body></body></html>"#,
            Url::parse("https://twitter.com/home").unwrap(),
        );
        assert_eq!(
            find_client_script(&page, "https://abs.twimg.com/responsive-web/client-web/main.")
                .as_deref(),
            Some("https://abs.twimg.com/responsive-web/client-web/main.abc.js")
        );
        assert_eq!(find_client_script(&page, "https://cdn.example/"), None);
    }

    #[test]
    fn extracts_bearer_token_literal() {
        let script = r#"var a="x",s="AAAAAAAAAAAAAAAAAAAAANRILgAAAAAAnNwIzUejRCOuH5E6I8xnZz4puTs%3D1Zv7ttfk",t=1;"#;
        assert_eq!(
            extract_bearer_token(script).as_deref(),
            Some("AAAAAAAAAAAAAAAAAAAAANRILgAAAAAAnNwIzUejRCOuH5E6I8xnZz4puTs%3D1Zv7ttfk")
        );
        assert_eq!(extract_bearer_token("no token here"), None);
    }

    #[test]
    fn credentials_debug_hides_token() {
        let creds = Credentials::new("secret", Rc::new(CookieJar::default()));
        assert!(!format!("{creds:?}").contains("secret"));
        assert_eq!(creds.bearer_token(), "secret");
    }
}

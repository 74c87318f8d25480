//! Shared HTTP client and response-shape heuristics.

use std::env;
use std::time::Duration;

use anyhow::{Context, Result};
use reqwest::StatusCode;

/// Browsers get served where scrapers get blocked.
const USER_AGENT: &str = "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 \
                          (KHTML, like Gecko) Chrome/85.0.4183.102 Safari/537.36";

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

pub struct Fetched {
    pub status: StatusCode,
    pub body: Vec<u8>,
}

impl Fetched {
    pub fn ok(&self) -> bool {
        self.status == StatusCode::OK
    }

    pub fn ratelimited(&self) -> bool {
        self.status == StatusCode::TOO_MANY_REQUESTS
    }
}

/// Blocking HTTP client shared by every worker of a clone.
pub struct Fetcher {
    client: reqwest::blocking::Client,
}

impl Fetcher {
    /// The per-host pool is sized above the worker count so workers never
    /// queue on connections. Exposed servers routinely present broken TLS,
    /// so certificate verification is off.
    pub fn new(max_concurrency: usize) -> Result<Self> {
        let mut builder = reqwest::blocking::Client::builder()
            .user_agent(USER_AGENT)
            .danger_accept_invalid_certs(true)
            .redirect(reqwest::redirect::Policy::none())
            .pool_max_idle_per_host(max_concurrency + 250)
            .timeout(REQUEST_TIMEOUT)
            .connect_timeout(CONNECT_TIMEOUT);

        if let Some(proxy) = proxy_from_env()? {
            builder = builder.proxy(proxy);
        }

        Ok(Self {
            client: builder.build().context("build http client")?,
        })
    }

    pub fn get(&self, uri: &str) -> Result<Fetched> {
        let resp = self
            .client
            .get(uri)
            .send()
            .with_context(|| format!("GET {}", uri))?;
        let status = resp.status();
        let body = resp
            .bytes()
            .with_context(|| format!("read body of {}", uri))?
            .to_vec();
        Ok(Fetched { status, body })
    }
}

/// First of `all_proxy`, `http_proxy`, `https_proxy` wins. A `socks5://`
/// scheme selects a SOCKS5 dialer, anything else an HTTP proxy dialer.
pub fn proxy_from_env() -> Result<Option<reqwest::Proxy>> {
    for key in ["all_proxy", "http_proxy", "https_proxy"] {
        if let Ok(uri) = env::var(key) {
            let proxy = reqwest::Proxy::all(&uri)
                .with_context(|| format!("parse proxy uri in ${}", key))?;
            return Ok(Some(proxy));
        }
    }
    Ok(None)
}

/// Join a base URL and a slash-separated relative path.
pub fn join_url(base: &str, path: &str) -> String {
    format!("{}/{}", base.trim_end_matches('/'), path.trim_start_matches('/'))
}

/// Heuristic: does this body look like an HTML page rather than raw data?
/// False positives on tiny binaries are acceptable; those objects get
/// another chance in the recovery pass.
pub fn is_html(body: &[u8]) -> bool {
    let head = String::from_utf8_lossy(&body[..body.len().min(512)]).to_lowercase();
    head.contains("<html") || head.contains("<!doctype") || head.contains("<head") || head.contains("<body")
}

pub fn is_empty_body(body: &[u8]) -> bool {
    body.iter().all(|b| b.is_ascii_whitespace())
}

/// A relative path we are willing to mirror under the target directory.
/// Anything that could escape it is dropped.
pub fn is_safe_relative(path: &str) -> bool {
    !path.is_empty()
        && !path.starts_with('/')
        && !path.contains('\\')
        && !path.split('/').any(|seg| seg == "..")
}

/// Extract child links from an autoindex HTML listing.
///
/// `base_path` is the absolute request path of the listing (for servers
/// that emit absolute hrefs). Parent traversals, off-site links and query
/// links are filtered out; subdirectory names keep their trailing slash.
pub fn extract_links(html: &[u8], base_path: &str) -> Vec<String> {
    let text = String::from_utf8_lossy(html);
    let mut out = Vec::new();
    for cap in crate::gitdir::HREF_RE.captures_iter(&text) {
        let mut href = cap[1].to_string();
        if href.contains("://") || href.starts_with('?') || href.starts_with('#') {
            continue;
        }
        if href.starts_with('/') {
            // Absolute href: keep only children of the listing itself.
            match href.strip_prefix(base_path) {
                Some(child) => href = child.trim_start_matches('/').to_string(),
                None => continue,
            }
        }
        if href.is_empty() || !is_safe_relative(href.trim_end_matches('/')) {
            continue;
        }
        out.push(href);
    }
    out
}

//! Request adapter.
//!
//! # Responsibilities
//! - Present the host request through the blocking contract's accessors
//! - Decompose the path into context path, servlet path and path info
//! - Decode query and form parameters (query wins on conflicts)
//! - Hold request attributes and the async continuation slot
//!
//! # Design Decisions
//! - Form bodies are decoded eagerly at construction; the raw body is then empty
//! - Attributes live in a `DashMap` because async work may touch them from other threads
//! - Host-provided attributes (axum extensions) seed the attribute store

use std::any::Any;
use std::io::{self, Read};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use axum::{
    extract::ConnectInfo,
    http::{header, request::Parts, HeaderMap, Method, Uri},
};
use bytes::Bytes;
use dashmap::DashMap;

use crate::context::registration::RegisteredHandler;
use crate::context::BridgeContext;
use crate::error::HandlerError;
use crate::http::async_context::{
    AsyncContinuation, WeakContinuation, ASYNC_CONTEXT_PATH, ASYNC_PATH_INFO, ASYNC_QUERY_STRING,
    ASYNC_REQUEST_URI, ASYNC_SERVLET_PATH,
};
use crate::http::response::{charset_of, Cookie, ResponseAdapter};
use crate::observability::metrics;
use crate::routing::{MatchResult, DEFAULT_MAPPING};

/// Header carrying the request id assigned by the host stack.
pub const X_REQUEST_ID: &str = "x-request-id";

/// A request attribute value.
pub type Attribute = Arc<dyn Any + Send + Sync>;

/// Attributes attached by the host (e.g. an upstream axum layer) before the bridge runs.
///
/// Insert into the request extensions; the request adapter copies them into its own store.
#[derive(Clone, Default)]
pub struct HostAttributes {
    entries: Vec<(String, Attribute)>,
}

impl HostAttributes {
    pub fn insert(&mut self, name: impl Into<String>, value: impl Any + Send + Sync) {
        self.entries.push((name.into(), Arc::new(value)));
    }
}

struct RequestInner {
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    secure: bool,
    remote_addr: Option<SocketAddr>,
    context: Arc<BridgeContext>,
    handler: Arc<RegisteredHandler>,
    servlet_path: String,
    facing_servlet_path: String,
    character_encoding: Mutex<Option<String>>,
    query_parameters: Vec<(String, String)>,
    form_parameters: Vec<(String, String)>,
    body: Mutex<io::Cursor<Bytes>>,
    attributes: DashMap<String, Attribute>,
    response: ResponseAdapter,
    async_started: AtomicBool,
    async_context: Mutex<Option<WeakContinuation>>,
}

/// One request as seen by handlers. Cheap to clone; clones share state.
#[derive(Clone)]
pub struct RequestAdapter {
    inner: Arc<RequestInner>,
}

impl RequestAdapter {
    pub(crate) fn new(
        parts: &Parts,
        body: Bytes,
        matched: &MatchResult,
        context: Arc<BridgeContext>,
        response: ResponseAdapter,
    ) -> Self {
        let query_parameters = parts
            .uri
            .query()
            .map(|q| decode_pairs(q.as_bytes()))
            .unwrap_or_default();

        let (form_parameters, body) = if carries_form(&parts.method, &parts.headers) {
            (decode_pairs(&body), Bytes::new())
        } else {
            (Vec::new(), body)
        };

        let attributes = DashMap::new();
        if let Some(host) = parts.extensions.get::<HostAttributes>() {
            for (name, value) in &host.entries {
                attributes.insert(name.clone(), value.clone());
            }
        }

        let servlet_path = matched.servlet_path.clone();
        let facing_servlet_path = servlet_path
            .strip_suffix('/')
            .unwrap_or(&servlet_path)
            .to_string();

        Self {
            inner: Arc::new(RequestInner {
                method: parts.method.clone(),
                uri: parts.uri.clone(),
                headers: parts.headers.clone(),
                secure: is_secure(parts),
                remote_addr: parts
                    .extensions
                    .get::<ConnectInfo<SocketAddr>>()
                    .map(|ConnectInfo(addr)| *addr),
                context,
                handler: matched.handler.clone(),
                servlet_path,
                facing_servlet_path,
                character_encoding: Mutex::new(None),
                query_parameters,
                form_parameters,
                body: Mutex::new(io::Cursor::new(body)),
                attributes,
                response,
                async_started: AtomicBool::new(false),
                async_context: Mutex::new(None),
            }),
        }
    }

    pub fn method(&self) -> &Method {
        &self.inner.method
    }

    /// Path part of the URI, without the query string.
    pub fn request_uri(&self) -> String {
        self.inner.uri.path().to_string()
    }

    pub fn query_string(&self) -> Option<&str> {
        self.inner.uri.query()
    }

    /// `scheme://server[:port]/path`, omitting the default ports.
    pub fn request_url(&self) -> String {
        let mut url = format!("{}://{}", self.scheme(), self.server_name());
        let port = self.server_port();
        if port != 80 && port != 443 {
            url.push_str(&format!(":{}", port));
        }
        url.push_str(self.inner.uri.path());
        url
    }

    pub fn context_path(&self) -> &str {
        self.inner.context.context_path()
    }

    /// Matched base path with one trailing `/` dropped.
    pub fn servlet_path(&self) -> &str {
        &self.inner.facing_servlet_path
    }

    /// Remainder of the path after context and servlet path.
    ///
    /// `None` for the default mapping, or when the path does not start with the servlet path.
    pub fn path_info(&self) -> Option<String> {
        let servlet_path = &self.inner.servlet_path;
        if servlet_path == DEFAULT_MAPPING {
            return None;
        }
        let path = self.inner.uri.path();
        let relative = path.get(self.context_path().len()..)?;
        if !relative.starts_with(servlet_path.as_str()) {
            return None;
        }
        let skip = if servlet_path.ends_with('/') {
            servlet_path.len() - 1
        } else {
            servlet_path.len()
        };
        Some(relative[skip..].to_string())
    }

    /// First value of a header.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.inner.headers.get(name).and_then(|v| v.to_str().ok())
    }

    pub fn headers(&self, name: &str) -> Vec<&str> {
        self.inner
            .headers
            .get_all(name)
            .iter()
            .filter_map(|v| v.to_str().ok())
            .collect()
    }

    pub fn header_names(&self) -> Vec<&str> {
        self.inner.headers.keys().map(|k| k.as_str()).collect()
    }

    pub fn header_map(&self) -> &HeaderMap {
        &self.inner.headers
    }

    /// Header parsed as an integer; `Ok(None)` when absent.
    pub fn int_header(&self, name: &str) -> Result<Option<i64>, HandlerError> {
        self.header(name)
            .map(|v| {
                v.trim().parse::<i64>().map_err(|_| {
                    HandlerError::processing(format!("header {} is not an integer: {}", name, v))
                })
            })
            .transpose()
    }

    pub fn request_id(&self) -> Option<&str> {
        self.header(X_REQUEST_ID)
    }

    pub fn cookies(&self) -> Vec<Cookie> {
        self.headers(header::COOKIE.as_str())
            .into_iter()
            .flat_map(|line| line.split(';'))
            .filter_map(|pair| {
                let (name, value) = pair.split_once('=')?;
                let name = name.trim();
                (!name.is_empty()).then(|| Cookie::new(name, value.trim()))
            })
            .collect()
    }

    pub fn content_type(&self) -> Option<&str> {
        self.header(header::CONTENT_TYPE.as_str())
    }

    pub fn content_length(&self) -> Option<u64> {
        self.header(header::CONTENT_LENGTH.as_str())
            .and_then(|v| v.trim().parse().ok())
    }

    /// Explicit encoding, else the `Content-Type` charset, else the context default.
    pub fn character_encoding(&self) -> String {
        if let Some(explicit) = self
            .inner
            .character_encoding
            .lock()
            .expect("request mutex poisoned")
            .clone()
        {
            return explicit;
        }
        self.content_type()
            .and_then(charset_of)
            .unwrap_or_else(|| self.inner.context.request_encoding().to_string())
    }

    pub fn set_character_encoding(&self, encoding: impl Into<String>) {
        *self
            .inner
            .character_encoding
            .lock()
            .expect("request mutex poisoned") = Some(encoding.into());
    }

    /// `io::Read` over the unread part of the body.
    pub fn input(&self) -> RequestInput {
        RequestInput {
            request: self.clone(),
        }
    }

    /// Read the rest of the body as text using the request character encoding.
    pub fn read_text(&self) -> Result<String, HandlerError> {
        let mut raw = Vec::new();
        self.input().read_to_end(&mut raw)?;
        let encoding = self.character_encoding().to_ascii_lowercase();
        Ok(match encoding.as_str() {
            "iso-8859-1" | "latin1" | "iso8859-1" => raw.iter().map(|&b| b as char).collect(),
            _ => String::from_utf8_lossy(&raw).into_owned(),
        })
    }

    /// Query value first, then form value.
    pub fn parameter(&self, name: &str) -> Option<&str> {
        self.inner
            .query_parameters
            .iter()
            .chain(self.inner.form_parameters.iter())
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }

    pub fn parameter_values(&self, name: &str) -> Vec<&str> {
        self.inner
            .query_parameters
            .iter()
            .chain(self.inner.form_parameters.iter())
            .filter(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
            .collect()
    }

    pub fn parameter_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = Vec::new();
        for (k, _) in self
            .inner
            .query_parameters
            .iter()
            .chain(self.inner.form_parameters.iter())
        {
            if !names.contains(&k.as_str()) {
                names.push(k);
            }
        }
        names
    }

    pub fn attribute(&self, name: &str) -> Option<Attribute> {
        self.inner.attributes.get(name).map(|v| v.value().clone())
    }

    /// Typed attribute lookup.
    pub fn attribute_as<T: Clone + Send + Sync + 'static>(&self, name: &str) -> Option<T> {
        self.inner
            .attributes
            .get(name)
            .and_then(|v| v.value().downcast_ref::<T>().cloned())
    }

    pub fn set_attribute(&self, name: impl Into<String>, value: impl Any + Send + Sync) {
        self.inner.attributes.insert(name.into(), Arc::new(value));
    }

    pub fn remove_attribute(&self, name: &str) -> Option<Attribute> {
        self.inner.attributes.remove(name).map(|(_, v)| v)
    }

    pub fn attribute_names(&self) -> Vec<String> {
        self.inner.attributes.iter().map(|e| e.key().clone()).collect()
    }

    pub fn scheme(&self) -> &'static str {
        if self.inner.secure {
            "https"
        } else {
            "http"
        }
    }

    pub fn is_secure(&self) -> bool {
        self.inner.secure
    }

    fn host(&self) -> &str {
        self.header(header::HOST.as_str())
            .or_else(|| self.inner.uri.authority().map(|a| a.as_str()))
            .unwrap_or("localhost")
    }

    pub fn server_name(&self) -> &str {
        let host = self.host();
        host.split_once(':').map(|(name, _)| name).unwrap_or(host)
    }

    pub fn server_port(&self) -> u16 {
        self.host()
            .split_once(':')
            .and_then(|(_, port)| port.parse().ok())
            .unwrap_or(if self.inner.secure { 443 } else { 80 })
    }

    pub fn remote_addr(&self) -> Option<SocketAddr> {
        self.inner.remote_addr
    }

    /// Languages from `Accept-Language`, best first.
    pub fn locales(&self) -> Vec<String> {
        let mut weighted: Vec<(String, f32)> = self
            .headers(header::ACCEPT_LANGUAGE.as_str())
            .into_iter()
            .flat_map(|line| line.split(','))
            .filter_map(|entry| {
                let mut parts = entry.split(';');
                let tag = parts.next()?.trim();
                if tag.is_empty() {
                    return None;
                }
                let quality = parts
                    .find_map(|p| p.trim().strip_prefix("q="))
                    .and_then(|q| q.parse::<f32>().ok())
                    .unwrap_or(1.0);
                (quality > 0.0).then(|| (tag.to_string(), quality))
            })
            .collect();
        weighted.sort_by(|a, b| b.1.total_cmp(&a.1));
        weighted.into_iter().map(|(tag, _)| tag).collect()
    }

    pub fn locale(&self) -> Option<String> {
        self.locales().into_iter().next()
    }

    pub fn context(&self) -> &Arc<BridgeContext> {
        &self.inner.context
    }

    /// Name of the handler this request was matched to.
    pub fn handler_name(&self) -> &str {
        self.inner.handler.name()
    }

    /// The root response paired with this request.
    pub fn response(&self) -> &ResponseAdapter {
        &self.inner.response
    }

    /// Suspend the request with its own request/response pair.
    ///
    /// Calling it again while suspended reuses the same continuation and fires
    /// `on_start_async` to the listeners registered since.
    pub fn start_async(&self) -> AsyncContinuation {
        self.start_async_with(self.clone(), self.inner.response.clone())
    }

    /// Suspend the request, handing listeners and dispatches an alternate pair.
    pub fn start_async_with(&self, request: RequestAdapter, response: ResponseAdapter) -> AsyncContinuation {
        self.inner.async_started.store(true, Ordering::Release);
        let original =
            Arc::ptr_eq(&request.inner, &self.inner) && response.same_as(&self.inner.response);

        let (continuation, reused) = {
            let mut slot = self
                .inner
                .async_context
                .lock()
                .expect("async slot mutex poisoned");
            match slot.as_ref().and_then(WeakContinuation::upgrade) {
                Some(existing) if original => (existing, true),
                _ => {
                    let created = AsyncContinuation::new(
                        request,
                        response,
                        self.clone(),
                        self.inner.response.clone(),
                        original,
                        self.inner.handler.clone(),
                    );
                    *slot = Some(created.downgrade());
                    (created, false)
                }
            }
        };
        if reused {
            continuation.restart();
        } else {
            metrics::record_async_started(self.handler_name());
        }
        tracing::debug!(handler = %self.handler_name(), reused, "Async started");
        continuation.fire_start_async();
        continuation
    }

    pub fn is_async_started(&self) -> bool {
        self.inner.async_started.load(Ordering::Acquire)
    }

    /// Live continuation, until it completes or its last handle is dropped.
    pub fn async_context(&self) -> Option<AsyncContinuation> {
        self.inner
            .async_context
            .lock()
            .expect("async slot mutex poisoned")
            .as_ref()
            .and_then(WeakContinuation::upgrade)
    }

    pub(crate) fn clear_async_context(&self) {
        self.inner
            .async_context
            .lock()
            .expect("async slot mutex poisoned")
            .take();
    }

    /// Record the pre-dispatch metadata once per request.
    pub(crate) fn stash_dispatch_attributes(&self) {
        if self.inner.attributes.contains_key(ASYNC_REQUEST_URI) {
            return;
        }
        self.set_attribute(ASYNC_REQUEST_URI, self.request_uri());
        self.set_attribute(ASYNC_CONTEXT_PATH, self.context_path().to_string());
        self.set_attribute(ASYNC_SERVLET_PATH, self.servlet_path().to_string());
        if let Some(path_info) = self.path_info() {
            self.set_attribute(ASYNC_PATH_INFO, path_info);
        }
        self.set_attribute(
            ASYNC_QUERY_STRING,
            self.query_string().unwrap_or_default().to_string(),
        );
    }
}

impl std::fmt::Debug for RequestAdapter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RequestAdapter")
            .field("method", &self.inner.method)
            .field("uri", &self.inner.uri)
            .field("handler", &self.inner.handler.name())
            .finish()
    }
}

/// `io::Read` over a request body. Reads consume the shared cursor.
pub struct RequestInput {
    request: RequestAdapter,
}

impl Read for RequestInput {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.request
            .inner
            .body
            .lock()
            .expect("request body mutex poisoned")
            .read(buf)
    }
}

/// Absolute URL of a host request, used to resolve relative redirects.
pub(crate) fn absolute_url(parts: &Parts) -> String {
    let scheme = if is_secure(parts) { "https" } else { "http" };
    let host = parts
        .headers
        .get(header::HOST)
        .and_then(|v| v.to_str().ok())
        .or_else(|| parts.uri.authority().map(|a| a.as_str()))
        .unwrap_or("localhost");
    let path_and_query = parts
        .uri
        .path_and_query()
        .map(|pq| pq.as_str())
        .unwrap_or("/");
    format!("{}://{}{}", scheme, host, path_and_query)
}

fn is_secure(parts: &Parts) -> bool {
    parts.uri.scheme_str() == Some("https")
        || parts
            .headers
            .get("x-forwarded-proto")
            .and_then(|v| v.to_str().ok())
            .is_some_and(|proto| proto.eq_ignore_ascii_case("https"))
}

fn carries_form(method: &Method, headers: &HeaderMap) -> bool {
    if [Method::GET, Method::DELETE, Method::HEAD, Method::OPTIONS].contains(method) {
        return false;
    }
    headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|ct| ct.contains("application/x-www-form-urlencoded"))
}

fn decode_pairs(raw: &[u8]) -> Vec<(String, String)> {
    url::form_urlencoded::parse(raw).into_owned().collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::test_support::{request, TestBench};

    #[tokio::test]
    async fn test_query_wins_over_form() {
        let bench = TestBench::new("", &[("form", "/form")]);
        let req = bench.request(
            axum::http::Request::post("/form?name=foo")
                .header("content-type", "application/x-www-form-urlencoded")
                .body(())
                .unwrap(),
            "name=bar&other=baz",
        );
        assert_eq!(req.parameter("name"), Some("foo"));
        assert_eq!(req.parameter_values("name"), vec!["foo", "bar"]);
        assert_eq!(req.parameter("other"), Some("baz"));
        assert_eq!(req.parameter_names(), vec!["name", "other"]);
        // the form body was consumed
        assert_eq!(req.read_text().unwrap(), "");
    }

    #[tokio::test]
    async fn test_get_body_is_not_parsed() {
        let bench = TestBench::new("", &[("form", "/form")]);
        let req = bench.request(
            axum::http::Request::get("/form")
                .header("content-type", "application/x-www-form-urlencoded")
                .body(())
                .unwrap(),
            "name=bar",
        );
        assert_eq!(req.parameter("name"), None);
        assert_eq!(req.read_text().unwrap(), "name=bar");
    }

    #[tokio::test]
    async fn test_path_decomposition() {
        let bench = TestBench::new(
            "/app",
            &[("star", "/star/*"), ("exact", "/request"), ("json", "*.json"), ("default", "/")],
        );

        let star = request(&bench, "/app/star/async/test");
        assert_eq!(star.context_path(), "/app");
        assert_eq!(star.servlet_path(), "/star");
        assert_eq!(star.path_info().as_deref(), Some("/async/test"));

        let exact = request(&bench, "/app/request");
        assert_eq!(exact.servlet_path(), "/request");
        assert_eq!(exact.path_info().as_deref(), Some(""));

        let json = request(&bench, "/app/x/y.json");
        assert_eq!(json.servlet_path(), "/x/y.json");
        assert_eq!(json.path_info().as_deref(), Some(""));

        let default = request(&bench, "/app/anything");
        assert_eq!(default.servlet_path(), "");
        assert_eq!(default.path_info(), None);
    }

    #[tokio::test]
    async fn test_headers_and_url() {
        let bench = TestBench::new("", &[("h", "/h")]);
        let req = bench.request(
            axum::http::Request::get("/h?x=1")
                .header("host", "example.com:8080")
                .header("x-count", "42")
                .header("x-multi", "a")
                .header("x-multi", "b")
                .header("cookie", "a=1; b=2")
                .header("accept-language", "fr;q=0.5, en-US, de;q=0")
                .header("content-type", "text/plain; charset=UTF-8")
                .body(())
                .unwrap(),
            "",
        );
        assert_eq!(req.request_url(), "http://example.com:8080/h");
        assert_eq!(req.server_name(), "example.com");
        assert_eq!(req.server_port(), 8080);
        assert_eq!(req.query_string(), Some("x=1"));
        assert_eq!(req.int_header("x-count").unwrap(), Some(42));
        assert_eq!(req.int_header("missing").unwrap(), None);
        assert!(req.int_header("x-multi").is_err());
        assert_eq!(req.header("x-multi"), Some("a"));
        assert_eq!(req.headers("x-multi"), vec!["a", "b"]);
        let cookies: Vec<(String, String)> = req
            .cookies()
            .into_iter()
            .map(|c| (c.name, c.value))
            .collect();
        assert_eq!(
            cookies,
            vec![("a".into(), "1".into()), ("b".into(), "2".into())]
        );
        assert_eq!(req.locales(), vec!["en-US", "fr"]);
        assert_eq!(req.character_encoding(), "UTF-8");
        req.set_character_encoding("UTF-16");
        assert_eq!(req.character_encoding(), "UTF-16");
    }

    #[tokio::test]
    async fn test_default_encoding_and_attributes() {
        let bench = TestBench::new("", &[("h", "/h")]);
        let mut host = HostAttributes::default();
        host.insert("tenant", String::from("acme"));
        let mut http = axum::http::Request::get("/h").body(()).unwrap();
        http.extensions_mut().insert(host);
        let req = bench.request(http, "");

        assert_eq!(req.character_encoding(), "ISO-8859-1");
        assert_eq!(req.attribute_as::<String>("tenant").as_deref(), Some("acme"));
        req.set_attribute("count", 3u32);
        assert_eq!(req.attribute_as::<u32>("count"), Some(3));
        assert_eq!(req.attribute_as::<String>("count"), None);
        assert!(req.remove_attribute("count").is_some());
        assert_eq!(req.attribute_names(), vec!["tenant".to_string()]);
    }
}

//! Response adapter.
//!
//! # Responsibilities
//! - Accumulate status, headers, cookies and body written by a handler
//! - Track buffer/commit state the blocking contract exposes
//! - Resolve the one-shot completion observed by the host exactly once
//!
//! # Design Decisions
//! - Completion is guarded by an atomic compare-and-swap, so racing terminal calls
//!   (normal return, error path, async complete) resolve the future at most once
//! - `Content-Type` travels separately from the header map in the final result
//! - Dropping every handle without completing resolves to `HandlerError::Abandoned`

use std::future::Future;
use std::io;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll};

use axum::{
    body::Body,
    http::{header, HeaderMap, HeaderName, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
};
use bytes::{Bytes, BytesMut};
use tokio::sync::oneshot;

use crate::error::HandlerError;

/// Default response buffer size in bytes.
pub const DEFAULT_BUFFER_SIZE: usize = 8192;

type Completion = Result<HandlerResponse, HandlerError>;

/// A cookie accumulated on the response, emitted as `Set-Cookie`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Cookie {
    pub name: String,
    pub value: String,
    pub path: Option<String>,
    pub domain: Option<String>,
    pub max_age: Option<i64>,
    pub secure: bool,
    pub http_only: bool,
}

impl Cookie {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
            path: None,
            domain: None,
            max_age: None,
            secure: false,
            http_only: false,
        }
    }

    pub fn with_path(mut self, path: impl Into<String>) -> Self {
        self.path = Some(path.into());
        self
    }

    pub fn with_max_age(mut self, seconds: i64) -> Self {
        self.max_age = Some(seconds);
        self
    }

    pub fn http_only(mut self) -> Self {
        self.http_only = true;
        self
    }

    pub fn secure(mut self) -> Self {
        self.secure = true;
        self
    }

    /// Render as a `Set-Cookie` header value.
    pub fn to_header_value(&self) -> String {
        let mut out = format!("{}={}", self.name, self.value);
        if let Some(path) = &self.path {
            out.push_str("; Path=");
            out.push_str(path);
        }
        if let Some(domain) = &self.domain {
            out.push_str("; Domain=");
            out.push_str(domain);
        }
        if let Some(max_age) = self.max_age {
            out.push_str(&format!("; Max-Age={}", max_age));
        }
        if self.secure {
            out.push_str("; Secure");
        }
        if self.http_only {
            out.push_str("; HttpOnly");
        }
        out
    }
}

/// The finished response handed back to the host.
#[derive(Debug, Clone)]
pub struct HandlerResponse {
    pub status: StatusCode,
    /// Headers without `Content-Type`, `Set-Cookie` already appended.
    pub headers: HeaderMap,
    pub body: Bytes,
    pub content_type: Option<String>,
}

impl IntoResponse for HandlerResponse {
    fn into_response(self) -> Response {
        let mut response = Response::new(Body::from(self.body));
        *response.status_mut() = self.status;
        *response.headers_mut() = self.headers;
        if let Some(value) = self
            .content_type
            .and_then(|ct| HeaderValue::from_str(&ct).ok())
        {
            response.headers_mut().insert(header::CONTENT_TYPE, value);
        }
        response
    }
}

/// Future resolving once the response adapter is completed or failed.
pub struct ResponseCompletion {
    rx: oneshot::Receiver<Completion>,
}

impl Future for ResponseCompletion {
    type Output = Completion;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.rx)
            .poll(cx)
            .map(|received| received.unwrap_or(Err(HandlerError::Abandoned)))
    }
}

struct ResponseState {
    status: StatusCode,
    headers: HeaderMap,
    cookies: Vec<Cookie>,
    pending: BytesMut,
    flushed: BytesMut,
    buffer_size: usize,
    committed: bool,
    character_encoding: Option<String>,
    locale: Option<String>,
}

impl ResponseState {
    fn new() -> Self {
        Self {
            status: StatusCode::OK,
            headers: HeaderMap::new(),
            cookies: Vec::new(),
            pending: BytesMut::new(),
            flushed: BytesMut::new(),
            buffer_size: DEFAULT_BUFFER_SIZE,
            committed: false,
            character_encoding: None,
            locale: None,
        }
    }

    fn written(&self) -> bool {
        !self.pending.is_empty() || !self.flushed.is_empty()
    }

    fn flush(&mut self) {
        let pending = self.pending.split();
        self.flushed.unsplit(pending);
        self.committed = true;
    }

    fn ensure_uncommitted(&self, operation: &str) -> Result<(), HandlerError> {
        if self.committed {
            return Err(HandlerError::IllegalState(format!(
                "cannot {} after the response has been committed",
                operation
            )));
        }
        Ok(())
    }
}

struct Inner {
    state: Mutex<ResponseState>,
    completed: AtomicBool,
    sender: Mutex<Option<oneshot::Sender<Completion>>>,
    request_url: String,
    default_encoding: String,
}

/// Mutable accumulator for one response. Cheap to clone; clones share state.
#[derive(Clone)]
pub struct ResponseAdapter {
    inner: Arc<Inner>,
}

impl ResponseAdapter {
    /// Create an adapter and the completion future the host awaits.
    ///
    /// `request_url` is the absolute URL of the request, used to resolve relative redirects.
    pub fn channel(
        request_url: impl Into<String>,
        default_encoding: impl Into<String>,
    ) -> (Self, ResponseCompletion) {
        let (tx, rx) = oneshot::channel();
        let adapter = Self {
            inner: Arc::new(Inner {
                state: Mutex::new(ResponseState::new()),
                completed: AtomicBool::new(false),
                sender: Mutex::new(Some(tx)),
                request_url: request_url.into(),
                default_encoding: default_encoding.into(),
            }),
        };
        (adapter, ResponseCompletion { rx })
    }

    /// True when both handles share the same response.
    pub fn same_as(&self, other: &ResponseAdapter) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    fn state(&self) -> std::sync::MutexGuard<'_, ResponseState> {
        self.inner.state.lock().expect("response mutex poisoned")
    }

    pub fn status(&self) -> StatusCode {
        self.state().status
    }

    /// Ignored once committed.
    pub fn set_status(&self, status: StatusCode) {
        let mut state = self.state();
        if state.committed {
            tracing::debug!(status = %status, "Status change after commit ignored");
            return;
        }
        state.status = status;
    }

    /// Replace every value of `name`.
    pub fn set_header(&self, name: &str, value: &str) -> Result<(), HandlerError> {
        let (name, value) = parse_header(name, value)?;
        let mut state = self.state();
        if !state.committed {
            state.headers.insert(name, value);
        }
        Ok(())
    }

    /// Append a value to `name`.
    pub fn add_header(&self, name: &str, value: &str) -> Result<(), HandlerError> {
        let (name, value) = parse_header(name, value)?;
        let mut state = self.state();
        if !state.committed {
            state.headers.append(name, value);
        }
        Ok(())
    }

    pub fn set_int_header(&self, name: &str, value: i64) -> Result<(), HandlerError> {
        self.set_header(name, &value.to_string())
    }

    /// First value of `name`.
    pub fn header(&self, name: &str) -> Option<String> {
        self.state()
            .headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)
    }

    pub fn headers(&self, name: &str) -> Vec<String> {
        self.state()
            .headers
            .get_all(name)
            .iter()
            .filter_map(|v| v.to_str().ok())
            .map(str::to_string)
            .collect()
    }

    pub fn contains_header(&self, name: &str) -> bool {
        self.state().headers.contains_key(name)
    }

    pub fn header_names(&self) -> Vec<String> {
        self.state()
            .headers
            .keys()
            .map(|k| k.as_str().to_string())
            .collect()
    }

    pub fn add_cookie(&self, cookie: Cookie) {
        let mut state = self.state();
        if !state.committed {
            state.cookies.push(cookie);
        }
    }

    pub fn cookies(&self) -> Vec<Cookie> {
        self.state().cookies.clone()
    }

    pub fn set_content_type(&self, content_type: &str) -> Result<(), HandlerError> {
        if let Some(charset) = charset_of(content_type) {
            self.state().character_encoding = Some(charset);
        }
        self.set_header(header::CONTENT_TYPE.as_str(), content_type)
    }

    pub fn content_type(&self) -> Option<String> {
        self.header(header::CONTENT_TYPE.as_str())
    }

    pub fn set_content_length(&self, length: u64) -> Result<(), HandlerError> {
        self.set_header(header::CONTENT_LENGTH.as_str(), &length.to_string())
    }

    pub fn set_character_encoding(&self, encoding: impl Into<String>) {
        let mut state = self.state();
        if !state.committed {
            state.character_encoding = Some(encoding.into());
        }
    }

    /// Explicit encoding, else the context default.
    pub fn character_encoding(&self) -> String {
        self.state()
            .character_encoding
            .clone()
            .unwrap_or_else(|| self.inner.default_encoding.clone())
    }

    /// Sets the locale and the matching `Content-Language` header.
    pub fn set_locale(&self, locale: &str) -> Result<(), HandlerError> {
        self.set_header(header::CONTENT_LANGUAGE.as_str(), locale)?;
        self.state().locale = Some(locale.to_string());
        Ok(())
    }

    pub fn locale(&self) -> Option<String> {
        self.state().locale.clone()
    }

    /// Append raw bytes to the body buffer. Overflowing the buffer commits the response.
    pub fn write_bytes(&self, data: &[u8]) {
        let mut state = self.state();
        state.pending.extend_from_slice(data);
        if state.pending.len() > state.buffer_size {
            state.flush();
        }
    }

    /// Append text encoded with the response character encoding.
    pub fn print(&self, text: &str) {
        let encoded = encode_text(text, &self.character_encoding());
        self.write_bytes(&encoded);
    }

    /// `io::Write` handle over the body buffer.
    pub fn output(&self) -> ResponseOutput {
        ResponseOutput {
            response: self.clone(),
        }
    }

    pub fn buffer_size(&self) -> usize {
        self.state().buffer_size
    }

    /// Only allowed before anything has been written.
    pub fn set_buffer_size(&self, size: usize) -> Result<(), HandlerError> {
        let mut state = self.state();
        if state.written() {
            return Err(HandlerError::IllegalState(
                "cannot change buffer size after content has been written".into(),
            ));
        }
        state.buffer_size = size;
        Ok(())
    }

    /// Flush buffered bytes and commit the response.
    pub fn flush_buffer(&self) {
        self.state().flush();
    }

    /// Drop buffered, not yet flushed, body bytes.
    pub fn reset_buffer(&self) -> Result<(), HandlerError> {
        let mut state = self.state();
        state.ensure_uncommitted("reset the buffer")?;
        state.pending.clear();
        Ok(())
    }

    /// Clear status, headers, cookies and buffered body.
    pub fn reset(&self) -> Result<(), HandlerError> {
        let mut state = self.state();
        state.ensure_uncommitted("reset")?;
        let buffer_size = state.buffer_size;
        *state = ResponseState::new();
        state.buffer_size = buffer_size;
        Ok(())
    }

    pub fn is_committed(&self) -> bool {
        self.state().committed || self.is_completed()
    }

    /// Replace the body with an error status and optional plain-text message, then commit.
    pub fn send_error(&self, status: StatusCode, message: Option<&str>) -> Result<(), HandlerError> {
        let mut state = self.state();
        state.ensure_uncommitted("send an error")?;
        state.pending.clear();
        state.status = status;
        if let Some(message) = message {
            state.headers.insert(
                header::CONTENT_TYPE,
                HeaderValue::from_static("text/plain"),
            );
            state.pending.extend_from_slice(message.as_bytes());
        }
        state.flush();
        Ok(())
    }

    /// 302 to `location`, resolved against the request URL, then commit.
    pub fn send_redirect(&self, location: &str) -> Result<(), HandlerError> {
        let target = url::Url::parse(&self.inner.request_url)
            .and_then(|base| base.join(location))
            .map(String::from)
            .unwrap_or_else(|_| location.to_string());
        let (name, value) = parse_header(header::LOCATION.as_str(), &target)?;

        let mut state = self.state();
        state.ensure_uncommitted("redirect")?;
        state.pending.clear();
        state.status = StatusCode::FOUND;
        state.headers.insert(name, value);
        state.flush();
        Ok(())
    }

    pub fn is_completed(&self) -> bool {
        self.inner.completed.load(Ordering::Acquire)
    }

    /// Finish normally. No-op when already completed or failed.
    pub fn on_complete(&self) {
        if self.begin_completion() {
            let result = self.build_result();
            self.resolve(Ok(result));
        }
    }

    /// Finish with an error for the host to render. No-op when already completed.
    pub fn fail(&self, error: HandlerError) {
        if self.begin_completion() {
            self.state().flush();
            self.resolve(Err(error));
        }
    }

    fn begin_completion(&self) -> bool {
        self.inner
            .completed
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    fn build_result(&self) -> HandlerResponse {
        let mut state = self.state();
        state.flush();
        let mut headers = std::mem::take(&mut state.headers);
        let content_type = headers
            .remove(header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok().map(str::to_string));
        for cookie in &state.cookies {
            match HeaderValue::from_str(&cookie.to_header_value()) {
                Ok(value) => {
                    headers.append(header::SET_COOKIE, value);
                }
                Err(_) => tracing::warn!(cookie = %cookie.name, "Dropping unrepresentable cookie"),
            }
        }
        HandlerResponse {
            status: state.status,
            headers,
            body: state.flushed.split().freeze(),
            content_type,
        }
    }

    fn resolve(&self, completion: Completion) {
        let sender = self
            .inner
            .sender
            .lock()
            .expect("completion mutex poisoned")
            .take();
        if let Some(sender) = sender {
            // The host may have stopped waiting (client went away).
            let _ = sender.send(completion);
        }
    }
}

impl std::fmt::Debug for ResponseAdapter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResponseAdapter")
            .field("status", &self.status())
            .field("completed", &self.is_completed())
            .finish()
    }
}

/// `io::Write` over a response body.
pub struct ResponseOutput {
    response: ResponseAdapter,
}

impl io::Write for ResponseOutput {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.response.write_bytes(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        self.response.flush_buffer();
        Ok(())
    }
}

fn parse_header(name: &str, value: &str) -> Result<(HeaderName, HeaderValue), HandlerError> {
    let name = HeaderName::from_bytes(name.as_bytes())
        .map_err(|_| HandlerError::InvalidHeader(name.to_string()))?;
    let value = HeaderValue::from_str(value)
        .map_err(|_| HandlerError::InvalidHeader(format!("{}: {}", name, value)))?;
    Ok((name, value))
}

/// Extract `charset=` from a content type.
pub(crate) fn charset_of(content_type: &str) -> Option<String> {
    content_type.split(';').skip(1).find_map(|param| {
        let (key, value) = param.split_once('=')?;
        key.trim()
            .eq_ignore_ascii_case("charset")
            .then(|| value.trim().trim_matches('"').to_string())
    })
}

fn encode_text(text: &str, encoding: &str) -> Vec<u8> {
    let replace_above = match encoding.to_ascii_lowercase().as_str() {
        "iso-8859-1" | "latin1" | "iso8859-1" => 0xFF,
        "us-ascii" | "ascii" => 0x7F,
        _ => return text.as_bytes().to_vec(),
    };
    text.chars()
        .map(|c| if (c as u32) <= replace_above { c as u8 } else { b'?' })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn adapter() -> (ResponseAdapter, ResponseCompletion) {
        ResponseAdapter::channel("http://localhost:8080/app/page", "ISO-8859-1")
    }

    #[tokio::test]
    async fn test_complete_then_fail_resolves_once() {
        let (response, completion) = adapter();
        response.print("{\"source\":\"sync\"}");
        response.on_complete();
        response.fail(HandlerError::processing("late"));

        let result = completion.await.unwrap();
        assert_eq!(result.status, StatusCode::OK);
        assert_eq!(&result.body[..], b"{\"source\":\"sync\"}");
    }

    #[tokio::test]
    async fn test_fail_then_complete_resolves_once() {
        let (response, completion) = adapter();
        response.fail(HandlerError::processing("first"));
        response.on_complete();

        let err = completion.await.unwrap_err();
        assert_eq!(err.to_string(), "first");
    }

    #[tokio::test]
    async fn test_racing_completions() {
        let (response, completion) = adapter();
        let threads: Vec<_> = (0..8)
            .map(|i| {
                let response = response.clone();
                std::thread::spawn(move || {
                    if i % 2 == 0 {
                        response.on_complete();
                    } else {
                        response.fail(HandlerError::processing("racer"));
                    }
                })
            })
            .collect();
        for t in threads {
            t.join().unwrap();
        }
        let _ = completion.await;
        assert!(response.is_completed());
    }

    #[tokio::test]
    async fn test_content_type_travels_separately() {
        let (response, completion) = adapter();
        response.set_content_type("application/json").unwrap();
        response.set_header("X-One", "a").unwrap();
        response.add_header("X-One", "b").unwrap();
        response.add_cookie(Cookie::new("session", "abc").with_path("/").http_only());
        response.on_complete();

        let result = completion.await.unwrap();
        assert_eq!(result.content_type.as_deref(), Some("application/json"));
        assert!(result.headers.get(header::CONTENT_TYPE).is_none());
        assert_eq!(result.headers.get_all("x-one").iter().count(), 2);
        assert_eq!(
            result.headers.get(header::SET_COOKIE).unwrap(),
            "session=abc; Path=/; HttpOnly"
        );
    }

    #[tokio::test]
    async fn test_dropped_adapter_is_abandoned() {
        let (response, completion) = adapter();
        drop(response);
        assert!(matches!(completion.await, Err(HandlerError::Abandoned)));
    }

    #[test]
    fn test_buffer_size_only_before_write() {
        let (response, _completion) = adapter();
        response.set_buffer_size(4).unwrap();
        response.write_bytes(b"abc");
        assert!(!response.is_committed());
        assert!(response.set_buffer_size(64).is_err());

        response.write_bytes(b"de");
        assert!(response.is_committed());
        assert!(response.reset().is_err());
    }

    #[test]
    fn test_reset_clears_uncommitted_state() {
        let (response, _completion) = adapter();
        response.set_status(StatusCode::CREATED);
        response.set_header("X-Test", "1").unwrap();
        response.write_bytes(b"discard me");
        response.reset().unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert!(!response.contains_header("x-test"));
        response.reset_buffer().unwrap();
    }

    #[tokio::test]
    async fn test_send_redirect_resolves_relative_location() {
        let (response, completion) = adapter();
        response.send_redirect("other?x=1").unwrap();
        assert!(response.send_redirect("/again").is_err());
        response.on_complete();

        let result = completion.await.unwrap();
        assert_eq!(result.status, StatusCode::FOUND);
        assert_eq!(
            result.headers.get(header::LOCATION).unwrap(),
            "http://localhost:8080/app/other?x=1"
        );
    }

    #[tokio::test]
    async fn test_send_error_commits_message() {
        let (response, completion) = adapter();
        response.write_bytes(b"partial");
        response.send_error(StatusCode::NOT_FOUND, Some("missing")).unwrap();
        response.set_status(StatusCode::OK);
        response.on_complete();

        let result = completion.await.unwrap();
        assert_eq!(result.status, StatusCode::NOT_FOUND);
        assert_eq!(&result.body[..], b"missing");
        assert_eq!(result.content_type.as_deref(), Some("text/plain"));
    }

    #[test]
    fn test_invalid_header_rejected() {
        let (response, _completion) = adapter();
        assert!(matches!(
            response.set_header("bad header", "x"),
            Err(HandlerError::InvalidHeader(_))
        ));
    }

    #[test]
    fn test_character_encoding() {
        let (response, _completion) = adapter();
        assert_eq!(response.character_encoding(), "ISO-8859-1");
        response.set_content_type("text/html; charset=UTF-8").unwrap();
        assert_eq!(response.character_encoding(), "UTF-8");
        assert_eq!(encode_text("é€", "ISO-8859-1"), vec![0xE9, b'?']);
    }

    #[tokio::test]
    async fn test_output_stream_writes_body() {
        let (response, completion) = adapter();
        let mut out = response.output();
        write!(out, "hello {}", 42).unwrap();
        out.flush().unwrap();
        assert!(response.is_committed());
        response.on_complete();
        assert_eq!(&completion.await.unwrap().body[..], b"hello 42");
    }
}

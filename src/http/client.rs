use super::debug::{HttpDebugConfig, Redactor, truncate_for_log};
use crate::trace::SessionTrace;
use reqwest::header::HeaderMap;
use reqwest::{Client, Request};
use serde::Serialize;
use std::fmt;
use std::io::{self, Write};
#[cfg(test)]
use std::sync::{Arc, Mutex};
use std::time::Duration;

pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(120);
const API_KEY_PARAM: &str = "key";

/// JSON-over-HTTPS transport for the Gemini REST API.
///
/// Appends the API key to every request, and mirrors each exchange to the
/// `--verbose` log and the session trace with the key masked.
#[derive(Clone)]
pub struct HttpClient {
    inner: Client,
    api_key: Option<String>,
    debug: HttpDebugConfig,
    sink: DebugSink,
    trace: Option<SessionTrace>,
}

#[derive(Clone)]
enum DebugSink {
    Stderr,
    #[cfg(test)]
    Buffer(Arc<Mutex<Vec<String>>>),
}

impl fmt::Debug for HttpClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HttpClient")
            .field("authenticated", &self.api_key.is_some())
            .field("debug", &self.debug)
            .field("traced", &self.trace.is_some())
            .finish()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponseData {
    pub status: u16,
    pub body: String,
}

impl HttpClient {
    pub fn new(inner: Client, debug: HttpDebugConfig) -> Self {
        Self {
            inner,
            api_key: None,
            debug,
            sink: DebugSink::Stderr,
            trace: None,
        }
    }

    pub fn with_default_timeout(debug: HttpDebugConfig) -> Result<Self, reqwest::Error> {
        let inner = Client::builder().timeout(REQUEST_TIMEOUT).build()?;
        Ok(Self::new(inner, debug))
    }

    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(api_key.into());
        self
    }

    pub fn with_trace(mut self, trace: SessionTrace) -> Self {
        self.trace = Some(trace);
        self
    }

    /// Posts `payload` to `url`. Non-2xx statuses come back as data; only
    /// transport failures are errors.
    pub async fn post_json<T: Serialize + ?Sized>(
        &self,
        url: &str,
        payload: &T,
    ) -> Result<HttpResponseData, reqwest::Error> {
        let mut builder = self.inner.post(url).json(payload);
        if let Some(api_key) = &self.api_key {
            builder = builder.query(&[(API_KEY_PARAM, api_key.as_str())]);
        }
        let request = builder.build()?;
        self.record_request(&request);

        let response = match self.inner.execute(request).await {
            Ok(response) => response,
            Err(err) => {
                self.record_failure(&err);
                return Err(err);
            }
        };
        let status = response.status().as_u16();
        let headers = response.headers().clone();
        let body = response.text().await?;
        self.record_response(status, &headers, &body);

        Ok(HttpResponseData { status, body })
    }

    fn record_request(&self, request: &Request) {
        let body = request_body_text(request);
        if self.debug.enabled {
            let redactor = self.debug.redactor();
            let head = format!("{} {}", request.method(), redactor.url(request.url()));
            self.emit_debug('>', &head, &redactor.header_lines(request.headers()), &body);
        }
        if let Some(trace) = &self.trace {
            let redactor = Redactor::ALWAYS;
            trace.log_http_request(
                request.method().as_str(),
                &redactor.url(request.url()),
                &redactor.header_lines(request.headers()),
                &body,
            );
        }
    }

    fn record_response(&self, status: u16, headers: &HeaderMap, body: &str) {
        if self.debug.enabled {
            let lines = self.debug.redactor().header_lines(headers);
            self.emit_debug('<', &format!("HTTP {status}"), &lines, body);
        }
        if let Some(trace) = &self.trace {
            trace.log_http_response(status, &Redactor::ALWAYS.header_lines(headers), body);
        }
    }

    fn record_failure(&self, err: &reqwest::Error) {
        if self.debug.enabled {
            self.write_debug(format!("[http-debug] ! {err}"));
        }
        if let Some(trace) = &self.trace {
            trace.log_http_error(&err.to_string());
        }
    }

    fn emit_debug(&self, direction: char, head: &str, headers: &[String], body: &str) {
        for line in debug_lines(self.debug, direction, head, headers, body) {
            self.write_debug(line);
        }
    }

    fn write_debug(&self, line: String) {
        match &self.sink {
            DebugSink::Stderr => {
                let _ = writeln!(io::stderr().lock(), "{line}");
            }
            #[cfg(test)]
            DebugSink::Buffer(buffer) => {
                if let Ok(mut lines) = buffer.lock() {
                    lines.push(line);
                }
            }
        }
    }

    #[cfg(test)]
    pub fn with_buffer_sink(
        inner: Client,
        debug: HttpDebugConfig,
    ) -> (Self, Arc<Mutex<Vec<String>>>) {
        let buffer = Arc::new(Mutex::new(Vec::new()));
        let mut client = Self::new(inner, debug);
        client.sink = DebugSink::Buffer(Arc::clone(&buffer));
        (client, buffer)
    }
}

fn request_body_text(request: &Request) -> String {
    request
        .body()
        .and_then(reqwest::Body::as_bytes)
        .map(|bytes| String::from_utf8_lossy(bytes).into_owned())
        .unwrap_or_default()
}

/// One exchange direction as `[http-debug] <dir> ...` lines: the head line,
/// headers, a blank separator, then the redacted and truncated body.
fn debug_lines(
    debug: HttpDebugConfig,
    direction: char,
    head: &str,
    headers: &[String],
    body: &str,
) -> Vec<String> {
    let prefix = format!("[http-debug] {direction}");
    let body = truncate_for_log(&debug.redactor().body(body), debug.max_body_chars);

    let mut lines = Vec::with_capacity(headers.len() + 3);
    lines.push(format!("{prefix} {head}"));
    lines.extend(headers.iter().map(|header| format!("{prefix} {header}")));
    lines.push(prefix.clone());
    if body.is_empty() {
        lines.push(format!("{prefix} <empty body>"));
    } else {
        lines.extend(body.lines().map(|line| format!("{prefix} {line}")));
    }
    lines
}

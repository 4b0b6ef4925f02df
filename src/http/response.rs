//! Response formatting.
//!
//! # Responsibilities
//! - Render gateway-generated responses (errors, wrapped worker output)
//! - Convert CGI-style worker output into an HTTP response
//!
//! # Design Decisions
//! - Header keys are unique; setting a key twice replaces the value in place
//! - Header order on the wire is insertion order
//! - Every response carries `Connection: close` (no keep-alive)

use bytes::{BufMut, Bytes, BytesMut};

/// A response the gateway writes itself.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    status: u16,
    headers: Vec<(String, String)>,
    body: Option<Bytes>,
}

/// CGI-style worker output that could not be interpreted.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CgiError {
    #[error("worker output has no blank line after its header section")]
    MissingSeparator,
    #[error("invalid header line in worker output: {0:?}")]
    InvalidHeader(String),
    #[error("invalid Status header in worker output: {0:?}")]
    InvalidStatus(String),
}

impl HttpResponse {
    pub fn new(status: u16) -> Self {
        Self {
            status,
            headers: Vec::new(),
            body: None,
        }
    }

    /// Plain-text response for a failure the gateway itself detected.
    pub fn error(status: u16, message: &str) -> Self {
        Self::new(status)
            .with_header("Content-Type", "text/plain; charset=utf-8")
            .with_body(Bytes::copy_from_slice(message.as_bytes()))
    }

    /// 200 response carrying the worker output as its body.
    pub fn wrap(body: Bytes) -> Self {
        Self::new(200).with_body(body)
    }

    /// Parse `Status:` and header lines up to the first blank line, then body.
    ///
    /// Accepts `\n` and `\r\n` line endings. A missing `Status` means 200.
    pub fn from_cgi(output: &[u8]) -> Result<Self, CgiError> {
        let (head, body) = split_cgi(output).ok_or(CgiError::MissingSeparator)?;
        let head = String::from_utf8_lossy(head);

        let mut response = Self::new(200);
        for line in head.lines() {
            let line = line.trim_end_matches('\r');
            let Some((name, value)) = line.split_once(':') else {
                return Err(CgiError::InvalidHeader(line.to_string()));
            };
            let value = value.trim();

            if name.eq_ignore_ascii_case("Status") {
                let code = value.split_whitespace().next().unwrap_or_default();
                response.status = code
                    .parse::<u16>()
                    .ok()
                    .filter(|c| (100..1000).contains(c))
                    .ok_or_else(|| CgiError::InvalidStatus(value.to_string()))?;
            } else {
                response.set_header(name.trim(), value);
            }
        }

        Ok(response.with_body(Bytes::copy_from_slice(body)))
    }

    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        self.set_header(name, value);
        self
    }

    pub fn with_body(mut self, body: Bytes) -> Self {
        self.body = Some(body);
        self
    }

    /// Insert or replace a header, keeping the original position on replace.
    pub fn set_header(&mut self, name: &str, value: &str) {
        match self
            .headers
            .iter_mut()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
        {
            Some(entry) => entry.1 = value.to_string(),
            None => self.headers.push((name.to_string(), value.to_string())),
        }
    }

    pub fn status(&self) -> u16 {
        self.status
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    pub fn body(&self) -> Option<&Bytes> {
        self.body.as_ref()
    }

    /// Render `HTTP/1.1 <status> \r\n<header>: <value>\r\n...\r\n\r\n<body>`.
    pub fn to_bytes(&self) -> Bytes {
        let mut response = self.clone();
        let body_len = response.body.as_ref().map_or(0, Bytes::len);
        response.set_header("Content-Length", &body_len.to_string());
        response.set_header("Connection", "close");

        let mut out = BytesMut::with_capacity(64 + body_len);
        out.put_slice(format!("HTTP/1.1 {} \r\n", response.status).as_bytes());
        for (name, value) in &response.headers {
            out.put_slice(name.as_bytes());
            out.put_slice(b": ");
            out.put_slice(value.as_bytes());
            out.put_slice(b"\r\n");
        }
        out.put_slice(b"\r\n");
        if let Some(body) = &response.body {
            out.put_slice(body);
        }
        out.freeze()
    }
}

fn split_cgi(output: &[u8]) -> Option<(&[u8], &[u8])> {
    let crlf = output.windows(4).position(|w| w == b"\r\n\r\n");
    let lf = output.windows(2).position(|w| w == b"\n\n");
    match (crlf, lf) {
        (Some(c), Some(l)) if c < l => Some((&output[..c], &output[c + 4..])),
        (_, Some(l)) => Some((&output[..l], &output[l + 2..])),
        (Some(c), None) => Some((&output[..c], &output[c + 4..])),
        (None, None) => None,
    }
}

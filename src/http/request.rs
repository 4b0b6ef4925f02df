//! Request parsing.
//!
//! Turns the raw bytes read from a client into an [`Environment`]. Only the
//! header block is inspected; a request body is not forwarded to the worker.
//! Headers other than `Content-Type` and `Content-Length` are kept on the
//! environment for Rust callers but are not part of the worker record.

use crate::http::environment::{Environment, RequestParts, ServerIdentity};

const HEADER_TERMINATOR: &[u8] = b"\r\n\r\n";

/// The request bytes do not form a usable HTTP request.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MalformedRequest {
    #[error("request header is not valid UTF-8 (at byte {valid_up_to})")]
    InvalidUtf8 { valid_up_to: usize },
    #[error("request line must be 'METHOD TARGET PROTOCOL', got {tokens} token(s): {line:?}")]
    RequestLine { line: String, tokens: usize },
}

/// Builds environments for a fixed server identity.
#[derive(Debug, Clone)]
pub struct RequestParser {
    identity: ServerIdentity,
}

impl RequestParser {
    pub fn new(identity: ServerIdentity) -> Self {
        Self { identity }
    }

    pub fn identity(&self) -> &ServerIdentity {
        &self.identity
    }

    /// Parse one request.
    pub fn parse(&self, raw: &[u8]) -> Result<Environment, MalformedRequest> {
        let header_block = match find(raw, HEADER_TERMINATOR) {
            Some(end) => &raw[..end],
            None => raw,
        };
        let header_text = std::str::from_utf8(header_block).map_err(|e| {
            MalformedRequest::InvalidUtf8 {
                valid_up_to: e.valid_up_to(),
            }
        })?;

        let mut lines = header_text.split("\r\n");
        let request_line = lines.next().unwrap_or_default();

        let tokens: Vec<&str> = request_line.split_whitespace().collect();
        let [method, target, protocol] = tokens[..] else {
            return Err(MalformedRequest::RequestLine {
                line: request_line.to_string(),
                tokens: tokens.len(),
            });
        };

        let (path, query) = target.split_once('?').unwrap_or((target, ""));

        let mut parts = RequestParts {
            method: method.to_string(),
            path: path.to_string(),
            query: query.to_string(),
            protocol: protocol.to_string(),
            ..Default::default()
        };

        for line in lines {
            let fields: Vec<&str> = line.split(": ").collect();
            let [name, value] = fields[..] else {
                if !line.is_empty() {
                    tracing::trace!(line, "Ignoring unrecognised header line");
                }
                continue;
            };

            if name.eq_ignore_ascii_case("Content-Type") {
                if parts.content_type.is_empty() {
                    parts.content_type = value.to_string();
                }
            } else if name.eq_ignore_ascii_case("Content-Length") {
                if parts.content_length.is_empty() {
                    parts.content_length = value.to_string();
                }
            } else {
                parts
                    .extra_headers
                    .push((name.to_string(), value.to_string()));
            }
        }

        Ok(Environment::new(parts, &self.identity))
    }
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack.windows(needle.len()).position(|w| w == needle)
}

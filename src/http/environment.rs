//! The request environment handed to the worker.
//!
//! An [`Environment`] is the CGI/WSGI-style record describing one request.
//! Its serialized form is one JSON object with a fixed key set, every value a
//! string, terminated by a newline.

use serde::Serialize;

/// Static identity of the gateway, reported as `SERVER_NAME` / `SERVER_PORT`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerIdentity {
    pub name: String,
    pub port: String,
}

impl ServerIdentity {
    pub fn new(name: impl Into<String>, port: u16) -> Self {
        Self {
            name: name.into(),
            port: port.to_string(),
        }
    }
}

/// Interface version reported to the worker.
pub const INTERFACE_VERSION: &str = "(1, 0)";
pub const URL_SCHEME: &str = "http";
pub const INPUT_STREAM: &str = "/dev/stdin";
pub const ERROR_STREAM: &str = "/dev/stderr";

/// Canonical description of one HTTP request.
///
/// Field order matches the wire key order. Interface metadata fields are
/// gateway constants, not derived from the request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Environment {
    #[serde(rename = "REQUEST_METHOD")]
    pub request_method: String,
    #[serde(rename = "SCRIPT_NAME")]
    pub script_name: String,
    #[serde(rename = "PATH_INFO")]
    pub path_info: String,
    #[serde(rename = "QUERY_STRING")]
    pub query_string: String,
    #[serde(rename = "CONTENT_TYPE")]
    pub content_type: String,
    #[serde(rename = "CONTENT_LENGTH")]
    pub content_length: String,
    #[serde(rename = "SERVER_NAME")]
    pub server_name: String,
    #[serde(rename = "SERVER_PORT")]
    pub server_port: String,
    #[serde(rename = "SERVER_PROTOCOL")]
    pub server_protocol: String,
    #[serde(rename = "wsgi.version")]
    version: &'static str,
    #[serde(rename = "wsgi.url_scheme")]
    url_scheme: &'static str,
    #[serde(rename = "wsgi.input")]
    input: &'static str,
    #[serde(rename = "wsgi.errors")]
    errors: &'static str,
    #[serde(rename = "wsgi.multithread")]
    multithread: &'static str,
    #[serde(rename = "wsgi.multiprocess")]
    multiprocess: &'static str,
    #[serde(rename = "wsgi.run_once")]
    run_once: &'static str,

    /// Headers other than Content-Type / Content-Length. Never sent to the worker.
    #[serde(skip)]
    extra_headers: Vec<(String, String)>,
}

/// Request-derived fields used to build an [`Environment`].
#[derive(Debug, Default)]
pub struct RequestParts {
    pub method: String,
    pub path: String,
    pub query: String,
    pub protocol: String,
    pub content_type: String,
    pub content_length: String,
    pub extra_headers: Vec<(String, String)>,
}

impl Environment {
    pub fn new(parts: RequestParts, identity: &ServerIdentity) -> Self {
        Self {
            request_method: parts.method,
            script_name: String::new(),
            path_info: parts.path,
            query_string: parts.query,
            content_type: parts.content_type,
            content_length: parts.content_length,
            server_name: identity.name.clone(),
            server_port: identity.port.clone(),
            server_protocol: parts.protocol,
            version: INTERFACE_VERSION,
            url_scheme: URL_SCHEME,
            input: INPUT_STREAM,
            errors: ERROR_STREAM,
            multithread: "false",
            multiprocess: "false",
            run_once: "false",
            extra_headers: parts.extra_headers,
        }
    }

    /// Headers that were parsed but are not part of the serialized record.
    pub fn extra_headers(&self) -> &[(String, String)] {
        &self.extra_headers
    }

    /// Look up a non-serialized header by case-insensitive name.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.extra_headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Render the wire record: one JSON object followed by `\n`.
    pub fn to_wire(&self) -> Result<Vec<u8>, serde_json::Error> {
        let mut bytes = serde_json::to_vec(self)?;
        bytes.push(b'\n');
        Ok(bytes)
    }
}

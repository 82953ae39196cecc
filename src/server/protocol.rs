//! Admin protocol
//!
//! One UTF-8 JSON object per `\n`-terminated line. The object must carry a
//! string `command` field; anything else in it is passed to the handler.
//! Replies are an optional JSON payload line followed by `OK\n`, or a single
//! `ERR <reason>\n` line.

use serde_json::{Map, Value};
use std::path::PathBuf;

/// Longest request line accepted, newline included
pub const MAX_LINE_BYTES: usize = 64 * 1024;

/// Default TCP port for the admin listener
pub const DEFAULT_TCP_PORT: u16 = 9765;

/// Success terminator sent after every handled request
pub const OK_REPLY: &[u8] = b"OK\n";

/// Default Unix socket path for a named server
pub fn default_socket_path(name: &str) -> PathBuf {
    std::env::temp_dir().join(format!("sumi-mirror-{}.sock", name))
}

/// A decoded request line
#[derive(Debug, Clone, PartialEq)]
pub struct Request {
    pub command: String,
    /// The full JSON object, `command` included
    pub body: Map<String, Value>,
}

/// Parses one request line
///
/// # Errors
///
/// Returns a human-readable reason for bad JSON, a non-object, or a
/// missing/non-string `command` field.
pub fn parse_request(line: &str) -> Result<Request, String> {
    let value: Value =
        serde_json::from_str(line.trim_end()).map_err(|e| format!("invalid JSON: {}", e))?;

    let Value::Object(body) = value else {
        return Err("request must be a JSON object".to_string());
    };

    let command = match body.get("command") {
        Some(Value::String(command)) => command.clone(),
        Some(_) => return Err("command must be a string".to_string()),
        None => return Err("missing command".to_string()),
    };

    Ok(Request { command, body })
}

/// Outcome of handling one request
#[derive(Debug, Clone, PartialEq)]
pub enum Reply {
    Ok(Option<Value>),
    Err(String),
}

impl Reply {
    /// Encodes the reply as bytes for the wire
    pub fn encode(&self) -> Vec<u8> {
        match self {
            Reply::Ok(payload) => {
                let mut out = Vec::new();
                if let Some(payload) = payload {
                    out.extend_from_slice(payload.to_string().as_bytes());
                    out.push(b'\n');
                }
                out.extend_from_slice(OK_REPLY);
                out
            }
            Reply::Err(reason) => {
                // Keep the error on one line
                let reason = reason.replace(['\r', '\n'], " ");
                format!("ERR {}\n", reason).into_bytes()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_request() {
        let request = parse_request("{\"command\":\"ping\",\"extra\":1}\n").unwrap();
        assert_eq!(request.command, "ping");
        assert_eq!(request.body["extra"], json!(1));
    }

    #[test]
    fn test_parse_request_errors() {
        assert!(parse_request("not json").unwrap_err().contains("invalid JSON"));
        assert_eq!(parse_request("[1,2]").unwrap_err(), "request must be a JSON object");
        assert_eq!(parse_request("{}").unwrap_err(), "missing command");
        assert_eq!(
            parse_request("{\"command\":5}").unwrap_err(),
            "command must be a string"
        );
    }

    #[test]
    fn test_encode_ok() {
        assert_eq!(Reply::Ok(None).encode(), b"OK\n");
        assert_eq!(
            Reply::Ok(Some(json!({"a": 1}))).encode(),
            b"{\"a\":1}\nOK\n".to_vec()
        );
    }

    #[test]
    fn test_encode_err_single_line() {
        assert_eq!(
            Reply::Err("bad\nthing".to_string()).encode(),
            b"ERR bad thing\n".to_vec()
        );
    }

    #[test]
    fn test_default_socket_path() {
        let path = default_socket_path("mirror");
        assert!(path.to_string_lossy().ends_with("sumi-mirror-mirror.sock"));
    }
}

//! Request parsing helpers for the gateway.
//!
//! # Responsibilities
//! - Name the custom headers shared by the agent and the gateway
//! - Decode form parameters of mutating requests
//! - Read the query flags of GET and DELETE
//! - Reduce a routed key path to the one key every later step sees

use percent_encoding::percent_decode_str;
use url::form_urlencoded;

use crate::security::WriteParams;

/// Hash of a previously seen body; echoed back on every GET answer.
pub const X_CUSTOM_HASH: &str = "x-custom-hash";
/// `base` asks for the store's raw response.
pub const X_CUSTOM_FORMAT: &str = "x-custom-format";
pub const X_REQUEST_ID: &str = "x-request-id";

/// Parse `value`/`dir` from a form-encoded body.
///
/// A body without any form pair is taken as the raw value.
pub fn parse_write_params(body: &[u8]) -> WriteParams {
    let mut params = WriteParams::default();
    if !body.contains(&b'=') {
        params.value = String::from_utf8_lossy(body).into_owned();
        return params;
    }
    for (name, value) in form_urlencoded::parse(body) {
        match name.as_ref() {
            "value" => params.value = value.into_owned(),
            "dir" => params.dir = value == "true",
            _ => {}
        }
    }
    params
}

/// Percent-decode `raw` and resolve its `.` and `..` segments.
///
/// Empty segments collapse. A `..` above the root, an encoded `/` inside a
/// segment or invalid UTF-8 is an error. A trailing slash survives.
pub fn canonical_key(raw: &str) -> Result<String, String> {
    let mut segments: Vec<String> = Vec::new();
    for segment in raw.split('/') {
        let decoded = percent_decode_str(segment)
            .decode_utf8()
            .map_err(|_| format!("Invalid UTF-8 in key segment '{segment}'"))?;
        match &*decoded {
            "" | "." => {}
            ".." => {
                if segments.pop().is_none() {
                    return Err("Key escapes the backend root".to_string());
                }
            }
            name if name.contains('/') => {
                return Err(format!("Encoded '/' in key segment '{segment}'"));
            }
            name => segments.push(name.to_string()),
        }
    }

    let mut key = format!("/{}", segments.join("/"));
    if raw.ends_with('/') && !segments.is_empty() {
        key.push('/');
    }
    Ok(key)
}

/// Whether `name=true` is present in the query string.
pub fn query_flag(query: Option<&str>, name: &str) -> bool {
    query
        .map(|q| form_urlencoded::parse(q.as_bytes()).any(|(k, v)| k == name && v == "true"))
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_form() {
        let params = parse_write_params(b"value=true&dir=");
        assert_eq!(params, WriteParams { dir: false, value: "true".into() });

        let params = parse_write_params(b"dir=true");
        assert!(params.dir);
        assert_eq!(params.value, "");

        let params = parse_write_params(b"value=%7B%22a%22%3A1%7D");
        assert_eq!(params.value, r#"{"a":1}"#);
    }

    #[test]
    fn test_raw_body_is_the_value() {
        let params = parse_write_params(b"plain");
        assert_eq!(params.value, "plain");
        assert!(!params.dir);
    }

    #[test]
    fn test_canonical_key() {
        assert_eq!(canonical_key("/app/flag").unwrap(), "/app/flag");
        assert_eq!(canonical_key("/app//conf/").unwrap(), "/app/conf/");
        assert_eq!(canonical_key("/").unwrap(), "/");
        assert_eq!(canonical_key("/public/%2e%2e/secret/x").unwrap(), "/secret/x");
        assert_eq!(canonical_key("/x/../app/./flag").unwrap(), "/app/flag");
        assert_eq!(canonical_key("/app/fl%61g").unwrap(), "/app/flag");
        assert_eq!(canonical_key("/my%20key").unwrap(), "/my key");
    }

    #[test]
    fn test_canonical_key_rejects_escapes() {
        assert!(canonical_key("/..").is_err());
        assert!(canonical_key("/app/%2E%2E/%2e%2e/etc").is_err());
        assert!(canonical_key("/app%2fflag").is_err());
        assert!(canonical_key("/%ff").is_err());
    }

    #[test]
    fn test_query_flag() {
        assert!(query_flag(Some("recursive=true&sorted=false"), "recursive"));
        assert!(!query_flag(Some("recursive=true&sorted=false"), "sorted"));
        assert!(!query_flag(None, "recursive"));
    }
}

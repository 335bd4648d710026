//! Splits a decoded HPACK header block into pseudo-headers and regular
//! fields, enforcing the request well-formedness rules of RFC 9113 §8.3.

use crate::headers;

use super::frame::error_code;
use super::Error;

/// A request's pseudo-headers, pulled out of the header block and
/// validated, plus the regular fields that follow them.
#[derive(Debug, Clone)]
pub struct Request {
    pub method: String,
    pub scheme: String,
    pub authority: Option<String>,
    pub path: String,
    pub headers: Vec<(String, Vec<u8>)>,
}

/// Validates one stream's complete header block against §8.3's rules:
/// header names are lowercase tokens, pseudo-headers (`:method`, `:scheme`,
/// `:path`, `:authority`) precede all regular fields and each appears at
/// most once, connection-specific fields (§8.2.2) are absent, and the
/// required pseudo-headers are present. Violations are always stream-level
/// (RST_STREAM, not GOAWAY) since the rest of the connection is unaffected.
///
/// Also applies the §8.1.2.5/§8.3 field-level rules that don't fit neatly
/// into the loop above: repeated `cookie` fields are recombined into one
/// (joined by `"; "`, the inverse of the HPACK-friendly split a sender may
/// do), a repeated `content-length` must agree with itself, and `:path`
/// may not contain a `.`/`..` segment.
pub fn validate_request(stream_id: u32, raw: Vec<(String, Vec<u8>)>) -> Result<Request, Error> {
    let bad = || Error::stream(stream_id, error_code::PROTOCOL_ERROR);

    let mut method = None;
    let mut scheme = None;
    let mut path = None;
    let mut authority = None;
    let mut regular = Vec::with_capacity(raw.len());
    let mut seen_regular = false;
    let mut cookies: Vec<Vec<u8>> = Vec::new();
    let mut content_length: Option<u64> = None;

    for (name, value) in raw {
        if !headers::is_lowercase_token(name.as_bytes()) && !name.starts_with(':') {
            return Err(bad());
        }
        if let Some(pseudo) = name.strip_prefix(':') {
            if seen_regular {
                return Err(bad()); // pseudo-header after regular field, §8.3
            }
            let slot = match pseudo {
                "method" => &mut method,
                "scheme" => &mut scheme,
                "path" => &mut path,
                "authority" => &mut authority,
                _ => return Err(bad()), // unknown pseudo-header
            };
            if slot.is_some() {
                return Err(bad()); // duplicate pseudo-header
            }
            *slot = Some(String::from_utf8(value).map_err(|_| bad())?);
        } else {
            seen_regular = true;
            if headers::is_h2_connection_specific(&name) {
                return Err(bad());
            }
            if name == "te" && value != b"trailers" {
                return Err(bad());
            }
            if name == "content-length" {
                let s = std::str::from_utf8(&value).map_err(|_| bad())?;
                let n: u64 = s.trim().parse().map_err(|_| bad())?;
                match content_length {
                    None => content_length = Some(n),
                    Some(prev) if prev == n => {}
                    Some(_) => return Err(bad()),
                }
            }
            if name == "cookie" {
                cookies.push(value);
            } else {
                regular.push((name, value));
            }
        }
    }

    let method = method.ok_or_else(bad)?;
    let scheme = scheme.ok_or_else(bad)?;
    let path = path.ok_or_else(bad)?;
    if path.is_empty() || has_dot_segment(&path) {
        return Err(bad());
    }

    if !cookies.is_empty() {
        let mut combined = Vec::new();
        for (i, crumb) in cookies.iter().enumerate() {
            if i > 0 {
                combined.extend_from_slice(b"; ");
            }
            combined.extend_from_slice(crumb);
        }
        regular.push(("cookie".to_string(), combined));
    }

    Ok(Request { method, scheme, authority, path, headers: regular })
}

/// Does the path component of `path` (i.e. before any `?query`) contain a
/// `.` or `..` segment?
fn has_dot_segment(path: &str) -> bool {
    let path_only = path.split('?').next().unwrap_or(path);
    path_only.split('/').any(|segment| segment == "." || segment == "..")
}

#[cfg(test)]
mod test {
    use super::*;

    fn pair(name: &str, value: &str) -> (String, Vec<u8>) {
        (name.to_string(), value.as_bytes().to_vec())
    }

    #[test]
    fn accepts_well_formed_request() {
        let raw = vec![
            pair(":method", "GET"),
            pair(":scheme", "https"),
            pair(":path", "/ok"),
            pair(":authority", "example.com"),
            pair("accept", "*/*"),
        ];
        let req = validate_request(1, raw).unwrap();
        assert_eq!(req.method, "GET");
        assert_eq!(req.path, "/ok");
        assert_eq!(req.headers, vec![pair("accept", "*/*")]);
    }

    #[test]
    fn rejects_uppercase_header_name() {
        let raw = vec![pair(":method", "GET"), pair(":scheme", "https"), pair(":path", "/"), pair("Accept", "*/*")];
        let err = validate_request(1, raw).unwrap_err();
        assert_eq!(err.code(), error_code::PROTOCOL_ERROR);
        assert_eq!(err.stream_id(), Some(1));
    }

    #[test]
    fn rejects_pseudo_header_after_regular_field() {
        let raw = vec![pair(":method", "GET"), pair("accept", "*/*"), pair(":path", "/"), pair(":scheme", "https")];
        assert!(validate_request(1, raw).is_err());
    }

    #[test]
    fn rejects_connection_specific_field() {
        let raw =
            vec![pair(":method", "GET"), pair(":scheme", "https"), pair(":path", "/"), pair("connection", "close")];
        assert!(validate_request(1, raw).is_err());
    }

    #[test]
    fn rejects_missing_required_pseudo_header() {
        let raw = vec![pair(":method", "GET"), pair(":path", "/")];
        assert!(validate_request(1, raw).is_err());
    }

    #[test]
    fn combines_split_cookie_crumbs() {
        let raw = vec![
            pair(":method", "GET"),
            pair(":scheme", "https"),
            pair(":path", "/"),
            pair("cookie", "a=1"),
            pair("cookie", "b=2"),
            pair("cookie", "c=3"),
        ];
        let req = validate_request(1, raw).unwrap();
        assert_eq!(req.headers, vec![pair("cookie", "a=1; b=2; c=3")]);
    }

    #[test]
    fn accepts_repeated_equal_content_length() {
        let raw = vec![
            pair(":method", "POST"),
            pair(":scheme", "https"),
            pair(":path", "/"),
            pair("content-length", "5"),
            pair("content-length", "5"),
        ];
        assert!(validate_request(1, raw).is_ok());
    }

    #[test]
    fn rejects_conflicting_content_length() {
        let raw = vec![
            pair(":method", "POST"),
            pair(":scheme", "https"),
            pair(":path", "/"),
            pair("content-length", "5"),
            pair("content-length", "6"),
        ];
        assert!(validate_request(1, raw).is_err());
    }

    #[test]
    fn rejects_dot_segments_in_path() {
        let raw = vec![pair(":method", "GET"), pair(":scheme", "https"), pair(":path", "/a/../b")];
        assert!(validate_request(1, raw).is_err());

        let raw = vec![pair(":method", "GET"), pair(":scheme", "https"), pair(":path", "/./a")];
        assert!(validate_request(1, raw).is_err());
    }

    #[test]
    fn allows_dot_inside_a_path_segment() {
        let raw = vec![pair(":method", "GET"), pair(":scheme", "https"), pair(":path", "/a.b/c?x=..y")];
        assert!(validate_request(1, raw).is_ok());
    }
}

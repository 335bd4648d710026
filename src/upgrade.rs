//! Upgrade decision points this crate resolves: h2c prior-knowledge
//! detection, the `Upgrade: h2c` handshake (§3.2, §4.3), and the WebSocket
//! handshake check (§4.5). None of these perform the Upgrade itself — once
//! recognized, the glue layer above this crate takes over the raw socket
//! (writing the `101` where one applies, then handing off to `h2::serve` /
//! `h2::connection::serve_upgraded` or the raw socket as appropriate).

use sha1::{Digest, Sha1};

use crate::adapter::HeaderList;
use crate::headers;

const WEBSOCKET_GUID: &str = "258EAFA5-E914-47DA-95CA-C5AB0DC85B11";

/// Whether the bytes seen so far on a freshly accepted connection are the
/// HTTP/2 connection preface, ordinary HTTP/1 traffic, or too short to
/// tell yet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PrefaceDetection {
    Http2,
    Http1,
    NeedMoreData,
}

/// Detects h2c via prior knowledge (§3.4): the client simply starts with
/// the connection preface instead of an HTTP/1 request line. See
/// [`detect_h2c_upgrade`] for the other h2c path, negotiated through an
/// ordinary HTTP/1.1 request's `Upgrade: h2c` header instead.
pub fn detect_preface(buf: &[u8]) -> PrefaceDetection {
    let preface = crate::h2::frame::CONNECTION_PREFACE;
    let n = buf.len().min(preface.len());
    if buf[..n] != preface[..n] {
        return PrefaceDetection::Http1;
    }
    if buf.len() < preface.len() {
        PrefaceDetection::NeedMoreData
    } else {
        PrefaceDetection::Http2
    }
}

/// A validated `Upgrade: h2c` request (§3.2, §4.3): the client's initial
/// HTTP/2 SETTINGS, carried base64url-encoded in the `HTTP2-Settings`
/// header since no HTTP/2 frame has been exchanged yet.
#[derive(Debug, Clone)]
pub struct Http2Upgrade {
    pub settings: Vec<(u16, u32)>,
}

/// Checks an HTTP/1.1 request's headers for a well-formed `h2c` Upgrade:
/// `Connection: Upgrade, HTTP2-Settings`, `Upgrade: h2c`, and a decodable
/// `HTTP2-Settings` header. Returns `Ok(None)` when this isn't an h2c
/// upgrade attempt at all, and `Err(())` when it looks like one but is
/// malformed.
pub fn detect_h2c_upgrade(headers: &HeaderList) -> Result<Option<Http2Upgrade>, ()> {
    let connection = match headers.iter().find(|(n, _)| n == "connection") {
        Some((_, v)) => v,
        None => return Ok(None),
    };
    if !headers::is_upgrade(connection) || !connection_has_token(connection, "http2-settings") {
        return Ok(None);
    }

    let upgrades_to_h2c =
        headers.iter().find(|(n, _)| n == "upgrade").map(|(_, v)| v.eq_ignore_ascii_case(b"h2c")).unwrap_or(false);
    if !upgrades_to_h2c {
        return Ok(None); // Upgrade to something else; not our concern
    }

    let raw = headers.iter().find(|(n, _)| n == "http2-settings").map(|(_, v)| v.as_slice()).ok_or(())?;
    let decoded = std::str::from_utf8(raw).ok().and_then(base64url_decode).ok_or(())?;
    if decoded.len() % 6 != 0 {
        return Err(());
    }
    Ok(Some(Http2Upgrade { settings: crate::h2::frame::parse_settings_payload(&decoded) }))
}

fn connection_has_token(val: &[u8], token: &str) -> bool {
    std::str::from_utf8(val)
        .map(|s| s.split(',').any(|t| t.trim().eq_ignore_ascii_case(token)))
        .unwrap_or(false)
}

/// Decodes unpadded base64url (RFC 4648 §5), the encoding the `HTTP2-Settings`
/// header is defined to use.
fn base64url_decode(s: &str) -> Option<Vec<u8>> {
    fn digit(b: u8) -> Option<u8> {
        match b {
            b'A'..=b'Z' => Some(b - b'A'),
            b'a'..=b'z' => Some(b - b'a' + 26),
            b'0'..=b'9' => Some(b - b'0' + 52),
            b'-' => Some(62),
            b'_' => Some(63),
            _ => None,
        }
    }
    let digits: Vec<u8> = s.bytes().filter(|&b| b != b'=').collect();
    let mut out = Vec::with_capacity(digits.len() * 3 / 4);
    for chunk in digits.chunks(4) {
        if chunk.len() == 1 {
            return None; // a lone leftover digit can't encode a full byte
        }
        let mut v = [0u8; 4];
        for (i, &b) in chunk.iter().enumerate() {
            v[i] = digit(b)?;
        }
        let n = (v[0] as u32) << 18 | (v[1] as u32) << 12 | (v[2] as u32) << 6 | v[3] as u32;
        out.push((n >> 16) as u8);
        if chunk.len() > 2 {
            out.push((n >> 8) as u8);
        }
        if chunk.len() > 3 {
            out.push(n as u8);
        }
    }
    Some(out)
}

/// A validated WebSocket handshake request, ready to answer with a 101.
#[derive(Debug, Clone)]
pub struct WebSocketHandshake {
    pub accept: String,
    pub protocols: Vec<String>,
    pub extensions: Vec<String>,
}

/// Checks an HTTP/1.1 request's headers for a well-formed WebSocket
/// upgrade (RFC 6455 §4.2.1). Returns `Ok(None)` when this isn't a
/// WebSocket request at all (no point rejecting an ordinary request over
/// it), and `Err(())` when it looks like an attempt but is malformed.
pub fn detect_websocket(headers: &HeaderList, has_body: bool) -> Result<Option<WebSocketHandshake>, ()> {
    let connection_upgrades = headers
        .iter()
        .find(|(n, _)| n == "connection")
        .map(|(_, v)| headers::is_upgrade(v))
        .unwrap_or(false);
    if !connection_upgrades {
        return Ok(None);
    }

    let mut saw_upgrade_websocket = false;
    let mut saw_version_13 = false;
    let mut key = None;
    let mut protocols = Vec::new();
    let mut extensions = Vec::new();

    for (name, value) in headers {
        match name.as_str() {
            "upgrade" => {
                if !value.eq_ignore_ascii_case(b"websocket") {
                    return Ok(None); // Upgrade to something else; not our concern
                }
                saw_upgrade_websocket = true;
            }
            "sec-websocket-key" => {
                if key.is_some() {
                    return Err(());
                }
                key = Some(value.clone());
            }
            "sec-websocket-version" => {
                if trim(value) != b"13" {
                    return Err(());
                }
                saw_version_13 = true;
            }
            "sec-websocket-protocol" => extend_tokens(&mut protocols, value),
            "sec-websocket-extensions" => extend_tokens(&mut extensions, value),
            _ => {}
        }
    }

    if has_body || !saw_upgrade_websocket || !saw_version_13 {
        return Err(());
    }
    let key = key.ok_or(())?;
    Ok(Some(WebSocketHandshake { accept: accept_value(&key), protocols, extensions }))
}

fn trim(x: &[u8]) -> &[u8] {
    let start = x.iter().position(|b| !b.is_ascii_whitespace()).unwrap_or(x.len());
    let end = x.iter().rposition(|b| !b.is_ascii_whitespace()).map(|i| i + 1).unwrap_or(start);
    &x[start..end]
}

fn extend_tokens(out: &mut Vec<String>, value: &[u8]) {
    if let Ok(s) = std::str::from_utf8(value) {
        out.extend(s.split(',').map(str::trim).filter(|t| !t.is_empty()).map(str::to_string));
    }
}

/// Computes `Sec-WebSocket-Accept` from the client's `Sec-WebSocket-Key`.
fn accept_value(key: &[u8]) -> String {
    let mut hasher = Sha1::new();
    hasher.update(trim(key));
    hasher.update(WEBSOCKET_GUID.as_bytes());
    base64_encode(&hasher.finalize())
}

fn base64_encode(digest: &[u8]) -> String {
    const CHARS: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789+/";
    let mut out = String::with_capacity(28);
    for chunk in digest.chunks(3) {
        let b = [chunk[0], *chunk.get(1).unwrap_or(&0), *chunk.get(2).unwrap_or(&0)];
        let n = (b[0] as usize) << 16 | (b[1] as usize) << 8 | b[2] as usize;
        out.push(CHARS[(n >> 18) & 63] as char);
        out.push(CHARS[(n >> 12) & 63] as char);
        out.push(if chunk.len() > 1 { CHARS[(n >> 6) & 63] as char } else { '=' });
        out.push(if chunk.len() > 2 { CHARS[n & 63] as char } else { '=' });
    }
    out
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn computes_rfc6455_example_accept() {
        // The example key/accept pair from RFC 6455 §1.3.
        assert_eq!(accept_value(b"dGhlIHNhbXBsZSBub25jZQ=="), "s3pPLMBiTxaQ9kYGzzhZRbK+xOo=");
    }

    #[test]
    fn recognizes_well_formed_handshake() {
        let headers: HeaderList = vec![
            ("connection".to_string(), b"Upgrade".to_vec()),
            ("upgrade".to_string(), b"websocket".to_vec()),
            ("sec-websocket-key".to_string(), b"dGhlIHNhbXBsZSBub25jZQ==".to_vec()),
            ("sec-websocket-version".to_string(), b"13".to_vec()),
        ];
        let handshake = detect_websocket(&headers, false).unwrap().unwrap();
        assert_eq!(handshake.accept, "s3pPLMBiTxaQ9kYGzzhZRbK+xOo=");
    }

    #[test]
    fn ignores_non_websocket_upgrade() {
        let headers: HeaderList =
            vec![("connection".to_string(), b"Upgrade".to_vec()), ("upgrade".to_string(), b"h2c".to_vec())];
        assert!(detect_websocket(&headers, false).unwrap().is_none());
    }

    #[test]
    fn rejects_wrong_version() {
        let headers: HeaderList = vec![
            ("connection".to_string(), b"Upgrade".to_vec()),
            ("upgrade".to_string(), b"websocket".to_vec()),
            ("sec-websocket-key".to_string(), b"dGhlIHNhbXBsZSBub25jZQ==".to_vec()),
            ("sec-websocket-version".to_string(), b"8".to_vec()),
        ];
        assert!(detect_websocket(&headers, false).is_err());
    }

    #[test]
    fn detects_h2_preface_incrementally() {
        let preface = crate::h2::frame::CONNECTION_PREFACE;
        assert_eq!(detect_preface(&preface[..3]), PrefaceDetection::NeedMoreData);
        assert_eq!(detect_preface(preface), PrefaceDetection::Http2);
        assert_eq!(detect_preface(b"GET / HTTP/1.1\r\n"), PrefaceDetection::Http1);
    }

    #[test]
    fn decodes_unpadded_base64url() {
        assert_eq!(base64url_decode("").unwrap(), b"");
        assert_eq!(base64url_decode("AAAAAA").unwrap(), [0u8; 6]);
        // a single SETTINGS_HEADER_TABLE_SIZE=100 pair, base64url of the
        // six raw bytes 00 01 00 00 00 64
        assert_eq!(base64url_decode("AAEAAABk").unwrap(), [0x00, 0x01, 0x00, 0x00, 0x00, 0x64]);
    }

    #[test]
    fn recognizes_well_formed_h2c_upgrade() {
        let headers: HeaderList = vec![
            ("connection".to_string(), b"Upgrade, HTTP2-Settings".to_vec()),
            ("upgrade".to_string(), b"h2c".to_vec()),
            ("http2-settings".to_string(), b"AAEAAABk".to_vec()),
        ];
        let upgrade = detect_h2c_upgrade(&headers).unwrap().unwrap();
        assert_eq!(upgrade.settings, vec![(crate::h2::frame::settings_id::HEADER_TABLE_SIZE, 100)]);
    }

    #[test]
    fn ignores_non_h2c_upgrade() {
        let headers: HeaderList =
            vec![("connection".to_string(), b"Upgrade".to_vec()), ("upgrade".to_string(), b"websocket".to_vec())];
        assert!(detect_h2c_upgrade(&headers).unwrap().is_none());
    }

    #[test]
    fn rejects_h2c_upgrade_missing_settings_header() {
        let headers: HeaderList = vec![
            ("connection".to_string(), b"Upgrade, HTTP2-Settings".to_vec()),
            ("upgrade".to_string(), b"h2c".to_vec()),
        ];
        assert!(detect_h2c_upgrade(&headers).is_err());
    }
}

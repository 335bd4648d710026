use crate::config::Config;
use crate::h1::body::{merge_content_length, resolve, BodyMode};
use crate::h1::error::Error;
use crate::h1::request_target::RequestTarget;
use crate::headers;
use crate::version::Version;

const MIN_HEADERS: usize = 16;

/// An owned request line + headers, once fully parsed off the wire.
///
/// Header names are lowercased; values are kept verbatim (bytes, since
/// HTTP allows non-UTF-8 opaque values).
#[derive(Debug, Clone)]
pub struct ParsedHead {
    pub method: String,
    pub path: String,
    pub query: Option<String>,
    pub version: Version,
    pub headers: Vec<(String, Vec<u8>)>,
    pub body_mode: BodyMode,
    pub is_head: bool,
    pub expect_continue: bool,
    pub connection_close: bool,
    pub host: Option<String>,
}

/// Attempt to parse a complete request line + headers from the front of
/// `buf`. Returns `Ok(None)` when more bytes are needed, `Ok(Some((head,
/// consumed)))` on success.
pub fn parse_head(buf: &[u8], cfg: &Config) -> Result<Option<(ParsedHead, usize)>, Error> {
    if let Some(line_end) = buf.iter().position(|&b| b == b'\n') {
        if line_end + 1 > cfg.max_request_line_length {
            return Err(Error::RequestLineTooLong);
        }
    } else if buf.len() > cfg.max_request_line_length {
        return Err(Error::RequestLineTooLong);
    }

    let mut small = [httparse::EMPTY_HEADER; MIN_HEADERS];
    let mut big;
    let mut raw = httparse::Request::new(&mut small);
    let mut result = raw.parse(buf);
    if matches!(result, Err(httparse::Error::TooManyHeaders)) {
        big = vec![httparse::EMPTY_HEADER; cfg.max_header_count.max(MIN_HEADERS)];
        raw = httparse::Request::new(&mut big);
        result = raw.parse(buf);
    }
    let consumed = match result? {
        httparse::Status::Complete(n) => n,
        httparse::Status::Partial => return Ok(None),
    };

    if raw.headers.len() > cfg.max_header_count {
        return Err(Error::HeadersTooLarge);
    }
    for h in raw.headers.iter() {
        if h.name.len() > cfg.max_header_key_length || h.value.len() > cfg.max_header_length {
            return Err(Error::HeadersTooLarge);
        }
    }

    let method = raw.method.ok_or(Error::Parse(httparse::Error::Token))?.to_string();
    let is_head = method.eq_ignore_ascii_case("HEAD");
    let target_str = raw.path.ok_or(Error::Parse(httparse::Error::Token))?;
    let target = RequestTarget::parse(target_str).ok_or(Error::BadRequestTarget)?;
    let (path, query) = match target {
        RequestTarget::Origin(p) => {
            let (path, query) = RequestTarget::path_and_query(p);
            (path.to_string(), query.map(str::to_string))
        }
        RequestTarget::Absolute { path, .. } => {
            let (path, query) = RequestTarget::path_and_query(path);
            (path.to_string(), query.map(str::to_string))
        }
        RequestTarget::Authority(a) => (a.to_string(), None),
        RequestTarget::Asterisk => ("*".to_string(), None),
    };

    let version = match raw.version.unwrap_or(1) {
        0 => Version::Http10,
        _ => Version::Http11,
    };

    let mut content_length = None;
    let mut chunked = false;
    let mut connection_close = version == Version::Http10;
    let mut expect_continue = false;
    let mut host = None;
    let mut host_seen = false;
    let mut owned_headers = Vec::with_capacity(raw.headers.len());

    for h in raw.headers.iter() {
        let name_lower = h.name.to_ascii_lowercase();
        match name_lower.as_str() {
            "transfer-encoding" if headers::is_chunked(h.value) => chunked = true,
            "content-length" => merge_content_length(&mut content_length, h.value)?,
            "connection" if headers::is_close(h.value) => connection_close = true,
            "host" => {
                if host_seen {
                    return Err(Error::DuplicateHost);
                }
                host_seen = true;
                host = Some(std::str::from_utf8(h.value).map_err(|_| Error::HostInvalid)?.to_string());
            }
            "expect" if headers::is_continue(h.value) => expect_continue = true,
            _ => {}
        }
        owned_headers.push((name_lower, h.value.to_vec()));
    }

    let body_mode = resolve(content_length, chunked)?;
    if chunked && content_length.is_some() {
        connection_close = true;
    }

    Ok(Some((
        ParsedHead {
            method,
            path,
            query,
            version,
            headers: owned_headers,
            body_mode,
            is_head,
            expect_continue,
            connection_close,
            host,
        },
        consumed,
    )))
}

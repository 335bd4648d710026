/// Parsed form of the HTTP/1 request-target (RFC 9112 §3.2).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestTarget<'a> {
    /// Usual form: `/hello?name=world`.
    Origin(&'a str),
    /// Full URL form: `http://example.com:8080/hello`.
    ///
    /// Unlike `Origin`, `path` here may be empty (never starts implied-`/`).
    Absolute {
        scheme: &'a str,
        authority: &'a str,
        path: &'a str,
    },
    /// Bare authority, only valid for `CONNECT`: `example.com:8080`.
    Authority(&'a str),
    /// The asterisk form, only valid for `OPTIONS`: `*`.
    Asterisk,
}

// Authority can't contain `/`, `?`, `#`, or `@` (no userinfo in HTTP).
fn authority_end(&b: &u8) -> bool {
    matches!(b, b'/' | b'?' | b'#' | b'@')
}

impl<'a> RequestTarget<'a> {
    pub fn parse(s: &'a str) -> Option<RequestTarget<'a>> {
        if s.is_empty() {
            return None;
        }
        if s.starts_with('/') {
            return Some(RequestTarget::Origin(s));
        }
        if s == "*" {
            return Some(RequestTarget::Asterisk);
        }
        for (scheme, prefix_len) in [("http", 7), ("https", 8)] {
            if s.len() >= prefix_len && s[..prefix_len].eq_ignore_ascii_case(&format!("{scheme}://")) {
                let rest = &s[prefix_len..];
                let auth_end = rest.as_bytes().iter().position(authority_end).unwrap_or(rest.len());
                return Some(RequestTarget::Absolute {
                    scheme,
                    authority: &rest[..auth_end],
                    path: &rest[auth_end..],
                });
            }
        }
        if s.as_bytes().iter().all(|b| !authority_end(b)) {
            return Some(RequestTarget::Authority(s));
        }
        None
    }

    /// Split the origin/absolute path into `(path, query)`.
    pub fn path_and_query(path_with_query: &str) -> (&str, Option<&str>) {
        match path_with_query.split_once('?') {
            Some((path, query)) => (path, Some(query)),
            None => (path_with_query, None),
        }
    }
}

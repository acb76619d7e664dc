//! Incremental HTTP/1.1 request-line and header-block parser.
//!
//! `feed` may be called with arbitrarily small slices of the wire; parsing is done line by line
//! so that the same header block split any number of ways always produces the same result
//! (request-line fields, header list, upgrade flag).

use crate::error::CoreError;
use crate::limits::ServerLimits;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    AwaitRequestLine,
    AwaitHeaders,
    Complete,
}

/// Tri-state record of whether the Connection header announced an upgrade.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpgradeFlag {
    Unknown,
    Yes,
    No,
}

#[derive(Debug, Default)]
pub struct RequestLine {
    pub method: String,
    pub version: String,
    pub path: String,
    pub query: String,
}

#[derive(Debug)]
pub struct HeaderParser {
    state: State,
    limits: ServerLimits,
    line_buf: Vec<u8>,
    header_block_size: usize,
    request_line: RequestLine,
    headers: Vec<(Vec<u8>, Vec<u8>)>,
    upgrade_flag: UpgradeFlag,
    upgrade_target: Option<(Vec<u8>, Vec<u8>)>,
}

impl HeaderParser {
    pub fn new(limits: ServerLimits) -> Self {
        Self {
            state: State::AwaitRequestLine,
            limits,
            line_buf: Vec::new(),
            header_block_size: 0,
            request_line: RequestLine::default(),
            headers: Vec::new(),
            upgrade_flag: UpgradeFlag::Unknown,
            upgrade_target: None,
        }
    }

    pub fn is_complete(&self) -> bool {
        self.state == State::Complete
    }

    pub fn method(&self) -> &str {
        &self.request_line.method
    }

    pub fn version(&self) -> &str {
        &self.request_line.version
    }

    pub fn path(&self) -> &str {
        &self.request_line.path
    }

    pub fn query(&self) -> &str {
        &self.request_line.query
    }

    pub fn headers(&self) -> &[(Vec<u8>, Vec<u8>)] {
        &self.headers
    }

    pub fn upgrade_flag(&self) -> UpgradeFlag {
        self.upgrade_flag
    }

    pub fn upgrade_target(&self) -> Option<&(Vec<u8>, Vec<u8>)> {
        self.upgrade_target.as_ref()
    }

    /// Feed the next chunk of bytes off the wire. Returns the number of bytes consumed; any
    /// trailing bytes once `is_complete()` becomes true belong to the body or the next frame and
    /// are left for the caller.
    pub fn feed(&mut self, data: &[u8]) -> Result<usize, CoreError> {
        let mut consumed = 0;

        for (i, &byte) in data.iter().enumerate() {
            if self.state == State::Complete {
                return Ok(consumed);
            }

            consumed = i + 1;
            self.header_block_size += 1;
            if self.header_block_size > self.limits.max_header_block() {
                return Err(CoreError::ParseError("header block too large".into()));
            }

            if byte == b'\n' {
                let mut line = std::mem::take(&mut self.line_buf);
                if line.last() == Some(&b'\r') {
                    line.pop();
                }
                self.process_line(&line)?;
            } else {
                self.line_buf.push(byte);
                if self.line_buf.len() > self.limits.max_request_line() {
                    return Err(CoreError::ParseError("line too long".into()));
                }
            }
        }

        Ok(consumed)
    }

    fn process_line(&mut self, line: &[u8]) -> Result<(), CoreError> {
        match self.state {
            State::AwaitRequestLine => {
                let text = std::str::from_utf8(line)
                    .map_err(|_| CoreError::ParseError("request line not ASCII/UTF-8".into()))?;
                let mut parts = text.splitn(3, ' ');
                let (method, target, version) = match (parts.next(), parts.next(), parts.next()) {
                    (Some(m), Some(t), Some(v)) if !m.is_empty() && !v.is_empty() => (m, t, v),
                    _ => return Err(CoreError::ParseError("malformed request line".into())),
                };
                if !version.starts_with("HTTP/") {
                    return Err(CoreError::ParseError("unsupported HTTP version".into()));
                }
                let (path, query) = match target.split_once('?') {
                    Some((p, q)) => (p, q),
                    None => (target, ""),
                };
                self.request_line = RequestLine {
                    method: method.to_string(),
                    version: version.to_string(),
                    path: path.to_string(),
                    query: query.to_string(),
                };
                self.state = State::AwaitHeaders;
                Ok(())
            }
            State::AwaitHeaders => {
                if line.is_empty() {
                    self.state = State::Complete;
                    return Ok(());
                }
                let sep = line
                    .iter()
                    .position(|&b| b == b':')
                    .ok_or_else(|| CoreError::ParseError("header line missing colon".into()))?;
                let name = line[..sep].to_vec();
                let value = trim_ascii(&line[sep + 1..]).to_vec();

                if self.headers.len() + 1 > self.limits.max_headers() {
                    return Err(CoreError::ParseError("too many headers".into()));
                }

                if self.upgrade_flag == UpgradeFlag::Unknown && name.eq_ignore_ascii_case(b"connection")
                {
                    let lowered = value.to_ascii_lowercase();
                    self.upgrade_flag = if contains_token(&lowered, b"upgrade") {
                        UpgradeFlag::Yes
                    } else {
                        UpgradeFlag::No
                    };
                } else if self.upgrade_flag == UpgradeFlag::Yes
                    && self.upgrade_target.is_none()
                    && name.eq_ignore_ascii_case(b"upgrade")
                {
                    self.upgrade_target = Some((name.clone(), value.clone()));
                }

                self.headers.push((name, value));
                Ok(())
            }
            State::Complete => Ok(()),
        }
    }
}

fn trim_ascii(bytes: &[u8]) -> &[u8] {
    let start = bytes.iter().position(|b| !b.is_ascii_whitespace()).unwrap_or(bytes.len());
    let end = bytes.iter().rposition(|b| !b.is_ascii_whitespace()).map_or(start, |p| p + 1);
    &bytes[start..end]
}

fn contains_token(haystack: &[u8], token: &[u8]) -> bool {
    haystack
        .split(|&b| b == b',')
        .any(|part| trim_ascii(part) == token)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse_all(chunks: &[&[u8]]) -> HeaderParser {
        let mut parser = HeaderParser::new(ServerLimits::new());
        for chunk in chunks {
            parser.feed(chunk).unwrap();
        }
        parser
    }

    #[test]
    fn chunked_feeding_equivalence() {
        let whole = b"GET /foo?bar=1 HTTP/1.1\r\nHost: localhost:8000\r\nConnection: keep-alive\r\n\r\n";
        let one_shot = parse_all(&[whole]);

        let mut split = Vec::new();
        for byte in whole {
            split.push(std::slice::from_ref(byte));
        }
        let refs: Vec<&[u8]> = split.iter().map(|s| *s).collect();
        let byte_by_byte = parse_all(&refs);

        assert_eq!(one_shot.method(), byte_by_byte.method());
        assert_eq!(one_shot.path(), byte_by_byte.path());
        assert_eq!(one_shot.query(), byte_by_byte.query());
        assert_eq!(one_shot.headers(), byte_by_byte.headers());
        assert_eq!(one_shot.upgrade_flag(), byte_by_byte.upgrade_flag());
        assert!(one_shot.is_complete());
    }

    #[test]
    fn parses_method_path_query_version() {
        let parser = parse_all(&[b"GET /foo?bar=1 HTTP/1.1\r\nHost: x\r\n\r\n"]);
        assert_eq!(parser.method(), "GET");
        assert_eq!(parser.path(), "/foo");
        assert_eq!(parser.query(), "bar=1");
        assert_eq!(parser.version(), "HTTP/1.1");
    }

    #[test]
    fn upgrade_recognized_with_token_among_others() {
        let parser = parse_all(&[
            b"GET /ws HTTP/1.1\r\nConnection: keep-alive, upgrade\r\nUpgrade: websocket\r\n\r\n",
        ]);
        assert_eq!(parser.upgrade_flag(), UpgradeFlag::Yes);
        assert_eq!(
            parser.upgrade_target(),
            Some(&(b"Upgrade".to_vec(), b"websocket".to_vec()))
        );
    }

    #[test]
    fn upgrade_header_without_connection_token_is_ignored() {
        let parser = parse_all(&[
            b"GET /ws HTTP/1.1\r\nConnection: keep-alive\r\nUpgrade: websocket\r\n\r\n",
        ]);
        assert_eq!(parser.upgrade_flag(), UpgradeFlag::No);
        assert_eq!(parser.upgrade_target(), None);
    }

    #[test]
    fn header_order_and_case_are_preserved() {
        let parser = parse_all(&[b"GET / HTTP/1.1\r\nX-Custom-Header: Some Value\r\nhost: x\r\n\r\n"]);
        assert_eq!(
            parser.headers(),
            &[
                (b"X-Custom-Header".to_vec(), b"Some Value".to_vec()),
                (b"host".to_vec(), b"x".to_vec()),
            ]
        );
    }

    #[test]
    fn missing_colon_is_parse_error() {
        let mut parser = HeaderParser::new(ServerLimits::new());
        let err = parser.feed(b"GET / HTTP/1.1\r\nbroken-header\r\n\r\n").unwrap_err();
        assert!(matches!(err, CoreError::ParseError(_)));
    }

    #[test]
    fn malformed_request_line_is_parse_error() {
        let mut parser = HeaderParser::new(ServerLimits::new());
        let err = parser.feed(b"GET /\r\n\r\n").unwrap_err();
        assert!(matches!(err, CoreError::ParseError(_)));
    }
}

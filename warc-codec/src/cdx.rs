// Copyright 2025 Janek Bevendorff
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! CDX index line generation.
//!
//! A CDX line is a flat, space-separated list of fields describing one
//! archived response. Which fields appear, and in which order, is given by
//! the CDX header line (e.g. `" CDX N b a m s k r M S V g"`).

use tracing::{trace, warn};
use url::Url;

use crate::error::{Error, Result};
use crate::header::*;
use crate::http::HttpResponse;
use crate::record::{Record, RecordType};
use crate::writer::RecordSpan;

pub const MASSAGED_URL: char = 'N';
pub const META_TAGS: char = 'M';
pub const COMPRESSED_SIZE: char = 'S';
pub const COMPRESSED_OFFSET: char = 'V';
pub const ORIGINAL_URL: char = 'a';
pub const DATE: char = 'b';
pub const IP: char = 'e';
pub const FILE_NAME: char = 'g';
pub const ORIGINAL_HOST: char = 'h';
pub const DIGEST: char = 'k';
pub const MIME_TYPE: char = 'm';
pub const UNCOMPRESSED_SIZE: char = 'n';
pub const PORT: char = 'o';
pub const ORIGINAL_PATH: char = 'p';
pub const REDIRECT: char = 'r';
pub const RESPONSE_CODE: char = 's';
pub const UUID: char = 'u';
pub const UNCOMPRESSED_OFFSET: char = 'v';

const PLACEHOLDER: &str = "-";

/// Ordered set of CDX field codes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CdxFormat {
    fields: Vec<char>,
}

impl CdxFormat {
    pub fn new(fields: impl IntoIterator<Item = char>) -> Self {
        CdxFormat {
            fields: fields.into_iter().collect(),
        }
    }

    /// Parse a CDX header line such as `" CDX N b a m s k r M S V g"`.
    ///
    /// The leading `CDX` keyword is optional. Every other token must be a
    /// single character.
    pub fn parse(header: &str) -> Result<Self> {
        let mut tokens = header.split_whitespace().peekable();
        if tokens.peek() == Some(&"CDX") {
            tokens.next();
        }
        let fields = tokens
            .map(|t| {
                let mut chars = t.chars();
                match (chars.next(), chars.next()) {
                    (Some(c), None) => Ok(c),
                    _ => Err(Error::InvalidField {
                        field: "CDX header",
                        value: t.to_string(),
                    }),
                }
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(CdxFormat { fields })
    }

    pub fn fields(&self) -> &[char] {
        &self.fields
    }

    /// Position of a field code in the line, `None` if not part of this format.
    pub fn index_of(&self, code: char) -> Option<usize> {
        self.fields.iter().position(|&c| c == code)
    }

    /// CDX header line for this format, without line terminator.
    pub fn header_line(&self) -> String {
        let mut line = String::from(" CDX");
        for c in &self.fields {
            line.push(' ');
            line.push(*c);
        }
        line
    }

    /// A line with every field set to the `-` placeholder.
    pub fn empty_line(&self) -> Vec<String> {
        vec![PLACEHOLDER.to_string(); self.fields.len()]
    }

    /// Fill the fields only known to the writer of the archive.
    ///
    /// # Arguments
    ///
    /// * `line` - output line
    /// * `filename` - archive file name
    /// * `span` - record location as reported by the [`Writer`](crate::Writer)
    /// * `compressed` - whether the archive was written with per-record compression
    pub fn fill_location(&self, line: &mut [String], filename: &str, span: &RecordSpan, compressed: bool) {
        let mut set = |code: char, value: String| {
            if let Some(field) = self.index_of(code).and_then(|i| line.get_mut(i)) {
                *field = value;
            }
        };
        set(FILE_NAME, filename.to_string());
        if compressed {
            set(COMPRESSED_SIZE, span.compressed_len().to_string());
            set(COMPRESSED_OFFSET, span.start.to_string());
        } else {
            set(UNCOMPRESSED_SIZE, span.bytes_written.to_string());
            set(UNCOMPRESSED_OFFSET, span.start.to_string());
        }
    }
}

/// Per-call cache of the values derived from a record.
struct Derived<'a> {
    record: &'a Record,
    target_uri: Option<Option<Url>>,
    response: Option<Option<HttpResponse>>,
    errors: Vec<Error>,
}

impl<'a> Derived<'a> {
    fn new(record: &'a Record) -> Self {
        Derived {
            record,
            target_uri: None,
            response: None,
            errors: Vec::new(),
        }
    }

    fn target_uri(&mut self) -> Option<&Url> {
        if self.target_uri.is_none() {
            let parsed = self.record.target_uri().map(bare_uri).and_then(|uri| {
                Url::parse(uri)
                    .map_err(|source| {
                        self.errors.push(Error::InvalidTargetUri {
                            uri: uri.to_string(),
                            source,
                        })
                    })
                    .ok()
            });
            self.target_uri = Some(parsed);
        }
        self.target_uri.as_ref().and_then(Option::as_ref)
    }

    /// Port written in the target URI, including default ports the parsed URL has dropped.
    fn explicit_port(&self) -> Option<u16> {
        self.record.target_uri().map(bare_uri).and_then(explicit_port)
    }

    fn response(&mut self) -> Option<&HttpResponse> {
        if self.response.is_none() {
            let parsed = HttpResponse::parse(self.record.content())
                .map_err(|e| self.errors.push(e))
                .ok();
            self.response = Some(parsed);
        }
        self.response.as_ref().and_then(Option::as_ref)
    }
}

fn non_empty(value: Option<impl Into<String>>) -> String {
    value
        .map(Into::into)
        .filter(|s: &String| !s.is_empty())
        .unwrap_or_else(|| PLACEHOLDER.to_string())
}

impl Record {
    /// Fill the CDX fields derivable from this record into `line`.
    ///
    /// Only response records are indexed. For any other record type, `line`
    /// is left unchanged and `Ok(())` is returned.
    ///
    /// Fields owned by the archive writer (`S`, `V`, `g`, `n`, `v`) are never
    /// touched, see [`CdxFormat::fill_location`]. Fields beyond the end of
    /// `line` are ignored.
    ///
    /// # Errors
    ///
    /// If the target URI or the HTTP response cannot be parsed, or the format
    /// contains unknown field codes, all other fields are still filled (using
    /// `-` for values that could not be derived) and the collected errors are
    /// returned afterwards.
    pub fn cdx_line(&self, format: &CdxFormat, line: &mut [String]) -> Result<()> {
        if self.record_type() != RecordType::Response {
            return Ok(());
        }

        let mut derived = Derived::new(self);
        for (idx, &code) in format.fields().iter().enumerate() {
            let value = match code {
                MASSAGED_URL => {
                    let port = derived.explicit_port();
                    non_empty(derived.target_uri().map(|u| massage(u, port.or(u.port()))))
                }
                META_TAGS => PLACEHOLDER.to_string(),
                ORIGINAL_URL => non_empty(self.target_uri()),
                DATE => non_empty(self.date().map(|d| d.timestamp().to_string())),
                IP => non_empty(self.headers().get(WARC_IP_ADDRESS)),
                ORIGINAL_HOST => non_empty(derived.target_uri().and_then(Url::host_str)),
                DIGEST => non_empty(self.headers().get(WARC_PAYLOAD_DIGEST)),
                MIME_TYPE => non_empty(derived.response().and_then(HttpResponse::content_type)),
                PORT => {
                    let port = derived.explicit_port();
                    non_empty(
                        derived
                            .target_uri()
                            .and_then(|u| port.or(u.port()).or_else(|| http_default_port(u.scheme())))
                            .map(|p| p.to_string()),
                    )
                }
                ORIGINAL_PATH => non_empty(derived.target_uri().map(Url::path)),
                REDIRECT => non_empty(
                    derived
                        .response()
                        .filter(|r| (300..400).contains(&r.status_code()))
                        .and_then(|r| r.get("Location")),
                ),
                RESPONSE_CODE => non_empty(derived.response().map(|r| r.status_code().to_string())),
                UUID => non_empty(self.headers().get(WARC_RECORD_ID)),
                COMPRESSED_SIZE | COMPRESSED_OFFSET | FILE_NAME | UNCOMPRESSED_SIZE | UNCOMPRESSED_OFFSET => {
                    continue
                }
                _ => {
                    warn!(code = %code, "unhandled CDX field");
                    derived.errors.push(Error::UnknownCdxField(code));
                    continue;
                }
            };
            if let Some(field) = line.get_mut(idx) {
                *field = value;
            }
        }

        trace!(id = self.id(), errors = derived.errors.len(), "generated CDX line");
        match Error::from_errors(derived.errors) {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}

/// Canonicalize a URL into its SURT-ordered "massaged" form used as CDX sort key.
///
/// Scheme, credentials and fragment are dropped, the host is lower-cased,
/// stripped of a leading `www.` (or `www2.`, ...) label and reversed. Port 80
/// of `http` and port 443 of `https` are removed. Path and query are
/// lower-cased, a trailing slash is removed from the path and the query
/// parameters are sorted.
///
/// A parsed [`Url`] no longer knows an explicit default port of other schemes
/// (`ftp://a.com:21/`), use [`massaged_uri`] to keep it.
///
/// ```
/// use url::Url;
/// use warc_codec::massaged_url;
///
/// let url = Url::parse("http://www.Example.com/Index.html?b=2&a=1").unwrap();
/// assert_eq!(massaged_url(&url), "com,example)/index.html?a=1&b=2");
/// ```
pub fn massaged_url(url: &Url) -> String {
    massage(url, url.port())
}

/// Canonicalize a URI string into its "massaged" form, see [`massaged_url`].
///
/// Ports written in the URI are kept unless they are the `http` or `https` default.
///
/// # Errors
///
/// [`Error::InvalidTargetUri`] if `uri` is not an absolute URL.
pub fn massaged_uri(uri: &str) -> Result<String> {
    let uri = bare_uri(uri);
    let url = Url::parse(uri).map_err(|source| Error::InvalidTargetUri {
        uri: uri.to_string(),
        source,
    })?;
    Ok(massage(&url, explicit_port(uri).or(url.port())))
}

fn massage(url: &Url, port: Option<u16>) -> String {
    let host = url.host_str().unwrap_or_default().to_ascii_lowercase();
    let host = strip_www(&host);
    let mut surt = host.split('.').rev().collect::<Vec<_>>().join(",");

    if let Some(port) = port.filter(|&p| http_default_port(url.scheme()) != Some(p)) {
        surt.push(':');
        surt.push_str(&port.to_string());
    }
    surt.push(')');

    let path = url.path().to_lowercase();
    let path = match path.as_str() {
        "/" => "/",
        p => p.strip_suffix('/').unwrap_or(p),
    };
    surt.push_str(path);

    if let Some(query) = url.query().filter(|q| !q.is_empty()) {
        let query = query.to_lowercase();
        let mut params: Vec<&str> = query.split('&').collect();
        params.sort_unstable();
        surt.push('?');
        surt.push_str(&params.join("&"));
    }
    surt
}

/// Target URI without the angle brackets some writers put around it.
fn bare_uri(uri: &str) -> &str {
    uri.trim_start_matches('<').trim_end_matches('>')
}

fn http_default_port(scheme: &str) -> Option<u16> {
    match scheme {
        "http" => Some(80),
        "https" => Some(443),
        _ => None,
    }
}

/// Port as written in the authority of `uri`.
fn explicit_port(uri: &str) -> Option<u16> {
    let (_, rest) = uri.split_once("://")?;
    let authority = rest.split(['/', '?', '#']).next()?;
    let host_port = authority.rsplit_once('@').map_or(authority, |(_, hp)| hp);
    let (host, port) = host_port.rsplit_once(':')?;
    // IPv6 literal without port
    if host.starts_with('[') && !host.ends_with(']') {
        return None;
    }
    port.parse().ok()
}

/// Strip a leading `www.` or `www<digits>.` label.
fn strip_www(host: &str) -> &str {
    let Some(rest) = host.strip_prefix("www") else {
        return host;
    };
    rest.trim_start_matches(|c: char| c.is_ascii_digit())
        .strip_prefix('.')
        .unwrap_or(host)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn response(target: &str, http: &[u8]) -> Record {
        let mut rec = Record::new(RecordType::Response);
        rec.headers_mut().set(WARC_TYPE, "response");
        rec.headers_mut().set(WARC_RECORD_ID, "<urn:uuid:11111111-2222-3333-4444-555555555555>");
        rec.headers_mut().set(WARC_DATE, "2000-01-01T00:00:00Z");
        rec.headers_mut().set(WARC_TARGET_URI, target);
        rec.headers_mut().set(WARC_IP_ADDRESS, "10.0.0.1");
        rec.headers_mut().set(WARC_PAYLOAD_DIGEST, "sha1:VGMT4NSHA2AWVOR6EVYXQUGCNSONBWE5");
        rec.set_content(http);
        rec
    }

    #[rstest]
    #[case("http://www2.Example.com:80/Path/", "com,example)/path")]
    #[case("https://a.com/x?b=2&a=1", "com,a)/x?a=1&b=2")]
    #[case("https://a.com:443/", "com,a)/")]
    #[case("http://example.com:8080/", "com,example:8080)/")]
    #[case("http://user:pw@www.example.org/a/B#frag", "org,example)/a/b")]
    #[case("http://wwwx.example.org/", "org,example,wwwx)/")]
    #[case("http://sub.www.example.org/", "org,example,www,sub)/")]
    #[case("http://example.com/?B=1&a=2&a=1", "com,example)/?a=1&a=2&b=1")]
    #[case("http://10.1.2.3/", "3,2,1,10)/")]
    #[case("ftp://a.com:21/x", "com,a:21)/x")]
    #[case("ws://a.com:80/x", "com,a:80)/x")]
    #[case("wss://a.com:443/x", "com,a:443)/x")]
    #[case("http://a.com:443/x", "com,a:443)/x")]
    #[case("ftp://a.com/x", "com,a)/x")]
    #[case("<http://a.com:8080/>", "com,a:8080)/")]
    fn test_massaged_uri(#[case] input: &str, #[case] expected: &str) {
        assert_eq!(massaged_uri(input).unwrap(), expected);
    }

    #[test]
    fn test_massaged_url_keeps_parsed_port() {
        let url = Url::parse("https://www.a.com:8443/X/").unwrap();
        assert_eq!(massaged_url(&url), "com,a:8443)/x");
        assert!(matches!(massaged_uri("a.com/x"), Err(Error::InvalidTargetUri { .. })));
    }

    #[rstest]
    #[case("http://a.com:21/", Some(21))]
    #[case("ftp://user:p:w@a.com:21/x?y=1:2", Some(21))]
    #[case("http://[::1]:8080/", Some(8080))]
    #[case("http://[::1]/", None)]
    #[case("http://a.com/x:80", None)]
    #[case("http://a.com:/", None)]
    fn test_explicit_port(#[case] uri: &str, #[case] expected: Option<u16>) {
        assert_eq!(explicit_port(uri), expected);
    }

    #[test]
    fn test_ports_of_other_schemes() {
        let format = CdxFormat::new([MASSAGED_URL, PORT]);
        let mut line = format.empty_line();
        response("ftp://a.com:21/x", b"HTTP/1.1 200 OK\r\n\r\n")
            .cdx_line(&format, &mut line)
            .unwrap();
        assert_eq!(line, vec!["com,a:21)/x", "21"]);

        let mut line = format.empty_line();
        response("ftp://a.com/x", b"HTTP/1.1 200 OK\r\n\r\n")
            .cdx_line(&format, &mut line)
            .unwrap();
        assert_eq!(line, vec!["com,a)/x", "-"]);

        let mut line = format.empty_line();
        response("https://a.com/x", b"HTTP/1.1 200 OK\r\n\r\n")
            .cdx_line(&format, &mut line)
            .unwrap();
        assert_eq!(line, vec!["com,a)/x", "443"]);
    }

    #[test]
    fn test_format_parse() {
        let format = CdxFormat::parse(" CDX N b a m s k r M S V g").unwrap();
        assert_eq!(format.fields().len(), 11);
        assert_eq!(format.index_of('N'), Some(0));
        assert_eq!(format.index_of('g'), Some(10));
        assert_eq!(format.index_of('z'), None);
        assert_eq!(format.header_line(), " CDX N b a m s k r M S V g");
        assert_eq!(CdxFormat::parse("a b s").unwrap(), CdxFormat::new(['a', 'b', 's']));
        assert!(CdxFormat::parse("CDX a bb").is_err());
    }

    #[test]
    fn test_cdx_line() {
        let rec = response(
            "http://www.example.com/Page?z=1",
            b"HTTP/1.1 200 OK\r\nContent-Type: text/html; charset=utf-8\r\n\r\n<html></html>",
        );
        let format = CdxFormat::parse("N a b e h k m o p r s u M").unwrap();
        let mut line = format.empty_line();
        rec.cdx_line(&format, &mut line).unwrap();
        assert_eq!(
            line,
            vec![
                "com,example)/page?z=1",
                "http://www.example.com/Page?z=1",
                "946684800",
                "10.0.0.1",
                "www.example.com",
                "sha1:VGMT4NSHA2AWVOR6EVYXQUGCNSONBWE5",
                "text/html",
                "80",
                "/Page",
                "-",
                "200",
                "<urn:uuid:11111111-2222-3333-4444-555555555555>",
                "-",
            ]
        );
    }

    #[test]
    fn test_redirect_only_for_3xx() {
        let format = CdxFormat::new([REDIRECT, RESPONSE_CODE]);
        let rec = response(
            "https://example.com/old",
            b"HTTP/1.1 302 Found\r\nLocation: https://example.com/new\r\n\r\n",
        );
        let mut line = format.empty_line();
        rec.cdx_line(&format, &mut line).unwrap();
        assert_eq!(line, vec!["https://example.com/new", "302"]);

        let rec = response(
            "https://example.com/old",
            b"HTTP/1.1 200 OK\r\nLocation: https://example.com/new\r\n\r\n",
        );
        let mut line = format.empty_line();
        rec.cdx_line(&format, &mut line).unwrap();
        assert_eq!(line, vec!["-", "200"]);
    }

    #[test]
    fn test_writer_fields_untouched() {
        let format = CdxFormat::parse("a S V g n v").unwrap();
        let rec = response("http://example.com/", b"HTTP/1.1 200 OK\r\n\r\n");
        let mut line = vec!["x".to_string(); 6];
        rec.cdx_line(&format, &mut line).unwrap();
        assert_eq!(line, vec!["http://example.com/", "x", "x", "x", "x", "x"]);

        let span = RecordSpan {
            start: 100,
            end: 160,
            bytes_written: 200,
        };
        format.fill_location(&mut line, "a.warc.gz", &span, true);
        assert_eq!(line, vec!["http://example.com/", "60", "100", "a.warc.gz", "x", "x"]);
        format.fill_location(&mut line, "a.warc", &span, false);
        assert_eq!(line[4..], ["200", "100"]);
    }

    #[test]
    fn test_non_response_records_are_skipped() {
        let mut rec = Record::new(RecordType::Request);
        rec.headers_mut().set(WARC_TARGET_URI, "http://example.com/");
        rec.set_content(&b"GET / HTTP/1.1\r\nHost: example.com\r\n\r\n"[..]);
        let format = CdxFormat::new(['a', 's', 'X']);
        let mut line = format.empty_line();
        rec.cdx_line(&format, &mut line).unwrap();
        assert!(line.iter().all(|f| f == "-"));
    }

    #[test]
    fn test_errors_are_accumulated() {
        let rec = response("not a url", b"garbage");
        let format = CdxFormat::new(['N', 'h', 's', 'm', 'b', 'X']);
        let mut line = vec![String::new(); 6];
        let err = rec.cdx_line(&format, &mut line).unwrap_err();

        // URL and HTTP parsing fail once each, plus the unknown field
        match err {
            Error::Multi(m) => {
                assert_eq!(m.errors().len(), 3);
                assert!(matches!(m.errors()[0], Error::InvalidTargetUri { .. }));
                assert!(matches!(m.errors()[1], Error::Http(_)));
                assert!(matches!(m.errors()[2], Error::UnknownCdxField('X')));
            }
            other => panic!("expected multi error, got {:?}", other),
        }
        assert_eq!(line[..5], ["-", "-", "-", "-", "946684800"]);
        assert_eq!(line[5], "");
    }

    #[test]
    fn test_single_error_is_not_wrapped() {
        let rec = response("http://example.com/", b"HTTP/1.1 200 OK\r\n\r\n");
        let format = CdxFormat::new(['s', 'Q']);
        let mut line = format.empty_line();
        assert!(matches!(
            rec.cdx_line(&format, &mut line),
            Err(Error::UnknownCdxField('Q'))
        ));
        assert_eq!(line[0], "200");
    }
}

//! # Header recognition
//!
//! Recognizes the header lines the proxy cares about, in both their long and
//! compact (RFC 3261 Section 7.3.3) forms, and pulls individual fields out of
//! them: URI user/host pairs, the Via `branch`, `rport` and `;tag` markers,
//! CSeq methods and registration lifetimes.
//!
//! Header names are matched case-insensitively. Header values are never
//! normalized: what is extracted is exactly what the user agent sent.
//!
//! ```rust
//! use sipline_core::headers::{classify, HeaderKind};
//!
//! let header = classify("v: SIP/2.0/UDP 10.0.0.1:5060;branch=z9hG4bK1;rport").unwrap();
//! assert_eq!(header.kind, HeaderKind::Via);
//! assert_eq!(sipline_core::headers::branch(header.line), Some("z9hG4bK1"));
//! assert!(sipline_core::headers::has_rport(header.line));
//! ```

use std::fmt;
use std::net::SocketAddr;

use once_cell::sync::Lazy;
use regex::Regex;

// URI with a user part: sip:user@host[:port]
static URI_REGEX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"sips?:([^@;>\s]*)@([^;>\s]*)").unwrap());
// URI without a user part: sip:host[:port]
static ADDR_REGEX: Lazy<Regex> = Lazy::new(|| Regex::new(r"sips?:([^;>\s]*)").unwrap());
static BRANCH_REGEX: Lazy<Regex> = Lazy::new(|| Regex::new(r";\s*branch=([^;,\s]+)").unwrap());
// rport with or without a value; the second group keeps the delimiter that follows
static RPORT_REGEX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i);\s*rport(?:=[^;,\s]*)?([;,\s]|$)").unwrap());
static TAG_REGEX: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i);\s*tag=").unwrap());
static EXPIRES_PARAM_REGEX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i);\s*expires=(\d+)").unwrap());
static REQUEST_LINE_REGEX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(\S+) sip:(\S+) SIP/2\.0").unwrap());
static STATUS_LINE_REGEX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^SIP/2\.0 (\d{3})(?:\s+(.*))?$").unwrap());
static CSEQ_REGEX: Lazy<Regex> = Lazy::new(|| Regex::new(r"^(\d+)\s+(\S+)").unwrap());

/// Header families the proxy inspects or rewrites
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HeaderKind {
    From,
    To,
    CallId,
    Contact,
    ContentLength,
    Via,
    Route,
    Expires,
    Subject,
    CSeq,
}

impl HeaderKind {
    pub const ALL: [HeaderKind; 10] = [
        HeaderKind::From,
        HeaderKind::To,
        HeaderKind::CallId,
        HeaderKind::Contact,
        HeaderKind::ContentLength,
        HeaderKind::Via,
        HeaderKind::Route,
        HeaderKind::Expires,
        HeaderKind::Subject,
        HeaderKind::CSeq,
    ];

    /// Canonical long name
    pub fn long_name(&self) -> &'static str {
        match self {
            HeaderKind::From => "From",
            HeaderKind::To => "To",
            HeaderKind::CallId => "Call-ID",
            HeaderKind::Contact => "Contact",
            HeaderKind::ContentLength => "Content-Length",
            HeaderKind::Via => "Via",
            HeaderKind::Route => "Route",
            HeaderKind::Expires => "Expires",
            HeaderKind::Subject => "Subject",
            HeaderKind::CSeq => "CSeq",
        }
    }

    /// Compact form, for the headers that have one
    pub fn compact_name(&self) -> Option<&'static str> {
        match self {
            HeaderKind::From => Some("f"),
            HeaderKind::To => Some("t"),
            HeaderKind::CallId => Some("i"),
            HeaderKind::Contact => Some("m"),
            HeaderKind::ContentLength => Some("l"),
            HeaderKind::Via => Some("v"),
            HeaderKind::Subject => Some("s"),
            HeaderKind::Route | HeaderKind::Expires | HeaderKind::CSeq => None,
        }
    }

    /// Look up a header name in either form, ignoring case
    pub fn from_name(name: &str) -> Option<HeaderKind> {
        Self::ALL.iter().copied().find(|kind| {
            kind.long_name().eq_ignore_ascii_case(name)
                || kind
                    .compact_name()
                    .map_or(false, |compact| compact.eq_ignore_ascii_case(name))
        })
    }
}

impl fmt::Display for HeaderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.long_name())
    }
}

/// A recognized header line, borrowed from the message
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HeaderLine<'a> {
    pub kind: HeaderKind,
    /// Header name exactly as written (long or compact)
    pub name: &'a str,
    /// Value with leading whitespace removed
    pub value: &'a str,
    /// The complete line
    pub line: &'a str,
}

impl<'a> HeaderLine<'a> {
    /// Whether the line was written in compact form
    pub fn is_compact(&self) -> bool {
        self.kind
            .compact_name()
            .map_or(false, |compact| compact.eq_ignore_ascii_case(self.name))
    }
}

/// Recognize `line` as one of the [`HeaderKind`] families.
///
/// Continuation lines (leading whitespace) and unknown headers yield `None`.
pub fn classify(line: &str) -> Option<HeaderLine<'_>> {
    if line.starts_with(char::is_whitespace) {
        return None;
    }
    let (name, value) = line.split_once(':')?;
    let name = name.trim_end();
    let kind = HeaderKind::from_name(name)?;
    Some(HeaderLine {
        kind,
        name,
        value: value.trim_start(),
        line,
    })
}

/// Whether `line` is a header of the given family
pub fn is_header(line: &str, kind: HeaderKind) -> bool {
    classify(line).map_or(false, |header| header.kind == kind)
}

/// `(user, host)` of the first `sip:user@host` URI in `text`.
///
/// The host keeps any port and stops at `;`, `>` or whitespace.
pub fn uri_parts(text: &str) -> Option<(&str, &str)> {
    URI_REGEX.captures(text).map(|caps| {
        let user = caps.get(1).map_or("", |m| m.as_str());
        let host = caps.get(2).map_or("", |m| m.as_str());
        (user, host)
    })
}

/// Address of the first `sip:` URI in `text`, used for URIs without a user part
pub fn bare_address(text: &str) -> Option<&str> {
    ADDR_REGEX
        .captures(text)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str())
        .filter(|addr| !addr.is_empty())
}

/// Address-of-record `user@host` for the URI found in `text`
pub fn address_of_record(text: &str) -> Option<String> {
    uri_parts(text).map(|(user, host)| format!("{}@{}", user, host))
}

/// Where a Contact line says the user agent can be reached.
///
/// For `sip:user@host` this is the host part; for `sip:host` the whole address.
pub fn contact_address(text: &str) -> Option<&str> {
    match uri_parts(text) {
        Some((_, host)) => Some(host),
        None => bare_address(text),
    }
}

/// Value of the Via `branch` parameter
pub fn branch(line: &str) -> Option<&str> {
    BRANCH_REGEX
        .captures(line)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str())
}

/// Whether a Via line carries an `rport` parameter, with or without a value
pub fn has_rport(line: &str) -> bool {
    RPORT_REGEX.is_match(line)
}

/// Whether a To/From line carries a `tag` parameter
pub fn has_tag(line: &str) -> bool {
    TAG_REGEX.is_match(line)
}

/// NAT annotation of a Via line with the address the message really came from.
///
/// An `rport` parameter is replaced in place by `received=<ip>;rport=<port>`;
/// without one, `;received=<ip>` is appended.
pub fn annotate_received(line: &str, source: SocketAddr) -> String {
    if has_rport(line) {
        let replacement = format!(";received={};rport={}${{1}}", source.ip(), source.port());
        RPORT_REGEX.replacen(line, 1, replacement.as_str()).into_owned()
    } else {
        format!("{};received={}", line, source.ip())
    }
}

/// The `expires=` parameter of a Contact line, in seconds
pub fn expires_param(line: &str) -> Option<u32> {
    EXPIRES_PARAM_REGEX
        .captures(line)
        .and_then(|caps| caps.get(1))
        .and_then(|m| m.as_str().parse().ok())
}

/// Method named by a CSeq header value (`314159 INVITE` -> `INVITE`)
pub fn cseq_method(value: &str) -> Option<&str> {
    CSEQ_REGEX
        .captures(value.trim())
        .and_then(|caps| caps.get(2))
        .map(|m| m.as_str())
}

/// Shape of a message's first line
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartLine<'a> {
    /// `METHOD sip:target SIP/2.0`
    Request { method: &'a str, target: &'a str },
    /// `SIP/2.0 code reason`
    Status { code: u16, reason: &'a str },
}

/// Recognize a request-line or status-line
pub fn parse_start_line(line: &str) -> Option<StartLine<'_>> {
    if let Some(caps) = REQUEST_LINE_REGEX.captures(line) {
        let method = caps.get(1)?.as_str();
        let target = caps.get(2)?.as_str();
        return Some(StartLine::Request { method, target });
    }
    let caps = STATUS_LINE_REGEX.captures(line)?;
    let code = caps.get(1)?.as_str().parse().ok()?;
    let reason = caps.get(2).map_or("", |m| m.as_str());
    Some(StartLine::Status { code, reason })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_long_and_compact_names() {
        for kind in HeaderKind::ALL {
            assert_eq!(HeaderKind::from_name(kind.long_name()), Some(kind));
            if let Some(compact) = kind.compact_name() {
                assert_eq!(HeaderKind::from_name(compact), Some(kind));
                assert_eq!(HeaderKind::from_name(&compact.to_uppercase()), Some(kind));
            }
        }
        assert_eq!(HeaderKind::from_name("via"), Some(HeaderKind::Via));
        assert_eq!(HeaderKind::from_name("CALL-ID"), Some(HeaderKind::CallId));
        assert_eq!(HeaderKind::from_name("Record-Route"), None);
        assert_eq!(HeaderKind::from_name("X-Custom"), None);
    }

    #[test]
    fn test_classify_lines() {
        let header = classify("From: \"Alice\" <sip:alice@atlanta.com>;tag=1928301774").unwrap();
        assert_eq!(header.kind, HeaderKind::From);
        assert_eq!(header.name, "From");
        assert_eq!(header.value, "\"Alice\" <sip:alice@atlanta.com>;tag=1928301774");
        assert!(!header.is_compact());

        let header = classify("l:0").unwrap();
        assert_eq!(header.kind, HeaderKind::ContentLength);
        assert_eq!(header.value, "0");
        assert!(header.is_compact());

        // Route must not swallow Record-Route
        assert!(classify("Record-Route: <sip:p1.example.com;lr>").is_none());
        assert!(is_header("Route: <sip:p1.example.com;lr>", HeaderKind::Route));

        assert!(classify(" continuation of previous header").is_none());
        assert!(classify("INVITE sip:bob@biloxi.com SIP/2.0").is_none());
        assert!(classify("").is_none());
    }

    #[test]
    fn test_uri_extraction() {
        assert_eq!(
            uri_parts("To: Bob <sip:bob@biloxi.com>"),
            Some(("bob", "biloxi.com"))
        );
        assert_eq!(
            uri_parts("f: <sip:alice@10.0.0.5:5062;transport=udp>;tag=88"),
            Some(("alice", "10.0.0.5:5062"))
        );
        assert_eq!(uri_parts("To: sip:carol@chicago.com"), Some(("carol", "chicago.com")));
        assert_eq!(uri_parts("Contact: <sip:10.0.0.5:5062>"), None);

        assert_eq!(
            address_of_record("From: <sip:alice@atlanta.com>;tag=1"),
            Some("alice@atlanta.com".to_string())
        );
        assert_eq!(address_of_record("From: anonymous"), None);
    }

    #[test]
    fn test_contact_address() {
        assert_eq!(
            contact_address("Contact: <sip:alice@192.0.2.4:5062;ob>"),
            Some("192.0.2.4:5062")
        );
        assert_eq!(contact_address("m: <sip:192.0.2.4:5062>"), Some("192.0.2.4:5062"));
        assert_eq!(contact_address("Contact: *"), None);
    }

    #[test]
    fn test_branch_and_rport() {
        let line = "Via: SIP/2.0/UDP pc33.atlanta.com;branch=z9hG4bK776asdhds;rport";
        assert_eq!(branch(line), Some("z9hG4bK776asdhds"));
        assert!(has_rport(line));

        assert!(has_rport("Via: SIP/2.0/UDP h;rport;branch=z9hG4bK1"));
        assert!(has_rport("Via: SIP/2.0/UDP h;rport=5060;branch=z9hG4bK1"));
        assert!(!has_rport("Via: SIP/2.0/UDP rport.example.com;branch=z9hG4bK1"));
        assert!(!has_rport("Via: SIP/2.0/UDP h;rportx;branch=z9hG4bK1"));
        assert_eq!(branch("Via: SIP/2.0/UDP h"), None);
    }

    #[test]
    fn test_annotate_received() {
        let source: SocketAddr = "203.0.113.7:40123".parse().unwrap();

        assert_eq!(
            annotate_received("Via: SIP/2.0/UDP 10.0.0.5:5060;rport;branch=z9hG4bK1", source),
            "Via: SIP/2.0/UDP 10.0.0.5:5060;received=203.0.113.7;rport=40123;branch=z9hG4bK1"
        );
        assert_eq!(
            annotate_received("Via: SIP/2.0/UDP 10.0.0.5:5060;branch=z9hG4bK1;rport", source),
            "Via: SIP/2.0/UDP 10.0.0.5:5060;branch=z9hG4bK1;received=203.0.113.7;rport=40123"
        );
        assert_eq!(
            annotate_received("Via: SIP/2.0/UDP 10.0.0.5:5060;branch=z9hG4bK1", source),
            "Via: SIP/2.0/UDP 10.0.0.5:5060;branch=z9hG4bK1;received=203.0.113.7"
        );
    }

    #[test]
    fn test_tag_detection() {
        assert!(has_tag("To: <sip:bob@biloxi.com>;tag=a6c85cf"));
        assert!(!has_tag("To: <sip:bob@biloxi.com>"));
    }

    #[test]
    fn test_expires_param_and_cseq() {
        assert_eq!(expires_param("Contact: <sip:a@10.0.0.1>;expires=3600"), Some(3600));
        assert_eq!(expires_param("Contact: <sip:a@10.0.0.1>"), None);
        assert_eq!(cseq_method("314159 INVITE"), Some("INVITE"));
        assert_eq!(cseq_method(" 2   BYE"), Some("BYE"));
        assert_eq!(cseq_method("INVITE"), None);
    }

    #[test]
    fn test_start_lines() {
        assert_eq!(
            parse_start_line("INVITE sip:bob@biloxi.com SIP/2.0"),
            Some(StartLine::Request { method: "INVITE", target: "bob@biloxi.com" })
        );
        assert_eq!(
            parse_start_line("SIP/2.0 180 Ringing"),
            Some(StartLine::Status { code: 180, reason: "Ringing" })
        );
        assert_eq!(
            parse_start_line("SIP/2.0 200"),
            Some(StartLine::Status { code: 200, reason: "" })
        );
        assert_eq!(parse_start_line("SIP/2.0 OK"), None);
        assert_eq!(parse_start_line("INVITE tel:+15551234 SIP/2.0"), None);
        assert_eq!(parse_start_line("hello"), None);
    }
}

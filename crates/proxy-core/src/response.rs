//! Locally synthesized responses
//!
//! When the proxy answers a request itself (REGISTER, the event methods, or a
//! routing failure) it turns the request into a response: the request-line
//! is replaced by a status-line, the header section is kept, the body is
//! dropped.

use std::fmt;
use std::net::SocketAddr;

use crate::headers::{self, HeaderKind};
use crate::message::Message;
use crate::transform;

/// Status code and reason phrase of a synthesized response
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatusReply {
    pub code: u16,
    pub reason: &'static str,
}

impl StatusReply {
    pub const OK: StatusReply = StatusReply { code: 200, reason: "OK" };
    pub const BAD_REQUEST: StatusReply = StatusReply { code: 400, reason: "Bad Request" };
    pub const NOT_ACCEPTABLE: StatusReply = StatusReply { code: 406, reason: "Not Acceptable" };
    pub const TEMPORARILY_UNAVAILABLE: StatusReply =
        StatusReply { code: 480, reason: "Temporarily Unavailable" };
    pub const SERVER_INTERNAL_ERROR: StatusReply =
        StatusReply { code: 500, reason: "Server Internal Error" };

    /// `SIP/2.0 <code> <reason>`
    pub fn status_line(&self) -> String {
        format!("SIP/2.0 {} {}", self.code, self.reason)
    }
}

impl fmt::Display for StatusReply {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.code, self.reason)
    }
}

/// Reason phrase the proxy puts on relayed responses with the given code
pub fn relayed_reason(code: u16) -> Option<&'static str> {
    match code {
        100 => Some("trying"),
        180 => Some("ringing"),
        181 => Some("call is being forwarded"),
        408 => Some("request timeout"),
        486 => Some("busy here"),
        487 => Some("request terminated"),
        503 => Some("service unavailable"),
        504 => Some("server timeout"),
        603 => Some("decline"),
        _ => None,
    }
}

/// Builds responses to requests the proxy answers itself
#[derive(Debug, Clone)]
pub struct ResponseComposer {
    dialog_tag: String,
}

impl ResponseComposer {
    pub fn new(dialog_tag: impl Into<String>) -> Self {
        Self {
            dialog_tag: dialog_tag.into(),
        }
    }

    pub fn dialog_tag(&self) -> &str {
        &self.dialog_tag
    }

    /// Turn `request`, received from `source`, into a response carrying `status`.
    ///
    /// Lines are kept up to and including the first empty line; anything after
    /// it is dropped and one trailing empty line is appended. On the way:
    /// a To/t header without a tag gets the composer's dialog tag, every
    /// Via/v is annotated with `received`/`rport`, and Content-Length/l is
    /// forced to 0.
    pub fn compose(&self, request: &Message, status: StatusReply, source: SocketAddr) -> Message {
        let mut lines = Vec::with_capacity(request.len() + 1);
        lines.push(status.status_line());

        for line in request.lines().iter().skip(1) {
            if line.is_empty() {
                lines.push(String::new());
                break;
            }
            if headers::is_header(line, HeaderKind::To) && !headers::has_tag(line) {
                lines.push(format!("{};tag={}", line, self.dialog_tag));
            } else {
                lines.push(line.clone());
            }
        }
        lines.push(String::new());

        let response = transform::annotate_vias(&Message::from_lines(lines), source);
        transform::zero_content_length(&response)
    }
}

impl Default for ResponseComposer {
    fn default() -> Self {
        Self::new(crate::config::DEFAULT_DIALOG_TAG)
    }
}

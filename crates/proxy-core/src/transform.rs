//! Header rewriting
//!
//! Each function takes a message and returns a rewritten copy. Only the
//! header section is rewritten; lines after the first empty line are body and
//! pass through unchanged.

use std::net::SocketAddr;

use crate::config::ProxyIdentity;
use crate::headers::{self, HeaderKind, StartLine};
use crate::message::Message;
use crate::registrar::Registrar;

/// Rebuild `message`, feeding each header line to `rewrite`.
///
/// `rewrite` pushes zero or more replacement lines for the header it is given.
fn rewrite_headers<F>(message: &Message, mut rewrite: F) -> Message
where
    F: FnMut(&str, &mut Vec<String>),
{
    let end = message.header_end();
    let mut lines = Vec::with_capacity(message.len() + 1);
    for (index, line) in message.lines().iter().enumerate() {
        if index == 0 || index >= end {
            lines.push(line.clone());
        } else {
            rewrite(line, &mut lines);
        }
    }
    Message::from_lines(lines)
}

/// Push this proxy's Via in front of every Via of the request.
///
/// The pushed Via carries the original branch with the identity's suffix
/// appended. The original Via is annotated with the address the request was
/// actually received from (see [`headers::annotate_received`]). A Via without
/// a branch is annotated but gets no Via pushed in front of it.
pub fn push_top_via(message: &Message, identity: &ProxyIdentity, source: SocketAddr) -> Message {
    rewrite_headers(message, |line, out| {
        if headers::is_header(line, HeaderKind::Via) {
            if let Some(branch) = headers::branch(line) {
                out.push(identity.via_with_branch(branch));
            }
            out.push(headers::annotate_received(line, source));
        } else {
            out.push(line.to_string());
        }
    })
}

/// Drop the first Via pushed by this proxy; every other line is kept
pub fn pop_top_via(message: &Message, identity: &ProxyIdentity) -> Message {
    let mut popped = false;
    rewrite_headers(message, |line, out| {
        if !popped && headers::is_header(line, HeaderKind::Via) && identity.is_own_via(line) {
            popped = true;
        } else {
            out.push(line.to_string());
        }
    })
}

/// Drop every Route header
pub fn strip_route_headers(message: &Message) -> Message {
    rewrite_headers(message, |line, out| {
        if !headers::is_header(line, HeaderKind::Route) {
            out.push(line.to_string());
        }
    })
}

/// Insert this proxy's Record-Route right after the first line
pub fn insert_record_route(message: &Message, identity: &ProxyIdentity) -> Message {
    let mut lines = message.lines().to_vec();
    let at = lines.len().min(1);
    lines.insert(at, identity.record_route().to_string());
    Message::from_lines(lines)
}

/// Declare an empty body in every Content-Length/l header, keeping the form used
pub fn zero_content_length(message: &Message) -> Message {
    rewrite_headers(message, |line, out| match headers::classify(line) {
        Some(header) if header.kind == HeaderKind::ContentLength => {
            out.push(format!("{}: 0", header.name));
        }
        _ => out.push(line.to_string()),
    })
}

/// Annotate every Via with the address the message was received from
pub fn annotate_vias(message: &Message, source: SocketAddr) -> Message {
    rewrite_headers(message, |line, out| {
        if headers::is_header(line, HeaderKind::Via) {
            out.push(headers::annotate_received(line, source));
        } else {
            out.push(line.to_string());
        }
    })
}

/// Replace a request-URI naming a registered AOR with that AOR's contact.
///
/// Status lines, unregistered targets and unparseable request-lines are left alone.
pub fn rewrite_request_uri(message: &Message, registrar: &Registrar) -> Message {
    let (method, target) = match message.parsed_start_line() {
        Some(StartLine::Request { method, target }) => (method, target),
        _ => return message.clone(),
    };
    match registrar.lookup(target) {
        Some(entry) => message.with_start_line(format!("{} sip:{} SIP/2.0", method, entry.contact)),
        None => message.clone(),
    }
}

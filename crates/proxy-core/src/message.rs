//! Line-structured SIP message
//!
//! A [`Message`] is the datagram split on CRLF. Line 0 is the request-line or
//! status-line, the following lines are headers up to the first empty line,
//! and whatever comes after that line is body, carried through untouched.
//!
//! Messages are values: every rewrite in [`crate::transform`] builds a new
//! message instead of editing one in place.

use std::fmt;

use bytes::Bytes;

use crate::headers::{self, HeaderKind, HeaderLine, StartLine};

/// First byte of a keepalive datagram
pub const KEEPALIVE_BYTE: u8 = 0x00;

const CRLF: &str = "\r\n";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    lines: Vec<String>,
}

impl Message {
    /// Split a datagram into lines.
    ///
    /// Returns `None` for keepalives (first byte NUL) and empty buffers.
    /// Invalid UTF-8 is replaced rather than rejected.
    pub fn parse(data: &[u8]) -> Option<Self> {
        match data.first() {
            None | Some(&KEEPALIVE_BYTE) => None,
            Some(_) => {
                let text = String::from_utf8_lossy(data);
                Some(Self {
                    lines: text.split(CRLF).map(str::to_owned).collect(),
                })
            }
        }
    }

    pub fn from_lines<I, S>(lines: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            lines: lines.into_iter().map(Into::into).collect(),
        }
    }

    pub fn lines(&self) -> &[String] {
        &self.lines
    }

    pub fn len(&self) -> usize {
        self.lines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    /// The request-line or status-line
    pub fn start_line(&self) -> &str {
        self.lines.first().map_or("", String::as_str)
    }

    /// Parsed shape of the first line, if it is a request-line or status-line
    pub fn parsed_start_line(&self) -> Option<StartLine<'_>> {
        headers::parse_start_line(self.start_line())
    }

    /// Index of the empty line closing the header section, or `len()` when missing
    pub fn header_end(&self) -> usize {
        self.lines
            .iter()
            .skip(1)
            .position(|line| line.is_empty())
            .map_or(self.lines.len(), |pos| pos + 1)
    }

    /// Header lines with their indices
    pub fn header_lines(&self) -> impl Iterator<Item = (usize, &str)> {
        let end = self.header_end();
        self.lines
            .iter()
            .enumerate()
            .take(end)
            .skip(1)
            .map(|(index, line)| (index, line.as_str()))
    }

    /// First header of the given family; later ones are never consulted
    pub fn first_header(&self, kind: HeaderKind) -> Option<HeaderLine<'_>> {
        self.header_lines()
            .filter_map(|(_, line)| headers::classify(line))
            .find(|header| header.kind == kind)
    }

    pub fn has_header(&self, kind: HeaderKind) -> bool {
        self.first_header(kind).is_some()
    }

    /// Address-of-record of the first header of `kind`
    pub fn address_of_record(&self, kind: HeaderKind) -> Option<String> {
        self.first_header(kind)
            .and_then(|header| headers::address_of_record(header.value))
    }

    /// Caller AOR, from From/f
    pub fn origin(&self) -> Option<String> {
        self.address_of_record(HeaderKind::From)
    }

    /// Callee AOR, from To/t
    pub fn destination(&self) -> Option<String> {
        self.address_of_record(HeaderKind::To)
    }

    pub fn call_id(&self) -> Option<&str> {
        self.first_header(HeaderKind::CallId)
            .map(|header| header.value.trim_end())
    }

    /// Method named in the CSeq header
    pub fn cseq_method(&self) -> Option<&str> {
        self.first_header(HeaderKind::CSeq)
            .and_then(|header| headers::cseq_method(header.value))
    }

    /// Same message with line 0 replaced
    pub fn with_start_line(&self, line: impl Into<String>) -> Self {
        let mut lines = self.lines.clone();
        match lines.first_mut() {
            Some(first) => *first = line.into(),
            None => lines.push(line.into()),
        }
        Self { lines }
    }

    /// Wire form: lines joined with CRLF, UTF-8 encoded
    pub fn to_bytes(&self) -> Bytes {
        Bytes::from(self.to_string())
    }
}

impl fmt::Display for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.lines.join(CRLF))
    }
}

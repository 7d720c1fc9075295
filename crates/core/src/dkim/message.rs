//! Splitting a raw message into header fields and body
//!
//! Only as much structure as DKIM needs: field boundaries (with folded
//! continuation lines) and the start of the body. Offsets are kept so the
//! sanitizers can rewrite the exact original bytes; [`MessageLayout::header_fields`]
//! hands the fields to `viadkim` for canonicalization.

use std::borrow::Cow;

use thiserror::Error;
use viadkim::header::{FieldBody, FieldName, HeaderFields};

#[derive(Debug, Error, PartialEq, Eq)]
#[error("invalid header field {name:?}")]
pub struct InvalidHeaderField {
    pub name: String,
}

/// One header field, as byte offsets into the raw message
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct HeaderField {
    /// Offset of the first byte of the field name
    pub start: usize,
    /// Offset of the `:` separating name and value
    pub colon: usize,
    /// Offset one past the field's final line terminator
    pub end: usize,
}

impl HeaderField {
    /// Field name without trailing whitespace
    pub fn name<'a>(&self, raw: &'a [u8]) -> &'a [u8] {
        trim_end_wsp(&raw[self.start..self.colon])
    }

    /// Everything after the colon, excluding the final line terminator
    pub fn value<'a>(&self, raw: &'a [u8]) -> &'a [u8] {
        strip_line_ending(&raw[self.colon + 1..self.end])
    }

    /// The whole field including its terminator
    pub fn raw<'a>(&self, raw: &'a [u8]) -> &'a [u8] {
        &raw[self.start..self.end]
    }

    pub fn is_named(&self, raw: &[u8], name: &str) -> bool {
        self.name(raw).eq_ignore_ascii_case(name.as_bytes())
    }
}

/// Header fields in message order plus the body offset
#[derive(Clone, Debug)]
pub struct MessageLayout {
    pub fields: Vec<HeaderField>,
    pub body_start: usize,
}

impl MessageLayout {
    pub fn body<'a>(&self, raw: &'a [u8]) -> &'a [u8] {
        &raw[self.body_start.min(raw.len())..]
    }

    pub fn fields_named<'s>(
        &'s self,
        raw: &'s [u8],
        name: &'s str,
    ) -> impl Iterator<Item = (usize, &'s HeaderField)> + 's {
        self.fields
            .iter()
            .enumerate()
            .filter(move |(_, f)| f.is_named(raw, name))
    }

    /// All fields in message order, folding normalized to CRLF
    pub fn header_fields(&self, raw: &[u8]) -> Result<HeaderFields, InvalidHeaderField> {
        let fields = self
            .fields
            .iter()
            .map(|field| {
                let name = field.name(raw);
                let invalid = || InvalidHeaderField {
                    name: String::from_utf8_lossy(name).into_owned(),
                };
                let name = std::str::from_utf8(name)
                    .ok()
                    .and_then(|n| FieldName::new(n).ok())
                    .ok_or_else(invalid)?;
                let body = FieldBody::new(crlf_folding(field.value(raw)).into_owned())
                    .map_err(|_| invalid())?;
                Ok((name, body))
            })
            .collect::<Result<Vec<_>, _>>()?;

        HeaderFields::new(fields).map_err(|_| InvalidHeaderField {
            name: String::new(),
        })
    }
}

/// Locate header fields and the body
///
/// Lines end with CRLF; a bare LF is accepted as a terminator. The header
/// block ends at the first empty line. Lines without a colon that are not
/// continuations are skipped.
pub fn split_message(raw: &[u8]) -> MessageLayout {
    let mut fields: Vec<HeaderField> = Vec::new();
    let mut current: Option<(usize, usize)> = None;
    let mut pos = 0;

    let flush = |current: &mut Option<(usize, usize)>, fields: &mut Vec<HeaderField>| {
        if let Some((start, end)) = current.take() {
            if let Some(colon) = raw[start..end].iter().position(|&b| b == b':') {
                fields.push(HeaderField {
                    start,
                    colon: start + colon,
                    end,
                });
            }
        }
    };

    while pos < raw.len() {
        let line_end = match raw[pos..].iter().position(|&b| b == b'\n') {
            Some(i) => pos + i + 1,
            None => raw.len(),
        };
        let line = &raw[pos..line_end];

        if line == b"\r\n" || line == b"\n" {
            flush(&mut current, &mut fields);
            return MessageLayout {
                fields,
                body_start: line_end,
            };
        }

        let continuation = matches!(line.first(), Some(b' ') | Some(b'\t'));
        if continuation && current.is_some() {
            if let Some((_, end)) = current.as_mut() {
                *end = line_end;
            }
        } else {
            flush(&mut current, &mut fields);
            current = Some((pos, line_end));
        }
        pos = line_end;
    }

    flush(&mut current, &mut fields);
    MessageLayout {
        fields,
        body_start: raw.len(),
    }
}

pub(crate) fn is_wsp(b: u8) -> bool {
    b == b' ' || b == b'\t'
}

pub(crate) fn trim_end_wsp(bytes: &[u8]) -> &[u8] {
    let end = bytes
        .iter()
        .rposition(|&b| !is_wsp(b))
        .map(|i| i + 1)
        .unwrap_or(0);
    &bytes[..end]
}

pub(crate) fn trim_wsp(bytes: &[u8]) -> &[u8] {
    let start = bytes.iter().position(|&b| !is_wsp(b)).unwrap_or(bytes.len());
    trim_end_wsp(&bytes[start..])
}

/// Turn bare LF line breaks into CRLF
pub fn crlf_folding(value: &[u8]) -> Cow<'_, [u8]> {
    let bare = value
        .iter()
        .enumerate()
        .any(|(i, &b)| b == b'\n' && (i == 0 || value[i - 1] != b'\r'));
    if !bare {
        return Cow::Borrowed(value);
    }

    let mut out = Vec::with_capacity(value.len() + 8);
    for (i, &b) in value.iter().enumerate() {
        if b == b'\n' && (i == 0 || value[i - 1] != b'\r') {
            out.push(b'\r');
        }
        out.push(b);
    }
    Cow::Owned(out)
}

pub(crate) fn strip_line_ending(bytes: &[u8]) -> &[u8] {
    let bytes = bytes.strip_suffix(b"\n").unwrap_or(bytes);
    bytes.strip_suffix(b"\r").unwrap_or(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_folded_fields() {
        let raw = b"From: a@example.com\r\nSubject: Hello\r\n  World\r\nTo: b@example.org\r\n\r\nbody\r\n";
        let layout = split_message(raw);
        assert_eq!(layout.fields.len(), 3);
        assert_eq!(layout.fields[0].name(raw), b"From");
        assert_eq!(layout.fields[1].value(raw), b" Hello\r\n  World");
        assert_eq!(layout.fields[2].raw(raw), b"To: b@example.org\r\n");
        assert_eq!(layout.body(raw), b"body\r\n");
    }

    #[test]
    fn test_split_bare_lf() {
        let raw = b"From: a@example.com\nSubject: x\n\nline\n";
        let layout = split_message(raw);
        assert_eq!(layout.fields.len(), 2);
        assert_eq!(layout.fields[1].value(raw), b" x");
        assert_eq!(layout.body(raw), b"line\n");
    }

    #[test]
    fn test_split_without_body() {
        let raw = b"From: a@example.com\r\nSubject: x";
        let layout = split_message(raw);
        assert_eq!(layout.fields.len(), 2);
        assert_eq!(layout.fields[1].value(raw), b" x");
        assert!(layout.body(raw).is_empty());
    }

    #[test]
    fn test_fields_named_is_case_insensitive() {
        let raw = b"FROM: a@example.com\r\nfrom: b@example.com\r\nTo: c\r\n\r\n";
        let layout = split_message(raw);
        assert_eq!(layout.fields_named(raw, "From").count(), 2);
    }

    #[test]
    fn test_header_fields_normalize_bare_lf_folding() {
        let raw = b"Subject: Hello\n  World\nFrom: a@example.com\n\nbody\n";
        let layout = split_message(raw);
        let fields = layout.header_fields(raw).unwrap();
        let fields = fields.as_ref();

        assert_eq!(fields.len(), 2);
        assert_eq!(fields[0].0, "subject");
        assert_eq!(fields[0].1.as_ref(), b" Hello\r\n  World");
        assert_eq!(fields[1].1.as_ref(), b" a@example.com");
    }

    #[test]
    fn test_header_fields_reject_control_characters() {
        let raw = b"From: a@example.com\r\nX-Bad: a\x07b\r\n\r\n";
        let layout = split_message(raw);
        assert_eq!(
            layout.header_fields(raw).unwrap_err(),
            InvalidHeaderField { name: "X-Bad".into() }
        );
    }

    #[test]
    fn test_crlf_folding() {
        assert!(matches!(crlf_folding(b"a\r\n b"), Cow::Borrowed(_)));
        assert_eq!(crlf_folding(b"a\n b\r\n c").as_ref(), b"a\r\n b\r\n c");
    }

    #[test]
    fn test_name_trailing_whitespace() {
        let raw = b"Subject \t: hi\r\n\r\n";
        let layout = split_message(raw);
        assert_eq!(layout.fields[0].name(raw), b"Subject");
    }
}

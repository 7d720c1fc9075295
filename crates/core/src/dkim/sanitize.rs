//! Transforms that undo common in-transit damage to signed messages
//!
//! Each transform is applied on its own to the original message; they are
//! not chained.

use std::fmt;

use super::message::{split_message, trim_wsp};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Sanitizer {
    /// Gmail's SMTP relay replaces broken Message-IDs and keeps the original
    /// in `X-Google-Original-Message-ID`
    RevertGoogleMessageId,
    /// Drop `X-Gmail-Labels` fields added by Takeout exports
    RemoveLabels,
    /// Turn bare LF line endings into CRLF
    InsertCarriageReturns,
    /// Decode quoted-printable tabs (`=09`)
    SanitizeTabs,
}

impl Sanitizer {
    /// Application order when retrying verification
    pub const ALL: [Sanitizer; 4] = [
        Self::RevertGoogleMessageId,
        Self::RemoveLabels,
        Self::InsertCarriageReturns,
        Self::SanitizeTabs,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Self::RevertGoogleMessageId => "revert_google_message_id",
            Self::RemoveLabels => "remove_labels",
            Self::InsertCarriageReturns => "insert_carriage_returns",
            Self::SanitizeTabs => "sanitize_tabs",
        }
    }

    pub fn apply(&self, raw: &[u8]) -> Vec<u8> {
        match self {
            Self::RevertGoogleMessageId => revert_google_message_id(raw),
            Self::RemoveLabels => remove_fields(raw, "X-Gmail-Labels"),
            Self::InsertCarriageReturns => insert_carriage_returns(raw),
            Self::SanitizeTabs => replace_all(raw, b"=09", b"\t"),
        }
    }
}

impl fmt::Display for Sanitizer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

fn revert_google_message_id(raw: &[u8]) -> Vec<u8> {
    if !contains(raw, b"ESMTPSA") {
        return raw.to_vec();
    }

    let layout = split_message(raw);
    let Some((_, message_id)) = layout.fields_named(raw, "Message-ID").next() else {
        return raw.to_vec();
    };
    if !contains(message_id.value(raw), b"SMTPIN_ADDED_BROKEN") {
        return raw.to_vec();
    }
    let Some((_, original)) = layout
        .fields_named(raw, "X-Google-Original-Message-ID")
        .next()
    else {
        return raw.to_vec();
    };

    let original_value = trim_wsp(original.value(raw));
    let mut out = Vec::with_capacity(raw.len());
    out.extend_from_slice(&raw[..message_id.colon + 1]);
    out.push(b' ');
    out.extend_from_slice(original_value);
    out.extend_from_slice(b"\r\n");
    out.extend_from_slice(&raw[message_id.end..]);
    out
}

fn remove_fields(raw: &[u8], name: &str) -> Vec<u8> {
    let layout = split_message(raw);
    let mut out = Vec::with_capacity(raw.len());
    let mut pos = 0;
    for (_, field) in layout.fields_named(raw, name) {
        out.extend_from_slice(&raw[pos..field.start]);
        pos = field.end;
    }
    out.extend_from_slice(&raw[pos..]);
    out
}

fn insert_carriage_returns(raw: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(raw.len() + raw.len() / 32);
    let mut prev = 0u8;
    for &b in raw {
        if b == b'\n' && prev != b'\r' {
            out.push(b'\r');
        }
        out.push(b);
        prev = b;
    }
    out
}

fn replace_all(raw: &[u8], from: &[u8], to: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(raw.len());
    let mut i = 0;
    while i < raw.len() {
        if raw[i..].starts_with(from) {
            out.extend_from_slice(to);
            i += from.len();
        } else {
            out.push(raw[i]);
            i += 1;
        }
    }
    out
}

fn contains(haystack: &[u8], needle: &[u8]) -> bool {
    haystack.windows(needle.len()).any(|w| w == needle)
}

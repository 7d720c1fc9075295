//! Reveal requests and reconstruction of disclosed text
//!
//! A reveal claims that `part` occurs at byte offset `from_index` of the
//! signed header block or body. Merging a set of reveals yields a
//! [`PartialText`] in which every other position stays unknown.

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Mask used by [`PartialText`]'s `Display`
pub const UNKNOWN_MASK: char = '\u{2022}';

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RevealError {
    #[error("Reveal conflict in {target} at index {index}: {existing:?} != {incoming:?}")]
    Conflict {
        target: RevealTarget,
        index: usize,
        existing: char,
        incoming: char,
    },

    #[error("Reveal out of bounds in {target}: {from_index}+{len} exceeds length {buffer_len}")]
    OutOfBounds {
        target: RevealTarget,
        from_index: usize,
        len: usize,
        buffer_len: usize,
    },
}

/// Buffer a reveal applies to
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum RevealTarget {
    Headers,
    Body,
}

impl RevealTarget {
    /// Name of the circuit parameter holding the buffer
    pub fn name(&self) -> &'static str {
        match self {
            Self::Headers => "headers",
            Self::Body => "body",
        }
    }
}

impl fmt::Display for RevealTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// `{fromIndex, part}` as supplied by the prover and carried in a proof
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RevealRequest {
    pub from_index: usize,
    pub part: String,
}

impl RevealRequest {
    pub fn new(from_index: usize, part: impl Into<String>) -> Self {
        Self {
            from_index,
            part: part.into(),
        }
    }

    pub fn bytes(&self) -> &[u8] {
        self.part.as_bytes()
    }

    /// Exclusive end offset; `None` on overflow
    pub fn end(&self) -> Option<usize> {
        self.from_index.checked_add(self.part.len())
    }
}

/// Header and body reveals in declaration order
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RevealRequests {
    pub headers_reveals: Vec<RevealRequest>,
    pub body_reveals: Vec<RevealRequest>,
}

impl RevealRequests {
    pub fn new(headers_reveals: Vec<RevealRequest>, body_reveals: Vec<RevealRequest>) -> Self {
        Self {
            headers_reveals,
            body_reveals,
        }
    }

    pub fn get(&self, target: RevealTarget) -> &[RevealRequest] {
        match target {
            RevealTarget::Headers => &self.headers_reveals,
            RevealTarget::Body => &self.body_reveals,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.headers_reveals.is_empty() && self.body_reveals.is_empty()
    }

    /// Every reveal must lie within its buffer
    pub fn check_bounds(&self, headers_len: usize, body_len: usize) -> Result<(), RevealError> {
        check_bounds(RevealTarget::Headers, headers_len, &self.headers_reveals)?;
        check_bounds(RevealTarget::Body, body_len, &self.body_reveals)
    }
}

/// A buffer of which only some bytes are known
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PartialText(Vec<Option<u8>>);

impl PartialText {
    pub fn unknown(len: usize) -> Self {
        Self(vec![None; len])
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<u8> {
        self.0.get(index).copied().flatten()
    }

    pub fn as_slice(&self) -> &[Option<u8>] {
        &self.0
    }

    pub fn known_count(&self) -> usize {
        self.0.iter().filter(|b| b.is_some()).count()
    }

    /// Render with `mask` in place of each unknown byte
    pub fn render(&self, mask: char) -> String {
        let mut buf = [0u8; 4];
        let mask = mask.encode_utf8(&mut buf).as_bytes();
        let mut out = Vec::with_capacity(self.0.len());
        for byte in &self.0 {
            match byte {
                Some(b) => out.push(*b),
                None => out.extend_from_slice(mask),
            }
        }
        String::from_utf8_lossy(&out).into_owned()
    }
}

impl fmt::Display for PartialText {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.render(UNKNOWN_MASK))
    }
}

/// Reconstructed header block and body
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Reconstructed {
    pub headers: PartialText,
    pub body: PartialText,
}

pub fn check_bounds(
    target: RevealTarget,
    buffer_len: usize,
    parts: &[RevealRequest],
) -> Result<(), RevealError> {
    for part in parts {
        match part.end() {
            Some(end) if end <= buffer_len => {}
            _ => {
                return Err(RevealError::OutOfBounds {
                    target,
                    from_index: part.from_index,
                    len: part.part.len(),
                    buffer_len,
                })
            }
        }
    }
    Ok(())
}

/// Merge `parts` into a buffer of `len` bytes
pub fn reconstruct(
    target: RevealTarget,
    len: usize,
    parts: &[RevealRequest],
) -> Result<PartialText, RevealError> {
    check_bounds(target, len, parts)?;

    let mut text = PartialText::unknown(len);
    for part in parts {
        for (offset, &incoming) in part.bytes().iter().enumerate() {
            let index = part.from_index + offset;
            let slot = &mut text.0[index];
            match *slot {
                Some(existing) if existing != incoming => {
                    return Err(RevealError::Conflict {
                        target,
                        index,
                        existing: existing as char,
                        incoming: incoming as char,
                    })
                }
                _ => *slot = Some(incoming),
            }
        }
    }
    Ok(text)
}

pub fn reconstruct_email(
    headers_len: usize,
    body_len: usize,
    reveals: &RevealRequests,
) -> Result<Reconstructed, RevealError> {
    Ok(Reconstructed {
        headers: reconstruct(RevealTarget::Headers, headers_len, &reveals.headers_reveals)?,
        body: reconstruct(RevealTarget::Body, body_len, &reveals.body_reveals)?,
    })
}

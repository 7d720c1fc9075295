//! DKIM signature extraction and verification
//!
//! Produces the exact header and body bytes covered by a message's
//! RSA-SHA256 DKIM signature, which become the private circuit inputs.
//! Tag-list parsing, canonicalization and the RSA check come from `viadkim`;
//! this module picks the signature, keeps the canonical bytes it produced and
//! drives the sanitizer retries.
//!
//! # Flow
//!
//! ```text
//! raw email ──► split headers/body ──► pick DKIM-Signature for target domain
//!                                              │
//!                        resolve key (selector, domain) via KeyResolver
//!                                              │
//!              canonicalize (c=) ──► body hash (bh=) ──► RSA PKCS#1 v1.5
//!                                              │
//!                       on mismatch: retry with each Sanitizer in order
//! ```

pub mod message;
pub mod sanitize;

use std::borrow::Cow;
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use rsa::traits::PublicKeyParts;
use rsa::RsaPublicKey;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use viadkim::canonicalize::{canonicalize_header, canonicalize_headers, BodyCanonicalizer};
use viadkim::crypto::{self, HashAlgorithm};
use viadkim::signature::{DkimSignatureError, DkimSignatureErrorKind, DomainName, SigningAlgorithm};
use viadkim::CanonicalStr;

use crate::dns::{DnsError, KeyResolver};
use crate::key::{decode_public_key, encode_base64, pad_to_width};

pub use message::{crlf_folding, split_message, HeaderField, InvalidHeaderField, MessageLayout};
pub use sanitize::Sanitizer;
pub use viadkim::signature::{Canonicalization, CanonicalizationAlgorithm, DKIM_SIGNATURE_NAME};

/// Parsed DKIM-Signature tag list
pub type DkimHeader = viadkim::signature::DkimSignature;

/// The only algorithm the circuit can check
pub const SUPPORTED_DKIM_ALGORITHM: &str = "rsa-sha256";

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MismatchReason {
    BadSignature,
    BodyHash,
}

impl fmt::Display for MismatchReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::BadSignature => f.write_str("bad signature"),
            Self::BodyHash => f.write_str("body hash did not verify"),
        }
    }
}

#[derive(Debug, Error)]
pub enum DkimError {
    #[error("DKIM signature not found for domain {domain}")]
    SignatureNotFound { domain: String },

    #[error("Multiple From headers in email and domain for verification not specified")]
    AmbiguousSender,

    #[error("No From header in email and domain for verification not specified")]
    MissingSender,

    #[error("DKIM signature verification failed for domain {domain}: {reason}")]
    SignatureInvalid {
        domain: String,
        reason: MismatchReason,
    },

    #[error("Unsupported DKIM algorithm: {0:?}")]
    UnsupportedAlgorithm(String),

    #[error("Malformed message: {0}")]
    Malformed(#[from] InvalidHeaderField),

    #[error("Invalid DKIM public key for {selector}._domainkey.{domain}: {reason}")]
    InvalidKey {
        selector: String,
        domain: String,
        reason: String,
    },

    #[error(transparent)]
    Dns(#[from] DnsError),
}

impl DkimError {
    /// Failures that a sanitization transform might fix
    pub fn is_mismatch(&self) -> bool {
        matches!(self, Self::SignatureInvalid { .. })
    }
}

/// Signature metadata disclosed alongside a proof
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DkimSignature {
    pub domain: String,
    pub selector: String,
    /// Always [`SUPPORTED_DKIM_ALGORITHM`] for a verified email; not part of
    /// the wire format
    #[serde(skip, default = "default_algorithm")]
    pub algorithm: String,
    /// Signature bytes left-padded to the modulus width
    pub signature_base64: String,
}

fn default_algorithm() -> String {
    SUPPORTED_DKIM_ALGORITHM.to_string()
}

/// Result of DKIM verification: the signed bytes and who signed them
#[derive(Clone, Debug)]
pub struct SignedEmail {
    /// Canonicalized signed header fields, ending with the DKIM-Signature
    /// field (empty `b=`, no trailing CRLF)
    pub headers: Vec<u8>,
    /// Canonicalized body, truncated to `l=` when present
    pub body: Vec<u8>,
    /// `bh=` as declared in the signature
    pub body_hash: String,
    pub dkim_signature: DkimSignature,
    /// Key the signature verified against
    pub public_key_base64: String,
    /// Transform that had to be applied before verification passed
    pub sanitization: Option<Sanitizer>,
}

impl SignedEmail {
    pub fn headers_str(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.headers)
    }

    pub fn body_str(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.body)
    }
}

/// Parse a DKIM-Signature field value; folding may use bare LF
pub fn parse_dkim_header(value: &[u8]) -> Result<DkimHeader, DkimSignatureError> {
    let value = crlf_folding(value);
    let text = std::str::from_utf8(&value)
        .map_err(|_| DkimSignatureError::new(DkimSignatureErrorKind::Utf8Encoding))?;
    DkimHeader::from_str(text)
}

/// `a=` of a record that failed to parse only because of its algorithm,
/// when that record belongs to `target`
fn rejected_algorithm(err: &DkimSignatureError, target: &DomainName) -> Option<String> {
    if !matches!(
        err.kind,
        DkimSignatureErrorKind::UnsupportedAlgorithm | DkimSignatureErrorKind::HistoricAlgorithm
    ) {
        return None;
    }
    let domain = DomainName::new(err.domain_str.as_deref()?.trim()).ok()?;
    if !target.eq_or_subdomain_of(&domain) {
        return None;
    }
    Some(err.algorithm_str.as_deref().unwrap_or_default().trim().to_ascii_lowercase())
}

/// Remove the value of the `b=` tag, keeping every other byte intact
///
/// `viadkim` does this internally on its verification path but does not
/// expose it.
pub fn blank_signature_value(value: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(value.len());
    let mut rest = value;

    loop {
        let seg_end = rest.iter().position(|&b| b == b';').unwrap_or(rest.len());
        let segment = &rest[..seg_end];

        match segment.iter().position(|&b| b == b'=') {
            Some(eq) if is_signature_tag(&segment[..eq]) => out.extend_from_slice(&segment[..=eq]),
            _ => out.extend_from_slice(segment),
        }

        if seg_end == rest.len() {
            break;
        }
        out.push(b';');
        rest = &rest[seg_end + 1..];
    }

    out
}

fn is_signature_tag(name: &[u8]) -> bool {
    let mut letters = name.iter().filter(|b| !b.is_ascii_whitespace());
    letters.next() == Some(&b'b') && letters.next().is_none()
}

/// Canonical bytes covered by one DKIM signature
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CanonicalMessage {
    pub headers: Vec<u8>,
    pub body: Vec<u8>,
}

/// Build the canonical header block and body a signature covers
///
/// `signature_index` is the position of the DKIM-Signature field in
/// `layout.fields`. It goes last, with `b=` emptied and no trailing CRLF.
pub fn canonicalize_message(
    raw: &[u8],
    layout: &MessageLayout,
    signature_index: usize,
    header: &DkimHeader,
) -> Result<CanonicalMessage, DkimError> {
    let fields = layout.header_fields(raw)?;
    let canon = header.canonicalization;

    let mut headers = canonicalize_headers(canon.header, &fields, &header.signed_headers);
    if let Some((name, value)) = fields.as_ref().get(signature_index) {
        canonicalize_header(
            &mut headers,
            canon.header,
            name,
            blank_signature_value(value.as_ref()),
        );
    }

    let mut body = canonicalize_body(canon.body, layout.body(raw));
    if let Some(limit) = header.body_length {
        body.truncate(usize::try_from(limit).unwrap_or(usize::MAX));
    }

    Ok(CanonicalMessage { headers, body })
}

pub fn canonicalize_body(algorithm: CanonicalizationAlgorithm, body: &[u8]) -> Vec<u8> {
    let mut canonicalizer = BodyCanonicalizer::new(algorithm);
    let mut out = canonicalizer.canonicalize_chunk(body).into_owned();
    out.extend_from_slice(&canonicalizer.finish());
    out
}

/// Check body hash and RSA signature of `canonical` against `key`
pub fn check_signature(
    canonical: &CanonicalMessage,
    header: &DkimHeader,
    signature: &[u8],
    key: &RsaPublicKey,
) -> Result<(), MismatchReason> {
    let body_hash = crypto::digest(HashAlgorithm::Sha256, &canonical.body);
    if body_hash != header.body_hash {
        return Err(MismatchReason::BodyHash);
    }

    let data_hash = crypto::digest(HashAlgorithm::Sha256, &canonical.headers);
    crypto::verify_rsa(key, HashAlgorithm::Sha256, &data_hash, signature)
        .map_err(|_| MismatchReason::BadSignature)
}

/// Domain of the single `From` address
pub fn sender_domain(raw: &[u8], layout: &MessageLayout) -> Result<String, DkimError> {
    let mut from = layout.fields_named(raw, "From");
    let (_, field) = from.next().ok_or(DkimError::MissingSender)?;
    if from.next().is_some() {
        return Err(DkimError::AmbiguousSender);
    }

    let (parsed, _) = mailparse::parse_header(field.raw(raw)).map_err(|_| DkimError::MissingSender)?;
    let addresses = mailparse::addrparse_header(&parsed).map_err(|_| DkimError::MissingSender)?;
    let address = addresses
        .iter()
        .find_map(|a| match a {
            mailparse::MailAddr::Single(info) => Some(info.addr.clone()),
            mailparse::MailAddr::Group(group) => group.addrs.first().map(|i| i.addr.clone()),
        })
        .ok_or(DkimError::MissingSender)?;

    address
        .rsplit_once('@')
        .map(|(_, domain)| domain.trim().to_ascii_lowercase())
        .filter(|d| !d.is_empty())
        .ok_or(DkimError::MissingSender)
}

/// DKIM verifier backed by a key resolver
pub struct DkimVerifier<R> {
    resolver: R,
    sanitize: bool,
}

impl<R: KeyResolver> DkimVerifier<R> {
    pub fn new(resolver: R) -> Self {
        Self {
            resolver,
            sanitize: true,
        }
    }

    /// Disable the sanitization retry
    pub fn without_sanitization(mut self) -> Self {
        self.sanitize = false;
        self
    }

    pub fn resolver(&self) -> &R {
        &self.resolver
    }

    /// Verify `raw` for `domain`, or for the `From` domain when `None`
    pub async fn verify(&self, raw: &[u8], domain: Option<&str>) -> Result<SignedEmail, DkimError> {
        let mut keys = KeyMemo::default();

        let err = match self.try_verify(raw, domain, &mut keys).await {
            Ok(signed) => return Ok(signed),
            Err(e) if e.is_mismatch() && self.sanitize => e,
            Err(e) => return Err(e),
        };

        tracing::debug!("DKIM verification failed ({}), trying sanitizers", err);
        for sanitizer in Sanitizer::ALL {
            let sanitized = sanitizer.apply(raw);
            if sanitized == raw {
                continue;
            }
            match self.try_verify(&sanitized, domain, &mut keys).await {
                Ok(mut signed) => {
                    tracing::warn!(
                        "DKIM: verification passed after applying sanitization {:?}",
                        sanitizer.name()
                    );
                    signed.sanitization = Some(sanitizer);
                    return Ok(signed);
                }
                Err(e) => tracing::debug!("sanitizer {} did not help: {}", sanitizer, e),
            }
        }

        Err(err)
    }

    async fn try_verify(
        &self,
        raw: &[u8],
        domain: Option<&str>,
        keys: &mut KeyMemo,
    ) -> Result<SignedEmail, DkimError> {
        let layout = split_message(raw);
        let target = match domain {
            Some(d) => d.trim().to_ascii_lowercase(),
            None => sender_domain(raw, &layout)?,
        };
        let not_found = || DkimError::SignatureNotFound {
            domain: target.clone(),
        };
        let target_name = DomainName::new(target.as_str()).map_err(|_| not_found())?;

        let mut selected = None;
        for (index, field) in layout.fields_named(raw, DKIM_SIGNATURE_NAME) {
            match parse_dkim_header(field.value(raw)) {
                Ok(header) if target_name.eq_or_subdomain_of(&header.domain) => {
                    selected = Some((index, header));
                    break;
                }
                Ok(header) => {
                    tracing::debug!("skipping DKIM signature for d={}", header.domain)
                }
                Err(e) => {
                    if let Some(algorithm) = rejected_algorithm(&e, &target_name) {
                        return Err(DkimError::UnsupportedAlgorithm(algorithm));
                    }
                    tracing::debug!("skipping unparsable DKIM signature: {}", e)
                }
            }
        }
        let (index, header) = selected.ok_or_else(not_found)?;

        if header.algorithm != SigningAlgorithm::RsaSha256 {
            return Err(DkimError::UnsupportedAlgorithm(
                header.algorithm.canonical_str().to_string(),
            ));
        }

        let signing_domain = header.domain.to_ascii();
        let selector = header.selector.to_ascii();
        let public_key_base64 = keys.get(&self.resolver, &selector, &signing_domain).await?;
        let key = decode_public_key(&public_key_base64).map_err(|e| DkimError::InvalidKey {
            selector: selector.clone(),
            domain: signing_domain.clone(),
            reason: e.to_string(),
        })?;

        // Leading zero bytes are significant to the circuit's fixed-width input
        let signature = pad_to_width(&header.signature_data, key.size());

        let canonical = canonicalize_message(raw, &layout, index, &header)?;
        check_signature(&canonical, &header, &signature, &key).map_err(|reason| {
            DkimError::SignatureInvalid {
                domain: signing_domain.clone(),
                reason,
            }
        })?;

        Ok(SignedEmail {
            headers: canonical.headers,
            body: canonical.body,
            body_hash: encode_base64(&header.body_hash),
            dkim_signature: DkimSignature {
                domain: signing_domain,
                selector,
                algorithm: SUPPORTED_DKIM_ALGORITHM.to_string(),
                signature_base64: encode_base64(&signature),
            },
            public_key_base64,
            sanitization: None,
        })
    }
}

/// Keys already resolved during one `verify` call
#[derive(Default)]
struct KeyMemo {
    keys: HashMap<(String, String), String>,
}

impl KeyMemo {
    async fn get<R: KeyResolver>(
        &mut self,
        resolver: &R,
        selector: &str,
        domain: &str,
    ) -> Result<String, DnsError> {
        let k = (selector.to_string(), domain.to_string());
        if let Some(key) = self.keys.get(&k) {
            return Ok(key.clone());
        }
        let key = resolver.resolve(selector, domain).await?;
        self.keys.insert(k, key.clone());
        Ok(key)
    }
}

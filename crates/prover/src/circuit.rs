//! Typed description of the generated Noir circuit
//!
//! The circuit has a fixed shape: private header and body byte arrays, one
//! public `RevealStringPart` per reveal, and the three public RSA limb
//! arrays. Identifiers are derived from a reveal's position, never from its
//! content, and only a part's length reaches the source text. [`render`]
//! is the single place Noir text is produced.
//!
//! [`render`]: CircuitSource::render

use std::collections::HashSet;
use std::fmt;

use zkmail_core::limbs::{PUBKEY_LIMBS_LEN, SIGNATURE_LIMBS_LEN};
use zkmail_core::{RevealRequests, RevealTarget};

use crate::error::{ProverError, ProverResult};

/// Circuit parameter names
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Ident {
    Buffer(RevealTarget),
    Reveal { target: RevealTarget, index: usize },
    PubkeyLimbs,
    PubkeyRedcLimbs,
    SignatureLimbs,
}

impl fmt::Display for Ident {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Buffer(target) => f.write_str(target.name()),
            Self::Reveal { target, index } => write!(f, "{}_reveal_{}", target.name(), index),
            Self::PubkeyLimbs => f.write_str("pubkey_limbs"),
            Self::PubkeyRedcLimbs => f.write_str("pubkey_redc_limbs"),
            Self::SignatureLimbs => f.write_str("signature_limbs"),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Visibility {
    Private,
    Public,
}

/// Limb array lengths as named by the `zkemail` library
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LimbsLen {
    Pubkey,
    Signature,
}

impl LimbsLen {
    pub fn count(&self) -> usize {
        match self {
            Self::Pubkey => PUBKEY_LIMBS_LEN,
            Self::Signature => SIGNATURE_LIMBS_LEN,
        }
    }

    fn constant(&self) -> &'static str {
        match self {
            Self::Pubkey => "zkemail::PUBKEY_LIMBS_LEN",
            Self::Signature => "zkemail::SIGNATURE_LIMBS_LEN",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ParamType {
    /// `[u8; N]`
    Bytes(usize),
    /// `zkemail::RevealStringPart<N>`
    RevealStringPart(usize),
    /// `[Field; zkemail::*_LIMBS_LEN]`
    Limbs(LimbsLen),
}

impl fmt::Display for ParamType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bytes(len) => write!(f, "[u8; {}]", len),
            Self::RevealStringPart(len) => write!(f, "zkemail::RevealStringPart<{}>", len),
            Self::Limbs(len) => write!(f, "[Field; {}]", len.constant()),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Param {
    pub ident: Ident,
    pub ty: ParamType,
    pub visibility: Visibility,
}

impl Param {
    fn private(ident: Ident, ty: ParamType) -> Self {
        Self {
            ident,
            ty,
            visibility: Visibility::Private,
        }
    }

    fn public(ident: Ident, ty: ParamType) -> Self {
        Self {
            ident,
            ty,
            visibility: Visibility::Public,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Statement {
    /// `zkemail::assert_verify_email_signature(...)` over the buffers and limbs
    VerifySignature,
    /// `<reveal>.assert_matches(<target>)`
    AssertMatches { reveal: Ident, target: RevealTarget },
}

/// Generated `main` of the circuit
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CircuitSource {
    pub params: Vec<Param>,
    pub statements: Vec<Statement>,
}

impl CircuitSource {
    /// Public parameters in declaration order
    pub fn public_params(&self) -> impl Iterator<Item = &Param> {
        self.params
            .iter()
            .filter(|p| p.visibility == Visibility::Public)
    }

    pub fn param(&self, ident: Ident) -> Option<&Param> {
        self.params.iter().find(|p| p.ident == ident)
    }

    /// Noir source of `src/main.nr`
    pub fn render(&self) -> String {
        let params: Vec<String> = self
            .params
            .iter()
            .map(|p| {
                let vis = match p.visibility {
                    Visibility::Public => "pub ",
                    Visibility::Private => "",
                };
                format!("    {}: {}{}", p.ident, vis, p.ty)
            })
            .collect();

        let mut out = String::from("fn main(\n");
        out.push_str(&params.join(",\n"));
        out.push_str("\n) {\n");
        for statement in &self.statements {
            out.push_str("    ");
            out.push_str(&render_statement(statement));
            out.push_str(";\n");
        }
        out.push_str("}\n");
        out
    }

    fn check_unique_names(&self) -> ProverResult<()> {
        let mut seen = HashSet::new();
        for param in &self.params {
            let name = param.ident.to_string();
            if !seen.insert(name.clone()) {
                return Err(ProverError::DuplicateRevealName(name));
            }
        }
        Ok(())
    }
}

fn render_statement(statement: &Statement) -> String {
    match statement {
        Statement::VerifySignature => format!(
            "zkemail::assert_verify_email_signature({}, {}, {}, {}, {})",
            Ident::Buffer(RevealTarget::Headers),
            Ident::Buffer(RevealTarget::Body),
            Ident::PubkeyLimbs,
            Ident::PubkeyRedcLimbs,
            Ident::SignatureLimbs
        ),
        Statement::AssertMatches { reveal, target } => {
            format!("{}.assert_matches({})", reveal, Ident::Buffer(*target))
        }
    }
}

/// Build the circuit for the given buffer sizes and reveals
///
/// Reveal parameters and assertions follow the order of `reveals`, header
/// reveals first. That order is the public input layout.
pub fn synthesize(
    headers_len: usize,
    body_len: usize,
    reveals: &RevealRequests,
) -> ProverResult<CircuitSource> {
    let mut params = vec![
        Param::private(Ident::Buffer(RevealTarget::Headers), ParamType::Bytes(headers_len)),
        Param::private(Ident::Buffer(RevealTarget::Body), ParamType::Bytes(body_len)),
    ];
    let mut statements = vec![Statement::VerifySignature];

    for target in [RevealTarget::Headers, RevealTarget::Body] {
        for (index, request) in reveals.get(target).iter().enumerate() {
            let ident = Ident::Reveal { target, index };
            params.push(Param::public(
                ident,
                ParamType::RevealStringPart(request.bytes().len()),
            ));
            statements.push(Statement::AssertMatches {
                reveal: ident,
                target,
            });
        }
    }

    params.push(Param::public(Ident::PubkeyLimbs, ParamType::Limbs(LimbsLen::Pubkey)));
    params.push(Param::public(Ident::PubkeyRedcLimbs, ParamType::Limbs(LimbsLen::Pubkey)));
    params.push(Param::public(Ident::SignatureLimbs, ParamType::Limbs(LimbsLen::Signature)));

    let source = CircuitSource { params, statements };
    source.check_unique_names()?;
    Ok(source)
}

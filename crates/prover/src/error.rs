//! Error types for proving and verifying

use thiserror::Error;
use zkmail_core::{DkimError, DnsError, LimbError, RevealError};

use crate::backend::BackendError;
use crate::compiler::CompileError;

#[derive(Debug, Error)]
pub enum ProverError {
    #[error("DKIM error: {0}")]
    Dkim(#[from] DkimError),

    #[error("DNS error: {0}")]
    Dns(#[from] DnsError),

    #[error("Limb encoding failed: {0}")]
    Limbs(#[from] LimbError),

    #[error("Invalid reveal: {0}")]
    Reveal(#[from] RevealError),

    #[error("Duplicate reveal name in circuit: {0}")]
    DuplicateRevealName(String),

    #[error("Invalid circuit input {ident}: {reason}")]
    InvalidInput { ident: String, reason: String },

    #[error("Public input count mismatch: expected {expected}, proof has {actual}")]
    PublicInputLengthMismatch { expected: usize, actual: usize },

    #[error("Public input mismatch at index {index}: expected {expected}, proof has {actual}")]
    PublicInputMismatch {
        index: usize,
        expected: String,
        actual: String,
    },

    #[error("Proof is not valid")]
    InvalidProof,

    #[error("Circuit compilation failed: {0}")]
    Compile(#[from] CompileError),

    #[error("Barretenberg backend error: {0}")]
    Backend(#[from] BackendError),

    #[error("Invalid proof JSON: {0}")]
    Json(#[from] serde_json::Error),
}

pub type ProverResult<T> = Result<T, ProverError>;

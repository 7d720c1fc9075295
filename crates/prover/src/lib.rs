//! zkmail prover - selective-disclosure proofs over DKIM-signed emails
//!
//! A circuit is generated per header/body size and reveal shape, compiled
//! with `nargo` (cached), and proven with Barretenberg via the `bb` CLI.
//!
//! # Requirements
//!
//! - `nargo` (Noir compiler) with access to the `zkemail` Noir library
//! - `bb` (Barretenberg CLI), install with `bbup`
//!
//! # Example
//!
//! ```no_run
//! use zkmail_core::{RevealRequest, RevealRequests};
//! use zkmail_prover::{EmailProver, ProverConfig};
//!
//! # async fn run(raw: &[u8]) -> Result<(), zkmail_prover::ProverError> {
//! let prover = EmailProver::from_config(ProverConfig::from_env())?;
//!
//! let email = prover.verify_email(raw, None).await?;
//! let reveals = RevealRequests::new(vec![RevealRequest::new(9, "Hello")], vec![]);
//! let proof = prover.prove(&email, &reveals).await?;
//!
//! let verified = prover.verify(&proof).await?;
//! println!("{}", verified.reconstructed.headers);
//! # Ok(())
//! # }
//! ```

pub mod backend;
pub mod cache;
pub mod circuit;
pub mod compiler;
pub mod config;
pub mod error;
pub mod inputs;
pub mod proof;
pub mod service;

pub use backend::{Barretenberg, BackendError, ProvingBackend, Witness};
pub use cache::CompileCache;
pub use circuit::{synthesize, CircuitSource};
pub use compiler::{CircuitCompiler, CompileError, CompiledCircuit, NargoCompiler, NargoProject};
pub use config::ProverConfig;
pub use error::{ProverError, ProverResult};
pub use inputs::{CircuitInputs, PublicInputs};
pub use proof::{EmailProof, ProofData};
pub use service::{EmailProver, VerifiedEmail};

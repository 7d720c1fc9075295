//! In-memory compiler and backend doubles
//!
//! `MockBackend` binds a proof to its circuit and public inputs with a hash,
//! so a proof only verifies against the exact inputs it was produced for.

#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use once_cell::sync::Lazy;
use sha2::{Digest, Sha256};
use zkmail_core::dkim::{Canonicalization, CanonicalizationAlgorithm};
use zkmail_core::test_utils::test_signer;
use zkmail_core::utils::{field_to_hex, parse_field};
use zkmail_core::{Field, StaticKeyResolver};
use zkmail_prover::{
    BackendError, CircuitCompiler, CircuitInputs, CompileError, CompiledCircuit, EmailProver,
    NargoProject, ProofData, ProverConfig, ProvingBackend, Witness,
};

/// Signed by `example.com` / `s1`, simple/simple so header offsets are as
/// written
pub static HELLO_EMAIL: Lazy<Vec<u8>> = Lazy::new(|| {
    test_signer().sign_with(
        &[
            ("Subject", "Hello World"),
            ("From", "Alice <alice@example.com>"),
            ("To", "bob@example.org"),
        ],
        "Hi Bob,\r\nsee you at noon.\r\n",
        Canonicalization::from((CanonicalizationAlgorithm::Simple, CanonicalizationAlgorithm::Simple)),
    )
});

#[derive(Default)]
pub struct MockCompiler {
    pub calls: AtomicUsize,
}

impl MockCompiler {
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl CircuitCompiler for MockCompiler {
    async fn compile(&self, project: &NargoProject) -> Result<CompiledCircuit, CompileError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(CompiledCircuit::new(
            project.clone(),
            project.source.as_bytes().to_vec(),
        ))
    }
}

#[derive(Default)]
pub struct MockBackend {
    pub executions: AtomicUsize,
    pub verifications: AtomicUsize,
}

fn binding(circuit: &CompiledCircuit, public_inputs: &[Field]) -> Vec<u8> {
    let mut hasher = Sha256::new();
    hasher.update(&circuit.artifact);
    for input in public_inputs {
        hasher.update(field_to_hex(input).as_bytes());
    }
    hasher.finalize().to_vec()
}

#[async_trait]
impl ProvingBackend for MockBackend {
    async fn execute(
        &self,
        _circuit: &CompiledCircuit,
        inputs: &CircuitInputs,
    ) -> Result<Witness, BackendError> {
        self.executions.fetch_add(1, Ordering::SeqCst);
        Ok(Witness {
            data: inputs.to_prover_toml().into_bytes(),
            public_inputs: inputs.public_values(),
        })
    }

    async fn prove(
        &self,
        circuit: &CompiledCircuit,
        witness: &Witness,
    ) -> Result<ProofData, BackendError> {
        Ok(ProofData {
            public_inputs: witness.public_inputs.iter().map(field_to_hex).collect(),
            proof: binding(circuit, &witness.public_inputs),
        })
    }

    async fn verify(
        &self,
        circuit: &CompiledCircuit,
        proof: &ProofData,
    ) -> Result<bool, BackendError> {
        self.verifications.fetch_add(1, Ordering::SeqCst);
        let inputs: Option<Vec<Field>> = proof.public_inputs.iter().map(|s| parse_field(s)).collect();
        Ok(inputs.is_some_and(|inputs| binding(circuit, &inputs) == proof.proof))
    }
}

pub type MockProver = EmailProver<StaticKeyResolver, MockCompiler, MockBackend>;

pub fn mock_prover() -> MockProver {
    EmailProver::new(
        ProverConfig::default(),
        test_signer().resolver(),
        MockCompiler::default(),
        MockBackend::default(),
    )
}

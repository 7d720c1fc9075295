//! Proving backend: witness execution, proof generation and verification
//!
//! [`Barretenberg`] drives the `nargo` and `bb` CLIs. Verification keys are
//! derived once per compiled circuit and kept in memory.

use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use dashmap::DashMap;
use thiserror::Error;
use zkmail_core::utils::{field_to_hex, parse_field};
use zkmail_core::Field;

use crate::compiler::{run_tool, CompiledCircuit};
use crate::config::ProverConfig;
use crate::inputs::CircuitInputs;
use crate::proof::ProofData;

/// Size of one serialized public input
const FIELD_BYTES: usize = 32;

#[derive(Debug, Error)]
pub enum BackendError {
    #[error("Failed to run {bin}: {source}")]
    Spawn {
        bin: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Witness generation failed: {0}")]
    WitnessGenerationFailed(String),

    #[error("Proof generation failed: {0}")]
    ProofGenerationFailed(String),

    #[error("Verification key generation failed: {0}")]
    VerificationKeyFailed(String),

    #[error("Expected output not found at {0}")]
    MissingOutput(PathBuf),

    #[error("Malformed public inputs: {0}")]
    InvalidPublicInputs(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Solved witness for one execution of a circuit
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Witness {
    /// Serialized witness as written by the executor
    pub data: Vec<u8>,
    /// Public inputs the witness was produced from
    pub public_inputs: Vec<Field>,
}

#[async_trait]
pub trait ProvingBackend: Send + Sync {
    /// Solve the circuit for `inputs`
    async fn execute(
        &self,
        circuit: &CompiledCircuit,
        inputs: &CircuitInputs,
    ) -> Result<Witness, BackendError>;

    async fn prove(&self, circuit: &CompiledCircuit, witness: &Witness) -> Result<ProofData, BackendError>;

    /// `Ok(false)` when the backend rejects the proof
    async fn verify(&self, circuit: &CompiledCircuit, proof: &ProofData) -> Result<bool, BackendError>;
}

/// `nargo execute` + `bb` CLI backend
pub struct Barretenberg {
    nargo_bin: PathBuf,
    bb_bin: PathBuf,
    /// Verification keys by circuit hash
    vks: DashMap<String, Arc<Vec<u8>>>,
}

impl Barretenberg {
    pub fn new(nargo_bin: impl Into<PathBuf>, bb_bin: impl Into<PathBuf>) -> Self {
        Self {
            nargo_bin: nargo_bin.into(),
            bb_bin: bb_bin.into(),
            vks: DashMap::new(),
        }
    }

    pub fn from_config(config: &ProverConfig) -> Self {
        Self::new(&config.nargo_bin, &config.bb_bin)
    }

    /// Check that `bb` can be run
    pub async fn check_available(&self) -> Result<(), BackendError> {
        run_tool(&self.bb_bin, ["--version"], None)
            .await
            .map_err(|source| self.spawn_error(&self.bb_bin, source))?;
        Ok(())
    }

    /// Verification key for `circuit`, generated on first use
    pub async fn verification_key(&self, circuit: &CompiledCircuit) -> Result<Arc<Vec<u8>>, BackendError> {
        if let Some(vk) = self.vks.get(&circuit.hash) {
            return Ok(vk.clone());
        }

        tracing::info!("Generating verification key for circuit {}", circuit.hash);
        let temp_dir = tempfile::tempdir()?;
        let circuit_path = temp_dir.path().join("circuit.json");
        tokio::fs::write(&circuit_path, &circuit.artifact).await?;
        let vk_dir = temp_dir.path().join("vk_out");

        let output = run_tool(
            &self.bb_bin,
            [
                OsStr::new("write_vk"),
                OsStr::new("-b"),
                circuit_path.as_os_str(),
                OsStr::new("-o"),
                vk_dir.as_os_str(),
            ],
            None,
        )
        .await
        .map_err(|source| self.spawn_error(&self.bb_bin, source))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(BackendError::VerificationKeyFailed(stderr.into_owned()));
        }

        // bb write_vk creates a directory with vk file inside
        let vk = Arc::new(read_output(&vk_dir.join("vk")).await?);
        tracing::info!("Verification key generated ({} bytes)", vk.len());

        self.vks.insert(circuit.hash.clone(), vk.clone());
        Ok(vk)
    }

    fn spawn_error(&self, bin: &Path, source: std::io::Error) -> BackendError {
        BackendError::Spawn {
            bin: bin.display().to_string(),
            source,
        }
    }
}

#[async_trait]
impl ProvingBackend for Barretenberg {
    async fn execute(
        &self,
        circuit: &CompiledCircuit,
        inputs: &CircuitInputs,
    ) -> Result<Witness, BackendError> {
        let project = &circuit.project;
        let temp_dir = tempfile::tempdir()?;
        let dir = temp_dir.path();

        project.write_to(dir).await?;
        tokio::fs::create_dir_all(dir.join("target")).await?;
        tokio::fs::write(project.artifact_path(dir), &circuit.artifact).await?;
        tokio::fs::write(dir.join("Prover.toml"), inputs.to_prover_toml()).await?;

        tracing::info!("Executing circuit to generate witness...");
        let start = Instant::now();
        let output = run_tool(
            &self.nargo_bin,
            [
                OsStr::new("execute"),
                OsStr::new("--package"),
                OsStr::new(&project.package_name),
            ],
            Some(dir),
        )
        .await
        .map_err(|source| self.spawn_error(&self.nargo_bin, source))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(BackendError::WitnessGenerationFailed(stderr.into_owned()));
        }

        let witness_path = dir.join("target").join(format!("{}.gz", project.package_name));
        let data = read_output(&witness_path).await?;
        tracing::info!("Witness generated in {:.2?}", start.elapsed());

        Ok(Witness {
            data,
            public_inputs: inputs.public_values(),
        })
    }

    async fn prove(&self, circuit: &CompiledCircuit, witness: &Witness) -> Result<ProofData, BackendError> {
        let temp_dir = tempfile::tempdir()?;
        let circuit_path = temp_dir.path().join("circuit.json");
        let witness_path = temp_dir.path().join("witness.gz");
        let out_dir = temp_dir.path().join("proof_out");
        tokio::fs::write(&circuit_path, &circuit.artifact).await?;
        tokio::fs::write(&witness_path, &witness.data).await?;

        tracing::info!("Generating proof with bb...");
        let start = Instant::now();
        let output = run_tool(
            &self.bb_bin,
            [
                OsStr::new("prove"),
                OsStr::new("-b"),
                circuit_path.as_os_str(),
                OsStr::new("-w"),
                witness_path.as_os_str(),
                OsStr::new("-o"),
                out_dir.as_os_str(),
            ],
            None,
        )
        .await
        .map_err(|source| self.spawn_error(&self.bb_bin, source))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(BackendError::ProofGenerationFailed(stderr.into_owned()));
        }

        let proof = read_output(&out_dir.join("proof")).await?;
        let public_inputs = decode_public_inputs(&read_output(&out_dir.join("public_inputs")).await?)?;
        tracing::info!(
            "Proof generated in {:.2?} ({} bytes, {} public inputs)",
            start.elapsed(),
            proof.len(),
            public_inputs.len()
        );

        Ok(ProofData {
            public_inputs,
            proof,
        })
    }

    async fn verify(&self, circuit: &CompiledCircuit, proof: &ProofData) -> Result<bool, BackendError> {
        let vk = self.verification_key(circuit).await?;

        let temp_dir = tempfile::tempdir()?;
        let proof_path = temp_dir.path().join("proof");
        let vk_path = temp_dir.path().join("vk");
        let public_inputs_path = temp_dir.path().join("public_inputs");

        tokio::fs::write(&proof_path, &proof.proof).await?;
        tokio::fs::write(&vk_path, vk.as_slice()).await?;
        tokio::fs::write(&public_inputs_path, encode_public_inputs(&proof.public_inputs)?).await?;

        tracing::info!("Verifying proof with bb...");
        let output = run_tool(
            &self.bb_bin,
            [
                OsStr::new("verify"),
                OsStr::new("-p"),
                proof_path.as_os_str(),
                OsStr::new("-k"),
                vk_path.as_os_str(),
                OsStr::new("-i"),
                public_inputs_path.as_os_str(),
            ],
            None,
        )
        .await
        .map_err(|source| self.spawn_error(&self.bb_bin, source))?;

        let is_valid = output.status.success();
        tracing::info!("Proof verification result: {}", is_valid);
        Ok(is_valid)
    }
}

async fn read_output(path: &Path) -> Result<Vec<u8>, BackendError> {
    match tokio::fs::read(path).await {
        Ok(bytes) => Ok(bytes),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            Err(BackendError::MissingOutput(path.to_path_buf()))
        }
        Err(e) => Err(e.into()),
    }
}

/// `bb` writes public inputs as concatenated 32-byte big-endian fields
pub fn decode_public_inputs(bytes: &[u8]) -> Result<Vec<String>, BackendError> {
    if bytes.len() % FIELD_BYTES != 0 {
        return Err(BackendError::InvalidPublicInputs(format!(
            "{} bytes is not a multiple of {}",
            bytes.len(),
            FIELD_BYTES
        )));
    }
    Ok(bytes
        .chunks(FIELD_BYTES)
        .map(|chunk| format!("0x{}", hex::encode(chunk)))
        .collect())
}

pub fn encode_public_inputs(public_inputs: &[String]) -> Result<Vec<u8>, BackendError> {
    let mut out = Vec::with_capacity(public_inputs.len() * FIELD_BYTES);
    for input in public_inputs {
        let field = parse_field(input)
            .ok_or_else(|| BackendError::InvalidPublicInputs(format!("not a field element: {}", input)))?;
        let hex_digits = field_to_hex(&field);
        let bytes = hex::decode(&hex_digits[2..])
            .map_err(|e| BackendError::InvalidPublicInputs(e.to_string()))?;
        out.extend_from_slice(&bytes);
    }
    Ok(out)
}

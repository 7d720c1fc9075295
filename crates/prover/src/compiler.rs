//! Compilation of generated circuits with `nargo`

use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use std::process::{Output, Stdio};

use async_trait::async_trait;
use sha2::{Digest, Sha256};
use thiserror::Error;
use tokio::process::Command;

use crate::circuit::CircuitSource;
use crate::config::ProverConfig;

#[derive(Debug, Error)]
pub enum CompileError {
    #[error("Failed to run {bin}: {source}")]
    Spawn {
        bin: String,
        #[source]
        source: std::io::Error,
    },

    #[error("nargo compile failed for package {package}: {stderr}")]
    Failed { package: String, stderr: String },

    #[error("Compiled artifact not found at {0}")]
    MissingArtifact(PathBuf),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// A Noir project: manifest plus the rendered `main.nr`
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NargoProject {
    pub package_name: String,
    pub manifest: String,
    pub source: String,
}

impl NargoProject {
    pub fn new(config: &ProverConfig, circuit: &CircuitSource) -> Self {
        Self {
            package_name: config.package_name.clone(),
            manifest: config.nargo_manifest(),
            source: circuit.render(),
        }
    }

    /// Write `Nargo.toml` and `src/main.nr` under `dir`
    pub async fn write_to(&self, dir: &Path) -> std::io::Result<()> {
        tokio::fs::create_dir_all(dir.join("src")).await?;
        tokio::fs::write(dir.join("Nargo.toml"), &self.manifest).await?;
        tokio::fs::write(dir.join("src").join("main.nr"), &self.source).await?;
        Ok(())
    }

    /// `target/<package>.json` relative to the project root
    pub fn artifact_path(&self, dir: &Path) -> PathBuf {
        dir.join("target").join(format!("{}.json", self.package_name))
    }
}

/// Output of a successful compilation
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CompiledCircuit {
    pub project: NargoProject,
    /// `nargo compile` JSON artifact (ACIR bytecode and ABI)
    pub artifact: Vec<u8>,
    /// Hex SHA-256 of `artifact`
    pub hash: String,
}

impl CompiledCircuit {
    pub fn new(project: NargoProject, artifact: Vec<u8>) -> Self {
        let hash = hex::encode(Sha256::digest(&artifact));
        Self {
            project,
            artifact,
            hash,
        }
    }
}

#[async_trait]
pub trait CircuitCompiler: Send + Sync {
    async fn compile(&self, project: &NargoProject) -> Result<CompiledCircuit, CompileError>;
}

/// Compiles with the `nargo` CLI in a scratch directory
#[derive(Clone, Debug)]
pub struct NargoCompiler {
    nargo_bin: PathBuf,
}

impl NargoCompiler {
    pub fn new(nargo_bin: impl Into<PathBuf>) -> Self {
        Self {
            nargo_bin: nargo_bin.into(),
        }
    }

    pub fn from_config(config: &ProverConfig) -> Self {
        Self::new(&config.nargo_bin)
    }
}

#[async_trait]
impl CircuitCompiler for NargoCompiler {
    async fn compile(&self, project: &NargoProject) -> Result<CompiledCircuit, CompileError> {
        let temp_dir = tempfile::tempdir()?;
        let dir = temp_dir.path();
        project.write_to(dir).await?;

        tracing::debug!("Compiling Noir source:\n{}", project.source);
        let output = run_tool(
            &self.nargo_bin,
            [OsStr::new("compile"), OsStr::new("--package"), OsStr::new(&project.package_name)],
            Some(dir),
        )
        .await
        .map_err(|source| CompileError::Spawn {
            bin: self.nargo_bin.display().to_string(),
            source,
        })?;

        if !output.status.success() {
            return Err(CompileError::Failed {
                package: project.package_name.clone(),
                stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            });
        }

        let artifact_path = project.artifact_path(dir);
        let artifact = match tokio::fs::read(&artifact_path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(CompileError::MissingArtifact(artifact_path))
            }
            Err(e) => return Err(e.into()),
        };

        Ok(CompiledCircuit::new(project.clone(), artifact))
    }
}

/// Run an external tool to completion; the child is killed if the future is
/// dropped
pub(crate) async fn run_tool<I, S>(bin: &Path, args: I, cwd: Option<&Path>) -> std::io::Result<Output>
where
    I: IntoIterator<Item = S>,
    S: AsRef<OsStr>,
{
    let mut cmd = Command::new(bin);
    cmd.args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);
    if let Some(dir) = cwd {
        cmd.current_dir(dir);
    }
    cmd.output().await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::circuit::synthesize;
    use zkmail_core::RevealRequests;

    #[tokio::test]
    async fn test_project_layout() {
        let config = ProverConfig::default();
        let project = NargoProject::new(&config, &synthesize(4, 4, &RevealRequests::default()).unwrap());
        let dir = tempfile::tempdir().unwrap();
        project.write_to(dir.path()).await.unwrap();

        let manifest = std::fs::read_to_string(dir.path().join("Nargo.toml")).unwrap();
        let main = std::fs::read_to_string(dir.path().join("src/main.nr")).unwrap();
        assert_eq!(manifest, config.nargo_manifest());
        assert!(main.starts_with("fn main("));
        assert_eq!(
            project.artifact_path(dir.path()),
            dir.path().join("target/zkemail_circuit.json")
        );
    }

    #[tokio::test]
    async fn test_missing_binary_is_spawn_error() {
        let config = ProverConfig::default();
        let project = NargoProject::new(&config, &synthesize(1, 1, &RevealRequests::default()).unwrap());
        let compiler = NargoCompiler::new("/nonexistent/nargo");
        let err = compiler.compile(&project).await.unwrap_err();
        assert!(matches!(err, CompileError::Spawn { .. }));
    }

    #[test]
    fn test_hash_depends_on_artifact() {
        let project = NargoProject {
            package_name: "p".into(),
            manifest: String::new(),
            source: String::new(),
        };
        let a = CompiledCircuit::new(project.clone(), b"{}".to_vec());
        let b = CompiledCircuit::new(project, b"{ }".to_vec());
        assert_eq!(a.hash.len(), 64);
        assert_ne!(a.hash, b.hash);
    }
}

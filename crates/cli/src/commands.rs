//! CLI command implementations

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use zkmail_core::{RevealRequest, RevealRequests};
use zkmail_prover::{EmailProof, EmailProver, ProverConfig};

/// zkmail - prove what a DKIM-signed email says without revealing the rest
#[derive(Parser)]
#[command(name = "zkmail")]
#[command(about = "Selective-disclosure zero-knowledge proofs for DKIM-signed email")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Abort the operation after this many seconds
    #[arg(long, global = true)]
    pub timeout: Option<u64>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Verify an email's DKIM signature and show what can be proven
    Inspect {
        /// Raw email (.eml)
        email: PathBuf,

        /// Domain to verify for (default: the From domain)
        #[arg(long)]
        domain: Option<String>,
    },

    /// Generate a proof revealing parts of an email
    Prove {
        /// Raw email (.eml)
        email: PathBuf,

        /// Domain to verify for (default: the From domain)
        #[arg(long)]
        domain: Option<String>,

        /// Header reveal as OFFSET:TEXT (repeatable)
        #[arg(long = "header", value_parser = parse_reveal)]
        headers: Vec<RevealRequest>,

        /// Body reveal as OFFSET:TEXT (repeatable)
        #[arg(long = "body", value_parser = parse_reveal)]
        body: Vec<RevealRequest>,

        /// Output file (default: stdout)
        #[arg(short, long)]
        out: Option<PathBuf>,
    },

    /// Verify a proof and print the revealed text
    Verify {
        /// Proof JSON
        proof: PathBuf,
    },
}

/// Parse `OFFSET:TEXT`
pub fn parse_reveal(s: &str) -> Result<RevealRequest, String> {
    let (offset, part) = s
        .split_once(':')
        .ok_or_else(|| format!("expected OFFSET:TEXT, got {:?}", s))?;
    let from_index = offset
        .trim()
        .parse()
        .map_err(|e| format!("invalid offset {:?}: {}", offset, e))?;
    if part.is_empty() {
        return Err("reveal text must not be empty".to_string());
    }
    Ok(RevealRequest::new(from_index, part))
}

/// Run the CLI
pub async fn run(cli: Cli) -> Result<()> {
    let prover = EmailProver::from_config(ProverConfig::from_env())?;

    let task = execute(&prover, cli.command);
    match cli.timeout {
        Some(secs) => tokio::time::timeout(Duration::from_secs(secs), task)
            .await
            .with_context(|| format!("timed out after {}s", secs))?,
        None => task.await,
    }
}

async fn execute<R, C, B>(prover: &EmailProver<R, C, B>, command: Commands) -> Result<()>
where
    R: zkmail_core::KeyResolver,
    C: zkmail_prover::CircuitCompiler,
    B: zkmail_prover::ProvingBackend,
{
    match command {
        Commands::Inspect { email, domain } => {
            let raw = std::fs::read(&email).with_context(|| format!("reading {}", email.display()))?;
            let signed = prover.verify_email(&raw, domain.as_deref()).await?;

            println!("Domain:       {}", signed.dkim_signature.domain);
            println!("Selector:     {}", signed.dkim_signature.selector);
            println!("Headers:      {} bytes", signed.headers.len());
            println!("Body:         {} bytes", signed.body.len());
            match &signed.sanitization {
                Some(s) => println!("Sanitization: {}", s),
                None => println!("Sanitization: none"),
            }
            println!("\n--- signed headers ---\n{}", signed.headers_str());
        }

        Commands::Prove {
            email,
            domain,
            headers,
            body,
            out,
        } => {
            let raw = std::fs::read(&email).with_context(|| format!("reading {}", email.display()))?;
            let signed = prover.verify_email(&raw, domain.as_deref()).await?;
            let reveals = RevealRequests::new(headers, body);

            let preview = prover.preview(signed.headers.len(), signed.body.len(), &reveals)?;
            tracing::info!("Revealing headers: {}", preview.headers);

            let proof = prover.prove(&signed, &reveals).await?;
            let json = proof.to_json()?;
            match out {
                Some(path) => {
                    std::fs::write(&path, json).with_context(|| format!("writing {}", path.display()))?;
                    println!("Proof written to {}", path.display());
                }
                None => println!("{}", json),
            }
        }

        Commands::Verify { proof } => {
            let json = std::fs::read_to_string(&proof)
                .with_context(|| format!("reading {}", proof.display()))?;
            let proof = EmailProof::from_json(&json)?;
            let verified = prover.verify(&proof).await?;

            println!("Proof is valid");
            println!("Domain:   {}", verified.dkim_signature.domain);
            println!("Selector: {}", verified.dkim_signature.selector);
            println!("\n--- headers ---\n{}", verified.reconstructed.headers);
            println!("\n--- body ---\n{}", verified.reconstructed.body);
        }
    }
    Ok(())
}

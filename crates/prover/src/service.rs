//! Proving and verifying selective disclosures of DKIM-signed emails

use std::sync::Arc;
use std::time::Instant;

use zkmail_core::reveal::reconstruct_email;
use zkmail_core::utils::field_to_hex;
use zkmail_core::{
    encode_limbs, DkimSignature, DkimVerifier, DohResolver, Field, KeyResolver, Reconstructed,
    RevealRequests, SignedEmail,
};

use crate::backend::{Barretenberg, ProvingBackend};
use crate::cache::CompileCache;
use crate::circuit::{synthesize, CircuitSource};
use crate::compiler::{CircuitCompiler, CompiledCircuit, NargoCompiler, NargoProject};
use crate::config::ProverConfig;
use crate::error::{ProverError, ProverResult};
use crate::inputs::{CircuitInputs, PublicInputs};
use crate::proof::EmailProof;

/// Outcome of a successful verification
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct VerifiedEmail {
    pub dkim_signature: DkimSignature,
    pub reconstructed: Reconstructed,
}

pub struct EmailProver<R, C, B> {
    config: ProverConfig,
    verifier: DkimVerifier<R>,
    cache: CompileCache<C>,
    backend: B,
}

impl EmailProver<DohResolver, NargoCompiler, Barretenberg> {
    /// DoH key resolution, `nargo` compilation and `bb` proving
    pub fn from_config(config: ProverConfig) -> ProverResult<Self> {
        let resolver = DohResolver::new(&config.doh_endpoint)?;
        let compiler = NargoCompiler::from_config(&config);
        let backend = Barretenberg::from_config(&config);
        Ok(Self::new(config, resolver, compiler, backend))
    }
}

impl<R, C, B> EmailProver<R, C, B>
where
    R: KeyResolver,
    C: CircuitCompiler,
    B: ProvingBackend,
{
    pub fn new(config: ProverConfig, resolver: R, compiler: C, backend: B) -> Self {
        let mut verifier = DkimVerifier::new(resolver);
        if !config.sanitize {
            verifier = verifier.without_sanitization();
        }
        let cache = CompileCache::new(compiler, config.cache_capacity);
        Self {
            config,
            verifier,
            cache,
            backend,
        }
    }

    pub fn config(&self) -> &ProverConfig {
        &self.config
    }

    pub fn cache(&self) -> &CompileCache<C> {
        &self.cache
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// Verify the DKIM signature of `raw` for `domain`, or for the sender's
    /// domain when `None`
    pub async fn verify_email(&self, raw: &[u8], domain: Option<&str>) -> ProverResult<SignedEmail> {
        Ok(self.verifier.verify(raw, domain).await?)
    }

    /// Synthesize the circuit and its Noir project
    pub fn circuit(
        &self,
        headers_len: usize,
        body_len: usize,
        reveals: &RevealRequests,
    ) -> ProverResult<(CircuitSource, NargoProject)> {
        let source = synthesize(headers_len, body_len, reveals)?;
        let project = NargoProject::new(&self.config, &source);
        Ok((source, project))
    }

    async fn compile(&self, project: &NargoProject) -> ProverResult<Arc<CompiledCircuit>> {
        tracing::info!("Compiling circuit...");
        Ok(self.cache.compile(project).await?)
    }

    /// Prove that `email` contains `reveals`
    pub async fn prove(&self, email: &SignedEmail, reveals: &RevealRequests) -> ProverResult<EmailProof> {
        let headers_len = email.headers.len();
        let body_len = email.body.len();

        // Bounds and overlapping reveals are rejected before any compile work
        reconstruct_email(headers_len, body_len, reveals)?;

        let (source, project) = self.circuit(headers_len, body_len, reveals)?;
        let limbs = encode_limbs(
            &email.public_key_base64,
            &email.dkim_signature.signature_base64,
        )?;
        let inputs = CircuitInputs::new(
            &source,
            email.headers.clone(),
            email.body.clone(),
            reveals,
            &limbs,
        )?;

        let circuit = self.compile(&project).await?;

        let start = Instant::now();
        let witness = self.backend.execute(&circuit, &inputs).await?;
        let proof = self.backend.prove(&circuit, &witness).await?;
        tracing::info!(
            "Proved {} header and {} body reveals for {} in {:.2?}",
            reveals.headers_reveals.len(),
            reveals.body_reveals.len(),
            email.dkim_signature.domain,
            start.elapsed()
        );

        check_public_inputs(&inputs.public_values(), &proof.public_input_fields(), &proof.public_inputs)?;

        Ok(EmailProof {
            proof,
            headers_len,
            body_len,
            dkim_signature: email.dkim_signature.clone(),
            headers_reveals: reveals.headers_reveals.clone(),
            body_reveals: reveals.body_reveals.clone(),
        })
    }

    /// Public input sequence `proof` must carry, derived from its declared
    /// reveals and the signer's key as currently published in DNS
    pub async fn expected_public_inputs(&self, proof: &EmailProof) -> ProverResult<Vec<Field>> {
        let reveals = proof.reveals();
        let source = synthesize(proof.headers_len, proof.body_len, &reveals)?;

        let signature = &proof.dkim_signature;
        let public_key = self
            .verifier
            .resolver()
            .resolve(&signature.selector, &signature.domain)
            .await?;
        let limbs = encode_limbs(&public_key, &signature.signature_base64)?;

        Ok(PublicInputs::assign(&source, &reveals, &limbs)?.flatten())
    }

    /// Verify `proof` and reconstruct what it discloses
    pub async fn verify(&self, proof: &EmailProof) -> ProverResult<VerifiedEmail> {
        let reveals = proof.reveals();

        // Declared reveals must match the committed public inputs before
        // anything is reconstructed from them
        let expected = self.expected_public_inputs(proof).await?;
        check_public_inputs(&expected, &proof.proof.public_input_fields(), &proof.proof.public_inputs)?;

        let (_, project) = self.circuit(proof.headers_len, proof.body_len, &reveals)?;
        let circuit = self.compile(&project).await?;
        if !self.backend.verify(&circuit, &proof.proof).await? {
            return Err(ProverError::InvalidProof);
        }

        let reconstructed = reconstruct_email(proof.headers_len, proof.body_len, &reveals)?;

        tracing::info!(
            "Verified proof for {} (selector {})",
            proof.dkim_signature.domain,
            proof.dkim_signature.selector
        );
        Ok(VerifiedEmail {
            dkim_signature: proof.dkim_signature.clone(),
            reconstructed,
        })
    }

    /// Reconstruct without verifying; for showing a prover what a proof
    /// will disclose
    pub fn preview(
        &self,
        headers_len: usize,
        body_len: usize,
        reveals: &RevealRequests,
    ) -> ProverResult<Reconstructed> {
        Ok(reconstruct_email(headers_len, body_len, reveals)?)
    }
}

/// Element-wise comparison; a count mismatch is reported before any element
fn check_public_inputs(expected: &[Field], actual: &[Option<Field>], raw: &[String]) -> ProverResult<()> {
    if expected.len() != actual.len() {
        return Err(ProverError::PublicInputLengthMismatch {
            expected: expected.len(),
            actual: actual.len(),
        });
    }
    for (index, (e, a)) in expected.iter().zip(actual).enumerate() {
        if Some(*e) != *a {
            return Err(ProverError::PublicInputMismatch {
                index,
                expected: field_to_hex(e),
                actual: raw.get(index).cloned().unwrap_or_default(),
            });
        }
    }
    Ok(())
}

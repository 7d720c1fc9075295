//! DKIM signing for tests
//!
//! Signatures are computed with `viadkim`'s signing-side hashing
//! (`message_hash::compute_data_hash`) and RSA primitives, not with the
//! verifier's own selection and blanking code. Generating a 2048-bit key is
//! slow, so [`test_signer`] shares one per test binary.

use std::sync::OnceLock;

use rsa::pkcs8::EncodePublicKey;
use rsa::{RsaPrivateKey, RsaPublicKey};
use viadkim::canonicalize::BodyCanonicalizer;
use viadkim::crypto::{digest, sign_rsa, HashAlgorithm};
use viadkim::header::{FieldName, HeaderFields};
use viadkim::message_hash::compute_data_hash;
use viadkim::signature::{Canonicalization, CanonicalizationAlgorithm, DKIM_SIGNATURE_NAME};

use crate::dns::StaticKeyResolver;
use crate::key::encode_base64;

pub const TEST_DOMAIN: &str = "example.com";
pub const TEST_SELECTOR: &str = "s1";

pub struct TestSigner {
    key: RsaPrivateKey,
    pub domain: String,
    pub selector: String,
}

impl TestSigner {
    pub fn generate(domain: &str, selector: &str) -> Self {
        let mut rng = rand::thread_rng();
        let key = RsaPrivateKey::new(&mut rng, 2048).expect("RSA key generation");
        Self {
            key,
            domain: domain.to_string(),
            selector: selector.to_string(),
        }
    }

    pub fn private_key(&self) -> &RsaPrivateKey {
        &self.key
    }

    pub fn public_key(&self) -> RsaPublicKey {
        RsaPublicKey::from(&self.key)
    }

    pub fn public_key_base64(&self) -> String {
        let der = self.public_key().to_public_key_der().expect("SPKI encoding");
        encode_base64(der.as_bytes())
    }

    pub fn resolver(&self) -> StaticKeyResolver {
        StaticKeyResolver::new().with_key(&self.selector, &self.domain, self.public_key_base64())
    }

    /// Raw signature bytes over `data`'s SHA-256
    pub fn sign_bytes(&self, data: &[u8]) -> Vec<u8> {
        sign_rsa(HashAlgorithm::Sha256, &self.key, &digest(HashAlgorithm::Sha256, data))
            .expect("RSA signing")
    }

    /// Build a relaxed/relaxed signed message with every header signed
    pub fn sign(&self, headers: &[(&str, &str)], body: &str) -> Vec<u8> {
        self.sign_with(
            headers,
            body,
            Canonicalization::from((CanonicalizationAlgorithm::Relaxed, CanonicalizationAlgorithm::Relaxed)),
        )
    }

    pub fn sign_with(
        &self,
        headers: &[(&str, &str)],
        body: &str,
        canonicalization: Canonicalization,
    ) -> Vec<u8> {
        let fields = HeaderFields::from_vec(
            headers
                .iter()
                .map(|(name, value)| (name.to_string(), format!(" {}", value).into_bytes()))
                .collect(),
        )
        .expect("header fields");
        let signed: Vec<FieldName> = headers
            .iter()
            .map(|(name, _)| FieldName::new(name.to_ascii_lowercase()).expect("field name"))
            .collect();

        let mut canonicalizer = BodyCanonicalizer::new(canonicalization.body);
        let mut canonical_body = canonicalizer.canonicalize_chunk(body.as_bytes()).into_owned();
        canonical_body.extend_from_slice(&canonicalizer.finish());
        let body_hash = encode_base64(&digest(HashAlgorithm::Sha256, &canonical_body));

        let names: Vec<&str> = signed.iter().map(|n| n.as_ref()).collect();
        let unsigned_value = format!(
            " v=1; a=rsa-sha256; c={}; d={}; s={};\r\n\th={}; bh={}; b=",
            canonicalization,
            self.domain,
            self.selector,
            names.join(":"),
            body_hash
        );

        let data_hash = compute_data_hash(
            HashAlgorithm::Sha256,
            canonicalization.header,
            &fields,
            &signed,
            DKIM_SIGNATURE_NAME,
            &unsigned_value,
        );
        let signature = sign_rsa(HashAlgorithm::Sha256, &self.key, &data_hash).expect("RSA signing");

        let mut raw = format!(
            "{}:{}{}\r\n",
            DKIM_SIGNATURE_NAME,
            unsigned_value,
            encode_base64(&signature)
        );
        for (name, value) in headers {
            raw.push_str(&format!("{}: {}\r\n", name, value));
        }
        raw.push_str("\r\n");
        raw.push_str(body);
        raw.into_bytes()
    }
}

/// Shared signer for `example.com` / `s1`
pub fn test_signer() -> &'static TestSigner {
    static SIGNER: OnceLock<TestSigner> = OnceLock::new();
    SIGNER.get_or_init(|| TestSigner::generate(TEST_DOMAIN, TEST_SELECTOR))
}

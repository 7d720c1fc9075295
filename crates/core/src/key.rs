//! Decoding of DKIM RSA public keys
//!
//! `p=` values are normally a base64 SubjectPublicKeyInfo; some providers
//! publish a bare PKCS#1 `RSAPublicKey`, so both are accepted.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use num_bigint::BigUint;
use rsa::traits::PublicKeyParts;
use rsa::RsaPublicKey;
use thiserror::Error;
use viadkim::crypto::read_rsa_public_key;

#[derive(Debug, Error)]
pub enum KeyError {
    #[error("invalid base64: {0}")]
    Base64(#[from] base64::DecodeError),

    #[error("not a DER encoded RSA public key")]
    Der,
}

pub fn decode_public_key(public_key_base64: &str) -> Result<RsaPublicKey, KeyError> {
    let der = decode_base64(public_key_base64)?;
    read_rsa_public_key(&der).map_err(|_| KeyError::Der)
}

/// RSA modulus of a base64 DKIM key
pub fn public_key_modulus(public_key_base64: &str) -> Result<BigUint, KeyError> {
    let key = decode_public_key(public_key_base64)?;
    Ok(BigUint::from_bytes_be(&key.n().to_bytes_be()))
}

/// Decode standard base64, ignoring embedded whitespace
pub fn decode_base64(value: &str) -> Result<Vec<u8>, base64::DecodeError> {
    let compact: String = value.chars().filter(|c| !c.is_ascii_whitespace()).collect();
    BASE64.decode(compact)
}

pub fn encode_base64(bytes: &[u8]) -> String {
    BASE64.encode(bytes)
}

/// Left-pad a big-endian integer with zero bytes to `width`; longer input is
/// returned unchanged
pub fn pad_to_width(bytes: &[u8], width: usize) -> Vec<u8> {
    let mut out = vec![0u8; width.saturating_sub(bytes.len())];
    out.extend_from_slice(bytes);
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use rsa::pkcs1::EncodeRsaPublicKey;
    use rsa::pkcs8::EncodePublicKey;
    use rsa::RsaPrivateKey;

    #[test]
    fn test_decode_spki_and_pkcs1() {
        let mut rng = rand::thread_rng();
        let private = RsaPrivateKey::new(&mut rng, 1024).unwrap();
        let public = RsaPublicKey::from(&private);

        let spki = encode_base64(public.to_public_key_der().unwrap().as_bytes());
        let pkcs1 = encode_base64(public.to_pkcs1_der().unwrap().as_bytes());

        assert_eq!(decode_public_key(&spki).unwrap(), public);
        assert_eq!(decode_public_key(&pkcs1).unwrap(), public);
        assert_eq!(
            public_key_modulus(&spki).unwrap(),
            BigUint::from_bytes_be(&public.n().to_bytes_be())
        );
    }

    #[test]
    fn test_decode_rejects_garbage() {
        assert!(matches!(decode_public_key("not base64!"), Err(KeyError::Base64(_))));
        assert!(matches!(decode_public_key("AAAA"), Err(KeyError::Der)));
    }

    #[test]
    fn test_pad_to_width() {
        assert_eq!(pad_to_width(&[1, 2], 4), vec![0, 0, 1, 2]);
        assert_eq!(pad_to_width(&[1, 2, 3], 3), vec![1, 2, 3]);
        assert_eq!(pad_to_width(&[1, 2, 3], 2), vec![1, 2, 3]);
        assert_eq!(pad_to_width(&[], 256).len(), 256);
    }

    #[test]
    fn test_decode_base64_ignores_whitespace() {
        assert_eq!(decode_base64("aGVs\r\n bG8=").unwrap(), b"hello");
    }
}

//! Big-integer limb encoding of RSA key material for the circuit
//!
//! The circuit's big-number library works on 2048-bit values split into
//! 18 little-endian limbs of 120 bits. Alongside the modulus it needs a
//! Barrett reduction parameter `floor(2^(2*2048 + 4) / n)`.

use ark_ff::PrimeField;
use num_bigint::BigUint;
use num_traits::{One, Zero};
use thiserror::Error;

use crate::key::{decode_base64, public_key_modulus, KeyError};
use crate::utils::field_to_biguint;
use crate::Field;

/// Bits per limb
pub const LIMB_BITS: usize = 120;

/// `zkemail::PUBKEY_LIMBS_LEN`
pub const PUBKEY_LIMBS_LEN: usize = 18;

/// `zkemail::SIGNATURE_LIMBS_LEN`
pub const SIGNATURE_LIMBS_LEN: usize = 18;

/// Modulus size the circuit is instantiated for
pub const RSA_MODULUS_BITS: u64 = 2048;

/// Barrett reduction overflow bits used by the circuit library
const BARRETT_OVERFLOW_BITS: usize = 4;

#[derive(Debug, Error)]
pub enum LimbError {
    #[error("Invalid public key: {0}")]
    Key(#[from] KeyError),

    #[error("Invalid signature base64: {0}")]
    Signature(#[from] base64::DecodeError),

    #[error("Unsupported RSA key size: {0} bits (expected {RSA_MODULUS_BITS})")]
    UnsupportedKeySize(u64),

    #[error("Signature is not smaller than the modulus")]
    SignatureOutOfRange,

    #[error("Value does not fit in {limbs} limbs of {LIMB_BITS} bits")]
    Overflow { limbs: usize },
}

/// RSA key material as circuit public inputs
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PublicKeyLimbs {
    pub public_key_limbs: Vec<Field>,
    pub public_key_redc_limbs: Vec<Field>,
    pub signature_limbs: Vec<Field>,
}

impl PublicKeyLimbs {
    /// Modulus, reduction parameter, signature; the order they appear in
    /// the circuit's public inputs
    pub fn public_inputs(&self) -> impl Iterator<Item = &Field> {
        self.public_key_limbs
            .iter()
            .chain(self.public_key_redc_limbs.iter())
            .chain(self.signature_limbs.iter())
    }
}

/// Encode a base64 DKIM public key and a base64 signature
pub fn encode_limbs(
    public_key_base64: &str,
    signature_base64: &str,
) -> Result<PublicKeyLimbs, LimbError> {
    let modulus = public_key_modulus(public_key_base64)?;
    if modulus.bits() != RSA_MODULUS_BITS {
        return Err(LimbError::UnsupportedKeySize(modulus.bits()));
    }

    let signature = BigUint::from_bytes_be(&decode_base64(signature_base64)?);
    if signature >= modulus {
        return Err(LimbError::SignatureOutOfRange);
    }

    let redc = redc_parameter(&modulus);

    Ok(PublicKeyLimbs {
        public_key_limbs: split_into_limbs(&modulus, PUBKEY_LIMBS_LEN)?,
        public_key_redc_limbs: split_into_limbs(&redc, PUBKEY_LIMBS_LEN)?,
        signature_limbs: split_into_limbs(&signature, SIGNATURE_LIMBS_LEN)?,
    })
}

/// `floor(2^(2 * 2048 + 4) / modulus)`
pub fn redc_parameter(modulus: &BigUint) -> BigUint {
    let shift = 2 * RSA_MODULUS_BITS as usize + BARRETT_OVERFLOW_BITS;
    (BigUint::one() << shift) / modulus
}

/// Little-endian limbs of `LIMB_BITS` bits
pub fn split_into_limbs(value: &BigUint, count: usize) -> Result<Vec<Field>, LimbError> {
    let mask = (BigUint::one() << LIMB_BITS) - BigUint::one();
    let mut rest = value.clone();
    let mut limbs = Vec::with_capacity(count);

    for _ in 0..count {
        let limb = &rest & &mask;
        limbs.push(Field::from_le_bytes_mod_order(&limb.to_bytes_le()));
        rest >>= LIMB_BITS;
    }

    if !rest.is_zero() {
        return Err(LimbError::Overflow { limbs: count });
    }
    Ok(limbs)
}

/// Inverse of [`split_into_limbs`]
pub fn join_limbs(limbs: &[Field]) -> BigUint {
    limbs
        .iter()
        .rev()
        .fold(BigUint::zero(), |acc, limb| (acc << LIMB_BITS) + field_to_biguint(limb))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::key::encode_base64;
    use crate::test_utils::test_signer;
    use proptest::prelude::*;
    use rsa::traits::PublicKeyParts;

    fn signer_modulus() -> BigUint {
        BigUint::from_bytes_be(&test_signer().public_key().n().to_bytes_be())
    }

    #[test]
    fn test_encode_limbs_roundtrips_values() {
        let signer = test_signer();
        let signature = signer.sign_bytes(b"hello");
        let limbs = encode_limbs(&signer.public_key_base64(), &encode_base64(&signature)).unwrap();

        assert_eq!(limbs.public_key_limbs.len(), PUBKEY_LIMBS_LEN);
        assert_eq!(limbs.public_key_redc_limbs.len(), PUBKEY_LIMBS_LEN);
        assert_eq!(limbs.signature_limbs.len(), SIGNATURE_LIMBS_LEN);

        let modulus = signer_modulus();
        assert_eq!(join_limbs(&limbs.public_key_limbs), modulus);
        assert_eq!(join_limbs(&limbs.public_key_redc_limbs), redc_parameter(&modulus));
        assert_eq!(join_limbs(&limbs.signature_limbs), BigUint::from_bytes_be(&signature));
        assert_eq!(limbs.public_inputs().count(), 2 * PUBKEY_LIMBS_LEN + SIGNATURE_LIMBS_LEN);
    }

    #[test]
    fn test_encode_limbs_is_deterministic() {
        let signer = test_signer();
        let signature = encode_base64(&signer.sign_bytes(b"payload"));
        let a = encode_limbs(&signer.public_key_base64(), &signature).unwrap();
        let b = encode_limbs(&signer.public_key_base64(), &signature).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_redc_parameter_bounds() {
        let modulus = signer_modulus();
        let redc = redc_parameter(&modulus);
        let shifted = BigUint::one() << (2 * RSA_MODULUS_BITS as usize + BARRETT_OVERFLOW_BITS);
        assert!(&redc * &modulus <= shifted);
        assert!((&redc + BigUint::one()) * &modulus > shifted);
    }

    #[test]
    fn test_signature_out_of_range() {
        let signer = test_signer();
        let too_big = encode_base64(&signer_modulus().to_bytes_be());
        let err = encode_limbs(&signer.public_key_base64(), &too_big).unwrap_err();
        assert!(matches!(err, LimbError::SignatureOutOfRange));
    }

    #[test]
    fn test_split_overflow() {
        let value = BigUint::one() << (LIMB_BITS * 2);
        assert!(matches!(
            split_into_limbs(&value, 2),
            Err(LimbError::Overflow { limbs: 2 })
        ));
    }

    proptest! {
        #[test]
        fn prop_limb_count_is_fixed(bytes in proptest::collection::vec(any::<u8>(), 0..256)) {
            let value = BigUint::from_bytes_be(&bytes);
            let limbs = split_into_limbs(&value, PUBKEY_LIMBS_LEN).unwrap();
            prop_assert_eq!(limbs.len(), PUBKEY_LIMBS_LEN);
            prop_assert_eq!(join_limbs(&limbs), value);
            let bound = BigUint::one() << LIMB_BITS;
            for limb in &limbs {
                prop_assert!(field_to_biguint(limb) < bound);
                prop_assert!(limb.into_bigint() < Field::MODULUS);
            }
        }
    }
}

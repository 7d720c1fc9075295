use ark_ff::{BigInteger, PrimeField};
use num_bigint::BigUint;

use crate::Field;

/// `0x`-prefixed, 32-byte big-endian hex, the encoding `bb` uses for public
/// inputs
pub fn field_to_hex(f: &Field) -> String {
    let bytes = f.into_bigint().to_bytes_be();
    format!("0x{}", hex::encode(bytes))
}

pub fn field_to_biguint(f: &Field) -> BigUint {
    BigUint::from_bytes_be(&f.into_bigint().to_bytes_be())
}

/// `None` if `value` is not below the field modulus
pub fn biguint_to_field(value: &BigUint) -> Option<Field> {
    if value >= &field_modulus() {
        return None;
    }
    Some(Field::from_be_bytes_mod_order(&value.to_bytes_be()))
}

/// Parse a public input as produced by a proving backend: `0x` hex or
/// decimal. Values outside the field are rejected rather than reduced.
pub fn parse_field(s: &str) -> Option<Field> {
    let s = s.trim();
    let value = match s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        Some(hex_digits) if hex_digits.is_empty() => return None,
        Some(hex_digits) => BigUint::parse_bytes(hex_digits.as_bytes(), 16)?,
        None => BigUint::parse_bytes(s.as_bytes(), 10)?,
    };
    biguint_to_field(&value)
}

pub fn field_modulus() -> BigUint {
    BigUint::from_bytes_be(&Field::MODULUS.to_bytes_be())
}

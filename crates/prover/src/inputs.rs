//! Values for the circuit's parameters
//!
//! Inputs are assigned by walking [`CircuitSource::params`], so public values
//! come out in declaration order and the layout a verifier recomputes is the
//! layout the circuit was built with.

use zkmail_core::utils::field_to_hex;
use zkmail_core::{Field, PublicKeyLimbs, RevealRequest, RevealRequests, RevealTarget};

use crate::circuit::{CircuitSource, Ident, Param, ParamType, Visibility};
use crate::error::{ProverError, ProverResult};

/// Value of one parameter
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum InputValue {
    Bytes(Vec<u8>),
    Reveal { from_index: usize, part: Vec<u8> },
    Fields(Vec<Field>),
}

impl InputValue {
    /// Field elements this value contributes to the public inputs
    pub fn to_fields(&self) -> Vec<Field> {
        match self {
            Self::Bytes(bytes) => bytes.iter().map(|b| Field::from(*b as u64)).collect(),
            Self::Reveal { from_index, part } => std::iter::once(Field::from(*from_index as u64))
                .chain(part.iter().map(|b| Field::from(*b as u64)))
                .collect(),
            Self::Fields(fields) => fields.clone(),
        }
    }
}

/// Public parameter values in declaration order
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PublicInputs {
    values: Vec<(Ident, InputValue)>,
}

impl PublicInputs {
    /// Assign reveals and limbs to the public parameters of `source`
    pub fn assign(
        source: &CircuitSource,
        reveals: &RevealRequests,
        limbs: &PublicKeyLimbs,
    ) -> ProverResult<Self> {
        let values = source
            .public_params()
            .map(|param| Ok((param.ident, public_value(param, reveals, limbs)?)))
            .collect::<ProverResult<Vec<_>>>()?;
        Ok(Self { values })
    }

    pub fn values(&self) -> &[(Ident, InputValue)] {
        &self.values
    }

    /// Flattened public input sequence
    pub fn flatten(&self) -> Vec<Field> {
        self.values.iter().flat_map(|(_, v)| v.to_fields()).collect()
    }
}

/// Full witness input: private buffers plus public values
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CircuitInputs {
    pub headers: Vec<u8>,
    pub body: Vec<u8>,
    pub public: PublicInputs,
}

impl CircuitInputs {
    pub fn new(
        source: &CircuitSource,
        headers: Vec<u8>,
        body: Vec<u8>,
        reveals: &RevealRequests,
        limbs: &PublicKeyLimbs,
    ) -> ProverResult<Self> {
        for (target, buffer) in [(RevealTarget::Headers, &headers), (RevealTarget::Body, &body)] {
            let ident = Ident::Buffer(target);
            match source.param(ident).map(|p| p.ty) {
                Some(ParamType::Bytes(len)) if len == buffer.len() => {}
                Some(ty) => {
                    return Err(invalid(
                        ident,
                        format!("{} bytes given for {}", buffer.len(), ty),
                    ))
                }
                None => return Err(invalid(ident, "not a circuit parameter")),
            }
        }

        Ok(Self {
            headers,
            body,
            public: PublicInputs::assign(source, reveals, limbs)?,
        })
    }

    /// Public input sequence the proof will carry
    pub fn public_values(&self) -> Vec<Field> {
        self.public.flatten()
    }

    /// Render as `Prover.toml` for `nargo execute`
    pub fn to_prover_toml(&self) -> String {
        let mut lines = Vec::new();
        let mut tables = Vec::new();

        lines.push(format!(
            "{} = {}",
            Ident::Buffer(RevealTarget::Headers),
            bytes_to_toml_array(&self.headers)
        ));
        lines.push(format!(
            "{} = {}",
            Ident::Buffer(RevealTarget::Body),
            bytes_to_toml_array(&self.body)
        ));

        for (ident, value) in &self.public.values {
            match value {
                InputValue::Bytes(bytes) => {
                    lines.push(format!("{} = {}", ident, bytes_to_toml_array(bytes)))
                }
                InputValue::Fields(fields) => {
                    let strs: Vec<String> = fields
                        .iter()
                        .map(|f| format!("\"{}\"", field_to_hex(f)))
                        .collect();
                    lines.push(format!("{} = [{}]", ident, strs.join(", ")));
                }
                // Structs are TOML tables and must follow all plain keys
                InputValue::Reveal { from_index, part } => {
                    tables.push(format!(
                        "[{}]\nfrom_index = \"{}\"\npart = {}",
                        ident,
                        from_index,
                        bytes_to_toml_array(part)
                    ));
                }
            }
        }

        lines.extend(tables);
        let mut toml = lines.join("\n");
        toml.push('\n');
        toml
    }
}

fn public_value(
    param: &Param,
    reveals: &RevealRequests,
    limbs: &PublicKeyLimbs,
) -> ProverResult<InputValue> {
    debug_assert_eq!(param.visibility, Visibility::Public);

    match (param.ident, param.ty) {
        (Ident::Reveal { target, index }, ParamType::RevealStringPart(len)) => {
            let request = reveals
                .get(target)
                .get(index)
                .ok_or_else(|| invalid(param.ident, "no matching reveal request"))?;
            reveal_value(param.ident, request, len)
        }
        (Ident::PubkeyLimbs, ParamType::Limbs(len)) => {
            limbs_value(param.ident, &limbs.public_key_limbs, len.count())
        }
        (Ident::PubkeyRedcLimbs, ParamType::Limbs(len)) => {
            limbs_value(param.ident, &limbs.public_key_redc_limbs, len.count())
        }
        (Ident::SignatureLimbs, ParamType::Limbs(len)) => {
            limbs_value(param.ident, &limbs.signature_limbs, len.count())
        }
        (ident, ty) => Err(invalid(ident, format!("unexpected public parameter of type {}", ty))),
    }
}

fn reveal_value(ident: Ident, request: &RevealRequest, len: usize) -> ProverResult<InputValue> {
    if request.bytes().len() != len {
        return Err(invalid(
            ident,
            format!("part has {} bytes, circuit expects {}", request.bytes().len(), len),
        ));
    }
    Ok(InputValue::Reveal {
        from_index: request.from_index,
        part: request.bytes().to_vec(),
    })
}

fn limbs_value(ident: Ident, limbs: &[Field], count: usize) -> ProverResult<InputValue> {
    if limbs.len() != count {
        return Err(invalid(
            ident,
            format!("{} limbs given, circuit expects {}", limbs.len(), count),
        ));
    }
    Ok(InputValue::Fields(limbs.to_vec()))
}

fn invalid(ident: Ident, reason: impl Into<String>) -> ProverError {
    ProverError::InvalidInput {
        ident: ident.to_string(),
        reason: reason.into(),
    }
}

fn bytes_to_toml_array(bytes: &[u8]) -> String {
    let strs: Vec<String> = bytes.iter().map(|b| format!("\"{}\"", b)).collect();
    format!("[{}]", strs.join(", "))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::circuit::synthesize;
    use zkmail_core::limbs::{PUBKEY_LIMBS_LEN, SIGNATURE_LIMBS_LEN};

    fn limbs() -> PublicKeyLimbs {
        PublicKeyLimbs {
            public_key_limbs: (0..PUBKEY_LIMBS_LEN as u64).map(Field::from).collect(),
            public_key_redc_limbs: (100..100 + PUBKEY_LIMBS_LEN as u64).map(Field::from).collect(),
            signature_limbs: (200..200 + SIGNATURE_LIMBS_LEN as u64).map(Field::from).collect(),
        }
    }

    fn reveals() -> RevealRequests {
        RevealRequests::new(
            vec![RevealRequest::new(9, "Hi"), RevealRequest::new(1, "b")],
            vec![RevealRequest::new(0, "z")],
        )
    }

    #[test]
    fn test_public_layout() {
        let reveals = reveals();
        let source = synthesize(16, 4, &reveals).unwrap();
        let public = PublicInputs::assign(&source, &reveals, &limbs()).unwrap().flatten();

        let mut expected: Vec<Field> = [9u64, b'H' as u64, b'i' as u64, 1, b'b' as u64, 0, b'z' as u64]
            .into_iter()
            .map(Field::from)
            .collect();
        let l = limbs();
        expected.extend(l.public_inputs().copied());

        assert_eq!(public, expected);
        assert_eq!(public.len(), 7 + 2 * PUBKEY_LIMBS_LEN + SIGNATURE_LIMBS_LEN);
    }

    #[test]
    fn test_buffer_length_checked() {
        let reveals = reveals();
        let source = synthesize(16, 4, &reveals).unwrap();
        let err = CircuitInputs::new(&source, vec![0; 15], vec![0; 4], &reveals, &limbs()).unwrap_err();
        assert!(matches!(err, ProverError::InvalidInput { ident, .. } if ident == "headers"));
    }

    #[test]
    fn test_reveal_must_match_circuit_shape() {
        let source = synthesize(16, 4, &reveals()).unwrap();
        let other = RevealRequests::new(
            vec![RevealRequest::new(9, "Hey"), RevealRequest::new(1, "b")],
            vec![RevealRequest::new(0, "z")],
        );
        let err = PublicInputs::assign(&source, &other, &limbs()).unwrap_err();
        assert!(matches!(err, ProverError::InvalidInput { ident, .. } if ident == "headers_reveal_0"));
    }

    #[test]
    fn test_prover_toml() {
        let reveals = reveals();
        let source = synthesize(2, 1, &reveals).unwrap();
        let inputs =
            CircuitInputs::new(&source, b"ab".to_vec(), b"z".to_vec(), &reveals, &limbs()).unwrap();
        let toml = inputs.to_prover_toml();

        assert!(toml.starts_with("headers = [\"97\", \"98\"]\nbody = [\"122\"]\n"));
        assert!(toml.contains(&format!("pubkey_limbs = [\"{}\"", field_to_hex(&Field::from(0u64)))));
        assert!(toml.contains("[headers_reveal_0]\nfrom_index = \"9\"\npart = [\"72\", \"105\"]"));
        assert!(toml.contains("[body_reveal_0]\nfrom_index = \"0\"\npart = [\"122\"]"));

        // no plain key may follow the first table
        let first_table = toml.find("\n[").unwrap();
        assert!(!toml[first_table..].contains("_limbs = "));
        assert!(toml.ends_with('\n'));
    }
}

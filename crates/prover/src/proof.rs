//! Serializable email proof

use serde::{Deserialize, Serialize};
use zkmail_core::utils::parse_field;
use zkmail_core::{DkimSignature, Field, RevealRequest, RevealRequests};

use crate::error::ProverResult;

/// Backend proof and the public inputs it commits to
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProofData {
    /// `0x`-prefixed field elements
    pub public_inputs: Vec<String>,
    pub proof: Vec<u8>,
}

impl ProofData {
    /// Parse public inputs; `None` entries are not field elements
    pub fn public_input_fields(&self) -> Vec<Option<Field>> {
        self.public_inputs.iter().map(|s| parse_field(s)).collect()
    }
}

/// Proof that a DKIM-signed email contains the revealed parts
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EmailProof {
    pub proof: ProofData,
    pub headers_len: usize,
    pub body_len: usize,
    pub dkim_signature: DkimSignature,
    pub headers_reveals: Vec<RevealRequest>,
    pub body_reveals: Vec<RevealRequest>,
}

impl EmailProof {
    pub fn reveals(&self) -> RevealRequests {
        RevealRequests::new(self.headers_reveals.clone(), self.body_reveals.clone())
    }

    pub fn to_json(&self) -> ProverResult<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn from_json(json: &str) -> ProverResult<Self> {
        Ok(serde_json::from_str(json)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn proof() -> EmailProof {
        EmailProof {
            proof: ProofData {
                public_inputs: vec!["0x09".into()],
                proof: vec![1, 2, 255],
            },
            headers_len: 120,
            body_len: 16,
            dkim_signature: DkimSignature {
                domain: "example.com".into(),
                selector: "s1".into(),
                algorithm: "rsa-sha256".into(),
                signature_base64: "c2ln".into(),
            },
            headers_reveals: vec![RevealRequest::new(9, "Hello")],
            body_reveals: vec![],
        }
    }

    #[test]
    fn test_wire_shape() {
        let value = serde_json::to_value(proof()).unwrap();
        assert_eq!(
            value,
            json!({
                "proof": { "publicInputs": ["0x09"], "proof": [1, 2, 255] },
                "headersLen": 120,
                "bodyLen": 16,
                "dkimSignature": {
                    "domain": "example.com",
                    "selector": "s1",
                    "signatureBase64": "c2ln"
                },
                "headersReveals": [{ "fromIndex": 9, "part": "Hello" }],
                "bodyReveals": []
            })
        );
    }

    #[test]
    fn test_json_roundtrip() {
        let p = proof();
        assert_eq!(EmailProof::from_json(&p.to_json().unwrap()).unwrap(), p);
    }

    #[test]
    fn test_rejects_missing_fields() {
        assert!(EmailProof::from_json(r#"{"proof": {"publicInputs": [], "proof": []}}"#).is_err());
    }

    #[test]
    fn test_public_input_fields() {
        let data = ProofData {
            public_inputs: vec!["0x01".into(), "nope".into()],
            proof: vec![],
        };
        assert_eq!(data.public_input_fields(), vec![Some(Field::from(1u64)), None]);
    }
}

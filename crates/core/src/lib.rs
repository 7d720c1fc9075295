pub mod dkim;
pub mod dns;
pub mod key;
pub mod limbs;
pub mod reveal;
pub mod utils;

#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;

pub use dkim::{DkimError, DkimSignature, DkimVerifier, Sanitizer, SignedEmail};
pub use dns::{DnsError, DohResolver, DohServer, KeyResolver, StaticKeyResolver};
pub use limbs::{encode_limbs, LimbError, PublicKeyLimbs};
pub use reveal::{PartialText, Reconstructed, RevealError, RevealRequest, RevealRequests, RevealTarget};

pub type Field = ark_bn254::Fr;

use std::path::PathBuf;

use zkmail_core::dns::DohServer;

/// Prover configuration
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ProverConfig {
    /// DNS-over-HTTPS endpoint used to resolve DKIM keys
    pub doh_endpoint: String,

    /// Noir compiler binary
    pub nargo_bin: PathBuf,

    /// Barretenberg CLI binary
    pub bb_bin: PathBuf,

    /// Package name of the generated Noir project
    pub package_name: String,

    /// Git source of the `zkemail` Noir library
    pub zkemail_git: String,

    /// Tag of the `zkemail` Noir library
    pub zkemail_tag: String,

    /// Compiled circuits kept in memory (0 = unbounded)
    pub cache_capacity: usize,

    /// Retry DKIM verification with sanitized copies of the email
    pub sanitize: bool,
}

impl Default for ProverConfig {
    fn default() -> Self {
        Self {
            doh_endpoint: DohServer::Google.url().to_string(),
            nargo_bin: PathBuf::from("nargo"),
            bb_bin: PathBuf::from("bb"),
            package_name: "zkemail_circuit".to_string(),
            zkemail_git: "https://github.com/olehmisar/zkemail/".to_string(),
            zkemail_tag: "v0.33.0".to_string(),
            cache_capacity: 32,
            sanitize: true,
        }
    }
}

impl ProverConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(val) = std::env::var("ZKMAIL_DOH_ENDPOINT") {
            config.doh_endpoint = val;
        }

        if let Ok(val) = std::env::var("ZKMAIL_NARGO_BIN") {
            config.nargo_bin = PathBuf::from(val);
        }

        if let Ok(val) = std::env::var("ZKMAIL_BB_BIN") {
            config.bb_bin = PathBuf::from(val);
        }

        if let Ok(val) = std::env::var("ZKMAIL_PACKAGE_NAME") {
            config.package_name = val;
        }

        if let Ok(val) = std::env::var("ZKMAIL_LIB_GIT") {
            config.zkemail_git = val;
        }

        if let Ok(val) = std::env::var("ZKMAIL_LIB_TAG") {
            config.zkemail_tag = val;
        }

        if let Ok(val) = std::env::var("ZKMAIL_CACHE_CAPACITY") {
            if let Ok(capacity) = val.parse() {
                config.cache_capacity = capacity;
            }
        }

        if let Ok(val) = std::env::var("ZKMAIL_SANITIZE") {
            config.sanitize = val.parse().unwrap_or(true);
        }

        config
    }

    /// `Nargo.toml` for a generated circuit
    pub fn nargo_manifest(&self) -> String {
        format!(
            r#"[package]
name = "{}"
type = "bin"

[dependencies]
zkemail = {{ git = "{}", tag = "{}" }}
"#,
            self.package_name, self.zkemail_git, self.zkemail_tag
        )
    }
}

//! DKIM public key resolution over DNS-over-HTTPS
//!
//! Looks up the TXT record at `<selector>._domainkey.<domain>` through a JSON
//! DoH endpoint and extracts the base64 RSA key that follows the
//! `v=DKIM1; k=rsa; p=` prefix.

use std::collections::HashMap;

use async_trait::async_trait;
use serde::Deserialize;
use thiserror::Error;

/// DNS response code for a successful query
pub const DOH_STATUS_NO_ERROR: u32 = 0;

/// DNS RR type for TXT records
pub const DOH_TYPE_TXT: u32 = 16;

/// Prefix that must immediately precede the base64 public key
pub const DKIM_RECORD_PREFIX: &str = "v=DKIM1; k=rsa; p=";

#[derive(Debug, Error)]
pub enum DnsError {
    #[error("DKIM public key not found for {{domain: {domain}, selector: {selector}}}")]
    KeyNotFound { domain: String, selector: String },

    #[error("DoH request for {name} failed: {source}")]
    Transport {
        name: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("DoH request for {name} returned HTTP {status}")]
    Http { name: String, status: u16 },

    #[error("Invalid DoH endpoint {0}")]
    InvalidEndpoint(String),
}

impl DnsError {
    fn not_found(selector: &str, domain: &str) -> Self {
        Self::KeyNotFound {
            domain: domain.to_string(),
            selector: selector.to_string(),
        }
    }
}

/// Source of DKIM public keys
///
/// Implementations return the base64 DER key found for `selector`/`domain`
/// right now. No caching is implied.
#[async_trait]
pub trait KeyResolver: Send + Sync {
    async fn resolve(&self, selector: &str, domain: &str) -> Result<String, DnsError>;
}

/// Well known DoH servers
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DohServer {
    Google,
    Cloudflare,
}

impl DohServer {
    pub fn url(&self) -> &'static str {
        match self {
            Self::Google => "https://dns.google/resolve",
            Self::Cloudflare => "https://cloudflare-dns.com/dns-query",
        }
    }
}

#[derive(Debug, Deserialize)]
struct DohResponse {
    #[serde(rename = "Status")]
    status: u32,
    #[serde(rename = "Answer", default)]
    answer: Vec<DohAnswer>,
}

#[derive(Debug, Deserialize)]
struct DohAnswer {
    #[serde(rename = "type")]
    record_type: u32,
    data: String,
}

/// DoH JSON API client
#[derive(Clone, Debug)]
pub struct DohResolver {
    endpoint: String,
    client: reqwest::Client,
}

impl DohResolver {
    /// Create a resolver for `endpoint`, adding `https://` when no scheme is
    /// given and dropping a trailing slash
    pub fn new(endpoint: impl AsRef<str>) -> Result<Self, DnsError> {
        let endpoint = normalize_endpoint(endpoint.as_ref())?;
        Ok(Self {
            endpoint,
            client: reqwest::Client::new(),
        })
    }

    pub fn with_server(server: DohServer) -> Self {
        Self {
            endpoint: server.url().to_string(),
            client: reqwest::Client::new(),
        }
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Fetch the raw TXT value for `name`, with quote characters removed
    pub async fn lookup_txt(&self, name: &str) -> Result<Option<String>, DnsError> {
        tracing::debug!("DoH lookup {} via {}", name, self.endpoint);

        let type_txt = DOH_TYPE_TXT.to_string();
        let response = self
            .client
            .get(&self.endpoint)
            .query(&[("name", name), ("type", type_txt.as_str())])
            .header(reqwest::header::ACCEPT, "application/dns-json")
            .send()
            .await
            .map_err(|source| DnsError::Transport {
                name: name.to_string(),
                source,
            })?;

        if !response.status().is_success() {
            return Err(DnsError::Http {
                name: name.to_string(),
                status: response.status().as_u16(),
            });
        }

        let body: DohResponse = response.json().await.map_err(|source| DnsError::Transport {
            name: name.to_string(),
            source,
        })?;

        Ok(first_txt_answer(&body))
    }
}

#[async_trait]
impl KeyResolver for DohResolver {
    async fn resolve(&self, selector: &str, domain: &str) -> Result<String, DnsError> {
        let name = dkim_record_name(selector, domain);
        let record = self
            .lookup_txt(&name)
            .await?
            .ok_or_else(|| DnsError::not_found(selector, domain))?;
        extract_public_key(&record).ok_or_else(|| DnsError::not_found(selector, domain))
    }
}

/// Fixed key table, for pinned keys and offline use
#[derive(Clone, Debug, Default)]
pub struct StaticKeyResolver {
    keys: HashMap<(String, String), String>,
}

impl StaticKeyResolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_key(
        mut self,
        selector: impl Into<String>,
        domain: impl Into<String>,
        public_key_base64: impl Into<String>,
    ) -> Self {
        self.insert(selector, domain, public_key_base64);
        self
    }

    pub fn insert(
        &mut self,
        selector: impl Into<String>,
        domain: impl Into<String>,
        public_key_base64: impl Into<String>,
    ) {
        self.keys.insert(
            (selector.into(), domain.into().to_ascii_lowercase()),
            public_key_base64.into(),
        );
    }
}

#[async_trait]
impl KeyResolver for StaticKeyResolver {
    async fn resolve(&self, selector: &str, domain: &str) -> Result<String, DnsError> {
        self.keys
            .get(&(selector.to_string(), domain.to_ascii_lowercase()))
            .cloned()
            .ok_or_else(|| DnsError::not_found(selector, domain))
    }
}

/// `<selector>._domainkey.<domain>`
pub fn dkim_record_name(selector: &str, domain: &str) -> String {
    format!("{}._domainkey.{}", selector, domain)
}

fn normalize_endpoint(endpoint: &str) -> Result<String, DnsError> {
    let trimmed = endpoint.trim();
    if trimmed.is_empty() {
        return Err(DnsError::InvalidEndpoint(endpoint.to_string()));
    }
    let mut url = if trimmed.starts_with("https://") || trimmed.starts_with("http://") {
        trimmed.to_string()
    } else {
        format!("https://{}", trimmed)
    };
    while url.ends_with('/') {
        url.pop();
    }
    Ok(url)
}

fn first_txt_answer(response: &DohResponse) -> Option<String> {
    if response.status != DOH_STATUS_NO_ERROR {
        return None;
    }
    response
        .answer
        .iter()
        .find(|a| a.record_type == DOH_TYPE_TXT)
        .map(|a| a.data.replace('"', ""))
}

/// Pull the base64 key out of a DKIM TXT record
///
/// Multi-string records arrive as `"a" "b"`; once quotes are stripped the
/// remaining whitespace is not part of the key.
pub fn extract_public_key(record: &str) -> Option<String> {
    let start = record.find(DKIM_RECORD_PREFIX)? + DKIM_RECORD_PREFIX.len();
    let rest = &record[start..];
    let end = rest.find(';').unwrap_or(rest.len());
    let key: String = rest[..end].chars().filter(|c| !c.is_whitespace()).collect();
    if key.is_empty() {
        None
    } else {
        Some(key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::prelude::*;
    use serde_json::json;

    const KEY: &str = "MIIBIjANBgkqhkiG9w0BAQEFAAOCAQ8AMIIBCgKCAQEAv";

    #[test]
    fn test_record_name() {
        assert_eq!(
            dkim_record_name("20230601", "gmail.com"),
            "20230601._domainkey.gmail.com"
        );
    }

    #[test]
    fn test_extract_public_key() {
        let record = format!("v=DKIM1; k=rsa; p={}", KEY);
        assert_eq!(extract_public_key(&record).as_deref(), Some(KEY));

        // Split TXT strings and trailing tags
        let record = format!("v=DKIM1; k=rsa; p={} {}; t=s", &KEY[..10], &KEY[10..]);
        assert_eq!(extract_public_key(&record).as_deref(), Some(KEY));

        assert!(extract_public_key("v=DKIM1; k=rsa; p=").is_none());
        assert!(extract_public_key("v=DKIM1; k=ed25519; p=abc").is_none());
    }

    #[test]
    fn test_normalize_endpoint() {
        assert_eq!(
            normalize_endpoint("dns.google/resolve/").unwrap(),
            "https://dns.google/resolve"
        );
        assert_eq!(
            normalize_endpoint("http://127.0.0.1:8080").unwrap(),
            "http://127.0.0.1:8080"
        );
        assert!(normalize_endpoint("  ").is_err());
    }

    #[tokio::test]
    async fn test_doh_resolves_first_txt_answer() {
        let server = MockServer::start();
        let mock = server.mock(|when, then| {
            when.method(GET)
                .path("/resolve")
                .query_param("name", "s1._domainkey.example.com")
                .query_param("type", "16")
                .header("accept", "application/dns-json");
            then.status(200).json_body(json!({
                "Status": 0,
                "Answer": [
                    { "name": "s1._domainkey.example.com.", "type": 5, "TTL": 60, "data": "cname.example.net." },
                    { "name": "s1._domainkey.example.com.", "type": 16, "TTL": 60, "data": format!("\"v=DKIM1; k=rsa; p={}\"", KEY) }
                ]
            }));
        });

        let resolver = DohResolver::new(server.url("/resolve")).unwrap();
        let key = resolver.resolve("s1", "example.com").await.unwrap();
        mock.assert();
        assert_eq!(key, KEY);
    }

    #[tokio::test]
    async fn test_doh_error_status_is_key_not_found() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(GET).path("/resolve");
            then.status(200).json_body(json!({
                "Status": 3,
                "Answer": [
                    { "type": 16, "data": format!("v=DKIM1; k=rsa; p={}", KEY) }
                ]
            }));
        });

        let resolver = DohResolver::new(server.url("/resolve")).unwrap();
        let err = resolver.resolve("s1", "example.com").await.unwrap_err();
        assert!(matches!(err, DnsError::KeyNotFound { .. }));
    }

    #[tokio::test]
    async fn test_doh_empty_answer_is_key_not_found() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(GET).path("/resolve");
            then.status(200).json_body(json!({ "Status": 0, "Answer": [] }));
        });

        let resolver = DohResolver::new(server.url("/resolve")).unwrap();
        let err = resolver.resolve("s1", "example.com").await.unwrap_err();
        assert!(matches!(err, DnsError::KeyNotFound { .. }));
    }

    #[tokio::test]
    async fn test_doh_missing_answer_field_is_key_not_found() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(GET).path("/resolve");
            then.status(200).json_body(json!({ "Status": 0 }));
        });

        let resolver = DohResolver::new(server.url("/resolve")).unwrap();
        let err = resolver.resolve("s1", "example.com").await.unwrap_err();
        assert!(matches!(err, DnsError::KeyNotFound { .. }));
    }

    #[tokio::test]
    async fn test_doh_record_without_prefix_is_key_not_found() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(GET).path("/resolve");
            then.status(200).json_body(json!({
                "Status": 0,
                "Answer": [ { "type": 16, "data": "v=spf1 -all" } ]
            }));
        });

        let resolver = DohResolver::new(server.url("/resolve")).unwrap();
        let err = resolver.resolve("s1", "example.com").await.unwrap_err();
        assert!(matches!(err, DnsError::KeyNotFound { .. }));
    }

    #[tokio::test]
    async fn test_doh_http_failure_is_not_key_not_found() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(GET).path("/resolve");
            then.status(503);
        });

        let resolver = DohResolver::new(server.url("/resolve")).unwrap();
        let err = resolver.resolve("s1", "example.com").await.unwrap_err();
        assert!(matches!(err, DnsError::Http { status: 503, .. }));
    }

    #[tokio::test]
    async fn test_static_resolver() {
        let resolver = StaticKeyResolver::new().with_key("s1", "Example.com", KEY);
        assert_eq!(resolver.resolve("s1", "example.com").await.unwrap(), KEY);
        assert!(resolver.resolve("s2", "example.com").await.is_err());
    }
}

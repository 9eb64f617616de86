use reqwest::{Client, ClientBuilder};
use std::collections::HashSet;
use std::time::Duration;
use url::Url;

use crate::error::CinevecError;

/// A sandbox-capped HTTP client that only allows requests to approved domains.
/// Both pipeline phases talk to exactly two external services (the catalog
/// API and the embedding API), so the allowlist is short and fixed.
#[derive(Debug, Clone)]
pub struct SandboxClient {
    client: Client,
    allowlist: HashSet<String>,
}

impl SandboxClient {
    /// Creates a new SandboxClient with the default Cinevec allowlist.
    pub fn new() -> Result<Self, CinevecError> {
        let mut allowlist = HashSet::new();
        let domains = vec![
            "api.themoviedb.org",                 // TMDB discover endpoint
            "generativelanguage.googleapis.com",  // Gemini embeddings
            "localhost",                          // OpenAI-compatible local models
            "127.0.0.1",                          // Localhost alt
        ];

        for d in domains {
            allowlist.insert(d.to_string());
        }

        let client = ClientBuilder::new()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| CinevecError::Config(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self { client, allowlist })
    }

    /// Appends an exact hostname to the allowlist.
    pub fn allow_domain(&mut self, domain: &str) {
        self.allowlist.insert(domain.to_string());
    }

    /// Validates if a URL is permitted under the current sandbox policy.
    pub fn is_allowed(&self, url: &str) -> bool {
        if let Ok(parsed) = Url::parse(url) {
            if let Some(host) = parsed.host_str() {
                // Exact match or subdomain of an allowed domain
                for allowed in &self.allowlist {
                    if host == allowed || host.ends_with(&format!(".{}", allowed)) {
                        return true;
                    }
                }
            }
        }
        false
    }

    /// Exposes the inner `reqwest::Client` builder pattern safely for GET requests.
    pub fn get(&self, url: &str) -> Result<reqwest::RequestBuilder, CinevecError> {
        if !self.is_allowed(url) {
            return Err(CinevecError::Security(format!(
                "Network capabilities capped: domain not in allowlist for URL {}",
                url
            )));
        }

        Ok(self.client.get(url))
    }

    /// Exposes the inner `reqwest::Client` builder pattern safely for POST requests.
    pub fn post(&self, url: &str) -> Result<reqwest::RequestBuilder, CinevecError> {
        if !self.is_allowed(url) {
            return Err(CinevecError::Security(format!(
                "Network capabilities capped: domain not in allowlist for URL {}",
                url
            )));
        }

        Ok(self.client.post(url))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tmdb_is_allowed() {
        let c = SandboxClient::new().unwrap();
        assert!(c.is_allowed("https://api.themoviedb.org/3/discover/movie?page=1"));
    }

    #[test]
    fn test_unknown_domain_is_blocked() {
        let c = SandboxClient::new().unwrap();
        assert!(!c.is_allowed("https://example.com/anything"));
        assert!(c.get("https://example.com/anything").is_err());
    }

    #[test]
    fn test_allow_domain_extends_policy() {
        let mut c = SandboxClient::new().unwrap();
        assert!(!c.is_allowed("https://api.openai.com/v1/embeddings"));
        c.allow_domain("api.openai.com");
        assert!(c.is_allowed("https://api.openai.com/v1/embeddings"));
    }
}

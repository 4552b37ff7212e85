// # HTTP Address Resolver
//
// This crate provides an HTTP-based AddressResolver for ipsync.
//
// ## Architecture
//
// Fetches the caller's public address from lookup services that answer a
// GET with the address as a plain-text body (e.g. api.ipify.org,
// ifconfig.me/ip, icanhazip.com). Services are tried in order; the first
// usable answer wins.
//
// Every resolve() performs a fresh lookup. Nothing is cached, since a cached
// answer would hide exactly the change the loop is looking for.

use ipsync_core::ComponentRegistry;
use ipsync_core::config::{IpVersion, ResolverConfig};
use ipsync_core::traits::{AddressResolver, AddressResolverFactory};
use ipsync_core::{AddressFamily, Error, PublicAddress, Result};

use std::time::Duration;

/// Default request timeout
const DEFAULT_TIMEOUT_SECS: u64 = 10;

/// HTTP lookup-service resolver
#[derive(Debug)]
pub struct HttpAddressResolver {
    /// URLs to query, primary first
    urls: Vec<String>,

    /// Address family to accept (None = both)
    version: Option<IpVersion>,

    /// HTTP client
    client: reqwest::Client,
}

impl HttpAddressResolver {
    /// Create a resolver querying a single URL
    ///
    /// # Parameters
    ///
    /// - `url`: Lookup service (e.g., "https://api.ipify.org")
    /// - `version`: Address family to accept (None = both)
    pub fn new(url: impl Into<String>, version: Option<IpVersion>) -> Result<Self> {
        Self::with_fallbacks(
            url,
            Vec::new(),
            version,
            Duration::from_secs(DEFAULT_TIMEOUT_SECS),
        )
    }

    /// Create a resolver with fallback services and a custom timeout
    pub fn with_fallbacks(
        url: impl Into<String>,
        fallback_urls: Vec<String>,
        version: Option<IpVersion>,
        timeout: Duration,
    ) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| Error::config(format!("Failed to build HTTP client: {}", e)))?;

        let mut urls = vec![url.into()];
        urls.extend(fallback_urls);

        Ok(Self {
            urls,
            version,
            client,
        })
    }

    /// Fetch the address from one service
    async fn fetch(&self, url: &str) -> Result<PublicAddress> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| Error::lookup(format!("Request to {} failed: {}", url, e)))?;

        let status = response.status();
        if !status.is_success() {
            return Err(Error::lookup(format!("{} answered HTTP {}", url, status)));
        }

        let body = response
            .text()
            .await
            .map_err(|e| Error::lookup(format!("Failed to read response from {}: {}", url, e)))?;

        let address = PublicAddress::parse(&body)
            .map_err(|e| Error::lookup(format!("{} returned an unusable body: {}", url, e)))?;

        self.check_family(address)?;
        Ok(address)
    }

    /// Reject addresses of the wrong family
    fn check_family(&self, address: PublicAddress) -> Result<()> {
        let acceptable = match self.version {
            Some(IpVersion::V4) => address.family() == AddressFamily::V4,
            Some(IpVersion::V6) => address.family() == AddressFamily::V6,
            Some(IpVersion::Both) | None => true,
        };

        if acceptable {
            Ok(())
        } else {
            Err(Error::lookup(format!(
                "Expected {:?} address, got: {}",
                self.version.unwrap_or(IpVersion::Both),
                address
            )))
        }
    }
}

#[async_trait::async_trait]
impl AddressResolver for HttpAddressResolver {
    async fn resolve(&self) -> Result<PublicAddress> {
        let mut failures = Vec::with_capacity(self.urls.len());

        for url in &self.urls {
            match self.fetch(url).await {
                Ok(address) => {
                    tracing::debug!(url = %url, address = %address, "Lookup succeeded");
                    return Ok(address);
                }
                Err(e) => {
                    tracing::debug!(url = %url, error = %e, "Lookup service failed");
                    failures.push(e.to_string());
                }
            }
        }

        Err(Error::lookup(format!(
            "All lookup services failed: {}",
            failures.join("; ")
        )))
    }

    fn resolver_name(&self) -> &'static str {
        "http"
    }
}

/// Factory for creating HTTP resolvers
pub struct HttpResolverFactory;

impl AddressResolverFactory for HttpResolverFactory {
    fn create(&self, config: &ResolverConfig) -> Result<Box<dyn AddressResolver>> {
        match config {
            ResolverConfig::Http {
                url,
                fallback_urls,
                timeout_secs,
                version,
            } => Ok(Box::new(HttpAddressResolver::with_fallbacks(
                url.clone(),
                fallback_urls.clone(),
                *version,
                Duration::from_secs(*timeout_secs),
            )?)),
            _ => Err(Error::config("Invalid config for HTTP resolver")),
        }
    }
}

/// Register the HTTP resolver with a registry
pub fn register(registry: &ComponentRegistry) {
    registry.register_resolver("http", Box::new(HttpResolverFactory));
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    async fn serving(body: &str, status: u16) -> MockServer {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/"))
            .respond_with(ResponseTemplate::new(status).set_body_string(body))
            .mount(&server)
            .await;
        server
    }

    #[tokio::test]
    async fn test_resolves_plain_text_body() {
        let server = serving("203.0.113.7\n", 200).await;
        let resolver = HttpAddressResolver::new(server.uri(), None).unwrap();

        let address = tokio_test::assert_ok!(resolver.resolve().await);
        assert_eq!(address.to_string(), "203.0.113.7");
    }

    #[tokio::test]
    async fn test_every_resolve_queries_the_service() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_string("203.0.113.7"))
            .expect(2)
            .mount(&server)
            .await;

        let resolver = HttpAddressResolver::new(server.uri(), None).unwrap();
        resolver.resolve().await.unwrap();
        resolver.resolve().await.unwrap();
    }

    #[tokio::test]
    async fn test_server_error_is_lookup_error() {
        let server = serving("oops", 503).await;
        let resolver = HttpAddressResolver::new(server.uri(), None).unwrap();

        let err = resolver.resolve().await.unwrap_err();
        assert!(matches!(err, Error::Lookup(_)));
        assert!(err.to_string().contains("503"));
    }

    #[tokio::test]
    async fn test_garbage_body_is_lookup_error() {
        let server = serving("<html>rate limited</html>", 200).await;
        let resolver = HttpAddressResolver::new(server.uri(), None).unwrap();

        assert!(matches!(resolver.resolve().await, Err(Error::Lookup(_))));
    }

    #[tokio::test]
    async fn test_empty_body_is_lookup_error() {
        let server = serving("", 200).await;
        let resolver = HttpAddressResolver::new(server.uri(), None).unwrap();

        assert!(matches!(resolver.resolve().await, Err(Error::Lookup(_))));
    }

    #[tokio::test]
    async fn test_falls_back_to_next_service() {
        let broken = serving("", 500).await;
        let working = serving("2001:db8::7", 200).await;

        let resolver = HttpAddressResolver::with_fallbacks(
            broken.uri(),
            vec![working.uri()],
            None,
            Duration::from_secs(5),
        )
        .unwrap();

        assert_eq!(resolver.resolve().await.unwrap().to_string(), "2001:db8::7");
    }

    #[tokio::test]
    async fn test_version_filter() {
        let server = serving("2001:db8::7", 200).await;

        let v4_only = HttpAddressResolver::new(server.uri(), Some(IpVersion::V4)).unwrap();
        assert!(matches!(v4_only.resolve().await, Err(Error::Lookup(_))));

        let v6_only = HttpAddressResolver::new(server.uri(), Some(IpVersion::V6)).unwrap();
        assert!(v6_only.resolve().await.is_ok());
    }

    #[tokio::test]
    async fn test_registered_factory_creates_resolver() {
        let server = serving("198.51.100.1", 200).await;
        let registry = ComponentRegistry::new();
        register(&registry);

        let config = ResolverConfig::Http {
            url: server.uri(),
            fallback_urls: Vec::new(),
            timeout_secs: 5,
            version: None,
        };
        let resolver = registry.create_resolver(&config).unwrap();

        assert_eq!(resolver.resolver_name(), "http");
        assert_eq!(resolver.resolve().await.unwrap().to_string(), "198.51.100.1");
    }

    #[test]
    fn test_factory_rejects_custom_config() {
        let config = ResolverConfig::Custom {
            factory: "other".to_string(),
            config: Default::default(),
        };
        assert!(HttpResolverFactory.create(&config).is_err());
    }
}

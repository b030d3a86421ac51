//! Connection configuration.

use crate::crypto::CryptoProvider;

/// Configuration for a client or server endpoint.
///
/// Values are set via the `with_` methods and read by the engine. The
/// defaults are sensible for interactive connections.
#[derive(Debug, Clone)]
pub struct Config {
    pub(crate) provider: CryptoProvider,
    pub(crate) offered_ciphers: Vec<String>,
    pub(crate) max_rx_buffer: usize,
    pub(crate) max_queue_tx: usize,
    pub(crate) max_queue_app_rx: usize,
}

impl Config {
    /// Create a config with the default crypto provider.
    ///
    /// With the "openssl" feature enabled the native backend is preferred,
    /// falling back per cipher to the software backend.
    pub fn new() -> Self {
        #[cfg(feature = "openssl")]
        let provider = crate::crypto::openssl::default_provider();
        #[cfg(not(feature = "openssl"))]
        let provider = crate::crypto::rust_crypto::default_provider();

        Self::with_crypto_provider(provider)
    }

    /// Create a config around a specific crypto provider.
    pub fn with_crypto_provider(provider: CryptoProvider) -> Self {
        let offered_ciphers = provider
            .cipher_names()
            .into_iter()
            .map(str::to_string)
            .collect();

        Config {
            provider,
            offered_ciphers,
            max_rx_buffer: 64 * 1024,
            max_queue_tx: 32,
            max_queue_app_rx: 32,
        }
    }

    /// Restrict and order the cipher names offered (client) or accepted
    /// (server). Defaults to every cipher the provider registers.
    pub fn with_offered_ciphers(mut self, names: &[&str]) -> Self {
        self.offered_ciphers = names.iter().map(|n| n.to_string()).collect();
        self
    }

    /// Cap on buffered unparsed input bytes.
    pub fn with_max_rx_buffer(mut self, max: usize) -> Self {
        self.max_rx_buffer = max;
        self
    }

    /// Cap on queued outgoing records awaiting poll.
    pub fn with_max_queue_tx(mut self, max: usize) -> Self {
        self.max_queue_tx = max;
        self
    }

    /// Cap on queued incoming application data awaiting poll.
    pub fn with_max_queue_app_rx(mut self, max: usize) -> Self {
        self.max_queue_app_rx = max;
        self
    }

    /// The crypto provider in use.
    pub fn crypto_provider(&self) -> &CryptoProvider {
        &self.provider
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_offers_all_provider_ciphers() {
        let config = Config::new();
        assert!(config.offered_ciphers.iter().any(|n| n == "aes256-cbc"));
        assert!(config.offered_ciphers.iter().any(|n| n == "rc4"));
    }

    #[test]
    fn offered_ciphers_can_be_restricted() {
        let config = Config::new().with_offered_ciphers(&["3des-cbc"]);
        assert_eq!(config.offered_ciphers, vec!["3des-cbc".to_string()]);
    }
}

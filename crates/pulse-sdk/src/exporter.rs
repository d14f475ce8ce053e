//! HTTP batch exporter: accumulate, sign, compress, encrypt, ship

use std::sync::Arc;
use std::time::Duration;

use reqwest::header::{CONTENT_ENCODING, CONTENT_TYPE};
use reqwest::Client;
use tracing::{debug, instrument};

use pulse_core::codec;
use pulse_core::config::AgentConfig;
use pulse_core::crypto::{Encrypter, Signer};
use pulse_core::error::{PulseError, PulseResult};
use pulse_core::metric::{MetricValue, Record, RecordWire};

/// Fail-fast batch accumulator over HTTP+JSON.
///
/// Records buffer locally until `send`, which serializes the batch as a
/// JSON array, gzip-compresses it and, when a public key is configured,
/// wraps the compressed bytes in RSA-OAEP ciphertext. That layering order
/// (serialize, compress, encrypt) is a wire contract.
///
/// Once any operation fails, later `add` calls are no-ops and the first
/// error is preserved until `reset`.
pub struct HttpExporter {
    endpoint: String,
    client: Client,
    signer: Option<Signer>,
    encrypter: Option<Arc<Encrypter>>,
    real_ip: Option<String>,
    buffer: Vec<RecordWire>,
    error: Option<PulseError>,
}

impl HttpExporter {
    /// Create an exporter posting to `address` (host:port or full URL)
    pub fn new(address: &str) -> PulseResult<Self> {
        let endpoint = if address.starts_with("http://") || address.starts_with("https://") {
            address.trim_end_matches('/').to_string()
        } else {
            format!("http://{}", address.trim_end_matches('/'))
        };
        let client = Client::builder()
            .build()
            .map_err(|e| PulseError::transport(format!("create http client: {}", e)))?;
        Ok(Self {
            endpoint,
            client,
            signer: None,
            encrypter: None,
            real_ip: None,
            buffer: Vec::new(),
            error: None,
        })
    }

    /// Build an exporter from agent configuration, loading the signer
    /// secret and encryption key it names. An unreadable key file is a
    /// fatal start-up error.
    pub fn from_config(config: &AgentConfig) -> PulseResult<Self> {
        let mut exporter = Self::new(&config.address)?;
        if let Some(key) = config.key.as_deref().filter(|k| !k.is_empty()) {
            exporter.signer = Some(Signer::new(key));
        }
        if let Some(path) = &config.crypto_key {
            exporter.encrypter = Some(Arc::new(Encrypter::from_pem_file(path)?));
        }
        exporter.real_ip = config.real_ip.clone();
        Ok(exporter)
    }

    /// Sign every added record with the shared secret
    pub fn with_signer(mut self, signer: Signer) -> Self {
        self.signer = Some(signer);
        self
    }

    /// Encrypt each compressed batch for the collector's private key
    pub fn with_encrypter(mut self, encrypter: Encrypter) -> Self {
        self.encrypter = Some(Arc::new(encrypter));
        self
    }

    /// Advertise the agent's outbound IP for trusted-subnet checks
    pub fn with_real_ip(mut self, ip: impl Into<String>) -> Self {
        self.real_ip = Some(ip.into());
        self
    }

    /// Append one record to the batch.
    ///
    /// Signing, when configured, happens here so the digest covers the
    /// exact value being shipped. After a failure this is a no-op.
    pub fn add(&mut self, name: &str, value: MetricValue) -> &mut Self {
        if self.error.is_some() {
            return self;
        }
        let record = Record::new(name, value);
        let hash = self.signer.as_ref().map(|s| s.sign(&record));
        self.buffer.push(record.to_wire(hash));
        self
    }

    /// Ship the accumulated batch in a single POST bounded by `deadline`.
    ///
    /// An empty buffer is `IncompleteRequest`. A non-2xx response carries
    /// the status code and body; transport-level failures surface as-is.
    #[instrument(skip(self), fields(records = self.buffer.len()))]
    pub async fn send(&mut self, deadline: Duration) -> PulseResult<()> {
        if let Some(err) = &self.error {
            return Err(err.clone());
        }
        match self.try_send(deadline).await {
            Ok(()) => {
                debug!(records = self.buffer.len(), "batch exported");
                Ok(())
            }
            Err(err) => {
                self.error = Some(err.clone());
                Err(err)
            }
        }
    }

    async fn try_send(&self, deadline: Duration) -> PulseResult<()> {
        if self.buffer.is_empty() {
            return Err(PulseError::incomplete("export batch is empty"));
        }

        let payload = serde_json::to_vec(&self.buffer)?;
        let mut body = tokio::task::spawn_blocking(move || codec::compress(&payload))
            .await
            .map_err(|e| PulseError::unexpected(format!("compression task failed: {}", e)))??;

        if let Some(encrypter) = &self.encrypter {
            let encrypter = encrypter.clone();
            body = tokio::task::spawn_blocking(move || encrypter.encrypt(&body))
                .await
                .map_err(|e| PulseError::unexpected(format!("encryption task failed: {}", e)))??;
        }

        let mut request = self
            .client
            .post(format!("{}/updates/", self.endpoint))
            .timeout(deadline)
            .header(CONTENT_TYPE, "application/json")
            .header(CONTENT_ENCODING, "gzip")
            .body(body);
        if let Some(ip) = &self.real_ip {
            request = request.header("X-Real-IP", ip);
        }

        let response = request
            .send()
            .await
            .map_err(|e| PulseError::transport(e.to_string()))?;

        let status = response.status();
        if status.is_success() {
            Ok(())
        } else {
            let body = response.text().await.unwrap_or_default();
            Err(PulseError::Http {
                status: status.as_u16(),
                body,
            })
        }
    }

    /// The first recorded error, wrapped in the terminal export form
    pub fn error(&self) -> Option<PulseError> {
        self.error.clone().map(PulseError::export)
    }

    /// Clear buffer and error state; the HTTP connection is reused
    pub fn reset(&mut self) {
        self.buffer.clear();
        self.error = None;
    }

    /// Records currently buffered for the next send
    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }
}

//! HMAC-SHA256 record signing

use ring::hmac;

use crate::error::{PulseError, PulseResult};
use crate::metric::{MetricValue, Record};

/// Signs and verifies individual records with a shared secret.
///
/// The canonical message is `"<name>:<kind>:<value>"`. A counter value
/// renders as a plain decimal integer, a gauge with exactly six fractional
/// digits. This formatting is part of the wire contract; changing it breaks
/// interoperability with independently built counterparts.
#[derive(Clone)]
pub struct Signer {
    key: hmac::Key,
}

impl Signer {
    /// Create a signer from a shared secret
    pub fn new(secret: impl AsRef<[u8]>) -> Self {
        Self {
            key: hmac::Key::new(hmac::HMAC_SHA256, secret.as_ref()),
        }
    }

    /// Hex-encoded HMAC digest over the record's canonical message
    pub fn sign(&self, record: &Record) -> String {
        let tag = hmac::sign(&self.key, Self::canonical_message(record).as_bytes());
        hex::encode(tag.as_ref())
    }

    /// Verify a hex digest against the record.
    ///
    /// An undecodable digest is an error; a well-formed but non-matching
    /// digest is `Ok(false)`. The comparison is constant-time.
    pub fn verify(&self, record: &Record, digest: &str) -> PulseResult<bool> {
        let tag = hex::decode(digest).map_err(|e| PulseError::InvalidSignature(e.to_string()))?;
        Ok(hmac::verify(&self.key, Self::canonical_message(record).as_bytes(), &tag).is_ok())
    }

    /// Verify the digest carried by a wire record; absence fails closed
    pub fn verify_attached(&self, record: &Record, digest: Option<&str>) -> PulseResult<bool> {
        match digest {
            Some(d) => self.verify(record, d),
            None => Err(PulseError::NotSigned),
        }
    }

    fn canonical_message(record: &Record) -> String {
        match record.value() {
            MetricValue::Counter(v) => format!("{}:counter:{}", record.name(), v),
            MetricValue::Gauge(v) => format!("{}:gauge:{:.6}", record.name(), v),
        }
    }
}

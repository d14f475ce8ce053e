//! RSA key loading and chunked OAEP encryption

use std::path::Path;

use rsa::pkcs1::DecodeRsaPrivateKey;
use rsa::pkcs8::DecodePublicKey;
use rsa::traits::PublicKeyParts;
use rsa::{Oaep, RsaPrivateKey, RsaPublicKey};
use sha2::Sha256;

use crate::error::{PulseError, PulseResult};

/// SHA-256 digest length; OAEP uses it for both the hash and MGF1
const OAEP_HASH_LEN: usize = 32;

/// Load an X.509 SubjectPublicKeyInfo public key from a PEM file.
///
/// A readable PEM of a different recognized flavor is `NotSupportedKey`;
/// anything unreadable or malformed is `BadKeyFile`.
pub fn load_public_key(path: impl AsRef<Path>) -> PulseResult<RsaPublicKey> {
    let path = path.as_ref();
    let pem = read_key_file(path)?;
    match pem_label(&pem) {
        Some("PUBLIC KEY") => RsaPublicKey::from_public_key_pem(&pem).map_err(|e| bad_key(path, e)),
        Some(_) => Err(PulseError::NotSupportedKey {
            path: path.display().to_string(),
        }),
        None => Err(bad_key(path, "no PEM block found")),
    }
}

/// Load a PKCS#1 private key from a PEM file
pub fn load_private_key(path: impl AsRef<Path>) -> PulseResult<RsaPrivateKey> {
    let path = path.as_ref();
    let pem = read_key_file(path)?;
    match pem_label(&pem) {
        Some("RSA PRIVATE KEY") => {
            RsaPrivateKey::from_pkcs1_pem(&pem).map_err(|e| bad_key(path, e))
        }
        Some(_) => Err(PulseError::NotSupportedKey {
            path: path.display().to_string(),
        }),
        None => Err(bad_key(path, "no PEM block found")),
    }
}

fn read_key_file(path: &Path) -> PulseResult<String> {
    std::fs::read_to_string(path).map_err(|e| bad_key(path, e))
}

fn bad_key(path: &Path, message: impl ToString) -> PulseError {
    PulseError::BadKeyFile {
        path: path.display().to_string(),
        message: message.to_string(),
    }
}

/// Extract the label of the first PEM block in the file
fn pem_label(pem: &str) -> Option<&str> {
    let start = pem.find("-----BEGIN ")? + "-----BEGIN ".len();
    let end = pem[start..].find("-----")?;
    Some(&pem[start..start + end])
}

/// Chunked RSA-OAEP(SHA-256) encrypter.
///
/// OAEP bounds each operation at `key_size - 2*hash_len - 2` plaintext
/// bytes; larger inputs are split, each chunk encrypted independently, and
/// the ciphertexts concatenated in order. The final chunk is encrypted
/// exactly as long as it is, never padded.
pub struct Encrypter {
    key: RsaPublicKey,
}

impl Encrypter {
    pub fn new(key: RsaPublicKey) -> Self {
        Self { key }
    }

    /// Build an encrypter from a PEM public key file
    pub fn from_pem_file(path: impl AsRef<Path>) -> PulseResult<Self> {
        Ok(Self::new(load_public_key(path)?))
    }

    /// Largest plaintext accepted by a single OAEP operation
    fn chunk_limit(&self) -> usize {
        self.key.size() - 2 * OAEP_HASH_LEN - 2
    }

    /// Encrypt a byte stream of any length
    pub fn encrypt(&self, plain: &[u8]) -> PulseResult<Vec<u8>> {
        let mut rng = rand::thread_rng();
        let mut cipher = Vec::new();
        for chunk in plain.chunks(self.chunk_limit()) {
            let block = self
                .key
                .encrypt(&mut rng, Oaep::new::<Sha256>(), chunk)
                .map_err(|e| PulseError::unexpected(format!("rsa encrypt: {}", e)))?;
            cipher.extend_from_slice(&block);
        }
        Ok(cipher)
    }
}

/// Chunked RSA-OAEP(SHA-256) decrypter, the inverse of [`Encrypter`].
pub struct Decrypter {
    key: RsaPrivateKey,
}

impl Decrypter {
    pub fn new(key: RsaPrivateKey) -> Self {
        Self { key }
    }

    /// Build a decrypter from a PEM private key file
    pub fn from_pem_file(path: impl AsRef<Path>) -> PulseResult<Self> {
        Ok(Self::new(load_private_key(path)?))
    }

    /// Decrypt a concatenation of OAEP ciphertext blocks.
    ///
    /// Ciphertext is read in modulus-size chunks; a short final chunk is
    /// handed to the cipher as-is and surfaces as a decrypt error there.
    pub fn decrypt(&self, cipher: &[u8]) -> PulseResult<Vec<u8>> {
        let block_len = self.key.size();
        let mut plain = Vec::new();
        for chunk in cipher.chunks(block_len) {
            let block = self
                .key
                .decrypt(Oaep::new::<Sha256>(), chunk)
                .map_err(|e| PulseError::unexpected(format!("rsa decrypt: {}", e)))?;
            plain.extend_from_slice(&block);
        }
        Ok(plain)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rsa::pkcs1::EncodeRsaPrivateKey;
    use rsa::pkcs8::{EncodePublicKey, LineEnding};
    use std::io::Write;

    fn test_key() -> RsaPrivateKey {
        let mut rng = rand::thread_rng();
        RsaPrivateKey::new(&mut rng, 2048).unwrap()
    }

    fn round_trip(payload: &[u8]) {
        let private = test_key();
        let encrypter = Encrypter::new(RsaPublicKey::from(&private));
        let decrypter = Decrypter::new(private);
        let cipher = encrypter.encrypt(payload).unwrap();
        assert_eq!(decrypter.decrypt(&cipher).unwrap(), payload);
    }

    #[test]
    fn empty_payload_round_trips() {
        round_trip(b"");
    }

    #[test]
    fn single_chunk_round_trips() {
        round_trip(b"one small batch");
    }

    #[test]
    fn multi_chunk_round_trips() {
        // 4000 bytes against a 2048-bit key: 190-byte chunk bound, 22 blocks.
        let payload: Vec<u8> = (0..4000u32).map(|i| (i % 251) as u8).collect();
        round_trip(&payload);
    }

    #[test]
    fn ciphertext_grows_by_modulus_per_chunk() {
        let private = test_key();
        let encrypter = Encrypter::new(RsaPublicKey::from(&private));
        let cipher = encrypter.encrypt(&[0u8; 191]).unwrap();
        // 191 bytes needs two chunks with a 190-byte bound.
        assert_eq!(cipher.len(), 2 * 256);
    }

    #[test]
    fn key_files_round_trip() {
        let private = test_key();
        let dir = tempfile::tempdir().unwrap();

        let pub_path = dir.path().join("public.pem");
        let pem = RsaPublicKey::from(&private)
            .to_public_key_pem(LineEnding::LF)
            .unwrap();
        std::fs::write(&pub_path, pem).unwrap();

        let priv_path = dir.path().join("private.pem");
        let pem = private.to_pkcs1_pem(LineEnding::LF).unwrap();
        std::fs::write(&priv_path, pem.as_bytes()).unwrap();

        let encrypter = Encrypter::from_pem_file(&pub_path).unwrap();
        let decrypter = Decrypter::from_pem_file(&priv_path).unwrap();
        let cipher = encrypter.encrypt(b"payload").unwrap();
        assert_eq!(decrypter.decrypt(&cipher).unwrap(), b"payload");
    }

    #[test]
    fn wrong_key_flavor_is_not_supported() {
        let private = test_key();
        let dir = tempfile::tempdir().unwrap();

        let priv_path = dir.path().join("private.pem");
        let pem = private.to_pkcs1_pem(LineEnding::LF).unwrap();
        std::fs::write(&priv_path, pem.as_bytes()).unwrap();
        assert!(matches!(
            load_public_key(&priv_path),
            Err(PulseError::NotSupportedKey { .. })
        ));

        let pub_path = dir.path().join("public.pem");
        let pem = RsaPublicKey::from(&private)
            .to_public_key_pem(LineEnding::LF)
            .unwrap();
        std::fs::write(&pub_path, pem).unwrap();
        assert!(matches!(
            load_private_key(&pub_path),
            Err(PulseError::NotSupportedKey { .. })
        ));
    }

    #[test]
    fn malformed_pem_is_a_bad_key_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("garbage.pem");
        let mut file = std::fs::File::create(&path).unwrap();
        file.write_all(b"not a key at all").unwrap();
        assert!(matches!(
            load_public_key(&path),
            Err(PulseError::BadKeyFile { .. })
        ));
    }

    #[test]
    fn missing_file_is_a_bad_key_file() {
        assert!(matches!(
            load_private_key("/nonexistent/key.pem"),
            Err(PulseError::BadKeyFile { .. })
        ));
    }
}

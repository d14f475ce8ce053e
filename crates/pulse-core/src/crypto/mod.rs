//! Signing and asymmetric encryption for metrics in flight

mod keys;
mod signer;

pub use keys::{load_private_key, load_public_key, Decrypter, Encrypter};
pub use signer::Signer;

//! p.file Vault - Cryptographic Core
//!
//! Key lifecycle plus the encrypt/decrypt choke point every photo passes through.

pub mod keys;
pub mod aead;

pub use keys::*;
pub use aead::*;

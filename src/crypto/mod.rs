//! Device key material.

mod keypair;

pub use keypair::KeyPair;

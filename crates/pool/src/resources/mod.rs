//! Built-in pooled resources.

mod connection;
mod engine;

pub use connection::SecureConnection;
pub use engine::EncryptionEngine;

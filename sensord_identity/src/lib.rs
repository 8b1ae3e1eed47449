//! Persisted HMAC key and anonymized dynamic-sensor ID derivation (§4.9).

pub mod id;
pub mod key;

pub use id::IdentityModule;

pub mod fingerprint_service;
pub mod store;

pub use fingerprint_service::{FingerprintService, ReadingFilter};
pub use store::{FingerprintStore, MemoryFingerprintStore};

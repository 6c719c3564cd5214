//! Concrete [`InferenceBackend`](crate::InferenceBackend) implementations.

pub mod stub;
#[cfg(feature = "backend-tract")]
pub mod tract;

pub use stub::StubBackend;

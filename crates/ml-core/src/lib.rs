//! Detection primitives shared by the streaming pipeline.
//!
//! The crate owns everything the pipeline treats as an opaque collaborator:
//! the [`InferenceBackend`] contract, the concrete backends that implement it,
//! and the label table used to name class ids.

pub mod backend;
pub mod backends;
pub mod detector;
pub mod labels;

pub use backend::{InferenceBackend, load_backend};
pub use backends::StubBackend;
pub use detector::{Detection, DetectionBatch};
pub use labels::LabelTable;

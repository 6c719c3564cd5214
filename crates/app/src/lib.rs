//! Person detection stream service.

pub mod vision;

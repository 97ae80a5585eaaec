//! Shared numeric kernel and error taxonomy

pub mod errors;
pub mod fixed_point;

//! Application services: the content source seam and cached read paths.

pub mod content;
pub mod error;
pub mod source;

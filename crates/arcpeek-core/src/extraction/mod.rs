//! Writing archive entries to disk.

mod atomic;
pub mod engine;
mod links;
mod metadata;

pub use engine::Extractor;

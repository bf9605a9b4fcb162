pub mod constants;
pub mod engine;
pub mod error;
pub mod field;
pub mod source;
pub mod status;
pub mod sync;

// Re-export the engine types for easy access
pub use engine::{DecodeEngine, DecodeOutcome};

#[cfg(test)]
mod tests;

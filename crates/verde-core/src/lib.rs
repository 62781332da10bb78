pub mod analysis;
pub mod config;
pub mod design;
pub mod error;
pub mod intent;
pub mod predictor;
pub mod session;
pub mod version;

// Re-export common error type
pub use error::VerdeError;

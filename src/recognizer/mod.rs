//! Bridge to an external speech-recognition subprocess.

pub mod client;

pub use client::{RecognizerClient, RecognizerConfig, RecognizerError};

pub mod config;
pub mod verifier;

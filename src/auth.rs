//! Credential and token models handed back to the embedding authentication layer.

pub mod secret;
pub mod token;

pub use secret::*;
pub use token::*;

// src/lib.rs
//! Carrying an onchain identifier through Safe transactions and ERC-4337
//! user operations.

pub mod artifacts;
pub mod bundler;
pub mod calls;
pub mod config;
pub mod contracts;
pub mod error;
pub mod fixture;
pub mod identifier;
pub mod nonce;
pub mod rpc;
pub mod scenarios;
pub mod signature;
pub mod types;

pub use error::HarnessError;
pub use identifier::OnchainIdentifier;
pub use types::{PackedUserOperation, UserOperation};

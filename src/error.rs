// src/error.rs
use ethers::contract::ContractError;
use ethers::middleware::signer::SignerMiddlewareError;
use ethers::prelude::{Middleware, ProviderError, Signer, TransactionReceipt, U64};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum HarnessError {
    #[error("Invalid UserOperation: {0}")]
    InvalidUserOperation(String),

    #[error("Invalid validity window: {0}")]
    InvalidValidityWindow(String),

    #[error("Signing failed: {0}")]
    Signing(String),

    #[error("Contract call failed: {0}")]
    Contract(String),

    #[error("Ethereum provider error: {0}")]
    Provider(String),

    #[error("Transaction dropped from the mempool")]
    TransactionDropped,

    #[error("Transaction reverted: {0}")]
    TransactionReverted(String),

    #[error("Invalid contract artifact: {0}")]
    Artifact(String),

    #[error("Assertion failed: {0}")]
    AssertionFailed(String),

    #[error("Fixture error: {0}")]
    Fixture(String),
}

impl<M: Middleware> From<ContractError<M>> for HarnessError {
    fn from(err: ContractError<M>) -> Self {
        HarnessError::Contract(err.to_string())
    }
}

impl<M: Middleware, S: Signer> From<SignerMiddlewareError<M, S>> for HarnessError {
    fn from(err: SignerMiddlewareError<M, S>) -> Self {
        HarnessError::Provider(err.to_string())
    }
}

impl From<ProviderError> for HarnessError {
    fn from(err: ProviderError) -> Self {
        HarnessError::Provider(err.to_string())
    }
}

// Unwraps a mined receipt, failing on dropped or reverted transactions.
pub(crate) fn require_success(
    receipt: Option<TransactionReceipt>,
) -> Result<TransactionReceipt, HarnessError> {
    let receipt = receipt.ok_or(HarnessError::TransactionDropped)?;
    if receipt.status != Some(U64::from(1)) {
        return Err(HarnessError::TransactionReverted(format!(
            "{:?}",
            receipt.transaction_hash
        )));
    }
    Ok(receipt)
}

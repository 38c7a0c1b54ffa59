// src/bundler.rs
use std::sync::Arc;

use ethers::contract::parse_log;
use ethers::prelude::*;
use tracing::{debug, info, warn};

use crate::contracts::{EntryPoint, UserOperationEventFilter};
use crate::error::{require_success, HarnessError};
use crate::types::UserOperation;

/// Stand-in bundler: hands a single user operation straight to
/// `EntryPoint.handleOps` from the relayer account.
///
/// There is no mempool, simulation, batching or retry. The relayer pays the
/// gas up front and is the beneficiary of the operation's refund.
pub struct Bundler<M> {
    client: Arc<M>,
    beneficiary: Address,
}

impl<M: Middleware + 'static> Bundler<M> {
    pub fn new(client: Arc<M>, beneficiary: Address) -> Self {
        Self {
            client,
            beneficiary,
        }
    }

    pub fn beneficiary(&self) -> Address {
        self.beneficiary
    }

    /// Submits `user_op` to `entry_point` and returns its user operation hash.
    pub async fn send_user_operation(
        &self,
        user_op: &UserOperation,
        entry_point: Address,
    ) -> Result<H256, HarnessError> {
        let packed = user_op.pack();
        let entry_point = EntryPoint::new(entry_point, self.client.clone());

        let user_op_hash = H256::from(entry_point.get_user_op_hash(packed.clone()).call().await?);
        debug!("Relaying user operation {:?} for {}", user_op_hash, user_op.sender);

        let call = entry_point.handle_ops(vec![packed], self.beneficiary);
        let pending = call.send().await?;
        let receipt = require_success(pending.await?)?;

        inclusion_result(&receipt, user_op_hash)
    }
}

/// Looks up the `UserOperationEvent` for `user_op_hash` in a mined
/// `handleOps` receipt.
pub fn inclusion_result(
    receipt: &TransactionReceipt,
    user_op_hash: H256,
) -> Result<H256, HarnessError> {
    let executed = receipt
        .logs
        .iter()
        .filter_map(|log| parse_log::<UserOperationEventFilter>(log.clone()).ok())
        .find(|event| H256::from(event.user_op_hash) == user_op_hash);

    match executed {
        Some(event) if event.success => {
            info!(
                "User operation {:?} included in {:?} (gas used {})",
                user_op_hash, receipt.transaction_hash, event.actual_gas_used
            );
            Ok(user_op_hash)
        }
        Some(_) => Err(HarnessError::TransactionReverted(format!(
            "user operation {user_op_hash:?} executed but its call reverted"
        ))),
        None => {
            warn!(
                "No UserOperationEvent for {:?} in {:?}",
                user_op_hash, receipt.transaction_hash
            );
            Err(HarnessError::TransactionDropped)
        }
    }
}

#[cfg(test)]
mod tests {
    use ethers::abi::{encode, Token};
    use ethers::contract::EthEvent;
    use ethers::providers::{MockProvider, Provider};

    use super::*;

    fn user_operation_event(user_op_hash: H256, success: bool) -> Log {
        let sender = Address::repeat_byte(0x5a);
        Log {
            address: Address::repeat_byte(0xe4),
            topics: vec![
                UserOperationEventFilter::signature(),
                user_op_hash,
                H256::from(sender),
                H256::zero(),
            ],
            data: encode(&[
                Token::Uint(U256::zero()),
                Token::Bool(success),
                Token::Uint(U256::from(21_000)),
                Token::Uint(U256::from(70_000)),
            ])
            .into(),
            ..Default::default()
        }
    }

    fn receipt(logs: Vec<Log>) -> TransactionReceipt {
        TransactionReceipt {
            transaction_hash: H256::repeat_byte(0x77),
            status: Some(U64::from(1)),
            logs,
            ..Default::default()
        }
    }

    #[test]
    fn successful_event_returns_hash() {
        let hash = H256::repeat_byte(0x11);
        let receipt = receipt(vec![
            user_operation_event(H256::repeat_byte(0x22), false),
            user_operation_event(hash, true),
        ]);
        assert_eq!(inclusion_result(&receipt, hash).unwrap(), hash);
    }

    #[test]
    fn failed_inner_call_is_reverted() {
        let hash = H256::repeat_byte(0x11);
        let receipt = receipt(vec![user_operation_event(hash, false)]);
        assert!(matches!(
            inclusion_result(&receipt, hash),
            Err(HarnessError::TransactionReverted(_))
        ));
    }

    #[test]
    fn missing_event_is_dropped() {
        let hash = H256::repeat_byte(0x11);
        assert!(matches!(
            inclusion_result(&receipt(vec![]), hash),
            Err(HarnessError::TransactionDropped)
        ));

        let other = receipt(vec![user_operation_event(H256::repeat_byte(0x22), true)]);
        assert!(matches!(
            inclusion_result(&other, hash),
            Err(HarnessError::TransactionDropped)
        ));
    }

    #[tokio::test]
    async fn hash_lookup_failure_stops_before_relaying() {
        let (provider, _mock): (Provider<MockProvider>, _) = Provider::mocked();
        let bundler = Bundler::new(Arc::new(provider), Address::repeat_byte(0xbe));
        let user_op = UserOperation::new(Address::repeat_byte(0x5a), U256::zero(), Bytes::new());

        let err = bundler
            .send_user_operation(&user_op, Address::repeat_byte(0xe4))
            .await
            .unwrap_err();
        assert!(matches!(err, HarnessError::Contract(_)));
    }
}

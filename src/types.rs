// src/types.rs
use ethers::types::{Address, Bytes, U256};
use serde::{Deserialize, Serialize};

use crate::error::HarnessError;

pub use crate::contracts::PackedUserOperation;

/// Factory used to deploy the sender atomically with its first operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FactoryInit {
    pub factory: Address,
    pub factory_data: Bytes,
}

impl FactoryInit {
    /// `factory ++ factoryData`, tightly packed.
    pub fn init_code(&self) -> Bytes {
        let mut data = Vec::with_capacity(20 + self.factory_data.len());
        data.extend_from_slice(self.factory.as_bytes());
        data.extend_from_slice(&self.factory_data);
        Bytes::from(data)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaymasterInit {
    pub paymaster: Address,
    pub verification_gas_limit: u128,
    pub post_op_gas_limit: u128,
    pub paymaster_data: Bytes,
}

impl PaymasterInit {
    /// `paymaster ++ uint128 verificationGasLimit ++ uint128 postOpGasLimit ++ paymasterData`.
    pub fn paymaster_and_data(&self) -> Bytes {
        let mut data = Vec::with_capacity(52 + self.paymaster_data.len());
        data.extend_from_slice(self.paymaster.as_bytes());
        data.extend_from_slice(&self.verification_gas_limit.to_be_bytes());
        data.extend_from_slice(&self.post_op_gas_limit.to_be_bytes());
        data.extend_from_slice(&self.paymaster_data);
        Bytes::from(data)
    }
}

/// An ERC-4337 v0.7 user operation in its unpacked form.
///
/// The factory and paymaster fields are grouped so that a partially
/// specified group cannot be represented.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserOperation {
    pub sender: Address,
    pub nonce: U256,
    pub factory: Option<FactoryInit>,
    pub call_data: Bytes,
    pub call_gas_limit: u128,
    pub verification_gas_limit: u128,
    pub pre_verification_gas: U256,
    pub max_fee_per_gas: u128,
    pub max_priority_fee_per_gas: u128,
    pub paymaster: Option<PaymasterInit>,
    pub signature: Bytes,
}

impl UserOperation {
    pub fn new(sender: Address, nonce: U256, call_data: Bytes) -> Self {
        Self {
            sender,
            nonce,
            factory: None,
            call_data,
            call_gas_limit: 0,
            verification_gas_limit: 0,
            pre_verification_gas: U256::zero(),
            max_fee_per_gas: 0,
            max_priority_fee_per_gas: 0,
            paymaster: None,
            signature: Bytes::default(),
        }
    }

    pub fn with_factory(mut self, factory: Address, factory_data: Bytes) -> Self {
        self.factory = Some(FactoryInit {
            factory,
            factory_data,
        });
        self
    }

    pub fn with_gas_limits(
        mut self,
        verification_gas_limit: u128,
        call_gas_limit: u128,
        pre_verification_gas: U256,
    ) -> Self {
        self.verification_gas_limit = verification_gas_limit;
        self.call_gas_limit = call_gas_limit;
        self.pre_verification_gas = pre_verification_gas;
        self
    }

    pub fn with_fees(mut self, max_fee_per_gas: u128, max_priority_fee_per_gas: u128) -> Self {
        self.max_fee_per_gas = max_fee_per_gas;
        self.max_priority_fee_per_gas = max_priority_fee_per_gas;
        self
    }

    pub fn with_paymaster(mut self, paymaster: PaymasterInit) -> Self {
        self.paymaster = Some(paymaster);
        self
    }

    pub fn with_signature(mut self, signature: Bytes) -> Self {
        self.signature = signature;
        self
    }

    /// Packs the operation into the layout `EntryPoint.handleOps` expects.
    pub fn pack(&self) -> PackedUserOperation {
        PackedUserOperation {
            sender: self.sender,
            nonce: self.nonce,
            init_code: self
                .factory
                .as_ref()
                .map(FactoryInit::init_code)
                .unwrap_or_default(),
            call_data: self.call_data.clone(),
            account_gas_limits: pack_u128_pair(self.verification_gas_limit, self.call_gas_limit),
            pre_verification_gas: self.pre_verification_gas,
            gas_fees: pack_u128_pair(self.max_priority_fee_per_gas, self.max_fee_per_gas),
            paymaster_and_data: self
                .paymaster
                .as_ref()
                .map(PaymasterInit::paymaster_and_data)
                .unwrap_or_default(),
            signature: self.signature.clone(),
        }
    }
}

fn pack_u128_pair(high: u128, low: u128) -> [u8; 32] {
    let mut packed = [0u8; 32];
    packed[..16].copy_from_slice(&high.to_be_bytes());
    packed[16..].copy_from_slice(&low.to_be_bytes());
    packed
}

/// JSON-RPC shape of a v0.7 user operation, as accepted by `eth_sendUserOperation`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RpcUserOperation {
    pub sender: Address,
    pub nonce: U256,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub factory: Option<Address>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub factory_data: Option<Bytes>,
    pub call_data: Bytes,
    pub call_gas_limit: U256,
    pub verification_gas_limit: U256,
    pub pre_verification_gas: U256,
    pub max_fee_per_gas: U256,
    pub max_priority_fee_per_gas: U256,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub paymaster: Option<Address>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub paymaster_verification_gas_limit: Option<U256>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub paymaster_post_op_gas_limit: Option<U256>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub paymaster_data: Option<Bytes>,
    pub signature: Bytes,
}

fn to_u128(field: &str, value: U256) -> Result<u128, HarnessError> {
    if value > U256::from(u128::MAX) {
        return Err(HarnessError::InvalidUserOperation(format!(
            "{field} does not fit in uint128"
        )));
    }
    Ok(value.as_u128())
}

impl TryFrom<RpcUserOperation> for UserOperation {
    type Error = HarnessError;

    fn try_from(op: RpcUserOperation) -> Result<Self, Self::Error> {
        let factory = match (op.factory, op.factory_data) {
            (Some(factory), Some(factory_data)) => Some(FactoryInit {
                factory,
                factory_data,
            }),
            (None, None) => None,
            _ => {
                return Err(HarnessError::InvalidUserOperation(
                    "factory and factoryData must be set together".to_string(),
                ))
            }
        };

        let paymaster = match (
            op.paymaster,
            op.paymaster_verification_gas_limit,
            op.paymaster_post_op_gas_limit,
            op.paymaster_data,
        ) {
            (Some(paymaster), Some(verification), Some(post_op), Some(paymaster_data)) => {
                Some(PaymasterInit {
                    paymaster,
                    verification_gas_limit: to_u128("paymasterVerificationGasLimit", verification)?,
                    post_op_gas_limit: to_u128("paymasterPostOpGasLimit", post_op)?,
                    paymaster_data,
                })
            }
            (None, None, None, None) => None,
            _ => {
                return Err(HarnessError::InvalidUserOperation(
                    "paymaster fields must be set together".to_string(),
                ))
            }
        };

        Ok(UserOperation {
            sender: op.sender,
            nonce: op.nonce,
            factory,
            call_data: op.call_data,
            call_gas_limit: to_u128("callGasLimit", op.call_gas_limit)?,
            verification_gas_limit: to_u128("verificationGasLimit", op.verification_gas_limit)?,
            pre_verification_gas: op.pre_verification_gas,
            max_fee_per_gas: to_u128("maxFeePerGas", op.max_fee_per_gas)?,
            max_priority_fee_per_gas: to_u128("maxPriorityFeePerGas", op.max_priority_fee_per_gas)?,
            paymaster,
            signature: op.signature,
        })
    }
}

impl From<&UserOperation> for RpcUserOperation {
    fn from(op: &UserOperation) -> Self {
        RpcUserOperation {
            sender: op.sender,
            nonce: op.nonce,
            factory: op.factory.as_ref().map(|f| f.factory),
            factory_data: op.factory.as_ref().map(|f| f.factory_data.clone()),
            call_data: op.call_data.clone(),
            call_gas_limit: U256::from(op.call_gas_limit),
            verification_gas_limit: U256::from(op.verification_gas_limit),
            pre_verification_gas: op.pre_verification_gas,
            max_fee_per_gas: U256::from(op.max_fee_per_gas),
            max_priority_fee_per_gas: U256::from(op.max_priority_fee_per_gas),
            paymaster: op.paymaster.as_ref().map(|p| p.paymaster),
            paymaster_verification_gas_limit: op
                .paymaster
                .as_ref()
                .map(|p| U256::from(p.verification_gas_limit)),
            paymaster_post_op_gas_limit: op
                .paymaster
                .as_ref()
                .map(|p| U256::from(p.post_op_gas_limit)),
            paymaster_data: op.paymaster.as_ref().map(|p| p.paymaster_data.clone()),
            signature: op.signature.clone(),
        }
    }
}

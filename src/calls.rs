// src/calls.rs
//! Call data builders for the Safe, its factory, the 4337 module and the counter.

use ethers::abi::AbiEncode;
use ethers::types::{Address, Bytes, U256};

use crate::contracts::counter::IncrementCall;
use crate::contracts::module::ExecuteUserOpCall;
use crate::contracts::module_setup::EnableModulesCall;
use crate::contracts::proxy_factory::CreateProxyWithNonceCall;
use crate::contracts::safe::{ExecTransactionCall, SetupCall};
use crate::signature::approved_hash_signature;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(u8)]
pub enum Operation {
    #[default]
    Call = 0,
    DelegateCall = 1,
}

impl From<Operation> for u8 {
    fn from(op: Operation) -> Self {
        op as u8
    }
}

/// Arguments of `Safe.setup`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SafeSetup {
    pub owners: Vec<Address>,
    pub threshold: U256,
    pub to: Address,
    pub data: Bytes,
    pub fallback_handler: Address,
    pub payment_token: Address,
    pub payment: U256,
    pub payment_receiver: Address,
}

impl SafeSetup {
    /// One owner, threshold one, no modules and no payment.
    pub fn single_owner(owner: Address) -> Self {
        Self {
            owners: vec![owner],
            threshold: U256::one(),
            to: Address::zero(),
            data: Bytes::default(),
            fallback_handler: Address::zero(),
            payment_token: Address::zero(),
            payment: U256::zero(),
            payment_receiver: Address::zero(),
        }
    }

    /// Enables `module` through a delegate call to `module_setup` and installs
    /// it as the fallback handler.
    pub fn with_4337_module(mut self, module_setup: Address, module: Address) -> Self {
        self.to = module_setup;
        self.data = enable_modules(vec![module]);
        self.fallback_handler = module;
        self
    }

    pub fn with_payment_receiver(mut self, payment_receiver: Address) -> Self {
        self.payment_receiver = payment_receiver;
        self
    }

    pub fn encode(&self) -> Bytes {
        SetupCall {
            owners: self.owners.clone(),
            threshold: self.threshold,
            to: self.to,
            data: self.data.clone(),
            fallback_handler: self.fallback_handler,
            payment_token: self.payment_token,
            payment: self.payment,
            payment_receiver: self.payment_receiver,
        }
        .encode()
        .into()
    }
}

/// Arguments of `Safe.execTransaction`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SafeTransaction {
    pub to: Address,
    pub value: U256,
    pub data: Bytes,
    pub operation: Operation,
    pub safe_tx_gas: U256,
    pub base_gas: U256,
    pub gas_price: U256,
    pub gas_token: Address,
    pub refund_receiver: Address,
    pub signatures: Bytes,
}

impl SafeTransaction {
    /// A plain call with no gas refund, authorised by `owner` sending it.
    pub fn call_from_owner(owner: Address, to: Address, data: Bytes) -> Self {
        Self {
            to,
            value: U256::zero(),
            data,
            operation: Operation::Call,
            safe_tx_gas: U256::zero(),
            base_gas: U256::zero(),
            gas_price: U256::zero(),
            gas_token: Address::zero(),
            refund_receiver: Address::zero(),
            signatures: approved_hash_signature(owner),
        }
    }

    pub fn with_refund_receiver(mut self, refund_receiver: Address) -> Self {
        self.refund_receiver = refund_receiver;
        self
    }

    pub fn into_call(self) -> ExecTransactionCall {
        ExecTransactionCall {
            to: self.to,
            value: self.value,
            data: self.data,
            operation: self.operation.into(),
            safe_tx_gas: self.safe_tx_gas,
            base_gas: self.base_gas,
            gas_price: self.gas_price,
            gas_token: self.gas_token,
            refund_receiver: self.refund_receiver,
            signatures: self.signatures,
        }
    }

    pub fn encode(&self) -> Bytes {
        self.clone().into_call().encode().into()
    }
}

pub fn enable_modules(modules: Vec<Address>) -> Bytes {
    EnableModulesCall { modules }.encode().into()
}

pub fn execute_user_op(to: Address, value: U256, data: Bytes, operation: Operation) -> Bytes {
    ExecuteUserOpCall {
        to,
        value,
        data,
        operation: operation.into(),
    }
    .encode()
    .into()
}

pub fn create_proxy_with_nonce(singleton: Address, initializer: Bytes, salt_nonce: U256) -> Bytes {
    CreateProxyWithNonceCall {
        singleton,
        initializer,
        salt_nonce,
    }
    .encode()
    .into()
}

pub fn increment() -> Bytes {
    IncrementCall.encode().into()
}

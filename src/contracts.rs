// src/contracts.rs
//! Bindings for the externally supplied contracts the harness drives.
//!
//! Only the functions and events the harness touches are declared. Each
//! binding lives in its own module so the two `PackedUserOperation`
//! declarations do not collide.

pub mod entry_point {
    use ethers::contract::abigen;

    abigen!(
        EntryPoint,
        r#"[
            struct PackedUserOperation { address sender; uint256 nonce; bytes initCode; bytes callData; bytes32 accountGasLimits; uint256 preVerificationGas; bytes32 gasFees; bytes paymasterAndData; bytes signature; }
            function handleOps(PackedUserOperation[] ops, address beneficiary)
            function getNonce(address sender, uint192 key) view returns (uint256 nonce)
            function getUserOpHash(PackedUserOperation userOp) view returns (bytes32)
            event UserOperationEvent(bytes32 indexed userOpHash, address indexed sender, address indexed paymaster, uint256 nonce, bool success, uint256 actualGasCost, uint256 actualGasUsed)
        ]"#
    );
}

pub mod module {
    use ethers::contract::abigen;

    abigen!(
        Safe4337Module,
        r#"[
            struct PackedUserOperation { address sender; uint256 nonce; bytes initCode; bytes callData; bytes32 accountGasLimits; uint256 preVerificationGas; bytes32 gasFees; bytes paymasterAndData; bytes signature; }
            function executeUserOp(address to, uint256 value, bytes data, uint8 operation)
            function getOperationHash(PackedUserOperation userOp) view returns (bytes32 operationHash)
        ]"#
    );

    impl From<super::entry_point::PackedUserOperation> for PackedUserOperation {
        fn from(op: super::entry_point::PackedUserOperation) -> Self {
            Self {
                sender: op.sender,
                nonce: op.nonce,
                init_code: op.init_code,
                call_data: op.call_data,
                account_gas_limits: op.account_gas_limits,
                pre_verification_gas: op.pre_verification_gas,
                gas_fees: op.gas_fees,
                paymaster_and_data: op.paymaster_and_data,
                signature: op.signature,
            }
        }
    }
}

pub mod safe {
    use ethers::contract::abigen;

    abigen!(
        SafeL2,
        r#"[
            function setup(address[] owners, uint256 threshold, address to, bytes data, address fallbackHandler, address paymentToken, uint256 payment, address paymentReceiver)
            function execTransaction(address to, uint256 value, bytes data, uint8 operation, uint256 safeTxGas, uint256 baseGas, uint256 gasPrice, address gasToken, address refundReceiver, bytes signatures) payable returns (bool success)
            function getOwners() view returns (address[])
            event SafeMultiSigTransaction(address to, uint256 value, bytes data, uint8 operation, uint256 safeTxGas, uint256 baseGas, uint256 gasPrice, address gasToken, address refundReceiver, bytes signatures, bytes additionalInfo)
        ]"#
    );
}

pub mod proxy_factory {
    use ethers::contract::abigen;

    abigen!(
        SafeProxyFactory,
        r#"[
            function createProxyWithNonce(address singleton, bytes initializer, uint256 saltNonce) returns (address proxy)
        ]"#
    );
}

pub mod module_setup {
    use ethers::contract::abigen;

    abigen!(
        SafeModuleSetup,
        r#"[
            function enableModules(address[] modules)
        ]"#
    );
}

pub mod counter {
    use ethers::contract::abigen;

    abigen!(
        Counter,
        r#"[
            function increment()
            function count() view returns (uint256)
        ]"#
    );
}

pub use counter::Counter;
pub use entry_point::{EntryPoint, PackedUserOperation, UserOperationEventFilter};
pub use module::Safe4337Module;
pub use module_setup::SafeModuleSetup;
pub use proxy_factory::SafeProxyFactory;
pub use safe::{SafeL2, SafeMultiSigTransactionFilter};

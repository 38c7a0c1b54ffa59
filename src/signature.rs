// src/signature.rs
use async_trait::async_trait;
use ethers::prelude::*;
use tracing::debug;

use crate::contracts::{module, Safe4337Module};
use crate::error::HarnessError;
use crate::types::{PackedUserOperation, UserOperation};

/// Largest value representable as a `uint48`.
pub const MAX_UINT48: u64 = (1 << 48) - 1;

/// Length of a module signature: two `uint48` bounds, `r`, `s` and `v`.
pub const MODULE_SIGNATURE_LEN: usize = 6 + 6 + 32 + 32 + 1;

/// Builds an approved-hash signature for `owner`.
///
/// The Safe accepts it when `owner` is the transaction sender or has
/// previously approved the hash on chain.
pub fn approved_hash_signature(owner: Address) -> Bytes {
    let mut signature = Vec::with_capacity(65);
    signature.extend_from_slice(H256::from(owner).as_bytes());
    signature.extend_from_slice(&[0u8; 32]);
    signature.push(1);
    Bytes::from(signature)
}

/// Time bounds a module signature is valid for. Zero leaves a side unbounded.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ValidityWindow {
    valid_after: u64,
    valid_until: u64,
}

impl ValidityWindow {
    pub fn new(valid_after: u64, valid_until: u64) -> Result<Self, HarnessError> {
        if valid_after > MAX_UINT48 || valid_until > MAX_UINT48 {
            return Err(HarnessError::InvalidValidityWindow(format!(
                "bounds ({valid_after}, {valid_until}) exceed uint48"
            )));
        }
        Ok(Self {
            valid_after,
            valid_until,
        })
    }

    pub fn unbounded() -> Self {
        Self::default()
    }

    pub fn valid_after(&self) -> u64 {
        self.valid_after
    }

    pub fn valid_until(&self) -> u64 {
        self.valid_until
    }

    /// `uint48 validAfter ++ uint48 validUntil`.
    pub fn to_bytes(&self) -> [u8; 12] {
        let mut out = [0u8; 12];
        out[..6].copy_from_slice(&self.valid_after.to_be_bytes()[2..]);
        out[6..].copy_from_slice(&self.valid_until.to_be_bytes()[2..]);
        out
    }
}

/// Computes the hash a module signature has to cover.
#[async_trait]
pub trait OperationHasher: Send + Sync {
    async fn operation_hash(&self, user_op: PackedUserOperation) -> Result<H256, HarnessError>;
}

#[async_trait]
impl<M: Middleware + 'static> OperationHasher for Safe4337Module<M> {
    async fn operation_hash(&self, user_op: PackedUserOperation) -> Result<H256, HarnessError> {
        let hash = self
            .get_operation_hash(module::PackedUserOperation::from(user_op))
            .call()
            .await?;
        Ok(H256::from(hash))
    }
}

/// Signs `user_op` for the Safe 4337 module.
///
/// The module hash is computed with the packed signature temporarily set to
/// the validity window, which binds the window into the hash. The hash is
/// then signed as a personal message, and `v` is shifted by 4 so the module
/// recognises an `eth_sign` style signature.
pub async fn sign_user_operation<S, H>(
    signer: &S,
    user_op: &UserOperation,
    hasher: &H,
    window: ValidityWindow,
) -> Result<Bytes, HarnessError>
where
    S: Signer,
    H: OperationHasher + ?Sized,
{
    let window_bytes = window.to_bytes();
    let mut packed = user_op.pack();
    packed.signature = Bytes::from(window_bytes.to_vec());

    let operation_hash = hasher.operation_hash(packed).await?;
    debug!("Signing operation hash {:?} for {}", operation_hash, user_op.sender);

    // eth_sign over the raw hash; EIP-712 would be preferable outside of tests.
    let signature = signer
        .sign_message(operation_hash.as_bytes())
        .await
        .map_err(|e| HarnessError::Signing(e.to_string()))?;

    let v = u8::try_from(signature.v + 4)
        .map_err(|_| HarnessError::Signing(format!("unexpected recovery id {}", signature.v)))?;

    let mut out = Vec::with_capacity(MODULE_SIGNATURE_LEN);
    out.extend_from_slice(&window_bytes);
    let mut word = [0u8; 32];
    signature.r.to_big_endian(&mut word);
    out.extend_from_slice(&word);
    signature.s.to_big_endian(&mut word);
    out.extend_from_slice(&word);
    out.push(v);

    Ok(Bytes::from(out))
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use ethers::abi::AbiEncode;
    use ethers::utils::keccak256;

    use super::*;

    const OWNER_KEY: &str = "ac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80";

    /// Hashes the ABI encoding of whatever it is given and remembers it.
    #[derive(Default)]
    struct RecordingHasher {
        seen: Mutex<Option<PackedUserOperation>>,
    }

    #[async_trait]
    impl OperationHasher for RecordingHasher {
        async fn operation_hash(
            &self,
            user_op: PackedUserOperation,
        ) -> Result<H256, HarnessError> {
            let hash = H256::from(keccak256(user_op.clone().encode()));
            *self.seen.lock().unwrap() = Some(user_op);
            Ok(hash)
        }
    }

    struct FailingHasher;

    #[async_trait]
    impl OperationHasher for FailingHasher {
        async fn operation_hash(&self, _: PackedUserOperation) -> Result<H256, HarnessError> {
            Err(HarnessError::Contract("execution reverted".to_string()))
        }
    }

    fn owner() -> LocalWallet {
        OWNER_KEY.parse::<LocalWallet>().unwrap()
    }

    fn user_op() -> UserOperation {
        UserOperation::new(
            Address::repeat_byte(0x5a),
            U256::zero(),
            Bytes::from(vec![0x7b, 0xe7, 0x73, 0x48]),
        )
        .with_gas_limits(500_000, 100_000, U256::from(100_000))
        .with_fees(1_000_000_000, 1_000_000_000)
    }

    fn recover(signature: &[u8], hash: H256) -> Address {
        let sig = Signature {
            r: U256::from_big_endian(&signature[12..44]),
            s: U256::from_big_endian(&signature[44..76]),
            v: u64::from(signature[76] - 4),
        };
        sig.recover(hash.as_bytes().to_vec()).unwrap()
    }

    #[test]
    fn approved_hash_signature_layout() {
        let owner: Address = "0xf39fd6e51aad88f6f4ce6ab8827279cfffb92266".parse().unwrap();
        let signature = approved_hash_signature(owner);

        assert_eq!(signature.len(), 65);
        assert_eq!(
            hex::encode(&signature),
            format!(
                "000000000000000000000000f39fd6e51aad88f6f4ce6ab8827279cfffb92266{}01",
                "0".repeat(64)
            )
        );
    }

    #[test]
    fn window_encodes_as_two_uint48() {
        let window = ValidityWindow::new(0x0102_0304_0506, 0xa0b0_c0d0_e0f0).unwrap();
        assert_eq!(hex::encode(window.to_bytes()), "010203040506a0b0c0d0e0f0");
        assert_eq!(ValidityWindow::unbounded().to_bytes(), [0u8; 12]);
    }

    #[test]
    fn window_rejects_values_above_uint48() {
        assert!(ValidityWindow::new(MAX_UINT48, MAX_UINT48).is_ok());
        assert!(matches!(
            ValidityWindow::new(MAX_UINT48 + 1, 0),
            Err(HarnessError::InvalidValidityWindow(_))
        ));
        assert!(ValidityWindow::new(0, u64::MAX).is_err());
    }

    #[tokio::test]
    async fn hashes_with_window_in_signature_slot() {
        let hasher = RecordingHasher::default();
        let window = ValidityWindow::new(10, 20).unwrap();
        let op = user_op().with_signature(Bytes::from(vec![0xff; 77]));

        sign_user_operation(&owner(), &op, &hasher, window).await.unwrap();

        let seen = hasher.seen.lock().unwrap().clone().unwrap();
        assert_eq!(seen.signature.to_vec(), window.to_bytes().to_vec());
        assert_eq!(seen.call_data, op.call_data);
        assert_eq!(seen.sender, op.sender);
    }

    #[tokio::test]
    async fn signature_recovers_to_owner_after_v_adjustment() {
        let hasher = RecordingHasher::default();
        let wallet = owner();
        let window = ValidityWindow::new(1_700_000_000, 1_800_000_000).unwrap();

        let signature = sign_user_operation(&wallet, &user_op(), &hasher, window)
            .await
            .unwrap();

        assert_eq!(signature.len(), MODULE_SIGNATURE_LEN);
        assert_eq!(&signature[..12], &window.to_bytes());
        assert!(signature[76] == 31 || signature[76] == 32);

        let mut packed = user_op().pack();
        packed.signature = Bytes::from(window.to_bytes().to_vec());
        let hash = H256::from(keccak256(packed.encode()));
        assert_eq!(recover(&signature, hash), wallet.address());
    }

    #[tokio::test]
    async fn changing_the_window_changes_the_signed_hash() {
        let hasher = RecordingHasher::default();
        let wallet = owner();
        let signature = sign_user_operation(&wallet, &user_op(), &hasher, ValidityWindow::unbounded())
            .await
            .unwrap();

        let mut packed = user_op().pack();
        packed.signature = Bytes::from(ValidityWindow::new(0, 1).unwrap().to_bytes().to_vec());
        let other_hash = H256::from(keccak256(packed.encode()));
        assert_ne!(recover(&signature, other_hash), wallet.address());
    }

    #[tokio::test]
    async fn changing_the_operation_changes_the_signed_hash() {
        let hasher = RecordingHasher::default();
        let wallet = owner();
        let signature = sign_user_operation(&wallet, &user_op(), &hasher, ValidityWindow::unbounded())
            .await
            .unwrap();

        let mut packed = user_op().with_fees(1_000_000_001, 1_000_000_000).pack();
        packed.signature = Bytes::from(ValidityWindow::unbounded().to_bytes().to_vec());
        let other_hash = H256::from(keccak256(packed.encode()));
        assert_ne!(recover(&signature, other_hash), wallet.address());
    }

    #[tokio::test]
    async fn hasher_failure_propagates() {
        let result =
            sign_user_operation(&owner(), &user_op(), &FailingHasher, ValidityWindow::unbounded())
                .await;
        assert!(matches!(result, Err(HarnessError::Contract(_))));
    }
}

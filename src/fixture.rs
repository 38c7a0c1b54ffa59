// src/fixture.rs
use std::sync::Arc;

use ethers::prelude::*;
use ethers::utils::WEI_IN_ETHER;
use tracing::{debug, info};

use crate::artifacts::ArtifactStore;
use crate::bundler::Bundler;
use crate::calls::{self, Operation, SafeSetup};
use crate::config::{connect, Client, HarnessConfig};
use crate::contracts::{Counter, EntryPoint, Safe4337Module, SafeL2, SafeModuleSetup, SafeProxyFactory};
use crate::error::{require_success, HarnessError};
use crate::identifier::OnchainIdentifier;
use crate::signature::{sign_user_operation, ValidityWindow};
use crate::types::UserOperation;

/// Salt of the Safe every scenario starts from.
pub const FIXTURE_SALT: u64 = 0x5afe;

pub const CALL_GAS_LIMIT: u128 = 100_000;
pub const VERIFICATION_GAS_LIMIT: u128 = 500_000;
pub const PRE_VERIFICATION_GAS: u64 = 100_000;
pub const MAX_FEE_PER_GAS: u128 = 1_000_000_000;
pub const MAX_PRIORITY_FEE_PER_GAS: u128 = 1_000_000_000;

pub struct Contracts {
    client: Arc<Client>,
    pub counter: Counter<Client>,
    pub safe_singleton: SafeL2<Client>,
    pub proxy_factory: SafeProxyFactory<Client>,
    pub entry_point: EntryPoint<Client>,
    pub module: Safe4337Module<Client>,
    pub module_setup: SafeModuleSetup<Client>,
}

impl Contracts {
    pub async fn deploy(store: &ArtifactStore, client: Arc<Client>) -> Result<Self, HarnessError> {
        info!("Deploying contracts from {}", store.dir().display());

        let entry_point = store.deploy(client.clone(), "EntryPoint", ()).await?;
        let counter = store.deploy(client.clone(), "Counter", ()).await?;
        let safe_singleton = store.deploy(client.clone(), "SafeL2", ()).await?;
        let proxy_factory = store.deploy(client.clone(), "SafeProxyFactory", ()).await?;
        let module = store
            .deploy(client.clone(), "Safe4337Module", entry_point)
            .await?;
        let module_setup = store.deploy(client.clone(), "SafeModuleSetup", ()).await?;

        Ok(Self {
            counter: Counter::new(counter, client.clone()),
            safe_singleton: SafeL2::new(safe_singleton, client.clone()),
            proxy_factory: SafeProxyFactory::new(proxy_factory, client.clone()),
            entry_point: EntryPoint::new(entry_point, client.clone()),
            module: Safe4337Module::new(module, client.clone()),
            module_setup: SafeModuleSetup::new(module_setup, client.clone()),
            client,
        })
    }

    /// Address `createProxyWithNonce` would deploy to, from an `eth_call`.
    pub async fn predict_safe(&self, initializer: Bytes, salt: U256) -> Result<Address, HarnessError> {
        let address = self
            .proxy_factory
            .create_proxy_with_nonce(self.safe_singleton.address(), initializer, salt)
            .call()
            .await?;
        Ok(address)
    }

    /// Deploys a Safe proxy and checks it landed at the predicted address,
    /// which must have been empty beforehand.
    pub async fn create_safe(&self, initializer: Bytes, salt: U256) -> Result<Address, HarnessError> {
        let predicted = self.predict_safe(initializer.clone(), salt).await?;
        expect_code(self.client.as_ref(), predicted, false).await?;

        let call =
            self.proxy_factory
                .create_proxy_with_nonce(self.safe_singleton.address(), initializer, salt);
        let pending = call.send().await?;
        require_success(pending.await?)?;

        expect_code(self.client.as_ref(), predicted, true).await?;
        Ok(predicted)
    }
}

/// Checks whether `address` holds contract code.
pub(crate) async fn expect_code<M: Middleware>(
    client: &M,
    address: Address,
    deployed: bool,
) -> Result<(), HarnessError> {
    let code = client
        .get_code(address, None)
        .await
        .map_err(|e| HarnessError::Provider(e.to_string()))?;

    match (deployed, code.is_empty()) {
        (true, true) => Err(HarnessError::AssertionFailed(format!(
            "no contract deployed at {address:?}"
        ))),
        (false, false) => Err(HarnessError::AssertionFailed(format!(
            "{address:?} already holds code"
        ))),
        _ => Ok(()),
    }
}

/// Deployed contracts, signers and a 4337-enabled Safe owned by `owner`.
///
/// Node state is captured right after deployment and restored with
/// [`Fixture::reset`] so every scenario starts from the same chain state.
pub struct Fixture {
    pub contracts: Contracts,
    pub relayer: Arc<Client>,
    pub owner: Arc<Client>,
    pub bundler: Bundler<Client>,
    pub safe: SafeL2<Client>,
    pub identifier: OnchainIdentifier,
    snapshot: U256,
}

impl Fixture {
    pub async fn setup(config: &HarnessConfig) -> Result<Self, HarnessError> {
        let relayer = config.node.connect_relayer().await?;
        let owner = connect(&config.node.rpc_url, &config.owner_key).await?;

        let store = ArtifactStore::new(&config.artifacts_dir);
        let contracts = Contracts::deploy(&store, relayer.clone()).await?;
        let bundler = Bundler::new(relayer.clone(), relayer.address());

        let initializer = SafeSetup::single_owner(owner.address())
            .with_4337_module(contracts.module_setup.address(), contracts.module.address())
            .encode();
        let safe = contracts
            .create_safe(initializer, U256::from(FIXTURE_SALT))
            .await?;
        info!("Fixture Safe deployed at {:?}", safe);

        Ok(Self {
            contracts,
            relayer: relayer.clone(),
            owner: owner.clone(),
            bundler,
            safe: SafeL2::new(safe, owner),
            identifier: config.identifier(),
            snapshot: snapshot(&relayer).await?,
        })
    }

    /// Restores the post-deployment state and takes a new snapshot, since
    /// development nodes consume a snapshot when reverting to it.
    pub async fn reset(&mut self) -> Result<(), HarnessError> {
        let reverted: bool = self
            .relayer
            .provider()
            .request("evm_revert", [self.snapshot])
            .await?;
        if !reverted {
            return Err(HarnessError::Fixture(format!(
                "evm_revert to snapshot {} failed",
                self.snapshot
            )));
        }
        self.snapshot = snapshot(&self.relayer).await?;
        Ok(())
    }

    pub fn owner_address(&self) -> Address {
        self.owner.address()
    }

    /// Safe `setup` call data for a single-owner Safe with the 4337 module enabled.
    pub fn module_initializer(&self, payment_receiver: Address) -> Bytes {
        SafeSetup::single_owner(self.owner_address())
            .with_4337_module(
                self.contracts.module_setup.address(),
                self.contracts.module.address(),
            )
            .with_payment_receiver(payment_receiver)
            .encode()
    }

    /// `executeUserOp(counter, 0, increment(), CALL)`.
    pub fn increment_user_op_call(&self) -> Bytes {
        calls::execute_user_op(
            self.contracts.counter.address(),
            U256::zero(),
            calls::increment(),
            Operation::Call,
        )
    }

    pub fn user_op(&self, sender: Address, nonce: U256, call_data: Bytes) -> UserOperation {
        UserOperation::new(sender, nonce, call_data)
            .with_gas_limits(
                VERIFICATION_GAS_LIMIT,
                CALL_GAS_LIMIT,
                U256::from(PRE_VERIFICATION_GAS),
            )
            .with_fees(MAX_FEE_PER_GAS, MAX_PRIORITY_FEE_PER_GAS)
    }

    /// A user operation that deploys its own Safe through the factory.
    pub async fn counterfactual_user_op(
        &self,
        initializer: Bytes,
        salt: U256,
        nonce_key: U256,
        call_data: Bytes,
    ) -> Result<UserOperation, HarnessError> {
        let sender = self.contracts.predict_safe(initializer.clone(), salt).await?;
        let nonce = self.entry_point_nonce(sender, nonce_key).await?;
        let factory_data = calls::create_proxy_with_nonce(
            self.contracts.safe_singleton.address(),
            initializer,
            salt,
        );

        Ok(self
            .user_op(sender, nonce, call_data)
            .with_factory(self.contracts.proxy_factory.address(), factory_data))
    }

    pub async fn entry_point_nonce(&self, sender: Address, key: U256) -> Result<U256, HarnessError> {
        Ok(self.contracts.entry_point.get_nonce(sender, key).call().await?)
    }

    /// Signs `user_op` as the owner, funds the sender and relays it.
    pub async fn submit(&self, user_op: UserOperation) -> Result<H256, HarnessError> {
        let signature = sign_user_operation(
            self.owner.signer(),
            &user_op,
            &self.contracts.module,
            ValidityWindow::unbounded(),
        )
        .await?;

        self.fund(user_op.sender).await?;
        self.bundler
            .send_user_operation(
                &user_op.with_signature(signature),
                self.contracts.entry_point.address(),
            )
            .await
    }

    /// Sends 0.1 ether from the owner so the account can prefund its gas.
    pub async fn fund(&self, account: Address) -> Result<(), HarnessError> {
        let tx = TransactionRequest::new()
            .to(account)
            .value(WEI_IN_ETHER / U256::from(10));
        let pending = self.owner.send_transaction(tx, None).await?;
        require_success(pending.await?)?;
        debug!("Funded {:?}", account);
        Ok(())
    }

    pub async fn counter_value(&self) -> Result<U256, HarnessError> {
        Ok(self.contracts.counter.count().call().await?)
    }
}

async fn snapshot(client: &Client) -> Result<U256, HarnessError> {
    let id: U256 = client.provider().request("evm_snapshot", ()).await?;
    debug!("Took snapshot {}", id);
    Ok(id)
}

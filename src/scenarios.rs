// src/scenarios.rs
//! Ways of carrying the onchain identifier, each exercised against live contracts.
//!
//! Every scenario picks a placement for the identifier, a target (creating
//! a Safe or transacting from one) and a path (a plain transaction or an
//! ERC-4337 user operation).

use std::fmt;

use ethers::contract::parse_log;
use ethers::prelude::*;
use tracing::{error, info, warn};

use crate::calls::{self, SafeSetup, SafeTransaction};
use crate::contracts::{SafeL2, SafeMultiSigTransactionFilter, UserOperationEventFilter};
use crate::error::{require_success, HarnessError};
use crate::fixture::{expect_code, Fixture};
use crate::nonce;
use crate::types::UserOperation;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Placement {
    /// Appended after a complete ABI-encoded call.
    AppendData,
    /// Safe payment receiver at creation, refund receiver on transactions.
    RefundReceiver,
    /// `createProxyWithNonce` salt.
    SaltNonce,
    /// High 192 bits of the EntryPoint nonce.
    EntryPointNonce,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Target {
    SafeCreation,
    Transaction,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Path {
    Standard,
    Erc4337,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Scenario {
    pub placement: Placement,
    pub target: Target,
    pub path: Path,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// The identifier was read back from an event field or the nonce.
    Verified,
    /// The identifier is on chain but can only be recovered by tracing.
    RequiresTracing,
    NotApplicable(&'static str),
}

const NO_REFUND_RECEIVER_IN_4337: &str = "the refund receiver cannot be used with ERC-4337";
const SALT_NONCE_ONLY_AT_CREATION: &str = "the salt nonce is only specified during Safe creation";
const NONCE_KEY_ONLY_IN_4337: &str = "the 4337 nonce is only specified with user operations";

impl Scenario {
    pub fn all() -> Vec<Scenario> {
        let mut scenarios = Vec::with_capacity(16);
        for placement in [
            Placement::AppendData,
            Placement::RefundReceiver,
            Placement::SaltNonce,
            Placement::EntryPointNonce,
        ] {
            for target in [Target::SafeCreation, Target::Transaction] {
                for path in [Path::Standard, Path::Erc4337] {
                    scenarios.push(Scenario {
                        placement,
                        target,
                        path,
                    });
                }
            }
        }
        scenarios
    }

    /// Reason the scenario cannot be expressed, if any.
    pub fn inapplicable_reason(&self) -> Option<&'static str> {
        match (self.placement, self.target, self.path) {
            (Placement::RefundReceiver, Target::Transaction, Path::Erc4337) => {
                Some(NO_REFUND_RECEIVER_IN_4337)
            }
            (Placement::SaltNonce, Target::Transaction, _) => Some(SALT_NONCE_ONLY_AT_CREATION),
            (Placement::EntryPointNonce, _, Path::Standard) => Some(NONCE_KEY_ONLY_IN_4337),
            _ => None,
        }
    }

    pub fn name(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for Scenario {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let placement = match self.placement {
            Placement::AppendData => "append-data",
            Placement::RefundReceiver => "refund-receiver",
            Placement::SaltNonce => "salt-nonce",
            Placement::EntryPointNonce => "4337-nonce",
        };
        let target = match self.target {
            Target::SafeCreation => "safe-creation",
            Target::Transaction => "transaction",
        };
        let path = match self.path {
            Path::Standard => "standard",
            Path::Erc4337 => "4337",
        };
        write!(f, "{placement}/{target}/{path}")
    }
}

pub async fn run(fixture: &Fixture, scenario: Scenario) -> Result<Outcome, HarnessError> {
    match (scenario.placement, scenario.target, scenario.path) {
        (Placement::AppendData, Target::SafeCreation, Path::Standard) => {
            append_data_safe_creation(fixture).await
        }
        (Placement::AppendData, Target::SafeCreation, Path::Erc4337) => {
            append_data_safe_creation_4337(fixture).await
        }
        (Placement::AppendData, Target::Transaction, Path::Standard) => {
            append_data_transaction(fixture).await
        }
        (Placement::AppendData, Target::Transaction, Path::Erc4337) => {
            append_data_transaction_4337(fixture).await
        }
        (Placement::RefundReceiver, Target::SafeCreation, Path::Standard) => {
            payment_receiver_safe_creation(fixture).await
        }
        (Placement::RefundReceiver, Target::SafeCreation, Path::Erc4337) => {
            payment_receiver_safe_creation_4337(fixture).await
        }
        (Placement::RefundReceiver, Target::Transaction, Path::Standard) => {
            refund_receiver_transaction(fixture).await
        }
        (Placement::RefundReceiver, Target::Transaction, Path::Erc4337) => {
            Ok(Outcome::NotApplicable(NO_REFUND_RECEIVER_IN_4337))
        }
        (Placement::SaltNonce, Target::SafeCreation, Path::Standard) => {
            salt_nonce_safe_creation(fixture).await
        }
        (Placement::SaltNonce, Target::SafeCreation, Path::Erc4337) => {
            salt_nonce_safe_creation_4337(fixture).await
        }
        (Placement::SaltNonce, Target::Transaction, _) => {
            Ok(Outcome::NotApplicable(SALT_NONCE_ONLY_AT_CREATION))
        }
        (Placement::EntryPointNonce, _, Path::Standard) => {
            Ok(Outcome::NotApplicable(NONCE_KEY_ONLY_IN_4337))
        }
        (Placement::EntryPointNonce, Target::SafeCreation, Path::Erc4337) => {
            entry_point_nonce_safe_creation(fixture).await
        }
        (Placement::EntryPointNonce, Target::Transaction, Path::Erc4337) => {
            entry_point_nonce_transaction(fixture).await
        }
    }
}

async fn append_data_safe_creation(fixture: &Fixture) -> Result<Outcome, HarnessError> {
    let owner = fixture.owner_address();
    let initializer = fixture
        .identifier
        .append_to(SafeSetup::single_owner(owner).encode());

    let safe = fixture
        .contracts
        .create_safe(initializer, U256::zero())
        .await?;

    // setup must have decoded the same owners with the suffix present
    let owners = SafeL2::new(safe, fixture.relayer.clone())
        .get_owners()
        .call()
        .await?;
    if owners != vec![owner] {
        return Err(HarnessError::AssertionFailed(format!(
            "Safe {safe:?} has owners {owners:?}, expected [{owner:?}]"
        )));
    }
    Ok(Outcome::RequiresTracing)
}

async fn append_data_safe_creation_4337(fixture: &Fixture) -> Result<Outcome, HarnessError> {
    let user_op = fixture
        .counterfactual_user_op(
            fixture.module_initializer(Address::zero()),
            U256::zero(),
            U256::zero(),
            fixture.identifier.append_to(fixture.increment_user_op_call()),
        )
        .await?;

    submit_and_expect_increment(fixture, user_op).await?;
    Ok(Outcome::RequiresTracing)
}

async fn append_data_transaction(fixture: &Fixture) -> Result<Outcome, HarnessError> {
    let before = fixture.counter_value().await?;

    let exec = SafeTransaction::call_from_owner(
        fixture.owner_address(),
        fixture.contracts.counter.address(),
        calls::increment(),
    );
    let tx = TransactionRequest::new()
        .to(fixture.safe.address())
        .data(fixture.identifier.append_to(exec.encode()));
    let pending = fixture.owner.send_transaction(tx, None).await?;
    require_success(pending.await?)?;

    expect_increment(fixture, before).await?;
    Ok(Outcome::RequiresTracing)
}

async fn append_data_transaction_4337(fixture: &Fixture) -> Result<Outcome, HarnessError> {
    let sender = fixture.safe.address();
    let nonce = fixture.entry_point_nonce(sender, U256::zero()).await?;
    let user_op = fixture.user_op(
        sender,
        nonce,
        fixture.identifier.append_to(fixture.increment_user_op_call()),
    );

    submit_and_expect_increment(fixture, user_op).await?;
    Ok(Outcome::RequiresTracing)
}

async fn payment_receiver_safe_creation(fixture: &Fixture) -> Result<Outcome, HarnessError> {
    let initializer = SafeSetup::single_owner(fixture.owner_address())
        .with_payment_receiver(fixture.identifier.address())
        .encode();

    fixture
        .contracts
        .create_safe(initializer, U256::zero())
        .await?;
    Ok(Outcome::RequiresTracing)
}

async fn payment_receiver_safe_creation_4337(fixture: &Fixture) -> Result<Outcome, HarnessError> {
    let user_op = fixture
        .counterfactual_user_op(
            fixture.module_initializer(fixture.identifier.address()),
            U256::zero(),
            U256::zero(),
            fixture.increment_user_op_call(),
        )
        .await?;

    submit_and_expect_increment(fixture, user_op).await?;
    Ok(Outcome::RequiresTracing)
}

async fn refund_receiver_transaction(fixture: &Fixture) -> Result<Outcome, HarnessError> {
    let exec = SafeTransaction::call_from_owner(
        fixture.owner_address(),
        fixture.contracts.counter.address(),
        calls::increment(),
    )
    .with_refund_receiver(fixture.identifier.address())
    .into_call();

    let call = fixture.safe.exec_transaction(
        exec.to,
        exec.value,
        exec.data,
        exec.operation,
        exec.safe_tx_gas,
        exec.base_gas,
        exec.gas_price,
        exec.gas_token,
        exec.refund_receiver,
        exec.signatures,
    );
    let pending = call.send().await?;
    let receipt = require_success(pending.await?)?;

    let event = receipt
        .logs
        .iter()
        .find_map(|log| parse_log::<SafeMultiSigTransactionFilter>(log.clone()).ok())
        .ok_or_else(|| {
            HarnessError::AssertionFailed("no SafeMultiSigTransaction event emitted".to_string())
        })?;

    if event.refund_receiver != fixture.identifier.address() {
        return Err(HarnessError::AssertionFailed(format!(
            "refundReceiver {:?} does not match identifier {}",
            event.refund_receiver, fixture.identifier
        )));
    }
    Ok(Outcome::Verified)
}

async fn salt_nonce_safe_creation(fixture: &Fixture) -> Result<Outcome, HarnessError> {
    let initializer = SafeSetup::single_owner(fixture.owner_address()).encode();

    // create_safe checks the predicted address is empty, then deployed
    fixture
        .contracts
        .create_safe(initializer, fixture.identifier.as_uint())
        .await?;
    Ok(Outcome::RequiresTracing)
}

async fn salt_nonce_safe_creation_4337(fixture: &Fixture) -> Result<Outcome, HarnessError> {
    let user_op = fixture
        .counterfactual_user_op(
            fixture.module_initializer(Address::zero()),
            fixture.identifier.as_uint(),
            U256::zero(),
            fixture.increment_user_op_call(),
        )
        .await?;
    let sender = user_op.sender;
    expect_code(fixture.relayer.as_ref(), sender, false).await?;

    submit_and_expect_increment(fixture, user_op).await?;
    expect_code(fixture.relayer.as_ref(), sender, true).await?;
    Ok(Outcome::RequiresTracing)
}

async fn entry_point_nonce_safe_creation(fixture: &Fixture) -> Result<Outcome, HarnessError> {
    let user_op = fixture
        .counterfactual_user_op(
            fixture.module_initializer(Address::zero()),
            fixture.identifier.as_uint(),
            fixture.identifier.as_uint(),
            fixture.increment_user_op_call(),
        )
        .await?;

    let user_op_hash = fixture.submit(user_op).await?;
    expect_nonce_key(fixture, user_op_hash).await
}

async fn entry_point_nonce_transaction(fixture: &Fixture) -> Result<Outcome, HarnessError> {
    let sender = fixture.safe.address();
    let nonce = fixture
        .entry_point_nonce(sender, fixture.identifier.as_uint())
        .await?;
    let user_op = fixture.user_op(sender, nonce, fixture.increment_user_op_call());

    let user_op_hash = fixture.submit(user_op).await?;
    expect_nonce_key(fixture, user_op_hash).await
}

async fn submit_and_expect_increment(
    fixture: &Fixture,
    user_op: UserOperation,
) -> Result<(), HarnessError> {
    let before = fixture.counter_value().await?;
    fixture.submit(user_op).await?;
    expect_increment(fixture, before).await
}

async fn expect_increment(fixture: &Fixture, before: U256) -> Result<(), HarnessError> {
    let after = fixture.counter_value().await?;
    if after != before + U256::one() {
        return Err(HarnessError::AssertionFailed(format!(
            "counter went from {before} to {after}, expected a single increment"
        )));
    }
    Ok(())
}

async fn expect_nonce_key(fixture: &Fixture, user_op_hash: H256) -> Result<Outcome, HarnessError> {
    let events: Vec<UserOperationEventFilter> = fixture
        .contracts
        .entry_point
        .user_operation_event_filter()
        .topic1(user_op_hash)
        .from_block(0u64)
        .query()
        .await?;
    let event = events.first().ok_or_else(|| {
        HarnessError::AssertionFailed(format!("no UserOperationEvent for {user_op_hash:?}"))
    })?;

    let key = nonce::key(event.nonce);
    if key != fixture.identifier.as_uint() {
        return Err(HarnessError::AssertionFailed(format!(
            "nonce key {key:#x} does not match identifier {}",
            fixture.identifier
        )));
    }
    Ok(Outcome::Verified)
}

/// Results of a suite run, in execution order.
#[derive(Debug, Default)]
pub struct Report {
    pub results: Vec<(Scenario, Result<Outcome, HarnessError>)>,
}

impl Report {
    pub fn failures(&self) -> usize {
        self.results.iter().filter(|(_, result)| result.is_err()).count()
    }

    pub fn outcome(&self, scenario: Scenario) -> Option<&Result<Outcome, HarnessError>> {
        self.results
            .iter()
            .find(|(s, _)| *s == scenario)
            .map(|(_, result)| result)
    }
}

/// Runs every scenario whose name contains `filter`, resetting node state
/// before each one. A failing scenario does not stop the others.
pub async fn run_all(
    fixture: &mut Fixture,
    filter: Option<&str>,
) -> Result<Report, HarnessError> {
    let mut report = Report::default();

    for scenario in Scenario::all() {
        let name = scenario.name();
        if filter.map_or(false, |f| !name.contains(f)) {
            continue;
        }

        fixture.reset().await?;
        let result = run(fixture, scenario).await;
        match &result {
            Ok(Outcome::Verified) => info!("{name}: identifier recovered on chain"),
            Ok(Outcome::RequiresTracing) => info!("{name}: passed, identifier requires tracing"),
            Ok(Outcome::NotApplicable(reason)) => warn!("{name}: skipped, {reason}"),
            Err(e) => error!("{name}: failed: {e}"),
        }
        report.results.push((scenario, result));
    }

    Ok(report)
}

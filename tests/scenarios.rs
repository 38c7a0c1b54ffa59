//! Runs the identifier scenarios against a development node.
//!
//! Needs `ETH_RPC_URL`, `ARTIFACTS_DIR`, `RELAYER_PRIVATE_KEY` and
//! `OWNER_PRIVATE_KEY`, pointing at a Hardhat or Anvil node and compiled
//! EntryPoint, SafeL2, SafeProxyFactory, Safe4337Module, SafeModuleSetup and
//! Counter artifacts.

use onchain_identifier::config::HarnessConfig;
use onchain_identifier::fixture::Fixture;
use onchain_identifier::nonce;
use onchain_identifier::scenarios::{self, Outcome, Path, Placement, Scenario, Target};

async fn fixture() -> Fixture {
    dotenv::dotenv().ok();
    let config = HarnessConfig::from_env().expect("harness environment");
    Fixture::setup(&config).await.expect("fixture deployment")
}

#[tokio::test]
#[ignore = "requires a development node and contract artifacts"]
async fn every_scenario_passes_or_is_skipped() {
    let mut fixture = fixture().await;
    let report = scenarios::run_all(&mut fixture, None).await.unwrap();

    assert_eq!(report.results.len(), 16);
    for (scenario, result) in &report.results {
        assert!(result.is_ok(), "{scenario} failed: {result:?}");
    }

    let refund = Scenario {
        placement: Placement::RefundReceiver,
        target: Target::Transaction,
        path: Path::Standard,
    };
    assert!(matches!(report.outcome(refund), Some(Ok(Outcome::Verified))));
}

#[tokio::test]
#[ignore = "requires a development node and contract artifacts"]
async fn nonce_key_channel_is_independent_of_default_key() {
    let mut fixture = fixture().await;
    fixture.reset().await.unwrap();

    let safe = fixture.safe.address();
    let key = fixture.identifier.as_uint();
    let keyed = fixture.entry_point_nonce(safe, key).await.unwrap();
    let default = fixture
        .entry_point_nonce(safe, Default::default())
        .await
        .unwrap();

    assert_eq!(nonce::key(keyed), key);
    assert_eq!(nonce::sequence(keyed), 0);
    assert_eq!(default, Default::default());

    let user_op = fixture.user_op(safe, keyed, fixture.increment_user_op_call());
    fixture.submit(user_op).await.unwrap();

    let next = fixture.entry_point_nonce(safe, key).await.unwrap();
    assert_eq!(nonce::sequence(next), 1);
    assert_eq!(
        fixture
            .entry_point_nonce(safe, Default::default())
            .await
            .unwrap(),
        Default::default()
    );
}

#[tokio::test]
#[ignore = "requires a development node and contract artifacts"]
async fn user_operation_with_identifier_suffix_increments_counter_once() {
    let mut fixture = fixture().await;
    fixture.reset().await.unwrap();

    let before = fixture.counter_value().await.unwrap();
    let safe = fixture.safe.address();
    let nonce = fixture
        .entry_point_nonce(safe, Default::default())
        .await
        .unwrap();
    let call_data = fixture
        .identifier
        .append_to(fixture.increment_user_op_call());
    let user_op = fixture.user_op(safe, nonce, call_data);

    fixture.submit(user_op).await.unwrap();

    assert_eq!(fixture.counter_value().await.unwrap(), before + 1);
}

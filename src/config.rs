// src/config.rs
use std::path::PathBuf;
use std::sync::Arc;

use clap::{Args, Parser};
use ethers::prelude::*;
use tracing::info;

use crate::error::HarnessError;
use crate::identifier::{OnchainIdentifier, DEFAULT_LABEL};

pub type Client = SignerMiddleware<Provider<Http>, LocalWallet>;

/// Node endpoint and the relayer account that pays for transactions.
#[derive(Args, Debug, Clone)]
pub struct NodeConfig {
    #[clap(short, long, env = "ETH_RPC_URL", default_value = "http://127.0.0.1:8545")]
    pub rpc_url: String,

    #[clap(long, env = "RELAYER_PRIVATE_KEY")]
    pub relayer_key: String,
}

impl NodeConfig {
    pub async fn connect_relayer(&self) -> Result<Arc<Client>, HarnessError> {
        connect(&self.rpc_url, &self.relayer_key).await
    }
}

/// Settings for running the scenario suite against a development node.
///
/// Every option falls back to an environment variable, so the binary and
/// the integration tests read the same names.
#[derive(Parser, Debug, Clone)]
pub struct HarnessConfig {
    #[clap(flatten)]
    pub node: NodeConfig,

    /// Directory holding the compiled contract artifacts
    #[clap(short, long = "artifacts", env = "ARTIFACTS_DIR")]
    pub artifacts_dir: PathBuf,

    #[clap(long, env = "OWNER_PRIVATE_KEY")]
    pub owner_key: String,

    #[clap(long, env = "IDENTIFIER_LABEL", default_value = DEFAULT_LABEL)]
    pub label: String,
}

impl HarnessConfig {
    /// Builds the config from the environment alone.
    pub fn from_env() -> Result<Self, HarnessError> {
        Self::try_parse_from([env!("CARGO_PKG_NAME")])
            .map_err(|e| HarnessError::Fixture(e.to_string()))
    }

    pub fn identifier(&self) -> OnchainIdentifier {
        OnchainIdentifier::from_label(&self.label)
    }
}

/// Connects a signing client to `rpc_url`, bound to the node's chain id.
pub async fn connect(rpc_url: &str, private_key: &str) -> Result<Arc<Client>, HarnessError> {
    let provider = Provider::<Http>::try_from(rpc_url)
        .map_err(|e| HarnessError::Provider(e.to_string()))?;
    let chain_id = provider.get_chainid().await?;

    let wallet = private_key
        .parse::<LocalWallet>()
        .map_err(|e| HarnessError::Signing(e.to_string()))?
        .with_chain_id(chain_id.as_u64());

    info!("Connected {} on chain {}", wallet.address(), chain_id);
    Ok(Arc::new(SignerMiddleware::new(provider, wallet)))
}

#[cfg(test)]
mod tests {
    use clap::CommandFactory;

    use super::*;

    #[test]
    fn command_is_well_formed() {
        HarnessConfig::command().debug_assert();
    }

    #[test]
    fn flags_take_precedence_over_environment() {
        let config = HarnessConfig::try_parse_from([
            "onchain-identifier",
            "--rpc-url",
            "http://localhost:9545",
            "--artifacts",
            "out",
            "--relayer-key",
            "0x01",
            "--owner-key",
            "0x02",
            "--label",
            "Other",
        ])
        .unwrap();

        assert_eq!(config.node.rpc_url, "http://localhost:9545");
        assert_eq!(config.node.relayer_key, "0x01");
        assert_eq!(config.artifacts_dir, PathBuf::from("out"));
        assert_eq!(config.identifier(), OnchainIdentifier::from_label("Other"));
    }
}

// src/artifacts.rs
use std::path::{Path, PathBuf};
use std::sync::Arc;

use ethers::abi::{Abi, Tokenize};
use ethers::contract::ContractFactory;
use ethers::prelude::*;
use serde::Deserialize;
use tracing::info;

use crate::error::HarnessError;

#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
enum ArtifactBytecode {
    // Hardhat
    Hex(Bytes),
    // Foundry
    Object { object: Bytes },
}

/// A compiled contract artifact, as written by Hardhat or Foundry.
#[derive(Debug, Clone, Deserialize)]
pub struct Artifact {
    pub abi: Abi,
    bytecode: ArtifactBytecode,
}

impl Artifact {
    pub fn parse(json: &str) -> Result<Self, HarnessError> {
        let artifact: Artifact =
            serde_json::from_str(json).map_err(|e| HarnessError::Artifact(e.to_string()))?;
        if artifact.bytecode().is_empty() {
            return Err(HarnessError::Artifact(
                "artifact has no creation bytecode".to_string(),
            ));
        }
        Ok(artifact)
    }

    pub fn bytecode(&self) -> &Bytes {
        match &self.bytecode {
            ArtifactBytecode::Hex(code) => code,
            ArtifactBytecode::Object { object } => object,
        }
    }
}

/// Looks up `<dir>/<name>.json`.
pub struct ArtifactStore {
    dir: PathBuf,
}

impl ArtifactStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn load(&self, name: &str) -> Result<Artifact, HarnessError> {
        let path = self.dir.join(format!("{name}.json"));
        let json = std::fs::read_to_string(&path)
            .map_err(|e| HarnessError::Artifact(format!("{}: {e}", path.display())))?;
        Artifact::parse(&json)
    }

    /// Deploys the named contract and returns its address.
    pub async fn deploy<M, T>(
        &self,
        client: Arc<M>,
        name: &str,
        constructor_args: T,
    ) -> Result<Address, HarnessError>
    where
        M: Middleware + 'static,
        T: Tokenize,
    {
        let artifact = self.load(name)?;
        let bytecode = artifact.bytecode().clone();
        let factory = ContractFactory::new(artifact.abi, bytecode, client);
        let contract = factory.deploy(constructor_args)?.send().await?;
        info!("Deployed {} at {:?}", name, contract.address());
        Ok(contract.address())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ABI: &str = r#"[{"type":"function","name":"increment","inputs":[],"outputs":[],"stateMutability":"nonpayable"}]"#;

    #[test]
    fn parses_hardhat_artifact() {
        let json = format!(r#"{{"contractName":"Counter","abi":{ABI},"bytecode":"0x6080"}}"#);
        let artifact = Artifact::parse(&json).unwrap();

        assert_eq!(artifact.bytecode().to_vec(), vec![0x60, 0x80]);
        assert!(artifact.abi.function("increment").is_ok());
    }

    #[test]
    fn parses_foundry_artifact() {
        let json = format!(
            r#"{{"abi":{ABI},"bytecode":{{"object":"0x6080","sourceMap":""}},"deployedBytecode":{{"object":"0x"}}}}"#
        );
        let artifact = Artifact::parse(&json).unwrap();

        assert_eq!(artifact.bytecode().to_vec(), vec![0x60, 0x80]);
    }

    #[test]
    fn rejects_interfaces_without_bytecode() {
        let json = format!(r#"{{"abi":{ABI},"bytecode":"0x"}}"#);
        assert!(matches!(
            Artifact::parse(&json),
            Err(HarnessError::Artifact(_))
        ));
    }

    #[test]
    fn missing_artifact_is_reported() {
        let store = ArtifactStore::new("/nonexistent/artifacts");
        assert!(matches!(store.load("Counter"), Err(HarnessError::Artifact(_))));
    }
}

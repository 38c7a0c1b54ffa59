// src/rpc.rs
use std::net::SocketAddr;
use std::sync::Arc;

use ethers::prelude::{Address, Middleware, H256};
use jsonrpsee::core::{async_trait, RpcResult};
use jsonrpsee::proc_macros::rpc;
use jsonrpsee::server::{ServerBuilder, ServerHandle};
use jsonrpsee::types::error::{ErrorObject, ErrorObjectOwned, INVALID_PARAMS_CODE};
use tracing::{debug, error, info};

use crate::bundler::Bundler;
use crate::error::HarnessError;
use crate::types::{RpcUserOperation, UserOperation};

// Define the RPC interface
#[rpc(server, namespace = "eth")]
pub trait BundlerRpc {
    /// Relays a user operation to the EntryPoint and returns its hash
    #[method(name = "sendUserOperation")]
    async fn send_user_operation(
        &self,
        user_op: RpcUserOperation,
        entry_point: Address,
    ) -> RpcResult<H256>;

    #[method(name = "supportedEntryPoints")]
    async fn supported_entry_points(&self) -> RpcResult<Vec<Address>>;
}

pub struct BundlerRpcImpl<M> {
    bundler: Arc<Bundler<M>>,
    entry_point: Address,
}

impl<M> BundlerRpcImpl<M> {
    pub fn new(bundler: Arc<Bundler<M>>, entry_point: Address) -> Self {
        Self {
            bundler,
            entry_point,
        }
    }

    fn validate(
        &self,
        user_op: RpcUserOperation,
        entry_point: Address,
    ) -> Result<UserOperation, ErrorObjectOwned> {
        if entry_point != self.entry_point {
            return Err(ErrorObject::owned(
                INVALID_PARAMS_CODE,
                format!("Unsupported entry point {:?}", entry_point),
                None::<()>,
            ));
        }
        UserOperation::try_from(user_op).map_err(bundler_error)
    }
}

fn bundler_error(e: HarnessError) -> ErrorObjectOwned {
    let code = match &e {
        HarnessError::InvalidUserOperation(_) => INVALID_PARAMS_CODE,
        _ => -32000,
    };
    ErrorObject::owned(code, format!("Bundler error: {}", e), None::<()>)
}

#[async_trait]
impl<M: Middleware + 'static> BundlerRpcServer for BundlerRpcImpl<M> {
    async fn send_user_operation(
        &self,
        user_op: RpcUserOperation,
        entry_point: Address,
    ) -> RpcResult<H256> {
        debug!("Received user operation from sender: {:?}", user_op.sender);

        let user_op = self.validate(user_op, entry_point)?;

        match self.bundler.send_user_operation(&user_op, entry_point).await {
            Ok(user_op_hash) => {
                info!("Relayed operation {:?} for {:?}", user_op_hash, user_op.sender);
                Ok(user_op_hash)
            }
            Err(e) => {
                error!("Failed to relay operation: {}", e);
                Err(bundler_error(e).into())
            }
        }
    }

    async fn supported_entry_points(&self) -> RpcResult<Vec<Address>> {
        Ok(vec![self.entry_point])
    }
}

pub async fn start_server<M: Middleware + 'static>(
    server_addr: SocketAddr,
    rpc: BundlerRpcImpl<M>,
) -> anyhow::Result<ServerHandle> {
    let server = ServerBuilder::default().build(server_addr).await?;
    let server_handle = server.start(rpc.into_rpc());

    Ok(server_handle)
}

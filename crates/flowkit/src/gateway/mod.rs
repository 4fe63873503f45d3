//! Access node gateway.
//!
//! [`Gateway`] is the port through which the engine reads chain state and
//! submits transactions. [`HttpGateway`] implements it over the Flow Access
//! REST API; tests and embedders can supply their own implementation, such
//! as an in-process emulator.

mod http;

pub use http::{HttpGateway, RetryConfig, rest_url_for_host};

use async_trait::async_trait;

use crate::error::GatewayError;
use crate::types::{
    Address, Block, BlockEvents, CadenceValue, ChainAccount, Collection, Identifier, Transaction,
    TransactionResult,
};

/// Access node operations used by the engine.
///
/// Implementations must be safe to share between concurrent calls.
#[async_trait]
pub trait Gateway: Send + Sync {
    /// Check the node is reachable.
    async fn ping(&self) -> Result<(), GatewayError>;

    async fn get_account(&self, address: Address) -> Result<ChainAccount, GatewayError>;

    /// Latest sealed block.
    async fn get_latest_block(&self) -> Result<Block, GatewayError>;

    async fn get_block_by_height(&self, height: u64) -> Result<Block, GatewayError>;

    async fn get_block_by_id(&self, id: Identifier) -> Result<Block, GatewayError>;

    async fn get_collection(&self, id: Identifier) -> Result<Collection, GatewayError>;

    /// Events of `event_type` in the inclusive height range.
    async fn get_events(
        &self,
        event_type: &str,
        start_height: u64,
        end_height: u64,
    ) -> Result<Vec<BlockEvents>, GatewayError>;

    async fn get_transaction(&self, id: Identifier) -> Result<Transaction, GatewayError>;

    /// Result of a transaction. With `wait_seal` this returns only once the
    /// transaction is sealed, or fails if it expires.
    async fn get_transaction_result(
        &self,
        id: Identifier,
        wait_seal: bool,
    ) -> Result<TransactionResult, GatewayError>;

    async fn get_transactions_by_block_id(&self, block_id: Identifier) -> Result<Vec<Transaction>, GatewayError>;

    async fn get_transaction_results_by_block_id(
        &self,
        block_id: Identifier,
    ) -> Result<Vec<TransactionResult>, GatewayError>;

    /// The system chunk transaction of a block. Its payer is the empty address.
    async fn get_system_transaction(&self, block_id: Identifier) -> Result<Transaction, GatewayError>;

    async fn get_system_transaction_result(&self, block_id: Identifier) -> Result<TransactionResult, GatewayError>;

    /// Submit a signed transaction without waiting for it to seal.
    async fn send_signed_transaction(&self, tx: &Transaction) -> Result<Identifier, GatewayError>;

    /// Run a read-only script against the latest sealed state.
    async fn execute_script(&self, code: &[u8], args: &[CadenceValue]) -> Result<CadenceValue, GatewayError>;

    /// Opaque protocol state snapshot, used to bootstrap nodes.
    async fn get_latest_protocol_state_snapshot(&self) -> Result<Vec<u8>, GatewayError>;

    /// Whether the connection is authenticated against the node's key.
    fn secure_connection(&self) -> bool;
}

//! Gateway over the Flow Access REST API.

use std::collections::BTreeMap;
use std::str::FromStr;
use std::time::Duration;

use async_trait::async_trait;
use base64::{Engine as _, engine::general_purpose::STANDARD};
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use serde_json::{Value, json};
use tracing::debug;

use super::Gateway;
use crate::error::GatewayError;
use crate::types::{
    AccountPublicKey, Address, Block, BlockEvents, BlockHeader, CadenceValue, ChainAccount,
    Collection, Event, HashAlgorithm, Identifier, ProposalKey, PublicKey, Signature,
    SignatureAlgorithm, Transaction, TransactionResult, TransactionSignature, TransactionStatus,
};

/// REST endpoints of well-known access nodes, by gRPC host.
const KNOWN_HOSTS: [(&str, &str); 6] = [
    ("127.0.0.1:3569", "http://127.0.0.1:8888"),
    ("localhost:3569", "http://127.0.0.1:8888"),
    ("access.devnet.nodes.onflow.org:9000", "https://rest-testnet.onflow.org"),
    ("access.testnet.nodes.onflow.org:9000", "https://rest-testnet.onflow.org"),
    ("access.mainnet.nodes.onflow.org:9000", "https://rest-mainnet.onflow.org"),
    ("access.previewnet.nodes.onflow.org:9000", "https://rest-previewnet.onflow.org"),
];

/// Default interval between seal polls.
const DEFAULT_POLL_INTERVAL_MS: u64 = 1000;

/// REST base URL for a configured network host.
///
/// Hosts that already carry a scheme are used as they are.
pub fn rest_url_for_host(host: &str) -> String {
    let host = host.trim();
    if host.starts_with("http://") || host.starts_with("https://") {
        return host.trim_end_matches('/').to_string();
    }
    KNOWN_HOSTS
        .iter()
        .find(|(grpc, _)| *grpc == host)
        .map(|(_, rest)| rest.to_string())
        .unwrap_or_else(|| format!("http://{}", host))
}

/// Retry configuration for access node calls.
#[derive(Clone, Debug)]
pub struct RetryConfig {
    /// Maximum number of retries.
    pub max_retries: u32,
    /// Initial delay in milliseconds.
    pub initial_delay_ms: u64,
    /// Maximum delay in milliseconds.
    pub max_delay_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_delay_ms: 500,
            max_delay_ms: 5000,
        }
    }
}

/// Access node client speaking the REST API.
pub struct HttpGateway {
    url: String,
    client: reqwest::Client,
    retry_config: RetryConfig,
    poll_interval: Duration,
}

impl HttpGateway {
    /// Client for a REST base URL such as `http://127.0.0.1:8888`.
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into().trim_end_matches('/').to_string(),
            client: reqwest::Client::new(),
            retry_config: RetryConfig::default(),
            poll_interval: Duration::from_millis(DEFAULT_POLL_INTERVAL_MS),
        }
    }

    /// Client for a network host as written in configuration.
    pub fn for_host(host: &str) -> Self {
        Self::new(rest_url_for_host(host))
    }

    pub fn with_retry_config(mut self, retry_config: RetryConfig) -> Self {
        self.retry_config = retry_config;
        self
    }

    /// Interval between polls while waiting for a transaction to seal.
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    async fn get<R: DeserializeOwned>(&self, path: &str) -> Result<R, GatewayError> {
        self.call(reqwest::Method::GET, path, &[], None).await
    }

    /// GET with query parameters, encoded by the client.
    async fn get_with_query<R: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, String)],
    ) -> Result<R, GatewayError> {
        self.call(reqwest::Method::GET, path, query, None).await
    }

    async fn post<R: DeserializeOwned>(&self, path: &str, body: &Value) -> Result<R, GatewayError> {
        self.call(reqwest::Method::POST, path, &[], Some(body)).await
    }

    /// Make a call with retries.
    async fn call<R: DeserializeOwned>(
        &self,
        method: reqwest::Method,
        path: &str,
        query: &[(&str, String)],
        body: Option<&Value>,
    ) -> Result<R, GatewayError> {
        let total_attempts = self.retry_config.max_retries + 1;

        for attempt in 0..total_attempts {
            match self.try_call::<R>(method.clone(), path, query, body).await {
                Ok(result) => return Ok(result),
                Err(e) if e.is_retryable() && attempt < total_attempts - 1 => {
                    let delay = std::cmp::min(
                        self.retry_config.initial_delay_ms * 2u64.pow(attempt),
                        self.retry_config.max_delay_ms,
                    );
                    debug!(path, attempt, delay_ms = delay, error = %e, "retrying access node call");
                    tokio::time::sleep(Duration::from_millis(delay)).await;
                }
                Err(e) => return Err(e),
            }
        }

        Err(GatewayError::Timeout(total_attempts))
    }

    /// Single attempt.
    async fn try_call<R: DeserializeOwned>(
        &self,
        method: reqwest::Method,
        path: &str,
        query: &[(&str, String)],
        body: Option<&Value>,
    ) -> Result<R, GatewayError> {
        let url = format!("{}{}", self.url, path);
        let mut request = self.client.request(method, &url);
        if !query.is_empty() {
            request = request.query(query);
        }
        if let Some(body) = body {
            request = request.json(body);
        }
        let response = request.send().await?;

        let status = response.status();
        let text = response.text().await?;

        if !status.is_success() {
            let message = error_message(&text);
            return Err(match status.as_u16() {
                404 => GatewayError::NotFound(message),
                code => GatewayError::Api { code, message },
            });
        }

        serde_json::from_str(&text).map_err(GatewayError::Json)
    }

    async fn fetch_result(&self, id: Identifier) -> Result<TransactionResult, GatewayError> {
        let response: TransactionResultResponse =
            self.get(&format!("/v1/transaction_results/{}", id)).await?;
        response.into_result()
    }

    async fn fetch_block(&self, query: &str) -> Result<Block, GatewayError> {
        let blocks: Vec<BlockResponse> = self.get(query).await?;
        blocks
            .into_iter()
            .next()
            .ok_or_else(|| GatewayError::NotFound(format!("block for {}", query)))?
            .into_block()
    }
}

impl std::fmt::Debug for HttpGateway {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpGateway")
            .field("url", &self.url)
            .field("retry_config", &self.retry_config)
            .finish()
    }
}

/// The `message` of a REST error body, or the raw body.
fn error_message(body: &str) -> String {
    serde_json::from_str::<Value>(body)
        .ok()
        .and_then(|v| v.get("message").and_then(Value::as_str).map(String::from))
        .unwrap_or_else(|| body.to_string())
}

#[async_trait]
impl Gateway for HttpGateway {
    async fn ping(&self) -> Result<(), GatewayError> {
        let _: Value = self.get("/v1/network/parameters").await?;
        Ok(())
    }

    async fn get_account(&self, address: Address) -> Result<ChainAccount, GatewayError> {
        let response: AccountResponse = self
            .get(&format!("/v1/accounts/{}?expand=keys,contracts", address))
            .await
            .map_err(|e| match e {
                GatewayError::NotFound(_) => GatewayError::AccountNotFound(address),
                e => e,
            })?;
        response.into_account()
    }

    async fn get_latest_block(&self) -> Result<Block, GatewayError> {
        self.fetch_block("/v1/blocks?height=sealed&expand=payload").await
    }

    async fn get_block_by_height(&self, height: u64) -> Result<Block, GatewayError> {
        self.fetch_block(&format!("/v1/blocks?height={}&expand=payload", height))
            .await
    }

    async fn get_block_by_id(&self, id: Identifier) -> Result<Block, GatewayError> {
        self.fetch_block(&format!("/v1/blocks/{}?expand=payload", id)).await
    }

    async fn get_collection(&self, id: Identifier) -> Result<Collection, GatewayError> {
        let response: CollectionResponse = self
            .get(&format!("/v1/collections/{}?expand=transactions", id))
            .await?;
        Ok(Collection {
            id: parse_id("collection id", &response.id)?,
            transaction_ids: response
                .transactions
                .iter()
                .map(|t| parse_id("transaction id", &t.id))
                .collect::<Result<_, _>>()?,
        })
    }

    async fn get_events(
        &self,
        event_type: &str,
        start_height: u64,
        end_height: u64,
    ) -> Result<Vec<BlockEvents>, GatewayError> {
        let query = [
            ("type", event_type.to_string()),
            ("start_height", start_height.to_string()),
            ("end_height", end_height.to_string()),
        ];
        let response: Vec<BlockEventsResponse> = self.get_with_query("/v1/events", &query).await?;
        response.into_iter().map(BlockEventsResponse::into_block_events).collect()
    }

    async fn get_transaction(&self, id: Identifier) -> Result<Transaction, GatewayError> {
        let response: TransactionBody = self.get(&format!("/v1/transactions/{}", id)).await?;
        response.into_transaction()
    }

    async fn get_transaction_result(
        &self,
        id: Identifier,
        wait_seal: bool,
    ) -> Result<TransactionResult, GatewayError> {
        loop {
            match self.fetch_result(id).await {
                Ok(result) if !wait_seal => return Ok(result),
                Ok(result) => match result.status {
                    TransactionStatus::Sealed => return Ok(result),
                    TransactionStatus::Expired => return Err(GatewayError::TransactionExpired(id)),
                    status => debug!(tx_id = %id, %status, "waiting for transaction to seal"),
                },
                // Freshly sent transactions may not be indexed yet.
                Err(GatewayError::NotFound(_)) if wait_seal => {}
                Err(e) => return Err(e),
            }
            tokio::time::sleep(self.poll_interval).await;
        }
    }

    async fn get_transactions_by_block_id(&self, block_id: Identifier) -> Result<Vec<Transaction>, GatewayError> {
        let block = self.get_block_by_id(block_id).await?;
        let mut transactions = Vec::new();
        for collection_id in block.collection_ids {
            let collection = self.get_collection(collection_id).await?;
            for id in collection.transaction_ids {
                transactions.push(self.get_transaction(id).await?);
            }
        }
        Ok(transactions)
    }

    async fn get_transaction_results_by_block_id(
        &self,
        block_id: Identifier,
    ) -> Result<Vec<TransactionResult>, GatewayError> {
        let block = self.get_block_by_id(block_id).await?;
        let mut results = Vec::new();
        for collection_id in block.collection_ids {
            let collection = self.get_collection(collection_id).await?;
            for id in collection.transaction_ids {
                results.push(self.fetch_result(id).await?);
            }
        }
        Ok(results)
    }

    async fn get_system_transaction(&self, _block_id: Identifier) -> Result<Transaction, GatewayError> {
        Err(GatewayError::Unsupported("get_system_transaction"))
    }

    async fn get_system_transaction_result(&self, _block_id: Identifier) -> Result<TransactionResult, GatewayError> {
        Err(GatewayError::Unsupported("get_system_transaction_result"))
    }

    async fn send_signed_transaction(&self, tx: &Transaction) -> Result<Identifier, GatewayError> {
        let body = serde_json::to_value(TransactionBody::from_transaction(tx))?;
        let response: TransactionIdResponse = self.post("/v1/transactions", &body).await?;
        parse_id("transaction id", &response.id)
    }

    async fn execute_script(&self, code: &[u8], args: &[CadenceValue]) -> Result<CadenceValue, GatewayError> {
        let arguments = args
            .iter()
            .map(|a| serde_json::to_vec(&a.to_json()).map(|bytes| STANDARD.encode(bytes)))
            .collect::<Result<Vec<_>, _>>()?;
        let body = json!({
            "script": STANDARD.encode(code),
            "arguments": arguments,
        });
        let encoded: String = self.post("/v1/scripts?block_height=sealed", &body).await?;
        let decoded = decode_base64("script result", &encoded)?;
        serde_json::from_slice(&decoded).map_err(GatewayError::Json)
    }

    async fn get_latest_protocol_state_snapshot(&self) -> Result<Vec<u8>, GatewayError> {
        Err(GatewayError::Unsupported("get_latest_protocol_state_snapshot"))
    }

    fn secure_connection(&self) -> bool {
        self.url.starts_with("https://")
    }
}

// ============================================================================
// Wire types
// ============================================================================

fn invalid(field: &str, value: &str) -> GatewayError {
    GatewayError::InvalidResponse(format!("invalid {}: '{}'", field, value))
}

fn parse_u64(field: &str, value: &str) -> Result<u64, GatewayError> {
    value.parse().map_err(|_| invalid(field, value))
}

fn parse_u32(field: &str, value: &str) -> Result<u32, GatewayError> {
    value.parse().map_err(|_| invalid(field, value))
}

fn parse_id(field: &str, value: &str) -> Result<Identifier, GatewayError> {
    value.parse().map_err(|_| invalid(field, value))
}

fn parse_address(field: &str, value: &str) -> Result<Address, GatewayError> {
    value.parse().map_err(|_| invalid(field, value))
}

fn parse_enum<T: FromStr>(field: &str, value: &str) -> Result<T, GatewayError> {
    value.parse().map_err(|_| invalid(field, value))
}

fn decode_base64(field: &str, value: &str) -> Result<Vec<u8>, GatewayError> {
    STANDARD.decode(value).map_err(|_| invalid(field, value))
}

#[derive(Debug, Deserialize)]
struct AccountResponse {
    address: String,
    balance: String,
    #[serde(default)]
    keys: Vec<AccountKeyResponse>,
    #[serde(default)]
    contracts: BTreeMap<String, String>,
}

#[derive(Debug, Deserialize)]
struct AccountKeyResponse {
    index: String,
    public_key: String,
    signing_algorithm: String,
    hashing_algorithm: String,
    sequence_number: String,
    weight: String,
    #[serde(default)]
    revoked: bool,
}

impl AccountResponse {
    fn into_account(self) -> Result<ChainAccount, GatewayError> {
        let keys = self
            .keys
            .into_iter()
            .map(|k| {
                let sig_algo: SignatureAlgorithm = parse_enum("signing algorithm", &k.signing_algorithm)?;
                let raw_key = k.public_key.strip_prefix("0x").unwrap_or(&k.public_key);
                Ok(AccountPublicKey {
                    index: parse_u32("key index", &k.index)?,
                    public_key: PublicKey::from_hex(sig_algo, raw_key)
                        .map_err(|_| invalid("public key", &k.public_key))?,
                    sig_algo,
                    hash_algo: parse_enum::<HashAlgorithm>("hashing algorithm", &k.hashing_algorithm)?,
                    weight: parse_u32("key weight", k.weight.split('.').next().unwrap_or_default())?,
                    sequence_number: parse_u64("sequence number", &k.sequence_number)?,
                    revoked: k.revoked,
                })
            })
            .collect::<Result<Vec<_>, GatewayError>>()?;

        let contracts = self
            .contracts
            .into_iter()
            .map(|(name, code)| Ok((name, decode_base64("contract code", &code)?)))
            .collect::<Result<BTreeMap<_, _>, GatewayError>>()?;

        Ok(ChainAccount {
            address: parse_address("account address", &self.address)?,
            balance: parse_u64("balance", &self.balance)?,
            keys,
            contracts,
        })
    }
}

#[derive(Debug, Deserialize)]
struct BlockResponse {
    header: BlockHeaderResponse,
    #[serde(default)]
    payload: Option<BlockPayloadResponse>,
}

#[derive(Debug, Deserialize)]
struct BlockHeaderResponse {
    id: String,
    parent_id: String,
    height: String,
    timestamp: String,
}

#[derive(Debug, Default, Deserialize)]
struct BlockPayloadResponse {
    #[serde(default)]
    collection_guarantees: Vec<CollectionGuaranteeResponse>,
}

#[derive(Debug, Deserialize)]
struct CollectionGuaranteeResponse {
    collection_id: String,
}

impl BlockResponse {
    fn into_block(self) -> Result<Block, GatewayError> {
        let collection_ids = self
            .payload
            .unwrap_or_default()
            .collection_guarantees
            .iter()
            .map(|g| parse_id("collection id", &g.collection_id))
            .collect::<Result<_, _>>()?;
        Ok(Block {
            header: BlockHeader {
                id: parse_id("block id", &self.header.id)?,
                parent_id: parse_id("parent id", &self.header.parent_id)?,
                height: parse_u64("block height", &self.header.height)?,
                timestamp: self.header.timestamp,
            },
            collection_ids,
        })
    }
}

#[derive(Debug, Deserialize)]
struct CollectionResponse {
    id: String,
    #[serde(default)]
    transactions: Vec<TransactionIdResponse>,
}

#[derive(Debug, Deserialize)]
struct TransactionIdResponse {
    id: String,
}

#[derive(Debug, Deserialize)]
struct BlockEventsResponse {
    block_id: String,
    block_height: String,
    block_timestamp: String,
    #[serde(default)]
    events: Vec<EventResponse>,
}

#[derive(Debug, Deserialize)]
struct EventResponse {
    #[serde(rename = "type")]
    event_type: String,
    transaction_id: String,
    transaction_index: String,
    event_index: String,
    payload: String,
}

impl EventResponse {
    fn into_event(self) -> Result<Event, GatewayError> {
        let payload = decode_base64("event payload", &self.payload)?;
        Ok(Event {
            transaction_id: parse_id("transaction id", &self.transaction_id)?,
            transaction_index: parse_u32("transaction index", &self.transaction_index)?,
            event_index: parse_u32("event index", &self.event_index)?,
            payload: serde_json::from_slice(&payload)?,
            event_type: self.event_type,
        })
    }
}

impl BlockEventsResponse {
    fn into_block_events(self) -> Result<BlockEvents, GatewayError> {
        Ok(BlockEvents {
            block_id: parse_id("block id", &self.block_id)?,
            height: parse_u64("block height", &self.block_height)?,
            block_timestamp: self.block_timestamp,
            events: self
                .events
                .into_iter()
                .map(EventResponse::into_event)
                .collect::<Result<_, _>>()?,
        })
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct TransactionBody {
    script: String,
    #[serde(default)]
    arguments: Vec<String>,
    reference_block_id: String,
    gas_limit: String,
    payer: String,
    proposal_key: ProposalKeyBody,
    #[serde(default)]
    authorizers: Vec<String>,
    #[serde(default)]
    payload_signatures: Vec<SignatureBody>,
    #[serde(default)]
    envelope_signatures: Vec<SignatureBody>,
}

#[derive(Debug, Serialize, Deserialize)]
struct ProposalKeyBody {
    address: String,
    key_index: String,
    sequence_number: String,
}

#[derive(Debug, Serialize, Deserialize)]
struct SignatureBody {
    address: String,
    key_index: String,
    signature: String,
}

impl TransactionBody {
    fn from_transaction(tx: &Transaction) -> Self {
        let signatures = |sigs: &[TransactionSignature]| {
            sigs.iter()
                .map(|s| SignatureBody {
                    address: s.address.to_string(),
                    key_index: s.key_index.to_string(),
                    signature: STANDARD.encode(s.signature.as_bytes()),
                })
                .collect()
        };
        Self {
            script: STANDARD.encode(&tx.script),
            arguments: tx.arguments.iter().map(|a| STANDARD.encode(a)).collect(),
            reference_block_id: tx.reference_block_id.to_string(),
            gas_limit: tx.gas_limit.to_string(),
            payer: tx.payer.to_string(),
            proposal_key: ProposalKeyBody {
                address: tx.proposal_key.address.to_string(),
                key_index: tx.proposal_key.key_index.to_string(),
                sequence_number: tx.proposal_key.sequence_number.to_string(),
            },
            authorizers: tx.authorizers.iter().map(Address::to_string).collect(),
            payload_signatures: signatures(&tx.payload_signatures),
            envelope_signatures: signatures(&tx.envelope_signatures),
        }
    }

    fn into_transaction(self) -> Result<Transaction, GatewayError> {
        let mut tx = Transaction {
            script: decode_base64("script", &self.script)?,
            arguments: self
                .arguments
                .iter()
                .map(|a| decode_base64("argument", a))
                .collect::<Result<_, _>>()?,
            reference_block_id: parse_id("reference block id", &self.reference_block_id)?,
            gas_limit: parse_u64("gas limit", &self.gas_limit)?,
            proposal_key: ProposalKey {
                address: parse_address("proposer", &self.proposal_key.address)?,
                key_index: parse_u32("proposal key index", &self.proposal_key.key_index)?,
                sequence_number: parse_u64("sequence number", &self.proposal_key.sequence_number)?,
            },
            payer: parse_address("payer", &self.payer)?,
            authorizers: self
                .authorizers
                .iter()
                .map(|a| parse_address("authorizer", a))
                .collect::<Result<_, _>>()?,
            payload_signatures: Vec::new(),
            envelope_signatures: Vec::new(),
        };

        for sig in &self.payload_signatures {
            let (address, key_index, signature) = sig.decode()?;
            tx.add_payload_signature(address, key_index, signature)
                .map_err(|e| GatewayError::InvalidResponse(e.to_string()))?;
        }
        for sig in &self.envelope_signatures {
            let (address, key_index, signature) = sig.decode()?;
            tx.add_envelope_signature(address, key_index, signature)
                .map_err(|e| GatewayError::InvalidResponse(e.to_string()))?;
        }
        Ok(tx)
    }
}

impl SignatureBody {
    fn decode(&self) -> Result<(Address, u32, Signature), GatewayError> {
        Ok((
            parse_address("signer", &self.address)?,
            parse_u32("signature key index", &self.key_index)?,
            Signature::from_bytes(decode_base64("signature", &self.signature)?),
        ))
    }
}

#[derive(Debug, Deserialize)]
struct TransactionResultResponse {
    #[serde(default)]
    block_id: String,
    #[serde(default)]
    block_height: Option<String>,
    status: String,
    #[serde(default)]
    error_message: String,
    #[serde(default)]
    computation_used: Option<String>,
    #[serde(default)]
    events: Vec<EventResponse>,
}

impl TransactionResultResponse {
    fn into_result(self) -> Result<TransactionResult, GatewayError> {
        let status = match self.status.to_ascii_lowercase().as_str() {
            "pending" => TransactionStatus::Pending,
            "finalized" => TransactionStatus::Finalized,
            "executed" => TransactionStatus::Executed,
            "sealed" => TransactionStatus::Sealed,
            "expired" => TransactionStatus::Expired,
            _ => TransactionStatus::Unknown,
        };
        let block_id = if self.block_id.is_empty() {
            Identifier::ZERO
        } else {
            parse_id("block id", &self.block_id)?
        };

        Ok(TransactionResult {
            status,
            error: Some(self.error_message).filter(|m| !m.is_empty()),
            events: self
                .events
                .into_iter()
                .map(EventResponse::into_event)
                .collect::<Result<_, _>>()?,
            block_id,
            block_height: self
                .block_height
                .as_deref()
                .map(|h| parse_u64("block height", h))
                .transpose()?
                .unwrap_or(0),
            computation_used: self
                .computation_used
                .as_deref()
                .map(|c| parse_u64("computation used", c))
                .transpose()?
                .unwrap_or(0),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::PrivateKey;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    /// Serve one request with `body`, returning the request line it saw.
    async fn serve_once(body: &'static str) -> (String, tokio::task::JoinHandle<String>) {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = format!("http://{}", listener.local_addr().unwrap());
        let handle = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut head = Vec::new();
            let mut buf = [0u8; 1024];
            while !head.windows(4).any(|w| w == b"\r\n\r\n") {
                let n = socket.read(&mut buf).await.unwrap();
                if n == 0 {
                    break;
                }
                head.extend_from_slice(&buf[..n]);
            }
            let response = format!(
                "HTTP/1.1 200 OK\r\ncontent-type: application/json\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{}",
                body.len(),
                body
            );
            socket.write_all(response.as_bytes()).await.unwrap();
            let head = String::from_utf8_lossy(&head).into_owned();
            head.lines().next().unwrap_or_default().to_string()
        });
        (url, handle)
    }

    #[tokio::test]
    async fn test_event_query_is_url_encoded() {
        let (url, server) = serve_once("[]").await;
        let gateway = HttpGateway::new(url);

        let events = gateway.get_events("A.01.Token.Moved&x=1 #", 3, 9).await.unwrap();
        assert!(events.is_empty());

        let request_line = server.await.unwrap();
        assert!(
            request_line.starts_with(
                "GET /v1/events?type=A.01.Token.Moved%26x%3D1+%23&start_height=3&end_height=9 "
            ),
            "{request_line}"
        );
    }

    #[test]
    fn test_rest_url_for_host() {
        assert_eq!(rest_url_for_host("127.0.0.1:3569"), "http://127.0.0.1:8888");
        assert_eq!(
            rest_url_for_host("access.mainnet.nodes.onflow.org:9000"),
            "https://rest-mainnet.onflow.org"
        );
        assert_eq!(rest_url_for_host("https://node.example/"), "https://node.example");
        assert_eq!(rest_url_for_host("10.0.0.1:8888"), "http://10.0.0.1:8888");
    }

    #[test]
    fn test_secure_connection() {
        assert!(HttpGateway::for_host("access.devnet.nodes.onflow.org:9000").secure_connection());
        assert!(!HttpGateway::for_host("127.0.0.1:3569").secure_connection());
    }

    #[test]
    fn test_error_message() {
        assert_eq!(error_message(r#"{"code":400,"message":"bad script"}"#), "bad script");
        assert_eq!(error_message("gateway down"), "gateway down");
    }

    #[test]
    fn test_account_response() {
        let key = PrivateKey::generate(SignatureAlgorithm::EcdsaP256).public_key();
        let raw = json!({
            "address": "0xf8d6e0586b0a20c7",
            "balance": "100000",
            "keys": [{
                "index": "0",
                "public_key": format!("0x{}", key.to_hex()),
                "signing_algorithm": "ECDSA_P256",
                "hashing_algorithm": "SHA3_256",
                "sequence_number": "7",
                "weight": "1000",
                "revoked": false
            }],
            "contracts": { "Hello": STANDARD.encode("pub contract Hello {}") }
        });
        let response: AccountResponse = serde_json::from_value(raw).unwrap();
        let account = response.into_account().unwrap();
        assert_eq!(account.address, Address::from_u64(0xf8d6e0586b0a20c7));
        assert_eq!(account.balance, 100_000);
        assert_eq!(account.keys[0].public_key, key);
        assert_eq!(account.keys[0].sequence_number, 7);
        assert_eq!(account.contracts["Hello"], b"pub contract Hello {}".to_vec());
    }

    #[test]
    fn test_transaction_body_roundtrip() {
        let mut tx = Transaction {
            script: b"transaction {}".to_vec(),
            arguments: vec![br#"{"type":"Bool","value":true}"#.to_vec()],
            reference_block_id: Identifier::hash(b"block"),
            gas_limit: 1000,
            proposal_key: ProposalKey {
                address: Address::from_u64(1),
                key_index: 0,
                sequence_number: 3,
            },
            payer: Address::from_u64(2),
            authorizers: vec![Address::from_u64(1)],
            ..Transaction::default()
        };
        tx.add_payload_signature(Address::from_u64(1), 0, Signature::from_bytes(vec![1; 64]))
            .unwrap();
        tx.add_envelope_signature(Address::from_u64(2), 0, Signature::from_bytes(vec![2; 64]))
            .unwrap();

        let body = serde_json::to_value(TransactionBody::from_transaction(&tx)).unwrap();
        assert_eq!(body["gas_limit"], "1000");
        let decoded: TransactionBody = serde_json::from_value(body).unwrap();
        assert_eq!(decoded.into_transaction().unwrap(), tx);
    }

    #[test]
    fn test_result_response_status() {
        let raw = json!({
            "block_id": "",
            "status": "Sealed",
            "error_message": "",
            "computation_used": "12",
            "events": []
        });
        let response: TransactionResultResponse = serde_json::from_value(raw).unwrap();
        let result = response.into_result().unwrap();
        assert_eq!(result.status, TransactionStatus::Sealed);
        assert_eq!(result.error, None);
        assert_eq!(result.computation_used, 12);
    }
}

//! Snowtrace explorer client
//!
//! Two account-module queries: ERC-20 token transfers for the configured
//! wallet and contract (block-paginated), and the internal transfers
//! synthesized by a single transaction. Addresses and hashes are lowercased
//! on ingress so cache keys and wallet comparisons never mix cases.

use async_trait::async_trait;
use reqwest::Client;
use rust_decimal::Decimal;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use tracing::debug;

use crate::cache::{FillPage, FillSource};
use crate::config::SnowtraceConfig;
use crate::error::{TrackerError, TrackerResult};
use crate::venues::{InternalTransfer, InternalTransferSource, parse_decimal, parse_i64, parse_u64};

const END_BLOCK: &str = "99999999";
const NO_TRANSACTIONS: &str = "No transactions found";

/// One ERC-20 transfer touching the configured wallet
#[derive(Debug, Clone, PartialEq)]
pub struct TokenTransfer {
    /// Transaction hash, lowercased
    pub hash: String,
    /// Block the transaction was mined in
    pub block_number: u64,
    /// Block timestamp, epoch seconds
    pub timestamp: i64,
    /// Sending address, lowercased
    pub from: String,
    /// Receiving address, lowercased
    pub to: String,
    /// Transferred amount in the token's smallest unit; exceeds u64 range
    pub value: Decimal,
    /// Token ticker as reported by the explorer
    pub token_symbol: String,
    /// Token decimals as reported by the explorer
    pub token_decimal: u32,
    /// Gas limit of the transaction
    pub gas: u64,
    /// Gas price in wei
    pub gas_price: u64,
    /// Gas consumed by the transaction
    pub gas_used: u64,
    /// Gas consumed by the block up to and including this transaction
    pub cumulative_gas_used: u64,
}

#[derive(Debug, Deserialize)]
struct ExplorerEnvelope {
    status: String,
    #[serde(default)]
    message: String,
    result: serde_json::Value,
}

impl ExplorerEnvelope {
    // `result` is only an array on success; error responses put a
    // human-readable string there instead.
    fn into_records<T: DeserializeOwned>(self) -> TrackerResult<Vec<T>> {
        if self.result.is_array() {
            return serde_json::from_value(self.result).map_err(|e| TrackerError::Venue {
                context: format!("explorer result did not match the expected shape: {e}"),
            });
        }
        if self.status != "1" && self.message.contains(NO_TRANSACTIONS) {
            return Ok(Vec::new());
        }
        Err(TrackerError::Venue {
            context: format!(
                "explorer rejected request: {} ({})",
                self.message, self.result
            ),
        })
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawTokenTransfer {
    hash: String,
    block_number: String,
    time_stamp: String,
    from: String,
    to: String,
    value: String,
    #[serde(default)]
    token_symbol: String,
    #[serde(default)]
    token_decimal: String,
    gas: String,
    gas_price: String,
    gas_used: String,
    cumulative_gas_used: String,
}

impl RawTokenTransfer {
    fn into_transfer(self) -> TrackerResult<TokenTransfer> {
        Ok(TokenTransfer {
            hash: self.hash.to_lowercase(),
            block_number: parse_u64(&self.block_number, "snowtrace blockNumber")?,
            timestamp: parse_i64(&self.time_stamp, "snowtrace timeStamp")?,
            from: self.from.to_lowercase(),
            to: self.to.to_lowercase(),
            value: parse_decimal(&self.value, "snowtrace value")?,
            token_symbol: self.token_symbol,
            token_decimal: if self.token_decimal.is_empty() {
                0
            } else {
                parse_u64(&self.token_decimal, "snowtrace tokenDecimal")? as u32
            },
            gas: parse_u64(&self.gas, "snowtrace gas")?,
            gas_price: parse_u64(&self.gas_price, "snowtrace gasPrice")?,
            gas_used: parse_u64(&self.gas_used, "snowtrace gasUsed")?,
            cumulative_gas_used: parse_u64(&self.cumulative_gas_used, "snowtrace cumulativeGasUsed")?,
        })
    }
}

#[derive(Debug, Deserialize)]
struct RawInternalTransfer {
    to: String,
    value: String,
}

/// REST client for the Snowtrace account module
#[derive(Debug, Clone)]
pub struct SnowtraceClient {
    client: Client,
    config: SnowtraceConfig,
}

impl SnowtraceClient {
    /// Create a client over the configured explorer endpoint
    #[must_use]
    pub fn new(config: SnowtraceConfig) -> Self {
        Self {
            client: Client::new(),
            config,
        }
    }

    /// USDT transfers touching the configured wallet from `start_block`
    /// onward, oldest first
    pub async fn token_transfers(&self, start_block: u64) -> TrackerResult<Vec<TokenTransfer>> {
        let start = start_block.to_string();
        let envelope: ExplorerEnvelope = self
            .client
            .get(&self.config.api_url)
            .query(&[
                ("module", "account"),
                ("action", "tokentx"),
                ("contractaddress", self.config.usdt_contract.as_str()),
                ("address", self.config.wallet_address.as_str()),
                ("startblock", start.as_str()),
                ("endblock", END_BLOCK),
                ("sort", "asc"),
                ("apikey", self.config.api_key.as_str()),
            ])
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        let raw: Vec<RawTokenTransfer> = envelope.into_records()?;
        debug!("Snowtrace returned {} token transfers from block {}", raw.len(), start_block);
        raw.into_iter().map(RawTokenTransfer::into_transfer).collect()
    }
}

#[async_trait]
impl InternalTransferSource for SnowtraceClient {
    async fn internal_transfers(&self, tx_hash: &str) -> TrackerResult<Vec<InternalTransfer>> {
        let envelope: ExplorerEnvelope = self
            .client
            .get(&self.config.api_url)
            .query(&[
                ("module", "account"),
                ("action", "txlistinternal"),
                ("txhash", tx_hash),
                ("apikey", self.config.api_key.as_str()),
            ])
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        let raw: Vec<RawInternalTransfer> = envelope.into_records()?;
        raw.into_iter()
            .map(|item| {
                Ok(InternalTransfer {
                    to: item.to.to_lowercase(),
                    value: parse_decimal(&item.value, "snowtrace internal value")?,
                })
            })
            .collect()
    }
}

#[async_trait]
impl FillSource<TokenTransfer> for SnowtraceClient {
    async fn fetch_page(&self, cursor: u64) -> TrackerResult<FillPage<TokenTransfer>> {
        let transfers = self.token_transfers(cursor).await?;
        let next_cursor = transfers
            .iter()
            .map(|transfer| transfer.block_number + 1)
            .max()
            .unwrap_or(cursor);
        Ok(FillPage {
            records: transfers
                .into_iter()
                .map(|transfer| (transfer.hash.clone(), transfer))
                .collect(),
            next_cursor,
        })
    }
}

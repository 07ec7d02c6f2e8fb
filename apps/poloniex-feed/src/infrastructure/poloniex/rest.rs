//! Public REST Snapshot Client
//!
//! Unauthenticated HTTP calls used to seed and refresh the channel directory
//! and to fetch order-book snapshots after a sequence gap.
//!
//! - `GET {base}?command=returnTicker`
//! - `GET {base}?command=returnOrderBook&currencyPair=BTC_ETH&depth=50`
//!
//! Field values are decoded with the same permissive coercion as the feed.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use rust_decimal::Decimal;
use serde_json::{Map, Value};

use super::coerce;
use crate::application::ports::{BookLevel, OrderBookSnapshot, SnapshotError, SnapshotSource};
use crate::domain::directory::{ChannelId, MarketEntry, MarketSnapshot};
use crate::domain::streaming::TickerEvent;

/// Client for the public REST API.
#[derive(Debug, Clone)]
pub struct PublicApiClient {
    client: Client,
    base_url: String,
}

impl PublicApiClient {
    /// Create a client for `base_url` (e.g. `https://poloniex.com/public`).
    ///
    /// # Errors
    ///
    /// Returns [`SnapshotError::Unavailable`] if the HTTP client cannot be
    /// built.
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self, SnapshotError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| SnapshotError::Unavailable(e.to_string()))?;

        Ok(Self {
            client,
            base_url: base_url.into(),
        })
    }

    async fn get(&self, params: &[(&str, &str)]) -> Result<Value, SnapshotError> {
        let response = self
            .client
            .get(&self.base_url)
            .query(params)
            .send()
            .await
            .map_err(|e| SnapshotError::Unavailable(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            tracing::warn!(status = status.as_u16(), ?params, "Public API request failed");
            return Err(SnapshotError::Status(status.as_u16()));
        }

        let body: Value = response
            .json()
            .await
            .map_err(|e| SnapshotError::Malformed(e.to_string()))?;

        if let Some(error) = body.get("error").and_then(Value::as_str) {
            return Err(SnapshotError::Malformed(error.to_string()));
        }
        Ok(body)
    }
}

fn ticker_from_entry(pair: &str, id: u32, entry: &Map<String, Value>) -> TickerEvent {
    let ratio = coerce::decimal_or_sentinel(entry.get("percentChange"), "percent_change");
    TickerEvent {
        pair: pair.to_string(),
        pair_id: Some(id),
        last: coerce::decimal_or_sentinel(entry.get("last"), "last"),
        ask: coerce::decimal_or_sentinel(entry.get("lowestAsk"), "ask"),
        bid: coerce::decimal_or_sentinel(entry.get("highestBid"), "bid"),
        percent_change: ratio
            .checked_mul(Decimal::ONE_HUNDRED)
            .unwrap_or(coerce::DECIMAL_SENTINEL),
        base_volume: coerce::decimal_or_sentinel(entry.get("baseVolume"), "base_volume"),
        quote_volume: coerce::decimal_or_sentinel(entry.get("quoteVolume"), "quote_volume"),
        is_frozen: coerce::flag(entry.get("isFrozen")),
        daily_high: coerce::decimal_or_sentinel(entry.get("high24hr"), "daily_high"),
        daily_low: coerce::decimal_or_sentinel(entry.get("low24hr"), "daily_low"),
    }
}

/// Decode a `returnTicker` body.
///
/// # Errors
///
/// Returns [`SnapshotError::Malformed`] if the body is not an object.
pub fn parse_ticker_directory(body: &Value) -> Result<MarketSnapshot, SnapshotError> {
    let entries = body
        .as_object()
        .ok_or_else(|| SnapshotError::Malformed("ticker body is not an object".to_string()))?;

    let mut markets = Vec::with_capacity(entries.len());
    for (pair, entry) in entries {
        let Some(fields) = entry.as_object() else {
            tracing::warn!(pair = %pair, "Ticker entry is not an object, skipped");
            continue;
        };
        let Some(id) = fields
            .get("id")
            .and_then(coerce::try_u64)
            .and_then(|id| u32::try_from(id).ok())
        else {
            tracing::warn!(pair = %pair, "Ticker entry without market id, skipped");
            continue;
        };

        markets.push(MarketEntry {
            name: pair.clone(),
            id: ChannelId(id),
            ticker: Some(ticker_from_entry(pair, id, fields)),
        });
    }
    markets.sort_by_key(|m| m.id);

    Ok(MarketSnapshot { markets })
}

fn parse_levels(value: Option<&Value>) -> Vec<BookLevel> {
    value
        .and_then(Value::as_array)
        .map(|levels| {
            levels
                .iter()
                .filter_map(Value::as_array)
                .map(|level| BookLevel {
                    rate: coerce::decimal_or_sentinel(level.first(), "rate"),
                    amount: coerce::decimal_or_sentinel(level.get(1), "amount"),
                })
                .collect()
        })
        .unwrap_or_default()
}

/// Decode a `returnOrderBook` body.
///
/// # Errors
///
/// Returns [`SnapshotError::Malformed`] if the body has no `seq`.
pub fn parse_order_book(body: &Value) -> Result<OrderBookSnapshot, SnapshotError> {
    let sequence = body
        .get("seq")
        .and_then(coerce::try_u64)
        .ok_or_else(|| SnapshotError::Malformed("order book without seq".to_string()))?;

    Ok(OrderBookSnapshot {
        asks: parse_levels(body.get("asks")),
        bids: parse_levels(body.get("bids")),
        is_frozen: coerce::flag(body.get("isFrozen")),
        sequence,
    })
}

#[async_trait]
impl SnapshotSource for PublicApiClient {
    async fn fetch_directory(&self) -> Result<MarketSnapshot, SnapshotError> {
        let body = self.get(&[("command", "returnTicker")]).await?;
        let snapshot = parse_ticker_directory(&body)?;
        tracing::info!(markets = snapshot.markets.len(), "Fetched market directory");
        Ok(snapshot)
    }

    async fn fetch_order_book(
        &self,
        pair: &str,
        depth: u32,
    ) -> Result<OrderBookSnapshot, SnapshotError> {
        let depth = depth.to_string();
        let body = self
            .get(&[
                ("command", "returnOrderBook"),
                ("currencyPair", pair),
                ("depth", depth.as_str()),
            ])
            .await?;
        let book = parse_order_book(&body)?;
        tracing::debug!(pair, sequence = book.sequence, "Fetched order book snapshot");
        Ok(book)
    }
}

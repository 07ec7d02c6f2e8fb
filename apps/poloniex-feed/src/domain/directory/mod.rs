//! Channel Directory
//!
//! Bidirectional mapping between channel names and the numeric channel ids
//! used on the wire.
//!
//! Two sources feed the directory:
//!
//! - a static table of well-known service channels (`ticker`, `chat`, ...)
//! - a dynamic market table (`BTC_ETH` ↔ `148`) loaded from the public REST
//!   API and replaced wholesale on refresh
//!
//! Readers always see either the old or the new market table, never a mix.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::domain::streaming::TickerEvent;

// =============================================================================
// Channel Ids
// =============================================================================

/// Numeric channel id as carried in the first element of every frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChannelId(pub u32);

impl ChannelId {
    /// Public chat channel.
    pub const CHAT: Self = Self(1001);
    /// Ticker channel covering every market.
    pub const TICKER: Self = Self(1002);
    /// 24h volume channel.
    pub const VOLUME: Self = Self(1003);
    /// Server heartbeat channel.
    pub const HEARTBEAT: Self = Self(1010);

    /// Raw id.
    #[must_use]
    pub const fn get(self) -> u32 {
        self.0
    }

    /// Market channels are the ids below 1000.
    #[must_use]
    pub const fn is_market(self) -> bool {
        self.0 > 0 && self.0 < 1000
    }
}

impl fmt::Display for ChannelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u32> for ChannelId {
    fn from(id: u32) -> Self {
        Self(id)
    }
}

/// Well-known service channels. Aliases resolve to the same id.
const WELL_KNOWN: &[(&str, ChannelId)] = &[
    ("ticker", ChannelId::TICKER),
    ("chat", ChannelId::CHAT),
    ("trollbox", ChannelId::CHAT),
    ("heartbeat", ChannelId::HEARTBEAT),
    ("volume", ChannelId::VOLUME),
    ("24hvolume", ChannelId::VOLUME),
];

/// Canonical name of a well-known id (first table entry wins).
fn well_known_name(id: ChannelId) -> Option<&'static str> {
    WELL_KNOWN
        .iter()
        .find(|(_, known)| *known == id)
        .map(|(name, _)| *name)
}

fn well_known_id(name: &str) -> Option<ChannelId> {
    WELL_KNOWN
        .iter()
        .find(|(known, _)| known.eq_ignore_ascii_case(name))
        .map(|(_, id)| *id)
}

// =============================================================================
// Errors
// =============================================================================

/// Directory lookup failures.
#[derive(Debug, Clone, thiserror::Error, PartialEq, Eq)]
pub enum DirectoryError {
    /// No channel is known by this name.
    #[error("unknown channel: {0}")]
    UnknownChannel(String),

    /// No market is known by this id.
    #[error("unknown market id: {0}")]
    UnknownMarket(ChannelId),
}

// =============================================================================
// Market Snapshot
// =============================================================================

/// One market as listed by the public API.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MarketEntry {
    /// Market name, e.g. `BTC_ETH`.
    pub name: String,
    /// Numeric market id.
    pub id: ChannelId,
    /// Ticker values captured alongside the listing, if the source had them.
    pub ticker: Option<TickerEvent>,
}

/// Full market listing used to rebuild the dynamic table.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MarketSnapshot {
    /// Listed markets.
    pub markets: Vec<MarketEntry>,
}

impl MarketSnapshot {
    /// Build a snapshot from `(name, id)` pairs.
    pub fn from_pairs<I, S>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (S, u32)>,
        S: Into<String>,
    {
        Self {
            markets: pairs
                .into_iter()
                .map(|(name, id)| MarketEntry {
                    name: name.into(),
                    id: ChannelId(id),
                    ticker: None,
                })
                .collect(),
        }
    }
}

#[derive(Debug, Default)]
struct MarketTable {
    by_name: HashMap<String, ChannelId>,
    by_id: HashMap<ChannelId, String>,
}

impl MarketTable {
    fn build(snapshot: &MarketSnapshot) -> Self {
        let mut table = Self {
            by_name: HashMap::with_capacity(snapshot.markets.len()),
            by_id: HashMap::with_capacity(snapshot.markets.len()),
        };
        for entry in &snapshot.markets {
            table.by_name.insert(entry.name.clone(), entry.id);
            table.by_id.insert(entry.id, entry.name.clone());
        }
        table
    }
}

// =============================================================================
// Directory
// =============================================================================

/// Name ↔ id directory shared by the codec and the subscription service.
#[derive(Debug, Default)]
pub struct ChannelDirectory {
    markets: RwLock<Arc<MarketTable>>,
}

impl ChannelDirectory {
    /// Create a directory with only the well-known channels.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a directory pre-loaded with a market snapshot.
    #[must_use]
    pub fn with_snapshot(snapshot: &MarketSnapshot) -> Self {
        let directory = Self::new();
        directory.refresh(snapshot);
        directory
    }

    /// Resolve a channel name to its id.
    ///
    /// Well-known names win over market names. Numeric strings resolve to
    /// themselves.
    ///
    /// # Errors
    ///
    /// Returns [`DirectoryError::UnknownChannel`] when neither table knows
    /// the name.
    pub fn resolve(&self, name: &str) -> Result<ChannelId, DirectoryError> {
        if let Some(id) = well_known_id(name) {
            return Ok(id);
        }
        if let Some(id) = self.markets.read().by_name.get(name).copied() {
            return Ok(id);
        }
        if let Ok(raw) = name.parse::<u32>() {
            let id = ChannelId(raw);
            if well_known_name(id).is_some() || !id.is_market() || self.contains_market(id) {
                return Ok(id);
            }
        }
        Err(DirectoryError::UnknownChannel(name.to_string()))
    }

    /// Resolve a market id to its name.
    ///
    /// # Errors
    ///
    /// Returns [`DirectoryError::UnknownMarket`] when the id is not listed.
    pub fn reverse_resolve(&self, id: ChannelId) -> Result<String, DirectoryError> {
        self.markets
            .read()
            .by_id
            .get(&id)
            .cloned()
            .ok_or(DirectoryError::UnknownMarket(id))
    }

    /// Canonical name for any channel id, well-known or market.
    #[must_use]
    pub fn channel_name(&self, id: ChannelId) -> Option<String> {
        well_known_name(id)
            .map(ToString::to_string)
            .or_else(|| self.reverse_resolve(id).ok())
    }

    /// Whether the market table lists this id.
    #[must_use]
    pub fn contains_market(&self, id: ChannelId) -> bool {
        self.markets.read().by_id.contains_key(&id)
    }

    /// Number of markets currently listed.
    #[must_use]
    pub fn market_count(&self) -> usize {
        self.markets.read().by_id.len()
    }

    /// Replace the market table with one built from `snapshot`.
    pub fn refresh(&self, snapshot: &MarketSnapshot) {
        let table = Arc::new(MarketTable::build(snapshot));
        *self.markets.write() = table;
        tracing::debug!(markets = snapshot.markets.len(), "Channel directory refreshed");
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    fn directory() -> ChannelDirectory {
        ChannelDirectory::with_snapshot(&MarketSnapshot::from_pairs([
            ("BTC_ETH", 148),
            ("USDT_BTC", 121),
        ]))
    }

    #[test_case("ticker", 1002 ; "ticker")]
    #[test_case("chat", 1001 ; "chat")]
    #[test_case("trollbox", 1001 ; "chat alias")]
    #[test_case("heartbeat", 1010 ; "heartbeat")]
    #[test_case("24hvolume", 1003 ; "volume alias")]
    #[test_case("BTC_ETH", 148 ; "market")]
    fn resolves_names(name: &str, expected: u32) {
        assert_eq!(directory().resolve(name), Ok(ChannelId(expected)));
    }

    #[test]
    fn unknown_name_fails() {
        assert_eq!(
            directory().resolve("DOGE_MOON"),
            Err(DirectoryError::UnknownChannel("DOGE_MOON".to_string()))
        );
    }

    #[test]
    fn numeric_name_of_listed_market() {
        assert_eq!(directory().resolve("148"), Ok(ChannelId(148)));
        assert!(directory().resolve("999").is_err());
    }

    #[test]
    fn reverse_resolve_markets() {
        let dir = directory();
        assert_eq!(dir.reverse_resolve(ChannelId(121)), Ok("USDT_BTC".to_string()));
        assert_eq!(
            dir.reverse_resolve(ChannelId(7)),
            Err(DirectoryError::UnknownMarket(ChannelId(7)))
        );
    }

    #[test]
    fn channel_name_covers_both_tables() {
        let dir = directory();
        assert_eq!(dir.channel_name(ChannelId::CHAT).as_deref(), Some("chat"));
        assert_eq!(dir.channel_name(ChannelId(148)).as_deref(), Some("BTC_ETH"));
        assert_eq!(dir.channel_name(ChannelId(5)), None);
    }

    #[test]
    fn refresh_replaces_table() {
        let dir = directory();
        dir.refresh(&MarketSnapshot::from_pairs([("BTC_XMR", 114)]));

        assert_eq!(dir.market_count(), 1);
        assert!(dir.resolve("BTC_ETH").is_err());
        assert_eq!(dir.resolve("BTC_XMR"), Ok(ChannelId(114)));
        assert_eq!(dir.resolve("ticker"), Ok(ChannelId::TICKER));
    }

    #[test]
    fn market_channel_range() {
        assert!(ChannelId(148).is_market());
        assert!(!ChannelId(0).is_market());
        assert!(!ChannelId::TICKER.is_market());
    }
}

//! Feed Frame Codec
//!
//! Classifies one inbound text frame and decodes it into typed events.
//!
//! # Frame Layout
//!
//! Every frame is a JSON array whose first element is the channel id:
//!
//! ```text
//! [1010]                                   heartbeat
//! [148, 1]                                 subscription acknowledgement
//! [148, 512, [["o",1,"0.05","0"], ...]]    market: [id, sequence, records]
//! [1002, null, [121, "0.0512", ...]]       ticker: [id, null, 10 fields]
//! [1001, 37, "user", "text", 12]           chat
//! ```
//!
//! Decoding reads the channel directory but performs no I/O and mutates
//! nothing. Per-field problems fall back to sentinels (see [`super::coerce`]);
//! only a frame whose outer shape is wrong becomes a [`ProtocolError`].

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde_json::Value;

use super::coerce;
use crate::domain::directory::{ChannelDirectory, ChannelId};
use crate::domain::streaming::{
    BookSide, ChatMessage, DeltaKind, FeedEvent, OrderBookDeltaEvent, TickerEvent, TradeEvent,
    TradeSide,
};
use crate::error::ProtocolError;

/// Number of positional fields in a ticker payload.
pub const TICKER_FIELDS: usize = 10;

// =============================================================================
// Decoded Frames
// =============================================================================

/// Classified frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    /// Order-book and trade records for one market.
    Market(MarketUpdate),
    /// Ticker update.
    Ticker(TickerEvent),
    /// Chat message.
    Chat(ChatMessage),
    /// Server heartbeat.
    Heartbeat,
    /// Subscription acknowledgement.
    Acknowledgement {
        /// Channel acknowledged.
        channel: ChannelId,
        /// `true` for subscribe, `false` for unsubscribe.
        subscribed: bool,
    },
    /// Channel id not known to the directory.
    Ignored {
        /// Channel id of the frame.
        channel: ChannelId,
    },
}

/// Payload of one market frame, in record order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MarketUpdate {
    /// Market name.
    pub pair: String,
    /// Market channel id.
    pub market_id: ChannelId,
    /// Frame sequence number.
    pub sequence: Option<u64>,
    /// A sequence was present but could not be read.
    pub sequence_unreadable: bool,
    /// Frame carried an `"i"` initial-snapshot record.
    pub initial: bool,
    /// Delta and trade events in wire order.
    pub events: Vec<FeedEvent>,
}

// =============================================================================
// Codec
// =============================================================================

/// Decoder for the positional feed format.
#[derive(Debug, Default, Clone, Copy)]
pub struct FeedCodec;

impl FeedCodec {
    /// Create a new codec.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    /// Decode one text frame.
    ///
    /// # Errors
    ///
    /// Returns [`ProtocolError`] when the text is not a JSON array with a
    /// numeric channel id, or when a known channel's payload has the wrong
    /// outer shape.
    pub fn decode(
        &self,
        text: &str,
        directory: &ChannelDirectory,
        observed_at: DateTime<Utc>,
    ) -> Result<Frame, ProtocolError> {
        let value: Value = serde_json::from_str(text)?;
        self.decode_value(&value, directory, observed_at)
    }

    /// Decode one already-parsed frame.
    ///
    /// # Errors
    ///
    /// See [`FeedCodec::decode`].
    pub fn decode_value(
        &self,
        value: &Value,
        directory: &ChannelDirectory,
        observed_at: DateTime<Utc>,
    ) -> Result<Frame, ProtocolError> {
        let items = value.as_array().ok_or(ProtocolError::NotAnArray)?;
        let first = items.first().ok_or(ProtocolError::Empty)?;
        let channel = first
            .as_u64()
            .and_then(|id| u32::try_from(id).ok())
            .map(ChannelId)
            .ok_or_else(|| ProtocolError::InvalidChannel(first.to_string()))?;

        if channel == ChannelId::HEARTBEAT {
            return Ok(Frame::Heartbeat);
        }

        // [channel, 1] / [channel, 0]
        if items.len() == 2
            && let Some(flag) = items[1].as_u64()
        {
            return Ok(Frame::Acknowledgement {
                channel,
                subscribed: flag == 1,
            });
        }

        match channel {
            ChannelId::TICKER => Self::decode_ticker(channel, items, directory),
            ChannelId::CHAT => Self::decode_chat(channel, items),
            id if id.is_market() => match directory.reverse_resolve(id) {
                Ok(pair) => Self::decode_market(id, pair, items, observed_at),
                Err(e) => {
                    tracing::warn!(channel = %id, error = %e, "Market frame for unknown id ignored");
                    Ok(Frame::Ignored { channel: id })
                }
            },
            other => {
                tracing::debug!(channel = %other, "Frame on unhandled channel ignored");
                Ok(Frame::Ignored { channel: other })
            }
        }
    }

    /// Split `[id, seq, payload]` or `[id, payload]`.
    fn split_sequenced(items: &[Value]) -> (Option<&Value>, Option<&Value>) {
        match items.len() {
            0 | 1 => (None, None),
            2 => (None, items.get(1)),
            _ => (items.get(1), items.get(2)),
        }
    }

    fn invalid(channel: ChannelId, reason: impl Into<String>) -> ProtocolError {
        ProtocolError::InvalidPayload {
            channel: channel.get(),
            reason: reason.into(),
        }
    }

    // -------------------------------------------------------------------------
    // Market channel
    // -------------------------------------------------------------------------

    fn decode_market(
        market_id: ChannelId,
        pair: String,
        items: &[Value],
        observed_at: DateTime<Utc>,
    ) -> Result<Frame, ProtocolError> {
        let (raw_sequence, payload) = Self::split_sequenced(items);
        let records = payload
            .and_then(Value::as_array)
            .ok_or_else(|| Self::invalid(market_id, "records are not an array"))?;

        let (sequence, sequence_unreadable) = match coerce::sequence(raw_sequence) {
            Ok(sequence) => (sequence, false),
            Err(_) => (None, true),
        };

        let mut update = MarketUpdate {
            pair,
            market_id,
            sequence,
            sequence_unreadable,
            initial: false,
            events: Vec::with_capacity(records.len()),
        };

        for record in records {
            let Some(fields) = record.as_array() else {
                tracing::warn!(pair = %update.pair, record = %record, "Non-array record skipped");
                continue;
            };

            match fields.first().and_then(Value::as_str) {
                Some("i") => update.initial = true,
                Some("o") => {
                    if let Some(delta) =
                        Self::decode_delta(&update.pair, &fields[1..], sequence, observed_at)
                    {
                        update.events.push(FeedEvent::OrderBook(delta));
                    }
                }
                Some("t") => {
                    if let Some(trade) = Self::decode_trade(&update.pair, &fields[1..]) {
                        update.events.push(FeedEvent::Trade(trade));
                    }
                }
                tag => {
                    tracing::warn!(pair = %update.pair, tag = ?tag, "Unknown record tag skipped");
                }
            }
        }

        Ok(Frame::Market(update))
    }

    /// `[side, rate, amount]`
    fn decode_delta(
        pair: &str,
        fields: &[Value],
        sequence: Option<u64>,
        observed_at: DateTime<Utc>,
    ) -> Option<OrderBookDeltaEvent> {
        let Some(side) = fields
            .first()
            .and_then(coerce::try_u64)
            .and_then(BookSide::from_flag)
        else {
            tracing::warn!(pair, fields = ?fields, "Order-book record with invalid side skipped");
            return None;
        };

        let rate = coerce::decimal_or_sentinel(fields.get(1), "rate");
        let amount = coerce::decimal_or_sentinel(fields.get(2), "amount");
        let kind = if amount.is_zero() {
            DeltaKind::Remove
        } else {
            DeltaKind::Modify
        };

        Some(OrderBookDeltaEvent {
            pair: pair.to_string(),
            side,
            rate,
            amount,
            kind,
            sequence,
            observed_at,
        })
    }

    /// `[side, rate, amount, tradeId, unixTime]`
    ///
    /// Some server versions put the trade id first:
    /// `[tradeId, side, rate, amount, unixTime]`. That layout is only chosen
    /// when the leading field is not a side flag.
    fn decode_trade(pair: &str, fields: &[Value]) -> Option<TradeEvent> {
        let is_side = |value: Option<&Value>| {
            value
                .and_then(coerce::try_u64)
                .and_then(TradeSide::from_flag)
                .is_some()
        };
        let id_first = !is_side(fields.first()) && is_side(fields.get(1));
        let (side_at, rate_at, amount_at, id_at, time_at) = if id_first {
            (1, 2, 3, 0, 4)
        } else {
            (0, 1, 2, 3, 4)
        };

        let Some(side) = fields
            .get(side_at)
            .and_then(coerce::try_u64)
            .and_then(TradeSide::from_flag)
        else {
            tracing::warn!(pair, fields = ?fields, "Trade record with invalid side skipped");
            return None;
        };

        let rate = coerce::decimal_or_sentinel(fields.get(rate_at), "rate");
        let amount = coerce::decimal_or_sentinel(fields.get(amount_at), "amount");
        let total = rate.checked_mul(amount).unwrap_or_else(|| {
            tracing::warn!(pair, %rate, %amount, "Trade total overflowed, using sentinel");
            coerce::DECIMAL_SENTINEL
        });

        Some(TradeEvent {
            pair: pair.to_string(),
            trade_id: coerce::count_or_sentinel(fields.get(id_at), "trade_id"),
            side,
            rate,
            amount,
            total,
            trade_time: coerce::timestamp_or_sentinel(fields.get(time_at), "trade_time"),
        })
    }

    // -------------------------------------------------------------------------
    // Ticker channel
    // -------------------------------------------------------------------------

    /// `[pairId, last, ask, bid, percentChange, baseVolume, quoteVolume,
    /// isFrozen, dailyHigh, dailyLow]`
    fn decode_ticker(
        channel: ChannelId,
        items: &[Value],
        directory: &ChannelDirectory,
    ) -> Result<Frame, ProtocolError> {
        let (_, payload) = Self::split_sequenced(items);
        let fields = payload
            .and_then(Value::as_array)
            .ok_or_else(|| Self::invalid(channel, "ticker payload is not an array"))?;
        if fields.len() < TICKER_FIELDS {
            return Err(Self::invalid(
                channel,
                format!("ticker has {} fields, expected {TICKER_FIELDS}", fields.len()),
            ));
        }

        let pair_id = match &fields[0] {
            Value::String(text) => text.trim().parse::<u32>().ok(),
            other => Some(
                coerce::try_u64(other)
                    .and_then(|id| u32::try_from(id).ok())
                    .ok_or_else(|| Self::invalid(channel, format!("invalid pair id {other}")))?,
            ),
        };
        let (pair, pair_id) = match (pair_id, &fields[0]) {
            (Some(id), _) => match directory.reverse_resolve(ChannelId(id)) {
                Ok(name) => (name, Some(id)),
                Err(e) => {
                    tracing::warn!(pair_id = id, error = %e, "Ticker for unknown market ignored");
                    return Ok(Frame::Ignored { channel });
                }
            },
            (None, Value::String(name)) => {
                (name.clone(), directory.resolve(name).ok().map(ChannelId::get))
            }
            (None, other) => {
                return Err(Self::invalid(channel, format!("invalid pair id {other}")));
            }
        };

        let ratio = coerce::decimal_or_sentinel(fields.get(4), "percent_change");
        let percent_change = ratio.checked_mul(Decimal::ONE_HUNDRED).unwrap_or_else(|| {
            tracing::warn!(pair = %pair, %ratio, "Percent change overflowed, using sentinel");
            coerce::DECIMAL_SENTINEL
        });

        Ok(Frame::Ticker(TickerEvent {
            pair,
            pair_id,
            last: coerce::decimal_or_sentinel(fields.get(1), "last"),
            ask: coerce::decimal_or_sentinel(fields.get(2), "ask"),
            bid: coerce::decimal_or_sentinel(fields.get(3), "bid"),
            percent_change,
            base_volume: coerce::decimal_or_sentinel(fields.get(5), "base_volume"),
            quote_volume: coerce::decimal_or_sentinel(fields.get(6), "quote_volume"),
            is_frozen: coerce::flag(fields.get(7)),
            daily_high: coerce::decimal_or_sentinel(fields.get(8), "daily_high"),
            daily_low: coerce::decimal_or_sentinel(fields.get(9), "daily_low"),
        }))
    }

    // -------------------------------------------------------------------------
    // Chat channel
    // -------------------------------------------------------------------------

    /// `[1001, seq, username, message, reputation]`
    fn decode_chat(channel: ChannelId, items: &[Value]) -> Result<Frame, ProtocolError> {
        let (Some(username), Some(message)) = (
            items.get(2).and_then(Value::as_str),
            items.get(3).and_then(Value::as_str),
        ) else {
            return Err(Self::invalid(channel, "chat frame missing username or message"));
        };

        Ok(Frame::Chat(ChatMessage {
            sequence: coerce::sequence(items.get(1)).ok().flatten(),
            username: username.to_string(),
            message: message.to_string(),
            reputation: items.get(4).and_then(coerce::try_u64).unwrap_or(0),
        }))
    }
}

impl MarketUpdate {
    /// Order-book deltas in this update.
    pub fn deltas(&self) -> impl Iterator<Item = &OrderBookDeltaEvent> {
        self.events.iter().filter_map(|e| match e {
            FeedEvent::OrderBook(delta) => Some(delta),
            _ => None,
        })
    }

    /// Trades in this update.
    pub fn trades(&self) -> impl Iterator<Item = &TradeEvent> {
        self.events.iter().filter_map(|e| match e {
            FeedEvent::Trade(trade) => Some(trade),
            _ => None,
        })
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use std::str::FromStr;

    use proptest::prelude::*;
    use serde_json::json;
    use test_case::test_case;

    use super::*;
    use crate::domain::directory::MarketSnapshot;

    fn directory() -> ChannelDirectory {
        ChannelDirectory::with_snapshot(&MarketSnapshot::from_pairs([
            ("BTC_ETH", 148),
            ("USDT_BTC", 121),
        ]))
    }

    fn dec(s: &str) -> Decimal {
        Decimal::from_str(s).unwrap()
    }

    fn decode(text: &str) -> Result<Frame, ProtocolError> {
        FeedCodec::new().decode(text, &directory(), Utc::now())
    }

    fn market(text: &str) -> MarketUpdate {
        match decode(text).unwrap() {
            Frame::Market(update) => update,
            other => panic!("expected market frame, got {other:?}"),
        }
    }

    /// Encode a ticker the way the server does.
    fn encode_ticker(ticker: &TickerEvent) -> String {
        let ratio = ticker.percent_change / Decimal::ONE_HUNDRED;
        json!([
            1002,
            null,
            [
                ticker.pair,
                ticker.last.to_string(),
                ticker.ask.to_string(),
                ticker.bid.to_string(),
                ratio.to_string(),
                ticker.base_volume.to_string(),
                ticker.quote_volume.to_string(),
                u8::from(ticker.is_frozen),
                ticker.daily_high.to_string(),
                ticker.daily_low.to_string(),
            ]
        ])
        .to_string()
    }

    #[test]
    fn ticker_end_to_end() {
        let frame = decode(
            r#"[1002, null, ["BTC_ETH","0.0512","0.0513","0.0511","0.015","120.5","6170.2",0,"0.0550","0.0490"]]"#,
        )
        .unwrap();

        assert_eq!(
            frame,
            Frame::Ticker(TickerEvent {
                pair: "BTC_ETH".to_string(),
                pair_id: Some(148),
                last: dec("0.0512"),
                ask: dec("0.0513"),
                bid: dec("0.0511"),
                percent_change: dec("1.5"),
                base_volume: dec("120.5"),
                quote_volume: dec("6170.2"),
                is_frozen: false,
                daily_high: dec("0.0550"),
                daily_low: dec("0.0490"),
            })
        );
    }

    #[test]
    fn ticker_with_numeric_pair_id() {
        let frame = decode(
            r#"[1002, null, [121, 9000.5, "9001", "9000", -0.02, "10", "0.1", 1, "9100", "8900"]]"#,
        )
        .unwrap();
        let Frame::Ticker(ticker) = frame else {
            panic!("expected ticker");
        };
        assert_eq!(ticker.pair, "USDT_BTC");
        assert_eq!(ticker.pair_id, Some(121));
        assert_eq!(ticker.last, dec("9000.5"));
        assert_eq!(ticker.percent_change, dec("-2"));
        assert!(ticker.is_frozen);
    }

    #[test_case("\"148\"", "BTC_ETH", 148 ; "text id")]
    #[test_case("\" 121 \"", "USDT_BTC", 121 ; "padded text id")]
    #[test_case("\"BTC_ETH\"", "BTC_ETH", 148 ; "market name")]
    fn ticker_pair_field_forms(pair_field: &str, pair: &str, pair_id: u32) {
        let frame = decode(&format!(
            r#"[1002, null, [{pair_field},"0.0512","0.0513","0.0511","0.015","120.5","6170.2",0,"0.0550","0.0490"]]"#
        ))
        .unwrap();
        let Frame::Ticker(ticker) = frame else {
            panic!("expected ticker");
        };
        assert_eq!(ticker.pair, pair);
        assert_eq!(ticker.pair_id, Some(pair_id));
    }

    #[test]
    fn ticker_for_unlisted_text_id_is_ignored() {
        assert_eq!(
            decode(r#"[1002, null, ["7", "1", "1", "1", "0", "1", "1", 0, "1", "1"]]"#).unwrap(),
            Frame::Ignored {
                channel: ChannelId::TICKER
            }
        );
    }

    #[test]
    fn ticker_with_unparseable_field_uses_sentinel() {
        let frame = decode(
            r#"[1002, null, ["BTC_ETH","oops","0.0513","0.0511","0.015","120.5","6170.2",0,"0.0550","0.0490"]]"#,
        )
        .unwrap();
        let Frame::Ticker(ticker) = frame else {
            panic!("expected ticker");
        };
        assert_eq!(ticker.last, Decimal::MAX);
        assert_eq!(ticker.ask, dec("0.0513"));
    }

    #[test]
    fn short_ticker_is_protocol_error() {
        assert!(matches!(
            decode(r#"[1002, null, ["BTC_ETH","0.0512"]]"#),
            Err(ProtocolError::InvalidPayload { channel: 1002, .. })
        ));
    }

    #[test]
    fn ticker_for_unlisted_market_id_is_ignored() {
        assert_eq!(
            decode(r#"[1002, null, [7, "1", "1", "1", "0", "1", "1", 0, "1", "1"]]"#).unwrap(),
            Frame::Ignored {
                channel: ChannelId::TICKER
            }
        );
    }

    #[test]
    fn bid_removal() {
        let update = market(r#"[148, 10, [["o", 1, "0.05", "0"]]]"#);
        let delta = update.deltas().next().unwrap();

        assert_eq!(delta.side, BookSide::Bid);
        assert_eq!(delta.rate, dec("0.05"));
        assert_eq!(delta.kind, DeltaKind::Remove);
        assert!(delta.amount.is_zero());
        assert_eq!(delta.sequence, Some(10));
    }

    #[test]
    fn ask_modify() {
        let update = market(r#"[148, 10, [["o", 0, "0.05", "1.2"]]]"#);
        let delta = update.deltas().next().unwrap();

        assert_eq!(delta.side, BookSide::Ask);
        assert_eq!(delta.kind, DeltaKind::Modify);
        assert_eq!(delta.amount, dec("1.2"));
    }

    #[test]
    fn trade_record() {
        let update = market(r#"[148, 11, [["t", 1, "0.05", "2", 987654, 1500000000]]]"#);
        let trade = update.trades().next().unwrap();

        assert_eq!(trade.pair, "BTC_ETH");
        assert_eq!(trade.side, TradeSide::Buy);
        assert_eq!(trade.trade_id, 987_654);
        assert_eq!(trade.total, dec("0.10"));
        assert_eq!(trade.trade_time.timestamp(), 1_500_000_000);
    }

    #[test]
    fn trade_record_with_leading_id() {
        let update = market(r#"[148, 11, [["t", "42", 0, "0.05", "3", 1500000000]]]"#);
        let trade = update.trades().next().unwrap();

        assert_eq!(trade.trade_id, 42);
        assert_eq!(trade.side, TradeSide::Sell);
        assert_eq!(trade.amount, dec("3"));
        assert_eq!(trade.total, dec("0.15"));
    }

    #[test_case(r#"["t", "0", "1", "5", 987, 1500000000]"# ; "text side and unit rate")]
    #[test_case(r#"["t", "0", "1.0", "5", "987", 1500000000]"# ; "text fields throughout")]
    fn trade_with_text_side_keeps_documented_layout(record: &str) {
        let update = market(&format!("[148, 11, [{record}]]"));
        let trade = update.trades().next().unwrap();

        assert_eq!(trade.side, TradeSide::Sell);
        assert_eq!(trade.rate, dec("1"));
        assert_eq!(trade.amount, dec("5"));
        assert_eq!(trade.trade_id, 987);
        assert_eq!(trade.trade_time.timestamp(), 1_500_000_000);
    }

    #[test]
    fn records_keep_wire_order_and_skip_unknown_tags() {
        let update = market(
            r#"[148, 12, [["i", {"currencyPair": "BTC_ETH"}], ["o", 0, "1", "1"], ["x", 1], ["t", 0, "1", "1", 1, 1], ["o", 1, "2", "0"]]]"#,
        );

        assert!(update.initial);
        let kinds: Vec<_> = update.events.iter().map(FeedEvent::kind).collect();
        assert_eq!(
            kinds,
            vec![
                crate::domain::streaming::EventKind::OrderBook,
                crate::domain::streaming::EventKind::Trade,
                crate::domain::streaming::EventKind::OrderBook,
            ]
        );
    }

    #[test]
    fn invalid_side_skips_only_that_record() {
        let update = market(r#"[148, 13, [["o", 7, "1", "1"], ["o", 1, "1", "1"]]]"#);
        assert_eq!(update.deltas().count(), 1);
    }

    #[test]
    fn market_frame_without_sequence() {
        let update = market(r#"[148, [["o", 1, "1", "1"]]]"#);
        assert_eq!(update.sequence, None);
        assert!(!update.sequence_unreadable);
        assert_eq!(update.deltas().count(), 1);
    }

    #[test_case("\"abc\"" ; "text")]
    #[test_case("-1" ; "negative")]
    #[test_case("1.5" ; "fractional")]
    fn unreadable_sequence_is_flagged(sequence: &str) {
        let update = market(&format!(r#"[148, {sequence}, [["o", 1, "1", "1"]]]"#));
        assert_eq!(update.sequence, None);
        assert!(update.sequence_unreadable);
        assert_eq!(update.deltas().count(), 1);
    }

    #[test_case("[4242, 1, [[\"o\", 1, \"1\", \"1\"]]]", 4242 ; "unhandled service range")]
    #[test_case("[999, 1, [[\"o\", 1, \"1\", \"1\"]]]", 999 ; "unlisted market")]
    fn unknown_channel_is_ignored(text: &str, channel: u32) {
        assert_eq!(
            decode(text).unwrap(),
            Frame::Ignored {
                channel: ChannelId(channel)
            }
        );
    }

    #[test]
    fn control_frames() {
        assert_eq!(decode("[1010]").unwrap(), Frame::Heartbeat);
        assert_eq!(
            decode("[1002, 1]").unwrap(),
            Frame::Acknowledgement {
                channel: ChannelId::TICKER,
                subscribed: true
            }
        );
        assert_eq!(
            decode("[148, 0]").unwrap(),
            Frame::Acknowledgement {
                channel: ChannelId(148),
                subscribed: false
            }
        );
    }

    #[test]
    fn chat_frame() {
        assert_eq!(
            decode(r#"[1001, 2441, "satoshi", "hello", 1500]"#).unwrap(),
            Frame::Chat(ChatMessage {
                sequence: Some(2441),
                username: "satoshi".to_string(),
                message: "hello".to_string(),
                reputation: 1500,
            })
        );
        assert!(decode(r#"[1001, 2441, 5]"#).is_err());
    }

    #[test_case("{\"a\": 1}" ; "object")]
    #[test_case("[]" ; "empty")]
    #[test_case("[\"ticker\", 1]" ; "non numeric channel")]
    #[test_case("not json" ; "garbage")]
    #[test_case("[148, 1, {\"o\": 1}]" ; "records not array")]
    fn malformed_frames(text: &str) {
        assert!(decode(text).is_err());
    }

    fn decimal_strategy() -> impl Strategy<Value = Decimal> {
        (any::<i32>(), 0u32..9).prop_map(|(m, s)| Decimal::new(i64::from(m), s))
    }

    proptest! {
        #[test]
        fn ticker_round_trip(
            last in decimal_strategy(),
            ask in decimal_strategy(),
            bid in decimal_strategy(),
            percent in decimal_strategy(),
            base_volume in decimal_strategy(),
            quote_volume in decimal_strategy(),
            is_frozen in any::<bool>(),
            daily_high in decimal_strategy(),
            daily_low in decimal_strategy(),
        ) {
            let ticker = TickerEvent {
                pair: "BTC_ETH".to_string(),
                pair_id: Some(148),
                last,
                ask,
                bid,
                percent_change: percent,
                base_volume,
                quote_volume,
                is_frozen,
                daily_high,
                daily_low,
            };

            let decoded = decode(&encode_ticker(&ticker)).unwrap();
            prop_assert_eq!(decoded, Frame::Ticker(ticker));
        }
    }
}

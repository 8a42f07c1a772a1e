//! Snapshot cache for incrementally updated message types.
//!
//! After an initial snapshot the feed sends only the fields that changed.
//! Quote and greeks messages are merged into the last known state for their
//! symbol so every message delivered to a consumer is complete. Each type
//! has its own partition; a quote never overlays a greeks entry.

use ahash::AHashMap;
use nx_core::{DecodedMessage, MessageType};

/// Overlay `incoming` on `cached`. Fields present in `incoming` win,
/// including the header (type, symbol, precision, receive time).
pub fn merge(cached: &DecodedMessage, incoming: &DecodedMessage) -> DecodedMessage {
    let mut merged = cached.clone();
    merged.msg_type = incoming.msg_type;
    if incoming.symbol.is_some() {
        merged.symbol.clone_from(&incoming.symbol);
    }
    if incoming.precision.is_some() {
        merged.precision = incoming.precision;
    }
    merged.local_time_us = incoming.local_time_us;
    merged
        .fields
        .extend(incoming.fields.iter().map(|(k, v)| (*k, v.clone())));
    merged
}

/// Last merged state per symbol, partitioned by message type.
#[derive(Debug, Default)]
pub struct SnapshotCache {
    quotes: AHashMap<String, DecodedMessage>,
    greeks: AHashMap<String, DecodedMessage>,
}

impl SnapshotCache {
    pub fn new() -> Self {
        Self::default()
    }

    fn partition(&self, msg_type: MessageType) -> Option<&AHashMap<String, DecodedMessage>> {
        match msg_type {
            MessageType::Quote => Some(&self.quotes),
            MessageType::Greeks => Some(&self.greeks),
            _ => None,
        }
    }

    fn partition_mut(
        &mut self,
        msg_type: MessageType,
    ) -> Option<&mut AHashMap<String, DecodedMessage>> {
        match msg_type {
            MessageType::Quote => Some(&mut self.quotes),
            MessageType::Greeks => Some(&mut self.greeks),
            _ => None,
        }
    }

    /// Merge a decoded message into the cache and return what the consumer
    /// should see. Uncached types and messages without a symbol pass
    /// through untouched.
    pub fn apply(&mut self, msg: DecodedMessage) -> DecodedMessage {
        let Some(symbol) = msg.symbol.as_deref() else {
            return msg;
        };
        let Some(partition) = self.partition_mut(msg.msg_type) else {
            return msg;
        };

        match partition.get_mut(symbol) {
            Some(cached) => {
                let merged = merge(cached, &msg);
                cached.clone_from(&merged);
                merged
            }
            None => {
                partition.insert(symbol.to_string(), msg.clone());
                msg
            }
        }
    }

    /// Current merged state for a symbol.
    pub fn get(&self, msg_type: MessageType, symbol: &str) -> Option<&DecodedMessage> {
        self.partition(msg_type)?.get(symbol)
    }

    /// Drop every entry of one message type.
    pub fn clear_type(&mut self, msg_type: MessageType) {
        if let Some(p) = self.partition_mut(msg_type) {
            p.clear();
        }
    }

    pub fn clear(&mut self) {
        self.quotes.clear();
        self.greeks.clear();
    }

    pub fn len(&self) -> usize {
        self.quotes.len() + self.greeks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

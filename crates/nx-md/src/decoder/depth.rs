//! Depth (L5) packets.
//!
//! After `nDepth = n` the body carries `(price, qty, no)` triplets: the
//! first `n` complete triplets are bids, every later one is an ask. Fields
//! outside the ladder (identity, total quantities) go to the top level.

use nx_core::{DepthLevel, DecodedMessage, FieldValue, MessageType};

use super::quote::{Instrument, Segment, scale};
use super::reader::{RawValue, TagReader};
use super::{DecodeError, DecodeOptions};
use crate::field_spec::FieldRole;

/// A level whose triplet is still being filled.
#[derive(Debug, Default)]
struct PartialLevel {
    price: Option<i64>,
    qty: Option<u32>,
    orders: Option<u32>,
}

impl PartialLevel {
    fn is_empty(&self) -> bool {
        self.price.is_none() && self.qty.is_none() && self.orders.is_none()
    }

    /// Set one slot. Returns the raw level once all three are present.
    fn set(&mut self, key: &str, v: i64) -> Result<Option<(i64, u32, u32)>, DecodeError> {
        let slot_taken = match key {
            "price" => self.price.replace(v).is_some(),
            "qty" => self.qty.replace(v as u32).is_some(),
            _ => self.orders.replace(v as u32).is_some(),
        };
        if slot_taken {
            return Err(DecodeError::LadderIncomplete);
        }
        match (self.price, self.qty, self.orders) {
            (Some(p), Some(q), Some(n)) => {
                *self = Self::default();
                Ok(Some((p, q, n)))
            }
            _ => Ok(None),
        }
    }
}

#[derive(Debug)]
struct Ladder {
    declared: usize,
    bids: Vec<(i64, u32, u32)>,
    asks: Vec<(i64, u32, u32)>,
    partial: PartialLevel,
}

impl Ladder {
    fn new(declared: usize) -> Self {
        Self {
            declared,
            bids: Vec::with_capacity(declared),
            asks: Vec::with_capacity(declared),
            partial: PartialLevel::default(),
        }
    }

    fn push(&mut self, level: (i64, u32, u32)) {
        if self.bids.len() < self.declared {
            self.bids.push(level);
        } else {
            self.asks.push(level);
        }
    }

    fn finish(self, segment: Segment, msg: &mut DecodedMessage) -> Result<(), DecodeError> {
        if !self.partial.is_empty() {
            return Err(DecodeError::LadderIncomplete);
        }
        if self.bids.len() < self.declared {
            return Err(DecodeError::LadderShort {
                declared: self.declared,
                bids: self.bids.len(),
            });
        }
        let levels = |side: Vec<(i64, u32, u32)>| -> Vec<DepthLevel> {
            side.into_iter()
                .map(|(price, qty, orders)| DepthLevel {
                    price: scale(segment, price).as_f64().unwrap_or_default(),
                    qty,
                    orders,
                })
                .collect()
        };
        msg.insert("bid", FieldValue::Levels(levels(self.bids)));
        msg.insert("ask", FieldValue::Levels(levels(self.asks)));
        Ok(())
    }
}

pub(super) fn decode(body: &[u8], opts: &DecodeOptions) -> Result<DecodedMessage, DecodeError> {
    let mut reader = TagReader::new(MessageType::Depth, body);
    let mut inst = Instrument::new(MessageType::Depth);
    let mut ladder: Option<Ladder> = None;

    while let Some(field) = reader.next_field(None) {
        let (spec, value) = field?;

        if spec.role == FieldRole::LevelCount {
            let n = value.as_int().unwrap_or_default().max(0) as usize;
            ladder = Some(Ladder::new(n));
            continue;
        }

        if let Some(ladder) = ladder.as_mut() {
            if matches!(spec.key, "price" | "qty" | "no") {
                if let RawValue::Int(v) = value {
                    if let Some(level) = ladder.partial.set(spec.key, v)? {
                        ladder.push(level);
                    }
                }
                continue;
            }
        }

        inst.accept(spec, value, opts)?;
    }

    let segment = inst.segment();
    let mut msg = inst.finish()?;
    if let (Some(ladder), Some(segment)) = (ladder, segment) {
        ladder.finish(segment, &mut msg)?;
    }
    Ok(msg)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decoder::testutil::Body;

    fn level(body: Body, bid: bool, price: i32, qty: u32, orders: u32) -> Body {
        let base = if bid { 49 } else { 52 };
        body.i32(base, price).u32(base + 1, qty).u32(base + 2, orders)
    }

    #[test]
    fn three_level_ladder() {
        let mut body = Body::new().u8(26, 1).i32(27, 2885).u8(55, 3).u32(47, 500);
        for i in 0..3 {
            body = level(body, true, 100_000 - i * 5, 10 + i as u32, 1);
        }
        for i in 0..3 {
            body = level(body, false, 100_005 + i * 5, 20 + i as u32, 2);
        }
        body = body.u32(48, 700);

        let msg = decode(&body.0, &DecodeOptions::default()).unwrap();
        assert_eq!(msg.symbol.as_deref(), Some("2885_NSE"));
        assert_eq!(msg.bids().len(), 3);
        assert_eq!(msg.asks().len(), 3);
        assert_eq!(msg.bids()[0].price, 1000.0);
        assert_eq!(msg.bids()[2].qty, 12);
        assert_eq!(msg.asks()[0].price, 1000.05);
        assert_eq!(msg.asks()[1].orders, 2);
        assert_eq!(msg.get_i64("totBuyQty"), Some(500));
        assert_eq!(msg.get_i64("totSellQty"), Some(700));
    }

    #[test]
    fn fewer_bids_than_declared() {
        let mut body = Body::new().u8(26, 1).i32(27, 1).u8(55, 2);
        body = level(body, true, 100, 1, 1);
        assert_eq!(
            decode(&body.0, &DecodeOptions::default()).unwrap_err(),
            DecodeError::LadderShort {
                declared: 2,
                bids: 1
            }
        );
    }

    #[test]
    fn asks_past_the_declared_count_are_kept() {
        let mut body = Body::new().u8(26, 1).i32(27, 1).u8(55, 1);
        body = level(body, true, 100, 1, 1);
        body = level(body, false, 105, 2, 1);
        body = level(body, false, 110, 3, 1);
        let msg = decode(&body.0, &DecodeOptions::default()).unwrap();
        assert_eq!(msg.bids().len(), 1);
        assert_eq!(msg.asks().len(), 2);
        assert_eq!(msg.asks()[1].price, 1.1);
        assert_eq!(msg.asks()[1].qty, 3);
    }

    #[test]
    fn zero_depth_puts_every_level_on_the_ask_side() {
        let mut body = Body::new().u8(26, 1).i32(27, 1).u8(55, 0);
        body = level(body, false, 200, 5, 2);
        body = level(body, false, 205, 6, 3);
        let msg = decode(&body.0, &DecodeOptions::default()).unwrap();
        assert!(msg.bids().is_empty());
        assert_eq!(msg.asks().len(), 2);
        assert_eq!(msg.asks()[0].price, 2.0);
        assert_eq!(msg.asks()[1].orders, 3);
    }

    #[test]
    fn partial_triplet() {
        let body = Body::new().u8(26, 1).i32(27, 1).u8(55, 1).i32(49, 100).u32(50, 1);
        assert_eq!(
            decode(&body.0, &DecodeOptions::default()).unwrap_err(),
            DecodeError::LadderIncomplete
        );
    }

    #[test]
    fn one_sided_book() {
        // Bids complete, no asks yet.
        let mut body = Body::new().u8(26, 1).i32(27, 1).u8(55, 1);
        body = level(body, true, 250, 4, 1);
        let msg = decode(&body.0, &DecodeOptions::default()).unwrap();
        assert_eq!(msg.bids().len(), 1);
        assert!(msg.asks().is_empty());
    }

    #[test]
    fn no_ladder_means_top_level_only() {
        let body = Body::new().u8(26, 1).i32(27, 1).u32(47, 9);
        let msg = decode(&body.0, &DecodeOptions::default()).unwrap();
        assert!(!msg.contains("bid"));
        assert_eq!(msg.get_i64("totBuyQty"), Some(9));
    }
}

//! Frame-to-message pipeline.
//!
//! [`FeedDecoder`] owns everything the receive path needs between a raw
//! binary frame and the consumer: envelope parsing, decompression,
//! sub-packet decoding, receive stamping and the snapshot cache. Nothing
//! here touches the network, so the whole path is testable from bytes.
//!
//! Every failure is contained. A bad frame yields no messages; a bad
//! sub-packet yields nothing for itself but the rest of the frame still
//! decodes unless the failure left the payload unframeable.

use nx_core::DecodedMessage;
use nx_core::time_util::now_us;
use tracing::{debug, warn};

use crate::cache::SnapshotCache;
use crate::decoder::{DecodeError, DecodeOptions, decode_packet};
use crate::frame::{RawFrame, SubPackets};

/// Receive-path counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DecodeStats {
    pub frames: u64,
    pub bytes: u64,
    pub messages: u64,
    pub dropped_frames: u64,
    pub dropped_packets: u64,
}

/// Stateful decoder for one stream.
#[derive(Debug, Default)]
pub struct FeedDecoder {
    options: DecodeOptions,
    cache: SnapshotCache,
    stats: DecodeStats,
}

impl FeedDecoder {
    pub fn new(options: DecodeOptions) -> Self {
        Self {
            options,
            cache: SnapshotCache::new(),
            stats: DecodeStats::default(),
        }
    }

    /// Decode one binary frame into consumer-ready messages, in wire order.
    pub fn on_frame(&mut self, data: &[u8]) -> Vec<DecodedMessage> {
        self.stats.frames += 1;
        self.stats.bytes += data.len() as u64;

        let payload = match RawFrame::parse(data).and_then(|f| f.decompressed()) {
            Ok(p) => p,
            Err(e) => {
                self.stats.dropped_frames += 1;
                warn!(error = %e, len = data.len(), "dropping frame");
                return Vec::new();
            }
        };

        let received_at = now_us();
        let mut out = Vec::new();

        for item in SubPackets::new(&payload) {
            let decoded = item.and_then(|packet| decode_packet(&packet, &self.options));
            match decoded {
                Ok(mut msg) => {
                    msg.local_time_us = received_at;
                    out.push(self.cache.apply(msg));
                }
                Err(e) => self.on_packet_error(&e),
            }
        }

        self.stats.messages += out.len() as u64;
        out
    }

    fn on_packet_error(&mut self, e: &DecodeError) {
        self.stats.dropped_packets += 1;
        match e {
            DecodeError::UnknownPacketType(code) => {
                debug!(code, "skipping unknown packet type");
            }
            e if e.is_frame_fatal() => {
                warn!(error = %e, "rest of frame discarded");
            }
            e => warn!(error = %e, "dropping sub-packet"),
        }
    }

    pub fn options(&self) -> DecodeOptions {
        self.options
    }

    pub fn cache(&self) -> &SnapshotCache {
        &self.cache
    }

    pub fn cache_mut(&mut self) -> &mut SnapshotCache {
        &mut self.cache
    }

    pub fn stats(&self) -> DecodeStats {
        self.stats
    }
}

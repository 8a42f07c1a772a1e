//! Exchange segment scaling table.
//!
//! Prices travel on the wire as scaled integers. The exchange segment of the
//! instrument decides the divisor that turns them back into decimals, and
//! the number of decimals a consumer should display.

use std::fmt;

/// Scaling information for one exchange segment.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SegmentInfo {
    /// Wire code (1–10).
    pub code: u8,
    /// Display name, also the suffix of every `token_segment` symbol.
    pub name: &'static str,
    /// Decimal places for display.
    pub precision: u8,
    /// Divisor applied to price-shaped integers.
    pub divisor: f64,
}

impl SegmentInfo {
    /// Scale a raw wire integer into a decimal price.
    #[inline]
    pub fn scale(&self, raw: i64) -> f64 {
        raw as f64 / self.divisor
    }
}

impl fmt::Display for SegmentInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name)
    }
}

const fn seg(code: u8, name: &'static str, precision: u8, divisor: f64) -> SegmentInfo {
    SegmentInfo {
        code,
        name,
        precision,
        divisor,
    }
}

/// All segments the feed publishes, indexed by `code - 1`.
pub const SEGMENTS: [SegmentInfo; 10] = [
    seg(1, "NSE", 2, 100.0),
    seg(2, "BSE", 2, 100.0),
    seg(3, "NFO", 2, 100.0),
    seg(4, "BFO", 2, 100.0),
    seg(5, "CDS", 4, 10_000_000.0),
    seg(6, "BCD", 4, 10_000.0),
    seg(7, "MCD", 4, 10_000.0),
    seg(8, "MCX", 2, 100.0),
    seg(9, "NCO", 2, 10_000.0),
    seg(10, "BCO", 2, 10_000.0),
];

/// Resolve a wire segment code. Returns `None` for codes outside 1–10.
#[inline]
pub fn segment_info(code: u8) -> Option<&'static SegmentInfo> {
    let idx = (code as usize).checked_sub(1)?;
    SEGMENTS.get(idx)
}

/// Build the external `token_segment` identifier (e.g. `"-1_NSE"`).
#[inline]
pub fn make_symbol(token: i64, segment_name: &str) -> String {
    format!("{token}_{segment_name}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lookup_by_code() {
        let bse = segment_info(2).unwrap();
        assert_eq!(bse.name, "BSE");
        assert_eq!(bse.precision, 2);
        assert!((bse.divisor - 100.0).abs() < f64::EPSILON);

        let mcd = segment_info(7).unwrap();
        assert_eq!(mcd.name, "MCD");
        assert_eq!(mcd.precision, 4);
    }

    #[test]
    fn unknown_codes() {
        assert!(segment_info(0).is_none());
        assert!(segment_info(11).is_none());
        assert!(segment_info(255).is_none());
    }

    #[test]
    fn codes_match_positions() {
        for (i, s) in SEGMENTS.iter().enumerate() {
            assert_eq!(s.code as usize, i + 1);
        }
    }

    #[test]
    fn scale_price() {
        let bse = segment_info(2).unwrap();
        assert!((bse.scale(8_392_055) - 83_920.55).abs() < 1e-9);
        let cds = segment_info(5).unwrap();
        assert!((cds.scale(832_512_500) - 83.25125).abs() < 1e-9);
    }

    #[test]
    fn symbol_format() {
        assert_eq!(make_symbol(-1, "NSE"), "-1_NSE");
        assert_eq!(make_symbol(2885, segment_info(3).unwrap().name), "2885_NFO");
    }
}

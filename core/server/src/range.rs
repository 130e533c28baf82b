//! HTTP Range header parsing.
//!
//! Only the single-range `bytes=<start>-<end>` form is supported. A
//! multi-range header is not an error: the first range expression is
//! served and the rest are ignored, which is an accepted simplification
//! rather than incorrect multipart framing.

use vidvault_common::{Error, Result};

/// An inclusive byte span of a resource, `0 <= start <= end < size`.
///
/// Created per request from the Range header and consumed immediately.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ByteRange {
    pub start: u64,
    pub end: u64,
}

impl ByteRange {
    /// Parse a Range header against a body of `size` bytes.
    ///
    /// `start` is required; `end` is optional and defaults to
    /// `size - 1`.
    ///
    /// # Errors
    /// - `InvalidRange` (HTTP 416) when the header is malformed,
    ///   `start > end`, or `end >= size`
    pub fn parse(header: &str, size: u64) -> Result<Self> {
        let ranges = header
            .strip_prefix("bytes=")
            .ok_or_else(|| Error::InvalidRange(format!("unsupported range unit: {}", header)))?;

        // First range expression only.
        let first = ranges.split(',').next().unwrap_or("").trim();
        let (start_str, end_str) = first
            .split_once('-')
            .ok_or_else(|| Error::InvalidRange(format!("malformed range: {}", header)))?;

        let start: u64 = start_str
            .trim()
            .parse()
            .map_err(|_| Error::InvalidRange(format!("range start required: {}", header)))?;

        let end: u64 = match end_str.trim() {
            "" => size
                .checked_sub(1)
                .ok_or_else(|| Error::InvalidRange("empty body is not rangeable".to_string()))?,
            s => s
                .parse()
                .map_err(|_| Error::InvalidRange(format!("malformed range end: {}", header)))?,
        };

        if start > end || end >= size {
            return Err(Error::InvalidRange(format!(
                "bytes {}-{} not satisfiable for size {}",
                start, end, size
            )));
        }

        Ok(Self { start, end })
    }

    /// Number of bytes in the span. Never zero: the bounds are
    /// inclusive.
    pub fn len(&self) -> u64 {
        self.end - self.start + 1
    }
}

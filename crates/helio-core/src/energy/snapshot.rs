//! Durable text snapshot of one accumulator's day.
//!
//! One bucket per line, 24 lines, the hour implied by the line number. The
//! format is deliberately forgiving on the way in: the storage medium is not
//! always mountable and a torn write after an unclean power loss is expected,
//! so an empty, truncated or garbled payload decodes to a usable (partially
//! zeroed) day instead of an error. The worst outcome of any damage is a gap
//! in the chart, never a refusal to start.

use core::fmt::{self, Write};

use crate::storage::RecordText;

use super::HOURS_PER_DAY;

/// Render the bucket array as record text.
///
/// Stable and human-inspectable; three decimals is well inside the tolerance
/// of the source data. The only possible failure is overflowing the record
/// buffer, which the persistence layer absorbs like any other write problem.
pub fn encode(buckets: &[f32; HOURS_PER_DAY]) -> Result<RecordText, fmt::Error> {
    let mut text = RecordText::new();
    for value in buckets {
        writeln!(text, "{value:.3}")?;
    }
    Ok(text)
}

/// Parse record text back into a bucket array. Never fails.
///
/// Missing trailing lines stay zero, as do lines that fail to parse and
/// values a snapshot cannot legitimately contain (negative, NaN, infinite).
pub fn decode(text: &str) -> [f32; HOURS_PER_DAY] {
    let mut buckets = [0.0f32; HOURS_PER_DAY];
    for (slot, line) in buckets.iter_mut().zip(text.lines()) {
        if let Ok(value) = line.trim().parse::<f32>()
            && value.is_finite()
            && value > 0.0
        {
            *slot = value;
        }
    }
    buckets
}

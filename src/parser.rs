//! Parser capability: turn one dive's raw bytes into fields and samples.
//!
//! A parser is created per dive and borrows the dive bytes for its
//! lifetime. `set_data` walks the data once with no sample sink to prime
//! the field cache; `samples_foreach` replays the decode and streams
//! [`Sample`] values in time order.

use crate::error::Result;
use crate::types::{DiveDateTime, Field, FieldValue, Sample};

/// Sample callback invoked once per decoded sample.
pub type SampleCallback<'a> = dyn FnMut(Sample) + 'a;

/// Polymorphic handle over one dive's raw data.
pub trait Parser<'a> {
    /// Bind `data` and prime the field cache. Idempotent; a repeated call
    /// resets all parser state. On error the parser is left in a defined
    /// empty state where every field reads as `Unsupported`.
    fn set_data(&mut self, data: &'a [u8]) -> Result<()>;

    /// The dive's wall-clock start time. The timezone is unknown unless the
    /// format encodes one.
    fn datetime(&self) -> Result<DiveDateTime>;

    /// Retrieve a cached scalar or indexed value; `Unsupported` when the
    /// dive does not carry it.
    fn field(&self, field: Field) -> Result<FieldValue>;

    /// Replay the decode, delivering samples. A `Time` sample precedes all
    /// samples of the same instant, and time never decreases.
    fn samples_foreach(&mut self, callback: &mut SampleCallback<'_>) -> Result<()>;
}

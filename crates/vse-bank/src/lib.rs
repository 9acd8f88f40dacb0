//! Rolling memory bank of image/caption embedding pairs.
//!
//! Past batches are cached in a bounded circular buffer and later mined as an
//! additional pool of hard negatives. The buffer evicts oldest-first, keeps an
//! identity-to-slot index for O(1) membership tests, and hands out immutable
//! [`BankSnapshot`]s so a loss computation never observes a partial update.

pub mod bank;
pub mod error;
pub mod snapshot;

// Re-export commonly used types
pub use bank::{MemoryBank, MemoryBankConfig};
pub use error::{BankError, BankResult};
pub use snapshot::{exclusion_mask, BankSnapshot};

#[cfg(test)]
mod tests {
    use burn::backend::NdArray;

    pub type TestBackend = NdArray;
}

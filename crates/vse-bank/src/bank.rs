use std::collections::HashMap;

use burn::{
    config::Config,
    tensor::{backend::Backend, Tensor},
};

use crate::{
    error::{BankError, BankResult},
    snapshot::BankSnapshot,
};

/// Configuration for [`MemoryBank`].
#[derive(Config, Debug)]
pub struct MemoryBankConfig {
    /// Maximum number of rows the bank retains before evicting oldest-first.
    pub capacity: usize,
    /// Embedding dimension of the stored rows.
    pub embed_dim: usize,
}

impl MemoryBankConfig {
    /// Initialize an empty bank on the given device.
    ///
    /// # Panics
    /// Panics if `capacity` or `embed_dim` is zero.
    pub fn init<B: Backend>(&self, device: &B::Device) -> MemoryBank<B> {
        self.assertions();
        MemoryBank {
            images: Tensor::zeros([self.capacity, self.embed_dim], device),
            captions: Tensor::zeros([self.capacity, self.embed_dim], device),
            ids: vec![0; self.capacity],
            index: HashMap::new(),
            head: 0,
            len: 0,
        }
    }

    fn assertions(&self) {
        assert!(self.capacity >= 1, "Bank capacity must be at least 1");
        assert!(self.embed_dim >= 1, "Embedding dimension must be at least 1");
    }
}

/// Rolling cache of image/caption embedding pairs from past batches.
///
/// The bank is a bounded circular buffer: rows are written at a moving head
/// and the oldest rows are overwritten first once the buffer is full. An
/// identity-to-slot hash index keeps membership tests O(1). The training loop
/// owns the refresh policy (when to push); loss computations only ever read
/// an immutable [`BankSnapshot`].
#[derive(Debug)]
pub struct MemoryBank<B: Backend> {
    images: Tensor<B, 2>,
    captions: Tensor<B, 2>,
    ids: Vec<i64>,
    index: HashMap<i64, usize>,
    head: usize,
    len: usize,
}

impl<B: Backend> MemoryBank<B> {
    /// Appends a batch of rows, overwriting the oldest rows once full.
    ///
    /// Inputs are parallel: row i of `images`, row i of `captions` and
    /// `ids[i]` describe the same sample. Pushing more rows than the whole
    /// capacity keeps only the newest `capacity` of them.
    pub fn push(
        &mut self,
        images: Tensor<B, 2>,
        captions: Tensor<B, 2>,
        ids: &[i64],
    ) -> BankResult<()> {
        let [img_rows, img_dim] = images.dims();
        let [cap_rows, cap_dim] = captions.dims();
        if img_rows != cap_rows || img_rows != ids.len() {
            return Err(BankError::LengthMismatch {
                images: img_rows,
                captions: cap_rows,
                identities: ids.len(),
            });
        }
        let dim = self.embed_dim();
        if img_dim != dim {
            return Err(BankError::DimensionMismatch {
                expected: dim,
                actual: img_dim,
            });
        }
        if cap_dim != dim {
            return Err(BankError::DimensionMismatch {
                expected: dim,
                actual: cap_dim,
            });
        }

        let capacity = self.capacity();
        // Only the newest `capacity` rows of an oversized push can survive.
        let (images, captions, ids) = if img_rows > capacity {
            let skip = img_rows - capacity;
            (
                images.slice([skip..img_rows, 0..dim]),
                captions.slice([skip..img_rows, 0..dim]),
                &ids[skip..],
            )
        } else {
            (images, captions, ids)
        };

        // Write in contiguous runs, wrapping at the end of the buffer.
        let total = ids.len();
        let mut offset = 0;
        while offset < total {
            let slot = self.head;
            let run = (capacity - slot).min(total - offset);
            self.images = self.images.clone().slice_assign(
                [slot..slot + run, 0..dim],
                images.clone().slice([offset..offset + run, 0..dim]),
            );
            self.captions = self.captions.clone().slice_assign(
                [slot..slot + run, 0..dim],
                captions.clone().slice([offset..offset + run, 0..dim]),
            );
            for (i, &id) in ids[offset..offset + run].iter().enumerate() {
                let target = slot + i;
                if target < self.len {
                    // The slot was occupied. Drop the evicted identity from
                    // the index unless it has since been written elsewhere.
                    let evicted = self.ids[target];
                    if self.index.get(&evicted) == Some(&target) {
                        self.index.remove(&evicted);
                    }
                }
                self.ids[target] = id;
                self.index.insert(id, target);
            }
            self.head = (slot + run) % capacity;
            self.len = (self.len + run).min(capacity);
            offset += run;
        }
        Ok(())
    }

    /// Whether a sample identity is currently held in the bank.
    pub fn contains(&self, id: i64) -> bool {
        self.index.contains_key(&id)
    }

    /// Immutable copy of the live rows, or `None` while the bank is empty.
    ///
    /// The snapshot does not observe pushes made after it was taken.
    pub fn snapshot(&self) -> Option<BankSnapshot<B>> {
        (self.len > 0).then(|| {
            let dim = self.embed_dim();
            BankSnapshot::from_parts(
                self.images.clone().slice([0..self.len, 0..dim]),
                self.captions.clone().slice([0..self.len, 0..dim]),
                self.ids[..self.len].to_vec(),
            )
        })
    }

    /// Number of rows currently stored.
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Maximum number of rows the bank retains.
    pub fn capacity(&self) -> usize {
        self.ids.len()
    }

    /// Embedding dimension of the stored rows.
    pub fn embed_dim(&self) -> usize {
        self.images.dims()[1]
    }
}

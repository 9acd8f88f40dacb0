use std::collections::HashSet;

use burn::tensor::{backend::Backend, Tensor};

use crate::error::{BankError, BankResult};

/// Immutable view of the bank contents taken at a fixed point in time.
///
/// A snapshot is detached from the bank it came from: later pushes do not
/// show through it. Loss computations read exactly one snapshot per call, so
/// a concurrent refresh can never expose a partially updated bank.
#[derive(Debug, Clone)]
pub struct BankSnapshot<B: Backend> {
    images: Tensor<B, 2>,
    captions: Tensor<B, 2>,
    ids: Vec<i64>,
}

impl<B: Backend> BankSnapshot<B> {
    /// Builds a snapshot from parallel rows.
    ///
    /// The three inputs must agree in length and the two embedding matrices
    /// must share their second dimension. Callers that manage their own bank
    /// storage can use this directly instead of going through
    /// [`MemoryBank`](crate::MemoryBank).
    pub fn new(images: Tensor<B, 2>, captions: Tensor<B, 2>, ids: Vec<i64>) -> BankResult<Self> {
        let [img_rows, img_dim] = images.dims();
        let [cap_rows, cap_dim] = captions.dims();
        if img_rows != cap_rows || img_rows != ids.len() {
            return Err(BankError::LengthMismatch {
                images: img_rows,
                captions: cap_rows,
                identities: ids.len(),
            });
        }
        if img_dim != cap_dim {
            return Err(BankError::DimensionMismatch {
                expected: img_dim,
                actual: cap_dim,
            });
        }
        Ok(Self {
            images,
            captions,
            ids,
        })
    }

    /// Infallible constructor for rows the bank itself has already validated.
    pub(crate) fn from_parts(images: Tensor<B, 2>, captions: Tensor<B, 2>, ids: Vec<i64>) -> Self {
        Self {
            images,
            captions,
            ids,
        }
    }

    /// Stored image embeddings, `[len, embed_dim]`.
    pub fn images(&self) -> Tensor<B, 2> {
        self.images.clone()
    }

    /// Stored caption embeddings, `[len, embed_dim]`.
    pub fn captions(&self) -> Tensor<B, 2> {
        self.captions.clone()
    }

    /// Identities of the stored rows.
    pub fn ids(&self) -> &[i64] {
        &self.ids
    }

    /// Number of stored rows.
    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    /// Embedding dimension of the stored rows.
    pub fn embed_dim(&self) -> usize {
        self.images.dims()[1]
    }
}

/// Marks the bank rows usable as negatives against the given batch.
///
/// Returns `true` where the bank identity does not occur in `batch_ids`.
/// Rows sharing an identity with a current-batch sample are disguised
/// positives and must never be mined as negatives. The batch identities are
/// collected into a hash set once, so the whole mask costs O(M + B) rather
/// than O(M * B).
pub fn exclusion_mask(bank_ids: &[i64], batch_ids: &[i64]) -> Vec<bool> {
    let batch: HashSet<i64> = batch_ids.iter().copied().collect();
    bank_ids.iter().map(|id| !batch.contains(id)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tests::TestBackend;

    #[test]
    fn exclusion_mask_keeps_only_foreign_identities() {
        let mask = exclusion_mask(&[10, 11, 12, 13], &[11, 13, 99]);
        assert_eq!(mask, vec![true, false, true, false]);
    }

    #[test]
    fn exclusion_mask_with_disjoint_batch_keeps_everything() {
        let mask = exclusion_mask(&[1, 2, 3], &[7, 8]);
        assert_eq!(mask, vec![true, true, true]);
    }

    #[test]
    fn exclusion_mask_of_empty_bank_is_empty() {
        let mask = exclusion_mask(&[], &[1, 2]);
        assert!(mask.is_empty());
    }

    #[test]
    fn snapshot_rejects_mismatched_lengths() {
        let device = Default::default();
        let images = Tensor::<TestBackend, 2>::ones([3, 4], &device);
        let captions = Tensor::<TestBackend, 2>::ones([3, 4], &device);

        let result = BankSnapshot::new(images, captions, vec![1, 2]);
        assert!(matches!(result, Err(BankError::LengthMismatch { .. })));
    }

    #[test]
    fn snapshot_rejects_mismatched_embedding_dims() {
        let device = Default::default();
        let images = Tensor::<TestBackend, 2>::ones([2, 4], &device);
        let captions = Tensor::<TestBackend, 2>::ones([2, 5], &device);

        let result = BankSnapshot::new(images, captions, vec![1, 2]);
        assert!(matches!(
            result,
            Err(BankError::DimensionMismatch {
                expected: 4,
                actual: 5
            })
        ));
    }

    #[test]
    fn snapshot_reports_shape_accessors() {
        let device = Default::default();
        let images = Tensor::<TestBackend, 2>::ones([2, 8], &device);
        let captions = Tensor::<TestBackend, 2>::ones([2, 8], &device);

        let snapshot = BankSnapshot::new(images, captions, vec![5, 6]).unwrap();
        assert_eq!(snapshot.len(), 2);
        assert!(!snapshot.is_empty());
        assert_eq!(snapshot.embed_dim(), 8);
        assert_eq!(snapshot.ids(), &[5, 6]);
    }
}

//! Pairwise similarity scorers for image/caption embedding batches.
//!
//! Both scorers map a batch of image embeddings `[B1, D]` and a batch of
//! caption embeddings `[B2, D]` to a score matrix `[B1, B2]`:
//!
//! ```text
//! cosine(i, j) = a_i · c_j
//! order(i, j)  = -sqrt(sum_d(max(0, c_j[d] - a_i[d])^2))
//! ```
//!
//! Embeddings are unit-normalized upstream by convention, which makes the
//! plain dot product the cosine similarity.

use burn::{
    config::Config,
    tensor::{backend::Backend, Tensor, TensorData},
};

/// Similarity measure used to score image embeddings against caption
/// embeddings.
#[derive(Config, Debug, PartialEq, Eq)]
pub enum Similarity {
    /// Dot product of unit-normalized vectors. Range [-1, 1]; symmetric
    /// under swapping the two batches.
    Cosine,
    /// Order-embedding violation. Always non-positive; zero exactly when the
    /// image embedding dominates the caption embedding componentwise.
    /// Asymmetric; assumes a nonnegative coordinate convention.
    Order,
}

impl Similarity {
    /// Score every row of `a` against every row of `c`.
    ///
    /// # Shapes
    /// - `a`: `[B1, D]` (image embeddings)
    /// - `c`: `[B2, D]` (caption embeddings)
    /// - output: `[B1, B2]`
    pub fn score<B: Backend>(&self, a: Tensor<B, 2>, c: Tensor<B, 2>) -> Tensor<B, 2> {
        match self {
            Self::Cosine => cosine_sim(a, c),
            Self::Order => order_sim(a, c),
        }
    }
}

/// Cosine similarity matrix between two batches of unit-normalized rows.
pub fn cosine_sim<B: Backend>(a: Tensor<B, 2>, c: Tensor<B, 2>) -> Tensor<B, 2> {
    a.matmul(c.transpose())
}

/// Order-embedding violation matrix between two batches of rows.
///
/// Entry (i, j) is the negated L2 norm of the componentwise violation
/// `max(0, c_j - a_i)`, so a perfect order match scores 0 and larger
/// violations score more negative.
pub fn order_sim<B: Backend>(a: Tensor<B, 2>, c: Tensor<B, 2>) -> Tensor<B, 2> {
    // [1, B2, D] - [B1, 1, D] broadcasts to [B1, B2, D].
    let violation = (c.unsqueeze::<3>() - a.unsqueeze_dim::<3>(1)).clamp_min(0.0);
    violation
        .powf_scalar(2.0)
        .sum_dim(2)
        .sqrt()
        .squeeze::<2>(2)
        .neg()
}

/// L2-normalizes every row of `x`.
///
/// The norm is clamped away from zero so all-zero rows pass through
/// unchanged instead of producing NaN.
pub fn l2norm<B: Backend>(x: Tensor<B, 2>) -> Tensor<B, 2> {
    let norm = x
        .clone()
        .powf_scalar(2.0)
        .sum_dim(1)
        .sqrt()
        .clamp_min(1e-12);
    x / norm
}

/// Identity matrix in the backend's float type.
pub(crate) fn identity<B: Backend>(size: usize, device: &B::Device) -> Tensor<B, 2> {
    let mut diag = vec![0.0f32; size * size];
    for i in 0..size {
        diag[i * size + i] = 1.0;
    }
    Tensor::from_data(TensorData::new(diag, [size, size]), device)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tests::TestBackend;

    fn to_vec(tensor: Tensor<TestBackend, 2>) -> Vec<f32> {
        tensor.into_data().to_vec::<f32>().unwrap()
    }

    fn assert_close(actual: &[f32], expected: &[f32], tolerance: f32) {
        assert_eq!(actual.len(), expected.len());
        for (i, (a, e)) in actual.iter().zip(expected).enumerate() {
            assert!(
                (a - e).abs() < tolerance,
                "entry {i}: got {a}, expected {e}"
            );
        }
    }

    #[test]
    fn cosine_of_unit_basis_vectors_is_the_identity() {
        let device = Default::default();
        let images = Tensor::<TestBackend, 2>::from_floats([[1.0, 0.0], [0.0, 1.0]], &device);
        let captions = Tensor::<TestBackend, 2>::from_floats([[1.0, 0.0], [0.0, 1.0]], &device);

        let scores = cosine_sim(images, captions);

        assert_eq!(scores.dims(), [2, 2]);
        assert_close(&to_vec(scores), &[1.0, 0.0, 0.0, 1.0], 1e-6);
    }

    #[test]
    fn cosine_is_symmetric_under_argument_swap() {
        let device = Default::default();
        let a = Tensor::<TestBackend, 2>::from_floats(
            [[0.6, 0.8, 0.0], [0.0, 0.6, 0.8]],
            &device,
        );
        let c = Tensor::<TestBackend, 2>::from_floats(
            [[1.0, 0.0, 0.0], [0.0, 1.0, 0.0], [0.48, 0.6, 0.64]],
            &device,
        );

        let forward = Similarity::Cosine.score(a.clone(), c.clone());
        let swapped = Similarity::Cosine.score(c, a);

        assert_eq!(forward.dims(), [2, 3]);
        assert_eq!(swapped.dims(), [3, 2]);
        let forward = to_vec(forward);
        let swapped = to_vec(swapped);
        for i in 0..2 {
            for j in 0..3 {
                let lhs = forward[i * 3 + j];
                let rhs = swapped[j * 2 + i];
                assert!((lhs - rhs).abs() < 1e-6, "({i}, {j}): {lhs} vs {rhs}");
            }
        }
    }

    #[test]
    fn order_scores_are_never_positive() {
        let device = Default::default();
        let a = Tensor::<TestBackend, 2>::from_floats(
            [[0.2, 0.9, 0.1], [1.5, 0.3, 0.7]],
            &device,
        );
        let c = Tensor::<TestBackend, 2>::from_floats(
            [[0.4, 0.4, 0.4], [0.0, 2.0, 0.0], [1.0, 1.0, 1.0]],
            &device,
        );

        let scores = to_vec(order_sim(a, c));

        for (i, value) in scores.iter().enumerate() {
            assert!(value.is_finite(), "entry {i} is not finite");
            assert!(*value <= 0.0, "entry {i} is positive: {value}");
        }
    }

    #[test]
    fn order_score_is_zero_when_the_image_dominates() {
        let device = Default::default();
        let image = Tensor::<TestBackend, 2>::from_floats([[2.0, 2.0]], &device);
        let caption = Tensor::<TestBackend, 2>::from_floats([[1.0, 1.0]], &device);

        let dominated = to_vec(order_sim(image.clone(), caption.clone()));
        assert_close(&dominated, &[0.0], 1e-6);

        // Swapping the roles leaves a violation of 1 in each dimension.
        let violated = to_vec(order_sim(caption, image));
        assert_close(&violated, &[-std::f32::consts::SQRT_2], 1e-5);
    }

    #[test]
    fn l2norm_produces_unit_rows() {
        let device = Default::default();
        let x = Tensor::<TestBackend, 2>::from_floats([[3.0, 4.0], [0.0, 5.0]], &device);

        let normalized = to_vec(l2norm(x));

        assert_close(&normalized, &[0.6, 0.8, 0.0, 1.0], 1e-6);
    }

    #[test]
    fn l2norm_passes_zero_rows_through() {
        let device = Default::default();
        let x = Tensor::<TestBackend, 2>::from_floats([[0.0, 0.0], [1.0, 0.0]], &device);

        let normalized = to_vec(l2norm(x));

        assert!(normalized.iter().all(|v| v.is_finite()));
        assert_close(&normalized, &[0.0, 0.0, 1.0, 0.0], 1e-6);
    }

    #[test]
    fn identity_matrix_has_unit_diagonal() {
        let device = Default::default();
        let eye = identity::<TestBackend>(3, &device);

        assert_close(
            &to_vec(eye),
            &[1.0, 0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 1.0],
            1e-6,
        );
    }
}

use ndarray::{s, Array2, Array3};

use crate::error::EvaluationError;

/// Stacks label sequences of shape `(T_i, K)` into one `(N, max T_i, K)`
/// batch. Steps past an example's own length are zero.
///
/// `K` is taken from the first sequence; every other sequence must match it.
pub fn pad_labels(labels: &[Array2<f32>]) -> Result<Array3<f32>, EvaluationError> {
    let first = labels
        .first()
        .ok_or_else(|| EvaluationError::precondition("cannot pad an empty batch of label sequences"))?;
    let num_scales = first.ncols();

    let mut max_len = 0usize;
    for (index, label) in labels.iter().enumerate() {
        if label.ncols() != num_scales {
            return Err(EvaluationError::precondition(format!(
                "label sequence {index} has {} scales, expected {num_scales} (from sequence 0)",
                label.ncols()
            )));
        }
        max_len = max_len.max(label.nrows());
    }

    let mut padded = Array3::<f32>::zeros((labels.len(), max_len, num_scales));
    for (index, label) in labels.iter().enumerate() {
        padded
            .slice_mut(s![index, ..label.nrows(), ..])
            .assign(label);
    }
    Ok(padded)
}

/// Pads token sentences to the longest sentence in the batch with `pad`.
pub fn pad_tokens<T: Clone>(sentences: &[Vec<T>], pad: T) -> Result<Vec<Vec<T>>, EvaluationError> {
    let longest = sentences
        .iter()
        .map(Vec::len)
        .max()
        .ok_or_else(|| EvaluationError::precondition("cannot pad an empty batch of sentences"))?;

    Ok(sentences
        .iter()
        .map(|sentence| {
            let mut padded = Vec::with_capacity(longest);
            padded.extend_from_slice(sentence);
            padded.resize(longest, pad.clone());
            padded
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use ndarray::{arr2, Axis};
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    use super::*;

    #[test]
    fn pads_to_longest_sequence() {
        let labels = vec![
            arr2(&[[1.0f32, 0.0], [0.0, 1.0]]),
            arr2(&[[1.0f32, 1.0], [0.0, 0.0], [1.0, 0.0], [0.0, 1.0]]),
            arr2(&[[0.0f32, 1.0]]),
        ];
        let padded = pad_labels(&labels).unwrap();
        assert_eq!(padded.dim(), (3, 4, 2));
        assert_eq!(padded.slice(s![0, ..2, ..]), labels[0]);
        assert!(padded.slice(s![0, 2.., ..]).iter().all(|&v| v == 0.0));
        assert_eq!(padded.index_axis(Axis(0), 1), labels[1]);
        assert_eq!(padded.slice(s![2, ..1, ..]), labels[2]);
        assert!(padded.slice(s![2, 1.., ..]).iter().all(|&v| v == 0.0));
    }

    #[test]
    fn single_sequence_is_copied() {
        let label = arr2(&[[0.0f32, 1.0, 1.0], [1.0, 0.0, 0.0]]);
        let padded = pad_labels(std::slice::from_ref(&label)).unwrap();
        assert_eq!(padded.index_axis(Axis(0), 0), label);
    }

    #[test]
    fn empty_batch_is_rejected() {
        let err = pad_labels(&[]).unwrap_err();
        assert!(err.is_precondition_violation());
    }

    #[test]
    fn scale_mismatch_names_the_sequence() {
        let labels = vec![
            Array2::<f32>::zeros((3, 2)),
            Array2::<f32>::zeros((2, 2)),
            Array2::<f32>::zeros((5, 3)),
        ];
        let err = pad_labels(&labels).unwrap_err();
        assert!(err.to_string().contains("label sequence 2"));
    }

    #[test]
    fn random_batches_keep_content_and_zero_tail() {
        let mut rng = StdRng::seed_from_u64(3);
        for _ in 0..20 {
            let num_scales = rng.gen_range(1..5);
            let batch: Vec<Array2<f32>> = (0..rng.gen_range(1..6))
                .map(|_| {
                    let len = rng.gen_range(0..9);
                    Array2::from_shape_fn((len, num_scales), |_| {
                        if rng.gen_bool(0.3) {
                            1.0
                        } else {
                            0.0
                        }
                    })
                })
                .collect();
            let padded = pad_labels(&batch).unwrap();
            let max_len = batch.iter().map(|l| l.nrows()).max().unwrap();
            assert_eq!(padded.dim(), (batch.len(), max_len, num_scales));
            for (i, label) in batch.iter().enumerate() {
                let t_len = label.nrows();
                assert_eq!(padded.slice(s![i, ..t_len, ..]), label.view());
                assert!(padded.slice(s![i, t_len.., ..]).iter().all(|&v| v == 0.0));
            }
        }
    }

    #[test]
    fn pad_tokens_to_longest_sentence() {
        let sentences = vec![vec!["a", "man", "runs"], vec!["stop"], vec![]];
        let padded = pad_tokens(&sentences, "<pad>").unwrap();
        assert_eq!(
            padded,
            vec![
                vec!["a", "man", "runs"],
                vec!["stop", "<pad>", "<pad>"],
                vec!["<pad>", "<pad>", "<pad>"],
            ]
        );
        assert!(pad_tokens::<usize>(&[], 0).is_err());
    }
}

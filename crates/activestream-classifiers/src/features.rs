//! Sparse feature matrices and dimension alignment
//!
//! Records are vectorized against a vocabulary that keeps growing, so a
//! batch can hold rows wider than the model that scores it. Alignment keeps
//! the first `W` columns (the model's width) and treats missing trailing
//! columns as zero.

use activestream_core::{BagOfTerms, Record};

/// Row-major sparse matrix with an explicit column count
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureMatrix {
    width: usize,
    /// Per row: `(column, value)` sorted by column, all columns `< width`
    rows: Vec<Vec<(usize, f64)>>,
}

impl FeatureMatrix {
    /// Matrix with no rows
    pub fn empty(width: usize) -> Self {
        Self {
            width,
            rows: Vec::new(),
        }
    }

    /// Build rows from bags of terms, dropping columns at or beyond `width`
    pub fn from_bags<'a, I>(bags: I, width: usize) -> Self
    where
        I: IntoIterator<Item = &'a BagOfTerms>,
    {
        let rows = bags
            .into_iter()
            .map(|bag| {
                // BTreeMap iteration is ordered, so rows come out sorted
                bag.iter()
                    .map(|(&term, &count)| (term as usize, count as f64))
                    .filter(|&(column, value)| column < width && value != 0.0)
                    .collect()
            })
            .collect();
        Self { width, rows }
    }

    /// Align a classification batch to a model of width `model_width`.
    ///
    /// Rows are built at the widest of the model and every record's
    /// `vocab_size_at_extraction`, then columns the model never saw are
    /// truncated. Narrower rows are implicitly zero-padded.
    pub fn align_batch(records: &[Record], model_width: usize) -> Self {
        let batch_width = records
            .iter()
            .map(|r| r.vocab_size_at_extraction)
            .fold(model_width, usize::max);
        Self::from_bags(records.iter().map(|r| &r.bag), batch_width).truncate(model_width)
    }

    /// Keep only the first `width` columns
    pub fn truncate(mut self, width: usize) -> Self {
        if width < self.width {
            for row in &mut self.rows {
                row.retain(|&(column, _)| column < width);
            }
            self.width = width;
        }
        self
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn n_rows(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn row(&self, index: usize) -> &[(usize, f64)] {
        &self.rows[index]
    }

    pub fn rows(&self) -> impl Iterator<Item = &[(usize, f64)]> {
        self.rows.iter().map(Vec::as_slice)
    }

    /// Dense copy, mainly for inspection
    pub fn to_dense(&self) -> Vec<Vec<f64>> {
        self.rows
            .iter()
            .map(|row| {
                let mut dense = vec![0.0; self.width];
                for &(column, value) in row {
                    dense[column] = value;
                }
                dense
            })
            .collect()
    }
}

/// Dot product of a sparse row with dense weights
pub fn sparse_dot(row: &[(usize, f64)], weights: &[f64]) -> f64 {
    row.iter()
        .filter_map(|&(column, value)| weights.get(column).map(|w| w * value))
        .sum()
}

#[cfg(test)]
mod tests {
    use super::*;
    use activestream_core::Origin;
    use proptest::prelude::*;

    fn record(id: &str, bag: &[(u32, u32)], vocab_size: usize) -> Record {
        let mut record = Record::new(id, "", Origin::Tracked);
        record.bag = bag.iter().copied().collect();
        record.vocab_size_at_extraction = vocab_size;
        record
    }

    #[test]
    fn test_wider_record_is_truncated_to_model_width() {
        let records = vec![record("a", &[(0, 2), (1, 0), (3, 5)], 4)];
        let aligned = FeatureMatrix::align_batch(&records, 3);
        assert_eq!(aligned.width(), 3);
        assert_eq!(aligned.to_dense(), vec![vec![2.0, 0.0, 0.0]]);

        let weights = [0.2, -0.1, 0.4];
        assert!((sparse_dot(aligned.row(0), &weights) - 0.4).abs() < 1e-12);
    }

    #[test]
    fn test_narrower_record_is_zero_padded() {
        let records = vec![record("a", &[(0, 1), (1, 3)], 2), record("b", &[(4, 1)], 5)];
        let aligned = FeatureMatrix::align_batch(&records, 6);
        assert_eq!(
            aligned.to_dense(),
            vec![
                vec![1.0, 3.0, 0.0, 0.0, 0.0, 0.0],
                vec![0.0, 0.0, 0.0, 0.0, 1.0, 0.0]
            ]
        );
    }

    #[test]
    fn test_zero_width_model_sees_nothing() {
        let records = vec![record("a", &[(0, 1), (2, 1)], 3)];
        let aligned = FeatureMatrix::align_batch(&records, 0);
        assert_eq!(aligned.width(), 0);
        assert!(aligned.row(0).is_empty());
    }

    proptest! {
        #[test]
        fn prop_alignment_keeps_exactly_first_w_columns(
            entries in proptest::collection::btree_map(0u32..64, 1u32..5, 0..20),
            model_width in 0usize..64,
        ) {
            let vocab_size = entries.keys().next_back().map_or(0, |&t| t as usize + 1);
            let mut rec = Record::new("r", "", Origin::Tracked);
            rec.bag = entries.clone();
            rec.vocab_size_at_extraction = vocab_size;

            let aligned = FeatureMatrix::align_batch(std::slice::from_ref(&rec), model_width);
            prop_assert_eq!(aligned.width(), model_width);

            let dense = &aligned.to_dense()[0];
            for (column, value) in dense.iter().enumerate() {
                let expected = entries.get(&(column as u32)).copied().unwrap_or(0) as f64;
                prop_assert_eq!(*value, expected);
            }
        }
    }
}

//! Collaborator interfaces for the four ingestion shapes.
//!
//! The text parser, the sparse column iterator, and the row accessors are
//! external collaborators; the provider only depends on the traits here.

use ndarray::ArrayView2;

use crate::error::EncodingError;

/// A line-oriented row parser (text/CSV loader collaborator).
///
/// Reports the sparse `(feature, value)` pairs and the scalar label of one
/// decoded row.
pub trait RowParser {
    /// Parse one text line into `out_pairs` and `out_label`.
    ///
    /// # Errors
    ///
    /// [`EncodingError::Fatal`] on IO or syntax failures; a failed fit
    /// retains no partial state.
    fn parse_one_line(
        &self,
        line: &str,
        out_pairs: &mut Vec<(usize, f64)>,
        out_label: &mut f64,
        row_idx: usize,
    ) -> Result<(), EncodingError>;

    /// Number of feature columns this parser emits.
    fn num_features(&self) -> usize;
}

impl<P: RowParser + ?Sized> RowParser for Box<P> {
    fn parse_one_line(
        &self,
        line: &str,
        out_pairs: &mut Vec<(usize, f64)>,
        out_label: &mut f64,
        row_idx: usize,
    ) -> Result<(), EncodingError> {
        (**self).parse_one_line(line, out_pairs, out_label, row_idx)
    }

    fn num_features(&self) -> usize {
        (**self).num_features()
    }
}

/// A CSC column iterator (sparse matrix collaborator).
///
/// `next_non_zero` walks the stored non-zeros in row order; `None` marks the
/// end. `get` is random access including implicit zeros.
pub trait ColumnIterator {
    fn get(&mut self, row_idx: usize) -> f64;
    fn next_non_zero(&mut self) -> Option<(usize, f64)>;
    fn reset(&mut self);
}

/// Dense row access over one matrix.
pub trait RowAccessor: Sync {
    fn num_rows(&self) -> usize;
    /// Write row `row_idx` (all column values) into `out`.
    fn row_into(&self, row_idx: usize, out: &mut Vec<f64>);
}

/// Sparse (CSR) row access over one matrix.
pub trait SparseRowAccessor: Sync {
    fn num_rows(&self) -> usize;
    /// Write row `row_idx` as `(column, value)` pairs into `out`.
    fn row_into(&self, row_idx: usize, out: &mut Vec<(usize, f64)>);
}

/// Sample-major dense view: shape `[n_samples, n_features]`.
impl RowAccessor for ArrayView2<'_, f64> {
    fn num_rows(&self) -> usize {
        self.nrows()
    }

    fn row_into(&self, row_idx: usize, out: &mut Vec<f64>) {
        out.clear();
        out.extend(self.row(row_idx).iter().copied());
    }
}

impl RowAccessor for Vec<Vec<f64>> {
    fn num_rows(&self) -> usize {
        self.len()
    }

    fn row_into(&self, row_idx: usize, out: &mut Vec<f64>) {
        out.clear();
        out.extend_from_slice(&self[row_idx]);
    }
}

impl SparseRowAccessor for Vec<Vec<(usize, f64)>> {
    fn num_rows(&self) -> usize {
        self.len()
    }

    fn row_into(&self, row_idx: usize, out: &mut Vec<(usize, f64)>) {
        out.clear();
        out.extend_from_slice(&self[row_idx]);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn ndarray_row_accessor() {
        let m = array![[1.0, 2.0], [3.0, 4.0], [5.0, 6.0]];
        let view = m.view();
        assert_eq!(RowAccessor::num_rows(&view), 3);
        let mut out = Vec::new();
        view.row_into(1, &mut out);
        assert_eq!(out, vec![3.0, 4.0]);
    }

    #[test]
    fn vec_accessors() {
        let dense = vec![vec![1.0, 0.0], vec![0.0, 2.0]];
        let mut out = Vec::new();
        dense.row_into(1, &mut out);
        assert_eq!(out, vec![0.0, 2.0]);

        let sparse = vec![vec![(0, 1.0)], vec![(1, 2.0)]];
        let mut out = Vec::new();
        sparse.row_into(0, &mut out);
        assert_eq!(out, vec![(0, 1.0)]);
    }
}

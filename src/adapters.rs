//! Boundary adapters: encoded views over raw parsers and column iterators.
//!
//! These wrap a collaborator source so downstream consumers see already
//! encoded rows. They delegate to the inner source and then apply the
//! training or inference transform of a frozen provider.

use std::sync::Arc;

use crate::error::EncodingError;
use crate::input::{ColumnIterator, RowParser};
use crate::provider::EncodingProvider;

// =============================================================================
// Row parser adapter
// =============================================================================

/// A row parser that emits encoded rows.
///
/// Training mode applies the out-of-fold view using the parsed row index;
/// inference mode applies the all-folds view.
pub struct EncodingParser<P: RowParser> {
    inner: P,
    provider: Arc<EncodingProvider>,
    training: bool,
}

impl<P: RowParser> EncodingParser<P> {
    /// Wrap a parser for training data.
    ///
    /// # Errors
    ///
    /// [`EncodingError::UnsetPrior`] when the provider is not frozen.
    pub fn training(provider: Arc<EncodingProvider>, inner: P) -> Result<Self, EncodingError> {
        provider.require_frozen()?;
        Ok(Self {
            inner,
            provider,
            training: true,
        })
    }

    /// Wrap a parser for validation or inference data.
    ///
    /// # Errors
    ///
    /// [`EncodingError::UnsetPrior`] when the provider is not frozen.
    pub fn inference(provider: Arc<EncodingProvider>, inner: P) -> Result<Self, EncodingError> {
        provider.require_frozen()?;
        Ok(Self {
            inner,
            provider,
            training: false,
        })
    }
}

impl<P: RowParser> RowParser for EncodingParser<P> {
    fn parse_one_line(
        &self,
        line: &str,
        out_pairs: &mut Vec<(usize, f64)>,
        out_label: &mut f64,
        row_idx: usize,
    ) -> Result<(), EncodingError> {
        self.inner
            .parse_one_line(line, out_pairs, out_label, row_idx)?;
        if self.training {
            self.provider.transform_sparse_train(out_pairs, row_idx);
        } else {
            self.provider.transform_sparse_infer(out_pairs);
        }
        Ok(())
    }

    fn num_features(&self) -> usize {
        self.provider.num_total_features()
    }
}

// =============================================================================
// CSC column adapters
// =============================================================================

#[derive(Debug, Clone, Copy)]
enum Cached {
    Unset,
    At(isize, f64),
    End,
}

impl Cached {
    fn row(self) -> isize {
        match self {
            Cached::Unset => -1,
            Cached::At(row, _) => row,
            Cached::End => isize::MIN,
        }
    }
}

/// One encoded output column over a cloned categorical source column.
///
/// Unlike the raw column, the encoded column is dense in row space: an
/// implicit zero encodes to the value of raw category 0 (for a target
/// encoder on an unseen category that is still the prior), so
/// `next_non_zero` emits one pair per row.
pub struct EncodingColumnIterator<I: ColumnIterator> {
    inner: I,
    provider: Arc<EncodingProvider>,
    cat_fid: usize,
    encoder_idx: usize,
    training: bool,
    num_rows: usize,
    cur_row: isize,
    cached: Cached,
}

impl<I: ColumnIterator> EncodingColumnIterator<I> {
    fn encode(&self, raw: f64, row_idx: usize) -> f64 {
        if self.training {
            self.provider
                .encode_value_train(self.cat_fid, raw, self.encoder_idx, row_idx)
        } else {
            self.provider
                .encode_value_infer(self.cat_fid, raw, self.encoder_idx)
        }
    }
}

impl<I: ColumnIterator> ColumnIterator for EncodingColumnIterator<I> {
    fn get(&mut self, row_idx: usize) -> f64 {
        let raw = self.inner.get(row_idx);
        self.encode(raw, row_idx)
    }

    fn next_non_zero(&mut self) -> Option<(usize, f64)> {
        let next_row = self.cur_row + 1;
        if next_row >= self.num_rows as isize {
            return None;
        }
        // The cache holds the first raw non-zero at or beyond next_row.
        if self.cached.row() == self.cur_row {
            self.cached = match self.inner.next_non_zero() {
                Some((row, value)) => Cached::At(row as isize, value),
                None => Cached::End,
            };
        }
        let raw = match self.cached {
            Cached::At(row, value) if row == next_row => value,
            _ => 0.0,
        };
        self.cur_row = next_row;
        let row_idx = next_row as usize;
        Some((row_idx, self.encode(raw, row_idx)))
    }

    fn reset(&mut self) {
        self.inner.reset();
        self.cur_row = -1;
        self.cached = Cached::Unset;
    }
}

/// One column of the encoded CSC view.
pub enum EncodedColumn<I: ColumnIterator> {
    /// Non-categorical columns, and raw categorical columns under `keep_raw`.
    Passthrough(I),
    /// A suppressed raw categorical column: reads as all zeros.
    Suppressed,
    /// An encoded output column.
    Encoded(EncodingColumnIterator<I>),
}

impl<I: ColumnIterator> ColumnIterator for EncodedColumn<I> {
    fn get(&mut self, row_idx: usize) -> f64 {
        match self {
            EncodedColumn::Passthrough(inner) => inner.get(row_idx),
            EncodedColumn::Suppressed => 0.0,
            EncodedColumn::Encoded(encoded) => encoded.get(row_idx),
        }
    }

    fn next_non_zero(&mut self) -> Option<(usize, f64)> {
        match self {
            EncodedColumn::Passthrough(inner) => inner.next_non_zero(),
            EncodedColumn::Suppressed => None,
            EncodedColumn::Encoded(encoded) => encoded.next_non_zero(),
        }
    }

    fn reset(&mut self) {
        match self {
            EncodedColumn::Passthrough(inner) => inner.reset(),
            EncodedColumn::Suppressed => {}
            EncodedColumn::Encoded(encoded) => encoded.reset(),
        }
    }
}

/// Wrap CSC column iterators into the encoded column layout.
///
/// Positions `0..num_original_features` hold the original columns
/// (suppressed raw categoricals read as zeros); encoded output columns
/// follow in (encoder index, categorical fid) order, matching the column ids
/// the transforms write.
///
/// # Errors
///
/// [`EncodingError::UnsetPrior`] when the provider is not frozen;
/// [`EncodingError::ConfigConflict`] when the column count does not match
/// the original schema.
pub fn wrap_column_iterators<I>(
    provider: &Arc<EncodingProvider>,
    columns: Vec<I>,
    training: bool,
    num_rows: usize,
) -> Result<Vec<EncodedColumn<I>>, EncodingError>
where
    I: ColumnIterator + Clone,
{
    provider.require_frozen()?;
    if columns.len() != provider.num_original_features() {
        return Err(EncodingError::conflict(format!(
            "got {} column iterators, schema has {} original features",
            columns.len(),
            provider.num_original_features()
        )));
    }

    let mut encoded = Vec::new();
    for encoder_idx in 0..provider.num_encoders() {
        for &fid in provider.categorical_features() {
            let mut inner = columns[fid].clone();
            inner.reset();
            encoded.push(EncodedColumn::Encoded(EncodingColumnIterator {
                inner,
                provider: Arc::clone(provider),
                cat_fid: fid,
                encoder_idx,
                training,
                num_rows,
                cur_row: -1,
                cached: Cached::Unset,
            }));
        }
    }

    let mut wrapped = Vec::with_capacity(provider.num_total_features());
    for (fid, column) in columns.into_iter().enumerate() {
        if provider.is_categorical(fid) && !provider.keep_raw() {
            wrapped.push(EncodedColumn::Suppressed);
        } else {
            wrapped.push(EncodedColumn::Passthrough(column));
        }
    }
    wrapped.extend(encoded);
    Ok(wrapped)
}

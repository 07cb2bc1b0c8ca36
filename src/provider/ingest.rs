//! Ingestion from the four input shapes.
//!
//! All shapes funnel into one of two inner accumulation routines. The
//! materialized shapes (dense, CSR, CSC) accumulate into fixed-size row
//! chunks so the merged sums do not depend on the thread count; the streamed
//! path is single-threaded because it shares one text parser.

use fixedbitset::FixedBitSet;

use crate::config::EncodingConfig;
use crate::error::EncodingError;
use crate::input::{ColumnIterator, RowAccessor, RowParser, SparseRowAccessor};
use crate::stats::StatShard;
use crate::utils::{row_chunks, run_with_threads};

use super::{EncodingProvider, StreamState};

/// Accumulate one sparse `(feature, value)` row.
///
/// The `seen` bitset guards against a feature appearing twice in one sparse
/// row being counted twice.
fn accumulate_sparse_row(
    categorical: &[usize],
    shard: &mut StatShard,
    seen: &mut FixedBitSet,
    pairs: &[(usize, f64)],
    label: f64,
    fold_id: usize,
) {
    seen.clear();
    for &(fid, value) in pairs {
        if categorical.binary_search(&fid).is_err() {
            continue;
        }
        if fid >= seen.len() {
            seen.grow(fid + 1);
        }
        if seen.contains(fid) {
            continue;
        }
        seen.insert(fid);
        shard.accumulate(fid, fold_id, value as i32, label);
    }
    shard.add_row(fold_id, label);
}

/// Accumulate one dense row: every categorical column has a value, zeros
/// included.
fn accumulate_dense_row(
    categorical: &[usize],
    shard: &mut StatShard,
    row: &[f64],
    label: f64,
    fold_id: usize,
) {
    for &fid in categorical {
        if let Some(&value) = row.get(fid) {
            shard.accumulate(fid, fold_id, value as i32, label);
        }
    }
    shard.add_row(fold_id, label);
}

impl EncodingProvider {
    /// Create a provider for streamed text ingestion.
    ///
    /// The provider owns the parser until [`finish_process`] and hands it
    /// back via [`take_inner_parser`]. `loader_categoricals` merges the
    /// loader's categorical set into the configured one. Feature ids may
    /// grow as rows arrive; the schema is resolved at freeze.
    ///
    /// Returns `Ok(None)` when no encoders are configured.
    ///
    /// [`finish_process`]: EncodingProvider::finish_process
    /// [`take_inner_parser`]: EncodingProvider::take_inner_parser
    pub fn from_stream(
        config: EncodingConfig,
        parser: Box<dyn RowParser + Send + Sync>,
        loader_categoricals: Option<&[usize]>,
    ) -> Result<Option<Self>, EncodingError> {
        if config.encoders.is_empty() {
            return Ok(None);
        }
        let mut config = config;
        if let Some(extra) = loader_categoricals {
            config.categorical_features.extend_from_slice(extra);
        }
        let num_original = parser.num_features();
        let num_folds = config.num_folds;
        let mut provider = Self::with_config(config, num_original)?;
        provider.stream = Some(StreamState {
            parser,
            pairs: Vec::new(),
            seen: FixedBitSet::with_capacity(num_original.max(1)),
            shard: StatShard::new(num_folds),
            max_fid: None,
        });
        Ok(Some(provider))
    }

    /// Accumulate one streamed text row. Rows must arrive in row order; the
    /// fold is drawn from the seeded stream at arrival.
    ///
    /// # Errors
    ///
    /// [`EncodingError::Fatal`] when the provider is not in streamed mode or
    /// is already frozen; parser errors propagate.
    pub fn accumulate_line(&mut self, line: &str, row_idx: usize) -> Result<(), EncodingError> {
        let stream = self.stream.as_mut().ok_or_else(|| {
            EncodingError::Fatal("provider does not accept streamed rows".to_string())
        })?;
        stream.pairs.clear();
        let mut label = 0.0;
        stream
            .parser
            .parse_one_line(line, &mut stream.pairs, &mut label, row_idx)?;
        for &(fid, _) in stream.pairs.iter() {
            if stream.max_fid.map_or(true, |max| fid > max) {
                stream.max_fid = Some(fid);
            }
        }
        let fold_id = self.folds.assign_next();
        accumulate_sparse_row(
            &self.categorical_all,
            &mut stream.shard,
            &mut stream.seen,
            &stream.pairs,
            label,
            fold_id,
        );
        self.num_data += 1;
        Ok(())
    }

    /// Fit from dense row-batched input: `matrices` is a sequence of dense
    /// row accessors sharing `num_columns` columns.
    ///
    /// Returns `Ok(None)` when no encoders are configured.
    pub fn fit_dense<A, L>(
        config: EncodingConfig,
        matrices: &[A],
        num_columns: usize,
        labels: L,
    ) -> Result<Option<Self>, EncodingError>
    where
        A: RowAccessor,
        L: Fn(usize) -> f64 + Sync,
    {
        if config.encoders.is_empty() {
            return Ok(None);
        }
        let num_threads = config.num_threads;
        let mut provider = Self::with_config(config, num_columns)?;

        let mut bounds = Vec::with_capacity(matrices.len() + 1);
        bounds.push(0usize);
        for matrix in matrices {
            bounds.push(bounds.last().copied().unwrap_or(0) + matrix.num_rows());
        }
        let total_rows = bounds.last().copied().unwrap_or(0);
        provider.folds.materialize(total_rows)?;
        provider.num_data = total_rows;

        let num_folds = provider.stats.num_folds();
        let folds = &provider.folds;
        let categorical = &provider.categorical_all;
        let bounds = &bounds;
        let labels = &labels;
        let shards = run_with_threads(num_threads, |parallelism| {
            parallelism.maybe_par_map(row_chunks(total_rows), |range| {
                let mut shard = StatShard::new(num_folds);
                let mut row = Vec::new();
                for row_idx in range {
                    let matrix = bounds.partition_point(|&b| b <= row_idx) - 1;
                    matrices[matrix].row_into(row_idx - bounds[matrix], &mut row);
                    accumulate_dense_row(
                        categorical,
                        &mut shard,
                        &row,
                        labels(row_idx),
                        folds.fold_of(row_idx),
                    );
                }
                shard
            })
        });
        provider.shards = shards;
        Ok(Some(provider))
    }

    /// Fit from CSR input: each row is already sparse `(column, value)`
    /// pairs.
    ///
    /// Returns `Ok(None)` when no encoders are configured.
    pub fn fit_csr<A, L>(
        config: EncodingConfig,
        rows: &A,
        num_columns: usize,
        labels: L,
    ) -> Result<Option<Self>, EncodingError>
    where
        A: SparseRowAccessor,
        L: Fn(usize) -> f64 + Sync,
    {
        if config.encoders.is_empty() {
            return Ok(None);
        }
        let num_threads = config.num_threads;
        let mut provider = Self::with_config(config, num_columns)?;

        let total_rows = rows.num_rows();
        provider.folds.materialize(total_rows)?;
        provider.num_data = total_rows;

        let num_folds = provider.stats.num_folds();
        let folds = &provider.folds;
        let categorical = &provider.categorical_all;
        let labels = &labels;
        let shards = run_with_threads(num_threads, |parallelism| {
            parallelism.maybe_par_map(row_chunks(total_rows), |range| {
                let mut shard = StatShard::new(num_folds);
                let mut pairs = Vec::new();
                let mut seen = FixedBitSet::with_capacity(num_columns.max(1));
                for row_idx in range {
                    rows.row_into(row_idx, &mut pairs);
                    accumulate_sparse_row(
                        categorical,
                        &mut shard,
                        &mut seen,
                        &pairs,
                        labels(row_idx),
                        folds.fold_of(row_idx),
                    );
                }
                shard
            })
        });
        provider.shards = shards;
        Ok(Some(provider))
    }

    /// Fit from CSC input by advancing all column iterators in lockstep.
    ///
    /// The walk is sequential (the iterators are stateful) but fills the
    /// same fixed-size chunks as the parallel shapes, so the merged result
    /// is identical to a dense or CSR fit of the same table.
    ///
    /// Returns `Ok(None)` when no encoders are configured.
    pub fn fit_csc<I, L>(
        config: EncodingConfig,
        columns: &mut [I],
        num_rows: usize,
        labels: L,
    ) -> Result<Option<Self>, EncodingError>
    where
        I: ColumnIterator,
        L: Fn(usize) -> f64,
    {
        if config.encoders.is_empty() {
            return Ok(None);
        }
        let mut provider = Self::with_config(config, columns.len())?;
        provider.folds.materialize(num_rows)?;
        provider.num_data = num_rows;

        let num_folds = provider.stats.num_folds();
        let mut pending: Vec<Option<(usize, f64)>> = columns
            .iter_mut()
            .map(|column| {
                column.reset();
                column.next_non_zero()
            })
            .collect();
        let mut pairs = Vec::new();
        let mut seen = FixedBitSet::with_capacity(columns.len().max(1));
        for range in row_chunks(num_rows) {
            let mut shard = StatShard::new(num_folds);
            for row_idx in range {
                pairs.clear();
                for (col, column) in columns.iter_mut().enumerate() {
                    while let Some((next_row, value)) = pending[col] {
                        if next_row > row_idx {
                            break;
                        }
                        pending[col] = column.next_non_zero();
                        if next_row == row_idx {
                            pairs.push((col, value));
                            break;
                        }
                    }
                }
                accumulate_sparse_row(
                    &provider.categorical_all,
                    &mut shard,
                    &mut seen,
                    &pairs,
                    labels(row_idx),
                    provider.folds.fold_of(row_idx),
                );
            }
            provider.shards.push(shard);
        }
        Ok(Some(provider))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stats::StatStore;

    fn collect(shard: StatShard, num_folds: usize) -> StatStore {
        let mut store = StatStore::new(num_folds);
        store.merge_shards([shard]);
        store.aggregate_all_folds();
        store
    }

    #[test]
    fn duplicate_sparse_feature_counted_once() {
        let mut shard = StatShard::new(1);
        let mut seen = FixedBitSet::with_capacity(4);
        accumulate_sparse_row(
            &[1],
            &mut shard,
            &mut seen,
            &[(1, 3.0), (1, 3.0), (0, 9.0)],
            1.0,
            0,
        );
        let store = collect(shard, 1);
        assert_eq!(store.lookup_infer(1, 3).count, 1.0);
        // Feature 0 is not categorical, nothing accumulated for it.
        assert_eq!(store.lookup_infer(0, 9).count, 0.0);
    }

    #[test]
    fn dense_row_counts_zero_category() {
        let mut shard = StatShard::new(1);
        accumulate_dense_row(&[0], &mut shard, &[0.0, 5.0], 1.0, 0);
        accumulate_dense_row(&[0], &mut shard, &[2.0, 5.0], 0.0, 0);
        let store = collect(shard, 1);
        assert_eq!(store.lookup_infer(0, 0).count, 1.0);
        assert_eq!(store.lookup_infer(0, 2).count, 1.0);
    }

    #[test]
    fn float_category_truncates() {
        let mut shard = StatShard::new(1);
        accumulate_dense_row(&[0], &mut shard, &[2.9], 1.0, 0);
        let store = collect(shard, 1);
        assert_eq!(store.lookup_infer(0, 2).count, 1.0);
    }
}

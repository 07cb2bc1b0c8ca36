//! Row transformation: the training (out-of-fold) and inference (all-folds)
//! views.
//!
//! Every categorical column is replaced by one column per encoder; the raw
//! column is retained in place under `keep_raw` and suppressed otherwise.
//! A category missing from the store reads `(0, 0, 0)` aggregates, so target
//! encoders fall back to their prior and count encoders to 0.

use ndarray::{aview1, Array2, ArrayView2};

use crate::stats::EncodingStats;

use super::EncodingProvider;

/// Which fold set a lookup reads.
#[derive(Debug, Clone, Copy)]
enum StatView {
    Train { fold_id: usize },
    Infer,
}

impl EncodingProvider {
    fn category_stats(&self, fid: usize, value: f64, view: StatView) -> EncodingStats {
        let category = value as i32;
        match view {
            StatView::Train { fold_id } => self.stats.lookup_train(fid, fold_id, category),
            StatView::Infer => self.stats.lookup_infer(fid, category),
        }
    }

    fn encode_one(&self, encoder_idx: usize, stats: &EncodingStats, view: StatView) -> f64 {
        let encoder = &self.encoders[encoder_idx];
        match view {
            StatView::Train { fold_id } => encoder.value_train(stats, self.fold_prior[fold_id]),
            StatView::Infer => encoder.value_infer(stats),
        }
    }

    fn transform_dense(&self, features: &mut Vec<f64>, view: StatView) {
        debug_assert!(self.frozen, "transform on an unfrozen provider");
        if features.len() < self.num_total_features {
            features.resize(self.num_total_features, 0.0);
        }
        for &fid in &self.categorical_features {
            let value = features[fid];
            let stats = self.category_stats(fid, value, view);
            for (encoder_idx, encoder) in self.encoders.iter().enumerate() {
                features[encoder.output_column(fid)] = self.encode_one(encoder_idx, &stats, view);
            }
            if !self.keep_raw {
                features[fid] = 0.0;
            }
        }
    }

    fn transform_sparse(&self, pairs: &mut Vec<(usize, f64)>, view: StatView) {
        debug_assert!(self.frozen, "transform on an unfrozen provider");
        let mut appended = Vec::new();
        for &(fid, value) in pairs.iter() {
            if !self.is_categorical(fid) {
                continue;
            }
            let stats = self.category_stats(fid, value, view);
            for (encoder_idx, encoder) in self.encoders.iter().enumerate() {
                appended.push((
                    encoder.output_column(fid),
                    self.encode_one(encoder_idx, &stats, view),
                ));
            }
        }
        if !self.keep_raw {
            pairs.retain(|&(fid, _)| !self.is_categorical(fid));
        }
        pairs.extend(appended);
    }

    // =========================================================================
    // Dense rows
    // =========================================================================

    /// Training-view transform of a dense row. `row_idx` selects the row's
    /// fold; the encoded values never depend on the row's own label.
    ///
    /// The row is extended from `num_original_features` to
    /// `num_total_features` columns.
    ///
    /// # Panics
    ///
    /// Panics if `row_idx` was not part of the fit.
    pub fn transform_dense_train(&self, features: &mut Vec<f64>, row_idx: usize) {
        let fold_id = self.folds.fold_of(row_idx);
        self.transform_dense(features, StatView::Train { fold_id });
    }

    /// Inference-view transform of a dense row, using the all-folds
    /// aggregates.
    pub fn transform_dense_infer(&self, features: &mut Vec<f64>) {
        self.transform_dense(features, StatView::Infer);
    }

    // =========================================================================
    // Sparse rows
    // =========================================================================

    /// Training-view transform of a sparse row. Encoded pairs are appended;
    /// raw categorical pairs are dropped unless `keep_raw` is set.
    ///
    /// # Panics
    ///
    /// Panics if `row_idx` was not part of the fit.
    pub fn transform_sparse_train(&self, pairs: &mut Vec<(usize, f64)>, row_idx: usize) {
        let fold_id = self.folds.fold_of(row_idx);
        self.transform_sparse(pairs, StatView::Train { fold_id });
    }

    /// Inference-view transform of a sparse row.
    pub fn transform_sparse_infer(&self, pairs: &mut Vec<(usize, f64)>) {
        self.transform_sparse(pairs, StatView::Infer);
    }

    // =========================================================================
    // Single values (CSC adapter path)
    // =========================================================================

    /// Training-view encoding of one raw value under one encoder.
    pub fn encode_value_train(
        &self,
        fid: usize,
        value: f64,
        encoder_idx: usize,
        row_idx: usize,
    ) -> f64 {
        let fold_id = self.folds.fold_of(row_idx);
        let view = StatView::Train { fold_id };
        let stats = self.category_stats(fid, value, view);
        self.encode_one(encoder_idx, &stats, view)
    }

    /// Inference-view encoding of one raw value under one encoder.
    pub fn encode_value_infer(&self, fid: usize, value: f64, encoder_idx: usize) -> f64 {
        let stats = self.category_stats(fid, value, StatView::Infer);
        self.encode_one(encoder_idx, &stats, StatView::Infer)
    }

    // =========================================================================
    // Matrices
    // =========================================================================

    /// Training-view transform of a sample-major matrix
    /// `[n_samples, n_features]`; row `i` of the input is training row `i`.
    pub fn transform_matrix_train(&self, features: ArrayView2<f64>) -> Array2<f64> {
        self.transform_matrix(features, true)
    }

    /// Inference-view transform of a sample-major matrix.
    pub fn transform_matrix_infer(&self, features: ArrayView2<f64>) -> Array2<f64> {
        self.transform_matrix(features, false)
    }

    fn transform_matrix(&self, features: ArrayView2<f64>, training: bool) -> Array2<f64> {
        let num_rows = features.nrows();
        let mut out = Array2::zeros((num_rows, self.num_total_features));
        let mut row = Vec::with_capacity(self.num_total_features);
        for row_idx in 0..num_rows {
            row.clear();
            row.extend(features.row(row_idx).iter().copied());
            if training {
                self.transform_dense_train(&mut row, row_idx);
            } else {
                self.transform_dense_infer(&mut row);
            }
            out.row_mut(row_idx).assign(&aview1(&row));
        }
        out
    }
}

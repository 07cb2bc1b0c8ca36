//! The encoding provider: front facade of the statistics engine.
//!
//! [`EncodingProvider`] owns the configuration, the statistics store, the
//! fold assigner, and the ordered encoder list. It is built by one of the
//! ingest constructors, fed rows, and then frozen by
//! [`finish_process`](EncodingProvider::finish_process). A frozen provider
//! serves the transform surfaces and can be persisted.

mod ingest;
mod transform;

use fixedbitset::FixedBitSet;

use crate::config::{EncodingConfig, PerFeatureSettings};
use crate::encoder::CategoryEncoder;
use crate::error::EncodingError;
use crate::folds::FoldAssigner;
use crate::input::RowParser;
use crate::stats::{StatShard, StatStore};
use crate::sync::{sync_encoding_prior, sync_encoding_stat, Collective};

/// Streamed-ingest scratch state. Lives only until the fit is frozen; none
/// of it leaks into the frozen model.
pub(crate) struct StreamState {
    pub(crate) parser: Box<dyn RowParser + Send + Sync>,
    pub(crate) pairs: Vec<(usize, f64)>,
    pub(crate) seen: FixedBitSet,
    pub(crate) shard: StatShard,
    pub(crate) max_fid: Option<usize>,
}

impl std::fmt::Debug for StreamState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamState")
            .field("max_fid", &self.max_fid)
            .finish_non_exhaustive()
    }
}

/// Computes, reduces, and serves per-category target statistics.
///
/// Lifecycle: construct with one of the ingest constructors, accumulate,
/// call [`finish_process`](Self::finish_process) once, then transform. All
/// post-freeze calls are read-only, so a frozen provider can be shared
/// across transform threads.
pub struct EncodingProvider {
    config: EncodingConfig,
    /// Rows accumulated on this machine.
    num_data: usize,
    /// Full configured categorical set, sorted. Drives ingest filtering and
    /// the distributed reduction (identical on every machine).
    categorical_all: Vec<usize>,
    /// Categorical features retained in the final schema (id < num original).
    categorical_features: Vec<usize>,
    is_categorical: Vec<bool>,
    num_original_features: usize,
    num_total_features: usize,
    prior_weight: f64,
    keep_raw: bool,
    folds: FoldAssigner,
    stats: StatStore,
    shards: Vec<StatShard>,
    encoders: Vec<CategoryEncoder>,
    fold_prior: Vec<f64>,
    global_label_mean: f64,
    frozen: bool,
    stream: Option<StreamState>,
    inner_parser: Option<Box<dyn RowParser + Send + Sync>>,
}

impl std::fmt::Debug for EncodingProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EncodingProvider")
            .field("num_original_features", &self.num_original_features)
            .field("num_total_features", &self.num_total_features)
            .field("categorical_features", &self.categorical_features)
            .field("num_encoders", &self.encoders.len())
            .field("num_data", &self.num_data)
            .field("frozen", &self.frozen)
            .finish_non_exhaustive()
    }
}

impl EncodingProvider {
    /// Core constructor shared by the ingest variants.
    pub(crate) fn with_config(
        config: EncodingConfig,
        num_original_features: usize,
    ) -> Result<Self, EncodingError> {
        config.validate()?;

        let mut categorical_all = config.categorical_features.clone();
        categorical_all.sort_unstable();
        categorical_all.dedup();

        let folds = match &config.fold_assignments {
            Some(ids) => FoldAssigner::from_assignments(config.num_folds, ids.clone())?,
            None => FoldAssigner::new(config.seed, config.num_folds, config.fold_probs.as_deref())?,
        };

        let encoders: Vec<CategoryEncoder> = config
            .encoders
            .iter()
            .map(|&spec| CategoryEncoder::from_spec(spec, config.prior_weight))
            .collect();

        let stats = StatStore::new(config.num_folds);
        let prior_weight = config.prior_weight;
        let keep_raw = config.keep_raw;
        let num_folds = config.num_folds;

        let mut provider = Self {
            config,
            num_data: 0,
            categorical_all,
            categorical_features: Vec::new(),
            is_categorical: Vec::new(),
            num_original_features,
            num_total_features: num_original_features,
            prior_weight,
            keep_raw,
            folds,
            stats,
            shards: Vec::new(),
            encoders,
            fold_prior: vec![0.0; num_folds],
            global_label_mean: 0.0,
            frozen: false,
            stream: None,
            inner_parser: None,
        };
        provider.rebuild_schema();
        Ok(provider)
    }

    /// Recompute the retained categorical set and the derived column count
    /// from the current `num_original_features`.
    fn rebuild_schema(&mut self) {
        self.categorical_features = self
            .categorical_all
            .iter()
            .copied()
            .filter(|&fid| fid < self.num_original_features)
            .collect();
        self.is_categorical = vec![false; self.num_original_features];
        for &fid in &self.categorical_features {
            self.is_categorical[fid] = true;
        }
        self.num_total_features =
            self.num_original_features + self.categorical_features.len() * self.encoders.len();
    }

    // =========================================================================
    // Schema queries
    // =========================================================================

    /// Number of features in the original dataset.
    #[inline]
    pub fn num_original_features(&self) -> usize {
        self.num_original_features
    }

    /// Number of features after encoding.
    #[inline]
    pub fn num_total_features(&self) -> usize {
        self.num_total_features
    }

    /// Number of configured encoders.
    #[inline]
    pub fn num_encoders(&self) -> usize {
        self.encoders.len()
    }

    /// Rows accumulated on this machine.
    #[inline]
    pub fn num_data(&self) -> usize {
        self.num_data
    }

    /// Whether `fid` is a categorical feature of the original schema.
    #[inline]
    pub fn is_categorical(&self, fid: usize) -> bool {
        self.is_categorical.get(fid).copied().unwrap_or(false)
    }

    /// Whether the raw categorical column is kept alongside encoded columns.
    #[inline]
    pub fn keep_raw(&self) -> bool {
        self.keep_raw
    }

    /// Prior pseudo-count weight.
    #[inline]
    pub fn prior_weight(&self) -> f64 {
        self.prior_weight
    }

    /// Retained categorical feature ids, sorted.
    pub fn categorical_features(&self) -> &[usize] {
        &self.categorical_features
    }

    /// Out-of-fold label mean per fold, available after freeze.
    pub fn fold_priors(&self) -> &[f64] {
        &self.fold_prior
    }

    /// Global label mean, available after freeze.
    #[inline]
    pub fn global_label_mean(&self) -> f64 {
        self.global_label_mean
    }

    /// The frozen encoder list.
    pub fn encoders(&self) -> &[CategoryEncoder] {
        &self.encoders
    }

    pub(crate) fn stats(&self) -> &StatStore {
        &self.stats
    }

    /// Whether the fit has been frozen.
    #[inline]
    pub fn is_frozen(&self) -> bool {
        self.frozen
    }

    /// Check that the provider is ready to transform.
    ///
    /// # Errors
    ///
    /// [`EncodingError::UnsetPrior`] when called before the fit is frozen or
    /// while a label-mean encoder has no prior.
    pub fn require_frozen(&self) -> Result<(), EncodingError> {
        if !self.frozen {
            return Err(EncodingError::UnsetPrior);
        }
        for encoder in &self.encoders {
            encoder.require_prior()?;
        }
        Ok(())
    }

    // =========================================================================
    // Freeze
    // =========================================================================

    /// Merge, reduce, and freeze the fit.
    ///
    /// Steps: fold the per-chunk shards into the store; reduce category
    /// statistics and fold totals across machines; build the all-folds
    /// sentinel; compute fold priors and the global label mean; push priors
    /// into the encoders; assign output columns ordered by (encoder index,
    /// categorical fid). After this the provider is frozen and read-only.
    ///
    /// # Errors
    ///
    /// [`EncodingError::Fatal`] when called twice or when a collective
    /// operation fails.
    pub fn finish_process(&mut self, collective: &dyn Collective) -> Result<(), EncodingError> {
        if self.frozen {
            return Err(EncodingError::Fatal(
                "finish_process called on a frozen provider".to_string(),
            ));
        }

        // Close the streamed path: resolve schema growth, keep the inner
        // parser for wrapping, drop the RNG and row scratch.
        if let Some(stream) = self.stream.take() {
            if let Some(max_fid) = stream.max_fid {
                self.num_original_features = self.num_original_features.max(max_fid + 1);
            }
            self.shards.push(stream.shard);
            self.inner_parser = Some(stream.parser);
        }
        self.rebuild_schema();

        let shards = std::mem::take(&mut self.shards);
        self.stats.merge_shards(shards);

        sync_encoding_stat(&mut self.stats, &self.categorical_all, collective)?;
        sync_encoding_prior(&mut self.stats, collective)?;
        self.stats.aggregate_all_folds();

        let label_sums = self.stats.fold_label_sums();
        let num_rows = self.stats.fold_num_rows();
        let total_label: f64 = label_sums.iter().sum();
        let total_rows: u64 = num_rows.iter().sum();
        let global_mean = if total_rows > 0 {
            total_label / total_rows as f64
        } else {
            0.0
        };
        self.global_label_mean = global_mean;
        self.fold_prior = (0..self.config.num_folds)
            .map(|fold_id| {
                let outside_rows = total_rows - num_rows[fold_id];
                if outside_rows == 0 {
                    global_mean
                } else {
                    (total_label - label_sums[fold_id]) / outside_rows as f64
                }
            })
            .collect();

        for encoder in &mut self.encoders {
            encoder.set_prior(global_mean, self.prior_weight);
        }

        // Output columns are sequential after the original features, ordered
        // by (encoder index, categorical fid): the layout is stable and
        // independent of ingestion order.
        let mut next_column = self.num_original_features;
        for encoder in &mut self.encoders {
            for &fid in &self.categorical_features {
                encoder.register_column(fid, next_column);
                next_column += 1;
            }
        }
        self.num_total_features = next_column;

        self.frozen = true;
        Ok(())
    }

    /// Take back the inner parser of a streamed fit, for wrapping into an
    /// [`EncodingParser`](crate::adapters::EncodingParser).
    pub fn take_inner_parser(&mut self) -> Option<Box<dyn RowParser + Send + Sync>> {
        self.inner_parser.take()
    }

    // =========================================================================
    // Downstream integration
    // =========================================================================

    /// Append derived feature names: `"<encoder_name>_<original_name>"` in
    /// the same column order the transforms write.
    ///
    /// An empty `names` vector is first filled with `Column_<i>` placeholders.
    ///
    /// # Errors
    ///
    /// [`EncodingError::ConfigConflict`] when a non-empty vector does not
    /// match the original feature count.
    pub fn extend_feature_names(&self, names: &mut Vec<String>) -> Result<(), EncodingError> {
        if names.is_empty() {
            names.extend((0..self.num_original_features).map(|i| format!("Column_{i}")));
        } else if names.len() != self.num_original_features {
            return Err(EncodingError::conflict(format!(
                "feature names cover {} features, schema has {}",
                names.len(),
                self.num_original_features
            )));
        }
        for encoder in &self.encoders {
            let prefix = encoder.name();
            for &fid in &self.categorical_features {
                let name = format!("{prefix}_{}", names[fid]);
                names.push(name);
            }
        }
        Ok(())
    }

    /// Check a forced-split specification against the encoder list.
    ///
    /// Forced splits thresholding a categorical feature need the raw column;
    /// without raw passthrough the split would reference a suppressed column.
    ///
    /// # Errors
    ///
    /// [`EncodingError::ConfigConflict`] when a forced split references a
    /// categorical feature and `keep_raw` is off.
    pub fn check_forced_splits(
        &self,
        forced_splits: &serde_json::Value,
    ) -> Result<(), EncodingError> {
        let Some(node) = forced_splits.as_object() else {
            return Ok(());
        };
        if let Some(fid) = node.get("feature").and_then(|v| v.as_i64()) {
            if fid >= 0 && self.is_categorical(fid as usize) && !self.keep_raw {
                return Err(EncodingError::conflict(format!(
                    "forced split on categorical feature {fid} requires raw passthrough \
                     (add \"raw\" to the encoder list)"
                )));
            }
        }
        for child in ["left", "right"] {
            if let Some(subtree) = node.get(child) {
                self.check_forced_splits(subtree)?;
            }
        }
        Ok(())
    }

    /// Copy each categorical feature's per-feature settings to its derived
    /// columns, in output-column order.
    ///
    /// # Errors
    ///
    /// [`EncodingError::ConfigConflict`] when a configured vector does not
    /// match the original feature count.
    pub fn extend_per_feature_settings(
        &self,
        settings: &mut PerFeatureSettings,
    ) -> Result<(), EncodingError> {
        let check_len = |len: usize, what: &str| -> Result<(), EncodingError> {
            if len != self.num_original_features {
                return Err(EncodingError::conflict(format!(
                    "{what} covers {len} features, schema has {}",
                    self.num_original_features
                )));
            }
            Ok(())
        };

        if !settings.monotone_constraints.is_empty() {
            check_len(settings.monotone_constraints.len(), "monotone_constraints")?;
            settings
                .monotone_constraints
                .resize(self.num_total_features, 0);
            for encoder in &self.encoders {
                for &fid in &self.categorical_features {
                    let constraint = settings.monotone_constraints[fid];
                    settings.monotone_constraints[encoder.output_column(fid)] = constraint;
                }
            }
        }

        if !settings.feature_contrib.is_empty() {
            check_len(settings.feature_contrib.len(), "feature_contrib")?;
            settings.feature_contrib.resize(self.num_total_features, 1.0);
            for encoder in &self.encoders {
                for &fid in &self.categorical_features {
                    let contrib = settings.feature_contrib[fid];
                    settings.feature_contrib[encoder.output_column(fid)] = contrib;
                }
            }
        }

        for group in &mut settings.interaction_constraints {
            let mut derived = Vec::new();
            for &fid in group.iter() {
                if self.is_categorical(fid) {
                    for encoder in &self.encoders {
                        derived.push(encoder.output_column(fid));
                    }
                }
            }
            group.extend(derived);
        }

        Ok(())
    }

    /// Rebuild a frozen provider from persisted parts (deserialization).
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn from_frozen_parts(
        num_original_features: usize,
        num_total_features: usize,
        keep_raw: bool,
        prior_weight: f64,
        categorical_features: Vec<usize>,
        fold_prior: Vec<f64>,
        encoders: Vec<CategoryEncoder>,
        mut stats: StatStore,
    ) -> Result<Self, EncodingError> {
        let num_folds = fold_prior.len().max(1);
        let config = EncodingConfig {
            num_folds,
            prior_weight,
            keep_raw,
            categorical_features: categorical_features.clone(),
            ..EncodingConfig::default()
        };
        let mut provider = Self::with_config(config, num_original_features)?;
        for encoder in &encoders {
            encoder.require_prior()?;
        }
        provider.encoders = encoders;
        provider.rebuild_schema();
        if provider.num_total_features != num_total_features {
            return Err(EncodingError::format(format!(
                "num_total_features mismatch: header says {num_total_features}, \
                 schema implies {}",
                provider.num_total_features
            )));
        }
        stats.aggregate_all_folds();
        provider.stats = stats;
        provider.fold_prior = fold_prior;
        provider.global_label_mean = provider
            .encoders
            .iter()
            .find_map(|e| match e {
                CategoryEncoder::TargetLabelMean { prior, .. } => *prior,
                _ => None,
            })
            .unwrap_or(0.0);
        provider.frozen = true;
        Ok(provider)
    }
}

//! Category value encoders.
//!
//! Each encoder maps per-category aggregates (label sum, in-fold count,
//! across-fold count) to one encoded scalar, and owns the mapping from a
//! categorical feature id to the output column its values are written to.
//!
//! The variant discriminator doubles as the serialization type tag, so no
//! separate registry is needed.

use std::collections::BTreeMap;

use crate::config::EncoderSpec;
use crate::error::EncodingError;
use crate::stats::EncodingStats;

/// Mapping from categorical feature id to encoded output column.
///
/// Ordered so that dumps and column walks are deterministic.
pub type ColumnMapping = BTreeMap<usize, usize>;

/// A frozen category encoder: a value formula plus its output columns.
#[derive(Debug, Clone, PartialEq)]
pub enum CategoryEncoder {
    /// Encodes a category as its occurrence count over all folds.
    Count { mapping: ColumnMapping },
    /// Smoothed target mean with a fixed prior from the configuration.
    Target {
        prior: f64,
        prior_weight: f64,
        mapping: ColumnMapping,
    },
    /// Smoothed target mean whose prior is the global label mean, set when
    /// the fit is frozen. The training view blends with the out-of-fold
    /// prior instead.
    TargetLabelMean {
        prior: Option<f64>,
        prior_weight: f64,
        mapping: ColumnMapping,
    },
}

impl CategoryEncoder {
    /// Build the runtime encoder for a configured spec.
    pub fn from_spec(spec: EncoderSpec, prior_weight: f64) -> Self {
        match spec {
            EncoderSpec::Count => CategoryEncoder::Count {
                mapping: ColumnMapping::new(),
            },
            EncoderSpec::Target { prior } => CategoryEncoder::Target {
                prior,
                prior_weight,
                mapping: ColumnMapping::new(),
            },
            EncoderSpec::TargetLabelMean => CategoryEncoder::TargetLabelMean {
                prior: None,
                prior_weight,
                mapping: ColumnMapping::new(),
            },
        }
    }

    /// Encoded value under the training (out-of-fold) view.
    ///
    /// `fold_prior` is the out-of-fold label mean of the row's fold; only the
    /// label-mean encoder uses it.
    ///
    /// # Panics
    ///
    /// Panics if a label-mean encoder is evaluated before its prior is set.
    #[inline]
    pub fn value_train(&self, stats: &EncodingStats, fold_prior: f64) -> f64 {
        match self {
            CategoryEncoder::Count { .. } => stats.all_fold_count,
            CategoryEncoder::Target {
                prior,
                prior_weight,
                ..
            } => (stats.label_sum + prior * prior_weight) / (stats.count + prior_weight),
            CategoryEncoder::TargetLabelMean {
                prior,
                prior_weight,
                ..
            } => {
                assert!(prior.is_some(), "label-mean prior is not set");
                (stats.label_sum + fold_prior * prior_weight) / (stats.count + prior_weight)
            }
        }
    }

    /// Encoded value under the inference (all-folds) view.
    ///
    /// # Panics
    ///
    /// Panics if a label-mean encoder is evaluated before its prior is set.
    #[inline]
    pub fn value_infer(&self, stats: &EncodingStats) -> f64 {
        match self {
            CategoryEncoder::Count { .. } => stats.all_fold_count,
            CategoryEncoder::Target {
                prior,
                prior_weight,
                ..
            } => (stats.label_sum + prior * prior_weight) / (stats.count + prior_weight),
            CategoryEncoder::TargetLabelMean {
                prior,
                prior_weight,
                ..
            } => {
                let prior = prior.expect("label-mean prior is not set");
                (stats.label_sum + prior * prior_weight) / (stats.count + prior_weight)
            }
        }
    }

    /// Stable name derived from the encoder parameters, used as the prefix
    /// of derived feature names.
    pub fn name(&self) -> String {
        match self {
            CategoryEncoder::Count { .. } => "count_encoding".to_string(),
            CategoryEncoder::Target { prior, .. } => format!("target_encoding_{prior}"),
            CategoryEncoder::TargetLabelMean { prior, .. } => match prior {
                Some(p) => format!("label_mean_prior_target_encoding_{p}"),
                None => "label_mean_prior_target_encoding".to_string(),
            },
        }
    }

    /// Serialization type tag of this variant.
    pub fn type_tag(&self) -> &'static str {
        match self {
            CategoryEncoder::Count { .. } => "count_encoder",
            CategoryEncoder::Target { .. } => "target_encoder",
            CategoryEncoder::TargetLabelMean { .. } => "target_encoder_label_mean",
        }
    }

    /// The prior persisted with target variants; `None` for count encoders.
    pub fn prior(&self) -> Option<f64> {
        match self {
            CategoryEncoder::Count { .. } => None,
            CategoryEncoder::Target { prior, .. } => Some(*prior),
            CategoryEncoder::TargetLabelMean { prior, .. } => *prior,
        }
    }

    /// Update the prior state at freeze time.
    ///
    /// Count encoders ignore both values; fixed-prior target encoders take
    /// only the weight; label-mean encoders take both.
    pub fn set_prior(&mut self, prior: f64, prior_weight: f64) {
        match self {
            CategoryEncoder::Count { .. } => {}
            CategoryEncoder::Target {
                prior_weight: w, ..
            } => *w = prior_weight,
            CategoryEncoder::TargetLabelMean {
                prior: p,
                prior_weight: w,
                ..
            } => {
                *p = Some(prior);
                *w = prior_weight;
            }
        }
    }

    /// Check that the encoder is ready to produce values.
    ///
    /// # Errors
    ///
    /// [`EncodingError::UnsetPrior`] for a label-mean encoder whose prior has
    /// not been set yet.
    pub fn require_prior(&self) -> Result<(), EncodingError> {
        match self {
            CategoryEncoder::TargetLabelMean { prior: None, .. } => Err(EncodingError::UnsetPrior),
            _ => Ok(()),
        }
    }

    /// Register the output column for a categorical feature.
    pub fn register_column(&mut self, cat_fid: usize, output_column: usize) {
        self.mapping_mut().insert(cat_fid, output_column);
    }

    /// Output column for a categorical feature.
    ///
    /// # Panics
    ///
    /// Panics if the feature was never registered; the provider registers
    /// every categorical feature when the fit is frozen.
    #[inline]
    pub fn output_column(&self, cat_fid: usize) -> usize {
        self.mapping()[&cat_fid]
    }

    /// The full feature-to-column mapping.
    pub fn mapping(&self) -> &ColumnMapping {
        match self {
            CategoryEncoder::Count { mapping }
            | CategoryEncoder::Target { mapping, .. }
            | CategoryEncoder::TargetLabelMean { mapping, .. } => mapping,
        }
    }

    pub(crate) fn mapping_mut(&mut self) -> &mut ColumnMapping {
        match self {
            CategoryEncoder::Count { mapping }
            | CategoryEncoder::Target { mapping, .. }
            | CategoryEncoder::TargetLabelMean { mapping, .. } => mapping,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stats(label_sum: f64, count: f64, all_fold_count: f64) -> EncodingStats {
        EncodingStats {
            label_sum,
            count,
            all_fold_count,
        }
    }

    #[test]
    fn count_encoder_returns_all_fold_count() {
        let enc = CategoryEncoder::from_spec(EncoderSpec::Count, 2.0);
        let s = stats(5.0, 3.0, 7.0);
        assert_eq!(enc.value_train(&s, 0.9), 7.0);
        assert_eq!(enc.value_infer(&s), 7.0);
    }

    #[test]
    fn target_encoder_blends_fixed_prior() {
        let enc = CategoryEncoder::from_spec(EncoderSpec::Target { prior: 0.5 }, 2.0);
        // (1 + 0.5 * 2) / (2 + 2) = 0.5
        let s = stats(1.0, 2.0, 2.0);
        assert_eq!(enc.value_infer(&s), 0.5);
        // Training view uses the same fixed prior, not the fold prior.
        assert_eq!(enc.value_train(&s, 0.123), 0.5);
    }

    #[test]
    fn target_encoder_unseen_category_reduces_to_prior() {
        let enc = CategoryEncoder::from_spec(EncoderSpec::Target { prior: 0.5 }, 2.0);
        assert_eq!(enc.value_infer(&stats(0.0, 0.0, 0.0)), 0.5);
    }

    #[test]
    fn label_mean_encoder_uses_fold_prior_in_training() {
        let mut enc = CategoryEncoder::from_spec(EncoderSpec::TargetLabelMean, 1.0);
        enc.set_prior(0.5, 1.0);
        // (0 + 0.25 * 1) / (1 + 1)
        assert_eq!(enc.value_train(&stats(0.0, 1.0, 3.0), 0.25), 0.125);
        // Inference falls back to the frozen global mean.
        assert_eq!(enc.value_infer(&stats(0.0, 1.0, 3.0)), 0.25);
    }

    #[test]
    #[should_panic(expected = "prior is not set")]
    fn label_mean_encoder_panics_without_prior() {
        let enc = CategoryEncoder::from_spec(EncoderSpec::TargetLabelMean, 1.0);
        enc.value_infer(&stats(0.0, 1.0, 1.0));
    }

    #[test]
    fn require_prior_reports_unset_label_mean() {
        let mut enc = CategoryEncoder::from_spec(EncoderSpec::TargetLabelMean, 1.0);
        assert!(matches!(
            enc.require_prior(),
            Err(EncodingError::UnsetPrior)
        ));
        enc.set_prior(0.5, 1.0);
        assert!(enc.require_prior().is_ok());

        let count = CategoryEncoder::from_spec(EncoderSpec::Count, 0.0);
        assert!(count.require_prior().is_ok());
    }

    #[test]
    fn set_prior_keeps_fixed_target_prior() {
        let mut enc = CategoryEncoder::from_spec(EncoderSpec::Target { prior: 0.5 }, 2.0);
        enc.set_prior(0.9, 3.0);
        assert_eq!(enc.prior(), Some(0.5));
        // (0 + 0.5 * 3) / (0 + 3) = 0.5, weight was updated
        assert_eq!(enc.value_infer(&stats(0.0, 0.0, 0.0)), 0.5);
    }

    #[test]
    fn names_and_tags() {
        let count = CategoryEncoder::from_spec(EncoderSpec::Count, 0.0);
        assert_eq!(count.name(), "count_encoding");
        assert_eq!(count.type_tag(), "count_encoder");

        let target = CategoryEncoder::from_spec(EncoderSpec::Target { prior: 0.5 }, 1.0);
        assert_eq!(target.name(), "target_encoding_0.5");
        assert_eq!(target.type_tag(), "target_encoder");

        let mut mean = CategoryEncoder::from_spec(EncoderSpec::TargetLabelMean, 1.0);
        mean.set_prior(0.25, 1.0);
        assert_eq!(mean.name(), "label_mean_prior_target_encoding_0.25");
        assert_eq!(mean.type_tag(), "target_encoder_label_mean");
    }

    #[test]
    fn column_registration() {
        let mut enc = CategoryEncoder::from_spec(EncoderSpec::Count, 0.0);
        enc.register_column(2, 5);
        enc.register_column(0, 6);
        assert_eq!(enc.output_column(2), 5);
        assert_eq!(enc.output_column(0), 6);
        assert_eq!(enc.mapping().len(), 2);
    }
}

//! Encoding configuration.
//!
//! [`EncodingConfig`] is the populated configuration record the provider is
//! constructed from. Parsing from files or flags happens upstream; the only
//! string surface kept here is the compact encoder-list form
//! (`"target:0.5,count,raw"`) used by existing training configs.

use crate::error::EncodingError;

/// Which value formula an encoder applies. The frozen runtime form is
/// [`crate::encoder::CategoryEncoder`]; specs are what configs carry.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum EncoderSpec {
    /// Encode a category as its total occurrence count.
    Count,
    /// Smoothed target mean with a fixed, configured prior.
    Target { prior: f64 },
    /// Smoothed target mean whose prior is the label mean, resolved at the
    /// end of the fit (out-of-fold mean during training).
    TargetLabelMean,
}

impl EncoderSpec {
    /// Parse a comma-separated encoder list in the training-config form.
    ///
    /// Recognized entries are `count`, `target` (label-mean prior),
    /// `target:<prior>` (fixed prior), and `raw`. `raw` does not add an
    /// encoder; it turns on raw passthrough of the original column.
    ///
    /// Returns the encoder list and the `keep_raw` flag.
    pub fn parse_list(spec: &str) -> Result<(Vec<EncoderSpec>, bool), EncodingError> {
        let mut encoders = Vec::new();
        let mut keep_raw = false;
        for entry in spec.split(',').map(str::trim).filter(|e| !e.is_empty()) {
            if entry == "count" {
                encoders.push(EncoderSpec::Count);
            } else if entry == "raw" {
                keep_raw = true;
            } else if entry == "target" {
                encoders.push(EncoderSpec::TargetLabelMean);
            } else if let Some(prior) = entry.strip_prefix("target:") {
                let prior: f64 = prior.parse().map_err(|_| {
                    EncodingError::conflict(format!("invalid target encoder prior: {entry:?}"))
                })?;
                encoders.push(EncoderSpec::Target { prior });
            } else {
                return Err(EncodingError::conflict(format!(
                    "unknown category encoder: {entry:?}"
                )));
            }
        }
        Ok((encoders, keep_raw))
    }
}

/// Per-feature training settings that must follow a categorical feature onto
/// its derived columns. Empty vectors mean "not configured".
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PerFeatureSettings {
    /// Monotone constraint per feature (-1, 0, +1).
    pub monotone_constraints: Vec<i8>,
    /// Interaction constraint groups, each a list of feature ids.
    pub interaction_constraints: Vec<Vec<usize>>,
    /// Per-feature contribution weights for split gain.
    pub feature_contrib: Vec<f64>,
}

impl PerFeatureSettings {
    pub fn is_empty(&self) -> bool {
        self.monotone_constraints.is_empty()
            && self.interaction_constraints.is_empty()
            && self.feature_contrib.is_empty()
    }
}

/// Configuration for category encoding.
///
/// Immutable once handed to a provider. `num_folds`, `prior_weight`, and the
/// encoder list define the statistics engine; `categorical_features` selects
/// the columns it applies to.
#[derive(Debug, Clone)]
pub struct EncodingConfig {
    /// Number of target-statistics folds, K >= 1.
    pub num_folds: usize,
    /// Pseudo-count weight of the prior in the smoothed target mean, >= 0.
    pub prior_weight: f64,
    /// Ordered encoder list. Encoding is inactive when empty.
    pub encoders: Vec<EncoderSpec>,
    /// Keep the raw categorical column alongside its encoded columns.
    pub keep_raw: bool,
    /// Feature ids (in the original dataset) that are categorical.
    pub categorical_features: Vec<usize>,
    /// Seed for the fold-assignment stream.
    pub seed: u64,
    /// Per-fold assignment probabilities, length K. Uniform when `None`.
    pub fold_probs: Option<Vec<f64>>,
    /// Explicit per-row fold assignment, overriding the seeded stream.
    /// Used to reproduce externally defined CV splits.
    pub fold_assignments: Option<Vec<u16>>,
    /// Threads for the materialized ingest passes (0 = auto, 1 = sequential).
    pub num_threads: usize,
    /// Settings copied from each categorical feature to its derived columns.
    pub per_feature: PerFeatureSettings,
}

impl Default for EncodingConfig {
    fn default() -> Self {
        Self {
            num_folds: 5,
            prior_weight: 0.0,
            encoders: Vec::new(),
            keep_raw: false,
            categorical_features: Vec::new(),
            seed: 0,
            fold_probs: None,
            fold_assignments: None,
            num_threads: 0,
            per_feature: PerFeatureSettings::default(),
        }
    }
}

impl EncodingConfig {
    /// Validate the invariants the provider relies on.
    ///
    /// # Errors
    ///
    /// [`EncodingError::ConfigConflict`] when `num_folds < 1`,
    /// `prior_weight < 0`, the fold probability vector has the wrong length
    /// or a negative entry, or an explicit fold assignment is out of range.
    pub fn validate(&self) -> Result<(), EncodingError> {
        if self.num_folds < 1 {
            return Err(EncodingError::conflict(format!(
                "num_folds must be >= 1, got {}",
                self.num_folds
            )));
        }
        if !(self.prior_weight >= 0.0) {
            return Err(EncodingError::conflict(format!(
                "prior_weight must be >= 0, got {}",
                self.prior_weight
            )));
        }
        if let Some(probs) = &self.fold_probs {
            if probs.len() != self.num_folds {
                return Err(EncodingError::conflict(format!(
                    "fold_probs has length {}, expected num_folds = {}",
                    probs.len(),
                    self.num_folds
                )));
            }
            if probs.iter().any(|&p| !(p >= 0.0)) {
                return Err(EncodingError::conflict(
                    "fold_probs entries must be non-negative".to_string(),
                ));
            }
        }
        if let Some(folds) = &self.fold_assignments {
            if let Some(&bad) = folds.iter().find(|&&f| f as usize >= self.num_folds) {
                return Err(EncodingError::conflict(format!(
                    "fold assignment {bad} is out of range for num_folds = {}",
                    self.num_folds
                )));
            }
        }
        Ok(())
    }

    /// Whether any encoding work is configured.
    pub fn is_active(&self) -> bool {
        !self.encoders.is_empty() && !self.categorical_features.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_encoder_list() {
        let (encoders, keep_raw) = EncoderSpec::parse_list("target:0.5,count,raw").unwrap();
        assert_eq!(
            encoders,
            vec![EncoderSpec::Target { prior: 0.5 }, EncoderSpec::Count]
        );
        assert!(keep_raw);
    }

    #[test]
    fn parse_encoder_list_label_mean() {
        let (encoders, keep_raw) = EncoderSpec::parse_list("target").unwrap();
        assert_eq!(encoders, vec![EncoderSpec::TargetLabelMean]);
        assert!(!keep_raw);
    }

    #[test]
    fn parse_encoder_list_rejects_unknown() {
        assert!(matches!(
            EncoderSpec::parse_list("one_hot"),
            Err(EncodingError::ConfigConflict(_))
        ));
        assert!(matches!(
            EncoderSpec::parse_list("target:abc"),
            Err(EncodingError::ConfigConflict(_))
        ));
    }

    #[test]
    fn validate_rejects_zero_folds() {
        let config = EncodingConfig {
            num_folds: 0,
            ..Default::default()
        };
        assert!(matches!(
            config.validate(),
            Err(EncodingError::ConfigConflict(_))
        ));
    }

    #[test]
    fn validate_rejects_negative_prior_weight() {
        let config = EncodingConfig {
            prior_weight: -1.0,
            ..Default::default()
        };
        assert!(matches!(
            config.validate(),
            Err(EncodingError::ConfigConflict(_))
        ));
    }

    #[test]
    fn validate_checks_fold_probs_length() {
        let config = EncodingConfig {
            num_folds: 3,
            fold_probs: Some(vec![0.5, 0.5]),
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn validate_checks_fold_assignment_range() {
        let config = EncodingConfig {
            num_folds: 2,
            fold_assignments: Some(vec![0, 1, 2]),
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }
}

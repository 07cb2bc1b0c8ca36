//! JSON serialization of a frozen provider.
//!
//! Schema types are separate from the runtime types and use plain vectors,
//! so the JSON output is deterministic and independent of map layouts.

use serde::{Deserialize, Serialize};

use crate::encoder::{CategoryEncoder, ColumnMapping};
use crate::error::EncodingError;
use crate::provider::EncodingProvider;
use crate::stats::{CategoryStats, StatStore};

#[derive(Debug, Clone, Serialize, Deserialize)]
struct MappingEntrySchema {
    cat_fid: usize,
    convert_fid: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct EncoderSchema {
    name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    prior: Option<f64>,
    categorical_feature_index_to_encoded_feature_index: Vec<MappingEntrySchema>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct CategoryCellSchema {
    cat: i32,
    count: u64,
    label_sum: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct FeatureStatsSchema {
    feature: usize,
    /// One array per fold, in fold order, each sorted by category.
    folds: Vec<Vec<CategoryCellSchema>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct ProviderSchema {
    num_original_features: usize,
    num_total_features: usize,
    prior_weight: f64,
    keep_raw: bool,
    categorical_features: Vec<usize>,
    fold_prior: Vec<f64>,
    encoders: Vec<EncoderSchema>,
    encoding_stats: Vec<FeatureStatsSchema>,
}

fn encoder_to_schema(encoder: &CategoryEncoder) -> EncoderSchema {
    EncoderSchema {
        name: encoder.type_tag().to_string(),
        prior: encoder.prior(),
        categorical_feature_index_to_encoded_feature_index: encoder
            .mapping()
            .iter()
            .map(|(&cat_fid, &convert_fid)| MappingEntrySchema {
                cat_fid,
                convert_fid,
            })
            .collect(),
    }
}

fn encoder_from_schema(
    schema: EncoderSchema,
    prior_weight: f64,
) -> Result<CategoryEncoder, EncodingError> {
    let mapping: ColumnMapping = schema
        .categorical_feature_index_to_encoded_feature_index
        .into_iter()
        .map(|entry| (entry.cat_fid, entry.convert_fid))
        .collect();
    let require_prior = |prior: Option<f64>| {
        prior.ok_or_else(|| {
            EncodingError::format(format!("encoder {:?} is missing its prior", schema.name))
        })
    };
    match schema.name.as_str() {
        "count_encoder" => Ok(CategoryEncoder::Count { mapping }),
        "target_encoder" => Ok(CategoryEncoder::Target {
            prior: require_prior(schema.prior)?,
            prior_weight,
            mapping,
        }),
        "target_encoder_label_mean" => Ok(CategoryEncoder::TargetLabelMean {
            prior: Some(require_prior(schema.prior)?),
            prior_weight,
            mapping,
        }),
        unknown => Err(EncodingError::format(format!(
            "unknown category encoder type {unknown:?}"
        ))),
    }
}

pub(crate) fn dump(provider: &EncodingProvider) -> String {
    let encoding_stats = provider
        .categorical_features()
        .iter()
        .map(|&fid| FeatureStatsSchema {
            feature: fid,
            folds: (0..provider.stats().num_folds())
                .map(|fold_id| {
                    provider
                        .stats()
                        .fold_entries(fid, fold_id)
                        .into_iter()
                        .map(|(cat, cell)| CategoryCellSchema {
                            cat,
                            count: cell.count,
                            label_sum: cell.label_sum,
                        })
                        .collect()
                })
                .collect(),
        })
        .collect();

    let schema = ProviderSchema {
        num_original_features: provider.num_original_features(),
        num_total_features: provider.num_total_features(),
        prior_weight: provider.prior_weight(),
        keep_raw: provider.keep_raw(),
        categorical_features: provider.categorical_features().to_vec(),
        fold_prior: provider.fold_priors().to_vec(),
        encoders: provider.encoders().iter().map(encoder_to_schema).collect(),
        encoding_stats,
    };
    serde_json::to_string(&schema).expect("provider schema serializes")
}

pub(crate) fn parse(text: &str) -> Result<EncodingProvider, EncodingError> {
    let schema: ProviderSchema = serde_json::from_str(text)
        .map_err(|e| EncodingError::format(format!("invalid provider JSON: {e}")))?;

    if schema.fold_prior.is_empty() {
        return Err(EncodingError::format("fold_prior must not be empty"));
    }
    let num_folds = schema.fold_prior.len();

    let encoders: Vec<CategoryEncoder> = schema
        .encoders
        .into_iter()
        .map(|encoder| encoder_from_schema(encoder, schema.prior_weight))
        .collect::<Result<_, _>>()?;

    let mut store = StatStore::new(num_folds);
    for feature_stats in schema.encoding_stats {
        if feature_stats.folds.len() != num_folds {
            return Err(EncodingError::format(format!(
                "feature {} carries {} fold maps, expected {num_folds}",
                feature_stats.feature,
                feature_stats.folds.len()
            )));
        }
        for (fold_id, cells) in feature_stats.folds.into_iter().enumerate() {
            for cell in cells {
                store.insert_cell(
                    feature_stats.feature,
                    fold_id,
                    cell.cat,
                    CategoryStats {
                        count: cell.count,
                        label_sum: cell.label_sum,
                    },
                );
            }
        }
    }

    EncodingProvider::from_frozen_parts(
        schema.num_original_features,
        schema.num_total_features,
        schema.keep_raw,
        schema.prior_weight,
        schema.categorical_features,
        schema.fold_prior,
        encoders,
        store,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encoder_schema_round_trip() {
        let encoder = CategoryEncoder::TargetLabelMean {
            prior: Some(0.25),
            prior_weight: 1.0,
            mapping: [(0, 2)].into_iter().collect(),
        };
        let schema = encoder_to_schema(&encoder);
        assert_eq!(schema.name, "target_encoder_label_mean");
        let back = encoder_from_schema(schema, 1.0).unwrap();
        assert_eq!(back, encoder);
    }

    #[test]
    fn count_encoder_has_no_prior_field() {
        let encoder = CategoryEncoder::Count {
            mapping: [(1, 4)].into_iter().collect(),
        };
        let json = serde_json::to_string(&encoder_to_schema(&encoder)).unwrap();
        assert!(!json.contains("prior"));
    }

    #[test]
    fn target_encoder_requires_prior() {
        let schema = EncoderSchema {
            name: "target_encoder".to_string(),
            prior: None,
            categorical_feature_index_to_encoded_feature_index: Vec::new(),
        };
        assert!(matches!(
            encoder_from_schema(schema, 0.0),
            Err(EncodingError::ModelFormat(_))
        ));
    }

    #[test]
    fn unknown_name_is_model_format() {
        let schema = EncoderSchema {
            name: "one_hot".to_string(),
            prior: None,
            categorical_feature_index_to_encoded_feature_index: Vec::new(),
        };
        assert!(matches!(
            encoder_from_schema(schema, 0.0),
            Err(EncodingError::ModelFormat(_))
        ));
    }
}

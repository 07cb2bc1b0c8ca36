//! Round-trip tests for the line and JSON provider formats.

use approx::assert_abs_diff_eq;

use catfold::{EncoderSpec, EncodingConfig, EncodingError, EncodingProvider, LocalCollective};

fn fitted_provider() -> EncodingProvider {
    let config = EncodingConfig {
        num_folds: 2,
        prior_weight: 2.0,
        encoders: vec![
            EncoderSpec::Count,
            EncoderSpec::Target { prior: 0.5 },
            EncoderSpec::TargetLabelMean,
        ],
        keep_raw: true,
        categorical_features: vec![0, 2],
        seed: 11,
        num_threads: 1,
        ..EncodingConfig::default()
    };
    let rows = vec![
        vec![1.0, 0.5, 7.0],
        vec![2.0, 0.25, 7.0],
        vec![1.0, 0.75, 8.0],
        vec![1.0, 0.1, -2.0],
        vec![3.0, 0.9, 8.0],
    ];
    let labels = [1.0, 0.0, 1.0, 1.0, 0.0];
    let mut provider = EncodingProvider::fit_dense(config, &[rows], 3, |row| labels[row])
        .unwrap()
        .unwrap();
    provider.finish_process(&LocalCollective).unwrap();
    provider
}

fn assert_same_surfaces(a: &EncodingProvider, b: &EncodingProvider) {
    assert_eq!(a.num_original_features(), b.num_original_features());
    assert_eq!(a.num_total_features(), b.num_total_features());
    assert_eq!(a.keep_raw(), b.keep_raw());
    assert_eq!(a.prior_weight(), b.prior_weight());
    assert_eq!(a.categorical_features(), b.categorical_features());
    assert_eq!(a.fold_priors(), b.fold_priors());
    assert_eq!(a.encoders(), b.encoders());

    // Inference transforms are bit-identical, seen and unseen categories.
    for category in [-2.0, 1.0, 2.0, 3.0, 7.0, 8.0, 99.0] {
        let mut row_a = vec![category, 0.5, category];
        let mut row_b = row_a.clone();
        a.transform_dense_infer(&mut row_a);
        b.transform_dense_infer(&mut row_b);
        assert_eq!(row_a, row_b, "category {category}");
    }
}

// =============================================================================
// Line form
// =============================================================================

#[test]
fn line_form_round_trip_is_bit_exact() {
    let provider = fitted_provider();
    let dump = provider.dump_to_string();

    let restored = EncodingProvider::from_model_string(&dump).unwrap();
    assert_eq!(restored.dump_to_string(), dump);
    assert_same_surfaces(&provider, &restored);
}

#[test]
fn line_form_header_fields() {
    let provider = fitted_provider();
    let dump = provider.dump_to_string();
    let mut lines = dump.lines();
    assert_eq!(lines.next(), Some("num_original_features=3"));
    assert_eq!(lines.next(), Some("num_total_features=9"));
    assert_eq!(lines.next(), Some("keep_raw=1"));
    assert_eq!(lines.next(), Some("prior_weight=2"));
    assert_eq!(lines.next(), Some("num_encoders=3"));
    assert_eq!(lines.next(), Some("categorical_features=0 2"));
    assert!(dump.contains("type=count_encoder\n"));
    assert!(dump.contains("type=target_encoder\nprior=0.5\n"));
    assert!(dump.contains("type=target_encoder_label_mean\n"));
}

#[test]
fn line_form_prefix_reports_consumed_bytes() {
    let provider = fitted_provider();
    let dump = provider.dump_to_string();
    let mut model_file = dump.clone();
    model_file.push_str("tree_sizes=120 140\nTree=0\n");

    let (restored, consumed) = EncodingProvider::from_model_prefix(&model_file).unwrap();
    assert_eq!(consumed, dump.len());
    assert_eq!(&model_file[consumed..], "tree_sizes=120 140\nTree=0\n");
    assert_same_surfaces(&provider, &restored);
}

#[test]
fn truncated_line_form_is_model_format() {
    let dump = fitted_provider().dump_to_string();
    let truncated = &dump[..dump.len() / 3];
    assert!(matches!(
        EncodingProvider::from_model_string(truncated),
        Err(EncodingError::ModelFormat(_))
    ));
}

#[test]
fn unknown_type_tag_is_model_format() {
    let dump = fitted_provider().dump_to_string();
    let broken = dump.replace("type=count_encoder", "type=hash_encoder");
    assert!(matches!(
        EncodingProvider::from_model_string(&broken),
        Err(EncodingError::ModelFormat(_))
    ));
}

#[test]
fn missing_mapping_line_is_model_format() {
    let dump = fitted_provider().dump_to_string();
    let broken = dump.replacen("categorical_feature_index_to_encoded_feature_index", "mapping", 1);
    assert!(matches!(
        EncodingProvider::from_model_string(&broken),
        Err(EncodingError::ModelFormat(_))
    ));
}

#[test]
fn inconsistent_total_features_is_model_format() {
    let dump = fitted_provider().dump_to_string();
    let broken = dump.replacen("num_total_features=9", "num_total_features=11", 1);
    assert!(matches!(
        EncodingProvider::from_model_string(&broken),
        Err(EncodingError::ModelFormat(_))
    ));
}

// =============================================================================
// JSON form
// =============================================================================

#[test]
fn json_round_trip() {
    let provider = fitted_provider();
    let json = provider.dump_to_json();

    let restored = EncodingProvider::from_json_string(&json).unwrap();
    assert_eq!(restored.dump_to_json(), json);
    assert_same_surfaces(&provider, &restored);
}

#[test]
fn json_carries_the_documented_keys() {
    let provider = fitted_provider();
    let parsed: serde_json::Value = serde_json::from_str(&provider.dump_to_json()).unwrap();

    assert_eq!(parsed["prior_weight"], 2.0);
    assert_eq!(parsed["keep_raw"], true);
    assert_eq!(parsed["categorical_features"], serde_json::json!([0, 2]));
    assert_eq!(parsed["fold_prior"].as_array().unwrap().len(), 2);

    let encoders = parsed["encoders"].as_array().unwrap();
    assert_eq!(encoders.len(), 3);
    assert_eq!(encoders[0]["name"], "count_encoder");
    assert_eq!(encoders[1]["name"], "target_encoder");
    assert_eq!(encoders[1]["prior"], 0.5);
    assert_eq!(encoders[2]["name"], "target_encoder_label_mean");
    let mapping = encoders[0]["categorical_feature_index_to_encoded_feature_index"]
        .as_array()
        .unwrap();
    assert_eq!(mapping[0]["cat_fid"], 0);
    assert_eq!(mapping[0]["convert_fid"], 3);
}

#[test]
fn json_and_line_forms_agree() {
    let provider = fitted_provider();
    let via_line = EncodingProvider::from_model_string(&provider.dump_to_string()).unwrap();
    let via_json = EncodingProvider::from_json_string(&provider.dump_to_json()).unwrap();
    assert_eq!(via_line.dump_to_string(), via_json.dump_to_string());
}

#[test]
fn malformed_json_is_model_format() {
    assert!(matches!(
        EncodingProvider::from_json_string("{ not json"),
        Err(EncodingError::ModelFormat(_))
    ));
    assert!(matches!(
        EncodingProvider::from_json_string("{}"),
        Err(EncodingError::ModelFormat(_))
    ));
}

#[test]
fn label_mean_prior_survives_round_trip() {
    let provider = fitted_provider();
    let restored = EncodingProvider::from_model_string(&provider.dump_to_string()).unwrap();
    assert_abs_diff_eq!(
        restored.global_label_mean(),
        provider.global_label_mean(),
        epsilon = 0.0
    );
}

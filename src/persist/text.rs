//! Line-form serialization of a frozen provider.
//!
//! A line-based `key=value` format, written in one fixed order so dumps are
//! deterministic and bit-exact: floats use the shortest round-trip `Display`
//! form. The reader consumes exactly the provider's lines and reports the
//! byte length it used, so the block can be embedded inside a larger model
//! file.

use crate::encoder::{CategoryEncoder, ColumnMapping};
use crate::error::EncodingError;
use crate::provider::EncodingProvider;
use crate::stats::{CategoryStats, StatStore};

const MAPPING_KEY: &str = "categorical_feature_index_to_encoded_feature_index";

// =============================================================================
// Writer
// =============================================================================

pub(crate) fn dump(provider: &EncodingProvider) -> String {
    let mut out = String::new();
    out.push_str(&format!(
        "num_original_features={}\n",
        provider.num_original_features()
    ));
    out.push_str(&format!(
        "num_total_features={}\n",
        provider.num_total_features()
    ));
    out.push_str(&format!("keep_raw={}\n", provider.keep_raw() as u8));
    out.push_str(&format!("prior_weight={}\n", provider.prior_weight()));
    out.push_str(&format!("num_encoders={}\n", provider.num_encoders()));
    out.push_str(&format!(
        "categorical_features={}\n",
        join(provider.categorical_features().iter())
    ));
    out.push_str(&format!(
        "fold_prior={}\n",
        join(provider.fold_priors().iter())
    ));

    for encoder in provider.encoders() {
        out.push_str(&dump_encoder(encoder));
    }

    for &fid in provider.categorical_features() {
        out.push_str(&format!("feature={fid}\n"));
        for fold_id in 0..provider.stats().num_folds() {
            let entries = provider.stats().fold_entries(fid, fold_id);
            let cells: Vec<String> = entries
                .iter()
                .map(|(category, cell)| format!("{category}:{}:{}", cell.count, cell.label_sum))
                .collect();
            out.push_str(&format!("fold_stats_{fold_id}={}\n", cells.join(" ")));
        }
    }
    out
}

fn dump_encoder(encoder: &CategoryEncoder) -> String {
    let mut out = String::new();
    out.push_str(&format!("type={}\n", encoder.type_tag()));
    if !matches!(encoder, CategoryEncoder::Count { .. }) {
        let prior = encoder.prior().expect("dump of an unfrozen provider");
        out.push_str(&format!("prior={prior}\n"));
    }
    let pairs: Vec<String> = encoder
        .mapping()
        .iter()
        .map(|(cat_fid, column)| format!("{cat_fid}:{column}"))
        .collect();
    out.push_str(&format!("{MAPPING_KEY}={}\n", pairs.join(" ")));
    out
}

fn join<T: std::fmt::Display>(values: impl Iterator<Item = T>) -> String {
    values
        .map(|v| v.to_string())
        .collect::<Vec<_>>()
        .join(" ")
}

// =============================================================================
// Reader
// =============================================================================

struct LineCursor<'a> {
    rest: &'a str,
    consumed: usize,
}

impl<'a> LineCursor<'a> {
    fn new(text: &'a str) -> Self {
        Self {
            rest: text,
            consumed: 0,
        }
    }

    fn next_line(&mut self) -> Option<&'a str> {
        if self.rest.is_empty() {
            return None;
        }
        let (line, used) = match self.rest.find('\n') {
            Some(pos) => (&self.rest[..pos], pos + 1),
            None => (self.rest, self.rest.len()),
        };
        self.consumed += used;
        self.rest = &self.rest[used..];
        Some(line.trim_end_matches('\r'))
    }

    /// Read the next line, requiring it to be `key=<value>`.
    fn expect_value(&mut self, key: &str) -> Result<&'a str, EncodingError> {
        let line = self
            .next_line()
            .ok_or_else(|| EncodingError::format(format!("unexpected end, expected {key}=")))?;
        line.strip_prefix(key)
            .and_then(|rest| rest.strip_prefix('='))
            .ok_or_else(|| EncodingError::format(format!("expected {key}=, got {line:?}")))
    }
}

fn parse_scalar<T: std::str::FromStr>(value: &str, field: &str) -> Result<T, EncodingError> {
    value
        .parse()
        .map_err(|_| EncodingError::format(format!("invalid value for {field}: {value:?}")))
}

fn parse_list<T: std::str::FromStr>(value: &str, field: &str) -> Result<Vec<T>, EncodingError> {
    value
        .split(' ')
        .filter(|entry| !entry.is_empty())
        .map(|entry| parse_scalar(entry, field))
        .collect()
}

fn parse_mapping(value: &str) -> Result<ColumnMapping, EncodingError> {
    let mut mapping = ColumnMapping::new();
    for pair in value.split(' ').filter(|entry| !entry.is_empty()) {
        let (cat_fid, column) = pair
            .split_once(':')
            .ok_or_else(|| EncodingError::format(format!("invalid mapping pair {pair:?}")))?;
        mapping.insert(
            parse_scalar(cat_fid, MAPPING_KEY)?,
            parse_scalar(column, MAPPING_KEY)?,
        );
    }
    Ok(mapping)
}

fn parse_encoder(
    cursor: &mut LineCursor<'_>,
    prior_weight: f64,
) -> Result<CategoryEncoder, EncodingError> {
    let type_tag = cursor.expect_value("type")?;
    let encoder = match type_tag {
        "count_encoder" => {
            let mapping = parse_mapping(cursor.expect_value(MAPPING_KEY)?)?;
            CategoryEncoder::Count { mapping }
        }
        "target_encoder" | "target_encoder_label_mean" => {
            let prior: f64 = parse_scalar(cursor.expect_value("prior")?, "prior")?;
            let mapping = parse_mapping(cursor.expect_value(MAPPING_KEY)?)?;
            if type_tag == "target_encoder" {
                CategoryEncoder::Target {
                    prior,
                    prior_weight,
                    mapping,
                }
            } else {
                CategoryEncoder::TargetLabelMean {
                    prior: Some(prior),
                    prior_weight,
                    mapping,
                }
            }
        }
        unknown => {
            return Err(EncodingError::format(format!(
                "unknown category encoder type {unknown:?}"
            )));
        }
    };
    Ok(encoder)
}

fn parse_fold_stats(
    cursor: &mut LineCursor<'_>,
    store: &mut StatStore,
    fid: usize,
    fold_id: usize,
) -> Result<(), EncodingError> {
    let key = format!("fold_stats_{fold_id}");
    let value = cursor.expect_value(&key)?;
    for cell in value.split(' ').filter(|entry| !entry.is_empty()) {
        let mut parts = cell.splitn(3, ':');
        let (Some(category), Some(count), Some(label_sum)) =
            (parts.next(), parts.next(), parts.next())
        else {
            return Err(EncodingError::format(format!(
                "invalid category cell {cell:?}"
            )));
        };
        store.insert_cell(
            fid,
            fold_id,
            parse_scalar(category, &key)?,
            CategoryStats {
                count: parse_scalar(count, &key)?,
                label_sum: parse_scalar(label_sum, &key)?,
            },
        );
    }
    Ok(())
}

/// Parse a provider from the beginning of `text`, returning the provider and
/// the number of bytes consumed.
pub(crate) fn parse_prefix(text: &str) -> Result<(EncodingProvider, usize), EncodingError> {
    let mut cursor = LineCursor::new(text);

    let num_original_features: usize = parse_scalar(
        cursor.expect_value("num_original_features")?,
        "num_original_features",
    )?;
    let num_total_features: usize = parse_scalar(
        cursor.expect_value("num_total_features")?,
        "num_total_features",
    )?;
    let keep_raw = match cursor.expect_value("keep_raw")? {
        "0" => false,
        "1" => true,
        other => {
            return Err(EncodingError::format(format!(
                "invalid value for keep_raw: {other:?}"
            )));
        }
    };
    let prior_weight: f64 = parse_scalar(cursor.expect_value("prior_weight")?, "prior_weight")?;
    let num_encoders: usize = parse_scalar(cursor.expect_value("num_encoders")?, "num_encoders")?;
    let categorical_features: Vec<usize> = parse_list(
        cursor.expect_value("categorical_features")?,
        "categorical_features",
    )?;
    let fold_prior: Vec<f64> = parse_list(cursor.expect_value("fold_prior")?, "fold_prior")?;
    if fold_prior.is_empty() {
        return Err(EncodingError::format("fold_prior must not be empty"));
    }

    let encoders: Vec<CategoryEncoder> = (0..num_encoders)
        .map(|_| parse_encoder(&mut cursor, prior_weight))
        .collect::<Result<_, _>>()?;

    let mut store = StatStore::new(fold_prior.len());
    for &expected_fid in &categorical_features {
        let fid: usize = parse_scalar(cursor.expect_value("feature")?, "feature")?;
        if fid != expected_fid {
            return Err(EncodingError::format(format!(
                "statistics block for feature {fid}, expected {expected_fid}"
            )));
        }
        for fold_id in 0..fold_prior.len() {
            parse_fold_stats(&mut cursor, &mut store, fid, fold_id)?;
        }
    }

    let provider = EncodingProvider::from_frozen_parts(
        num_original_features,
        num_total_features,
        keep_raw,
        prior_weight,
        categorical_features,
        fold_prior,
        encoders,
        store,
    )?;
    Ok((provider, cursor.consumed))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mapping_round_trip() {
        let mapping = parse_mapping("0:5 2:6").unwrap();
        assert_eq!(mapping.get(&0), Some(&5));
        assert_eq!(mapping.get(&2), Some(&6));
        assert!(parse_mapping("").unwrap().is_empty());
        assert!(parse_mapping("0").is_err());
    }

    #[test]
    fn encoder_block_round_trip() {
        let encoder = CategoryEncoder::Target {
            prior: 0.5,
            prior_weight: 2.0,
            mapping: [(0, 3), (1, 4)].into_iter().collect(),
        };
        let text = dump_encoder(&encoder);
        let parsed = parse_encoder(&mut LineCursor::new(&text), 2.0).unwrap();
        assert_eq!(parsed, encoder);
    }

    #[test]
    fn unknown_encoder_type_is_model_format() {
        let text = "type=one_hot_encoder\ncategorical_feature_index_to_encoded_feature_index=\n";
        assert!(matches!(
            parse_encoder(&mut LineCursor::new(text), 0.0),
            Err(EncodingError::ModelFormat(_))
        ));
    }

    #[test]
    fn missing_mapping_line_is_model_format() {
        let text = "type=count_encoder\n";
        assert!(matches!(
            parse_encoder(&mut LineCursor::new(text), 0.0),
            Err(EncodingError::ModelFormat(_))
        ));
    }

    #[test]
    fn missing_prior_line_is_model_format() {
        let text =
            "type=target_encoder\ncategorical_feature_index_to_encoded_feature_index=0:1\n";
        assert!(matches!(
            parse_encoder(&mut LineCursor::new(text), 0.0),
            Err(EncodingError::ModelFormat(_))
        ));
    }

    #[test]
    fn cursor_handles_crlf() {
        let mut cursor = LineCursor::new("a=1\r\nb=2\r\n");
        assert_eq!(cursor.expect_value("a").unwrap(), "1");
        assert_eq!(cursor.expect_value("b").unwrap(), "2");
        assert_eq!(cursor.consumed, 10);
    }
}

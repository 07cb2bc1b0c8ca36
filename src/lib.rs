//! catfold: leakage-safe categorical target encoding for gradient boosting
//! pipelines.
//!
//! Sits between a tabular loader and a histogram-based tree learner and
//! replaces each categorical column with one numeric column per configured
//! encoder. Statistics are accumulated per fold so the training view of a
//! row never depends on the row's own label; inference uses the all-folds
//! aggregates.
//!
//! # Key Types
//!
//! - [`EncodingProvider`] - fit, freeze, transform, persist
//! - [`EncodingConfig`] / [`EncoderSpec`] - configuration
//! - [`Collective`] - cluster transport contract for distributed fits
//! - [`adapters`] - encoded views over raw parsers and CSC column iterators
//!
//! # Example
//!
//! ```
//! use catfold::{EncoderSpec, EncodingConfig, EncodingProvider, LocalCollective};
//!
//! let config = EncodingConfig {
//!     num_folds: 2,
//!     encoders: vec![EncoderSpec::Count],
//!     categorical_features: vec![0],
//!     ..EncodingConfig::default()
//! };
//!
//! // Two columns; column 0 is categorical.
//! let rows = vec![vec![1.0, 0.5], vec![1.0, 0.25], vec![2.0, 0.75]];
//! let labels = [1.0, 0.0, 1.0];
//! let mut provider = EncodingProvider::fit_dense(config, &[rows], 2, |row| labels[row])
//!     .unwrap()
//!     .expect("encoding is configured");
//! provider.finish_process(&LocalCollective).unwrap();
//!
//! let mut row = vec![1.0, 0.5];
//! provider.transform_dense_infer(&mut row);
//! // Category 1 appeared twice; its count column is appended after the
//! // original features and the raw column is suppressed.
//! assert_eq!(row, vec![0.0, 0.5, 2.0]);
//! ```

pub mod adapters;
pub mod config;
pub mod encoder;
pub mod error;
pub mod folds;
pub mod input;
mod persist;
pub mod provider;
pub mod stats;
pub mod sync;
pub mod testing;
pub mod utils;

// =============================================================================
// Convenience Re-exports
// =============================================================================

pub use adapters::{wrap_column_iterators, EncodedColumn, EncodingColumnIterator, EncodingParser};
pub use config::{EncoderSpec, EncodingConfig, PerFeatureSettings};
pub use encoder::CategoryEncoder;
pub use error::EncodingError;
pub use folds::FoldAssigner;
pub use input::{ColumnIterator, RowAccessor, RowParser, SparseRowAccessor};
pub use provider::EncodingProvider;
pub use stats::{CategoryStats, EncodingStats, StatShard, StatStore};
pub use sync::{Collective, LocalCollective};
pub use utils::{run_with_threads, Parallelism};

//! Persistence of frozen providers.
//!
//! Two formats round-trip the frozen state: a line form (`key=value`, for
//! embedding in text model files) and a JSON form. Accumulators and per-row
//! fold assignments are training-transient and are not persisted.

mod json;
mod text;

use crate::error::EncodingError;
use crate::provider::EncodingProvider;

impl EncodingProvider {
    /// Serialize to the line form. Bit-exact: parsing the dump reproduces
    /// every persisted value.
    ///
    /// # Panics
    ///
    /// Panics when the provider is not frozen.
    pub fn dump_to_string(&self) -> String {
        text::dump(self)
    }

    /// Parse a provider from a line-form dump.
    ///
    /// # Errors
    ///
    /// [`EncodingError::ModelFormat`] on malformed input.
    pub fn from_model_string(model: &str) -> Result<Self, EncodingError> {
        text::parse_prefix(model).map(|(provider, _)| provider)
    }

    /// Parse a provider from the beginning of a larger model file, returning
    /// the number of bytes consumed.
    ///
    /// # Errors
    ///
    /// [`EncodingError::ModelFormat`] on malformed input.
    pub fn from_model_prefix(model: &str) -> Result<(Self, usize), EncodingError> {
        text::parse_prefix(model)
    }

    /// Serialize to the JSON form.
    ///
    /// # Panics
    ///
    /// Panics when the provider is not frozen.
    pub fn dump_to_json(&self) -> String {
        json::dump(self)
    }

    /// Parse a provider from a JSON dump.
    ///
    /// # Errors
    ///
    /// [`EncodingError::ModelFormat`] on malformed input.
    pub fn from_json_string(json: &str) -> Result<Self, EncodingError> {
        json::parse(json)
    }
}

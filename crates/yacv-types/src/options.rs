//! Build options attached to every shown object.
//!
//! Options travel with the [`ShowEvent`](crate::ShowEvent) and are handed to
//! the tessellator when the artifact is built. Unknown keys are preserved in
//! [`BuildOptions::extra`] so producer-specific settings still change the
//! content hash.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Default linear tolerance used when meshing curved geometry.
pub const DEFAULT_TOLERANCE: f64 = 0.1;

/// Default angular tolerance (radians) used when meshing curved geometry.
pub const DEFAULT_ANGULAR_TOLERANCE: f64 = 0.1;

/// Options accepted per shown object.
///
/// Deserializes from both `snake_case` and `camelCase` keys; every field is
/// optional and falls back to its documented default.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BuildOptions {
    /// Linear meshing tolerance (default 0.1).
    pub tolerance: f64,
    /// Angular meshing tolerance (default 0.1).
    #[serde(alias = "angularTolerance")]
    pub angular_tolerance: f64,
    /// Whether faces are included in the built artifact (default `true`).
    pub faces: bool,
    /// Whether edges are included in the built artifact (default `true`).
    pub edges: bool,
    /// Whether vertices are included in the built artifact (default `true`).
    pub vertices: bool,
    /// Whether showing clears every other current object (default `true`).
    #[serde(alias = "autoClear")]
    pub auto_clear: bool,
    /// Producer-specific options not understood by the server.
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_json::Value>,
}

impl Default for BuildOptions {
    fn default() -> Self {
        Self {
            tolerance: DEFAULT_TOLERANCE,
            angular_tolerance: DEFAULT_ANGULAR_TOLERANCE,
            faces: true,
            edges: true,
            vertices: true,
            auto_clear: true,
            extra: BTreeMap::new(),
        }
    }
}

impl BuildOptions {
    /// Return a copy with `auto_clear` set to the given value.
    #[must_use]
    pub fn with_auto_clear(mut self, auto_clear: bool) -> Self {
        self.auto_clear = auto_clear;
        self
    }

    /// Return a copy with the given linear tolerance.
    #[must_use]
    pub fn with_tolerance(mut self, tolerance: f64) -> Self {
        self.tolerance = tolerance;
        self
    }

    /// Return a copy with an extra producer-specific option.
    #[must_use]
    pub fn with_extra(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.extra.insert(key.into(), value);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let options = BuildOptions::default();
        assert!((options.tolerance - 0.1).abs() < f64::EPSILON);
        assert!((options.angular_tolerance - 0.1).abs() < f64::EPSILON);
        assert!(options.faces && options.edges && options.vertices);
        assert!(options.auto_clear);
        assert!(options.extra.is_empty());
    }

    #[test]
    fn empty_object_deserializes_to_defaults() {
        let options: BuildOptions = serde_json::from_str("{}").unwrap();
        assert_eq!(options, BuildOptions::default());
    }

    #[test]
    fn camel_case_aliases_are_accepted() {
        let options: BuildOptions =
            serde_json::from_str(r#"{"angularTolerance": 0.5, "autoClear": false}"#).unwrap();
        assert!((options.angular_tolerance - 0.5).abs() < f64::EPSILON);
        assert!(!options.auto_clear);
    }

    #[test]
    fn unknown_keys_land_in_extra() {
        let options: BuildOptions =
            serde_json::from_str(r#"{"faces": false, "color": "red"}"#).unwrap();
        assert!(!options.faces);
        assert_eq!(options.extra.get("color"), Some(&serde_json::json!("red")));
    }
}

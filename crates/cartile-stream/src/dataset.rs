//! LOD ladder entries and data source identifiers.

use std::fmt;
use std::sync::Arc;

/// Identifies a data origin. All changes for the same source share one
/// concurrency budget.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SourceId(Arc<str>);

impl SourceId {
    pub fn new(id: impl Into<Arc<str>>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for SourceId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl From<String> for SourceId {
    fn from(id: String) -> Self {
        Self::new(id)
    }
}

impl fmt::Display for SourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// One rung of a layer's LOD ladder.
///
/// The position of a dataset in the layer's list is its LOD index.
#[derive(Clone, Debug, PartialEq)]
pub struct DataSet {
    /// Disabled datasets never match during LOD evaluation.
    pub enabled: bool,
    /// Squared distance below which this dataset may be shown.
    pub max_distance_squared: f64,
    /// Where the data for this dataset comes from.
    pub source: SourceId,
}

impl DataSet {
    /// An enabled dataset visible up to `max_distance` (not squared).
    pub fn new(source: impl Into<SourceId>, max_distance: f64) -> Self {
        Self {
            enabled: true,
            max_distance_squared: max_distance * max_distance,
            source: source.into(),
        }
    }

    #[must_use]
    pub fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dataset_squares_distance() {
        let dataset = DataSet::new("https://tiles.example", 1500.0);
        assert_eq!(dataset.max_distance_squared, 2_250_000.0);
        assert!(dataset.enabled);
        assert!(!dataset.disabled().enabled);
    }

    #[test]
    fn test_source_ids_compare_by_value() {
        let a = SourceId::from("origin-a");
        let b = SourceId::from(String::from("origin-a"));
        assert_eq!(a, b);
        assert_eq!(a.to_string(), "origin-a");
    }
}

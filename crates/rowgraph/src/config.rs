//! Engine configuration.

use rowgraph_core::ColumnMatching;
use serde::{Deserialize, Serialize};

/// Settings for an [`EntityRelation`](crate::EntityRelation).
///
/// ```
/// use rowgraph::{ColumnMatching, GraphConfig};
///
/// let config = GraphConfig::new()
///     .column_matching(ColumnMatching::Exact)
///     .warn_on_orphans(false);
/// assert_eq!(config.column_matching, ColumnMatching::Exact);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GraphConfig {
    /// How foreign-key and parent-key column names are matched.
    pub column_matching: ColumnMatching,
    /// Log a warning when the cursor runs out of result sets while children
    /// are still waiting for a parent.
    pub warn_on_orphans: bool,
}

impl Default for GraphConfig {
    fn default() -> Self {
        Self {
            column_matching: ColumnMatching::ExactThenCaseInsensitive,
            warn_on_orphans: true,
        }
    }
}

impl GraphConfig {
    /// Create a configuration with default settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the column matching policy.
    pub fn column_matching(mut self, matching: ColumnMatching) -> Self {
        self.column_matching = matching;
        self
    }

    /// Enable or disable the orphaned-children warning.
    pub fn warn_on_orphans(mut self, enabled: bool) -> Self {
        self.warn_on_orphans = enabled;
        self
    }
}

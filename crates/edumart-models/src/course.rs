//! Course documents.

use std::collections::BTreeMap;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// A course listed by an institution.
///
/// `views_rollups` / `comparison_rollups` are per-bucket counters
/// (keyed by period, e.g. `"2026-08"`) maintained by the tracking layer;
/// the flat `course_views` / `comparisons` fields are the running totals
/// the realtime rollups aggregate over.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Course {
    /// Document ID
    pub id: String,

    /// Owning institution document ID
    pub institution_id: String,

    /// Display title
    pub title: String,

    /// Total number of detail-page views
    #[serde(default)]
    pub course_views: i64,

    /// Total number of comparison selections
    #[serde(default)]
    pub comparisons: i64,

    /// Per-bucket view counters
    #[serde(default)]
    pub views_rollups: BTreeMap<String, i64>,

    /// Per-bucket comparison counters
    #[serde(default)]
    pub comparison_rollups: BTreeMap<String, i64>,

    /// Number of students currently holding this course in a wishlist
    #[serde(default)]
    pub wishlist_count: i64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn course_serde_uses_camel_case_paths() {
        let mut course = Course {
            id: "c1".to_string(),
            institution_id: "i1".to_string(),
            title: "BSc Physics".to_string(),
            course_views: 12,
            comparisons: 3,
            views_rollups: BTreeMap::new(),
            comparison_rollups: BTreeMap::new(),
            wishlist_count: 0,
        };
        course.views_rollups.insert("2026-08".to_string(), 12);

        let json = serde_json::to_string(&course).unwrap();
        assert!(json.contains("\"courseViews\":12"));
        assert!(json.contains("\"viewsRollups\""));
        assert!(json.contains("\"institutionId\":\"i1\""));
    }
}

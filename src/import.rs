//! Import path parsing
//!
//! Import identifiers are a single string split on a separator (default
//! `.`, overridable per session). Each resource kind expects an exact number
//! of segments laid out positionally.

use anyhow::{bail, Result};
use std::fmt;

pub const DEFAULT_IMPORT_SEPARATOR: &str = ".";

/// Positional layout of an import identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImportLayout {
    /// `entity`
    Entity,
    /// `organization.entity`
    OrgEntity,
    /// `organization.VDC.entity`
    OrgVdcEntity,
    /// `organization.VDC.edge-gateway.entity`
    OrgVdcEdgeEntity,
}

impl ImportLayout {
    pub fn segments(self) -> usize {
        match self {
            ImportLayout::Entity => 1,
            ImportLayout::OrgEntity => 2,
            ImportLayout::OrgVdcEntity => 3,
            ImportLayout::OrgVdcEdgeEntity => 4,
        }
    }

    fn names(self) -> &'static [&'static str] {
        match self {
            ImportLayout::Entity => &["entity"],
            ImportLayout::OrgEntity => &["org-name", "entity"],
            ImportLayout::OrgVdcEntity => &["org-name", "vdc-name", "entity"],
            ImportLayout::OrgVdcEdgeEntity => {
                &["org-name", "vdc-name", "edge-gateway-name", "entity"]
            }
        }
    }

    /// Human readable layout, e.g. `org-name.vdc-name.nat-rule-id`.
    pub fn describe(self, separator: &str, entity: &str) -> String {
        self.names()
            .iter()
            .map(|n| if *n == "entity" { entity } else { n })
            .collect::<Vec<_>>()
            .join(separator)
    }
}

/// Parsed import identifier
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ImportPath {
    pub org: Option<String>,
    pub vdc: Option<String>,
    pub edge_gateway: Option<String>,
    pub entity: String,
}

impl fmt::Display for ImportPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<&str> = [
            self.org.as_deref(),
            self.vdc.as_deref(),
            self.edge_gateway.as_deref(),
            Some(self.entity.as_str()),
        ]
        .into_iter()
        .flatten()
        .collect();
        write!(f, "{}", parts.join("/"))
    }
}

impl ImportPath {
    pub fn org(&self) -> &str {
        self.org.as_deref().unwrap_or("")
    }

    pub fn vdc(&self) -> &str {
        self.vdc.as_deref().unwrap_or("")
    }

    pub fn edge_gateway(&self) -> &str {
        self.edge_gateway.as_deref().unwrap_or("")
    }
}

/// Split `id` on `separator` and map the segments onto `layout`.
///
/// `entity` names the last segment in the error message (e.g. `nat-rule-id`).
pub fn parse_import_id(
    id: &str,
    separator: &str,
    layout: ImportLayout,
    entity: &str,
) -> Result<ImportPath> {
    let separator = if separator.is_empty() {
        DEFAULT_IMPORT_SEPARATOR
    } else {
        separator
    };
    let segments: Vec<&str> = id.split(separator).collect();
    let expected = layout.segments();

    if segments.len() != expected || segments.iter().any(|s| s.is_empty()) {
        bail!(
            "resource name must be specified as {} (got {:?} with {} segment(s), expected {})",
            layout.describe(separator, entity),
            id,
            segments.len(),
            expected
        );
    }

    let owned = |s: &str| s.to_string();
    let path = match layout {
        ImportLayout::Entity => ImportPath {
            entity: owned(segments[0]),
            ..Default::default()
        },
        ImportLayout::OrgEntity => ImportPath {
            org: Some(owned(segments[0])),
            entity: owned(segments[1]),
            ..Default::default()
        },
        ImportLayout::OrgVdcEntity => ImportPath {
            org: Some(owned(segments[0])),
            vdc: Some(owned(segments[1])),
            entity: owned(segments[2]),
            ..Default::default()
        },
        ImportLayout::OrgVdcEdgeEntity => ImportPath {
            org: Some(owned(segments[0])),
            vdc: Some(owned(segments[1])),
            edge_gateway: Some(owned(segments[2])),
            entity: owned(segments[3]),
        },
    };
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_four_segments() {
        let layout = ImportLayout::OrgVdcEdgeEntity;
        let p = parse_import_id("org1.vdc1.edge1.42", ".", layout, "nat-rule-id").unwrap();
        assert_eq!(p.org(), "org1");
        assert_eq!(p.vdc(), "vdc1");
        assert_eq!(p.edge_gateway(), "edge1");
        assert_eq!(p.entity, "42");
    }

    #[test]
    fn test_parse_custom_separator_keeps_dots() {
        let layout = ImportLayout::OrgVdcEntity;
        let p = parse_import_id("my.org|vdc|net.1", "|", layout, "network-name").unwrap();
        assert_eq!(p.org(), "my.org");
        assert_eq!(p.entity, "net.1");
    }

    #[test]
    fn test_wrong_count_lists_layout() {
        let err = parse_import_id("org1.vdc1", ".", ImportLayout::OrgVdcEdgeEntity, "nat-rule-id")
            .unwrap_err()
            .to_string();
        assert!(
            err.contains("org-name.vdc-name.edge-gateway-name.nat-rule-id"),
            "{}",
            err
        );
    }

    #[test]
    fn test_empty_segment_rejected() {
        let layout = ImportLayout::OrgVdcEntity;
        assert!(parse_import_id("org1..net", ".", layout, "network-name").is_err());
    }

    #[test]
    fn test_empty_separator_falls_back_to_default() {
        let p = parse_import_id("a.b", "", ImportLayout::OrgEntity, "vdc-name").unwrap();
        assert_eq!(p.entity, "b");
    }
}

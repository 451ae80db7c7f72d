//! Catalog entities and lineage edge types as read from the authoritative store.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use std::fmt;
use std::str::FromStr;

use crate::error::LineageError;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Namespace {
    pub id: i64,
    pub name: String,
    pub description: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Dataset {
    pub id: i64,
    pub namespace_id: i64,
    pub namespace: String,
    pub name: String,
    pub description: Option<String>,
    pub source_type: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Field {
    pub id: i64,
    pub dataset_id: i64,
    pub name: String,
    pub data_type: Option<String>,
    pub nullable: bool,
    pub ordinal: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
    pub id: i64,
    pub namespace_id: i64,
    pub name: String,
    pub job_type: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Run {
    pub id: i64,
    pub job_id: i64,
    pub state: String,
    pub started_at: Option<DateTime<Utc>>,
    pub ended_at: Option<DateTime<Utc>>,
}

/// A dataset together with its ordered field definitions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatasetSchema {
    pub dataset: Dataset,
    pub fields: Vec<Field>,
}

/// Catalog-wide counts served by the statistics endpoint.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LineageStatistics {
    pub namespaces: i64,
    pub datasets: i64,
    pub fields: i64,
    pub jobs: i64,
    pub runs: i64,
    pub active_edges: i64,
    pub edges_by_subtype: std::collections::BTreeMap<String, i64>,
}

/// A (namespace, dataset, field) triple naming one column.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct FieldRef {
    pub namespace: String,
    pub dataset: String,
    pub field: String,
}

impl FieldRef {
    pub fn new(namespace: impl Into<String>, dataset: impl Into<String>, field: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            dataset: dataset.into(),
            field: field.into(),
        }
    }

    /// Deterministic graph node identifier for this column.
    ///
    /// `%` and `:` inside a component are percent-escaped, so every id has
    /// exactly three separators and distinct columns never share an id.
    pub fn node_id(&self) -> String {
        format!(
            "field:{}:{}:{}",
            escape_id_part(&self.namespace),
            escape_id_part(&self.dataset),
            escape_id_part(&self.field)
        )
    }
}

fn escape_id_part(value: &str) -> Cow<'_, str> {
    if !value.contains(['%', ':']) {
        return Cow::Borrowed(value);
    }
    let mut out = String::with_capacity(value.len() + 4);
    for c in value.chars() {
        match c {
            '%' => out.push_str("%25"),
            ':' => out.push_str("%3A"),
            other => out.push(other),
        }
    }
    Cow::Owned(out)
}

impl fmt::Display for FieldRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}.{}", self.namespace, self.dataset, self.field)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TransformationType {
    Direct,
    Indirect,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TransformationSubtype {
    Identity,
    Transformation,
    Aggregation,
    Join,
    Filter,
    GroupBy,
    Sort,
    Window,
    Conditional,
}

impl TransformationType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Direct => "DIRECT",
            Self::Indirect => "INDIRECT",
        }
    }
}

impl FromStr for TransformationType {
    type Err = LineageError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "DIRECT" => Ok(Self::Direct),
            "INDIRECT" => Ok(Self::Indirect),
            other => Err(LineageError::InvalidInput(format!(
                "unknown transformation type: {}",
                other
            ))),
        }
    }
}

impl TransformationSubtype {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Identity => "IDENTITY",
            Self::Transformation => "TRANSFORMATION",
            Self::Aggregation => "AGGREGATION",
            Self::Join => "JOIN",
            Self::Filter => "FILTER",
            Self::GroupBy => "GROUP_BY",
            Self::Sort => "SORT",
            Self::Window => "WINDOW",
            Self::Conditional => "CONDITIONAL",
        }
    }
}

impl FromStr for TransformationSubtype {
    type Err = LineageError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "IDENTITY" => Ok(Self::Identity),
            "TRANSFORMATION" => Ok(Self::Transformation),
            "AGGREGATION" => Ok(Self::Aggregation),
            "JOIN" => Ok(Self::Join),
            "FILTER" => Ok(Self::Filter),
            "GROUP_BY" => Ok(Self::GroupBy),
            "SORT" => Ok(Self::Sort),
            "WINDOW" => Ok(Self::Window),
            "CONDITIONAL" => Ok(Self::Conditional),
            other => Err(LineageError::InvalidInput(format!(
                "unknown transformation subtype: {}",
                other
            ))),
        }
    }
}

/// One column-to-column lineage edge. Read-only once loaded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DirectedEdge {
    pub source: FieldRef,
    pub target: FieldRef,
    pub transformation_type: TransformationType,
    pub transformation_subtype: TransformationSubtype,
    /// 0.0 to 1.0
    pub confidence: f64,
    pub active: bool,
    pub discovered_at: DateTime<Utc>,
}

impl DirectedEdge {
    /// Identifier used for cycle detection and cross-direction deduplication.
    ///
    /// Node ids carry exactly three colons each, so the `->` boundary is
    /// recoverable even when a field name itself contains `->`.
    pub fn edge_id(&self) -> String {
        format!("{}->{}", self.source.node_id(), self.target.node_id())
    }
}

/// Traversal direction relative to the seed column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Upstream,
    Downstream,
    Both,
}

impl Direction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Upstream => "upstream",
            Self::Downstream => "downstream",
            Self::Both => "both",
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Direction {
    type Err = LineageError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "upstream" => Ok(Self::Upstream),
            "downstream" => Ok(Self::Downstream),
            "both" => Ok(Self::Both),
            other => Err(LineageError::InvalidInput(format!(
                "direction must be upstream, downstream or both (got {})",
                other
            ))),
        }
    }
}

/// Limit/offset pagination for listings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Page {
    pub limit: usize,
    pub offset: usize,
}

impl Page {
    pub fn new(limit: usize, offset: usize) -> Self {
        Self { limit, offset }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_node_id_is_deterministic() {
        let a = FieldRef::new("warehouse", "orders", "customer_id");
        let b = FieldRef::new("warehouse", "orders", "customer_id");
        assert_eq!(a.node_id(), b.node_id());
        assert_eq!(a.node_id(), "field:warehouse:orders:customer_id");
    }

    #[test]
    fn test_node_id_escapes_separators() {
        let a = FieldRef::new("pg://host:5432", "db", "id");
        let b = FieldRef::new("pg://host", "5432:db", "id");
        assert_ne!(a.node_id(), b.node_id());
        assert_eq!(a.node_id(), "field:pg%3A//host%3A5432:db:id");
        assert_eq!(FieldRef::new("ns", "ds", "50%").node_id(), "field:ns:ds:50%25");
        assert_ne!(
            FieldRef::new("ns", "ds", "a%3Ab").node_id(),
            FieldRef::new("ns", "ds", "a:b").node_id()
        );
    }

    #[test]
    fn test_edge_id_distinguishes_arrow_in_names() {
        let edge = |source: FieldRef, target: FieldRef| DirectedEdge {
            source,
            target,
            transformation_type: TransformationType::Direct,
            transformation_subtype: TransformationSubtype::Identity,
            confidence: 1.0,
            active: true,
            discovered_at: Utc::now(),
        };
        let a = edge(FieldRef::new("ns", "ds", "x->field"), FieldRef::new("ns", "ds", "y"));
        let b = edge(FieldRef::new("ns", "ds", "x"), FieldRef::new("field", "ns", "ds->y"));
        assert_ne!(a.edge_id(), b.edge_id());
    }

    #[test]
    fn test_direction_parse() {
        assert_eq!("upstream".parse::<Direction>().unwrap(), Direction::Upstream);
        assert_eq!(" Downstream ".parse::<Direction>().unwrap(), Direction::Downstream);
        assert_eq!("BOTH".parse::<Direction>().unwrap(), Direction::Both);
        assert!("sideways".parse::<Direction>().is_err());
    }

    #[test]
    fn test_subtype_round_trips_through_str() {
        for subtype in [
            TransformationSubtype::Identity,
            TransformationSubtype::GroupBy,
            TransformationSubtype::Conditional,
        ] {
            assert_eq!(subtype.as_str().parse::<TransformationSubtype>().unwrap(), subtype);
        }
        assert!("PIVOT".parse::<TransformationSubtype>().is_err());
    }

    #[test]
    fn test_subtype_serializes_screaming_snake() {
        let json = serde_json::to_string(&TransformationSubtype::GroupBy).unwrap();
        assert_eq!(json, "\"GROUP_BY\"");
    }
}

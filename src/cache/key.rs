//! Cache key derivation.
//!
//! Keys have the shape `<prefix>:<entity>:<operation>:<p1>|<p2>|...`. Colons
//! separate the structural segments and pipes separate parameter values. The
//! characters `%`, `:` and `|` inside a parameter are percent-escaped, so the
//! parameter segment never contains a colon and distinct parameter tuples never
//! collide. Operators can rebuild any key with `lineage-cache key`.

use std::borrow::Cow;
use std::fmt;
use std::str::FromStr;

use crate::config::TtlConfig;
use crate::error::LineageError;
use crate::model::{Direction, Page};

/// Expiry category of cached data; each has its own configured TTL.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TtlClass {
    LineageGraph,
    EntityListing,
    Statistics,
    SchemaDefinition,
    SearchResult,
}

impl TtlClass {
    pub fn ttl_secs(&self, ttl: &TtlConfig) -> u64 {
        match self {
            Self::LineageGraph => ttl.lineage_graph_secs,
            Self::EntityListing => ttl.entity_listing_secs,
            Self::Statistics => ttl.statistics_secs,
            Self::SchemaDefinition => ttl.schema_definition_secs,
            Self::SearchResult => ttl.search_result_secs,
        }
    }
}

/// The read operations that go through the cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CacheOperation {
    LineageGraph,
    NamespaceList,
    DatasetList,
    LineageStatistics,
    DatasetSchema,
    DatasetSearch,
}

impl CacheOperation {
    pub const ALL: [CacheOperation; 6] = [
        Self::LineageGraph,
        Self::NamespaceList,
        Self::DatasetList,
        Self::LineageStatistics,
        Self::DatasetSchema,
        Self::DatasetSearch,
    ];

    /// Operator-facing name, accepted by [`FromStr`].
    pub fn name(&self) -> &'static str {
        match self {
            Self::LineageGraph => "lineage-graph",
            Self::NamespaceList => "namespace-list",
            Self::DatasetList => "dataset-list",
            Self::LineageStatistics => "lineage-stats",
            Self::DatasetSchema => "dataset-schema",
            Self::DatasetSearch => "search",
        }
    }

    fn segments(&self) -> (&'static str, &'static str) {
        match self {
            Self::LineageGraph => ("lineage", "graph"),
            Self::NamespaceList => ("namespace", "list"),
            Self::DatasetList => ("dataset", "list"),
            Self::LineageStatistics => ("lineage", "stats"),
            Self::DatasetSchema => ("dataset", "schema"),
            Self::DatasetSearch => ("dataset", "search"),
        }
    }

    pub fn ttl_class(&self) -> TtlClass {
        match self {
            Self::LineageGraph => TtlClass::LineageGraph,
            Self::NamespaceList | Self::DatasetList => TtlClass::EntityListing,
            Self::LineageStatistics => TtlClass::Statistics,
            Self::DatasetSchema => TtlClass::SchemaDefinition,
            Self::DatasetSearch => TtlClass::SearchResult,
        }
    }

    /// Parameter names in key order, for help output.
    pub fn param_names(&self) -> &'static [&'static str] {
        match self {
            Self::LineageGraph => &["dataset_id", "field", "direction"],
            Self::NamespaceList => &["limit", "offset"],
            Self::DatasetList => &["namespace_id", "limit", "offset"],
            Self::LineageStatistics => &[],
            Self::DatasetSchema => &["dataset_id"],
            Self::DatasetSearch => &["text", "limit"],
        }
    }
}

impl fmt::Display for CacheOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for CacheOperation {
    type Err = LineageError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|op| op.name() == s)
            .ok_or_else(|| LineageError::InvalidInput(format!("unknown cached operation: {}", s)))
    }
}

/// Canonical form of free-text search input: trimmed and upper-cased, so
/// inputs the case-insensitive search treats alike share one entry.
///
/// Only ASCII letters are folded, matching SQLite's built-in `UPPER`.
pub fn canonicalize_search_text(text: &str) -> String {
    text.trim().to_ascii_uppercase()
}

fn escape_param(value: &str) -> Cow<'_, str> {
    if !value.contains(['%', ':', '|']) {
        return Cow::Borrowed(value);
    }
    let mut out = String::with_capacity(value.len() + 8);
    for c in value.chars() {
        match c {
            '%' => out.push_str("%25"),
            ':' => out.push_str("%3A"),
            '|' => out.push_str("%7C"),
            other => out.push(other),
        }
    }
    Cow::Owned(out)
}

/// Derives cache keys under a fixed prefix.
#[derive(Debug, Clone)]
pub struct CacheKeys {
    prefix: String,
}

impl CacheKeys {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
        }
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Key for `op` with positional parameters. For [`CacheOperation::DatasetSearch`]
    /// the first parameter is the search text and is canonicalized first.
    pub fn key<S: AsRef<str>>(&self, op: CacheOperation, params: &[S]) -> String {
        let (entity, action) = op.segments();
        let encoded: Vec<String> = params
            .iter()
            .enumerate()
            .map(|(i, p)| {
                let raw = p.as_ref();
                if op == CacheOperation::DatasetSearch && i == 0 {
                    escape_param(&canonicalize_search_text(raw)).into_owned()
                } else {
                    escape_param(raw).into_owned()
                }
            })
            .collect();
        format!("{}:{}:{}:{}", self.prefix, entity, action, encoded.join("|"))
    }

    /// The depth bound is not part of the key.
    pub fn lineage_graph(&self, dataset_id: i64, field: &str, direction: Direction) -> String {
        self.key(
            CacheOperation::LineageGraph,
            &[dataset_id.to_string().as_str(), field, direction.as_str()],
        )
    }

    pub fn namespace_list(&self, page: Page) -> String {
        self.key(
            CacheOperation::NamespaceList,
            &[page.limit.to_string(), page.offset.to_string()],
        )
    }

    pub fn dataset_list(&self, namespace_id: i64, page: Page) -> String {
        self.key(
            CacheOperation::DatasetList,
            &[
                namespace_id.to_string(),
                page.limit.to_string(),
                page.offset.to_string(),
            ],
        )
    }

    pub fn lineage_statistics(&self) -> String {
        self.key::<&str>(CacheOperation::LineageStatistics, &[])
    }

    pub fn dataset_schema(&self, dataset_id: i64) -> String {
        self.key(CacheOperation::DatasetSchema, &[dataset_id.to_string()])
    }

    pub fn dataset_search(&self, text: &str, limit: usize) -> String {
        self.key(
            CacheOperation::DatasetSearch,
            &[text, limit.to_string().as_str()],
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn keys() -> CacheKeys {
        CacheKeys::new("ol")
    }

    #[test]
    fn test_lineage_graph_key_format() {
        let op: CacheOperation = "lineage-graph".parse().unwrap();
        assert_eq!(
            keys().key(op, &["42", "customer_id", "upstream"]),
            "ol:lineage:graph:42|customer_id|upstream"
        );
        assert_eq!(
            keys().lineage_graph(42, "customer_id", Direction::Upstream),
            "ol:lineage:graph:42|customer_id|upstream"
        );
    }

    #[test]
    fn test_search_text_canonicalized() {
        let op: CacheOperation = "search".parse().unwrap();
        let a = keys().key(op, &["  Customers  "]);
        let b = keys().key(op, &["CUSTOMERS"]);
        let c = keys().key(op, &["customers"]);
        assert_eq!(a, b);
        assert_eq!(b, c);
        assert_eq!(a, "ol:dataset:search:CUSTOMERS");
    }

    #[test]
    fn test_search_text_folds_ascii_only() {
        assert_eq!(canonicalize_search_text(" café "), "CAFé");
        assert_ne!(canonicalize_search_text("café"), canonicalize_search_text("CAFÉ"));
    }

    #[test]
    fn test_non_search_params_not_canonicalized() {
        let lower = keys().lineage_graph(1, "customer_id", Direction::Both);
        let upper = keys().lineage_graph(1, "CUSTOMER_ID", Direction::Both);
        assert_ne!(lower, upper);
    }

    #[test]
    fn test_deterministic_and_distinct() {
        let k = keys();
        assert_eq!(
            k.dataset_list(3, Page::new(50, 0)),
            k.dataset_list(3, Page::new(50, 0))
        );
        assert_ne!(k.dataset_list(3, Page::new(50, 0)), k.dataset_list(3, Page::new(50, 50)));
        assert_ne!(k.dataset_list(3, Page::new(50, 0)), k.dataset_list(4, Page::new(50, 0)));
        assert_ne!(
            k.lineage_graph(1, "a", Direction::Upstream),
            k.lineage_graph(1, "a", Direction::Downstream)
        );
    }

    #[test]
    fn test_separators_escaped() {
        let k = keys();
        // Without escaping these would both render as "1|a|b|upstream"
        let a = k.key(CacheOperation::LineageGraph, &["1", "a|b", "upstream"]);
        let b = k.key(CacheOperation::LineageGraph, &["1|a", "b", "upstream"]);
        assert_ne!(a, b);

        let with_colon = k.lineage_graph(1, "x:y", Direction::Both);
        let params = with_colon.splitn(4, ':').nth(3).unwrap();
        assert!(!params.contains(':'));
        assert_eq!(params, "1|x%3Ay|both");
    }

    #[test]
    fn test_percent_escaped_before_others() {
        let k = keys();
        assert_ne!(
            k.key(CacheOperation::DatasetSchema, &["a%3Ab"]),
            k.key(CacheOperation::DatasetSchema, &["a:b"])
        );
    }

    #[test]
    fn test_statistics_key_has_empty_param_segment() {
        assert_eq!(keys().lineage_statistics(), "ol:lineage:stats:");
    }

    #[test]
    fn test_operation_names_round_trip() {
        for op in CacheOperation::ALL {
            assert_eq!(op.name().parse::<CacheOperation>().unwrap(), op);
        }
        assert!("entity-lookup".parse::<CacheOperation>().is_err());
    }

    #[test]
    fn test_ttl_classes() {
        let ttl = TtlConfig {
            lineage_graph_secs: 1,
            entity_listing_secs: 2,
            statistics_secs: 3,
            schema_definition_secs: 4,
            search_result_secs: 5,
        };
        assert_eq!(CacheOperation::LineageGraph.ttl_class().ttl_secs(&ttl), 1);
        assert_eq!(CacheOperation::NamespaceList.ttl_class().ttl_secs(&ttl), 2);
        assert_eq!(CacheOperation::DatasetList.ttl_class().ttl_secs(&ttl), 2);
        assert_eq!(CacheOperation::LineageStatistics.ttl_class().ttl_secs(&ttl), 3);
        assert_eq!(CacheOperation::DatasetSchema.ttl_class().ttl_secs(&ttl), 4);
        assert_eq!(CacheOperation::DatasetSearch.ttl_class().ttl_secs(&ttl), 5);
    }
}

//! Canonicalization of SQL text and schema trees for stable comparison.
//!
//! Normalization only ever feeds comparisons. DDL that is written to a
//! migration file is rendered from the original model, never from a
//! normalized copy.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::schema::{Column, Index, Schema, Table};

/// Comparison-stability knobs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NormalizeOptions {
    /// Fold identifiers and text to lowercase.
    pub case_insensitive: bool,
    /// Collapse whitespace runs to a single space and trim the ends.
    pub trim_spaces: bool,
    /// Order sibling nodes by kind, then name.
    pub sort_elements: bool,
}

impl Default for NormalizeOptions {
    fn default() -> Self {
        Self {
            case_insensitive: false,
            trim_spaces: true,
            sort_elements: false,
        }
    }
}

impl NormalizeOptions {
    /// All knobs on: what schema comparison uses.
    #[must_use]
    pub fn comparison() -> Self {
        Self {
            case_insensitive: true,
            trim_spaces: true,
            sort_elements: true,
        }
    }
}

/// Normalizes SQL text. Total: never fails, never mutates its input.
#[must_use]
pub fn normalize_sql(text: &str, options: NormalizeOptions) -> String {
    let collapsed = if options.trim_spaces {
        text.split_whitespace().collect::<Vec<_>>().join(" ")
    } else {
        text.to_string()
    };

    if options.case_insensitive {
        collapsed.to_lowercase()
    } else {
        collapsed
    }
}

/// Kind of a schema tree node. The declaration order is the sort order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum NodeKind {
    /// The schema itself.
    Root,
    /// A table.
    Table,
    /// A column of a table.
    Column,
    /// An index.
    Index,
    /// A constraint (foreign key).
    Constraint,
}

/// A generic schema tree node, the shape schema sources are compared in.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchemaNode {
    /// Node kind.
    pub kind: NodeKind,
    /// Node name.
    pub name: String,
    /// Child nodes.
    pub children: Vec<SchemaNode>,
    /// Extra attributes (type, nullability, ...).
    pub metadata: BTreeMap<String, String>,
}

impl SchemaNode {
    /// Creates a childless node.
    #[must_use]
    pub fn new(kind: NodeKind, name: impl Into<String>) -> Self {
        Self {
            kind,
            name: name.into(),
            children: Vec::new(),
            metadata: BTreeMap::new(),
        }
    }

    /// Adds a metadata entry.
    #[must_use]
    pub fn with_meta(mut self, key: &str, value: impl Into<String>) -> Self {
        self.metadata.insert(key.to_string(), value.into());
        self
    }

    /// Adds a child node.
    #[must_use]
    pub fn with_child(mut self, child: SchemaNode) -> Self {
        self.children.push(child);
        self
    }
}

/// Returns a normalized copy of `node` and its whole subtree.
#[must_use]
pub fn normalize_node(node: &SchemaNode, options: NormalizeOptions) -> SchemaNode {
    let mut children: Vec<SchemaNode> = node
        .children
        .iter()
        .map(|child| normalize_node(child, options))
        .collect();

    if options.sort_elements {
        children.sort_by(|a, b| a.kind.cmp(&b.kind).then_with(|| a.name.cmp(&b.name)));
    }

    SchemaNode {
        kind: node.kind,
        name: normalize_sql(&node.name, options),
        children,
        metadata: node
            .metadata
            .iter()
            .map(|(k, v)| (k.clone(), normalize_sql(v, options)))
            .collect(),
    }
}

impl Column {
    /// Tree form of the column; a foreign key becomes a constraint child.
    #[must_use]
    pub fn to_node(&self) -> SchemaNode {
        let mut node = SchemaNode::new(NodeKind::Column, self.name())
            .with_meta("type", self.data_type())
            .with_meta("nullable", self.nullable.to_string())
            .with_meta("primary_key", self.primary_key.to_string())
            .with_meta("unique", self.unique.to_string());
        if let Some(ref default) = self.default {
            node = node.with_meta("default", default.clone());
        }
        if let Some(ref fk) = self.references {
            node = node.with_child(
                SchemaNode::new(NodeKind::Constraint, format!("fk_{}", self.name()))
                    .with_meta("references", format!("{}({})", fk.table, fk.column)),
            );
        }
        node
    }
}

impl Index {
    /// Tree form of the index.
    #[must_use]
    pub fn to_node(&self) -> SchemaNode {
        SchemaNode::new(NodeKind::Index, self.name())
            .with_meta("table", self.table())
            .with_meta("columns", self.columns().join(", "))
            .with_meta("unique", self.unique.to_string())
    }
}

impl Table {
    /// Tree form of the table: columns then indexes as children.
    #[must_use]
    pub fn to_node(&self) -> SchemaNode {
        let mut node = SchemaNode::new(NodeKind::Table, self.name());
        node.children.extend(self.columns().iter().map(Column::to_node));
        node.children.extend(self.indexes().iter().map(Index::to_node));
        node
    }
}

impl Schema {
    /// Tree form of the whole schema.
    #[must_use]
    pub fn to_node(&self) -> SchemaNode {
        let mut root = SchemaNode::new(NodeKind::Root, self.name());
        root.children.extend(self.tables().iter().map(Table::to_node));
        root.children.extend(self.indexes().iter().map(Index::to_node));
        root
    }

    /// Whether both schemas normalize to the same tree.
    #[must_use]
    pub fn equivalent(&self, other: &Self, options: NormalizeOptions) -> bool {
        normalize_node(&self.to_node(), options) == normalize_node(&other.to_node(), options)
    }
}

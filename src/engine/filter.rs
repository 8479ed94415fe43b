//! Filter IR
//!
//! Backend-agnostic description of which rows or documents a statement
//! touches, how they are ordered, and which values it writes. Nothing here
//! validates operators; that happens when a compiler lowers the IR.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

use super::error::{QueryError, Result};

/// Comparison operators understood by both compilers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OperatorTag {
    Eq,
    Ne,
    Gt,
    Gte,
    Lt,
    Lte,
    In,
    Nin,
    Like,
    Ilike,
    Between,
}

impl OperatorTag {
    pub fn as_str(&self) -> &'static str {
        match self {
            OperatorTag::Eq => "eq",
            OperatorTag::Ne => "ne",
            OperatorTag::Gt => "gt",
            OperatorTag::Gte => "gte",
            OperatorTag::Lt => "lt",
            OperatorTag::Lte => "lte",
            OperatorTag::In => "in",
            OperatorTag::Nin => "nin",
            OperatorTag::Like => "like",
            OperatorTag::Ilike => "ilike",
            OperatorTag::Between => "between",
        }
    }

    /// Parse an operator tag. The document store's `$` prefix is accepted so
    /// `gte` and `$gte` name the same operator.
    pub fn parse(tag: &str) -> Result<Self> {
        let bare = tag.strip_prefix('$').unwrap_or(tag);
        match bare {
            "eq" => Ok(OperatorTag::Eq),
            "ne" => Ok(OperatorTag::Ne),
            "gt" => Ok(OperatorTag::Gt),
            "gte" => Ok(OperatorTag::Gte),
            "lt" => Ok(OperatorTag::Lt),
            "lte" => Ok(OperatorTag::Lte),
            "in" => Ok(OperatorTag::In),
            "nin" => Ok(OperatorTag::Nin),
            "like" => Ok(OperatorTag::Like),
            "ilike" => Ok(OperatorTag::Ilike),
            "between" => Ok(OperatorTag::Between),
            _ => Err(QueryError::InvalidFilterOperator(tag.to_string())),
        }
    }

    /// Operators whose operand is a whole list rather than a scalar
    pub fn takes_list(&self) -> bool {
        matches!(self, OperatorTag::In | OperatorTag::Nin | OperatorTag::Between)
    }
}

impl fmt::Display for OperatorTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single `(operator, operand)` pair exactly as the caller wrote it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Condition {
    pub op: String,
    pub value: Value,
}

impl Condition {
    pub fn new(op: impl Into<String>, value: impl Into<Value>) -> Self {
        Self {
            op: op.into(),
            value: value.into(),
        }
    }

    pub fn tag(&self) -> Result<OperatorTag> {
        OperatorTag::parse(&self.op)
    }

    /// Split an OR-group condition into disjuncts.
    ///
    /// Scalar operators explode a list operand into one disjunct per element.
    /// List operators keep their operand whole unless it is a list of lists.
    pub fn disjuncts(&self) -> Result<Vec<(OperatorTag, Value)>> {
        let tag = self.tag()?;
        let out = match &self.value {
            Value::Array(items) if !tag.takes_list() => {
                items.iter().map(|v| (tag, v.clone())).collect()
            }
            Value::Array(items) if !items.is_empty() && items.iter().all(Value::is_array) => {
                items.iter().map(|v| (tag, v.clone())).collect()
            }
            value => vec![(tag, value.clone())],
        };
        Ok(out)
    }
}

/// Ordered operator list; all entries apply with AND
pub type OperatorSet = Vec<Condition>;

/// Match condition for one field
#[derive(Debug, Clone, PartialEq)]
pub enum FieldFilter {
    Equals(Value),
    OperatorSet(OperatorSet),
}

impl FieldFilter {
    /// JSON objects are operator mappings, anything else is an equality match
    pub fn from_json(value: Value) -> Self {
        match value {
            Value::Object(map) => FieldFilter::OperatorSet(
                map.into_iter()
                    .map(|(op, value)| Condition { op, value })
                    .collect(),
            ),
            other => FieldFilter::Equals(other),
        }
    }

    pub fn op(op: impl Into<String>, value: impl Into<Value>) -> Self {
        FieldFilter::OperatorSet(vec![Condition::new(op, value)])
    }

    /// Conditions in supply order, a bare value counting as `eq`
    pub fn conditions(&self) -> Vec<Condition> {
        match self {
            FieldFilter::Equals(v) => vec![Condition::new("eq", v.clone())],
            FieldFilter::OperatorSet(set) => set.clone(),
        }
    }

    fn merge(self, other: FieldFilter) -> FieldFilter {
        let mut conditions = self.conditions();
        conditions.extend(other.conditions());
        FieldFilter::OperatorSet(conditions)
    }
}

impl From<Value> for FieldFilter {
    fn from(value: Value) -> Self {
        FieldFilter::from_json(value)
    }
}

/// Conjunctive match clause: field name to condition, keys unique
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FilterSpec {
    entries: Vec<(String, FieldFilter)>,
}

impl FilterSpec {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_json(map: Map<String, Value>) -> Self {
        let mut spec = Self::new();
        for (field, value) in map {
            spec.insert(field, FieldFilter::from_json(value));
        }
        spec
    }

    /// Add a condition. A field that is already constrained keeps its old
    /// conditions and gains the new ones.
    pub fn insert(&mut self, field: impl Into<String>, filter: FieldFilter) {
        let field = field.into();
        if let Some(slot) = self.entries.iter_mut().find(|(name, _)| *name == field) {
            let existing = std::mem::replace(&mut slot.1, FieldFilter::OperatorSet(Vec::new()));
            slot.1 = existing.merge(filter);
        } else {
            self.entries.push((field, filter));
        }
    }

    pub fn get(&self, field: &str) -> Option<&FieldFilter> {
        self.entries
            .iter()
            .find(|(name, _)| name == field)
            .map(|(_, filter)| filter)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &FieldFilter)> {
        self.entries.iter().map(|(name, filter)| (name.as_str(), filter))
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }
}

/// Disjunctive groups: one OR-group per field, groups combined with AND
#[derive(Debug, Clone, Default, PartialEq)]
pub struct OrFilterSpec {
    groups: Vec<(String, OperatorSet)>,
}

impl OrFilterSpec {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_json(map: Map<String, Value>) -> Self {
        let mut spec = Self::new();
        for (field, value) in map {
            spec.insert(field, FieldFilter::from_json(value).conditions());
        }
        spec
    }

    pub fn insert(&mut self, field: impl Into<String>, conditions: OperatorSet) {
        let field = field.into();
        if let Some(slot) = self.groups.iter_mut().find(|(name, _)| *name == field) {
            slot.1.extend(conditions);
        } else {
            self.groups.push((field, conditions));
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &OperatorSet)> {
        self.groups.iter().map(|(name, set)| (name.as_str(), set))
    }

    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }
}

/// Sort direction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortDirection {
    #[default]
    Asc,
    Desc,
}

impl fmt::Display for SortDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SortDirection::Asc => write!(f, "ASC"),
            SortDirection::Desc => write!(f, "DESC"),
        }
    }
}

/// Reference to a schema field or a raw backend expression
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldRef {
    Field(String),
    Raw(String),
}

impl FieldRef {
    pub fn field(name: impl Into<String>) -> Self {
        FieldRef::Field(name.into())
    }

    pub fn raw(expr: impl Into<String>) -> Self {
        FieldRef::Raw(expr.into())
    }
}

impl From<&str> for FieldRef {
    fn from(name: &str) -> Self {
        FieldRef::Field(name.to_string())
    }
}

impl From<String> for FieldRef {
    fn from(name: String) -> Self {
        FieldRef::Field(name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderTerm {
    pub target: FieldRef,
    pub direction: SortDirection,
}

#[derive(Debug, Clone, PartialEq)]
pub struct HavingTerm {
    pub target: FieldRef,
    pub condition: Condition,
}

/// Distinct selection
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Distinct {
    #[default]
    None,
    All,
    On(Vec<FieldRef>),
}

impl Distinct {
    pub fn is_set(&self) -> bool {
        !matches!(self, Distinct::None)
    }
}

/// Values written by insert or update: one map, or one map per row
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MutationSpec {
    Single(Map<String, Value>),
    Batch(Vec<Map<String, Value>>),
}

impl MutationSpec {
    pub fn is_batch(&self) -> bool {
        matches!(self, MutationSpec::Batch(_))
    }

    pub fn rows(&self) -> Vec<&Map<String, Value>> {
        match self {
            MutationSpec::Single(row) => vec![row],
            MutationSpec::Batch(rows) => rows.iter().collect(),
        }
    }

    /// Apply `f` to every row, keeping the single/batch shape
    pub fn map_rows<F>(&self, mut f: F) -> MutationSpec
    where
        F: FnMut(&Map<String, Value>) -> Map<String, Value>,
    {
        match self {
            MutationSpec::Single(row) => MutationSpec::Single(f(row)),
            MutationSpec::Batch(rows) => MutationSpec::Batch(rows.iter().map(f).collect()),
        }
    }
}

impl From<Map<String, Value>> for MutationSpec {
    fn from(row: Map<String, Value>) -> Self {
        MutationSpec::Single(row)
    }
}

impl From<Vec<Map<String, Value>>> for MutationSpec {
    fn from(rows: Vec<Map<String, Value>>) -> Self {
        MutationSpec::Batch(rows)
    }
}

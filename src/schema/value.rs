//! Attribute values
//!
//! Tagged representation of everything a state bag can hold. Nested blocks
//! are plain attribute maps; unordered sets are keyed by their element hash so
//! membership and iteration order are deterministic.

use serde::Serialize;
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};

/// A nested block: attribute name -> value.
pub type Block = BTreeMap<String, AttrValue>;

/// Hash function projecting a block to its set identity.
pub type SetHashFn = fn(&Block) -> u32;

/// Value of a single attribute
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum AttrValue {
    String(String),
    Int(i64),
    Float(f64),
    Bool(bool),
    Map(BTreeMap<String, String>),
    StringSet(BTreeSet<String>),
    List(Vec<Block>),
    Set(BlockSet),
}

impl AttrValue {
    /// Name of the variant, used in type-mismatch errors.
    pub fn type_name(&self) -> &'static str {
        match self {
            AttrValue::String(_) => "string",
            AttrValue::Int(_) => "int",
            AttrValue::Float(_) => "float",
            AttrValue::Bool(_) => "bool",
            AttrValue::Map(_) => "map",
            AttrValue::StringSet(_) => "string set",
            AttrValue::List(_) => "list",
            AttrValue::Set(_) => "set",
        }
    }

    /// True for the zero value of every type.
    pub fn is_zero(&self) -> bool {
        match self {
            AttrValue::String(s) => s.is_empty(),
            AttrValue::Int(i) => *i == 0,
            AttrValue::Float(f) => *f == 0.0,
            AttrValue::Bool(b) => !b,
            AttrValue::Map(m) => m.is_empty(),
            AttrValue::StringSet(s) => s.is_empty(),
            AttrValue::List(l) => l.is_empty(),
            AttrValue::Set(s) => s.is_empty(),
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            AttrValue::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            AttrValue::Int(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            AttrValue::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_float(&self) -> Option<f64> {
        match self {
            AttrValue::Float(f) => Some(*f),
            AttrValue::Int(i) => Some(*i as f64),
            _ => None,
        }
    }

    /// Scalar rendering fed to diff suppressors. Collections render as JSON.
    pub fn to_diff_string(&self) -> String {
        match self {
            AttrValue::String(s) => s.clone(),
            AttrValue::Int(i) => i.to_string(),
            AttrValue::Float(f) => f.to_string(),
            AttrValue::Bool(b) => b.to_string(),
            other => serde_json::to_string(other).unwrap_or_default(),
        }
    }

    pub fn to_json(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }
}

impl From<&str> for AttrValue {
    fn from(value: &str) -> Self {
        AttrValue::String(value.to_string())
    }
}

impl From<String> for AttrValue {
    fn from(value: String) -> Self {
        AttrValue::String(value)
    }
}

impl From<&String> for AttrValue {
    fn from(value: &String) -> Self {
        AttrValue::String(value.clone())
    }
}

impl From<i64> for AttrValue {
    fn from(value: i64) -> Self {
        AttrValue::Int(value)
    }
}

impl From<i32> for AttrValue {
    fn from(value: i32) -> Self {
        AttrValue::Int(value as i64)
    }
}

impl From<u32> for AttrValue {
    fn from(value: u32) -> Self {
        AttrValue::Int(value as i64)
    }
}

impl From<f64> for AttrValue {
    fn from(value: f64) -> Self {
        AttrValue::Float(value)
    }
}

impl From<bool> for AttrValue {
    fn from(value: bool) -> Self {
        AttrValue::Bool(value)
    }
}

impl From<BTreeMap<String, String>> for AttrValue {
    fn from(value: BTreeMap<String, String>) -> Self {
        AttrValue::Map(value)
    }
}

impl From<BTreeSet<String>> for AttrValue {
    fn from(value: BTreeSet<String>) -> Self {
        AttrValue::StringSet(value)
    }
}

impl From<Vec<Block>> for AttrValue {
    fn from(value: Vec<Block>) -> Self {
        AttrValue::List(value)
    }
}

/// Unordered set of blocks with hash identity.
///
/// Two blocks with the same hash are the same element; inserting the second
/// replaces the first.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BlockSet {
    items: BTreeMap<u32, Block>,
}

impl BlockSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_blocks(blocks: impl IntoIterator<Item = Block>, hash: SetHashFn) -> Self {
        let mut set = Self::new();
        for block in blocks {
            set.insert(block, hash);
        }
        set
    }

    pub fn insert(&mut self, block: Block, hash: SetHashFn) -> u32 {
        let code = hash(&block);
        self.items.insert(code, block);
        code
    }

    pub fn contains_hash(&self, code: u32) -> bool {
        self.items.contains_key(&code)
    }

    pub fn hashes(&self) -> impl Iterator<Item = u32> + '_ {
        self.items.keys().copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Block> {
        self.items.values()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

impl Serialize for BlockSet {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_seq(self.items.values())
    }
}

/// Typed field access on nested blocks. Missing or mistyped fields read as
/// the zero value, like attributes the user left unset.
pub trait BlockExt {
    fn str_field(&self, key: &str) -> &str;
    fn int_field(&self, key: &str) -> i64;
    fn bool_field(&self, key: &str) -> bool;
    fn float_field(&self, key: &str) -> f64;
}

impl BlockExt for Block {
    fn str_field(&self, key: &str) -> &str {
        self.get(key).and_then(AttrValue::as_str).unwrap_or("")
    }

    fn int_field(&self, key: &str) -> i64 {
        self.get(key).and_then(AttrValue::as_int).unwrap_or(0)
    }

    fn bool_field(&self, key: &str) -> bool {
        self.get(key).and_then(AttrValue::as_bool).unwrap_or(false)
    }

    fn float_field(&self, key: &str) -> f64 {
        self.get(key).and_then(AttrValue::as_float).unwrap_or(0.0)
    }
}

/// Build a block from `(name, value)` pairs.
pub fn block<I, K, V>(fields: I) -> Block
where
    I: IntoIterator<Item = (K, V)>,
    K: Into<String>,
    V: Into<AttrValue>,
{
    fields
        .into_iter()
        .map(|(k, v)| (k.into(), v.into()))
        .collect()
}

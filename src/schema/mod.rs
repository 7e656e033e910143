//! Schema declarations
//!
//! Every resource kind declares its contract as a [`Schema`]: a map of
//! attribute name to [`Attribute`]. Nested blocks are schemas themselves, so
//! the whole declaration is a recursive descriptor that can be walked with a
//! [`SchemaVisitor`].
//!
//! # Module Structure
//!
//! - [`value`] - tagged attribute values, blocks and hash-keyed block sets
//! - [`hash`] - frozen set hashers
//! - [`validate`] - plan-time validators and diagnostics
//! - [`diff`] - diff suppressors and the plan engine

pub mod diff;
pub mod hash;
pub mod validate;
pub mod value;

use anyhow::{bail, Result};
use serde_json::{json, Map, Value};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

pub use diff::DiffSuppressor;
pub use validate::{Diagnostics, Validator};
pub use value::{block, AttrValue, Block, BlockExt, BlockSet, SetHashFn};

/// Semantic type of an attribute
#[derive(Clone)]
pub enum AttrType {
    String,
    Int,
    Float,
    Bool,
    StringMap,
    StringSet,
    /// Ordered list of nested blocks
    List(Schema),
    /// Unordered set of nested blocks
    Set(Schema),
}

impl AttrType {
    pub fn name(&self) -> &'static str {
        match self {
            AttrType::String => "string",
            AttrType::Int => "int",
            AttrType::Float => "float",
            AttrType::Bool => "bool",
            AttrType::StringMap => "map",
            AttrType::StringSet => "string set",
            AttrType::List(_) => "list",
            AttrType::Set(_) => "set",
        }
    }

    /// Does `value` have this declared type?
    pub fn accepts(&self, value: &AttrValue) -> bool {
        matches!(
            (self, value),
            (AttrType::String, AttrValue::String(_))
                | (AttrType::Int, AttrValue::Int(_))
                | (AttrType::Float, AttrValue::Float(_))
                | (AttrType::Bool, AttrValue::Bool(_))
                | (AttrType::StringMap, AttrValue::Map(_))
                | (AttrType::StringSet, AttrValue::StringSet(_))
                | (AttrType::List(_), AttrValue::List(_))
                | (AttrType::Set(_), AttrValue::Set(_))
        )
    }

    /// Nested block schema for list/set types.
    pub fn block_schema(&self) -> Option<&Schema> {
        match self {
            AttrType::List(s) | AttrType::Set(s) => Some(s),
            _ => None,
        }
    }
}

/// Declaration of a single attribute
#[derive(Clone)]
pub struct Attribute {
    pub ty: AttrType,
    pub required: bool,
    pub optional: bool,
    pub computed: bool,
    pub force_new: bool,
    pub sensitive: bool,
    pub default: Option<AttrValue>,
    pub description: &'static str,
    pub deprecated: Option<&'static str>,
    pub conflicts_with: Vec<&'static str>,
    pub max_items: Option<usize>,
    pub validator: Option<Validator>,
    pub diff_suppress: Option<DiffSuppressor>,
    pub set_hash: Option<SetHashFn>,
}

impl fmt::Debug for Attribute {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Attribute")
            .field("type", &self.ty.name())
            .field("required", &self.required)
            .field("optional", &self.optional)
            .field("computed", &self.computed)
            .field("force_new", &self.force_new)
            .field("default", &self.default)
            .finish_non_exhaustive()
    }
}

impl Attribute {
    fn new(ty: AttrType) -> Self {
        Self {
            ty,
            required: false,
            optional: false,
            computed: false,
            force_new: false,
            sensitive: false,
            default: None,
            description: "",
            deprecated: None,
            conflicts_with: Vec::new(),
            max_items: None,
            validator: None,
            diff_suppress: None,
            set_hash: None,
        }
    }

    pub fn string() -> Self {
        Self::new(AttrType::String)
    }

    pub fn int() -> Self {
        Self::new(AttrType::Int)
    }

    pub fn float() -> Self {
        Self::new(AttrType::Float)
    }

    pub fn bool() -> Self {
        Self::new(AttrType::Bool)
    }

    pub fn string_map() -> Self {
        Self::new(AttrType::StringMap)
    }

    pub fn string_set() -> Self {
        Self::new(AttrType::StringSet)
    }

    pub fn list(block: Schema) -> Self {
        Self::new(AttrType::List(block))
    }

    pub fn set(block: Schema) -> Self {
        Self::new(AttrType::Set(block))
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    pub fn optional(mut self) -> Self {
        self.optional = true;
        self
    }

    pub fn computed(mut self) -> Self {
        self.computed = true;
        self
    }

    pub fn force_new(mut self) -> Self {
        self.force_new = true;
        self
    }

    pub fn sensitive(mut self) -> Self {
        self.sensitive = true;
        self
    }

    pub fn default(mut self, value: impl Into<AttrValue>) -> Self {
        self.default = Some(value.into());
        self
    }

    pub fn description(mut self, text: &'static str) -> Self {
        self.description = text;
        self
    }

    pub fn deprecated(mut self, message: &'static str) -> Self {
        self.deprecated = Some(message);
        self
    }

    pub fn conflicts_with(mut self, names: &[&'static str]) -> Self {
        self.conflicts_with = names.to_vec();
        self
    }

    pub fn max_items(mut self, n: usize) -> Self {
        self.max_items = Some(n);
        self
    }

    pub fn validate(mut self, validator: Validator) -> Self {
        self.validator = Some(validator);
        self
    }

    pub fn diff_suppress(mut self, suppressor: DiffSuppressor) -> Self {
        self.diff_suppress = Some(suppressor);
        self
    }

    pub fn set_hash(mut self, hash: SetHashFn) -> Self {
        self.set_hash = Some(hash);
        self
    }

    /// Computed-only attributes are never part of the user's configuration.
    pub fn is_computed_only(&self) -> bool {
        self.computed && !self.optional && !self.required
    }

    fn hasher(&self) -> SetHashFn {
        self.set_hash.unwrap_or(hash::default_block_hash)
    }

    /// Build a block set using this attribute's hasher.
    pub fn make_set(&self, blocks: impl IntoIterator<Item = Block>) -> BlockSet {
        BlockSet::from_blocks(blocks, self.hasher())
    }

    /// Convert a JSON configuration value into the declared type.
    /// `null` is treated as "not set".
    pub fn value_from_json(&self, value: &Value, path: &str) -> Result<Option<AttrValue>> {
        if value.is_null() {
            return Ok(None);
        }
        let converted = match (&self.ty, value) {
            (AttrType::String, Value::String(s)) => AttrValue::String(s.clone()),
            (AttrType::Int, Value::Number(n)) if n.is_i64() => {
                AttrValue::Int(n.as_i64().unwrap_or_default())
            }
            (AttrType::Float, Value::Number(n)) => AttrValue::Float(n.as_f64().unwrap_or_default()),
            (AttrType::Bool, Value::Bool(b)) => AttrValue::Bool(*b),
            (AttrType::StringMap, Value::Object(map)) => {
                let mut out = BTreeMap::new();
                for (k, v) in map {
                    let Some(s) = v.as_str() else {
                        bail!("{}.{}: expected string map value", path, k);
                    };
                    out.insert(k.clone(), s.to_string());
                }
                AttrValue::Map(out)
            }
            (AttrType::StringSet, Value::Array(items)) => {
                let mut out = BTreeSet::new();
                for item in items {
                    let Some(s) = item.as_str() else {
                        bail!("{}: expected a set of strings", path);
                    };
                    out.insert(s.to_string());
                }
                AttrValue::StringSet(out)
            }
            (AttrType::List(schema), Value::Array(items)) => {
                let mut blocks = Vec::with_capacity(items.len());
                for (i, item) in items.iter().enumerate() {
                    blocks.push(schema.block_from_json(item, &format!("{}.{}", path, i))?);
                }
                AttrValue::List(blocks)
            }
            (AttrType::Set(schema), Value::Array(items)) => {
                let mut blocks = Vec::with_capacity(items.len());
                for (i, item) in items.iter().enumerate() {
                    blocks.push(schema.block_from_json(item, &format!("{}.{}", path, i))?);
                }
                AttrValue::Set(self.make_set(blocks))
            }
            (ty, other) => bail!(
                "{}: expected {}, got {}",
                path,
                ty.name(),
                json_type_name(other)
            ),
        };
        Ok(Some(converted))
    }
}

fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Visitor over a (possibly nested) schema.
pub trait SchemaVisitor {
    /// Called once per attribute; `path` is dot-separated from the root.
    fn visit(&mut self, path: &str, attribute: &Attribute);
}

/// Attribute map of a resource, data source or nested block
#[derive(Clone, Default)]
pub struct Schema {
    attributes: BTreeMap<&'static str, Attribute>,
}

impl fmt::Debug for Schema {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map().entries(self.attributes.iter()).finish()
    }
}

impl Schema {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn attr(mut self, name: &'static str, attribute: Attribute) -> Self {
        self.attributes.insert(name, attribute);
        self
    }

    /// Merge another schema's attributes into this one.
    pub fn merge(mut self, other: Schema) -> Self {
        self.attributes.extend(other.attributes);
        self
    }

    pub fn get(&self, name: &str) -> Option<&Attribute> {
        self.attributes.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.attributes.contains_key(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&'static str, &Attribute)> {
        self.attributes.iter().map(|(k, v)| (*k, v))
    }

    pub fn len(&self) -> usize {
        self.attributes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.attributes.is_empty()
    }

    /// Walk every attribute, depth first.
    pub fn walk<V: SchemaVisitor>(&self, visitor: &mut V) {
        self.walk_prefixed("", visitor);
    }

    fn walk_prefixed<V: SchemaVisitor>(&self, prefix: &str, visitor: &mut V) {
        for (name, attribute) in &self.attributes {
            let path = if prefix.is_empty() {
                name.to_string()
            } else {
                format!("{}.{}", prefix, name)
            };
            visitor.visit(&path, attribute);
            if let Some(nested) = attribute.ty.block_schema() {
                nested.walk_prefixed(&path, visitor);
            }
        }
    }

    /// Reject declarations that cannot be served consistently.
    pub fn check(&self) -> Result<()> {
        struct Checker {
            errors: Vec<String>,
        }

        impl SchemaVisitor for Checker {
            fn visit(&mut self, path: &str, a: &Attribute) {
                if !a.required && !a.optional && !a.computed {
                    self.errors.push(format!(
                        "{}: one of required, optional or computed must be set",
                        path
                    ));
                }
                if a.required && (a.optional || a.computed) {
                    self.errors.push(format!(
                        "{}: required cannot be combined with optional or computed",
                        path
                    ));
                }
                if a.required && a.default.is_some() {
                    self.errors
                        .push(format!("{}: required attributes cannot have a default", path));
                }
                if let Some(default) = &a.default {
                    if !a.ty.accepts(default) {
                        self.errors.push(format!(
                            "{}: default is {} but attribute is {}",
                            path,
                            default.type_name(),
                            a.ty.name()
                        ));
                    }
                }
                if a.set_hash.is_some() && !matches!(a.ty, AttrType::Set(_)) {
                    self.errors.push(format!(
                        "{}: set hasher declared on a {} attribute",
                        path,
                        a.ty.name()
                    ));
                }
            }
        }

        let mut checker = Checker { errors: Vec::new() };
        self.walk(&mut checker);
        if checker.errors.is_empty() {
            Ok(())
        } else {
            bail!("invalid schema: {}", checker.errors.join("; "))
        }
    }

    /// Derive the data-source flavour of a resource schema.
    ///
    /// `lookup` attributes keep their flags; every other required attribute
    /// becomes optional, every optional one becomes computed.
    pub fn as_data_source(&self, lookup: &[&str]) -> Schema {
        let mut out = Schema::new();
        for (name, attribute) in &self.attributes {
            let mut a = attribute.clone();
            a.force_new = false;
            if !lookup.contains(name) {
                if a.required {
                    a.required = false;
                    a.optional = true;
                } else if a.optional {
                    a.optional = false;
                    a.computed = true;
                    a.default = None;
                    a.validator = None;
                    a.diff_suppress = None;
                    a.conflicts_with.clear();
                    a.deprecated = None;
                }
            }
            a.ty = match a.ty {
                AttrType::List(s) => AttrType::List(s.all_computed()),
                AttrType::Set(s) => AttrType::Set(s.all_computed()),
                other => other,
            };
            out.attributes.insert(*name, a);
        }
        out
    }

    fn all_computed(&self) -> Schema {
        let mut out = Schema::new();
        for (name, attribute) in &self.attributes {
            let mut a = attribute.clone();
            a.required = false;
            a.optional = false;
            a.computed = true;
            a.force_new = false;
            a.default = None;
            a.validator = None;
            a.diff_suppress = None;
            a.ty = match a.ty {
                AttrType::List(s) => AttrType::List(s.all_computed()),
                AttrType::Set(s) => AttrType::Set(s.all_computed()),
                other => other,
            };
            out.attributes.insert(*name, a);
        }
        out
    }

    /// Convert a JSON object into a block, applying nested defaults.
    pub fn block_from_json(&self, value: &Value, path: &str) -> Result<Block> {
        let Value::Object(map) = value else {
            bail!("{}: expected an object", path);
        };
        for key in map.keys() {
            if !self.contains(key) {
                bail!("{}: unsupported attribute {:?}", path, key);
            }
        }
        let mut block = Block::new();
        for (name, attribute) in &self.attributes {
            let converted = match map.get(*name) {
                Some(v) => attribute.value_from_json(v, &format!("{}.{}", path, name))?,
                None => None,
            };
            if let Some(v) = converted.or_else(|| attribute.default.clone()) {
                block.insert(name.to_string(), v);
            }
        }
        Ok(block)
    }

    /// Describe the schema as JSON (for `vcd-provider schema`).
    pub fn to_json(&self) -> Value {
        let mut out = Map::new();
        for (name, a) in &self.attributes {
            let mut entry = json!({
                "type": a.ty.name(),
                "required": a.required,
                "optional": a.optional,
                "computed": a.computed,
                "force_new": a.force_new,
                "sensitive": a.sensitive,
            });
            if let Value::Object(ref mut m) = entry {
                if !a.description.is_empty() {
                    m.insert("description".into(), Value::String(a.description.into()));
                }
                if let Some(default) = &a.default {
                    m.insert("default".into(), default.to_json());
                }
                if let Some(msg) = a.deprecated {
                    m.insert("deprecated".into(), Value::String(msg.into()));
                }
                if !a.conflicts_with.is_empty() {
                    m.insert("conflicts_with".into(), json!(a.conflicts_with));
                }
                if let Some(n) = a.max_items {
                    m.insert("max_items".into(), json!(n));
                }
                if let Some(nested) = a.ty.block_schema() {
                    m.insert("block".into(), nested.to_json());
                }
            }
            out.insert(name.to_string(), entry);
        }
        Value::Object(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pool_schema() -> Schema {
        Schema::new()
            .attr("start_address", Attribute::string().required())
            .attr("end_address", Attribute::string().required())
            .attr("max_lease_time", Attribute::int().optional().default(7200i64))
    }

    #[test]
    fn test_check_accepts_well_formed_schema() {
        let s = Schema::new()
            .attr("name", Attribute::string().required())
            .attr(
                "pool",
                Attribute::set(pool_schema())
                    .optional()
                    .set_hash(hash::static_ip_pool_hash),
            );
        assert!(s.check().is_ok());
    }

    #[test]
    fn test_check_rejects_mistyped_default() {
        let s = Schema::new().attr("count", Attribute::int().optional().default("one"));
        let err = s.check().unwrap_err().to_string();
        assert!(err.contains("count"), "{}", err);
    }

    #[test]
    fn test_check_rejects_hash_on_list() {
        let s = Schema::new().attr(
            "pool",
            Attribute::list(pool_schema()).optional().set_hash(hash::static_ip_pool_hash),
        );
        assert!(s.check().is_err());
    }

    #[test]
    fn test_check_walks_nested_blocks() {
        let bad_block = Schema::new().attr("x", Attribute::string());
        let s = Schema::new().attr("b", Attribute::list(bad_block).optional());
        let err = s.check().unwrap_err().to_string();
        assert!(err.contains("b.x"), "{}", err);
    }

    #[test]
    fn test_data_source_flip() {
        let s = Schema::new()
            .attr("name", Attribute::string().required().force_new())
            .attr("org", Attribute::string().optional().force_new())
            .attr("description", Attribute::string().optional().default("x"))
            .attr("gateway", Attribute::string().required())
            .attr("href", Attribute::string().computed());
        let ds = s.as_data_source(&["name", "org"]);
        let name = ds.get("name").unwrap();
        assert!(name.required && !name.force_new);
        assert!(ds.get("org").unwrap().optional);
        let description = ds.get("description").unwrap();
        assert!(description.is_computed_only());
        assert!(description.default.is_none());
        let gateway = ds.get("gateway").unwrap();
        assert!(gateway.optional && !gateway.required);
        assert!(ds.get("href").unwrap().is_computed_only());
    }

    #[test]
    fn test_block_from_json_applies_defaults() {
        let block = pool_schema()
            .block_from_json(&json!({"start_address": "a", "end_address": "b"}), "pool.0")
            .unwrap();
        assert_eq!(block.int_field("max_lease_time"), 7200);
    }

    #[test]
    fn test_block_from_json_rejects_unknown_attribute() {
        let err = pool_schema()
            .block_from_json(&json!({"start_address": "a", "bogus": 1}), "pool.0")
            .unwrap_err();
        assert!(err.to_string().contains("bogus"));
    }

    #[test]
    fn test_value_from_json_type_mismatch() {
        let err = Attribute::int()
            .optional()
            .value_from_json(&json!("five"), "count")
            .unwrap_err();
        assert!(err.to_string().contains("expected int"));
    }

    struct Collect(Vec<String>);

    impl SchemaVisitor for Collect {
        fn visit(&mut self, path: &str, _attribute: &Attribute) {
            self.0.push(path.to_string());
        }
    }

    #[test]
    fn test_walk_visits_nested_paths() {
        let s = Schema::new().attr("pool", Attribute::set(pool_schema()).optional());
        let mut c = Collect(Vec::new());
        s.walk(&mut c);
        assert!(c.0.contains(&"pool.start_address".to_string()));
        assert_eq!(c.0.len(), 4);
    }
}

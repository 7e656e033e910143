//! State bag
//!
//! [`ResourceData`] carries declared and observed values for one resource
//! instance, the remote identifier, and the prior state used for change
//! detection. Every write is checked against the declared schema so a
//! dispatcher writing an undeclared or mistyped attribute fails loudly.

use crate::schema::{AttrType, AttrValue, Block, Schema};
use anyhow::{bail, Context, Result};
use serde_json::{Map, Value};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

/// Attribute map for a single resource instance
#[derive(Debug, Clone)]
pub struct ResourceData {
    schema: Arc<Schema>,
    id: String,
    values: BTreeMap<String, AttrValue>,
    prior: BTreeMap<String, AttrValue>,
    warnings: Vec<String>,
}

impl ResourceData {
    pub fn new(schema: Arc<Schema>) -> Self {
        Self {
            schema,
            id: String::new(),
            values: BTreeMap::new(),
            prior: BTreeMap::new(),
            warnings: Vec::new(),
        }
    }

    /// Build a bag from a JSON object (configuration or stored state).
    ///
    /// An optional `"id"` key sets the identifier; defaults fill in every
    /// attribute the object leaves out.
    pub fn from_json(schema: Arc<Schema>, config: &Value) -> Result<Self> {
        let Value::Object(map) = config else {
            bail!("resource configuration must be an object");
        };
        let mut data = Self::new(schema);
        for key in map.keys() {
            if key != "id" && !data.schema.contains(key) {
                bail!("unsupported attribute {:?}", key);
            }
        }
        if let Some(id) = map.get("id").and_then(Value::as_str) {
            data.id = id.to_string();
        }
        let schema = Arc::clone(&data.schema);
        for (name, attribute) in schema.iter() {
            let converted = match map.get(name) {
                Some(v) => attribute.value_from_json(v, name)?,
                None => None,
            };
            if let Some(v) = converted.or_else(|| attribute.default.clone()) {
                data.values.insert(name.to_string(), v);
            }
        }
        Ok(data)
    }

    /// Record `prior` as the state before this apply, for [`Self::has_change`].
    /// The identifier carries over when this bag has none, and so do
    /// computed attributes the configuration leaves out.
    pub fn with_prior(mut self, prior: &ResourceData) -> Self {
        self.prior = prior.values.clone();
        if self.id.is_empty() {
            self.id = prior.id.clone();
        }
        let schema = Arc::clone(&self.schema);
        for (name, attribute) in schema.iter() {
            if attribute.computed && !self.values.contains_key(name) {
                if let Some(v) = prior.values.get(name) {
                    self.values.insert(name.to_string(), v.clone());
                }
            }
        }
        self
    }

    /// Current values become the prior state.
    pub fn commit(&mut self) {
        self.prior = self.values.clone();
    }

    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    pub fn schema_arc(&self) -> Arc<Schema> {
        Arc::clone(&self.schema)
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn set_id(&mut self, id: impl Into<String>) {
        self.id = id.into();
    }

    /// Signals the host that the remote entity is gone.
    pub fn clear_id(&mut self) {
        self.id.clear();
    }

    /// Every attribute that has a value.
    pub fn values(&self) -> &BTreeMap<String, AttrValue> {
        &self.values
    }

    pub fn get(&self, key: &str) -> Option<&AttrValue> {
        self.values.get(key)
    }

    /// Value if set and not the zero value of its type.
    pub fn get_ok(&self, key: &str) -> Option<&AttrValue> {
        self.values.get(key).filter(|v| !v.is_zero())
    }

    pub fn prior_value(&self, key: &str) -> Option<&AttrValue> {
        self.prior.get(key)
    }

    pub fn get_str(&self, key: &str) -> &str {
        self.values.get(key).and_then(AttrValue::as_str).unwrap_or("")
    }

    pub fn get_string(&self, key: &str) -> String {
        self.get_str(key).to_string()
    }

    pub fn get_int(&self, key: &str) -> i64 {
        self.values.get(key).and_then(AttrValue::as_int).unwrap_or(0)
    }

    pub fn get_bool(&self, key: &str) -> bool {
        self.values.get(key).and_then(AttrValue::as_bool).unwrap_or(false)
    }

    pub fn get_float(&self, key: &str) -> f64 {
        self.values.get(key).and_then(AttrValue::as_float).unwrap_or(0.0)
    }

    pub fn get_map(&self, key: &str) -> BTreeMap<String, String> {
        match self.values.get(key) {
            Some(AttrValue::Map(m)) => m.clone(),
            _ => BTreeMap::new(),
        }
    }

    pub fn get_string_set(&self, key: &str) -> BTreeSet<String> {
        match self.values.get(key) {
            Some(AttrValue::StringSet(s)) => s.clone(),
            _ => BTreeSet::new(),
        }
    }

    /// Blocks of a list or set attribute. Sets come back in hash order.
    pub fn get_blocks(&self, key: &str) -> Vec<Block> {
        match self.values.get(key) {
            Some(AttrValue::List(l)) => l.clone(),
            Some(AttrValue::Set(s)) => s.iter().cloned().collect(),
            _ => Vec::new(),
        }
    }

    /// First block of a single-item list attribute.
    pub fn get_single_block(&self, key: &str) -> Option<Block> {
        self.get_blocks(key).into_iter().next()
    }

    /// Write an attribute, enforcing the declared type.
    ///
    /// Ints widen into float attributes and block lists are hashed into
    /// block sets; anything else of the wrong type is schema drift.
    pub fn set(&mut self, key: &str, value: impl Into<AttrValue>) -> Result<()> {
        let attribute = self
            .schema
            .get(key)
            .with_context(|| format!("schema drift: attribute {:?} is not declared", key))?;
        let value = match (&attribute.ty, value.into()) {
            (AttrType::Float, AttrValue::Int(i)) => AttrValue::Float(i as f64),
            (AttrType::Set(_), AttrValue::List(blocks)) => {
                AttrValue::Set(attribute.make_set(blocks))
            }
            (ty, v) if ty.accepts(&v) => v,
            (ty, v) => bail!(
                "schema drift: attribute {:?} is declared {} but was given {}",
                key,
                ty.name(),
                v.type_name()
            ),
        };
        self.values.insert(key.to_string(), value);
        Ok(())
    }

    pub fn unset(&mut self, key: &str) {
        self.values.remove(key);
    }

    /// Did the attribute change relative to the prior state? Unset and zero
    /// values compare equal.
    pub fn has_change(&self, key: &str) -> bool {
        let current = self.values.get(key).filter(|v| !v.is_zero());
        let prior = self.prior.get(key).filter(|v| !v.is_zero());
        current != prior
    }

    pub fn has_changes(&self, keys: &[&str]) -> bool {
        keys.iter().any(|k| self.has_change(k))
    }

    pub fn add_warning(&mut self, message: impl Into<String>) {
        let message = message.into();
        tracing::warn!("{}", message);
        self.warnings.push(message);
    }

    pub fn warnings(&self) -> &[String] {
        &self.warnings
    }

    pub fn take_warnings(&mut self) -> Vec<String> {
        std::mem::take(&mut self.warnings)
    }

    /// Render the bag as JSON: `id` plus every attribute that has a value.
    pub fn to_json(&self) -> Value {
        let mut out = Map::new();
        out.insert("id".into(), Value::String(self.id.clone()));
        for (k, v) in &self.values {
            out.insert(k.clone(), v.to_json());
        }
        Value::Object(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{block, hash, Attribute, BlockExt};
    use serde_json::json;

    fn schema() -> Arc<Schema> {
        let pool = Schema::new()
            .attr("start_address", Attribute::string().required())
            .attr("end_address", Attribute::string().required());
        Arc::new(
            Schema::new()
                .attr("name", Attribute::string().required())
                .attr("shared", Attribute::bool().optional().default(false))
                .attr("ratio", Attribute::float().optional())
                .attr("href", Attribute::string().computed())
                .attr(
                    "static_ip_pool",
                    Attribute::set(pool).optional().set_hash(hash::static_ip_pool_hash),
                ),
        )
    }

    #[test]
    fn test_from_json_applies_defaults_and_id() {
        let d = ResourceData::from_json(schema(), &json!({"id": "urn:x", "name": "n1"})).unwrap();
        assert_eq!(d.id(), "urn:x");
        assert_eq!(d.get_str("name"), "n1");
        assert_eq!(d.get("shared"), Some(&AttrValue::Bool(false)));
    }

    #[test]
    fn test_from_json_rejects_unknown() {
        assert!(ResourceData::from_json(schema(), &json!({"nope": 1})).is_err());
    }

    #[test]
    fn test_set_rejects_undeclared_and_mistyped() {
        let mut d = ResourceData::new(schema());
        assert!(d.set("bogus", "x").is_err());
        assert!(d.set("shared", "yes").is_err());
        assert!(d.set("shared", true).is_ok());
    }

    #[test]
    fn test_set_widens_int_and_hashes_blocks() {
        let mut d = ResourceData::new(schema());
        d.set("ratio", 1i64).unwrap();
        assert_eq!(d.get_float("ratio"), 1.0);

        let pool = block([("start_address", "10.0.0.2"), ("end_address", "10.0.0.9")]);
        d.set("static_ip_pool", vec![pool.clone(), pool]).unwrap();
        let blocks = d.get_blocks("static_ip_pool");
        assert_eq!(blocks.len(), 1);
        assert_eq!(blocks[0].str_field("end_address"), "10.0.0.9");
    }

    #[test]
    fn test_has_change_against_prior() {
        let prior = ResourceData::from_json(schema(), &json!({"id": "1", "name": "a"})).unwrap();
        let next = ResourceData::from_json(schema(), &json!({"name": "b"}))
            .unwrap()
            .with_prior(&prior);
        assert_eq!(next.id(), "1");
        assert!(next.has_change("name"));
        assert!(!next.has_change("shared"));
        assert!(next.has_changes(&["shared", "name"]));
    }

    #[test]
    fn test_clear_id() {
        let mut d = ResourceData::new(schema());
        d.set_id("abc");
        d.clear_id();
        assert!(d.id().is_empty());
    }
}

//! Metadata subsystem
//!
//! Entities that carry metadata accept it in two shapes: a flat `metadata`
//! string map (deprecated, every value a READWRITE string) and a
//! `metadata_entry` set of typed entries. Writes apply whichever shape
//! changed; reads fill in both.

use crate::schema::hash::metadata_entry_hash;
use crate::schema::{validate, Attribute, Block, BlockExt, Diagnostics, Schema};
use crate::state::ResourceData;
use crate::vcd::types::{MetadataEntry, MetadataTarget};
use crate::vcd::VcdClient;
use anyhow::{Context, Result};
use std::collections::{BTreeMap, BTreeSet};

pub const TYPE_STRING: &str = "MetadataStringValue";
pub const TYPE_NUMBER: &str = "MetadataNumberValue";
pub const TYPE_BOOLEAN: &str = "MetadataBooleanValue";
pub const TYPE_DATETIME: &str = "MetadataDateTimeValue";
pub const METADATA_TYPES: &[&str] = &[TYPE_STRING, TYPE_NUMBER, TYPE_BOOLEAN, TYPE_DATETIME];

pub const ACCESS_PRIVATE: &str = "PRIVATE";
pub const ACCESS_READONLY: &str = "READONLY";
pub const ACCESS_READWRITE: &str = "READWRITE";
pub const USER_ACCESS: &[&str] = &[ACCESS_PRIVATE, ACCESS_READONLY, ACCESS_READWRITE];

pub const FLAT_METADATA_DEPRECATION: &str =
    "`metadata` is deprecated, use `metadata_entry` instead";

fn entry_schema() -> Schema {
    Schema::new()
        .attr("key", Attribute::string().required().validate(validate::not_empty()))
        .attr("value", Attribute::string().required())
        .attr(
            "type",
            Attribute::string()
                .optional()
                .default(TYPE_STRING)
                .validate(validate::string_in_slice(METADATA_TYPES, false)),
        )
        .attr(
            "user_access",
            Attribute::string()
                .optional()
                .default(ACCESS_READWRITE)
                .validate(validate::string_in_slice(USER_ACCESS, false)),
        )
        .attr("is_system", Attribute::bool().optional().default(false))
}

/// `metadata` and `metadata_entry` attributes, merged into a resource schema.
pub fn metadata_schema() -> Schema {
    Schema::new()
        .attr(
            "metadata",
            Attribute::string_map()
                .optional()
                .computed()
                .deprecated(FLAT_METADATA_DEPRECATION)
                .conflicts_with(&["metadata_entry"])
                .description("key/value metadata, all values stored as READWRITE strings"),
        )
        .attr(
            "metadata_entry",
            Attribute::set(entry_schema())
                .optional()
                .computed()
                .set_hash(metadata_entry_hash)
                .description("typed metadata entries"),
        )
}

fn check_entry_value(entry: &Block) -> Option<String> {
    let key = entry.str_field("key");
    let value = entry.str_field("value");
    match entry.str_field("type") {
        TYPE_NUMBER if value.parse::<f64>().is_err() => {
            Some(format!("metadata entry {:?}: {:?} is not a number", key, value))
        }
        TYPE_BOOLEAN if value != "true" && value != "false" => {
            Some(format!("metadata entry {:?}: {:?} is not true or false", key, value))
        }
        TYPE_DATETIME if chrono::DateTime::parse_from_rfc3339(value).is_err() => Some(format!(
            "metadata entry {:?}: {:?} is not an RFC 3339 timestamp",
            key, value
        )),
        _ => None,
    }
}

/// Checks the declared validators cannot express.
pub fn validate_metadata(d: &ResourceData) -> Diagnostics {
    let mut diags = Diagnostics::new();
    let mut keys = BTreeSet::new();
    for entry in d.get_blocks("metadata_entry") {
        let key = entry.str_field("key").to_string();
        if entry.bool_field("is_system") && entry.str_field("user_access") == ACCESS_READWRITE {
            diags.push_error(format!(
                "metadata entry {:?}: system entries cannot have user_access {}",
                key, ACCESS_READWRITE
            ));
        }
        if let Some(message) = check_entry_value(&entry) {
            diags.push_error(message);
        }
        if !keys.insert((key.clone(), entry.bool_field("is_system"))) {
            diags.push_error(format!("metadata entry {:?} is declared more than once", key));
        }
    }
    diags
}

fn to_entry(b: &Block) -> MetadataEntry {
    MetadataEntry {
        key: b.str_field("key").to_string(),
        value: b.str_field("value").to_string(),
        value_type: b.str_field("type").to_string(),
        user_access: b.str_field("user_access").to_string(),
        is_system: b.bool_field("is_system"),
    }
}

fn to_block(e: &MetadataEntry) -> Block {
    let mut b = Block::new();
    b.insert("key".into(), e.key.as_str().into());
    b.insert("value".into(), e.value.as_str().into());
    b.insert("type".into(), e.value_type.as_str().into());
    b.insert("user_access".into(), e.user_access.as_str().into());
    b.insert("is_system".into(), e.is_system.into());
    b
}

fn flat_entry(key: &str, value: &str) -> MetadataEntry {
    MetadataEntry {
        key: key.to_string(),
        value: value.to_string(),
        value_type: TYPE_STRING.to_string(),
        user_access: ACCESS_READWRITE.to_string(),
        is_system: false,
    }
}

fn prior_map(d: &ResourceData) -> BTreeMap<String, String> {
    match d.prior_value("metadata") {
        Some(crate::schema::AttrValue::Map(m)) => m.clone(),
        _ => BTreeMap::new(),
    }
}

fn prior_entries(d: &ResourceData) -> Vec<Block> {
    match d.prior_value("metadata_entry") {
        Some(crate::schema::AttrValue::Set(s)) => s.iter().cloned().collect(),
        Some(crate::schema::AttrValue::List(l)) => l.clone(),
        _ => Vec::new(),
    }
}

/// Push metadata changes of the bag to `target`.
pub async fn update_metadata(
    d: &mut ResourceData,
    client: &VcdClient,
    target: &MetadataTarget,
) -> Result<()> {
    if d.has_change("metadata") {
        let old = prior_map(d);
        let new = d.get_map("metadata");
        if !new.is_empty() {
            d.add_warning(FLAT_METADATA_DEPRECATION);
        }
        for key in old.keys().filter(|k| !new.contains_key(*k)) {
            tracing::debug!("Removing metadata {} from {}", key, target.id);
            client
                .call(client.backend().delete_metadata_entry(target, key))
                .await
                .with_context(|| format!("removing metadata {:?}", key))?;
        }
        for (key, value) in new.iter().filter(|(k, v)| old.get(*k) != Some(*v)) {
            tracing::debug!("Setting metadata {} on {}", key, target.id);
            client
                .call(client.backend().set_metadata_entry(target, &flat_entry(key, value)))
                .await
                .with_context(|| format!("setting metadata {:?}", key))?;
        }
    }

    if d.has_change("metadata_entry") {
        let old = prior_entries(d);
        let new = d.get_blocks("metadata_entry");
        let old_hashes: BTreeSet<u32> = old.iter().map(metadata_entry_hash).collect();
        let new_keys: BTreeSet<&str> = new.iter().map(|b| b.str_field("key")).collect();

        for stale in old.iter().filter(|b| !new_keys.contains(b.str_field("key"))) {
            let key = stale.str_field("key");
            client
                .call(client.backend().delete_metadata_entry(target, key))
                .await
                .with_context(|| format!("removing metadata entry {:?}", key))?;
        }
        for entry in new.iter().filter(|b| !old_hashes.contains(&metadata_entry_hash(b))) {
            let entry = to_entry(entry);
            client
                .call(client.backend().set_metadata_entry(target, &entry))
                .await
                .with_context(|| format!("setting metadata entry {:?}", entry.key))?;
        }
    }
    Ok(())
}

/// Read metadata of `target` into both shapes.
pub async fn read_metadata(
    d: &mut ResourceData,
    client: &VcdClient,
    target: &MetadataTarget,
) -> Result<()> {
    let entries = client
        .call(client.backend().get_metadata(target))
        .await
        .context("reading metadata")?;

    let flat: BTreeMap<String, String> = entries
        .iter()
        .filter(|e| !e.is_system && e.value_type == TYPE_STRING)
        .map(|e| (e.key.clone(), e.value.clone()))
        .collect();
    d.set("metadata", flat)?;
    d.set("metadata_entry", entries.iter().map(to_block).collect::<Vec<_>>())?;
    Ok(())
}

//! Diff suppressors and plan computation
//!
//! Suppressors decide whether a textual old/new pair is a real change. The
//! plan engine compares a prior and a proposed state bag attribute by
//! attribute, consulting suppressors for scalars and hash membership for
//! block sets.

use super::{AttrType, AttrValue, Block, Schema};
use crate::state::ResourceData;
use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeSet;
use std::sync::Arc;

/// `(key, old, new, proposed bag) -> suppress?`
pub type DiffSuppressor = Arc<dyn Fn(&str, &str, &str, &ResourceData) -> bool + Send + Sync>;

/// The backend fills `word` in when the user leaves the field out.
pub fn suppress_word_to_empty(word: &'static str) -> DiffSuppressor {
    Arc::new(move |_key, old, new, _d| old == word && new.is_empty())
}

/// Networks created before `interface_type` existed carry an empty value;
/// the implicit interface was always "internal".
pub fn suppress_upgraded_interface() -> DiffSuppressor {
    Arc::new(|_key, old, new, _d| old.is_empty() && new.eq_ignore_ascii_case("internal"))
}

pub fn suppress_case_insensitive() -> DiffSuppressor {
    Arc::new(|_key, old, new, _d| old.eq_ignore_ascii_case(new))
}

/// Unset and `false` are the same value.
pub fn suppress_false() -> DiffSuppressor {
    Arc::new(|_key, old, new, _d| {
        (old.is_empty() || old == "false") && (new.is_empty() || new == "false")
    })
}

/// One planned attribute change
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AttributeChange {
    pub attribute: String,
    pub old: Option<Value>,
    pub new: Option<Value>,
    pub requires_replace: bool,
}

/// Result of comparing prior and proposed state
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PlanResult {
    pub changes: Vec<AttributeChange>,
    pub requires_replace: bool,
}

impl PlanResult {
    pub fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }

    pub fn changed(&self, attribute: &str) -> bool {
        self.changes.iter().any(|c| c.attribute == attribute)
    }
}

fn non_zero(value: Option<&AttrValue>) -> Option<&AttrValue> {
    value.filter(|v| !v.is_zero())
}

fn set_hashes(value: Option<&AttrValue>) -> BTreeSet<u32> {
    match value {
        Some(AttrValue::Set(s)) => s.hashes().collect(),
        _ => BTreeSet::new(),
    }
}

fn list_blocks(value: Option<&AttrValue>) -> &[Block] {
    match value {
        Some(AttrValue::List(blocks)) => blocks,
        _ => &[],
    }
}

/// Nested blocks are compared on what the configuration can set: computed
/// fields are skipped, as are optional+computed fields the new block omits.
fn blocks_differ(schema: &Schema, old: &[Block], new: &[Block]) -> bool {
    if old.len() != new.len() {
        return true;
    }
    old.iter().zip(new).any(|(old, new)| {
        schema.iter().any(|(name, attribute)| {
            if attribute.is_computed_only() {
                return false;
            }
            let old = non_zero(old.get(name));
            let new = non_zero(new.get(name));
            if attribute.computed && new.is_none() {
                return false;
            }
            match &attribute.ty {
                AttrType::List(nested) => blocks_differ(nested, list_blocks(old), list_blocks(new)),
                AttrType::Set(_) => set_hashes(old) != set_hashes(new),
                _ => old != new,
            }
        })
    })
}

/// Compare `prior` (stored state) and `proposed` (configuration).
///
/// Computed-only attributes never appear. Optional+computed attributes the
/// configuration leaves out keep their stored value.
pub fn plan(prior: &ResourceData, proposed: &ResourceData) -> PlanResult {
    let mut result = PlanResult::default();
    let creating = prior.id().is_empty();

    for (name, attribute) in proposed.schema().iter() {
        if attribute.is_computed_only() {
            continue;
        }
        let old = non_zero(prior.get(name));
        let new = non_zero(proposed.get(name));
        if attribute.computed && new.is_none() {
            continue;
        }

        let changed = match &attribute.ty {
            AttrType::Set(_) => set_hashes(old) != set_hashes(new),
            AttrType::List(block) => blocks_differ(block, list_blocks(old), list_blocks(new)),
            AttrType::StringMap | AttrType::StringSet => old != new,
            _ => {
                if old == new {
                    false
                } else if let Some(suppress) = &attribute.diff_suppress {
                    let old_s = old.map(AttrValue::to_diff_string).unwrap_or_default();
                    let new_s = new.map(AttrValue::to_diff_string).unwrap_or_default();
                    !suppress(name, &old_s, &new_s, proposed)
                } else {
                    true
                }
            }
        };

        if !changed {
            continue;
        }
        let requires_replace = attribute.force_new && !creating;
        result.requires_replace |= requires_replace;
        result.changes.push(AttributeChange {
            attribute: name.to_string(),
            old: old.map(AttrValue::to_json),
            new: new.map(AttrValue::to_json),
            requires_replace,
        });
    }

    result
}

//! Plan-time validators
//!
//! Validators are pure functions of `(value, attribute name)` returning
//! warnings and errors. They run before any backend call.

use super::value::AttrValue;
use super::Schema;
use std::collections::BTreeMap;
use std::net::IpAddr;
use std::sync::Arc;

/// Warnings and errors collected during validation
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Diagnostics {
    pub warnings: Vec<String>,
    pub errors: Vec<String>,
}

impl Diagnostics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn warning(message: impl Into<String>) -> Self {
        Self {
            warnings: vec![message.into()],
            errors: Vec::new(),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            warnings: Vec::new(),
            errors: vec![message.into()],
        }
    }

    pub fn push_warning(&mut self, message: impl Into<String>) {
        self.warnings.push(message.into());
    }

    pub fn push_error(&mut self, message: impl Into<String>) {
        self.errors.push(message.into());
    }

    pub fn extend(&mut self, other: Diagnostics) {
        self.warnings.extend(other.warnings);
        self.errors.extend(other.errors);
    }

    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }

    pub fn is_empty(&self) -> bool {
        self.warnings.is_empty() && self.errors.is_empty()
    }

    /// Turn collected errors into a single failure; warnings pass through.
    pub fn into_result(self) -> anyhow::Result<Vec<String>> {
        if self.errors.is_empty() {
            Ok(self.warnings)
        } else {
            Err(anyhow::anyhow!("{}", self.errors.join("; ")))
        }
    }
}

/// A plan-time validator
pub type Validator = Arc<dyn Fn(&AttrValue, &str) -> Diagnostics + Send + Sync>;

fn expect_string<'a>(value: &'a AttrValue, key: &str) -> Result<&'a str, Diagnostics> {
    value
        .as_str()
        .ok_or_else(|| Diagnostics::error(format!("expected type of {} to be string", key)))
}

fn expect_int(value: &AttrValue, key: &str) -> Result<i64, Diagnostics> {
    value
        .as_int()
        .ok_or_else(|| Diagnostics::error(format!("expected type of {} to be int", key)))
}

/// Value must be one of `valid`.
pub fn string_in_slice(valid: &'static [&'static str], ignore_case: bool) -> Validator {
    Arc::new(move |value, key| {
        let s = match expect_string(value, key) {
            Ok(s) => s,
            Err(d) => return d,
        };
        let found = valid.iter().any(|v| {
            if ignore_case {
                v.eq_ignore_ascii_case(s)
            } else {
                *v == s
            }
        });
        if found {
            Diagnostics::new()
        } else {
            Diagnostics::error(format!(
                "expected {} to be one of {:?}, got {}",
                key, valid, s
            ))
        }
    })
}

/// Single IP address or empty string.
pub fn is_ip_address() -> Validator {
    Arc::new(|value, key| {
        let s = match expect_string(value, key) {
            Ok(s) => s,
            Err(d) => return d,
        };
        if s.is_empty() || s.parse::<IpAddr>().is_ok() {
            Diagnostics::new()
        } else {
            Diagnostics::error(format!("expected {} to contain a valid IP, got: {}", key, s))
        }
    })
}

/// Lease duration in seconds: 0 means "never expires", otherwise at least one hour.
pub fn lease_seconds() -> Validator {
    Arc::new(|value, key| {
        let v = match expect_int(value, key) {
            Ok(v) => v,
            Err(d) => return d,
        };
        if v == 0 || v >= 3600 {
            Diagnostics::new()
        } else {
            Diagnostics::error(format!(
                "{} must be 0 (never expires) or at least 3600 seconds, got {}",
                key, v
            ))
        }
    })
}

pub fn multiple_of_four() -> Validator {
    Arc::new(|value, key| {
        let v = match expect_int(value, key) {
            Ok(v) => v,
            Err(d) => return d,
        };
        if v % 4 == 0 {
            Diagnostics::new()
        } else {
            Diagnostics::error(format!("{} must be a multiple of 4, got {}", key, v))
        }
    })
}

/// String holding an integer that is at least `min`.
pub fn int_string_at_least(min: i64) -> Validator {
    Arc::new(move |value, key| {
        let s = match expect_string(value, key) {
            Ok(s) => s,
            Err(d) => return d,
        };
        match s.trim().parse::<i64>() {
            Ok(v) if v >= min => Diagnostics::new(),
            Ok(v) => Diagnostics::error(format!(
                "expected {} to be at least {}, got {}",
                key, min, v
            )),
            Err(_) => Diagnostics::error(format!("expected {} to be an integer, got {}", key, s)),
        }
    })
}

/// Float (or float-like string) within `[min, max]`.
pub fn float_between(min: f64, max: f64) -> Validator {
    Arc::new(move |value, key| {
        let parsed = match value {
            AttrValue::String(s) => s.trim().parse::<f64>().ok(),
            other => other.as_float(),
        };
        match parsed {
            Some(v) if v >= min && v <= max => Diagnostics::new(),
            Some(v) => Diagnostics::error(format!(
                "expected {} to be in the range ({} - {}), got {}",
                key, min, max, v
            )),
            None => Diagnostics::error(format!("expected {} to be a float", key)),
        }
    })
}

/// Letters, digits, underscores and hyphens only.
pub fn alphanumeric_with_underscores_and_hyphens() -> Validator {
    Arc::new(|value, key| {
        let s = match expect_string(value, key) {
            Ok(s) => s,
            Err(d) => return d,
        };
        if !s.is_empty()
            && s.chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
        {
            Diagnostics::new()
        } else {
            Diagnostics::error(format!(
                "{} may only contain letters, digits, underscores and hyphens, got {:?}",
                key, s
            ))
        }
    })
}

/// Disk bus types and the backend code each maps to.
pub const BUS_TYPES: &[(&str, &str)] =
    &[("IDE", "5"), ("SCSI", "6"), ("SATA", "20"), ("NVME", "20")];

/// Disk bus sub-types (controller models) and their bus code.
pub const BUS_SUB_TYPES: &[(&str, &str)] = &[
    ("ide", "5"),
    ("buslogic", "6"),
    ("lsilogic", "6"),
    ("lsilogicsas", "6"),
    ("VirtualSCSI", "6"),
    ("vmware.sata.ahci", "20"),
    ("vmware.nvme.controller", "20"),
];

fn dictionary_validator(
    dictionary: &'static [(&'static str, &'static str)],
    what: &'static str,
) -> Validator {
    Arc::new(move |value, key| {
        let s = match expect_string(value, key) {
            Ok(s) => s,
            Err(d) => return d,
        };
        if dictionary.iter().any(|(name, _)| name.eq_ignore_ascii_case(s)) {
            Diagnostics::new()
        } else {
            let names: Vec<&str> = dictionary.iter().map(|(name, _)| *name).collect();
            Diagnostics::error(format!(
                "{}: unknown {} {:?}, expected one of {:?}",
                key, what, s, names
            ))
        }
    })
}

pub fn bus_type() -> Validator {
    dictionary_validator(BUS_TYPES, "bus type")
}

pub fn bus_sub_type() -> Validator {
    dictionary_validator(BUS_SUB_TYPES, "bus sub-type")
}

pub fn upper_case() -> Validator {
    Arc::new(|value, key| {
        let s = match expect_string(value, key) {
            Ok(s) => s,
            Err(d) => return d,
        };
        if s == s.to_uppercase() {
            Diagnostics::new()
        } else {
            Diagnostics::error(format!("{} must be upper case, got {}", key, s))
        }
    })
}

pub fn lower_case() -> Validator {
    Arc::new(|value, key| {
        let s = match expect_string(value, key) {
            Ok(s) => s,
            Err(d) => return d,
        };
        if s == s.to_lowercase() {
            Diagnostics::new()
        } else {
            Diagnostics::error(format!("{} must be lower case, got {}", key, s))
        }
    })
}

/// Never fails; prints `message` as a warning when the attribute is set to `trigger`.
pub fn noop_value_warning(trigger: &'static str, message: &'static str) -> Validator {
    Arc::new(move |value, key| {
        if value.to_diff_string() == trigger {
            Diagnostics::warning(format!("{}: {}", key, message))
        } else {
            Diagnostics::new()
        }
    })
}

/// Non-empty string.
pub fn not_empty() -> Validator {
    Arc::new(|value, key| match value.as_str() {
        Some(s) if !s.is_empty() => Diagnostics::new(),
        _ => Diagnostics::error(format!("expected {} to not be an empty string", key)),
    })
}

/// Integer within `[min, max]`.
pub fn int_between(min: i64, max: i64) -> Validator {
    Arc::new(move |value, key| {
        let v = match expect_int(value, key) {
            Ok(v) => v,
            Err(d) => return d,
        };
        if v >= min && v <= max {
            Diagnostics::new()
        } else {
            Diagnostics::error(format!(
                "expected {} to be in the range ({} - {}), got {}",
                key, min, max, v
            ))
        }
    })
}

/// Run every declared check over a block of values: required presence,
/// `conflicts_with`, `max_items`, deprecation notices and the attribute
/// validators, recursing into nested blocks. `prefix` names the block in
/// messages.
pub fn check_values(
    schema: &Schema,
    values: &BTreeMap<String, AttrValue>,
    prefix: &str,
) -> Diagnostics {
    let mut diags = Diagnostics::new();
    let path = |name: &str| {
        if prefix.is_empty() {
            name.to_string()
        } else {
            format!("{}.{}", prefix, name)
        }
    };

    for (name, attribute) in schema.iter() {
        let key = path(name);
        let value = values
            .get(name)
            .filter(|v| !v.is_zero() || matches!(v, AttrValue::Bool(_) | AttrValue::Int(_)));
        let Some(value) = value else {
            if attribute.required {
                diags.push_error(format!("{}: required attribute is not set", key));
            }
            continue;
        };
        if attribute.is_computed_only() {
            continue;
        }
        if let Some(message) = attribute.deprecated {
            if !value.is_zero() {
                diags.push_warning(format!("{}: {}", key, message));
            }
        }
        for other in &attribute.conflicts_with {
            if values.get(*other).is_some_and(|v| !v.is_zero()) && !value.is_zero() {
                diags.push_error(format!("{}: conflicts with {}", key, path(*other)));
            }
        }
        if let Some(max) = attribute.max_items {
            let len = match value {
                AttrValue::List(l) => l.len(),
                AttrValue::Set(s) => s.len(),
                AttrValue::StringSet(s) => s.len(),
                _ => 0,
            };
            if len > max {
                diags.push_error(format!("{}: at most {} item(s) allowed, got {}", key, max, len));
            }
        }
        if let Some(validator) = &attribute.validator {
            diags.extend(validator(value, &key));
        }
        if let Some(nested) = attribute.ty.block_schema() {
            let blocks: Vec<&BTreeMap<String, AttrValue>> = match value {
                AttrValue::List(l) => l.iter().collect(),
                AttrValue::Set(s) => s.iter().collect(),
                _ => Vec::new(),
            };
            for (i, block) in blocks.into_iter().enumerate() {
                diags.extend(check_values(nested, block, &format!("{}.{}", key, i)));
            }
        }
    }
    diags
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run(v: &Validator, value: impl Into<AttrValue>) -> Diagnostics {
        v(&value.into(), "attr")
    }

    #[test]
    fn test_string_in_slice() {
        let v = string_in_slice(&["tcp", "udp"], false);
        assert!(run(&v, "tcp").is_empty());
        assert!(run(&v, "TCP").has_errors());

        let v = string_in_slice(&["tcp", "udp"], true);
        assert!(run(&v, "TCP").is_empty());
        assert!(run(&v, "icmp").has_errors());
    }

    #[test]
    fn test_ip_address() {
        let v = is_ip_address();
        assert!(run(&v, "").is_empty());
        assert!(run(&v, "10.0.0.1").is_empty());
        assert!(run(&v, "fe80::1").is_empty());
        assert!(run(&v, "10.0.0.256").has_errors());
        assert!(run(&v, "10.0.0.0/24").has_errors());
    }

    #[test]
    fn test_lease_seconds() {
        let v = lease_seconds();
        assert!(run(&v, 0i64).is_empty());
        assert!(run(&v, 3600i64).is_empty());
        assert!(run(&v, 3599i64).has_errors());
        assert!(run(&v, "3600").has_errors());
    }

    #[test]
    fn test_multiple_of_four() {
        let v = multiple_of_four();
        assert!(run(&v, 8i64).is_empty());
        assert!(run(&v, 6i64).has_errors());
    }

    #[test]
    fn test_int_string_at_least() {
        let v = int_string_at_least(2);
        assert!(run(&v, "2").is_empty());
        assert!(run(&v, "1").has_errors());
        assert!(run(&v, "two").has_errors());
    }

    #[test]
    fn test_float_between() {
        let v = float_between(0.0, 1.0);
        assert!(run(&v, 0.5).is_empty());
        assert!(run(&v, "0.25").is_empty());
        assert!(run(&v, 1.5).has_errors());
        assert!(run(&v, "x").has_errors());
    }

    #[test]
    fn test_alphanumeric() {
        let v = alphanumeric_with_underscores_and_hyphens();
        assert!(run(&v, "my_key-1").is_empty());
        assert!(run(&v, "my key").has_errors());
        assert!(run(&v, "").has_errors());
    }

    #[test]
    fn test_bus_dictionaries() {
        assert!(run(&bus_type(), "sata").is_empty());
        assert!(run(&bus_type(), "usb").has_errors());
        assert!(run(&bus_sub_type(), "virtualscsi").is_empty());
        assert!(run(&bus_sub_type(), "floppy").has_errors());
    }

    #[test]
    fn test_case_validators() {
        assert!(run(&upper_case(), "ENTERPRISE").is_empty());
        assert!(run(&upper_case(), "Enterprise").has_errors());
        assert!(run(&lower_case(), "tcp").is_empty());
        assert!(run(&lower_case(), "Tcp").has_errors());
    }

    #[test]
    fn test_noop_value_warning() {
        let v = noop_value_warning("true", "this flag is ignored by the backend");
        let d = run(&v, true);
        assert_eq!(d.warnings.len(), 1);
        assert!(!d.has_errors());
        assert!(run(&v, false).is_empty());
    }

    #[test]
    fn test_into_result_joins_errors() {
        let mut d = Diagnostics::error("a");
        d.push_error("b");
        let err = d.into_result().unwrap_err();
        assert_eq!(err.to_string(), "a; b");
    }

    fn pool_schema() -> Schema {
        use crate::schema::Attribute;
        Schema::new()
            .attr("start_address", Attribute::string().required().validate(is_ip_address()))
            .attr("end_address", Attribute::string().required().validate(is_ip_address()))
    }

    #[test]
    fn test_check_values_reports_nested_errors() {
        use crate::schema::{block, Attribute};
        let schema = Schema::new()
            .attr("name", Attribute::string().required())
            .attr("pool", Attribute::list(pool_schema()).optional().max_items(1));
        let mut values = BTreeMap::new();
        values.insert(
            "pool".to_string(),
            AttrValue::List(vec![
                block([("start_address", "10.0.0.1"), ("end_address", "bogus")]),
                block([("start_address", "10.0.0.1"), ("end_address", "10.0.0.9")]),
            ]),
        );
        let d = check_values(&schema, &values, "");
        assert!(d.errors.iter().any(|e| e.contains("name: required")));
        assert!(d.errors.iter().any(|e| e.contains("pool: at most 1")));
        assert!(d.errors.iter().any(|e| e.contains("pool.0.end_address")));
    }

    #[test]
    fn test_check_values_conflicts_and_deprecation() {
        use crate::schema::Attribute;
        let schema = Schema::new()
            .attr(
                "metadata",
                Attribute::string_map()
                    .optional()
                    .deprecated("use metadata_entry instead")
                    .conflicts_with(&["metadata_entry"]),
            )
            .attr("metadata_entry", Attribute::string().optional());
        let mut values = BTreeMap::new();
        let mut map = BTreeMap::new();
        map.insert("k".to_string(), "v".to_string());
        values.insert("metadata".to_string(), AttrValue::Map(map));
        let d = check_values(&schema, &values, "");
        assert_eq!(d.warnings.len(), 1);
        assert!(!d.has_errors());

        values.insert("metadata_entry".to_string(), AttrValue::from("x"));
        let d = check_values(&schema, &values, "");
        assert!(d.errors.iter().any(|e| e.contains("conflicts with metadata_entry")));
    }
}

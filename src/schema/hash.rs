//! Set hashers
//!
//! Each hasher projects the identifying fields of a nested block to a CRC32
//! integer. The exact string fed to CRC32 is frozen: any change shows up as
//! a spurious diff in every existing plan.

use super::value::{Block, BlockExt};

/// CRC32 (IEEE) of a string.
pub fn string_hash(s: &str) -> u32 {
    crc32fast::hash(s.as_bytes())
}

/// Static IP pool: `start-end-`.
pub fn static_ip_pool_hash(b: &Block) -> u32 {
    let key = format!(
        "{}-{}-",
        b.str_field("start_address").to_lowercase(),
        b.str_field("end_address").to_lowercase()
    );
    string_hash(&key)
}

/// Routed network DHCP pool: `start-end-max-`.
///
/// `default_lease_time` is deliberately left out; it must not be merged with
/// [`isolated_dhcp_pool_hash`].
pub fn routed_dhcp_pool_hash(b: &Block) -> u32 {
    let key = format!(
        "{}-{}-{}-",
        b.str_field("start_address").to_lowercase(),
        b.str_field("end_address").to_lowercase(),
        b.int_field("max_lease_time")
    );
    string_hash(&key)
}

/// Isolated network DHCP pool: `start-end-max-default-`.
pub fn isolated_dhcp_pool_hash(b: &Block) -> u32 {
    let key = format!(
        "{}-{}-{}-{}-",
        b.str_field("start_address").to_lowercase(),
        b.str_field("end_address").to_lowercase(),
        b.int_field("max_lease_time"),
        b.int_field("default_lease_time")
    );
    string_hash(&key)
}

/// Metadata entry: `key-type-user_access-is_system-value-`.
pub fn metadata_entry_hash(b: &Block) -> u32 {
    let key = format!(
        "{}-{}-{}-{}-{}-",
        b.str_field("key"),
        b.str_field("type"),
        b.str_field("user_access"),
        b.bool_field("is_system"),
        b.str_field("value")
    );
    string_hash(&key)
}

/// VDC storage profile: `name-limit-default-enabled-`.
pub fn storage_profile_hash(b: &Block) -> u32 {
    let key = format!(
        "{}-{}-{}-{}-",
        b.str_field("name"),
        b.int_field("limit"),
        b.bool_field("default"),
        b.bool_field("enabled")
    );
    string_hash(&key)
}

/// Fallback for sets without a dedicated hasher: CRC32 of the canonical JSON
/// rendering (attributes sorted by name).
pub fn default_block_hash(b: &Block) -> u32 {
    let json = serde_json::to_string(b).unwrap_or_default();
    string_hash(&json)
}

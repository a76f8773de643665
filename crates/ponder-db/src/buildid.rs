//! Content hashing: the build ID fingerprinting a (config, schema,
//! handler-source, upstream) quadruple, and the physical table names
//! derived from it.

use sha2::{Digest, Sha256};

/// `hash(config_subset, schema_columns, handler_sources, upstream_ids)`.
/// Every input list is sorted before hashing, so the result is
/// independent of the caller's iteration order — no `HashMap` ordering
/// or floating point enters the digest, which is what makes it
/// reproducible across platforms and process runs.
pub fn compute_build_id(
    config_subset: &str,
    schema_columns: &[String],
    handler_sources: &[String],
    upstream_ids: &[String],
) -> String {
    let mut columns = schema_columns.to_vec();
    columns.sort();
    let mut handlers = handler_sources.to_vec();
    handlers.sort();
    let mut upstream = upstream_ids.to_vec();
    upstream.sort();

    let mut hasher = Sha256::new();
    hash_field(&mut hasher, "config", std::iter::once(config_subset));
    hash_field(&mut hasher, "columns", columns.iter().map(String::as_str));
    hash_field(&mut hasher, "handlers", handlers.iter().map(String::as_str));
    hash_field(&mut hasher, "upstream", upstream.iter().map(String::as_str));
    hex::encode(hasher.finalize())
}

fn hash_field<'a>(hasher: &mut Sha256, tag: &str, values: impl Iterator<Item = &'a str>) {
    hasher.update(tag.as_bytes());
    hasher.update([0u8]);
    for v in values {
        hasher.update(v.as_bytes());
        hasher.update([0u8]);
    }
}

/// Physical name for a live table: `hash(namespace, buildId, tableName)`,
/// truncated to the first 10 hex characters and prefixed with a safe
/// identifier so it never starts with a digit.
pub fn physical_table_name(namespace: &str, build_id: &str, table_name: &str) -> String {
    format!("t_{}", short_digest(&[namespace, build_id, table_name]))
}

/// Physical name for a cache table holding `tableName`'s finalized rows
/// for `buildId`, independent of namespace (cache is namespace-agnostic
/// per spec §4.10's "`ponder_cache`" layout).
pub fn cache_table_name(build_id: &str, table_name: &str) -> String {
    format!("c_{}", short_digest(&["cache", build_id, table_name]))
}

fn short_digest(parts: &[&str]) -> String {
    let mut hasher = Sha256::new();
    for p in parts {
        hasher.update(p.as_bytes());
        hasher.update([0u8]);
    }
    hex::encode(hasher.finalize())[..10].to_string()
}

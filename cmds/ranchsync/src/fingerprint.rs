//! Content fingerprints for update skipping.
//!
//! The fingerprint of a desired entry is stored as a label on the remote
//! object. A later pass recomputes it and skips the replace call when both
//! match. A missing label never counts as a match.

use serde::Serialize;
use serde_json::Value as JsonValue;
use sha2::{Digest, Sha256};

/// Label holding the fingerprint on remote objects.
pub const FINGERPRINT_LABEL: &str = "ranchsync.io/fingerprint";

/// Hex characters kept from the digest. Label values are limited to 63.
const FINGERPRINT_LEN: usize = 48;

/// Sort object keys recursively so the encoding does not depend on
/// insertion order.
fn sort_json_keys(value: JsonValue) -> JsonValue {
	match value {
		JsonValue::Object(map) => {
			let mut entries: Vec<(String, JsonValue)> = map.into_iter().collect();
			entries.sort_by(|(a, _), (b, _)| a.cmp(b));
			JsonValue::Object(
				entries
					.into_iter()
					.map(|(k, v)| (k, sort_json_keys(v)))
					.collect(),
			)
		}
		JsonValue::Array(arr) => JsonValue::Array(arr.into_iter().map(sort_json_keys).collect()),
		other => other,
	}
}

/// Fingerprint of a desired-state value.
pub fn of<T: Serialize + ?Sized>(desired: &T) -> Result<String, serde_json::Error> {
	let canonical = sort_json_keys(serde_json::to_value(desired)?);
	let bytes = serde_json::to_vec(&canonical)?;

	let digest = Sha256::digest(&bytes);
	let hex = format!("{:x}", digest);
	Ok(hex.chars().take(FINGERPRINT_LEN).collect())
}

/// Whether `labels` carry exactly this fingerprint.
pub fn matches(labels: &std::collections::BTreeMap<String, String>, fingerprint: &str) -> bool {
	labels
		.get(FINGERPRINT_LABEL)
		.is_some_and(|stored| stored == fingerprint)
}

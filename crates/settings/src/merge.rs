//! Deep merge of JSON settings trees.
//!
//! Merging raw [`serde_json::Value`] trees (instead of deserialized structs)
//! keeps "absent" distinct from "default": a key missing from the overlay
//! never resets the base value.

use serde_json::Value;

/// Recursively deep-merge `overlay` into `base`.
///
/// - Objects merge recursively per key.
/// - Scalars and arrays from the overlay replace the base value.
pub fn deep_merge(base: &mut Value, overlay: &Value) {
    match (base, overlay) {
        (Value::Object(base_map), Value::Object(overlay_map)) => {
            for (key, overlay_val) in overlay_map {
                if let Some(base_val) = base_map.get_mut(key) {
                    deep_merge(base_val, overlay_val);
                } else {
                    base_map.insert(key.clone(), overlay_val.clone());
                }
            }
        }
        (base, overlay) => {
            *base = overlay.clone();
        }
    }
}

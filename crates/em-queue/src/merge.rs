// merge.rs — Recursive JSON merge for payload patches and fan-in results.

use serde_json::Value;

/// Merge `patch` into `base`, recursing through objects. Arrays and
/// scalars replace wholesale; an explicit null in the patch overwrites,
/// which is how callers clear a field.
pub fn deep_merge(base: &mut Value, patch: &Value) {
    match (base, patch) {
        (Value::Object(base_map), Value::Object(patch_map)) => {
            for (key, value) in patch_map {
                match base_map.get_mut(key) {
                    Some(slot) => deep_merge(slot, value),
                    None => {
                        base_map.insert(key.clone(), value.clone());
                    }
                }
            }
        }
        (slot, value) => *slot = value.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn disjoint_keys_union() {
        let mut base = json!({"a": 1});
        deep_merge(&mut base, &json!({"b": 2}));
        assert_eq!(base, json!({"a": 1, "b": 2}));
    }

    #[test]
    fn nested_objects_merge_key_by_key() {
        let mut base = json!({"outer": {"keep": 1, "swap": 2}});
        deep_merge(&mut base, &json!({"outer": {"swap": 3, "add": 4}}));
        assert_eq!(base, json!({"outer": {"keep": 1, "swap": 3, "add": 4}}));
    }

    #[test]
    fn arrays_replace_wholesale() {
        let mut base = json!({"years": [2020, 2021]});
        deep_merge(&mut base, &json!({"years": [2022]}));
        assert_eq!(base, json!({"years": [2022]}));
    }

    #[test]
    fn null_overwrites() {
        let mut base = json!({"feedback": "old text"});
        deep_merge(&mut base, &json!({"feedback": null}));
        assert_eq!(base, json!({"feedback": null}));
    }

    #[test]
    fn scalar_base_replaced_by_object() {
        let mut base = json!(42);
        deep_merge(&mut base, &json!({"a": 1}));
        assert_eq!(base, json!({"a": 1}));
    }
}

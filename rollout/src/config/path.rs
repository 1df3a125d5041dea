//! Dotted-path access over an untyped configuration document

use serde_json::{Map, Value};

/// Value at `path` (e.g. `firebase.projectId`), if every segment exists
pub fn get_config_value<'a>(config: &'a Value, path: &str) -> Option<&'a Value> {
    path.split('.')
        .try_fold(config, |current, key| current.as_object()?.get(key))
}

/// Value at `path`, or `default` when absent
pub fn get_config_value_or(config: &Value, path: &str, default: Value) -> Value {
    get_config_value(config, path).cloned().unwrap_or(default)
}

/// Set the value at `path`, creating (or replacing non-object) intermediates
pub fn set_config_value(config: &mut Value, path: &str, value: Value) {
    let keys: Vec<&str> = path.split('.').collect();
    set_path(config, &keys, value);
}

fn set_path(current: &mut Value, keys: &[&str], value: Value) {
    let Some((first, rest)) = keys.split_first() else {
        *current = value;
        return;
    };

    if !current.is_object() {
        *current = Value::Object(Map::new());
    }
    if let Value::Object(obj) = current {
        let child = obj.entry(first.to_string()).or_insert(Value::Null);
        set_path(child, rest, value);
    }
}

//! Global template functions

use minijinja::value::Rest;
use minijinja::{Error, ErrorKind, Value};

/// `{{ fail("gitlab.webservice requires a database") }}`
pub fn fail(message: String) -> Result<Value, Error> {
    Err(Error::new(ErrorKind::InvalidOperation, message))
}

/// `{{ dict("name", "gitlab", "port", 8080) }}`
pub fn dict(args: Rest<Value>) -> Result<Value, Error> {
    if args.len() % 2 != 0 {
        return Err(Error::new(
            ErrorKind::InvalidOperation,
            "dict expects key/value pairs",
        ));
    }

    let mut map = serde_json::Map::new();
    for pair in args.chunks(2) {
        let key = pair[0].as_str().ok_or_else(|| {
            Error::new(ErrorKind::InvalidOperation, "dict keys must be strings")
        })?;
        let value = serde_json::to_value(&pair[1])
            .map_err(|e| Error::new(ErrorKind::InvalidOperation, e.to_string()))?;
        map.insert(key.to_string(), value);
    }

    Ok(Value::from_serialize(serde_json::Value::Object(map)))
}

pub fn list(args: Rest<Value>) -> Value {
    Value::from(args.0)
}

/// First argument that is neither undefined, none nor an empty string
pub fn coalesce(args: Rest<Value>) -> Value {
    args.iter()
        .find(|v| !(v.is_undefined() || v.is_none() || v.as_str().is_some_and(str::is_empty)))
        .cloned()
        .unwrap_or(Value::UNDEFINED)
}

/// `{{ ternary("yes", "no", values.enabled) }}`
pub fn ternary(when_true: Value, when_false: Value, condition: Value) -> Value {
    if condition.is_true() { when_true } else { when_false }
}

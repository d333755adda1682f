//! Parameter specs used by the contract resolver and method binder (spec.md §4.3/4.4).

use serde::de::DeserializeOwned;
use serde_json::{Map, Value};

use crate::error::JsonRpcError;
use crate::naming::NamingStrategy;

/// The declared JSON kind of a parameter, used by the binder to reject
/// values of an incompatible shape before invoking a candidate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueKind {
    Any,
    Object,
    Array,
    String,
    Number,
    Boolean,
    Null,
}

impl ValueKind {
    pub fn matches(&self, value: &Value) -> bool {
        match self {
            ValueKind::Any => true,
            ValueKind::Object => value.is_object(),
            ValueKind::Array => value.is_array(),
            ValueKind::String => value.is_string(),
            ValueKind::Number => value.is_number(),
            ValueKind::Boolean => value.is_boolean(),
            ValueKind::Null => value.is_null(),
        }
    }
}

/// One named parameter of a registered method. `name` starts out as the
/// declared identifier passed to `required`/`optional`; `ServiceBuilder`
/// resolves it to the final wire name (naming strategy, unless `named`
/// overrides it) at registration time, the same way it resolves the
/// method's own wire name.
#[derive(Debug, Clone)]
pub struct ParamSpec {
    pub name: String,
    explicit_name: Option<String>,
    pub optional: bool,
    pub default: Option<Value>,
    pub kind: ValueKind,
}

impl ParamSpec {
    pub fn required(name: impl Into<String>, kind: ValueKind) -> Self {
        Self {
            name: name.into(),
            explicit_name: None,
            optional: false,
            default: None,
            kind,
        }
    }

    pub fn optional(name: impl Into<String>, kind: ValueKind, default: Value) -> Self {
        Self {
            name: name.into(),
            explicit_name: None,
            optional: true,
            default: Some(default),
            kind,
        }
    }

    /// Pins this parameter's wire name, overriding whatever the enclosing
    /// `ServiceBuilder`'s `NamingStrategy` would otherwise produce.
    pub fn named(mut self, wire_name: impl Into<String>) -> Self {
        self.explicit_name = Some(wire_name.into());
        self
    }

    pub(crate) fn resolved_name(&self, strategy: NamingStrategy) -> String {
        self.explicit_name
            .clone()
            .unwrap_or_else(|| strategy.apply(&self.name))
    }

    /// Applies the resolved wire name in place, consuming any explicit
    /// override (the registry only needs to resolve this once).
    pub(crate) fn resolve(mut self, strategy: NamingStrategy) -> Self {
        self.name = self.resolved_name(strategy);
        self.explicit_name = None;
        self
    }
}

/// The named-params object bound to a selected candidate, handed to the
/// invoking closure. Handlers pull typed fields out via `require`/`optional`.
#[derive(Debug, Clone, Default)]
pub struct Args {
    values: Map<String, Value>,
}

impl Args {
    pub fn new(values: Map<String, Value>) -> Self {
        Self { values }
    }

    pub fn require<T: DeserializeOwned>(&self, name: &str) -> Result<T, JsonRpcError> {
        let value = self
            .values
            .get(name)
            .ok_or_else(|| JsonRpcError::InvalidParams(format!("missing parameter \"{name}\"")))?;
        serde_json::from_value(value.clone())
            .map_err(|err| JsonRpcError::InvalidParams(format!("parameter \"{name}\": {err}")))
    }

    pub fn optional<T: DeserializeOwned>(
        &self,
        name: &str,
        default: T,
    ) -> Result<T, JsonRpcError> {
        match self.values.get(name) {
            None | Some(Value::Null) => Ok(default),
            Some(value) => serde_json::from_value(value.clone())
                .map_err(|err| JsonRpcError::InvalidParams(format!("parameter \"{name}\": {err}"))),
        }
    }

    pub fn raw(&self, name: &str) -> Option<&Value> {
        self.values.get(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_matching() {
        assert!(ValueKind::Number.matches(&Value::from(3)));
        assert!(!ValueKind::Number.matches(&Value::from("3")));
        assert!(ValueKind::Any.matches(&Value::Null));
    }

    #[test]
    fn args_require_and_optional() {
        let mut map = Map::new();
        map.insert("x".into(), Value::from(10));
        let args = Args::new(map);
        assert_eq!(args.require::<i64>("x").unwrap(), 10);
        assert!(args.require::<i64>("missing").is_err());
        assert_eq!(args.optional::<i64>("missing", 99).unwrap(), 99);
    }
}

//! Resolves a method name's candidate list plus inbound `params` to a single
//! invocable signature (spec.md §4.4).

use serde_json::{Map, Value};

use crate::error::JsonRpcError;
use crate::message::Params;
use crate::param::Args;
use crate::registry::JsonRpcMethod;

/// Outcome of binding: the unique matching candidate plus its bound
/// arguments, ready to hand to `JsonRpcMethod::invoke`.
pub struct Bound<'a> {
    pub method: &'a JsonRpcMethod,
    pub args: Args,
}

/// Implements spec.md §4.4 steps 1-4. Step 5 (per-field conversion) is
/// deferred to the handler body (`Args::require`/`optional`), which already
/// surfaces `InvalidParams` with the inner error message on failure.
pub fn bind<'a>(
    candidates: &'a [JsonRpcMethod],
    params: &Params,
) -> Result<Bound<'a>, JsonRpcError> {
    let object = match params {
        Params::Array(_) => {
            return Err(JsonRpcError::InvalidParams(
                "positional params are not supported; use named params".into(),
            ))
        }
        Params::Object(map) => map.clone(),
        Params::None => Map::new(),
    };

    let mut matches = Vec::new();
    for candidate in candidates {
        if candidate_matches(candidate, &object) {
            matches.push(candidate);
        }
    }

    match matches.len() {
        0 => Err(JsonRpcError::InvalidParams(format!(
            "no matching signature for method \"{}\"",
            candidates.first().map(|c| c.name.as_str()).unwrap_or("?")
        ))),
        1 => {
            let method = matches[0];
            let args = build_args(method, &object);
            Ok(Bound { method, args })
        }
        n => Err(JsonRpcError::AmbiguousMatch {
            method: candidates.first().map(|c| c.name.clone()).unwrap_or_default(),
            candidate_count: n,
        }),
    }
}

fn candidate_matches(candidate: &JsonRpcMethod, object: &Map<String, Value>) -> bool {
    for param in &candidate.params {
        match object.get(&param.name) {
            Some(value) => {
                if !param.kind.matches(value) {
                    return false;
                }
            }
            None if !param.optional => return false,
            None => {}
        }
    }

    if !candidate.allow_extension_data {
        let declared: std::collections::HashSet<&str> =
            candidate.params.iter().map(|p| p.name.as_str()).collect();
        if object.keys().any(|key| !declared.contains(key.as_str())) {
            return false;
        }
    }

    true
}

fn build_args(method: &JsonRpcMethod, object: &Map<String, Value>) -> Args {
    let mut bound = Map::new();
    if method.allow_extension_data {
        bound.clone_from(object);
    }
    for param in &method.params {
        match object.get(&param.name) {
            Some(value) => {
                bound.insert(param.name.clone(), value.clone());
            }
            None => {
                if let Some(default) = &param.default {
                    bound.insert(param.name.clone(), default.clone());
                }
            }
        }
    }
    Args::new(bound)
}

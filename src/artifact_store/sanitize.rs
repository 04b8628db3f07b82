//! Best-effort sanitization pass applied before any payload hits disk.
//!
//! `serde_json::Value` is tree-shaped, so a literal reference cycle can
//! never arise from a plain JSON payload the way it could from a
//! dynamically-typed caller building values by hand. Depth capping
//! therefore covers the common "runaway/absurdly nested payload" case,
//! and `GraphValue` covers the narrow case of a caller
//! holding a genuinely cyclic, pointer-based structure (e.g. assembled
//! from third-party responses with back-references) that must still be
//! persisted without failing the save.

use serde_json::{json, Map, Value};
use std::cell::RefCell;
use std::collections::HashSet;
use std::rc::Rc;

pub const DEFAULT_MAX_DEPTH: usize = 64;
const DEPTH_SENTINEL: &str = "<max-depth-exceeded>";
const CYCLE_SENTINEL: &str = "<circular-ref>";

/// Cap the nesting depth of a JSON value, replacing anything deeper than
/// `max_depth` with a placeholder.
pub fn cap_depth(value: &Value, max_depth: usize) -> Value {
    cap_depth_at(value, max_depth, 0)
}

fn cap_depth_at(value: &Value, max_depth: usize, depth: usize) -> Value {
    if depth >= max_depth {
        return match value {
            Value::Object(_) | Value::Array(_) => Value::String(DEPTH_SENTINEL.to_string()),
            other => other.clone(),
        };
    }
    match value {
        Value::Array(items) => {
            Value::Array(items.iter().map(|v| cap_depth_at(v, max_depth, depth + 1)).collect())
        }
        Value::Object(map) => {
            let mut out = Map::new();
            for (k, v) in map {
                out.insert(k.clone(), cap_depth_at(v, max_depth, depth + 1));
            }
            Value::Object(out)
        }
        other => other.clone(),
    }
}

/// Convert any `Serialize` payload into a stored `Value`, degrading to a
/// placeholder instead of failing when the payload cannot be
/// represented as JSON (e.g. a `NaN`/`Infinity` float upstream).
pub fn to_stored_value<T: serde::Serialize>(payload: &T, max_depth: usize) -> (Value, bool) {
    match serde_json::to_value(payload) {
        Ok(v) => (cap_depth(&v, max_depth), false),
        Err(e) => (
            json!({ "__unserializable__": true, "reason": e.to_string() }),
            true,
        ),
    }
}

/// A JSON-like value that may legitimately contain cycles, built from
/// `Rc<RefCell<_>>` nodes so distinct references can alias or cycle back
/// on themselves.
#[derive(Clone)]
pub enum GraphValue {
    Null,
    Bool(bool),
    Number(serde_json::Number),
    String(String),
    Array(Vec<Rc<RefCell<GraphValue>>>),
    Object(Vec<(String, Rc<RefCell<GraphValue>>)>),
}

impl GraphValue {
    pub fn node(self) -> Rc<RefCell<GraphValue>> {
        Rc::new(RefCell::new(self))
    }
}

/// Walk a possibly-cyclic `GraphValue`, replacing any node revisited
/// within the current path with [`CYCLE_SENTINEL`], and capping depth
/// exactly like [`cap_depth`].
pub fn sanitize_graph(root: &Rc<RefCell<GraphValue>>, max_depth: usize) -> Value {
    let mut visiting = HashSet::new();
    walk(root, max_depth, 0, &mut visiting)
}

fn walk(
    node: &Rc<RefCell<GraphValue>>,
    max_depth: usize,
    depth: usize,
    visiting: &mut HashSet<usize>,
) -> Value {
    let ptr = Rc::as_ptr(node) as usize;
    if visiting.contains(&ptr) {
        return Value::String(CYCLE_SENTINEL.to_string());
    }
    if depth >= max_depth {
        return Value::String(DEPTH_SENTINEL.to_string());
    }

    let borrowed = node.borrow();
    match &*borrowed {
        GraphValue::Null => Value::Null,
        GraphValue::Bool(b) => Value::Bool(*b),
        GraphValue::Number(n) => Value::Number(n.clone()),
        GraphValue::String(s) => Value::String(s.clone()),
        GraphValue::Array(items) => {
            visiting.insert(ptr);
            let out = items.iter().map(|v| walk(v, max_depth, depth + 1, visiting)).collect();
            visiting.remove(&ptr);
            Value::Array(out)
        }
        GraphValue::Object(entries) => {
            visiting.insert(ptr);
            let mut out = Map::new();
            for (k, v) in entries {
                out.insert(k.clone(), walk(v, max_depth, depth + 1, visiting));
            }
            visiting.remove(&ptr);
            Value::Object(out)
        }
    }
}

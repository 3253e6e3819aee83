//! Key tree → nested JSON.

use serde_json::{Map, Value};

use crate::gateway::kv::KvNode;

/// Nest `nodes` by their last path segment. Leaf values that parse as
/// JSON are stored decoded, everything else as a string.
pub fn flatten(nodes: &[KvNode]) -> Map<String, Value> {
    let mut out = Map::new();
    for node in nodes {
        let value = match node {
            KvNode::Leaf { value, .. } => decode_leaf(value),
            KvNode::Directory { children, .. } => Value::Object(flatten(children)),
        };
        out.insert(node.name().to_string(), value);
    }
    out
}

/// Flatten a GET answer. A directory contributes its children, a single
/// leaf is keyed by its own name.
pub fn flatten_listing(root: &KvNode) -> Map<String, Value> {
    match root {
        KvNode::Directory { children, .. } => flatten(children),
        leaf => flatten(std::slice::from_ref(leaf)),
    }
}

fn decode_leaf(raw: &str) -> Value {
    serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn leaf(key: &str, value: &str) -> KvNode {
        KvNode::Leaf { key: key.into(), value: value.into() }
    }

    fn tree() -> KvNode {
        KvNode::Directory {
            key: "/app".into(),
            children: vec![
                leaf("/app/flag", "true"),
                leaf("/app/name", "web"),
                leaf("/app/limits", r#"{"cpu":2}"#),
                KvNode::Directory { key: "/app/empty".into(), children: vec![] },
                KvNode::Directory {
                    key: "/app/db".into(),
                    children: vec![leaf("/app/db/port", "5432")],
                },
            ],
        }
    }

    #[test]
    fn test_flatten_decodes_values() {
        let flat = Value::Object(flatten_listing(&tree()));
        assert_eq!(
            flat,
            json!({
                "flag": true,
                "name": "web",
                "limits": {"cpu": 2},
                "empty": {},
                "db": {"port": 5432}
            })
        );
    }

    #[test]
    fn test_flatten_is_idempotent() {
        let first = serde_json::to_vec(&flatten_listing(&tree())).unwrap();
        let second = serde_json::to_vec(&flatten_listing(&tree())).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_single_leaf_keyed_by_name() {
        let flat = flatten_listing(&leaf("/app/flag", "false"));
        assert_eq!(Value::Object(flat), json!({"flag": false}));
    }
}

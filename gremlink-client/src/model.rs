//! Graph elements decoded from GraphSON result data.
//!
//! GraphSON v2/v3 wrap values as `{"@type": ..., "@value": ...}`. Decoding
//! first strips those wrappers (maps become objects, lists and sets become
//! arrays) and then deserializes the plain structure.

use crate::error::ClientError;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashMap;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Vertex {
    pub id: Value,
    pub label: String,
    #[serde(default)]
    pub properties: HashMap<String, Vec<VertexProperty>>,
}

impl Vertex {
    /// First value of property `key`, if present.
    pub fn property(&self, key: &str) -> Option<&Value> {
        self.properties
            .get(key)
            .and_then(|values| values.first())
            .map(|p| &p.value)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VertexProperty {
    #[serde(default)]
    pub id: Value,
    #[serde(default)]
    pub label: String,
    pub value: Value,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Edge {
    pub id: Value,
    pub label: String,
    pub in_v: Value,
    pub out_v: Value,
    #[serde(default)]
    pub in_v_label: String,
    #[serde(default)]
    pub out_v_label: String,
    #[serde(default)]
    pub properties: HashMap<String, Property>,
}

impl Edge {
    pub fn property(&self, key: &str) -> Option<&Value> {
        self.properties.get(key).map(|p| &p.value)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Property {
    pub key: String,
    pub value: Value,
}

/// Removes GraphSON type wrappers recursively.
pub fn strip_types(value: Value) -> Value {
    match value {
        Value::Object(mut object) => {
            if object.len() == 2 && object.contains_key("@type") {
                if let Some(inner) = object.remove("@value") {
                    let kind = object
                        .remove("@type")
                        .and_then(|t| t.as_str().map(str::to_string))
                        .unwrap_or_default();
                    return strip_typed(&kind, inner);
                }
            }
            Value::Object(
                object
                    .into_iter()
                    .map(|(k, v)| (k, strip_types(v)))
                    .collect(),
            )
        }
        Value::Array(items) => Value::Array(items.into_iter().map(strip_types).collect()),
        other => other,
    }
}

fn strip_typed(kind: &str, inner: Value) -> Value {
    match (kind, inner) {
        // Maps are flattened as [k1, v1, k2, v2, ...].
        ("g:Map", Value::Array(items)) => {
            let mut object = Map::new();
            let mut items = items.into_iter();
            while let (Some(key), Some(value)) = (items.next(), items.next()) {
                let key = match strip_types(key) {
                    Value::String(s) => s,
                    other => other.to_string(),
                };
                object.insert(key, strip_types(value));
            }
            Value::Object(object)
        }
        (_, inner) => strip_types(inner),
    }
}

/// Decodes every fragment as a list of `T` and concatenates the results.
///
/// A fragment holding `null` contributes nothing; a fragment holding a
/// single non-list value contributes that value.
pub fn unmarshal_values<T: DeserializeOwned>(fragments: &[Vec<u8>]) -> Result<Vec<T>, ClientError> {
    let mut out = Vec::new();
    for fragment in fragments {
        let value: Value = serde_json::from_slice(fragment)?;
        match strip_types(value) {
            Value::Null => {}
            Value::Array(items) => {
                for item in items {
                    out.push(serde_json::from_value(item)?);
                }
            }
            single => out.push(serde_json::from_value(single)?),
        }
    }
    Ok(out)
}

pub fn unmarshal_vertices(fragments: &[Vec<u8>]) -> Result<Vec<Vertex>, ClientError> {
    unmarshal_values(fragments)
}

pub fn unmarshal_edges(fragments: &[Vec<u8>]) -> Result<Vec<Edge>, ClientError> {
    unmarshal_values(fragments)
}

pub fn unmarshal_ids(fragments: &[Vec<u8>]) -> Result<Vec<Value>, ClientError> {
    unmarshal_values(fragments)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn frame(value: Value) -> Vec<u8> {
        serde_json::to_vec(&value).unwrap()
    }

    fn graphson_vertex(id: i64, name: &str) -> Value {
        json!({
            "@type": "g:Vertex",
            "@value": {
                "id": {"@type": "g:Int64", "@value": id},
                "label": "person",
                "properties": {
                    "name": [{
                        "@type": "g:VertexProperty",
                        "@value": {
                            "id": {"@type": "g:Int64", "@value": id * 100},
                            "value": name,
                            "label": "name"
                        }
                    }]
                }
            }
        })
    }

    #[test]
    fn test_vertices_across_fragments() {
        let fragments = vec![
            frame(json!({"@type": "g:List", "@value": [graphson_vertex(1, "marko")]})),
            frame(json!({"@type": "g:List", "@value": [graphson_vertex(2, "vadas")]})),
        ];

        let vertices = unmarshal_vertices(&fragments).unwrap();
        assert_eq!(vertices.len(), 2);
        assert_eq!(vertices[0].id, json!(1));
        assert_eq!(vertices[0].label, "person");
        assert_eq!(vertices[0].property("name"), Some(&json!("marko")));
        assert_eq!(vertices[1].property("name"), Some(&json!("vadas")));
        assert_eq!(vertices[1].properties["name"][0].id, json!(200));
    }

    #[test]
    fn test_edge() {
        let fragments = vec![frame(json!({
            "@type": "g:List",
            "@value": [{
                "@type": "g:Edge",
                "@value": {
                    "id": {"@type": "g:Int32", "@value": 7},
                    "label": "knows",
                    "inVLabel": "person",
                    "outVLabel": "person",
                    "inV": {"@type": "g:Int64", "@value": 2},
                    "outV": {"@type": "g:Int64", "@value": 1},
                    "properties": {
                        "weight": {
                            "@type": "g:Property",
                            "@value": {"key": "weight", "value": {"@type": "g:Double", "@value": 0.5}}
                        }
                    }
                }
            }]
        }))];

        let edges = unmarshal_edges(&fragments).unwrap();
        assert_eq!(edges.len(), 1);
        let edge = &edges[0];
        assert_eq!(edge.label, "knows");
        assert_eq!(edge.out_v, json!(1));
        assert_eq!(edge.in_v, json!(2));
        assert_eq!(edge.in_v_label, "person");
        assert_eq!(edge.property("weight"), Some(&json!(0.5)));
    }

    #[test]
    fn test_plain_json_arrays() {
        let fragments = vec![frame(json!([1, 2])), frame(json!([3]))];
        assert_eq!(unmarshal_values::<i64>(&fragments).unwrap(), vec![1, 2, 3]);
    }

    #[test]
    fn test_map_is_flattened_into_object() {
        let value = json!({
            "@type": "g:Map",
            "@value": ["name", {"@type": "g:List", "@value": ["marko"]}, {"@type": "g:Int32", "@value": 1}, "one"]
        });
        assert_eq!(strip_types(value), json!({"name": ["marko"], "1": "one"}));
    }

    #[test]
    fn test_ids_and_null_fragments() {
        let fragments = vec![
            frame(json!({"@type": "g:List", "@value": ["a", {"@type": "g:Int64", "@value": 5}]})),
            frame(Value::Null),
        ];
        assert_eq!(unmarshal_ids(&fragments).unwrap(), vec![json!("a"), json!(5)]);
    }

    #[test]
    fn test_wrong_shape_is_json_error() {
        let fragments = vec![frame(json!([{"not": "a vertex"}]))];
        assert!(matches!(
            unmarshal_vertices(&fragments),
            Err(ClientError::Json(_))
        ));
    }
}

use crate::error::{FlairError, Result};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Document is a JSON:API response body.
/// The primary `data` member is kept raw so a snapshot preserves exactly what the
/// server sent; typed resources are parsed from it on demand.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    /// Primary data: a resource array for collections, a single object for one entity
    #[serde(default)]
    pub data: Value,

    /// Every other top-level member (links, meta, included, ...)
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Resource is a single JSON:API resource object.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Resource {
    /// Server-issued opaque identifier
    pub id: String,

    /// Entity type name
    #[serde(rename = "type")]
    pub kind: String,

    #[serde(default)]
    pub attributes: Map<String, Value>,

    #[serde(default)]
    pub relationships: Map<String, Value>,
}

impl Document {
    /// Parse a response body. Invalid JSON is a decode error; valid JSON that is
    /// not a document object is a schema error.
    pub fn from_slice(body: &[u8]) -> Result<Self> {
        let value: Value = serde_json::from_slice(body)?;
        Self::from_value(value)
    }

    /// Build a document from an already decoded JSON value
    pub fn from_value(value: Value) -> Result<Self> {
        if !value.is_object() {
            return Err(FlairError::schema("response body is not a JSON object"));
        }
        serde_json::from_value(value).map_err(|e| FlairError::schema(e.to_string()))
    }

    /// True when the primary data is a resource array
    pub fn is_collection(&self) -> bool {
        self.data.is_array()
    }

    /// Parse the primary data into typed resources.
    /// A single object yields one resource and `null` yields none.
    pub fn resources(&self) -> Result<Vec<Resource>> {
        match &self.data {
            Value::Array(items) => items.iter().map(Resource::from_value).collect(),
            Value::Object(_) => Ok(vec![Resource::from_value(&self.data)?]),
            Value::Null => Ok(Vec::new()),
            _ => Err(FlairError::schema("primary data is neither a resource nor an array")),
        }
    }

    /// Get a value from the primary data by a slash-separated path.
    /// For example, "0/attributes/name" reads the name of the first resource
    /// of a collection.
    pub fn get(&self, path: &str) -> Option<&Value> {
        let mut current = &self.data;

        for part in path.split('/').filter(|s| !s.is_empty()) {
            current = match current {
                Value::Object(map) => map.get(part)?,
                Value::Array(arr) => {
                    let index: usize = part.parse().ok()?;
                    arr.get(index)?
                }
                _ => return None,
            };
        }

        Some(current)
    }

    /// Get a string value from the primary data by a slash-separated path
    pub fn get_string(&self, path: &str) -> Option<String> {
        self.get(path).and_then(|v| v.as_str().map(|s| s.to_string()))
    }

    /// Replace the collection member whose id matches `resource["id"]`, or
    /// append `resource` when no member matches. Returns false, leaving the
    /// document alone, when this is not a collection or `resource` has no id.
    pub fn upsert_resource(&mut self, resource: &Value) -> bool {
        let Some(id) = resource.get("id").and_then(Value::as_str) else {
            return false;
        };
        let Value::Array(items) = &mut self.data else {
            return false;
        };

        match items
            .iter_mut()
            .find(|item| item.get("id").and_then(Value::as_str) == Some(id))
        {
            Some(slot) => *slot = resource.clone(),
            None => items.push(resource.clone()),
        }
        true
    }
}

impl Resource {
    fn from_value(value: &Value) -> Result<Self> {
        Resource::deserialize(value)
            .map_err(|e| FlairError::schema(format!("malformed resource: {}", e)))
    }

    /// The human-readable `attributes.name`
    pub fn name(&self) -> Result<&str> {
        self.attributes
            .get("name")
            .and_then(Value::as_str)
            .ok_or_else(|| {
                FlairError::schema(format!("{} {} has no attributes.name", self.kind, self.id))
            })
    }

    /// Get a single attribute value
    pub fn attribute(&self, key: &str) -> Option<&Value> {
        self.attributes.get(key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn vents() -> Document {
        Document::from_value(json!({
            "data": [
                {
                    "id": "7",
                    "type": "vents",
                    "attributes": {"name": "Living Room", "percent-open": 100}
                },
                {"id": "9", "type": "vents", "attributes": {"name": "Office", "percent-open": 0}}
            ],
            "meta": {"self": "/api/vents"}
        }))
        .unwrap()
    }

    #[test]
    fn test_document_deserialization() {
        let doc = vents();
        assert!(doc.is_collection());
        assert_eq!(doc.extra["meta"]["self"], "/api/vents");

        let resources = doc.resources().unwrap();
        assert_eq!(resources.len(), 2);
        assert_eq!(resources[0].id, "7");
        assert_eq!(resources[0].kind, "vents");
        assert_eq!(resources[1].name().unwrap(), "Office");
    }

    #[test]
    fn test_document_get() {
        let doc = vents();
        assert_eq!(doc.get_string("0/attributes/name"), Some("Living Room".to_string()));
        assert_eq!(doc.get("1/attributes/percent-open"), Some(&json!(0)));
        assert_eq!(doc.get("2/id"), None);
        assert_eq!(doc.get("x/id"), None);
    }

    #[test]
    fn test_document_rejects_non_objects() {
        assert!(matches!(Document::from_slice(b"not json"), Err(FlairError::Decode(_))));
        assert!(matches!(Document::from_slice(b"[1, 2]"), Err(FlairError::Schema(_))));
    }

    #[test]
    fn test_single_resource_document() {
        let doc = Document::from_value(json!({
            "data": {"id": "1", "type": "structures", "attributes": {"mode": "auto"}}
        }))
        .unwrap();
        assert!(!doc.is_collection());
        assert_eq!(doc.resources().unwrap().len(), 1);
        assert_eq!(doc.get_string("attributes/mode"), Some("auto".to_string()));
    }

    #[test]
    fn test_malformed_resource_is_schema_error() {
        let doc = Document::from_value(json!({"data": [{"type": "vents"}]})).unwrap();
        assert!(matches!(doc.resources(), Err(FlairError::Schema(_))));

        let doc = Document::from_value(json!({"data": 5})).unwrap();
        assert!(matches!(doc.resources(), Err(FlairError::Schema(_))));
    }

    #[test]
    fn test_resource_without_name() {
        let doc = Document::from_value(json!({"data": {"id": "3", "type": "rooms"}})).unwrap();
        let resources = doc.resources().unwrap();
        assert!(matches!(resources[0].name(), Err(FlairError::Schema(_))));
    }

    #[test]
    fn test_upsert_resource() {
        let mut doc = vents();
        let updated = json!({
            "id": "9",
            "type": "vents",
            "attributes": {"name": "Office", "percent-open": 50}
        });
        assert!(doc.upsert_resource(&updated));
        assert_eq!(doc.get("1/attributes/percent-open"), Some(&json!(50)));
        assert_eq!(doc.get_string("0/attributes/name"), Some("Living Room".to_string()));

        let added = json!({"id": "99", "type": "vents", "attributes": {"name": "Attic"}});
        assert!(doc.upsert_resource(&added));
        assert_eq!(doc.get_string("2/attributes/name"), Some("Attic".to_string()));
        assert_eq!(doc.resources().unwrap().len(), 3);

        assert!(!doc.upsert_resource(&json!({"type": "vents"})));
        let mut single =
            Document::from_value(json!({"data": {"id": "3", "type": "vents"}})).unwrap();
        assert!(!single.upsert_resource(&added));
    }
}

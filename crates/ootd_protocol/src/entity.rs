//! Entity identity and shallow-merge patches.

use crate::error::{ProtocolError, ProtocolResult};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{Map, Value};

/// A partial update: top-level fields to overwrite on an entity.
///
/// Fields that are absent or `null` leave the existing value untouched.
pub type Patch = Map<String, Value>;

/// A domain record with a stable string identity.
///
/// Identity is the id, never the position inside a collection.
pub trait Entity: Clone + Serialize + DeserializeOwned + Send + Sync + 'static {
    /// Returns the stable identifier.
    fn id(&self) -> &str;

    /// Returns a copy of `self` with `patch` shallow-merged in.
    ///
    /// Fails if the merged value no longer deserializes or if the patch
    /// rewrites the id.
    fn patched(&self, patch: &Patch) -> ProtocolResult<Self> {
        let mut fields = match serde_json::to_value(self)? {
            Value::Object(fields) => fields,
            _ => return Err(ProtocolError::NotAnObject("entity")),
        };
        for (key, value) in patch {
            if value.is_null() {
                continue;
            }
            fields.insert(key.clone(), value.clone());
        }
        let merged: Self = serde_json::from_value(Value::Object(fields))?;
        if merged.id() != self.id() {
            return Err(ProtocolError::IdChanged {
                from: self.id().to_string(),
                to: merged.id().to_string(),
            });
        }
        Ok(merged)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use serde_json::json;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Card {
        id: String,
        title: String,
        #[serde(default)]
        likes: u32,
    }

    impl Entity for Card {
        fn id(&self) -> &str {
            &self.id
        }
    }

    fn patch(value: Value) -> Patch {
        value.as_object().cloned().unwrap()
    }

    fn card() -> Card {
        Card {
            id: "c1".into(),
            title: "denim".into(),
            likes: 3,
        }
    }

    #[test]
    fn patch_overwrites_present_fields() {
        let merged = card().patched(&patch(json!({"likes": 4}))).unwrap();
        assert_eq!(merged.likes, 4);
        assert_eq!(merged.title, "denim");
    }

    #[test]
    fn null_fields_are_preserved() {
        let merged = card()
            .patched(&patch(json!({"title": null, "likes": 9})))
            .unwrap();
        assert_eq!(merged.title, "denim");
        assert_eq!(merged.likes, 9);
    }

    #[test]
    fn patch_cannot_change_id() {
        let err = card().patched(&patch(json!({"id": "c2"}))).unwrap_err();
        assert!(matches!(err, ProtocolError::IdChanged { .. }));
    }

    #[test]
    fn patch_with_wrong_type_fails() {
        let err = card().patched(&patch(json!({"likes": "many"}))).unwrap_err();
        assert!(matches!(err, ProtocolError::Json(_)));
    }
}

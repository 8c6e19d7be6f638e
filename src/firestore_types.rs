//! Hand-written slice of the Firestore REST v1 wire format: just the pieces
//! the document store uses (documents, list pages, commit writes with field
//! transforms) plus conversions to and from plain JSON values.

mod document {
    use serde::{Deserialize, Serialize};
    use std::collections::HashMap;

    /// A typed Firestore value.  Note that integers travel as strings on the
    /// wire.
    #[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
    pub enum FirestoreValue {
        #[serde(rename = "nullValue")]
        Null(Option<()>),
        #[serde(rename = "booleanValue")]
        Boolean(bool),
        #[serde(rename = "integerValue")]
        Integer(String),
        #[serde(rename = "doubleValue")]
        Double(f64),
        #[serde(rename = "stringValue")]
        String(String),
        #[serde(rename = "mapValue")]
        Map(MapValue),
        #[serde(rename = "arrayValue")]
        Array(ArrayValue),
    }

    #[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Default)]
    pub struct MapValue {
        #[serde(default, skip_serializing_if = "HashMap::is_empty")]
        pub fields: HashMap<String, FirestoreValue>,
    }

    #[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Default)]
    pub struct ArrayValue {
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        pub values: Vec<FirestoreValue>,
    }

    #[derive(Serialize, Deserialize, Debug, Clone, Default)]
    pub struct Document {
        #[serde(skip_serializing_if = "Option::is_none")]
        pub name: Option<String>,
        #[serde(default)]
        pub fields: HashMap<String, FirestoreValue>,
    }

    #[derive(Deserialize, Debug, Default)]
    #[serde(rename_all = "camelCase")]
    pub struct ListDocumentsResponse {
        #[serde(default)]
        pub documents: Vec<Document>,
        pub next_page_token: Option<String>,
    }
}
pub use document::*;

mod commit {
    use super::document::{Document, FirestoreValue};
    use serde::Serialize;

    #[derive(Serialize, Debug)]
    pub struct CommitRequest {
        pub writes: Vec<Write>,
    }

    #[derive(Serialize, Debug)]
    #[serde(rename_all = "camelCase")]
    pub struct Write {
        pub update: Document,
        #[serde(skip_serializing_if = "Option::is_none")]
        pub update_mask: Option<DocumentMask>,
        #[serde(skip_serializing_if = "Vec::is_empty")]
        pub update_transforms: Vec<FieldTransform>,
    }

    #[derive(Serialize, Debug)]
    #[serde(rename_all = "camelCase")]
    pub struct DocumentMask {
        pub field_paths: Vec<String>,
    }

    /// Server-side transform; the only one we use is the atomic numeric
    /// increment, which is also the only concurrency safety net the backing
    /// service offers.
    #[derive(Serialize, Debug)]
    #[serde(rename_all = "camelCase")]
    pub struct FieldTransform {
        pub field_path: String,
        pub increment: FirestoreValue,
    }
}
pub use commit::*;

mod convert {
    use super::document::{ArrayValue, FirestoreValue, MapValue};
    use serde_json::{Map, Number, Value};
    use std::collections::HashMap;

    pub fn to_firestore(v: &Value) -> FirestoreValue {
        match v {
            Value::Null => FirestoreValue::Null(None),
            Value::Bool(b) => FirestoreValue::Boolean(*b),
            Value::Number(n) => match n.as_i64() {
                Some(i) => FirestoreValue::Integer(i.to_string()),
                None => FirestoreValue::Double(n.as_f64().unwrap_or(0.0)),
            },
            Value::String(s) => FirestoreValue::String(s.clone()),
            Value::Array(items) => FirestoreValue::Array(ArrayValue {
                values: items.iter().map(to_firestore).collect(),
            }),
            Value::Object(map) => FirestoreValue::Map(MapValue {
                fields: map
                    .iter()
                    .map(|(k, v)| (k.clone(), to_firestore(v)))
                    .collect(),
            }),
        }
    }

    pub fn from_firestore(v: FirestoreValue) -> Value {
        match v {
            FirestoreValue::Null(_) => Value::Null,
            FirestoreValue::Boolean(b) => Value::Bool(b),
            // An integer that does not parse is kept as its wire string
            // rather than dropped.
            FirestoreValue::Integer(s) => match s.parse::<i64>() {
                Ok(i) => Value::Number(i.into()),
                Err(_) => Value::String(s),
            },
            FirestoreValue::Double(d) => match Number::from_f64(d) {
                Some(n) => Value::Number(n),
                None => Value::Null,
            },
            FirestoreValue::String(s) => Value::String(s),
            FirestoreValue::Array(arr) => {
                Value::Array(arr.values.into_iter().map(from_firestore).collect())
            }
            FirestoreValue::Map(map) => Value::Object(
                map.fields
                    .into_iter()
                    .map(|(k, v)| (k, from_firestore(v)))
                    .collect(),
            ),
        }
    }

    pub fn fields_to_json(fields: HashMap<String, FirestoreValue>) -> Map<String, Value> {
        fields
            .into_iter()
            .map(|(k, v)| (k, from_firestore(v)))
            .collect()
    }

    pub fn json_to_fields(map: &Map<String, Value>) -> HashMap<String, FirestoreValue> {
        map.iter()
            .map(|(k, v)| (k.clone(), to_firestore(v)))
            .collect()
    }
}
pub use convert::*;

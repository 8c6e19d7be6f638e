//! Access to the hosted document database.  Documents are addressed by
//! collection and key; partial updates are expressed as field patches so the
//! atomic increment primitive stays available to callers.

use crate::error::AppError;
use crate::firestore_types::{
    fields_to_json, json_to_fields, to_firestore, CommitRequest, Document, DocumentMask,
    FieldTransform, FirestoreValue, ListDocumentsResponse, MapValue, Write,
};
use crate::utils::{access_token, GcpAuthenticator};

use async_trait::async_trait;
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::error;

pub type JsonMap = Map<String, Value>;

const FIRESTORE_SCOPE: &str = "https://www.googleapis.com/auth/datastore";
const SCAN_PAGE_SIZE: u32 = 300;

/// One partial-update instruction against a single document.
#[derive(Debug, Clone)]
pub enum FieldPatch {
    Set { path: String, value: Value },
    Delete { path: String },
    Increment { path: String, delta: i64 },
}

impl FieldPatch {
    pub fn path(&self) -> &str {
        match self {
            Self::Set { path, .. } | Self::Delete { path } | Self::Increment { path, .. } => path,
        }
    }
}

#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Fetch one document; absence is not an error.
    async fn get(&self, collection: &str, key: &str) -> Result<Option<JsonMap>, AppError>;
    /// Full overwrite.
    async fn set(&self, collection: &str, key: &str, doc: JsonMap) -> Result<(), AppError>;
    /// Partial patch.  Creates the document when it does not exist yet.
    async fn update(
        &self,
        collection: &str,
        key: &str,
        patches: Vec<FieldPatch>,
    ) -> Result<(), AppError>;
    /// Full-collection scan; the only query shape the workflows need.
    async fn scan(&self, collection: &str) -> Result<Vec<(String, JsonMap)>, AppError>;
}

/// Quote one field-path segment the way the backing service expects: plain
/// identifiers pass through, anything else (ISO timestamps in particular) is
/// wrapped in backticks.
pub fn quote_segment(segment: &str) -> String {
    let plain = !segment.is_empty()
        && !segment.starts_with(|c: char| c.is_ascii_digit())
        && segment.chars().all(|c| c.is_ascii_alphanumeric() || c == '_');
    if plain {
        segment.to_string()
    } else {
        format!("`{segment}`")
    }
}

/// Split a dotted field path back into raw segments, honouring backticks.
pub fn parse_field_path(path: &str) -> Vec<String> {
    let mut segments = Vec::new();
    let mut current = String::new();
    let mut quoted = false;
    for c in path.chars() {
        match c {
            '`' => quoted = !quoted,
            '.' if !quoted => segments.push(std::mem::take(&mut current)),
            _ => current.push(c),
        }
    }
    segments.push(current);
    segments
}

pub struct FirestoreStore {
    http: reqwest::Client,
    auth: Arc<GcpAuthenticator>,
    project_id: String,
}

impl FirestoreStore {
    pub fn new(http: reqwest::Client, auth: Arc<GcpAuthenticator>, project_id: String) -> Self {
        Self {
            http,
            auth,
            project_id,
        }
    }

    fn docs_base(&self) -> String {
        format!(
            "https://firestore.googleapis.com/v1/projects/{}/databases/(default)/documents",
            self.project_id
        )
    }

    fn doc_name(&self, collection: &str, key: &str) -> String {
        format!(
            "projects/{}/databases/(default)/documents/{}/{}",
            self.project_id, collection, key
        )
    }

    async fn bearer(&self) -> Result<String, AppError> {
        access_token(&self.auth, &[FIRESTORE_SCOPE]).await
    }
}

/// Nest a set value under its path segments, merging into any intermediate
/// maps already staged for this write.
fn insert_nested(
    fields: &mut HashMap<String, FirestoreValue>,
    segments: &[String],
    value: FirestoreValue,
) {
    let (head, rest) = match segments.split_first() {
        Some(split) => split,
        None => return,
    };
    if rest.is_empty() {
        fields.insert(head.clone(), value);
        return;
    }
    let entry = fields
        .entry(head.clone())
        .or_insert_with(|| FirestoreValue::Map(MapValue::default()));
    if !matches!(entry, FirestoreValue::Map(_)) {
        *entry = FirestoreValue::Map(MapValue::default());
    }
    if let FirestoreValue::Map(map) = entry {
        insert_nested(&mut map.fields, rest, value);
    }
}

fn build_write(name: String, patches: Vec<FieldPatch>) -> Write {
    let mut fields = HashMap::new();
    let mut mask_paths = Vec::new();
    let mut transforms = Vec::new();
    for patch in patches {
        match patch {
            FieldPatch::Set { path, value } => {
                insert_nested(&mut fields, &parse_field_path(&path), to_firestore(&value));
                mask_paths.push(path);
            }
            FieldPatch::Delete { path } => mask_paths.push(path),
            FieldPatch::Increment { path, delta } => transforms.push(FieldTransform {
                field_path: path,
                increment: FirestoreValue::Integer(delta.to_string()),
            }),
        }
    }
    Write {
        update: Document {
            name: Some(name),
            fields,
        },
        update_mask: Some(DocumentMask {
            field_paths: mask_paths,
        }),
        update_transforms: transforms,
    }
}

#[async_trait]
impl DocumentStore for FirestoreStore {
    async fn get(&self, collection: &str, key: &str) -> Result<Option<JsonMap>, AppError> {
        let url = format!("{}/{}/{}", self.docs_base(), collection, key);
        let resp = self
            .http
            .get(&url)
            .bearer_auth(self.bearer().await?)
            .send()
            .await
            .map_err(|e| {
                error!(error=%e, collection, key, "document get failed");
                AppError("document get failed")
            })?;
        if resp.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !resp.status().is_success() {
            error!(status=%resp.status(), collection, key, "document get rejected");
            return Err(AppError("document get rejected"));
        }
        let doc: Document = resp.json().await.map_err(|e| {
            error!(error=%e, collection, key, "failed to decode document");
            AppError("document decode failed")
        })?;
        Ok(Some(fields_to_json(doc.fields)))
    }

    async fn set(&self, collection: &str, key: &str, doc: JsonMap) -> Result<(), AppError> {
        let url = format!("{}/{}/{}", self.docs_base(), collection, key);
        let body = Document {
            name: None,
            fields: json_to_fields(&doc),
        };
        let resp = self
            .http
            .patch(&url)
            .bearer_auth(self.bearer().await?)
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                error!(error=%e, collection, key, "document set failed");
                AppError("document set failed")
            })?;
        if !resp.status().is_success() {
            error!(status=%resp.status(), collection, key, "document set rejected");
            return Err(AppError("document set rejected"));
        }
        Ok(())
    }

    async fn update(
        &self,
        collection: &str,
        key: &str,
        patches: Vec<FieldPatch>,
    ) -> Result<(), AppError> {
        let url = format!("{}:commit", self.docs_base());
        let body = CommitRequest {
            writes: vec![build_write(self.doc_name(collection, key), patches)],
        };
        let resp = self
            .http
            .post(&url)
            .bearer_auth(self.bearer().await?)
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                error!(error=%e, collection, key, "document update failed");
                AppError("document update failed")
            })?;
        if !resp.status().is_success() {
            error!(status=%resp.status(), collection, key, "document update rejected");
            return Err(AppError("document update rejected"));
        }
        Ok(())
    }

    async fn scan(&self, collection: &str) -> Result<Vec<(String, JsonMap)>, AppError> {
        let mut out = Vec::new();
        let mut page_token: Option<String> = None;
        loop {
            let mut url = format!(
                "{}/{}?pageSize={}",
                self.docs_base(),
                collection,
                SCAN_PAGE_SIZE
            );
            if let Some(token) = &page_token {
                url.push_str("&pageToken=");
                url.push_str(token);
            }
            let resp = self
                .http
                .get(&url)
                .bearer_auth(self.bearer().await?)
                .send()
                .await
                .map_err(|e| {
                    error!(error=%e, collection, "collection scan failed");
                    AppError("collection scan failed")
                })?;
            if !resp.status().is_success() {
                error!(status=%resp.status(), collection, "collection scan rejected");
                return Err(AppError("collection scan rejected"));
            }
            let page: ListDocumentsResponse = resp.json().await.map_err(|e| {
                error!(error=%e, collection, "failed to decode scan page");
                AppError("scan decode failed")
            })?;
            for doc in page.documents {
                let key = doc
                    .name
                    .as_deref()
                    .and_then(|n| n.rsplit('/').next())
                    .unwrap_or_default()
                    .to_string();
                out.push((key, fields_to_json(doc.fields)));
            }
            match page.next_page_token {
                Some(token) if !token.is_empty() => page_token = Some(token),
                _ => break,
            }
        }
        Ok(out)
    }
}


#[cfg(test)]
mod tests {
    use super::memory::MemoryStore;
    use super::*;
    use serde_json::json;

    #[test]
    fn segments_with_timestamps_get_backticks() {
        assert_eq!(quote_segment("requests"), "requests");
        assert_eq!(
            quote_segment("2024-06-01T10:00:00"),
            "`2024-06-01T10:00:00`"
        );
    }

    #[test]
    fn field_paths_parse_back_to_raw_segments() {
        assert_eq!(
            parse_field_path("requests.`2024-06-01T10:00:00`"),
            vec!["requests".to_string(), "2024-06-01T10:00:00".to_string()]
        );
        assert_eq!(parse_field_path("phone"), vec!["phone".to_string()]);
    }

    #[test]
    fn writes_nest_set_values_under_the_mask() {
        let write = build_write(
            "projects/p/databases/(default)/documents/users/91234567".to_string(),
            vec![
                FieldPatch::Set {
                    path: "requests.`2024-06-01T10:00:00`".to_string(),
                    value: json!("Pending"),
                },
                FieldPatch::Delete {
                    path: "remarks.`2024-06-01T10:00:00`".to_string(),
                },
                FieldPatch::Increment {
                    path: "counts.`2024-06-01T10:00:00`".to_string(),
                    delta: 1,
                },
            ],
        );
        let mask = write.update_mask.as_ref().unwrap();
        assert_eq!(mask.field_paths.len(), 2);
        assert_eq!(write.update_transforms.len(), 1);
        let requests = match &write.update.fields["requests"] {
            FirestoreValue::Map(m) => &m.fields,
            other => panic!("expected map, got {other:?}"),
        };
        assert_eq!(
            requests["2024-06-01T10:00:00"],
            FirestoreValue::String("Pending".to_string())
        );
    }

    #[tokio::test]
    async fn memory_store_applies_patches_like_the_service() {
        let store = MemoryStore::default();
        store
            .update(
                "users",
                "91234567",
                vec![
                    FieldPatch::Set {
                        path: "requests.`2024-06-01T10:00:00`".to_string(),
                        value: json!("Pending"),
                    },
                    FieldPatch::Increment {
                        path: "counts.`2024-06-01T10:00:00`".to_string(),
                        delta: 1,
                    },
                ],
            )
            .await
            .unwrap();
        store
            .update(
                "users",
                "91234567",
                vec![FieldPatch::Increment {
                    path: "counts.`2024-06-01T10:00:00`".to_string(),
                    delta: -1,
                }],
            )
            .await
            .unwrap();
        let doc = store.snapshot("users", "91234567").unwrap();
        assert_eq!(doc["requests"]["2024-06-01T10:00:00"], json!("Pending"));
        assert_eq!(doc["counts"]["2024-06-01T10:00:00"], json!(0));

        store
            .update(
                "users",
                "91234567",
                vec![FieldPatch::Delete {
                    path: "requests.`2024-06-01T10:00:00`".to_string(),
                }],
            )
            .await
            .unwrap();
        let doc = store.snapshot("users", "91234567").unwrap();
        assert!(doc["requests"].as_object().unwrap().is_empty());
    }
}

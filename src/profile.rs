//! User profile reads and writes.  Saving merges the profile fields so the
//! request maps on the same document are never clobbered.

use crate::booking::load_user;
use crate::consts::USERS_COLLECTION;
use crate::error::{AppError, HandlerError};
use crate::store::{DocumentStore, FieldPatch};
use crate::types::{Profile, Session};
use crate::validation;

use serde_json::json;
use tracing::info;

pub async fn get_profile<S: DocumentStore>(
    store: &S,
    session: &Session,
) -> Result<Option<Profile>, AppError> {
    Ok(load_user(store, session).await?.map(|user| Profile {
        language: user.language,
        postal_code: user.postal_code,
        unit_number: user.unit_number,
    }))
}

pub async fn save_profile<S: DocumentStore>(
    store: &S,
    session: &Session,
    profile: Profile,
) -> Result<(), HandlerError> {
    validation::check_postal_code(&profile.postal_code)?;
    validation::check_unit_number(&profile.unit_number)?;
    validation::check_language(&profile.language)?;

    store
        .update(
            USERS_COLLECTION,
            &session.phone,
            vec![
                FieldPatch::Set {
                    path: "phone".to_string(),
                    value: json!(session.phone),
                },
                FieldPatch::Set {
                    path: "language".to_string(),
                    value: json!(profile.language),
                },
                FieldPatch::Set {
                    path: "postal_code".to_string(),
                    value: json!(profile.postal_code),
                },
                FieldPatch::Set {
                    path: "unit_number".to_string(),
                    value: json!(profile.unit_number),
                },
            ],
        )
        .await?;
    info!(phone=%session.phone, "profile saved");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::memory::MemoryStore;
    use serde_json::json;

    fn session() -> Session {
        Session {
            phone: "91234567".to_string(),
        }
    }

    fn profile() -> Profile {
        Profile {
            language: "en".to_string(),
            postal_code: "560123".to_string(),
            unit_number: "05-123".to_string(),
        }
    }

    #[tokio::test]
    async fn saving_creates_the_user_document() {
        let store = MemoryStore::default();
        save_profile(&store, &session(), profile()).await.unwrap();
        let stored = get_profile(&store, &session()).await.unwrap().unwrap();
        assert_eq!(stored.postal_code, "560123");
        assert_eq!(stored.unit_number, "05-123");
    }

    #[tokio::test]
    async fn saving_does_not_clobber_request_maps() {
        let store = MemoryStore::default();
        store.seed(
            USERS_COLLECTION,
            "91234567",
            json!({
                "phone": "91234567",
                "requests": { "2024-06-01T10:00:00": "Pending" },
            }),
        );
        save_profile(&store, &session(), profile()).await.unwrap();
        let doc = store.snapshot(USERS_COLLECTION, "91234567").unwrap();
        assert_eq!(doc["requests"]["2024-06-01T10:00:00"], json!("Pending"));
        assert_eq!(doc["language"], json!("en"));
    }

    #[tokio::test]
    async fn bad_postal_code_never_reaches_the_store() {
        let store = MemoryStore::default();
        let bad = Profile {
            postal_code: "12345".to_string(),
            ..profile()
        };
        let err = save_profile(&store, &session(), bad).await.unwrap_err();
        assert!(matches!(err, HandlerError::Validation(_)));
        assert!(store.snapshot(USERS_COLLECTION, "91234567").is_none());
    }

    #[tokio::test]
    async fn missing_profile_reads_as_none() {
        let store = MemoryStore::default();
        assert!(get_profile(&store, &session()).await.unwrap().is_none());
    }
}

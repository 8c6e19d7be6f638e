//! The booking workflows: book a slot, cancel a request, re-book from a
//! history entry.  Each workflow is a sequence of remote writes; a failing
//! step unwinds the steps already completed, in reverse order, before the
//! error is returned.  Unwind failures are logged and swallowed — there is
//! nothing better to do with them.

use crate::blobstore::BlobStore;
use crate::consts::{SLOT_CAPACITY, USERS_COLLECTION};
use crate::error::{AppError, HandlerError, ValidationError};
use crate::ledger;
use crate::store::{quote_segment, DocumentStore, FieldPatch};
use crate::types::{RequestListing, RequestStatus, Session, UserDoc};
use crate::utils::recording_object_name;

use serde_json::json;
use tracing::{error, info, warn};

pub struct BookSlot {
    pub slot: String,
    pub remarks: String,
    pub audio: Option<Vec<u8>>,
}

pub async fn load_user<S: DocumentStore>(
    store: &S,
    session: &Session,
) -> Result<Option<UserDoc>, AppError> {
    Ok(store
        .get(USERS_COLLECTION, &session.phone)
        .await?
        .and_then(UserDoc::from_map))
}

fn slot_field(map: &str, slot: &str) -> String {
    format!("{map}.{}", quote_segment(slot))
}

fn request_field_deletes(slot: &str) -> Vec<FieldPatch> {
    vec![
        FieldPatch::Delete {
            path: slot_field("requests", slot),
        },
        FieldPatch::Delete {
            path: slot_field("remarks", slot),
        },
        FieldPatch::Delete {
            path: slot_field("recordings", slot),
        },
    ]
}

async fn unwind_request_fields<S: DocumentStore>(store: &S, session: &Session, slot: &str) {
    if let Err(e) = store
        .update(USERS_COLLECTION, &session.phone, request_field_deletes(slot))
        .await
    {
        error!(error=%e, phone=%session.phone, slot, "failed to unwind request fields");
    }
}

pub async fn book_slot<S: DocumentStore, B: BlobStore>(
    store: &S,
    blobs: &B,
    session: &Session,
    book: BookSlot,
) -> Result<(), HandlerError> {
    let slot = book.slot.as_str();

    // Guards, before anything is written.
    let counts = ledger::read_counts(store).await?;
    if counts.get(slot).copied().unwrap_or(0) >= SLOT_CAPACITY {
        return Err(ValidationError::new("that time slot is fully booked").into());
    }
    let user = load_user(store, session)
        .await?
        .ok_or_else(|| ValidationError::new("no profile found for this phone number"))?;
    if user.requests.contains_key(slot) {
        return Err(ValidationError::new("a request already exists for this slot").into());
    }

    // Step 1: request fields.  Nothing to unwind if this fails.
    store
        .update(
            USERS_COLLECTION,
            &session.phone,
            vec![
                FieldPatch::Set {
                    path: slot_field("requests", slot),
                    value: json!(RequestStatus::Pending),
                },
                FieldPatch::Set {
                    path: slot_field("remarks", slot),
                    value: json!(book.remarks),
                },
            ],
        )
        .await?;

    // Step 2: ledger count.
    if let Err(e) = ledger::adjust_count(store, slot, 1).await {
        warn!(phone=%session.phone, slot, "unwinding request fields after ledger failure");
        unwind_request_fields(store, session, slot).await;
        return Err(e.into());
    }

    // Step 3: recording, when one was attached.
    if let Some(bytes) = book.audio {
        let object = recording_object_name(&session.phone, slot);
        let result = match blobs.upload(&object, bytes).await {
            Ok(()) => {
                store
                    .update(
                        USERS_COLLECTION,
                        &session.phone,
                        vec![FieldPatch::Set {
                            path: slot_field("recordings", slot),
                            value: json!(object),
                        }],
                    )
                    .await
            }
            Err(e) => Err(e),
        };
        if let Err(e) = result {
            warn!(phone=%session.phone, slot, "unwinding booking after recording failure");
            // Deleting tolerates a blob that never made it up.
            if let Err(undo) = blobs.delete(&object).await {
                error!(error=%undo, slot, "failed to unwind recording blob");
            }
            if let Err(undo) = ledger::adjust_count(store, slot, -1).await {
                error!(error=%undo, slot, "failed to unwind ledger count");
            }
            unwind_request_fields(store, session, slot).await;
            return Err(e.into());
        }
    }

    info!(phone=%session.phone, slot, "request booked");
    Ok(())
}

pub async fn cancel_request<S: DocumentStore, B: BlobStore>(
    store: &S,
    blobs: &B,
    session: &Session,
    slot: &str,
) -> Result<(), HandlerError> {
    // Blob first, so the map never references a blob that is about to go.
    blobs
        .delete(&recording_object_name(&session.phone, slot))
        .await?;
    ledger::adjust_count(store, slot, -1).await?;
    store
        .update(USERS_COLLECTION, &session.phone, request_field_deletes(slot))
        .await?;
    info!(phone=%session.phone, slot, "request cancelled");
    Ok(())
}

/// Remarks synthesized when a history entry is re-booked.
pub fn remake_remarks(comment: &str, original_slot: &str) -> String {
    format!("{comment} (Remake request, past request date is {original_slot})")
}

pub async fn rebook_from_history<S: DocumentStore, B: BlobStore>(
    store: &S,
    blobs: &B,
    session: &Session,
    history_slot: &str,
    new_slot: String,
    audio: Option<Vec<u8>>,
) -> Result<(), HandlerError> {
    let user = load_user(store, session)
        .await?
        .ok_or_else(|| ValidationError::new("no profile found for this phone number"))?;
    let comment = user
        .history
        .get(history_slot)
        .ok_or_else(|| ValidationError::new("no history entry for that date"))?;
    let remarks = remake_remarks(comment, history_slot);
    book_slot(
        store,
        blobs,
        session,
        BookSlot {
            slot: new_slot,
            remarks,
            audio,
        },
    )
    .await
}

pub async fn list_requests<S: DocumentStore>(
    store: &S,
    session: &Session,
) -> Result<RequestListing, AppError> {
    let user = load_user(store, session).await?.unwrap_or_default();
    Ok(RequestListing {
        requests: user.requests,
        remarks: user.remarks,
        history: user.history,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blobstore::memory::{FailingBlobs, MemoryBlobs};
    use crate::store::memory::{FailingStore, MemoryStore};
    use serde_json::json;

    const PHONE: &str = "91234567";
    const SLOT: &str = "2024-06-01T10:00:00";
    const OBJECT: &str = "91234567_2024-06-01T10%3A00%3A00.wav";

    fn session() -> Session {
        Session {
            phone: PHONE.to_string(),
        }
    }

    fn seeded_store() -> MemoryStore {
        let store = MemoryStore::default();
        store.seed(
            USERS_COLLECTION,
            PHONE,
            json!({
                "phone": PHONE,
                "language": "en",
                "postal_code": "560123",
                "unit_number": "05-123",
            }),
        );
        store
    }

    async fn count(store: &impl DocumentStore, slot: &str) -> Option<i64> {
        ledger::read_counts(store).await.unwrap().get(slot).copied()
    }

    #[tokio::test]
    async fn booking_writes_pending_and_increments_by_one() {
        let store = seeded_store();
        let blobs = MemoryBlobs::default();
        book_slot(
            &store,
            &blobs,
            &session(),
            BookSlot {
                slot: SLOT.to_string(),
                remarks: "need help with groceries".to_string(),
                audio: None,
            },
        )
        .await
        .unwrap();

        let doc = store.snapshot(USERS_COLLECTION, PHONE).unwrap();
        assert_eq!(doc["requests"][SLOT], json!("Pending"));
        assert_eq!(doc["remarks"][SLOT], json!("need help with groceries"));
        assert_eq!(count(&store, SLOT).await, Some(1));
    }

    #[tokio::test]
    async fn booking_with_audio_uploads_and_references_the_blob() {
        let store = seeded_store();
        let blobs = MemoryBlobs::default();
        book_slot(
            &store,
            &blobs,
            &session(),
            BookSlot {
                slot: SLOT.to_string(),
                remarks: "see recording".to_string(),
                audio: Some(vec![0u8; 64]),
            },
        )
        .await
        .unwrap();

        assert!(blobs.contains(OBJECT));
        let doc = store.snapshot(USERS_COLLECTION, PHONE).unwrap();
        assert_eq!(doc["recordings"][SLOT], json!(OBJECT));
    }

    #[tokio::test]
    async fn full_slots_cannot_be_booked() {
        let store = seeded_store();
        store.seed(
            ledger::LEDGER_COLLECTION,
            ledger::LEDGER_KEY,
            json!({ "counts": { SLOT: 2 } }),
        );
        let blobs = MemoryBlobs::default();
        let err = book_slot(
            &store,
            &blobs,
            &session(),
            BookSlot {
                slot: SLOT.to_string(),
                remarks: "too late".to_string(),
                audio: None,
            },
        )
        .await
        .unwrap_err();
        assert!(matches!(err, HandlerError::Validation(_)));
        assert_eq!(count(&store, SLOT).await, Some(2));
    }

    #[tokio::test]
    async fn a_slot_cannot_be_booked_twice_by_the_same_user() {
        let store = seeded_store();
        let blobs = MemoryBlobs::default();
        let book = || BookSlot {
            slot: SLOT.to_string(),
            remarks: "first".to_string(),
            audio: None,
        };
        book_slot(&store, &blobs, &session(), book()).await.unwrap();
        let err = book_slot(&store, &blobs, &session(), book())
            .await
            .unwrap_err();
        assert!(matches!(err, HandlerError::Validation(_)));
        assert_eq!(count(&store, SLOT).await, Some(1));
    }

    #[tokio::test]
    async fn cancelling_decrements_and_clears_the_request() {
        let store = seeded_store();
        let blobs = MemoryBlobs::default();
        book_slot(
            &store,
            &blobs,
            &session(),
            BookSlot {
                slot: SLOT.to_string(),
                remarks: "cancel me".to_string(),
                audio: Some(vec![0u8; 16]),
            },
        )
        .await
        .unwrap();

        cancel_request(&store, &blobs, &session(), SLOT)
            .await
            .unwrap();

        assert_eq!(count(&store, SLOT).await, Some(0));
        assert!(!blobs.contains(OBJECT));
        let doc = store.snapshot(USERS_COLLECTION, PHONE).unwrap();
        assert!(doc["requests"].as_object().unwrap().is_empty());
        assert!(doc["remarks"].as_object().unwrap().is_empty());
        assert!(doc["recordings"].as_object().unwrap().is_empty());
    }

    // Pins the known gap: cancel has no existence guard, so a repeated
    // cancel drives the counter below zero.
    #[tokio::test]
    async fn repeated_cancel_decrements_again() {
        let store = seeded_store();
        let blobs = MemoryBlobs::default();
        book_slot(
            &store,
            &blobs,
            &session(),
            BookSlot {
                slot: SLOT.to_string(),
                remarks: "once".to_string(),
                audio: None,
            },
        )
        .await
        .unwrap();

        cancel_request(&store, &blobs, &session(), SLOT)
            .await
            .unwrap();
        cancel_request(&store, &blobs, &session(), SLOT)
            .await
            .unwrap();
        assert_eq!(count(&store, SLOT).await, Some(-1));
    }

    #[tokio::test]
    async fn ledger_failure_unwinds_the_request_fields() {
        let store = FailingStore {
            inner: seeded_store(),
            fail_paths_containing: "counts.",
        };
        let blobs = MemoryBlobs::default();
        let err = book_slot(
            &store,
            &blobs,
            &session(),
            BookSlot {
                slot: SLOT.to_string(),
                remarks: "doomed".to_string(),
                audio: None,
            },
        )
        .await
        .unwrap_err();
        assert!(matches!(err, HandlerError::Service(_)));

        let doc = store.inner.snapshot(USERS_COLLECTION, PHONE).unwrap();
        assert!(doc["requests"].as_object().unwrap().is_empty());
        assert!(doc["remarks"].as_object().unwrap().is_empty());
    }

    #[tokio::test]
    async fn upload_failure_unwinds_ledger_and_request_fields() {
        let store = seeded_store();
        let blobs = FailingBlobs::default();
        let err = book_slot(
            &store,
            &blobs,
            &session(),
            BookSlot {
                slot: SLOT.to_string(),
                remarks: "doomed".to_string(),
                audio: Some(vec![0u8; 16]),
            },
        )
        .await
        .unwrap_err();
        assert!(matches!(err, HandlerError::Service(_)));

        assert_eq!(count(&store, SLOT).await, Some(0));
        let doc = store.snapshot(USERS_COLLECTION, PHONE).unwrap();
        assert!(doc["requests"].as_object().unwrap().is_empty());
    }

    #[test]
    fn remake_remarks_matches_the_template() {
        assert_eq!(
            remake_remarks("wheelchair pickup", "2024-05-01T09:00:00"),
            "wheelchair pickup (Remake request, past request date is 2024-05-01T09:00:00)"
        );
    }

    #[tokio::test]
    async fn rebooking_carries_the_history_comment_forward() {
        let store = seeded_store();
        store.seed(
            USERS_COLLECTION,
            PHONE,
            json!({
                "phone": PHONE,
                "history": { "2024-05-01T09:00:00": "wheelchair pickup" },
            }),
        );
        let blobs = MemoryBlobs::default();
        rebook_from_history(
            &store,
            &blobs,
            &session(),
            "2024-05-01T09:00:00",
            SLOT.to_string(),
            None,
        )
        .await
        .unwrap();

        let doc = store.snapshot(USERS_COLLECTION, PHONE).unwrap();
        assert_eq!(
            doc["remarks"][SLOT],
            json!("wheelchair pickup (Remake request, past request date is 2024-05-01T09:00:00)")
        );
        assert_eq!(doc["requests"][SLOT], json!("Pending"));
        assert_eq!(count(&store, SLOT).await, Some(1));
    }

    #[tokio::test]
    async fn rebooking_without_a_history_entry_is_rejected() {
        let store = seeded_store();
        let blobs = MemoryBlobs::default();
        let err = rebook_from_history(
            &store,
            &blobs,
            &session(),
            "2024-05-01T09:00:00",
            SLOT.to_string(),
            None,
        )
        .await
        .unwrap_err();
        assert!(matches!(err, HandlerError::Validation(_)));
    }
}

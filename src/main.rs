mod admin;
mod blobstore;
mod booking;
mod error;
mod firestore_types;
mod handlers;
mod ledger;
mod profile;
mod spreadsheet;
mod store;
mod types;
mod utils;
mod validation;

use crate::blobstore::GcsBlobStore;
use crate::store::FirestoreStore;
use crate::types::AppState;

use axum::{
    routing::{delete, get, post},
    Router,
};
use std::env;
use std::sync::Arc;
use tracing_subscriber::prelude::*;

pub mod consts {
    /// Two requests per slot; a slot at capacity disappears from the picker.
    pub const SLOT_CAPACITY: i64 = 2;
    pub const MAX_RECORDING_BYTES: usize = 5 * 1024 * 1024;
    pub const USERS_COLLECTION: &str = "users";
    pub const EXPORT_SHEET_NAME: &str = "Requests";
}

#[tokio::main]
async fn main() {
    dotenvy::dotenv().unwrap();
    let subscriber = tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .compact()
                .with_file(true)
                .with_line_number(true),
        )
        .with(tracing_subscriber::filter::Targets::new().with_targets([
            ("hyper", tracing_subscriber::filter::LevelFilter::OFF),
            ("hwn_rs", tracing_subscriber::filter::LevelFilter::DEBUG),
        ]));
    tracing::subscriber::set_global_default(subscriber).unwrap();

    let credentials = env::var("GOOGLE_APPLICATION_CREDENTIALS")
        .expect("No google application credentials location set.");
    let project_id = env::var("HWN_PROJECT_ID").expect("HWN_PROJECT_ID not set!");
    let bucket = env::var("HWN_RECORDINGS_BUCKET").expect("HWN_RECORDINGS_BUCKET not set!");
    let admin_token = env::var("HWN_ADMIN_TOKEN").expect("HWN_ADMIN_TOKEN not set!");
    let bind_addr = env::var("HWN_BIND_ADDR").unwrap_or_else(|_| "0.0.0.0:3000".to_string());

    let auth = Arc::new(utils::gcp_authenticator(&credentials).await);
    let http_client = reqwest::Client::new();
    let store = FirestoreStore::new(http_client.clone(), auth.clone(), project_id);
    let blobs = GcsBlobStore::new(http_client, auth, bucket);

    let app_state = Arc::new(AppState {
        store,
        blobs,
        admin_token,
    });

    let app = Router::new()
        .route("/health", get(|| async { "OK" }))
        .route("/slots", get(handlers::available_slots_handler))
        .route(
            "/requests",
            get(handlers::list_requests_handler).post(handlers::book_handler),
        )
        .route("/requests/rebook", post(handlers::rebook_handler))
        .route("/requests/:slot", delete(handlers::cancel_handler))
        .route("/recordings/:slot", get(handlers::recording_handler))
        .route(
            "/profile",
            get(handlers::get_profile_handler).put(handlers::put_profile_handler),
        )
        .route("/admin/export", get(handlers::admin_export_handler))
        .route("/admin/import", post(handlers::admin_import_handler))
        .with_state(app_state);

    axum::Server::bind(&bind_addr.parse().unwrap())
        .serve(app.into_make_service())
        .await
        .unwrap();
}

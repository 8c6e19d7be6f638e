use crate::error::{AppError, ValidationError};

use base64::{engine, Engine};
use gcs_common::yup_oauth2;
use tracing::error;

pub type GcpAuthenticator =
    yup_oauth2::authenticator::Authenticator<hyper_rustls::HttpsConnector<hyper::client::HttpConnector>>;

/// Recording object name convention shared by booking, cancellation and the
/// admin spreadsheet round trip: `{phone}_{percent-encoded-timestamp}.wav`.
pub fn recording_object_name(phone: &str, slot: &str) -> String {
    format!("{}_{}.wav", phone, percent_encode(slot))
}

/// Recover the slot timestamp from a recording retrieval URL.  The object
/// name is the last path segment; depending on which service produced the
/// URL the name may itself arrive percent-encoded, so the segment is decoded
/// once before the filename convention is applied.
pub fn slot_from_recording_url(url: &str) -> Option<(String, String)> {
    let segment = url.split('?').next()?.rsplit('/').next()?;
    let name = percent_decode(segment)?;
    let stem = name.strip_suffix(".wav")?;
    let (phone, enc_slot) = stem.split_once('_')?;
    if phone.is_empty() {
        return None;
    }
    let slot = percent_decode(enc_slot)?;
    if slot.is_empty() {
        return None;
    }
    Some((phone.to_string(), slot))
}

fn is_unreserved(b: u8) -> bool {
    b.is_ascii_alphanumeric() || matches!(b, b'-' | b'.' | b'_' | b'~')
}

pub fn percent_encode(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for &b in s.as_bytes() {
        if is_unreserved(b) {
            out.push(b as char);
        } else {
            out.push_str(&format!("%{b:02X}"));
        }
    }
    out
}

pub fn percent_decode(s: &str) -> Option<String> {
    let bytes = s.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%' {
            let hex = bytes.get(i + 1..i + 3)?;
            let hex = std::str::from_utf8(hex).ok()?;
            out.push(u8::from_str_radix(hex, 16).ok()?);
            i += 3;
        } else {
            out.push(bytes[i]);
            i += 1;
        }
    }
    String::from_utf8(out).ok()
}

pub fn b64_decode(enc: &str) -> Result<Vec<u8>, ValidationError> {
    engine::general_purpose::STANDARD
        .decode(enc)
        .map_err(|_| ValidationError::new("audio payload is not valid base64"))
}

/// Build the service-account authenticator shared by the document and blob
/// store clients.
pub async fn gcp_authenticator(credentials_path: &str) -> GcpAuthenticator {
    let conn = hyper_rustls::HttpsConnectorBuilder::new()
        .with_native_roots()
        .https_or_http()
        .enable_http2()
        .build();
    let tls_client = hyper::Client::builder().build(conn);
    let key_json = tokio::fs::read_to_string(credentials_path)
        .await
        .expect("failed to read GCP service account key file");
    let service_account_key =
        yup_oauth2::parse_service_account_key(key_json).expect("failed to parse GCP account key");
    yup_oauth2::ServiceAccountAuthenticator::builder(service_account_key)
        .hyper_client(tls_client)
        .persist_tokens_to_disk("tokencache.json")
        .build()
        .await
        .expect("ServiceAccount authenticator failed.")
}

pub async fn access_token(auth: &GcpAuthenticator, scopes: &[&str]) -> Result<String, AppError> {
    let token = auth.token(scopes).await.map_err(|e| {
        error!(error=%e, "failed to obtain GCP access token");
        AppError("gcp token error")
    })?;
    Ok(token.as_str().to_string())
}

//! Upload client for a running tracker server

use crate::error::{Result, TrackerError};
use crate::ingest::IngestReport;
use reqwest::multipart::{Form, Part};
use std::path::Path;

/// Path of the upload endpoint, relative to the server base URL
pub const INGEST_PATH: &str = "/api/products/ingest";

/// Upload a snapshot archive read from disk
pub async fn push_file(server: &str, path: &Path, user: &str, pass: &str) -> Result<IngestReport> {
    let bytes = tokio::fs::read(path).await?;
    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| "snapshot.zip".to_string());
    push_snapshot(server, file_name, bytes, user, pass).await
}

/// Upload snapshot bytes as multipart field `file` with basic auth.
///
/// Returns the server's ingestion report.
pub async fn push_snapshot(
    server: &str,
    file_name: String,
    bytes: Vec<u8>,
    user: &str,
    pass: &str,
) -> Result<IngestReport> {
    let url = format!("{}{}", server.trim_end_matches('/'), INGEST_PATH);
    log::info!("Uploading {} ({} bytes) to {}", file_name, bytes.len(), url);

    let part = Part::bytes(bytes)
        .file_name(file_name)
        .mime_str("application/zip")?;
    let form = Form::new().part("file", part);

    let response = reqwest::Client::new()
        .post(&url)
        .basic_auth(user, Some(pass))
        .header("User-Agent", "price_tracker/1.0")
        .multipart(form)
        .send()
        .await?;

    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(TrackerError::HttpStatus { status, body });
    }

    let report: IngestReport = response.json().await?;
    log::info!(
        "Server ingested {} products ({} errors, {} warnings)",
        report.count,
        report.errors.len(),
        report.warnings.len()
    );
    Ok(report)
}

#[cfg(test)]
#[path = "client_tests.rs"]
mod tests;

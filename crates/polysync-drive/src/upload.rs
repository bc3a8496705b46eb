//! Upload strategy selection
//!
//! Small files go up in a single `PUT /content` request. Files above the
//! configured threshold use a resumable session: `POST /session` returns a
//! session URL, and the body is streamed to it in `Content-Range` chunks.

use std::path::Path;

use tokio::fs::File;
use tokio::io::AsyncReadExt;
use tracing::{debug, info};

use polysync_core::domain::errors::SyncError;
use polysync_core::ports::provider_adapter::RemoteEntry;

use crate::client::DriveClient;
use crate::wire::{EntryDto, SessionDto, SessionRequest};

/// Byte range per session chunk: 10 MiB
const SESSION_CHUNK_SIZE: usize = 10 * 1024 * 1024;

/// Uploads a local file, picking simple vs session upload by size
pub async fn upload_file(
    client: &DriveClient,
    local: &Path,
    remote: &str,
    simple_threshold: u64,
) -> Result<RemoteEntry, SyncError> {
    let size = tokio::fs::metadata(local)
        .await
        .map_err(|e| SyncError::Io(format!("stat {}: {e}", local.display())))?
        .len();

    if size <= simple_threshold {
        upload_simple(client, local, remote).await
    } else {
        upload_session(client, local, remote, size).await
    }
}

/// Single-request upload for small files
async fn upload_simple(
    client: &DriveClient,
    local: &Path,
    remote: &str,
) -> Result<RemoteEntry, SyncError> {
    let data = tokio::fs::read(local)
        .await
        .map_err(|e| SyncError::Io(format!("read {}: {e}", local.display())))?;
    debug!(remote, bytes = data.len(), "Simple upload");

    let url = client.endpoint("content", &[("path", remote)])?;
    let response = client
        .send(|http| {
            http.put(url.clone())
                .header("Content-Type", "application/octet-stream")
                .body(data.clone())
        })
        .await?;
    let response = DriveClient::expect_success(response).await?;
    let dto: EntryDto = response
        .json()
        .await
        .map_err(|e| SyncError::Provider(format!("bad upload response: {e}")))?;
    Ok(dto.into_entry())
}

/// Resumable session upload for large files
async fn upload_session(
    client: &DriveClient,
    local: &Path,
    remote: &str,
    total_size: u64,
) -> Result<RemoteEntry, SyncError> {
    let url = client.endpoint("session", &[])?;
    let body = SessionRequest {
        path: remote,
        size: total_size,
    };
    let response = client.send(|http| http.post(url.clone()).json(&body)).await?;
    let response = DriveClient::expect_success(response).await?;
    let session: SessionDto = response
        .json()
        .await
        .map_err(|e| SyncError::Provider(format!("bad session response: {e}")))?;
    info!(remote, total_size, "Created upload session");

    let mut file = File::open(local)
        .await
        .map_err(|e| SyncError::Io(format!("open {}: {e}", local.display())))?;
    let mut offset: u64 = 0;
    let mut last_entry: Option<EntryDto> = None;

    while offset < total_size {
        let want = SESSION_CHUNK_SIZE.min((total_size - offset) as usize);
        let mut chunk = vec![0u8; want];
        file.read_exact(&mut chunk)
            .await
            .map_err(|e| SyncError::Io(format!("read {}: {e}", local.display())))?;

        let range = format!(
            "bytes {}-{}/{}",
            offset,
            offset + want as u64 - 1,
            total_size
        );
        debug!(remote, %range, "Uploading session chunk");
        let response = client
            .send(|http| {
                http.put(session.upload_url.clone())
                    .header("Content-Range", range.clone())
                    .header("Content-Type", "application/octet-stream")
                    .body(chunk.clone())
            })
            .await?;
        let response = DriveClient::expect_success(response).await?;
        offset += want as u64;

        // Only the final chunk's response carries the completed entry
        if offset >= total_size {
            last_entry = Some(
                response
                    .json()
                    .await
                    .map_err(|e| SyncError::Provider(format!("bad session completion: {e}")))?,
            );
        }
    }

    match last_entry {
        Some(dto) => Ok(dto.into_entry()),
        None => Err(SyncError::Provider(
            "upload session completed without an entry".to_string(),
        )),
    }
}

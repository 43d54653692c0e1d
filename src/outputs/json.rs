//! JSON artifact writer.
//!
//! The collected listings are written once, at the end of the run, as a
//! pretty-printed JSON array. The bytes go to a sibling `*.tmp` file that is
//! flushed and then renamed over the destination, so a reader never sees a
//! half-written artifact.

use crate::error::Result;
use crate::models::Listing;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{error, info, instrument};

fn temp_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().unwrap_or_default().to_os_string();
    name.push(".tmp");
    path.with_file_name(name)
}

async fn write_synced(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    let mut file = fs::File::create(path).await?;
    file.write_all(bytes).await?;
    file.sync_all().await
}

/// Write `listings` to `path` as a JSON array.
///
/// # Arguments
///
/// * `listings` - The final collected sequence (may be empty)
/// * `path` - Destination file; its parent directory must exist
///
/// # Returns
///
/// `Ok(())` once the artifact is in place, or a serialization/IO error.
/// On failure the temp file is removed and any previous artifact at `path`
/// is left untouched.
#[instrument(level = "info", skip_all, fields(path = %path.display(), count = listings.len()))]
pub async fn write_listings(listings: &[Listing], path: &Path) -> Result<()> {
    let json = serde_json::to_vec_pretty(listings)?;
    let tmp = temp_path(path);

    let written = match write_synced(&tmp, &json).await {
        Ok(()) => fs::rename(&tmp, path).await,
        Err(e) => Err(e),
    };
    if let Err(e) = written {
        error!(tmp = %tmp.display(), error = %e, "Failed to write JSON artifact");
        let _ = fs::remove_file(&tmp).await;
        return Err(e.into());
    }

    info!(bytes = json.len(), "Wrote JSON artifact");
    Ok(())
}

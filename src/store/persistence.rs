//! State document persistence.
//!
//! Full-document rewrites through a temp file followed by an atomic rename;
//! readers are never concurrent with writers inside this process.

use crate::error::StoreError;
use crate::store::types::StateDocument;
use std::path::Path;
use tokio::fs;
use tracing::warn;

/// Load the document from disk.
///
/// A missing file yields `None`; a corrupt file is logged and also yields
/// `None`, so the caller starts from an empty document.
pub async fn load_document(path: &Path) -> Result<Option<StateDocument>, StoreError> {
    if !fs::try_exists(path).await.unwrap_or(false) {
        return Ok(None);
    }
    let data = fs::read_to_string(path).await?;
    match serde_json::from_str::<StateDocument>(&data) {
        Ok(doc) => Ok(Some(doc)),
        Err(e) => {
            warn!(path = %path.display(), error = %e, "Corrupt state document - starting empty");
            Ok(None)
        }
    }
}

/// Write the serialized document: temp file, then rename over the target.
pub async fn write_document(path: &Path, json: &str) -> Result<(), StoreError> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        fs::create_dir_all(parent).await?;
    }

    let tmp = path.with_extension("json.tmp");
    fs::write(&tmp, json.as_bytes()).await?;
    fs::rename(&tmp, path).await?;
    Ok(())
}

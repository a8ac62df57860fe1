//! Object key layout.
//!
//! Clip artifacts live at `{user_id}/{project_id}/clips/{clip_id}.{ext}`.
//! The key depends only on the owner and clip id, so re-rendering a clip
//! overwrites its previous artifact.

use fclip_models::{OutputFormat, Owner};

use crate::error::{StorageError, StorageResult};

/// Key for a clip artifact.
pub fn clip_key(owner: &Owner, clip_id: &str, format: OutputFormat) -> StorageResult<String> {
    Ok(format!(
        "{}/{}/clips/{}.{}",
        key_segment("user_id", &owner.user_id)?,
        key_segment("project_id", &owner.project_id)?,
        key_segment("clip_id", clip_id)?,
        format.extension()
    ))
}

/// Reject values that would escape or restructure the key hierarchy.
fn key_segment<'a>(name: &str, value: &'a str) -> StorageResult<&'a str> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(StorageError::invalid_key(format!("{} is empty", name)));
    }
    if trimmed != value
        || value.contains('/')
        || value.contains('\\')
        || value == "."
        || value == ".."
        || value.chars().any(char::is_control)
    {
        return Err(StorageError::invalid_key(format!(
            "{} '{}' is not a valid key segment",
            name, value
        )));
    }
    Ok(value)
}

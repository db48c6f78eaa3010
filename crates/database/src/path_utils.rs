//! Object-store paths and helpers for uploaded files and model artifacts.

use anyhow::{Context, Result};
use bytes::Bytes;
use config::OBJECT_STORE;
use object_store::path::Path as ObjectStorePath;
use object_store::ObjectStoreExt;
use uuid::Uuid;

/// Path of an uploaded dataset element.
///
/// # Examples
///
/// ```
/// let path = database::element_file_path(4, "cat 1.png");
/// assert!(path.starts_with("files/4/"));
/// assert!(path.ends_with("-cat_1.png"));
/// ```
#[must_use]
pub fn element_file_path(dataset_id: i64, file_name: &str) -> String {
    format!("files/{dataset_id}/{}-{}", Uuid::new_v4(), sanitize_file_name(file_name))
}

/// Path of a cover image or thumbnail.
#[must_use]
pub fn image_path(extension: &str) -> String {
    format!("images/{}.{extension}", Uuid::new_v4())
}

/// Fresh path for the serialized weights of a model.
///
/// Every stored artifact gets its own directory, so writing a new one never
/// touches the files the database currently points at.
#[must_use]
pub fn model_weights_path(model_id: i64) -> String {
    format!("models/{model_id}/{}/weights.bin", Uuid::new_v4())
}

/// Path of the architecture manifest stored next to `weights_path`.
#[must_use]
pub fn model_manifest_path(weights_path: &str) -> String {
    match weights_path.rsplit_once('/') {
        Some((dir, _)) => format!("{dir}/manifest.json"),
        None => "manifest.json".to_string(),
    }
}

/// Keeps a file name to a single path segment of safe characters.
#[must_use]
pub fn sanitize_file_name(file_name: &str) -> String {
    let base = file_name.rsplit(['/', '\\']).next().unwrap_or(file_name);

    let sanitized: String = base
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_') {
                c
            } else {
                '_'
            }
        })
        .collect();

    let trimmed = sanitized.trim_start_matches('.');
    if trimmed.is_empty() {
        "file".to_string()
    } else {
        trimmed.to_string()
    }
}

/// Writes bytes to `object_store`.
///
/// # Errors
///
/// Returns an error if writing to `object_store` fails.
pub async fn put_object(relative_path: &str, data: Bytes) -> Result<()> {
    let object_path = ObjectStorePath::from(relative_path);

    OBJECT_STORE
        .put(&object_path, data.into())
        .await
        .with_context(|| format!("Failed to write {relative_path} to object_store"))?;

    Ok(())
}

/// Reads a file from `object_store` and returns the data as bytes.
///
/// # Errors
///
/// Returns an error if reading from `object_store` fails.
pub async fn read_object(relative_path: &str) -> Result<Bytes> {
    let object_path = ObjectStorePath::from(relative_path);

    OBJECT_STORE
        .get(&object_path)
        .await
        .with_context(|| format!("Failed to read {relative_path} from object_store"))?
        .bytes()
        .await
        .context("Failed to read bytes from object_store")
}

/// Deletes a file from `object_store`. A missing file is not an error.
///
/// # Errors
///
/// Returns an error if `object_store` fails for another reason.
pub async fn delete_object(relative_path: &str) -> Result<()> {
    let object_path = ObjectStorePath::from(relative_path);

    match OBJECT_STORE.delete(&object_path).await {
        Ok(()) | Err(object_store::Error::NotFound { .. }) => Ok(()),
        Err(e) => Err(e).with_context(|| format!("Failed to delete {relative_path} from object_store")),
    }
}

/// Deletes every given file, logging failures instead of returning them.
pub async fn delete_objects_logged<'a>(paths: impl IntoIterator<Item = &'a str>) {
    for path in paths {
        if let Err(e) = delete_object(path).await {
            tracing::warn!(path, error = ?e, "Failed to delete stored file");
        }
    }
}

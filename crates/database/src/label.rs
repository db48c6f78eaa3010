//! Repository functions for label operations.

use labelnet_structs::Label;

use crate::{ReorderError, get_pool, reorder_children};

const LABEL_COLUMNS: &str = "id, dataset_id, owner_id, name, color, keybind, index";

/// Appends a label to a dataset.
///
/// # Errors
///
/// Returns an error if the database operation fails.
pub async fn insert_label(
    dataset_id: i64,
    owner_id: i64,
    name: &str,
    color: &str,
    keybind: &str,
) -> Result<Label, sqlx::Error> {
    let pool = get_pool();

    sqlx::query_as::<_, Label>(&format!(
        r"
        INSERT INTO labels (dataset_id, owner_id, name, color, keybind, index)
        VALUES ($1, $2, $3, $4, $5,
            (SELECT COALESCE(MAX(index) + 1, 0) FROM labels WHERE dataset_id = $1))
        RETURNING {LABEL_COLUMNS}
        "
    ))
    .bind(dataset_id)
    .bind(owner_id)
    .bind(name)
    .bind(color)
    .bind(keybind)
    .fetch_one(pool)
    .await
}

/// Finds a label by id.
///
/// # Errors
///
/// Returns an error if the database operation fails.
pub async fn find_label(id: i64) -> Result<Option<Label>, sqlx::Error> {
    let pool = get_pool();

    sqlx::query_as::<_, Label>(&format!("SELECT {LABEL_COLUMNS} FROM labels WHERE id = $1"))
        .bind(id)
        .fetch_optional(pool)
        .await
}

/// Lists the labels of a dataset in class order.
///
/// # Errors
///
/// Returns an error if the database operation fails.
pub async fn list_dataset_labels(dataset_id: i64) -> Result<Vec<Label>, sqlx::Error> {
    let pool = get_pool();

    sqlx::query_as::<_, Label>(&format!(
        "SELECT {LABEL_COLUMNS} FROM labels WHERE dataset_id = $1 ORDER BY index, id"
    ))
    .bind(dataset_id)
    .fetch_all(pool)
    .await
}

/// Updates the editable fields of a label.
///
/// # Errors
///
/// Returns an error if the database operation fails.
pub async fn update_label(
    id: i64,
    name: &str,
    color: &str,
    keybind: &str,
) -> Result<Label, sqlx::Error> {
    let pool = get_pool();

    sqlx::query_as::<_, Label>(&format!(
        "UPDATE labels SET name = $2, color = $3, keybind = $4 WHERE id = $1 RETURNING {LABEL_COLUMNS}"
    ))
    .bind(id)
    .bind(name)
    .bind(color)
    .bind(keybind)
    .fetch_one(pool)
    .await
}

/// Deletes a label. Its areas go with it and its elements become unlabeled.
///
/// # Errors
///
/// Returns an error if the database operation fails.
pub async fn delete_label(id: i64) -> Result<(), sqlx::Error> {
    let pool = get_pool();

    sqlx::query("DELETE FROM labels WHERE id = $1")
        .bind(id)
        .execute(pool)
        .await?;

    Ok(())
}

/// Applies a new label order within a dataset.
///
/// # Errors
///
/// Returns an error if an id is not a label of the dataset or the database fails.
pub async fn reorder_labels(dataset_id: i64, order: &[(i64, i32)]) -> Result<(), ReorderError> {
    reorder_children("labels", "dataset_id", dataset_id, order).await
}

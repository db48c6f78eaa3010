//! Repository functions for element operations.

use labelnet_structs::Element;

use crate::{ReorderError, get_pool, reorder_children};

const ELEMENT_COLUMNS: &str =
    "id, dataset_id, owner_id, name, file, label_id, image_width, image_height, index";

/// Fields of a new element.
#[derive(Debug, Clone)]
pub struct NewElement {
    pub dataset_id: i64,
    pub owner_id: i64,
    pub name: String,
    pub file: String,
    pub label_id: Option<i64>,
    pub image_width: Option<u32>,
    pub image_height: Option<u32>,

    /// Position in the dataset; appended at the end when `None`
    pub index: Option<i32>,
}

/// Creates an element.
///
/// # Errors
///
/// Returns an error if the database operation fails.
pub async fn insert_element(element: &NewElement) -> Result<Element, sqlx::Error> {
    let pool = get_pool();

    sqlx::query_as::<_, Element>(&format!(
        r"
        INSERT INTO elements (dataset_id, owner_id, name, file, label_id, image_width, image_height, index)
        VALUES ($1, $2, $3, $4, $5, $6, $7,
            COALESCE($8, (SELECT COALESCE(MAX(index) + 1, 0) FROM elements WHERE dataset_id = $1)))
        RETURNING {ELEMENT_COLUMNS}
        "
    ))
    .bind(element.dataset_id)
    .bind(element.owner_id)
    .bind(&element.name)
    .bind(&element.file)
    .bind(element.label_id)
    .bind(element.image_width.and_then(|w| i32::try_from(w).ok()))
    .bind(element.image_height.and_then(|h| i32::try_from(h).ok()))
    .bind(element.index)
    .fetch_one(pool)
    .await
}

/// Finds an element by id.
///
/// # Errors
///
/// Returns an error if the database operation fails.
pub async fn find_element(id: i64) -> Result<Option<Element>, sqlx::Error> {
    let pool = get_pool();

    sqlx::query_as::<_, Element>(&format!("SELECT {ELEMENT_COLUMNS} FROM elements WHERE id = $1"))
        .bind(id)
        .fetch_optional(pool)
        .await
}

/// Lists the elements of a dataset in order.
///
/// # Errors
///
/// Returns an error if the database operation fails.
pub async fn list_dataset_elements(dataset_id: i64) -> Result<Vec<Element>, sqlx::Error> {
    let pool = get_pool();

    sqlx::query_as::<_, Element>(&format!(
        "SELECT {ELEMENT_COLUMNS} FROM elements WHERE dataset_id = $1 ORDER BY index, id"
    ))
    .bind(dataset_id)
    .fetch_all(pool)
    .await
}

/// Lists the labeled elements of a dataset, for training.
///
/// # Errors
///
/// Returns an error if the database operation fails.
pub async fn list_labeled_elements(dataset_id: i64) -> Result<Vec<Element>, sqlx::Error> {
    let pool = get_pool();

    sqlx::query_as::<_, Element>(&format!(
        r"
        SELECT {ELEMENT_COLUMNS}
        FROM elements
        WHERE dataset_id = $1 AND label_id IS NOT NULL
        ORDER BY index, id
        "
    ))
    .bind(dataset_id)
    .fetch_all(pool)
    .await
}

/// Renames an element.
///
/// # Errors
///
/// Returns an error if the database operation fails.
pub async fn rename_element(id: i64, name: &str) -> Result<Element, sqlx::Error> {
    let pool = get_pool();

    sqlx::query_as::<_, Element>(&format!(
        "UPDATE elements SET name = $2 WHERE id = $1 RETURNING {ELEMENT_COLUMNS}"
    ))
    .bind(id)
    .bind(name)
    .fetch_one(pool)
    .await
}

/// Sets or clears the label of an element.
///
/// # Errors
///
/// Returns an error if the database operation fails.
pub async fn set_element_label(id: i64, label_id: Option<i64>) -> Result<Element, sqlx::Error> {
    let pool = get_pool();

    sqlx::query_as::<_, Element>(&format!(
        "UPDATE elements SET label_id = $2 WHERE id = $1 RETURNING {ELEMENT_COLUMNS}"
    ))
    .bind(id)
    .bind(label_id)
    .fetch_one(pool)
    .await
}

/// Deletes an element, returning the path of its file.
///
/// # Errors
///
/// Returns an error if the database operation fails.
pub async fn delete_element(id: i64) -> Result<Option<String>, sqlx::Error> {
    let pool = get_pool();

    sqlx::query_scalar("DELETE FROM elements WHERE id = $1 RETURNING file")
        .bind(id)
        .fetch_optional(pool)
        .await
}

/// Applies a new element order within a dataset.
///
/// # Errors
///
/// Returns an error if an id is not an element of the dataset or the database fails.
pub async fn reorder_elements(dataset_id: i64, order: &[(i64, i32)]) -> Result<(), ReorderError> {
    reorder_children("elements", "dataset_id", dataset_id, order).await
}

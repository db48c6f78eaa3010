//! Repository functions for dataset operations.

use labelnet_structs::{Dataset, NewDataset, Visibility};
use sqlx::types::Json;

use crate::get_pool;

const DATASET_COLUMNS: &str = r"
    d.id, d.name, d.description, d.created_at, d.owner_id, d.image, d.image_small,
    d.verified, d.keywords, d.image_width, d.image_height, d.visibility, d.datatype,
    d.dataset_type,
    (SELECT COUNT(*) FROM elements e WHERE e.dataset_id = d.id) AS element_count,
    (SELECT COUNT(*) FROM labels l WHERE l.dataset_id = d.id) AS label_count,
    (SELECT COUNT(*) FROM dataset_downloaders dd WHERE dd.dataset_id = d.id) AS download_count
";

/// Editable dataset fields; `None` keeps the stored value.
#[derive(Debug, Clone, Default)]
pub struct DatasetUpdate {
    pub name: Option<String>,
    pub description: Option<String>,
    pub visibility: Option<Visibility>,
    pub keywords: Option<Vec<String>>,
}

/// Creates a new dataset owned by `owner_id`.
///
/// # Errors
///
/// Returns an error if the database operation fails.
pub async fn insert_dataset(owner_id: i64, dataset: &NewDataset) -> Result<Dataset, sqlx::Error> {
    let pool = get_pool();

    let id: i64 = sqlx::query_scalar(
        r"
        INSERT INTO datasets
            (name, description, owner_id, keywords, image_width, image_height, visibility, datatype, dataset_type)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
        RETURNING id
        ",
    )
    .bind(&dataset.name)
    .bind(&dataset.description)
    .bind(owner_id)
    .bind(Json(&dataset.keywords))
    .bind(dataset.image_width.and_then(|w| i32::try_from(w).ok()))
    .bind(dataset.image_height.and_then(|h| i32::try_from(h).ok()))
    .bind(dataset.visibility)
    .bind(dataset.datatype)
    .bind(dataset.dataset_type)
    .fetch_one(pool)
    .await?;

    find_dataset(id).await?.ok_or(sqlx::Error::RowNotFound)
}

/// Finds a dataset by id.
///
/// # Errors
///
/// Returns an error if the database operation fails.
pub async fn find_dataset(id: i64) -> Result<Option<Dataset>, sqlx::Error> {
    let pool = get_pool();

    sqlx::query_as::<_, Dataset>(&format!("SELECT {DATASET_COLUMNS} FROM datasets d WHERE d.id = $1"))
        .bind(id)
        .fetch_optional(pool)
        .await
}

/// Lists public datasets whose name contains `search` (case-insensitive).
///
/// # Errors
///
/// Returns an error if the database operation fails.
pub async fn list_public_datasets(search: Option<&str>) -> Result<Vec<Dataset>, sqlx::Error> {
    let pool = get_pool();

    sqlx::query_as::<_, Dataset>(&format!(
        r"
        SELECT {DATASET_COLUMNS}
        FROM datasets d
        WHERE d.visibility = 'public'
          AND ($1::text IS NULL OR strpos(lower(d.name), lower($1)) > 0)
        ORDER BY d.created_at DESC
        "
    ))
    .bind(search)
    .fetch_all(pool)
    .await
}

/// Lists the datasets owned by a profile.
///
/// # Errors
///
/// Returns an error if the database operation fails.
pub async fn list_owned_datasets(
    owner_id: i64,
    search: Option<&str>,
) -> Result<Vec<Dataset>, sqlx::Error> {
    let pool = get_pool();

    sqlx::query_as::<_, Dataset>(&format!(
        r"
        SELECT {DATASET_COLUMNS}
        FROM datasets d
        WHERE d.owner_id = $1
          AND ($2::text IS NULL OR strpos(lower(d.name), lower($2)) > 0)
        ORDER BY d.created_at DESC
        "
    ))
    .bind(owner_id)
    .bind(search)
    .fetch_all(pool)
    .await
}

/// Applies a partial update.
///
/// # Errors
///
/// Returns an error if the database operation fails.
pub async fn update_dataset(id: i64, update: &DatasetUpdate) -> Result<(), sqlx::Error> {
    let pool = get_pool();

    sqlx::query(
        r"
        UPDATE datasets
        SET name = COALESCE($2, name),
            description = COALESCE($3, description),
            visibility = COALESCE($4, visibility),
            keywords = COALESCE($5, keywords)
        WHERE id = $1
        ",
    )
    .bind(id)
    .bind(update.name.as_deref())
    .bind(update.description.as_deref())
    .bind(update.visibility)
    .bind(update.keywords.as_ref().map(Json))
    .execute(pool)
    .await?;

    Ok(())
}

/// Replaces the cover image paths, returning the previous ones.
///
/// # Errors
///
/// Returns an error if the database operation fails.
pub async fn set_dataset_images(
    id: i64,
    image: &str,
    image_small: &str,
) -> Result<Vec<String>, sqlx::Error> {
    let pool = get_pool();

    let previous: Option<(Option<String>, Option<String>)> = sqlx::query_as(
        r"
        UPDATE datasets new
        SET image = $2, image_small = $3
        FROM datasets old
        WHERE new.id = $1 AND old.id = new.id
        RETURNING old.image, old.image_small
        ",
    )
    .bind(id)
    .bind(image)
    .bind(image_small)
    .fetch_optional(pool)
    .await?;

    Ok(previous
        .map(|(a, b)| a.into_iter().chain(b).collect())
        .unwrap_or_default())
}

/// Deletes a dataset and its rows, returning the paths of the files it referenced.
///
/// # Errors
///
/// Returns an error if the database operation fails.
pub async fn delete_dataset(id: i64) -> Result<Vec<String>, sqlx::Error> {
    let mut tx = get_pool().begin().await?;

    let mut files: Vec<String> = sqlx::query_scalar("SELECT file FROM elements WHERE dataset_id = $1")
        .bind(id)
        .fetch_all(&mut *tx)
        .await?;

    let images: Option<(Option<String>, Option<String>)> =
        sqlx::query_as("DELETE FROM datasets WHERE id = $1 RETURNING image, image_small")
            .bind(id)
            .fetch_optional(&mut *tx)
            .await?;

    tx.commit().await?;

    if let Some((image, image_small)) = images {
        files.extend(image);
        files.extend(image_small);
    }
    Ok(files)
}

/// Records that a profile downloaded a dataset.
///
/// # Errors
///
/// Returns an error if the database operation fails.
pub async fn record_dataset_download(dataset_id: i64, profile_id: i64) -> Result<(), sqlx::Error> {
    let pool = get_pool();

    sqlx::query(
        r"
        INSERT INTO dataset_downloaders (dataset_id, profile_id)
        VALUES ($1, $2)
        ON CONFLICT DO NOTHING
        ",
    )
    .bind(dataset_id)
    .bind(profile_id)
    .execute(pool)
    .await?;

    Ok(())
}

/// Bookmarks a dataset for a profile.
///
/// # Errors
///
/// Returns an error if the database operation fails.
pub async fn save_dataset(dataset_id: i64, profile_id: i64) -> Result<(), sqlx::Error> {
    let pool = get_pool();

    sqlx::query(
        r"
        INSERT INTO dataset_saves (dataset_id, profile_id)
        VALUES ($1, $2)
        ON CONFLICT DO NOTHING
        ",
    )
    .bind(dataset_id)
    .bind(profile_id)
    .execute(pool)
    .await?;

    Ok(())
}

/// Removes a bookmark.
///
/// # Errors
///
/// Returns an error if the database operation fails.
pub async fn unsave_dataset(dataset_id: i64, profile_id: i64) -> Result<(), sqlx::Error> {
    let pool = get_pool();

    sqlx::query("DELETE FROM dataset_saves WHERE dataset_id = $1 AND profile_id = $2")
        .bind(dataset_id)
        .bind(profile_id)
        .execute(pool)
        .await?;

    Ok(())
}

//! Repository functions for area operations.

use labelnet_structs::Area;
use sqlx::types::Json;

use crate::get_pool;

/// Creates an area on an element.
///
/// # Errors
///
/// Returns an error if the database operation fails.
pub async fn insert_area(
    element_id: i64,
    label_id: i64,
    area_points: &[[f64; 2]],
) -> Result<Area, sqlx::Error> {
    let pool = get_pool();

    sqlx::query_as::<_, Area>(
        r"
        INSERT INTO areas (element_id, label_id, area_points)
        VALUES ($1, $2, $3)
        RETURNING id, label_id, element_id, area_points
        ",
    )
    .bind(element_id)
    .bind(label_id)
    .bind(Json(area_points))
    .fetch_one(pool)
    .await
}

/// Finds an area by id.
///
/// # Errors
///
/// Returns an error if the database operation fails.
pub async fn find_area(id: i64) -> Result<Option<Area>, sqlx::Error> {
    let pool = get_pool();

    sqlx::query_as::<_, Area>("SELECT id, label_id, element_id, area_points FROM areas WHERE id = $1")
        .bind(id)
        .fetch_optional(pool)
        .await
}

/// Lists all areas of the elements of a dataset.
///
/// # Errors
///
/// Returns an error if the database operation fails.
pub async fn list_dataset_areas(dataset_id: i64) -> Result<Vec<Area>, sqlx::Error> {
    let pool = get_pool();

    sqlx::query_as::<_, Area>(
        r"
        SELECT a.id, a.label_id, a.element_id, a.area_points
        FROM areas a
        JOIN elements e ON e.id = a.element_id
        WHERE e.dataset_id = $1
        ORDER BY a.element_id, a.id
        ",
    )
    .bind(dataset_id)
    .fetch_all(pool)
    .await
}

/// Replaces the points of an area.
///
/// # Errors
///
/// Returns an error if the database operation fails.
pub async fn update_area_points(id: i64, area_points: &[[f64; 2]]) -> Result<Area, sqlx::Error> {
    let pool = get_pool();

    sqlx::query_as::<_, Area>(
        r"
        UPDATE areas SET area_points = $2
        WHERE id = $1
        RETURNING id, label_id, element_id, area_points
        ",
    )
    .bind(id)
    .bind(Json(area_points))
    .fetch_one(pool)
    .await
}

/// Deletes an area.
///
/// # Errors
///
/// Returns an error if the database operation fails.
pub async fn delete_area(id: i64) -> Result<(), sqlx::Error> {
    let pool = get_pool();

    sqlx::query("DELETE FROM areas WHERE id = $1")
        .bind(id)
        .execute(pool)
        .await?;

    Ok(())
}

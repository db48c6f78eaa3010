//! Repository functions for profile operations.

use labelnet_structs::Profile;

use crate::get_pool;

/// Returns the profile named `name`, creating it on first sight.
///
/// # Errors
///
/// Returns an error if the database operation fails.
pub async fn get_or_create_profile(name: &str) -> Result<Profile, sqlx::Error> {
    let pool = get_pool();

    // The no-op update makes RETURNING yield the existing row on conflict.
    sqlx::query_as::<_, Profile>(
        r"
        INSERT INTO profiles (name)
        VALUES ($1)
        ON CONFLICT (name) DO UPDATE SET name = EXCLUDED.name
        RETURNING id, name, created_at
        ",
    )
    .bind(name)
    .fetch_one(pool)
    .await
}

/// Finds a profile by id.
///
/// # Errors
///
/// Returns an error if the database operation fails.
pub async fn find_profile(id: i64) -> Result<Option<Profile>, sqlx::Error> {
    let pool = get_pool();

    sqlx::query_as::<_, Profile>("SELECT id, name, created_at FROM profiles WHERE id = $1")
        .bind(id)
        .fetch_optional(pool)
        .await
}

/// Number of datasets owned by a profile.
///
/// # Errors
///
/// Returns an error if the database operation fails.
pub async fn count_profile_datasets(profile_id: i64) -> Result<i64, sqlx::Error> {
    let pool = get_pool();

    sqlx::query_scalar("SELECT COUNT(*) FROM datasets WHERE owner_id = $1")
        .bind(profile_id)
        .fetch_one(pool)
        .await
}

/// Ids of the datasets a profile has saved.
///
/// # Errors
///
/// Returns an error if the database operation fails.
pub async fn list_saved_dataset_ids(profile_id: i64) -> Result<Vec<i64>, sqlx::Error> {
    let pool = get_pool();

    sqlx::query_scalar(
        "SELECT dataset_id FROM dataset_saves WHERE profile_id = $1 ORDER BY dataset_id",
    )
    .bind(profile_id)
    .fetch_all(pool)
    .await
}

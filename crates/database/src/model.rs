//! Repository functions for model operations.

use labelnet_structs::{Model, ModelType, NewModel, Visibility};

use crate::get_pool;

const MODEL_COLUMNS: &str = r"
    m.id, m.name, m.owner_id, m.description, m.created_at, m.image, m.image_small,
    m.verified, m.model_type, m.trained_on, m.trained_accuracy, m.evaluated_on,
    m.evaluated_accuracy, m.visibility, m.model_file, m.optimizer, m.loss_function,
    (SELECT COUNT(*) FROM model_downloaders md WHERE md.model_id = m.id) AS download_count
";

/// Editable model fields; `None` keeps the stored value.
#[derive(Debug, Clone, Default)]
pub struct ModelUpdate {
    pub name: Option<String>,
    pub description: Option<String>,
    pub visibility: Option<Visibility>,
    pub model_type: Option<ModelType>,
}

/// Creates a new model owned by `owner_id`.
///
/// # Errors
///
/// Returns an error if the database operation fails.
pub async fn insert_model(owner_id: i64, model: &NewModel) -> Result<Model, sqlx::Error> {
    let pool = get_pool();

    let id: i64 = sqlx::query_scalar(
        r"
        INSERT INTO models (name, owner_id, description, visibility, model_type)
        VALUES ($1, $2, $3, $4, $5)
        RETURNING id
        ",
    )
    .bind(&model.name)
    .bind(owner_id)
    .bind(&model.description)
    .bind(model.visibility)
    .bind(model.model_type)
    .fetch_one(pool)
    .await?;

    find_model(id).await?.ok_or(sqlx::Error::RowNotFound)
}

/// Finds a model by id.
///
/// # Errors
///
/// Returns an error if the database operation fails.
pub async fn find_model(id: i64) -> Result<Option<Model>, sqlx::Error> {
    let pool = get_pool();

    sqlx::query_as::<_, Model>(&format!("SELECT {MODEL_COLUMNS} FROM models m WHERE m.id = $1"))
        .bind(id)
        .fetch_optional(pool)
        .await
}

/// Lists public models whose name contains `search` (case-insensitive).
///
/// # Errors
///
/// Returns an error if the database operation fails.
pub async fn list_public_models(search: Option<&str>) -> Result<Vec<Model>, sqlx::Error> {
    let pool = get_pool();

    sqlx::query_as::<_, Model>(&format!(
        r"
        SELECT {MODEL_COLUMNS}
        FROM models m
        WHERE m.visibility = 'public'
          AND ($1::text IS NULL OR strpos(lower(m.name), lower($1)) > 0)
        ORDER BY m.created_at DESC
        "
    ))
    .bind(search)
    .fetch_all(pool)
    .await
}

/// Lists the models owned by a profile.
///
/// # Errors
///
/// Returns an error if the database operation fails.
pub async fn list_owned_models(owner_id: i64, search: Option<&str>) -> Result<Vec<Model>, sqlx::Error> {
    let pool = get_pool();

    sqlx::query_as::<_, Model>(&format!(
        r"
        SELECT {MODEL_COLUMNS}
        FROM models m
        WHERE m.owner_id = $1
          AND ($2::text IS NULL OR strpos(lower(m.name), lower($2)) > 0)
        ORDER BY m.created_at DESC
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
pub async fn update_model(id: i64, update: &ModelUpdate) -> Result<(), sqlx::Error> {
    let pool = get_pool();

    sqlx::query(
        r"
        UPDATE models
        SET name = COALESCE($2, name),
            description = COALESCE($3, description),
            visibility = COALESCE($4, visibility),
            model_type = COALESCE($5, model_type)
        WHERE id = $1
        ",
    )
    .bind(id)
    .bind(update.name.as_deref())
    .bind(update.description.as_deref())
    .bind(update.visibility)
    .bind(update.model_type)
    .execute(pool)
    .await?;

    Ok(())
}

/// Replaces the cover image paths, returning the previous ones.
///
/// # Errors
///
/// Returns an error if the database operation fails.
pub async fn set_model_images(id: i64, image: &str, image_small: &str) -> Result<Vec<String>, sqlx::Error> {
    let pool = get_pool();

    let previous: Option<(Option<String>, Option<String>)> = sqlx::query_as(
        r"
        UPDATE models new
        SET image = $2, image_small = $3
        FROM models old
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

/// Deletes a model and its layers, returning the paths of the files it referenced.
///
/// # Errors
///
/// Returns an error if the database operation fails.
pub async fn delete_model(id: i64) -> Result<Vec<String>, sqlx::Error> {
    let pool = get_pool();

    let files: Option<(Option<String>, Option<String>, Option<String>)> = sqlx::query_as(
        "DELETE FROM models WHERE id = $1 RETURNING image, image_small, model_file",
    )
    .bind(id)
    .fetch_optional(pool)
    .await?;

    Ok(files
        .map(|(a, b, c)| a.into_iter().chain(b).chain(c).collect())
        .unwrap_or_default())
}

/// Records that a profile downloaded a model.
///
/// # Errors
///
/// Returns an error if the database operation fails.
pub async fn record_model_download(model_id: i64, profile_id: i64) -> Result<(), sqlx::Error> {
    let pool = get_pool();

    sqlx::query(
        r"
        INSERT INTO model_downloaders (model_id, profile_id)
        VALUES ($1, $2)
        ON CONFLICT DO NOTHING
        ",
    )
    .bind(model_id)
    .bind(profile_id)
    .execute(pool)
    .await?;

    Ok(())
}

/// Stores a freshly built model. Previous training results no longer apply.
///
/// # Errors
///
/// Returns an error if the database operation fails.
pub async fn set_model_built(
    id: i64,
    model_file: &str,
    optimizer: &str,
    loss_function: &str,
) -> Result<(), sqlx::Error> {
    let pool = get_pool();

    sqlx::query(
        r"
        UPDATE models
        SET model_file = $2, optimizer = $3, loss_function = $4,
            trained_on = NULL, trained_accuracy = NULL,
            evaluated_on = NULL, evaluated_accuracy = NULL
        WHERE id = $1
        ",
    )
    .bind(id)
    .bind(model_file)
    .bind(optimizer)
    .bind(loss_function)
    .execute(pool)
    .await?;

    Ok(())
}

/// Records the outcome of a training run along with the retrained weights.
///
/// # Errors
///
/// Returns an error if the database operation fails.
pub async fn set_model_trained(
    id: i64,
    dataset_id: i64,
    accuracy: f64,
    model_file: &str,
) -> Result<(), sqlx::Error> {
    let pool = get_pool();

    sqlx::query(
        "UPDATE models SET trained_on = $2, trained_accuracy = $3, model_file = $4 WHERE id = $1",
    )
    .bind(id)
    .bind(dataset_id)
    .bind(accuracy.clamp(0.0, 1.0))
    .bind(model_file)
    .execute(pool)
    .await?;

    Ok(())
}

/// Records the outcome of an evaluation.
///
/// # Errors
///
/// Returns an error if the database operation fails.
pub async fn set_model_evaluated(id: i64, dataset_id: i64, accuracy: f64) -> Result<(), sqlx::Error> {
    let pool = get_pool();

    sqlx::query("UPDATE models SET evaluated_on = $2, evaluated_accuracy = $3 WHERE id = $1")
        .bind(id)
        .bind(dataset_id)
        .bind(accuracy.clamp(0.0, 1.0))
        .execute(pool)
        .await?;

    Ok(())
}

//! Repository functions for layer operations.

use labelnet_structs::{Layer, LayerRow, LayerSpec};

use crate::ordering::{renumber_after_remove, renumber_with_insert};
use crate::{ReorderError, get_pool, reorder_children, set_indices};

const LAYER_COLUMNS: &str = r#"
    id, model_id, index, layer_type, activation_function, input_x, input_y, input_z,
    nodes_count, filters, kernel_size, pool_size, rate, scale, "offset", mode, output_x, output_y
"#;

async fn model_layer_indices(
    tx: &mut sqlx::PgTransaction<'_>,
    model_id: i64,
) -> Result<Vec<(i64, i32)>, sqlx::Error> {
    sqlx::query_as("SELECT id, index FROM layers WHERE model_id = $1 ORDER BY index, id FOR UPDATE")
        .bind(model_id)
        .fetch_all(&mut **tx)
        .await
}

fn into_layer(row: LayerRow) -> Result<Layer, sqlx::Error> {
    Layer::try_from(row).map_err(|e| sqlx::Error::Decode(Box::new(e)))
}

/// Inserts a layer at `index`, shifting later layers down, or appends it when `index` is `None`.
///
/// # Errors
///
/// Returns an error if the database operation fails.
pub async fn insert_layer(
    model_id: i64,
    index: Option<i32>,
    spec: &LayerSpec,
) -> Result<Layer, sqlx::Error> {
    let mut tx = get_pool().begin().await?;

    let current = model_layer_indices(&mut tx, model_id).await?;
    let (index, shifted) = renumber_with_insert(&current, index);
    set_indices(&mut tx, "layers", &shifted).await?;

    let c = spec.columns();
    let row = sqlx::query_as::<_, LayerRow>(&format!(
        r#"
        INSERT INTO layers (
            model_id, index, layer_type, activation_function, input_x, input_y, input_z,
            nodes_count, filters, kernel_size, pool_size, rate, scale, "offset", mode, output_x, output_y
        )
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17)
        RETURNING {LAYER_COLUMNS}
        "#
    ))
    .bind(model_id)
    .bind(index)
    .bind(c.layer_type)
    .bind(c.activation_function)
    .bind(c.input_x)
    .bind(c.input_y)
    .bind(c.input_z)
    .bind(c.nodes_count)
    .bind(c.filters)
    .bind(c.kernel_size)
    .bind(c.pool_size)
    .bind(c.rate)
    .bind(c.scale)
    .bind(c.offset)
    .bind(c.mode)
    .bind(c.output_x)
    .bind(c.output_y)
    .fetch_one(&mut *tx)
    .await?;

    tx.commit().await?;
    into_layer(row)
}

/// Finds a layer by id.
///
/// # Errors
///
/// Returns an error if the database operation fails or the stored row is invalid.
pub async fn find_layer(id: i64) -> Result<Option<Layer>, sqlx::Error> {
    let pool = get_pool();

    sqlx::query_as::<_, LayerRow>(&format!("SELECT {LAYER_COLUMNS} FROM layers WHERE id = $1"))
        .bind(id)
        .fetch_optional(pool)
        .await?
        .map(into_layer)
        .transpose()
}

/// Lists the layers of a model in order.
///
/// # Errors
///
/// Returns an error if the database operation fails or a stored row is invalid.
pub async fn list_model_layers(model_id: i64) -> Result<Vec<Layer>, sqlx::Error> {
    let pool = get_pool();

    sqlx::query_as::<_, LayerRow>(&format!(
        "SELECT {LAYER_COLUMNS} FROM layers WHERE model_id = $1 ORDER BY index, id"
    ))
    .bind(model_id)
    .fetch_all(pool)
    .await?
    .into_iter()
    .map(into_layer)
    .collect()
}

/// Replaces the fields of a layer. The layer type is kept from `spec`, which
/// callers build from the stored type.
///
/// # Errors
///
/// Returns an error if the database operation fails.
pub async fn update_layer(id: i64, spec: &LayerSpec) -> Result<Layer, sqlx::Error> {
    let pool = get_pool();
    let c = spec.columns();

    let row = sqlx::query_as::<_, LayerRow>(&format!(
        r#"
        UPDATE layers
        SET activation_function = $2, input_x = $3, input_y = $4, input_z = $5,
            nodes_count = $6, filters = $7, kernel_size = $8, pool_size = $9, rate = $10,
            scale = $11, "offset" = $12, mode = $13, output_x = $14, output_y = $15
        WHERE id = $1 AND layer_type = $16
        RETURNING {LAYER_COLUMNS}
        "#
    ))
    .bind(id)
    .bind(c.activation_function)
    .bind(c.input_x)
    .bind(c.input_y)
    .bind(c.input_z)
    .bind(c.nodes_count)
    .bind(c.filters)
    .bind(c.kernel_size)
    .bind(c.pool_size)
    .bind(c.rate)
    .bind(c.scale)
    .bind(c.offset)
    .bind(c.mode)
    .bind(c.output_x)
    .bind(c.output_y)
    .bind(c.layer_type)
    .fetch_one(pool)
    .await?;

    into_layer(row)
}

/// Deletes a layer and closes the gap in the indices of the remaining ones.
///
/// # Errors
///
/// Returns an error if the database operation fails.
pub async fn delete_layer(id: i64) -> Result<(), sqlx::Error> {
    let mut tx = get_pool().begin().await?;

    let deleted: Option<i64> = sqlx::query_scalar("DELETE FROM layers WHERE id = $1 RETURNING model_id")
        .bind(id)
        .fetch_optional(&mut *tx)
        .await?;

    if let Some(model_id) = deleted {
        let remaining = model_layer_indices(&mut tx, model_id).await?;
        set_indices(&mut tx, "layers", &renumber_after_remove(&remaining)).await?;
    }

    tx.commit().await?;
    Ok(())
}

/// Applies a new layer order within a model.
///
/// # Errors
///
/// Returns an error if an id is not a layer of the model or the database fails.
pub async fn reorder_layers(model_id: i64, order: &[(i64, i32)]) -> Result<(), ReorderError> {
    reorder_children("layers", "model_id", model_id, order).await
}

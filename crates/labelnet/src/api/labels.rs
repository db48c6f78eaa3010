use axum::extract::Query;
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use labelnet_structs::{DEFAULT_LABEL_COLOR, Label, validate_label};
use serde::Deserialize;

use super::access::{owned_dataset, owned_label, visible_dataset};
use super::elements::ReorderBody;
use super::forms::parse_order;
use super::{ApiError, AppState, CurrentUser, MaybeUser};

#[derive(Debug, Deserialize)]
pub struct CreateLabelBody {
    dataset: i64,
    name: String,

    #[serde(default)]
    color: Option<String>,

    #[serde(default)]
    keybind: String,
}

#[derive(Debug, Deserialize)]
pub struct EditLabelBody {
    label: i64,
    name: String,
    color: String,

    #[serde(default)]
    keybind: String,
}

#[derive(Debug, Deserialize)]
pub struct DeleteLabelBody {
    label: i64,
}

#[derive(Debug, Deserialize)]
pub struct DatasetQuery {
    dataset: i64,
}

/// Appends a label to a dataset.
#[tracing::instrument(skip(user), fields(user_id = user.0.id))]
pub async fn create_label_handler(
    user: CurrentUser,
    Json(body): Json<CreateLabelBody>,
) -> Result<Json<Label>, ApiError> {
    let dataset = owned_dataset(body.dataset, &user.0).await?;

    let color = body
        .color
        .as_deref()
        .map(str::trim)
        .filter(|c| !c.is_empty())
        .unwrap_or(DEFAULT_LABEL_COLOR);
    validate_label(&body.name, color, &body.keybind)?;

    let label =
        database::label::insert_label(dataset.id, user.0.id, body.name.trim(), color, &body.keybind)
            .await?;
    Ok(Json(label))
}

#[tracing::instrument(skip(user))]
pub async fn dataset_labels_handler(
    user: MaybeUser,
    Query(query): Query<DatasetQuery>,
) -> Result<Json<Vec<Label>>, ApiError> {
    let dataset = visible_dataset(query.dataset, user.id()).await?;
    Ok(Json(database::label::list_dataset_labels(dataset.id).await?))
}

#[tracing::instrument(skip(user), fields(user_id = user.0.id))]
pub async fn edit_label_handler(
    user: CurrentUser,
    Json(body): Json<EditLabelBody>,
) -> Result<Json<Label>, ApiError> {
    let label = owned_label(body.label, &user.0).await?;
    validate_label(&body.name, body.color.trim(), &body.keybind)?;

    let label = database::label::update_label(
        label.id,
        body.name.trim(),
        body.color.trim(),
        &body.keybind,
    )
    .await?;
    Ok(Json(label))
}

/// Deletes a label. Its elements become unlabeled and its areas are removed.
#[tracing::instrument(skip(user), fields(user_id = user.0.id))]
pub async fn delete_label_handler(
    user: CurrentUser,
    Json(body): Json<DeleteLabelBody>,
) -> Result<StatusCode, ApiError> {
    let label = owned_label(body.label, &user.0).await?;
    database::label::delete_label(label.id).await?;
    Ok(StatusCode::OK)
}

#[tracing::instrument(skip(user), fields(user_id = user.0.id))]
pub async fn reorder_labels_handler(
    user: CurrentUser,
    Json(body): Json<ReorderBody>,
) -> Result<StatusCode, ApiError> {
    let dataset = owned_dataset(body.id, &user.0).await?;
    database::label::reorder_labels(dataset.id, &parse_order(&body.order)?).await?;
    Ok(StatusCode::OK)
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/create-label/", post(create_label_handler))
        .route("/dataset-labels/", get(dataset_labels_handler))
        .route("/edit-label/", post(edit_label_handler))
        .route("/delete-label/", post(delete_label_handler))
        .route("/reorder-dataset-labels/", post(reorder_labels_handler))
}

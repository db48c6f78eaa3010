use std::collections::HashMap;

use axum::extract::{Multipart, Path};
use axum::http::{StatusCode, header};
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use bytes::Bytes;
use database::element::NewElement;
use labelnet_structs::{DatasetType, Dataset, ELEMENT_NAME_MAX_LEN, Element, FileKind, check_name};
use serde::Deserialize;

use super::access::{owned_dataset, owned_element, owned_label, visible_dataset};
use super::forms::{Form, UploadedFile, content_type_for, parse_order};
use super::{ApiError, AppState, CurrentUser, MaybeUser};

/// Validates, normalizes and stores one uploaded file as an element of `dataset`.
pub async fn store_element(
    dataset: &Dataset,
    owner_id: i64,
    file: UploadedFile,
    label_id: Option<i64>,
    index: Option<i32>,
) -> Result<Element, ApiError> {
    let target_size = dataset.fixed_size();
    let UploadedFile { file_name, bytes } = file;

    let prepared = tokio::task::spawn_blocking(move || {
        image_pipeline::prepare_element_upload(bytes, &file_name, target_size)
    })
    .await
    .map_err(anyhow::Error::from)??;

    let expected = match dataset.dataset_type {
        DatasetType::Image => FileKind::Image,
        DatasetType::Text => FileKind::Text,
    };
    if prepared.kind != expected {
        return Err(ApiError::BadRequest(format!(
            "{:?} does not belong in a {} dataset",
            prepared.file_name, dataset.dataset_type
        )));
    }

    let path = database::element_file_path(dataset.id, &prepared.file_name);
    database::put_object(&path, Bytes::from(prepared.bytes)).await?;

    let element = database::element::insert_element(&NewElement {
        dataset_id: dataset.id,
        owner_id,
        name: prepared.file_name.chars().take(ELEMENT_NAME_MAX_LEN).collect(),
        file: path,
        label_id,
        image_width: prepared.dimensions.map(|(w, _)| w),
        image_height: prepared.dimensions.map(|(_, h)| h),
        index,
    })
    .await?;

    tracing::debug!(element_id = element.id, dataset_id = dataset.id, "Element stored");
    Ok(element)
}

#[derive(Debug, Deserialize)]
pub struct EditElementBody {
    id: i64,
    name: String,
}

#[derive(Debug, Deserialize)]
pub struct EditElementLabelBody {
    id: i64,
    label: i64,
}

#[derive(Debug, Deserialize)]
pub struct ElementIdBody {
    id: i64,
}

#[derive(Debug, Deserialize)]
pub struct DeleteElementBody {
    element: i64,
}

#[derive(Debug, Deserialize)]
pub struct ReorderBody {
    pub id: i64,
    pub order: HashMap<String, i32>,
}

#[tracing::instrument(skip_all, fields(user_id = user.0.id))]
pub async fn create_element_handler(
    user: CurrentUser,
    multipart: Multipart,
) -> Result<Json<Element>, ApiError> {
    let mut form = Form::read(multipart).await?;
    let dataset_id: i64 = form
        .parse("dataset")?
        .ok_or_else(|| ApiError::BadRequest("dataset is required".to_string()))?;
    let index: Option<i32> = form.parse("index")?;
    let file = form
        .take_file("file")
        .ok_or_else(|| ApiError::BadRequest("file is required".to_string()))?;

    let dataset = owned_dataset(dataset_id, &user.0).await?;
    Ok(Json(store_element(&dataset, user.0.id, file, None, index).await?))
}

#[tracing::instrument(skip(user), fields(user_id = user.0.id))]
pub async fn edit_element_handler(
    user: CurrentUser,
    Json(body): Json<EditElementBody>,
) -> Result<Json<Element>, ApiError> {
    let element = owned_element(body.id, &user.0).await?;
    check_name("name", &body.name, ELEMENT_NAME_MAX_LEN)?;

    Ok(Json(
        database::element::rename_element(element.id, body.name.trim()).await?,
    ))
}

#[tracing::instrument(skip(user), fields(user_id = user.0.id))]
pub async fn edit_element_label_handler(
    user: CurrentUser,
    Json(body): Json<EditElementLabelBody>,
) -> Result<Json<Element>, ApiError> {
    let element = owned_element(body.id, &user.0).await?;
    let label = owned_label(body.label, &user.0).await?;

    if label.dataset_id != element.dataset_id {
        return Err(ApiError::BadRequest(
            "the label belongs to another dataset".to_string(),
        ));
    }

    Ok(Json(
        database::element::set_element_label(element.id, Some(label.id)).await?,
    ))
}

#[tracing::instrument(skip(user), fields(user_id = user.0.id))]
pub async fn remove_element_label_handler(
    user: CurrentUser,
    Json(body): Json<ElementIdBody>,
) -> Result<StatusCode, ApiError> {
    let element = owned_element(body.id, &user.0).await?;
    database::element::set_element_label(element.id, None).await?;
    Ok(StatusCode::OK)
}

#[tracing::instrument(skip(user), fields(user_id = user.0.id))]
pub async fn delete_element_handler(
    user: CurrentUser,
    Json(body): Json<DeleteElementBody>,
) -> Result<StatusCode, ApiError> {
    let element = owned_element(body.element, &user.0).await?;

    if let Some(file) = database::element::delete_element(element.id).await? {
        database::delete_objects_logged([file.as_str()]).await;
    }
    Ok(StatusCode::OK)
}

#[tracing::instrument(skip(user), fields(user_id = user.0.id))]
pub async fn reorder_elements_handler(
    user: CurrentUser,
    Json(body): Json<ReorderBody>,
) -> Result<StatusCode, ApiError> {
    let dataset = owned_dataset(body.id, &user.0).await?;
    database::element::reorder_elements(dataset.id, &parse_order(&body.order)?).await?;
    Ok(StatusCode::OK)
}

/// Serves the stored file of an element the caller may see.
#[tracing::instrument(skip(user))]
pub async fn element_file_handler(
    user: MaybeUser,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, ApiError> {
    let element = database::element::find_element(id)
        .await?
        .ok_or_else(|| ApiError::not_found("element", id))?;
    visible_dataset(element.dataset_id, user.id())
        .await
        .map_err(|_| ApiError::not_found("element", id))?;

    let bytes = database::read_object(&element.file).await?;
    Ok(([(header::CONTENT_TYPE, content_type_for(&element.file))], bytes))
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/create-element/", post(create_element_handler))
        .route("/edit-element/", post(edit_element_handler))
        .route("/edit-element-label/", post(edit_element_label_handler))
        .route("/remove-element-label/", post(remove_element_label_handler))
        .route("/delete-element/", post(delete_element_handler))
        .route("/reorder-dataset-elements/", post(reorder_elements_handler))
        .route("/elements/{id}/file", get(element_file_handler))
}

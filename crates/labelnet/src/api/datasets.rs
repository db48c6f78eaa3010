use axum::extract::{Multipart, Path, Query};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use database::dataset::DatasetUpdate;
use labelnet_structs::{
    Area, DEFAULT_LABEL_COLOR, DATASET_NAME_MAX_LEN, Dataset, Element, Label, NewDataset, check_name,
    validate_keywords, validate_label,
};
use serde::{Deserialize, Serialize};

use super::access::{owned_dataset, store_cover_image, visible_dataset};
use super::elements::store_element;
use super::forms::Form;
use super::{ApiError, AppState, CurrentUser};

#[derive(Debug, Deserialize)]
pub struct SearchQuery {
    #[serde(default)]
    search: Option<String>,
}

impl SearchQuery {
    pub fn term(&self) -> Option<&str> {
        self.search.as_deref().map(str::trim).filter(|s| !s.is_empty())
    }
}

#[derive(Debug, Deserialize)]
pub struct IdBody {
    pub id: i64,
}

/// A dataset with everything the labeling view needs.
#[derive(Debug, Serialize)]
pub struct DatasetDetails {
    #[serde(flatten)]
    dataset: Dataset,
    ownername: String,
    labels: Vec<Label>,
    elements: Vec<Element>,
    areas: Vec<Area>,
}

async fn details(dataset: Dataset) -> Result<DatasetDetails, ApiError> {
    let (owner, labels, elements, areas) = tokio::try_join!(
        database::profile::find_profile(dataset.owner_id),
        database::label::list_dataset_labels(dataset.id),
        database::element::list_dataset_elements(dataset.id),
        database::area::list_dataset_areas(dataset.id),
    )?;

    Ok(DatasetDetails {
        ownername: owner.map(|p| p.name).unwrap_or_default(),
        dataset,
        labels,
        elements,
        areas,
    })
}

#[tracing::instrument]
pub async fn list_public_datasets_handler(
    Query(query): Query<SearchQuery>,
) -> Result<Json<Vec<Dataset>>, ApiError> {
    Ok(Json(database::dataset::list_public_datasets(query.term()).await?))
}

#[tracing::instrument(skip(user), fields(user_id = user.0.id))]
pub async fn list_my_datasets_handler(
    user: CurrentUser,
    Query(query): Query<SearchQuery>,
) -> Result<Json<Vec<Dataset>>, ApiError> {
    Ok(Json(
        database::dataset::list_owned_datasets(user.0.id, query.term()).await?,
    ))
}

#[tracing::instrument(skip(user), fields(user_id = user.0.id))]
pub async fn get_dataset_handler(
    user: CurrentUser,
    Path(id): Path<i64>,
) -> Result<Json<DatasetDetails>, ApiError> {
    let dataset = visible_dataset(id, Some(user.0.id)).await?;
    Ok(Json(details(dataset).await?))
}

#[tracing::instrument]
pub async fn get_public_dataset_handler(Path(id): Path<i64>) -> Result<Json<DatasetDetails>, ApiError> {
    let dataset = visible_dataset(id, None).await?;
    Ok(Json(details(dataset).await?))
}

/// Creates a dataset, optionally with a cover image and labeled elements.
///
/// Every `labels` value names a label; the files uploaded under a field of that
/// name become elements carrying the label.
#[tracing::instrument(skip_all, fields(user_id = user.0.id))]
pub async fn create_dataset_handler(
    user: CurrentUser,
    multipart: Multipart,
) -> Result<Json<Dataset>, ApiError> {
    let mut form = Form::read(multipart).await?;

    let new_dataset = NewDataset {
        name: form.required("name")?.to_string(),
        description: form.text("description").unwrap_or_default().to_string(),
        visibility: form.parse("visibility")?.unwrap_or_default(),
        datatype: form.parse("datatype")?.unwrap_or_default(),
        dataset_type: form.parse("dataset_type")?.unwrap_or_default(),
        keywords: form.json("keywords")?.unwrap_or_default(),
        image_width: form.parse("imageWidth")?,
        image_height: form.parse("imageHeight")?,
    };
    new_dataset.validate()?;

    let label_names: Vec<String> = form.texts("labels").to_vec();
    for name in &label_names {
        validate_label(name, DEFAULT_LABEL_COLOR, "")?;
    }

    let dataset = database::dataset::insert_dataset(user.0.id, &new_dataset).await?;
    tracing::info!(dataset_id = dataset.id, "Dataset created");

    if let Some(image) = form.take_file("image") {
        let (image, small) = store_cover_image(image).await?;
        database::dataset::set_dataset_images(dataset.id, &image, &small).await?;
    }

    for name in &label_names {
        let label = database::label::insert_label(dataset.id, user.0.id, name.trim(), DEFAULT_LABEL_COLOR, "")
            .await?;

        for file in form.take_files(name) {
            store_element(&dataset, user.0.id, file, Some(label.id), None).await?;
        }
    }

    let dataset = database::dataset::find_dataset(dataset.id)
        .await?
        .ok_or_else(|| ApiError::not_found("dataset", dataset.id))?;
    Ok(Json(dataset))
}

/// Updates the non-empty fields of a dataset and optionally replaces its cover image.
#[tracing::instrument(skip_all, fields(user_id = user.0.id))]
pub async fn edit_dataset_handler(
    user: CurrentUser,
    multipart: Multipart,
) -> Result<Json<Dataset>, ApiError> {
    let mut form = Form::read(multipart).await?;
    let id: i64 = form
        .parse("id")?
        .ok_or_else(|| ApiError::BadRequest("id is required".to_string()))?;
    let dataset = owned_dataset(id, &user.0).await?;

    let update = DatasetUpdate {
        name: form.text("name").map(ToString::to_string),
        description: form.text("description").map(ToString::to_string),
        visibility: form.parse("visibility")?,
        keywords: form.json("keywords")?,
    };
    if let Some(name) = &update.name {
        check_name("name", name, DATASET_NAME_MAX_LEN)?;
    }
    if let Some(keywords) = &update.keywords {
        validate_keywords(keywords)?;
    }

    database::dataset::update_dataset(dataset.id, &update).await?;

    if let Some(image) = form.take_file("image") {
        let (image, small) = store_cover_image(image).await?;
        let previous = database::dataset::set_dataset_images(dataset.id, &image, &small).await?;
        database::delete_objects_logged(previous.iter().map(String::as_str)).await;
    }

    let dataset = database::dataset::find_dataset(dataset.id)
        .await?
        .ok_or_else(|| ApiError::not_found("dataset", dataset.id))?;
    Ok(Json(dataset))
}

#[tracing::instrument(skip(user), fields(user_id = user.0.id))]
pub async fn delete_dataset_handler(
    user: CurrentUser,
    Path(id): Path<i64>,
) -> Result<StatusCode, ApiError> {
    let dataset = owned_dataset(id, &user.0).await?;

    let files = database::dataset::delete_dataset(dataset.id).await?;
    database::delete_objects_logged(files.iter().map(String::as_str)).await;

    tracing::info!(dataset_id = dataset.id, files = files.len(), "Dataset deleted");
    Ok(StatusCode::OK)
}

#[tracing::instrument(skip(user), fields(user_id = user.0.id))]
pub async fn download_dataset_handler(
    user: CurrentUser,
    Json(body): Json<IdBody>,
) -> Result<StatusCode, ApiError> {
    let dataset = visible_dataset(body.id, Some(user.0.id)).await?;
    database::dataset::record_dataset_download(dataset.id, user.0.id).await?;
    Ok(StatusCode::OK)
}

#[tracing::instrument(skip(user), fields(user_id = user.0.id))]
pub async fn save_dataset_handler(
    user: CurrentUser,
    Json(body): Json<IdBody>,
) -> Result<StatusCode, ApiError> {
    let dataset = visible_dataset(body.id, Some(user.0.id)).await?;
    database::dataset::save_dataset(dataset.id, user.0.id).await?;
    Ok(StatusCode::OK)
}

#[tracing::instrument(skip(user), fields(user_id = user.0.id))]
pub async fn unsave_dataset_handler(
    user: CurrentUser,
    Json(body): Json<IdBody>,
) -> Result<StatusCode, ApiError> {
    database::dataset::unsave_dataset(body.id, user.0.id).await?;
    Ok(StatusCode::OK)
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/datasets/public/", get(list_public_datasets_handler))
        .route("/datasets/public/{id}", get(get_public_dataset_handler))
        .route("/my-datasets/", get(list_my_datasets_handler))
        .route("/datasets/{id}", get(get_dataset_handler))
        .route("/create-dataset/", post(create_dataset_handler))
        .route("/edit-dataset/", post(edit_dataset_handler))
        .route("/datasets/delete/{id}/", post(delete_dataset_handler))
        .route("/download-dataset/", post(download_dataset_handler))
        .route("/save-dataset/", post(save_dataset_handler))
        .route("/unsave-dataset/", post(unsave_dataset_handler))
}

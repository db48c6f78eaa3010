use axum::http::StatusCode;
use axum::routing::post;
use axum::{Json, Router};
use labelnet_structs::{Area, Datatype, Profile};
use serde::Deserialize;

use super::access::{owned_dataset, owned_element, owned_label};
use super::{ApiError, AppState, CurrentUser};

#[derive(Debug, Deserialize)]
pub struct CreateAreaBody {
    element: i64,
    label: i64,
    area_points: Vec<[f64; 2]>,
}

#[derive(Debug, Deserialize)]
pub struct EditAreaBody {
    area: i64,
    area_points: Vec<[f64; 2]>,
}

#[derive(Debug, Deserialize)]
pub struct DeleteAreaBody {
    area: i64,
}

/// Finds an area on an element `user` owns.
async fn owned_area(id: i64, user: &Profile) -> Result<Area, ApiError> {
    let area = database::area::find_area(id)
        .await?
        .ok_or_else(|| ApiError::not_found("area", id))?;
    owned_element(area.element_id, user).await?;
    Ok(area)
}

/// Draws a polygon on an element of an area dataset.
#[tracing::instrument(skip(user), fields(user_id = user.0.id))]
pub async fn create_area_handler(
    user: CurrentUser,
    Json(body): Json<CreateAreaBody>,
) -> Result<Json<Area>, ApiError> {
    let element = owned_element(body.element, &user.0).await?;
    let label = owned_label(body.label, &user.0).await?;
    let dataset = owned_dataset(element.dataset_id, &user.0).await?;

    if dataset.datatype != Datatype::Area {
        return Err(ApiError::BadRequest(
            "areas can only be drawn in area datasets".to_string(),
        ));
    }
    if label.dataset_id != element.dataset_id {
        return Err(ApiError::BadRequest(
            "the label belongs to another dataset".to_string(),
        ));
    }
    Area::validate_points(&body.area_points)?;

    let area = database::area::insert_area(element.id, label.id, &body.area_points).await?;
    Ok(Json(area))
}

#[tracing::instrument(skip(user), fields(user_id = user.0.id))]
pub async fn edit_area_handler(
    user: CurrentUser,
    Json(body): Json<EditAreaBody>,
) -> Result<Json<Area>, ApiError> {
    let area = owned_area(body.area, &user.0).await?;
    Area::validate_points(&body.area_points)?;

    Ok(Json(
        database::area::update_area_points(area.id, &body.area_points).await?,
    ))
}

#[tracing::instrument(skip(user), fields(user_id = user.0.id))]
pub async fn delete_area_handler(
    user: CurrentUser,
    Json(body): Json<DeleteAreaBody>,
) -> Result<StatusCode, ApiError> {
    let area = owned_area(body.area, &user.0).await?;
    database::area::delete_area(area.id).await?;
    Ok(StatusCode::OK)
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/create-area/", post(create_area_handler))
        .route("/edit-area/", post(edit_area_handler))
        .route("/delete-area/", post(delete_area_handler))
}

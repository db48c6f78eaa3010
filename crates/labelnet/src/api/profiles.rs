use axum::routing::get;
use axum::{Json, Router};
use labelnet_structs::Profile;
use serde::Serialize;

use super::{ApiError, AppState, MaybeUser};

#[derive(Debug, Serialize)]
pub struct CurrentProfile {
    #[serde(flatten)]
    profile: Profile,

    #[serde(rename = "datasetsCount")]
    datasets_count: i64,

    saved_datasets: Vec<i64>,
}

/// The caller's profile, or `null` for anonymous callers.
#[tracing::instrument(skip(user))]
pub async fn current_profile_handler(
    user: MaybeUser,
) -> Result<Json<Option<CurrentProfile>>, ApiError> {
    let Some(profile) = user.0 else {
        return Ok(Json(None));
    };

    let datasets_count = database::profile::count_profile_datasets(profile.id).await?;
    let saved_datasets = database::profile::list_saved_dataset_ids(profile.id).await?;

    Ok(Json(Some(CurrentProfile {
        profile,
        datasets_count,
        saved_datasets,
    })))
}

pub fn router() -> Router<AppState> {
    Router::new().route("/current-profile/", get(current_profile_handler))
}

use serde::{Deserialize, Serialize};

use crate::{ValidationError, check_length, check_name, validate_color};

pub const LABEL_NAME_MAX_LEN: usize = 200;
pub const KEYBIND_MAX_LEN: usize = 20;
pub const DEFAULT_LABEL_COLOR: &str = "#ffffff";

/// A class of a dataset. Ordered by `index`, which is also the class index
/// used when training on the dataset.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Label {
    pub id: i64,
    pub dataset_id: i64,
    pub owner_id: i64,
    pub name: String,
    pub color: String,
    pub keybind: String,
    pub index: i32,
}

/// Validates the editable fields of a label.
///
/// # Errors
///
/// Returns the first field that fails validation.
pub fn validate_label(name: &str, color: &str, keybind: &str) -> Result<(), ValidationError> {
    check_name("name", name, LABEL_NAME_MAX_LEN)?;
    validate_color(color)?;
    check_length("keybind", keybind, KEYBIND_MAX_LEN)
}

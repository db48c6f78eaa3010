use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::types::Json;

use crate::{ValidationError, Visibility};

pub const DATASET_NAME_MAX_LEN: usize = 200;
pub const MAX_KEYWORDS: usize = 3;

/// Largest fixed element size a dataset may ask for, per side.
pub const MAX_DATASET_IMAGE_SIDE: u32 = 1024;

/// Kind of files a dataset holds.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Default,
    Serialize,
    Deserialize,
    sqlx::Type,
    strum::Display,
    strum::EnumString,
)]
#[sqlx(type_name = "dataset_type", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case", ascii_case_insensitive)]
pub enum DatasetType {
    #[default]
    Image,
    Text,
}

/// How elements are annotated: one label per element, or polygon areas.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Default,
    Serialize,
    Deserialize,
    sqlx::Type,
    strum::Display,
    strum::EnumString,
)]
#[sqlx(type_name = "datatype", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case", ascii_case_insensitive)]
pub enum Datatype {
    #[default]
    Classification,
    Area,
}

/// A dataset row with its derived counts.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Dataset {
    pub id: i64,
    pub name: String,
    pub description: String,
    pub created_at: DateTime<Utc>,
    pub owner_id: i64,

    /// Object path of the cover image
    pub image: Option<String>,

    /// Object path of the cover thumbnail
    pub image_small: Option<String>,

    pub verified: bool,
    pub keywords: Json<Vec<String>>,

    /// Fixed element width; uploads are resized to it when set
    pub image_width: Option<i32>,

    /// Fixed element height; uploads are resized to it when set
    pub image_height: Option<i32>,

    pub visibility: Visibility,
    pub datatype: Datatype,
    pub dataset_type: DatasetType,

    pub element_count: i64,
    pub label_count: i64,
    pub download_count: i64,
}

impl Dataset {
    /// Whether `profile_id` may read this dataset.
    #[must_use]
    pub fn is_visible_to(&self, profile_id: Option<i64>) -> bool {
        self.visibility.is_public() || profile_id == Some(self.owner_id)
    }

    /// The fixed `(width, height)` of the dataset elements, if any.
    #[must_use]
    pub fn fixed_size(&self) -> Option<(u32, u32)> {
        let width = u32::try_from(self.image_width?).ok()?;
        let height = u32::try_from(self.image_height?).ok()?;
        Some((width, height))
    }
}

/// Fields needed to create a dataset.
#[derive(Debug, Clone, Default)]
pub struct NewDataset {
    pub name: String,
    pub description: String,
    pub visibility: Visibility,
    pub datatype: Datatype,
    pub dataset_type: DatasetType,
    pub keywords: Vec<String>,
    pub image_width: Option<u32>,
    pub image_height: Option<u32>,
}

impl NewDataset {
    /// Checks lengths, keywords and the fixed image size.
    ///
    /// # Errors
    ///
    /// Returns the first field that fails validation.
    pub fn validate(&self) -> Result<(), ValidationError> {
        crate::check_name("name", &self.name, DATASET_NAME_MAX_LEN)?;
        validate_keywords(&self.keywords)?;

        for (field, side) in [("imageWidth", self.image_width), ("imageHeight", self.image_height)] {
            if let Some(side) = side
                && !(1..=MAX_DATASET_IMAGE_SIDE).contains(&side)
            {
                return Err(ValidationError::OutOfRange {
                    field,
                    min: 1,
                    max: MAX_DATASET_IMAGE_SIDE,
                });
            }
        }

        Ok(())
    }
}

/// Checks the keyword list of a dataset.
///
/// # Errors
///
/// Returns an error if there are too many keywords or one of them is blank.
pub fn validate_keywords(keywords: &[String]) -> Result<(), ValidationError> {
    if keywords.len() > MAX_KEYWORDS {
        return Err(ValidationError::TooManyKeywords {
            count: keywords.len(),
            max: MAX_KEYWORDS,
        });
    }
    if keywords.iter().any(|k| k.trim().is_empty()) {
        return Err(ValidationError::Empty { field: "keywords" });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn new_dataset() -> NewDataset {
        NewDataset {
            name: "Cats and dogs".to_string(),
            ..NewDataset::default()
        }
    }

    #[test]
    fn test_new_dataset_defaults() {
        let dataset = new_dataset();
        assert_eq!(dataset.visibility, Visibility::Private);
        assert_eq!(dataset.datatype, Datatype::Classification);
        assert_eq!(dataset.dataset_type, DatasetType::Image);
        assert!(dataset.validate().is_ok());
    }

    #[test]
    fn test_too_many_keywords() {
        let dataset = NewDataset {
            keywords: vec!["a".into(), "b".into(), "c".into(), "d".into()],
            ..new_dataset()
        };
        assert_eq!(
            dataset.validate(),
            Err(ValidationError::TooManyKeywords { count: 4, max: 3 })
        );
    }

    #[test]
    fn test_image_size_range() {
        let dataset = NewDataset {
            image_width: Some(0),
            ..new_dataset()
        };
        assert!(dataset.validate().is_err());

        let dataset = NewDataset {
            image_width: Some(64),
            image_height: Some(2048),
            ..new_dataset()
        };
        assert!(dataset.validate().is_err());
    }

    #[test]
    fn test_datatype_parse() {
        assert_eq!("area".parse::<Datatype>().ok(), Some(Datatype::Area));
        assert_eq!("Text".parse::<DatasetType>().ok(), Some(DatasetType::Text));
    }
}

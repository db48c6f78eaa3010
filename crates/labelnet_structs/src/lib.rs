//! Domain records and enums shared across the labelnet crates.

mod area;
mod dataset;
mod element;
mod label;
mod layer;
mod model;
mod profile;
pub mod scale;
mod sequence;
mod training;
mod validation;

pub use area::*;
pub use dataset::*;
pub use element::*;
pub use label::*;
pub use layer::*;
pub use model::*;
pub use profile::*;
pub use sequence::*;
pub use training::*;
pub use validation::*;

/// Who can see a dataset or a model.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Default,
    serde::Serialize,
    serde::Deserialize,
    sqlx::Type,
    strum::Display,
    strum::EnumString,
)]
#[sqlx(type_name = "visibility", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case", ascii_case_insensitive)]
pub enum Visibility {
    #[default]
    Private,
    Public,
}

impl Visibility {
    #[must_use]
    pub const fn is_public(self) -> bool {
        matches!(self, Self::Public)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_visibility_parse_is_case_insensitive() {
        assert_eq!("Public".parse::<Visibility>().ok(), Some(Visibility::Public));
        assert_eq!("private".parse::<Visibility>().ok(), Some(Visibility::Private));
        assert!("hidden".parse::<Visibility>().is_err());
    }

    #[test]
    fn test_visibility_serializes_lowercase() {
        let json = serde_json::to_string(&Visibility::Public).unwrap();
        assert_eq!(json, "\"public\"");
    }
}

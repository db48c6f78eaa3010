use serde::{Deserialize, Serialize};

pub const ELEMENT_NAME_MAX_LEN: usize = 100;

pub const ALLOWED_IMAGE_FILE_EXTENSIONS: [&str; 5] = ["png", "jpg", "jpeg", "webp", "avif"];
pub const ALLOWED_TEXT_FILE_EXTENSIONS: [&str; 3] = ["txt", "doc", "docx"];

/// One uploaded file of a dataset.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Element {
    pub id: i64,
    pub dataset_id: i64,
    pub owner_id: i64,
    pub name: String,

    /// Object path of the stored file
    pub file: String,

    pub label_id: Option<i64>,
    pub image_width: Option<i32>,
    pub image_height: Option<i32>,
    pub index: i32,
}

/// What an uploaded file is, judged by its extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileKind {
    Image,
    Text,
}

impl FileKind {
    /// Classifies a file name by extension. `None` means the extension is not allowed.
    #[must_use]
    pub fn from_file_name(name: &str) -> Option<Self> {
        let extension = file_extension(name)?;

        if ALLOWED_IMAGE_FILE_EXTENSIONS.contains(&extension.as_str()) {
            Some(Self::Image)
        } else if ALLOWED_TEXT_FILE_EXTENSIONS.contains(&extension.as_str()) {
            Some(Self::Text)
        } else {
            None
        }
    }
}

/// Lowercased extension of a file name, without the dot.
#[must_use]
pub fn file_extension(name: &str) -> Option<String> {
    let (stem, extension) = name.rsplit_once('.')?;
    if stem.is_empty() || extension.is_empty() {
        return None;
    }
    Some(extension.to_ascii_lowercase())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_file_kind_from_extension() {
        assert_eq!(FileKind::from_file_name("cat.PNG"), Some(FileKind::Image));
        assert_eq!(FileKind::from_file_name("photo.final.jpeg"), Some(FileKind::Image));
        assert_eq!(FileKind::from_file_name("notes.txt"), Some(FileKind::Text));
        assert_eq!(FileKind::from_file_name("report.docx"), Some(FileKind::Text));
        assert_eq!(FileKind::from_file_name("script.sh"), None);
        assert_eq!(FileKind::from_file_name("README"), None);
        assert_eq!(FileKind::from_file_name(".png"), None);
    }
}

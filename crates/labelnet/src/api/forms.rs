//! Request body helpers: multipart forms and lenient field parsing.

use std::collections::HashMap;
use std::fmt::Display;
use std::str::FromStr;

use axum::extract::Multipart;
use serde::de::{self, Deserializer};
use serde::Deserialize;
use serde_json::Value;

use super::ApiError;

/// A file part of a multipart form.
#[derive(Debug, Clone)]
pub struct UploadedFile {
    pub file_name: String,
    pub bytes: Vec<u8>,
}

/// A fully read multipart form. Parts with a file name are files, the rest text.
#[derive(Debug, Default)]
pub struct Form {
    fields: HashMap<String, Vec<String>>,
    files: HashMap<String, Vec<UploadedFile>>,
}

impl Form {
    /// Reads every part of `multipart`.
    ///
    /// # Errors
    ///
    /// Returns an error if the body is not a valid multipart stream.
    pub async fn read(mut multipart: Multipart) -> Result<Self, ApiError> {
        let mut form = Self::default();

        while let Some(field) = multipart.next_field().await? {
            let name = field.name().unwrap_or_default().to_string();

            match field.file_name().map(ToString::to_string) {
                Some(file_name) => {
                    let bytes = field.bytes().await?.to_vec();
                    form.files.entry(name).or_default().push(UploadedFile { file_name, bytes });
                }
                None => {
                    let text = field.text().await?;
                    form.fields.entry(name).or_default().push(text);
                }
            }
        }

        Ok(form)
    }

    /// First value of a text field, `None` when missing or blank.
    pub fn text(&self, name: &str) -> Option<&str> {
        self.fields
            .get(name)
            .and_then(|values| values.first())
            .map(|v| v.trim())
            .filter(|v| !v.is_empty())
    }

    pub fn texts(&self, name: &str) -> &[String] {
        self.fields.get(name).map_or(&[], Vec::as_slice)
    }

    /// # Errors
    ///
    /// Returns an error if the field is missing or blank.
    pub fn required(&self, name: &str) -> Result<&str, ApiError> {
        self.text(name)
            .ok_or_else(|| ApiError::BadRequest(format!("{name} is required")))
    }

    /// Parses a text field, `None` when missing or blank.
    ///
    /// # Errors
    ///
    /// Returns an error if the field is present but does not parse.
    pub fn parse<T>(&self, name: &str) -> Result<Option<T>, ApiError>
    where
        T: FromStr,
        T::Err: Display,
    {
        self.text(name)
            .map(|v| {
                v.parse()
                    .map_err(|e| ApiError::BadRequest(format!("invalid {name}: {e}")))
            })
            .transpose()
    }

    /// Parses a JSON-encoded text field, `None` when missing or blank.
    ///
    /// # Errors
    ///
    /// Returns an error if the field is present but is not valid JSON for `T`.
    pub fn json<T: for<'de> Deserialize<'de>>(&self, name: &str) -> Result<Option<T>, ApiError> {
        self.text(name)
            .map(|v| {
                serde_json::from_str(v).map_err(|e| ApiError::BadRequest(format!("invalid {name}: {e}")))
            })
            .transpose()
    }

    /// Removes and returns the first file of a field.
    pub fn take_file(&mut self, name: &str) -> Option<UploadedFile> {
        let files = self.files.get_mut(name)?;
        (!files.is_empty()).then(|| files.remove(0))
    }

    /// Removes and returns every file of a field.
    pub fn take_files(&mut self, name: &str) -> Vec<UploadedFile> {
        self.files.remove(name).unwrap_or_default()
    }
}

/// Deserializes an optional value that may arrive as a number, a string, or an
/// empty string meaning "absent".
///
/// # Errors
///
/// Returns an error if a non-empty value does not parse as `T`.
pub fn lenient<'de, D, T>(deserializer: D) -> Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: FromStr,
    T::Err: Display,
{
    let raw = match Option::<Value>::deserialize(deserializer)? {
        None | Some(Value::Null) => return Ok(None),
        Some(Value::String(s)) => s,
        Some(Value::Number(n)) => n.to_string(),
        Some(Value::Bool(b)) => b.to_string(),
        Some(other) => return Err(de::Error::custom(format!("unexpected value {other}"))),
    };

    let raw = raw.trim();
    if raw.is_empty() {
        return Ok(None);
    }
    raw.parse().map(Some).map_err(de::Error::custom)
}

/// Turns an `{id: index}` JSON object into pairs.
///
/// # Errors
///
/// Returns an error if a key is not an integer id.
pub fn parse_order(order: &HashMap<String, i32>) -> Result<Vec<(i64, i32)>, ApiError> {
    order
        .iter()
        .map(|(id, &index)| {
            id.trim()
                .parse()
                .map(|id| (id, index))
                .map_err(|_| ApiError::BadRequest(format!("invalid id {id:?} in order")))
        })
        .collect()
}

/// Content type to serve a stored file with, judged by its extension.
pub fn content_type_for(path: &str) -> &'static str {
    match labelnet_structs::file_extension(path).as_deref() {
        Some("png") => "image/png",
        Some("jpg" | "jpeg") => "image/jpeg",
        Some("webp") => "image/webp",
        Some("avif") => "image/avif",
        Some("txt") => "text/plain; charset=utf-8",
        Some("doc") => "application/msword",
        Some("docx") => "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
        Some("json") => "application/json",
        _ => "application/octet-stream",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Deserialize)]
    struct Fields {
        #[serde(default, deserialize_with = "lenient")]
        count: Option<u32>,

        #[serde(default, deserialize_with = "lenient", alias = "probability")]
        rate: Option<f64>,
    }

    #[test]
    fn test_lenient_accepts_numbers_strings_and_blanks() {
        let fields: Fields = serde_json::from_str(r#"{"count": 3, "rate": "0.5"}"#).unwrap();
        assert_eq!(fields.count, Some(3));
        assert_eq!(fields.rate, Some(0.5));

        let fields: Fields = serde_json::from_str(r#"{"count": "", "probability": 0.25}"#).unwrap();
        assert_eq!(fields.count, None);
        assert_eq!(fields.rate, Some(0.25));

        let fields: Fields = serde_json::from_str("{}").unwrap();
        assert_eq!(fields.count, None);
        assert_eq!(fields.rate, None);
    }

    #[test]
    fn test_lenient_rejects_garbage() {
        assert!(serde_json::from_str::<Fields>(r#"{"count": "many"}"#).is_err());
        assert!(serde_json::from_str::<Fields>(r#"{"count": [1]}"#).is_err());
    }

    #[test]
    fn test_parse_order() {
        let order = HashMap::from([("4".to_string(), 1), ("7".to_string(), 0)]);
        let mut pairs = parse_order(&order).unwrap();
        pairs.sort_unstable();
        assert_eq!(pairs, vec![(4, 1), (7, 0)]);

        let bad = HashMap::from([("x".to_string(), 0)]);
        assert!(parse_order(&bad).is_err());
    }

    #[test]
    fn test_content_types() {
        assert_eq!(content_type_for("files/1/abc-cat.PNG"), "image/png");
        assert_eq!(content_type_for("models/3/weights.bin"), "application/octet-stream");
    }
}

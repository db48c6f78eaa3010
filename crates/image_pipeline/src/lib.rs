//! Image handling for uploads and for network input.
//!
//! Uploads are normalized once, when they are stored: oversized images are
//! downscaled and images of datasets with a fixed size are resized to it.
//! Training decodes the stored files again into `CHW` float buffers.

use std::io::Cursor;

use image::codecs::jpeg::JpegEncoder;
use image::imageops::FilterType;
use image::{DynamicImage, GenericImageView, ImageFormat};
use labelnet_structs::{FileKind, file_extension};

/// Longest side an uploaded image is stored with, unless the dataset fixes a size.
pub const MAX_STORED_SIDE: u32 = 1024;

/// Longest side of a thumbnail.
pub const THUMBNAIL_SIDE: u32 = 256;

const JPEG_QUALITY: u8 = 90;

#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("unsupported file type: {0:?}")]
    UnsupportedFileType(String),

    #[error("unsupported channel count {0}, expected 1, 3 or 4")]
    UnsupportedChannels(usize),

    #[error("invalid target size {width}x{height}")]
    InvalidSize { width: usize, height: usize },

    #[error(transparent)]
    Image(#[from] image::ImageError),
}

/// An upload ready to be stored.
#[derive(Debug, Clone)]
pub struct PreparedUpload {
    pub bytes: Vec<u8>,

    /// File name to store under; its extension follows the stored encoding
    pub file_name: String,

    pub kind: FileKind,

    /// Stored image size, when the file is a decodable image
    pub dimensions: Option<(u32, u32)>,
}

/// Validates and normalizes an uploaded element.
///
/// `target_size` is the `(width, height)` fixed by the dataset, if any.
///
/// # Errors
///
/// Returns an error if the extension is not allowed or a resized image cannot be encoded.
pub fn prepare_element_upload(
    bytes: Vec<u8>,
    file_name: &str,
    target_size: Option<(u32, u32)>,
) -> Result<PreparedUpload, PipelineError> {
    let kind = FileKind::from_file_name(file_name)
        .ok_or_else(|| PipelineError::UnsupportedFileType(file_name.to_string()))?;

    if kind == FileKind::Text {
        return Ok(PreparedUpload {
            bytes,
            file_name: file_name.to_string(),
            kind,
            dimensions: None,
        });
    }

    let image = match image::load_from_memory(&bytes) {
        Ok(image) => image,
        Err(e) => {
            tracing::warn!(file_name, error = %e, "Storing undecodable image as uploaded");
            return Ok(PreparedUpload {
                bytes,
                file_name: file_name.to_string(),
                kind,
                dimensions: None,
            });
        }
    };

    let (width, height) = image.dimensions();
    let resized = match target_size {
        Some((w, h)) if (w, h) != (width, height) => Some(image.resize_exact(w, h, FilterType::Lanczos3)),
        Some(_) => None,
        None if width.max(height) > MAX_STORED_SIDE => {
            Some(image.resize(MAX_STORED_SIDE, MAX_STORED_SIDE, FilterType::Lanczos3))
        }
        None => None,
    };

    let Some(resized) = resized else {
        return Ok(PreparedUpload {
            bytes,
            file_name: file_name.to_string(),
            kind,
            dimensions: Some((width, height)),
        });
    };

    let extension = file_extension(file_name).unwrap_or_default();
    let (encoded, file_name) = if matches!(extension.as_str(), "jpg" | "jpeg") {
        (encode_jpeg(&resized)?, file_name.to_string())
    } else {
        (encode_png(&resized)?, with_extension(file_name, "png"))
    };

    Ok(PreparedUpload {
        bytes: encoded,
        file_name,
        kind,
        dimensions: Some(resized.dimensions()),
    })
}

/// Encodes a small PNG version of a cover image.
///
/// # Errors
///
/// Returns an error if the image cannot be decoded or encoded.
pub fn make_thumbnail(bytes: &[u8]) -> Result<Vec<u8>, PipelineError> {
    let image = image::load_from_memory(bytes)?;
    encode_png(&image.thumbnail(THUMBNAIL_SIDE, THUMBNAIL_SIDE))
}

/// Decodes an image into a `CHW` buffer of `channels x height x width` values in `0..=255`.
///
/// # Errors
///
/// Returns an error if the image cannot be decoded or the target shape is invalid.
pub fn decode_for_network(
    bytes: &[u8],
    channels: usize,
    height: usize,
    width: usize,
) -> Result<Vec<f32>, PipelineError> {
    let (Ok(w), Ok(h)) = (u32::try_from(width), u32::try_from(height)) else {
        return Err(PipelineError::InvalidSize { width, height });
    };
    if w == 0 || h == 0 {
        return Err(PipelineError::InvalidSize { width, height });
    }

    let image = image::load_from_memory(bytes)?;
    let image = if image.dimensions() == (w, h) {
        image
    } else {
        image.resize_exact(w, h, FilterType::Triangle)
    };

    let interleaved: Vec<u8> = match channels {
        1 => image.to_luma8().into_raw(),
        3 => image.to_rgb8().into_raw(),
        4 => image.to_rgba8().into_raw(),
        other => return Err(PipelineError::UnsupportedChannels(other)),
    };

    // HWC -> CHW
    let plane = width * height;
    let mut data = vec![0.0_f32; channels * plane];
    for (i, value) in interleaved.into_iter().enumerate() {
        let pixel = i / channels;
        let channel = i % channels;
        data[channel * plane + pixel] = f32::from(value);
    }

    Ok(data)
}

fn encode_png(image: &DynamicImage) -> Result<Vec<u8>, PipelineError> {
    let mut buffer = Cursor::new(Vec::new());
    image.write_to(&mut buffer, ImageFormat::Png)?;
    Ok(buffer.into_inner())
}

fn encode_jpeg(image: &DynamicImage) -> Result<Vec<u8>, PipelineError> {
    let mut buffer = Vec::new();
    let encoder = JpegEncoder::new_with_quality(&mut buffer, JPEG_QUALITY);
    DynamicImage::ImageRgb8(image.to_rgb8()).write_with_encoder(encoder)?;
    Ok(buffer)
}

fn with_extension(file_name: &str, extension: &str) -> String {
    match file_name.rsplit_once('.') {
        Some((stem, _)) if !stem.is_empty() => format!("{stem}.{extension}"),
        _ => format!("{file_name}.{extension}"),
    }
}

#[cfg(test)]
mod tests {
    use image::{Rgb, RgbImage};

    use super::*;

    fn png_bytes(width: u32, height: u32) -> Vec<u8> {
        let image = RgbImage::from_fn(width, height, |x, y| {
            Rgb([(x % 256) as u8, (y % 256) as u8, 128])
        });
        encode_png(&DynamicImage::ImageRgb8(image)).unwrap()
    }

    #[test]
    fn test_text_passes_through() {
        let upload = prepare_element_upload(b"hello".to_vec(), "notes.txt", None).unwrap();
        assert_eq!(upload.kind, FileKind::Text);
        assert_eq!(upload.bytes, b"hello");
        assert_eq!(upload.dimensions, None);
    }

    #[test]
    fn test_rejects_unknown_extension() {
        assert!(matches!(
            prepare_element_upload(vec![1, 2, 3], "run.exe", None),
            Err(PipelineError::UnsupportedFileType(_))
        ));
    }

    #[test]
    fn test_small_image_kept_as_is() {
        let bytes = png_bytes(40, 30);
        let upload = prepare_element_upload(bytes.clone(), "cat.png", None).unwrap();
        assert_eq!(upload.bytes, bytes);
        assert_eq!(upload.dimensions, Some((40, 30)));
        assert_eq!(upload.file_name, "cat.png");
    }

    #[test]
    fn test_large_image_downscaled_preserving_aspect() {
        let upload = prepare_element_upload(png_bytes(2048, 1024), "wide.png", None).unwrap();
        assert_eq!(upload.dimensions, Some((1024, 512)));

        let stored = image::load_from_memory(&upload.bytes).unwrap();
        assert_eq!(stored.dimensions(), (1024, 512));
    }

    #[test]
    fn test_fixed_size_resizes_exactly() {
        let upload = prepare_element_upload(png_bytes(50, 20), "dog.jpg", Some((32, 32))).unwrap();
        assert_eq!(upload.dimensions, Some((32, 32)));
        assert_eq!(upload.file_name, "dog.jpg");
        assert_eq!(
            image::guess_format(&upload.bytes).unwrap(),
            ImageFormat::Jpeg
        );
    }

    #[test]
    fn test_resized_webp_is_stored_as_png() {
        let upload = prepare_element_upload(png_bytes(50, 20), "bird.webp", Some((16, 16))).unwrap();
        assert_eq!(upload.file_name, "bird.png");
        assert_eq!(image::guess_format(&upload.bytes).unwrap(), ImageFormat::Png);
    }

    #[test]
    fn test_undecodable_image_is_kept() {
        let upload = prepare_element_upload(vec![0, 1, 2, 3], "broken.png", None).unwrap();
        assert_eq!(upload.kind, FileKind::Image);
        assert_eq!(upload.dimensions, None);
        assert_eq!(upload.bytes, vec![0, 1, 2, 3]);
    }

    #[test]
    fn test_thumbnail_bounds() {
        let thumbnail = make_thumbnail(&png_bytes(600, 300)).unwrap();
        let image = image::load_from_memory(&thumbnail).unwrap();
        assert_eq!(image.dimensions(), (256, 128));
    }

    #[test]
    fn test_decode_for_network_is_chw() {
        let image = RgbImage::from_fn(2, 2, |x, y| Rgb([10 * (x as u8 + 1), 20 * (y as u8 + 1), 7]));
        let bytes = encode_png(&DynamicImage::ImageRgb8(image)).unwrap();

        let data = decode_for_network(&bytes, 3, 2, 2).unwrap();
        assert_eq!(data.len(), 12);
        // Red plane: x-dependent.
        assert_eq!(&data[0..4], &[10.0, 20.0, 10.0, 20.0]);
        // Green plane: y-dependent.
        assert_eq!(&data[4..8], &[20.0, 20.0, 40.0, 40.0]);
        // Blue plane: constant.
        assert_eq!(&data[8..12], &[7.0; 4]);
    }

    #[test]
    fn test_decode_for_network_resizes_and_converts() {
        let data = decode_for_network(&png_bytes(64, 48), 1, 8, 8).unwrap();
        assert_eq!(data.len(), 64);
        assert!(data.iter().all(|v| (0.0..=255.0).contains(v)));

        assert!(matches!(
            decode_for_network(&png_bytes(4, 4), 2, 4, 4),
            Err(PipelineError::UnsupportedChannels(2))
        ));
        assert!(decode_for_network(&png_bytes(4, 4), 3, 0, 4).is_err());
    }
}

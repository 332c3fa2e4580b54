//! Image assets submitted to the vision provider.
//!
//! An [`ImageAsset`] is an encoded still frame plus its detected format. It
//! can be loaded from disk or decoded from the base64 / data-URL text a
//! camera capture produces.

use std::path::Path;

use base64::Engine as _;
use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::error::{MirrorError, Result};

/// Maximum allowed image size in bytes (10MB).
pub const MAX_IMAGE_SIZE: u64 = 10 * 1024 * 1024;

/// Image formats the provider accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImageFormat {
    /// JPEG image format.
    Jpeg,
    /// PNG image format.
    Png,
    /// WebP image format.
    Webp,
}

impl ImageFormat {
    /// Attempts to detect image format from file extension.
    #[must_use]
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_lowercase().as_str() {
            "jpg" | "jpeg" => Some(Self::Jpeg),
            "png" => Some(Self::Png),
            "webp" => Some(Self::Webp),
            _ => None,
        }
    }

    /// Attempts to detect image format from a file path.
    #[must_use]
    pub fn from_path(path: &Path) -> Option<Self> {
        path.extension()
            .and_then(|ext| ext.to_str())
            .and_then(Self::from_extension)
    }

    /// Attempts to detect image format from a MIME type.
    #[must_use]
    pub fn from_content_type(content_type: &str) -> Option<Self> {
        let mime = content_type.split(';').next().unwrap_or_default().trim();
        match mime.to_lowercase().as_str() {
            "image/jpeg" | "image/jpg" => Some(Self::Jpeg),
            "image/png" => Some(Self::Png),
            "image/webp" => Some(Self::Webp),
            _ => None,
        }
    }

    /// Detects the format from leading magic bytes.
    #[must_use]
    pub fn sniff(bytes: &[u8]) -> Option<Self> {
        if bytes.starts_with(&[0xFF, 0xD8, 0xFF]) {
            Some(Self::Jpeg)
        } else if bytes.starts_with(b"\x89PNG\r\n\x1a\n") {
            Some(Self::Png)
        } else if bytes.len() >= 12 && &bytes[..4] == b"RIFF" && &bytes[8..12] == b"WEBP" {
            Some(Self::Webp)
        } else {
            None
        }
    }

    /// MIME type sent to the provider.
    #[must_use]
    pub const fn content_type(self) -> &'static str {
        match self {
            Self::Jpeg => "image/jpeg",
            Self::Png => "image/png",
            Self::Webp => "image/webp",
        }
    }

    /// File extension used in upload file names.
    #[must_use]
    pub const fn extension(self) -> &'static str {
        match self {
            Self::Jpeg => "jpg",
            Self::Png => "png",
            Self::Webp => "webp",
        }
    }
}

impl std::fmt::Display for ImageFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.extension())
    }
}

/// An encoded image ready for upload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageAsset {
    bytes: Bytes,
    format: ImageFormat,
}

impl ImageAsset {
    /// Wraps encoded bytes, detecting the format from magic bytes and falling
    /// back to `content_type` when the bytes are not recognized.
    ///
    /// # Errors
    ///
    /// Returns `MirrorError::InvalidImage` for empty or unrecognized data and
    /// `MirrorError::ImageTooLarge` above [`MAX_IMAGE_SIZE`].
    pub fn from_bytes(bytes: impl Into<Bytes>, content_type: Option<&str>) -> Result<Self> {
        let bytes = bytes.into();
        if bytes.is_empty() {
            return Err(MirrorError::invalid_image("image data is empty"));
        }

        let size = bytes.len() as u64;
        if size > MAX_IMAGE_SIZE {
            return Err(MirrorError::ImageTooLarge {
                size_kb: size / 1024,
            });
        }

        let format = ImageFormat::sniff(&bytes)
            .or_else(|| content_type.and_then(ImageFormat::from_content_type))
            .ok_or_else(|| {
                MirrorError::invalid_image("unsupported image format (expected JPEG, PNG or WebP)")
            })?;

        Ok(Self { bytes, format })
    }

    /// Loads an image from disk.
    ///
    /// # Errors
    ///
    /// Returns `MirrorError::ImageNotFound` if the file doesn't exist,
    /// `MirrorError::ImageTooLarge` if it exceeds 10MB, and
    /// `MirrorError::InvalidImage` if it is not JPEG, PNG or WebP.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();

        let metadata = std::fs::metadata(path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                MirrorError::image_not_found(path)
            } else {
                MirrorError::Io(e)
            }
        })?;

        if metadata.len() > MAX_IMAGE_SIZE {
            return Err(MirrorError::ImageTooLarge {
                size_kb: metadata.len() / 1024,
            });
        }

        let data = std::fs::read(path)?;
        let hint = ImageFormat::from_path(path).map(ImageFormat::content_type);
        Self::from_bytes(data, hint)
    }

    /// Decodes base64 text or a `data:image/...;base64,` URL.
    ///
    /// # Errors
    ///
    /// Returns `MirrorError::InvalidImage` if the text is not valid base64 or
    /// the decoded bytes are not a supported image.
    pub fn from_base64(text: &str, content_type: Option<&str>) -> Result<Self> {
        let text = text.trim();
        let (declared, payload) = match text.strip_prefix("data:") {
            Some(rest) => {
                let (header, payload) = rest
                    .split_once(',')
                    .ok_or_else(|| MirrorError::invalid_image("data URL has no payload"))?;
                let mime = header.strip_suffix(";base64").ok_or_else(|| {
                    MirrorError::invalid_image("data URL is not base64 encoded")
                })?;
                (Some(mime), payload)
            }
            None => (None, text),
        };

        let bytes = base64::engine::general_purpose::STANDARD
            .decode(payload.trim())
            .map_err(|e| MirrorError::invalid_image(format!("invalid base64: {e}")))?;

        Self::from_bytes(bytes, declared.or(content_type))
    }

    /// The encoded bytes.
    #[must_use]
    pub const fn bytes(&self) -> &Bytes {
        &self.bytes
    }

    /// The detected format.
    #[must_use]
    pub const fn format(&self) -> ImageFormat {
        self.format
    }

    /// MIME type of the encoded bytes.
    #[must_use]
    pub const fn content_type(&self) -> &'static str {
        self.format.content_type()
    }

    /// Size in bytes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    /// Always `false`; empty assets are rejected at construction.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// File name announced to the provider, `{prefix}_{unix_millis}.{ext}`.
    #[must_use]
    pub fn upload_file_name(&self, prefix: &str) -> String {
        format!(
            "{prefix}_{}.{}",
            chrono::Utc::now().timestamp_millis(),
            self.format.extension()
        )
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use base64::Engine as _;

    use super::*;
    use crate::testing::jpeg_bytes;

    #[test]
    fn test_image_format_from_extension() {
        assert_eq!(ImageFormat::from_extension("JPG"), Some(ImageFormat::Jpeg));
        assert_eq!(ImageFormat::from_extension("jpeg"), Some(ImageFormat::Jpeg));
        assert_eq!(ImageFormat::from_extension("png"), Some(ImageFormat::Png));
        assert_eq!(ImageFormat::from_extension("webp"), Some(ImageFormat::Webp));
        assert_eq!(ImageFormat::from_extension("gif"), None);
        assert_eq!(
            ImageFormat::from_path(Path::new("/frames/selfie.PNG")),
            Some(ImageFormat::Png)
        );
    }

    #[test]
    fn test_sniff_magic_bytes() {
        assert_eq!(ImageFormat::sniff(&jpeg_bytes()), Some(ImageFormat::Jpeg));
        assert_eq!(
            ImageFormat::sniff(b"\x89PNG\r\n\x1a\n...."),
            Some(ImageFormat::Png)
        );
        assert_eq!(
            ImageFormat::sniff(b"RIFF\x00\x00\x00\x00WEBPVP8 "),
            Some(ImageFormat::Webp)
        );
        assert_eq!(ImageFormat::sniff(b"GIF89a"), None);
    }

    #[test]
    fn test_from_bytes_falls_back_to_content_type() {
        let asset = ImageAsset::from_bytes(b"opaque".to_vec(), Some("image/png; q=1")).unwrap();
        assert_eq!(asset.format(), ImageFormat::Png);

        let err = ImageAsset::from_bytes(b"opaque".to_vec(), None).unwrap_err();
        assert!(matches!(err, MirrorError::InvalidImage { .. }));
    }

    #[test]
    fn test_from_bytes_rejects_empty() {
        assert!(matches!(
            ImageAsset::from_bytes(Vec::new(), Some("image/jpeg")),
            Err(MirrorError::InvalidImage { .. })
        ));
    }

    #[test]
    fn test_from_base64_data_url() {
        let encoded = base64::engine::general_purpose::STANDARD.encode(jpeg_bytes());
        let asset = ImageAsset::from_base64(&format!("data:image/jpeg;base64,{encoded}"), None).unwrap();
        assert_eq!(asset.format(), ImageFormat::Jpeg);
        assert_eq!(asset.bytes().as_ref(), jpeg_bytes().as_slice());

        let plain = ImageAsset::from_base64(&encoded, None).unwrap();
        assert_eq!(plain, asset);
    }

    #[test]
    fn test_from_base64_invalid() {
        assert!(ImageAsset::from_base64("not base64!!", None).is_err());
        assert!(ImageAsset::from_base64("data:image/png,raw", None).is_err());
    }

    #[test]
    fn test_upload_file_name() {
        let asset = ImageAsset::from_bytes(jpeg_bytes(), None).unwrap();
        let name = asset.upload_file_name("skin_analysis");
        assert!(name.starts_with("skin_analysis_"));
        assert!(name.ends_with(".jpg"));
    }

    #[test]
    fn test_load_nonexistent_image() {
        let err = ImageAsset::load("/nonexistent/frame.jpg").unwrap_err();
        assert!(matches!(err, MirrorError::ImageNotFound { .. }));
    }

    #[test]
    fn test_load_image_too_large() {
        use std::io::Write;

        let path = std::env::temp_dir().join("test_mirror_large.jpg");
        let mut file = std::fs::File::create(&path).unwrap();
        file.write_all(&jpeg_bytes()).unwrap();
        file.write_all(&vec![0u8; 11 * 1024 * 1024]).unwrap();

        let err = ImageAsset::load(&path).unwrap_err();
        assert!(
            matches!(&err, MirrorError::ImageTooLarge { size_kb } if *size_kb >= 11 * 1024),
            "Expected ImageTooLarge, got: {err:?}"
        );

        std::fs::remove_file(&path).ok();
    }

    #[test]
    fn test_load_valid_image() {
        use std::io::Write;

        let path = std::env::temp_dir().join("test_mirror_frame.jpg");
        let mut file = std::fs::File::create(&path).unwrap();
        file.write_all(&jpeg_bytes()).unwrap();

        let asset = ImageAsset::load(&path).unwrap();
        assert_eq!(asset.content_type(), "image/jpeg");
        assert_eq!(asset.len(), jpeg_bytes().len());

        std::fs::remove_file(&path).ok();
    }
}

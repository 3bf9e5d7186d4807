//! Screenshots and the references steps keep to them.

use std::io::Cursor;

use chrono::{DateTime, Utc};
use image::io::Reader as ImageReader;
use image::{ImageFormat, ImageOutputFormat, RgbaImage};
use serde::{Deserialize, Serialize};

use super::errors::CaptureError;
use super::ids::ShotId;

/// A freshly captured image of the screen.
#[derive(Clone)]
pub struct Screenshot {
    pub id: ShotId,
    pub bytes: Vec<u8>,
    pub width: u32,
    pub height: u32,
    pub captured_at: DateTime<Utc>,
}

impl Screenshot {
    /// Build from PNG bytes. Only the header is decoded for the dimensions.
    pub fn from_png(
        id: ShotId,
        bytes: Vec<u8>,
        captured_at: DateTime<Utc>,
    ) -> Result<Self, CaptureError> {
        let (width, height) = png_dimensions(&bytes)?;
        Ok(Self {
            id,
            bytes,
            width,
            height,
            captured_at,
        })
    }

    pub fn mime(&self) -> &'static str {
        "image/png"
    }

    /// Whether a point lies on the captured surface.
    pub fn contains(&self, x: i32, y: i32) -> bool {
        x >= 0 && y >= 0 && (x as u32) < self.width && (y as u32) < self.height
    }

    pub fn to_ref(&self, path: Option<String>) -> ScreenshotRef {
        ScreenshotRef {
            id: self.id,
            width: self.width,
            height: self.height,
            captured_at: self.captured_at,
            path,
        }
    }
}

impl std::fmt::Debug for Screenshot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Screenshot")
            .field("id", &self.id)
            .field("bytes", &self.bytes.len())
            .field("width", &self.width)
            .field("height", &self.height)
            .field("captured_at", &self.captured_at)
            .finish()
    }
}

/// What a recorded step keeps of its screenshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScreenshotRef {
    pub id: ShotId,
    pub width: u32,
    pub height: u32,
    pub captured_at: DateTime<Utc>,

    /// Path relative to the report directory, when the image was persisted.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
}

fn invalid(err: impl std::fmt::Display) -> CaptureError {
    CaptureError::InvalidImage(err.to_string())
}

fn png_dimensions(bytes: &[u8]) -> Result<(u32, u32), CaptureError> {
    let reader = ImageReader::new(Cursor::new(bytes))
        .with_guessed_format()
        .map_err(invalid)?;
    if reader.format() != Some(ImageFormat::Png) {
        return Err(CaptureError::InvalidImage("not a PNG image".into()));
    }
    let (width, height) = reader.into_dimensions().map_err(invalid)?;
    if width == 0 || height == 0 {
        return Err(CaptureError::InvalidImage("zero-sized image".into()));
    }
    Ok((width, height))
}

/// Encode a transparent RGBA image of the given size as PNG. The scripted
/// capturer serves these frames.
pub fn blank_png(width: u32, height: u32) -> Result<Vec<u8>, CaptureError> {
    let mut out = Cursor::new(Vec::new());
    RgbaImage::new(width, height)
        .write_to(&mut out, ImageOutputFormat::Png)
        .map_err(invalid)?;
    Ok(out.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;
    use ulid::Ulid;

    fn shot(bytes: Vec<u8>) -> Result<Screenshot, CaptureError> {
        Screenshot::from_png(ShotId::from_ulid(Ulid::new()), bytes, Utc::now())
    }

    #[test]
    fn reads_dimensions_from_header() {
        let s = shot(blank_png(1920, 1080).unwrap()).unwrap();
        assert_eq!((s.width, s.height), (1920, 1080));
        assert_eq!(s.mime(), "image/png");
    }

    #[test]
    fn single_pixel_png() {
        let s = shot(blank_png(1, 1).unwrap()).unwrap();
        assert_eq!((s.width, s.height), (1, 1));
    }

    #[test]
    fn rejects_non_png_bytes() {
        let err = shot(b"GIF89a............................".to_vec()).unwrap_err();
        assert!(matches!(err, CaptureError::InvalidImage(_)));
    }

    #[test]
    fn rejects_truncated_header() {
        let mut bytes = blank_png(10, 10).unwrap();
        bytes.truncate(20);
        assert!(matches!(shot(bytes), Err(CaptureError::InvalidImage(_))));
    }

    #[test]
    fn rejects_other_formats() {
        let mut out = Cursor::new(Vec::new());
        RgbaImage::new(4, 4)
            .write_to(&mut out, ImageOutputFormat::Bmp)
            .unwrap();
        let err = shot(out.into_inner()).unwrap_err();
        assert!(matches!(err, CaptureError::InvalidImage(_)));
    }

    #[test]
    fn bounds_check() {
        let s = shot(blank_png(100, 50).unwrap()).unwrap();
        assert!(s.contains(0, 0));
        assert!(s.contains(99, 49));
        assert!(!s.contains(100, 10));
        assert!(!s.contains(-1, 10));
    }
}

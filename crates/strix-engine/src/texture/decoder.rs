use std::path::Path;

use crate::error::{RenderError, Result};

/// Decoded image, always expanded to RGBA8.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedImage {
    pub width: u32,
    pub height: u32,
    /// Channel count of the source file.
    pub channels: u8,
    pub pixels: Vec<u8>,
}

/// Image file decoding service.
pub trait ImageDecoder {
    /// Fails with `NotFound` for a missing file and `Decode` for anything
    /// unreadable.
    fn decode(&self, path: &Path) -> Result<DecodedImage>;
}

/// [`ImageDecoder`] backed by the `image` crate (PNG and JPEG).
#[derive(Debug, Default, Copy, Clone)]
pub struct ImageCrateDecoder;

impl ImageDecoder for ImageCrateDecoder {
    fn decode(&self, path: &Path) -> Result<DecodedImage> {
        let image = image::open(path).map_err(|e| match e {
            image::ImageError::IoError(io) if io.kind() == std::io::ErrorKind::NotFound => {
                RenderError::NotFound { path: path.to_path_buf() }
            }
            other => RenderError::Decode {
                path: path.to_path_buf(),
                message: other.to_string(),
            },
        })?;

        let channels = image.color().channel_count();
        let rgba = image.to_rgba8();
        let (width, height) = rgba.dimensions();

        Ok(DecodedImage {
            width,
            height,
            channels,
            pixels: rgba.into_raw(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_is_not_found() {
        let path = Path::new("definitely/not/here.png");
        match ImageCrateDecoder.decode(path) {
            Err(RenderError::NotFound { path: p }) => assert_eq!(p, path),
            other => panic!("expected NotFound, got {other:?}"),
        }
    }

    #[test]
    fn png_is_expanded_to_rgba() {
        let dir = std::env::temp_dir().join(format!("strix-decoder-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("gray.png");

        let gray = image::GrayImage::from_raw(2, 1, vec![10, 200]).unwrap();
        gray.save(&path).unwrap();

        let decoded = ImageCrateDecoder.decode(&path).unwrap();
        assert_eq!((decoded.width, decoded.height, decoded.channels), (2, 1, 1));
        assert_eq!(decoded.pixels, vec![10, 10, 10, 255, 200, 200, 200, 255]);

        std::fs::remove_dir_all(&dir).ok();
    }
}

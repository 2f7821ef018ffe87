//! Normalises uploaded photos before they are attached to a job.
//!
//! The inference endpoint sits behind a request-size limit, so every upload is
//! capped at [`MAX_DIMENSION`] on its longer side and re-encoded as JPEG.

use std::io::Cursor;

use base64::{engine::general_purpose, Engine as _};
use image::{
    codecs::jpeg::JpegEncoder, imageops::FilterType, metadata::Orientation, DynamicImage,
    GenericImageView, ImageDecoder, ImageError, ImageReader,
};
use thiserror::Error;

pub const MAX_DIMENSION: u32 = 1200;
pub const JPEG_QUALITY: u8 = 85;

#[derive(Debug, Error)]
pub enum PrepareError {
    #[error("Could not decode image: {0}")]
    Decode(#[source] image::ImageError),

    #[error("Could not encode image: {0}")]
    Encode(#[source] image::ImageError),
}

/// A resized, JPEG-encoded upload in base64 without a `data:` prefix.
#[derive(Debug, Clone)]
pub struct PreparedImage {
    pub base64: String,
    pub width: u32,
    pub height: u32,
}

/// Size after fitting `width`×`height` inside a `max`×`max` box. Images that
/// already fit are returned as-is.
pub fn fit_within(width: u32, height: u32, max: u32) -> (u32, u32) {
    if width <= max && height <= max {
        return (width, height);
    }
    let ratio = f64::min(max as f64 / width as f64, max as f64 / height as f64);
    let scaled = |side: u32| ((side as f64 * ratio).round() as u32).clamp(1, max);
    (scaled(width), scaled(height))
}

/// Decodes `bytes` and applies the EXIF orientation, so phone photos come out
/// the way a browser displays them.
fn decode_upright(bytes: &[u8]) -> Result<DynamicImage, ImageError> {
    let mut decoder = ImageReader::new(Cursor::new(bytes))
        .with_guessed_format()
        .map_err(ImageError::IoError)?
        .into_decoder()?;
    let orientation = decoder.orientation().unwrap_or(Orientation::NoTransforms);
    let mut img = DynamicImage::from_decoder(decoder)?;
    img.apply_orientation(orientation);
    Ok(img)
}

pub fn prepare_image(bytes: &[u8]) -> Result<PreparedImage, PrepareError> {
    let img = decode_upright(bytes).map_err(PrepareError::Decode)?;
    let (width, height) = img.dimensions();
    let (target_w, target_h) = fit_within(width, height, MAX_DIMENSION);

    let img = if (target_w, target_h) == (width, height) {
        img
    } else {
        img.resize_exact(target_w, target_h, FilterType::Triangle)
    };

    // JPEG has no alpha channel.
    let rgb = DynamicImage::ImageRgb8(img.to_rgb8());

    let mut jpeg_bytes = Vec::new();
    rgb.write_with_encoder(JpegEncoder::new_with_quality(&mut jpeg_bytes, JPEG_QUALITY))
        .map_err(PrepareError::Encode)?;

    Ok(PreparedImage {
        base64: general_purpose::STANDARD.encode(&jpeg_bytes),
        width: target_w,
        height: target_h,
    })
}

/// Drops a leading `data:<mime>;base64,` so both raw base64 and data URLs are accepted.
pub fn strip_data_url_prefix(encoded: &str) -> &str {
    let trimmed = encoded.trim();
    match trimmed.split_once("base64,") {
        Some((prefix, data)) if prefix.starts_with("data:") => data,
        _ => trimmed,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgb, RgbImage, Rgba, RgbaImage};

    fn png(width: u32, height: u32) -> Vec<u8> {
        let img = RgbImage::from_pixel(width, height, Rgb([200, 120, 40]));
        let mut bytes = Vec::new();
        DynamicImage::ImageRgb8(img)
            .write_to(&mut Cursor::new(&mut bytes), image::ImageFormat::Png)
            .unwrap();
        bytes
    }

    fn decoded_dimensions(prepared: &PreparedImage) -> (u32, u32) {
        let bytes = general_purpose::STANDARD.decode(&prepared.base64).unwrap();
        let format = image::guess_format(&bytes).unwrap();
        assert_eq!(format, image::ImageFormat::Jpeg);
        image::load_from_memory(&bytes).unwrap().dimensions()
    }

    #[test]
    fn small_images_keep_their_size() {
        for (w, h) in [(1, 1), (640, 480), (1200, 1200), (1200, 30), (17, 1199)] {
            assert_eq!(fit_within(w, h, MAX_DIMENSION), (w, h));
        }
        let prepared = prepare_image(&png(320, 240)).unwrap();
        assert_eq!((prepared.width, prepared.height), (320, 240));
        assert_eq!(decoded_dimensions(&prepared), (320, 240));
    }

    #[test]
    fn large_images_shrink_to_the_cap() {
        assert_eq!(fit_within(2400, 1600, MAX_DIMENSION), (1200, 800));
        assert_eq!(fit_within(1000, 3000, MAX_DIMENSION), (400, 1200));
        assert_eq!(fit_within(1201, 1201, MAX_DIMENSION), (1200, 1200));
        assert_eq!(fit_within(4000, 3, MAX_DIMENSION), (1200, 1));

        let prepared = prepare_image(&png(1800, 1350)).unwrap();
        assert_eq!((prepared.width, prepared.height), (1200, 900));
        assert_eq!(decoded_dimensions(&prepared), (1200, 900));
    }

    #[test]
    fn aspect_ratio_preserved_within_rounding() {
        for (w, h) in [(1999, 1333), (3001, 1234), (1250, 4321), (5000, 5001)] {
            let (nw, nh) = fit_within(w, h, MAX_DIMENSION);
            assert_eq!(nw.max(nh), MAX_DIMENSION);
            let before = w as f64 / h as f64;
            let after = nw as f64 / nh as f64;
            let tolerance = before * (1.0 / nw.min(nh) as f64);
            assert!((before - after).abs() <= tolerance, "{w}x{h} -> {nw}x{nh}");
        }
    }

    #[test]
    fn alpha_channel_is_flattened() {
        let img = RgbaImage::from_pixel(64, 32, Rgba([10, 20, 30, 128]));
        let mut bytes = Vec::new();
        DynamicImage::ImageRgba8(img)
            .write_to(&mut Cursor::new(&mut bytes), image::ImageFormat::Png)
            .unwrap();
        let prepared = prepare_image(&bytes).unwrap();
        assert_eq!(decoded_dimensions(&prepared), (64, 32));
    }

    /// JPEG with an APP1 segment whose IFD0 holds only `Orientation = orientation`.
    fn jpeg_with_orientation(img: &RgbImage, orientation: u8) -> Vec<u8> {
        let mut plain = Vec::new();
        DynamicImage::ImageRgb8(img.clone())
            .write_with_encoder(JpegEncoder::new_with_quality(&mut plain, 95))
            .unwrap();

        let mut exif = b"Exif\0\0".to_vec();
        exif.extend_from_slice(b"MM\0\x2a\0\0\0\x08"); // big-endian TIFF, IFD0 at 8
        exif.extend_from_slice(&[0x00, 0x01]); // one entry
        exif.extend_from_slice(&[0x01, 0x12, 0x00, 0x03, 0x00, 0x00, 0x00, 0x01]);
        exif.extend_from_slice(&[0x00, orientation, 0x00, 0x00]);
        exif.extend_from_slice(&[0x00, 0x00, 0x00, 0x00]); // no IFD1

        let segment_len = (exif.len() + 2) as u16;
        let mut out = plain[..2].to_vec(); // SOI
        out.extend_from_slice(&[0xFF, 0xE1]);
        out.extend_from_slice(&segment_len.to_be_bytes());
        out.extend_from_slice(&exif);
        out.extend_from_slice(&plain[2..]);
        out
    }

    fn red_left_blue_right() -> RgbImage {
        RgbImage::from_fn(400, 200, |x, _| {
            if x < 200 {
                Rgb([255, 0, 0])
            } else {
                Rgb([0, 0, 255])
            }
        })
    }

    #[test]
    fn exif_rotation_is_applied() {
        let bytes = jpeg_with_orientation(&red_left_blue_right(), 6);
        let prepared = prepare_image(&bytes).unwrap();
        assert_eq!((prepared.width, prepared.height), (200, 400));

        let jpeg = general_purpose::STANDARD.decode(&prepared.base64).unwrap();
        let upright = image::load_from_memory(&jpeg).unwrap().to_rgb8();
        assert_eq!(upright.dimensions(), (200, 400));
        // Rotating 90° clockwise moves the left (red) half to the top.
        let top = upright.get_pixel(100, 50);
        let bottom = upright.get_pixel(100, 350);
        assert!(top[0] > 200 && top[2] < 60, "top pixel {top:?}");
        assert!(bottom[2] > 200 && bottom[0] < 60, "bottom pixel {bottom:?}");
    }

    #[test]
    fn counter_clockwise_orientation_also_swaps_sides() {
        let bytes = jpeg_with_orientation(&red_left_blue_right(), 8);
        let prepared = prepare_image(&bytes).unwrap();
        assert_eq!((prepared.width, prepared.height), (200, 400));
    }

    #[test]
    fn rotated_large_photo_is_capped_after_rotation() {
        let img = RgbImage::from_pixel(2400, 1200, Rgb([30, 30, 30]));
        let prepared = prepare_image(&jpeg_with_orientation(&img, 6)).unwrap();
        assert_eq!((prepared.width, prepared.height), (600, 1200));
    }

    #[test]
    fn garbage_is_a_decode_error() {
        let err = prepare_image(b"definitely not an image").unwrap_err();
        assert!(matches!(err, PrepareError::Decode(_)));
    }

    #[test]
    fn data_url_prefix_is_stripped() {
        assert_eq!(strip_data_url_prefix("data:image/jpeg;base64,/9j/4AAQ"), "/9j/4AAQ");
        assert_eq!(strip_data_url_prefix("/9j/4AAQ"), "/9j/4AAQ");
        assert_eq!(strip_data_url_prefix("  iVBORw0KGgo=\n"), "iVBORw0KGgo=");
    }
}

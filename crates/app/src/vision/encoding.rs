use anyhow::{Result, anyhow};
use image::{RgbImage, codecs::jpeg::JpegEncoder};

/// Encode an annotated frame as a baseline JPEG.
pub(crate) fn encode_jpeg(image: &RgbImage, jpeg_quality: u8) -> Result<Vec<u8>> {
    let mut buffer = Vec::with_capacity(image.as_raw().len() / 8);
    let quality = jpeg_quality.clamp(1, 100);
    JpegEncoder::new_with_quality(&mut buffer, quality)
        .encode_image(image)
        .map_err(|err| anyhow!("JPEG encode failed: {err}"))?;
    Ok(buffer)
}

#[cfg(test)]
mod tests {
    use image::Rgb;

    use super::*;

    #[test]
    fn produces_decodable_jpeg() {
        let image = RgbImage::from_pixel(32, 24, Rgb([200, 10, 10]));
        let jpeg = encode_jpeg(&image, 85).unwrap();
        assert_eq!(&jpeg[..2], &[0xFF, 0xD8]);

        let decoded = image::load_from_memory(&jpeg).unwrap();
        assert_eq!((decoded.width(), decoded.height()), (32, 24));
    }

    #[test]
    fn out_of_range_quality_is_clamped() {
        let image = RgbImage::new(8, 8);
        assert!(encode_jpeg(&image, 0).is_ok());
    }
}

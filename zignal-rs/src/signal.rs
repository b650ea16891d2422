//! Scalar signal of an image: the sum of every sample of every channel of every plane.

use image::DynamicImage;
use std::fs;
use std::io::BufReader;
use std::path::Path;
use tiff::decoder::{Decoder, DecodingResult};

use crate::error::{Error, Result};

/// Integer samples are summed exactly; float samples are summed in f64.
#[derive(Debug, Default, Clone, Copy)]
struct PixelSum {
    integer: i128,
    float: f64,
}

impl PixelSum {
    fn add_unsigned<T: Copy + Into<u64>>(&mut self, data: &[T]) {
        self.integer += data.iter().map(|&v| v.into() as i128).sum::<i128>();
    }

    fn add_signed<T: Copy + Into<i64>>(&mut self, data: &[T]) {
        self.integer += data.iter().map(|&v| v.into() as i128).sum::<i128>();
    }

    fn add_float<T: Copy + Into<f64>>(&mut self, data: &[T]) {
        self.float += data.iter().map(|&v| v.into()).sum::<f64>();
    }

    fn add_tiff(&mut self, page: DecodingResult) -> Result<()> {
        match page {
            DecodingResult::U8(v) => self.add_unsigned(&v),
            DecodingResult::U16(v) => self.add_unsigned(&v),
            DecodingResult::U32(v) => self.add_unsigned(&v),
            DecodingResult::U64(v) => self.add_unsigned(&v),
            DecodingResult::I8(v) => self.add_signed(&v),
            DecodingResult::I16(v) => self.add_signed(&v),
            DecodingResult::I32(v) => self.add_signed(&v),
            DecodingResult::I64(v) => self.add_signed(&v),
            DecodingResult::F32(v) => self.add_float(&v),
            DecodingResult::F64(v) => self.add_float(&v),
            _ => return Err(Error::UnsupportedPixelFormat("TIFF sample format".into())),
        }
        Ok(())
    }

    fn total(self) -> f64 {
        self.integer as f64 + self.float
    }
}

pub fn is_tiff(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| e.eq_ignore_ascii_case("tif") || e.eq_ignore_ascii_case("tiff"))
        .unwrap_or(false)
}

/// Sum of all samples over every page of a TIFF stack.
pub fn tiff_signal(path: &Path) -> Result<f64> {
    let file = BufReader::new(fs::File::open(path)?);
    let mut decoder = Decoder::new(file)?;
    let mut sum = PixelSum::default();
    loop {
        sum.add_tiff(decoder.read_image()?)?;
        if !decoder.more_images() {
            break;
        }
        decoder.next_image()?;
    }
    Ok(sum.total())
}

/// Sum of all channels of a single-frame raster image read with the `image` crate.
pub fn raster_signal(path: &Path) -> Result<f64> {
    let img = image::open(path)?;
    let mut sum = PixelSum::default();
    match &img {
        DynamicImage::ImageLuma8(b) => sum.add_unsigned(b.as_raw()),
        DynamicImage::ImageLumaA8(b) => sum.add_unsigned(b.as_raw()),
        DynamicImage::ImageRgb8(b) => sum.add_unsigned(b.as_raw()),
        DynamicImage::ImageRgba8(b) => sum.add_unsigned(b.as_raw()),
        DynamicImage::ImageLuma16(b) => sum.add_unsigned(b.as_raw()),
        DynamicImage::ImageLumaA16(b) => sum.add_unsigned(b.as_raw()),
        DynamicImage::ImageRgb16(b) => sum.add_unsigned(b.as_raw()),
        DynamicImage::ImageRgba16(b) => sum.add_unsigned(b.as_raw()),
        DynamicImage::ImageRgb32F(b) => sum.add_float(b.as_raw()),
        DynamicImage::ImageRgba32F(b) => sum.add_float(b.as_raw()),
        other => {
            return Err(Error::UnsupportedPixelFormat(format!("{:?}", other.color())));
        }
    }
    Ok(sum.total())
}

/// Signal of one image file, dispatched on its extension.
pub fn image_signal(path: &Path) -> Result<f64> {
    if is_tiff(path) {
        tiff_signal(path)
    } else {
        raster_signal(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::BufWriter;
    use tempfile::TempDir;
    use tiff::encoder::{colortype, TiffEncoder};

    #[test]
    fn test_pixel_sum_mixes_integer_and_float() {
        let mut s = PixelSum::default();
        s.add_unsigned(&[u16::MAX, u16::MAX]);
        s.add_signed(&[-3i16, 1]);
        s.add_float(&[0.5f32, 0.25]);
        assert_eq!(s.total(), 2.0 * 65535.0 - 2.0 + 0.75);
    }

    #[test]
    fn test_is_tiff() {
        assert!(is_tiff(Path::new("a/b/LS 1.TIF")));
        assert!(is_tiff(Path::new("x.tiff")));
        assert!(!is_tiff(Path::new("x.png")));
        assert!(!is_tiff(Path::new("tif")));
    }

    #[test]
    fn test_tiff_gray16_sum() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("frame.tif");
        let data: Vec<u16> = (0..12).map(|v| v * 1000).collect();
        {
            let mut w = BufWriter::new(fs::File::create(&path).unwrap());
            let mut enc = TiffEncoder::new(&mut w).unwrap();
            enc.write_image::<colortype::Gray16>(4, 3, &data).unwrap();
        }
        let expected: u64 = data.iter().map(|&v| v as u64).sum();
        assert_eq!(tiff_signal(&path).unwrap(), expected as f64);
    }

    #[test]
    fn test_png_rgb_sums_all_channels() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("rgb.png");
        let img = image::RgbImage::from_raw(2, 1, vec![1, 2, 3, 10, 20, 30]).unwrap();
        img.save(&path).unwrap();
        assert_eq!(image_signal(&path).unwrap(), 66.0);
    }

    #[test]
    fn test_garbage_is_an_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("broken.tif");
        fs::write(&path, b"definitely not a tiff").unwrap();
        assert!(image_signal(&path).is_err());
    }
}

//! Raw engine frames to displayable RGB images.
//!
//! The engine hands back packed 32-bit words, one per pixel, laid out as
//! `0xAARRGGBB` in host byte order. Rows may carry padding, so the buffer is
//! always walked through a [`StrideView`] rather than assuming `width * 4`.

use std::path::Path;

use image::{ImageFormat, RgbImage};

use crate::error::AppError;
use crate::job::Geometry;

const BYTES_PER_PIXEL: usize = 4;

/// Frame as returned by the engine's still extraction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawFrame {
    pub width: u32,
    pub height: u32,
    /// Bytes from the start of one row to the start of the next.
    pub stride: usize,
    pub data: Vec<u8>,
}

impl RawFrame {
    /// Tightly packed frame (`stride == width * 4`).
    pub fn packed(width: u32, height: u32, data: Vec<u8>) -> Self {
        Self {
            width,
            height,
            stride: width as usize * BYTES_PER_PIXEL,
            data,
        }
    }
}

/// Bounds-checked view of `rows` rows of `row_len` bytes, `stride` bytes apart.
#[derive(Debug, Clone, Copy)]
pub struct StrideView<'a> {
    data: &'a [u8],
    row_len: usize,
    stride: usize,
    rows: usize,
}

impl<'a> StrideView<'a> {
    /// Returns None when the stride is narrower than a row or the buffer
    /// cannot hold every row. The last row needs only `row_len` bytes.
    pub fn new(data: &'a [u8], row_len: usize, stride: usize, rows: usize) -> Option<Self> {
        if stride < row_len {
            return None;
        }
        if rows > 0 {
            let needed = stride.checked_mul(rows - 1)?.checked_add(row_len)?;
            if data.len() < needed {
                return None;
            }
        }
        Some(Self {
            data,
            row_len,
            stride,
            rows,
        })
    }

    pub fn row(&self, y: usize) -> Option<&'a [u8]> {
        if y >= self.rows {
            return None;
        }
        let start = y * self.stride;
        self.data.get(start..start + self.row_len)
    }

    pub fn rows(&self) -> impl Iterator<Item = &'a [u8]> + '_ {
        (0..self.rows).filter_map(move |y| self.row(y))
    }
}

/// Immutable RGB still.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PreviewImage {
    image: RgbImage,
}

impl PreviewImage {
    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }

    /// Pixel data, 3 bytes per pixel in R, G, B order, rows packed.
    pub fn rgb(&self) -> &[u8] {
        self.image.as_raw()
    }

    pub fn as_rgb_image(&self) -> &RgbImage {
        &self.image
    }

    pub fn save_png(&self, path: &Path) -> Result<(), AppError> {
        self.image.save_with_format(path, ImageFormat::Png)?;
        Ok(())
    }
}

/// Converts an extracted frame to RGB. `None` in, or a frame that does not
/// match `geometry`, gives `None` out: the still is simply unavailable.
pub fn convert(raw: Option<&RawFrame>, geometry: &Geometry) -> Option<PreviewImage> {
    convert_with_byte_order(raw?, geometry, cfg!(target_endian = "little"))
}

fn convert_with_byte_order(
    raw: &RawFrame,
    geometry: &Geometry,
    little_endian: bool,
) -> Option<PreviewImage> {
    if raw.width != geometry.width || raw.height != geometry.height {
        log::warn!(
            target: "tiny_preview::frame",
            "frame size {}x{} does not match requested {}x{}",
            raw.width,
            raw.height,
            geometry.width,
            geometry.height
        );
        return None;
    }
    if raw.width == 0 || raw.height == 0 {
        return None;
    }

    let width = raw.width as usize;
    let height = raw.height as usize;
    let Some(view) = StrideView::new(&raw.data, width * BYTES_PER_PIXEL, raw.stride, height)
    else {
        log::warn!(
            target: "tiny_preview::frame",
            "frame buffer too small: len={}, stride={}, {}x{}",
            raw.data.len(),
            raw.stride,
            raw.width,
            raw.height
        );
        return None;
    };

    let mut pixels = Vec::with_capacity(width * height * 3);
    for row in view.rows() {
        for px in row.chunks_exact(BYTES_PER_PIXEL) {
            pixels.extend_from_slice(&word_to_rgb([px[0], px[1], px[2], px[3]], little_endian));
        }
    }

    RgbImage::from_raw(raw.width, raw.height, pixels).map(|image| PreviewImage { image })
}

/// Unpacks one `0xAARRGGBB` word stored in the given byte order. Alpha is dropped.
fn word_to_rgb(bytes: [u8; 4], little_endian: bool) -> [u8; 3] {
    let word = if little_endian {
        u32::from_le_bytes(bytes)
    } else {
        u32::from_be_bytes(bytes)
    };
    [(word >> 16) as u8, (word >> 8) as u8, word as u8]
}

#[cfg(test)]
mod tests {
    use super::*;

    const PATTERN: u32 = 0x80_11_22_33;

    fn frame_from_words(width: u32, height: u32, words: &[u32], to_bytes: fn(u32) -> [u8; 4]) -> RawFrame {
        let data = words.iter().flat_map(|w| to_bytes(*w)).collect();
        RawFrame::packed(width, height, data)
    }

    #[test]
    fn little_endian_words_become_rgb() {
        let frame = frame_from_words(1, 1, &[PATTERN], u32::to_le_bytes);
        assert_eq!(frame.data, vec![0x33, 0x22, 0x11, 0x80]);
        let image = convert_with_byte_order(&frame, &Geometry::new(1, 1), true).expect("image");
        assert_eq!(image.rgb(), &[0x11, 0x22, 0x33]);
    }

    #[test]
    fn big_endian_words_become_rgb() {
        let frame = frame_from_words(1, 1, &[PATTERN], u32::to_be_bytes);
        assert_eq!(frame.data, vec![0x80, 0x11, 0x22, 0x33]);
        let image = convert_with_byte_order(&frame, &Geometry::new(1, 1), false).expect("image");
        assert_eq!(image.rgb(), &[0x11, 0x22, 0x33]);
    }

    #[test]
    fn host_order_frames_convert_on_this_host() {
        let words = [0xFF_FF_00_00, 0xFF_00_FF_00, 0xFF_00_00_FF, 0x00_01_02_03];
        let frame = frame_from_words(2, 2, &words, u32::to_ne_bytes);
        let image = convert(Some(&frame), &Geometry::new(2, 2)).expect("image");
        assert_eq!(
            image.rgb(),
            &[255, 0, 0, 0, 255, 0, 0, 0, 255, 1, 2, 3],
            "channels should come out R, G, B regardless of host order"
        );
    }

    #[test]
    fn row_padding_is_skipped() {
        // 2x2 frame with 8 bytes of junk after each row.
        let stride = 2 * 4 + 8;
        let mut data = Vec::new();
        for row in [[0x00_0A_0B_0Cu32, 0x00_0D_0E_0F], [0x00_10_20_30, 0x00_40_50_60]] {
            for word in row {
                data.extend_from_slice(&word.to_ne_bytes());
            }
            data.extend_from_slice(&[0xEE; 8]);
        }
        // The final row's padding is optional.
        data.truncate(data.len() - 8);
        let frame = RawFrame {
            width: 2,
            height: 2,
            stride,
            data,
        };
        let image = convert(Some(&frame), &Geometry::new(2, 2)).expect("image");
        assert_eq!(
            image.rgb(),
            &[0x0A, 0x0B, 0x0C, 0x0D, 0x0E, 0x0F, 0x10, 0x20, 0x30, 0x40, 0x50, 0x60]
        );
        assert!(!image.rgb().contains(&0xEE));
    }

    #[test]
    fn missing_frame_is_unavailable() {
        assert!(convert(None, &Geometry::new(4, 4)).is_none());
    }

    #[test]
    fn short_buffer_is_unavailable() {
        let frame = RawFrame {
            width: 2,
            height: 2,
            stride: 8,
            data: vec![0; 12],
        };
        assert!(convert(Some(&frame), &Geometry::new(2, 2)).is_none());
    }

    #[test]
    fn mismatched_geometry_is_unavailable() {
        let frame = RawFrame::packed(2, 2, vec![0; 16]);
        assert!(convert(Some(&frame), &Geometry::new(4, 2)).is_none());
    }

    #[test]
    fn stride_view_rejects_narrow_stride() {
        assert!(StrideView::new(&[0; 64], 16, 8, 2).is_none());
    }

    #[test]
    fn stride_view_rows_out_of_range() {
        let data = [1u8, 2, 3, 4, 5, 6];
        let view = StrideView::new(&data, 2, 3, 2).expect("view");
        assert_eq!(view.row(0), Some(&[1u8, 2][..]));
        assert_eq!(view.row(1), Some(&[4u8, 5][..]));
        assert_eq!(view.row(2), None);
        assert_eq!(view.rows().count(), 2);
    }

    #[test]
    fn save_png_writes_file() {
        let frame = RawFrame::packed(1, 1, PATTERN.to_ne_bytes().to_vec());
        let image = convert(Some(&frame), &Geometry::new(1, 1)).expect("image");
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("still.png");
        image.save_png(&path).expect("save png");
        let decoded = image::open(&path).expect("decode png").to_rgb8();
        assert_eq!(decoded.as_raw(), image.rgb());
    }
}

//! Raw frames and pixel layout conversion.

use blackbox_common::error::{BlackboxError, BlackboxResult};

/// Byte layout of a raw frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PixelFormat {
    /// Blue, green, red, alpha (X11 / most grabbers).
    Bgra,
    /// Red, green, blue, alpha (image crates).
    Rgba,
    /// Packed blue, green, red without alpha.
    Bgr24,
}

impl PixelFormat {
    pub fn bytes_per_pixel(self) -> usize {
        match self {
            PixelFormat::Bgra | PixelFormat::Rgba => 4,
            PixelFormat::Bgr24 => 3,
        }
    }

    /// Name understood by ffmpeg's `-pix_fmt`.
    pub fn ffmpeg_name(self) -> &'static str {
        match self {
            PixelFormat::Bgra => "bgra",
            PixelFormat::Rgba => "rgba",
            PixelFormat::Bgr24 => "bgr24",
        }
    }

    /// Name used in GStreamer `video/x-raw` caps.
    pub fn gst_name(self) -> &'static str {
        match self {
            PixelFormat::Bgra => "BGRA",
            PixelFormat::Rgba => "RGBA",
            PixelFormat::Bgr24 => "BGR",
        }
    }

    /// Byte offsets of (blue, green, red) inside one pixel.
    fn bgr_offsets(self) -> (usize, usize, usize) {
        match self {
            PixelFormat::Bgra | PixelFormat::Bgr24 => (0, 1, 2),
            PixelFormat::Rgba => (2, 1, 0),
        }
    }
}

/// One captured bitmap.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawFrame {
    pub width: u32,
    pub height: u32,
    pub format: PixelFormat,
    pub data: Vec<u8>,
}

impl RawFrame {
    /// Wrap a buffer, checking that its length matches the geometry.
    pub fn new(width: u32, height: u32, format: PixelFormat, data: Vec<u8>) -> BlackboxResult<Self> {
        let expected = frame_len(width, height, format);
        if data.len() != expected {
            return Err(BlackboxError::capture(format!(
                "Frame buffer is {} bytes, expected {expected} for {width}x{height} {:?}",
                data.len(),
                format
            )));
        }
        Ok(Self {
            width,
            height,
            format,
            data,
        })
    }

    /// Write this frame into `out` in the `target` layout, reusing `out`'s
    /// allocation.
    pub fn convert_into(&self, target: PixelFormat, out: &mut Vec<u8>) {
        out.clear();
        if target == self.format {
            out.extend_from_slice(&self.data);
            return;
        }

        let src_bpp = self.format.bytes_per_pixel();
        let dst_bpp = target.bytes_per_pixel();
        let (sb, sg, sr) = self.format.bgr_offsets();
        let (db, dg, dr) = target.bgr_offsets();
        out.resize(self.data.len() / src_bpp * dst_bpp, 0);

        for (src, dst) in self
            .data
            .chunks_exact(src_bpp)
            .zip(out.chunks_exact_mut(dst_bpp))
        {
            dst[db] = src[sb];
            dst[dg] = src[sg];
            dst[dr] = src[sr];
            if dst_bpp == 4 {
                dst[3] = if src_bpp == 4 { src[3] } else { u8::MAX };
            }
        }
    }
}

/// Expected byte length of a frame.
pub fn frame_len(width: u32, height: u32, format: PixelFormat) -> usize {
    width as usize * height as usize * format.bytes_per_pixel()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bgra_2x1() -> RawFrame {
        RawFrame::new(2, 1, PixelFormat::Bgra, vec![10, 20, 30, 40, 50, 60, 70, 80]).unwrap()
    }

    #[test]
    fn bgra_to_bgr24_drops_alpha() {
        let mut out = Vec::new();
        bgra_2x1().convert_into(PixelFormat::Bgr24, &mut out);
        assert_eq!(out, vec![10, 20, 30, 50, 60, 70]);
    }

    #[test]
    fn rgba_to_bgr24_swaps_channels() {
        let frame = RawFrame::new(1, 1, PixelFormat::Rgba, vec![1, 2, 3, 4]).unwrap();
        let mut out = Vec::new();
        frame.convert_into(PixelFormat::Bgr24, &mut out);
        assert_eq!(out, vec![3, 2, 1]);
    }

    #[test]
    fn bgr24_to_bgra_is_opaque() {
        let frame = RawFrame::new(1, 1, PixelFormat::Bgr24, vec![1, 2, 3]).unwrap();
        let mut out = vec![9; 16];
        frame.convert_into(PixelFormat::Bgra, &mut out);
        assert_eq!(out, vec![1, 2, 3, 255]);
    }

    #[test]
    fn same_format_copies() {
        let mut out = Vec::new();
        bgra_2x1().convert_into(PixelFormat::Bgra, &mut out);
        assert_eq!(out, bgra_2x1().data);
    }

    #[test]
    fn rejects_short_buffer() {
        let err = RawFrame::new(2, 2, PixelFormat::Bgra, vec![0; 15]).unwrap_err();
        assert!(err.to_string().contains("expected 16"));
    }
}

// Image container sniffing: format via `infer`, dimensions from the header.
//
// Only the container header is read; pixel data is never decoded.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImageFormat {
    Jpeg,
    Png,
    Gif,
    Webp,
}

impl ImageFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            ImageFormat::Jpeg => "jpeg",
            ImageFormat::Png => "png",
            ImageFormat::Gif => "gif",
            ImageFormat::Webp => "webp",
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dimensions {
    pub width: u32,
    pub height: u32,
}

/// Identify the container format, or `None` for anything unrecognized.
pub fn detect_format(bytes: &[u8]) -> Option<ImageFormat> {
    match infer::get(bytes)?.mime_type() {
        "image/jpeg" => Some(ImageFormat::Jpeg),
        "image/png" | "image/apng" => Some(ImageFormat::Png),
        "image/gif" => Some(ImageFormat::Gif),
        "image/webp" => Some(ImageFormat::Webp),
        _ => None,
    }
}

/// Pixel dimensions from the container header. `None` when the header is
/// truncated or the layout isn't one we parse.
pub fn dimensions(format: ImageFormat, bytes: &[u8]) -> Option<Dimensions> {
    match format {
        ImageFormat::Png => {
            // 8-byte signature, then the IHDR chunk: length, "IHDR", width, height
            if bytes.get(12..16)? != b"IHDR" {
                return None;
            }
            Some(Dimensions {
                width: be_u32(bytes, 16)?,
                height: be_u32(bytes, 20)?,
            })
        }
        ImageFormat::Gif => Some(Dimensions {
            width: le_u16(bytes, 6)? as u32,
            height: le_u16(bytes, 8)? as u32,
        }),
        ImageFormat::Webp => webp_dimensions(bytes),
        ImageFormat::Jpeg => jpeg_dimensions(bytes),
    }
}

fn webp_dimensions(bytes: &[u8]) -> Option<Dimensions> {
    match bytes.get(12..16)? {
        // Lossy: frame header after the 3-byte start code at 23
        b"VP8 " => Some(Dimensions {
            width: (le_u16(bytes, 26)? & 0x3FFF) as u32,
            height: (le_u16(bytes, 28)? & 0x3FFF) as u32,
        }),
        // Lossless: 14-bit width-1 and height-1 packed after the 0x2F signature
        b"VP8L" => {
            let b = bytes.get(21..25)?;
            let (b0, b1, b2, b3) = (b[0] as u32, b[1] as u32, b[2] as u32, b[3] as u32);
            Some(Dimensions {
                width: 1 + (((b1 & 0x3F) << 8) | b0),
                height: 1 + (((b3 & 0x0F) << 10) | (b2 << 2) | ((b1 & 0xC0) >> 6)),
            })
        }
        // Extended: 24-bit canvas width-1 and height-1
        b"VP8X" => Some(Dimensions {
            width: 1 + le_u24(bytes, 24)?,
            height: 1 + le_u24(bytes, 27)?,
        }),
        _ => None,
    }
}

fn jpeg_dimensions(bytes: &[u8]) -> Option<Dimensions> {
    let mut pos = 2;
    loop {
        if *bytes.get(pos)? != 0xFF {
            return None;
        }
        let marker = *bytes.get(pos + 1)?;
        match marker {
            // Fill byte
            0xFF => {
                pos += 1;
                continue;
            }
            // Standalone markers carry no length
            0x01 | 0xD0..=0xD9 => {
                pos += 2;
                continue;
            }
            _ => {}
        }

        let len = be_u16(bytes, pos + 2)? as usize;
        let is_sof = matches!(marker, 0xC0..=0xCF) && !matches!(marker, 0xC4 | 0xC8 | 0xCC);
        if is_sof {
            // length(2) precision(1) height(2) width(2)
            return Some(Dimensions {
                height: be_u16(bytes, pos + 5)? as u32,
                width: be_u16(bytes, pos + 7)? as u32,
            });
        }
        if len < 2 {
            return None;
        }
        pos += 2 + len;
    }
}

fn be_u16(bytes: &[u8], at: usize) -> Option<u16> {
    let b = bytes.get(at..at + 2)?;
    Some(u16::from_be_bytes([b[0], b[1]]))
}

fn le_u16(bytes: &[u8], at: usize) -> Option<u16> {
    let b = bytes.get(at..at + 2)?;
    Some(u16::from_le_bytes([b[0], b[1]]))
}

fn le_u24(bytes: &[u8], at: usize) -> Option<u32> {
    let b = bytes.get(at..at + 3)?;
    Some(u32::from_le_bytes([b[0], b[1], b[2], 0]))
}

fn be_u32(bytes: &[u8], at: usize) -> Option<u32> {
    let b = bytes.get(at..at + 4)?;
    Some(u32::from_be_bytes([b[0], b[1], b[2], b[3]]))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn png_header(width: u32, height: u32) -> Vec<u8> {
        let mut bytes = vec![0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A];
        bytes.extend_from_slice(&13u32.to_be_bytes());
        bytes.extend_from_slice(b"IHDR");
        bytes.extend_from_slice(&width.to_be_bytes());
        bytes.extend_from_slice(&height.to_be_bytes());
        bytes.extend_from_slice(&[8, 6, 0, 0, 0]);
        bytes
    }

    #[test]
    fn test_detect_formats() {
        assert_eq!(detect_format(&[0xFF, 0xD8, 0xFF, 0xE0]), Some(ImageFormat::Jpeg));
        assert_eq!(detect_format(&png_header(1, 1)), Some(ImageFormat::Png));
        assert_eq!(detect_format(b"GIF89a.."), Some(ImageFormat::Gif));
        assert_eq!(detect_format(b"RIFF\0\0\0\0WEBPVP8 "), Some(ImageFormat::Webp));
        assert_eq!(detect_format(b"RIFF\0\0\0\0WAVEfmt "), None);
        // Recognized image types we don't accept
        assert_eq!(detect_format(b"BM\0\0\0\0\0\0"), None);
        assert_eq!(detect_format(b"hello"), None);
        assert_eq!(detect_format(&[]), None);
    }

    #[test]
    fn test_png_dimensions() {
        let bytes = png_header(640, 480);
        assert_eq!(
            dimensions(ImageFormat::Png, &bytes),
            Some(Dimensions { width: 640, height: 480 })
        );
    }

    #[test]
    fn test_gif_dimensions() {
        let mut bytes = b"GIF89a".to_vec();
        bytes.extend_from_slice(&320u16.to_le_bytes());
        bytes.extend_from_slice(&200u16.to_le_bytes());
        assert_eq!(
            dimensions(ImageFormat::Gif, &bytes),
            Some(Dimensions { width: 320, height: 200 })
        );
    }

    #[test]
    fn test_jpeg_dimensions_skip_app_segments() {
        let mut bytes = vec![0xFF, 0xD8];
        // APP0 segment, length 16
        bytes.extend_from_slice(&[0xFF, 0xE0, 0x00, 0x10]);
        bytes.extend_from_slice(&[0u8; 14]);
        // SOF0: length 17, precision 8, height 300, width 400
        bytes.extend_from_slice(&[0xFF, 0xC0, 0x00, 0x11, 0x08]);
        bytes.extend_from_slice(&300u16.to_be_bytes());
        bytes.extend_from_slice(&400u16.to_be_bytes());
        assert_eq!(
            dimensions(ImageFormat::Jpeg, &bytes),
            Some(Dimensions { width: 400, height: 300 })
        );
    }

    #[test]
    fn test_webp_extended_dimensions() {
        let mut bytes = b"RIFF\0\0\0\0WEBPVP8X".to_vec();
        bytes.extend_from_slice(&[0u8; 8]);
        // canvas 1024x768 stored as value-1
        bytes.extend_from_slice(&1023u32.to_le_bytes()[..3]);
        bytes.extend_from_slice(&767u32.to_le_bytes()[..3]);
        assert_eq!(
            dimensions(ImageFormat::Webp, &bytes),
            Some(Dimensions { width: 1024, height: 768 })
        );
    }

    #[test]
    fn test_truncated_header_is_none() {
        assert_eq!(dimensions(ImageFormat::Png, &png_header(1, 1)[..18]), None);
        assert_eq!(dimensions(ImageFormat::Jpeg, &[0xFF, 0xD8, 0xFF]), None);
    }
}

//! Magic-byte content-type detection (§4.3): used when a filename extension
//! is absent or untrustworthy. Falls back to `image/jpeg` with a warning
//! for unrecognized byte signatures, per property 10 (§8).

use tracing::warn;

pub fn detect_image_content_type(bytes: &[u8]) -> &'static str {
    if bytes.starts_with(&[0xFF, 0xD8, 0xFF]) {
        return "image/jpeg";
    }
    if bytes.starts_with(&[0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A]) {
        return "image/png";
    }
    if bytes.len() >= 6 && &bytes[0..3] == b"GIF" && &bytes[3..5] == b"87" || bytes.len() >= 6 && &bytes[0..3] == b"GIF" && &bytes[3..5] == b"89" {
        if bytes.get(5) == Some(&b'a') {
            return "image/gif";
        }
    }
    if bytes.len() >= 12 && &bytes[0..4] == b"RIFF" && &bytes[8..12] == b"WEBP" {
        return "image/webp";
    }
    if bytes.starts_with(&[0x42, 0x4D]) {
        return "image/bmp";
    }
    warn!("unrecognized image magic bytes, defaulting to image/jpeg");
    "image/jpeg"
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detects_jpeg() {
        assert_eq!(detect_image_content_type(&[0xFF, 0xD8, 0xFF, 0x00]), "image/jpeg");
    }

    #[test]
    fn detects_png() {
        assert_eq!(
            detect_image_content_type(&[0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A]),
            "image/png"
        );
    }

    #[test]
    fn detects_gif87a_and_gif89a() {
        assert_eq!(detect_image_content_type(b"GIF87a"), "image/gif");
        assert_eq!(detect_image_content_type(b"GIF89a"), "image/gif");
    }

    #[test]
    fn detects_webp() {
        let mut bytes = b"RIFF".to_vec();
        bytes.extend_from_slice(&[0, 0, 0, 0]);
        bytes.extend_from_slice(b"WEBP");
        assert_eq!(detect_image_content_type(&bytes), "image/webp");
    }

    #[test]
    fn detects_bmp() {
        assert_eq!(detect_image_content_type(&[0x42, 0x4D, 0x00]), "image/bmp");
    }

    #[test]
    fn unrecognized_bytes_default_to_jpeg() {
        assert_eq!(detect_image_content_type(&[0x00, 0x01, 0x02]), "image/jpeg");
    }
}

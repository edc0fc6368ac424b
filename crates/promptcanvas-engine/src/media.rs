use chrono::{DateTime, Utc};
use promptcanvas_contracts::catalog::{Category, StyleDescriptor};
use promptcanvas_contracts::response::ImagePayload;

const FALLBACK_MIME: &str = "image/png";

/// MIME type for uploaded bytes: sniffed from the content first, then the
/// host-declared type, then PNG.
pub fn detect_mime(bytes: &[u8], declared: Option<&str>) -> String {
    if let Ok(format) = image::guess_format(bytes) {
        return format.to_mime_type().to_string();
    }
    declared
        .and_then(normalize_declared_mime)
        .unwrap_or_else(|| FALLBACK_MIME.to_string())
}

/// `"jpg"`, `"image/JPG"` and `"JPEG"` all become `"image/jpeg"`.
pub fn normalize_declared_mime(declared: &str) -> Option<String> {
    let subtype = declared
        .trim()
        .rsplit('/')
        .next()
        .map(str::to_ascii_lowercase)
        .filter(|value| !value.is_empty())?;
    let subtype = match subtype.as_str() {
        "jpg" => "jpeg".to_string(),
        _ => subtype,
    };
    Some(format!("image/{subtype}"))
}

pub fn upload(bytes: Vec<u8>, declared: Option<&str>) -> ImagePayload {
    let mime_type = detect_mime(&bytes, declared);
    ImagePayload::new(bytes, mime_type)
}

pub fn mime_for_path(path: &std::path::Path) -> Option<&'static str> {
    let ext = path
        .extension()
        .and_then(|value| value.to_str())
        .map(|value| value.to_ascii_lowercase())
        .unwrap_or_default();
    match ext.as_str() {
        "png" => Some("image/png"),
        "jpg" | "jpeg" => Some("image/jpeg"),
        "webp" => Some("image/webp"),
        "gif" => Some("image/gif"),
        _ => None,
    }
}

pub fn extension_for_mime(mime: &str) -> &'static str {
    let lowered = mime.trim().to_ascii_lowercase();
    if lowered.contains("jpeg") || lowered.contains("jpg") {
        return "jpg";
    }
    if lowered.contains("webp") {
        return "webp";
    }
    if lowered.contains("gif") {
        return "gif";
    }
    "png"
}

/// Deterministic download name: `{category}-{style}-{YYYYMMDD-HHMMSS}[-NN].{ext}`.
/// The index suffix is added only when an action produced several images.
pub fn download_file_name(
    category: Category,
    style: StyleDescriptor,
    timestamp: DateTime<Utc>,
    index: Option<usize>,
    mime: &str,
) -> String {
    let stamp = timestamp.format("%Y%m%d-%H%M%S");
    let ext = extension_for_mime(mime);
    let style_key = style.key().replace('_', "-");
    match index {
        Some(idx) => format!("{}-{}-{}-{:02}.{}", category.key(), style_key, stamp, idx + 1, ext),
        None => format!("{}-{}-{}.{}", category.key(), style_key, stamp, ext),
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    const PNG_MAGIC: [u8; 16] = [
        0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A, 0, 0, 0, 0x0D, b'I', b'H', b'D', b'R',
    ];
    const JPEG_MAGIC: [u8; 12] = [0xFF, 0xD8, 0xFF, 0xE0, 0, 0x10, b'J', b'F', b'I', b'F', 0, 1];

    #[test]
    fn sniffed_format_wins_over_declared_type() {
        assert_eq!(detect_mime(&PNG_MAGIC, Some("image/jpeg")), "image/png");
        assert_eq!(detect_mime(&JPEG_MAGIC, None), "image/jpeg");
    }

    #[test]
    fn declared_type_is_normalized_when_sniffing_fails() {
        assert_eq!(detect_mime(b"not an image", Some("JPG")), "image/jpeg");
        assert_eq!(detect_mime(b"not an image", Some("image/webp")), "image/webp");
        assert_eq!(detect_mime(b"not an image", None), "image/png");
        assert_eq!(normalize_declared_mime("  "), None);
    }

    #[test]
    fn mime_for_path_matches_common_extensions() {
        assert_eq!(mime_for_path(std::path::Path::new("a.JPG")), Some("image/jpeg"));
        assert_eq!(mime_for_path(std::path::Path::new("a.png")), Some("image/png"));
        assert_eq!(mime_for_path(std::path::Path::new("a.txt")), None);
    }

    #[test]
    fn download_names_are_deterministic() {
        let ts = Utc.with_ymd_and_hms(2026, 3, 4, 5, 6, 7).unwrap();
        assert_eq!(
            download_file_name(
                Category::Marketing,
                StyleDescriptor::FlatIllustration,
                ts,
                None,
                "image/png"
            ),
            "marketing-flat-illustration-20260304-050607.png"
        );
        assert_eq!(
            download_file_name(Category::It, StyleDescriptor::None, ts, Some(1), "image/jpeg"),
            "it-none-20260304-050607-02.jpg"
        );
    }
}

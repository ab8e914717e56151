//! Normalizes upload references into attachment descriptors.

use medisage_types::{Attachment, AttachmentKind};

const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "gif", "webp"];
const FALLBACK_NAME: &str = "attachment";

/// Build an [`Attachment`] from whatever the upload layer knows about a file.
///
/// The kind is `Image` when the content type is `image/*` or the extension of
/// the name (or, failing that, the URL path) is a known image extension.
/// Everything else is a `Document`.
pub fn describe(url: &str, name: Option<&str>, content_type: Option<&str>) -> Attachment {
    let url_name = last_path_segment(url);
    let display_name = name
        .map(str::trim)
        .filter(|n| !n.is_empty())
        .or(url_name)
        .unwrap_or(FALLBACK_NAME)
        .to_string();

    let is_image = content_type
        .map(|ct| ct.trim().to_ascii_lowercase().starts_with("image/"))
        .unwrap_or(false)
        || has_image_extension(&display_name)
        || url_name.is_some_and(has_image_extension);

    Attachment {
        kind: if is_image {
            AttachmentKind::Image
        } else {
            AttachmentKind::Document
        },
        url: url.to_string(),
        display_name,
    }
}

fn last_path_segment(url: &str) -> Option<&str> {
    let path = url.split(['?', '#']).next().unwrap_or(url);
    path.rsplit('/').next().filter(|seg| !seg.is_empty())
}

fn has_image_extension(name: &str) -> bool {
    name.rsplit_once('.')
        .map(|(_, ext)| {
            IMAGE_EXTENSIONS
                .iter()
                .any(|known| ext.eq_ignore_ascii_case(known))
        })
        .unwrap_or(false)
}

use promptcanvas_contracts::response::{
    GenerationResult, ImagePayload, RemoteResponse, ResponsePart,
};

/// First-match scan of a response's parts.
///
/// The first binary part with non-empty data becomes the image and every later
/// part is ignored. Without one, the first text part becomes the fallback.
/// Otherwise the result is empty.
pub fn extract(response: &RemoteResponse) -> GenerationResult {
    let mut first_text: Option<&str> = None;
    for part in &response.parts {
        match part {
            ResponsePart::Binary { mime_type, data } if !data.is_empty() => {
                return GenerationResult::from_image(ImagePayload::new(
                    data.clone(),
                    mime_type.clone(),
                ));
            }
            ResponsePart::Binary { .. } => {}
            ResponsePart::Text(text) => {
                if first_text.is_none() {
                    first_text = Some(text);
                }
            }
        }
    }
    match first_text {
        Some(text) => GenerationResult::from_text(text),
        None => GenerationResult::empty(),
    }
}

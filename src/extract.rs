//! Locates the generated image inside a completed job's output.
//!
//! The worker's output has no fixed schema. Depending on the handler version
//! it is a single `message` field, an `images` collection, or a bare list. The
//! search below tries those shapes in order and returns the first string long
//! enough to plausibly be base64 image data.

use serde_json::Value;

/// Minimum length of `output.message` to count as an image.
pub const MESSAGE_MIN_LEN: usize = 100;
/// Minimum length of a string inside `images` or a list entry.
pub const ENTRY_MIN_LEN: usize = 1000;

pub fn extract_image(output: &Value) -> Option<&str> {
    from_message(output)
        .or_else(|| from_images(output))
        .or_else(|| from_list(output))
}

fn from_message(output: &Value) -> Option<&str> {
    output
        .get("message")
        .and_then(Value::as_str)
        .filter(|message| message.len() > MESSAGE_MIN_LEN)
}

fn from_images(output: &Value) -> Option<&str> {
    let images = output.as_object()?.get("images")?.as_array()?;
    images.iter().find_map(|entry| match entry {
        Value::Object(_) => first_long_field(entry),
        Value::String(data) if data.len() > ENTRY_MIN_LEN => Some(data.as_str()),
        _ => None,
    })
}

fn from_list(output: &Value) -> Option<&str> {
    output.as_array()?.iter().find_map(first_long_field)
}

fn first_long_field(entry: &Value) -> Option<&str> {
    entry
        .as_object()?
        .values()
        .filter_map(Value::as_str)
        .find(|data| data.len() > ENTRY_MIN_LEN)
}

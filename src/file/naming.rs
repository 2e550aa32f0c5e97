//! Name rules for file nodes.

use std::cmp::Ordering;

use crate::{Result, WorkbenchError};

use super::MAX_NAME_LENGTH;

/// Check that a name can be stored as a file or folder name.
///
/// Length is counted in UTF-16 code units, which is what the browser side
/// measures.
pub fn validate_name(name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(WorkbenchError::Validation("name must not be empty".to_string()));
    }

    if name.encode_utf16().count() > MAX_NAME_LENGTH {
        return Err(WorkbenchError::Validation(format!(
            "name must be at most {MAX_NAME_LENGTH} characters"
        )));
    }

    if name == "." || name == ".." {
        return Err(WorkbenchError::Validation(format!(
            "{name:?} is not a valid name"
        )));
    }

    if name.chars().any(|c| c == '/' || c == '\\' || c.is_control()) {
        return Err(WorkbenchError::Validation(
            "name must not contain slashes or control characters".to_string(),
        ));
    }

    Ok(())
}

/// Split a name into stem and extension on the last `.`.
///
/// The extension keeps its dot. A leading dot belongs to the stem, so
/// `.gitignore` has no extension.
pub fn split_name(name: &str) -> (&str, &str) {
    match name.rfind('.') {
        Some(pos) if pos > 0 => name.split_at(pos),
        _ => (name, ""),
    }
}

/// The `n`-th alternative for a conflicting name: `"{stem} ({n}){ext}"`.
///
/// The stem is shortened so the result stays within `MAX_NAME_LENGTH`.
/// When the extension alone leaves no room, the whole name is shortened
/// instead and the extension is lost.
pub fn numbered_name(base_name: &str, n: usize) -> String {
    let (stem, ext) = split_name(base_name);
    let suffix = format!(" ({n})");
    let room = MAX_NAME_LENGTH.saturating_sub(utf16_len(&suffix));

    if utf16_len(stem) + utf16_len(ext) <= room {
        return format!("{stem}{suffix}{ext}");
    }

    match room.checked_sub(utf16_len(ext)) {
        Some(stem_room) if stem_room > 0 => {
            format!("{}{suffix}{ext}", truncate_utf16(stem, stem_room))
        }
        _ => format!("{}{suffix}", truncate_utf16(base_name, room)),
    }
}

fn utf16_len(s: &str) -> usize {
    s.encode_utf16().count()
}

/// Longest prefix of `s` that fits in `max` UTF-16 code units.
fn truncate_utf16(s: &str, max: usize) -> &str {
    let mut units = 0;
    for (pos, c) in s.char_indices() {
        units += c.len_utf16();
        if units > max {
            return &s[..pos];
        }
    }
    s
}

/// MIME type guessed from a file name's extension.
pub fn guess_mime_type(name: &str) -> String {
    mime_guess::from_path(name)
        .first_or_octet_stream()
        .essence_str()
        .to_string()
}

/// Sibling order: case-insensitive by name, then by the exact name.
pub fn compare_names(a: &str, b: &str) -> Ordering {
    a.to_lowercase()
        .cmp(&b.to_lowercase())
        .then_with(|| a.cmp(b))
}

//! Utility functions for file naming and best-effort filesystem cleanup

use std::path::Path;

/// Maximum length of a generated file name stem, in characters
pub const MAX_FILE_NAME_LENGTH: usize = 255;

/// Characters rejected by at least one common filesystem
const FORBIDDEN_CHARS: &[char] = &['/', '\\', ':', '?', '"', '*', '<', '>', '|'];

/// Turn an arbitrary title into a filesystem-safe file name stem
///
/// Forbidden characters (`/ \ : ? " * < > |`) and control characters become
/// spaces, runs of spaces collapse into one, leading whitespace and trailing
/// dots/whitespace are trimmed, and the result is capped at
/// [`MAX_FILE_NAME_LENGTH`] characters. Applying it twice gives the same result
/// as applying it once.
///
/// # Examples
///
/// ```
/// use media_dl::utils::sanitize_file_name;
///
/// assert_eq!(sanitize_file_name("AC/DC: Live?"), "AC DC Live");
/// assert_eq!(sanitize_file_name("  trailing dots... "), "trailing dots");
/// ```
#[must_use]
pub fn sanitize_file_name(name: &str) -> String {
    let replaced: String = name
        .chars()
        .map(|c| {
            if FORBIDDEN_CHARS.contains(&c) || c.is_control() {
                ' '
            } else {
                c
            }
        })
        .collect();

    let mut collapsed = String::with_capacity(replaced.len());
    let mut previous_space = false;
    for c in replaced.chars() {
        if c == ' ' {
            if !previous_space {
                collapsed.push(c);
            }
            previous_space = true;
        } else {
            collapsed.push(c);
            previous_space = false;
        }
    }

    let trimmed = trim_name(&collapsed);
    let truncated = max_file_name_length(trimmed);
    trim_name(&truncated).to_string()
}

/// Cap a name at [`MAX_FILE_NAME_LENGTH`] characters
#[must_use]
pub fn max_file_name_length(name: &str) -> String {
    name.chars().take(MAX_FILE_NAME_LENGTH).collect()
}

fn trim_name(name: &str) -> &str {
    name.trim_start()
        .trim_end_matches(|c: char| c == '.' || c.is_whitespace())
}

/// Media essence of a content type: lowercase, parameters removed, `x-` markers dropped
fn normalized_content_type(content_type: &str) -> Option<String> {
    let essence = content_type.split(';').next().unwrap_or_default().trim();
    if essence.is_empty() {
        return None;
    }
    Some(essence.to_lowercase().replace("x-", ""))
}

/// File extension for a content type, e.g. `video/mp4` → `.mp4`
///
/// The leading media-type word and any `x-` markers are dropped.
/// Returns `None` for an empty content type.
///
/// # Examples
///
/// ```
/// use media_dl::utils::file_extension;
///
/// assert_eq!(file_extension("video/mp4").as_deref(), Some(".mp4"));
/// assert_eq!(file_extension("video/x-flv").as_deref(), Some(".flv"));
/// assert_eq!(file_extension("audio/webm; codecs=opus").as_deref(), Some(".webm"));
/// ```
#[must_use]
pub fn file_extension(content_type: &str) -> Option<String> {
    let normalized = normalized_content_type(content_type)?;
    let subtype = match normalized.split_once('/') {
        Some((_, subtype)) => subtype,
        None => normalized.as_str(),
    };
    let subtype = sanitize_extension(subtype);
    if subtype.is_empty() {
        return None;
    }
    Some(format!(".{}", subtype))
}

/// Content-qualified extension for a content type, e.g. `audio/mp4` → `.audio.mp4`
///
/// Used when several parts of one job share a plain extension.
///
/// # Examples
///
/// ```
/// use media_dl::utils::content_extension;
///
/// assert_eq!(content_extension("video/webm").as_deref(), Some(".video.webm"));
/// assert_eq!(content_extension("audio/x-m4a").as_deref(), Some(".audio.m4a"));
/// ```
#[must_use]
pub fn content_extension(content_type: &str) -> Option<String> {
    let normalized = normalized_content_type(content_type)?;
    let dotted = sanitize_extension(&normalized.replacen('/', ".", 1));
    if dotted.is_empty() {
        return None;
    }
    Some(format!(".{}", dotted))
}

fn sanitize_extension(ext: &str) -> String {
    ext.chars()
        .filter(|c| !FORBIDDEN_CHARS.contains(c) && !c.is_control() && !c.is_whitespace())
        .collect()
}

/// Delete a file, logging instead of failing
///
/// Returns `true` when the file is gone afterwards.
pub fn remove_file_quietly(path: &Path) -> bool {
    match std::fs::remove_file(path) {
        Ok(()) => true,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => true,
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "Failed to remove abandoned file");
            false
        }
    }
}

/// Current on-disk size of a file, `None` when it does not exist
pub fn file_len(path: &Path) -> Option<u64> {
    std::fs::metadata(path)
        .ok()
        .filter(|m| m.is_file())
        .map(|m| m.len())
}

//! Validation for uploaded URL lists.

use crate::error::CoreError;

/// Accepted MIME type for uploads.
pub const ACCEPTED_CONTENT_TYPE: &str = "text/plain";

/// Accepted file extension for uploads.
pub const ACCEPTED_EXTENSION: &str = ".txt";

/// Validate an uploaded URL list and return the number of URL lines.
///
/// The file is accepted when it is declared `text/plain` or named `*.txt`;
/// its body must be UTF-8 with at least one non-blank line.
pub fn validate_url_list(
    file_name: Option<&str>,
    content_type: Option<&str>,
    bytes: &[u8],
) -> Result<usize, CoreError> {
    let is_text_type = content_type
        .and_then(|ct| ct.split(';').next())
        .is_some_and(|ct| ct.trim().eq_ignore_ascii_case(ACCEPTED_CONTENT_TYPE));
    let has_txt_extension = file_name
        .is_some_and(|name| name.to_ascii_lowercase().ends_with(ACCEPTED_EXTENSION));

    if !is_text_type && !has_txt_extension {
        return Err(CoreError::Validation(
            "Only .txt files are allowed".to_string(),
        ));
    }

    let text = std::str::from_utf8(bytes)
        .map_err(|_| CoreError::Validation("Uploaded file is not valid UTF-8 text".to_string()))?;

    let urls = text.lines().filter(|line| !line.trim().is_empty()).count();
    if urls == 0 {
        return Err(CoreError::Validation(
            "Uploaded file contains no URLs".to_string(),
        ));
    }
    Ok(urls)
}

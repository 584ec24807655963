//! Upload validation.

use validator::{Validate, ValidationError, ValidationErrors};

/// MIME types accepted for upload (compared case-insensitively).
pub const ALLOWED_CONTENT_TYPES: &[&str] = &[
    // Images
    "image/jpeg",
    "image/jpg",
    "image/png",
    "image/gif",
    "image/webp",
    "image/bmp",
    // Documents
    "application/pdf",
    "application/msword",
    "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
    "application/vnd.ms-excel",
    "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet",
    "application/vnd.ms-powerpoint",
    "application/vnd.openxmlformats-officedocument.presentationml.presentation",
    // Text
    "text/plain",
    "text/csv",
    // Archives
    "application/zip",
    "application/x-zip-compressed",
    "application/x-rar-compressed",
    // Other
    "application/json",
    "application/xml",
    "text/xml",
];

/// Maximum length of an uploaded file name, in characters.
pub const MAX_FILE_NAME_LENGTH: u64 = 255;

/// Maximum length of the tags string, in characters.
pub const MAX_TAGS_LENGTH: u64 = 2000;

/// Descriptive fields of an upload; the content itself is streamed separately.
#[derive(Debug, Clone, Validate)]
pub struct UploadRequest {
    #[validate(
        length(min = 1, max = 255, message = "File name must be 1-255 characters"),
        custom(function = "not_blank")
    )]
    pub file_name: String,

    #[validate(custom(function = "allowed_content_type"))]
    pub content_type: String,

    #[validate(length(max = 2000, message = "Tags cannot exceed 2000 characters"))]
    pub tags: Option<String>,
}

/// Check the number of bytes actually received against the configured limit.
pub fn validate_content_size(len: u64, max_bytes: u64) -> Result<(), ValidationErrors> {
    let mut errors = ValidationErrors::new();
    if let Err(e) = content_size(len, max_bytes) {
        errors.add("content", e);
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

fn not_blank(value: &str) -> Result<(), ValidationError> {
    if value.trim().is_empty() {
        return Err(ValidationError::new("not_blank").with_message("File name is required".into()));
    }
    Ok(())
}

fn allowed_content_type(value: &str) -> Result<(), ValidationError> {
    if ALLOWED_CONTENT_TYPES
        .iter()
        .any(|allowed| allowed.eq_ignore_ascii_case(value))
    {
        return Ok(());
    }
    Err(ValidationError::new("content_type").with_message(
        "File type is not allowed. Allowed types: images, PDFs, Office documents, \
         text files and archives."
            .into(),
    ))
}

fn content_size(len: u64, max_bytes: u64) -> Result<(), ValidationError> {
    if len == 0 {
        return Err(ValidationError::new("empty").with_message("File cannot be empty".into()));
    }
    if len > max_bytes {
        return Err(ValidationError::new("too_large").with_message(
            format!("File size cannot exceed {} MB", max_bytes / (1024 * 1024)).into(),
        ));
    }
    Ok(())
}

/// Flatten validation errors into one human-readable line.
pub fn describe(errors: &ValidationErrors) -> String {
    let mut fields: Vec<_> = errors.field_errors().into_iter().collect();
    fields.sort_by(|a, b| a.0.cmp(&b.0));

    fields
        .into_iter()
        .flat_map(|(field, errs)| {
            errs.iter().map(move |e| match &e.message {
                Some(msg) => msg.to_string(),
                None => format!("Invalid value for {field}"),
            })
        })
        .collect::<Vec<_>>()
        .join("; ")
}

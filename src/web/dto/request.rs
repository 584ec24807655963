//! Request DTOs for the HTTP API.

use serde::Deserialize;
use validator::Validate;

use super::validation::no_control_chars;

/// Query parameters for listing files.
#[derive(Debug, Default, Deserialize)]
pub struct ListFilesQuery {
    /// 1-based page number.
    #[serde(default = "default_page_number")]
    pub page_number: i64,
    /// Items per page.
    #[serde(default = "default_page_size")]
    pub page_size: i64,
    /// Case-insensitive filter over name, tags and content type.
    #[serde(default)]
    pub search_term: Option<String>,
}

fn default_page_number() -> i64 {
    1
}

fn default_page_size() -> i64 {
    crate::file::DEFAULT_PAGE_SIZE
}

/// Tag replacement request.
#[derive(Debug, Deserialize, Validate)]
pub struct UpdateTagsRequest {
    /// New tags; `null` or blank clears them.
    #[validate(
        length(max = 2000, message = "Tags cannot exceed 2000 characters"),
        custom(function = "no_control_chars")
    )]
    pub tags: Option<String>,
}

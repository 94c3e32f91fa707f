use crate::error::{ReportError, Result};

/// Page sizes a client may request
pub const ALLOWED_PAGE_SIZES: [u32; 4] = [10, 20, 50, 100];

/// Page size used when the client sends none
pub const DEFAULT_PAGE_SIZE: u32 = 10;

const MAX_KEYWORD_LENGTH: usize = 500;
const MAX_PHONE_PATTERN_LENGTH: usize = 100;
const MAX_KEY_LENGTH: usize = 100;

/// Validation utilities for request parameters
#[derive(Debug, Copy, Clone)]
pub struct InputValidator;

impl InputValidator {
    /// Parse the 1-based page number; absent means the first page
    pub fn validate_page(raw: Option<&str>) -> Result<u32> {
        let Some(raw) = non_empty(raw) else {
            return Ok(1);
        };

        let page: u32 = raw
            .parse()
            .map_err(|_| ReportError::InvalidParameter(format!("page must be a positive integer, got: {raw}")))?;

        if page == 0 {
            return Err(ReportError::InvalidParameter(
                "page must be greater than or equal to 1".to_string(),
            ));
        }

        Ok(page)
    }

    /// Parse the page size; only the values in [`ALLOWED_PAGE_SIZES`] are accepted
    pub fn validate_page_size(raw: Option<&str>) -> Result<u32> {
        let Some(raw) = non_empty(raw) else {
            return Ok(DEFAULT_PAGE_SIZE);
        };

        let size: u32 = raw
            .parse()
            .map_err(|_| ReportError::InvalidParameter(format!("page_size must be an integer, got: {raw}")))?;

        if !ALLOWED_PAGE_SIZES.contains(&size) {
            return Err(ReportError::InvalidParameter(format!(
                "page_size must be one of {ALLOWED_PAGE_SIZES:?}, got: {size}"
            )));
        }

        Ok(size)
    }

    /// Normalize a message-text keyword; empty input means no filter
    pub fn validate_keyword(raw: Option<&str>) -> Result<Option<String>> {
        Self::validate_pattern("text_keyword", raw, MAX_KEYWORD_LENGTH)
    }

    /// Normalize a sender-phone pattern; empty input means no filter
    pub fn validate_phone_pattern(raw: Option<&str>) -> Result<Option<String>> {
        Self::validate_pattern("phone_num", raw, MAX_PHONE_PATTERN_LENGTH)
    }

    fn validate_pattern(name: &str, raw: Option<&str>, max_len: usize) -> Result<Option<String>> {
        let Some(raw) = raw else {
            return Ok(None);
        };

        // Surrounding spaces are part of the substring match
        let sanitized: String = raw.chars().filter(|c| !c.is_control()).collect();
        if sanitized.is_empty() {
            return Ok(None);
        }

        if sanitized.chars().count() > max_len {
            return Err(ReportError::InvalidParameter(format!(
                "{name} too long (max {max_len} characters)"
            )));
        }

        Ok(Some(sanitized))
    }

    /// Check the size of a feedback batch before anything reaches the store
    pub fn validate_feedback_batch(len: usize, max_items: usize) -> Result<()> {
        if len == 0 {
            return Err(ReportError::EmptyInput);
        }

        if len > max_items {
            return Err(ReportError::InvalidParameter(format!(
                "Too many feedback items ({len}). Maximum per request is {max_items}"
            )));
        }

        Ok(())
    }

    /// Validate a `group_id` / `sdt_in` value from a feedback body
    pub fn validate_key_part(name: &str, value: &str) -> Result<()> {
        if value.trim().is_empty() {
            return Err(ReportError::InvalidParameter(format!("{name} cannot be empty")));
        }

        if value.len() > MAX_KEY_LENGTH {
            return Err(ReportError::InvalidParameter(format!(
                "{name} too long (max {MAX_KEY_LENGTH} characters)"
            )));
        }

        Ok(())
    }

    /// Table names are interpolated into SQL, so only plain identifiers pass
    pub fn validate_table_name(name: &str) -> Result<()> {
        let mut chars = name.chars();
        let valid_start = chars
            .next()
            .is_some_and(|c| c.is_ascii_alphabetic() || c == '_');

        if !valid_start || !chars.all(|c| c.is_ascii_alphanumeric() || c == '_') || name.len() > 64 {
            return Err(ReportError::InvalidParameter(format!(
                "Table name must match [A-Za-z_][A-Za-z0-9_]{{0,63}}, got: {name:?}"
            )));
        }

        Ok(())
    }
}

fn non_empty(raw: Option<&str>) -> Option<&str> {
    raw.map(str::trim).filter(|s| !s.is_empty())
}

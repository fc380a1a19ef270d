//! The `property=value[,option...]` filter.

use super::Queryable;
use crate::error::{CoreError, CoreResult};

/// Filter options.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterOption {
    /// `i`: case-insensitive comparison.
    CaseInsensitive,
}

/// A parsed single-property equality filter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Filter {
    /// Field name or dot path.
    pub property: String,
    /// Raw value to compare against.
    pub value: String,
    /// Parsed options.
    pub options: Vec<FilterOption>,
}

impl Filter {
    /// Creates a filter without options.
    #[must_use]
    pub fn new(property: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            property: property.into(),
            value: value.into(),
            options: Vec::new(),
        }
    }

    /// Parses a filter expression.
    ///
    /// An empty or blank expression yields `None`, which matches everything.
    /// Options follow the value separated by `,` or `;`.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::InvalidFilter`] when the expression has no `=` or
    /// more than one, an empty property, or an unknown option.
    pub fn parse(expr: &str) -> CoreResult<Option<Self>> {
        let expr = expr.trim();
        if expr.is_empty() {
            return Ok(None);
        }

        let mut segments = expr.split(|c: char| c == ',' || c == ';');
        let head = segments.next().unwrap_or_default();

        let mut parts = head.split('=');
        let (Some(property), Some(value), None) = (parts.next(), parts.next(), parts.next()) else {
            return Err(CoreError::invalid_filter(format!(
                "expected property=value, got {expr}"
            )));
        };
        let property = property.trim();
        if property.is_empty() {
            return Err(CoreError::invalid_filter(format!("missing property in {expr}")));
        }

        let mut options = Vec::new();
        for option in segments.map(str::trim).filter(|o| !o.is_empty()) {
            if option.eq_ignore_ascii_case("i") {
                options.push(FilterOption::CaseInsensitive);
            } else {
                return Err(CoreError::invalid_filter(format!("unknown option {option}")));
            }
        }

        Ok(Some(Self {
            property: property.to_string(),
            value: value.trim().to_string(),
            options,
        }))
    }

    /// Returns true if `record` satisfies the filter.
    #[must_use]
    pub fn matches<T: Queryable>(&self, record: &T) -> bool {
        record
            .field(&self.property)
            .is_some_and(|field| field.matches(&self.value))
    }
}

/// Keeps the records matching `filter`; `None` keeps all of them.
#[must_use]
pub fn filter_by_property<T: Queryable>(records: Vec<T>, filter: Option<&Filter>) -> Vec<T> {
    match filter {
        None => records,
        Some(filter) => records.into_iter().filter(|r| filter.matches(r)).collect(),
    }
}

/// Returns the index of the first record whose `property` equals `value`.
#[must_use]
pub fn record_index<T: Queryable>(records: &[T], property: &str, value: &str) -> Option<usize> {
    records.iter().position(|record| {
        record
            .field(property)
            .is_some_and(|field| field.matches(value))
    })
}

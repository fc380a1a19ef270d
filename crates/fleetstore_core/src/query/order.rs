//! Single-property ordering.

use super::Queryable;
use crate::error::{CoreError, CoreResult};
use std::cmp::Ordering;

/// Sort direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OrderDirection {
    /// Smallest first.
    #[default]
    Asc,
    /// Largest first.
    Desc,
}

/// Sort instruction for one property.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Order {
    /// Field name or dot path.
    pub property: String,
    /// Direction.
    pub direction: OrderDirection,
}

impl Order {
    /// Ascending order on `property`.
    #[must_use]
    pub fn asc(property: impl Into<String>) -> Self {
        Self {
            property: property.into(),
            direction: OrderDirection::Asc,
        }
    }

    /// Descending order on `property`.
    #[must_use]
    pub fn desc(property: impl Into<String>) -> Self {
        Self {
            property: property.into(),
            direction: OrderDirection::Desc,
        }
    }

    /// Parses `"property [asc|desc]"`. Blank input yields `None`.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::InvalidFilter`] for an unknown direction or extra
    /// tokens.
    pub fn parse(expr: &str) -> CoreResult<Option<Self>> {
        let mut tokens = expr.split_whitespace();
        let Some(property) = tokens.next() else {
            return Ok(None);
        };
        let direction = match tokens.next() {
            None => OrderDirection::Asc,
            Some(d) if d.eq_ignore_ascii_case("asc") => OrderDirection::Asc,
            Some(d) if d.eq_ignore_ascii_case("desc") => OrderDirection::Desc,
            Some(d) => {
                return Err(CoreError::invalid_filter(format!("unknown order direction {d}")))
            }
        };
        if tokens.next().is_some() {
            return Err(CoreError::invalid_filter(format!("invalid order {expr}")));
        }
        Ok(Some(Self {
            property: property.to_string(),
            direction,
        }))
    }
}

/// Stable sort of `records` by one property; `None` leaves them untouched.
///
/// Records without the property sort before those that have it.
#[must_use]
pub fn order_by_property<T: Queryable>(mut records: Vec<T>, order: Option<&Order>) -> Vec<T> {
    let Some(order) = order else {
        return records;
    };

    records.sort_by(|a, b| {
        let ordering = match (a.field(&order.property), b.field(&order.property)) {
            (Some(x), Some(y)) => x.compare(&y),
            (None, Some(_)) => Ordering::Less,
            (Some(_), None) => Ordering::Greater,
            (None, None) => Ordering::Equal,
        };
        match order.direction {
            OrderDirection::Asc => ordering,
            OrderDirection::Desc => ordering.reverse(),
        }
    });
    records
}

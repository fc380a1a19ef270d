//! Single-property filtering, ordering and lookup over record slices.
//!
//! Records expose their fields through [`Queryable`]; field names are the
//! persisted JSON keys and are matched case-insensitively. Nested fields are
//! addressed with dot paths such as `resources.cpu_type`.

mod authorize;
mod filter;
mod order;

pub use authorize::{authorized_records, is_authorized, Authorized};
pub use filter::{filter_by_property, record_index, Filter, FilterOption};
pub use order::{order_by_property, Order, OrderDirection};

use std::cmp::Ordering;
use std::fmt;

/// A scalar field value read from a record.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    /// String field.
    Str(String),
    /// Integer field.
    Int(i64),
    /// Floating point field.
    Float(f64),
    /// Boolean field.
    Bool(bool),
}

impl FieldValue {
    /// Returns true if the raw filter value equals this field.
    ///
    /// Strings compare case-insensitively; numbers and booleans compare the
    /// parsed value. A raw value that does not parse as the field's kind never
    /// matches.
    #[must_use]
    pub fn matches(&self, raw: &str) -> bool {
        match self {
            Self::Str(s) => s.eq_ignore_ascii_case(raw),
            Self::Int(i) => raw.trim().parse::<i64>().is_ok_and(|v| v == *i),
            Self::Float(f) => raw.trim().parse::<f64>().is_ok_and(|v| v == *f),
            Self::Bool(b) => raw.trim().parse::<bool>().is_ok_and(|v| v == *b),
        }
    }

    /// Orders two values of the same kind; mixed kinds compare as text.
    #[must_use]
    pub fn compare(&self, other: &Self) -> Ordering {
        match (self, other) {
            (Self::Str(a), Self::Str(b)) => a.cmp(b),
            (Self::Int(a), Self::Int(b)) => a.cmp(b),
            (Self::Float(a), Self::Float(b)) => a.partial_cmp(b).unwrap_or(Ordering::Equal),
            (Self::Bool(a), Self::Bool(b)) => a.cmp(b),
            (a, b) => a.to_string().cmp(&b.to_string()),
        }
    }
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Str(s) => f.write_str(s),
            Self::Int(i) => write!(f, "{i}"),
            Self::Float(v) => write!(f, "{v}"),
            Self::Bool(b) => write!(f, "{b}"),
        }
    }
}

impl From<&str> for FieldValue {
    fn from(value: &str) -> Self {
        Self::Str(value.to_string())
    }
}

impl From<&String> for FieldValue {
    fn from(value: &String) -> Self {
        Self::Str(value.clone())
    }
}

impl From<i64> for FieldValue {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<f64> for FieldValue {
    fn from(value: f64) -> Self {
        Self::Float(value)
    }
}

impl From<bool> for FieldValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

/// Read access to a record's fields by JSON name.
pub trait Queryable {
    /// Resolves a field by name or dot path, case-insensitively.
    ///
    /// Returns `None` for unknown fields and for fields that are not scalars.
    fn field(&self, path: &str) -> Option<FieldValue>;
}

impl<T: Queryable> Queryable for Option<T> {
    fn field(&self, path: &str) -> Option<FieldValue> {
        self.as_ref().and_then(|inner| inner.field(path))
    }
}

/// Conversion of a scalar struct field into a [`FieldValue`].
pub trait ToFieldValue {
    /// Returns the value, or `None` when the field has no scalar form.
    fn to_field_value(&self) -> Option<FieldValue>;
}

impl ToFieldValue for String {
    fn to_field_value(&self) -> Option<FieldValue> {
        Some(FieldValue::Str(self.clone()))
    }
}

impl ToFieldValue for bool {
    fn to_field_value(&self) -> Option<FieldValue> {
        Some(FieldValue::Bool(*self))
    }
}

impl ToFieldValue for i64 {
    fn to_field_value(&self) -> Option<FieldValue> {
        Some(FieldValue::Int(*self))
    }
}

impl ToFieldValue for u32 {
    fn to_field_value(&self) -> Option<FieldValue> {
        Some(FieldValue::Int(i64::from(*self)))
    }
}

impl ToFieldValue for f64 {
    fn to_field_value(&self) -> Option<FieldValue> {
        Some(FieldValue::Float(*self))
    }
}

impl<T: ToFieldValue> ToFieldValue for Option<T> {
    fn to_field_value(&self) -> Option<FieldValue> {
        self.as_ref().and_then(ToFieldValue::to_field_value)
    }
}

/// Implements [`Queryable`] from a table of JSON names to struct fields.
///
/// Scalar fields are listed first; `nested` entries delegate the rest of a dot
/// path to a field that is itself `Queryable`.
#[macro_export]
macro_rules! queryable {
    (
        $ty:ty {
            $($name:literal => $field:ident),* $(,)?
        }
        $(nested { $($nested_name:literal => $nested_field:ident),* $(,)? })?
    ) => {
        impl $crate::query::Queryable for $ty {
            fn field(&self, path: &str) -> Option<$crate::query::FieldValue> {
                #[allow(unused_imports)]
                use $crate::query::{Queryable as _, ToFieldValue as _};
                let (head, rest) = $crate::query::split_path(path);
                match (head.as_str(), rest) {
                    $(($name, None) => self.$field.to_field_value(),)*
                    $($(($nested_name, Some(rest)) => self.$nested_field.field(rest),)*)?
                    _ => None,
                }
            }
        }
    };
}

/// Splits a dot path into its first segment (lowercased) and the remainder.
#[must_use]
pub fn split_path(path: &str) -> (String, Option<&str>) {
    match path.split_once('.') {
        Some((head, rest)) => (head.to_ascii_lowercase(), Some(rest)),
        None => (path.to_ascii_lowercase(), None),
    }
}

//! Query-string modifiers owned by a single `Reference`.
//!
//! # Design
//! Every field starts unset and an unset field emits nothing. Booleans set
//! back to `false` and strings set to `""` return to the unset state rather
//! than encoding a literal `false` or an empty value. Keys are emitted in
//! alphabetical order so the same state always encodes to the same string.

use url::form_urlencoded;

pub const END_AT: &str = "endAt";
pub const EQUAL_TO: &str = "equalTo";
pub const FORMAT: &str = "format";
pub const FORMAT_EXPORT: &str = "export";
pub const LIMIT_TO_FIRST: &str = "limitToFirst";
pub const LIMIT_TO_LAST: &str = "limitToLast";
pub const ORDER_BY: &str = "orderBy";
pub const SHALLOW: &str = "shallow";
pub const START_AT: &str = "startAt";

/// Query parameters attached to one reference.
///
/// A child reference always starts from `QueryParams::default()`; values
/// are never copied between references.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueryParams {
    shallow: bool,
    order_by: Option<String>,
    start_at: Option<String>,
    end_at: Option<String>,
    equal_to: Option<String>,
    limit_to_first: Option<u32>,
    limit_to_last: Option<u32>,
    include_priority: bool,
}

impl QueryParams {
    pub fn set_shallow(&mut self, shallow: bool) {
        self.shallow = shallow;
    }

    pub fn set_order_by(&mut self, value: &str) {
        self.order_by = non_empty(value);
    }

    pub fn set_start_at(&mut self, value: &str) {
        self.start_at = non_empty(value);
    }

    pub fn set_end_at(&mut self, value: &str) {
        self.end_at = non_empty(value);
    }

    pub fn set_equal_to(&mut self, value: &str) {
        self.equal_to = non_empty(value);
    }

    pub fn set_limit_to_first(&mut self, limit: u32) {
        self.limit_to_first = Some(limit);
    }

    pub fn set_limit_to_last(&mut self, limit: u32) {
        self.limit_to_last = Some(limit);
    }

    pub fn set_include_priority(&mut self, include: bool) {
        self.include_priority = include;
    }

    /// Key/value pairs currently set, in emission order.
    pub fn pairs(&self) -> Vec<(&'static str, String)> {
        let mut pairs = Vec::new();
        if let Some(v) = &self.end_at {
            pairs.push((END_AT, v.clone()));
        }
        if let Some(v) = &self.equal_to {
            pairs.push((EQUAL_TO, v.clone()));
        }
        if self.include_priority {
            pairs.push((FORMAT, FORMAT_EXPORT.to_string()));
        }
        if let Some(n) = self.limit_to_first {
            pairs.push((LIMIT_TO_FIRST, n.to_string()));
        }
        if let Some(n) = self.limit_to_last {
            pairs.push((LIMIT_TO_LAST, n.to_string()));
        }
        if let Some(v) = &self.order_by {
            pairs.push((ORDER_BY, v.clone()));
        }
        if self.shallow {
            pairs.push((SHALLOW, "true".to_string()));
        }
        if let Some(v) = &self.start_at {
            pairs.push((START_AT, v.clone()));
        }
        pairs
    }

    pub fn len(&self) -> usize {
        self.pairs().len()
    }

    pub fn is_empty(&self) -> bool {
        *self == QueryParams::default()
    }

    /// Encode as an `application/x-www-form-urlencoded` query string,
    /// without a leading `?`.
    pub fn encode(&self) -> String {
        form_urlencoded::Serializer::new(String::new())
            .extend_pairs(self.pairs())
            .finish()
    }
}

fn non_empty(value: &str) -> Option<String> {
    (!value.is_empty()).then(|| value.to_string())
}

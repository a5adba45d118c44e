//! # Identity Codec
//!
//! Remote objects are addressed by hierarchical, slash-separated identifiers that
//! alternate literal segments and values:
//!
//! ```text
//! /subscriptions/{subscriptionId}/resourceGroups/{resourceGroupName}/providers/Microsoft.App/containerApps/{containerAppName}
//! ```
//!
//! An [`IdPattern`] describes one such shape. Concrete identifier types implement
//! [`ResourceId`] by naming their pattern and converting to and from the ordered list of
//! values; parsing and formatting are provided.
//!
//! ## Two parse variants
//!
//! - [`ResourceId::parse`] is strict: literal segments must match exactly. Use it for
//!   identifiers a user typed or that came out of local state.
//! - [`ResourceId::parse_insensitively`] ignores ASCII case on literal segments. The remote
//!   API is known to echo identifiers back with different casing (`resourcegroups`,
//!   `Microsoft.app`), so anything read out of a wire model goes through this variant.
//!
//! Either way the parsed identifier formats back in canonical casing, and for a canonical
//! input `format(parse(s)) == s`.

use crate::lock::LockKey;
use std::fmt::{Debug, Display};
use std::hash::Hash;

/// One segment of an identifier shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Segment {
    /// A literal, such as `resourceGroups` or `Microsoft.App`.
    Static(&'static str),
    /// A named value slot.
    Value(&'static str),
}

/// Errors produced while parsing an identifier.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("parsing {input:?} as a {kind} ID: {reason}")]
pub struct IdError {
    pub kind: &'static str,
    pub input: String,
    pub reason: IdErrorReason,
}

/// Why an identifier did not match its pattern.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum IdErrorReason {
    #[error("an ID must start with '/'")]
    MissingLeadingSlash,
    #[error("expected segment {position} to be {expected:?} but got {actual:?}")]
    UnexpectedSegment {
        position: usize,
        expected: &'static str,
        actual: String,
    },
    #[error("missing value for {0:?}")]
    MissingValue(&'static str),
    #[error("unexpected trailing segments {0:?}")]
    TrailingSegments(String),
}

/// The ordered shape of one identifier type.
#[derive(Debug, Clone, Copy)]
pub struct IdPattern {
    segments: &'static [Segment],
}

impl IdPattern {
    pub const fn new(segments: &'static [Segment]) -> Self {
        Self { segments }
    }

    pub fn segments(&self) -> &'static [Segment] {
        self.segments
    }

    /// Number of value slots in this pattern.
    pub fn arity(&self) -> usize {
        self.segments
            .iter()
            .filter(|s| matches!(s, Segment::Value(_)))
            .count()
    }

    /// Match `input` against the pattern and return the values in order.
    pub fn parse(
        &self,
        kind: &'static str,
        input: &str,
        case_insensitive: bool,
    ) -> Result<Vec<String>, IdError> {
        let fail = |reason| IdError {
            kind,
            input: input.to_string(),
            reason,
        };

        let rest = input
            .strip_prefix('/')
            .ok_or_else(|| fail(IdErrorReason::MissingLeadingSlash))?;
        let mut parts = rest.split('/');
        let mut values = Vec::with_capacity(self.arity());

        for (position, segment) in self.segments.iter().enumerate() {
            let part = parts.next().filter(|p| !p.is_empty());
            match *segment {
                Segment::Static(expected) => {
                    let actual = part.unwrap_or_default();
                    let matches = if case_insensitive {
                        actual.eq_ignore_ascii_case(expected)
                    } else {
                        actual == expected
                    };
                    if !matches {
                        return Err(fail(IdErrorReason::UnexpectedSegment {
                            position,
                            expected,
                            actual: actual.to_string(),
                        }));
                    }
                }
                Segment::Value(name) => {
                    let value = part.ok_or_else(|| fail(IdErrorReason::MissingValue(name)))?;
                    values.push(value.to_string());
                }
            }
        }

        let trailing: Vec<&str> = parts.collect();
        if !trailing.is_empty() {
            return Err(fail(IdErrorReason::TrailingSegments(trailing.join("/"))));
        }

        Ok(values)
    }

    /// Render `values` into the pattern using canonical literal casing.
    pub fn format(&self, values: &[&str]) -> String {
        let mut values = values.iter();
        let mut out = String::new();
        for segment in self.segments {
            out.push('/');
            match segment {
                Segment::Static(literal) => out.push_str(literal),
                Segment::Value(_) => out.push_str(values.next().copied().unwrap_or_default()),
            }
        }
        out
    }
}

/// A typed remote identifier.
///
/// Implementors provide the pattern and the value conversions; everything else is
/// derived. `Display` must render [`IdPattern::format`] of [`ResourceId::values`].
pub trait ResourceId: Clone + Debug + Display + Eq + Hash + Send + Sync + 'static {
    /// Human readable name used in error messages (e.g. "Container App").
    const KIND: &'static str;

    const PATTERN: IdPattern;

    /// Build the identifier from exactly `PATTERN.arity()` values.
    fn from_values(values: Vec<String>) -> Self;

    fn values(&self) -> Vec<&str>;

    /// Strict parse for user-supplied identifiers.
    fn parse(input: &str) -> Result<Self, IdError> {
        Self::PATTERN
            .parse(Self::KIND, input, false)
            .map(Self::from_values)
    }

    /// Case-insensitive parse for identifiers echoed back by the remote API.
    fn parse_insensitively(input: &str) -> Result<Self, IdError> {
        Self::PATTERN
            .parse(Self::KIND, input, true)
            .map(Self::from_values)
    }

    fn format_id(&self) -> String {
        Self::PATTERN.format(&self.values())
    }

    fn lock_key(&self) -> LockKey {
        LockKey::new(self.format_id())
    }
}

//! Small id newtypes used across the profile model.

use std::fmt;

/// Identifier of a [`crate::profile::Location`] accumulator.
///
/// Handed out by the aggregator's sequence generator; unique across a run and
/// stable across sessions once persisted (`location.id` primary key).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct LocationId(pub i64);

impl fmt::Display for LocationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn location_id_orders_by_value() {
        assert!(LocationId(1) < LocationId(2));
        assert_eq!(LocationId(7).to_string(), "7");
    }
}

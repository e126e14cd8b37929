//! Task routing.
//!
//! [`RuleMatcher`] picks the rule for a task type; [`FailoverRouter`]
//! substitutes a configured alternate for an unroutable provider.

pub mod failover;
pub mod rules;

pub use failover::{FailoverRouter, Route};
pub use rules::RuleMatcher;

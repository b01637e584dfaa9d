//! Record anonymization for the Accord trust engine.
//!
//! Records are generic JSON objects (typically STIX objects). The level a
//! record is shared at comes from the trust relationship; this crate only
//! turns that level into a transformation:
//!
//! | Level | Effect |
//! |-------|--------|
//! | `none` | unchanged |
//! | `minimal` | attribution keys removed, creator references replaced |
//! | `partial` | minimal, plus IPv4/domain/hash values masked |
//! | `full` | partial, then only `type`, `pattern`, `value`, `name` and a short `description` kept |
//! | `custom` | a base level plus per-field `remove`/`hash`/`mask` rules |
//!
//! All strategies are pure and return a new record.

pub mod error;
pub mod patterns;
mod select;
mod strategy;

pub use error::AnonymizeError;
pub use select::{anonymize_record, select_strategy};
pub use strategy::{
    builtin_strategy, is_attribution_key, is_creator_key, AnonymizationStrategy,
    CustomAnonymization, CustomRules, FieldAction, FullAnonymization, MinimalAnonymization,
    NoAnonymization, PartialAnonymization, ANONYMOUS_IDENTITY, MASKED,
};

//! Agreement statistics between response chains.
//!
//! Provides pairwise models (exact and distance-weighted match), multi-item
//! models (Cohen's kappa, Krippendorff's alpha), the comparator that pairs
//! responses by root input, and agreement reporting.

pub mod comparator;
pub mod error;
pub mod model;
pub mod report;

pub use comparator::{Compare, Comparator};
pub use error::CompareError;
pub use model::{
    Agreement, CohensComparisonModel, ComparisonModel, DistanceComparisonModel,
    EqualComparisonModel, KrippendorffsComparisonModel, as_items,
};
pub use report::{AgreementReport, ModelScore};

//! URL canonicalization and domain handling
//!
//! Visited-set keys and cross-job deduplication both depend on a stable
//! canonical form for every URL the crawler touches, so all frontier and
//! link-extraction paths funnel through this module.

mod domain;
mod normalize;

pub use domain::extract_domain;
pub use normalize::canonical_url;

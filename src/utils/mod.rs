//! Shared helpers: input limits, output naming, and the external `.pairs` sort.

pub mod external_sort;
pub mod validation;

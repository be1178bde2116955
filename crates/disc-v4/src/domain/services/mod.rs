//! Domain services: pure functions over node identifiers.
//!
//! Everything here is deterministic and free of I/O.

mod distance;
mod sorting;

pub use distance::{bucket_index, compare_distance, log_distance, xor_distance};
pub use sorting::{closest_first, sort_by_distance};

#[cfg(test)]
mod tests;

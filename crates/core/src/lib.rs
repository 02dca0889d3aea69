//! Domain logic for the allocation-simulation client.
//!
//! Pure types and functions: the option catalog, permutation-validated
//! preference rankings, the ranking persistence seam, and projection of
//! raw simulation tallies into ranked probability results. No network
//! or async code lives here.

pub mod error;
pub mod projector;
pub mod ranking;
pub mod store;
pub mod types;

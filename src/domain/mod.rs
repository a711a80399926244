//! Domain modules (vertical slices).

pub mod group;

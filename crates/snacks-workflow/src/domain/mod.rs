//! Domain layer for workflows.

pub mod lifecycle;

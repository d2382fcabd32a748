//! Domain model module declarations.

pub mod event;

//! CLI layer

pub mod commands;

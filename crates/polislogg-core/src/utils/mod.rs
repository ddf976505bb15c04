//! Small text helpers shared by the models and the CLI.

pub mod format;

pub use format::{contains_ignore_case, format_age, truncate_string};

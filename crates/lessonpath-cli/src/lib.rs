//! lessonpath-cli: command-line front end for the lessonpath tracker.

pub mod cli;
pub mod output;

//! CLI subcommands

pub mod algorithms;
pub mod run;

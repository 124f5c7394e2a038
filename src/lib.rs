//! pagekit library exports for testing

use clap::ValueEnum;

pub mod core;
pub mod pager;
pub mod source;
pub mod tui;

#[cfg(test)]
pub mod test_support;

/// How the binary presents the list.
#[derive(Clone, Debug, Default, ValueEnum)]
pub enum Mode {
    /// Interactive terminal list.
    #[default]
    Browse,
    /// Fetch every page and print one JSON item per line.
    Print,
}

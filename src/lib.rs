// Library interface for traceview
// Exposes the loader, filter tree and config for the binary and embedding hosts

pub mod cli;
pub mod config;
pub mod filter;
pub mod index;
pub mod parser;
pub mod reader;
pub mod theme;
pub mod watcher;

#[cfg(test)]
pub(crate) mod test_utils;

//! Core engine: the catalog → fetch → detect → rank → alert loop.

pub mod catalog;
pub mod fetcher;
pub mod scanner;
pub mod supervisor;

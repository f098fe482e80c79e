//! Integration tests: full scan cycles against an in-memory exchange.

mod mock_exchange;
mod scan_pipeline;

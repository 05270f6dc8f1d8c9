//! Core data model types: fetched messages and sync reports.

pub mod message;
pub mod report;

//! Header decoding for archived messages.

pub mod subject;

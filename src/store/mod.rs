//! On-disk archive layout: inventory and atomic entry writes.

pub mod archive;

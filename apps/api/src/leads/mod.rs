// Lead pipeline: snippet parsing, identity-based deduplication, and the
// `/leads` REST surface.

pub mod dedup;
pub mod handlers;
pub mod parser;

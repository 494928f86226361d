pub mod lead;
pub mod tenant;

pub mod paths;
pub mod range;

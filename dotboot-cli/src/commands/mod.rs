pub mod common;
pub mod identity;
pub mod refs;
pub mod rewrite;

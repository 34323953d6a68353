pub mod db;
pub mod parallel;

// Re-export all from each module namespace
pub use db::*;
pub use parallel::*;

pub mod error;
pub mod executor;
pub mod operators;
pub mod plan;
pub mod planner;
pub mod range;

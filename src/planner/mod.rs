pub mod batch_planner;
pub mod report;

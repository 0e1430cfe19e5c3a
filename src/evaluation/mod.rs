pub mod overlap;
pub mod report;
pub mod retrieval;

pub mod aggregator;
pub mod recommendation;
pub mod recorder;
pub mod store;

//! Terminal reducers and per-group aggregators.

pub mod traits;
pub mod aggregate;
pub mod group;
pub mod collect;

pub use traits::Reducer;
pub use aggregate::Aggregator;
pub use group::GroupBy;
pub use collect::Collect;

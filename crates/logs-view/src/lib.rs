//! View layer over the log streams: aggregation of incidental tool activity,
//! per-entry expansion state, and the [`LogPipeline`] that derives views.
//!
//! The presentation layer owns one [`ExpansionResolver`] per rendered view and
//! calls [`ExpansionResolver::set_context`] when the view switches process.

pub mod aggregate;
pub mod expansion;
pub mod pipeline;

pub use aggregate::{
    AggregatableEntry, AggregatedEntryGroup, AggregationType, DisplayEntry, aggregate_entries,
    flatten_display_entries,
};
pub use expansion::{ExpansionResolver, ExpansionState, default_expanded};
pub use pipeline::{LogPipeline, LogView};

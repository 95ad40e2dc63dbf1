//! Stylesheet tracking: precedence, caching and aggregation.

mod aggregator;
mod cache;
mod priority;
mod source;

pub use aggregator::{CssAggregator, flatten};
pub use cache::{StylesheetCache, StylesheetEntry};
pub use priority::{
    COMPONENT_PRIORITY, LAYOUT_PRIORITY, PACKAGE_PRIORITY, ROUTE_PRIORITY, UNRECOGNIZED_PRIORITY,
    priority,
};
pub use source::CssSource;

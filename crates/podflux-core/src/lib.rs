pub mod aggregate;
pub mod clock;
pub mod config;
pub mod error;
pub mod feed;
pub mod gap_filler;
pub mod pipeline;
pub mod replacement;
pub mod schema;
pub mod series;
pub mod transport;

pub use podflux_parser::IntervalSpec;

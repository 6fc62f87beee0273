pub mod errors;
pub mod formats;
pub mod interval;
pub mod model;

pub use errors::ParserError;
pub use formats::{DataloggerFormat, DataloggerParser, HubFormat, HubParser};
pub use interval::IntervalSpec;
pub use model::{round_kwh, DeltaSeries, HubReading, HubSnapshot, SeriesOrigin};

#[cfg(test)]
mod tests;

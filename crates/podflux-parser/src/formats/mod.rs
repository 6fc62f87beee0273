mod common;
mod datalogger;
mod hub;

pub use datalogger::{DataloggerFormat, DataloggerParser};
pub use hub::{HubFormat, HubParser};

pub mod report;
pub mod result;

pub use report::{Metric, Timings};
pub use result::HttpStat;

pub mod util;

pub use util::{parse_seed, report_timestamp, split_csv};

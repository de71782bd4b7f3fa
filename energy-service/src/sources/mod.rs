pub mod csv_upload;
pub mod timestamp;

pub use csv_upload::CsvUploadSource;
pub use timestamp::{parse_timestamp, TimestampError};

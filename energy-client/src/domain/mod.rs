pub mod bucket;
pub mod energy_record;
pub mod owner;
pub mod upload_batch;

pub use bucket::{rollup, Bucket, BucketValue, Reducer};
pub use energy_record::EnergyRecord;
pub use owner::OwnerId;
pub use upload_batch::UploadBatch;

pub mod http;
mod progress_stream;

pub use http::{HttpMetadataStore, HttpUploader, StorageConfig, DEFAULT_TIMEOUT};
pub use progress_stream::ProgressStream;

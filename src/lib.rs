pub mod core;
pub mod uploaders;
pub mod utils;
pub mod config;

// 重新导出核心类型
pub use core::{
    FileCollector,
    ItemId,
    ItemStatus,
    ResumeLedger,
    SchedulerBuilder,
    SessionId,
    SessionStatus,
    UploadEvent,
    UploadItem,
    UploadScheduler,
    UploadSession,
    EngineError,
    TransferError,
    Result,
};

// 重新导出上传器
pub use uploaders::{HttpMetadataStore, HttpUploader, StorageConfig};

#[cfg(test)]
mod tests;

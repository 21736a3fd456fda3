mod collector;
mod errors;
mod ledger;
mod progress;
mod queue;
mod scheduler;
mod session;
mod session_worker;
mod store;
mod traits;
mod types;
mod worker;

#[cfg(test)]
mod tests;

pub use collector::{DirectoryReader, Entry, FileCollector, LocalDirectory, RawFile};
pub use errors::{CollectionError, EngineError, PersistenceError, Result, TransferError};
pub use ledger::ResumeLedger;
pub use progress::{eta_seconds, folder_groups, percent, throughput, SessionStats};
pub use scheduler::{
    FilteredEventReceiver,
    SchedulerBuilder,
    SchedulerConfig,
    SchedulerHandle,
    UploadScheduler,
    DEFAULT_CONCURRENCY,
};
pub use session::{ItemPatch, Transition, UploadSession};
pub use store::{JsonFileStore, MemoryStore};
pub use traits::{MetadataStore, ProgressFn, ResumeStore, StaticToken, TokenProvider, Uploader};
pub use types::{
    storage_key,
    FileRecord,
    FileSource,
    ItemId,
    ItemStatus,
    ResumeRecord,
    SessionId,
    SessionStatus,
    StoredObject,
    TransferRequest,
    UploadEvent,
    UploadItem,
};

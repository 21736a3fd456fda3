use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use chrono::Utc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use super::errors::TransferError;
use super::ledger::ResumeLedger;
use super::queue::WorkQueue;
use super::traits::{MetadataStore, ProgressFn, Uploader};
use super::types::{storage_key, FileRecord, ItemId, SessionId, StoredObject, TransferRequest, UploadItem};

/// 一次运行（start/resume/retry）的上下文，持有取消令牌和暂停标志
#[derive(Clone)]
pub(crate) struct RunContext {
    pub run_id: u64,
    pub session_id: SessionId,
    pub cancel: CancellationToken,
    paused: Arc<AtomicBool>,
}

impl RunContext {
    pub fn new(run_id: u64, session_id: SessionId) -> Self {
        Self {
            run_id,
            session_id,
            cancel: CancellationToken::new(),
            paused: Arc::new(AtomicBool::new(false)),
        }
    }

    /// 暂停：停止取新任务并取消正在进行的传输
    pub fn pause(&self) {
        self.paused.store(true, Ordering::SeqCst);
        self.cancel.cancel();
    }

    /// 清空会话：结果不再写入断点记录和元数据库
    pub fn discard(&self) {
        self.cancel.cancel();
    }

    pub fn is_stopped(&self) -> bool {
        self.cancel.is_cancelled()
    }

    pub fn is_discarded(&self) -> bool {
        self.cancel.is_cancelled() && !self.paused.load(Ordering::SeqCst)
    }
}

/// worker 发给会话 actor 的消息
#[derive(Debug)]
pub(crate) enum WorkerMessage {
    Started {
        run_id: u64,
        item_id: ItemId,
    },
    Progress {
        run_id: u64,
        item_id: ItemId,
        uploaded_bytes: u64,
    },
    Finished {
        run_id: u64,
        item_id: ItemId,
        outcome: Result<StoredObject, TransferError>,
    },
    Exited {
        run_id: u64,
    },
}

/// 一个并发通道：从共享队列取任务直到队列为空或运行被停止
pub(crate) struct TransferWorker {
    pub(crate) lane: usize,
    pub(crate) ctx: RunContext,
    pub(crate) queue: WorkQueue,
    pub(crate) uploader: Arc<dyn Uploader>,
    pub(crate) ledger: ResumeLedger,
    pub(crate) metadata: Option<Arc<dyn MetadataStore>>,
    pub(crate) collection_id: String,
    pub(crate) uploaded_by: Option<String>,
    pub(crate) message_tx: mpsc::UnboundedSender<WorkerMessage>,
}

impl TransferWorker {
    pub async fn run(self) {
        tracing::debug!(lane = self.lane, run = self.ctx.run_id, "worker started");

        while !self.ctx.is_stopped() {
            let Some(item) = self.queue.pop() else { break };
            self.upload(item).await;
        }

        tracing::debug!(lane = self.lane, run = self.ctx.run_id, "worker exited");
        let _ = self.message_tx.send(WorkerMessage::Exited { run_id: self.ctx.run_id });
    }

    async fn upload(&self, item: UploadItem) {
        let run_id = self.ctx.run_id;
        let _ = self.message_tx.send(WorkerMessage::Started {
            run_id,
            item_id: item.id.clone(),
        });

        let key = storage_key(&self.collection_id, Utc::now().timestamp_millis(), &item.relative_path);
        let progress: ProgressFn = {
            let message_tx = self.message_tx.clone();
            let item_id = item.id.clone();
            Arc::new(move |uploaded_bytes| {
                let _ = message_tx.send(WorkerMessage::Progress {
                    run_id,
                    item_id: item_id.clone(),
                    uploaded_bytes,
                });
            })
        };

        let request = TransferRequest {
            key: &key,
            source: &item.source,
            size: item.total_bytes,
            content_type: item.mime_type.as_deref(),
        };

        // 传输结果优先，已经完成的上传不会被当成暂停
        let outcome = tokio::select! {
            biased;
            result = self.uploader.transfer(request, progress, self.ctx.cancel.clone()) => result,
            _ = self.ctx.cancel.cancelled() => Err(TransferError::Cancelled),
        };

        match outcome {
            Ok(object) => {
                tracing::info!(lane = self.lane, item = %item.id, key = %object.storage_key, "file uploaded");

                let discarded = self.ctx.is_discarded();
                if !discarded {
                    self.ledger.record_completed(&self.ctx.session_id, &item.id).await;
                }

                let url = object.url.clone();
                let _ = self.message_tx.send(WorkerMessage::Finished {
                    run_id,
                    item_id: item.id.clone(),
                    outcome: Ok(object),
                });

                if !discarded {
                    self.insert_record(&item, &url).await;
                }
            }
            Err(err) => {
                if err.is_cancelled() {
                    tracing::debug!(lane = self.lane, item = %item.id, "upload cancelled");
                } else {
                    tracing::warn!(lane = self.lane, item = %item.id, error = %err, "upload failed");
                }
                let _ = self.message_tx.send(WorkerMessage::Finished {
                    run_id,
                    item_id: item.id,
                    outcome: Err(err),
                });
            }
        }
    }

    /// 元数据写入失败不回滚已经完成的上传
    async fn insert_record(&self, item: &UploadItem, url: &str) {
        let Some(metadata) = &self.metadata else { return };

        let record = FileRecord::for_item(item, &self.collection_id, self.uploaded_by.as_deref(), url);
        if let Err(err) = metadata.insert(&record).await {
            tracing::error!(item = %item.id, error = %err, "failed to insert file record");
        }
    }
}

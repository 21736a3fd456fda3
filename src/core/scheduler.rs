use std::sync::Arc;
use chrono::Utc;
use tokio::sync::{broadcast, mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use super::errors::{EngineError, Result};
use super::ledger::ResumeLedger;
use super::progress::SessionStats;
use super::session::UploadSession;
use super::session_worker::{Command, SessionWorker};
use super::traits::{MetadataStore, Uploader};
use super::types::{SessionId, UploadEvent, UploadItem};

/// 默认并发上传数
pub const DEFAULT_CONCURRENCY: usize = 3;

#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    /// 同时进行的传输数量上限
    pub concurrency: usize,
    /// 存储路径前缀，同时作为元数据记录的 parent id
    pub collection_id: String,
    pub uploaded_by: Option<String>,
    /// 恢复之前的会话，None 时在第一次启动时生成
    pub session_id: Option<SessionId>,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            concurrency: DEFAULT_CONCURRENCY,
            collection_id: "default".to_string(),
            uploaded_by: None,
            session_id: None,
        }
    }
}

pub struct SchedulerBuilder {
    uploader: Arc<dyn Uploader>,
    config: SchedulerConfig,
    ledger: Option<ResumeLedger>,
    metadata: Option<Arc<dyn MetadataStore>>,
}

impl SchedulerBuilder {
    pub fn new(uploader: Arc<dyn Uploader>) -> Self {
        Self {
            uploader,
            config: SchedulerConfig::default(),
            ledger: None,
            metadata: None,
        }
    }

    pub fn config(mut self, config: SchedulerConfig) -> Self {
        self.config = config;
        self
    }

    pub fn concurrency(mut self, concurrency: usize) -> Self {
        self.config.concurrency = concurrency;
        self
    }

    pub fn collection_id(mut self, collection_id: impl Into<String>) -> Self {
        self.config.collection_id = collection_id.into();
        self
    }

    pub fn uploaded_by(mut self, uploaded_by: impl Into<String>) -> Self {
        self.config.uploaded_by = Some(uploaded_by.into());
        self
    }

    /// 使用之前的 session id，断点记录中已完成的条目会被跳过
    pub fn resume_session(mut self, session_id: SessionId) -> Self {
        self.config.session_id = Some(session_id);
        self
    }

    pub fn ledger(mut self, ledger: ResumeLedger) -> Self {
        self.ledger = Some(ledger);
        self
    }

    pub fn metadata_store(mut self, metadata: Arc<dyn MetadataStore>) -> Self {
        self.metadata = Some(metadata);
        self
    }

    /// 启动会话 actor，必须在 tokio 运行时中调用
    pub fn spawn(self) -> SchedulerHandle {
        let (command_tx, command_rx) = mpsc::channel(100);
        // 最大缓存 256 个事件
        let (event_tx, _) = broadcast::channel(256);
        let (snapshot_tx, snapshot_rx) = watch::channel(UploadSession::new());

        let worker_handle = tokio::spawn(SessionWorker::run(
            self.config,
            self.uploader,
            self.ledger.unwrap_or_else(ResumeLedger::in_memory),
            self.metadata,
            command_rx,
            snapshot_tx,
            event_tx.clone(),
        ));

        SchedulerHandle {
            scheduler: UploadScheduler {
                command_tx,
                snapshot_rx,
                event_tx,
            },
            worker_handle,
        }
    }
}

/// 调度器句柄 - 包含调度器和会话 actor 任务
pub struct SchedulerHandle {
    pub scheduler: UploadScheduler,
    pub worker_handle: JoinHandle<()>,
}

impl SchedulerHandle {
    /// 关闭 actor，正在进行的传输会被取消
    pub async fn shutdown(self) -> Result<()> {
        drop(self.scheduler);
        self.worker_handle.await.map_err(|err| {
            tracing::error!(error = %err, "session worker panicked");
            EngineError::ManagerShutdown
        })
    }
}

/// 上传调度器
///
/// 所有方法都通过命令发送给会话 actor，可以在多个任务间克隆使用。
#[derive(Clone)]
pub struct UploadScheduler {
    command_tx: mpsc::Sender<Command>,
    snapshot_rx: watch::Receiver<UploadSession>,
    event_tx: broadcast::Sender<UploadEvent>,
}

impl UploadScheduler {
    /// 添加条目，只能在会话开始前调用
    pub async fn add_items(&self, items: Vec<UploadItem>) -> Result<usize> {
        self.request(|reply| Command::AddItems { items, reply }).await?
    }

    /// 开始上传，返回会话 id
    pub async fn start_upload(&self) -> Result<SessionId> {
        self.request(|reply| Command::Start { reply }).await?
    }

    /// 暂停上传
    ///
    /// 返回时所有正在进行的传输都已经停止，没有条目处于 Uploading。
    pub async fn pause_upload(&self) -> Result<UploadSession> {
        self.request(|reply| Command::Pause { reply }).await?
    }

    /// 继续上传暂停和失败的条目
    pub async fn resume_upload(&self) -> Result<SessionId> {
        self.request(|reply| Command::Resume { reply }).await?
    }

    /// 只重新上传失败的条目，进度清零
    pub async fn retry_failed(&self) -> Result<SessionId> {
        self.request(|reply| Command::RetryFailed { reply }).await?
    }

    /// 丢弃会话和断点记录
    pub async fn clear_session(&self) -> Result<()> {
        self.request(|reply| Command::Clear { reply }).await?
    }

    /// 等待当前这一轮 worker 全部退出，返回最终快照
    pub async fn wait_settled(&self) -> Result<UploadSession> {
        self.request(|reply| Command::WaitSettled { reply }).await
    }

    /// 最新的会话快照
    pub fn snapshot(&self) -> UploadSession {
        self.snapshot_rx.borrow().clone()
    }

    pub fn stats(&self) -> SessionStats {
        SessionStats::from_session(&self.snapshot_rx.borrow(), Utc::now())
    }

    /// 订阅快照变化
    pub fn subscribe(&self) -> watch::Receiver<UploadSession> {
        self.snapshot_rx.clone()
    }

    /// 订阅事件
    ///
    /// 接收速度跟不上时会丢失事件（lagged error），快照不受影响。
    pub fn subscribe_events(&self) -> broadcast::Receiver<UploadEvent> {
        self.event_tx.subscribe()
    }

    pub fn subscribe_filtered<F>(&self, filter: F) -> FilteredEventReceiver<F>
    where
        F: Fn(&UploadEvent) -> bool,
    {
        FilteredEventReceiver {
            receiver: self.event_tx.subscribe(),
            filter,
        }
    }

    async fn request<T>(&self, command: impl FnOnce(oneshot::Sender<T>) -> Command) -> Result<T> {
        let (reply_tx, reply_rx) = oneshot::channel();

        self.command_tx
            .send(command(reply_tx))
            .await
            .map_err(|_| EngineError::ManagerShutdown)?;

        reply_rx.await.map_err(|_| EngineError::ManagerShutdown)
    }
}

/// 过滤的事件接收器
pub struct FilteredEventReceiver<F> {
    receiver: broadcast::Receiver<UploadEvent>,
    filter: F,
}

impl<F> FilteredEventReceiver<F>
where
    F: Fn(&UploadEvent) -> bool,
{
    pub async fn recv(&mut self) -> Result<UploadEvent, broadcast::error::RecvError> {
        loop {
            let event = self.receiver.recv().await?;
            if (self.filter)(&event) {
                return Ok(event);
            }
        }
    }
}

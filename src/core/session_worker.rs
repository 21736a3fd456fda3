use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc, oneshot, watch};
use super::errors::{EngineError, Result};
use super::ledger::ResumeLedger;
use super::queue::WorkQueue;
use super::scheduler::SchedulerConfig;
use super::session::{ItemPatch, Transition, UploadSession};
use super::traits::{MetadataStore, Uploader};
use super::types::{ItemId, ItemStatus, SessionId, SessionStatus, UploadEvent, UploadItem};
use super::worker::{RunContext, TransferWorker, WorkerMessage};

/// 一次最多连续处理的 worker 消息数，之后回到主循环处理命令
const MAX_MESSAGE_BATCH: usize = 1024;

/// 调度器命令
pub(crate) enum Command {
    /// 追加条目（仅 Idle）
    AddItems {
        items: Vec<UploadItem>,
        reply: oneshot::Sender<Result<usize>>,
    },

    Start {
        reply: oneshot::Sender<Result<SessionId>>,
    },

    /// 在所有传输退出后回复
    Pause {
        reply: oneshot::Sender<Result<UploadSession>>,
    },

    Resume {
        reply: oneshot::Sender<Result<SessionId>>,
    },

    RetryFailed {
        reply: oneshot::Sender<Result<SessionId>>,
    },

    Clear {
        reply: oneshot::Sender<Result<()>>,
    },

    /// 等待当前 worker 池全部退出
    WaitSettled {
        reply: oneshot::Sender<UploadSession>,
    },
}

/// 会话 actor：唯一持有 `UploadSession` 的任务
///
/// 所有修改都在这里串行应用，每条命令或消息处理完后发布一次完整快照。
pub(crate) struct SessionWorker {
    config: SchedulerConfig,
    uploader: Arc<dyn Uploader>,
    ledger: ResumeLedger,
    metadata: Option<Arc<dyn MetadataStore>>,

    session: UploadSession,
    run: Option<RunContext>,
    next_run_id: u64,
    active_workers: usize,

    /// 上一轮 worker 尚未退出时到达的 resume/retry
    pending_launches: Vec<oneshot::Sender<Result<SessionId>>>,
    pause_waiters: Vec<oneshot::Sender<Result<UploadSession>>>,
    settle_waiters: Vec<oneshot::Sender<UploadSession>>,

    snapshot_tx: watch::Sender<UploadSession>,
    event_tx: broadcast::Sender<UploadEvent>,
    message_tx: mpsc::UnboundedSender<WorkerMessage>,
}

impl SessionWorker {
    pub(crate) async fn run(
        config: SchedulerConfig,
        uploader: Arc<dyn Uploader>,
        ledger: ResumeLedger,
        metadata: Option<Arc<dyn MetadataStore>>,
        mut command_rx: mpsc::Receiver<Command>,
        snapshot_tx: watch::Sender<UploadSession>,
        event_tx: broadcast::Sender<UploadEvent>,
    ) {
        let (message_tx, mut message_rx) = mpsc::unbounded_channel();
        let mut worker = Self {
            config,
            uploader,
            ledger,
            metadata,
            session: UploadSession::new(),
            run: None,
            next_run_id: 0,
            active_workers: 0,
            pending_launches: Vec::new(),
            pause_waiters: Vec::new(),
            settle_waiters: Vec::new(),
            snapshot_tx,
            event_tx,
            message_tx,
        };

        // 主事件循环
        loop {
            tokio::select! {
                command = command_rx.recv() => match command {
                    Some(command) => worker.handle_command(command).await,
                    None => break,
                },
                Some(message) = message_rx.recv() => {
                    worker.handle_messages(message, &mut message_rx).await;
                }
            }

            worker.publish();
        }

        if let Some(run) = worker.run.take() {
            run.discard();
        }
        tracing::debug!("session worker shut down");
    }

    async fn handle_command(&mut self, command: Command) {
        match command {
            Command::AddItems { items, reply } => {
                let result = self.add_items(items);
                self.publish();
                let _ = reply.send(result);
            }
            Command::Start { reply } => {
                match self.check_start() {
                    Ok(()) => self.request_launch(reply).await,
                    Err(err) => {
                        let _ = reply.send(Err(err));
                    }
                }
            }
            Command::Pause { reply } => {
                match self.pause() {
                    Ok(()) if self.active_workers > 0 => self.pause_waiters.push(reply),
                    Ok(()) => {
                        self.publish();
                        let _ = reply.send(Ok(self.session.clone()));
                    }
                    Err(err) => {
                        let _ = reply.send(Err(err));
                    }
                }
            }
            Command::Resume { reply } => {
                match self.requeue_for_resume() {
                    Ok(()) => self.request_launch(reply).await,
                    Err(err) => {
                        let _ = reply.send(Err(err));
                    }
                }
            }
            Command::RetryFailed { reply } => {
                match self.requeue_failed() {
                    Ok(true) => self.request_launch(reply).await,
                    Ok(false) => {
                        let _ = reply.send(self.current_session_id());
                    }
                    Err(err) => {
                        let _ = reply.send(Err(err));
                    }
                }
            }
            Command::Clear { reply } => {
                self.clear().await;
                self.publish();
                let _ = reply.send(Ok(()));
            }
            Command::WaitSettled { reply } => {
                if self.is_settled() {
                    let _ = reply.send(self.session.clone());
                } else {
                    self.settle_waiters.push(reply);
                }
            }
        }
    }

    /// 处理一条消息以及已经排队的消息，之后只发布一次快照
    ///
    /// 进度消息按条目合并，只应用最新值；其它消息之前先应用已合并的进度。
    async fn handle_messages(
        &mut self,
        first: WorkerMessage,
        message_rx: &mut mpsc::UnboundedReceiver<WorkerMessage>,
    ) {
        let mut progress = ProgressBatch::default();
        let mut next = Some(first);
        let mut handled = 0;

        while let Some(message) = next.take() {
            match message {
                WorkerMessage::Progress { run_id, item_id, uploaded_bytes } => {
                    progress.push(run_id, item_id, uploaded_bytes);
                }
                other => {
                    self.apply_progress(&mut progress);
                    self.handle_message(other).await;
                }
            }

            handled += 1;
            if handled < MAX_MESSAGE_BATCH {
                next = message_rx.try_recv().ok();
            }
        }

        self.apply_progress(&mut progress);
    }

    fn apply_progress(&mut self, progress: &mut ProgressBatch) {
        for (item_id, (run_id, uploaded_bytes)) in progress.drain() {
            if self.is_current_run(run_id) {
                self.patch(&item_id, ItemPatch::Progress { uploaded_bytes });
            }
        }
    }

    async fn handle_message(&mut self, message: WorkerMessage) {
        match message {
            WorkerMessage::Started { run_id, item_id } => {
                // 暂停后才到达的开始消息：条目保持 Pending
                if self.is_live_run(run_id) {
                    self.patch(&item_id, ItemPatch::Started);
                }
            }
            WorkerMessage::Progress { run_id, item_id, uploaded_bytes } => {
                let mut progress = ProgressBatch::default();
                progress.push(run_id, item_id, uploaded_bytes);
                self.apply_progress(&mut progress);
            }
            WorkerMessage::Finished { run_id, .. } if !self.is_current_run(run_id) => {
                // 已经清空的运行
                tracing::debug!(run = run_id, "ignoring result from a discarded run");
            }
            WorkerMessage::Finished { item_id, outcome, .. } => match outcome {
                Ok(object) => {
                    let patch = ItemPatch::Completed {
                        storage_path: object.storage_key,
                        result_url: object.url,
                    };
                    if self.patch(&item_id, patch).is_some() {
                        if let Some(item) = self.session.item(&item_id) {
                            let _ = self.event_tx.send(UploadEvent::FileCompleted(item.clone()));
                        }
                    }
                }
                Err(err) if err.is_cancelled() => {
                    self.patch(&item_id, ItemPatch::Paused);
                }
                Err(err) => {
                    // 已经被暂停的条目保持 Paused
                    self.patch(&item_id, ItemPatch::Failed { reason: err.to_string() });
                }
            },
            WorkerMessage::Exited { run_id } => {
                self.active_workers = self.active_workers.saturating_sub(1);
                tracing::trace!(run = run_id, active = self.active_workers, "worker lane finished");
                if self.active_workers == 0 {
                    self.on_workers_drained().await;
                }
            }
        }
    }

    fn add_items(&mut self, items: Vec<UploadItem>) -> Result<usize> {
        if self.session.status() != SessionStatus::Idle {
            return Err(EngineError::invalid_state("items can only be added while idle"));
        }

        let count = items.len();
        self.session.append(items);
        tracing::debug!(added = count, total = self.session.total_files(), "items added");
        Ok(count)
    }

    fn check_start(&self) -> Result<()> {
        if self.session.status() != SessionStatus::Idle {
            return Err(EngineError::invalid_state(format!(
                "cannot start session in state {:?}",
                self.session.status()
            )));
        }
        if self.session.items().is_empty() {
            return Err(EngineError::EmptySession);
        }
        Ok(())
    }

    fn pause(&mut self) -> Result<()> {
        if self.session.status() != SessionStatus::Uploading {
            return Err(EngineError::invalid_state(format!(
                "cannot pause session in state {:?}",
                self.session.status()
            )));
        }

        if let Some(run) = &self.run {
            run.pause();
        }
        for reply in self.pending_launches.drain(..) {
            let _ = reply.send(Err(EngineError::invalid_state("paused before workers restarted")));
        }

        self.session.set_status(SessionStatus::Paused);
        for id in self.session.ids_with_status(ItemStatus::Uploading) {
            self.patch(&id, ItemPatch::Paused);
        }

        tracing::info!(session = ?self.session.session_id(), "upload paused");
        Ok(())
    }

    fn requeue_for_resume(&mut self) -> Result<()> {
        if !matches!(self.session.status(), SessionStatus::Paused | SessionStatus::Error) {
            return Err(EngineError::invalid_state(format!(
                "cannot resume session in state {:?}",
                self.session.status()
            )));
        }

        let mut ids = self.session.ids_with_status(ItemStatus::Paused);
        ids.extend(self.session.ids_with_status(ItemStatus::Failed));
        for id in ids {
            self.patch(&id, ItemPatch::Requeued { reset_progress: false });
        }
        self.session.set_status(SessionStatus::Uploading);
        Ok(())
    }

    /// 返回是否有失败条目需要重新上传
    fn requeue_failed(&mut self) -> Result<bool> {
        if matches!(self.session.status(), SessionStatus::Idle | SessionStatus::Uploading) {
            return Err(EngineError::invalid_state(format!(
                "cannot retry failed items in state {:?}",
                self.session.status()
            )));
        }

        let ids = self.session.ids_with_status(ItemStatus::Failed);
        if ids.is_empty() {
            return Ok(false);
        }
        for id in ids {
            self.patch(&id, ItemPatch::Requeued { reset_progress: true });
        }
        self.session.set_status(SessionStatus::Uploading);
        Ok(true)
    }

    async fn clear(&mut self) {
        if let Some(run) = self.run.take() {
            run.discard();
        }
        for reply in self.pending_launches.drain(..) {
            let _ = reply.send(Err(EngineError::invalid_state("session cleared")));
        }
        if let Some(session_id) = self.session.session_id() {
            self.ledger.delete(session_id).await;
        }

        self.session = UploadSession::new();
        tracing::info!("session cleared");
    }

    async fn request_launch(&mut self, reply: oneshot::Sender<Result<SessionId>>) {
        if self.active_workers > 0 {
            // 等上一轮的取消全部退出后再启动
            self.pending_launches.push(reply);
            return;
        }

        let session_id = self.launch().await;
        self.publish();
        let _ = reply.send(Ok(session_id));
    }

    /// 读取断点记录，跳过已完成的条目，启动 worker 池
    async fn launch(&mut self) -> SessionId {
        let session_id = match self.session.session_id() {
            Some(session_id) => session_id.clone(),
            None => {
                let session_id = self
                    .config
                    .session_id
                    .take()
                    .unwrap_or_else(|| SessionId::generate(&self.config.collection_id));
                self.session.set_session_id(session_id.clone());
                session_id
            }
        };

        let completed: HashSet<ItemId> = self.ledger.load(&session_id).await.into_iter().collect();
        for (id, transition) in self.session.restore_completed(&completed) {
            self.emit_transition(&id, transition);
        }
        self.session.set_status(SessionStatus::Uploading);

        let pending: Vec<UploadItem> = self
            .session
            .items()
            .iter()
            .filter(|item| item.status == ItemStatus::Pending)
            .cloned()
            .collect();

        if pending.is_empty() {
            self.finish_run().await;
            return session_id;
        }

        self.next_run_id += 1;
        let ctx = RunContext::new(self.next_run_id, session_id.clone());
        let queue = WorkQueue::new(pending);
        let lanes = self.config.concurrency.max(1).min(queue.len());

        tracing::info!(
            session = %session_id,
            run = ctx.run_id,
            queued = queue.len(),
            restored = completed.len(),
            lanes,
            "starting upload workers"
        );

        for lane in 0..lanes {
            let worker = TransferWorker {
                lane,
                ctx: ctx.clone(),
                queue: queue.clone(),
                uploader: self.uploader.clone(),
                ledger: self.ledger.clone(),
                metadata: self.metadata.clone(),
                collection_id: self.config.collection_id.clone(),
                uploaded_by: self.config.uploaded_by.clone(),
                message_tx: self.message_tx.clone(),
            };
            tokio::spawn(worker.run());
        }

        self.active_workers += lanes;
        self.run = Some(ctx);
        session_id
    }

    async fn on_workers_drained(&mut self) {
        self.run = None;
        self.finish_run().await;
        self.publish();

        for reply in self.pause_waiters.drain(..) {
            let _ = reply.send(Ok(self.session.clone()));
        }

        if !self.pending_launches.is_empty() {
            let session_id = self.launch().await;
            self.publish();
            for reply in self.pending_launches.drain(..) {
                let _ = reply.send(Ok(session_id.clone()));
            }
        }

        if self.is_settled() {
            for reply in self.settle_waiters.drain(..) {
                let _ = reply.send(self.session.clone());
            }
        }
    }

    /// 一轮运行结束后的会话状态
    async fn finish_run(&mut self) {
        match self.session.status() {
            SessionStatus::Uploading => {
                // 还有暂停的条目（例如只重试了失败的条目）
                self.session.set_status(SessionStatus::Paused);
            }
            SessionStatus::Completed => {
                if let Some(session_id) = self.session.session_id() {
                    self.ledger.delete(session_id).await;
                }
                tracing::info!(
                    session = ?self.session.session_id(),
                    files = self.session.completed_files(),
                    bytes = self.session.uploaded_bytes(),
                    "upload session completed"
                );
                let _ = self.event_tx.send(UploadEvent::SessionFinished(self.session.clone()));
            }
            SessionStatus::Error => {
                tracing::warn!(
                    session = ?self.session.session_id(),
                    completed = self.session.completed_files(),
                    failed = self.session.failed_files(),
                    "upload session finished with failures"
                );
                let _ = self.event_tx.send(UploadEvent::SessionFinished(self.session.clone()));
            }
            SessionStatus::Paused | SessionStatus::Idle => {}
        }
    }

    fn patch(&mut self, id: &ItemId, patch: ItemPatch) -> Option<Transition> {
        let transition = self.session.apply(id, patch)?;
        self.emit_transition(id, transition);
        Some(transition)
    }

    fn emit_transition(&self, id: &ItemId, transition: Transition) {
        if transition.old_status == transition.new_status {
            return;
        }
        let _ = self.event_tx.send(UploadEvent::StateChanged {
            item_id: id.clone(),
            old_status: transition.old_status,
            new_status: transition.new_status,
        });
    }

    fn current_session_id(&self) -> Result<SessionId> {
        self.session
            .session_id()
            .cloned()
            .ok_or_else(|| EngineError::invalid_state("session has not been started"))
    }

    fn is_current_run(&self, run_id: u64) -> bool {
        self.run.as_ref().is_some_and(|run| run.run_id == run_id)
    }

    fn is_live_run(&self, run_id: u64) -> bool {
        self.run
            .as_ref()
            .is_some_and(|run| run.run_id == run_id && !run.is_stopped())
    }

    fn is_settled(&self) -> bool {
        self.active_workers == 0 && self.pending_launches.is_empty()
    }

    fn publish(&self) {
        self.snapshot_tx.send_replace(self.session.clone());
    }
}

/// 按条目合并的进度：`item -> (run_id, uploaded_bytes)`
#[derive(Default)]
struct ProgressBatch {
    latest: HashMap<ItemId, (u64, u64)>,
}

impl ProgressBatch {
    fn push(&mut self, run_id: u64, item_id: ItemId, uploaded_bytes: u64) {
        let entry = self.latest.entry(item_id).or_insert((run_id, uploaded_bytes));
        if entry.0 != run_id || entry.1 < uploaded_bytes {
            *entry = (run_id, uploaded_bytes);
        }
    }

    fn drain(&mut self) -> impl Iterator<Item = (ItemId, (u64, u64))> + '_ {
        self.latest.drain()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;
    use async_trait::async_trait;
    use bytes::Bytes;
    use tokio_util::sync::CancellationToken;
    use crate::core::*;

    /// 立即成功的上传器
    struct InstantUploader;

    #[async_trait]
    impl Uploader for InstantUploader {
        async fn transfer(
            &self,
            request: TransferRequest<'_>,
            progress: ProgressFn,
            _cancel: CancellationToken,
        ) -> std::result::Result<StoredObject, TransferError> {
            progress(request.size);
            Ok(StoredObject {
                storage_key: request.key.to_string(),
                url: format!("mem://{}", request.key),
            })
        }
    }

    fn items(count: usize) -> Vec<UploadItem> {
        (0..count)
            .map(|i| UploadItem::new(format!("docs/f{}.txt", i), 4, FileSource::Bytes(Bytes::from_static(b"data"))))
            .collect()
    }

    fn scheduler() -> SchedulerHandle {
        SchedulerBuilder::new(Arc::new(InstantUploader))
            .collection_id("c1")
            .spawn()
    }

    #[tokio::test]
    async fn test_start_empty_session() {
        let handle = scheduler();
        let err = handle.scheduler.start_upload().await.unwrap_err();
        assert!(matches!(err, EngineError::EmptySession));
        handle.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_invalid_commands_in_idle() {
        let handle = scheduler();
        let scheduler = handle.scheduler.clone();

        assert!(matches!(scheduler.pause_upload().await, Err(EngineError::InvalidState(_))));
        assert!(matches!(scheduler.resume_upload().await, Err(EngineError::InvalidState(_))));
        assert!(matches!(scheduler.retry_failed().await, Err(EngineError::InvalidState(_))));

        drop(scheduler);
        handle.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_completed_session() {
        let handle = scheduler();
        let scheduler = handle.scheduler.clone();
        let mut events = scheduler.subscribe_filtered(|event| matches!(event, UploadEvent::SessionFinished(_)));

        assert_eq!(scheduler.add_items(items(4)).await.unwrap(), 4);
        let session_id = scheduler.start_upload().await.unwrap();
        assert!(session_id.as_str().starts_with("upload_c1_"));

        let session = scheduler.wait_settled().await.unwrap();
        assert_eq!(session.status(), SessionStatus::Completed);
        assert_eq!(session.completed_files(), 4);
        assert_eq!(session.uploaded_bytes(), 16);
        assert_eq!(session.session_id(), Some(&session_id));

        for item in session.items() {
            let path = item.storage_path.as_deref().unwrap();
            assert!(path.starts_with("c1/"));
            assert!(path.ends_with(&item.relative_path));
            assert_eq!(item.result_url.as_deref(), Some(format!("mem://{}", path).as_str()));
        }

        let finished = tokio::time::timeout(Duration::from_secs(1), events.recv()).await.unwrap().unwrap();
        assert!(matches!(finished, UploadEvent::SessionFinished(s) if s.status() == SessionStatus::Completed));

        // 快照与 wait_settled 的结果一致
        assert_eq!(scheduler.snapshot().completed_files(), 4);
        assert_eq!(scheduler.stats().overall_progress, 100);

        // 完成后不能再添加或暂停
        assert!(matches!(scheduler.add_items(items(1)).await, Err(EngineError::InvalidState(_))));
        assert!(matches!(scheduler.pause_upload().await, Err(EngineError::InvalidState(_))));

        drop(scheduler);
        handle.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_clear_session() {
        let handle = scheduler();
        let scheduler = handle.scheduler.clone();

        scheduler.add_items(items(2)).await.unwrap();
        scheduler.start_upload().await.unwrap();
        scheduler.wait_settled().await.unwrap();

        scheduler.clear_session().await.unwrap();
        let session = scheduler.snapshot();
        assert_eq!(session.status(), SessionStatus::Idle);
        assert!(session.items().is_empty());
        assert!(session.session_id().is_none());

        // 清空后可以开始新的会话
        scheduler.add_items(items(1)).await.unwrap();
        scheduler.start_upload().await.unwrap();
        assert_eq!(scheduler.wait_settled().await.unwrap().completed_files(), 1);

        drop(scheduler);
        handle.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_shutdown_closes_handles() {
        let handle = scheduler();
        let scheduler = handle.scheduler.clone();
        let (command_tx_owner, worker) = (handle.scheduler, handle.worker_handle);

        drop(command_tx_owner);
        // 还有一个句柄存活，actor 继续运行
        assert!(!worker.is_finished());

        drop(scheduler);
        worker.await.unwrap();
    }

    #[test]
    fn test_format_utils() {
        use crate::utils::{format_bytes, format_duration, format_eta, format_speed};

        assert_eq!(format_bytes(1024), "1.00 KB");
        assert_eq!(format_bytes(1048576), "1.00 MB");
        assert_eq!(format_bytes(1073741824), "1.00 GB");

        assert_eq!(format_speed(1024.0), "1.00 KB/s");
        assert_eq!(format_speed(1048576.0), "1.00 MB/s");

        assert_eq!(format_duration(Duration::from_secs(59)), "59s");
        assert_eq!(format_duration(Duration::from_secs(120)), "2m 0s");
        assert_eq!(format_duration(Duration::from_secs(3661)), "1h 1m 1s");

        assert_eq!(format_eta(None), "--");
        assert_eq!(format_eta(Some(61)), "1m 1s");
    }

    #[test]
    fn test_format_stats() {
        use crate::utils::format_stats;

        let stats = SessionStats {
            overall_progress: 42,
            speed: 1024.0,
            eta: Some(5),
            total_files: 10,
            pending: 5,
            uploading: 1,
            completed: 3,
            failed: 1,
            paused: 0,
        };
        assert_eq!(format_stats(&stats), "42% 3/10 files, 1 failed, 1.00 KB/s, eta 5s");
    }
}

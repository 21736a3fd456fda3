use super::*;

#[cfg(test)]
mod tests {
    use std::collections::HashSet;
    use bytes::Bytes;
    use super::{FileSource, ItemId, ItemPatch, ItemStatus, SessionStatus, UploadItem, UploadSession};

    fn session_with(sizes: &[u64]) -> (UploadSession, Vec<ItemId>) {
        let items: Vec<UploadItem> = sizes
            .iter()
            .enumerate()
            .map(|(i, size)| UploadItem::new(format!("f{}.bin", i), *size, FileSource::Bytes(Bytes::new())))
            .collect();
        let ids = items.iter().map(|item| item.id.clone()).collect();

        let mut session = UploadSession::new();
        session.append(items);
        (session, ids)
    }

    fn assert_aggregates(session: &UploadSession) {
        assert_eq!(session.total_files(), session.items().len());
        assert_eq!(session.completed_files(), session.count(ItemStatus::Completed));
        assert_eq!(session.failed_files(), session.count(ItemStatus::Failed));
        assert_eq!(session.total_bytes(), session.items().iter().map(|i| i.total_bytes).sum::<u64>());
        assert_eq!(session.uploaded_bytes(), session.items().iter().map(|i| i.uploaded_bytes).sum::<u64>());
    }

    #[test]
    fn test_item_state_transition() {
        let (mut session, ids) = session_with(&[100]);
        let id = &ids[0];
        session.set_status(SessionStatus::Uploading);

        // invalid
        assert!(session.apply(id, ItemPatch::Paused).is_none());
        assert!(session.apply(id, ItemPatch::Failed { reason: "x".into() }).is_none());
        assert!(session.apply(id, ItemPatch::Progress { uploaded_bytes: 10 }).is_none());

        // valid
        let t = session.apply(id, ItemPatch::Started).unwrap();
        assert_eq!((t.old_status, t.new_status), (ItemStatus::Pending, ItemStatus::Uploading));
        assert!(session.apply(id, ItemPatch::Started).is_none());

        let t = session.apply(id, ItemPatch::Paused).unwrap();
        assert_eq!(t.new_status, ItemStatus::Paused);

        let t = session.apply(id, ItemPatch::Requeued { reset_progress: false }).unwrap();
        assert_eq!((t.old_status, t.new_status), (ItemStatus::Paused, ItemStatus::Pending));

        session.apply(id, ItemPatch::Started).unwrap();
        session.apply(id, ItemPatch::Completed {
            storage_path: "c/1-f0.bin".into(),
            result_url: "http://x/c/1-f0.bin".into(),
        }).unwrap();

        // completed is terminal
        assert!(session.apply(id, ItemPatch::Started).is_none());
        assert!(session.apply(id, ItemPatch::Requeued { reset_progress: true }).is_none());
        assert!(session.apply(id, ItemPatch::Restored).is_none());
    }

    #[test]
    fn test_progress_is_monotonic_and_capped() {
        let (mut session, ids) = session_with(&[200]);
        let id = &ids[0];
        session.set_status(SessionStatus::Uploading);
        session.apply(id, ItemPatch::Started);

        session.apply(id, ItemPatch::Progress { uploaded_bytes: 100 });
        assert_eq!(session.item(id).unwrap().progress, 50);

        session.apply(id, ItemPatch::Progress { uploaded_bytes: 40 });
        assert_eq!(session.item(id).unwrap().uploaded_bytes, 100);
        assert_eq!(session.item(id).unwrap().progress, 50);

        session.apply(id, ItemPatch::Progress { uploaded_bytes: 999 });
        assert_eq!(session.item(id).unwrap().uploaded_bytes, 200);
        assert_eq!(session.item(id).unwrap().progress, 100);
        assert_aggregates(&session);
    }

    #[test]
    fn test_completion_fills_result_fields() {
        let (mut session, ids) = session_with(&[64]);
        session.set_status(SessionStatus::Uploading);
        session.apply(&ids[0], ItemPatch::Started);
        session.apply(&ids[0], ItemPatch::Completed {
            storage_path: "c/1-f0.bin".into(),
            result_url: "http://x/1".into(),
        });

        let item = session.item(&ids[0]).unwrap();
        assert_eq!(item.progress, 100);
        assert_eq!(item.uploaded_bytes, 64);
        assert_eq!(item.storage_path.as_deref(), Some("c/1-f0.bin"));
        assert_eq!(item.result_url.as_deref(), Some("http://x/1"));
        assert!(item.error.is_none());
        assert_eq!(session.status(), SessionStatus::Completed);
    }

    #[test]
    fn test_session_error_when_any_item_failed() {
        let (mut session, ids) = session_with(&[10, 20, 30]);
        session.set_status(SessionStatus::Uploading);

        for id in &ids {
            session.apply(id, ItemPatch::Started);
        }
        session.apply(&ids[0], ItemPatch::Failed { reason: "boom".into() });
        session.apply(&ids[1], ItemPatch::Completed { storage_path: "a".into(), result_url: "a".into() });
        assert_eq!(session.status(), SessionStatus::Uploading);

        session.apply(&ids[2], ItemPatch::Completed { storage_path: "b".into(), result_url: "b".into() });
        assert_eq!(session.status(), SessionStatus::Error);
        assert_eq!(session.item(&ids[0]).unwrap().error.as_deref(), Some("boom"));
        assert_aggregates(&session);

        // 重试清空进度和错误
        let t = session.apply(&ids[0], ItemPatch::Requeued { reset_progress: true }).unwrap();
        assert_eq!(t.new_status, ItemStatus::Pending);
        let item = session.item(&ids[0]).unwrap();
        assert!(item.error.is_none());
        assert_eq!(item.uploaded_bytes, 0);
        assert_eq!(session.failed_files(), 0);
    }

    #[test]
    fn test_paused_session_is_not_completed_by_late_results() {
        let (mut session, ids) = session_with(&[10]);
        session.set_status(SessionStatus::Uploading);
        session.apply(&ids[0], ItemPatch::Started);
        session.set_status(SessionStatus::Paused);

        // 暂停前已经发出的传输成功返回
        session.apply(&ids[0], ItemPatch::Completed { storage_path: "a".into(), result_url: "a".into() });
        assert_eq!(session.completed_files(), 1);
        assert_eq!(session.status(), SessionStatus::Paused);

        session.set_status(SessionStatus::Uploading);
        assert_eq!(session.status(), SessionStatus::Completed);
    }

    #[test]
    fn test_restore_completed_from_ledger() {
        let (mut session, ids) = session_with(&[10, 20, 30]);
        let completed: HashSet<ItemId> = [ids[0].clone(), ids[2].clone(), ItemId::new("unknown")].into();

        let restored = session.restore_completed(&completed);
        assert_eq!(restored.len(), 2);
        assert_eq!(session.completed_files(), 2);
        assert_eq!(session.uploaded_bytes(), 40);
        assert_eq!(session.item(&ids[1]).unwrap().status, ItemStatus::Pending);
        assert_aggregates(&session);

        // 重复恢复不产生新的迁移
        assert!(session.restore_completed(&completed).is_empty());
    }

    #[test]
    fn test_started_at_set_once() {
        let (mut session, _) = session_with(&[1]);
        assert!(session.started_at().is_none());

        session.set_status(SessionStatus::Uploading);
        let first = session.started_at();
        assert!(first.is_some());

        session.set_status(SessionStatus::Paused);
        session.set_status(SessionStatus::Uploading);
        assert_eq!(session.started_at(), first);
    }
}

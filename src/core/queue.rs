use std::collections::VecDeque;
use std::sync::Arc;
use parking_lot::Mutex;
use super::types::UploadItem;

/// 一次运行的共享任务队列，所有 worker 按插入顺序取任务
#[derive(Clone, Default)]
pub(crate) struct WorkQueue {
    items: Arc<Mutex<VecDeque<UploadItem>>>,
}

impl WorkQueue {
    pub fn new(items: impl IntoIterator<Item = UploadItem>) -> Self {
        Self {
            items: Arc::new(Mutex::new(items.into_iter().collect())),
        }
    }

    pub fn pop(&self) -> Option<UploadItem> {
        self.items.lock().pop_front()
    }

    pub fn len(&self) -> usize {
        self.items.lock().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use crate::core::types::FileSource;

    #[test]
    fn test_pop_in_insertion_order() {
        let items = ["a", "b", "c"].map(|name| UploadItem::new(name, 1, FileSource::Bytes(Bytes::new())));
        let queue = WorkQueue::new(items);
        let other = queue.clone();

        assert_eq!(queue.len(), 3);
        assert_eq!(queue.pop().unwrap().relative_path, "a");
        assert_eq!(other.pop().unwrap().relative_path, "b");
        assert_eq!(queue.pop().unwrap().relative_path, "c");
        assert!(other.pop().is_none());
    }
}

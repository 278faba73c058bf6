use std::sync::Arc;
use tokio::sync::Notify;

/// Wakes the controller task when the last handle to it is dropped.
pub struct NotifyWrapper {
    pub notify: Arc<Notify>,
}

impl Drop for NotifyWrapper {
    fn drop(&mut self) {
        self.notify.notify_waiters();
    }
}

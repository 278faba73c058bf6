mod notify_wrapper;

pub use notify_wrapper::NotifyWrapper;

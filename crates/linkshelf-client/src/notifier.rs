use tracing::{error, info};

/// Where user-visible feedback goes: toasts and local notifications.
pub trait Notifier: Send + Sync {
    fn error(&self, message: &str);
    fn success(&self, message: &str);
    /// Whether the user has granted permission for local notifications.
    fn notifications_permitted(&self) -> bool {
        false
    }
    fn notify(&self, title: &str, body: &str);
}

/// Writes everything to the log. Used by headless consumers.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingNotifier;

impl Notifier for TracingNotifier {
    fn error(&self, message: &str) {
        error!("{}", message);
    }

    fn success(&self, message: &str) {
        info!("{}", message);
    }

    fn notify(&self, title: &str, body: &str) {
        info!("{}: {}", title, body);
    }
}

#[cfg(test)]
pub(crate) mod recording {
    use std::sync::Mutex;

    use super::Notifier;

    #[derive(Default)]
    pub(crate) struct RecordingNotifier {
        pub permitted: bool,
        pub errors: Mutex<Vec<String>>,
        pub successes: Mutex<Vec<String>>,
        pub notifications: Mutex<Vec<(String, String)>>,
    }

    impl RecordingNotifier {
        pub fn permitted() -> Self {
            Self {
                permitted: true,
                ..Self::default()
            }
        }

        pub fn errors(&self) -> Vec<String> {
            self.errors.lock().unwrap().clone()
        }
    }

    impl Notifier for RecordingNotifier {
        fn error(&self, message: &str) {
            self.errors.lock().unwrap().push(message.to_string());
        }

        fn success(&self, message: &str) {
            self.successes.lock().unwrap().push(message.to_string());
        }

        fn notifications_permitted(&self) -> bool {
            self.permitted
        }

        fn notify(&self, title: &str, body: &str) {
            self.notifications
                .lock()
                .unwrap()
                .push((title.to_string(), body.to_string()));
        }
    }
}

use std::fs::OpenOptions;
use std::io::Write;
use std::path::PathBuf;

use serde_json::{json, Value};
use tracing::{error, warn};

/// Fire-and-forget failure notifications.
pub trait Notify {
    fn notify(&self, source: &str, message: &str, context: Value);
}

/// Logs every alert as an `error!` event and, when configured, appends it
/// to a JSON-lines file for whatever watches that file.
pub struct AlertLog {
    path: Option<PathBuf>,
}

impl AlertLog {
    pub fn new(path: Option<PathBuf>) -> Self {
        AlertLog { path }
    }

    fn append(&self, line: &Value) -> std::io::Result<()> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
            std::fs::create_dir_all(dir)?;
        }
        let mut file = OpenOptions::new().create(true).append(true).open(path)?;
        writeln!(file, "{}", line)
    }
}

impl Notify for AlertLog {
    fn notify(&self, source: &str, message: &str, context: Value) {
        error!(source, %context, "{}", message);
        let line = json!({
            "at": chrono::Utc::now().to_rfc3339(),
            "source": source,
            "message": message,
            "context": context,
        });
        if let Err(e) = self.append(&line) {
            warn!("Could not write alert to {:?}: {}", self.path, e);
        }
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use std::cell::RefCell;

    use super::*;

    /// Records alerts for assertions.
    #[derive(Default)]
    pub struct Recorder {
        pub alerts: RefCell<Vec<(String, String, Value)>>,
    }

    impl Notify for Recorder {
        fn notify(&self, source: &str, message: &str, context: Value) {
            self.alerts
                .borrow_mut()
                .push((source.to_string(), message.to_string(), context));
        }
    }

    impl Recorder {
        pub fn messages(&self) -> Vec<String> {
            self.alerts.borrow().iter().map(|(_, m, _)| m.clone()).collect()
        }
    }
}

use std::time::Duration;

use tracing::info;

pub const NTFY_TIMEOUT: Duration = Duration::from_secs(10);

/// Push-style alert delivery.
pub trait Notifier: core::fmt::Debug + Sync + Send {
    /// Blocking I/O
    fn notify(&self, title: &str, message: &str) -> anyhow::Result<()>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct NoopNotifier;
impl Notifier for NoopNotifier {
    fn notify(&self, _title: &str, _message: &str) -> anyhow::Result<()> {
        Ok(())
    }
}

/// Posts to an ntfy topic URL such as `https://ntfy.sh/<topic>`.
#[derive(Debug)]
pub struct NtfyNotifier {
    client: ureq::Agent,
    url: String,
}
impl NtfyNotifier {
    pub fn new(url: String) -> Self {
        let client = ureq::AgentBuilder::new().timeout(NTFY_TIMEOUT).build();
        Self { client, url }
    }
}
impl Notifier for NtfyNotifier {
    fn notify(&self, title: &str, message: &str) -> anyhow::Result<()> {
        let _resp = self
            .client
            .post(&self.url)
            .set("Title", title)
            .set("Priority", "high")
            .set("Tags", "warning,sensor")
            .send_string(message)?;
        info!(%title, %message, "sent ntfy notification");
        Ok(())
    }
}

use std::future::Future;

use tokio::sync::mpsc;
use tokio::time::{sleep_until, Duration, Instant};
use tokio_util::sync::CancellationToken;

const ENABLE_LOGS: bool = true;

use crate::log_debug;

/// What made the host suspect the page moved to another video.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NavigationTrigger {
    /// A programmatic `history.pushState`.
    HistoryPush,
    /// Browser back/forward.
    PopState,
    /// Structural DOM change; only meaningful when the href changed too.
    DomMutation,
}

/// Filters raw navigation triggers down to the ones worth re-reading the
/// URL for.
#[derive(Debug, Default)]
pub struct NavigationMonitor {
    last_href: Option<String>,
}

impl NavigationMonitor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn observe(&mut self, trigger: NavigationTrigger, href: &str) -> bool {
        let changed = self.last_href.as_deref() != Some(href);
        if changed {
            self.last_href = Some(href.to_string());
        }

        match trigger {
            NavigationTrigger::HistoryPush | NavigationTrigger::PopState => true,
            NavigationTrigger::DomMutation => changed,
        }
    }
}

/// Collapses bursts of triggers into one call of `on_settled` with the most
/// recent href, once `debounce` passes without a new trigger.
///
/// Runs until `cancel` fires or every sender is dropped; a pending href is
/// flushed when the channel closes.
pub async fn debounce_loop<F, Fut>(
    mut rx: mpsc::UnboundedReceiver<(NavigationTrigger, String)>,
    debounce: Duration,
    cancel: CancellationToken,
    mut on_settled: F,
) where
    F: FnMut(String) -> Fut,
    Fut: Future<Output = ()>,
{
    let mut monitor = NavigationMonitor::new();
    let mut pending: Option<String> = None;
    // Only accepted triggers move the deadline; filtered mutations leave it.
    let mut deadline: Option<Instant> = None;

    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                log_debug!("navigation monitor shutting down");
                break;
            }
            message = rx.recv() => match message {
                Some((trigger, href)) => {
                    if monitor.observe(trigger, &href) {
                        pending = Some(href);
                        deadline = Some(Instant::now() + debounce);
                    }
                }
                None => {
                    if let Some(href) = pending.take() {
                        on_settled(href).await;
                    }
                    break;
                }
            },
            _ = sleep_until(deadline.unwrap_or_else(Instant::now)), if deadline.is_some() => {
                deadline = None;
                if let Some(href) = pending.take() {
                    log_debug!("navigation settled on {href}");
                    on_settled(href).await;
                }
            }
        }
    }
}

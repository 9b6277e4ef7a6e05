use std::future::Future;

use mdc_link::AbortFlag;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

pub struct AbortMonitor {
    handle: JoinHandle<bool>,
}

impl AbortMonitor {
    /// Sets `abort` once `trigger` completes.
    pub fn spawn<F>(abort: AbortFlag, trigger: F) -> Self
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let handle = tokio::spawn(async move {
            trigger.await;
            let first = abort.trigger();
            if first {
                warn!("abort requested: emergency landing");
            }
            first
        });
        Self { handle }
    }

    /// ENTER on stdin or Ctrl-C.
    pub fn operator(abort: AbortFlag) -> Self {
        Self::spawn(abort, operator_request())
    }

    /// Stops waiting; the flag is left as is.
    pub fn stop(self) {
        self.handle.abort();
    }

    /// `true` if this monitor set the flag.
    pub async fn join(self) -> bool {
        self.handle.await.unwrap_or(false)
    }
}

pub async fn operator_request() {
    tokio::select! {
        _ = enter_pressed() => info!("operator pressed ENTER"),
        _ = ctrl_c() => info!("operator pressed Ctrl-C"),
    }
}

async fn enter_pressed() {
    // std thread: a blocked tokio stdin read would hold up runtime shutdown
    let (tx, rx) = oneshot::channel();
    std::thread::spawn(move || {
        let mut line = String::new();
        if matches!(std::io::stdin().read_line(&mut line), Ok(n) if n > 0) {
            let _ = tx.send(());
        }
    });
    if rx.await.is_err() {
        debug!("stdin closed; ENTER abort unavailable");
        std::future::pending::<()>().await;
    }
}

async fn ctrl_c() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("ctrl-c handler: {}", e);
        std::future::pending::<()>().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn trigger_sets_flag_once() {
        let abort = AbortFlag::new();
        let (tx, rx) = oneshot::channel::<()>();
        let monitor = AbortMonitor::spawn(abort.clone(), async move {
            let _ = rx.await;
        });
        assert!(!abort.is_set());
        tx.send(()).unwrap();
        assert!(monitor.join().await);
        assert!(abort.is_set());
    }

    #[tokio::test]
    async fn already_aborted_is_not_claimed() {
        let abort = AbortFlag::new();
        abort.trigger();
        let monitor = AbortMonitor::spawn(abort.clone(), async {});
        assert!(!monitor.join().await);
        assert!(abort.is_set());
    }

    #[tokio::test]
    async fn stopped_monitor_leaves_flag_clear() {
        let abort = AbortFlag::new();
        let monitor = AbortMonitor::spawn(abort.clone(), std::future::pending());
        monitor.stop();
        tokio::task::yield_now().await;
        assert!(!abort.is_set());
    }
}

//! Native runtime - tokio timers standing in for the browser's
//! `setInterval` / `setTimeout`, plus Ctrl+C / SIGTERM shutdown
//!
//! The app types are `!Send`, so everything here runs on the caller's task
//! (current-thread runtime or a `LocalSet`); nothing is spawned except the
//! signal listener.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::broadcast;
use tokio::time::MissedTickBehavior;

use crate::app::{Submitted, TipApp};
use crate::session::Poll;

/// Shutdown signal broadcaster
#[derive(Clone)]
pub struct Shutdown {
    sender: broadcast::Sender<()>,
    triggered: Arc<AtomicBool>,
}

impl Default for Shutdown {
    fn default() -> Self { Self::new() }
}

impl Shutdown {
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(1);
        Self { sender, triggered: Arc::new(AtomicBool::new(false)) }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<()> { self.sender.subscribe() }

    /// Idempotent.
    pub fn trigger(&self) {
        if !self.triggered.swap(true, Ordering::SeqCst) {
            let _ = self.sender.send(());
        }
    }

    pub fn is_triggered(&self) -> bool { self.triggered.load(Ordering::SeqCst) }
}

/// Install signal handlers and return shutdown handle
pub fn install_signal_handlers() -> Shutdown {
    let shutdown = Shutdown::new();
    let handle = shutdown.clone();

    tokio::spawn(async move {
        #[cfg(unix)]
        {
            use tokio::signal::unix::{signal, SignalKind};
            match (signal(SignalKind::terminate()), signal(SignalKind::interrupt())) {
                (Ok(mut sigterm), Ok(mut sigint)) => tokio::select! {
                    _ = sigterm.recv() => tracing::info!("Received SIGTERM"),
                    _ = sigint.recv() => tracing::info!("Received SIGINT"),
                },
                _ => {
                    tracing::error!("installing signal handlers failed");
                    return;
                }
            }
        }

        #[cfg(not(unix))]
        {
            if tokio::signal::ctrl_c().await.is_err() {
                tracing::error!("installing Ctrl+C handler failed");
                return;
            }
            tracing::info!("Received Ctrl+C");
        }

        handle.trigger();
    });

    shutdown
}

/// Run the detection interval until the provider is found or shutdown fires.
/// Returns whether the provider was found.
pub async fn watch_for_provider(app: &TipApp, shutdown: &Shutdown) -> bool {
    let mut rx = shutdown.subscribe();
    if shutdown.is_triggered() {
        return false;
    }
    let mut interval = tokio::time::interval(app.config().poll_interval);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
    // first tick completes immediately; start() already covered it
    interval.tick().await;

    loop {
        tokio::select! {
            _ = interval.tick() => {
                if app.poll().await == Poll::Stop {
                    return app.session().is_detected();
                }
            }
            _ = rx.recv() => return false,
        }
    }
}

/// Sleep out the reset delay of a submission, then expire it.
pub async fn reset_after(app: &TipApp, submitted: &Submitted) -> bool {
    let Some((generation, delay)) = submitted.reset else {
        return false;
    };
    tokio::time::sleep(delay).await;
    app.expire(generation)
}

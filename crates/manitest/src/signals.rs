//! Termination signals that abort a run.
//!
//! Handlers are registered when [`Termination::install`] returns, so a
//! signal delivered afterwards is queued for [`Termination::recv`] instead
//! of taking the default action.

#[cfg(unix)]
use tokio::signal::unix::{Signal, SignalKind, signal};

/// Registered interrupt, quit and terminate handlers.
#[cfg(unix)]
pub struct Termination {
    handlers: Option<(Signal, Signal, Signal)>,
}

#[cfg(unix)]
impl Termination {
    /// Register the handlers. Must be called inside the runtime.
    pub fn install() -> Self {
        let handlers = (|| {
            Ok::<_, std::io::Error>((
                signal(SignalKind::interrupt())?,
                signal(SignalKind::quit())?,
                signal(SignalKind::terminate())?,
            ))
        })();

        match handlers {
            Ok(handlers) => Self {
                handlers: Some(handlers),
            },
            Err(e) => {
                tracing::warn!("failed to install signal handlers: {e}");
                Self { handlers: None }
            }
        }
    }

    /// Resolve with the signal name once one arrives. Never resolves if the
    /// handlers could not be installed.
    pub async fn recv(&mut self) -> &'static str {
        let Some((interrupt, quit, terminate)) = &mut self.handlers else {
            return std::future::pending().await;
        };

        tokio::select! {
            _ = interrupt.recv() => "SIGINT",
            _ = quit.recv() => "SIGQUIT",
            _ = terminate.recv() => "SIGTERM",
        }
    }
}

#[cfg(windows)]
pub struct Termination {
    handler: Option<tokio::signal::windows::CtrlC>,
}

#[cfg(windows)]
impl Termination {
    pub fn install() -> Self {
        match tokio::signal::windows::ctrl_c() {
            Ok(handler) => Self {
                handler: Some(handler),
            },
            Err(e) => {
                tracing::warn!("failed to install Ctrl-C handler: {e}");
                Self { handler: None }
            }
        }
    }

    pub async fn recv(&mut self) -> &'static str {
        match &mut self.handler {
            Some(handler) => {
                handler.recv().await;
                "Ctrl-C"
            }
            None => std::future::pending().await,
        }
    }
}

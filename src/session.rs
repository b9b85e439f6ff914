//! Bounded introspection sessions.
//!
//! Every catalog read goes through [`IntrospectionSession`]:
//! - connect timeout (fast fail on unreachable hosts)
//! - statement timeout (bounded query runtime)
//! - read-only transactions by default
//! - Ctrl+C cancellation of the running query

use crate::datasource::ConnectionInfo;
use crate::error_codes::{ConnectTarget, PullError};
use anyhow::{Context, Result};
use std::future::Future;
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio_postgres::{CancelToken, Client, NoTls};

pub mod defaults {
    use std::time::Duration;

    pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

    pub const STATEMENT_TIMEOUT: Duration = Duration::from_secs(30);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeoutConfig {
    pub connect_timeout: Duration,
    pub statement_timeout: Duration,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            connect_timeout: defaults::CONNECT_TIMEOUT,
            statement_timeout: defaults::STATEMENT_TIMEOUT,
        }
    }
}

impl TimeoutConfig {
    pub fn new(connect_timeout: Option<Duration>, statement_timeout: Option<Duration>) -> Self {
        Self {
            connect_timeout: connect_timeout.unwrap_or(defaults::CONNECT_TIMEOUT),
            statement_timeout: statement_timeout.unwrap_or(defaults::STATEMENT_TIMEOUT),
        }
    }

    /// SQL run right after connecting.
    pub fn session_setup_sql(&self) -> String {
        format!(
            "SET statement_timeout = '{}ms'; SET default_transaction_read_only = on;",
            self.statement_timeout.as_millis()
        )
    }
}

/// A live session against the introspected database.
///
/// The connection task stops when the session is dropped.
pub struct IntrospectionSession {
    client: Client,
    target: ConnectTarget,
    cancel_token: CancelToken,
    _shutdown_tx: oneshot::Sender<()>,
}

impl IntrospectionSession {
    /// Connect with timeout enforcement and classify failures.
    pub async fn connect(
        info: &ConnectionInfo,
        timeouts: TimeoutConfig,
    ) -> Result<Self, PullError> {
        let target = info.target();

        let mut config = tokio_postgres::Config::new();
        config
            .host(&info.host)
            .port(info.port)
            .user(&info.user)
            .dbname(&info.database)
            .application_name("schemapull")
            .connect_timeout(timeouts.connect_timeout);
        if let Some(password) = &info.password {
            config.password(password);
        }

        let (client, connection) =
            match tokio::time::timeout(timeouts.connect_timeout, config.connect(NoTls)).await {
                Err(_) => return Err(PullError::unreachable(&target)),
                Ok(Err(e)) => return Err(PullError::from_connect_error(&e, &target)),
                Ok(Ok(pair)) => pair,
            };

        let cancel_token = client.cancel_token();
        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();

        tokio::spawn(async move {
            tokio::select! {
                _ = connection => {}
                _ = shutdown_rx => {}
            }
        });

        client
            .batch_execute(&timeouts.session_setup_sql())
            .await
            .map_err(|e| PullError::from_query_error(&e, &target))?;

        Ok(Self {
            client,
            target,
            cancel_token,
            _shutdown_tx: shutdown_tx,
        })
    }

    pub fn cancel_token(&self) -> CancelToken {
        self.cancel_token.clone()
    }

    pub fn client(&self) -> &Client {
        &self.client
    }

    /// Display-safe description of the server.
    pub fn target(&self) -> &ConnectTarget {
        &self.target
    }
}

/// Parse a duration string like "5s", "500ms", "1m".
pub fn parse_duration(s: &str) -> Result<Duration> {
    let s = s.trim();
    if s.is_empty() {
        anyhow::bail!("Empty duration string");
    }

    let (num_part, unit) = if let Some(stripped) = s.strip_suffix("ms") {
        (stripped, "ms")
    } else if let Some(stripped) = s.strip_suffix('s') {
        (stripped, "s")
    } else if let Some(stripped) = s.strip_suffix('m') {
        (stripped, "m")
    } else {
        (s, "s")
    };

    let num: u64 = num_part
        .trim()
        .parse()
        .with_context(|| format!("Invalid duration number: '{}'", num_part))?;

    Ok(match unit {
        "ms" => Duration::from_millis(num),
        "m" => Duration::from_secs(num * 60),
        _ => Duration::from_secs(num),
    })
}

/// Cancel the running query and exit with the INTERRUPTED code on Ctrl+C.
///
/// Call after the session is established. The handler stays armed until the
/// returned guard is dropped.
pub fn setup_ctrlc_handler(cancel_token: CancelToken) -> CtrlcGuard {
    CtrlcGuard::arm(async move {
        eprintln!("\nInterrupted (Ctrl+C). Cancelling introspection...");

        // Best effort: the query may already have finished.
        if let Err(e) = cancel_token.cancel_query(NoTls).await {
            eprintln!("Warning: Failed to cancel query: {}", e);
        }
    })
}

/// Armed Ctrl+C handler. Dropping it disarms the handler.
pub struct CtrlcGuard {
    handle: JoinHandle<()>,
}

impl CtrlcGuard {
    fn arm<F>(on_interrupt: F) -> Self
    where
        F: Future<Output = ()> + Send + 'static,
    {
        use crate::exit_codes;

        let handle = tokio::spawn(async move {
            if let Err(e) = tokio::signal::ctrl_c().await {
                eprintln!("Failed to listen for Ctrl+C: {}", e);
                return;
            }
            on_interrupt.await;
            std::process::exit(exit_codes::INTERRUPTED);
        });
        Self { handle }
    }

    #[cfg(test)]
    fn abort_handle(&self) -> tokio::task::AbortHandle {
        self.handle.abort_handle()
    }
}

impl Drop for CtrlcGuard {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

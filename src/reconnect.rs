use crate::bridge::Command;
use crate::connection::{self, SessionEnd};
use crate::error::{DlzError, Result};
use crate::session::Session;
use crate::status::LinkStatus;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::time::sleep;

/// Retry settings for the connection loop
#[derive(Debug, Clone, PartialEq)]
pub struct ReconnectPolicy {
    /// Give up after this many attempts; `None` retries forever
    pub max_attempts: Option<u32>,
    pub base_delay: Duration,
    pub backoff: f64,
    pub max_delay: Duration,
}

/// Delay sequence for consecutive reconnection attempts
///
/// The attempt counter lives in [`LinkStatus`] so an established session can
/// reset it; the first attempt after a reset starts again at the base delay.
pub(crate) struct Backoff {
    policy: ReconnectPolicy,
    current: Duration,
}

impl Backoff {
    pub(crate) fn new(policy: ReconnectPolicy) -> Self {
        let current = policy.base_delay;
        Self { policy, current }
    }

    /// Count the next attempt and return how long to wait before it
    ///
    /// Returns `None` once the attempt limit is reached.
    pub(crate) fn next_delay(&mut self, link: &LinkStatus) -> Option<Duration> {
        if let Some(max) = self.policy.max_attempts {
            if link.attempt() >= max {
                return None;
            }
        }

        let attempt = link.begin_attempt();
        self.current = if attempt > 1 {
            self.current.mul_f64(self.policy.backoff).min(self.policy.max_delay)
        } else {
            self.policy.base_delay
        };
        Some(self.current)
    }
}

/// The background connection: one session retried under a [`ReconnectPolicy`]
pub(crate) struct ConnectionLoop {
    url: String,
    session: Session,
    policy: ReconnectPolicy,
    commands: mpsc::UnboundedReceiver<Command>,
    shutdown: watch::Receiver<bool>,
}

impl ConnectionLoop {
    pub(crate) fn new(
        url: String,
        session: Session,
        policy: ReconnectPolicy,
        commands: mpsc::UnboundedReceiver<Command>,
        shutdown: watch::Receiver<bool>,
    ) -> Self {
        Self {
            url,
            session,
            policy,
            commands,
            shutdown,
        }
    }

    /// Run until shutdown (`Ok`) or until reconnection is exhausted (`Err`)
    pub(crate) async fn run(mut self) -> Result<()> {
        let mut backoff = Backoff::new(self.policy.clone());

        loop {
            if *self.shutdown.borrow() {
                return Ok(());
            }

            match connection::run_once(&self.url, &mut self.session, &mut self.commands, &mut self.shutdown)
                .await
            {
                Ok(SessionEnd::Shutdown) => return Ok(()),
                Ok(SessionEnd::Closed) => tracing::warn!("Connection closed by server"),
                Err(e) => tracing::error!("Connection error: {}", e),
            }

            let Some(delay) = backoff.next_delay(self.session.link()) else {
                let attempts = self.session.link().attempt();
                tracing::error!("Maximum reconnection attempts ({}) reached. Giving up.", attempts);
                self.session.give_up();
                return Err(DlzError::ReconnectExhausted { attempts });
            };

            let attempt = self.session.link().attempt();
            match self.policy.max_attempts {
                Some(max) => tracing::warn!("Reconnection attempt {}/{}", attempt, max),
                None => tracing::warn!("Reconnection attempt {}", attempt),
            }
            tracing::warn!("Retrying in {:.1} seconds...", delay.as_secs_f64());

            if !wait(delay, &mut self.commands, &mut self.shutdown).await {
                tracing::info!("Reconnection cancelled");
                return Ok(());
            }
        }
    }
}

/// Sleep for `delay`, answering queued actions with failure meanwhile
///
/// Returns false if shutdown was requested.
async fn wait(
    delay: Duration,
    commands: &mut mpsc::UnboundedReceiver<Command>,
    shutdown: &mut watch::Receiver<bool>,
) -> bool {
    let sleeper = sleep(delay);
    tokio::pin!(sleeper);

    loop {
        tokio::select! {
            _ = &mut sleeper => return true,
            _ = shutdown.changed() => return false,
            Some(command) = commands.recv() => command.reject(),
        }
    }
}

use std::time::{Duration, Instant};
use tokio::sync::{mpsc, oneshot};
use tokio::time::MissedTickBehavior;
use tracing::{Instrument, debug, error, info, info_span, warn};

use crate::bootstrap::SessionBootstrap;
use crate::error::BridgeError;
use crate::executor::CommandExecutor;
use crate::registry::SessionRegistry;
use crate::types::{CallerEvent, Command, ReplyChannel, StartRequest};

/// Work accepted by the dispatcher, executed strictly in arrival order.
pub enum Job {
    Command(Command),
    Start {
        request: StartRequest,
        reply: ReplyChannel,
        done: oneshot::Sender<Result<String, BridgeError>>,
    },
    ListSessions(oneshot::Sender<Vec<String>>),
}

/// Cloneable sender side of the dispatcher queue.
#[derive(Clone)]
pub struct DispatcherHandle {
    tx: mpsc::UnboundedSender<Job>,
}

impl DispatcherHandle {
    pub(crate) fn from_sender(tx: mpsc::UnboundedSender<Job>) -> Self {
        Self { tx }
    }

    /// Queue a command behind everything already submitted.
    pub fn submit(&self, command: Command) -> Result<(), BridgeError> {
        self.tx
            .send(Job::Command(command))
            .map_err(|_| BridgeError::ChannelClosed("dispatcher"))
    }

    /// Run session bootstrap on the dispatcher and wait for its work id.
    pub async fn start_process(&self, request: StartRequest, reply: ReplyChannel) -> Result<String, BridgeError> {
        let (done, rx) = oneshot::channel();
        self.tx
            .send(Job::Start { request, reply, done })
            .map_err(|_| BridgeError::ChannelClosed("dispatcher"))?;
        rx.await.map_err(|_| BridgeError::ChannelClosed("dispatcher"))?
    }

    pub async fn list_sessions(&self) -> Result<Vec<String>, BridgeError> {
        let (done, rx) = oneshot::channel();
        self.tx
            .send(Job::ListSessions(done))
            .map_err(|_| BridgeError::ChannelClosed("dispatcher"))?;
        rx.await.map_err(|_| BridgeError::ChannelClosed("dispatcher"))
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

/// The single worker that owns the session registry.
///
/// At most one job runs at a time across all sessions. Jobs submitted
/// while one is running wait in the queue.
pub struct Dispatcher {
    registry: SessionRegistry,
    executor: CommandExecutor,
    bootstrap: SessionBootstrap,
    inbox: mpsc::UnboundedReceiver<Job>,
    idle_timeout: Duration,
}

impl Dispatcher {
    pub fn new(
        executor: CommandExecutor,
        bootstrap: SessionBootstrap,
        idle_timeout: Duration,
    ) -> (Self, DispatcherHandle) {
        let (tx, inbox) = mpsc::unbounded_channel();
        let dispatcher = Self {
            registry: SessionRegistry::new(),
            executor,
            bootstrap,
            inbox,
            idle_timeout,
        };
        (dispatcher, DispatcherHandle::from_sender(tx))
    }

    /// Drain the queue until every handle is dropped.
    pub async fn run(mut self) {
        let mut sweep = tokio::time::interval(sweep_period(self.idle_timeout));
        sweep.set_missed_tick_behavior(MissedTickBehavior::Delay);
        sweep.tick().await;

        loop {
            tokio::select! {
                job = self.inbox.recv() => match job {
                    Some(job) => self.handle(job).await,
                    None => break,
                },
                _ = sweep.tick() => self.sweep_idle(Instant::now()),
            }
        }
        info!("Dispatcher stopped with {} session(s) open", self.registry.len());
    }

    pub async fn handle(&mut self, job: Job) {
        match job {
            Job::Command(command) => self.run_command(command).await,
            Job::Start { request, reply, done } => {
                let result = self.bootstrap.start(&mut self.registry, request, reply).await;
                if let Err(e) = &result {
                    error!("Start failed: {}", e);
                }
                let _ = done.send(result);
            }
            Job::ListSessions(done) => {
                let _ = done.send(self.registry.list_ids());
            }
        }
    }

    async fn run_command(&mut self, command: Command) {
        let span = info_span!("command", work_id = %command.work_id(), kind = command.kind());
        async {
            if let Command::EndProcess { work_id, error, details } = command {
                self.finish_session(&work_id, error, details);
                return;
            }

            let work_id = command.work_id().to_string();
            let page = match self.registry.get(&work_id) {
                Some(session) if session.is_ready() => session.page.clone(),
                Some(_) => {
                    warn!("Session {} is not fully bound, dropping {}", work_id, command.kind());
                    return;
                }
                None => {
                    warn!("{}", BridgeError::UnknownSession(work_id));
                    return;
                }
            };

            debug!("Executing {}", command.kind());
            match self.executor.execute(page.as_ref(), &command).await {
                Ok(outcome) => debug!("{} finished: {:?}", command.kind(), outcome),
                Err(e) => error!("{} failed: {}", command.kind(), e),
            }

            if let Some(session) = self.registry.get_mut(&work_id) {
                session.touch();
            }
        }
        .instrument(span)
        .await
    }

    /// Notify the caller and discard the session.
    fn finish_session(&mut self, work_id: &str, error: Option<String>, details: Option<String>) {
        let Some(session) = self.registry.delete(work_id) else {
            warn!("{}", BridgeError::UnknownSession(work_id.to_string()));
            return;
        };

        let event = match error {
            Some(error) => {
                warn!("Backend reported failure for {}: {}", work_id, error);
                CallerEvent::ProcessError { error, details }
            }
            None => CallerEvent::complete(),
        };
        if session.notify(event) {
            info!("Session {} finished", work_id);
        } else {
            warn!("Session {} finished but its caller has disconnected", work_id);
        }
    }

    /// Expire sessions with no activity for `idle_timeout`.
    pub fn sweep_idle(&mut self, now: Instant) {
        for work_id in self.registry.idle_ids(now, self.idle_timeout) {
            if let Some(session) = self.registry.delete(&work_id) {
                warn!("Session {} expired after {:?} idle", work_id, session.idle_for(now));
                session.notify(CallerEvent::ProcessError {
                    error: "session expired".into(),
                    details: None,
                });
            }
        }
    }

    pub fn registry(&self) -> &SessionRegistry {
        &self.registry
    }
}

fn sweep_period(idle_timeout: Duration) -> Duration {
    (idle_timeout / 4).clamp(Duration::from_secs(1), Duration::from_secs(60))
}

#[cfg(test)]
#[path = "dispatcher_tests.rs"]
mod tests;

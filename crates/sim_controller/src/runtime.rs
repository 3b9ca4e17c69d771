//! Single-owner task around a [`SessionController`].
//!
//! Commands from any number of [`ControllerHandle`] clones are queued and run
//! one at a time. Between commands the task forwards stream events and fires
//! the pending redirect when it falls due.

use sim_core::EntryLocation;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;

use crate::controller::SessionController;
use crate::error::CommandError;
use crate::snapshot::ControllerSnapshot;

const COMMAND_CHANNEL_CAPACITY: usize = 32;

type Reply = oneshot::Sender<Result<(), CommandError>>;

enum Command {
    OpenEntry(EntryLocation, Reply),
    StartSession(String, Reply),
    SubmitQuestion(String, Reply),
    EndSession(Reply),
    Retry(Reply),
    Reset(Reply),
}

/// Cloneable front end of a spawned controller.
#[derive(Clone)]
pub struct ControllerHandle {
    commands: mpsc::Sender<Command>,
    snapshots: watch::Receiver<ControllerSnapshot>,
}

impl ControllerHandle {
    pub async fn open_entry(&self, entry: EntryLocation) -> Result<(), CommandError> {
        self.request(|reply| Command::OpenEntry(entry, reply)).await
    }

    pub async fn start_session(&self, case_id: impl Into<String>) -> Result<(), CommandError> {
        let case_id = case_id.into();
        self.request(|reply| Command::StartSession(case_id, reply))
            .await
    }

    /// Resolves once the question is sent and its stream is open; the reply
    /// itself arrives through [`subscribe`](Self::subscribe).
    pub async fn submit_question(&self, text: impl Into<String>) -> Result<(), CommandError> {
        let text = text.into();
        self.request(|reply| Command::SubmitQuestion(text, reply))
            .await
    }

    pub async fn end_session(&self) -> Result<(), CommandError> {
        self.request(Command::EndSession).await
    }

    pub async fn retry(&self) -> Result<(), CommandError> {
        self.request(Command::Retry).await
    }

    pub async fn reset(&self) -> Result<(), CommandError> {
        self.request(Command::Reset).await
    }

    pub fn snapshot(&self) -> ControllerSnapshot {
        self.snapshots.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<ControllerSnapshot> {
        self.snapshots.clone()
    }

    async fn request(&self, build: impl FnOnce(Reply) -> Command) -> Result<(), CommandError> {
        let (reply, response) = oneshot::channel();
        self.commands
            .send(build(reply))
            .await
            .map_err(|_| CommandError::RuntimeStopped)?;
        response.await.map_err(|_| CommandError::RuntimeStopped)?
    }
}

/// The single task that owns a [`SessionController`].
///
/// It stops once every handle is dropped or after a scheduled redirect has
/// fired, closing any open stream on the way out.
pub struct ControllerRuntime {
    controller: SessionController,
    commands: mpsc::Receiver<Command>,
}

impl ControllerRuntime {
    pub fn new(controller: SessionController) -> (Self, ControllerHandle) {
        let (sender, commands) = mpsc::channel(COMMAND_CHANNEL_CAPACITY);
        let handle = ControllerHandle {
            commands: sender,
            snapshots: controller.subscribe(),
        };
        (
            Self {
                controller,
                commands,
            },
            handle,
        )
    }

    pub async fn run(mut self) {
        let controller = &mut self.controller;
        loop {
            let streaming = controller.is_streaming();
            let redirect_due = controller.pending_redirect().map(|r| r.due);

            tokio::select! {
                command = self.commands.recv() => match command {
                    Some(command) => execute(controller, command).await,
                    None => break,
                },
                item = controller.next_stream_item(), if streaming => {
                    controller.apply_stream_item(item);
                }
                _ = sleep_until(redirect_due), if redirect_due.is_some() => {
                    if controller.fire_redirect().is_some() {
                        log::info!("Redirect performed, controller runtime finished");
                        break;
                    }
                }
            }
        }

        log::debug!("Controller runtime stopping");
        controller.shutdown();
    }
}

/// Run `controller` on its own tokio task.
pub fn spawn(controller: SessionController) -> (ControllerHandle, JoinHandle<()>) {
    let (runtime, handle) = ControllerRuntime::new(controller);
    (handle, tokio::spawn(runtime.run()))
}

async fn sleep_until(due: Option<tokio::time::Instant>) {
    match due {
        Some(due) => tokio::time::sleep_until(due).await,
        None => std::future::pending().await,
    }
}

async fn execute(controller: &mut SessionController, command: Command) {
    let (result, reply) = match command {
        Command::OpenEntry(entry, reply) => (controller.open_entry(entry).await, reply),
        Command::StartSession(case_id, reply) => {
            (controller.start_session(&case_id).await, reply)
        }
        Command::SubmitQuestion(text, reply) => {
            (controller.submit_question(&text).await, reply)
        }
        Command::EndSession(reply) => (controller.end_session().await, reply),
        Command::Retry(reply) => (controller.retry().await, reply),
        Command::Reset(reply) => {
            controller.reset();
            (Ok(()), reply)
        }
    };

    if let Err(e) = &result {
        log::debug!("Command rejected: {}", e);
    }
    // The caller may have stopped waiting.
    let _ = reply.send(result);
}

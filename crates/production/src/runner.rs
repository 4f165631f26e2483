//! Async runner driving one sync state machine.

use crate::config::RunnerConfig;
use crate::timers::TimerManager;
use fastsync_core::{Action, BlockExecutor, BlockStore, Event, StateMachine, SyncOutcome, Transport};
use fastsync_sync::{SyncPhase, SyncStateMachine};
use fastsync_types::BlockHeight;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, span, warn, Level};

/// Timers and stop requests are few; their queues stay small.
const TIMER_CHANNEL_CAPACITY: usize = 16;
const CONTROL_CHANNEL_CAPACITY: usize = 4;

/// Errors from the production runner.
#[derive(Debug, Error)]
pub enum RunnerError {
    #[error("Event channel closed")]
    ChannelClosed,

    #[error("Runner exited without reporting completion")]
    CompletionDropped,

    #[error("Runner task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

/// Where a network posts events for one runner.
#[derive(Debug, Clone)]
pub struct RunnerInbox {
    /// Inbound messages. Bounded; a full queue drops the message.
    pub messages: mpsc::Sender<Event>,
    /// Peer joins and departures. Unbounded so none is ever lost.
    pub peers: mpsc::UnboundedSender<Event>,
    /// Store height of the runner, announced to peers on connect.
    pub height: watch::Receiver<BlockHeight>,
}

/// A state machine waiting to be spawned.
///
/// Construct it, hand its [`inbox`](Self::inbox) to the network, then
/// [`spawn`](Self::spawn) it with the resulting transport.
pub struct SyncRunner<S, E> {
    machine: SyncStateMachine<S, E>,
    event_tx: mpsc::Sender<Event>,
    event_rx: mpsc::Receiver<Event>,
    peer_tx: mpsc::UnboundedSender<Event>,
    peer_rx: mpsc::UnboundedReceiver<Event>,
    height_tx: watch::Sender<BlockHeight>,
}

impl<S, E> SyncRunner<S, E>
where
    S: BlockStore + Send + 'static,
    E: BlockExecutor + Send + 'static,
{
    pub fn new(config: &RunnerConfig, machine: SyncStateMachine<S, E>) -> Self {
        let (event_tx, event_rx) = mpsc::channel(config.event_channel_capacity);
        let (peer_tx, peer_rx) = mpsc::unbounded_channel();
        let (height_tx, _) = watch::channel(machine.store().height());
        Self {
            machine,
            event_tx,
            event_rx,
            peer_tx,
            peer_rx,
            height_tx,
        }
    }

    /// Senders and height watch for the network this runner joins.
    pub fn inbox(&self) -> RunnerInbox {
        RunnerInbox {
            messages: self.event_tx.clone(),
            peers: self.peer_tx.clone(),
            height: self.height_tx.subscribe(),
        }
    }

    /// Sender for inbound messages.
    pub fn event_sender(&self) -> mpsc::Sender<Event> {
        self.event_tx.clone()
    }

    /// Start the event loop on the current tokio runtime.
    pub fn spawn<T: Transport + 'static>(self, transport: T) -> SyncHandle<S, E> {
        let (timer_tx, timer_rx) = mpsc::channel(TIMER_CHANNEL_CAPACITY);
        let (control_tx, control_rx) = mpsc::channel(CONTROL_CHANNEL_CAPACITY);
        let (completion_tx, completion_rx) = oneshot::channel();
        let cancel = CancellationToken::new();
        let height = self.height_tx.subscribe();

        let event_loop = EventLoop {
            machine: self.machine,
            transport,
            event_rx: self.event_rx,
            peer_rx: self.peer_rx,
            timer_rx,
            control_rx,
            timers: TimerManager::new(timer_tx),
            height_tx: self.height_tx,
            completion: Some(completion_tx),
            cancel: cancel.clone(),
            start: Instant::now(),
        };

        SyncHandle {
            events: self.event_tx,
            control: control_tx,
            cancel,
            completion: Some(completion_rx),
            outcome: None,
            height,
            task: tokio::spawn(event_loop.run()),
        }
    }
}

struct EventLoop<S, E, T> {
    machine: SyncStateMachine<S, E>,
    transport: T,
    event_rx: mpsc::Receiver<Event>,
    peer_rx: mpsc::UnboundedReceiver<Event>,
    timer_rx: mpsc::Receiver<Event>,
    control_rx: mpsc::Receiver<Event>,
    timers: TimerManager,
    height_tx: watch::Sender<BlockHeight>,
    completion: Option<oneshot::Sender<SyncOutcome>>,
    cancel: CancellationToken,
    start: Instant,
}

impl<S, E, T> EventLoop<S, E, T>
where
    S: BlockStore,
    E: BlockExecutor,
    T: Transport,
{
    /// Run until cancelled or the machine stops. Returns the machine.
    ///
    /// Queues are polled in priority order: control, peer lifecycle, timers,
    /// then messages. A stop overtakes anything already queued, a peer's
    /// join is seen before any message it sent, and a flood of messages
    /// cannot starve the timeout scan.
    async fn run(mut self) -> SyncStateMachine<S, E> {
        info!(
            height = self.machine.store().height().0,
            "Starting sync runner"
        );

        loop {
            let event = tokio::select! {
                biased;

                _ = self.cancel.cancelled() => {
                    info!("Shutdown signal received");
                    break;
                }
                Some(event) = self.control_rx.recv() => event,
                Some(event) = self.peer_rx.recv() => event,
                Some(event) = self.timer_rx.recv() => event,
                Some(event) = self.event_rx.recv() => event,
            };

            self.dispatch(event);

            if self.machine.phase() == SyncPhase::Stopped {
                info!("State machine stopped, exiting event loop");
                break;
            }
        }

        self.timers.cancel_all();
        self.machine
    }

    fn dispatch(&mut self, event: Event) {
        let event_type = event.type_name();
        let event_span = span!(Level::DEBUG, "handle_event", event.type = %event_type);
        let _guard = event_span.enter();

        self.machine.set_time(self.start.elapsed());
        for action in self.machine.handle(event) {
            self.process_action(action);
        }

        let height = self.machine.store().height();
        self.height_tx.send_if_modified(|current| {
            let changed = *current != height;
            *current = height;
            changed
        });
    }

    fn process_action(&mut self, action: Action) {
        match action {
            Action::SendToPeer { peer, message } => self.transport.send(peer, message),
            Action::Broadcast { message } => self.transport.broadcast(message),
            Action::DisconnectPeer { peer, reason } => {
                warn!(peer = %peer, %reason, "Disconnecting evicted peer");
                self.transport.disconnect(peer);
            }
            Action::SetTimer { id, duration } => self.timers.set_timer(id, duration),
            Action::CancelTimer { id } => self.timers.cancel_timer(id),
            Action::SyncCompleted { outcome } => {
                info!(?outcome, "Sync completed");
                if let Some(tx) = self.completion.take() {
                    // The handle may have been dropped; nobody to tell.
                    let _ = tx.send(outcome);
                } else {
                    debug!(?outcome, "Duplicate completion ignored");
                }
            }
        }
    }
}

/// Handle on a spawned runner.
pub struct SyncHandle<S, E> {
    events: mpsc::Sender<Event>,
    control: mpsc::Sender<Event>,
    cancel: CancellationToken,
    completion: Option<oneshot::Receiver<SyncOutcome>>,
    outcome: Option<SyncOutcome>,
    height: watch::Receiver<BlockHeight>,
    task: JoinHandle<SyncStateMachine<S, E>>,
}

impl<S, E> SyncHandle<S, E> {
    /// Sender for inbound messages.
    pub fn event_sender(&self) -> mpsc::Sender<Event> {
        self.events.clone()
    }

    /// Current store height.
    pub fn height(&self) -> BlockHeight {
        *self.height.borrow()
    }

    /// Wait until the store reaches `height`.
    pub async fn wait_for_height(&mut self, height: BlockHeight) -> Result<(), RunnerError> {
        self.height
            .wait_for(|current| *current >= height)
            .await
            .map(|_| ())
            .map_err(|_| RunnerError::ChannelClosed)
    }

    /// Wait for the state machine to finish or stop.
    ///
    /// Resolves immediately on later calls.
    pub async fn completed(&mut self) -> Result<SyncOutcome, RunnerError> {
        if let Some(outcome) = self.outcome {
            return Ok(outcome);
        }
        let rx = self
            .completion
            .as_mut()
            .ok_or(RunnerError::CompletionDropped)?;
        let outcome = rx.await.map_err(|_| RunnerError::CompletionDropped)?;
        self.completion = None;
        self.outcome = Some(outcome);
        Ok(outcome)
    }

    /// Ask the state machine to stop. The runner exits once it has.
    pub async fn stop(&self) -> Result<(), RunnerError> {
        self.control
            .send(Event::Stop)
            .await
            .map_err(|_| RunnerError::ChannelClosed)
    }

    /// Token that shuts the runner down without a stop event.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Wait for the runner to exit and take back the state machine.
    pub async fn join(self) -> Result<SyncStateMachine<S, E>, RunnerError> {
        Ok(self.task.await?)
    }

    /// Cancel the runner and take back the state machine.
    pub async fn shutdown(self) -> Result<SyncStateMachine<S, E>, RunnerError> {
        self.cancel.cancel();
        self.join().await
    }
}

use crate::actions::{self, ActionContext};
use crate::backoff::Backoff;
use crate::command::{Command, StationSeed};
use crate::config::CoordinatorConfig;
use crate::error::{CommandError, PianobarError, RecvError, Result, SendError};
use crate::protocol::{self, Event, ResponseKind};
use crate::state::{StateDelta, StateModel};
use crate::subscription::{StateReceiver, StateUpdate};
use crate::transport::{FrameSender, Session, Transport, WsTransport};
use crate::types::{ConnectionState, ErrorInfo, Playback, PlayerState, StationId};
use crate::volume::VolumeCurve;
use futures_util::FutureExt;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::{broadcast, oneshot, watch, Notify};
use tokio::task::JoinHandle;

/// How long `stop` waits for the connection loop before aborting it
const STOP_GRACE: Duration = Duration::from_secs(2);

const UPDATE_CAPACITY: usize = 100;

/// Keeps a session with a pianobar bridge alive and mirrors its state
///
/// The coordinator owns one background task that connects, reads events in
/// order, applies them to the player state and reconnects with backoff when
/// the session drops. Commands can be sent from any task while it runs.
///
/// # Example
///
/// ```no_run
/// use pianobar_remote::{Coordinator, CoordinatorConfig, StateUpdate};
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let coordinator = Coordinator::new(CoordinatorConfig::new("192.168.1.50", 8080))?;
///     let mut updates = coordinator.subscribe();
///     coordinator.start();
///
///     while let Ok(update) = updates.recv().await {
///         if let StateUpdate::State(_) = update {
///             let state = coordinator.snapshot();
///             if let Some(song) = &state.current_song {
///                 println!("{} - {}", song.artist, song.title);
///             }
///         }
///     }
///     Ok(())
/// }
/// ```
pub struct Coordinator {
    shared: Arc<Shared>,
    task: Mutex<Option<Running>>,
}

struct Running {
    stop_tx: oneshot::Sender<()>,
    handle: JoinHandle<()>,
}

/// State shared between the public handle and the connection loop
///
/// Only the connection loop writes `model` and `connection`.
struct Shared {
    config: CoordinatorConfig,
    transport: Arc<dyn Transport>,
    model: Mutex<StateModel>,
    connection: watch::Sender<ConnectionState>,
    /// Write half of the live session; `Some` only while Connected
    sender: Mutex<Option<FrameSender>>,
    updates: broadcast::Sender<StateUpdate>,
    pending: PendingMap,
    attempt: AtomicU32,
    wake: Notify,
}

impl Coordinator {
    /// Create a coordinator talking WebSocket to the configured bridge
    pub fn new(config: CoordinatorConfig) -> Result<Self> {
        Self::with_transport(config, WsTransport)
    }

    /// Create a coordinator over a custom transport
    pub fn with_transport(config: CoordinatorConfig, transport: impl Transport) -> Result<Self> {
        config.validate()?;

        let (connection, _) = watch::channel(ConnectionState::Disconnected);
        let (updates, _) = broadcast::channel(UPDATE_CAPACITY);
        let curve = VolumeCurve::from_config(&config);

        Ok(Self {
            shared: Arc::new(Shared {
                config,
                transport: Arc::new(transport),
                model: Mutex::new(StateModel::new(curve)),
                connection,
                sender: Mutex::new(None),
                updates,
                pending: Mutex::new(HashMap::new()),
                attempt: AtomicU32::new(0),
                wake: Notify::new(),
            }),
            task: Mutex::new(None),
        })
    }

    pub fn config(&self) -> &CoordinatorConfig {
        &self.shared.config
    }

    /// Start the connection loop; does nothing if it is already running
    ///
    /// Must be called from within a tokio runtime.
    pub fn start(&self) {
        let mut task = lock(&self.task);
        if task.as_ref().is_some_and(|running| !running.handle.is_finished()) {
            tracing::debug!("Connection loop already running");
            return;
        }

        let (stop_tx, stop_rx) = oneshot::channel();
        let handle = tokio::spawn(run(self.shared.clone(), stop_rx));
        *task = Some(Running { stop_tx, handle });
    }

    /// Stop the connection loop, close the session and reset all state
    ///
    /// The coordinator can be started again afterwards.
    pub async fn stop(&self) {
        let running = lock(&self.task).take();
        let Some(Running {
            stop_tx,
            mut handle,
        }) = running
        else {
            return;
        };

        let _ = stop_tx.send(());
        if tokio::time::timeout(STOP_GRACE, &mut handle).await.is_err() {
            tracing::warn!("Connection loop did not stop in time, aborting it");
            handle.abort();
            let _ = handle.await;
            self.shared.set_connection(ConnectionState::Closing);
            self.shared.finish_disconnect();
        }
    }

    pub fn is_running(&self) -> bool {
        lock(&self.task)
            .as_ref()
            .is_some_and(|running| !running.handle.is_finished())
    }

    pub fn connection_state(&self) -> ConnectionState {
        *self.shared.connection.borrow()
    }

    pub fn is_connected(&self) -> bool {
        self.connection_state() == ConnectionState::Connected
    }

    /// Watch connection state transitions
    pub fn watch_connection(&self) -> watch::Receiver<ConnectionState> {
        self.shared.connection.subscribe()
    }

    /// Consecutive reconnect attempts since the last successful connect
    pub fn reconnect_attempt(&self) -> u32 {
        self.shared.attempt.load(Ordering::SeqCst)
    }

    /// Subscribe to change notifications
    ///
    /// Multiple subscriptions can be active simultaneously.
    pub fn subscribe(&self) -> StateReceiver {
        StateReceiver::new(self.shared.updates.subscribe())
    }

    /// Copy of the current player state
    pub fn snapshot(&self) -> PlayerState {
        lock(&self.shared.model).snapshot()
    }

    /// Volume curve in effect, bounded by the server's gain ceiling
    pub fn volume_curve(&self) -> VolumeCurve {
        lock(&self.shared.model).curve()
    }

    /// Current volume as a percentage
    pub fn volume_percent(&self) -> u8 {
        let model = lock(&self.shared.model);
        model.curve().db_to_percent(model.state().volume_db)
    }

    /// Send a command to the bridge
    ///
    /// Fails immediately with `NotConnected` unless a session is up;
    /// nothing is queued for later. [`Command::Reconnect`] is handled
    /// locally and succeeds in any state.
    pub async fn send(&self, command: Command) -> Result<()> {
        if matches!(command, Command::Reconnect) {
            self.reconnect();
            return Ok(());
        }

        command.validate()?;
        let frame = protocol::encode(&command)
            .ok_or_else(|| SendError::EncodeFailure(command.name().to_string()))?;

        let sender = lock(&self.shared.sender)
            .clone()
            .ok_or(SendError::NotConnected)?;

        tracing::debug!("Sending {}: {}", command.name(), frame);
        sender.send(frame, self.shared.config.send_timeout).await?;
        Ok(())
    }

    /// Send a query command and wait for its reply payload
    pub async fn request(&self, command: Command) -> Result<Value> {
        let kind = command.response_kind().ok_or_else(|| {
            CommandError::InvalidArgument(format!("{} has no reply", command.name()))
        })?;

        // Register before sending so a fast reply is not missed. The
        // registration outlives `rx`, so its drop sees this waiter closed.
        let _registration = PendingReply {
            pending: &self.shared.pending,
            kind,
        };
        let (tx, rx) = oneshot::channel();
        lock(&self.shared.pending).entry(kind).or_default().push(tx);

        self.send(command).await?;

        match tokio::time::timeout(self.shared.config.request_timeout, rx).await {
            Ok(Ok(payload)) => Ok(payload),
            Ok(Err(_)) => Err(SendError::NotConnected.into()),
            Err(_) => Err(PianobarError::ResponseTimeout(kind)),
        }
    }

    /// Run a named action with JSON arguments
    ///
    /// Returns the reply payload for query actions and `None` otherwise.
    pub async fn perform(&self, name: &str, args: &Value) -> Result<Option<Value>> {
        let action = actions::lookup(name)
            .ok_or_else(|| CommandError::InvalidArgument(format!("unknown action '{}'", name)))?;

        let command = {
            let model = lock(&self.shared.model);
            let ctx = ActionContext {
                state: model.state(),
                curve: model.curve(),
            };
            action.build(args, &ctx)?
        };

        if command.response_kind().is_some() {
            self.request(command).await.map(Some)
        } else {
            self.send(command).await.map(|_| None)
        }
    }

    /// Reconnect now
    ///
    /// Starts the loop if it is stopped and cuts a pending backoff short.
    /// Does nothing while connected or connecting.
    pub fn reconnect(&self) {
        match self.connection_state() {
            ConnectionState::Reconnecting => {
                tracing::info!("Reconnect requested, skipping backoff");
                self.shared.wake.notify_one();
            }
            ConnectionState::Connected | ConnectionState::Connecting => {
                tracing::info!("Already connected to pianobar");
            }
            ConnectionState::Disconnected | ConnectionState::Closing => {
                if self.is_running() {
                    tracing::debug!("Reconnect requested while the loop is shutting down");
                } else {
                    self.start();
                }
            }
        }
    }

    pub async fn play(&self) -> Result<()> {
        self.send(Command::Play).await
    }

    pub async fn pause(&self) -> Result<()> {
        self.send(Command::Pause).await
    }

    pub async fn next(&self) -> Result<()> {
        self.send(Command::Next).await
    }

    pub async fn turn_on(&self) -> Result<()> {
        self.send(Command::Play).await
    }

    /// Pause, or resume if already paused (a paused player still counts as on)
    pub async fn turn_off(&self) -> Result<()> {
        if self.snapshot().playback == Playback::Paused {
            self.send(Command::Play).await
        } else {
            self.send(Command::Pause).await
        }
    }

    /// Set the volume from a 0-100 percentage
    pub async fn set_volume_percent(&self, percent: u8) -> Result<()> {
        if percent > 100 {
            return Err(CommandError::InvalidArgument(format!(
                "volume percent must be within 0..=100, got {}",
                percent
            ))
            .into());
        }
        let db = self.volume_curve().percent_to_db(percent);
        self.send(Command::SetVolume { db }).await
    }

    pub async fn select_station(&self, station_id: impl Into<StationId>) -> Result<()> {
        self.send(Command::SelectStation {
            station_id: station_id.into(),
        })
        .await
    }

    /// Switch to the station with the given display name
    pub async fn select_source(&self, name: &str) -> Result<()> {
        let station_id = self
            .snapshot()
            .stations
            .by_name(name)
            .map(|s| s.id.clone())
            .ok_or_else(|| CommandError::InvalidArgument(format!("station not found: {}", name)))?;
        self.select_station(station_id).await
    }

    /// Play a station given its id or display name
    pub async fn play_media(&self, id_or_name: &str) -> Result<()> {
        let station_id = self
            .snapshot()
            .stations
            .find(id_or_name)
            .map(|s| s.id.clone())
            .ok_or_else(|| {
                CommandError::InvalidArgument(format!("station not found: {}", id_or_name))
            })?;
        self.select_station(station_id).await
    }

    /// Create a station seeded from the song currently playing
    pub async fn create_station(&self, seed: StationSeed) -> Result<()> {
        let track_token = self
            .snapshot()
            .current_song
            .and_then(|song| song.track_token)
            .ok_or_else(|| {
                CommandError::InvalidArgument("no track token available".to_string())
            })?;
        self.send(Command::CreateStation { track_token, seed }).await
    }
}

type PendingMap = Mutex<HashMap<ResponseKind, Vec<oneshot::Sender<Value>>>>;

/// Drops a request's reply waiter once the caller stops waiting
struct PendingReply<'a> {
    pending: &'a PendingMap,
    kind: ResponseKind,
}

impl Drop for PendingReply<'_> {
    fn drop(&mut self) {
        let mut pending = lock(self.pending);
        if let Some(waiters) = pending.get_mut(&self.kind) {
            waiters.retain(|tx| !tx.is_closed());
            if waiters.is_empty() {
                pending.remove(&self.kind);
            }
        }
    }
}

impl Shared {
    fn set_connection(&self, state: ConnectionState) {
        let previous = self.connection.send_replace(state);
        if previous != state {
            tracing::debug!("Connection state {:?} -> {:?}", previous, state);
            let _ = self.updates.send(StateUpdate::Connection(state));
        }
    }

    fn notify(&self, delta: StateDelta) {
        if !delta.is_empty() {
            let _ = self.updates.send(StateUpdate::State(delta));
        }
    }

    fn record_error(&self, message: String) {
        let delta = lock(&self.model).record_error(ErrorInfo::new(message));
        self.notify(delta);
    }

    /// Read frames until the session ends, applying each event in order
    async fn receive_loop(&self, session: &mut Session) -> RecvError {
        loop {
            let frame = match session.receive().await {
                Ok(frame) => frame,
                Err(e) => return e,
            };
            tracing::debug!("Received: {}", frame);

            match protocol::decode(&frame) {
                Ok(event) => self.handle_event(event),
                Err(e) => {
                    tracing::warn!("Discarding frame: {}", e);
                    self.record_error(e.to_string());
                }
            }
        }
    }

    fn handle_event(&self, event: Event) {
        match &event {
            Event::Response(kind, payload) => self.resolve_pending(*kind, payload),
            Event::Unknown(raw) => tracing::debug!("Ignoring frame: {}", raw),
            _ => {}
        }

        let delta = lock(&self.model).apply(&event);
        self.notify(delta);
    }

    fn resolve_pending(&self, kind: ResponseKind, payload: &Value) {
        let waiters = lock(&self.pending).remove(&kind).unwrap_or_default();
        if waiters.is_empty() {
            tracing::debug!("Unsolicited {} reply", kind);
        }
        for waiter in waiters {
            let _ = waiter.send(payload.clone());
        }
    }

    /// Clear everything after the loop has ended
    fn finish_disconnect(&self) {
        *lock(&self.sender) = None;
        lock(&self.pending).clear();
        let delta = lock(&self.model).reset();
        self.set_connection(ConnectionState::Disconnected);
        self.notify(delta);
        tracing::info!("Disconnected from pianobar");
    }
}

/// The connection loop
async fn run(shared: Arc<Shared>, mut stop_rx: oneshot::Receiver<()>) {
    let backoff = Backoff::from_config(&shared.config);
    let endpoint = shared.config.endpoint();

    loop {
        shared.set_connection(ConnectionState::Connecting);

        let result = tokio::select! {
            _ = &mut stop_rx => break,
            result = shared.transport.connect(&endpoint, shared.config.connect_timeout) => result,
        };

        let failed_connect = match result {
            Ok(mut session) => {
                shared.attempt.store(0, Ordering::SeqCst);
                *lock(&shared.sender) = Some(session.sender());
                shared.set_connection(ConnectionState::Connected);
                tracing::info!("Connected to pianobar at {}", endpoint);

                // Ask for a full snapshot and the station list
                if let Some(query) = protocol::encode(&Command::Query) {
                    if let Err(e) = session.send(query, shared.config.send_timeout).await {
                        tracing::warn!("Failed to request initial state: {}", e);
                    }
                }

                let lost = tokio::select! {
                    _ = &mut stop_rx => None,
                    e = shared.receive_loop(&mut session) => Some(e),
                };

                *lock(&shared.sender) = None;
                session.close();

                let Some(e) = lost else { break };

                tracing::warn!("Connection to pianobar lost: {}", e);
                lock(&shared.pending).clear();
                let delta = lock(&shared.model).clear_playback();
                shared.notify(delta);
                shared.record_error(format!("connection lost: {}", e));
                false
            }
            Err(e) => {
                tracing::warn!("Failed to connect to {}: {}", endpoint, e);
                shared.record_error(format!("connect failed: {}", e));
                true
            }
        };

        // A session that was up restarts the schedule at `base`; each failed
        // connect doubles it
        let attempt = if failed_connect {
            shared.attempt.fetch_add(1, Ordering::SeqCst) + 1
        } else {
            shared.attempt.load(Ordering::SeqCst)
        };
        let delay = backoff.next_delay(attempt);

        // Discard a wake-up left over from an earlier backoff
        let _ = shared.wake.notified().now_or_never();
        shared.set_connection(ConnectionState::Reconnecting);
        tracing::info!(
            "Reconnecting in {:?} ({} failed attempts)",
            delay,
            attempt
        );

        tokio::select! {
            _ = &mut stop_rx => break,
            _ = tokio::time::sleep(delay) => {}
            _ = shared.wake.notified() => {}
        }
    }

    shared.set_connection(ConnectionState::Closing);
    shared.finish_disconnect();
}

/// Lock a mutex, recovering the data if a panicking thread poisoned it
fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ConnectError;
    use crate::protocol::Frame;
    use futures_util::future::BoxFuture;
    use serde_json::json;
    use std::collections::VecDeque;
    use std::time::Instant;
    use tokio::sync::mpsc;

    const WAIT: Duration = Duration::from_secs(2);

    /// Server side of a scripted session
    struct Peer {
        outgoing: mpsc::Receiver<Frame>,
        incoming: mpsc::Sender<std::result::Result<Frame, RecvError>>,
    }

    impl Peer {
        async fn next_frame(&mut self) -> String {
            tokio::time::timeout(WAIT, self.outgoing.recv())
                .await
                .expect("timed out waiting for a frame")
                .expect("session closed")
                .into_string()
        }

        async fn push(&self, text: &str) {
            self.incoming.send(Ok(Frame::new(text))).await.unwrap();
        }

        async fn close(&self) {
            self.incoming.send(Err(RecvError::Closed)).await.unwrap();
        }
    }

    enum Outcome {
        Refuse,
        Accept(Session),
    }

    /// Transport that hands out pre-arranged connect results in order
    #[derive(Clone, Default)]
    struct ScriptedTransport {
        script: Arc<Mutex<VecDeque<Outcome>>>,
        connects: Arc<AtomicU32>,
        attempted_at: Arc<Mutex<Vec<Instant>>>,
    }

    impl ScriptedTransport {
        fn refuse(&self) {
            lock(&self.script).push_back(Outcome::Refuse);
        }

        fn accept(&self) -> Peer {
            let (out_tx, out_rx) = mpsc::channel(16);
            let (in_tx, in_rx) = mpsc::channel(16);
            lock(&self.script).push_back(Outcome::Accept(Session::new(out_tx, in_rx)));
            Peer {
                outgoing: out_rx,
                incoming: in_tx,
            }
        }

        fn connects(&self) -> u32 {
            self.connects.load(Ordering::SeqCst)
        }

        /// Time between consecutive connect attempts
        fn gaps(&self) -> Vec<Duration> {
            let attempted_at = lock(&self.attempted_at);
            attempted_at.windows(2).map(|w| w[1] - w[0]).collect()
        }
    }

    impl Transport for ScriptedTransport {
        fn connect<'a>(
            &'a self,
            _endpoint: &'a str,
            _timeout: Duration,
        ) -> BoxFuture<'a, std::result::Result<Session, ConnectError>> {
            self.connects.fetch_add(1, Ordering::SeqCst);
            lock(&self.attempted_at).push(Instant::now());
            let next = lock(&self.script).pop_front();
            Box::pin(async move {
                match next {
                    Some(Outcome::Accept(session)) => Ok(session),
                    Some(Outcome::Refuse) => Err(ConnectError::Refused("scripted".to_string())),
                    None => Err(ConnectError::Timeout),
                }
            })
        }
    }

    fn test_config() -> CoordinatorConfig {
        CoordinatorConfig::new("pianobar.test", 8080)
            .with_reconnect_delays(Duration::from_millis(20), Duration::from_millis(100))
            .with_reconnect_jitter(0.0)
            .with_request_timeout(Duration::from_millis(200))
    }

    fn coordinator(transport: &ScriptedTransport) -> Coordinator {
        Coordinator::with_transport(test_config(), transport.clone()).unwrap()
    }

    async fn wait_for(coordinator: &Coordinator, target: ConnectionState) {
        let mut rx = coordinator.watch_connection();
        tokio::time::timeout(WAIT, rx.wait_for(|state| *state == target))
            .await
            .unwrap_or_else(|_| panic!("never reached {:?}", target))
            .unwrap();
    }

    /// Collect state notifications until none arrive for a short while
    async fn drain_state_updates(rx: &mut StateReceiver) -> Vec<StateDelta> {
        let mut deltas = Vec::new();
        while let Ok(Ok(update)) = tokio::time::timeout(Duration::from_millis(100), rx.recv()).await
        {
            if let StateUpdate::State(delta) = update {
                deltas.push(delta);
            }
        }
        deltas
    }

    #[tokio::test]
    async fn send_while_disconnected_fails_fast() {
        let transport = ScriptedTransport::default();
        let coordinator = coordinator(&transport);

        let result = coordinator.send(Command::Play).await;
        assert!(matches!(result, Err(PianobarError::Send(SendError::NotConnected))));
        assert_eq!(transport.connects(), 0);
        assert_eq!(coordinator.connection_state(), ConnectionState::Disconnected);
    }

    #[tokio::test]
    async fn invalid_arguments_are_rejected_before_the_socket() {
        let transport = ScriptedTransport::default();
        let mut peer = transport.accept();
        let coordinator = coordinator(&transport);
        coordinator.start();
        wait_for(&coordinator, ConnectionState::Connected).await;
        peer.next_frame().await;

        let result = coordinator
            .send(Command::RenameStation {
                station_id: "1".into(),
                name: String::new(),
            })
            .await;
        assert!(matches!(
            result,
            Err(PianobarError::Command(CommandError::InvalidArgument(_)))
        ));
        assert!(matches!(
            coordinator.set_volume_percent(101).await,
            Err(PianobarError::Command(_))
        ));
        assert!(peer.outgoing.try_recv().is_err());

        coordinator.stop().await;
    }

    #[tokio::test]
    async fn process_snapshot_is_mirrored_with_one_notification() {
        let transport = ScriptedTransport::default();
        let mut peer = transport.accept();
        let coordinator = coordinator(&transport);
        let mut updates = coordinator.subscribe();

        coordinator.start();
        wait_for(&coordinator, ConnectionState::Connected).await;
        assert_eq!(peer.next_frame().await, r#"2["query",null]"#);

        peer.push(
            r#"2["process",{"playing":true,"paused":false,"volume":-10,
            "song":{"title":"X","artist":"Y"}}]"#,
        )
        .await;

        let deltas = drain_state_updates(&mut updates).await;
        assert_eq!(deltas.len(), 1);

        let state = coordinator.snapshot();
        assert_eq!(state.playback, Playback::Playing);
        assert_eq!(state.volume_db, -10.0);
        let song = state.current_song.unwrap();
        assert_eq!(song.title, "X");
        assert_eq!(song.artist, "Y");
        assert_eq!(coordinator.volume_percent(), 32);

        coordinator.stop().await;
    }

    #[tokio::test]
    async fn reconnects_after_clean_close() {
        let transport = ScriptedTransport::default();
        let mut first = transport.accept();
        let mut second = transport.accept();
        let coordinator = coordinator(&transport);
        let mut updates = coordinator.subscribe();

        coordinator.start();
        wait_for(&coordinator, ConnectionState::Connected).await;
        first.next_frame().await;
        first.push(r#"2["stations",[{"id":"1","name":"Jazz"}]]"#).await;
        first.push(r#"2["start",{"title":"A","artist":"B","stationId":"1"}]"#).await;
        first.close().await;

        assert_eq!(second.next_frame().await, r#"2["query",null]"#);
        wait_for(&coordinator, ConnectionState::Connected).await;

        let mut transitions = Vec::new();
        while let Ok(update) = updates.try_recv() {
            match update {
                Some(StateUpdate::Connection(state)) => transitions.push(state),
                Some(StateUpdate::State(_)) => {}
                None => break,
            }
        }
        assert_eq!(
            transitions,
            vec![
                ConnectionState::Connecting,
                ConnectionState::Connected,
                ConnectionState::Reconnecting,
                ConnectionState::Connecting,
                ConnectionState::Connected,
            ]
        );
        assert_eq!(coordinator.reconnect_attempt(), 0);
        assert_eq!(transport.connects(), 2);

        // Loss clears playback but keeps the station list
        let state = coordinator.snapshot();
        assert_eq!(state.playback, Playback::Idle);
        assert!(state.current_song.is_none());
        assert_eq!(state.stations.len(), 1);
        assert!(state.last_error.is_some());

        coordinator.stop().await;
    }

    #[tokio::test]
    async fn backs_off_through_connect_failures() {
        let transport = ScriptedTransport::default();
        transport.refuse();
        transport.refuse();
        let _peer = transport.accept();
        let coordinator = coordinator(&transport);

        coordinator.start();
        wait_for(&coordinator, ConnectionState::Connected).await;

        assert_eq!(transport.connects(), 3);
        assert_eq!(coordinator.reconnect_attempt(), 0);
        let error = coordinator.snapshot().last_error.unwrap();
        assert!(error.message.contains("connect failed"));

        coordinator.stop().await;
    }

    #[tokio::test]
    async fn each_failed_connect_doubles_the_wait() {
        let transport = ScriptedTransport::default();
        transport.refuse();
        transport.refuse();
        transport.refuse();
        let _peer = transport.accept();
        let config = test_config()
            .with_reconnect_delays(Duration::from_millis(50), Duration::from_secs(1));
        let coordinator = Coordinator::with_transport(config, transport.clone()).unwrap();

        coordinator.start();
        wait_for(&coordinator, ConnectionState::Connected).await;

        let gaps = transport.gaps();
        assert_eq!(gaps.len(), 3);
        for (gap, expected_ms) in gaps.iter().zip([100, 200, 400]) {
            let expected = Duration::from_millis(expected_ms);
            assert!(*gap >= expected, "waited {:?}, expected {:?}", gap, expected);
            assert!(
                *gap < expected + Duration::from_millis(150),
                "waited {:?}, expected {:?}",
                gap,
                expected
            );
        }

        coordinator.stop().await;
    }

    #[tokio::test]
    async fn lost_session_retries_after_the_base_delay() {
        let transport = ScriptedTransport::default();
        let peer = transport.accept();
        let _second = transport.accept();
        let config = test_config()
            .with_reconnect_delays(Duration::from_millis(100), Duration::from_secs(1));
        let coordinator = Coordinator::with_transport(config, transport.clone()).unwrap();

        coordinator.start();
        wait_for(&coordinator, ConnectionState::Connected).await;
        let lost_at = Instant::now();
        peer.close().await;
        wait_for(&coordinator, ConnectionState::Reconnecting).await;
        wait_for(&coordinator, ConnectionState::Connected).await;

        assert_eq!(transport.connects(), 2);
        let waited = lost_at.elapsed();
        assert!(waited >= Duration::from_millis(100), "waited {:?}", waited);
        assert!(waited < Duration::from_millis(250), "waited {:?}", waited);

        coordinator.stop().await;
    }

    #[tokio::test]
    async fn late_wake_up_does_not_cut_the_next_backoff() {
        let transport = ScriptedTransport::default();
        let peer = transport.accept();
        let config = test_config()
            .with_reconnect_delays(Duration::from_secs(30), Duration::from_secs(60));
        let coordinator = Coordinator::with_transport(config, transport.clone()).unwrap();

        coordinator.start();
        wait_for(&coordinator, ConnectionState::Connected).await;

        // Left behind by a reconnect request that arrived as a retry fired
        coordinator.shared.wake.notify_one();
        peer.close().await;
        wait_for(&coordinator, ConnectionState::Reconnecting).await;

        tokio::time::sleep(Duration::from_millis(200)).await;
        assert_eq!(coordinator.connection_state(), ConnectionState::Reconnecting);
        assert_eq!(transport.connects(), 1);

        coordinator.stop().await;
    }

    #[tokio::test]
    async fn malformed_frames_do_not_drop_the_session() {
        let transport = ScriptedTransport::default();
        let mut peer = transport.accept();
        let coordinator = coordinator(&transport);
        let mut updates = coordinator.subscribe();

        coordinator.start();
        wait_for(&coordinator, ConnectionState::Connected).await;
        peer.next_frame().await;

        peer.push(r#"2["invalid"#).await;
        peer.push(r#"2["lyrics",{"line":"la"}]"#).await;
        peer.push(r#"2["volume",-20]"#).await;

        let deltas = drain_state_updates(&mut updates).await;
        assert_eq!(deltas.len(), 2);
        assert!(deltas[0].last_error);
        assert!(deltas[1].volume);
        assert_eq!(coordinator.snapshot().volume_db, -20.0);
        assert!(coordinator.is_connected());
        assert_eq!(transport.connects(), 1);

        coordinator.stop().await;
    }

    #[tokio::test]
    async fn commands_reach_the_wire() {
        let transport = ScriptedTransport::default();
        let mut peer = transport.accept();
        let coordinator = coordinator(&transport);
        coordinator.start();
        wait_for(&coordinator, ConnectionState::Connected).await;
        peer.next_frame().await;

        peer.push(r#"2["stations",[{"id":"7","name":"Blues"}]]"#).await;
        drain_state_updates(&mut coordinator.subscribe()).await;

        coordinator.pause().await.unwrap();
        assert_eq!(peer.next_frame().await, r#"2["action","playback.pause"]"#);

        coordinator.select_source("Blues").await.unwrap();
        assert_eq!(peer.next_frame().await, r#"2["station.change","7"]"#);

        coordinator.set_volume_percent(100).await.unwrap();
        let frame = peer.next_frame().await;
        let body: Value = serde_json::from_str(&frame[1..]).unwrap();
        assert_eq!(body, json!(["action", { "action": "volume.set", "volume": 0.0 }]));

        assert!(coordinator.select_source("Rock").await.is_err());

        coordinator.stop().await;
    }

    #[tokio::test]
    async fn request_returns_the_reply_payload() {
        let transport = ScriptedTransport::default();
        let mut peer = transport.accept();
        let coordinator = Arc::new(coordinator(&transport));
        coordinator.start();
        wait_for(&coordinator, ConnectionState::Connected).await;
        peer.next_frame().await;

        let requester = coordinator.clone();
        let reply = tokio::spawn(async move { requester.perform("get_upcoming", &json!({})).await });

        assert_eq!(peer.next_frame().await, r#"2["action","query.upcoming"]"#);
        peer.push(r#"2["upcoming",[{"title":"Next Song"}]]"#).await;

        let payload = reply.await.unwrap().unwrap();
        assert_eq!(payload, Some(json!([{ "title": "Next Song" }])));

        coordinator.stop().await;
    }

    #[tokio::test]
    async fn request_without_reply_times_out() {
        let transport = ScriptedTransport::default();
        let mut peer = transport.accept();
        let coordinator = coordinator(&transport);
        coordinator.start();
        wait_for(&coordinator, ConnectionState::Connected).await;
        peer.next_frame().await;

        let result = coordinator.request(Command::GetGenres).await;
        assert!(matches!(
            result,
            Err(PianobarError::ResponseTimeout(ResponseKind::Genres))
        ));
        assert!(coordinator.request(Command::Play).await.is_err());
        assert!(lock(&coordinator.shared.pending).is_empty());

        coordinator.stop().await;
    }

    #[tokio::test]
    async fn failed_requests_leave_no_waiters_behind() {
        let transport = ScriptedTransport::default();
        let coordinator = coordinator(&transport);

        for _ in 0..20 {
            let result = coordinator.request(Command::GetUpcoming).await;
            assert!(matches!(result, Err(PianobarError::Send(SendError::NotConnected))));
        }
        assert!(lock(&coordinator.shared.pending).is_empty());
    }

    #[tokio::test]
    async fn abandoned_request_releases_its_waiter() {
        let transport = ScriptedTransport::default();
        let mut peer = transport.accept();
        let coordinator = Arc::new(coordinator(&transport));
        coordinator.start();
        wait_for(&coordinator, ConnectionState::Connected).await;
        peer.next_frame().await;

        let requester = coordinator.clone();
        let request = tokio::spawn(async move { requester.request(Command::GetGenres).await });
        peer.next_frame().await;
        assert!(!lock(&coordinator.shared.pending).is_empty());

        request.abort();
        let _ = request.await;
        assert!(lock(&coordinator.shared.pending).is_empty());

        coordinator.stop().await;
    }

    #[tokio::test]
    async fn stop_resets_state_and_allows_restart() {
        let transport = ScriptedTransport::default();
        let mut first = transport.accept();
        let coordinator = coordinator(&transport);
        coordinator.start();
        coordinator.start();
        wait_for(&coordinator, ConnectionState::Connected).await;
        first.next_frame().await;
        first.push(r#"2["stations",[{"id":"1","name":"Jazz"}]]"#).await;
        drain_state_updates(&mut coordinator.subscribe()).await;

        coordinator.stop().await;
        assert_eq!(coordinator.connection_state(), ConnectionState::Disconnected);
        assert_eq!(coordinator.snapshot(), PlayerState::empty(10.0));
        assert!(matches!(
            coordinator.send(Command::Next).await,
            Err(PianobarError::Send(SendError::NotConnected))
        ));
        assert_eq!(transport.connects(), 1);

        let mut second = transport.accept();
        coordinator.start();
        wait_for(&coordinator, ConnectionState::Connected).await;
        assert_eq!(second.next_frame().await, r#"2["query",null]"#);
        coordinator.stop().await;
    }

    #[tokio::test]
    async fn reconnect_command_skips_the_backoff() {
        let transport = ScriptedTransport::default();
        transport.refuse();
        let _peer = transport.accept();
        let config = test_config()
            .with_reconnect_delays(Duration::from_secs(30), Duration::from_secs(60));
        let coordinator = Coordinator::with_transport(config, transport.clone()).unwrap();

        coordinator.start();
        wait_for(&coordinator, ConnectionState::Reconnecting).await;
        coordinator.send(Command::Reconnect).await.unwrap();
        wait_for(&coordinator, ConnectionState::Connected).await;
        assert_eq!(transport.connects(), 2);

        coordinator.stop().await;
    }

    #[tokio::test]
    async fn reconnect_command_starts_a_stopped_coordinator() {
        let transport = ScriptedTransport::default();
        let _peer = transport.accept();
        let coordinator = coordinator(&transport);

        coordinator.perform("reconnect", &json!({})).await.unwrap();
        wait_for(&coordinator, ConnectionState::Connected).await;
        assert!(coordinator.is_running());

        coordinator.stop().await;
        assert!(!coordinator.is_running());
    }
}

//! # Acquisition Engine
//!
//! ## Overview
//! Owns the acquisition mode state machine and produces exactly one packet
//! per [`DataEngine::get_packet`] call, even when the live cell has never
//! been written or the replay buffer is still loading. Persistence and
//! replay reloads run on background tasks so packet production never waits
//! on I/O.
//!
//! ## Key Behaviors
//! - `get_packet` and `set_mode` are synchronous; they must be called from
//!   within a Tokio runtime because they hand work to spawned tasks.
//! - A store that fails to open downgrades the engine to memory-only
//!   operation. Every packet path still works.
//! - Replay reloads are tagged with the controller epoch; a reload that
//!   resolves after a later mode change is discarded unseen.
//! - Replay mode persists nothing, not even synthetic stand-ins, so cycling
//!   through history never feeds the history back into itself.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::{mpsc, oneshot, watch};

use crate::connections::ReadingStore;
use crate::core::replay::ReplayBuffer;
use crate::core::synthetic::SyntheticGenerator;
use crate::readings::Reading;

/// Where packets come from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AcquisitionMode {
    /// Most recent reading from the sensor feed.
    Live,
    /// Synthetic generator output.
    Simulation,
    /// Cycle through persisted history.
    Replay,
}

impl Default for AcquisitionMode {
    fn default() -> Self {
        AcquisitionMode::Simulation
    }
}

impl fmt::Display for AcquisitionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let token = match self {
            AcquisitionMode::Live => "live",
            AcquisitionMode::Simulation => "simulation",
            AcquisitionMode::Replay => "replay",
        };
        write!(f, "{token}")
    }
}

#[derive(Error, Debug)]
#[error("unknown acquisition mode '{0}'")]
pub struct UnknownModeError(String);

impl FromStr for AcquisitionMode {
    type Err = UnknownModeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "live" => Ok(AcquisitionMode::Live),
            "simulation" => Ok(AcquisitionMode::Simulation),
            "replay" => Ok(AcquisitionMode::Replay),
            other => Err(UnknownModeError(other.to_string())),
        }
    }
}

/// Result of a mode transition that the engine must act on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransitionEffect {
    /// Entering replay: reload the replay buffer from the store.
    ReloadReplay,
}

/// Mode state machine.
///
/// Every applied transition bumps `epoch`; asynchronous work started on
/// behalf of an older epoch must be discarded when it completes.
#[derive(Debug)]
pub struct ModeController {
    mode: AcquisitionMode,
    epoch: u64,
}

impl ModeController {
    pub fn new() -> Self {
        Self {
            mode: AcquisitionMode::Simulation,
            epoch: 0,
        }
    }

    pub fn mode(&self) -> AcquisitionMode {
        self.mode
    }

    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    /// Applies a transition and reports what the engine must do about it.
    /// Setting replay re-triggers a reload even when already replaying.
    pub fn apply(&mut self, next: AcquisitionMode) -> Option<TransitionEffect> {
        self.mode = next;
        self.epoch += 1;
        match next {
            AcquisitionMode::Replay => Some(TransitionEffect::ReloadReplay),
            _ => None,
        }
    }
}

impl Default for ModeController {
    fn default() -> Self {
        Self::new()
    }
}

/// Payload of a finished replay reload, tagged with the epoch it was
/// started under.
struct ReplayLoad {
    epoch: u64,
    readings: Vec<Reading>,
}

/// Mode-aware packet source with fire-and-forget persistence.
pub struct DataEngine<S> {
    controller: ModeController,
    synth: SyntheticGenerator,
    replay: ReplayBuffer,
    live_rx: watch::Receiver<Option<Reading>>,
    store: Option<S>,
    writer_tx: Option<mpsc::UnboundedSender<Reading>>,
    reload_rx: Option<oneshot::Receiver<ReplayLoad>>,
}

impl<S> DataEngine<S>
where
    S: ReadingStore + Clone + Send + 'static,
{
    /// Builds the engine, opening the store and starting the persistence
    /// writer. A store that fails to open is dropped and acquisition runs
    /// memory-only.
    pub async fn new(
        store: Option<S>,
        live_rx: watch::Receiver<Option<Reading>>,
        synth: SyntheticGenerator,
    ) -> Self {
        let store = match store {
            Some(mut backend) => match backend.open().await {
                Ok(()) => Some(backend),
                Err(e) => {
                    log::error!("Reading store unavailable, continuing without persistence: {e}");
                    None
                }
            },
            None => None,
        };
        let writer_tx = store.clone().map(spawn_writer);

        Self {
            controller: ModeController::new(),
            synth,
            replay: ReplayBuffer::new(),
            live_rx,
            store,
            writer_tx,
            reload_rx: None,
        }
    }

    pub fn mode(&self) -> AcquisitionMode {
        self.controller.mode()
    }

    /// Whether the store opened successfully at construction.
    pub fn store_available(&self) -> bool {
        self.store.is_some()
    }

    pub fn replay_len(&self) -> usize {
        self.replay.len()
    }

    /// Switches acquisition mode. Entering replay kicks off an asynchronous
    /// reload of the replay buffer; any reload still in flight from an
    /// earlier transition is abandoned.
    pub fn set_mode(&mut self, mode: AcquisitionMode) {
        self.reload_rx = None;
        if let Some(TransitionEffect::ReloadReplay) = self.controller.apply(mode) {
            self.start_reload();
        }
        log::debug!("Acquisition mode -> {mode} (epoch {})", self.controller.epoch());
    }

    /// Produces the next packet for the current mode. Never blocks and never
    /// fails; every mode has a synthetic stand-in for its empty case.
    pub fn get_packet(&mut self) -> Reading {
        self.poll_reload();

        let packet = match self.controller.mode() {
            AcquisitionMode::Live => {
                let live = self.live_rx.borrow().clone();
                match live {
                    Some(reading) => reading,
                    None => self.synth.generate(),
                }
            }
            AcquisitionMode::Simulation => self.synth.generate(),
            AcquisitionMode::Replay => match self.replay.next() {
                Some(reading) => reading,
                None => self.synth.generate(),
            },
        };

        if self.controller.mode() != AcquisitionMode::Replay {
            if let Some(writer) = &self.writer_tx {
                let _ = writer.send(packet.clone());
            }
        }

        packet
    }

    /// Applies a finished replay reload, unless the mode has changed since
    /// the reload was started.
    fn poll_reload(&mut self) {
        let Some(rx) = &mut self.reload_rx else {
            return;
        };
        match rx.try_recv() {
            Ok(load) => {
                self.reload_rx = None;
                if load.epoch == self.controller.epoch() {
                    self.replay.load(load.readings);
                    log::info!("Replay buffer loaded with {} readings", self.replay.len());
                } else {
                    log::debug!(
                        "Discarding stale replay reload (epoch {} != {})",
                        load.epoch,
                        self.controller.epoch()
                    );
                }
            }
            Err(oneshot::error::TryRecvError::Empty) => {}
            Err(oneshot::error::TryRecvError::Closed) => {
                self.reload_rx = None;
                log::warn!("Replay reload task vanished before completing");
            }
        }
    }

    fn start_reload(&mut self) {
        let Some(store) = &self.store else {
            self.replay.clear();
            log::warn!("Replay requested without a store; serving synthetic stand-ins");
            return;
        };

        let epoch = self.controller.epoch();
        let (tx, rx) = oneshot::channel();
        self.reload_rx = Some(rx);
        let mut store = store.clone();
        tokio::spawn(async move {
            let readings = match store.get_all().await {
                Ok(readings) => readings,
                Err(e) => {
                    log::error!("Replay reload failed, buffer will be empty: {e}");
                    Vec::new()
                }
            };
            let _ = tx.send(ReplayLoad { epoch, readings });
        });
    }
}

/// Drains queued readings into the store on a dedicated task. Failed writes
/// are logged and dropped.
fn spawn_writer<S>(mut store: S) -> mpsc::UnboundedSender<Reading>
where
    S: ReadingStore + Send + 'static,
{
    let (tx, mut rx) = mpsc::unbounded_channel::<Reading>();
    tokio::spawn(async move {
        while let Some(reading) = rx.recv().await {
            if let Err(e) = store.put(&reading).await {
                log::warn!("Dropping persist of reading {}: {e}", reading.timestamp);
            }
        }
    });
    tx
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connections::StoreError;
    use std::sync::{Arc, Mutex};

    #[derive(Clone, Default)]
    struct MemStore {
        readings: Arc<Mutex<Vec<Reading>>>,
        fail_open: bool,
    }

    impl MemStore {
        fn preloaded(readings: Vec<Reading>) -> Self {
            Self {
                readings: Arc::new(Mutex::new(readings)),
                fail_open: false,
            }
        }

        fn failing() -> Self {
            Self {
                fail_open: true,
                ..Self::default()
            }
        }

        fn stored(&self) -> Vec<Reading> {
            self.readings.lock().unwrap().clone()
        }
    }

    impl ReadingStore for MemStore {
        async fn open(&mut self) -> Result<(), StoreError> {
            if self.fail_open {
                Err(StoreError::NotOpen)
            } else {
                Ok(())
            }
        }

        async fn put(&mut self, reading: &Reading) -> Result<(), StoreError> {
            let mut guard = self.readings.lock().unwrap();
            if let Some(existing) = guard.iter_mut().find(|r| r.timestamp == reading.timestamp) {
                *existing = reading.clone();
            } else {
                guard.push(reading.clone());
            }
            Ok(())
        }

        async fn get_all(&mut self) -> Result<Vec<Reading>, StoreError> {
            Ok(self.readings.lock().unwrap().clone())
        }
    }

    fn reading(ts: i64, aqi: f64) -> Reading {
        Reading {
            timestamp: ts,
            sensor_ppm: aqi * 1.5,
            normalized_aqi: aqi,
        }
    }

    /// Lets spawned writer/reload tasks run on the current-thread runtime.
    async fn settle() {
        for _ in 0..20 {
            tokio::task::yield_now().await;
        }
    }

    #[tokio::test]
    async fn starts_in_simulation_mode() {
        let (_live_tx, live_rx) = watch::channel::<Option<Reading>>(None);
        let mut engine =
            DataEngine::new(None::<MemStore>, live_rx, SyntheticGenerator::new(Some(1))).await;
        assert_eq!(engine.mode(), AcquisitionMode::Simulation);
        let packet = engine.get_packet();
        assert!(packet.normalized_aqi >= 0.0);
        assert!(packet.timestamp > 0);
    }

    #[tokio::test]
    async fn simulation_packets_flow_to_the_store() {
        let store = MemStore::default();
        let (_live_tx, live_rx) = watch::channel::<Option<Reading>>(None);
        let mut engine =
            DataEngine::new(Some(store.clone()), live_rx, SyntheticGenerator::new(Some(1))).await;
        engine.get_packet();
        engine.get_packet();
        settle().await;
        assert!(!store.stored().is_empty());
    }

    #[tokio::test]
    async fn live_mode_reads_cell_and_falls_back_when_empty() {
        let (live_tx, live_rx) = watch::channel::<Option<Reading>>(None);
        let mut engine =
            DataEngine::new(None::<MemStore>, live_rx, SyntheticGenerator::new(Some(2))).await;
        engine.set_mode(AcquisitionMode::Live);

        // nothing received yet: synthetic stand-in
        let stand_in = engine.get_packet();
        assert!(stand_in.normalized_aqi >= 0.0);

        live_tx.send(Some(reading(42, 9.0))).unwrap();
        assert_eq!(engine.get_packet(), reading(42, 9.0));
        // the cell is read without being consumed
        assert_eq!(engine.get_packet(), reading(42, 9.0));
    }

    #[tokio::test]
    async fn replay_cycles_persisted_readings_oldest_first() {
        let store = MemStore::preloaded(vec![reading(30, 3.0), reading(10, 1.0), reading(20, 2.0)]);
        let (_live_tx, live_rx) = watch::channel::<Option<Reading>>(None);
        let mut engine =
            DataEngine::new(Some(store.clone()), live_rx, SyntheticGenerator::new(Some(3))).await;
        engine.set_mode(AcquisitionMode::Replay);
        settle().await;

        let order: Vec<i64> = (0..7).map(|_| engine.get_packet().timestamp).collect();
        assert_eq!(order, vec![10, 20, 30, 10, 20, 30, 10]);

        // replay never persists, so the store is untouched
        settle().await;
        assert_eq!(store.stored().len(), 3);
    }

    #[tokio::test]
    async fn replay_with_empty_store_serves_synthetic_and_persists_nothing() {
        let store = MemStore::default();
        let (_live_tx, live_rx) = watch::channel::<Option<Reading>>(None);
        let mut engine =
            DataEngine::new(Some(store.clone()), live_rx, SyntheticGenerator::new(Some(4))).await;
        engine.set_mode(AcquisitionMode::Replay);
        settle().await;

        let packet = engine.get_packet();
        assert!(packet.timestamp > 0);
        settle().await;
        assert!(store.stored().is_empty());
    }

    #[tokio::test]
    async fn leaving_replay_discards_inflight_reload() {
        let store = MemStore::preloaded(vec![reading(10, 1.0)]);
        let (_live_tx, live_rx) = watch::channel::<Option<Reading>>(None);
        let mut engine =
            DataEngine::new(Some(store.clone()), live_rx, SyntheticGenerator::new(Some(5))).await;
        engine.set_mode(AcquisitionMode::Replay);
        // switch away before the reload task has had a chance to run
        engine.set_mode(AcquisitionMode::Simulation);
        settle().await;

        let packet = engine.get_packet();
        assert_ne!(packet.timestamp, 10);
        assert_eq!(engine.replay_len(), 0);
        assert_eq!(engine.mode(), AcquisitionMode::Simulation);
    }

    #[tokio::test]
    async fn reentering_replay_reloads_fresh_data() {
        let store = MemStore::preloaded(vec![reading(10, 1.0)]);
        let (_live_tx, live_rx) = watch::channel::<Option<Reading>>(None);
        let mut engine =
            DataEngine::new(Some(store.clone()), live_rx, SyntheticGenerator::new(Some(6))).await;
        engine.set_mode(AcquisitionMode::Replay);
        settle().await;
        assert_eq!(engine.get_packet().timestamp, 10);

        // new data arrives behind the engine's back
        store.readings.lock().unwrap().push(reading(20, 2.0));
        engine.set_mode(AcquisitionMode::Replay);
        settle().await;

        // the fresh load is applied on the next read, cursor rewound
        assert_eq!(engine.get_packet().timestamp, 10);
        assert_eq!(engine.replay_len(), 2);
        assert_eq!(engine.get_packet().timestamp, 20);
    }

    #[tokio::test]
    async fn failed_store_open_degrades_to_memory_only() {
        let (_live_tx, live_rx) = watch::channel::<Option<Reading>>(None);
        let mut engine = DataEngine::new(
            Some(MemStore::failing()),
            live_rx,
            SyntheticGenerator::new(Some(7)),
        )
        .await;
        assert!(!engine.store_available());

        engine.set_mode(AcquisitionMode::Replay);
        settle().await;
        let packet = engine.get_packet();
        assert!(packet.normalized_aqi >= 0.0);
    }

    #[test]
    fn controller_bumps_epoch_and_flags_replay_reload() {
        let mut controller = ModeController::new();
        assert_eq!(controller.mode(), AcquisitionMode::Simulation);
        assert_eq!(controller.epoch(), 0);
        assert_eq!(controller.apply(AcquisitionMode::Live), None);
        assert_eq!(controller.epoch(), 1);
        assert_eq!(
            controller.apply(AcquisitionMode::Replay),
            Some(TransitionEffect::ReloadReplay)
        );
        assert_eq!(
            controller.apply(AcquisitionMode::Replay),
            Some(TransitionEffect::ReloadReplay)
        );
        assert_eq!(controller.epoch(), 3);
    }

    #[test]
    fn mode_tokens_parse_exactly() {
        assert_eq!("live".parse::<AcquisitionMode>().unwrap(), AcquisitionMode::Live);
        assert_eq!(
            "simulation".parse::<AcquisitionMode>().unwrap(),
            AcquisitionMode::Simulation
        );
        assert_eq!(
            "replay".parse::<AcquisitionMode>().unwrap(),
            AcquisitionMode::Replay
        );
        assert!("Replay".parse::<AcquisitionMode>().is_err());
        assert!("sim".parse::<AcquisitionMode>().is_err());
        assert_eq!(AcquisitionMode::Replay.to_string(), "replay");
    }
}

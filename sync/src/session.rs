use std::collections::VecDeque;

use fogwarden_core::{
    Blocker, Census, FogCell, FogChange, FogGrid, GridConfig, GridCoord, LoadReport, OpacityCurve, Snapshot,
    VisionCalculator, VisionReport, VisionSource,
};
use fogwarden_protocol::{FogAction, FogEvent, PersistedCell, SessionKey, records_from_snapshot, snapshot_from_records};
use serde::{Deserialize, Serialize};
use web_time::{Instant, SystemTime, UNIX_EPOCH};

use crate::*;

/// Which side of the table a client sits on.
///
/// Only the host's edits are persisted and broadcast, other participants follow the synced state. Nothing here checks
/// who is allowed to be host.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Role {
    Host,
    Observer,
}

impl Role {
    pub const fn is_host(self) -> bool {
        matches!(self, Self::Host)
    }

    const fn default_participant(self) -> &'static str {
        match self {
            Self::Host => "host",
            Self::Observer => "observer",
        }
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BrushMode {
    Reveal,
    Hide,
}

/// One pointer sample of a host brush stroke.
#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct BrushStroke {
    pub x: f32,
    pub y: f32,
    /// Falls back to the configured brush size
    #[serde(default)]
    pub radius: Option<f32>,
    pub mode: BrushMode,
}

/// Result of restoring persisted fog when attaching to a map.
#[derive(Clone, Debug, PartialEq)]
pub enum LoadStatus {
    Restored(LoadReport),
    /// Nothing was stored yet
    Empty,
    /// The store could not be read, the grid shows the default state
    Unavailable(StoreError),
}

impl LoadStatus {
    pub const fn is_unavailable(&self) -> bool {
        matches!(self, Self::Unavailable(_))
    }
}

#[derive(Debug)]
pub struct Joined {
    pub session: FogSession,
    pub status: LoadStatus,
}

/// A write taken out of the session, to be handed to a [`FogStore`].
#[derive(Clone, Debug, PartialEq)]
pub struct PendingWrite {
    pub ticket: FlushTicket,
    pub key: SessionKey,
    pub cells: Vec<PersistedCell>,
}

#[derive(Clone, Debug, PartialEq)]
pub enum FlushOutcome {
    /// Nothing to write yet
    Idle,
    Written { cells: usize },
    /// The grid stays dirty and is retried after the next quiet period
    Failed(StoreError),
}

/// Fog state of one map in one session, with its persistence bookkeeping.
#[derive(Debug)]
pub struct FogSession {
    key: SessionKey,
    role: Role,
    participant: String,
    grid: FogGrid,
    vision: VisionCalculator,
    debouncer: Debouncer,
    brush: BrushConfig,
    outbound: VecDeque<FogEvent>,
}

impl FogSession {
    pub fn new(key: SessionKey, grid_config: GridConfig, role: Role, config: &FogConfig) -> Result<Self> {
        let mut grid = FogGrid::hidden(grid_config)?;
        grid.set_opacity_curve(OpacityCurve::with_explored(config.explored_opacity));
        log::info!(
            "fog session {} ready: {}x{} cells, {:?}",
            key,
            grid_config.cols,
            grid_config.rows,
            role
        );
        Ok(Self {
            key,
            role,
            participant: role.default_participant().into(),
            grid,
            vision: VisionCalculator::new(config.sample_mode),
            debouncer: Debouncer::new(config.debounce()),
            brush: config.brush,
            outbound: VecDeque::new(),
        })
    }

    /// Creates the session and restores persisted fog before any edit can reach it.
    ///
    /// Only configuration problems are errors, a store failure is reported in [`Joined::status`].
    pub async fn join<S: FogStore>(
        key: SessionKey,
        grid_config: GridConfig,
        role: Role,
        config: &FogConfig,
        store: &S,
    ) -> Result<Joined> {
        let mut session = Self::new(key, grid_config, role, config)?;
        let status = session.reload(store).await;
        Ok(Joined { session, status })
    }

    /// Resets the grid to hidden and loads what the store has. Pending local edits are dropped.
    pub async fn reload<S: FogStore>(&mut self, store: &S) -> LoadStatus {
        self.grid.hide_all();
        self.debouncer.reset();
        self.outbound.clear();

        match store.load(&self.key).await {
            Ok(records) if records.is_empty() => {
                log::debug!("no stored fog for {}", self.key);
                LoadStatus::Empty
            }
            Ok(records) => {
                let snapshot = snapshot_from_records(&self.key, self.grid.config(), &records);
                let report = self.grid.load(&snapshot);
                log::info!("restored {} fog cells for {}", report.applied, self.key);
                LoadStatus::Restored(report)
            }
            Err(err) => {
                log::error!("Could not load fog for {}: {}", self.key, err);
                LoadStatus::Unavailable(err)
            }
        }
    }

    pub fn key(&self) -> &SessionKey {
        &self.key
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn participant(&self) -> &str {
        &self.participant
    }

    pub fn set_participant(&mut self, participant: impl Into<String>) {
        self.participant = participant.into();
    }

    /// Read-only view for renderers.
    pub fn grid(&self) -> &FogGrid {
        &self.grid
    }

    pub fn brush_config(&self) -> BrushConfig {
        self.brush
    }

    pub fn set_brush_size(&mut self, size: f32) {
        self.brush.set_size(size);
    }

    pub fn get(&self, col: GridCoord, row: GridCoord) -> FogCell {
        self.grid.get(col, row)
    }

    pub fn get_opacity(&self, x: f32, y: f32) -> f32 {
        self.grid.get_opacity(x, y)
    }

    pub fn snapshot(&self) -> Snapshot {
        self.grid.snapshot()
    }

    pub fn census(&self) -> Census {
        self.grid.census()
    }

    pub fn brush(&mut self, stroke: BrushStroke) -> FogChange {
        let radius = self.brush.radius_for(stroke.radius);
        match stroke.mode {
            BrushMode::Reveal => self.reveal_circle(stroke.x, stroke.y, radius),
            BrushMode::Hide => self.hide_circle(stroke.x, stroke.y, radius),
        }
    }

    pub fn reveal_circle(&mut self, x: f32, y: f32, radius: f32) -> FogChange {
        self.edit(FogAction::Reveal { x, y, radius })
    }

    pub fn hide_circle(&mut self, x: f32, y: f32, radius: f32) -> FogChange {
        self.edit(FogAction::Hide { x, y, radius })
    }

    pub fn reveal_rect(&mut self, x: f32, y: f32, width: f32, height: f32) -> FogChange {
        self.edit(FogAction::RevealRect { x, y, width, height })
    }

    pub fn hide_rect(&mut self, x: f32, y: f32, width: f32, height: f32) -> FogChange {
        self.edit(FogAction::HideRect { x, y, width, height })
    }

    pub fn reveal_all(&mut self) -> FogChange {
        self.edit(FogAction::RevealAll)
    }

    pub fn hide_all(&mut self) -> FogChange {
        self.edit(FogAction::HideAll)
    }

    pub fn toggle(&mut self, col: GridCoord, row: GridCoord) -> FogChange {
        self.edit(FogAction::Toggle { col, row })
    }

    /// Replaces the wall set. Returns how many degenerate walls were dropped.
    pub fn set_blockers(&mut self, blockers: impl IntoIterator<Item = Blocker>) -> usize {
        self.vision.set_blockers(blockers)
    }

    pub fn blockers(&self) -> &[Blocker] {
        self.vision.blockers()
    }

    /// Runs a vision pass with the current source list.
    ///
    /// The host broadcasts the result as a full sync, since viewers do not know the sources.
    pub fn update_vision(&mut self, sources: &[VisionSource]) -> VisionReport {
        let report = self.vision.recompute(&mut self.grid, sources);
        if report.has_update() && self.role.is_host() {
            let snapshot = self.grid.snapshot();
            self.record(FogAction::Sync { snapshot });
        }
        report
    }

    /// Applies an edit received from another participant.
    ///
    /// Edits apply in receipt order as plain overwrites. They are neither persisted nor re-broadcast here, the sender
    /// owns that.
    pub fn apply_remote(&mut self, event: &FogEvent) -> FogChange {
        log::trace!("remote fog edit from {}: {:?}", event.sender, event.action);
        event.action.apply(&mut self.grid)
    }

    /// Replaces the map shape. Fog stays where it was in world space, also when the cell size changes.
    pub fn resize(&mut self, grid_config: GridConfig) -> Result<LoadReport> {
        let mut grid = FogGrid::hidden(grid_config)?;
        grid.set_opacity_curve(self.grid.opacity_curve());
        let report = grid.resample_from(&self.grid);
        log::info!(
            "fog for {} resized to {}x{}, {} cells dropped",
            self.key,
            grid_config.cols,
            grid_config.rows,
            report.skipped
        );
        self.grid = grid;
        if self.role.is_host() {
            let snapshot = self.grid.snapshot();
            self.record(FogAction::Sync { snapshot });
        }
        Ok(report)
    }

    /// Events for the broadcast channel, oldest first.
    pub fn drain_outbound(&mut self) -> impl Iterator<Item = FogEvent> + '_ {
        self.outbound.drain(..)
    }

    pub fn is_dirty(&self) -> bool {
        self.debouncer.is_dirty()
    }

    pub fn persist_state(&self) -> PersistState {
        self.debouncer.state()
    }

    /// When the next write should start, for runtimes that arm a timer.
    pub fn flush_deadline(&self) -> Option<Instant> {
        self.debouncer.deadline()
    }

    /// Takes out a write if the quiet period is over.
    pub fn begin_flush(&mut self, now: Instant) -> Option<PendingWrite> {
        let ticket = self.debouncer.begin_flush(now)?;
        Some(self.pending_write(ticket))
    }

    /// Takes out a write for any pending edits, ignoring the quiet period.
    pub fn force_flush(&mut self) -> Option<PendingWrite> {
        let ticket = self.debouncer.force_flush()?;
        Some(self.pending_write(ticket))
    }

    pub fn finish_flush(&mut self, ticket: FlushTicket, result: &core::result::Result<(), StoreError>, now: Instant) {
        if let Err(err) = result {
            log::warn!("Could not save fog for {}, will retry: {}", self.key, err);
        }
        self.debouncer.finish_flush(ticket, result.is_ok(), now);
    }

    pub async fn flush_if_due<S: FogStore>(&mut self, store: &S, now: Instant) -> FlushOutcome {
        let pending = self.begin_flush(now);
        self.write(store, pending).await
    }

    pub async fn flush_now<S: FogStore>(&mut self, store: &S) -> FlushOutcome {
        let pending = self.force_flush();
        self.write(store, pending).await
    }

    async fn write<S: FogStore>(&mut self, store: &S, pending: Option<PendingWrite>) -> FlushOutcome {
        let Some(PendingWrite { ticket, key, cells }) = pending else {
            return FlushOutcome::Idle;
        };
        let count = cells.len();
        let result = store.replace(&key, cells).await;
        self.finish_flush(ticket, &result, Instant::now());
        match result {
            Ok(()) => {
                log::debug!("saved {} fog cells for {}", count, key);
                FlushOutcome::Written { cells: count }
            }
            Err(err) => FlushOutcome::Failed(err),
        }
    }

    fn pending_write(&self, ticket: FlushTicket) -> PendingWrite {
        PendingWrite {
            ticket,
            key: self.key.clone(),
            cells: records_from_snapshot(&self.key, &self.grid.snapshot()),
        }
    }

    fn edit(&mut self, action: FogAction) -> FogChange {
        let change = action.apply(&mut self.grid);
        if change.has_update() && self.role.is_host() {
            self.record(action);
        }
        change
    }

    fn record(&mut self, action: FogAction) {
        self.debouncer.touch(Instant::now());
        let event = FogEvent::new(self.participant.clone(), unix_millis(), action);
        match self.outbound.back_mut() {
            // a full sync supersedes the one queued right before it
            Some(last) if is_sync(&last.action) && is_sync(&event.action) => *last = event,
            _ => self.outbound.push_back(event),
        }
    }
}

fn is_sync(action: &FogAction) -> bool {
    matches!(action, FogAction::Sync { .. })
}

fn unix_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_millis() as u64)
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use fogwarden_core::{FogError, Point};
    use futures::executor::block_on;
    use web_time::Duration;

    fn key() -> SessionKey {
        SessionKey::new("session-1", "map-a")
    }

    fn config() -> FogConfig {
        FogConfig {
            debounce_ms: 200,
            ..FogConfig::default()
        }
    }

    fn host() -> FogSession {
        FogSession::new(key(), GridConfig::new(10, 10, 1.0).unwrap(), Role::Host, &config()).unwrap()
    }

    fn later() -> Instant {
        Instant::now() + Duration::from_secs(5)
    }

    #[test]
    fn invalid_shape_is_fatal() {
        let err = FogSession::new(key(), GridConfig::new_unchecked(0, 10, 1.0), Role::Host, &config()).unwrap_err();
        assert!(matches!(err, SyncError::Grid(FogError::InvalidDimensions { .. })));
    }

    #[test]
    fn host_edits_mark_dirty_and_broadcast() {
        let mut session = host();
        assert!(!session.is_dirty());

        session.reveal_circle(5.0, 5.0, 2.0);
        assert!(session.is_dirty());
        assert_eq!(session.get(5, 5), FogCell::Visible);

        let events: Vec<_> = session.drain_outbound().collect();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].sender, "host");
        assert!(matches!(events[0].action, FogAction::Reveal { .. }));
        assert_eq!(session.drain_outbound().count(), 0);
    }

    #[test]
    fn edits_without_effect_are_not_recorded() {
        let mut session = host();
        session.hide_all();
        session.hide_circle(5.0, 5.0, 3.0);
        assert!(!session.is_dirty());
        assert_eq!(session.drain_outbound().count(), 0);
    }

    #[test]
    fn observers_never_persist() {
        let store = MemoryStore::new();
        let mut session =
            FogSession::new(key(), GridConfig::new(10, 10, 1.0).unwrap(), Role::Observer, &config()).unwrap();
        session.reveal_all();

        assert!(!session.is_dirty());
        assert_eq!(block_on(session.flush_now(&store)), FlushOutcome::Idle);
        assert_eq!(session.drain_outbound().count(), 0);
    }

    #[test]
    fn brush_strokes_use_configured_size() {
        let mut session =
            FogSession::new(key(), GridConfig::new(40, 40, 10.0).unwrap(), Role::Host, &config()).unwrap();
        session.set_brush_size(50.0);

        session.brush(BrushStroke {
            x: 200.0,
            y: 200.0,
            radius: None,
            mode: BrushMode::Reveal,
        });
        assert_eq!(session.get(20, 20), FogCell::Visible);
        assert_eq!(session.get(24, 20), FogCell::Visible);
        assert_eq!(session.get(26, 20), FogCell::Hidden);

        session.brush(BrushStroke {
            x: 200.0,
            y: 200.0,
            radius: Some(15.0),
            mode: BrushMode::Hide,
        });
        assert_eq!(session.get(20, 20), FogCell::Hidden);
        assert_eq!(session.get(24, 20), FogCell::Visible);
    }

    #[test]
    fn burst_of_edits_is_written_once() {
        let store = MemoryStore::new();
        let mut session = host();

        for step in 0..20 {
            session.reveal_circle(step as f32 * 0.5, 5.0, 1.0);
        }
        assert_eq!(block_on(session.flush_if_due(&store, Instant::now())), FlushOutcome::Idle);

        let outcome = block_on(session.flush_if_due(&store, later()));
        assert!(matches!(outcome, FlushOutcome::Written { .. }));
        assert_eq!(store.write_count(), 1);
        assert!(!session.is_dirty());
        assert_eq!(block_on(session.flush_if_due(&store, later())), FlushOutcome::Idle);
        assert_eq!(store.rows(&key()).len(), session.census().seen());
    }

    #[test]
    fn failed_write_is_retried_on_next_cycle() {
        let store = MemoryStore::new();
        let mut session = host();
        session.reveal_all();
        store.fail_next_writes(1);

        let outcome = block_on(session.flush_if_due(&store, later()));
        assert!(matches!(outcome, FlushOutcome::Failed(StoreError::Unavailable(_))));
        assert!(session.is_dirty());
        assert_eq!(store.write_count(), 0);

        let outcome = block_on(session.flush_if_due(&store, later()));
        assert_eq!(outcome, FlushOutcome::Written { cells: 100 });
        assert!(!session.is_dirty());
    }

    #[test]
    fn edits_while_writing_are_saved_by_the_next_write() {
        let store = MemoryStore::new();
        let mut session = host();
        session.reveal_circle(2.0, 2.0, 1.0);

        let pending = session.begin_flush(later()).unwrap();
        session.reveal_circle(8.0, 8.0, 1.0);
        assert!(session.begin_flush(later()).is_none());

        let result = block_on(store.replace(&pending.key, pending.cells));
        session.finish_flush(pending.ticket, &result, Instant::now());
        assert!(session.is_dirty());

        block_on(session.flush_if_due(&store, later()));
        assert!(!session.is_dirty());
        assert_eq!(store.rows(&key()).len(), session.census().seen());
    }

    #[test]
    fn join_restores_persisted_fog() {
        let store = MemoryStore::new();
        let mut original =
            FogSession::new(key(), GridConfig::new(20, 15, 1.0).unwrap(), Role::Host, &config()).unwrap();
        original.reveal_circle(6.0, 6.0, 4.0);
        original.update_vision(&[VisionSource::new(Point::new(14.5, 9.5), 3.0)]);
        block_on(original.flush_now(&store));

        let joined = block_on(FogSession::join(
            key(),
            GridConfig::new(20, 15, 1.0).unwrap(),
            Role::Observer,
            &config(),
            &store,
        ))
        .unwrap();
        assert!(matches!(joined.status, LoadStatus::Restored(LoadReport { skipped: 0, .. })));
        assert_eq!(joined.session.snapshot(), original.snapshot());
        assert!(!joined.session.is_dirty());

        let smaller = block_on(FogSession::join(
            key(),
            GridConfig::new(10, 10, 1.0).unwrap(),
            Role::Observer,
            &config(),
            &store,
        ))
        .unwrap();
        for ((col, row), state) in smaller.session.grid().iter_cells() {
            assert_eq!(state, original.get(col, row));
        }
    }

    #[test]
    fn join_with_nothing_stored_is_empty() {
        let store = MemoryStore::new();
        let joined =
            block_on(FogSession::join(key(), GridConfig::new(4, 4, 1.0).unwrap(), Role::Host, &config(), &store))
                .unwrap();
        assert_eq!(joined.status, LoadStatus::Empty);
    }

    #[test]
    fn failed_join_is_reported_and_grid_stays_hidden() {
        let store = MemoryStore::new();
        store.fail_next_reads(1);

        let joined =
            block_on(FogSession::join(key(), GridConfig::new(4, 4, 1.0).unwrap(), Role::Host, &config(), &store))
                .unwrap();
        assert!(joined.status.is_unavailable());
        assert_eq!(joined.session.census().hidden, 16);
    }

    #[test]
    fn remote_edits_apply_in_receipt_order_without_persisting() {
        let mut host = host();
        let mut viewer =
            FogSession::new(key(), GridConfig::new(10, 10, 1.0).unwrap(), Role::Observer, &config()).unwrap();

        host.reveal_circle(5.0, 5.0, 3.0);
        host.hide_circle(5.0, 5.0, 1.0);
        host.update_vision(&[VisionSource::new(Point::new(1.5, 1.5), 1.0)]);
        for event in host.drain_outbound() {
            viewer.apply_remote(&event);
        }

        assert_eq!(viewer.snapshot(), host.snapshot());
        assert!(!viewer.is_dirty());
    }

    #[test]
    fn vision_loss_leaves_explored_cells() {
        let mut session = host();
        session.reveal_circle(5.0, 5.0, 2.0);
        session.update_vision(&[]);
        assert_eq!(session.get(5, 5), FogCell::Explored);
        session.hide_circle(5.0, 5.0, 2.0);
        assert_eq!(session.get(5, 5), FogCell::Hidden);
    }

    #[test]
    fn resize_with_new_cell_size_keeps_fog_in_place() {
        let mut session =
            FogSession::new(key(), GridConfig::new(10, 10, 10.0).unwrap(), Role::Host, &config()).unwrap();
        session.toggle(2, 3);

        let report = session.resize(GridConfig::new(20, 20, 5.0).unwrap()).unwrap();
        assert_eq!(report, LoadReport { applied: 4, skipped: 0 });
        assert_eq!(session.get_opacity(25.0, 35.0), 0.0);
        assert_eq!(session.get(4, 6), FogCell::Visible);
        assert_eq!(session.get(5, 7), FogCell::Visible);
        assert_eq!(session.get(2, 3), FogCell::Hidden);
    }

    #[test]
    fn repeated_vision_passes_queue_one_sync() {
        let mut session = host();
        session.reveal_circle(1.0, 1.0, 1.0);
        for step in 0..50 {
            let x = 2.5 + (step % 5) as f32;
            session.update_vision(&[VisionSource::new(Point::new(x, 5.5), 2.0)]);
        }

        let events: Vec<_> = session.drain_outbound().collect();
        assert_eq!(events.len(), 2);
        assert!(matches!(events[0].action, FogAction::Reveal { .. }));
        let FogAction::Sync { snapshot } = &events[1].action else {
            panic!("expected a sync event, got {:?}", events[1].action);
        };
        assert_eq!(*snapshot, session.snapshot());
    }

    #[test]
    fn resize_keeps_cells_that_fit() {
        let mut session = host();
        session.set_blockers([Blocker::new(Point::new(0.0, 0.0), Point::new(0.0, 0.0))]);
        session.toggle(1, 1);
        session.toggle(9, 9);
        session.drain_outbound().for_each(drop);

        let report = session.resize(GridConfig::new(5, 5, 1.0).unwrap()).unwrap();
        assert_eq!(report, LoadReport { applied: 1, skipped: 1 });
        assert_eq!(session.get(1, 1), FogCell::Visible);
        assert!(matches!(
            session.drain_outbound().last().map(|event| event.action),
            Some(FogAction::Sync { .. })
        ));
        assert!(session.blockers().is_empty());
    }
}

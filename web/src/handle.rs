use std::{cell::RefCell, rc::Rc};

use fogwarden_core::{Blocker, FogChange, GridConfig, VisionSource};
use fogwarden_protocol::FogEvent;
use fogwarden_sync::{BrushStroke, FlushOutcome, FogSession, FogStore, LoadStatus, PendingWrite};
use gloo::timers::callback::Timeout;
use wasm_bindgen::prelude::*;
use wasm_bindgen_futures::{future_to_promise, spawn_local};
use web_time::Instant;

use crate::{js_error, options::JoinOptions, store::AnyStore};

struct Shared {
    session: RefCell<FogSession>,
    store: AnyStore,
    /// Armed for the next debounced write, replacing it cancels the previous one
    timer: RefCell<Option<Timeout>>,
    status: LoadStatus,
}

/// Arms the write timer for the session's current deadline.
fn schedule_flush(shared: &Rc<Shared>) {
    let Some(deadline) = shared.session.borrow().flush_deadline() else {
        return;
    };
    let delay = deadline.saturating_duration_since(Instant::now());
    // round up so the timer lands at or after the deadline
    let millis = u32::try_from(delay.as_millis() + 1).unwrap_or(u32::MAX);
    let weak = Rc::downgrade(shared);
    let timeout = Timeout::new(millis, move || {
        if let Some(shared) = weak.upgrade() {
            spawn_local(flush_due(shared));
        }
    });
    shared.timer.replace(Some(timeout));
}

async fn flush_due(shared: Rc<Shared>) {
    let pending = shared.session.borrow_mut().begin_flush(Instant::now());
    if let Some(pending) = pending {
        write(&shared, pending).await;
    }
    schedule_flush(&shared);
}

/// Writes outside of any borrow, edits keep landing on the session while the request is in flight.
async fn write(shared: &Shared, pending: PendingWrite) -> FlushOutcome {
    let PendingWrite { ticket, key, cells } = pending;
    let count = cells.len();
    let result = shared.store.replace(&key, cells).await;
    shared
        .session
        .borrow_mut()
        .finish_flush(ticket, &result, Instant::now());
    match result {
        Ok(()) => {
            log::debug!("saved {} fog cells for {}", count, key);
            FlushOutcome::Written { cells: count }
        }
        Err(err) => FlushOutcome::Failed(err),
    }
}

/// Fog of one map, as seen from JavaScript.
#[wasm_bindgen]
pub struct FogHandle {
    shared: Rc<Shared>,
}

impl FogHandle {
    fn edited(&self, change: FogChange) -> bool {
        if change.has_update() {
            schedule_flush(&self.shared);
        }
        change.has_update()
    }
}

#[wasm_bindgen]
impl FogHandle {
    /// Attaches to a map and restores its stored fog.
    ///
    /// Rejects only on malformed options, an unreachable store is reported by `loadStatus`.
    pub async fn join(options: String) -> Result<FogHandle, JsValue> {
        let options = JoinOptions::from_json(&options).map_err(js_error)?;
        let config = options.fog_config().map_err(js_error)?;
        let grid_config = options.grid_config().map_err(js_error)?;
        let store = AnyStore::from_options(&options.store, config.store_timeout());

        let joined = FogSession::join(options.key(), grid_config, options.role, &config, &store)
            .await
            .map_err(js_error)?;
        let mut session = joined.session;
        if let Some(participant) = options.participant {
            session.set_participant(participant);
        }

        Ok(Self {
            shared: Rc::new(Shared {
                session: RefCell::new(session),
                store,
                timer: RefCell::new(None),
                status: joined.status,
            }),
        })
    }

    pub fn reveal(&self, x: f32, y: f32, radius: f32) -> bool {
        let change = self.shared.session.borrow_mut().reveal_circle(x, y, radius);
        self.edited(change)
    }

    pub fn hide(&self, x: f32, y: f32, radius: f32) -> bool {
        let change = self.shared.session.borrow_mut().hide_circle(x, y, radius);
        self.edited(change)
    }

    /// Applies one brush sample, `{"x":..,"y":..,"mode":"reveal"|"hide","radius"?:..}`.
    pub fn brush(&self, stroke: &str) -> Result<bool, JsValue> {
        let stroke: BrushStroke = serde_json::from_str(stroke).map_err(js_error)?;
        let change = self.shared.session.borrow_mut().brush(stroke);
        Ok(self.edited(change))
    }

    #[wasm_bindgen(js_name = setBrushSize)]
    pub fn set_brush_size(&self, size: f32) {
        self.shared.session.borrow_mut().set_brush_size(size);
    }

    #[wasm_bindgen(js_name = brushSize)]
    pub fn brush_size(&self) -> f32 {
        self.shared.session.borrow().brush_config().size
    }

    #[wasm_bindgen(js_name = revealRect)]
    pub fn reveal_rect(&self, x: f32, y: f32, width: f32, height: f32) -> bool {
        let change = self.shared.session.borrow_mut().reveal_rect(x, y, width, height);
        self.edited(change)
    }

    #[wasm_bindgen(js_name = hideRect)]
    pub fn hide_rect(&self, x: f32, y: f32, width: f32, height: f32) -> bool {
        let change = self.shared.session.borrow_mut().hide_rect(x, y, width, height);
        self.edited(change)
    }

    #[wasm_bindgen(js_name = revealAll)]
    pub fn reveal_all(&self) -> bool {
        let change = self.shared.session.borrow_mut().reveal_all();
        self.edited(change)
    }

    #[wasm_bindgen(js_name = hideAll)]
    pub fn hide_all(&self) -> bool {
        let change = self.shared.session.borrow_mut().hide_all();
        self.edited(change)
    }

    pub fn toggle(&self, col: i32, row: i32) -> bool {
        let change = self.shared.session.borrow_mut().toggle(col, row);
        self.edited(change)
    }

    /// Replaces the walls, `[{"start":{"x":..,"y":..},"end":{..}}, ..]`. Returns how many were dropped as degenerate.
    #[wasm_bindgen(js_name = setBlockers)]
    pub fn set_blockers(&self, blockers: &str) -> Result<usize, JsValue> {
        let blockers: Vec<Blocker> = serde_json::from_str(blockers).map_err(js_error)?;
        Ok(self.shared.session.borrow_mut().set_blockers(blockers))
    }

    /// Recomputes vision for `[{"position":{"x":..,"y":..},"radius":..,"requires_los"?:..}, ..]`.
    #[wasm_bindgen(js_name = updateVision)]
    pub fn update_vision(&self, sources: &str) -> Result<bool, JsValue> {
        let sources: Vec<VisionSource> = serde_json::from_str(sources).map_err(js_error)?;
        let report = self.shared.session.borrow_mut().update_vision(&sources);
        log::trace!("vision pass: {:?}", report);
        Ok(self.edited(FogChange::from_bool(report.has_update())))
    }

    /// Applies a broadcast event from another participant.
    #[wasm_bindgen(js_name = applyRemote)]
    pub fn apply_remote(&self, event: &str) -> Result<bool, JsValue> {
        let event = FogEvent::from_json(event).map_err(js_error)?;
        Ok(self.shared.session.borrow_mut().apply_remote(&event).has_update())
    }

    /// Events to broadcast, as a JSON array, oldest first.
    #[wasm_bindgen(js_name = drainOutbound)]
    pub fn drain_outbound(&self) -> Result<String, JsValue> {
        let events: Vec<FogEvent> = self.shared.session.borrow_mut().drain_outbound().collect();
        serde_json::to_string(&events).map_err(js_error)
    }

    /// Overlay opacity at a world position.
    pub fn opacity(&self, x: f32, y: f32) -> f32 {
        self.shared.session.borrow().get_opacity(x, y)
    }

    /// One opacity byte per cell, row-major.
    #[wasm_bindgen(js_name = opacityRaster)]
    pub fn opacity_raster(&self) -> Vec<u8> {
        self.shared.session.borrow().grid().opacity_raster()
    }

    /// 0 hidden, 1 explored, 2 visible.
    #[wasm_bindgen(js_name = cellState)]
    pub fn cell_state(&self, col: i32, row: i32) -> u8 {
        self.shared.session.borrow().get(col, row).as_u8()
    }

    pub fn snapshot(&self) -> Result<String, JsValue> {
        serde_json::to_string(&self.shared.session.borrow().snapshot()).map_err(js_error)
    }

    pub fn cols(&self) -> i32 {
        self.shared.session.borrow().grid().cols()
    }

    pub fn rows(&self) -> i32 {
        self.shared.session.borrow().grid().rows()
    }

    #[wasm_bindgen(js_name = cellSize)]
    pub fn cell_size(&self) -> f32 {
        self.shared.session.borrow().grid().cell_size()
    }

    /// Changes the map shape, returns how many seen cells no longer fit.
    pub fn resize(&self, map_width: f32, map_height: f32, cell_size: f32) -> Result<usize, JsValue> {
        let grid_config = GridConfig::for_map(map_width, map_height, cell_size).map_err(js_error)?;
        let report = self.shared.session.borrow_mut().resize(grid_config).map_err(js_error)?;
        schedule_flush(&self.shared);
        Ok(report.skipped)
    }

    #[wasm_bindgen(js_name = isDirty)]
    pub fn is_dirty(&self) -> bool {
        self.shared.session.borrow().is_dirty()
    }

    /// `"restored"`, `"empty"` or `"unavailable"`.
    #[wasm_bindgen(js_name = loadStatus)]
    pub fn load_status(&self) -> String {
        match self.shared.status {
            LoadStatus::Restored(_) => "restored",
            LoadStatus::Empty => "empty",
            LoadStatus::Unavailable(_) => "unavailable",
        }
        .into()
    }

    #[wasm_bindgen(js_name = loadError)]
    pub fn load_error(&self) -> Option<String> {
        match &self.shared.status {
            LoadStatus::Unavailable(err) => Some(err.to_string()),
            _ => None,
        }
    }

    /// Writes pending edits now, e.g. before the page unloads. Resolves to whether anything was written.
    pub fn flush(&self) -> js_sys::Promise {
        let shared = Rc::clone(&self.shared);
        future_to_promise(async move {
            shared.timer.replace(None);
            let pending = shared.session.borrow_mut().force_flush();
            let outcome = match pending {
                Some(pending) => write(&shared, pending).await,
                None => FlushOutcome::Idle,
            };
            schedule_flush(&shared);
            match outcome {
                FlushOutcome::Idle => Ok(JsValue::FALSE),
                FlushOutcome::Written { .. } => Ok(JsValue::TRUE),
                FlushOutcome::Failed(err) => Err(js_error(err)),
            }
        })
    }
}

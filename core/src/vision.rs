use ndarray::Array2;
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;

use crate::*;

/// How far corner samples are pulled toward the cell center, as a fraction of the cell size.
const CORNER_INSET: f32 = 0.1;

/// An entity that can see: a token, a light, or the host's omniscient view.
#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct VisionSource {
    pub position: Point,
    pub radius: f32,
    #[serde(default = "default_requires_los")]
    pub requires_los: bool,
}

fn default_requires_los() -> bool {
    true
}

impl VisionSource {
    pub const fn new(position: Point, radius: f32) -> Self {
        Self {
            position,
            radius,
            requires_los: true,
        }
    }

    /// A source that sees through walls.
    pub const fn omniscient(position: Point, radius: f32) -> Self {
        Self {
            position,
            radius,
            requires_los: false,
        }
    }

    /// Sources with no positive radius or no finite position see nothing.
    pub fn is_blind(&self) -> bool {
        !(self.radius.is_finite() && self.radius > 0.0 && self.position.is_finite())
    }

    pub fn bounds(&self) -> Aabb {
        Aabb::around(self.position, self.radius)
    }
}

/// An opaque wall segment.
#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Blocker(pub Segment);

impl Blocker {
    pub const fn new(start: Point, end: Point) -> Self {
        Self(Segment::new(start, end))
    }

    pub const fn segment(&self) -> &Segment {
        &self.0
    }
}

/// Which points of a cell are tested for line of sight.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum SampleMode {
    /// Only the cell center
    Center,
    /// Center plus four slightly inset corners, a cell is seen if any of them is
    CenterAndCorners,
}

impl Default for SampleMode {
    fn default() -> Self {
        Self::Center
    }
}

/// Summary of a vision pass.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct VisionReport {
    /// Cells visible after the pass
    pub visible: CellCount,
    /// Cells that became visible
    pub revealed: CellCount,
    /// Cells that lost sight and became explored
    pub demoted: CellCount,
}

impl VisionReport {
    pub const fn has_update(&self) -> bool {
        self.revealed > 0 || self.demoted > 0
    }
}

/// Turns vision sources and walls into a visibility pass over a [`FogGrid`].
///
/// Holds the current wall set between passes, sources are supplied on every call.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct VisionCalculator {
    blockers: Vec<Blocker>,
    sample_mode: SampleMode,
}

impl VisionCalculator {
    pub fn new(sample_mode: SampleMode) -> Self {
        Self {
            blockers: Vec::new(),
            sample_mode,
        }
    }

    pub fn sample_mode(&self) -> SampleMode {
        self.sample_mode
    }

    pub fn set_sample_mode(&mut self, sample_mode: SampleMode) {
        self.sample_mode = sample_mode;
    }

    pub fn blockers(&self) -> &[Blocker] {
        &self.blockers
    }

    /// Replaces all walls, degenerate ones are dropped. Returns how many were dropped.
    pub fn set_blockers(&mut self, blockers: impl IntoIterator<Item = Blocker>) -> usize {
        let mut dropped = 0;
        self.blockers = blockers
            .into_iter()
            .filter(|blocker| {
                let keep = !blocker.segment().is_degenerate();
                if !keep {
                    dropped += 1;
                }
                keep
            })
            .collect();
        if dropped > 0 {
            log::debug!("Ignoring {} degenerate fog blockers", dropped);
        }
        dropped
    }

    /// Cells a single source currently sees on a grid of the given shape.
    pub fn visible_cells(&self, config: &GridConfig, source: &VisionSource) -> Vec<Cell2> {
        let mut cells = Vec::new();
        self.for_each_visible(config, source, |cell| cells.push(cell));
        cells
    }

    /// Runs a full visibility pass.
    ///
    /// Cells seen by any source become visible. Cells that were visible and are no longer seen become explored, never
    /// hidden. Everything else is left alone, so running the same pass twice changes nothing the second time.
    pub fn recompute(&self, grid: &mut FogGrid, sources: &[VisionSource]) -> VisionReport {
        let config = grid.config();
        let mut seen: Array2<bool> = Array2::default(config.to_nd_dim());
        for source in sources {
            self.for_each_visible(&config, source, |cell| seen[cell.to_nd_index()] = true);
        }

        let mut report = VisionReport::default();
        for (cell, &in_sight) in grid.cells_mut().iter_mut().zip(seen.iter()) {
            match (*cell, in_sight) {
                (FogCell::Visible, true) => report.visible += 1,
                (_, true) => {
                    *cell = FogCell::Visible;
                    report.visible += 1;
                    report.revealed += 1;
                }
                (FogCell::Visible, false) => {
                    *cell = FogCell::Explored;
                    report.demoted += 1;
                }
                (_, false) => {}
            }
        }

        log::debug!(
            "vision pass: {} sources, {} blockers, {:?}",
            sources.len(),
            self.blockers.len(),
            report
        );
        report
    }

    fn for_each_visible(&self, config: &GridConfig, source: &VisionSource, mut visit: impl FnMut(Cell2)) {
        if source.is_blind() {
            return;
        }

        let walls: SmallVec<[&Segment; 16]> = if source.requires_los {
            // sample points off the cell center can lie past the radius
            let reach = Aabb::around(source.position, source.radius + sample_spread(config, self.sample_mode));
            self.blockers
                .iter()
                .map(Blocker::segment)
                .filter(|wall| wall.bounds().overlaps(&reach))
                .collect()
        } else {
            SmallVec::new()
        };

        for cell in config.cells_in_circle(source.position, source.radius) {
            if walls.is_empty() || self.has_line_of_sight(config, source.position, cell, &walls) {
                visit(cell);
            }
        }
    }

    fn has_line_of_sight(&self, config: &GridConfig, eye: Point, cell: Cell2, walls: &[&Segment]) -> bool {
        sample_points(config, cell, self.sample_mode)
            .into_iter()
            .any(|target| {
                let ray = Segment::new(eye, target);
                !walls.iter().any(|wall| ray.is_obstructed_by(wall))
            })
    }
}

/// Farthest a sample point sits from its cell center.
fn sample_spread(config: &GridConfig, mode: SampleMode) -> f32 {
    match mode {
        SampleMode::Center => 0.0,
        SampleMode::CenterAndCorners => config.cell_size * (0.5 - CORNER_INSET) * core::f32::consts::SQRT_2,
    }
}

fn sample_points(config: &GridConfig, cell: Cell2, mode: SampleMode) -> SmallVec<[Point; 5]> {
    let center = config.grid_to_world(cell);
    let mut points = SmallVec::new();
    points.push(center);
    if mode == SampleMode::CenterAndCorners {
        let offset = config.cell_size * (0.5 - CORNER_INSET);
        for (dx, dy) in [(-1.0, -1.0), (1.0, -1.0), (-1.0, 1.0), (1.0, 1.0)] {
            points.push(Point::new(center.x + dx * offset, center.y + dy * offset));
        }
    }
    points
}

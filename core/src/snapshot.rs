use serde::{Deserialize, Serialize};

use crate::*;

pub const SNAPSHOT_VERSION: u32 = 1;

#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotCell {
    pub col: GridCoord,
    pub row: GridCoord,
    pub state: FogCell,
}

/// Sparse encoding of every non-hidden cell of a grid.
///
/// Cells absent from the snapshot are hidden. Cells are emitted in row-major order so that equal grids produce equal
/// snapshots, but loading does not depend on the order.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    pub version: u32,
    pub cols: GridCoord,
    pub rows: GridCoord,
    pub cell_size: f32,
    pub cells: Vec<SnapshotCell>,
}

impl Snapshot {
    pub fn config(&self) -> GridConfig {
        GridConfig::new_unchecked(self.cols, self.rows, self.cell_size)
    }

    pub fn len(&self) -> usize {
        self.cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }
}

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct LoadReport {
    pub applied: CellCount,
    pub skipped: CellCount,
}

impl FogGrid {
    pub fn snapshot(&self) -> Snapshot {
        let config = self.config();
        Snapshot {
            version: SNAPSHOT_VERSION,
            cols: config.cols,
            rows: config.rows,
            cell_size: config.cell_size,
            cells: self
                .iter_cells()
                .filter(|(_, state)| state.is_seen())
                .map(|((col, row), state)| SnapshotCell { col, row, state })
                .collect(),
        }
    }

    /// Overwrites the cells listed in the snapshot, leaving every other cell as it is.
    ///
    /// Entries outside the current bounds are skipped, which is expected after a map was re-uploaded with a different
    /// size.
    pub fn load(&mut self, snapshot: &Snapshot) -> LoadReport {
        if snapshot.version > SNAPSHOT_VERSION {
            log::warn!(
                "Loading fog snapshot from a newer version, got {} but only know {}",
                snapshot.version,
                SNAPSHOT_VERSION
            );
        }
        if snapshot.config() != self.config() {
            log::debug!(
                "Fog snapshot shape {}x{}@{} differs from grid {}x{}@{}",
                snapshot.cols,
                snapshot.rows,
                snapshot.cell_size,
                self.cols(),
                self.rows(),
                self.cell_size()
            );
        }

        let mut report = LoadReport::default();
        for cell in &snapshot.cells {
            if self.in_bounds((cell.col, cell.row)) {
                self.set(cell.col, cell.row, cell.state);
                report.applied += 1;
            } else {
                report.skipped += 1;
            }
        }
        if report.skipped > 0 {
            log::warn!("Skipped {} out of bounds fog cells while loading", report.skipped);
        }
        report
    }

    /// Makes the grid equal to the snapshot: cells it does not list become hidden.
    pub fn replace_with(&mut self, snapshot: &Snapshot) -> LoadReport {
        self.hide_all();
        self.load(snapshot)
    }

    /// Copies another grid's fog by world position: each cell takes the state found under its center in `source`.
    ///
    /// Works across different cell sizes. Cells with nothing seen under them are left as they are. `skipped` counts the
    /// seen cells of `source` whose center falls outside this grid.
    pub fn resample_from(&mut self, source: &FogGrid) -> LoadReport {
        let config = self.config();
        let mut report = LoadReport::default();
        for row in 0..config.rows {
            for col in 0..config.cols {
                let center = config.grid_to_world((col, row));
                let (from_col, from_row) = source.world_to_grid(center.x, center.y);
                let state = source.get(from_col, from_row);
                if state.is_seen() {
                    self.set(col, row, state);
                    report.applied += 1;
                }
            }
        }
        report.skipped = source
            .iter_cells()
            .filter(|&((col, row), state)| {
                let center = source.grid_to_world(col, row);
                state.is_seen() && !config.in_bounds(config.world_to_grid(center.x, center.y))
            })
            .count();
        if report.skipped > 0 {
            log::warn!("Dropped {} fog cells outside the resampled grid", report.skipped);
        }
        report
    }

    /// Builds a grid shaped like the snapshot and loads it.
    pub fn from_snapshot(snapshot: &Snapshot) -> Result<Self> {
        let mut grid = Self::hidden(snapshot.config())?;
        grid.load(snapshot);
        Ok(grid)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn explored_and_visible(cols: GridCoord, rows: GridCoord) -> FogGrid {
        let mut grid = FogGrid::hidden(GridConfig::new(cols, rows, 1.0).unwrap()).unwrap();
        grid.reveal_circle(4.0, 4.0, 3.0);
        grid.demote_visible();
        grid.reveal_circle(15.0, 12.0, 2.5);
        grid.set(19, 0, FogCell::Explored);
        grid
    }

    #[test]
    fn snapshot_round_trips_into_same_shape() {
        let original = explored_and_visible(20, 15);
        let snapshot = original.snapshot();

        let mut restored = FogGrid::hidden(original.config()).unwrap();
        let report = restored.load(&snapshot);

        assert_eq!(report.skipped, 0);
        assert_eq!(report.applied, snapshot.len());
        assert_eq!(restored, original);
    }

    #[test]
    fn snapshot_never_contains_hidden_cells() {
        let grid = explored_and_visible(20, 15);
        let snapshot = grid.snapshot();

        assert!(snapshot.cells.iter().all(|cell| cell.state.is_seen()));
        assert_eq!(snapshot.len(), grid.census().seen());
        let empty = FogGrid::hidden(GridConfig::new(20, 15, 1.0).unwrap()).unwrap();
        assert!(empty.snapshot().is_empty());
    }

    #[test]
    fn load_into_smaller_grid_applies_only_in_bounds_cells() {
        let original = explored_and_visible(20, 15);
        let snapshot = original.snapshot();

        let mut small = FogGrid::hidden(GridConfig::new(10, 10, 1.0).unwrap()).unwrap();
        let report = small.load(&snapshot);

        assert!(report.skipped > 0);
        assert_eq!(report.applied + report.skipped, snapshot.len());
        for ((col, row), state) in small.iter_cells() {
            assert_eq!(state, original.get(col, row));
        }
    }

    #[test]
    fn load_is_order_independent() {
        let original = explored_and_visible(20, 15);
        let mut snapshot = original.snapshot();
        snapshot.cells.reverse();

        let restored = FogGrid::from_snapshot(&snapshot).unwrap();
        assert_eq!(restored.snapshot(), original.snapshot());
    }

    #[test]
    fn replace_with_clears_unlisted_cells() {
        let mut grid = explored_and_visible(20, 15);
        let mut other = FogGrid::hidden(grid.config()).unwrap();
        other.set(0, 0, FogCell::Visible);

        grid.replace_with(&other.snapshot());
        assert_eq!(grid, other);
    }

    #[test]
    fn resample_keeps_fog_in_place_when_cells_shrink() {
        let mut coarse = FogGrid::hidden(GridConfig::new(4, 4, 2.0).unwrap()).unwrap();
        coarse.set(1, 1, FogCell::Explored);
        coarse.set(3, 0, FogCell::Visible);

        let mut fine = FogGrid::hidden(GridConfig::new(8, 8, 1.0).unwrap()).unwrap();
        let report = fine.resample_from(&coarse);

        assert_eq!(report, LoadReport { applied: 8, skipped: 0 });
        for cell in [(2, 2), (3, 2), (2, 3), (3, 3)] {
            assert_eq!(fine.get(cell.0, cell.1), FogCell::Explored);
        }
        assert_eq!(fine.get(7, 1), FogCell::Visible);
        assert_eq!(fine.get(1, 1), FogCell::Hidden);
        assert_eq!(fine.get_opacity(2.5, 2.5), coarse.get_opacity(2.5, 2.5));
    }

    #[test]
    fn resample_into_coarser_smaller_grid() {
        let mut fine = FogGrid::hidden(GridConfig::new(8, 8, 1.0).unwrap()).unwrap();
        fine.set(3, 3, FogCell::Visible);
        fine.set(7, 7, FogCell::Explored);

        let mut coarse = FogGrid::hidden(GridConfig::new(3, 3, 2.0).unwrap()).unwrap();
        let report = coarse.resample_from(&fine);

        assert_eq!(coarse.get(1, 1), FogCell::Visible);
        assert_eq!(report, LoadReport { applied: 1, skipped: 1 });
    }

    #[test]
    fn snapshot_serializes_as_json() {
        let grid = explored_and_visible(20, 15);
        let json = serde_json::to_string(&grid.snapshot()).unwrap();
        let decoded: Snapshot = serde_json::from_str(&json).unwrap();
        assert_eq!(decoded, grid.snapshot());
    }
}

use ndarray::Array2;
use serde::{Deserialize, Serialize};

use crate::*;

/// Tally of cells per fog state.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Census {
    pub hidden: CellCount,
    pub explored: CellCount,
    pub visible: CellCount,
}

impl Census {
    pub const fn seen(&self) -> CellCount {
        self.explored + self.visible
    }
}

/// Authoritative fog state for one map.
///
/// Cells are stored column-major as `[col, row]`, reads outside the grid report [`FogCell::Hidden`] and writes outside
/// the grid are dropped.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FogGrid {
    config: GridConfig,
    cells: Array2<FogCell>,
    #[serde(default)]
    opacity: OpacityCurve,
}

impl FogGrid {
    pub fn new(config: GridConfig, default: FogCell) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config,
            cells: Array2::from_elem(config.to_nd_dim(), default),
            opacity: OpacityCurve::default(),
        })
    }

    pub fn hidden(config: GridConfig) -> Result<Self> {
        Self::new(config, FogCell::Hidden)
    }

    /// Reallocates the grid with a new shape, every cell is set to `default`.
    ///
    /// On error the grid is left untouched.
    pub fn initialize(&mut self, cols: GridCoord, rows: GridCoord, cell_size: f32, default: FogCell) -> Result<()> {
        let config = GridConfig::new(cols, rows, cell_size)?;
        log::debug!("fog grid initialized: {}x{} cells of {}", cols, rows, cell_size);
        self.config = config;
        self.cells = Array2::from_elem(config.to_nd_dim(), default);
        Ok(())
    }

    pub fn config(&self) -> GridConfig {
        self.config
    }

    pub fn cols(&self) -> GridCoord {
        self.config.cols
    }

    pub fn rows(&self) -> GridCoord {
        self.config.rows
    }

    pub fn cell_size(&self) -> f32 {
        self.config.cell_size
    }

    pub fn in_bounds(&self, cell: Cell2) -> bool {
        self.config.in_bounds(cell)
    }

    pub fn opacity_curve(&self) -> OpacityCurve {
        self.opacity
    }

    pub fn set_opacity_curve(&mut self, opacity: OpacityCurve) {
        self.opacity = opacity;
    }

    pub fn get(&self, col: GridCoord, row: GridCoord) -> FogCell {
        if self.in_bounds((col, row)) {
            self.cells[(col, row).to_nd_index()]
        } else {
            FogCell::Hidden
        }
    }

    /// Unconditional write, used by load and reset paths.
    pub fn set(&mut self, col: GridCoord, row: GridCoord, state: FogCell) -> FogChange {
        if !self.in_bounds((col, row)) {
            return FogChange::NoChange;
        }
        let cell = &mut self.cells[(col, row).to_nd_index()];
        let changed = *cell != state;
        *cell = state;
        FogChange::from_bool(changed)
    }

    pub fn world_to_grid(&self, x: f32, y: f32) -> Cell2 {
        self.config.world_to_grid(x, y)
    }

    pub fn grid_to_world(&self, col: GridCoord, row: GridCoord) -> Point {
        self.config.grid_to_world((col, row))
    }

    pub fn reveal_circle(&mut self, x: f32, y: f32, radius: f32) -> FogChange {
        let change = self.fill(self.config.cells_in_circle(Point::new(x, y), radius), FogCell::Visible);
        log::trace!("reveal circle ({}, {}) r={}: {:?}", x, y, radius, change);
        change
    }

    /// Forces every cell in the circle back to hidden, including explored memory.
    pub fn hide_circle(&mut self, x: f32, y: f32, radius: f32) -> FogChange {
        let change = self.fill(self.config.cells_in_circle(Point::new(x, y), radius), FogCell::Hidden);
        log::trace!("hide circle ({}, {}) r={}: {:?}", x, y, radius, change);
        change
    }

    pub fn reveal_rect(&mut self, x: f32, y: f32, width: f32, height: f32) -> FogChange {
        self.fill(self.config.cells_in_rect(x, y, width, height), FogCell::Visible)
    }

    pub fn hide_rect(&mut self, x: f32, y: f32, width: f32, height: f32) -> FogChange {
        self.fill(self.config.cells_in_rect(x, y, width, height), FogCell::Hidden)
    }

    /// Host single-cell toggle: hidden cells become visible, anything else becomes hidden.
    pub fn toggle(&mut self, col: GridCoord, row: GridCoord) -> FogChange {
        if !self.in_bounds((col, row)) {
            return FogChange::NoChange;
        }
        let next = match self.get(col, row) {
            FogCell::Hidden => FogCell::Visible,
            FogCell::Explored | FogCell::Visible => FogCell::Hidden,
        };
        self.set(col, row, next)
    }

    pub fn reveal_all(&mut self) -> FogChange {
        self.fill_all(FogCell::Visible)
    }

    pub fn hide_all(&mut self) -> FogChange {
        self.fill_all(FogCell::Hidden)
    }

    /// Every visible cell becomes explored.
    pub fn demote_visible(&mut self) -> FogChange {
        let mut changed = false;
        for cell in self.cells.iter_mut().filter(|cell| cell.is_visible()) {
            *cell = FogCell::Explored;
            changed = true;
        }
        FogChange::from_bool(changed)
    }

    pub fn census(&self) -> Census {
        self.cells.iter().fold(Census::default(), |mut census, cell| {
            match cell {
                FogCell::Hidden => census.hidden += 1,
                FogCell::Explored => census.explored += 1,
                FogCell::Visible => census.visible += 1,
            }
            census
        })
    }

    /// Iterates all cells in row-major order.
    pub fn iter_cells(&self) -> impl Iterator<Item = (Cell2, FogCell)> + '_ {
        let (cols, rows) = (self.cols(), self.rows());
        (0..rows).flat_map(move |row| (0..cols).map(move |col| ((col, row), self.cells[(col, row).to_nd_index()])))
    }

    pub fn opacity_at(&self, col: GridCoord, row: GridCoord) -> f32 {
        self.opacity.opacity(self.get(col, row))
    }

    /// Fog opacity at a world position, `1.0` is fully fogged.
    pub fn get_opacity(&self, x: f32, y: f32) -> f32 {
        let (col, row) = self.world_to_grid(x, y);
        self.opacity_at(col, row)
    }

    /// Row-major opacity bytes (`255` is fully fogged), sized `cols * rows`.
    pub fn opacity_raster(&self) -> Vec<u8> {
        self.iter_cells()
            .map(|(_, cell)| (self.opacity.opacity(cell).clamp(0.0, 1.0) * 255.0).round() as u8)
            .collect()
    }

    pub(crate) fn cells_mut(&mut self) -> &mut Array2<FogCell> {
        &mut self.cells
    }

    fn fill(&mut self, cells: impl Iterator<Item = Cell2>, state: FogCell) -> FogChange {
        cells.fold(FogChange::NoChange, |change, (col, row)| change | self.set(col, row, state))
    }

    fn fill_all(&mut self, state: FogCell) -> FogChange {
        let changed = self.cells.iter().any(|&cell| cell != state);
        self.cells.fill(state);
        FogChange::from_bool(changed)
    }
}

impl GridConfig {
    pub(crate) fn to_nd_dim(&self) -> [usize; 2] {
        (self.cols, self.rows).to_nd_index()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn grid(cols: GridCoord, rows: GridCoord) -> FogGrid {
        FogGrid::hidden(GridConfig::new(cols, rows, 1.0).unwrap()).unwrap()
    }

    #[test]
    fn new_grid_is_hidden_everywhere() {
        let grid = grid(3, 2);
        assert_eq!(grid.census(), Census { hidden: 6, explored: 0, visible: 0 });
    }

    #[test]
    fn out_of_bounds_reads_are_hidden() {
        let mut grid = FogGrid::new(GridConfig::new(2, 2, 1.0).unwrap(), FogCell::Visible).unwrap();
        assert_eq!(grid.get(-1, 0), FogCell::Hidden);
        assert_eq!(grid.get(2, 0), FogCell::Hidden);
        assert_eq!(grid.set(5, 5, FogCell::Visible), FogChange::NoChange);
        assert_eq!(grid.get(1, 1), FogCell::Visible);
    }

    #[test]
    fn initialize_rejects_bad_shape_and_keeps_grid() {
        let mut grid = grid(3, 3);
        grid.set(1, 1, FogCell::Explored);
        assert!(grid.initialize(0, 3, 1.0, FogCell::Hidden).is_err());
        assert!(grid.initialize(3, 3, -1.0, FogCell::Hidden).is_err());
        assert_eq!(grid.get(1, 1), FogCell::Explored);

        grid.initialize(5, 4, 2.0, FogCell::Hidden).unwrap();
        assert_eq!((grid.cols(), grid.rows(), grid.cell_size()), (5, 4, 2.0));
        assert_eq!(grid.get(1, 1), FogCell::Hidden);
    }

    #[test]
    fn reveal_circle_marks_every_cell_within_radius() {
        let mut grid = grid(10, 10);
        let change = grid.reveal_circle(5.0, 5.0, 2.0);
        assert!(change.has_update());

        for ((col, row), state) in grid.iter_cells() {
            let center = grid.grid_to_world(col, row);
            if center.distance_squared(Point::new(5.0, 5.0)) <= 4.0 {
                assert_eq!(state, FogCell::Visible, "({col}, {row})");
            } else {
                assert_eq!(state, FogCell::Hidden, "({col}, {row})");
            }
        }
        assert_eq!(grid.get(5, 5), FogCell::Visible);
        assert_eq!(grid.get(5, 8), FogCell::Hidden);
        assert_eq!(grid.reveal_circle(5.0, 5.0, 2.0), FogChange::NoChange);
    }

    #[test]
    fn hide_circle_erases_explored_memory() {
        let mut grid = grid(10, 10);
        grid.set(5, 5, FogCell::Explored);
        grid.set(0, 0, FogCell::Explored);
        grid.hide_circle(5.0, 5.0, 2.0);
        assert_eq!(grid.get(5, 5), FogCell::Hidden);
        assert_eq!(grid.get(0, 0), FogCell::Explored);
    }

    #[test]
    fn brush_strokes_off_the_edge_are_clipped() {
        let mut grid = grid(4, 4);
        grid.reveal_circle(-0.5, -0.5, 1.5);
        assert_eq!(grid.get(0, 0), FogCell::Visible);
        assert_eq!(grid.census().visible, 1);
        assert_eq!(grid.reveal_circle(-40.0, 2.0, 3.0), FogChange::NoChange);
    }

    #[test]
    fn bulk_operations_report_changes() {
        let mut grid = grid(3, 3);
        assert_eq!(grid.hide_all(), FogChange::NoChange);
        assert_eq!(grid.reveal_all(), FogChange::Changed);
        assert_eq!(grid.census().visible, 9);
        assert_eq!(grid.demote_visible(), FogChange::Changed);
        assert_eq!(grid.census().explored, 9);
        assert_eq!(grid.demote_visible(), FogChange::NoChange);
        assert_eq!(grid.hide_all(), FogChange::Changed);
        assert_eq!(grid.census().hidden, 9);
    }

    #[test]
    fn rect_operations_cover_overlapped_cells() {
        let mut grid = grid(6, 6);
        grid.reveal_rect(1.5, 1.5, 2.0, 1.0);
        assert_eq!(grid.census().visible, 6);
        assert_eq!(grid.get(1, 1), FogCell::Visible);
        assert_eq!(grid.get(3, 2), FogCell::Visible);
        assert_eq!(grid.get(4, 2), FogCell::Hidden);
        grid.hide_rect(0.0, 0.0, 2.0, 6.0);
        assert_eq!(grid.get(1, 1), FogCell::Hidden);
        assert_eq!(grid.get(2, 1), FogCell::Visible);
    }

    #[test]
    fn toggle_flips_between_hidden_and_visible() {
        let mut grid = grid(2, 2);
        grid.toggle(0, 0);
        assert_eq!(grid.get(0, 0), FogCell::Visible);
        grid.set(1, 1, FogCell::Explored);
        grid.toggle(1, 1);
        assert_eq!(grid.get(1, 1), FogCell::Hidden);
        assert_eq!(grid.toggle(9, 9), FogChange::NoChange);
    }

    #[test]
    fn opacity_follows_cell_state() {
        let mut grid = FogGrid::hidden(GridConfig::new(3, 1, 10.0).unwrap()).unwrap();
        grid.set(1, 0, FogCell::Explored);
        grid.set(2, 0, FogCell::Visible);
        assert_eq!(grid.get_opacity(5.0, 5.0), 1.0);
        assert_eq!(grid.get_opacity(15.0, 5.0), 0.3);
        assert_eq!(grid.get_opacity(25.0, 5.0), 0.0);
        assert_eq!(grid.get_opacity(-5.0, 5.0), 1.0);
        assert_eq!(grid.opacity_raster(), vec![255, 77, 0]);

        grid.set_opacity_curve(OpacityCurve::with_explored(0.5));
        assert_eq!(grid.opacity_at(1, 0), 0.5);
    }
}

use core::ops::BitOr;
use serde::{Deserialize, Serialize};

pub use cell::*;
pub use error::*;
pub use geometry::*;
pub use grid::*;
pub use snapshot::*;
pub use types::*;
pub use vision::*;

mod cell;
mod error;
mod geometry;
mod grid;
mod snapshot;
mod types;
mod vision;

/// Largest grid accepted, in cells.
pub const MAX_CELLS: CellCount = 1 << 24;

/// Shape of a fog grid: how many cells and how many world units each cell spans.
#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct GridConfig {
    pub cols: GridCoord,
    pub rows: GridCoord,
    pub cell_size: f32,
}

impl GridConfig {
    pub const fn new_unchecked(cols: GridCoord, rows: GridCoord, cell_size: f32) -> Self {
        Self {
            cols,
            rows,
            cell_size,
        }
    }

    pub fn new(cols: GridCoord, rows: GridCoord, cell_size: f32) -> Result<Self> {
        let config = Self::new_unchecked(cols, rows, cell_size);
        config.validate()?;
        Ok(config)
    }

    /// Grid covering a map of `width` by `height` world units, partial cells at the far edges are included.
    pub fn for_map(width: f32, height: f32, cell_size: f32) -> Result<Self> {
        if !(cell_size.is_finite() && cell_size > 0.0) {
            return Err(FogError::InvalidCellSize(cell_size));
        }
        let cols = (width / cell_size).ceil();
        let rows = (height / cell_size).ceil();
        if !(cols >= 1.0 && rows >= 1.0 && cols <= GridCoord::MAX as f32 && rows <= GridCoord::MAX as f32) {
            return Err(FogError::InvalidDimensions {
                cols: cols as i64,
                rows: rows as i64,
            });
        }
        Self::new(cols as GridCoord, rows as GridCoord, cell_size)
    }

    pub fn validate(&self) -> Result<()> {
        if self.cols <= 0 || self.rows <= 0 || self.total_cells() > MAX_CELLS {
            return Err(FogError::InvalidDimensions {
                cols: self.cols.into(),
                rows: self.rows.into(),
            });
        }
        if !(self.cell_size.is_finite() && self.cell_size > 0.0) {
            return Err(FogError::InvalidCellSize(self.cell_size));
        }
        Ok(())
    }

    pub const fn total_cells(&self) -> CellCount {
        mult(self.cols, self.rows)
    }

    pub const fn in_bounds(&self, (col, row): Cell2) -> bool {
        col >= 0 && row >= 0 && col < self.cols && row < self.rows
    }

    /// Cell containing the world point, not necessarily in bounds.
    pub fn world_to_grid(&self, x: f32, y: f32) -> Cell2 {
        (
            (x / self.cell_size).floor() as GridCoord,
            (y / self.cell_size).floor() as GridCoord,
        )
    }

    /// World position of the center of a cell.
    pub fn grid_to_world(&self, (col, row): Cell2) -> Point {
        Point::new(
            col as f32 * self.cell_size + self.cell_size / 2.0,
            row as f32 * self.cell_size + self.cell_size / 2.0,
        )
    }

    /// In-bounds cells whose center lies within `radius` of `center` (`dx² + dy² ≤ radius²`).
    pub fn cells_in_circle(&self, center: Point, radius: f32) -> impl Iterator<Item = Cell2> + use<> {
        let config = *self;
        let valid = center.is_finite() && radius.is_finite() && radius >= 0.0;
        let (center_col, center_row) = self.world_to_grid(center.x, center.y);
        let reach = if valid {
            ((radius / self.cell_size).ceil() as GridCoord).saturating_add(1)
        } else {
            -1
        };
        let radius_sq = radius * radius;

        let cols = center_col.saturating_sub(reach).max(0)..=center_col.saturating_add(reach).min(config.cols - 1);
        let rows = center_row.saturating_sub(reach).max(0)..=center_row.saturating_add(reach).min(config.rows - 1);
        rows.flat_map(move |row| cols.clone().map(move |col| (col, row)))
            .filter(move |&cell| valid && config.grid_to_world(cell).distance_squared(center) <= radius_sq)
    }

    /// In-bounds cells overlapped by a world-space rectangle.
    pub fn cells_in_rect(&self, x: f32, y: f32, width: f32, height: f32) -> impl Iterator<Item = Cell2> + use<> {
        let valid = [x, y, width, height].iter().all(|v| v.is_finite()) && width >= 0.0 && height >= 0.0;
        let (min_col, min_row) = self.world_to_grid(x, y);
        let max_col = ((x + width) / self.cell_size).ceil() as GridCoord;
        let max_row = ((y + height) / self.cell_size).ceil() as GridCoord;
        let (max_col, max_row) = if valid { (max_col, max_row) } else { (min_col, min_row) };

        let cols = min_col.max(0)..max_col.min(self.cols);
        let rows = min_row.max(0)..max_row.min(self.rows);
        rows.flat_map(move |row| cols.clone().map(move |col| (col, row)))
    }
}

/// Outcome of a grid mutation.
#[derive(Copy, Clone, Debug, PartialEq)]
pub enum FogChange {
    NoChange,
    Changed,
}

impl FogChange {
    pub const fn has_update(self) -> bool {
        match self {
            Self::NoChange => false,
            Self::Changed => true,
        }
    }

    pub const fn from_bool(changed: bool) -> Self {
        if changed { Self::Changed } else { Self::NoChange }
    }
}

impl BitOr for FogChange {
    type Output = FogChange;

    fn bitor(self, rhs: Self) -> Self::Output {
        Self::from_bool(self.has_update() || rhs.has_update())
    }
}

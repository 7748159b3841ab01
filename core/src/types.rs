/// Single grid axis used for columns, rows, and cell positions.
///
/// Signed so that neighbors of edge cells and brush strokes hanging off the map can be expressed without wrapping.
pub type GridCoord = i32;

/// Two-dimensional grid coordinates `(col, row)`.
pub type Cell2 = (GridCoord, GridCoord);

/// Count type used for cell tallies.
pub type CellCount = usize;

pub trait ToNdIndex {
    type Output;
    fn to_nd_index(self) -> Self::Output;
}

impl ToNdIndex for Cell2 {
    type Output = [usize; 2];

    /// Caller must have checked bounds, negative coordinates are not representable.
    fn to_nd_index(self) -> Self::Output {
        [self.0 as usize, self.1 as usize]
    }
}

pub const fn mult(a: GridCoord, b: GridCoord) -> CellCount {
    (a as CellCount).saturating_mul(b as CellCount)
}

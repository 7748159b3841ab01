use thiserror::Error;

#[derive(Error, Debug, Copy, Clone, PartialEq)]
pub enum FogError {
    #[error("Invalid grid dimensions {cols}x{rows}")]
    InvalidDimensions { cols: i64, rows: i64 },
    #[error("Invalid cell size {0}")]
    InvalidCellSize(f32),
}

pub type Result<T> = core::result::Result<T, FogError>;

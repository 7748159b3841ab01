use serde::{Deserialize, Serialize};

/// Fog state of a single grid cell.
///
/// Ordered by visibility level, `Hidden < Explored < Visible`.
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum FogCell {
    /// Never revealed
    Hidden = 0,
    /// Seen before, not currently in sight of any source
    Explored = 1,
    /// Currently in sight
    Visible = 2,
}

impl FogCell {
    pub const fn as_u8(self) -> u8 {
        self as u8
    }

    /// Lenient decoding, unknown values are treated as never revealed.
    pub const fn from_u8(value: u8) -> Self {
        match value {
            1 => Self::Explored,
            2 => Self::Visible,
            _ => Self::Hidden,
        }
    }

    pub const fn is_hidden(self) -> bool {
        matches!(self, Self::Hidden)
    }

    pub const fn is_visible(self) -> bool {
        matches!(self, Self::Visible)
    }

    /// Whether the cell was ever revealed, currently or in the past.
    pub const fn is_seen(self) -> bool {
        !self.is_hidden()
    }
}

impl Default for FogCell {
    fn default() -> Self {
        Self::Hidden
    }
}

/// Opacity of the fog drawn over a cell for each state, `1.0` is fully opaque fog.
#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct OpacityCurve {
    pub hidden: f32,
    pub explored: f32,
    pub visible: f32,
}

impl OpacityCurve {
    /// Builds a curve with the given dimming for explored cells, clamped to stay between visible and hidden.
    pub fn with_explored(explored: f32) -> Self {
        let explored = if explored.is_finite() {
            explored.clamp(0.0, 1.0)
        } else {
            Self::default().explored
        };
        Self {
            explored,
            ..Self::default()
        }
    }

    pub const fn opacity(&self, cell: FogCell) -> f32 {
        match cell {
            FogCell::Hidden => self.hidden,
            FogCell::Explored => self.explored,
            FogCell::Visible => self.visible,
        }
    }
}

impl Default for OpacityCurve {
    fn default() -> Self {
        Self {
            hidden: 1.0,
            explored: 0.3,
            visible: 0.0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn states_are_ordered_by_visibility() {
        assert!(FogCell::Hidden < FogCell::Explored);
        assert!(FogCell::Explored < FogCell::Visible);
    }

    #[test]
    fn byte_encoding_is_lenient() {
        assert_eq!(FogCell::from_u8(FogCell::Explored.as_u8()), FogCell::Explored);
        assert_eq!(FogCell::from_u8(7), FogCell::Hidden);
    }

    #[test]
    fn opacity_is_monotonic_in_visibility() {
        let curve = OpacityCurve::default();
        assert!(curve.opacity(FogCell::Hidden) > curve.opacity(FogCell::Explored));
        assert!(curve.opacity(FogCell::Explored) > curve.opacity(FogCell::Visible));

        let clamped = OpacityCurve::with_explored(4.0);
        assert_eq!(clamped.explored, 1.0);
        let fallback = OpacityCurve::with_explored(f32::NAN);
        assert_eq!(fallback.explored, 0.3);
    }
}

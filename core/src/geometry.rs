use serde::{Deserialize, Serialize};

/// Tolerance used for cross products, in squared world units.
const CROSS_EPSILON: f64 = 1e-9;

/// Tolerance on the normalized segment parameters.
const PARAM_EPSILON: f64 = 1e-9;

/// A point in world space.
#[derive(Copy, Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub x: f32,
    pub y: f32,
}

impl Point {
    pub const fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }

    pub fn is_finite(self) -> bool {
        self.x.is_finite() && self.y.is_finite()
    }

    pub fn distance_squared(self, other: Point) -> f32 {
        let dx = other.x - self.x;
        let dy = other.y - self.y;
        dx * dx + dy * dy
    }

    fn to_f64(self) -> (f64, f64) {
        (self.x.into(), self.y.into())
    }
}

impl From<(f32, f32)> for Point {
    fn from((x, y): (f32, f32)) -> Self {
        Self::new(x, y)
    }
}

/// Axis-aligned bounding box, inclusive on all sides.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct Aabb {
    pub min: Point,
    pub max: Point,
}

impl Aabb {
    pub fn around(center: Point, radius: f32) -> Self {
        Self {
            min: Point::new(center.x - radius, center.y - radius),
            max: Point::new(center.x + radius, center.y + radius),
        }
    }

    pub fn overlaps(&self, other: &Aabb) -> bool {
        self.min.x <= other.max.x
            && other.min.x <= self.max.x
            && self.min.y <= other.max.y
            && other.min.y <= self.max.y
    }
}

/// A line segment in world space.
#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Segment {
    pub start: Point,
    pub end: Point,
}

fn cross((ax, ay): (f64, f64), (bx, by): (f64, f64)) -> f64 {
    ax * by - ay * bx
}

fn dot((ax, ay): (f64, f64), (bx, by): (f64, f64)) -> f64 {
    ax * bx + ay * by
}

fn sub((ax, ay): (f64, f64), (bx, by): (f64, f64)) -> (f64, f64) {
    (ax - bx, ay - by)
}

impl Segment {
    pub const fn new(start: Point, end: Point) -> Self {
        Self { start, end }
    }

    pub fn length_squared(&self) -> f32 {
        self.start.distance_squared(self.end)
    }

    /// Zero-length or non-finite segments cannot block anything.
    pub fn is_degenerate(&self) -> bool {
        !self.start.is_finite() || !self.end.is_finite() || f64::from(self.length_squared()) <= CROSS_EPSILON
    }

    pub fn bounds(&self) -> Aabb {
        Aabb {
            min: Point::new(self.start.x.min(self.end.x), self.start.y.min(self.end.y)),
            max: Point::new(self.start.x.max(self.end.x), self.start.y.max(self.end.y)),
        }
    }

    /// Range of parameters `t` along `self` (0 at `start`, 1 at `end`) where it touches `other`.
    ///
    /// Crossing segments produce a single parameter, collinear overlapping segments produce the overlapped span.
    pub fn contact_span(&self, other: &Segment) -> Option<(f64, f64)> {
        let p = self.start.to_f64();
        let r = sub(self.end.to_f64(), p);
        let q = other.start.to_f64();
        let s = sub(other.end.to_f64(), q);
        let qp = sub(q, p);

        let denom = cross(r, s);
        if denom.abs() <= CROSS_EPSILON {
            if cross(qp, r).abs() > CROSS_EPSILON {
                // parallel, never meet
                return None;
            }
            let rr = dot(r, r);
            if rr <= CROSS_EPSILON {
                return None;
            }
            let t0 = dot(qp, r) / rr;
            let t1 = t0 + dot(s, r) / rr;
            let lo = t0.min(t1).max(0.0);
            let hi = t0.max(t1).min(1.0);
            return (lo <= hi + PARAM_EPSILON).then_some((lo, hi.max(lo)));
        }

        let t = cross(qp, s) / denom;
        let u = cross(qp, r) / denom;
        let in_range = |v: f64| (-PARAM_EPSILON..=1.0 + PARAM_EPSILON).contains(&v);
        (in_range(t) && in_range(u)).then(|| {
            let t = t.clamp(0.0, 1.0);
            (t, t)
        })
    }

    pub fn intersects(&self, other: &Segment) -> bool {
        self.contact_span(other).is_some()
    }

    /// Whether `wall` cuts this segment strictly between its endpoints.
    ///
    /// Touching only at `start` (a viewer leaning on a wall) or only at `end` (a wall passing through the target) does
    /// not count as obstruction.
    pub fn is_obstructed_by(&self, wall: &Segment) -> bool {
        match self.contact_span(wall) {
            Some((lo, hi)) => hi > PARAM_EPSILON && lo < 1.0 - PARAM_EPSILON,
            None => false,
        }
    }
}

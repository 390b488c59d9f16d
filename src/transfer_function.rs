//! Transfer functions: normalized field coordinates to opacity and a color
//! lookup coordinate.
//!
//! Coordinates are in `[0, 1]`. When a transfer function uses the gradient,
//! the gradient magnitude is its *last* coordinate, i.e. `coords[dim - 1]`.
//! A negative alpha means the input was too short and the sample must not be
//! rendered.

use crate::protocol::tf::{TfKind, TfPayload, GRADIENT_PROPERTY};

/// Alpha returned when the coordinates do not cover the declared dimension.
pub const UNDEFINED_ALPHA: f32 = -1.0;

/// Colormap the render side should look the color coordinate up in.
#[repr(i32)]
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub enum ColorMode {
    #[default]
    Rainbow = 0,
    Grayscale = 1,
    Warm = 2,
    Cool = 3,
    BlueWhiteRed = 4,
}

impl ColorMode {
    pub fn from_i32(val: i32) -> Option<Self> {
        match val {
            0 => Some(ColorMode::Rainbow),
            1 => Some(ColorMode::Grayscale),
            2 => Some(ColorMode::Warm),
            3 => Some(ColorMode::Cool),
            4 => Some(ColorMode::BlueWhiteRed),
            _ => None,
        }
    }
}

/// Mean of the first `n` coordinates.
fn color_coordinate(coords: &[f32], n: usize) -> f32 {
    if n == 0 || coords.len() < n {
        return 0.0;
    }
    coords[..n].iter().sum::<f32>() / n as f32
}

/// `exp(-sum(term_i^2))` scaled by `alpha_max`, clamped to 1.
fn gaussian(alpha_max: f32, terms: impl Iterator<Item = f32>) -> f32 {
    let sum: f32 = terms.map(|t| t * t).sum();
    (alpha_max * (-sum).exp()).min(1.0)
}

#[derive(Clone, Debug, PartialEq)]
pub struct GaussianTf {
    /// Field index for each scalar coordinate, in coordinate order.
    pub fields: Vec<usize>,
    pub center: Vec<f32>,
    pub scale: Vec<f32>,
    pub alpha_max: f32,
    /// The last center/scale pair applies to the gradient coordinate.
    pub has_gradient: bool,
    pub color_mode: ColorMode,
}

impl GaussianTf {
    pub fn dimension(&self) -> usize {
        self.center.len()
    }

    pub fn compute_alpha(&self, coords: &[f32]) -> f32 {
        if coords.len() < self.center.len() || self.scale.len() < self.center.len() {
            return UNDEFINED_ALPHA;
        }
        gaussian(
            self.alpha_max,
            self.center.iter().zip(&self.scale).zip(coords).map(|((&c, &s), &x)| {
                if s == 0.0 {
                    if x == c {
                        0.0
                    } else {
                        f32::INFINITY
                    }
                } else {
                    (x - c) / s
                }
            }),
        )
    }
}

/// Gaussian whose width shrinks as the gradient grows, so that only
/// boundaries (high gradient) near the centers stay opaque.
#[derive(Clone, Debug, PartialEq)]
pub struct TriangularGaussianTf {
    pub fields: Vec<usize>,
    pub center: Vec<f32>,
    pub scale: Vec<f32>,
    pub alpha_max: f32,
    pub color_mode: ColorMode,
}

impl TriangularGaussianTf {
    pub fn dimension(&self) -> usize {
        self.center.len() + 1
    }

    pub fn compute_alpha(&self, coords: &[f32]) -> f32 {
        let dim = self.dimension();
        if coords.len() < dim || self.scale.len() < self.center.len() {
            return UNDEFINED_ALPHA;
        }
        let gradient = coords[dim - 1];
        if gradient == 0.0 {
            return 0.0;
        }
        let r0 = 1.0 / gradient;
        gaussian(
            self.alpha_max,
            self.center
                .iter()
                .zip(&self.scale)
                .zip(coords)
                .map(|((&c, &s), &x)| r0 * s * (x - c)),
        )
    }
}

/// Linear blend of two transfer functions: `(1 - t) * first + t * second`.
#[derive(Clone, Debug, PartialEq)]
pub struct MergeTf {
    pub first: Box<TransferFunction>,
    pub second: Box<TransferFunction>,
    pub t: f32,
}

impl MergeTf {
    pub fn new(first: TransferFunction, second: TransferFunction, t: f32) -> Self {
        Self {
            first: Box::new(first),
            second: Box::new(second),
            t: t.clamp(0.0, 1.0),
        }
    }

    /// One more than the larger child when exactly one child uses the
    /// gradient and it is not the strictly larger one: that extra slot
    /// carries the gradient past the other child's coordinates.
    pub fn dimension(&self) -> usize {
        let (a, b) = (&self.first, &self.second);
        let (da, db) = (a.dimension(), b.dimension());
        let extra = match (a.has_gradient(), b.has_gradient()) {
            (true, false) => da <= db,
            (false, true) => db <= da,
            _ => false,
        };
        da.max(db) + usize::from(extra)
    }

    pub fn has_gradient(&self) -> bool {
        self.first.has_gradient() || self.second.has_gradient()
    }

    /// Coordinates as `child` expects them: its leading scalar coordinates,
    /// with the merged gradient moved into its own last slot.
    fn child_coords(&self, child: &TransferFunction, coords: &[f32]) -> Vec<f32> {
        let d = child.dimension();
        let mut v = coords[..d].to_vec();
        if child.has_gradient() && d > 0 {
            v[d - 1] = coords[self.dimension() - 1];
        }
        v
    }

    fn blend(&self, coords: &[f32], f: impl Fn(&TransferFunction, &[f32]) -> f32) -> Option<(f32, f32)> {
        if coords.len() < self.dimension() {
            return None;
        }
        let a = f(&self.first, &self.child_coords(&self.first, coords));
        let b = f(&self.second, &self.child_coords(&self.second, coords));
        Some((a, b))
    }

    pub fn compute_alpha(&self, coords: &[f32]) -> f32 {
        match self.blend(coords, TransferFunction::compute_alpha) {
            Some((a, b)) if a >= 0.0 && b >= 0.0 => (1.0 - self.t) * a + self.t * b,
            _ => UNDEFINED_ALPHA,
        }
    }

    pub fn compute_color(&self, coords: &[f32]) -> f32 {
        match self.blend(coords, TransferFunction::compute_color) {
            Some((a, b)) => (1.0 - self.t) * a + self.t * b,
            None => 0.0,
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum TransferFunction {
    Gaussian(GaussianTf),
    TriangularGaussian(TriangularGaussianTf),
    Merge(MergeTf),
}

impl TransferFunction {
    /// Number of coordinates consumed, gradient included.
    pub fn dimension(&self) -> usize {
        match self {
            TransferFunction::Gaussian(tf) => tf.dimension(),
            TransferFunction::TriangularGaussian(tf) => tf.dimension(),
            TransferFunction::Merge(tf) => tf.dimension(),
        }
    }

    pub fn has_gradient(&self) -> bool {
        match self {
            TransferFunction::Gaussian(tf) => tf.has_gradient,
            TransferFunction::TriangularGaussian(_) => true,
            TransferFunction::Merge(tf) => tf.has_gradient(),
        }
    }

    pub fn compute_alpha(&self, coords: &[f32]) -> f32 {
        match self {
            TransferFunction::Gaussian(tf) => tf.compute_alpha(coords),
            TransferFunction::TriangularGaussian(tf) => tf.compute_alpha(coords),
            TransferFunction::Merge(tf) => tf.compute_alpha(coords),
        }
    }

    /// Coordinate to look up in the colormap: the mean of the scalar
    /// coordinates, blended for merges.
    pub fn compute_color(&self, coords: &[f32]) -> f32 {
        match self {
            TransferFunction::Merge(tf) => tf.compute_color(coords),
            _ => color_coordinate(coords, self.scalar_fields().len()),
        }
    }

    pub fn color_mode(&self) -> ColorMode {
        match self {
            TransferFunction::Gaussian(tf) => tf.color_mode,
            TransferFunction::TriangularGaussian(tf) => tf.color_mode,
            TransferFunction::Merge(tf) => tf.first.color_mode(),
        }
    }

    /// Field index of each scalar coordinate, in coordinate order. A merge
    /// shares its leading coordinates between children, so it reports the
    /// longer child's list.
    pub fn scalar_fields(&self) -> &[usize] {
        match self {
            TransferFunction::Gaussian(tf) => &tf.fields,
            TransferFunction::TriangularGaussian(tf) => &tf.fields,
            TransferFunction::Merge(tf) => {
                let (a, b) = (tf.first.scalar_fields(), tf.second.scalar_fields());
                if a.len() >= b.len() {
                    a
                } else {
                    b
                }
            }
        }
    }

    /// Build from a decoded payload. `None` for an empty payload or for
    /// properties that cannot be expressed (negative ids other than the
    /// gradient marker).
    pub fn from_payload(payload: &TfPayload) -> Option<Self> {
        let color_mode = ColorMode::from_i32(payload.color_mode).unwrap_or_default();
        match payload.kind? {
            TfKind::Empty => None,
            TfKind::Merge => {
                let merge = payload.merge.as_ref()?;
                let first = Self::from_payload(merge.first.body())?;
                let second = Self::from_payload(merge.second.body())?;
                Some(TransferFunction::Merge(MergeTf::new(first, second, merge.t)))
            }
            kind => {
                let mut fields = Vec::new();
                let mut center = Vec::new();
                let mut scale = Vec::new();
                let mut gradient = None;
                for p in &payload.props {
                    if p.prop_id == GRADIENT_PROPERTY {
                        gradient = Some((p.center, p.scale));
                    } else if p.prop_id >= 0 {
                        fields.push(p.prop_id as usize);
                        center.push(p.center);
                        scale.push(p.scale);
                    } else {
                        return None;
                    }
                }
                if kind == TfKind::TriangularGaussian {
                    return Some(TransferFunction::TriangularGaussian(TriangularGaussianTf {
                        fields,
                        center,
                        scale,
                        alpha_max: payload.alpha_max,
                        color_mode,
                    }));
                }
                if let Some((c, s)) = gradient {
                    center.push(c);
                    scale.push(s);
                }
                Some(TransferFunction::Gaussian(GaussianTf {
                    fields,
                    center,
                    scale,
                    alpha_max: payload.alpha_max,
                    has_gradient: gradient.is_some(),
                    color_mode,
                }))
            }
        }
    }
}

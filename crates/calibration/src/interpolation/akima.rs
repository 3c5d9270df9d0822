//! Akima (1970) piecewise cubic interpolation.
//!
//! Node slopes are weighted averages of neighbouring segment slopes, which
//! keeps the curve free of the overshoot a natural spline shows near steps.
//! Two extra slopes are extrapolated linearly at each end.

use super::InterpolationError;

/// Segments shorter than this get a zero slope.
const MIN_SEGMENT: f64 = 1e-10;
/// Below this total weight the node slope is the plain average.
const MIN_WEIGHT: f64 = 1e-16;

/// Fitted cubic per segment: `a + b*dx + c*dx^2 + d*dx^3` with `dx = x - x[i]`.
#[derive(Debug, Clone, PartialEq)]
pub struct AkimaCoeffs {
    x: Vec<f64>,
    a: Vec<f64>,
    b: Vec<f64>,
    c: Vec<f64>,
    d: Vec<f64>,
}

/// Segment search strategy used by [`evaluate_using`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EvalPath {
    /// Pick the fastest path valid for the output grid.
    Auto,
    /// Walk segments forward; for increasing grids.
    Forward,
    /// Walk segments backward; for decreasing grids.
    Backward,
    /// Binary search per point.
    BinarySearch,
}

impl AkimaCoeffs {
    /// Input abscissae.
    pub fn knots(&self) -> &[f64] {
        &self.x
    }

    pub fn segments(&self) -> usize {
        self.a.len()
    }

    /// Largest segment `i <= n-2` with `x[i] <= xo`, or 0.
    fn locate(&self, xo: f64) -> usize {
        let last = self.segments() - 1;
        self.x[..=last]
            .partition_point(|&xi| xi <= xo)
            .saturating_sub(1)
    }

    fn eval_segment(&self, i: usize, xo: f64) -> f64 {
        let dx = xo - self.x[i];
        self.a[i] + dx * (self.b[i] + dx * (self.c[i] + dx * self.d[i]))
    }

    /// Value at a single point.
    pub fn value_at(&self, xo: f64) -> f64 {
        self.eval_segment(self.locate(xo), xo)
    }
}

fn check_input(x: &[f64], y: &[f64]) -> Result<(), InterpolationError> {
    if x.len() != y.len() {
        return Err(InterpolationError::LengthMismatch {
            x: x.len(),
            y: y.len(),
        });
    }
    if x.is_empty() {
        return Err(InterpolationError::EmptyInput);
    }
    if x[0].is_nan() {
        return Err(InterpolationError::NotMonotonic { index: 0 });
    }
    for i in 1..x.len() {
        // Also catches NaN.
        if !(x[i] >= x[i - 1]) {
            return Err(InterpolationError::NotMonotonic { index: i });
        }
    }
    Ok(())
}

/// Segment slopes padded with two extrapolated values on each side.
fn extended_slopes(x: &[f64], y: &[f64]) -> Vec<f64> {
    let n = x.len();
    let mut m = vec![0.0; n + 3];
    for i in 0..n - 1 {
        let h = x[i + 1] - x[i];
        m[i + 2] = if h < MIN_SEGMENT {
            0.0
        } else {
            (y[i + 1] - y[i]) / h
        };
    }

    if n == 2 {
        let only = m[2];
        m.iter_mut().for_each(|v| *v = only);
        return m;
    }

    m[1] = 2.0 * m[2] - m[3];
    m[0] = 2.0 * m[1] - m[2];
    m[n + 1] = 2.0 * m[n] - m[n - 1];
    m[n + 2] = 2.0 * m[n + 1] - m[n];
    m
}

/// Fit Akima coefficients through `(x, y)`.
///
/// `x` must be non-decreasing; repeated abscissae form zero-length segments.
pub fn fit(x: &[f64], y: &[f64]) -> Result<AkimaCoeffs, InterpolationError> {
    check_input(x, y)?;
    let n = x.len();

    if n == 1 {
        return Ok(AkimaCoeffs {
            x: x.to_vec(),
            a: vec![y[0]],
            b: vec![0.0],
            c: vec![0.0],
            d: vec![0.0],
        });
    }

    let m = extended_slopes(x, y);

    // Node i sees slopes m[i-2..=i+1], stored at m[i..=i+3].
    let t: Vec<f64> = (0..n)
        .map(|i| {
            let w1 = (m[i + 3] - m[i + 2]).abs();
            let w2 = (m[i + 1] - m[i]).abs();
            if w1 + w2 < MIN_WEIGHT {
                0.5 * (m[i + 1] + m[i + 2])
            } else {
                (w1 * m[i + 1] + w2 * m[i + 2]) / (w1 + w2)
            }
        })
        .collect();

    let segments = n - 1;
    let mut coeffs = AkimaCoeffs {
        x: x.to_vec(),
        a: Vec::with_capacity(segments),
        b: Vec::with_capacity(segments),
        c: Vec::with_capacity(segments),
        d: Vec::with_capacity(segments),
    };
    for i in 0..segments {
        let h = x[i + 1] - x[i];
        let slope = m[i + 2];
        coeffs.a.push(y[i]);
        coeffs.b.push(t[i]);
        if h < MIN_SEGMENT {
            coeffs.c.push(0.0);
            coeffs.d.push(0.0);
        } else {
            coeffs.c.push((3.0 * slope - 2.0 * t[i] - t[i + 1]) / h);
            coeffs.d.push((t[i] + t[i + 1] - 2.0 * slope) / (h * h));
        }
    }
    Ok(coeffs)
}

fn auto_path(points: &[f64]) -> EvalPath {
    if points.len() < 2 {
        return EvalPath::BinarySearch;
    }
    if points.windows(2).all(|w| w[1] > w[0]) {
        EvalPath::Forward
    } else if points.windows(2).all(|w| w[1] < w[0]) {
        EvalPath::Backward
    } else {
        EvalPath::BinarySearch
    }
}

/// Evaluate at every point of `points` with the given segment search.
///
/// The walking paths re-seek by binary search whenever the grid breaks
/// their ordering, so every path returns the same values.
pub fn evaluate_using(coeffs: &AkimaCoeffs, points: &[f64], path: EvalPath) -> Vec<f64> {
    let path = match path {
        EvalPath::Auto => auto_path(points),
        other => other,
    };
    let last = coeffs.segments() - 1;
    let mut out = Vec::with_capacity(points.len());

    match path {
        EvalPath::Forward => {
            let mut prev = f64::NEG_INFINITY;
            let mut i = 0;
            for &xo in points {
                if !(xo >= prev) {
                    i = coeffs.locate(xo);
                } else {
                    while i < last && coeffs.x[i + 1] <= xo {
                        i += 1;
                    }
                }
                prev = xo;
                out.push(coeffs.eval_segment(i, xo));
            }
        }
        EvalPath::Backward => {
            let mut prev = f64::INFINITY;
            let mut i = last;
            for &xo in points {
                if !(xo <= prev) {
                    i = coeffs.locate(xo);
                } else {
                    while i > 0 && coeffs.x[i] > xo {
                        i -= 1;
                    }
                }
                prev = xo;
                out.push(coeffs.eval_segment(i, xo));
            }
        }
        EvalPath::BinarySearch | EvalPath::Auto => {
            out.extend(points.iter().map(|&xo| coeffs.value_at(xo)));
        }
    }
    out
}

/// Evaluate at every point of `points`.
pub fn evaluate(coeffs: &AkimaCoeffs, points: &[f64]) -> Vec<f64> {
    evaluate_using(coeffs, points, EvalPath::Auto)
}

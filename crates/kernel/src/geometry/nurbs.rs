use nalgebra::Vector4;
use serde::{Deserialize, Serialize};

use super::{GeometryError, Point3d, Vec3, SMOOTH};

/// Knots closer than this are treated as the same knot.
const KNOT_TOLERANCE: f64 = 1e-10;

/// Endpoints closer than this make the curve closed.
const CLOSURE_TOLERANCE: f64 = 1e-9;

/// A NURBS (Non-Uniform Rational B-Spline) curve in 3D.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NurbsCurve {
    /// Degree of the curve.
    pub degree: usize,
    /// Control points in 3D.
    pub control_points: Vec<Point3d>,
    /// Weights for rational curves. If empty, treated as all 1.0 (non-rational).
    pub weights: Vec<f64>,
    /// Knot vector (must have len = control_points.len() + degree + 1).
    pub knots: Vec<f64>,
}

impl NurbsCurve {
    pub fn new(
        degree: usize,
        control_points: Vec<Point3d>,
        weights: Vec<f64>,
        knots: Vec<f64>,
    ) -> Result<Self, GeometryError> {
        let invalid = |reason: &str| GeometryError::InvalidNurbs {
            reason: reason.to_string(),
        };
        if degree == 0 {
            return Err(invalid("degree must be at least 1"));
        }
        if control_points.len() <= degree {
            return Err(invalid("need more control points than the degree"));
        }
        if knots.len() != control_points.len() + degree + 1 {
            return Err(invalid("knot vector length must be n + p + 1"));
        }
        if !weights.is_empty() && weights.len() != control_points.len() {
            return Err(invalid("weights must be empty or match control points"));
        }
        if weights.iter().any(|&w| w <= 0.0) {
            return Err(invalid("weights must be positive"));
        }
        if knots.windows(2).any(|w| w[1] < w[0]) {
            return Err(invalid("knots must be non-decreasing"));
        }
        if knots[degree] >= knots[knots.len() - degree - 1] {
            return Err(invalid("empty parameter domain"));
        }
        Ok(Self {
            degree,
            control_points,
            weights,
            knots,
        })
    }

    /// Create a non-rational B-spline curve.
    pub fn bspline(
        degree: usize,
        control_points: Vec<Point3d>,
        knots: Vec<f64>,
    ) -> Result<Self, GeometryError> {
        Self::new(degree, control_points, vec![], knots)
    }

    /// Degree-1 B-spline through `points`, with one parameter unit per
    /// segment. Interior knots are simple, so the curve is only C0 there.
    pub fn polyline(points: &[Point3d]) -> Result<Self, GeometryError> {
        let n = points.len();
        if n < 2 {
            return Err(GeometryError::InvalidNurbs {
                reason: "polyline needs at least two points".to_string(),
            });
        }
        let mut knots = Vec::with_capacity(n + 2);
        knots.push(0.0);
        knots.extend((0..n).map(|i| i as f64));
        knots.push((n - 1) as f64);
        Self::bspline(1, points.to_vec(), knots)
    }

    fn is_rational(&self) -> bool {
        !self.weights.is_empty()
    }

    fn weight(&self, i: usize) -> f64 {
        if self.is_rational() {
            self.weights[i]
        } else {
            1.0
        }
    }

    /// Number of control points.
    pub fn num_control_points(&self) -> usize {
        self.control_points.len()
    }

    /// Parameter domain [t_min, t_max].
    pub fn domain(&self) -> (f64, f64) {
        (self.knots[self.degree], self.knots[self.knots.len() - self.degree - 1])
    }

    pub fn is_closed(&self) -> bool {
        let (t0, t1) = self.domain();
        nalgebra::distance(&self.evaluate(t0), &self.evaluate(t1)) < CLOSURE_TOLERANCE
    }

    /// Find the knot span index for parameter t using binary search.
    fn find_span(&self, t: f64) -> usize {
        let n = self.num_control_points() - 1;
        let p = self.degree;

        if t >= self.knots[n + 1] {
            return n;
        }
        if t <= self.knots[p] {
            return p;
        }

        let mut low = p;
        let mut high = n + 1;
        let mut mid = (low + high) / 2;
        while t < self.knots[mid] || t >= self.knots[mid + 1] {
            if t < self.knots[mid] {
                high = mid;
            } else {
                low = mid;
            }
            mid = (low + high) / 2;
        }
        mid
    }

    /// Compute B-spline basis functions at parameter t.
    fn basis_functions(&self, span: usize, t: f64) -> Vec<f64> {
        let p = self.degree;
        let mut n_vals = vec![0.0; p + 1];
        let mut left = vec![0.0; p + 1];
        let mut right = vec![0.0; p + 1];

        n_vals[0] = 1.0;
        for j in 1..=p {
            left[j] = t - self.knots[span + 1 - j];
            right[j] = self.knots[span + j] - t;
            let mut saved = 0.0;
            for r in 0..j {
                let temp = n_vals[r] / (right[r + 1] + left[j - r]);
                n_vals[r] = saved + right[r + 1] * temp;
                saved = left[j - r] * temp;
            }
            n_vals[j] = saved;
        }
        n_vals
    }

    /// Control points lifted to 4D homogeneous coordinates `(wx, wy, wz, w)`.
    fn homogeneous(&self) -> Vec<Vector4<f64>> {
        self.control_points
            .iter()
            .enumerate()
            .map(|(i, p)| {
                let w = self.weight(i);
                Vector4::new(p.x * w, p.y * w, p.z * w, w)
            })
            .collect()
    }

    fn from_homogeneous(
        degree: usize,
        points: &[Vector4<f64>],
        knots: Vec<f64>,
        rational: bool,
    ) -> Self {
        let control_points = points
            .iter()
            .map(|h| Point3d::new(h.x / h.w, h.y / h.w, h.z / h.w))
            .collect();
        let weights = if rational {
            points.iter().map(|h| h.w).collect()
        } else {
            vec![]
        };
        Self {
            degree,
            control_points,
            weights,
            knots,
        }
    }

    /// Evaluate the curve at parameter t.
    pub fn evaluate(&self, t: f64) -> Point3d {
        let (t_min, t_max) = self.domain();
        let t = t.clamp(t_min, t_max);
        let span = self.find_span(t);
        let basis = self.basis_functions(span, t);
        let p = self.degree;

        let mut wx = 0.0;
        let mut wy = 0.0;
        let mut wz = 0.0;
        let mut w_sum = 0.0;
        for (i, b) in basis.iter().enumerate() {
            let idx = span - p + i;
            let cp = self.control_points[idx];
            let bw = b * self.weight(idx);
            wx += cp.x * bw;
            wy += cp.y * bw;
            wz += cp.z * bw;
            w_sum += bw;
        }
        Point3d::new(wx / w_sum, wy / w_sum, wz / w_sum)
    }

    /// Evaluate the first derivative at parameter t.
    pub fn derivative(&self, t: f64) -> Vec3 {
        // Finite difference; one-sided at the domain ends.
        let dt = 1e-8;
        let (tmin, tmax) = self.domain();
        let t0 = (t - dt).max(tmin);
        let t1 = (t + dt).min(tmax);
        let actual_dt = t1 - t0;
        if actual_dt.abs() < 1e-15 {
            return Vec3::zeros();
        }
        (self.evaluate(t1) - self.evaluate(t0)) / actual_dt
    }

    /// How many times `t` appears in the knot vector.
    pub fn knot_multiplicity(&self, t: f64) -> usize {
        self.knots
            .iter()
            .filter(|&&k| (k - t).abs() <= KNOT_TOLERANCE)
            .count()
    }

    /// Distinct knot values strictly inside the domain.
    fn interior_knots(&self) -> Vec<f64> {
        let (t0, t1) = self.domain();
        let mut out: Vec<f64> = Vec::new();
        for &k in &self.knots {
            if k <= t0 + KNOT_TOLERANCE || k >= t1 - KNOT_TOLERANCE {
                continue;
            }
            if out.last().is_none_or(|&last| (k - last).abs() > KNOT_TOLERANCE) {
                out.push(k);
            }
        }
        out
    }

    /// Parametric continuity at `t`: `degree - multiplicity` on an interior
    /// knot, [`SMOOTH`] everywhere else.
    pub fn continuity_at(&self, t: f64) -> u32 {
        let (t0, t1) = self.domain();
        if t <= t0 + KNOT_TOLERANCE || t >= t1 - KNOT_TOLERANCE {
            return SMOOTH;
        }
        match self.knot_multiplicity(t) {
            0 => SMOOTH,
            m => (self.degree as u32).saturating_sub(m as u32),
        }
    }

    /// Interior knots where the continuity order is below `order`.
    pub fn discontinuities(&self, order: u32) -> Vec<f64> {
        self.interior_knots()
            .into_iter()
            .filter(|&k| self.continuity_at(k) < order)
            .collect()
    }

    /// Insert `t` once (Boehm's algorithm, in homogeneous coordinates).
    fn insert_knot(&self, t: f64) -> Self {
        let p = self.degree;
        let k = self.find_span(t);
        let pw = self.homogeneous();
        let n = pw.len();

        let mut q = Vec::with_capacity(n + 1);
        for i in 0..=n {
            if i + p <= k {
                q.push(pw[i]);
            } else if i > k {
                q.push(pw[i - 1]);
            } else {
                let alpha = (t - self.knots[i]) / (self.knots[i + p] - self.knots[i]);
                q.push(pw[i] * alpha + pw[i - 1] * (1.0 - alpha));
            }
        }

        let mut knots = self.knots.clone();
        knots.insert(k + 1, t);
        Self::from_homogeneous(p, &q, knots, self.is_rational())
    }

    /// Split at interior parameter `t`. Both halves keep the original
    /// parameterization and share the point at `t`.
    pub fn split_at(&self, t: f64) -> Result<(Self, Self), GeometryError> {
        let (t_min, t_max) = self.domain();
        if t <= t_min + KNOT_TOLERANCE || t >= t_max - KNOT_TOLERANCE {
            return Err(GeometryError::ParameterOutOfRange {
                t,
                min: t_min,
                max: t_max,
            });
        }

        // Snap onto an existing knot so insertion does not create a sliver span.
        let t = self
            .knots
            .iter()
            .copied()
            .find(|k| (k - t).abs() <= KNOT_TOLERANCE)
            .unwrap_or(t);

        let p = self.degree;
        let existing = self.knot_multiplicity(t);
        if existing > p + 1 {
            return Err(GeometryError::InvalidNurbs {
                reason: format!("knot {t} has multiplicity {existing} > degree + 1"),
            });
        }

        let mut refined = self.clone();
        for _ in existing..p {
            refined = refined.insert_knot(t);
        }
        let multiplicity = existing.max(p);

        let first = refined
            .knots
            .iter()
            .position(|&k| (k - t).abs() <= KNOT_TOLERANCE)
            .ok_or_else(|| GeometryError::InvalidNurbs {
                reason: "inserted knot not found".to_string(),
            })?;

        let pw = refined.homogeneous();
        let rational = self.is_rational();

        let mut left_knots = refined.knots[..first + p].to_vec();
        left_knots.push(t);
        let left = Self::from_homogeneous(p, &pw[..first], left_knots, rational);

        let tail = first + multiplicity - p;
        let mut right_knots = vec![t];
        right_knots.extend_from_slice(&refined.knots[tail..]);
        let right = Self::from_homogeneous(p, &pw[tail - 1..], right_knots, rational);

        Ok((left, right))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    fn make_line_as_nurbs() -> NurbsCurve {
        // A degree-1 NURBS from (0,0,0) to (10,0,0)
        NurbsCurve::bspline(
            1,
            vec![Point3d::new(0.0, 0.0, 0.0), Point3d::new(10.0, 0.0, 0.0)],
            vec![0.0, 0.0, 1.0, 1.0],
        )
        .unwrap()
    }

    fn kinked_quadratic() -> NurbsCurve {
        // Two quadratic arcs joined at t = 1 with a double knot (C0 there).
        NurbsCurve::bspline(
            2,
            vec![
                Point3d::new(0.0, 0.0, 0.0),
                Point3d::new(1.0, 2.0, 0.0),
                Point3d::new(2.0, 0.0, 0.0),
                Point3d::new(3.0, 3.0, 0.0),
                Point3d::new(4.0, 0.0, 1.0),
            ],
            vec![0.0, 0.0, 0.0, 1.0, 1.0, 2.0, 2.0, 2.0],
        )
        .unwrap()
    }

    #[test]
    fn test_nurbs_line_evaluate() {
        let c = make_line_as_nurbs();
        let p = c.evaluate(0.5);
        assert_abs_diff_eq!(p, Point3d::new(5.0, 0.0, 0.0), epsilon = 1e-10);
    }

    #[test]
    fn test_invalid_knot_length_rejected() {
        let err = NurbsCurve::bspline(
            1,
            vec![Point3d::origin(), Point3d::new(1.0, 0.0, 0.0)],
            vec![0.0, 1.0, 1.0],
        );
        assert!(matches!(err, Err(GeometryError::InvalidNurbs { .. })));
    }

    #[test]
    fn test_nurbs_circle_via_rational() {
        // Quarter circle using rational NURBS (degree 2)
        let w = std::f64::consts::FRAC_1_SQRT_2;
        let c = NurbsCurve::new(
            2,
            vec![
                Point3d::new(1.0, 0.0, 0.0),
                Point3d::new(1.0, 1.0, 0.0),
                Point3d::new(0.0, 1.0, 0.0),
            ],
            vec![1.0, w, 1.0],
            vec![0.0, 0.0, 0.0, 1.0, 1.0, 1.0],
        )
        .unwrap();

        for i in 0..=20 {
            let t = i as f64 / 20.0;
            let p = c.evaluate(t);
            let r = (p.x * p.x + p.y * p.y).sqrt();
            assert_abs_diff_eq!(r, 1.0, epsilon = 1e-7);
        }
    }

    #[test]
    fn test_continuity_at_double_knot() {
        let c = kinked_quadratic();
        assert_eq!(c.continuity_at(1.0), 0);
        assert_eq!(c.continuity_at(0.5), SMOOTH);
        assert_eq!(c.discontinuities(1), vec![1.0]);
        assert!(c.discontinuities(0).is_empty());
    }

    #[test]
    fn test_polyline_corners_are_c0() {
        let c = NurbsCurve::polyline(&[
            Point3d::new(0.0, 0.0, 0.0),
            Point3d::new(1.0, 0.0, 0.0),
            Point3d::new(1.0, 1.0, 0.0),
            Point3d::new(2.0, 1.0, 0.0),
        ])
        .unwrap();
        assert_eq!(c.domain(), (0.0, 3.0));
        assert_eq!(c.discontinuities(1), vec![1.0, 2.0]);
        assert_abs_diff_eq!(c.evaluate(1.5), Point3d::new(1.0, 0.5, 0.0), epsilon = 1e-12);
    }

    #[test]
    fn test_split_preserves_shape_non_knot() {
        let c = kinked_quadratic();
        let (left, right) = c.split_at(0.4).unwrap();
        assert_eq!(left.domain(), (0.0, 0.4));
        assert_eq!(right.domain(), (0.4, 2.0));
        for i in 0..=40 {
            let t = 2.0 * i as f64 / 40.0;
            let piece = if t <= 0.4 { &left } else { &right };
            assert_abs_diff_eq!(piece.evaluate(t), c.evaluate(t), epsilon = 1e-9);
        }
    }

    #[test]
    fn test_split_at_existing_double_knot() {
        let c = kinked_quadratic();
        let (left, right) = c.split_at(1.0).unwrap();
        assert_eq!(left.num_control_points(), 3);
        assert_eq!(right.num_control_points(), 3);
        let joint = Point3d::new(2.0, 0.0, 0.0);
        assert_abs_diff_eq!(left.evaluate(1.0), joint, epsilon = 1e-12);
        assert_abs_diff_eq!(right.evaluate(1.0), joint, epsilon = 1e-12);
        assert!(left.discontinuities(1).is_empty());
        assert!(right.discontinuities(1).is_empty());
    }

    #[test]
    fn test_split_rational_stays_on_circle() {
        let w = std::f64::consts::FRAC_1_SQRT_2;
        let c = NurbsCurve::new(
            2,
            vec![
                Point3d::new(1.0, 0.0, 0.0),
                Point3d::new(1.0, 1.0, 0.0),
                Point3d::new(0.0, 1.0, 0.0),
            ],
            vec![1.0, w, 1.0],
            vec![0.0, 0.0, 0.0, 1.0, 1.0, 1.0],
        )
        .unwrap();
        let (left, right) = c.split_at(0.3).unwrap();
        for piece in [&left, &right] {
            let (a, b) = piece.domain();
            for i in 0..=10 {
                let p = piece.evaluate(a + (b - a) * i as f64 / 10.0);
                let r = (p.x * p.x + p.y * p.y).sqrt();
                assert_abs_diff_eq!(r, 1.0, epsilon = 1e-9);
            }
        }
    }

    #[test]
    fn test_split_rejects_end_parameter() {
        let c = make_line_as_nurbs();
        assert!(matches!(
            c.split_at(1.0),
            Err(GeometryError::ParameterOutOfRange { .. })
        ));
    }
}

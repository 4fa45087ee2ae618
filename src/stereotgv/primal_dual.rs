//! # Primal-dual iterations
//!
//! One inner step of the preconditioned primal-dual scheme for the TGV-L1 energy
//!
//! ```text
//! min_{u, v}  alpha0·|T∇u - v| + alpha1·|∇v| + lambda·|Iz + Iw·(u - u_s)|
//! ```
//!
//! consists of a dual ascent on `(p, q)` followed by projection onto the unit balls, the
//! product `Tp = T·p`, a primal descent on `(u, v)` with the L1 proximal step on `u`, and the
//! over-relaxation of the primal variables.
//!
//! All derivatives are forward differences with Neumann boundary conditions and all divergences
//! are their negative adjoints.

// -----------------------------------------------------------------------------------------------
// IMPORTS
// -----------------------------------------------------------------------------------------------

use super::params::TgvWeights;
use super::pyramid::PyramidLevel;
use crate::backend::ComputeBackend;
use crate::error::*;
use crate::field::{Eta, Field, Float2, Float4, ScalarField, SymTensor, TensorField, VectorField};

// -----------------------------------------------------------------------------------------------
// CONSTANTS
// -----------------------------------------------------------------------------------------------

/// Squared projected gradients below this leave the thresholded value unchanged.
const MIN_GRADIENT_SQ: f32 = 1e-9;

// -----------------------------------------------------------------------------------------------
// DATA STRUCTURES
// -----------------------------------------------------------------------------------------------

/// Every field the solver works on at one pyramid level.
///
/// `*_next` fields are the write side of double-buffered updates and are swapped with their
/// counterpart after each launch.
pub struct SolverState {
    /// Disparity.
    pub u: ScalarField,
    /// Over-relaxed disparity.
    pub u_bar: ScalarField,
    /// Disparity at the start of the current warp, the linearisation point.
    pub u_s: ScalarField,
    pub u_next: ScalarField,

    /// Auxiliary TGV field.
    pub v: VectorField,
    pub v_bar: VectorField,
    pub v_s: VectorField,
    pub v_next: VectorField,

    /// Dual of `T∇u - v`.
    pub p: VectorField,
    pub p_next: VectorField,

    /// Dual of `∇v`, stored as `(∂x v.x, ∂y v.x, ∂x v.y, ∂y v.y)`.
    pub q: TensorField,
    pub q_next: TensorField,

    /// `T·p`.
    pub tp: VectorField,

    pub tensor: Field<SymTensor>,
    pub eta: Field<Eta>,

    /// Displacement of the current warp.
    pub warp: VectorField,
    /// Translation vectors used for the current linearisation.
    pub tv2: VectorField,

    pub i1_warp: ScalarField,
    pub ix: ScalarField,
    pub iy: ScalarField,
    pub iw: ScalarField,
    pub iz: ScalarField,

    /// Smoothed reference image the tensor is computed from.
    pub smooth: ScalarField,
    pub smooth_tmp: ScalarField,
}

// -----------------------------------------------------------------------------------------------
// IMPLEMENTATIONS
// -----------------------------------------------------------------------------------------------

impl SolverState {
    /// Allocate zeroed fields for a level.
    pub fn new(level: &PyramidLevel) -> Self {
        SolverState {
            u: level.field(),
            u_bar: level.field(),
            u_s: level.field(),
            u_next: level.field(),
            v: level.field(),
            v_bar: level.field(),
            v_s: level.field(),
            v_next: level.field(),
            p: level.field(),
            p_next: level.field(),
            q: level.field(),
            q_next: level.field(),
            tp: level.field(),
            tensor: level.field(),
            eta: level.field(),
            warp: level.field(),
            tv2: level.field(),
            i1_warp: level.field(),
            ix: level.field(),
            iy: level.field(),
            iw: level.field(),
            iz: level.field(),
            smooth: level.field(),
            smooth_tmp: level.field(),
        }
    }

    pub fn width(&self) -> usize {
        self.u.width()
    }

    pub fn height(&self) -> usize {
        self.u.height()
    }

    /// Zero the primal variables.
    pub fn reset(&mut self) {
        self.u.fill(0.0);
        self.v.fill(Float2::default());
    }

    /// Prepare a level solve from the current `u` and `v`: clear the duals and seed the
    /// over-relaxed primals.
    pub fn begin_level(&mut self) -> Result<()> {
        self.p.fill(Float2::default());
        self.q.fill(Float4::default());
        self.u_bar.copy_from(&self.u)?;
        self.v_bar.copy_from(&self.v)
    }

    /// Snapshot the primal variables as the linearisation point of a new warp.
    pub fn begin_warp(&mut self) -> Result<()> {
        self.u_s.copy_from(&self.u)?;
        self.v_s.copy_from(&self.v)
    }

    /// Mean absolute change of the disparity since the start of the current warp.
    pub fn mean_update(&self) -> f32 {
        let n = self.width() * self.height();
        if n == 0 {
            return 0.0;
        }

        let total: f64 = self
            .u
            .pixels()
            .zip(self.u_s.pixels())
            .map(|(u, us)| (u - us).abs() as f64)
            .sum();

        (total / n as f64) as f32
    }
}

// -----------------------------------------------------------------------------------------------
// FUNCTIONS
// -----------------------------------------------------------------------------------------------

/// Dual ascent and projection of `p` and `q`.
pub fn update_dual_variables<B: ComputeBackend>(
    backend: &B,
    weights: &TgvWeights,
    state: &mut SolverState,
) -> Result<()> {
    {
        let SolverState {
            u_bar,
            v_bar,
            p,
            p_next,
            q,
            q_next,
            tensor,
            ..
        } = &mut *state;
        let (u_bar, v_bar, p, q, tensor) = (&*u_bar, &*v_bar, &*p, &*q, &*tensor);

        let TgvWeights {
            alpha0,
            alpha1,
            theta,
            ..
        } = *weights;
        let (w, h) = (u_bar.width(), u_bar.height());
        let sigma_q = 1.0 / (theta * 2.0 * alpha1);

        backend.launch_pair(p_next, q_next, |x, y| {
            let bx = if x + 1 < w { 1.0 } else { 0.0 };
            let by = if y + 1 < h { 1.0 } else { 0.0 };
            let t = tensor.get(x, y);

            // Reciprocal absolute row sums of the two P rows
            let sigma_px = 1.0
                / (theta
                    * alpha0
                    * (t.a.abs() * bx + t.c.abs() * by + (t.a * bx + t.c * by).abs() + 1.0));
            let sigma_py = 1.0
                / (theta
                    * alpha0
                    * (t.c.abs() * bx + t.b.abs() * by + (t.c * bx + t.b * by).abs() + 1.0));

            let r = t.apply(gradient(u_bar, x, y)) - v_bar.get(x, y);
            let p0 = p.get(x, y);
            let p_new = project_p(Float2::new(
                p0.x + sigma_px * alpha0 * r.x,
                p0.y + sigma_py * alpha0 * r.y,
            ));

            let q_new = project_q(q.get(x, y) + jacobian(v_bar, x, y) * (sigma_q * alpha1));

            (p_new, q_new)
        })?;
    }

    state.p.swap(&mut state.p_next);
    state.q.swap(&mut state.q_next);

    Ok(())
}

/// Compute `Tp = T·p`.
pub fn solve_tp<B: ComputeBackend>(backend: &B, state: &mut SolverState) -> Result<()> {
    let SolverState { tensor, p, tp, .. } = state;
    let (tensor, p) = (&*tensor, &*p);

    backend.launch(tp, |x, y| tensor.get(x, y).apply(p.get(x, y)))
}

/// Primal descent on `u` and `v`, L1 proximal step on `u`, then over-relaxation.
pub fn update_primal_variables<B: ComputeBackend>(
    backend: &B,
    weights: &TgvWeights,
    state: &mut SolverState,
) -> Result<()> {
    {
        let SolverState {
            u,
            u_s,
            u_next,
            v,
            v_next,
            p,
            q,
            tp,
            eta,
            iw,
            iz,
            ..
        } = &mut *state;
        let (u, u_s, v, p, q, tp, eta, iw, iz) =
            (&*u, &*u_s, &*v, &*p, &*q, &*tp, &*eta, &*iw, &*iz);

        let TgvWeights {
            alpha0,
            alpha1,
            lambda,
            theta,
        } = *weights;

        backend.launch_pair(u_next, v_next, |x, y| {
            let e = eta.get(x, y);
            let tau_u = theta / e.u;

            let u_tilde = u.get(x, y) + tau_u * alpha0 * divergence(tp, x, y);
            let u_new = threshold_l1(
                u_tilde,
                u_s.get(x, y),
                iw.get(x, y),
                iz.get(x, y),
                tau_u * lambda,
            );

            let ap = p.get(x, y) * alpha0;
            let dq = divergence_q(q, x, y) * alpha1;
            let v0 = v.get(x, y);
            let v_new = Float2::new(
                v0.x + theta / e.v1 * (ap.x + dq.x),
                v0.y + theta / e.v2 * (ap.y + dq.y),
            );

            (u_new, v_new)
        })?;
    }

    relax(backend, state)
}

/// Over-relax the new primal iterates against the previous ones and make them current.
fn relax<B: ComputeBackend>(backend: &B, state: &mut SolverState) -> Result<()> {
    {
        let SolverState {
            u,
            u_bar,
            u_next,
            v,
            v_bar,
            v_next,
            ..
        } = &mut *state;
        let (u, u_next, v, v_next) = (&*u, &*u_next, &*v, &*v_next);

        backend.launch_pair(u_bar, v_bar, |x, y| {
            (
                2.0 * u_next.get(x, y) - u.get(x, y),
                v_next.get(x, y) * 2.0 - v.get(x, y),
            )
        })?;
    }

    state.u.swap(&mut state.u_next);
    state.v.swap(&mut state.v_next);

    Ok(())
}

/// Proximal operator of `tl·|Iz + Iw·(u - u_s)|` evaluated at `u_tilde`.
pub fn threshold_l1(u_tilde: f32, u_s: f32, iw: f32, iz: f32, tl: f32) -> f32 {
    let rho = iz + iw * (u_tilde - u_s);
    let iw_sq = iw * iw;

    if rho < -tl * iw_sq {
        u_tilde + tl * iw
    } else if rho > tl * iw_sq {
        u_tilde - tl * iw
    } else if iw_sq > MIN_GRADIENT_SQ {
        u_tilde - rho / iw
    } else {
        u_tilde
    }
}

/// Project onto the Euclidean unit ball. Non-finite inputs project to zero.
pub fn project_p(p: Float2) -> Float2 {
    if !(p.x.is_finite() && p.y.is_finite()) {
        return Float2::default();
    }

    let m = p.x.abs().max(p.y.abs());
    if m <= 0.5 {
        return p;
    }

    // Normalise by the largest component first so the norm cannot overflow
    let s = Float2::new(p.x / m, p.y / m);
    let n = s.norm();
    if m * n > 1.0 {
        s * (1.0 / n)
    } else {
        p
    }
}

/// Project onto the Frobenius unit ball. Non-finite inputs project to zero.
pub fn project_q(q: Float4) -> Float4 {
    if ![q.x, q.y, q.z, q.w].iter().all(|c| c.is_finite()) {
        return Float4::default();
    }

    let m = q.x.abs().max(q.y.abs()).max(q.z.abs()).max(q.w.abs());
    if m <= 0.5 {
        return q;
    }

    let s = Float4::new(q.x / m, q.y / m, q.z / m, q.w / m);
    let n = s.norm();
    if m * n > 1.0 {
        s * (1.0 / n)
    } else {
        q
    }
}

/// Forward difference gradient with Neumann boundary.
fn gradient(f: &ScalarField, x: usize, y: usize) -> Float2 {
    let c = f.get(x, y);
    Float2::new(
        if x + 1 < f.width() { f.get(x + 1, y) - c } else { 0.0 },
        if y + 1 < f.height() { f.get(x, y + 1) - c } else { 0.0 },
    )
}

/// Forward difference Jacobian `(∂x f.x, ∂y f.x, ∂x f.y, ∂y f.y)` with Neumann boundary.
fn jacobian(f: &VectorField, x: usize, y: usize) -> Float4 {
    let c = f.get(x, y);
    let dx = if x + 1 < f.width() {
        f.get(x + 1, y) - c
    } else {
        Float2::default()
    };
    let dy = if y + 1 < f.height() {
        f.get(x, y + 1) - c
    } else {
        Float2::default()
    };

    Float4::new(dx.x, dy.x, dx.y, dy.y)
}

/// Divergence of a vector field, the negative adjoint of [`gradient`].
fn divergence(f: &VectorField, x: usize, y: usize) -> f32 {
    let c = f.get(x, y);
    let mut div = 0.0;

    if x + 1 < f.width() {
        div += c.x;
    }
    if x > 0 {
        div -= f.get(x - 1, y).x;
    }
    if y + 1 < f.height() {
        div += c.y;
    }
    if y > 0 {
        div -= f.get(x, y - 1).y;
    }

    div
}

/// Row-wise divergence of `q`: `(div(q.x, q.y), div(q.z, q.w))`, the negative adjoint of
/// [`jacobian`].
fn divergence_q(f: &TensorField, x: usize, y: usize) -> Float2 {
    let c = f.get(x, y);
    let mut div = Float2::default();

    if x + 1 < f.width() {
        div = div + Float2::new(c.x, c.z);
    }
    if x > 0 {
        let l = f.get(x - 1, y);
        div = div - Float2::new(l.x, l.z);
    }
    if y + 1 < f.height() {
        div = div + Float2::new(c.y, c.w);
    }
    if y > 0 {
        let up = f.get(x, y - 1);
        div = div - Float2::new(up.y, up.w);
    }

    div
}

// -----------------------------------------------------------------------------------------------
// TESTS
// -----------------------------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{LaunchConfig, SerialBackend};
    use crate::stereotgv::params::Params;
    use crate::stereotgv::pyramid::level_geometry;
    use crate::stereotgv::tensor::solve_eta;
    use approx::assert_abs_diff_eq;

    fn state(width: usize, height: usize, weights: &TgvWeights) -> SolverState {
        let levels = level_geometry(width, height, 1, 0.5, &LaunchConfig::default()).unwrap();
        let mut state = SolverState::new(&levels[0]);
        state.tensor.fill(SymTensor::IDENTITY);
        solve_eta(
            &SerialBackend::new(),
            weights.alpha0,
            weights.alpha1,
            &state.tensor,
            &mut state.eta,
        )
        .unwrap();
        state
    }

    fn iterate(backend: &SerialBackend, weights: &TgvWeights, state: &mut SolverState, n: usize) {
        for _ in 0..n {
            update_dual_variables(backend, weights, state).unwrap();
            solve_tp(backend, state).unwrap();
            update_primal_variables(backend, weights, state).unwrap();
        }
    }

    #[test]
    fn projections_stay_in_unit_balls() {
        let big = [0.0, 0.3, -0.9, 1.0, 7.5, -1e6, 3e30, f32::MAX, -f32::MAX];

        for &a in &big {
            for &b in &big {
                let p = project_p(Float2::new(a, b));
                assert!(p.norm() <= 1.0 + 1e-6, "|p| = {} for ({}, {})", p.norm(), a, b);

                let q = project_q(Float4::new(a, b, -b, a));
                assert!(q.norm() <= 1.0 + 1e-6, "|q| = {} for ({}, {})", q.norm(), a, b);
            }
        }

        // Points inside the balls are left alone
        assert_eq!(project_p(Float2::new(0.6, -0.7)), Float2::new(0.6, -0.7));
        assert_eq!(project_q(Float4::new(0.5, 0.5, 0.5, -0.5)), Float4::new(0.5, 0.5, 0.5, -0.5));

        let p = project_p(Float2::new(3.0, 4.0));
        assert_abs_diff_eq!(p.x, 0.6, epsilon = 1e-6);
        assert_abs_diff_eq!(p.y, 0.8, epsilon = 1e-6);

        assert_eq!(project_p(Float2::new(f32::INFINITY, 0.0)), Float2::default());
        assert_eq!(project_q(Float4::new(f32::NAN, 0.0, 0.0, 0.0)), Float4::default());
    }

    #[test]
    fn soft_thresholding() {
        // Residual beyond the threshold band: step of tl·Iw towards zero residual
        assert_abs_diff_eq!(threshold_l1(1.0, 0.0, 1.0, 0.0, 0.1), 0.9, epsilon = 1e-6);
        assert_abs_diff_eq!(threshold_l1(-1.0, 0.0, 1.0, 0.0, 0.1), -0.9, epsilon = 1e-6);
        assert_abs_diff_eq!(threshold_l1(1.0, 0.0, -2.0, 0.0, 0.1), 0.8, epsilon = 1e-6);

        // Inside the band the residual is cancelled exactly
        assert_abs_diff_eq!(threshold_l1(0.05, 0.0, 1.0, 0.0, 0.1), 0.0, epsilon = 1e-6);
        assert_abs_diff_eq!(threshold_l1(2.0, 1.0, 0.5, -0.45, 1.0), 1.9, epsilon = 1e-6);

        // No gradient, no data term
        assert_eq!(threshold_l1(0.7, 0.0, 0.0, 0.3, 5.0), 0.7);
        assert_eq!(threshold_l1(0.7, 0.0, 0.0, -0.3, 5.0), 0.7);
    }

    #[test]
    fn divergence_is_negative_adjoint_of_gradient() {
        let (w, h) = (7, 5);
        let u = ScalarField::from_fn(w, h, 8, |x, y| ((x * 13 + y * 7) % 5) as f32 - 2.0);
        let p = VectorField::from_fn(w, h, 8, |x, y| {
            Float2::new(((x * 3 + y) % 4) as f32 * 0.5, ((x + y * 5) % 3) as f32 - 1.0)
        });
        let v = VectorField::from_fn(w, h, 8, |x, y| Float2::new((x * y) as f32 * 0.1, y as f32));
        let q = TensorField::from_fn(w, h, 8, |x, y| {
            Float4::new(x as f32, -(y as f32), ((x + y) % 3) as f32, 0.25)
        });

        let mut lhs_u = 0.0;
        let mut rhs_u = 0.0;
        let mut lhs_v = 0.0;
        let mut rhs_v = 0.0;
        for y in 0..h {
            for x in 0..w {
                lhs_u += gradient(&u, x, y).dot(p.get(x, y));
                rhs_u -= u.get(x, y) * divergence(&p, x, y);

                let j = jacobian(&v, x, y);
                let qq = q.get(x, y);
                lhs_v += j.x * qq.x + j.y * qq.y + j.z * qq.z + j.w * qq.w;
                rhs_v -= v.get(x, y).dot(divergence_q(&q, x, y));
            }
        }

        assert_abs_diff_eq!(lhs_u, rhs_u, epsilon = 1e-4);
        assert_abs_diff_eq!(lhs_v, rhs_v, epsilon = 1e-3);
    }

    #[test]
    fn zero_problem_stays_zero() {
        let backend = SerialBackend::new();
        let weights = Params::default().weights();
        let mut state = state(9, 6, &weights);

        state.begin_level().unwrap();
        state.begin_warp().unwrap();
        iterate(&backend, &weights, &mut state, 10);

        assert!(state.u.pixels().all(|u| u == 0.0));
        assert!(state.v.pixels().all(|v| v == Float2::default()));
        assert!(state.p.pixels().all(|p| p == Float2::default()));
        assert_eq!(state.mean_update(), 0.0);
    }

    #[test]
    fn constant_data_term_is_matched_exactly() {
        let backend = SerialBackend::new();
        let weights = Params::default().weights();
        let mut state = state(9, 6, &weights);

        // rho(u) = u - 0.5 everywhere
        state.iw.fill(1.0);
        state.iz.fill(-0.5);

        state.begin_level().unwrap();
        state.begin_warp().unwrap();
        iterate(&backend, &weights, &mut state, 3);

        for u in state.u.pixels() {
            assert_abs_diff_eq!(u, 0.5, epsilon = 1e-6);
        }
        assert_abs_diff_eq!(state.mean_update(), 0.5, epsilon = 1e-6);
    }

    #[test]
    fn regulariser_smooths_a_step() {
        let backend = SerialBackend::new();
        let weights = Params::default().weights();
        let mut state = state(12, 4, &weights);

        // No data term: an isolated step in u relaxes towards its neighbours
        backend
            .launch(&mut state.u, |x, _| if x == 6 { 1.0 } else { 0.0 })
            .unwrap();
        state.begin_level().unwrap();
        state.begin_warp().unwrap();
        iterate(&backend, &weights, &mut state, 50);

        assert!(state.u.get(6, 1) < 0.9);
        assert!(state.u.pixels().all(|u| u.is_finite()));
    }
}

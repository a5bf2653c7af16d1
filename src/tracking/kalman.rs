// src/tracking/kalman.rs
//
// Constant-velocity Kalman filter over a box in center form.
//
// State:       [cx, cy, s, r, vcx, vcy, vs]
//   - (cx, cy): box center in pixels
//   - s: box area, r: aspect ratio (w/h), assumed constant
//   - (vcx, vcy, vs): rates of change per second
//
// Measurement: [cx, cy, s, r]
//
// Transition:  x_{k+1} = F(dt) * x_k,  F = [[I₄, B(dt)], [0, I₃]]
// where B(dt) maps each velocity onto its position component scaled by dt.
// Process noise is inflated by max(1, dt) so long gaps between frames widen
// the uncertainty instead of trusting a stale velocity.

use nalgebra::{Matrix4, SMatrix, SVector, Vector4};
use tracing::warn;

use super::geometry::{to_center_form, to_corner_form, BBox};

pub type StateVector = SVector<f32, 7>;
pub type StateCovariance = SMatrix<f32, 7, 7>;
type MeasurementMatrix = SMatrix<f32, 4, 7>;
type GainMatrix = SMatrix<f32, 7, 4>;

/// Initial variance for observed components.
const INITIAL_P: f32 = 10.0;
/// Extra factor on the initial variance of the unobserved velocities.
const INITIAL_P_VELOCITY_SCALE: f32 = 1000.0;

const Q_DIAG: [f32; 7] = [1.0, 1.0, 10.0, 1e-3, 10.0, 10.0, 50.0];
const R_DIAG: [f32; 4] = [1.0, 1.0, 10.0, 1e-3];

#[derive(Debug, Clone)]
pub struct KalmanBox {
    x: StateVector,
    p: StateCovariance,
    q_base: StateCovariance,
    r: Matrix4<f32>,
    h: MeasurementMatrix,
}

impl KalmanBox {
    /// Start a filter at the detection, with zero velocity.
    pub fn new(bbox: &BBox) -> Self {
        let z = to_center_form(bbox);
        let mut x = StateVector::zeros();
        x.fixed_rows_mut::<4>(0).copy_from(&Vector4::from(z));

        let mut p = StateCovariance::identity() * INITIAL_P;
        for i in 4..7 {
            p[(i, i)] *= INITIAL_P_VELOCITY_SCALE;
        }

        let q_base = StateCovariance::from_diagonal(&StateVector::from(Q_DIAG));
        let r = Matrix4::from_diagonal(&Vector4::from(R_DIAG));

        let mut h = MeasurementMatrix::zeros();
        for i in 0..4 {
            h[(i, i)] = 1.0;
        }

        Self {
            x,
            p,
            q_base,
            r,
            h,
        }
    }

    fn transition(dt: f32) -> StateCovariance {
        let mut f = StateCovariance::identity();
        f[(0, 4)] = dt;
        f[(1, 5)] = dt;
        f[(2, 6)] = dt;
        f
    }

    /// Advance the state by `dt` seconds and return the predicted box.
    pub fn predict(&mut self, dt: f32) -> BBox {
        let f = Self::transition(dt);
        self.x = f * self.x;
        self.p = f * self.p * f.transpose() + self.q_base * dt.max(1.0);
        self.bbox()
    }

    /// Correct the state with a detected box.
    pub fn update(&mut self, bbox: &BBox) {
        let z = Vector4::from(to_center_form(bbox));

        let y = z - self.h * self.x;
        let s = self.h * self.p * self.h.transpose() + self.r;
        let Some(s_inv) = s.try_inverse() else {
            warn!("Box filter: singular innovation covariance, skipping update");
            return;
        };

        let k: GainMatrix = self.p * self.h.transpose() * s_inv;
        self.x += k * y;
        self.p = (StateCovariance::identity() - k * self.h) * self.p;
    }

    /// Current box estimate in corner form.
    pub fn bbox(&self) -> BBox {
        to_corner_form(self.x.as_slice())
    }

    pub fn state(&self) -> &StateVector {
        &self.x
    }

    pub fn covariance(&self) -> &StateCovariance {
        &self.p
    }
}

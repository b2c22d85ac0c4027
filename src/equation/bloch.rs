//! Two-site Bloch–McConnell evolution matrices
//!
//! Magnetization is ordered `[Ax, Ay, Az, Bx, By, Bz]`. The thermalized variant
//! prepends an identity element so that return to equilibrium is a linear term.

use nalgebra::{Matrix6, SMatrix, Vector6};

pub(crate) type Matrix7 = SMatrix<f64, 7, 7>;
pub(crate) type Vector7 = SMatrix<f64, 7, 1>;

/// Rotating-frame two-site exchange system
#[derive(Debug, Clone, Copy)]
pub(crate) struct TwoSite {
    pub pb: f64,
    pub kex: f64,
    /// Offset of site A from the carrier in rad/s
    pub delta_a: f64,
    pub delta_b: f64,
    /// B1 field strength in rad/s
    pub omega1: f64,
    pub r1a: f64,
    pub r1b: f64,
    pub r2a: f64,
    pub r2b: f64,
}

impl TwoSite {
    fn pa(&self) -> f64 {
        1.0 - self.pb
    }

    /// Forward (A to B) and backward rate constants
    fn rates(&self) -> (f64, f64) {
        (self.pb * self.kex, self.pa() * self.kex)
    }

    pub fn evolution(&self) -> Matrix6<f64> {
        let (k1, km1) = self.rates();
        let mut z = Matrix6::zeros();
        for (offset, r1, r2, delta, k_out) in [
            (0, self.r1a, self.r2a, self.delta_a, k1),
            (3, self.r1b, self.r2b, self.delta_b, km1),
        ] {
            z[(offset, offset)] = -r2 - k_out;
            z[(offset + 1, offset + 1)] = -r2 - k_out;
            z[(offset + 2, offset + 2)] = -r1 - k_out;
            z[(offset, offset + 1)] = -delta;
            z[(offset + 1, offset)] = delta;
            z[(offset + 1, offset + 2)] = -self.omega1;
            z[(offset + 2, offset + 1)] = self.omega1;
        }
        for i in 0..3 {
            z[(i, i + 3)] = km1;
            z[(i + 3, i)] = k1;
        }
        z
    }

    pub fn thermalized_evolution(&self) -> Matrix7 {
        let inner = self.evolution();
        let mut z = Matrix7::zeros();
        z.fixed_view_mut::<6, 6>(1, 1).copy_from(&inner);
        z[(3, 0)] = 2.0 * self.r1a * self.pa();
        z[(6, 0)] = 2.0 * self.r1b * self.pb;
        z
    }

    /// Decay rate of the real eigenmode closest to `estimate`
    ///
    /// Each site contributes one purely real mode along its effective field.
    /// The estimate picks the A-site one, which the largest real part does not
    /// when site B relaxes more slowly.
    pub fn rate_near(&self, estimate: f64) -> f64 {
        let z = self.evolution();
        // the Schur iteration does not terminate on non-finite input
        if !is_finite(z.as_slice()) || !estimate.is_finite() {
            return f64::NAN;
        }
        let eigenvalues = z.complex_eigenvalues();
        let nearest = |candidates: &mut dyn Iterator<Item = f64>| {
            candidates
                .map(|re| re.abs())
                .min_by(|a, b| (a - estimate).abs().total_cmp(&(b - estimate).abs()))
        };
        let real = nearest(
            &mut eigenvalues
                .iter()
                .filter(|ev| ev.im.abs() <= 1.0e-9 * ev.re.abs().max(1.0))
                .map(|ev| ev.re),
        );
        match real {
            Some(rate) => rate,
            None => nearest(&mut eigenvalues.iter().map(|ev| ev.re)).unwrap_or(f64::NAN),
        }
    }

    /// Decay rate of the A-site magnetization locked along the A effective field,
    /// from the full propagator over `time`
    pub fn spin_lock_rate(&self, time: f64) -> f64 {
        let theta = self.omega1.atan2(self.delta_a);
        let (sin, cos) = theta.sin_cos();
        let m0 = Vector6::new(self.pa() * sin, 0.0, self.pa() * cos, 0.0, 0.0, 0.0);
        let m1 = Vector6::new(sin, 0.0, cos, 0.0, 0.0, 0.0);
        let z = self.evolution();
        if !is_finite(z.as_slice()) {
            return f64::NAN;
        }
        let propagator = (z * time).exp();
        let mag = m1.dot(&(propagator * m0));
        let mag0 = m1.dot(&m0);
        -(mag / mag0).ln() / time
    }

    /// Longitudinal A-site magnetization after saturating for `time`
    pub fn saturated_magnetization(&self, time: f64) -> f64 {
        let pa = self.pa();
        let m0 = Vector7::from_column_slice(&[0.5, 0.0, 0.0, pa, 0.0, 0.0, self.pb]);
        let m1 = Vector7::from_column_slice(&[0.5, 0.0, 0.0, -pa, 0.0, 0.0, -self.pb]);
        let z = self.thermalized_evolution();
        if !is_finite(z.as_slice()) {
            return f64::NAN;
        }
        let propagator = (z * time).exp();
        ((propagator * m0)[3] - (propagator * m1)[3]) / 2.0
    }
}

fn is_finite(values: &[f64]) -> bool {
    values.iter().all(|v| v.is_finite())
}

//! Adaptive explicit Runge-Kutta integration (Dormand-Prince 5(4)).

use crate::error::{SimError, SimResult};

const C: [f64; 6] = [1.0 / 5.0, 3.0 / 10.0, 4.0 / 5.0, 8.0 / 9.0, 1.0, 1.0];

const A2: [f64; 1] = [1.0 / 5.0];
const A3: [f64; 2] = [3.0 / 40.0, 9.0 / 40.0];
const A4: [f64; 3] = [44.0 / 45.0, -56.0 / 15.0, 32.0 / 9.0];
const A5: [f64; 4] = [
    19372.0 / 6561.0,
    -25360.0 / 2187.0,
    64448.0 / 6561.0,
    -212.0 / 729.0,
];
const A6: [f64; 5] = [
    9017.0 / 3168.0,
    -355.0 / 33.0,
    46732.0 / 5247.0,
    49.0 / 176.0,
    -5103.0 / 18656.0,
];
// Fifth order weights, also the last stage (first same as last).
const B: [f64; 6] = [
    35.0 / 384.0,
    0.0,
    500.0 / 1113.0,
    125.0 / 192.0,
    -2187.0 / 6784.0,
    11.0 / 84.0,
];
// Difference between fifth and fourth order weights.
const E: [f64; 7] = [
    71.0 / 57600.0,
    0.0,
    -71.0 / 16695.0,
    71.0 / 1920.0,
    -17253.0 / 339200.0,
    22.0 / 525.0,
    -1.0 / 40.0,
];

/// Dormand-Prince integrator settings.
#[derive(Debug, Clone)]
pub struct Dopri5 {
    pub rtol: f64,
    pub atol: f64,
    pub max_step: f64,
    pub max_steps: usize,
}

impl Default for Dopri5 {
    fn default() -> Self {
        Self {
            rtol: 1e-6,
            atol: 1e-12,
            max_step: 10.0,
            max_steps: 100_000,
        }
    }
}

impl Dopri5 {
    /// Advance `y` from `t0` to `t1` under `dy/dt = f(t, y)`.
    ///
    /// `y` is only meaningful if `Ok` is returned.
    pub fn integrate<F>(&self, f: &mut F, t0: f64, t1: f64, y: &mut [f64]) -> SimResult<()>
    where
        F: FnMut(f64, &[f64], &mut [f64]),
    {
        if t1 <= t0 {
            return Ok(());
        }

        let n = y.len();
        let mut k: [Vec<f64>; 7] = std::array::from_fn(|_| vec![0.0; n]);
        let mut y_stage = vec![0.0; n];
        let mut y_new = vec![0.0; n];

        let mut t = t0;
        let mut h = self.max_step.min(t1 - t0);

        f(t, y, &mut k[0]);
        check_finite(t, &k[0])?;

        for _ in 0..self.max_steps {
            if t >= t1 {
                return Ok(());
            }
            let last = t + h >= t1;
            if last {
                h = t1 - t;
            }

            for (stage, a) in [&A2[..], &A3[..], &A4[..], &A5[..], &A6[..]]
                .into_iter()
                .enumerate()
            {
                combine(y, h, a, &k, &mut y_stage);
                f(t + C[stage] * h, &y_stage, &mut k[stage + 1]);
            }
            combine(y, h, &B, &k, &mut y_new);
            f(t + C[5] * h, &y_new, &mut k[6]);

            let err = self.error_norm(y, &y_new, h, &k);
            if !err.is_finite() {
                return Err(SimError::IntegrationFailure {
                    t,
                    reason: "non-finite error estimate".to_string(),
                });
            }

            if err <= 1.0 {
                t = if last { t1 } else { t + h };
                y.copy_from_slice(&y_new);
                k.swap(0, 6);
            }

            let factor = if err == 0.0 {
                10.0
            } else {
                (0.9 * err.powf(-0.2)).clamp(0.2, 10.0)
            };
            h = (h * factor).min(self.max_step);

            if t < t1 && h <= 1e-12 * t.abs().max(1.0) {
                return Err(SimError::IntegrationFailure {
                    t,
                    reason: format!("step size {h:e} too small"),
                });
            }
        }

        if t >= t1 {
            return Ok(());
        }
        Err(SimError::IntegrationFailure {
            t,
            reason: format!("exceeded {} steps", self.max_steps),
        })
    }

    fn error_norm(&self, y: &[f64], y_new: &[f64], h: f64, k: &[Vec<f64>; 7]) -> f64 {
        let n = y.len();
        if n == 0 {
            return 0.0;
        }
        let mut sum = 0.0;
        for i in 0..n {
            let e: f64 = h * E.iter().zip(k.iter()).map(|(e, k)| e * k[i]).sum::<f64>();
            let scale = self.atol + self.rtol * y[i].abs().max(y_new[i].abs());
            sum += (e / scale).powi(2);
        }
        (sum / n as f64).sqrt()
    }
}

fn combine(y: &[f64], h: f64, a: &[f64], k: &[Vec<f64>; 7], out: &mut [f64]) {
    for i in 0..y.len() {
        let incr: f64 = a.iter().zip(k.iter()).map(|(a, k)| a * k[i]).sum();
        out[i] = y[i] + h * incr;
    }
}

fn check_finite(t: f64, dydt: &[f64]) -> SimResult<()> {
    if dydt.iter().all(|v| v.is_finite()) {
        Ok(())
    } else {
        Err(SimError::IntegrationFailure {
            t,
            reason: "non-finite derivative".to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exponential_decay() {
        let solver = Dopri5::default();
        let mut y = [1.0, 2.0];
        let mut f = |_t: f64, y: &[f64], dydt: &mut [f64]| {
            dydt[0] = -0.5 * y[0];
            dydt[1] = 0.1 * y[1];
        };
        solver.integrate(&mut f, 0.0, 20.0, &mut y).unwrap();
        assert!((y[0] - (-10.0f64).exp()).abs() < 1e-8);
        assert!((y[1] - 2.0 * 2.0f64.exp()).abs() < 1e-4);
    }

    #[test]
    fn harmonic_oscillator_over_long_interval() {
        let solver = Dopri5::default();
        let mut y = [1.0, 0.0];
        let mut f = |_t: f64, y: &[f64], dydt: &mut [f64]| {
            dydt[0] = y[1];
            dydt[1] = -y[0];
        };
        let t1 = 10.0 * std::f64::consts::PI;
        solver.integrate(&mut f, 0.0, t1, &mut y).unwrap();
        assert!((y[0] - 1.0).abs() < 1e-4);
        assert!(y[1].abs() < 1e-4);
    }

    #[test]
    fn blow_up_is_reported() {
        let solver = Dopri5::default();
        let mut y = [1.0];
        // Solution 1 / (1 - t) diverges at t = 1.
        let mut f = |_t: f64, y: &[f64], dydt: &mut [f64]| {
            dydt[0] = y[0] * y[0];
        };
        let result = solver.integrate(&mut f, 0.0, 2.0, &mut y);
        assert!(matches!(result, Err(SimError::IntegrationFailure { .. })));
    }

    #[test]
    fn empty_interval_leaves_state_untouched() {
        let solver = Dopri5::default();
        let mut y = [3.0];
        let mut f = |_t: f64, _y: &[f64], dydt: &mut [f64]| dydt[0] = 1.0;
        solver.integrate(&mut f, 5.0, 5.0, &mut y).unwrap();
        assert_eq!(y, [3.0]);
    }
}

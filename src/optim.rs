//! Derivative-free bounded minimization of a scalar function.

/// Outcome of [`minimize_bounded`].
#[derive(Debug, Clone, Copy)]
pub struct Minimum {
    pub x: f64,
    pub fun: f64,
    pub n_evals: usize,
    pub converged: bool,
}

/// Brent's method (golden section with parabolic interpolation) on `[lo, hi]`.
///
/// Stops once the bracket around the minimizer is narrower than about `xatol`,
/// or after `max_evals` function evaluations with `converged == false`.
pub fn minimize_bounded<F>(mut f: F, lo: f64, hi: f64, xatol: f64, max_evals: usize) -> Minimum
where
    F: FnMut(f64) -> f64,
{
    let sqrt_eps = f64::EPSILON.sqrt();
    let golden_mean = 0.5 * (3.0 - 5.0f64.sqrt());

    let (mut a, mut b) = (lo, hi);
    let mut fulc = a + golden_mean * (b - a);
    let mut nfc = fulc;
    let mut xf = fulc;
    let mut rat: f64 = 0.0;
    let mut e: f64 = 0.0;

    let mut fx = f(xf);
    let mut n_evals = 1;
    let mut ffulc = fx;
    let mut fnfc = fx;

    let mut xm = 0.5 * (a + b);
    let mut tol1 = sqrt_eps * xf.abs() + xatol / 3.0;
    let mut tol2 = 2.0 * tol1;

    let sign = |v: f64| if v < 0.0 { -1.0 } else { 1.0 };

    while (xf - xm).abs() > tol2 - 0.5 * (b - a) {
        let mut golden = true;

        if e.abs() > tol1 {
            // Try a parabolic step through the three best points.
            let mut r = (xf - nfc) * (fx - ffulc);
            let mut q = (xf - fulc) * (fx - fnfc);
            let mut p = (xf - fulc) * q - (xf - nfc) * r;
            q = 2.0 * (q - r);
            if q > 0.0 {
                p = -p;
            }
            q = q.abs();
            r = e;
            e = rat;

            if p.abs() < (0.5 * q * r).abs() && p > q * (a - xf) && p < q * (b - xf) {
                golden = false;
                rat = p / q;
                let x = xf + rat;
                if (x - a) < tol2 || (b - x) < tol2 {
                    rat = tol1 * sign(xm - xf);
                }
            }
        }

        if golden {
            e = if xf >= xm { a - xf } else { b - xf };
            rat = golden_mean * e;
        }

        let x = xf + sign(rat) * rat.abs().max(tol1);
        let fu = f(x);
        n_evals += 1;

        if fu <= fx {
            if x >= xf {
                a = xf;
            } else {
                b = xf;
            }
            fulc = nfc;
            ffulc = fnfc;
            nfc = xf;
            fnfc = fx;
            xf = x;
            fx = fu;
        } else {
            if x < xf {
                a = x;
            } else {
                b = x;
            }
            if fu <= fnfc || nfc == xf {
                fulc = nfc;
                ffulc = fnfc;
                nfc = x;
                fnfc = fu;
            } else if fu <= ffulc || fulc == xf || fulc == nfc {
                fulc = x;
                ffulc = fu;
            }
        }

        xm = 0.5 * (a + b);
        tol1 = sqrt_eps * xf.abs() + xatol / 3.0;
        tol2 = 2.0 * tol1;

        if n_evals >= max_evals {
            return Minimum {
                x: xf,
                fun: fx,
                n_evals,
                converged: false,
            };
        }
    }

    Minimum {
        x: xf,
        fun: fx,
        n_evals,
        converged: fx.is_finite(),
    }
}

//! Gauss-Legendre quadrature nodes and weights.

const EPS: f64 = 2.220_446_049_250_313_1e-16;

/// Fill `nodes` and `weights` with the degree-`n` Gauss-Legendre abscissas
/// (roots of the Legendre polynomial, ascending in (-1, 1)) and their
/// quadrature weights, where `n = nodes.len() = weights.len()`.
///
/// Each root is refined by Newton's iteration from the asymptotic starting
/// guess `cos(π (i + 0.75) / (n + 0.5))`; the polynomial and its derivative
/// come from the three-term recurrence.  Roots are symmetric about zero, so
/// only half are computed.
pub fn gauss_legendre(nodes: &mut [f64], weights: &mut [f64]) {
    let n = nodes.len();
    assert_eq!(n, weights.len());
    let half = (n + 1) / 2;

    for i in 0..half {
        let mut x = (std::f64::consts::PI * (i as f64 + 0.75) / (n as f64 + 0.5)).cos();
        let mut dpdx;

        loop {
            // p1 = P_{n-1}(x), p2 = P_n(x)
            let mut p0;
            let mut p1 = 1.0;
            let mut p2 = x;
            for k in 2..=n {
                p0 = p1;
                p1 = p2;
                p2 = 2.0 * x * p1 - p0 - (x * p1 - p0) / k as f64;
            }
            dpdx = n as f64 * (p1 - x * p2) / (1.0 - x * x);

            let dx = -p2 / dpdx;
            x += dx;
            if dx.abs() <= 4.0 * EPS {
                break;
            }
        }

        let j = n - 1 - i;
        nodes[i] = -x;
        nodes[j] = x;
        let w = 2.0 / ((1.0 - x * x) * dpdx * dpdx);
        weights[i] = w;
        weights[j] = w;
    }
}

// ─── Tests ────────────────────────────────────────────────────────────────────

//! Descriptive statistics for metric series.
//!
//! Quantiles use the rank-based exclusive method: the k-th quartile sits at
//! position k(n+1)/4 in the sorted sample, linearly interpolated. Spearman
//! correlation ranks both series (average ranks on ties) and derives its
//! two-sided p-value from the t-approximation with n-2 degrees of freedom.

/// Arithmetic mean. `None` for an empty slice.
pub fn mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    Some(values.iter().sum::<f64>() / values.len() as f64)
}

/// Sample standard deviation (n-1 denominator). Requires at least 2 values.
pub fn std_dev(values: &[f64]) -> Option<f64> {
    if values.len() < 2 {
        return None;
    }
    let m = mean(values)?;
    let variance =
        values.iter().map(|v| (v - m).powi(2)).sum::<f64>() / (values.len() - 1) as f64;
    Some(variance.sqrt())
}

/// Quartiles (Q1, median, Q3) of an unsorted sample. Requires at least 2 values.
pub fn quartiles(values: &[f64]) -> Option<(f64, f64, f64)> {
    if values.len() < 2 {
        return None;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    Some((
        quantile_sorted(&sorted, 0.25),
        quantile_sorted(&sorted, 0.5),
        quantile_sorted(&sorted, 0.75),
    ))
}

/// Exclusive-method quantile of a sorted sample.
fn quantile_sorted(sorted: &[f64], p: f64) -> f64 {
    let n = sorted.len();
    let h = (n + 1) as f64 * p;
    if h <= 1.0 {
        return sorted[0];
    }
    if h >= n as f64 {
        return sorted[n - 1];
    }
    let lower = h.floor() as usize;
    let frac = h - lower as f64;
    sorted[lower - 1] + frac * (sorted[lower] - sorted[lower - 1])
}

/// Spearman rank correlation with a two-sided p-value.
///
/// Returns `None` when the series differ in length, have fewer than 3
/// points, or either side has no variance (correlation undefined).
pub fn spearman(x: &[f64], y: &[f64]) -> Option<(f64, f64)> {
    if x.len() != y.len() || x.len() < 3 {
        return None;
    }
    let n = x.len();

    let rx = ranks(x);
    let ry = ranks(y);

    let rho = pearson(&rx, &ry)?;
    if !rho.is_finite() {
        return None;
    }

    let df = (n - 2) as f64;
    let p_value = if rho.abs() >= 1.0 {
        0.0
    } else {
        let t = rho * (df / (1.0 - rho * rho)).sqrt();
        t_two_sided_p(t.abs(), df)
    };

    Some((rho, p_value))
}

/// Average ranks, 1-based, ties share the mean of their positions.
fn ranks(values: &[f64]) -> Vec<f64> {
    let n = values.len();
    let mut order: Vec<usize> = (0..n).collect();
    order.sort_by(|&a, &b| {
        values[a]
            .partial_cmp(&values[b])
            .unwrap_or(std::cmp::Ordering::Equal)
    });

    let mut result = vec![0.0; n];
    let mut i = 0;
    while i < n {
        let mut j = i;
        while j + 1 < n && values[order[j + 1]] == values[order[i]] {
            j += 1;
        }
        let rank = (i + j) as f64 / 2.0 + 1.0;
        for &index in &order[i..=j] {
            result[index] = rank;
        }
        i = j + 1;
    }
    result
}

fn pearson(x: &[f64], y: &[f64]) -> Option<f64> {
    let mx = mean(x)?;
    let my = mean(y)?;

    let mut cov = 0.0;
    let mut var_x = 0.0;
    let mut var_y = 0.0;
    for (xi, yi) in x.iter().zip(y.iter()) {
        cov += (xi - mx) * (yi - my);
        var_x += (xi - mx).powi(2);
        var_y += (yi - my).powi(2);
    }

    if var_x == 0.0 || var_y == 0.0 {
        return None;
    }
    Some(cov / (var_x.sqrt() * var_y.sqrt()))
}

/// Two-sided p-value for |t| with `df` degrees of freedom:
/// p = I_{df/(df+t^2)}(df/2, 1/2).
fn t_two_sided_p(t_abs: f64, df: f64) -> f64 {
    let x = df / (df + t_abs * t_abs);
    incomplete_beta(df / 2.0, 0.5, x).clamp(0.0, 1.0)
}

/// Regularized incomplete beta function I_x(a, b), by continued fraction.
fn incomplete_beta(a: f64, b: f64, x: f64) -> f64 {
    if x <= 0.0 {
        return 0.0;
    }
    if x >= 1.0 {
        return 1.0;
    }
    let ln_front =
        ln_gamma(a + b) - ln_gamma(a) - ln_gamma(b) + a * x.ln() + b * (1.0 - x).ln();
    let front = ln_front.exp();
    if x < (a + 1.0) / (a + b + 2.0) {
        front * beta_cf(a, b, x) / a
    } else {
        1.0 - front * beta_cf(b, a, 1.0 - x) / b
    }
}

/// Lentz's continued fraction for the incomplete beta function.
fn beta_cf(a: f64, b: f64, x: f64) -> f64 {
    const MAX_ITER: usize = 200;
    const EPS: f64 = 3.0e-12;
    const TINY: f64 = 1.0e-30;

    let qab = a + b;
    let qap = a + 1.0;
    let qam = a - 1.0;

    let mut c = 1.0;
    let mut d = 1.0 - qab * x / qap;
    if d.abs() < TINY {
        d = TINY;
    }
    d = 1.0 / d;
    let mut h = d;

    for m in 1..=MAX_ITER {
        let m = m as f64;
        let m2 = 2.0 * m;

        let aa = m * (b - m) * x / ((qam + m2) * (a + m2));
        d = 1.0 + aa * d;
        if d.abs() < TINY {
            d = TINY;
        }
        c = 1.0 + aa / c;
        if c.abs() < TINY {
            c = TINY;
        }
        d = 1.0 / d;
        h *= d * c;

        let aa = -(a + m) * (qab + m) * x / ((a + m2) * (qap + m2));
        d = 1.0 + aa * d;
        if d.abs() < TINY {
            d = TINY;
        }
        c = 1.0 + aa / c;
        if c.abs() < TINY {
            c = TINY;
        }
        d = 1.0 / d;
        let delta = d * c;
        h *= delta;

        if (delta - 1.0).abs() < EPS {
            break;
        }
    }
    h
}

/// Lanczos approximation of ln(Gamma(x)).
fn ln_gamma(x: f64) -> f64 {
    const COEFFS: [f64; 6] = [
        76.180_091_729_471_46,
        -86.505_320_329_416_77,
        24.014_098_240_830_91,
        -1.231_739_572_450_155,
        0.120_865_097_386_617_7e-2,
        -0.539_523_938_495_3e-5,
    ];
    let mut y = x;
    let tmp = x + 5.5;
    let tmp = tmp - (x + 0.5) * tmp.ln();
    let mut ser = 1.000_000_000_190_015;
    for coeff in COEFFS {
        y += 1.0;
        ser += coeff / y;
    }
    -tmp + (2.506_628_274_631_000_5 * ser / x).ln()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mean_and_std_dev() {
        assert_eq!(mean(&[]), None);
        assert_eq!(mean(&[2.0, 4.0, 6.0]), Some(4.0));
        assert_eq!(std_dev(&[1.0]), None);
        let sd = std_dev(&[2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0]).unwrap();
        assert!((sd - 2.138).abs() < 0.01);
    }

    #[test]
    fn test_quartiles_interpolation() {
        // Matches the exclusive quantile method: [1.25, 2.5, 3.75]
        let (q1, median, q3) = quartiles(&[1.0, 2.0, 3.0, 4.0]).unwrap();
        assert!((q1 - 1.25).abs() < 1e-9);
        assert!((median - 2.5).abs() < 1e-9);
        assert!((q3 - 3.75).abs() < 1e-9);
    }

    #[test]
    fn test_quartiles_known_series() {
        let series = [
            10.0, 12.0, 11.0, 13.0, 12.0, 50.0, 11.0, 12.0, 13.0, 10.0, 11.0, 12.0, 13.0, 10.0,
            11.0, 12.0, 13.0, 11.0, 12.0, 10.0, 11.0,
        ];
        let (q1, median, q3) = quartiles(&series).unwrap();
        assert!((q1 - 11.0).abs() < 1e-9);
        assert!((median - 12.0).abs() < 1e-9);
        assert!((q3 - 12.5).abs() < 1e-9);
    }

    #[test]
    fn test_spearman_perfect_monotone() {
        let x: Vec<f64> = (0..21).map(|i| i as f64).collect();
        let y: Vec<f64> = x.iter().map(|v| v * v + 3.0).collect();
        let (rho, p) = spearman(&x, &y).unwrap();
        assert!((rho - 1.0).abs() < 1e-9);
        assert!(p < 0.01);

        let y_inv: Vec<f64> = x.iter().map(|v| -v).collect();
        let (rho, p) = spearman(&x, &y_inv).unwrap();
        assert!((rho + 1.0).abs() < 1e-9);
        assert!(p < 0.01);
    }

    #[test]
    fn test_spearman_constant_series_undefined() {
        let x: Vec<f64> = (0..21).map(|i| i as f64).collect();
        let y = vec![5.0; 21];
        assert!(spearman(&x, &y).is_none());
    }

    #[test]
    fn test_spearman_handles_ties() {
        let x = [1.0, 2.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0, 8.0, 9.0];
        let y = [1.0, 2.0, 3.0, 3.0, 5.0, 6.0, 7.0, 8.0, 9.0, 10.0];
        let (rho, p) = spearman(&x, &y).unwrap();
        assert!(rho > 0.95);
        assert!(p < 0.01);
    }

    #[test]
    fn test_spearman_random_series_rarely_significant() {
        use rand::rngs::StdRng;
        use rand::{Rng, SeedableRng};

        let mut rng = StdRng::seed_from_u64(42);
        let trials = 200;
        let mut significant = 0;
        for _ in 0..trials {
            let x: Vec<f64> = (0..21).map(|_| rng.gen_range(0.0..100.0)).collect();
            let y: Vec<f64> = (0..21).map(|_| rng.gen_range(0.0..100.0)).collect();
            let (_, p) = spearman(&x, &y).unwrap();
            if p < 0.05 {
                significant += 1;
            }
        }
        // Expected false-positive rate is ~5%; allow generous slack.
        assert!(
            significant < trials / 5,
            "{} of {} random trials were significant",
            significant,
            trials
        );
    }

    #[test]
    fn test_t_distribution_critical_value() {
        // Two-sided critical value for df=20 at alpha=0.05 is t=2.086
        let p = t_two_sided_p(2.086, 20.0);
        assert!((p - 0.05).abs() < 0.005, "p was {}", p);

        let p = t_two_sided_p(0.0, 20.0);
        assert!((p - 1.0).abs() < 1e-6);
    }
}

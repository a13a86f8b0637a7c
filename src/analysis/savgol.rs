use crate::error::StoreError;

/// Savitzky-Golay smoothing.
///
/// Each interior point is replaced by the value at the centre of a
/// least-squares polynomial of degree `polyorder` fitted over `window`
/// samples. The first and last `window / 2` points are taken from the
/// polynomial fitted to the first and last full window respectively.
pub fn savgol_filter(
    series: &[f64],
    window: usize,
    polyorder: usize,
) -> Result<Vec<f64>, StoreError> {
    if window % 2 == 0 {
        return Err(StoreError::validation("window must be an odd number"));
    }
    if polyorder >= window {
        return Err(StoreError::validation("polyorder must be less than window"));
    }
    if window > series.len() {
        return Err(StoreError::validation(format!(
            "window ({window}) is longer than the series ({})",
            series.len()
        )));
    }

    let half = window / 2;
    let projection = projection_matrix(window, polyorder)?;
    let n = series.len();
    let mut out = vec![0.0; n];

    let centre = &projection[0];
    for i in half..n - half {
        out[i] = dot(centre, &series[i - half..=i + half]);
    }

    let left = fit(&projection, &series[..window]);
    for (i, slot) in out.iter_mut().enumerate().take(half) {
        *slot = eval(&left, i as f64 - half as f64);
    }

    let right = fit(&projection, &series[n - window..]);
    for i in n - half..n {
        let t = (i - (n - window)) as f64 - half as f64;
        out[i] = eval(&right, t);
    }

    Ok(out)
}

/// Rows of `(AᵀA)⁻¹Aᵀ` for the Vandermonde matrix `A` over offsets `-half..=half`.
fn projection_matrix(window: usize, polyorder: usize) -> Result<Vec<Vec<f64>>, StoreError> {
    let half = window as f64 / 2.0 - 0.5;
    let cols = polyorder + 1;
    let vander: Vec<Vec<f64>> = (0..window)
        .map(|i| {
            let x = i as f64 - half;
            (0..cols).map(|j| x.powi(j as i32)).collect()
        })
        .collect();

    // Augmented system [AᵀA | Aᵀ], reduced in place.
    let mut aug = vec![vec![0.0; cols + window]; cols];
    for r in 0..cols {
        for c in 0..cols {
            aug[r][c] = (0..window).map(|k| vander[k][r] * vander[k][c]).sum();
        }
        for k in 0..window {
            aug[r][cols + k] = vander[k][r];
        }
    }

    for pivot in 0..cols {
        let best = (pivot..cols)
            .max_by(|&a, &b| aug[a][pivot].abs().total_cmp(&aug[b][pivot].abs()))
            .unwrap_or(pivot);
        if aug[best][pivot].abs() < f64::EPSILON {
            return Err(StoreError::validation("smoothing system is singular"));
        }
        aug.swap(pivot, best);

        let scale = aug[pivot][pivot];
        for v in aug[pivot].iter_mut() {
            *v /= scale;
        }
        for r in 0..cols {
            if r == pivot {
                continue;
            }
            let factor = aug[r][pivot];
            if factor == 0.0 {
                continue;
            }
            for c in 0..cols + window {
                aug[r][c] -= factor * aug[pivot][c];
            }
        }
    }

    Ok(aug.into_iter().map(|row| row[cols..].to_vec()).collect())
}

fn fit(projection: &[Vec<f64>], segment: &[f64]) -> Vec<f64> {
    projection.iter().map(|row| dot(row, segment)).collect()
}

fn eval(coeffs: &[f64], t: f64) -> f64 {
    coeffs.iter().rev().fold(0.0, |acc, c| acc * t + c)
}

fn dot(a: &[f64], b: &[f64]) -> f64 {
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}

// src/tracking/assignment.rs
//
// Minimum-cost rectangular assignment (Hungarian method, shortest augmenting
// path with row/column potentials). O(n²·m) for n ≤ m after transposing.
//
// Every row is assigned when rows ≤ cols and every column when cols < rows.
// Thresholding of the proposed pairs is the caller's job.

use nalgebra::DMatrix;

/// Stand-in for NaN/±Inf entries so every augmenting step makes progress.
const UNREACHABLE_COST: f64 = 1e9;

fn finite_cost(c: f32) -> f64 {
    if c.is_finite() {
        c as f64
    } else {
        UNREACHABLE_COST
    }
}

/// Solve the assignment problem for `cost` (rows × cols).
///
/// Returns `(row, col)` pairs sorted by row. Non-finite costs are treated as
/// `UNREACHABLE_COST`.
pub fn solve(cost: &DMatrix<f32>) -> Vec<(usize, usize)> {
    let (rows, cols) = cost.shape();
    if rows == 0 || cols == 0 {
        return Vec::new();
    }

    let mut pairs = if rows <= cols {
        solve_wide(rows, cols, |i, j| finite_cost(cost[(i, j)]))
    } else {
        solve_wide(cols, rows, |i, j| finite_cost(cost[(j, i)]))
            .into_iter()
            .map(|(c, r)| (r, c))
            .collect()
    };
    pairs.sort_unstable();
    pairs
}

/// Core solver for n ≤ m. Uses 1-based indices internally with column 0 as
/// the virtual source of each augmenting path.
fn solve_wide(n: usize, m: usize, a: impl Fn(usize, usize) -> f64) -> Vec<(usize, usize)> {
    let mut u = vec![0.0f64; n + 1];
    let mut v = vec![0.0f64; m + 1];
    // p[j]: row assigned to column j (0 = free)
    let mut p = vec![0usize; m + 1];
    let mut way = vec![0usize; m + 1];

    for i in 1..=n {
        p[0] = i;
        let mut j0 = 0usize;
        let mut minv = vec![f64::INFINITY; m + 1];
        let mut used = vec![false; m + 1];
        let mut stalled = false;

        loop {
            used[j0] = true;
            let i0 = p[j0];
            let mut delta = f64::INFINITY;
            let mut j1 = 0usize;

            for j in 1..=m {
                if used[j] {
                    continue;
                }
                let cur = a(i0 - 1, j - 1) - u[i0] - v[j];
                if cur < minv[j] {
                    minv[j] = cur;
                    way[j] = j0;
                }
                if minv[j] < delta {
                    delta = minv[j];
                    j1 = j;
                }
            }

            if j1 == 0 || !delta.is_finite() {
                stalled = true;
                break;
            }

            for j in 0..=m {
                if used[j] {
                    u[p[j]] += delta;
                    v[j] -= delta;
                } else {
                    minv[j] -= delta;
                }
            }

            j0 = j1;
            if p[j0] == 0 {
                break;
            }
        }

        if stalled {
            // Row i stays unassigned
            continue;
        }

        // Flip the augmenting path back to the source
        loop {
            let j1 = way[j0];
            p[j0] = p[j1];
            j0 = j1;
            if j0 == 0 {
                break;
            }
        }
    }

    (1..=m)
        .filter(|&j| p[j] != 0)
        .map(|j| (p[j] - 1, j - 1))
        .collect()
}

//! Dense and sparse floating-point kernels used as CPU load.

use std::fmt;
use std::hint::black_box;
use std::str::FromStr;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

/// Seed shared by every worker so each core runs identical inputs.
pub const RANDOM_SEED: u64 = 101_010;
/// Grid edge of the relaxation kernel.
pub const SOR_SIZE: usize = 100;
/// Matrix edge of the factorization kernel.
pub const LU_SIZE: usize = 100;
/// Rows of the sparse matrix.
pub const SPARSE_SIZE_M: usize = 1_000;
/// Requested nonzeros of the sparse matrix.
pub const SPARSE_SIZE_NZ: usize = 5_000;
/// Relaxation factor.
pub const SOR_OMEGA: f64 = 1.25;

/// Which kernel a worker runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KernelKind {
    /// Successive over-relaxation on a dense grid.
    #[default]
    Sor,
    /// LU factorization with partial pivoting.
    Lu,
    /// Sparse matrix-vector multiply in compressed-row form.
    Smult,
}

impl FromStr for KernelKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "sor" => Ok(Self::Sor),
            "lu" => Ok(Self::Lu),
            "smult" => Ok(Self::Smult),
            other => Err(format!("unknown kernel {other:?} (expected sor, lu or smult)")),
        }
    }
}

impl fmt::Display for KernelKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Sor => "sor",
            Self::Lu => "lu",
            Self::Smult => "smult",
        })
    }
}

/// Sparse matrix in compressed-row storage.
#[derive(Debug, Clone)]
pub struct SparseMatrix {
    pub val: Vec<f64>,
    pub row: Vec<usize>,
    pub col: Vec<usize>,
}

/// Prepared inputs for one kernel.
#[derive(Debug, Clone)]
pub enum Workload {
    Sor {
        grid: Vec<Vec<f64>>,
    },
    Lu {
        a: Vec<Vec<f64>>,
        lu: Vec<Vec<f64>>,
        pivot: Vec<usize>,
    },
    Smult {
        matrix: SparseMatrix,
        x: Vec<f64>,
        y: Vec<f64>,
    },
}

impl Workload {
    /// Builds the inputs for `kind` from the shared seed.
    pub fn prepare(kind: KernelKind) -> Self {
        let mut rng = StdRng::seed_from_u64(RANDOM_SEED);
        match kind {
            KernelKind::Sor => Self::Sor {
                grid: random_matrix(SOR_SIZE, SOR_SIZE, &mut rng),
            },
            KernelKind::Lu => Self::Lu {
                a: random_matrix(LU_SIZE, LU_SIZE, &mut rng),
                lu: vec![vec![0.0; LU_SIZE]; LU_SIZE],
                pivot: vec![0; LU_SIZE],
            },
            KernelKind::Smult => Self::Smult {
                x: random_vector(SPARSE_SIZE_M, &mut rng),
                y: vec![0.0; SPARSE_SIZE_M],
                matrix: sparse_matrix(SPARSE_SIZE_M, SPARSE_SIZE_NZ, &mut rng),
            },
        }
    }

    /// Runs one batch. `cycles` is ignored by the factorization, which does one copy and factor.
    pub fn run_batch(&mut self, cycles: usize) {
        match self {
            Self::Sor { grid } => sor_execute(SOR_OMEGA, grid, cycles),
            Self::Lu { a, lu, pivot } => {
                copy_matrix(lu, a);
                // singular inputs just leave a partial factor, which is fine for load generation
                let _ = lu_factor(lu, pivot);
            }
            Self::Smult { matrix, x, y } => sparse_matmult(y, matrix, x, cycles),
        }
        black_box(&*self);
    }
}

fn random_matrix(m: usize, n: usize, rng: &mut StdRng) -> Vec<Vec<f64>> {
    (0..m).map(|_| random_vector(n, rng)).collect()
}

fn random_vector(n: usize, rng: &mut StdRng) -> Vec<f64> {
    (0..n).map(|_| rng.gen::<f64>()).collect()
}

/// Builds an `m`-row matrix with `nz / m` nonzeros per row, spread across the columns.
pub fn sparse_matrix(m: usize, nz: usize, rng: &mut StdRng) -> SparseMatrix {
    let nr = (nz / m).max(1);
    let anz = nr * m;
    let val = random_vector(anz, rng);
    let mut col = vec![0; anz];
    let mut row = vec![0; m + 1];
    for r in 0..m {
        let rowr = row[r];
        row[r + 1] = rowr + nr;
        let step = (r / nr).max(1);
        for i in 0..nr {
            col[rowr + i] = i * step;
        }
    }
    SparseMatrix { val, row, col }
}

/// In-place Gauss-Seidel relaxation sweep, repeated `cycles` times.
pub fn sor_execute(omega: f64, g: &mut [Vec<f64>], cycles: usize) {
    let m = g.len();
    if m < 3 {
        return;
    }
    let n = g[0].len();
    let omega_over_four = omega * 0.25;
    let one_minus_omega = 1.0 - omega;

    for _ in 0..cycles {
        for i in 1..m - 1 {
            for j in 1..n - 1 {
                let v = omega_over_four * (g[i - 1][j] + g[i + 1][j] + g[i][j - 1] + g[i][j + 1])
                    + one_minus_omega * g[i][j];
                g[i][j] = v;
            }
        }
    }
}

/// `y = A * x`, repeated `cycles` times.
pub fn sparse_matmult(y: &mut [f64], a: &SparseMatrix, x: &[f64], cycles: usize) {
    let m = a.row.len().saturating_sub(1);
    for _ in 0..cycles {
        for r in 0..m {
            let mut sum = 0.0;
            for i in a.row[r]..a.row[r + 1] {
                sum += x[a.col[i]] * a.val[i];
            }
            y[r] = sum;
        }
    }
}

fn copy_matrix(dst: &mut [Vec<f64>], src: &[Vec<f64>]) {
    for (d, s) in dst.iter_mut().zip(src) {
        d.copy_from_slice(s);
    }
}

/// In-place LU factorization with partial pivoting.
///
/// Returns `false` if a zero pivot was hit.
pub fn lu_factor(a: &mut [Vec<f64>], pivot: &mut [usize]) -> bool {
    let n = a.len();
    let m = a.first().map_or(0, Vec::len);
    let min_mn = n.min(m);

    for j in 0..min_mn {
        // largest absolute value in column j at or below the diagonal
        let mut jp = j;
        let mut t = a[j][j].abs();
        for (i, row) in a.iter().enumerate().skip(j + 1) {
            let ab = row[j].abs();
            if ab > t {
                jp = i;
                t = ab;
            }
        }
        pivot[j] = jp;

        if a[jp][j] == 0.0 {
            return false;
        }
        if jp != j {
            a.swap(j, jp);
        }

        if j < n - 1 {
            let recp = 1.0 / a[j][j];
            for row in a.iter_mut().skip(j + 1) {
                row[j] *= recp;
            }
        }

        if j < min_mn - 1 {
            let (top, bottom) = a.split_at_mut(j + 1);
            let pivot_row = &top[j];
            for row in bottom.iter_mut() {
                let aij = row[j];
                for k in j + 1..m {
                    row[k] -= aij * pivot_row[k];
                }
            }
        }
    }
    true
}

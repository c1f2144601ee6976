//! CPU compute backend using Rayon for shared-memory parallelism.

use ndarray::{Array1, Array2};
use num_complex::Complex64;
use rayon::prelude::*;
use rayon::{ThreadPool, ThreadPoolBuilder};

use crate::backend::{check_operand, BackendType, ComputeBackend, ComputeError, DeviceInfo, PairFn};

/// CPU backend that parallelises work across threads via Rayon.
///
/// By default work runs on Rayon's global pool. [`CpuBackend::with_threads`]
/// creates a dedicated pool so a simulation can be pinned to a fixed number
/// of threads.
pub struct CpuBackend {
    num_threads: usize,
    pool: Option<ThreadPool>,
}

impl CpuBackend {
    /// Create a new CPU backend using all available threads.
    pub fn new() -> Self {
        Self {
            num_threads: rayon::current_num_threads(),
            pool: None,
        }
    }

    /// Create a CPU backend running on a dedicated pool of `num_threads` threads.
    pub fn with_threads(num_threads: usize) -> Result<Self, ComputeError> {
        let pool = ThreadPoolBuilder::new()
            .num_threads(num_threads)
            .thread_name(|i| format!("diffra-cpu-{}", i))
            .build()
            .map_err(|e| ComputeError::Unavailable(format!("Thread pool: {}", e)))?;
        log::debug!("CPU backend on a dedicated pool of {} threads", pool.current_num_threads());
        Ok(Self {
            num_threads: pool.current_num_threads(),
            pool: Some(pool),
        })
    }

    fn run<R: Send>(&self, op: impl FnOnce() -> R + Send) -> R {
        match &self.pool {
            Some(pool) => pool.install(op),
            None => op(),
        }
    }
}

impl Default for CpuBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl ComputeBackend for CpuBackend {
    fn device_info(&self) -> DeviceInfo {
        DeviceInfo {
            name: format!("CPU ({} threads)", self.num_threads),
            backend_type: BackendType::Cpu,
            memory_bytes: None,
            compute_units: Some(self.num_threads),
        }
    }

    fn parallel_matrix_fill(
        &self,
        rows: usize,
        cols: usize,
        fill_fn: PairFn<'_>,
    ) -> Result<Array2<Complex64>, ComputeError> {
        let data: Vec<Complex64> = self.run(|| {
            (0..rows * cols)
                .into_par_iter()
                .map(|idx| fill_fn(idx / cols, idx % cols))
                .collect()
        });

        Array2::from_shape_vec((rows, cols), data)
            .map_err(|e| ComputeError::DeviceError(e.to_string()))
    }

    fn parallel_row_sum(
        &self,
        rows: usize,
        cols: usize,
        term_fn: PairFn<'_>,
    ) -> Result<Array1<Complex64>, ComputeError> {
        let data: Vec<Complex64> = self.run(|| {
            (0..rows)
                .into_par_iter()
                .map(|i| (0..cols).map(|j| term_fn(i, j)).sum::<Complex64>())
                .collect()
        });
        Ok(Array1::from_vec(data))
    }

    fn matvec(
        &self,
        matrix: &Array2<Complex64>,
        vector: &Array1<Complex64>,
    ) -> Result<Array1<Complex64>, ComputeError> {
        check_operand(matrix, vector.len())?;

        let data: Vec<Complex64> = self.run(|| {
            (0..matrix.nrows())
                .into_par_iter()
                .map(|i| matrix.row(i).dot(vector))
                .collect()
        });
        Ok(Array1::from_vec(data))
    }

    fn matmul(
        &self,
        matrix: &Array2<Complex64>,
        columns: &Array2<Complex64>,
    ) -> Result<Array2<Complex64>, ComputeError> {
        check_operand(matrix, columns.nrows())?;
        Ok(self.run(|| matrix.dot(columns)))
    }
}

//! # Compute backends
//!
//! Every solver kernel is a per-pixel function `(x, y) -> value` launched over a whole field. A
//! backend decides how the pixels of one launch are scheduled. A launch only returns once every
//! pixel has been written, so two consecutive launches are always separated by a full barrier and
//! stencil kernels can safely read the neighbours written by the previous step.

// -----------------------------------------------------------------------------------------------
// IMPORTS
// -----------------------------------------------------------------------------------------------

use std::fmt;

use log::debug;
use rayon::prelude::*;

use crate::error::*;
use crate::field::{Field, Pixel};

// -----------------------------------------------------------------------------------------------
// ENUMERATIONS
// -----------------------------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BackendType {
    Serial,
    Cpu,
}

// -----------------------------------------------------------------------------------------------
// DATA STRUCTURES
// -----------------------------------------------------------------------------------------------

/// Launch layout shared by all kernels of a backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LaunchConfig {
    /// Width of a launch block in pixels.
    pub block_width: usize,

    /// Height of a launch block in rows. The CPU backend schedules this many rows per task.
    pub block_height: usize,

    /// Row strides of every field are padded to a multiple of this many elements.
    pub stride_alignment: usize,
}

/// Runs every launch on the calling thread.
#[derive(Debug, Clone, Default)]
pub struct SerialBackend {
    config: LaunchConfig,
}

/// Runs launches on a dedicated rayon thread pool, one task per block of rows.
pub struct CpuBackend {
    config: LaunchConfig,
    pool: rayon::ThreadPool,
}

// -----------------------------------------------------------------------------------------------
// TRAITS
// -----------------------------------------------------------------------------------------------

pub trait ComputeBackend: Send + Sync {
    fn backend_type(&self) -> BackendType;

    fn name(&self) -> &str;

    fn launch_config(&self) -> LaunchConfig;

    /// Write `kernel(x, y)` into every valid pixel of `out`.
    fn launch<T, K>(&self, out: &mut Field<T>, kernel: K) -> Result<()>
    where
        T: Pixel,
        K: Fn(usize, usize) -> T + Send + Sync;

    /// Write both halves of `kernel(x, y)` into every valid pixel of two same-shaped fields.
    fn launch_pair<A, B, K>(&self, first: &mut Field<A>, second: &mut Field<B>, kernel: K) -> Result<()>
    where
        A: Pixel,
        B: Pixel,
        K: Fn(usize, usize) -> (A, B) + Send + Sync;
}

// -----------------------------------------------------------------------------------------------
// IMPLEMENTATIONS
// -----------------------------------------------------------------------------------------------

impl fmt::Display for BackendType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BackendType::Serial => write!(f, "Serial"),
            BackendType::Cpu => write!(f, "CPU"),
        }
    }
}

impl Default for LaunchConfig {
    fn default() -> Self {
        LaunchConfig {
            block_width: 32,
            block_height: 12,
            stride_alignment: 32,
        }
    }
}

impl LaunchConfig {
    /// Round `n` up to the stride alignment, or `None` if the result does not fit in a `usize`.
    pub fn align_up(&self, n: usize) -> Option<usize> {
        let alignment = self.stride_alignment.max(1);
        n.checked_add(alignment - 1)
            .map(|padded| padded / alignment * alignment)
    }

    /// Number of blocks needed to cover a `width` x `height` field.
    pub fn grid(&self, width: usize, height: usize) -> (usize, usize) {
        (
            div_up(width, self.block_width.max(1)),
            div_up(height, self.block_height.max(1)),
        )
    }
}

/// Integer division rounding up.
pub fn div_up(n: usize, m: usize) -> usize {
    (n + m - 1) / m
}

fn check_pair<A: Pixel, B: Pixel>(first: &Field<A>, second: &Field<B>) -> Result<()> {
    if first.same_shape(second) {
        Ok(())
    } else {
        Err(Error::Backend(format!(
            "paired launch over mismatched fields ({}x{}/{} and {}x{}/{})",
            first.width(),
            first.height(),
            first.stride(),
            second.width(),
            second.height(),
            second.stride()
        )))
    }
}

impl SerialBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(config: LaunchConfig) -> Self {
        Self { config }
    }
}

impl ComputeBackend for SerialBackend {
    fn backend_type(&self) -> BackendType {
        BackendType::Serial
    }

    fn name(&self) -> &str {
        "Serial"
    }

    fn launch_config(&self) -> LaunchConfig {
        self.config
    }

    fn launch<T, K>(&self, out: &mut Field<T>, kernel: K) -> Result<()>
    where
        T: Pixel,
        K: Fn(usize, usize) -> T + Send + Sync,
    {
        let (width, stride) = (out.width(), out.stride());
        if width == 0 {
            return Ok(());
        }

        for (y, row) in out.as_mut_slice().chunks_mut(stride).enumerate() {
            for (x, px) in row[..width].iter_mut().enumerate() {
                *px = kernel(x, y);
            }
        }

        Ok(())
    }

    fn launch_pair<A, B, K>(&self, first: &mut Field<A>, second: &mut Field<B>, kernel: K) -> Result<()>
    where
        A: Pixel,
        B: Pixel,
        K: Fn(usize, usize) -> (A, B) + Send + Sync,
    {
        check_pair(first, second)?;

        let (width, stride) = (first.width(), first.stride());
        if width == 0 {
            return Ok(());
        }

        let rows = first
            .as_mut_slice()
            .chunks_mut(stride)
            .zip(second.as_mut_slice().chunks_mut(stride));

        for (y, (row_a, row_b)) in rows.enumerate() {
            for x in 0..width {
                let (a, b) = kernel(x, y);
                row_a[x] = a;
                row_b[x] = b;
            }
        }

        Ok(())
    }
}

impl CpuBackend {
    /// Create a backend with the default launch layout and as many threads as rayon chooses.
    pub fn new() -> Result<Self> {
        Self::with_config(LaunchConfig::default(), 0)
    }

    /// Create a backend with a given launch layout and thread count (`0` lets rayon decide).
    pub fn with_config(config: LaunchConfig, num_threads: usize) -> Result<Self> {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(num_threads)
            .thread_name(|i| format!("stereotgv-{}", i))
            .build()
            .map_err(|e| Error::Backend(e.to_string()))?;

        debug!(
            "CPU backend ready with {} threads, {} rows per block",
            pool.current_num_threads(),
            config.block_height
        );

        Ok(Self { config, pool })
    }

    pub fn num_threads(&self) -> usize {
        self.pool.current_num_threads()
    }
}

impl ComputeBackend for CpuBackend {
    fn backend_type(&self) -> BackendType {
        BackendType::Cpu
    }

    fn name(&self) -> &str {
        "CPU"
    }

    fn launch_config(&self) -> LaunchConfig {
        self.config
    }

    fn launch<T, K>(&self, out: &mut Field<T>, kernel: K) -> Result<()>
    where
        T: Pixel,
        K: Fn(usize, usize) -> T + Send + Sync,
    {
        let (width, stride) = (out.width(), out.stride());
        if width == 0 || out.height() == 0 {
            return Ok(());
        }

        let rows = self.config.block_height.max(1);
        let data = out.as_mut_slice();
        let kernel = &kernel;

        self.pool.install(|| {
            data.par_chunks_mut(stride * rows)
                .enumerate()
                .for_each(|(block, chunk)| {
                    for (r, row) in chunk.chunks_mut(stride).enumerate() {
                        let y = block * rows + r;
                        for (x, px) in row[..width].iter_mut().enumerate() {
                            *px = kernel(x, y);
                        }
                    }
                })
        });

        Ok(())
    }

    fn launch_pair<A, B, K>(&self, first: &mut Field<A>, second: &mut Field<B>, kernel: K) -> Result<()>
    where
        A: Pixel,
        B: Pixel,
        K: Fn(usize, usize) -> (A, B) + Send + Sync,
    {
        check_pair(first, second)?;

        let (width, stride) = (first.width(), first.stride());
        if width == 0 || first.height() == 0 {
            return Ok(());
        }

        let rows = self.config.block_height.max(1);
        let data_a = first.as_mut_slice();
        let data_b = second.as_mut_slice();
        let kernel = &kernel;

        self.pool.install(|| {
            data_a
                .par_chunks_mut(stride * rows)
                .zip(data_b.par_chunks_mut(stride * rows))
                .enumerate()
                .for_each(|(block, (chunk_a, chunk_b))| {
                    let pairs = chunk_a.chunks_mut(stride).zip(chunk_b.chunks_mut(stride));
                    for (r, (row_a, row_b)) in pairs.enumerate() {
                        let y = block * rows + r;
                        for x in 0..width {
                            let (a, b) = kernel(x, y);
                            row_a[x] = a;
                            row_b[x] = b;
                        }
                    }
                })
        });

        Ok(())
    }
}

// -----------------------------------------------------------------------------------------------
// TESTS
// -----------------------------------------------------------------------------------------------

//! # Diffra Compute
//!
//! Compute backend abstraction for the Diffra framework. This crate
//! provides a [`ComputeBackend`](backend::ComputeBackend) trait that isolates
//! the diffraction physics from device-specific execution details. The
//! backend is chosen once by the caller and handed to every propagator as an
//! explicit value.
//!
//! ## Available backends
//!
//! | Backend | Feature flag | Status |
//! |---------|-------------|--------|
//! | CPU (Rayon) | `cpu` (default) | Implemented |
//! | GPU (wgpu) | `gpu` | Transfer-matrix products |

pub mod backend;

#[cfg(feature = "cpu")]
pub mod cpu;

#[cfg(feature = "gpu")]
pub mod gpu;

pub use backend::{BackendType, ComputeBackend, ComputeError, DeviceInfo};

#[cfg(feature = "cpu")]
pub use cpu::CpuBackend;

#[cfg(feature = "gpu")]
pub use gpu::GpuBackend;

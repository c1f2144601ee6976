//! # Diffra Core
//!
//! The numerical backbone of the Diffra framework: scalar Rayleigh–Sommerfeld
//! diffraction between parallel planes of point sources, used as the forward
//! pass of a diffractive optical neural network.
//!
//! ## Architecture
//!
//! A network is a stack of planes at increasing $z$. The field at one plane
//! is propagated to the next by coherent superposition of the closed-form
//! kernel over every source element ([`propagation`]). Diffractive planes
//! modulate the arriving field with a learnable complex transmission mask
//! ([`mask`], [`layers`]); the final plane is read out as a normalised
//! intensity map ([`intensity`]). Device selection is an explicit
//! [`ComputeBackend`](diffra_compute::ComputeBackend) handed to each
//! propagator.
//!
//! ## Modules
//!
//! - [`types`]: Field aliases and simulation parameters.
//! - [`propagation`]: Kernel, superposition engine and plane propagators.
//! - [`mask`]: Transmission masks with read-time amplitude clipping.
//! - [`layers`]: Input, diffractive and detector layers.
//! - [`network`]: Layer stacks and their builder.
//! - [`intensity`]: Detector intensity readout.

pub mod intensity;
pub mod layers;
pub mod mask;
pub mod network;
pub mod propagation;
pub mod types;

pub use intensity::intensity_readout;
pub use layers::{DetectorLayer, DiffractiveLayer, InputLayer, Layer, LayerKind};
pub use mask::TransmissionMask;
pub use network::{DiffractiveNetwork, NetworkBuilder};
pub use propagation::{DiffractionError, PlanePropagator};
pub use types::{ComplexField, IntensityMap, SimulationParams};

//! Stacks of planes forming a diffractive network.
//!
//! A network is one input plane, any number of diffractive planes and one
//! detector plane, at strictly increasing $z$. Each plane owns the
//! propagator to its successor, so geometry and transfer matrices are
//! fixed when the network is built and reused on every forward pass.

use std::sync::Arc;

use diffra_compute::ComputeBackend;
use diffra_geometry::PlaneGrid;
use ndarray::Array2;
use num_complex::Complex64;

use crate::layers::{DetectorLayer, DiffractiveLayer, InputLayer, Layer, LayerKind};
use crate::mask::TransmissionMask;
use crate::propagation::{DiffractionError, PlanePropagator};
use crate::types::{ComplexField, IntensityMap, SimulationParams};

struct PendingPlane {
    kind: LayerKind,
    size: usize,
    side_length: f64,
    z: f64,
    mask: Option<TransmissionMask>,
}

/// Collects planes in optical order and assembles a [`DiffractiveNetwork`].
///
/// ```no_run
/// use std::sync::Arc;
/// use diffra_compute::CpuBackend;
/// use diffra_core::{NetworkBuilder, SimulationParams, TransmissionMask};
///
/// let network = NetworkBuilder::new(SimulationParams::with_wavelength(0.652), Arc::new(CpuBackend::new()))
///     .input(16, 1.0, 0.0)
///     .diffractive(16, 1.0, 0.1, TransmissionMask::unity(16)?)
///     .detector(16, 1.0, 0.2)
///     .build()?;
/// # Ok::<(), diffra_core::DiffractionError>(())
/// ```
pub struct NetworkBuilder {
    params: SimulationParams,
    backend: Arc<dyn ComputeBackend>,
    planes: Vec<PendingPlane>,
}

impl NetworkBuilder {
    pub fn new(params: SimulationParams, backend: Arc<dyn ComputeBackend>) -> Self {
        Self {
            params,
            backend,
            planes: Vec::new(),
        }
    }

    pub fn input(self, size: usize, side_length: f64, z: f64) -> Self {
        self.push(LayerKind::Input, size, side_length, z, None)
    }

    pub fn diffractive(self, size: usize, side_length: f64, z: f64, mask: TransmissionMask) -> Self {
        self.push(LayerKind::Diffractive, size, side_length, z, Some(mask))
    }

    pub fn detector(self, size: usize, side_length: f64, z: f64) -> Self {
        self.push(LayerKind::Detector, size, side_length, z, None)
    }

    fn push(
        mut self,
        kind: LayerKind,
        size: usize,
        side_length: f64,
        z: f64,
        mask: Option<TransmissionMask>,
    ) -> Self {
        self.planes.push(PendingPlane {
            kind,
            size,
            side_length,
            z,
            mask,
        });
        self
    }

    /// Validate plane order and geometry, then assemble every propagator.
    pub fn build(self) -> Result<DiffractiveNetwork, DiffractionError> {
        self.params.validate()?;
        check_order(&self.planes)?;

        let mut grids = Vec::with_capacity(self.planes.len());
        for plane in &self.planes {
            grids.push(PlaneGrid::new(plane.size, plane.side_length, plane.z)?);
        }
        for pair in grids.windows(2) {
            if !(pair[1].z() > pair[0].z()) {
                return Err(DiffractionError::InvalidArgument(format!(
                    "planes must be at strictly increasing z, got {} after {}",
                    pair[1].z(),
                    pair[0].z()
                )));
            }
        }

        let mut layers = Vec::with_capacity(self.planes.len());
        let mut diffractive = 0;
        for (idx, plane) in self.planes.into_iter().enumerate() {
            let layer = match plane.kind {
                LayerKind::Detector => Layer::Detector(DetectorLayer::new(grids[idx].clone())),
                kind => {
                    let propagator = PlanePropagator::new(
                        grids[idx].clone(),
                        grids[idx + 1].clone(),
                        self.params.clone(),
                        Arc::clone(&self.backend),
                    )?;
                    match (kind, plane.mask) {
                        (LayerKind::Diffractive, Some(mask)) => {
                            diffractive += 1;
                            Layer::Diffractive(DiffractiveLayer::new(mask, propagator)?)
                        }
                        _ => Layer::Input(InputLayer::new(propagator)),
                    }
                }
            };
            layers.push(layer);
        }

        log::info!(
            "Built network: {} planes ({} diffractive), λ = {:.4e} m, backend {}",
            layers.len(),
            diffractive,
            self.params.wavelength,
            self.backend.device_info().name
        );

        Ok(DiffractiveNetwork {
            layers,
            params: self.params,
        })
    }
}

fn check_order(planes: &[PendingPlane]) -> Result<(), DiffractionError> {
    let kinds: Vec<LayerKind> = planes.iter().map(|p| p.kind).collect();
    let valid = match kinds.as_slice() {
        [LayerKind::Input, middle @ .., LayerKind::Detector] => {
            middle.iter().all(|&k| k == LayerKind::Diffractive)
        }
        _ => false,
    };
    if !valid {
        let names: Vec<String> = kinds.iter().map(|k| k.to_string()).collect();
        return Err(DiffractionError::InvalidArgument(format!(
            "planes must be input, diffractive..., detector; got [{}]",
            names.join(", ")
        )));
    }
    Ok(())
}

/// A built network, ready for forward passes.
#[derive(Debug)]
pub struct DiffractiveNetwork {
    layers: Vec<Layer>,
    params: SimulationParams,
}

impl DiffractiveNetwork {
    /// Propagate an input field through every plane and return the complex
    /// field at the detector.
    pub fn forward_field(&self, input: &ComplexField) -> Result<ComplexField, DiffractionError> {
        let mut field = input.clone();
        for layer in &self.layers {
            field = layer.forward(&field)?;
        }
        Ok(field)
    }

    /// Forward pass ending in the detector's normalised intensity.
    ///
    /// A [`DiffractionError::ZeroField`] here means no light reached the
    /// detector; callers training on a dataset should skip the example.
    pub fn forward(&self, input: &ComplexField) -> Result<IntensityMap, DiffractionError> {
        let field = self.forward_field(input)?;
        self.read(&field)
    }

    /// Detector readout of a field already propagated by
    /// [`forward_field`](Self::forward_field).
    pub fn read(&self, detector_field: &ComplexField) -> Result<IntensityMap, DiffractionError> {
        self.detector()?.read(detector_field)
    }

    /// Forward pass over a batch. All-or-nothing: one failing example fails
    /// the batch. Use [`forward`](Self::forward) per example to skip bad ones.
    pub fn forward_batch(
        &self,
        inputs: &[ComplexField],
    ) -> Result<Vec<IntensityMap>, DiffractionError> {
        let mut fields = inputs.to_vec();
        for layer in &self.layers {
            fields = layer.forward_batch(&fields)?;
        }
        let detector = self.detector()?;
        fields.iter().map(|f| detector.read(f)).collect()
    }

    pub fn layers(&self) -> &[Layer] {
        &self.layers
    }

    pub fn params(&self) -> &SimulationParams {
        &self.params
    }

    pub fn input_grid(&self) -> Option<&PlaneGrid> {
        self.layers.first().map(Layer::grid)
    }

    pub fn detector_grid(&self) -> Option<&PlaneGrid> {
        self.layers.last().map(Layer::grid)
    }

    /// Raw mask weights of every diffractive plane, in optical order.
    pub fn parameters_mut(&mut self) -> impl Iterator<Item = &mut Array2<Complex64>> {
        self.layers.iter_mut().filter_map(Layer::parameters_mut)
    }

    pub fn masks(&self) -> impl Iterator<Item = &TransmissionMask> {
        self.layers.iter().filter_map(|layer| match layer {
            Layer::Diffractive(d) => Some(d.mask()),
            _ => None,
        })
    }

    /// Clipped amplitude map of every mask.
    pub fn amplitude_maps(&self) -> Vec<Array2<f64>> {
        self.masks().map(TransmissionMask::amplitude_map).collect()
    }

    pub fn phase_maps(&self) -> Vec<Array2<f64>> {
        self.masks().map(TransmissionMask::phase_map).collect()
    }

    fn detector(&self) -> Result<&DetectorLayer, DiffractionError> {
        match self.layers.last() {
            Some(Layer::Detector(detector)) => Ok(detector),
            _ => Err(DiffractionError::InvalidArgument(
                "network does not end in a detector plane".into(),
            )),
        }
    }
}

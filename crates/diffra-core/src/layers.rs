//! Planes of a diffractive network.
//!
//! Every plane takes the field arriving at it and produces the field
//! arriving at the next one. Only diffractive planes carry trainable
//! parameters.
//!
//! | Variant | Forward pass | Parameters |
//! |---------|--------------|------------|
//! | [`InputLayer`] | propagate to next plane | none |
//! | [`DiffractiveLayer`] | clipped mask product, then propagate | [`TransmissionMask`] |
//! | [`DetectorLayer`] | pass-through | none |

use std::fmt;

use diffra_geometry::PlaneGrid;
use ndarray::Array2;
use num_complex::Complex64;

use crate::intensity::intensity_readout;
use crate::mask::TransmissionMask;
use crate::propagation::superposition::check_field;
use crate::propagation::{DiffractionError, PlanePropagator};
use crate::types::{ComplexField, IntensityMap};

/// Source plane: emits the input field towards the next plane.
#[derive(Debug)]
pub struct InputLayer {
    propagator: PlanePropagator,
}

impl InputLayer {
    pub fn new(propagator: PlanePropagator) -> Self {
        Self { propagator }
    }

    pub fn grid(&self) -> &PlaneGrid {
        self.propagator.source()
    }

    pub fn propagator(&self) -> &PlanePropagator {
        &self.propagator
    }

    pub fn forward(&self, field: &ComplexField) -> Result<ComplexField, DiffractionError> {
        self.propagator.propagate(field)
    }
}

/// Plane of learnable modulating elements.
#[derive(Debug)]
pub struct DiffractiveLayer {
    mask: TransmissionMask,
    propagator: PlanePropagator,
}

impl DiffractiveLayer {
    /// The mask must match the propagator's source plane element for element.
    pub fn new(mask: TransmissionMask, propagator: PlanePropagator) -> Result<Self, DiffractionError> {
        let size = propagator.source().size();
        if mask.size() != size {
            return Err(DiffractionError::InvalidArgument(format!(
                "{}x{} mask on a {}x{} plane",
                mask.size(),
                mask.size(),
                size,
                size
            )));
        }
        Ok(Self { mask, propagator })
    }

    pub fn grid(&self) -> &PlaneGrid {
        self.propagator.source()
    }

    pub fn propagator(&self) -> &PlanePropagator {
        &self.propagator
    }

    pub fn mask(&self) -> &TransmissionMask {
        &self.mask
    }

    pub fn mask_mut(&mut self) -> &mut TransmissionMask {
        &mut self.mask
    }

    /// Modulate the field arriving at this plane. Phase is kept.
    pub fn apply(&self, field: &ComplexField) -> Result<ComplexField, DiffractionError> {
        self.mask.apply(field)
    }

    /// Modulate, then propagate to the next plane.
    pub fn forward(&self, field: &ComplexField) -> Result<ComplexField, DiffractionError> {
        let modulated = self.apply(field)?;
        self.propagator.propagate(&modulated)
    }

    pub fn amplitude_map(&self) -> Array2<f64> {
        self.mask.amplitude_map()
    }

    pub fn phase_map(&self) -> Array2<f64> {
        self.mask.phase_map()
    }
}

/// Final plane, where the field is recorded.
#[derive(Debug, Clone)]
pub struct DetectorLayer {
    grid: PlaneGrid,
}

impl DetectorLayer {
    pub fn new(grid: PlaneGrid) -> Self {
        Self { grid }
    }

    pub fn grid(&self) -> &PlaneGrid {
        &self.grid
    }

    /// The detector does not alter the field; it only checks its shape.
    pub fn forward(&self, field: &ComplexField) -> Result<ComplexField, DiffractionError> {
        check_field(field, self.grid.size())?;
        Ok(field.clone())
    }

    /// Normalised intensity as a camera would record it.
    pub fn read(&self, field: &ComplexField) -> Result<IntensityMap, DiffractionError> {
        check_field(field, self.grid.size())?;
        intensity_readout(field)
    }
}

/// Role of a plane in the stack.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LayerKind {
    Input,
    Diffractive,
    Detector,
}

impl fmt::Display for LayerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LayerKind::Input => write!(f, "input"),
            LayerKind::Diffractive => write!(f, "diffractive"),
            LayerKind::Detector => write!(f, "detector"),
        }
    }
}

/// Any plane of a network.
#[derive(Debug)]
pub enum Layer {
    Input(InputLayer),
    Diffractive(DiffractiveLayer),
    Detector(DetectorLayer),
}

impl Layer {
    pub fn kind(&self) -> LayerKind {
        match self {
            Layer::Input(_) => LayerKind::Input,
            Layer::Diffractive(_) => LayerKind::Diffractive,
            Layer::Detector(_) => LayerKind::Detector,
        }
    }

    pub fn grid(&self) -> &PlaneGrid {
        match self {
            Layer::Input(layer) => layer.grid(),
            Layer::Diffractive(layer) => layer.grid(),
            Layer::Detector(layer) => layer.grid(),
        }
    }

    /// Field arriving at this plane in, field arriving at the next plane out.
    pub fn forward(&self, field: &ComplexField) -> Result<ComplexField, DiffractionError> {
        match self {
            Layer::Input(layer) => layer.forward(field),
            Layer::Diffractive(layer) => layer.forward(field),
            Layer::Detector(layer) => layer.forward(field),
        }
    }

    /// [`forward`](Self::forward) over a batch, as a single transfer-matrix
    /// product when the propagator has one cached.
    pub fn forward_batch(
        &self,
        fields: &[ComplexField],
    ) -> Result<Vec<ComplexField>, DiffractionError> {
        match self {
            Layer::Input(layer) => layer.propagator.propagate_batch(fields),
            Layer::Diffractive(layer) => {
                let modulated = fields
                    .iter()
                    .map(|f| layer.apply(f))
                    .collect::<Result<Vec<_>, _>>()?;
                layer.propagator.propagate_batch(&modulated)
            }
            Layer::Detector(layer) => fields.iter().map(|f| layer.forward(f)).collect(),
        }
    }

    /// Trainable weights, if this plane has any.
    pub fn parameters(&self) -> Option<&Array2<Complex64>> {
        match self {
            Layer::Diffractive(layer) => Some(layer.mask.raw()),
            _ => None,
        }
    }

    pub fn parameters_mut(&mut self) -> Option<&mut Array2<Complex64>> {
        match self {
            Layer::Diffractive(layer) => Some(layer.mask.parameters_mut()),
            _ => None,
        }
    }
}

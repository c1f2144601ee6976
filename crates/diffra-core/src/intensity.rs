//! Detector intensity readout.

use crate::propagation::DiffractionError;
use crate::types::{ComplexField, IntensityMap};

/// Normalised intensity $(|E| / \max|E|)^2$.
///
/// The brightest element reads exactly 1 and every other lies in $[0, 1]$.
///
/// # Errors
/// [`DiffractionError::ZeroField`] if the field is zero everywhere (nothing
/// to normalise against); [`DiffractionError::InvalidArgument`] if it is
/// empty or holds a non-finite value.
pub fn intensity_readout(field: &ComplexField) -> Result<IntensityMap, DiffractionError> {
    if field.is_empty() {
        return Err(DiffractionError::InvalidArgument(
            "cannot read out an empty field".into(),
        ));
    }

    let mut scale = 0.0f64;
    for c in field {
        if !(c.re.is_finite() && c.im.is_finite()) {
            return Err(DiffractionError::InvalidArgument(format!(
                "field value is not finite: {}",
                c
            )));
        }
        scale = scale.max(c.re.abs()).max(c.im.abs());
    }
    if scale == 0.0 {
        return Err(DiffractionError::ZeroField);
    }

    // |E| near f64::MAX overflows unless taken on the rescaled field.
    let magnitude = field.mapv(|c| (c / scale).norm());
    let peak = magnitude.iter().cloned().fold(0.0f64, f64::max);

    Ok(magnitude.mapv(|m| {
        let ratio = m / peak;
        ratio * ratio
    }))
}

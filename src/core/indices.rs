//! Intensity rescaling and normalized-difference indices

use crate::types::{FuseResult, RasterStack};
use ndarray::{Array2, ArrayView2, Zip};
use num_traits::Float;

/// Band-ratio indices produced by the fusion step
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SpectralIndex {
    /// Normalized Difference Moisture Index
    Ndmi,
    /// Normalized Difference Vegetation Index
    Ndvi,
    /// Normalized Burn Ratio
    Nbr,
    /// Normalized Burn Ratio 2
    Nbr2,
    /// Normalized Difference Water Index (McFeeters)
    Ndwi,
    /// Modified NDWI (green/SWIR1)
    Mndwi,
    /// Same formula as [`SpectralIndex::Ndwi`]; kept as its own layer for
    /// compatibility with existing band layouts
    Mndwi2,
    /// Radar vegetation ratio from HH/HV
    Rvi,
}

impl SpectralIndex {
    /// All indices in output order
    pub const ALL: [SpectralIndex; 8] = [
        SpectralIndex::Ndmi,
        SpectralIndex::Ndvi,
        SpectralIndex::Nbr,
        SpectralIndex::Nbr2,
        SpectralIndex::Ndwi,
        SpectralIndex::Mndwi,
        SpectralIndex::Mndwi2,
        SpectralIndex::Rvi,
    ];

    /// Band label of the output layer
    pub fn label(&self) -> &'static str {
        match self {
            SpectralIndex::Ndmi => "ndmi",
            SpectralIndex::Ndvi => "ndvi",
            SpectralIndex::Nbr => "nbr",
            SpectralIndex::Nbr2 => "nbr2",
            SpectralIndex::Ndwi => "ndwi",
            SpectralIndex::Mndwi => "mndwi",
            SpectralIndex::Mndwi2 => "mndwi2",
            SpectralIndex::Rvi => "rvi",
        }
    }

    /// (A, B) band names for `(A - B) / (A + B)`
    pub fn operands(&self) -> (&'static str, &'static str) {
        match self {
            SpectralIndex::Ndmi => ("nir08", "swir16"),
            SpectralIndex::Ndvi => ("nir08", "red"),
            SpectralIndex::Nbr => ("nir08", "swir22"),
            SpectralIndex::Nbr2 => ("swir16", "swir22"),
            SpectralIndex::Ndwi => ("green", "nir08"),
            SpectralIndex::Mndwi => ("green", "swir16"),
            SpectralIndex::Mndwi2 => ("green", "nir08"),
            SpectralIndex::Rvi => ("HH", "HV"),
        }
    }

    /// Compute this index from a stack holding both operand bands
    pub fn compute(&self, stack: &RasterStack) -> FuseResult<Array2<f64>> {
        let (a, b) = self.operands();
        Ok(normalized_difference(stack.band(a)?, stack.band(b)?))
    }
}

impl std::fmt::Display for SpectralIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.label().to_uppercase())
    }
}

/// `(a - b) / (a + b)` element-wise. A zero sum gives NaN or ±inf, never an error.
pub fn normalized_difference<T: Float>(a: ArrayView2<T>, b: ArrayView2<T>) -> Array2<T> {
    Zip::from(&a).and(&b).map_collect(|&x, &y| (x - y) / (x + y))
}

/// Min-max stretch of a band.
///
/// Input limits are the NaN-ignoring minimum and maximum. The output range is
/// (0, 1) when the minimum is non-negative and (-1, 1) otherwise. A constant
/// band is only clipped into the output range. NaN pixels stay NaN.
pub fn rescale_intensity(band: ArrayView2<f64>) -> Array2<f64> {
    let (imin, imax) = band
        .iter()
        .filter(|v| !v.is_nan())
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &v| (lo.min(v), hi.max(v)));

    if imin > imax {
        // no valid pixels
        return band.to_owned();
    }

    let (omin, omax) = if imin >= 0.0 { (0.0, 1.0) } else { (-1.0, 1.0) };

    if imin == imax {
        return band.mapv(|v| v.clamp(omin, omax));
    }

    band.mapv(|v| (v.clamp(imin, imax) - imin) / (imax - imin) * (omax - omin) + omin)
}

//! Fusion of optical and radar scenes into one index stack, and GEDI footprint filtering

use crate::config::AccessConfig;
use crate::core::accessor::DataAccessor;
use crate::core::geometry::{clip_to_area, common_area, footprint_polygon, project_footprint};
use crate::core::indices::{rescale_intensity, SpectralIndex};
use crate::types::{BoundingBox, FootprintTable, FuseResult, RasterStack};
use geo_types::MultiPolygon;
use std::path::{Path, PathBuf};

/// Raw bands of the fused stack, in output order
pub const FUSED_BANDS: [&str; 9] = ["red", "green", "blue", "swir16", "swir22", "nir08", "lwir11", "HH", "HV"];

/// Result of [`Preprocessor::preprocess_satellite_data`]
#[derive(Debug, Clone)]
pub struct FusedScene {
    /// Rescaled raw bands followed by the index layers
    pub stack: RasterStack,
    /// Overlap of the optical and radar footprints in the target CRS
    pub intersection: MultiPolygon<f64>,
}

impl FusedScene {
    /// The intersection as a GeoJSON geometry string, coordinates in the stack's CRS
    pub fn intersection_geojson(&self) -> String {
        geojson::Geometry::new(geojson::Value::from(&self.intersection)).to_string()
    }
}

/// Drives a [`DataAccessor`] and derives the analysis-ready products
pub struct Preprocessor {
    accessor: DataAccessor,
}

impl Preprocessor {
    pub fn new(config: AccessConfig) -> FuseResult<Self> {
        Ok(Self::with_accessor(DataAccessor::new(config)?))
    }

    pub fn with_accessor(accessor: DataAccessor) -> Self {
        Self { accessor }
    }

    pub fn accessor(&self) -> &DataAccessor {
        &self.accessor
    }

    /// Fetch Landsat and ALOS scenes, clip both to their common footprint,
    /// rescale every band and append the normalized-difference indices.
    ///
    /// A search that finds nothing surfaces as [`crate::FuseError::SceneUnavailable`];
    /// disjoint footprints as [`crate::FuseError::EmptyIntersection`].
    pub fn preprocess_satellite_data(&self) -> FuseResult<FusedScene> {
        let landsat = self.accessor.get_landsat()?.into_result()?;
        let alos = self.accessor.get_alos()?.into_result()?;
        let epsg = self.accessor.config().grid.epsg;

        let landsat_area = project_footprint(&footprint_polygon(&landsat.footprint)?, epsg)?;
        let alos_area = project_footprint(&footprint_polygon(&alos.footprint)?, epsg)?;
        let intersection = common_area(&landsat_area, &alos_area)?;

        log::info!("Clipping the data...");
        let optical = clip_to_area(&landsat.raster, &intersection)?;
        let radar = clip_to_area(&alos.raster, &intersection)?;
        let clipped = RasterStack::concat(&[optical, radar])?;

        log::info!("Rescaling the data...");
        let mut layers = Vec::with_capacity(FUSED_BANDS.len());
        for name in FUSED_BANDS {
            layers.push((name.to_string(), rescale_intensity(clipped.band(name)?)));
        }
        let rescaled = RasterStack::from_layers(clipped.geo_transform, clipped.epsg, layers)?;

        let mut index_layers = Vec::with_capacity(SpectralIndex::ALL.len());
        for index in SpectralIndex::ALL {
            log::info!("Calculating {}....", index);
            index_layers.push((index.label().to_string(), index.compute(&rescaled)?));
        }
        let indices = RasterStack::from_layers(rescaled.geo_transform, rescaled.epsg, index_layers)?;

        log::info!("Combining the data...");
        let stack = RasterStack::concat(&[rescaled, indices])?;
        let (bands, height, width) = stack.shape();
        log::info!("Fused stack: {} bands, {}x{} pixels", bands, width, height);

        Ok(FusedScene { stack, intersection })
    }

    /// GEDI shots inside `bounds` that pass the quality screen, heights in metres
    pub fn preprocess_gedi_data(&mut self, bounds: &BoundingBox) -> FuseResult<FootprintTable> {
        let min_sensitivity = self.accessor.config().min_sensitivity;
        let table = self.accessor.get_gedi(bounds)?;
        let filtered = filter_footprints(table, min_sensitivity);
        log::info!("GEDI shots after quality filter: {}", filtered.len());
        Ok(scale_canopy_height(filtered))
    }

    /// Per-granule CSV export of in-area, quality 1 shots
    pub fn get_gedi_excel(&mut self, bounds: &BoundingBox, out_dir: &Path) -> FuseResult<Vec<PathBuf>> {
        self.accessor.export_gedi_csv(bounds, out_dir)
    }
}

/// Keep shots with quality flag 1 and sensitivity strictly above `min_sensitivity`
pub fn filter_footprints(mut table: FootprintTable, min_sensitivity: f64) -> FootprintTable {
    table.retain(|f| f.quality == 1 && f.sensitivity > min_sensitivity);
    table
}

/// Canopy height from centimetres to metres
pub fn scale_canopy_height(mut table: FootprintTable) -> FootprintTable {
    for footprint in table.rows_mut() {
        footprint.canopy_height /= 100.0;
    }
    table
}

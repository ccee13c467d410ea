//! Data acquisition: Landsat scenes, ALOS PALSAR mosaics and GEDI footprints

use crate::config::{
    AccessConfig, ALOS_BANDS, ALOS_COLLECTION, LANDSAT_BANDS, LANDSAT_COLLECTION, LANDSAT_ID_PREFIXES,
};
use crate::io::earthdata::{CollectionQuery, EarthdataClient, Granule, GranuleArchive};
use crate::io::gedi::{csv_file_name, read_footprints, write_csv};
use crate::io::raster::{GdalRasterSource, RasterSource};
use crate::io::stac::{Catalog, SearchRequest, StacClient, StacItem};
use crate::types::{
    BoundingBox, FootprintTable, FuseError, FuseResult, MissingReason, RasterStack, Retrieval,
};
use std::path::{Path, PathBuf};

/// GEDI L2B canopy cover and vertical profile metrics
pub const GEDI_SHORT_NAME: &str = "GEDI02_B";

/// A retrieved scene: its raster on the target grid and the footprint of the source item
#[derive(Debug, Clone)]
pub struct Scene {
    pub raster: RasterStack,
    /// GeoJSON geometry, WGS84
    pub footprint: serde_json::Value,
    pub item_id: String,
    pub cloud_cover: Option<f64>,
}

/// Sort candidates by ascending cloud cover and return the clearest.
///
/// Items without `eo:cloud_cover` count as 100 %. Ties keep catalog order.
pub fn select_clearest(mut items: Vec<StacItem>) -> Option<StacItem> {
    items.sort_by(|a, b| {
        let ca = a.cloud_cover().unwrap_or(100.0);
        let cb = b.cloud_cover().unwrap_or(100.0);
        ca.total_cmp(&cb)
    });
    items.into_iter().next()
}

fn is_landsat_oli(item: &StacItem) -> bool {
    item.id
        .get(..4)
        .map(|prefix| LANDSAT_ID_PREFIXES.contains(&prefix))
        .unwrap_or(false)
}

/// Pulls raw rasters and footprint tables from the remote services
pub struct DataAccessor {
    config: AccessConfig,
    catalog: Box<dyn Catalog>,
    rasters: Box<dyn RasterSource>,
    archive: Box<dyn GranuleArchive>,
}

impl DataAccessor {
    /// Accessor backed by the configured STAC API, GDAL and NASA Earthdata
    pub fn new(config: AccessConfig) -> FuseResult<Self> {
        let catalog = StacClient::new(&config.stac_url, config.sign_assets)?;
        let archive = EarthdataClient::new(&config.cmr_url, &config.urs_url, &config.download_dir)?;
        Ok(Self::with_ports(
            config,
            Box::new(catalog),
            Box::new(GdalRasterSource::new()),
            Box::new(archive),
        ))
    }

    pub fn with_ports(
        config: AccessConfig,
        catalog: Box<dyn Catalog>,
        rasters: Box<dyn RasterSource>,
        archive: Box<dyn GranuleArchive>,
    ) -> Self {
        Self {
            config,
            catalog,
            rasters,
            archive,
        }
    }

    pub fn config(&self) -> &AccessConfig {
        &self.config
    }

    /// Clearest Landsat 8/9 Level-2 scene over the area and date range
    pub fn get_landsat(&self) -> FuseResult<Retrieval<Scene>> {
        let request = SearchRequest::new(LANDSAT_COLLECTION)
            .bbox(&self.config.bbox)
            .datetime(self.config.dates.stac_interval())
            .cloud_cover_below(self.config.cloud_cover)
            .max_items(self.config.max_items);

        let items: Vec<StacItem> = self
            .catalog
            .search(&request)?
            .into_iter()
            .filter(is_landsat_oli)
            .collect();
        log::info!("Landsat scenes found: {}", items.len());

        let Some(item) = select_clearest(items) else {
            let reason = MissingReason::NoLandsatScenes;
            log::warn!("{} ({})", reason, reason.code());
            return Ok(Retrieval::Missing(reason));
        };

        log::info!(
            "Selected {} (cloud cover {})",
            item.id,
            item.cloud_cover()
                .map(|c| format!("{:.1}%", c))
                .unwrap_or_else(|| "unknown".to_string())
        );

        let raster = self
            .rasters
            .stack(std::slice::from_ref(&item), &LANDSAT_BANDS, &self.config.grid)?;
        let footprint = item
            .geometry
            .clone()
            .ok_or_else(|| FuseError::InvalidGeometry(format!("item {} has no geometry", item.id)))?;

        Ok(Retrieval::Found(Scene {
            raster,
            footprint,
            cloud_cover: item.cloud_cover(),
            item_id: item.id,
        }))
    }

    /// ALOS PALSAR annual mosaic tiles for the start year, stacked as HH/HV
    pub fn get_alos(&self) -> FuseResult<Retrieval<Scene>> {
        let request = SearchRequest::new(ALOS_COLLECTION)
            .bbox(&self.config.bbox)
            .datetime(self.config.dates.year_interval());

        let items = self.catalog.search(&request)?;
        log::info!("ALOS PALSAR mosaics found: {}", items.len());

        let Some(first) = items.first() else {
            let reason = MissingReason::NoAlosMosaics;
            log::warn!("{} ({})", reason, reason.code());
            return Ok(Retrieval::Missing(reason));
        };

        let footprint = first
            .geometry
            .clone()
            .ok_or_else(|| FuseError::InvalidGeometry(format!("item {} has no geometry", first.id)))?;
        let item_id = first.id.clone();

        let raster = self.rasters.stack(&items, &ALOS_BANDS, &self.config.grid)?;

        Ok(Retrieval::Found(Scene {
            raster,
            footprint,
            item_id,
            cloud_cover: None,
        }))
    }

    /// Log in and list the GEDI L2B granules of the start year that intersect `bounds`
    fn gedi_granules(&mut self, bounds: &BoundingBox) -> FuseResult<Vec<Granule>> {
        self.archive.login()?;

        let collections = self.archive.collection_ids(&CollectionQuery::gedi())?;
        let concept_id = collections
            .get(GEDI_SHORT_NAME)
            .ok_or_else(|| FuseError::CollectionNotFound(GEDI_SHORT_NAME.to_string()))?;
        log::debug!("{} concept id: {}", GEDI_SHORT_NAME, concept_id);

        let granules = self
            .archive
            .search_granules(concept_id, self.config.dates.year_bounds(), bounds)?;
        if granules.is_empty() {
            log::warn!("No {} granules intersect {:?}", GEDI_SHORT_NAME, bounds.as_array());
        }
        Ok(granules)
    }

    fn granule_table(&self, granule: &Granule) -> FuseResult<FootprintTable> {
        let source = self.archive.open(granule)?;
        Ok(FootprintTable::new(read_footprints(source.as_ref())?))
    }

    /// Every GEDI shot inside `bounds` across all beams and granules
    pub fn get_gedi(&mut self, bounds: &BoundingBox) -> FuseResult<FootprintTable> {
        let granules = self.gedi_granules(bounds)?;

        let mut table = FootprintTable::default();
        for (index, granule) in granules.iter().enumerate() {
            log::info!("Reading granule {}/{}: {}", index + 1, granules.len(), granule.id);
            table.extend(self.granule_table(granule)?.into_rows());
        }

        let total = table.len();
        let table = table.within(bounds);
        log::info!("GEDI shots inside area: {} of {}", table.len(), total);
        Ok(table)
    }

    /// Write one `gedi_file_<index>.csv` per granule with the in-area, quality 1 shots
    pub fn export_gedi_csv(&mut self, bounds: &BoundingBox, out_dir: &Path) -> FuseResult<Vec<PathBuf>> {
        let granules = self.gedi_granules(bounds)?;
        std::fs::create_dir_all(out_dir)?;

        let mut written = Vec::with_capacity(granules.len());
        for (index, granule) in granules.iter().enumerate() {
            let mut table = self.granule_table(granule)?.within(bounds);
            table.retain(|f| f.quality == 1);

            let path = out_dir.join(csv_file_name(index));
            write_csv(&path, table.rows())?;
            log::info!("Wrote {} shots to {}", table.len(), path.display());
            written.push(path);

            if index + 1 < granules.len() && !self.config.export_pause.is_zero() {
                std::thread::sleep(self.config.export_pause);
            }
        }

        Ok(written)
    }
}

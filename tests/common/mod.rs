//! In-memory catalog, raster and archive ports for the integration tests
#![allow(dead_code)]

use canopyfuse::io::earthdata::{CollectionQuery, Granule, GranuleArchive};
use canopyfuse::io::gedi::{BeamColumns, BeamDataSource};
use canopyfuse::io::raster::{output_grid, RasterSource};
use canopyfuse::io::stac::{Catalog, SearchRequest, StacItem, StacItemProperties};
use canopyfuse::{BoundingBox, FuseResult, GridSpec, RasterStack};
use chrono::NaiveDate;
use ndarray::Array2;
use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// STAC item whose geometry and bbox are the lon/lat rectangle `[w, s, e, n]`
pub fn rect_item(id: &str, rect: [f64; 4], cloud_cover: Option<f64>) -> StacItem {
    let [w, s, e, n] = rect;
    StacItem {
        id: id.to_string(),
        geometry: Some(serde_json::json!({
            "type": "Polygon",
            "coordinates": [[[w, s], [e, s], [e, n], [w, n], [w, s]]]
        })),
        bbox: Some(vec![w, s, e, n]),
        properties: StacItemProperties {
            eo_cloud_cover: cloud_cover,
            ..Default::default()
        },
        assets: HashMap::new(),
        collection: None,
    }
}

/// Serves fixed items per collection and records every request
#[derive(Default)]
pub struct MockCatalog {
    pub items: HashMap<String, Vec<StacItem>>,
    pub requests: Rc<RefCell<Vec<SearchRequest>>>,
}

impl MockCatalog {
    pub fn with(mut self, collection: &str, items: Vec<StacItem>) -> Self {
        self.items.insert(collection.to_string(), items);
        self
    }
}

impl Catalog for MockCatalog {
    fn search(&self, request: &SearchRequest) -> FuseResult<Vec<StacItem>> {
        self.requests.borrow_mut().push(request.clone());
        let collection = request.collection().unwrap_or_default();
        let mut items = self.items.get(collection).cloned().unwrap_or_default();
        if let Some(max) = request.max_items {
            items.truncate(max);
        }
        Ok(items)
    }
}

/// Deterministic pixel value for a band; radar bands are negative like dB backscatter
pub fn synthetic_value(asset: &str, row: usize, col: usize) -> f64 {
    let ramp = (row * 7 + col * 3) as f64;
    match asset {
        "HH" => -20.0 + ramp * 0.1,
        "HV" => -26.0 + ramp * 0.05,
        other => 1000.0 + other.len() as f64 * 250.0 + ramp,
    }
}

/// Builds grids the same way the GDAL source does, filled with [`synthetic_value`]
pub struct SyntheticRasters;

impl RasterSource for SyntheticRasters {
    fn stack(&self, items: &[StacItem], assets: &[&str], grid: &GridSpec) -> FuseResult<RasterStack> {
        let (geo_transform, shape) = output_grid(items, grid)?;
        let layers = assets
            .iter()
            .map(|asset| {
                let layer = Array2::from_shape_fn(shape, |(row, col)| synthetic_value(asset, row, col));
                (asset.to_string(), layer)
            })
            .collect();
        RasterStack::from_layers(geo_transform, grid.epsg, layers)
    }
}

/// Granule backed by per-beam columns
#[derive(Clone, Default)]
pub struct MockGranule {
    pub beams: HashMap<String, BeamColumns>,
}

impl MockGranule {
    pub fn with_beam(mut self, beam: &str, columns: BeamColumns) -> Self {
        self.beams.insert(beam.to_string(), columns);
        self
    }
}

impl BeamDataSource for MockGranule {
    fn read_beam(&self, beam: &str) -> FuseResult<Option<BeamColumns>> {
        Ok(self.beams.get(beam).cloned())
    }
}

/// Archive serving in-memory granules under the GEDI02_B collection
#[derive(Default)]
pub struct MockArchive {
    pub granules: Vec<(Granule, MockGranule)>,
    pub logins: Rc<RefCell<usize>>,
    pub searches: Rc<RefCell<Vec<(String, NaiveDate, NaiveDate)>>>,
}

impl MockArchive {
    pub fn with_granule(mut self, id: &str, granule: MockGranule) -> Self {
        let entry = Granule {
            id: id.to_string(),
            data_links: vec![format!("https://data.example.test/{}.h5", id)],
        };
        self.granules.push((entry, granule));
        self
    }
}

impl GranuleArchive for MockArchive {
    fn login(&mut self) -> FuseResult<()> {
        *self.logins.borrow_mut() += 1;
        Ok(())
    }

    fn collection_ids(&self, query: &CollectionQuery) -> FuseResult<HashMap<String, String>> {
        assert_eq!(query.keyword, "GEDI");
        assert_eq!(query.version, "002");
        assert_eq!(query.provider, "LPCLOUD");
        Ok(HashMap::from([
            ("GEDI02_A".to_string(), "C-L2A".to_string()),
            ("GEDI02_B".to_string(), "C-L2B".to_string()),
        ]))
    }

    fn search_granules(
        &self,
        concept_id: &str,
        temporal: (NaiveDate, NaiveDate),
        _bbox: &BoundingBox,
    ) -> FuseResult<Vec<Granule>> {
        self.searches
            .borrow_mut()
            .push((concept_id.to_string(), temporal.0, temporal.1));
        Ok(self.granules.iter().map(|(g, _)| g.clone()).collect())
    }

    fn open(&self, granule: &Granule) -> FuseResult<Box<dyn BeamDataSource>> {
        let (_, data) = self
            .granules
            .iter()
            .find(|(g, _)| g.id == granule.id)
            .ok_or_else(|| canopyfuse::FuseError::Processing(format!("unknown granule {}", granule.id)))?;
        Ok(Box::new(data.clone()))
    }
}

/// Beam with one shot per `(lon, lat, height_cm, quality, sensitivity)` tuple
pub fn beam(first_shot: u64, shots: &[(f64, f64, f64, u8, f64)]) -> BeamColumns {
    BeamColumns {
        shot_number: (0..shots.len() as u64).map(|i| first_shot + i).collect(),
        longitude: shots.iter().map(|s| s.0).collect(),
        latitude: shots.iter().map(|s| s.1).collect(),
        canopy_height: shots.iter().map(|s| s.2).collect(),
        quality: shots.iter().map(|s| s.3).collect(),
        sensitivity: shots.iter().map(|s| s.4).collect(),
        cover: vec![0.5; shots.len()],
    }
}

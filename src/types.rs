use chrono::{Datelike, NaiveDate};
use geo_types::Point;
use ndarray::{s, Array2, Array3, ArrayView2, Axis};
use serde::{Deserialize, Serialize};

/// Area of interest in WGS84 degrees
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub min_lon: f64,
    pub min_lat: f64,
    pub max_lon: f64,
    pub max_lat: f64,
}

impl BoundingBox {
    /// Create a validated bounding box (west, south, east, north)
    pub fn new(min_lon: f64, min_lat: f64, max_lon: f64, max_lat: f64) -> FuseResult<Self> {
        let in_range = (-180.0..=180.0).contains(&min_lon)
            && (-180.0..=180.0).contains(&max_lon)
            && (-90.0..=90.0).contains(&min_lat)
            && (-90.0..=90.0).contains(&max_lat);

        if !in_range {
            return Err(FuseError::InvalidConfig(format!(
                "bounding box [{}, {}, {}, {}] is outside WGS84 limits",
                min_lon, min_lat, max_lon, max_lat
            )));
        }
        if min_lon >= max_lon || min_lat >= max_lat {
            return Err(FuseError::InvalidConfig(format!(
                "bounding box [{}, {}, {}, {}] has no extent",
                min_lon, min_lat, max_lon, max_lat
            )));
        }

        Ok(Self { min_lon, min_lat, max_lon, max_lat })
    }

    /// Inclusive point-in-box test
    pub fn contains(&self, lon: f64, lat: f64) -> bool {
        lat >= self.min_lat && lat <= self.max_lat && lon >= self.min_lon && lon <= self.max_lon
    }

    /// `[west, south, east, north]`, the order used by STAC and CMR
    pub fn as_array(&self) -> [f64; 4] {
        [self.min_lon, self.min_lat, self.max_lon, self.max_lat]
    }
}

impl TryFrom<(f64, f64, f64, f64)> for BoundingBox {
    type Error = FuseError;

    fn try_from(value: (f64, f64, f64, f64)) -> FuseResult<Self> {
        Self::new(value.0, value.1, value.2, value.3)
    }
}

/// Temporal window for the optical search
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateRange {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl DateRange {
    /// Parse two ISO dates (`YYYY-MM-DD`)
    pub fn new(start_date: &str, end_date: &str) -> FuseResult<Self> {
        let start = parse_iso_date(start_date)?;
        let end = parse_iso_date(end_date)?;

        if end < start {
            return Err(FuseError::InvalidConfig(format!(
                "end date {} precedes start date {}",
                end, start
            )));
        }

        Ok(Self { start, end })
    }

    /// Calendar year of the start date, used for the radar and LiDAR queries
    pub fn year(&self) -> i32 {
        self.start.year()
    }

    /// STAC datetime interval `start/end`
    pub fn stac_interval(&self) -> String {
        format!("{}/{}", self.start.format("%Y-%m-%d"), self.end.format("%Y-%m-%d"))
    }

    /// STAC datetime interval covering the start year, `YYYY/YYYY`
    pub fn year_interval(&self) -> String {
        format!("{0}/{0}", self.year())
    }

    /// First and last day of the start year
    pub fn year_bounds(&self) -> (NaiveDate, NaiveDate) {
        let year = self.year();
        // January 1st and December 31st exist for every year chrono can represent
        let first = NaiveDate::from_ymd_opt(year, 1, 1).unwrap_or(self.start);
        let last = NaiveDate::from_ymd_opt(year, 12, 31).unwrap_or(self.start);
        (first, last)
    }
}

fn parse_iso_date(value: &str) -> FuseResult<NaiveDate> {
    NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .map_err(|e| FuseError::InvalidConfig(format!("invalid date '{}': {}", value, e)))
}

/// Target projection and pixel size for every materialised raster
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GridSpec {
    pub epsg: u32,
    /// Pixel size in map units (metres for UTM)
    pub resolution: f64,
}

/// Geospatial transformation parameters
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoTransform {
    pub top_left_x: f64,
    pub pixel_width: f64,
    pub rotation_x: f64,
    pub top_left_y: f64,
    pub rotation_y: f64,
    pub pixel_height: f64,
}

impl GeoTransform {
    /// North-up transform with square pixels
    pub fn north_up(top_left_x: f64, top_left_y: f64, resolution: f64) -> Self {
        Self {
            top_left_x,
            pixel_width: resolution,
            rotation_x: 0.0,
            top_left_y,
            rotation_y: 0.0,
            pixel_height: -resolution,
        }
    }

    /// GDAL coefficient order
    pub fn to_gdal(&self) -> [f64; 6] {
        [
            self.top_left_x,
            self.pixel_width,
            self.rotation_x,
            self.top_left_y,
            self.rotation_y,
            self.pixel_height,
        ]
    }

    pub fn from_gdal(gt: [f64; 6]) -> Self {
        Self {
            top_left_x: gt[0],
            pixel_width: gt[1],
            rotation_x: gt[2],
            top_left_y: gt[3],
            rotation_y: gt[4],
            pixel_height: gt[5],
        }
    }

    /// Map coordinates of the centre of pixel (row, col)
    pub fn pixel_center(&self, row: usize, col: usize) -> (f64, f64) {
        let c = col as f64 + 0.5;
        let r = row as f64 + 0.5;
        (
            self.top_left_x + c * self.pixel_width + r * self.rotation_x,
            self.top_left_y + c * self.rotation_y + r * self.pixel_height,
        )
    }
}

/// Multi-band gridded array laid out as (band, y, x)
#[derive(Debug, Clone)]
pub struct RasterStack {
    bands: Vec<String>,
    data: Array3<f64>,
    pub geo_transform: GeoTransform,
    pub epsg: u32,
}

impl RasterStack {
    pub fn new(
        bands: Vec<String>,
        data: Array3<f64>,
        geo_transform: GeoTransform,
        epsg: u32,
    ) -> FuseResult<Self> {
        if bands.len() != data.len_of(Axis(0)) {
            return Err(FuseError::Processing(format!(
                "{} band labels for {} bands of data",
                bands.len(),
                data.len_of(Axis(0))
            )));
        }
        Ok(Self { bands, data, geo_transform, epsg })
    }

    /// Assemble a stack from labelled single-band layers sharing one grid
    pub fn from_layers(
        geo_transform: GeoTransform,
        epsg: u32,
        layers: Vec<(String, Array2<f64>)>,
    ) -> FuseResult<Self> {
        let Some((_, first)) = layers.first() else {
            return Err(FuseError::Processing("cannot build a raster stack without layers".to_string()));
        };
        let (height, width) = first.dim();

        let mut data = Array3::from_elem((layers.len(), height, width), f64::NAN);
        let mut bands = Vec::with_capacity(layers.len());
        for (i, (name, layer)) in layers.into_iter().enumerate() {
            if layer.dim() != (height, width) {
                return Err(FuseError::GridMismatch(format!(
                    "layer '{}' is {:?}, expected {:?}",
                    name,
                    layer.dim(),
                    (height, width)
                )));
            }
            data.slice_mut(s![i, .., ..]).assign(&layer);
            bands.push(name);
        }

        Ok(Self { bands, data, geo_transform, epsg })
    }

    /// Concatenate stacks along the band dimension; all grids must match exactly
    pub fn concat(stacks: &[RasterStack]) -> FuseResult<RasterStack> {
        let Some(first) = stacks.first() else {
            return Err(FuseError::Processing("nothing to concatenate".to_string()));
        };

        for other in &stacks[1..] {
            if other.epsg != first.epsg {
                return Err(FuseError::GridMismatch(format!(
                    "EPSG:{} vs EPSG:{}",
                    first.epsg, other.epsg
                )));
            }
            if other.geo_transform != first.geo_transform || other.grid_shape() != first.grid_shape() {
                return Err(FuseError::GridMismatch(format!(
                    "{:?} at {:?} vs {:?} at {:?}",
                    first.grid_shape(),
                    first.geo_transform,
                    other.grid_shape(),
                    other.geo_transform
                )));
            }
        }

        let views: Vec<_> = stacks.iter().map(|s| s.data.view()).collect();
        let data = ndarray::concatenate(Axis(0), &views)
            .map_err(|e| FuseError::GridMismatch(format!("failed to concatenate bands: {}", e)))?;
        let bands = stacks.iter().flat_map(|s| s.bands.iter().cloned()).collect();

        Ok(RasterStack {
            bands,
            data,
            geo_transform: first.geo_transform,
            epsg: first.epsg,
        })
    }

    pub fn band_names(&self) -> &[String] {
        &self.bands
    }

    pub fn band_index(&self, name: &str) -> Option<usize> {
        self.bands.iter().position(|b| b == name)
    }

    /// View of a single band by label
    pub fn band(&self, name: &str) -> FuseResult<ArrayView2<'_, f64>> {
        let index = self
            .band_index(name)
            .ok_or_else(|| FuseError::MissingBand(name.to_string()))?;
        Ok(self.data.index_axis(Axis(0), index))
    }

    pub fn data(&self) -> &Array3<f64> {
        &self.data
    }

    pub fn into_data(self) -> Array3<f64> {
        self.data
    }

    /// (bands, height, width)
    pub fn shape(&self) -> (usize, usize, usize) {
        self.data.dim()
    }

    /// (height, width)
    pub fn grid_shape(&self) -> (usize, usize) {
        let (_, h, w) = self.data.dim();
        (h, w)
    }

    /// (min_x, min_y, max_x, max_y) in map units
    pub fn bounds(&self) -> (f64, f64, f64, f64) {
        let (h, w) = self.grid_shape();
        let gt = &self.geo_transform;
        let x0 = gt.top_left_x;
        let x1 = gt.top_left_x + w as f64 * gt.pixel_width;
        let y0 = gt.top_left_y;
        let y1 = gt.top_left_y + h as f64 * gt.pixel_height;
        (x0.min(x1), y0.min(y1), x0.max(x1), y0.max(y1))
    }
}

/// One LiDAR shot. `canopy_height` is in centimetres as read, metres after scaling.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Footprint {
    pub shot_number: u64,
    #[serde(rename = "Latitude")]
    pub latitude: f64,
    #[serde(rename = "Longitude")]
    pub longitude: f64,
    pub canopy_height: f64,
    /// L2B quality flag (1 = usable). Older exports call this column `quality_flag`.
    #[serde(alias = "quality_flag")]
    pub quality: u8,
    pub sensitivity: f64,
    pub tree_cover: f64,
    pub beam: String,
}

impl Footprint {
    /// Point geometry in EPSG:4326 (x = longitude, y = latitude)
    pub fn geometry(&self) -> Point<f64> {
        Point::new(self.longitude, self.latitude)
    }
}

/// Flat footprint table, one row per shot
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FootprintTable {
    rows: Vec<Footprint>,
}

impl FootprintTable {
    /// CRS of the attached point geometries
    pub const EPSG: u32 = 4326;

    pub fn new(rows: Vec<Footprint>) -> Self {
        Self { rows }
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Footprint> {
        self.rows.iter()
    }

    pub fn rows(&self) -> &[Footprint] {
        &self.rows
    }

    pub fn rows_mut(&mut self) -> &mut [Footprint] {
        &mut self.rows
    }

    pub fn into_rows(self) -> Vec<Footprint> {
        self.rows
    }

    pub fn retain<F: FnMut(&Footprint) -> bool>(&mut self, f: F) {
        self.rows.retain(f);
    }

    /// Rows whose position falls inside `bbox` (edges inclusive)
    pub fn within(mut self, bbox: &BoundingBox) -> Self {
        self.rows.retain(|r| bbox.contains(r.longitude, r.latitude));
        self
    }

    pub fn extend(&mut self, rows: impl IntoIterator<Item = Footprint>) {
        self.rows.extend(rows);
    }
}

impl FromIterator<Footprint> for FootprintTable {
    fn from_iter<I: IntoIterator<Item = Footprint>>(iter: I) -> Self {
        Self { rows: iter.into_iter().collect() }
    }
}

/// Why a catalog search produced nothing usable
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MissingReason {
    NoLandsatScenes,
    NoAlosMosaics,
}

impl MissingReason {
    /// Machine-readable reason code
    pub fn code(&self) -> &'static str {
        match self {
            MissingReason::NoLandsatScenes => "no_landsat_scenes",
            MissingReason::NoAlosMosaics => "no_alos_mosaics",
        }
    }
}

impl std::fmt::Display for MissingReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MissingReason::NoLandsatScenes => write!(f, "No Landsat scenes found"),
            MissingReason::NoAlosMosaics => write!(f, "No ALOS PALSAR scenes found"),
        }
    }
}

/// Outcome of a retrieval that may legitimately find nothing
#[derive(Debug, Clone)]
pub enum Retrieval<T> {
    Found(T),
    Missing(MissingReason),
}

impl<T> Retrieval<T> {
    pub fn is_found(&self) -> bool {
        matches!(self, Retrieval::Found(_))
    }

    pub fn found(self) -> Option<T> {
        match self {
            Retrieval::Found(value) => Some(value),
            Retrieval::Missing(_) => None,
        }
    }

    pub fn missing_reason(&self) -> Option<MissingReason> {
        match self {
            Retrieval::Found(_) => None,
            Retrieval::Missing(reason) => Some(*reason),
        }
    }

    /// Turn a soft failure into [`FuseError::SceneUnavailable`]
    pub fn into_result(self) -> FuseResult<T> {
        match self {
            Retrieval::Found(value) => Ok(value),
            Retrieval::Missing(reason) => Err(FuseError::SceneUnavailable(reason)),
        }
    }
}

/// Error types for acquisition and fusion
#[derive(Debug, thiserror::Error)]
pub enum FuseError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("GDAL error: {0}")]
    Gdal(#[from] gdal::errors::GdalError),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Invalid geometry: {0}")]
    InvalidGeometry(String),

    #[error("Unsupported CRS: EPSG:{0}")]
    UnsupportedCrs(u32),

    #[error("Scene footprints do not intersect")]
    EmptyIntersection,

    #[error("Raster grids differ: {0}")]
    GridMismatch(String),

    #[error("Band not found: {0}")]
    MissingBand(String),

    #[error("Scene unavailable: {0} ({code})", code = .0.code())]
    SceneUnavailable(MissingReason),

    #[error("Collection not found: {0}")]
    CollectionNotFound(String),

    #[error("Authentication error: {0}")]
    Auth(String),

    #[error("Processing error: {0}")]
    Processing(String),
}

/// Result type for acquisition and fusion operations
pub type FuseResult<T> = Result<T, FuseError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bounding_box_validation() {
        assert!(BoundingBox::new(77.0, 12.0, 77.5, 12.5).is_ok());
        assert!(BoundingBox::new(77.5, 12.0, 77.0, 12.5).is_err());
        assert!(BoundingBox::new(77.0, 12.0, 77.5, 95.0).is_err());
        assert!(BoundingBox::try_from((-181.0, 0.0, 1.0, 1.0)).is_err());
    }

    #[test]
    fn test_bounding_box_contains_edges() {
        let bbox = BoundingBox::new(77.0, 12.0, 77.5, 12.5).unwrap();
        assert!(bbox.contains(77.0, 12.0));
        assert!(bbox.contains(77.5, 12.5));
        assert!(bbox.contains(77.25, 12.25));
        assert!(!bbox.contains(77.51, 12.25));
        assert!(!bbox.contains(77.25, 11.99));
        assert_eq!(bbox.as_array(), [77.0, 12.0, 77.5, 12.5]);
    }

    #[test]
    fn test_date_range() {
        let dates = DateRange::new("2021-01-01", "2021-03-01").unwrap();
        assert_eq!(dates.year(), 2021);
        assert_eq!(dates.stac_interval(), "2021-01-01/2021-03-01");
        assert_eq!(dates.year_interval(), "2021/2021");

        let (first, last) = dates.year_bounds();
        assert_eq!(first.to_string(), "2021-01-01");
        assert_eq!(last.to_string(), "2021-12-31");

        assert!(DateRange::new("2021-03-01", "2021-01-01").is_err());
        assert!(DateRange::new("2021/01/01", "2021-03-01").is_err());
    }

    #[test]
    fn test_pixel_center() {
        let gt = GeoTransform::north_up(600_000.0, 1_400_000.0, 30.0);
        assert_eq!(gt.pixel_center(0, 0), (600_015.0, 1_399_985.0));
        assert_eq!(gt.pixel_center(2, 1), (600_045.0, 1_399_925.0));
        assert_eq!(GeoTransform::from_gdal(gt.to_gdal()), gt);
    }

    #[test]
    fn test_raster_stack_band_lookup() {
        let gt = GeoTransform::north_up(0.0, 90.0, 30.0);
        let stack = RasterStack::from_layers(
            gt,
            32643,
            vec![
                ("red".to_string(), Array2::from_elem((3, 4), 1.0)),
                ("nir08".to_string(), Array2::from_elem((3, 4), 2.0)),
            ],
        )
        .unwrap();

        assert_eq!(stack.shape(), (2, 3, 4));
        assert_eq!(stack.band("nir08").unwrap()[[1, 1]], 2.0);
        assert!(matches!(stack.band("swir16"), Err(FuseError::MissingBand(_))));
        assert_eq!(stack.bounds(), (0.0, 0.0, 120.0, 90.0));
    }

    #[test]
    fn test_concat_rejects_different_grids() {
        let a = RasterStack::from_layers(
            GeoTransform::north_up(0.0, 90.0, 30.0),
            32643,
            vec![("HH".to_string(), Array2::zeros((3, 3)))],
        )
        .unwrap();
        let b = RasterStack::from_layers(
            GeoTransform::north_up(30.0, 90.0, 30.0),
            32643,
            vec![("HV".to_string(), Array2::zeros((3, 3)))],
        )
        .unwrap();

        assert!(matches!(RasterStack::concat(&[a.clone(), b]), Err(FuseError::GridMismatch(_))));

        let c = RasterStack::from_layers(
            GeoTransform::north_up(0.0, 90.0, 30.0),
            32643,
            vec![("HV".to_string(), Array2::ones((3, 3)))],
        )
        .unwrap();
        let combined = RasterStack::concat(&[a, c]).unwrap();
        assert_eq!(combined.band_names(), &["HH".to_string(), "HV".to_string()]);
        assert_eq!(combined.band("HV").unwrap()[[2, 2]], 1.0);
    }

    #[test]
    fn test_footprint_quality_flag_alias() {
        let csv_data = "shot_number,Latitude,Longitude,canopy_height,quality_flag,sensitivity,tree_cover,beam\n\
                        1,12.1,77.1,1500,1,0.98,0.4,BEAM0101\n";
        let mut reader = csv::Reader::from_reader(csv_data.as_bytes());
        let row: Footprint = reader.deserialize().next().unwrap().unwrap();
        assert_eq!(row.quality, 1);
        assert_eq!(row.geometry(), Point::new(77.1, 12.1));
    }

    #[test]
    fn test_missing_reason_codes() {
        let missing: Retrieval<()> = Retrieval::Missing(MissingReason::NoAlosMosaics);
        assert_eq!(missing.missing_reason().map(|r| r.code()), Some("no_alos_mosaics"));
        assert!(matches!(
            missing.into_result(),
            Err(FuseError::SceneUnavailable(MissingReason::NoAlosMosaics))
        ));
    }
}

//! Acquisition and fusion settings

use crate::types::{BoundingBox, DateRange, GridSpec};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Planetary Computer STAC API root
pub const PLANETARY_COMPUTER_STAC: &str = "https://planetarycomputer.microsoft.com/api/stac/v1";

/// Planetary Computer SAS token service
pub const PLANETARY_COMPUTER_SAS: &str = "https://planetarycomputer.microsoft.com/api/sas/v1/token";

/// NASA Common Metadata Repository search root
pub const CMR_SEARCH_URL: &str = "https://cmr.earthdata.nasa.gov/search";

/// Earthdata Login (URS) root
pub const URS_URL: &str = "https://urs.earthdata.nasa.gov";

pub const LANDSAT_COLLECTION: &str = "landsat-c2-l2";

/// Landsat 8 and 9 OLI/TIRS scene id prefixes
pub const LANDSAT_ID_PREFIXES: [&str; 2] = ["LC08", "LC09"];

pub const LANDSAT_BANDS: [&str; 7] = ["blue", "green", "nir08", "red", "swir16", "swir22", "lwir11"];

pub const ALOS_COLLECTION: &str = "alos-palsar-mosaic";

pub const ALOS_BANDS: [&str; 2] = ["HH", "HV"];

/// WGS 84 / UTM zone 43N
pub const TARGET_EPSG: u32 = 32643;

pub const TARGET_RESOLUTION: f64 = 30.0;

pub const DEFAULT_CLOUD_COVER: u8 = 10;

pub const DEFAULT_MAX_ITEMS: usize = 20;

pub const DEFAULT_MIN_SENSITIVITY: f64 = 0.95;

pub const DEFAULT_EXPORT_PAUSE: Duration = Duration::from_secs(10);

/// Everything the accessor and preprocessor need to run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccessConfig {
    pub bbox: BoundingBox,
    pub dates: DateRange,
    /// Optical scenes must have `eo:cloud_cover` strictly below this percentage
    pub cloud_cover: u8,
    /// Cap on catalog items fetched for the optical search
    pub max_items: usize,
    pub grid: GridSpec,
    pub stac_url: String,
    /// Sign asset hrefs with Planetary Computer SAS tokens
    pub sign_assets: bool,
    pub cmr_url: String,
    pub urs_url: String,
    /// LiDAR shots need sensitivity strictly above this value
    pub min_sensitivity: f64,
    /// Delay between successive CSV exports
    pub export_pause: Duration,
    /// Where downloaded GEDI granules are cached
    pub download_dir: PathBuf,
}

impl AccessConfig {
    /// Defaults for everything except the area and dates
    pub fn new(bbox: BoundingBox, start_date: &str, end_date: &str) -> crate::types::FuseResult<Self> {
        Ok(Self {
            bbox,
            dates: DateRange::new(start_date, end_date)?,
            cloud_cover: DEFAULT_CLOUD_COVER,
            max_items: DEFAULT_MAX_ITEMS,
            grid: GridSpec {
                epsg: TARGET_EPSG,
                resolution: TARGET_RESOLUTION,
            },
            stac_url: PLANETARY_COMPUTER_STAC.to_string(),
            sign_assets: true,
            cmr_url: CMR_SEARCH_URL.to_string(),
            urs_url: URS_URL.to_string(),
            min_sensitivity: DEFAULT_MIN_SENSITIVITY,
            export_pause: DEFAULT_EXPORT_PAUSE,
            download_dir: default_download_dir(),
        })
    }

    pub fn with_cloud_cover(mut self, cloud_cover: u8) -> Self {
        self.cloud_cover = cloud_cover;
        self
    }

    pub fn with_max_items(mut self, max_items: usize) -> Self {
        self.max_items = max_items;
        self
    }

    pub fn with_resolution(mut self, resolution: f64) -> Self {
        self.grid.resolution = resolution;
        self
    }

    pub fn with_stac_url(mut self, url: impl Into<String>, sign_assets: bool) -> Self {
        self.stac_url = url.into();
        self.sign_assets = sign_assets;
        self
    }

    pub fn with_export_pause(mut self, pause: Duration) -> Self {
        self.export_pause = pause;
        self
    }

    pub fn with_download_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.download_dir = dir.into();
        self
    }

    /// Calendar year used by the radar and LiDAR searches
    pub fn year(&self) -> i32 {
        self.dates.year()
    }
}

fn default_download_dir() -> PathBuf {
    dirs::cache_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join("canopyfuse")
        .join("gedi")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let bbox = BoundingBox::new(77.0, 12.0, 77.5, 12.5).unwrap();
        let config = AccessConfig::new(bbox, "2021-01-01", "2021-03-01").unwrap();

        assert_eq!(config.cloud_cover, 10);
        assert_eq!(config.max_items, 20);
        assert_eq!(config.grid.epsg, 32643);
        assert_eq!(config.grid.resolution, 30.0);
        assert_eq!(config.year(), 2021);
        assert_eq!(config.export_pause, Duration::from_secs(10));
        assert!(config.download_dir.ends_with("canopyfuse/gedi"));
    }

    #[test]
    fn test_builders() {
        let bbox = BoundingBox::new(77.0, 12.0, 77.5, 12.5).unwrap();
        let config = AccessConfig::new(bbox, "2021-01-01", "2021-03-01")
            .unwrap()
            .with_cloud_cover(20)
            .with_resolution(60.0)
            .with_export_pause(Duration::ZERO);

        assert_eq!(config.cloud_cover, 20);
        assert_eq!(config.grid.resolution, 60.0);
        assert_eq!(config.export_pause, Duration::ZERO);
    }

    #[test]
    fn test_rejects_bad_dates() {
        let bbox = BoundingBox::new(77.0, 12.0, 77.5, 12.5).unwrap();
        assert!(AccessConfig::new(bbox, "2021-13-01", "2021-03-01").is_err());
    }
}

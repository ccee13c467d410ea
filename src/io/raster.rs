use crate::core::geometry::{transform_point_2d, wgs84_transform};
use crate::io::stac::StacItem;
use crate::types::{FuseError, FuseResult, GeoTransform, GridSpec, RasterStack};
use gdal::raster::Buffer;
use gdal::spatial_ref::SpatialRef;
use gdal::{Dataset, DriverManager};
use ndarray::{Array2, Zip};

/// Raster materialisation port: turns catalog items into a labelled stack on a fixed grid
pub trait RasterSource {
    /// One output band per asset key. Items are mosaicked in order; the first
    /// valid pixel wins.
    fn stack(&self, items: &[StacItem], assets: &[&str], grid: &GridSpec) -> FuseResult<RasterStack>;
}

/// Reads cloud-optimised GeoTIFF assets over `/vsicurl/` and warps them with GDAL
pub struct GdalRasterSource;

impl GdalRasterSource {
    pub fn new() -> Self {
        Self
    }

    /// Warp one asset onto the output grid; pixels the source does not cover stay NaN
    fn warp_asset(
        href: &str,
        geo_transform: &GeoTransform,
        shape: (usize, usize),
        target_srs: &SpatialRef,
    ) -> FuseResult<Array2<f64>> {
        let (height, width) = shape;
        let vsi_path = if href.starts_with("http") {
            format!("/vsicurl/{}", href)
        } else {
            href.to_string()
        };

        log::debug!("Warping {} onto {}x{} grid", vsi_path, width, height);
        let source = Dataset::open(&vsi_path)?;

        let driver = DriverManager::get_driver_by_name("MEM")?;
        let mut target = driver.create_with_band_type::<f64, _>("", width as _, height as _, 1)?;
        target.set_geo_transform(&geo_transform.to_gdal())?;
        target.set_spatial_ref(target_srs)?;
        {
            let mut band = target.rasterband(1)?;
            band.set_no_data_value(Some(f64::NAN))?;
            let mut empty = Buffer::new((width, height), vec![f64::NAN; width * height]);
            band.write((0, 0), (width, height), &mut empty)?;
        }

        gdal::raster::reproject(&source, &target)?;

        let band = target.rasterband(1)?;
        let buffer = band.read_as::<f64>((0, 0), (width, height), (width, height), None)?;
        Array2::from_shape_vec((height, width), buffer.into_shape_and_vec().1)
            .map_err(|e| FuseError::Processing(format!("Failed to reshape warped raster: {}", e)))
    }
}

impl Default for GdalRasterSource {
    fn default() -> Self {
        Self::new()
    }
}

impl RasterSource for GdalRasterSource {
    fn stack(&self, items: &[StacItem], assets: &[&str], grid: &GridSpec) -> FuseResult<RasterStack> {
        let (geo_transform, shape) = output_grid(items, grid)?;
        let target_srs = SpatialRef::from_epsg(grid.epsg)?;
        log::info!(
            "Stacking {} item(s), bands {:?}, on EPSG:{} at {} m ({}x{} pixels)",
            items.len(),
            assets,
            grid.epsg,
            grid.resolution,
            shape.1,
            shape.0
        );

        let mut layers = Vec::with_capacity(assets.len());
        for asset in assets {
            let mut mosaic = Array2::from_elem(shape, f64::NAN);
            for item in items {
                let href = &item
                    .asset(asset)
                    .ok_or_else(|| FuseError::MissingBand(format!("{} in item {}", asset, item.id)))?
                    .href;
                let warped = Self::warp_asset(href, &geo_transform, shape, &target_srs)?;
                fill_missing(&mut mosaic, &warped);
            }
            layers.push((asset.to_string(), mosaic));
        }

        RasterStack::from_layers(geo_transform, grid.epsg, layers)
    }
}

/// Copy `source` into the NaN holes of `mosaic`
pub fn fill_missing(mosaic: &mut Array2<f64>, source: &Array2<f64>) {
    Zip::from(mosaic).and(source).for_each(|m, &s| {
        if m.is_nan() {
            *m = s;
        }
    });
}

/// Output grid covering the union of the items' extents, snapped outward to
/// whole multiples of the resolution
pub fn output_grid(items: &[StacItem], grid: &GridSpec) -> FuseResult<(GeoTransform, (usize, usize))> {
    let transform = wgs84_transform(grid.epsg)?;

    let mut min_x = f64::MAX;
    let mut min_y = f64::MAX;
    let mut max_x = f64::MIN;
    let mut max_y = f64::MIN;

    for item in items {
        let bbox = item
            .bbox
            .as_ref()
            .filter(|b| b.len() >= 4)
            .ok_or_else(|| FuseError::InvalidGeometry(format!("item {} has no bbox", item.id)))?;

        let corners = [(bbox[0], bbox[1]), (bbox[0], bbox[3]), (bbox[2], bbox[1]), (bbox[2], bbox[3])];
        for &(lon, lat) in &corners {
            let (e, n) = transform_point_2d(&transform, lon, lat)?;
            min_x = min_x.min(e);
            min_y = min_y.min(n);
            max_x = max_x.max(e);
            max_y = max_y.max(n);
        }
    }

    if min_x > max_x || min_y > max_y {
        return Err(FuseError::Processing("no items to stack".to_string()));
    }

    let res = grid.resolution;
    let left = (min_x / res).floor() * res;
    let bottom = (min_y / res).floor() * res;
    let right = (max_x / res).ceil() * res;
    let top = (max_y / res).ceil() * res;

    let width = ((right - left) / res).round() as usize;
    let height = ((top - bottom) / res).round() as usize;

    Ok((GeoTransform::north_up(left, top, res), (height, width)))
}

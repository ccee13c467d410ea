//! Scene footprints: GeoJSON parsing, reprojection, intersection and raster clipping

use crate::types::{FuseError, FuseResult, GeoTransform, RasterStack};
use gdal::spatial_ref::{AxisMappingStrategy, CoordTransform, CoordTransformOptions, SpatialRef};
use geo::{Area, BooleanOps, BoundingRect, Contains, MapCoords};
use geo_types::{Coord, Geometry, MultiPolygon, Point};
use ndarray::{s, Array3};

/// WGS84 lon/lat to `epsg`, exact (no ballpark fallback)
pub fn wgs84_transform(epsg: u32) -> FuseResult<CoordTransform> {
    let mut source = SpatialRef::from_epsg(4326)?;
    source.set_axis_mapping_strategy(AxisMappingStrategy::TraditionalGisOrder);
    let mut target = SpatialRef::from_epsg(epsg).map_err(|_| FuseError::UnsupportedCrs(epsg))?;
    target.set_axis_mapping_strategy(AxisMappingStrategy::TraditionalGisOrder);

    let mut options = CoordTransformOptions::new()?;
    options.desired_accuracy(0.0);
    options.set_ballpark_allowed(false);
    Ok(CoordTransform::new_with_options(&source, &target, &options)?)
}

pub fn transform_point_2d(transform: &CoordTransform, x: f64, y: f64) -> FuseResult<(f64, f64)> {
    let mut ax = [x];
    let mut ay = [y];
    let mut az: [f64; 0] = [];
    transform.transform_coords(&mut ax, &mut ay, &mut az)?;
    Ok((ax[0], ay[0]))
}

/// Parse a STAC item geometry (GeoJSON Polygon or MultiPolygon, WGS84)
pub fn footprint_polygon(geometry: &serde_json::Value) -> FuseResult<MultiPolygon<f64>> {
    let geojson = geojson::Geometry::from_json_value(geometry.clone())
        .map_err(|e| FuseError::InvalidGeometry(e.to_string()))?;
    let geom: Geometry<f64> = geojson
        .try_into()
        .map_err(|e: geojson::Error| FuseError::InvalidGeometry(e.to_string()))?;

    match geom {
        Geometry::Polygon(polygon) => Ok(MultiPolygon::new(vec![polygon])),
        Geometry::MultiPolygon(multi) => Ok(multi),
        other => Err(FuseError::InvalidGeometry(format!(
            "expected a polygonal footprint, got {:?}",
            other
        ))),
    }
}

/// Project a WGS84 footprint into `epsg`
pub fn project_footprint(footprint: &MultiPolygon<f64>, epsg: u32) -> FuseResult<MultiPolygon<f64>> {
    let transform = wgs84_transform(epsg)?;
    footprint.try_map_coords(|c| {
        let (x, y) = transform_point_2d(&transform, c.x, c.y)?;
        Ok::<_, FuseError>(Coord { x, y })
    })
}

/// Intersection of two footprints in the same planar CRS
pub fn common_area(a: &MultiPolygon<f64>, b: &MultiPolygon<f64>) -> FuseResult<MultiPolygon<f64>> {
    let area = a.intersection(b);
    if area.0.is_empty() || area.unsigned_area() <= 0.0 {
        return Err(FuseError::EmptyIntersection);
    }
    Ok(area)
}

/// Clip a stack to `area`.
///
/// The result covers the area's bounding window on the stack's own pixel grid
/// (pixels outside the stack are NaN-padded, so two stacks on the same grid
/// clip to identical shapes). Pixels whose centre lies outside `area` are NaN.
pub fn clip_to_area(stack: &RasterStack, area: &MultiPolygon<f64>) -> FuseResult<RasterStack> {
    let rect = area.bounding_rect().ok_or(FuseError::EmptyIntersection)?;
    let gt = stack.geo_transform;
    if gt.rotation_x != 0.0 || gt.rotation_y != 0.0 {
        return Err(FuseError::Processing("rotated grids cannot be clipped".to_string()));
    }

    let res_x = gt.pixel_width;
    let res_y = -gt.pixel_height;

    // window in the stack's pixel space, possibly extending past its edges
    let col0 = ((rect.min().x - gt.top_left_x) / res_x).floor() as i64;
    let col1 = ((rect.max().x - gt.top_left_x) / res_x).ceil() as i64;
    let row0 = ((gt.top_left_y - rect.max().y) / res_y).floor() as i64;
    let row1 = ((gt.top_left_y - rect.min().y) / res_y).ceil() as i64;

    let (bands, height, width) = stack.shape();
    let overlap_c0 = col0.max(0);
    let overlap_c1 = col1.min(width as i64);
    let overlap_r0 = row0.max(0);
    let overlap_r1 = row1.min(height as i64);

    if overlap_c0 >= overlap_c1 || overlap_r0 >= overlap_r1 {
        return Err(FuseError::EmptyIntersection);
    }

    let out_w = (col1 - col0) as usize;
    let out_h = (row1 - row0) as usize;
    let out_gt = GeoTransform::north_up(
        gt.top_left_x + col0 as f64 * res_x,
        gt.top_left_y - row0 as f64 * res_y,
        res_x,
    );

    let mut data = Array3::from_elem((bands, out_h, out_w), f64::NAN);
    let src = stack.data().slice(s![
        ..,
        overlap_r0 as usize..overlap_r1 as usize,
        overlap_c0 as usize..overlap_c1 as usize
    ]);
    data.slice_mut(s![
        ..,
        (overlap_r0 - row0) as usize..(overlap_r1 - row0) as usize,
        (overlap_c0 - col0) as usize..(overlap_c1 - col0) as usize
    ])
    .assign(&src);

    for row in 0..out_h {
        for col in 0..out_w {
            let (x, y) = out_gt.pixel_center(row, col);
            if !area.contains(&Point::new(x, y)) {
                data.slice_mut(s![.., row, col]).fill(f64::NAN);
            }
        }
    }

    log::debug!(
        "Clipped {}x{} grid to {}x{} window at ({}, {})",
        width,
        height,
        out_w,
        out_h,
        col0,
        row0
    );

    RasterStack::new(stack.band_names().to_vec(), data, out_gt, stack.epsg)
}

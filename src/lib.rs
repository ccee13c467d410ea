//! canopyfuse: multi-sensor acquisition and fusion for canopy mapping
//!
//! Fetches Landsat 8/9 Level-2 scenes and ALOS PALSAR mosaics from a STAC API,
//! clips them to their common footprint and derives a 17-band stack of rescaled
//! reflectance, backscatter and normalized-difference indices. GEDI L2B shots are
//! pulled from NASA Earthdata and screened by quality and sensitivity.

pub mod config;
pub mod core;
pub mod io;
pub mod types;

// Re-export main types and functions for easier access
pub use config::AccessConfig;
pub use crate::core::{DataAccessor, FusedScene, Preprocessor, Scene, SpectralIndex};
pub use types::{
    BoundingBox, DateRange, Footprint, FootprintTable, FuseError, FuseResult, GeoTransform, GridSpec,
    MissingReason, RasterStack, Retrieval,
};

#[cfg(feature = "python")]
mod python {
    use crate::config::AccessConfig;
    use crate::core::Preprocessor;
    use crate::types::{BoundingBox, FuseError};
    use numpy::PyArray3;
    use pyo3::prelude::*;
    use pyo3::types::PyDict;
    use std::path::Path;

    fn to_py_err(e: FuseError) -> PyErr {
        PyErr::new::<pyo3::exceptions::PyRuntimeError, _>(format!("{}", e))
    }

    fn to_bbox(bounds: (f64, f64, f64, f64)) -> PyResult<BoundingBox> {
        BoundingBox::try_from(bounds).map_err(|e| PyErr::new::<pyo3::exceptions::PyValueError, _>(format!("{}", e)))
    }

    /// Python wrapper for Preprocessor
    #[pyclass(name = "Preprocessor", unsendable)]
    pub struct PyPreprocessor {
        inner: Preprocessor,
    }

    #[pymethods]
    impl PyPreprocessor {
        #[new]
        #[pyo3(signature = (bbox, start_date, end_date, cloud_cover = 10))]
        fn new(bbox: (f64, f64, f64, f64), start_date: &str, end_date: &str, cloud_cover: u8) -> PyResult<Self> {
            let config = AccessConfig::new(to_bbox(bbox)?, start_date, end_date)
                .map_err(to_py_err)?
                .with_cloud_cover(cloud_cover);
            let inner = Preprocessor::new(config).map_err(to_py_err)?;
            Ok(PyPreprocessor { inner })
        }

        /// Returns (data[band, y, x], band names, GDAL geotransform, EPSG, intersection GeoJSON)
        fn preprocess_satellite_data(
            &self,
            py: Python,
        ) -> PyResult<(Py<PyArray3<f64>>, Vec<String>, [f64; 6], u32, String)> {
            let fused = self.inner.preprocess_satellite_data().map_err(to_py_err)?;
            let intersection = fused.intersection_geojson();
            let names = fused.stack.band_names().to_vec();
            let geo_transform = fused.stack.geo_transform.to_gdal();
            let epsg = fused.stack.epsg;
            let array = PyArray3::from_owned_array(py, fused.stack.into_data());
            Ok((array.to_owned(), names, geo_transform, epsg, intersection))
        }

        /// Filtered GEDI shots as a list of dicts
        fn preprocess_gedi_data(&mut self, py: Python, bounds: (f64, f64, f64, f64)) -> PyResult<Vec<PyObject>> {
            let table = self.inner.preprocess_gedi_data(&to_bbox(bounds)?).map_err(to_py_err)?;
            let mut rows = Vec::with_capacity(table.len());
            for footprint in table.iter() {
                let row = PyDict::new(py);
                row.set_item("shot_number", footprint.shot_number)?;
                row.set_item("Latitude", footprint.latitude)?;
                row.set_item("Longitude", footprint.longitude)?;
                row.set_item("canopy_height", footprint.canopy_height)?;
                row.set_item("quality", footprint.quality)?;
                row.set_item("sensitivity", footprint.sensitivity)?;
                row.set_item("tree_cover", footprint.tree_cover)?;
                row.set_item("beam", &footprint.beam)?;
                rows.push(row.to_object(py));
            }
            Ok(rows)
        }

        /// Writes gedi_file_<index>.csv files and returns their paths
        fn get_gedi_excel(&mut self, bounds: (f64, f64, f64, f64), out_dir: String) -> PyResult<Vec<String>> {
            let paths = self
                .inner
                .get_gedi_excel(&to_bbox(bounds)?, Path::new(&out_dir))
                .map_err(to_py_err)?;
            Ok(paths.iter().map(|p| p.display().to_string()).collect())
        }
    }

    /// Python module definition
    #[pymodule]
    fn _core(_py: Python, m: &PyModule) -> PyResult<()> {
        m.add_class::<PyPreprocessor>()?;
        Ok(())
    }
}

//! GEDI L2B granule reading and CSV export

use crate::types::{Footprint, FuseError, FuseResult};
use gdal::cpl::CslStringList;
use gdal::raster::Group;
use gdal::{Dataset, DatasetOptions, GdalOpenFlags};
use serde::Serialize;
use std::path::Path;

/// The eight beam groups of a GEDI granule
pub const BEAMS: [&str; 8] = [
    "BEAM0000", "BEAM0001", "BEAM0010", "BEAM0011", "BEAM0101", "BEAM0110", "BEAM1000", "BEAM1011",
];

pub const SHOT_NUMBER: &str = "shot_number";
pub const LATITUDE: &str = "geolocation/lat_lowestmode";
pub const LONGITUDE: &str = "geolocation/lon_lowestmode";
pub const CANOPY_HEIGHT: &str = "rh100";
pub const QUALITY_FLAG: &str = "l2b_quality_flag";
pub const SENSITIVITY: &str = "sensitivity";
pub const COVER: &str = "cover";

/// Per-beam columns, one entry per shot
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BeamColumns {
    pub shot_number: Vec<u64>,
    pub latitude: Vec<f64>,
    pub longitude: Vec<f64>,
    /// centimetres
    pub canopy_height: Vec<f64>,
    pub quality: Vec<u8>,
    pub sensitivity: Vec<f64>,
    pub cover: Vec<f64>,
}

impl BeamColumns {
    pub fn len(&self) -> usize {
        self.shot_number.len()
    }

    pub fn is_empty(&self) -> bool {
        self.shot_number.is_empty()
    }

    /// Turn columns into rows labelled with `beam`; every column must have one value per shot
    pub fn into_footprints(self, beam: &str) -> FuseResult<Vec<Footprint>> {
        let n = self.len();
        let lengths = [
            self.latitude.len(),
            self.longitude.len(),
            self.canopy_height.len(),
            self.quality.len(),
            self.sensitivity.len(),
            self.cover.len(),
        ];
        if lengths.iter().any(|&l| l != n) {
            return Err(FuseError::Processing(format!(
                "{}: column lengths {:?} do not match {} shots",
                beam, lengths, n
            )));
        }

        let rows = (0..n)
            .map(|i| Footprint {
                shot_number: self.shot_number[i],
                latitude: self.latitude[i],
                longitude: self.longitude[i],
                canopy_height: self.canopy_height[i],
                quality: self.quality[i],
                sensitivity: self.sensitivity[i],
                tree_cover: self.cover[i],
                beam: beam.to_string(),
            })
            .collect();
        Ok(rows)
    }
}

/// Access to the beam datasets of one granule
pub trait BeamDataSource {
    /// `Ok(None)` when the beam, or any of its datasets, is absent from the granule
    fn read_beam(&self, beam: &str) -> FuseResult<Option<BeamColumns>>;
}

/// Read every available beam of a granule into rows; absent beams are skipped
pub fn read_footprints(source: &dyn BeamDataSource) -> FuseResult<Vec<Footprint>> {
    let mut rows = Vec::new();
    for beam in BEAMS {
        match source.read_beam(beam)? {
            Some(columns) if columns.is_empty() => log::debug!("{} has no shots", beam),
            Some(columns) => {
                log::debug!("{}: {} shots", beam, columns.len());
                rows.extend(columns.into_footprints(beam)?);
            }
            None => log::debug!("{} not present, skipping", beam),
        }
    }
    Ok(rows)
}

/// GEDI L2B HDF5 granule opened through GDAL's multidimensional API
pub struct GediGranule {
    dataset: Dataset,
}

impl GediGranule {
    pub fn open<P: AsRef<Path>>(path: P) -> FuseResult<Self> {
        log::info!("Opening GEDI granule: {}", path.as_ref().display());
        let dataset = Dataset::open_ex(
            path.as_ref(),
            DatasetOptions {
                open_flags: GdalOpenFlags::GDAL_OF_MULTIDIM_RASTER,
                allowed_drivers: Some(&["HDF5"]),
                open_options: None,
                sibling_files: None,
            },
        )?;
        Ok(Self { dataset })
    }

    /// Read the dataset at `a/b/c` below `group`; `None` if any component is missing
    fn read_column<T: gdal::raster::GdalType + Copy>(
        group: &Group,
        dataset_path: &str,
    ) -> FuseResult<Option<Vec<T>>> {
        let parts: Vec<&str> = dataset_path.split('/').collect();
        Self::read_parts(group, &parts)
    }

    // each opened group stays on this frame while the array below it is read
    fn read_parts<T: gdal::raster::GdalType + Copy>(group: &Group, parts: &[&str]) -> FuseResult<Option<Vec<T>>> {
        match parts {
            [] => Ok(None),
            [array_name] => {
                let names = group.array_names(CslStringList::new());
                if !names.iter().any(|a| a.as_str() == *array_name) {
                    return Ok(None);
                }
                let array = group.open_md_array(array_name, CslStringList::new())?;
                let count = array.num_elements() as usize;
                Ok(Some(array.read_as::<T>(vec![0], vec![count])?))
            }
            [group_name, rest @ ..] => {
                let names = group.group_names(CslStringList::new());
                if !names.iter().any(|g| g.as_str() == *group_name) {
                    return Ok(None);
                }
                let child = group.open_group(group_name, CslStringList::new())?;
                Self::read_parts(&child, rest)
            }
        }
    }
}

impl BeamDataSource for GediGranule {
    fn read_beam(&self, beam: &str) -> FuseResult<Option<BeamColumns>> {
        let root = self.dataset.root_group()?;
        if !root.group_names(CslStringList::new()).iter().any(|g| g == beam) {
            return Ok(None);
        }
        let group = root.open_group(beam, CslStringList::new())?;

        // a beam contributes all of its columns or none of them
        let (
            Some(shot_number),
            Some(latitude),
            Some(longitude),
            Some(canopy_height),
            Some(quality),
            Some(sensitivity),
            Some(cover),
        ) = (
            Self::read_column::<u64>(&group, SHOT_NUMBER)?,
            Self::read_column::<f64>(&group, LATITUDE)?,
            Self::read_column::<f64>(&group, LONGITUDE)?,
            Self::read_column::<f64>(&group, CANOPY_HEIGHT)?,
            Self::read_column::<u8>(&group, QUALITY_FLAG)?,
            Self::read_column::<f64>(&group, SENSITIVITY)?,
            Self::read_column::<f64>(&group, COVER)?,
        )
        else {
            return Ok(None);
        };

        Ok(Some(BeamColumns {
            shot_number,
            latitude,
            longitude,
            canopy_height,
            quality,
            sensitivity,
            cover,
        }))
    }
}

/// Output file name for the `index`-th granule of an export
pub fn csv_file_name(index: usize) -> String {
    format!("gedi_file_{}.csv", index)
}

#[derive(Serialize)]
struct CsvRow<'a> {
    shot_number: u64,
    #[serde(rename = "Latitude")]
    latitude: f64,
    #[serde(rename = "Longitude")]
    longitude: f64,
    canopy_height: f64,
    quality: u8,
    sensitivity: f64,
    tree_cover: f64,
    beam: &'a str,
    /// WKT point, EPSG:4326
    geometry: String,
}

impl<'a> From<&'a Footprint> for CsvRow<'a> {
    fn from(f: &'a Footprint) -> Self {
        Self {
            shot_number: f.shot_number,
            latitude: f.latitude,
            longitude: f.longitude,
            canopy_height: f.canopy_height,
            quality: f.quality,
            sensitivity: f.sensitivity,
            tree_cover: f.tree_cover,
            beam: &f.beam,
            geometry: format!("POINT ({} {})", f.longitude, f.latitude),
        }
    }
}

/// Write rows as CSV with a trailing WKT `geometry` column
pub fn write_csv<P: AsRef<Path>>(path: P, rows: &[Footprint]) -> FuseResult<()> {
    let mut writer = csv::Writer::from_path(path.as_ref())?;
    for footprint in rows {
        writer.serialize(CsvRow::from(footprint))?;
    }
    writer.flush()?;
    Ok(())
}

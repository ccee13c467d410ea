//! I/O modules: catalog search, raster materialisation, Earthdata access and GEDI granules

pub mod earthdata;
pub mod gedi;
pub mod raster;
pub mod stac;

pub use earthdata::{CollectionQuery, Credentials, EarthdataClient, Granule, GranuleArchive};
pub use gedi::{read_footprints, write_csv, BeamColumns, BeamDataSource, GediGranule};
pub use raster::{GdalRasterSource, RasterSource};
pub use stac::{Catalog, SearchRequest, StacClient, StacItem};

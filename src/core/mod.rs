//! Core acquisition and fusion modules

pub mod accessor;
pub mod geometry;
pub mod indices;
pub mod preprocess;

// Re-export main types
pub use accessor::{select_clearest, DataAccessor, Scene};
pub use geometry::{clip_to_area, common_area, footprint_polygon, project_footprint};
pub use indices::{normalized_difference, rescale_intensity, SpectralIndex};
pub use preprocess::{filter_footprints, scale_canopy_height, FusedScene, Preprocessor, FUSED_BANDS};

pub mod annotation;
pub mod canvas;
pub mod choropleth;
pub mod color;
pub mod raster;

pub mod annotation;
pub mod bounding_box;
pub mod config;
pub mod dataset;
pub mod error;
pub mod frame;
pub mod frame_store;
pub mod image;
pub mod my_types;
pub mod optical_flow;
pub mod pyramid;
pub mod synthetic;
pub mod tracker;
pub mod video;

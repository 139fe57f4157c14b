#[macro_use] extern crate lazy_static;

pub mod all;
pub mod catalog;
pub mod compositor;
pub mod extractor;
pub mod homography;
pub mod image;
pub mod matcher;
pub mod parameters;
pub mod pipeline;
pub mod tracker;
pub mod types;
pub mod util;
pub mod video;

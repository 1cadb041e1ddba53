//! pix2pix and CycleGAN image-to-image networks built on libtorch.

pub mod common;
pub mod config;
pub mod error;
pub mod model;

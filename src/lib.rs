//! Absorption analysis of raw volumetric microscopy stacks.
//!
//! A [`read::RawVolume`] gives lazy access to the planes of a headerless
//! 16-bit raw file. Regions drawn on one plane are reduced to log-intensity
//! profiles ([`profile`]), smoothed and aligned ([`signal`], [`align`]) and
//! fitted with a linear absorption model ([`fit`]). [`analysis`] chains
//! these steps the way an image viewer calls them.

pub mod align;
pub mod analysis;
pub mod config;
pub mod convert;
pub mod error;
pub mod fit;
pub mod layers;
pub mod profile;
pub mod read;
pub mod region;
pub mod signal;
pub mod write;

pub use error::{AbsorptionError, Result};

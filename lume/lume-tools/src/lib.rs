//! Offline tools for Lume: scene import, LOD generation and conversion into the packed mesh
//! container.

pub mod convert;
pub mod import;
pub mod simplify;

pub use convert::{convert_file, ConversionContext, ConvertOptions};
pub use import::{load_obj, ImportedMesh, ImportedScene};
pub use simplify::{generate_lods, generate_lods_with, LodOptions, Meshopt, SimplifyPass};

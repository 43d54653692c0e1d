//! Output generation.
//!
//! # Submodules
//!
//! - [`json`]: Writes the collected listings as one JSON array
//!
//! # Output Structure
//!
//! ```text
//! data_dir/
//! └── properties.json   # every listing of the run
//! ```

pub mod json;

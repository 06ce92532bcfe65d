pub mod combiner;
pub mod plugins;
pub mod sourcemap;
pub mod vlq;

pub use combiner::{combine, BundleKind, CombineOutcome, CombineRequest};
pub use sourcemap::{extract_map_reference, MapReference, SourceMap, SourceMapWriter};

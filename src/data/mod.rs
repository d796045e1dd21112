/// Data layer: core types, file I/O and spectrum preprocessing.
///
/// Architecture:
/// ```text
///  .parquet / .json / .csv
///        │
///        ▼
///   ┌──────────┐
///   │  loader   │  parse file → LabelledSpectra / Vec<Spectrum> / PixelCoord
///   └──────────┘
///        │
///        ▼
///   ┌────────────┐
///   │ preprocess  │  select wavelengths + z-score → Array2 (rows × N)
///   └────────────┘
/// ```
///
/// `writer` goes the other way and is used by the sample generator.

pub mod loader;
pub mod model;
pub mod preprocess;
pub mod writer;

//! Directory-backed DigiFace-1M dataset for Burn.
//!
//! Indexes a `root/<subject>_<n>/<image>` layout, derives the identity label
//! from each subject directory name, and yields `[3, 112, 112]` tensors in
//! `[0, 1]` through the [`burn::data::dataset::Dataset`] trait. A fixed
//! augmentation pipeline (horizontal flip, random-resized crop, pluggable
//! appearance/warping hooks) runs on every training load; the `eval`
//! constructor gives a deterministic resize-only path.
//!
//! The `download` feature (on by default) adds a sequential, resumable
//! fetch-and-extract helper for the 8 published dataset archives.

pub mod batcher;
pub mod dataset;
#[cfg(feature = "download")]
pub mod download;
pub mod error;
pub mod label;
pub mod transform;

pub use batcher::{FaceBatch, FaceBatcher};
pub use dataset::{DigiFaceDataset, FaceItem, SampleRecord};
#[cfg(feature = "download")]
pub use download::{ArchiveFetcher, BulkDownload, HttpFetcher, ARCHIVE_URLS};
pub use error::{DatasetError, DatasetResult};
pub use label::{LabelParser, UnderscoreLabel};
pub use transform::{FaceAugmentConfig, FacePipeline, FaceTransform, Identity, OUTPUT_SIZE};

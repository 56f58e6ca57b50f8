use std::fs;
use std::path::{Path, PathBuf};

use burn::data::dataset::Dataset;
use ndarray::Array3;

use crate::error::{DatasetError, DatasetResult};
use crate::label::{LabelParser, UnderscoreLabel};
use crate::transform::{FaceAugmentConfig, FacePipeline, OUTPUT_SIZE};

/// One indexed sample: image path plus identity label.
#[derive(Debug, Clone)]
pub struct SampleRecord {
    pub path: PathBuf,
    pub label: u32,
}

/// A decoded, augmented sample ready for batching.
#[derive(Debug, Clone)]
pub struct FaceItem {
    /// `[3, H, W]` pixels in `[0, 1]`.
    pub image: Array3<f32>,
    pub label: u32,
}

/// Directory-backed DigiFace dataset.
///
/// Expects `root/<subject>_<n>/<image>` where every subdirectory is one
/// identity and every file inside it is one sample. The index is built once
/// at construction; subject directories and files are sorted
/// lexicographically so index order does not depend on the OS enumeration
/// order.
#[derive(Debug)]
pub struct DigiFaceDataset {
    samples: Vec<SampleRecord>,
    pipeline: FacePipeline,
}

impl DigiFaceDataset {
    /// Training dataset with the default augmentation pipeline.
    pub fn train<P: AsRef<Path>>(root: P) -> DatasetResult<Self> {
        Self::new(root, FaceAugmentConfig::new())
    }

    /// Evaluation dataset: deterministic resize, no augmentation.
    pub fn eval<P: AsRef<Path>>(root: P) -> DatasetResult<Self> {
        Self::with_pipeline(root, FacePipeline::eval(OUTPUT_SIZE), &UnderscoreLabel)
    }

    pub fn new<P: AsRef<Path>>(root: P, config: FaceAugmentConfig) -> DatasetResult<Self> {
        Self::with_pipeline(root, config.init(), &UnderscoreLabel)
    }

    /// Fully custom construction: any pipeline, any name-to-label rule.
    pub fn with_pipeline<P: AsRef<Path>>(
        root: P,
        pipeline: FacePipeline,
        parser: &dyn LabelParser,
    ) -> DatasetResult<Self> {
        let root = root.as_ref();
        let samples = scan(root, parser)?;
        log::info!("indexed {} samples under {}", samples.len(), root.display());
        Ok(Self { samples, pipeline })
    }

    /// Decode, augment and convert the sample at `index`.
    pub fn load(&self, index: usize) -> DatasetResult<FaceItem> {
        let record = self
            .samples
            .get(index)
            .ok_or(DatasetError::IndexOutOfRange {
                index,
                len: self.samples.len(),
            })?;
        let image = image::open(&record.path)
            .map_err(|source| DatasetError::Decode {
                path: record.path.clone(),
                source,
            })?
            .to_rgb8();
        Ok(FaceItem {
            image: self.pipeline.apply(image),
            label: record.label,
        })
    }

    pub fn records(&self) -> &[SampleRecord] {
        &self.samples
    }
}

impl Dataset<FaceItem> for DigiFaceDataset {
    /// `None` past the end of the index.
    ///
    /// An unreadable or undecodable file panics with the underlying
    /// [`DatasetError`]; use [`DigiFaceDataset::load`] to handle it instead.
    fn get(&self, index: usize) -> Option<FaceItem> {
        match self.load(index) {
            Ok(item) => Some(item),
            Err(DatasetError::IndexOutOfRange { .. }) => None,
            Err(err) => panic!("failed to load sample {index}: {err}"),
        }
    }

    fn len(&self) -> usize {
        self.samples.len()
    }
}

fn scan(root: &Path, parser: &dyn LabelParser) -> DatasetResult<Vec<SampleRecord>> {
    if !root.is_dir() {
        return Err(DatasetError::NotFound {
            path: root.to_path_buf(),
        });
    }

    let mut subjects: Vec<PathBuf> = Vec::new();
    for entry in fs::read_dir(root).map_err(|source| DatasetError::Io {
        path: root.to_path_buf(),
        source,
    })? {
        let entry = entry.map_err(|source| DatasetError::Io {
            path: root.to_path_buf(),
            source,
        })?;
        let path = entry.path();
        // stray files at the root (e.g. extraction markers) are not subjects
        if path.is_dir() {
            subjects.push(path);
        }
    }
    subjects.sort();

    let mut samples = Vec::new();
    for dir in &subjects {
        let name = dir
            .file_name()
            .and_then(|name| name.to_str())
            .ok_or_else(|| DatasetError::MalformedName {
                name: dir.display().to_string(),
            })?;
        let label = parser.parse(name)?;

        let mut files: Vec<PathBuf> = fs::read_dir(dir)
            .map_err(|source| DatasetError::Io {
                path: dir.clone(),
                source,
            })?
            .filter_map(Result::ok)
            .map(|entry| entry.path())
            .filter(|path| path.is_file())
            .collect();
        files.sort();

        for path in files {
            samples.push(SampleRecord { path, label });
        }
    }

    if samples.is_empty() {
        return Err(DatasetError::EmptyDataset {
            path: root.to_path_buf(),
        });
    }
    Ok(samples)
}

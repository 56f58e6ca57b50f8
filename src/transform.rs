use std::fmt;
use std::sync::Mutex;

use burn::config::Config;
use image::imageops::{self, FilterType};
use image::RgbImage;
use ndarray::Array3;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Spatial size of every tensor leaving the pipeline.
pub const OUTPUT_SIZE: u32 = 112;

/// An image-space transform slotted into the augmentation pipeline.
///
/// The appearance and warping stages of the pipeline are instances of this
/// trait. Their algorithms come from the DigiFace paper and are not
/// implemented here; both default to [`Identity`] and can be replaced via
/// [`FacePipeline::with_appearance`] and [`FacePipeline::with_warping`].
pub trait FaceTransform: Send + Sync {
    fn apply(&self, image: RgbImage, rng: &mut StdRng) -> RgbImage;
}

/// Transform that returns the image unchanged.
#[derive(Debug, Clone, Default)]
pub struct Identity;

impl FaceTransform for Identity {
    fn apply(&self, image: RgbImage, _rng: &mut StdRng) -> RgbImage {
        image
    }
}

#[derive(Config, Debug)]
pub struct FaceAugmentConfig {
    /// Output side length of the random-resized crop.
    #[config(default = 112)]
    pub crop_size: u32,

    #[config(default = 0.5)]
    pub flip_prob: f64,

    /// Crop area as a fraction of the source image area.
    #[config(default = 0.08)]
    pub scale_min: f64,
    #[config(default = 1.0)]
    pub scale_max: f64,

    /// Crop aspect ratio range (3/4 to 4/3).
    #[config(default = 0.75)]
    pub ratio_min: f64,
    #[config(default = 1.3333333333333333)]
    pub ratio_max: f64,

    /// Seed for reproducible augmentation. Unseeded pipelines draw from
    /// entropy, so repeated loads of the same sample differ.
    pub seed: Option<u64>,
}

impl FaceAugmentConfig {
    pub fn init(&self) -> FacePipeline {
        FacePipeline {
            augment: true,
            size: self.crop_size,
            flip_prob: self.flip_prob,
            scale: (self.scale_min, self.scale_max),
            ratio: (self.ratio_min, self.ratio_max),
            appearance: Box::new(Identity),
            warping: Box::new(Identity),
            rng: Mutex::new(match self.seed {
                Some(seed) => StdRng::seed_from_u64(seed),
                None => StdRng::from_entropy(),
            }),
        }
    }
}

/// The fixed transform sequence applied to every loaded image:
/// horizontal flip, random-resized crop, appearance hook, warping hook,
/// then conversion to a `[3, size, size]` tensor in `[0, 1]`.
pub struct FacePipeline {
    augment: bool,
    size: u32,
    flip_prob: f64,
    scale: (f64, f64),
    ratio: (f64, f64),
    appearance: Box<dyn FaceTransform>,
    warping: Box<dyn FaceTransform>,
    rng: Mutex<StdRng>,
}

impl FacePipeline {
    /// Deterministic pipeline for evaluation: resize to `size`, convert,
    /// no flips, no crops, no augmentation hooks.
    pub fn eval(size: u32) -> Self {
        FacePipeline {
            augment: false,
            size,
            flip_prob: 0.0,
            scale: (1.0, 1.0),
            ratio: (1.0, 1.0),
            appearance: Box::new(Identity),
            warping: Box::new(Identity),
            rng: Mutex::new(StdRng::from_entropy()),
        }
    }

    pub fn with_appearance(mut self, transform: Box<dyn FaceTransform>) -> Self {
        self.appearance = transform;
        self
    }

    pub fn with_warping(mut self, transform: Box<dyn FaceTransform>) -> Self {
        self.warping = transform;
        self
    }

    pub fn output_size(&self) -> u32 {
        self.size
    }

    pub fn apply(&self, image: RgbImage) -> Array3<f32> {
        if !self.augment {
            let resized = imageops::resize(&image, self.size, self.size, FilterType::Triangle);
            return to_tensor(&resized);
        }

        let mut rng = self.rng.lock().unwrap();
        let mut image = image;
        if rng.gen::<f64>() < self.flip_prob {
            imageops::flip_horizontal_in_place(&mut image);
        }
        let image = self.random_resized_crop(image, &mut rng);
        let image = self.appearance.apply(image, &mut rng);
        let image = self.warping.apply(image, &mut rng);
        to_tensor(&image)
    }

    /// Crop a random region whose area and aspect ratio fall in the
    /// configured ranges, then resize it to the output size. Falls back to
    /// a centered square crop when no valid region is found.
    fn random_resized_crop(&self, image: RgbImage, rng: &mut StdRng) -> RgbImage {
        let (width, height) = image.dimensions();
        let area = width as f64 * height as f64;

        for _ in 0..10 {
            let target_area = area * rng.gen_range(self.scale.0..=self.scale.1);
            // aspect sampled log-uniform so e.g. 3/4 and 4/3 are equally likely
            let aspect = rng.gen_range(self.ratio.0.ln()..=self.ratio.1.ln()).exp();
            let crop_w = (target_area * aspect).sqrt().round() as u32;
            let crop_h = (target_area / aspect).sqrt().round() as u32;
            if crop_w == 0 || crop_h == 0 || crop_w > width || crop_h > height {
                continue;
            }
            let x = rng.gen_range(0..=width - crop_w);
            let y = rng.gen_range(0..=height - crop_h);
            let crop = imageops::crop_imm(&image, x, y, crop_w, crop_h).to_image();
            return imageops::resize(&crop, self.size, self.size, FilterType::Triangle);
        }

        let side = width.min(height);
        let crop = imageops::crop_imm(
            &image,
            (width - side) / 2,
            (height - side) / 2,
            side,
            side,
        )
        .to_image();
        imageops::resize(&crop, self.size, self.size, FilterType::Triangle)
    }
}

impl fmt::Debug for FacePipeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FacePipeline")
            .field("augment", &self.augment)
            .field("size", &self.size)
            .field("flip_prob", &self.flip_prob)
            .field("scale", &self.scale)
            .field("ratio", &self.ratio)
            .finish_non_exhaustive()
    }
}

/// Convert interleaved RGB bytes to a `[3, H, W]` tensor scaled to `[0, 1]`.
pub fn to_tensor(image: &RgbImage) -> Array3<f32> {
    let (width, height) = image.dimensions();
    let mut data = Array3::<f32>::zeros((3, height as usize, width as usize));
    for (x, y, pixel) in image.enumerate_pixels() {
        for channel in 0..3 {
            data[[channel, y as usize, x as usize]] = pixel[channel] as f32 / 255.0;
        }
    }
    data
}

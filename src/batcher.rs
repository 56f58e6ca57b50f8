use burn::{data::dataloader::batcher::Batcher, prelude::*};

use crate::dataset::FaceItem;

#[derive(Clone, Debug)]
pub struct FaceBatcher<B: Backend> {
    device: B::Device,
}

#[derive(Clone, Debug)]
pub struct FaceBatch<B: Backend> {
    /// `[N, 3, H, W]`, values already in `[0, 1]`.
    pub images: Tensor<B, 4>,
    /// Identity labels, `[N]`.
    pub targets: Tensor<B, 1, Int>,
}

impl<B: Backend> FaceBatcher<B> {
    pub fn new(device: B::Device) -> Self {
        Self { device }
    }
}

impl<B: Backend> Batcher<FaceItem, FaceBatch<B>> for FaceBatcher<B> {
    fn batch(&self, items: Vec<FaceItem>) -> FaceBatch<B> {
        let images = items
            .iter()
            .map(|item| {
                let (channels, height, width) = item.image.dim();
                Data::new(
                    item.image.clone().into_raw_vec(),
                    Shape::new([channels, height, width]),
                )
            })
            .map(|data| Tensor::<B, 3>::from_data(data.convert(), &self.device).unsqueeze::<4>())
            .collect();

        let targets: Vec<i64> = items.iter().map(|item| item.label as i64).collect();
        let targets = Tensor::<B, 1, Int>::from_data(
            Data::new(targets, Shape::new([items.len()])).convert(),
            &self.device,
        );

        let images = Tensor::cat(images, 0);

        FaceBatch { images, targets }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::Array3;

    type TestBackend = burn_ndarray::NdArray<f32>;

    fn item(label: u32, value: f32) -> FaceItem {
        FaceItem {
            image: Array3::from_elem((3, 112, 112), value),
            label,
        }
    }

    #[test]
    fn batch_shapes_and_targets() {
        let batcher = FaceBatcher::<TestBackend>::new(Default::default());
        let batch = batcher.batch(vec![item(7, 0.25), item(3, 0.75)]);

        assert_eq!(batch.images.dims(), [2, 3, 112, 112]);
        assert_eq!(batch.targets.dims(), [2]);
        assert_eq!(batch.targets.to_data().convert::<i64>().value, vec![7, 3]);
    }

    #[test]
    fn pixel_values_survive_batching() {
        let batcher = FaceBatcher::<TestBackend>::new(Default::default());
        let batch = batcher.batch(vec![item(0, 0.5)]);
        let mean = batch.images.mean().into_scalar();
        assert!((mean - 0.5).abs() < 1e-6);
    }
}

//! Single-input inference API
//!
//! Wraps a trained network in evaluation mode behind one function: given an
//! optional image, return a per-class probability mapping. Absent input maps
//! every class to probability zero; well-formed input goes through the fixed
//! preprocessing transform and a softmax over the logits.

use std::collections::BTreeMap;
use std::path::Path;

use burn::tensor::{backend::Backend, Tensor, TensorData};
use image::{imageops::FilterType, DynamicImage};

use crate::error::Result;
use crate::model::conv_net::{ConvNet, ConvNetConfig};
use crate::training::checkpoint::load_model;
use crate::{IMAGE_SIDE, MNIST_MEAN, MNIST_STD, NUM_CLASSES};

/// Inference wrapper around a trained digit classifier
pub struct MnistInference<B: Backend> {
    model: ConvNet<B>,
    device: B::Device,
}

impl<B: Backend> MnistInference<B> {
    /// Wrap an already-loaded model
    pub fn new(model: ConvNet<B>, device: B::Device) -> Self {
        Self { model, device }
    }

    /// Load the model weights from a training checkpoint
    pub fn from_checkpoint(
        config: &ConvNetConfig,
        checkpoint: &Path,
        device: B::Device,
    ) -> Result<Self> {
        let model = load_model::<B>(config, checkpoint, &device)?;
        Ok(Self { model, device })
    }

    /// Resize, grayscale and normalize an image into a `[1, 1, 28, 28]` tensor
    pub fn preprocess(&self, image: &DynamicImage) -> Tensor<B, 4> {
        let gray = image
            .resize_exact(IMAGE_SIDE as u32, IMAGE_SIDE as u32, FilterType::Triangle)
            .to_luma8();

        let data: Vec<f32> = gray
            .pixels()
            .map(|p| (p[0] as f32 / 255.0 - MNIST_MEAN) / MNIST_STD)
            .collect();

        Tensor::<B, 4>::from_floats(
            TensorData::new(data, [1, 1, IMAGE_SIDE, IMAGE_SIDE]),
            &self.device,
        )
    }

    /// Classify a single input.
    ///
    /// Returns a mapping from class index to probability. A missing input
    /// yields probability 0.0 for every class; otherwise the probabilities
    /// come from a softmax and sum to one.
    pub fn predict(&self, input: Option<&DynamicImage>) -> BTreeMap<usize, f32> {
        let Some(image) = input else {
            return (0..NUM_CLASSES).map(|i| (i, 0.0)).collect();
        };

        let tensor = self.preprocess(image);
        let probs = self.model.forward_softmax(tensor);
        let values: Vec<f32> = probs.into_data().to_vec().unwrap();

        values.into_iter().enumerate().collect()
    }

    /// Class index with the highest probability
    pub fn predict_class(&self, input: Option<&DynamicImage>) -> Option<usize> {
        self.predict(input)
            .into_iter()
            .max_by(|(_, a), (_, b)| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal))
            .map(|(class, _)| class)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::DefaultBackend;

    fn api() -> MnistInference<DefaultBackend> {
        let device = Default::default();
        let model = ConvNetConfig::default()
            .init::<DefaultBackend>(&device)
            .unwrap();
        MnistInference::new(model, device)
    }

    #[test]
    fn test_null_input_yields_zero_distribution() {
        let result = api().predict(None);

        assert_eq!(result.len(), NUM_CLASSES);
        for class in 0..NUM_CLASSES {
            assert_eq!(result[&class], 0.0);
        }
    }

    #[test]
    fn test_image_input_yields_probability_distribution() {
        let image = DynamicImage::new_luma8(64, 64);
        let result = api().predict(Some(&image));

        assert_eq!(result.len(), NUM_CLASSES);
        let sum: f32 = result.values().sum();
        assert!((sum - 1.0).abs() < 1e-3, "probabilities sum to {}", sum);
    }

    #[test]
    fn test_preprocess_shape_and_range() {
        let image = DynamicImage::new_rgb8(100, 40);
        let tensor = api().preprocess(&image);

        assert_eq!(tensor.dims(), [1, 1, IMAGE_SIDE, IMAGE_SIDE]);

        // Black input normalizes to a single constant value.
        let values: Vec<f32> = tensor.into_data().to_vec().unwrap();
        let expected = (0.0 - MNIST_MEAN) / MNIST_STD;
        assert!(values.iter().all(|v| (v - expected).abs() < 1e-5));
    }

    #[test]
    fn test_predict_class_is_argmax() {
        let api = api();
        let image = DynamicImage::new_luma8(28, 28);

        let probs = api.predict(Some(&image));
        let class = api.predict_class(Some(&image)).unwrap();

        let max = probs.values().cloned().fold(f32::MIN, f32::max);
        assert_eq!(probs[&class], max);
    }
}

//! Convolutional network for digit classification
//!
//! A small LeNet-style architecture: two valid-padded 5x5 convolutions with
//! max pooling, followed by three fully connected layers. With 28x28 inputs
//! the feature map entering the classifier head is 16x4x4 = 256 values.

use burn::{
    module::Module,
    nn::{
        conv::{Conv2d, Conv2dConfig},
        pool::{MaxPool2d, MaxPool2dConfig},
        Linear, LinearConfig, Relu,
    },
    tensor::{backend::Backend, Tensor},
};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::{IMAGE_SIDE, NUM_CLASSES};

/// Flattened feature size entering the classifier head for 28x28 inputs
const FLAT_FEATURES: usize = 256;

/// Configuration for the [`ConvNet`] classifier head
///
/// Each entry is an `[input, output]` pair for one fully connected layer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConvNetConfig {
    #[serde(default = "default_fc1")]
    pub fc1: [usize; 2],
    #[serde(default = "default_fc2")]
    pub fc2: [usize; 2],
    #[serde(default = "default_fc3")]
    pub fc3: [usize; 2],
}

fn default_fc1() -> [usize; 2] {
    [256, 120]
}

fn default_fc2() -> [usize; 2] {
    [120, 84]
}

fn default_fc3() -> [usize; 2] {
    [84, 10]
}

impl Default for ConvNetConfig {
    fn default() -> Self {
        Self {
            fc1: default_fc1(),
            fc2: default_fc2(),
            fc3: default_fc3(),
        }
    }
}

impl ConvNetConfig {
    /// Check the shape constraints the convolutional stem imposes.
    pub fn validate(&self) -> Result<()> {
        if self.fc1[0] != FLAT_FEATURES {
            return Err(Error::Config(format!(
                "fc1 input must be {} for {}x{} inputs, got {}",
                FLAT_FEATURES, IMAGE_SIDE, IMAGE_SIDE, self.fc1[0]
            )));
        }
        if self.fc3[1] != NUM_CLASSES {
            return Err(Error::Config(format!(
                "fc3 output must be {} for digit classification, got {}",
                NUM_CLASSES, self.fc3[1]
            )));
        }
        Ok(())
    }

    /// Validate the configuration and initialize the network.
    pub fn init<B: Backend>(&self, device: &B::Device) -> Result<ConvNet<B>> {
        self.validate()?;
        Ok(ConvNet::new(self, device))
    }
}

/// Digit classifier network
#[derive(Module, Debug)]
pub struct ConvNet<B: Backend> {
    conv1: Conv2d<B>,
    conv2: Conv2d<B>,
    pool: MaxPool2d,
    fc1: Linear<B>,
    fc2: Linear<B>,
    fc3: Linear<B>,
    activation: Relu,
}

impl<B: Backend> ConvNet<B> {
    fn new(config: &ConvNetConfig, device: &B::Device) -> Self {
        // 1 input channel, 6 then 16 output channels, 5x5 kernels
        let conv1 = Conv2dConfig::new([1, 6], [5, 5]).init(device);
        let conv2 = Conv2dConfig::new([6, 16], [5, 5]).init(device);
        let pool = MaxPool2dConfig::new([2, 2]).with_strides([2, 2]).init();

        let fc1 = LinearConfig::new(config.fc1[0], config.fc1[1]).init(device);
        let fc2 = LinearConfig::new(config.fc2[0], config.fc2[1]).init(device);
        let fc3 = LinearConfig::new(config.fc3[0], config.fc3[1]).init(device);

        Self {
            conv1,
            conv2,
            pool,
            fc1,
            fc2,
            fc3,
            activation: Relu::new(),
        }
    }

    /// Forward pass.
    ///
    /// # Arguments
    /// * `x` - Input tensor of shape `[batch_size, 1, 28, 28]`
    ///
    /// # Returns
    /// * Logits tensor of shape `[batch_size, 10]`
    pub fn forward(&self, x: Tensor<B, 4>) -> Tensor<B, 2> {
        let x = self.pool.forward(self.activation.forward(self.conv1.forward(x)));
        let x = self.pool.forward(self.activation.forward(self.conv2.forward(x)));

        let x = x.flatten::<2>(1, 3);

        let x = self.activation.forward(self.fc1.forward(x));
        let x = self.activation.forward(self.fc2.forward(x));
        self.fc3.forward(x)
    }

    /// Forward pass with softmax for inference
    pub fn forward_softmax(&self, x: Tensor<B, 4>) -> Tensor<B, 2> {
        let logits = self.forward(x);
        burn::tensor::activation::softmax(logits, 1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::DefaultBackend;

    type TestBackend = DefaultBackend;

    #[test]
    fn test_output_shape() {
        let device = Default::default();
        let model = ConvNetConfig::default().init::<TestBackend>(&device).unwrap();

        let input = Tensor::<TestBackend, 4>::zeros([2, 1, 28, 28], &device);
        let output = model.forward(input);

        assert_eq!(output.dims(), [2, NUM_CLASSES]);
    }

    #[test]
    fn test_softmax_rows_sum_to_one() {
        let device = Default::default();
        let model = ConvNetConfig::default().init::<TestBackend>(&device).unwrap();

        let input = Tensor::<TestBackend, 4>::ones([1, 1, 28, 28], &device);
        let probs: Vec<f32> = model.forward_softmax(input).into_data().to_vec().unwrap();

        let sum: f32 = probs.iter().sum();
        assert!((sum - 1.0).abs() < 1e-4);
    }

    #[test]
    fn test_invalid_fc1_input_is_rejected() {
        let config = ConvNetConfig {
            fc1: [128, 120],
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_invalid_fc3_output_is_rejected() {
        let config = ConvNetConfig {
            fc3: [84, 2],
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_default_config_is_valid() {
        assert!(ConvNetConfig::default().validate().is_ok());
    }
}

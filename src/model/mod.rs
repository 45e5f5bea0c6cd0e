//! Model architectures

pub mod conv_net;

pub use conv_net::{ConvNet, ConvNetConfig};

//! Backend selection
//!
//! The crate trains on the NdArray CPU backend by default. Enabling the
//! `wgpu` feature switches every entry point to the GPU backend instead.

use burn::backend::Autodiff;

#[cfg(feature = "wgpu")]
pub type DefaultBackend = burn::backend::Wgpu;

#[cfg(all(feature = "ndarray", not(feature = "wgpu")))]
pub type DefaultBackend = burn::backend::NdArray;

#[cfg(not(any(feature = "ndarray", feature = "wgpu")))]
compile_error!("A backend feature is required: enable `ndarray` or `wgpu`.");

/// The default autodiff backend for training
pub type TrainingBackend = Autodiff<DefaultBackend>;

/// Get the default device for the selected backend
pub fn default_device() -> <DefaultBackend as burn::tensor::backend::Backend>::Device {
    #[cfg(feature = "wgpu")]
    {
        burn::backend::wgpu::WgpuDevice::default()
    }

    #[cfg(all(feature = "ndarray", not(feature = "wgpu")))]
    {
        burn::backend::ndarray::NdArrayDevice::default()
    }
}

/// Get a human-readable name for the current backend
pub fn backend_name() -> &'static str {
    #[cfg(feature = "wgpu")]
    {
        "wgpu (GPU)"
    }

    #[cfg(all(feature = "ndarray", not(feature = "wgpu")))]
    {
        "ndarray (CPU)"
    }
}

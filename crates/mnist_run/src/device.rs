use burn::backend::wgpu::WgpuDevice;
use burn::backend::{Autodiff, Wgpu};
use tracing::info;

/// Training requires Autodiff wrapper for automatic differentiation.
pub type TrainBackend = Autodiff<Wgpu>;

/// Initializes a WGPU device, picking the best available adapter.
///
/// This function only exists to be able to change the device at a single location.
pub fn init_device() -> WgpuDevice {
    info!("Initializing WGPU device...");
    WgpuDevice::default()
}

//! Compute device selection for the candle backend.

use candle_core::Device;
use tracing::debug;

/// Picks the device the detector runs on.
///
/// Uses Metal or CUDA when the matching feature is enabled and a GPU is
/// present, otherwise the CPU.
#[must_use]
pub fn get_device() -> Device {
    #[cfg(feature = "metal")]
    {
        match Device::new_metal(0) {
            Ok(device) => {
                debug!("Detector device: Metal");
                return device;
            }
            Err(e) => debug!("Metal unavailable: {e}"),
        }
    }

    #[cfg(feature = "cuda")]
    {
        match Device::new_cuda(0) {
            Ok(device) => {
                debug!("Detector device: CUDA");
                return device;
            }
            Err(e) => debug!("CUDA unavailable: {e}"),
        }
    }

    debug!("Detector device: CPU");
    Device::Cpu
}

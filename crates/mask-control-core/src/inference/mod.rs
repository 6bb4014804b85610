//! Default detection and classification backends.
//!
//! - `BlazeFace` (candle, safetensors weights) for face detection
//! - ONNX Runtime for the opaque mask classifier

mod blazeface;
mod device;
mod labels;
mod onnx;
mod weights;

pub use blazeface::{BlazeFace, BlazeFaceProvider, FaceDetection, INPUT_SIZE};
pub use device::get_device;
pub use labels::{load_labels, parse_labels};
pub use onnx::OnnxClassifier;
pub use weights::load_weights;

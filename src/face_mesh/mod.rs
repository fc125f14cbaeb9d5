pub mod connections;
pub mod detector;
pub mod face_detector;
pub mod landmark;
pub mod onnx_face_mesh;

pub use connections::{ConnectionGraph, MeshGraph};
pub use detector::{detect_faces, with_detector, DetectorConfig, DetectorProvider, LandmarkDetector};
pub use face_detector::{FaceBox, RetinaFaceDetector};
pub use landmark::{Landmark, LandmarkSet};
pub use onnx_face_mesh::{OnnxFaceMesh, OnnxFaceMeshProvider, TensorLayout};

/// Points regressed by the face-mesh model for one face.
pub const FACE_MESH_LANDMARKS: usize = 468;

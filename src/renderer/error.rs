use std::fmt;

use thiserror::Error;

use crate::gpu::GpuError;

/// Fixed-capacity resources the batch engine can run out of.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resource {
    Instances,
    Materials,
    DirectionalLights,
    PointLights,
}

impl fmt::Display for Resource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Resource::Instances => "instance slots",
            Resource::Materials => "material slots",
            Resource::DirectionalLights => "directional lights",
            Resource::PointLights => "point lights",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Error)]
pub enum BatchError {
    #[error("frame needs more than {capacity} {resource}")]
    CapacityExceeded { resource: Resource, capacity: u32 },
    #[error("no frame is being collected; call begin() first")]
    NotCollecting,
    #[error("a frame is already being collected; call end() first")]
    AlreadyCollecting,
    #[error("the current frame was aborted after a capacity failure")]
    FrameAborted,
    #[error("geometry range {0} is not in the asset cache")]
    UnknownGeometryRange(usize),
    #[error("material {0} is not in the asset cache")]
    UnknownMaterial(usize),
    #[error("mesh {0} is not in the asset cache")]
    UnknownMesh(usize),
    #[error(transparent)]
    Gpu(#[from] GpuError),
}

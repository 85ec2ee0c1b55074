pub mod batch;
pub mod camera;
pub mod depth;
pub mod drawable;
pub mod error;
mod internal;
pub mod lights;
pub mod material;
pub mod pipeline_builder;
pub mod primitives;
pub mod shader;
pub mod uniforms;
pub mod vertex;

pub use batch::{FrameStats, ModelBatch};
pub use camera::Camera;
pub use depth::{Depth, OffscreenTarget};
pub use drawable::{Drawable, DrawablePool};
pub use error::{BatchError, Resource};
pub use internal::buffers::{align_to, BatchBuffers};
pub use internal::pipeline::{CachedPipeline, PipelineCache, PipelineMatch, PipelineSpec};
pub use material::{Material, MaterialUniform};
pub use pipeline_builder::PipelineBuilder;
pub use primitives::{cube_mesh, cube_mesh_standard, sphere_mesh, triangle};
pub use shader::ShaderPrograms;
pub use uniforms::{FrameUniform, InstanceRaw};
pub use vertex::{
    TangentVertex, Vertex, VertexAttributeDesc, VertexLayoutDescriptor, VertexSemantic,
};

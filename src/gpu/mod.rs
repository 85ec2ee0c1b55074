//! The small, fixed contract the batch engine issues against the GPU.
//!
//! Everything the engine needs from a device goes through [`GpuFacade`]:
//! object creation returns typed integer ids, and render-pass commands are
//! recorded as [`GpuCommand`]s. [`WgpuFacade`] drives a real `wgpu` device,
//! [`RecordingGpu`] keeps everything in memory for headless use and tests.

pub mod recording;
pub mod wgpu_backend;

use std::ops::Range;

use thiserror::Error;

use crate::renderer::PipelineSpec;

pub use recording::RecordingGpu;
pub use wgpu_backend::WgpuFacade;

macro_rules! gpu_id {
    ($($name:ident),* $(,)?) => {
        $(
            #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
            pub struct $name(u32);

            impl $name {
                pub(crate) const fn from_raw(raw: u32) -> Self {
                    Self(raw)
                }

                pub const fn raw(self) -> u32 {
                    self.0
                }
            }
        )*
    };
}

gpu_id!(
    BufferId,
    TextureId,
    SamplerId,
    ShaderId,
    BindGroupLayoutId,
    BindGroupId,
    PipelineLayoutId,
    PipelineId,
);

#[derive(Debug, Error)]
pub enum GpuError {
    #[error("failed to create {kind}: {message}")]
    Creation { kind: &'static str, message: String },
    #[error("unknown {kind} handle {id}")]
    UnknownHandle { kind: &'static str, id: u32 },
    #[error("write of {len} bytes at offset {offset} overflows buffer of {size} bytes")]
    WriteOutOfBounds { offset: u64, len: u64, size: u64 },
}

#[derive(Debug, Clone)]
pub struct BufferDesc<'a> {
    pub label: &'a str,
    pub size: u64,
    pub usage: wgpu::BufferUsages,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LayoutEntryKind {
    UniformBuffer {
        has_dynamic_offset: bool,
        min_binding_size: u64,
    },
    StorageBuffer {
        min_binding_size: u64,
    },
    Texture2d,
    FilteringSampler,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LayoutEntry {
    pub binding: u32,
    pub visibility: wgpu::ShaderStages,
    pub kind: LayoutEntryKind,
}

#[derive(Debug, Clone)]
pub struct BindGroupLayoutDesc<'a> {
    pub label: &'a str,
    pub entries: &'a [LayoutEntry],
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BindingResource {
    Buffer {
        buffer: BufferId,
        offset: u64,
        size: Option<u64>,
    },
    Texture(TextureId),
    Sampler(SamplerId),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BindGroupEntry {
    pub binding: u32,
    pub resource: BindingResource,
}

#[derive(Debug, Clone)]
pub struct BindGroupDesc<'a> {
    pub label: &'a str,
    pub layout: BindGroupLayoutId,
    pub entries: &'a [BindGroupEntry],
}

/// One state-setting or draw command recorded against the active pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GpuCommand {
    SetPipeline(PipelineId),
    SetBindGroup {
        index: u32,
        group: BindGroupId,
        offsets: Vec<u32>,
    },
    SetVertexBuffer {
        slot: u32,
        buffer: BufferId,
    },
    SetIndexBuffer {
        buffer: BufferId,
        format: wgpu::IndexFormat,
    },
    Draw {
        vertices: Range<u32>,
        instances: Range<u32>,
    },
    DrawIndexed {
        indices: Range<u32>,
        base_vertex: i32,
        instances: Range<u32>,
    },
}

impl GpuCommand {
    pub fn is_draw(&self) -> bool {
        matches!(self, Self::Draw { .. } | Self::DrawIndexed { .. })
    }

    /// Instance range of a draw command, `None` for state changes.
    pub fn instances(&self) -> Option<Range<u32>> {
        match self {
            Self::Draw { instances, .. } | Self::DrawIndexed { instances, .. } => {
                Some(instances.clone())
            }
            _ => None,
        }
    }
}

pub trait GpuFacade {
    /// Device-reported `min_uniform_buffer_offset_alignment`.
    fn min_uniform_buffer_offset_alignment(&self) -> u32;

    fn create_buffer(&mut self, desc: &BufferDesc<'_>) -> Result<BufferId, GpuError>;
    fn destroy_buffer(&mut self, buffer: BufferId);
    fn write_buffer(&mut self, buffer: BufferId, offset: u64, data: &[u8]) -> Result<(), GpuError>;

    fn create_shader(&mut self, label: &str, wgsl: &str) -> Result<ShaderId, GpuError>;
    fn destroy_shader(&mut self, shader: ShaderId);

    /// A 1x1 RGBA8 texture, used for material fallbacks.
    fn create_solid_texture(&mut self, label: &str, rgba: [u8; 4]) -> Result<TextureId, GpuError>;
    fn destroy_texture(&mut self, texture: TextureId);
    fn create_sampler(&mut self, label: &str) -> Result<SamplerId, GpuError>;
    fn destroy_sampler(&mut self, sampler: SamplerId);

    fn create_bind_group_layout(
        &mut self,
        desc: &BindGroupLayoutDesc<'_>,
    ) -> Result<BindGroupLayoutId, GpuError>;
    fn destroy_bind_group_layout(&mut self, layout: BindGroupLayoutId);
    fn create_bind_group(&mut self, desc: &BindGroupDesc<'_>) -> Result<BindGroupId, GpuError>;
    fn destroy_bind_group(&mut self, group: BindGroupId);

    fn create_pipeline_layout(
        &mut self,
        label: &str,
        bind_group_layouts: &[BindGroupLayoutId],
    ) -> Result<PipelineLayoutId, GpuError>;
    fn destroy_pipeline_layout(&mut self, layout: PipelineLayoutId);
    fn create_pipeline(
        &mut self,
        layout: PipelineLayoutId,
        spec: &PipelineSpec,
    ) -> Result<PipelineId, GpuError>;
    fn destroy_pipeline(&mut self, pipeline: PipelineId);

    fn set_pipeline(&mut self, pipeline: PipelineId);
    fn set_bind_group(&mut self, index: u32, group: BindGroupId, dynamic_offsets: &[u32]);
    fn set_vertex_buffer(&mut self, slot: u32, buffer: BufferId);
    fn set_index_buffer(&mut self, buffer: BufferId, format: wgpu::IndexFormat);
    fn draw(&mut self, vertices: Range<u32>, instances: Range<u32>);
    fn draw_indexed(&mut self, indices: Range<u32>, base_vertex: i32, instances: Range<u32>);

    /// Number of pass commands recorded and not yet submitted.
    fn command_mark(&self) -> usize;
    /// Drops every pending pass command recorded after `mark`. Objects kept
    /// alive only for those commands are released.
    fn discard_commands_from(&mut self, mark: usize);
}

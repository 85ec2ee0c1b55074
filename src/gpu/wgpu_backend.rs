use std::collections::HashMap;
use std::num::NonZeroU64;
use std::ops::Range;

use super::{
    BindGroupDesc, BindGroupId, BindGroupLayoutDesc, BindGroupLayoutId, BindingResource,
    BufferDesc, BufferId, GpuCommand, GpuError, GpuFacade, LayoutEntryKind, PipelineId,
    PipelineLayoutId, SamplerId, ShaderId, TextureId,
};
use crate::renderer::{PipelineBuilder, PipelineSpec};

struct SolidTexture {
    _texture: wgpu::Texture,
    view: wgpu::TextureView,
}

/// [`GpuFacade`] backed by a `wgpu` device.
///
/// Pass commands are recorded while the batch runs and replayed into a real
/// `wgpu::RenderPass` with [`WgpuFacade::replay`]. Bind groups destroyed
/// while pending commands still reference them stay alive until the next
/// replay or until those commands are discarded.
pub struct WgpuFacade {
    device: wgpu::Device,
    queue: wgpu::Queue,
    depth_format: wgpu::TextureFormat,
    uniform_alignment: u32,
    next_id: u32,
    buffers: HashMap<BufferId, wgpu::Buffer>,
    shaders: HashMap<ShaderId, wgpu::ShaderModule>,
    textures: HashMap<TextureId, SolidTexture>,
    samplers: HashMap<SamplerId, wgpu::Sampler>,
    bind_group_layouts: HashMap<BindGroupLayoutId, wgpu::BindGroupLayout>,
    bind_groups: HashMap<BindGroupId, wgpu::BindGroup>,
    retired_bind_groups: Vec<BindGroupId>,
    pipeline_layouts: HashMap<PipelineLayoutId, wgpu::PipelineLayout>,
    pipelines: HashMap<PipelineId, wgpu::RenderPipeline>,
    commands: Vec<GpuCommand>,
}

impl WgpuFacade {
    pub fn new(
        device: wgpu::Device,
        queue: wgpu::Queue,
        depth_format: wgpu::TextureFormat,
    ) -> Self {
        let uniform_alignment = device.limits().min_uniform_buffer_offset_alignment;
        log::info!(
            "WgpuFacade created (uniform offset alignment {} bytes, depth format {:?})",
            uniform_alignment,
            depth_format
        );

        Self {
            device,
            queue,
            depth_format,
            uniform_alignment,
            next_id: 0,
            buffers: HashMap::new(),
            shaders: HashMap::new(),
            textures: HashMap::new(),
            samplers: HashMap::new(),
            bind_group_layouts: HashMap::new(),
            bind_groups: HashMap::new(),
            retired_bind_groups: Vec::new(),
            pipeline_layouts: HashMap::new(),
            pipelines: HashMap::new(),
            commands: Vec::new(),
        }
    }

    pub fn device(&self) -> &wgpu::Device {
        &self.device
    }

    pub fn queue(&self) -> &wgpu::Queue {
        &self.queue
    }

    pub fn depth_format(&self) -> wgpu::TextureFormat {
        self.depth_format
    }

    pub fn pending_commands(&self) -> usize {
        self.commands.len()
    }

    /// Encodes every recorded command into `pass`, then drops bind groups
    /// that were destroyed while the commands were being recorded.
    pub fn replay(&mut self, pass: &mut wgpu::RenderPass<'_>) -> Result<(), GpuError> {
        let commands = std::mem::take(&mut self.commands);
        for command in &commands {
            match command {
                GpuCommand::SetPipeline(id) => {
                    let pipeline = lookup(&self.pipelines, *id, "render pipeline", id.raw())?;
                    pass.set_pipeline(pipeline);
                }
                GpuCommand::SetBindGroup {
                    index,
                    group,
                    offsets,
                } => {
                    let bind_group = lookup(&self.bind_groups, *group, "bind group", group.raw())?;
                    pass.set_bind_group(*index, bind_group, offsets);
                }
                GpuCommand::SetVertexBuffer { slot, buffer } => {
                    let buf = lookup(&self.buffers, *buffer, "buffer", buffer.raw())?;
                    pass.set_vertex_buffer(*slot, buf.slice(..));
                }
                GpuCommand::SetIndexBuffer { buffer, format } => {
                    let buf = lookup(&self.buffers, *buffer, "buffer", buffer.raw())?;
                    pass.set_index_buffer(buf.slice(..), *format);
                }
                GpuCommand::Draw {
                    vertices,
                    instances,
                } => pass.draw(vertices.clone(), instances.clone()),
                GpuCommand::DrawIndexed {
                    indices,
                    base_vertex,
                    instances,
                } => pass.draw_indexed(indices.clone(), *base_vertex, instances.clone()),
            }
        }

        for id in self.retired_bind_groups.drain(..) {
            self.bind_groups.remove(&id);
        }
        Ok(())
    }

    fn is_pending(&self, group: BindGroupId) -> bool {
        self.commands.iter().any(|command| {
            matches!(command, GpuCommand::SetBindGroup { group: g, .. } if *g == group)
        })
    }

    fn next_raw(&mut self) -> u32 {
        self.next_id += 1;
        self.next_id
    }

    fn check_validation(&self, kind: &'static str) -> Result<(), GpuError> {
        match pollster::block_on(self.device.pop_error_scope()) {
            Some(err) => {
                log::error!("{} creation failed: {}", kind, err);
                Err(GpuError::Creation {
                    kind,
                    message: err.to_string(),
                })
            }
            None => Ok(()),
        }
    }
}

fn lookup<'a, K: std::hash::Hash + Eq, V>(
    map: &'a HashMap<K, V>,
    key: K,
    kind: &'static str,
    raw: u32,
) -> Result<&'a V, GpuError> {
    map.get(&key).ok_or(GpuError::UnknownHandle { kind, id: raw })
}

fn layout_entry(entry: &super::LayoutEntry) -> wgpu::BindGroupLayoutEntry {
    let ty = match entry.kind {
        LayoutEntryKind::UniformBuffer {
            has_dynamic_offset,
            min_binding_size,
        } => wgpu::BindingType::Buffer {
            ty: wgpu::BufferBindingType::Uniform,
            has_dynamic_offset,
            min_binding_size: NonZeroU64::new(min_binding_size),
        },
        LayoutEntryKind::StorageBuffer { min_binding_size } => wgpu::BindingType::Buffer {
            ty: wgpu::BufferBindingType::Storage { read_only: true },
            has_dynamic_offset: false,
            min_binding_size: NonZeroU64::new(min_binding_size),
        },
        LayoutEntryKind::Texture2d => wgpu::BindingType::Texture {
            sample_type: wgpu::TextureSampleType::Float { filterable: true },
            view_dimension: wgpu::TextureViewDimension::D2,
            multisampled: false,
        },
        LayoutEntryKind::FilteringSampler => {
            wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering)
        }
    };

    wgpu::BindGroupLayoutEntry {
        binding: entry.binding,
        visibility: entry.visibility,
        ty,
        count: None,
    }
}

impl GpuFacade for WgpuFacade {
    fn min_uniform_buffer_offset_alignment(&self) -> u32 {
        self.uniform_alignment
    }

    fn create_buffer(&mut self, desc: &BufferDesc<'_>) -> Result<BufferId, GpuError> {
        self.device.push_error_scope(wgpu::ErrorFilter::Validation);
        let buffer = self.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some(desc.label),
            size: desc.size,
            usage: desc.usage,
            mapped_at_creation: false,
        });
        self.check_validation("buffer")?;

        let id = BufferId::from_raw(self.next_raw());
        self.buffers.insert(id, buffer);
        Ok(id)
    }

    fn destroy_buffer(&mut self, buffer: BufferId) {
        if let Some(buf) = self.buffers.remove(&buffer) {
            buf.destroy();
        }
    }

    fn write_buffer(&mut self, buffer: BufferId, offset: u64, data: &[u8]) -> Result<(), GpuError> {
        let buf = lookup(&self.buffers, buffer, "buffer", buffer.raw())?;
        let size = buf.size();
        let len = data.len() as u64;
        if offset.checked_add(len).map_or(true, |end| end > size) {
            return Err(GpuError::WriteOutOfBounds { offset, len, size });
        }

        self.queue.write_buffer(buf, offset, data);
        Ok(())
    }

    fn create_shader(&mut self, label: &str, wgsl: &str) -> Result<ShaderId, GpuError> {
        self.device.push_error_scope(wgpu::ErrorFilter::Validation);
        let module = self
            .device
            .create_shader_module(wgpu::ShaderModuleDescriptor {
                label: Some(label),
                source: wgpu::ShaderSource::Wgsl(wgsl.into()),
            });
        self.check_validation("shader module")?;

        let id = ShaderId::from_raw(self.next_raw());
        self.shaders.insert(id, module);
        Ok(id)
    }

    fn destroy_shader(&mut self, shader: ShaderId) {
        self.shaders.remove(&shader);
    }

    fn create_solid_texture(&mut self, label: &str, rgba: [u8; 4]) -> Result<TextureId, GpuError> {
        let size = wgpu::Extent3d {
            width: 1,
            height: 1,
            depth_or_array_layers: 1,
        };
        let texture = self.device.create_texture(&wgpu::TextureDescriptor {
            label: Some(label),
            size,
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: wgpu::TextureFormat::Rgba8Unorm,
            usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
            view_formats: &[],
        });

        self.queue.write_texture(
            wgpu::TexelCopyTextureInfo {
                texture: &texture,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            &rgba,
            wgpu::TexelCopyBufferLayout {
                offset: 0,
                bytes_per_row: Some(4),
                rows_per_image: Some(1),
            },
            size,
        );

        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
        let id = TextureId::from_raw(self.next_raw());
        self.textures.insert(
            id,
            SolidTexture {
                _texture: texture,
                view,
            },
        );
        Ok(id)
    }

    fn destroy_texture(&mut self, texture: TextureId) {
        self.textures.remove(&texture);
    }

    fn create_sampler(&mut self, label: &str) -> Result<SamplerId, GpuError> {
        let sampler = self.device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some(label),
            address_mode_u: wgpu::AddressMode::Repeat,
            address_mode_v: wgpu::AddressMode::Repeat,
            address_mode_w: wgpu::AddressMode::Repeat,
            mag_filter: wgpu::FilterMode::Linear,
            min_filter: wgpu::FilterMode::Linear,
            mipmap_filter: wgpu::FilterMode::Linear,
            ..Default::default()
        });

        let id = SamplerId::from_raw(self.next_raw());
        self.samplers.insert(id, sampler);
        Ok(id)
    }

    fn destroy_sampler(&mut self, sampler: SamplerId) {
        self.samplers.remove(&sampler);
    }

    fn create_bind_group_layout(
        &mut self,
        desc: &BindGroupLayoutDesc<'_>,
    ) -> Result<BindGroupLayoutId, GpuError> {
        let entries: Vec<_> = desc.entries.iter().map(layout_entry).collect();

        self.device.push_error_scope(wgpu::ErrorFilter::Validation);
        let layout = self
            .device
            .create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
                label: Some(desc.label),
                entries: &entries,
            });
        self.check_validation("bind group layout")?;

        let id = BindGroupLayoutId::from_raw(self.next_raw());
        self.bind_group_layouts.insert(id, layout);
        Ok(id)
    }

    fn destroy_bind_group_layout(&mut self, layout: BindGroupLayoutId) {
        self.bind_group_layouts.remove(&layout);
    }

    fn create_bind_group(&mut self, desc: &BindGroupDesc<'_>) -> Result<BindGroupId, GpuError> {
        let layout = lookup(
            &self.bind_group_layouts,
            desc.layout,
            "bind group layout",
            desc.layout.raw(),
        )?;

        let mut entries = Vec::with_capacity(desc.entries.len());
        for entry in desc.entries {
            let resource = match entry.resource {
                BindingResource::Buffer {
                    buffer,
                    offset,
                    size,
                } => wgpu::BindingResource::Buffer(wgpu::BufferBinding {
                    buffer: lookup(&self.buffers, buffer, "buffer", buffer.raw())?,
                    offset,
                    size: size.and_then(NonZeroU64::new),
                }),
                BindingResource::Texture(texture) => wgpu::BindingResource::TextureView(
                    &lookup(&self.textures, texture, "texture", texture.raw())?.view,
                ),
                BindingResource::Sampler(sampler) => wgpu::BindingResource::Sampler(lookup(
                    &self.samplers,
                    sampler,
                    "sampler",
                    sampler.raw(),
                )?),
            };
            entries.push(wgpu::BindGroupEntry {
                binding: entry.binding,
                resource,
            });
        }

        self.device.push_error_scope(wgpu::ErrorFilter::Validation);
        let group = self.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some(desc.label),
            layout,
            entries: &entries,
        });
        drop(entries);
        self.check_validation("bind group")?;

        let id = BindGroupId::from_raw(self.next_raw());
        self.bind_groups.insert(id, group);
        Ok(id)
    }

    fn destroy_bind_group(&mut self, group: BindGroupId) {
        if self.is_pending(group) {
            self.retired_bind_groups.push(group);
        } else {
            self.bind_groups.remove(&group);
        }
    }

    fn create_pipeline_layout(
        &mut self,
        label: &str,
        bind_group_layouts: &[BindGroupLayoutId],
    ) -> Result<PipelineLayoutId, GpuError> {
        let mut layouts = Vec::with_capacity(bind_group_layouts.len());
        for id in bind_group_layouts {
            layouts.push(lookup(
                &self.bind_group_layouts,
                *id,
                "bind group layout",
                id.raw(),
            )?);
        }

        let layout = self
            .device
            .create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
                label: Some(label),
                bind_group_layouts: &layouts,
                push_constant_ranges: &[],
            });
        drop(layouts);

        let id = PipelineLayoutId::from_raw(self.next_raw());
        self.pipeline_layouts.insert(id, layout);
        Ok(id)
    }

    fn destroy_pipeline_layout(&mut self, layout: PipelineLayoutId) {
        self.pipeline_layouts.remove(&layout);
    }

    fn create_pipeline(
        &mut self,
        layout: PipelineLayoutId,
        spec: &PipelineSpec,
    ) -> Result<PipelineId, GpuError> {
        let pipeline_layout = lookup(&self.pipeline_layouts, layout, "pipeline layout", layout.raw())?;
        let shader = lookup(&self.shaders, spec.shader(), "shader", spec.shader().raw())?;

        let label = if spec.alpha_blend() {
            "ModelBatchBlendedPipeline"
        } else {
            "ModelBatchOpaquePipeline"
        };
        let builder = PipelineBuilder::from_spec(spec, self.depth_format).with_label(label);

        self.device.push_error_scope(wgpu::ErrorFilter::Validation);
        let pipeline = builder.build(&self.device, pipeline_layout, shader);
        self.check_validation("render pipeline")?;

        let id = PipelineId::from_raw(self.next_raw());
        self.pipelines.insert(id, pipeline);
        log::info!(
            "Created render pipeline {} ({} vertex attributes, {:?}, depth test {})",
            id.raw(),
            spec.vertex_layout().attribute_count(),
            spec.topology(),
            spec.depth_test()
        );
        Ok(id)
    }

    fn destroy_pipeline(&mut self, pipeline: PipelineId) {
        self.pipelines.remove(&pipeline);
    }

    fn set_pipeline(&mut self, pipeline: PipelineId) {
        self.commands.push(GpuCommand::SetPipeline(pipeline));
    }

    fn set_bind_group(&mut self, index: u32, group: BindGroupId, dynamic_offsets: &[u32]) {
        self.commands.push(GpuCommand::SetBindGroup {
            index,
            group,
            offsets: dynamic_offsets.to_vec(),
        });
    }

    fn set_vertex_buffer(&mut self, slot: u32, buffer: BufferId) {
        self.commands.push(GpuCommand::SetVertexBuffer { slot, buffer });
    }

    fn set_index_buffer(&mut self, buffer: BufferId, format: wgpu::IndexFormat) {
        self.commands.push(GpuCommand::SetIndexBuffer { buffer, format });
    }

    fn draw(&mut self, vertices: Range<u32>, instances: Range<u32>) {
        self.commands.push(GpuCommand::Draw {
            vertices,
            instances,
        });
    }

    fn draw_indexed(&mut self, indices: Range<u32>, base_vertex: i32, instances: Range<u32>) {
        self.commands.push(GpuCommand::DrawIndexed {
            indices,
            base_vertex,
            instances,
        });
    }

    fn command_mark(&self) -> usize {
        self.commands.len()
    }

    fn discard_commands_from(&mut self, mark: usize) {
        let dropped = self.commands.len().saturating_sub(mark);
        self.commands.truncate(mark);

        let retired = std::mem::take(&mut self.retired_bind_groups);
        for id in retired {
            if self.is_pending(id) {
                self.retired_bind_groups.push(id);
            } else {
                self.bind_groups.remove(&id);
            }
        }
        if dropped > 0 {
            log::debug!("Discarded {} pending pass commands", dropped);
        }
    }
}

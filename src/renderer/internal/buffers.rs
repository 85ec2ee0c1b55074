use std::mem;

use glam::Mat4;

use crate::environment::Environment;
use crate::gpu::{
    BindGroupDesc, BindGroupEntry, BindGroupId, BindGroupLayoutDesc, BindGroupLayoutId,
    BindingResource, BufferDesc, BufferId, GpuError, GpuFacade, LayoutEntry, LayoutEntryKind,
    SamplerId, TextureId,
};
use crate::renderer::camera::Camera;
use crate::renderer::error::{BatchError, Resource};
use crate::renderer::material::{Material, MaterialUniform};
use crate::renderer::uniforms::{FrameUniform, InstanceRaw};

/// Rounds `size` up to the next multiple of `alignment`. An alignment of
/// zero is treated as one.
pub fn align_to(size: u64, alignment: u64) -> u64 {
    let alignment = alignment.max(1);
    size.div_ceil(alignment) * alignment
}

const FRAME_UNIFORM_SIZE: u64 = mem::size_of::<FrameUniform>() as u64;
const MATERIAL_UNIFORM_SIZE: u64 = mem::size_of::<MaterialUniform>() as u64;
const INSTANCE_STRIDE: u64 = mem::size_of::<InstanceRaw>() as u64;

pub(crate) struct FrameBuffer {
    pub(crate) buffer: BufferId,
    pub(crate) stride: u64,
    pub(crate) bind_group: BindGroupId,
    pub(crate) bind_layout: BindGroupLayoutId,
}

impl FrameBuffer {
    fn new<G: GpuFacade + ?Sized>(gpu: &mut G, alignment: u64) -> Result<Self, GpuError> {
        let stride = align_to(FRAME_UNIFORM_SIZE, alignment);
        let buffer = gpu.create_buffer(&BufferDesc {
            label: "FrameUniformBuffer",
            size: stride,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
        })?;

        let bind_layout = gpu.create_bind_group_layout(&BindGroupLayoutDesc {
            label: "FrameBindLayout",
            entries: &[LayoutEntry {
                binding: 0,
                visibility: wgpu::ShaderStages::VERTEX | wgpu::ShaderStages::FRAGMENT,
                kind: LayoutEntryKind::UniformBuffer {
                    has_dynamic_offset: false,
                    min_binding_size: FRAME_UNIFORM_SIZE,
                },
            }],
        })?;

        let bind_group = gpu.create_bind_group(&BindGroupDesc {
            label: "FrameBindGroup",
            layout: bind_layout,
            entries: &[BindGroupEntry {
                binding: 0,
                resource: BindingResource::Buffer {
                    buffer,
                    offset: 0,
                    size: Some(FRAME_UNIFORM_SIZE),
                },
            }],
        })?;

        Ok(Self {
            buffer,
            stride,
            bind_group,
            bind_layout,
        })
    }
}

/// 1x1 textures bound in place of a material's missing maps.
pub(crate) struct FallbackTextures {
    pub(crate) white: TextureId,
    pub(crate) flat_normal: TextureId,
    pub(crate) black: TextureId,
    pub(crate) sampler: SamplerId,
}

pub(crate) struct MaterialBuffer {
    pub(crate) buffer: BufferId,
    pub(crate) stride: u64,
    pub(crate) capacity: u32,
    pub(crate) bind_layout: BindGroupLayoutId,
    pub(crate) fallback: FallbackTextures,
}

impl MaterialBuffer {
    fn new<G: GpuFacade + ?Sized>(
        gpu: &mut G,
        alignment: u64,
        capacity: u32,
    ) -> Result<Self, GpuError> {
        let stride = align_to(MATERIAL_UNIFORM_SIZE, alignment);
        let buffer = gpu.create_buffer(&BufferDesc {
            label: "MaterialUniformBuffer",
            size: stride * u64::from(capacity.max(1)),
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
        })?;

        let texture = |binding| LayoutEntry {
            binding,
            visibility: wgpu::ShaderStages::FRAGMENT,
            kind: LayoutEntryKind::Texture2d,
        };
        let bind_layout = gpu.create_bind_group_layout(&BindGroupLayoutDesc {
            label: "MaterialBindLayout",
            entries: &[
                LayoutEntry {
                    binding: 0,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    kind: LayoutEntryKind::UniformBuffer {
                        has_dynamic_offset: true,
                        min_binding_size: MATERIAL_UNIFORM_SIZE,
                    },
                },
                texture(1),
                texture(2),
                texture(3),
                LayoutEntry {
                    binding: 4,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    kind: LayoutEntryKind::FilteringSampler,
                },
            ],
        })?;

        let fallback = FallbackTextures {
            white: gpu.create_solid_texture("FallbackWhite", [255, 255, 255, 255])?,
            flat_normal: gpu.create_solid_texture("FallbackNormal", [128, 128, 255, 255])?,
            black: gpu.create_solid_texture("FallbackBlack", [0, 0, 0, 255])?,
            sampler: gpu.create_sampler("MaterialSampler")?,
        };

        Ok(Self {
            buffer,
            stride,
            capacity,
            bind_layout,
            fallback,
        })
    }
}

pub(crate) struct InstanceBuffer {
    pub(crate) buffer: BufferId,
    pub(crate) capacity: u32,
    pub(crate) bind_group: BindGroupId,
    pub(crate) bind_layout: BindGroupLayoutId,
}

impl InstanceBuffer {
    fn new<G: GpuFacade + ?Sized>(gpu: &mut G, capacity: u32) -> Result<Self, GpuError> {
        let size = INSTANCE_STRIDE * u64::from(capacity.max(1));
        let buffer = gpu.create_buffer(&BufferDesc {
            label: "InstanceStorageBuffer",
            size,
            usage: wgpu::BufferUsages::STORAGE | wgpu::BufferUsages::COPY_DST,
        })?;

        let bind_layout = gpu.create_bind_group_layout(&BindGroupLayoutDesc {
            label: "InstanceBindLayout",
            entries: &[LayoutEntry {
                binding: 0,
                visibility: wgpu::ShaderStages::VERTEX,
                kind: LayoutEntryKind::StorageBuffer {
                    min_binding_size: INSTANCE_STRIDE,
                },
            }],
        })?;

        let bind_group = gpu.create_bind_group(&BindGroupDesc {
            label: "InstanceBindGroup",
            layout: bind_layout,
            entries: &[BindGroupEntry {
                binding: 0,
                resource: BindingResource::Buffer {
                    buffer,
                    offset: 0,
                    size: None,
                },
            }],
        })?;

        Ok(Self {
            buffer,
            capacity,
            bind_group,
            bind_layout,
        })
    }
}

/// The three GPU buffers a batch owns for its whole lifetime: the frame
/// uniform, the material uniform array addressed with dynamic offsets, and
/// the instance transform storage buffer.
pub struct BatchBuffers {
    pub(crate) frame: FrameBuffer,
    pub(crate) materials: MaterialBuffer,
    pub(crate) instances: InstanceBuffer,
}

impl BatchBuffers {
    pub fn new<G: GpuFacade + ?Sized>(
        gpu: &mut G,
        max_materials: u32,
        max_instances: u32,
    ) -> Result<Self, GpuError> {
        let alignment = u64::from(gpu.min_uniform_buffer_offset_alignment());
        let frame = FrameBuffer::new(gpu, alignment)?;
        let materials = MaterialBuffer::new(gpu, alignment, max_materials)?;
        let instances = InstanceBuffer::new(gpu, max_instances)?;

        log::info!(
            "Batch buffers allocated: frame stride {} B, {} material slots x {} B, {} instance slots x {} B",
            frame.stride,
            materials.capacity,
            materials.stride,
            instances.capacity,
            INSTANCE_STRIDE
        );

        Ok(Self {
            frame,
            materials,
            instances,
        })
    }

    pub fn frame_buffer(&self) -> BufferId {
        self.frame.buffer
    }

    pub fn frame_stride(&self) -> u64 {
        self.frame.stride
    }

    pub fn material_buffer(&self) -> BufferId {
        self.materials.buffer
    }

    pub fn material_stride(&self) -> u64 {
        self.materials.stride
    }

    pub fn material_capacity(&self) -> u32 {
        self.materials.capacity
    }

    pub fn instance_buffer(&self) -> BufferId {
        self.instances.buffer
    }

    pub fn instance_stride(&self) -> u64 {
        INSTANCE_STRIDE
    }

    pub fn instance_capacity(&self) -> u32 {
        self.instances.capacity
    }

    pub fn frame_bind_group(&self) -> BindGroupId {
        self.frame.bind_group
    }

    pub fn instance_bind_group(&self) -> BindGroupId {
        self.instances.bind_group
    }

    /// Layouts for groups 0, 1 and 2, in pipeline layout order.
    pub fn bind_group_layouts(&self) -> [BindGroupLayoutId; 3] {
        [
            self.frame.bind_layout,
            self.materials.bind_layout,
            self.instances.bind_layout,
        ]
    }

    pub fn write_frame_uniforms<G: GpuFacade + ?Sized>(
        &self,
        gpu: &mut G,
        camera: &Camera,
        environment: &Environment,
    ) -> Result<(), GpuError> {
        let uniform = FrameUniform::new(camera, environment);
        gpu.write_buffer(self.frame.buffer, 0, bytemuck::bytes_of(&uniform))
    }

    /// Writes `material` into `slot` and returns the dynamic offset that
    /// selects it.
    pub fn write_material_uniforms<G: GpuFacade + ?Sized>(
        &self,
        gpu: &mut G,
        material: &Material,
        slot: u32,
    ) -> Result<u32, BatchError> {
        if slot >= self.materials.capacity {
            return Err(BatchError::CapacityExceeded {
                resource: Resource::Materials,
                capacity: self.materials.capacity,
            });
        }

        let offset = u64::from(slot) * self.materials.stride;
        let uniform = MaterialUniform::from_material(material);
        gpu.write_buffer(self.materials.buffer, offset, bytemuck::bytes_of(&uniform))?;
        Ok(offset as u32)
    }

    pub fn write_instance_transform<G: GpuFacade + ?Sized>(
        &self,
        gpu: &mut G,
        transform: &Mat4,
        slot: u32,
    ) -> Result<(), BatchError> {
        self.write_instance_range(gpu, slot, &[InstanceRaw::from_transform(transform)])
    }

    /// Writes consecutive instance slots starting at `first` in one call.
    pub fn write_instance_range<G: GpuFacade + ?Sized>(
        &self,
        gpu: &mut G,
        first: u32,
        instances: &[InstanceRaw],
    ) -> Result<(), BatchError> {
        let end = u64::from(first) + instances.len() as u64;
        if end > u64::from(self.instances.capacity) {
            return Err(BatchError::CapacityExceeded {
                resource: Resource::Instances,
                capacity: self.instances.capacity,
            });
        }
        if instances.is_empty() {
            return Ok(());
        }

        let offset = u64::from(first) * INSTANCE_STRIDE;
        gpu.write_buffer(
            self.instances.buffer,
            offset,
            bytemuck::cast_slice(instances),
        )?;
        Ok(())
    }

    /// Bind group for `material`'s textures and its uniform block. The
    /// uniform binding is selected per draw with a dynamic offset.
    pub fn create_material_bind_group<G: GpuFacade + ?Sized>(
        &self,
        gpu: &mut G,
        material: &Material,
    ) -> Result<BindGroupId, GpuError> {
        let fallback = &self.materials.fallback;
        let diffuse = material.diffuse_texture.unwrap_or(fallback.white);
        let normal = material.normal_texture.unwrap_or(fallback.flat_normal);
        let emissive = material.emissive_texture.unwrap_or(fallback.black);

        gpu.create_bind_group(&BindGroupDesc {
            label: "MaterialBindGroup",
            layout: self.materials.bind_layout,
            entries: &[
                BindGroupEntry {
                    binding: 0,
                    resource: BindingResource::Buffer {
                        buffer: self.materials.buffer,
                        offset: 0,
                        size: Some(MATERIAL_UNIFORM_SIZE),
                    },
                },
                BindGroupEntry {
                    binding: 1,
                    resource: BindingResource::Texture(diffuse),
                },
                BindGroupEntry {
                    binding: 2,
                    resource: BindingResource::Texture(normal),
                },
                BindGroupEntry {
                    binding: 3,
                    resource: BindingResource::Texture(emissive),
                },
                BindGroupEntry {
                    binding: 4,
                    resource: BindingResource::Sampler(fallback.sampler),
                },
            ],
        })
    }

    pub fn destroy<G: GpuFacade + ?Sized>(self, gpu: &mut G) {
        gpu.destroy_bind_group(self.frame.bind_group);
        gpu.destroy_bind_group_layout(self.frame.bind_layout);
        gpu.destroy_buffer(self.frame.buffer);

        let fallback = self.materials.fallback;
        gpu.destroy_texture(fallback.white);
        gpu.destroy_texture(fallback.flat_normal);
        gpu.destroy_texture(fallback.black);
        gpu.destroy_sampler(fallback.sampler);
        gpu.destroy_bind_group_layout(self.materials.bind_layout);
        gpu.destroy_buffer(self.materials.buffer);

        gpu.destroy_bind_group(self.instances.bind_group);
        gpu.destroy_bind_group_layout(self.instances.bind_layout);
        gpu.destroy_buffer(self.instances.buffer);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gpu::RecordingGpu;

    #[test]
    fn align_to_rounds_up() {
        assert_eq!(align_to(32, 256), 256);
        assert_eq!(align_to(256, 256), 256);
        assert_eq!(align_to(257, 256), 512);
        assert_eq!(align_to(0, 256), 0);
        assert_eq!(align_to(7, 0), 7);
    }

    #[test]
    fn strides_follow_device_alignment() {
        let mut gpu = RecordingGpu::with_alignment(64);
        let buffers = BatchBuffers::new(&mut gpu, 8, 16).unwrap();

        assert_eq!(buffers.material_stride(), 64);
        assert_eq!(buffers.frame_stride(), align_to(FRAME_UNIFORM_SIZE, 64));
        assert_eq!(
            gpu.buffer_contents(buffers.material_buffer()).unwrap().len(),
            8 * 64
        );
        assert_eq!(
            gpu.buffer_contents(buffers.instance_buffer()).unwrap().len(),
            16 * 64
        );
    }

    #[test]
    fn material_slot_past_capacity_is_rejected() {
        let mut gpu = RecordingGpu::new();
        let buffers = BatchBuffers::new(&mut gpu, 2, 4).unwrap();
        let material = Material::white();

        assert_eq!(
            buffers.write_material_uniforms(&mut gpu, &material, 1).unwrap(),
            256
        );
        assert!(matches!(
            buffers.write_material_uniforms(&mut gpu, &material, 2),
            Err(BatchError::CapacityExceeded {
                resource: Resource::Materials,
                capacity: 2
            })
        ));
    }

    #[test]
    fn destroy_releases_everything() {
        let mut gpu = RecordingGpu::new();
        let buffers = BatchBuffers::new(&mut gpu, 4, 4).unwrap();
        assert!(gpu.live_objects() > 0);

        buffers.destroy(&mut gpu);
        assert_eq!(gpu.live_objects(), 0);
    }
}

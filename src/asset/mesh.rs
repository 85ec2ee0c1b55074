use bytemuck::Pod;

use super::Handle;
use crate::gpu::{BufferDesc, BufferId, GpuError, GpuFacade};
use crate::renderer::{align_to, VertexLayoutDescriptor};

/// Index data handed to [`Mesh::upload`].
#[derive(Debug, Clone, Copy)]
pub enum Indices<'a> {
    None,
    U16(&'a [u16]),
    U32(&'a [u32]),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IndexBuffer {
    pub buffer: BufferId,
    pub format: wgpu::IndexFormat,
    pub count: u32,
}

/// Vertex (and optional index) data resident on the GPU.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Mesh {
    vertex_buffer: BufferId,
    vertex_count: u32,
    index_buffer: Option<IndexBuffer>,
    layout: VertexLayoutDescriptor,
}

impl Mesh {
    pub fn upload<G, V>(
        gpu: &mut G,
        label: &str,
        vertices: &[V],
        indices: Indices<'_>,
        layout: VertexLayoutDescriptor,
    ) -> Result<Self, GpuError>
    where
        G: GpuFacade + ?Sized,
        V: Pod,
    {
        debug_assert_eq!(
            layout.stride(),
            std::mem::size_of::<V>() as wgpu::BufferAddress,
            "vertex layout stride does not match the vertex type"
        );

        let vertex_buffer = upload_bytes(
            gpu,
            label,
            bytemuck::cast_slice(vertices),
            wgpu::BufferUsages::VERTEX,
        )?;

        let index_buffer = match indices {
            Indices::None => None,
            Indices::U16(data) => Some(IndexBuffer {
                buffer: upload_bytes(
                    gpu,
                    label,
                    bytemuck::cast_slice(data),
                    wgpu::BufferUsages::INDEX,
                )?,
                format: wgpu::IndexFormat::Uint16,
                count: data.len() as u32,
            }),
            Indices::U32(data) => Some(IndexBuffer {
                buffer: upload_bytes(
                    gpu,
                    label,
                    bytemuck::cast_slice(data),
                    wgpu::BufferUsages::INDEX,
                )?,
                format: wgpu::IndexFormat::Uint32,
                count: data.len() as u32,
            }),
        };

        Ok(Self {
            vertex_buffer,
            vertex_count: vertices.len() as u32,
            index_buffer,
            layout,
        })
    }

    pub fn vertex_buffer(&self) -> BufferId {
        self.vertex_buffer
    }

    pub fn vertex_count(&self) -> u32 {
        self.vertex_count
    }

    pub fn index_buffer(&self) -> Option<&IndexBuffer> {
        self.index_buffer.as_ref()
    }

    pub fn index_count(&self) -> u32 {
        self.index_buffer.map_or(0, |ib| ib.count)
    }

    pub fn is_indexed(&self) -> bool {
        self.index_buffer.is_some()
    }

    pub fn layout(&self) -> &VertexLayoutDescriptor {
        &self.layout
    }

    /// Number of elements a [`GeometryRange`] over this mesh counts in:
    /// indices for indexed meshes, vertices otherwise.
    pub fn element_count(&self) -> u32 {
        match self.index_buffer {
            Some(ib) => ib.count,
            None => self.vertex_count,
        }
    }

    pub fn destroy<G: GpuFacade + ?Sized>(&self, gpu: &mut G) {
        gpu.destroy_buffer(self.vertex_buffer);
        if let Some(ib) = self.index_buffer {
            gpu.destroy_buffer(ib.buffer);
        }
    }
}

/// Buffer writes must be a multiple of four bytes, so odd u16 index counts
/// get zero padding.
fn upload_bytes<G: GpuFacade + ?Sized>(
    gpu: &mut G,
    label: &str,
    bytes: &[u8],
    usage: wgpu::BufferUsages,
) -> Result<BufferId, GpuError> {
    let size = align_to(bytes.len() as u64, wgpu::COPY_BUFFER_ALIGNMENT)
        .max(wgpu::COPY_BUFFER_ALIGNMENT);
    let buffer = gpu.create_buffer(&BufferDesc {
        label,
        size,
        usage: usage | wgpu::BufferUsages::COPY_DST,
    })?;

    if bytes.len() as u64 == size {
        gpu.write_buffer(buffer, 0, bytes)?;
    } else {
        let mut padded = bytes.to_vec();
        padded.resize(size as usize, 0);
        gpu.write_buffer(buffer, 0, &padded)?;
    }
    Ok(buffer)
}

/// Contiguous run of indices (or vertices, for non-indexed meshes) inside a
/// [`Mesh`]. Drawables are batched by the identity of their range handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GeometryRange {
    pub mesh: Handle<Mesh>,
    pub offset: u32,
    pub count: u32,
    pub topology: wgpu::PrimitiveTopology,
}

impl GeometryRange {
    pub fn new(mesh: Handle<Mesh>, offset: u32, count: u32) -> Self {
        Self {
            mesh,
            offset,
            count,
            topology: wgpu::PrimitiveTopology::TriangleList,
        }
    }

    /// The whole of `data`, as a triangle list.
    pub fn whole(mesh: Handle<Mesh>, data: &Mesh) -> Self {
        Self::new(mesh, 0, data.element_count())
    }

    pub fn with_topology(mut self, topology: wgpu::PrimitiveTopology) -> Self {
        self.topology = topology;
        self
    }

    pub fn elements(&self) -> std::ops::Range<u32> {
        self.offset..self.offset + self.count
    }
}

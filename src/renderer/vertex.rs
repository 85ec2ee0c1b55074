use std::sync::Arc;

use bytemuck::{Pod, Zeroable};

/// What a vertex attribute carries. Each semantic has a fixed shader
/// location in the built-in shaders.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VertexSemantic {
    Position,
    Normal,
    TexCoord,
    Tangent,
    Color,
}

impl VertexSemantic {
    pub const fn shader_location(self) -> u32 {
        match self {
            VertexSemantic::Position => 0,
            VertexSemantic::Normal => 1,
            VertexSemantic::TexCoord => 2,
            VertexSemantic::Tangent => 3,
            VertexSemantic::Color => 4,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct VertexAttributeDesc {
    pub semantic: VertexSemantic,
    pub format: wgpu::VertexFormat,
    pub offset: wgpu::BufferAddress,
}

/// Ordered list of vertex attributes for one interleaved vertex buffer.
///
/// Half of a pipeline's identity: two meshes with equal descriptors share
/// pipelines. The attribute list is shared, so cloning a descriptor into a
/// pipeline key does not allocate.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct VertexLayoutDescriptor {
    attributes: Arc<[VertexAttributeDesc]>,
    stride: wgpu::BufferAddress,
}

impl Default for VertexLayoutDescriptor {
    fn default() -> Self {
        Self {
            attributes: Arc::from(Vec::new()),
            stride: 0,
        }
    }
}

impl VertexLayoutDescriptor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends an attribute packed directly after the previous one.
    pub fn with(mut self, semantic: VertexSemantic, format: wgpu::VertexFormat) -> Self {
        let mut attributes = self.attributes.to_vec();
        attributes.push(VertexAttributeDesc {
            semantic,
            format,
            offset: self.stride,
        });
        self.attributes = attributes.into();
        self.stride += format.size();
        self
    }

    /// Position, normal and texture coordinates, matching [`Vertex`].
    pub fn standard() -> Self {
        Self::new()
            .with(VertexSemantic::Position, wgpu::VertexFormat::Float32x3)
            .with(VertexSemantic::Normal, wgpu::VertexFormat::Float32x3)
            .with(VertexSemantic::TexCoord, wgpu::VertexFormat::Float32x2)
    }

    /// [`standard`](Self::standard) plus a tangent, matching [`TangentVertex`].
    pub fn normal_mapped() -> Self {
        Self::standard().with(VertexSemantic::Tangent, wgpu::VertexFormat::Float32x4)
    }

    pub fn attributes(&self) -> &[VertexAttributeDesc] {
        &self.attributes
    }

    pub fn attribute_count(&self) -> usize {
        self.attributes.len()
    }

    pub fn stride(&self) -> wgpu::BufferAddress {
        self.stride
    }

    pub fn contains(&self, semantic: VertexSemantic) -> bool {
        self.attributes.iter().any(|attr| attr.semantic == semantic)
    }

    /// Tangents are what the normal-mapped shader needs on top of the
    /// standard inputs.
    pub fn has_normal_map(&self) -> bool {
        self.contains(VertexSemantic::Tangent)
    }

    pub fn to_wgpu_attributes(&self) -> Vec<wgpu::VertexAttribute> {
        self.attributes
            .iter()
            .map(|attr| wgpu::VertexAttribute {
                format: attr.format,
                offset: attr.offset,
                shader_location: attr.semantic.shader_location(),
            })
            .collect()
    }
}

#[repr(C)]
#[derive(Clone, Copy, Pod, Zeroable, Debug)]
pub struct Vertex {
    pub pos: [f32; 3],
    pub normal: [f32; 3],
    pub uv: [f32; 2],
}

#[repr(C)]
#[derive(Clone, Copy, Pod, Zeroable, Debug)]
pub struct TangentVertex {
    pub pos: [f32; 3],
    pub normal: [f32; 3],
    pub uv: [f32; 2],
    pub tangent: [f32; 4],
}

impl From<TangentVertex> for Vertex {
    fn from(v: TangentVertex) -> Self {
        Self {
            pos: v.pos,
            normal: v.normal,
            uv: v.uv,
        }
    }
}

#[inline]
pub fn v(pos: [f32; 3], normal: [f32; 3], uv: [f32; 2], tangent: [f32; 4]) -> TangentVertex {
    TangentVertex {
        pos,
        normal,
        uv,
        tangent,
    }
}

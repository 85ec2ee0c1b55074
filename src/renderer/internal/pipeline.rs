use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::gpu::{GpuError, GpuFacade, PipelineId, PipelineLayoutId, ShaderId};
use crate::renderer::VertexLayoutDescriptor;

/// Structural description of a render pipeline. Equal specs always map to
/// the same cached pipeline.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PipelineSpec {
    vertex_layout: VertexLayoutDescriptor,
    shader: ShaderId,
    depth_test: bool,
    cull_mode: Option<wgpu::Face>,
    color_format: wgpu::TextureFormat,
    sample_count: u32,
    topology: wgpu::PrimitiveTopology,
    alpha_blend: bool,
}

impl PipelineSpec {
    pub fn new(vertex_layout: VertexLayoutDescriptor, shader: ShaderId) -> Self {
        Self {
            vertex_layout,
            shader,
            depth_test: true,
            cull_mode: Some(wgpu::Face::Back),
            color_format: wgpu::TextureFormat::Bgra8UnormSrgb,
            sample_count: 1,
            topology: wgpu::PrimitiveTopology::TriangleList,
            alpha_blend: false,
        }
    }

    pub fn with_depth_test(mut self, enabled: bool) -> Self {
        self.depth_test = enabled;
        self
    }

    pub fn with_cull_mode(mut self, cull_mode: Option<wgpu::Face>) -> Self {
        self.cull_mode = cull_mode;
        self
    }

    pub fn with_color_format(mut self, format: wgpu::TextureFormat) -> Self {
        self.color_format = format;
        self
    }

    pub fn with_sample_count(mut self, sample_count: u32) -> Self {
        self.sample_count = sample_count;
        self
    }

    pub fn with_topology(mut self, topology: wgpu::PrimitiveTopology) -> Self {
        self.topology = topology;
        self
    }

    pub fn with_alpha_blend(mut self, alpha_blend: bool) -> Self {
        self.alpha_blend = alpha_blend;
        self
    }

    pub fn vertex_layout(&self) -> &VertexLayoutDescriptor {
        &self.vertex_layout
    }

    pub fn shader(&self) -> ShaderId {
        self.shader
    }

    pub fn depth_test(&self) -> bool {
        self.depth_test
    }

    pub fn cull_mode(&self) -> Option<wgpu::Face> {
        self.cull_mode
    }

    pub fn color_format(&self) -> wgpu::TextureFormat {
        self.color_format
    }

    pub fn sample_count(&self) -> u32 {
        self.sample_count
    }

    pub fn topology(&self) -> wgpu::PrimitiveTopology {
        self.topology
    }

    pub fn alpha_blend(&self) -> bool {
        self.alpha_blend
    }

    /// Attribute count, tangent presence and depth flag only. Everything
    /// else is ignored, so two different specs can match.
    fn coarse_eq(&self, other: &Self) -> bool {
        self.vertex_layout.attribute_count() == other.vertex_layout.attribute_count()
            && self.vertex_layout.has_normal_map() == other.vertex_layout.has_normal_map()
            && self.depth_test == other.depth_test
    }
}

/// How the cache decides a stored pipeline can serve a new spec.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineMatch {
    /// Full [`PipelineSpec`] equality.
    #[default]
    Exact,
    /// Attribute count, normal-map presence and depth flag. Pipelines that
    /// differ in anything else are wrongly shared.
    Coarse,
}

#[derive(Debug, Clone)]
pub struct CachedPipeline {
    spec: PipelineSpec,
    handle: PipelineId,
}

impl CachedPipeline {
    pub fn spec(&self) -> &PipelineSpec {
        &self.spec
    }

    pub fn handle(&self) -> PipelineId {
        self.handle
    }
}

/// Lazily creates one pipeline per distinct spec and keeps it until
/// [`clear`](Self::clear).
pub struct PipelineCache {
    policy: PipelineMatch,
    layout: PipelineLayoutId,
    pipelines: Vec<CachedPipeline>,
    index: HashMap<PipelineSpec, usize>,
}

impl PipelineCache {
    pub fn new(layout: PipelineLayoutId, policy: PipelineMatch) -> Self {
        Self {
            policy,
            layout,
            pipelines: Vec::new(),
            index: HashMap::new(),
        }
    }

    pub fn policy(&self) -> PipelineMatch {
        self.policy
    }

    pub fn layout(&self) -> PipelineLayoutId {
        self.layout
    }

    pub fn len(&self) -> usize {
        self.pipelines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pipelines.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &CachedPipeline> {
        self.pipelines.iter()
    }

    /// Returns the pipeline serving `spec`, creating it on a miss.
    pub fn get_pipeline<G: GpuFacade + ?Sized>(
        &mut self,
        gpu: &mut G,
        spec: &PipelineSpec,
    ) -> Result<&CachedPipeline, GpuError> {
        if let Some(slot) = self.find(spec) {
            return Ok(&self.pipelines[slot]);
        }

        let handle = gpu.create_pipeline(self.layout, spec)?;
        let slot = self.pipelines.len();
        self.pipelines.push(CachedPipeline {
            spec: spec.clone(),
            handle,
        });
        self.index.insert(spec.clone(), slot);
        log::debug!("Pipeline cache miss, {} pipelines cached", self.pipelines.len());

        Ok(&self.pipelines[slot])
    }

    fn find(&self, spec: &PipelineSpec) -> Option<usize> {
        match self.policy {
            PipelineMatch::Exact => self.index.get(spec).copied(),
            PipelineMatch::Coarse => self
                .pipelines
                .iter()
                .position(|cached| cached.spec.coarse_eq(spec)),
        }
    }

    /// Destroys every cached pipeline. The next lookup recreates them.
    pub fn clear<G: GpuFacade + ?Sized>(&mut self, gpu: &mut G) {
        for cached in self.pipelines.drain(..) {
            gpu.destroy_pipeline(cached.handle);
        }
        self.index.clear();
    }
}

use std::collections::{HashMap, HashSet};
use std::ops::Range;

use super::{
    BindGroupDesc, BindGroupEntry, BindGroupId, BindGroupLayoutDesc, BindGroupLayoutId,
    BufferDesc, BufferId, GpuCommand, GpuError, GpuFacade, PipelineId, PipelineLayoutId,
    SamplerId, ShaderId, TextureId,
};
use crate::renderer::PipelineSpec;

/// Headless [`GpuFacade`] that keeps buffer contents in memory and logs
/// every pass command instead of sending it to a device.
pub struct RecordingGpu {
    uniform_alignment: u32,
    next_id: u32,
    buffers: HashMap<BufferId, Vec<u8>>,
    shaders: HashMap<ShaderId, String>,
    textures: HashMap<TextureId, [u8; 4]>,
    samplers: HashSet<SamplerId>,
    bind_group_layouts: HashSet<BindGroupLayoutId>,
    bind_groups: HashMap<BindGroupId, Vec<BindGroupEntry>>,
    pipeline_layouts: HashSet<PipelineLayoutId>,
    pipelines: HashMap<PipelineId, PipelineSpec>,
    commands: Vec<GpuCommand>,
    pipelines_created: usize,
    bind_groups_created: usize,
    /// `pipelines_created` value at which `create_pipeline` starts failing.
    pipeline_limit: Option<usize>,
}

impl RecordingGpu {
    /// 256 is the WebGPU default for `min_uniform_buffer_offset_alignment`.
    pub const DEFAULT_UNIFORM_ALIGNMENT: u32 = 256;

    pub fn new() -> Self {
        Self::with_alignment(Self::DEFAULT_UNIFORM_ALIGNMENT)
    }

    pub fn with_alignment(uniform_alignment: u32) -> Self {
        Self {
            uniform_alignment,
            next_id: 0,
            buffers: HashMap::new(),
            shaders: HashMap::new(),
            textures: HashMap::new(),
            samplers: HashSet::new(),
            bind_group_layouts: HashSet::new(),
            bind_groups: HashMap::new(),
            pipeline_layouts: HashSet::new(),
            pipelines: HashMap::new(),
            commands: Vec::new(),
            pipelines_created: 0,
            bind_groups_created: 0,
            pipeline_limit: None,
        }
    }

    /// Makes every following `create_pipeline` call fail, mimicking a driver
    /// rejecting the pipeline.
    pub fn set_fail_pipeline_creation(&mut self, fail: bool) {
        self.pipeline_limit = fail.then_some(self.pipelines_created);
    }

    /// Lets `create_pipeline` succeed until `limit` pipelines have been
    /// created in total, then fails like
    /// [`set_fail_pipeline_creation`](Self::set_fail_pipeline_creation).
    pub fn set_pipeline_limit(&mut self, limit: usize) {
        self.pipeline_limit = Some(limit);
    }

    pub fn commands(&self) -> &[GpuCommand] {
        &self.commands
    }

    pub fn take_commands(&mut self) -> Vec<GpuCommand> {
        std::mem::take(&mut self.commands)
    }

    pub fn draw_commands(&self) -> impl Iterator<Item = &GpuCommand> {
        self.commands.iter().filter(|cmd| cmd.is_draw())
    }

    pub fn buffer_contents(&self, buffer: BufferId) -> Option<&[u8]> {
        self.buffers.get(&buffer).map(Vec::as_slice)
    }

    pub fn read_buffer(&self, buffer: BufferId, offset: u64, len: u64) -> Option<&[u8]> {
        let contents = self.buffers.get(&buffer)?;
        let start = usize::try_from(offset).ok()?;
        let end = start.checked_add(usize::try_from(len).ok()?)?;
        contents.get(start..end)
    }

    pub fn bind_group_entries(&self, group: BindGroupId) -> Option<&[BindGroupEntry]> {
        self.bind_groups.get(&group).map(Vec::as_slice)
    }

    pub fn pipeline_spec(&self, pipeline: PipelineId) -> Option<&PipelineSpec> {
        self.pipelines.get(&pipeline)
    }

    pub fn pipelines_created(&self) -> usize {
        self.pipelines_created
    }

    pub fn bind_groups_created(&self) -> usize {
        self.bind_groups_created
    }

    pub fn live_buffers(&self) -> usize {
        self.buffers.len()
    }

    pub fn live_bind_groups(&self) -> usize {
        self.bind_groups.len()
    }

    pub fn live_pipelines(&self) -> usize {
        self.pipelines.len()
    }

    /// Count of every object still alive, across all kinds.
    pub fn live_objects(&self) -> usize {
        self.buffers.len()
            + self.shaders.len()
            + self.textures.len()
            + self.samplers.len()
            + self.bind_group_layouts.len()
            + self.bind_groups.len()
            + self.pipeline_layouts.len()
            + self.pipelines.len()
    }

    fn next_raw(&mut self) -> u32 {
        self.next_id += 1;
        self.next_id
    }
}

impl Default for RecordingGpu {
    fn default() -> Self {
        Self::new()
    }
}

impl GpuFacade for RecordingGpu {
    fn min_uniform_buffer_offset_alignment(&self) -> u32 {
        self.uniform_alignment
    }

    fn create_buffer(&mut self, desc: &BufferDesc<'_>) -> Result<BufferId, GpuError> {
        let size = usize::try_from(desc.size).map_err(|_| GpuError::Creation {
            kind: "buffer",
            message: format!("{} bytes requested for {}", desc.size, desc.label),
        })?;
        let id = BufferId::from_raw(self.next_raw());
        self.buffers.insert(id, vec![0; size]);
        Ok(id)
    }

    fn destroy_buffer(&mut self, buffer: BufferId) {
        self.buffers.remove(&buffer);
    }

    fn write_buffer(&mut self, buffer: BufferId, offset: u64, data: &[u8]) -> Result<(), GpuError> {
        let contents = self
            .buffers
            .get_mut(&buffer)
            .ok_or(GpuError::UnknownHandle {
                kind: "buffer",
                id: buffer.raw(),
            })?;

        let size = contents.len() as u64;
        let len = data.len() as u64;
        if offset.checked_add(len).map_or(true, |end| end > size) {
            return Err(GpuError::WriteOutOfBounds { offset, len, size });
        }

        let start = offset as usize;
        contents[start..start + data.len()].copy_from_slice(data);
        Ok(())
    }

    fn create_shader(&mut self, _label: &str, wgsl: &str) -> Result<ShaderId, GpuError> {
        let id = ShaderId::from_raw(self.next_raw());
        self.shaders.insert(id, wgsl.to_owned());
        Ok(id)
    }

    fn destroy_shader(&mut self, shader: ShaderId) {
        self.shaders.remove(&shader);
    }

    fn create_solid_texture(&mut self, _label: &str, rgba: [u8; 4]) -> Result<TextureId, GpuError> {
        let id = TextureId::from_raw(self.next_raw());
        self.textures.insert(id, rgba);
        Ok(id)
    }

    fn destroy_texture(&mut self, texture: TextureId) {
        self.textures.remove(&texture);
    }

    fn create_sampler(&mut self, _label: &str) -> Result<SamplerId, GpuError> {
        let id = SamplerId::from_raw(self.next_raw());
        self.samplers.insert(id);
        Ok(id)
    }

    fn destroy_sampler(&mut self, sampler: SamplerId) {
        self.samplers.remove(&sampler);
    }

    fn create_bind_group_layout(
        &mut self,
        _desc: &BindGroupLayoutDesc<'_>,
    ) -> Result<BindGroupLayoutId, GpuError> {
        let id = BindGroupLayoutId::from_raw(self.next_raw());
        self.bind_group_layouts.insert(id);
        Ok(id)
    }

    fn destroy_bind_group_layout(&mut self, layout: BindGroupLayoutId) {
        self.bind_group_layouts.remove(&layout);
    }

    fn create_bind_group(&mut self, desc: &BindGroupDesc<'_>) -> Result<BindGroupId, GpuError> {
        if !self.bind_group_layouts.contains(&desc.layout) {
            return Err(GpuError::UnknownHandle {
                kind: "bind group layout",
                id: desc.layout.raw(),
            });
        }

        let id = BindGroupId::from_raw(self.next_raw());
        self.bind_groups.insert(id, desc.entries.to_vec());
        self.bind_groups_created += 1;
        Ok(id)
    }

    fn destroy_bind_group(&mut self, group: BindGroupId) {
        self.bind_groups.remove(&group);
    }

    fn create_pipeline_layout(
        &mut self,
        _label: &str,
        _bind_group_layouts: &[BindGroupLayoutId],
    ) -> Result<PipelineLayoutId, GpuError> {
        let id = PipelineLayoutId::from_raw(self.next_raw());
        self.pipeline_layouts.insert(id);
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
        if self
            .pipeline_limit
            .is_some_and(|limit| self.pipelines_created >= limit)
        {
            return Err(GpuError::Creation {
                kind: "render pipeline",
                message: "pipeline creation disabled on this device".into(),
            });
        }
        if !self.pipeline_layouts.contains(&layout) {
            return Err(GpuError::UnknownHandle {
                kind: "pipeline layout",
                id: layout.raw(),
            });
        }

        let id = PipelineId::from_raw(self.next_raw());
        self.pipelines.insert(id, spec.clone());
        self.pipelines_created += 1;
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
        self.commands.truncate(mark);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn write_buffer_rejects_out_of_bounds() {
        let mut gpu = RecordingGpu::new();
        let buffer = gpu
            .create_buffer(&BufferDesc {
                label: "test",
                size: 16,
                usage: wgpu::BufferUsages::UNIFORM,
            })
            .unwrap();

        assert!(gpu.write_buffer(buffer, 8, &[1; 8]).is_ok());
        assert!(matches!(
            gpu.write_buffer(buffer, 12, &[1; 8]),
            Err(GpuError::WriteOutOfBounds { .. })
        ));
        assert_eq!(gpu.read_buffer(buffer, 8, 8), Some(&[1u8; 8][..]));
    }

    #[test]
    fn destroyed_objects_are_no_longer_live() {
        let mut gpu = RecordingGpu::new();
        let texture = gpu.create_solid_texture("white", [255; 4]).unwrap();
        let sampler = gpu.create_sampler("linear").unwrap();
        assert_eq!(gpu.live_objects(), 2);

        gpu.destroy_texture(texture);
        gpu.destroy_sampler(sampler);
        assert_eq!(gpu.live_objects(), 0);
    }
    #[test]
    fn pipeline_limit_fails_once_reached() {
        let mut gpu = RecordingGpu::new();
        let shader = gpu.create_shader("test", "").unwrap();
        let layout = gpu.create_pipeline_layout("test", &[]).unwrap();
        let spec = PipelineSpec::new(crate::renderer::VertexLayoutDescriptor::standard(), shader);
        gpu.set_pipeline_limit(1);

        assert!(gpu.create_pipeline(layout, &spec).is_ok());
        assert!(matches!(
            gpu.create_pipeline(layout, &spec),
            Err(GpuError::Creation { .. })
        ));
        assert_eq!(gpu.pipelines_created(), 1);
    }

    #[test]
    fn discarding_keeps_commands_before_the_mark() {
        let mut gpu = RecordingGpu::new();
        gpu.draw(0..3, 0..1);
        let mark = gpu.command_mark();
        gpu.draw(0..6, 0..2);
        gpu.draw(0..9, 0..3);

        gpu.discard_commands_from(mark);
        assert_eq!(
            gpu.commands(),
            &[GpuCommand::Draw {
                vertices: 0..3,
                instances: 0..1
            }]
        );
    }
}

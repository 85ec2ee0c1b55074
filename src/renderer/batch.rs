use std::collections::{HashMap, HashSet};
use std::ops::Range;

use glam::Mat4;

use crate::asset::{Assets, GeometryRange, Handle, Mesh};
use crate::environment::Environment;
use crate::gpu::{BindGroupId, GpuFacade, PipelineId};
use crate::renderer::camera::Camera;
use crate::renderer::drawable::{Drawable, DrawablePool};
use crate::renderer::error::{BatchError, Resource};
use crate::renderer::internal::buffers::BatchBuffers;
use crate::renderer::internal::pipeline::{PipelineCache, PipelineSpec};
use crate::renderer::lights::{MAX_DIRECTIONAL_LIGHTS, MAX_POINT_LIGHTS};
use crate::renderer::shader::ShaderPrograms;
use crate::renderer::uniforms::InstanceRaw;
use crate::renderer::Material;
use crate::settings::BatchSettings;

/// Counters for the last flushed frame.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FrameStats {
    pub draw_calls: u32,
    pub pipeline_switches: u32,
    pub material_switches: u32,
    pub material_slots: u32,
    pub instances: u32,
    /// Drawables folded into an already open draw.
    pub instancing_joins: u32,
    pub pipelines_cached: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FrameState {
    Idle,
    Collecting,
    /// A capacity failure happened during submit; only `end` or `abort`
    /// are accepted until the frame is closed.
    Aborted,
}

#[derive(Debug, Clone, Copy)]
struct MaterialBinding {
    bind_group: BindGroupId,
    dynamic_offset: u32,
}

struct PendingDraw {
    first_instance: u32,
    elements: Range<u32>,
    indexed: bool,
}

/// Collects drawables between [`begin`](Self::begin) and [`end`](Self::end)
/// and turns them into as few pipeline, bind group and draw commands as
/// possible.
///
/// Drawables are grouped by geometry range: consecutive drawables of one
/// range become a single instanced draw whose transforms occupy a
/// contiguous run of instance slots. A material change inside a run closes
/// the pending draw first, so every draw sees exactly one material.
pub struct ModelBatch {
    settings: BatchSettings,
    shaders: ShaderPrograms,
    buffers: BatchBuffers,
    pipelines: PipelineCache,
    pool: DrawablePool,
    drawables: Vec<Drawable>,
    instance_scratch: Vec<InstanceRaw>,
    material_bindings: HashMap<Handle<Material>, MaterialBinding>,
    /// Distinct materials seen by `check_frame`, reused across flushes.
    frame_materials: HashSet<Handle<Material>>,
    /// Length of the facade's command stream when the frame began.
    command_mark: usize,
    state: FrameState,
    material_slots_used: u32,
    instances_used: u32,
    last_stats: FrameStats,
}

impl ModelBatch {
    /// Creates a batch using the built-in shaders.
    pub fn new<G: GpuFacade + ?Sized>(
        gpu: &mut G,
        settings: BatchSettings,
    ) -> Result<Self, BatchError> {
        let shaders = ShaderPrograms::builtin(gpu)?;
        Self::with_shaders(gpu, settings, shaders)
    }

    /// Creates a batch that owns `shaders` and destroys them on
    /// [`dispose`](Self::dispose).
    pub fn with_shaders<G: GpuFacade + ?Sized>(
        gpu: &mut G,
        settings: BatchSettings,
        shaders: ShaderPrograms,
    ) -> Result<Self, BatchError> {
        let settings = settings.validate();
        let buffers = BatchBuffers::new(gpu, settings.max_materials, settings.max_instances)?;
        let layouts = buffers.bind_group_layouts();
        let layout = gpu.create_pipeline_layout("ModelBatchPipelineLayout", &layouts)?;
        let pipelines = PipelineCache::new(layout, settings.pipeline_match);

        let initial = settings
            .initial_pool_capacity
            .min(settings.max_instances as usize);

        log::info!(
            "ModelBatch created ({} instances, {} materials, {:?} pipeline matching)",
            settings.max_instances,
            settings.max_materials,
            settings.pipeline_match
        );

        Ok(Self {
            pool: DrawablePool::with_capacity(settings.initial_pool_capacity),
            drawables: Vec::with_capacity(initial),
            instance_scratch: Vec::with_capacity(initial),
            material_bindings: HashMap::new(),
            frame_materials: HashSet::new(),
            command_mark: 0,
            state: FrameState::Idle,
            material_slots_used: 0,
            instances_used: 0,
            last_stats: FrameStats::default(),
            settings,
            shaders,
            buffers,
            pipelines,
        })
    }

    pub fn settings(&self) -> &BatchSettings {
        &self.settings
    }

    pub fn shaders(&self) -> &ShaderPrograms {
        &self.shaders
    }

    pub fn buffers(&self) -> &BatchBuffers {
        &self.buffers
    }

    pub fn pipelines(&self) -> &PipelineCache {
        &self.pipelines
    }

    pub fn pool(&self) -> &DrawablePool {
        &self.pool
    }

    pub fn is_collecting(&self) -> bool {
        self.state != FrameState::Idle
    }

    /// Drawables submitted since `begin`.
    pub fn pending(&self) -> usize {
        self.drawables.len()
    }

    pub fn material_slots_used(&self) -> u32 {
        self.material_slots_used
    }

    pub fn instances_used(&self) -> u32 {
        self.instances_used
    }

    pub fn last_stats(&self) -> FrameStats {
        self.last_stats
    }

    /// Starts collecting a frame: writes the frame uniforms and binds the
    /// frame and instance groups.
    pub fn begin<G: GpuFacade + ?Sized>(
        &mut self,
        gpu: &mut G,
        camera: &Camera,
        environment: &Environment,
    ) -> Result<(), BatchError> {
        if self.state != FrameState::Idle {
            return Err(BatchError::AlreadyCollecting);
        }
        if environment.directional_lights().len() > MAX_DIRECTIONAL_LIGHTS {
            return Err(BatchError::CapacityExceeded {
                resource: Resource::DirectionalLights,
                capacity: MAX_DIRECTIONAL_LIGHTS as u32,
            });
        }
        if environment.point_lights().len() > MAX_POINT_LIGHTS {
            return Err(BatchError::CapacityExceeded {
                resource: Resource::PointLights,
                capacity: MAX_POINT_LIGHTS as u32,
            });
        }

        self.material_slots_used = 0;
        self.instances_used = 0;
        self.buffers.write_frame_uniforms(gpu, camera, environment)?;
        self.command_mark = gpu.command_mark();
        gpu.set_bind_group(0, self.buffers.frame_bind_group(), &[]);
        gpu.set_bind_group(2, self.buffers.instance_bind_group(), &[]);

        self.state = FrameState::Collecting;
        Ok(())
    }

    /// Queues one drawable. The transform is copied; nothing touches the GPU
    /// until [`end`](Self::end).
    pub fn submit(
        &mut self,
        range: Handle<GeometryRange>,
        material: Handle<Material>,
        transform: &Mat4,
    ) -> Result<(), BatchError> {
        match self.state {
            FrameState::Idle => return Err(BatchError::NotCollecting),
            FrameState::Aborted => return Err(BatchError::FrameAborted),
            FrameState::Collecting => {}
        }

        let capacity = self.buffers.instance_capacity();
        if self.drawables.len() >= capacity as usize {
            log::warn!("Instance capacity of {} exceeded, frame aborted", capacity);
            self.state = FrameState::Aborted;
            return Err(BatchError::CapacityExceeded {
                resource: Resource::Instances,
                capacity,
            });
        }

        let mut drawable = self.pool.obtain();
        drawable.range = range;
        drawable.material = material;
        drawable.transform = *transform;
        self.drawables.push(drawable);
        Ok(())
    }

    pub fn submit_drawable(&mut self, drawable: &Drawable) -> Result<(), BatchError> {
        self.submit(drawable.range, drawable.material, &drawable.transform)
    }

    /// Flushes the collected drawables and closes the frame. The frame is
    /// closed even when flushing fails, and a failed frame takes back every
    /// command it recorded.
    pub fn end<G: GpuFacade + ?Sized>(
        &mut self,
        gpu: &mut G,
        assets: &Assets,
    ) -> Result<FrameStats, BatchError> {
        let result = match self.state {
            FrameState::Idle => return Err(BatchError::NotCollecting),
            FrameState::Aborted => Err(BatchError::FrameAborted),
            FrameState::Collecting => self.flush(gpu, assets),
        };
        self.finish_frame(gpu, result.is_ok());

        match &result {
            Ok(stats) => {
                self.last_stats = *stats;
                log::debug!(
                    "Frame flushed: {} draws, {} instances ({} joined), {} pipeline switches, {} material switches, {} material slots",
                    stats.draw_calls,
                    stats.instances,
                    stats.instancing_joins,
                    stats.pipeline_switches,
                    stats.material_switches,
                    stats.material_slots
                );
            }
            Err(err) => log::warn!("Frame discarded: {}", err),
        }
        result
    }

    /// Discards the frame being collected without drawing anything.
    pub fn abort<G: GpuFacade + ?Sized>(&mut self, gpu: &mut G) {
        if self.state != FrameState::Idle {
            self.finish_frame(gpu, false);
        }
    }

    /// Destroys every cached pipeline, e.g. after shader sources changed.
    pub fn invalidate_pipelines<G: GpuFacade + ?Sized>(
        &mut self,
        gpu: &mut G,
    ) -> Result<(), BatchError> {
        if self.state != FrameState::Idle {
            return Err(BatchError::AlreadyCollecting);
        }
        let count = self.pipelines.len();
        self.pipelines.clear(gpu);
        log::info!("Invalidated {} cached pipelines", count);
        Ok(())
    }

    /// Releases every GPU object the batch owns.
    pub fn dispose<G: GpuFacade + ?Sized>(mut self, gpu: &mut G) {
        self.abort(gpu);
        self.pipelines.clear(gpu);
        gpu.destroy_pipeline_layout(self.pipelines.layout());
        self.buffers.destroy(gpu);
        self.shaders.destroy(gpu);
        log::info!("ModelBatch disposed");
    }

    fn finish_frame<G: GpuFacade + ?Sized>(&mut self, gpu: &mut G, flushed: bool) {
        if !flushed {
            gpu.discard_commands_from(self.command_mark);
        }
        for (_, binding) in self.material_bindings.drain() {
            gpu.destroy_bind_group(binding.bind_group);
        }
        self.instance_scratch.clear();
        self.pool.free_all(self.drawables.drain(..));
        self.state = FrameState::Idle;
    }

    fn flush<G: GpuFacade + ?Sized>(
        &mut self,
        gpu: &mut G,
        assets: &Assets,
    ) -> Result<FrameStats, BatchError> {
        let mut stats = FrameStats::default();
        if !self.drawables.is_empty() {
            // Stable, so submission order survives within one range.
            self.drawables.sort_by_key(|drawable| drawable.range);
            self.check_frame(assets)?;

            let drawables = std::mem::take(&mut self.drawables);
            let result = self.emit_all(gpu, assets, &drawables, &mut stats);
            self.drawables = drawables;
            result?;
        }

        stats.material_slots = self.material_slots_used;
        stats.pipelines_cached = self.pipelines.len() as u32;
        Ok(stats)
    }

    /// Resolves every handle and counts distinct materials before anything
    /// is recorded, so a bad frame emits no commands at all.
    fn check_frame(&mut self, assets: &Assets) -> Result<(), BatchError> {
        let materials = &mut self.frame_materials;
        materials.clear();
        let mut last_range = None;

        for drawable in &self.drawables {
            if last_range != Some(drawable.range) {
                let range = assets
                    .ranges
                    .get(drawable.range)
                    .ok_or(BatchError::UnknownGeometryRange(drawable.range.index()))?;
                if assets.meshes.get(range.mesh).is_none() {
                    return Err(BatchError::UnknownMesh(range.mesh.index()));
                }
                last_range = Some(drawable.range);
            }
            let first_use = materials.insert(drawable.material);
            if first_use && assets.materials.get(drawable.material).is_none() {
                return Err(BatchError::UnknownMaterial(drawable.material.index()));
            }
        }

        let capacity = self.buffers.material_capacity();
        if materials.len() > capacity as usize {
            log::warn!(
                "Frame uses {} materials but only {} slots exist",
                materials.len(),
                capacity
            );
            return Err(BatchError::CapacityExceeded {
                resource: Resource::Materials,
                capacity,
            });
        }
        Ok(())
    }

    fn emit_all<G: GpuFacade + ?Sized>(
        &mut self,
        gpu: &mut G,
        assets: &Assets,
        drawables: &[Drawable],
        stats: &mut FrameStats,
    ) -> Result<(), BatchError> {
        let mut current_range: Option<Handle<GeometryRange>> = None;
        let mut current_material: Option<Handle<Material>> = None;
        let mut current_mesh: Option<Handle<Mesh>> = None;
        let mut current_pipeline: Option<PipelineId> = None;
        let mut pending: Option<PendingDraw> = None;

        for (slot, drawable) in drawables.iter().enumerate() {
            let slot = slot as u32;
            let range_changed = current_range != Some(drawable.range);
            let material_changed = current_material != Some(drawable.material);

            if range_changed || material_changed {
                if let Some(draw) = pending.take() {
                    self.emit(gpu, draw, stats)?;
                }

                let range = assets
                    .ranges
                    .get(drawable.range)
                    .ok_or(BatchError::UnknownGeometryRange(drawable.range.index()))?;
                let mesh = assets
                    .meshes
                    .get(range.mesh)
                    .ok_or(BatchError::UnknownMesh(range.mesh.index()))?;
                let material = assets
                    .materials
                    .get(drawable.material)
                    .ok_or(BatchError::UnknownMaterial(drawable.material.index()))?;

                if current_mesh != Some(range.mesh) {
                    gpu.set_vertex_buffer(0, mesh.vertex_buffer());
                    if let Some(ib) = mesh.index_buffer() {
                        gpu.set_index_buffer(ib.buffer, ib.format);
                    }
                    current_mesh = Some(range.mesh);
                }

                if material_changed {
                    let binding = self.bind_material(gpu, drawable.material, material)?;
                    gpu.set_bind_group(1, binding.bind_group, &[binding.dynamic_offset]);
                    stats.material_switches += 1;
                    current_material = Some(drawable.material);
                }

                let spec = self.pipeline_spec(mesh, range, material);
                let pipeline = self.pipelines.get_pipeline(gpu, &spec)?.handle();
                if current_pipeline != Some(pipeline) {
                    gpu.set_pipeline(pipeline);
                    stats.pipeline_switches += 1;
                    current_pipeline = Some(pipeline);
                }

                current_range = Some(drawable.range);
                pending = Some(PendingDraw {
                    first_instance: slot,
                    elements: range.elements(),
                    indexed: mesh.is_indexed(),
                });
            } else {
                stats.instancing_joins += 1;
            }

            self.instance_scratch
                .push(InstanceRaw::from_transform(&drawable.transform));
            self.instances_used = slot + 1;
        }

        if let Some(draw) = pending.take() {
            self.emit(gpu, draw, stats)?;
        }
        Ok(())
    }

    fn emit<G: GpuFacade + ?Sized>(
        &mut self,
        gpu: &mut G,
        draw: PendingDraw,
        stats: &mut FrameStats,
    ) -> Result<(), BatchError> {
        let count = self.instance_scratch.len() as u32;
        self.buffers
            .write_instance_range(gpu, draw.first_instance, &self.instance_scratch)?;
        self.instance_scratch.clear();

        let instances = draw.first_instance..draw.first_instance + count;
        log::trace!(
            "draw elements {:?} instances {:?} (indexed: {})",
            draw.elements,
            instances,
            draw.indexed
        );
        if draw.indexed {
            gpu.draw_indexed(draw.elements, 0, instances);
        } else {
            gpu.draw(draw.elements, instances);
        }

        stats.draw_calls += 1;
        stats.instances += count;
        Ok(())
    }

    /// Each material gets one slot and one bind group per frame; binding it
    /// again reuses both.
    fn bind_material<G: GpuFacade + ?Sized>(
        &mut self,
        gpu: &mut G,
        handle: Handle<Material>,
        material: &Material,
    ) -> Result<MaterialBinding, BatchError> {
        if let Some(binding) = self.material_bindings.get(&handle) {
            return Ok(*binding);
        }

        let slot = self.material_slots_used;
        let dynamic_offset = self.buffers.write_material_uniforms(gpu, material, slot)?;
        let bind_group = self.buffers.create_material_bind_group(gpu, material)?;
        self.material_slots_used += 1;

        let binding = MaterialBinding {
            bind_group,
            dynamic_offset,
        };
        self.material_bindings.insert(handle, binding);
        Ok(binding)
    }

    fn pipeline_spec(
        &self,
        mesh: &Mesh,
        range: &GeometryRange,
        material: &Material,
    ) -> PipelineSpec {
        PipelineSpec::new(
            mesh.layout().clone(),
            self.shaders.select(mesh.layout(), material),
        )
        .with_depth_test(self.settings.depth_test)
        .with_cull_mode(self.settings.cull_mode.to_wgpu())
        .with_color_format(self.settings.color_format.to_wgpu())
        .with_sample_count(self.settings.sample_count)
        .with_topology(range.topology)
        .with_alpha_blend(material.alpha_blend)
    }
}

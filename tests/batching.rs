use glam::{Mat4, Vec3};
use wgpu_modelbatch::gpu::{GpuCommand, GpuError};
use wgpu_modelbatch::renderer::lights::DirectionalLightData;
use wgpu_modelbatch::renderer::{
    cube_mesh_standard, triangle, Drawable, InstanceRaw, PipelineMatch, Resource, VertexLayoutDescriptor,
};
use wgpu_modelbatch::{
    Assets, BatchError, BatchSettings, Camera, Environment, FrameStats, GeometryRange, Handle,
    Indices, Material, Mesh, ModelBatch, RecordingGpu,
};

struct Fixture {
    gpu: RecordingGpu,
    assets: Assets,
    batch: ModelBatch,
    cube: Handle<GeometryRange>,
    tri: Handle<GeometryRange>,
}

impl Fixture {
    fn new(settings: BatchSettings) -> Self {
        let mut gpu = RecordingGpu::new();
        let mut assets = Assets::new();

        let (verts, idx) = cube_mesh_standard();
        let cube_mesh = Mesh::upload(
            &mut gpu,
            "cube",
            &verts,
            Indices::U16(&idx),
            VertexLayoutDescriptor::standard(),
        )
        .unwrap();
        let (_, cube) = assets.add_mesh(cube_mesh);

        let tri_mesh = Mesh::upload(
            &mut gpu,
            "tri",
            &triangle(),
            Indices::None,
            VertexLayoutDescriptor::standard(),
        )
        .unwrap();
        let (_, tri) = assets.add_mesh(tri_mesh);

        let batch = ModelBatch::new(&mut gpu, settings).unwrap();
        gpu.take_commands();

        Self {
            gpu,
            assets,
            batch,
            cube,
            tri,
        }
    }

    fn material(&mut self, material: Material) -> Handle<Material> {
        self.assets.materials.insert(material)
    }

    fn begin(&mut self) {
        self.batch
            .begin(&mut self.gpu, &Camera::default(), &Environment::default())
            .unwrap();
    }

    fn submit(&mut self, range: Handle<GeometryRange>, material: Handle<Material>, x: f32) {
        self.batch.submit(range, material, &at(x)).unwrap();
    }

    fn end(&mut self) -> Result<FrameStats, BatchError> {
        self.batch.end(&mut self.gpu, &self.assets)
    }

    fn draws(&self) -> Vec<GpuCommand> {
        self.gpu.draw_commands().cloned().collect()
    }

    fn count(&self, pred: impl Fn(&GpuCommand) -> bool) -> usize {
        self.gpu.commands().iter().filter(|cmd| pred(cmd)).count()
    }

    fn material_binds(&self) -> Vec<Vec<u32>> {
        self.gpu
            .commands()
            .iter()
            .filter_map(|cmd| match cmd {
                GpuCommand::SetBindGroup {
                    index: 1, offsets, ..
                } => Some(offsets.clone()),
                _ => None,
            })
            .collect()
    }

    fn instance_x(&self, slot: u64) -> f32 {
        let buffers = self.batch.buffers();
        let bytes = self
            .gpu
            .read_buffer(buffers.instance_buffer(), slot * 64, 64)
            .unwrap();
        let raw: InstanceRaw = bytemuck::pod_read_unaligned(bytes);
        // Column 3 holds the translation.
        raw.model[3][0]
    }
}

fn at(x: f32) -> Mat4 {
    Mat4::from_translation(Vec3::new(x, 0.0, 0.0))
}

fn is_pipeline(cmd: &GpuCommand) -> bool {
    matches!(cmd, GpuCommand::SetPipeline(_))
}

#[test]
fn two_cubes_share_one_instanced_draw() {
    let mut fx = Fixture::new(BatchSettings::default());
    let red = fx.material(Material::rgb(1.0, 0.0, 0.0));

    fx.begin();
    fx.submit(fx.cube, red, -1.0);
    fx.submit(fx.cube, red, 1.0);
    let stats = fx.end().unwrap();

    assert_eq!(fx.count(is_pipeline), 1);
    assert_eq!(fx.material_binds(), vec![vec![0]]);
    assert_eq!(
        fx.draws(),
        vec![GpuCommand::DrawIndexed {
            indices: 0..36,
            base_vertex: 0,
            instances: 0..2,
        }]
    );
    assert_eq!(stats.draw_calls, 1);
    assert_eq!(stats.instances, 2);
    assert_eq!(stats.instancing_joins, 1);
    assert_eq!(stats.material_slots, 1);
    assert_eq!(stats.pipeline_switches, 1);
    assert_eq!(stats.pipelines_cached, 1);
}

#[test]
fn instance_slots_follow_submission_order_within_a_range() {
    let mut fx = Fixture::new(BatchSettings::default());
    let white = fx.material(Material::white());

    fx.begin();
    fx.submit(fx.cube, white, 3.0);
    fx.submit(fx.cube, white, 1.0);
    fx.submit(fx.cube, white, 2.0);
    fx.end().unwrap();

    assert_eq!(fx.instance_x(0), 3.0);
    assert_eq!(fx.instance_x(1), 1.0);
    assert_eq!(fx.instance_x(2), 2.0);
}

#[test]
fn interleaved_ranges_are_grouped_by_range() {
    let mut fx = Fixture::new(BatchSettings::default());
    let white = fx.material(Material::white());

    fx.begin();
    fx.submit(fx.cube, white, 0.0);
    fx.submit(fx.tri, white, 5.0);
    fx.submit(fx.cube, white, 1.0);
    let stats = fx.end().unwrap();

    assert_eq!(
        fx.draws(),
        vec![
            GpuCommand::DrawIndexed {
                indices: 0..36,
                base_vertex: 0,
                instances: 0..2,
            },
            GpuCommand::Draw {
                vertices: 0..3,
                instances: 2..3,
            },
        ]
    );
    assert_eq!(fx.instance_x(0), 0.0);
    assert_eq!(fx.instance_x(1), 1.0);
    assert_eq!(fx.instance_x(2), 5.0);
    // Same layout and material state, so the pipeline is bound once.
    assert_eq!(stats.pipeline_switches, 1);
    assert_eq!(stats.draw_calls, 2);
}

#[test]
fn returning_material_reuses_its_slot() {
    let mut fx = Fixture::new(BatchSettings::default());
    let m1 = fx.material(Material::rgb(1.0, 0.0, 0.0));
    let m2 = fx.material(Material::rgb(0.0, 1.0, 0.0));
    let created_before = fx.gpu.bind_groups_created();

    fx.begin();
    for material in [m1, m1, m2, m1] {
        fx.submit(fx.cube, material, 0.0);
    }
    let stats = fx.end().unwrap();

    assert_eq!(stats.material_slots, 2);
    assert_eq!(stats.material_switches, 3);
    assert_eq!(fx.material_binds(), vec![vec![0], vec![256], vec![0]]);
    assert_eq!(fx.gpu.bind_groups_created() - created_before, 2);

    let instances: Vec<_> = fx.draws().iter().filter_map(GpuCommand::instances).collect();
    assert_eq!(instances, vec![0..2, 2..3, 3..4]);
}

#[test]
fn material_bind_groups_are_released_at_end() {
    let mut fx = Fixture::new(BatchSettings::default());
    let m1 = fx.material(Material::white());
    let m2 = fx.material(Material::rgb(0.2, 0.2, 0.2));
    let live_before = fx.gpu.live_bind_groups();

    fx.begin();
    fx.submit(fx.cube, m1, 0.0);
    fx.submit(fx.tri, m2, 0.0);
    fx.end().unwrap();

    assert_eq!(fx.gpu.live_bind_groups(), live_before);
}

#[test]
fn vertex_buffers_are_bound_once_per_mesh() {
    let mut fx = Fixture::new(BatchSettings::default());
    let m1 = fx.material(Material::white());
    let m2 = fx.material(Material::rgb(0.0, 0.0, 1.0));

    fx.begin();
    fx.submit(fx.cube, m1, 0.0);
    fx.submit(fx.cube, m2, 1.0);
    fx.end().unwrap();

    assert_eq!(
        fx.count(|cmd| matches!(cmd, GpuCommand::SetVertexBuffer { .. })),
        1
    );
    assert_eq!(
        fx.count(|cmd| matches!(cmd, GpuCommand::SetIndexBuffer { .. })),
        1
    );
    assert_eq!(fx.draws().len(), 2);
}

#[test]
fn empty_frames_emit_no_draws() {
    let mut fx = Fixture::new(BatchSettings::default());

    for _ in 0..2 {
        fx.begin();
        let stats = fx.end().unwrap();
        assert_eq!(stats.draw_calls, 0);
        assert_eq!(stats.material_slots, 0);
    }

    assert!(fx.draws().is_empty());
    assert_eq!(fx.count(is_pipeline), 0);
    assert_eq!(fx.gpu.pipelines_created(), 0);
}

#[test]
fn instance_capacity_is_exact() {
    let mut fx = Fixture::new(BatchSettings {
        max_instances: 4,
        ..BatchSettings::default()
    });
    let white = fx.material(Material::white());

    fx.begin();
    for i in 0..4 {
        fx.submit(fx.cube, white, i as f32);
    }
    assert_eq!(fx.end().unwrap().instances, 4);
    fx.gpu.take_commands();

    fx.begin();
    for i in 0..4 {
        fx.submit(fx.cube, white, i as f32);
    }
    assert!(matches!(
        fx.batch.submit(fx.cube, white, &at(4.0)),
        Err(BatchError::CapacityExceeded {
            resource: Resource::Instances,
            capacity: 4
        })
    ));
    assert!(matches!(
        fx.batch.submit(fx.cube, white, &at(5.0)),
        Err(BatchError::FrameAborted)
    ));
    assert!(matches!(fx.end(), Err(BatchError::FrameAborted)));
    assert!(fx.draws().is_empty());

    // The batch recovers for the next frame.
    fx.begin();
    fx.submit(fx.cube, white, 0.0);
    assert_eq!(fx.end().unwrap().draw_calls, 1);
}

#[test]
fn material_capacity_fails_before_recording() {
    let mut fx = Fixture::new(BatchSettings {
        max_materials: 2,
        ..BatchSettings::default()
    });
    let materials: Vec<_> = (0..3)
        .map(|i| fx.material(Material::rgb(i as f32 * 0.3, 0.0, 0.0)))
        .collect();

    fx.begin();
    for material in &materials {
        fx.submit(fx.cube, *material, 0.0);
    }
    assert!(matches!(
        fx.end(),
        Err(BatchError::CapacityExceeded {
            resource: Resource::Materials,
            capacity: 2
        })
    ));
    assert!(fx.draws().is_empty());
    assert!(!fx.batch.is_collecting());
}

#[test]
fn protocol_misuse_is_rejected() {
    let mut fx = Fixture::new(BatchSettings::default());
    let white = fx.material(Material::white());

    assert!(matches!(
        fx.batch.submit(fx.cube, white, &Mat4::IDENTITY),
        Err(BatchError::NotCollecting)
    ));
    assert!(matches!(fx.end(), Err(BatchError::NotCollecting)));

    fx.begin();
    assert!(matches!(
        fx.batch
            .begin(&mut fx.gpu, &Camera::default(), &Environment::default()),
        Err(BatchError::AlreadyCollecting)
    ));
    assert!(matches!(
        fx.batch.invalidate_pipelines(&mut fx.gpu),
        Err(BatchError::AlreadyCollecting)
    ));
    fx.end().unwrap();
}

#[test]
fn abort_discards_the_frame() {
    let mut fx = Fixture::new(BatchSettings::default());
    let white = fx.material(Material::white());

    fx.begin();
    fx.submit(fx.cube, white, 0.0);
    fx.batch.abort(&mut fx.gpu);

    assert!(!fx.batch.is_collecting());
    assert_eq!(fx.batch.pending(), 0);
    assert!(fx.gpu.commands().is_empty());
}

#[test]
fn unknown_handles_are_reported() {
    let mut fx = Fixture::new(BatchSettings::default());
    let white = fx.material(Material::white());

    fx.begin();
    fx.submit(Handle::new(99), white, 0.0);
    assert!(matches!(fx.end(), Err(BatchError::UnknownGeometryRange(99))));

    fx.begin();
    fx.submit(fx.cube, Handle::new(42), 0.0);
    assert!(matches!(fx.end(), Err(BatchError::UnknownMaterial(42))));

    let orphan = fx
        .assets
        .ranges
        .insert(GeometryRange::new(Handle::new(7), 0, 3));
    fx.begin();
    fx.submit(orphan, white, 0.0);
    assert!(matches!(fx.end(), Err(BatchError::UnknownMesh(7))));

    assert!(fx.draws().is_empty());
}

#[test]
fn pipeline_creation_failure_is_propagated() {
    let mut fx = Fixture::new(BatchSettings::default());
    let white = fx.material(Material::white());
    fx.gpu.set_fail_pipeline_creation(true);

    fx.begin();
    fx.submit(fx.cube, white, 0.0);
    assert!(matches!(
        fx.end(),
        Err(BatchError::Gpu(GpuError::Creation { .. }))
    ));
    assert!(fx.draws().is_empty());
    assert!(!fx.batch.is_collecting());
    assert_eq!(fx.batch.pipelines().len(), 0);
}

#[test]
fn failed_flush_takes_back_draws_already_recorded() {
    let mut fx = Fixture::new(BatchSettings::default());
    let opaque = fx.material(Material::white());
    let glass = fx.material(Material::new([1.0, 1.0, 1.0, 0.5]).with_alpha());
    let live_groups = fx.gpu.live_bind_groups();
    // The cube's pipeline is created and its draw recorded before the
    // triangle's pipeline fails.
    fx.gpu.set_pipeline_limit(1);

    fx.begin();
    fx.submit(fx.cube, opaque, 0.0);
    fx.submit(fx.tri, glass, 1.0);
    assert!(matches!(
        fx.end(),
        Err(BatchError::Gpu(GpuError::Creation { .. }))
    ));
    assert!(fx.gpu.commands().is_empty());
    assert_eq!(fx.gpu.live_bind_groups(), live_groups);

    fx.begin();
    fx.submit(fx.cube, opaque, 0.0);
    fx.end().unwrap();
    assert_eq!(fx.draws().len(), 1);
    assert_eq!(fx.gpu.pipelines_created(), 1);
}

#[test]
fn pipelines_survive_frames_until_invalidated() {
    let mut fx = Fixture::new(BatchSettings::default());
    let white = fx.material(Material::white());

    for _ in 0..3 {
        fx.begin();
        fx.submit(fx.cube, white, 0.0);
        fx.end().unwrap();
    }
    assert_eq!(fx.gpu.pipelines_created(), 1);

    fx.batch.invalidate_pipelines(&mut fx.gpu).unwrap();
    assert_eq!(fx.gpu.live_pipelines(), 0);

    fx.begin();
    fx.submit(fx.cube, white, 0.0);
    fx.end().unwrap();
    assert_eq!(fx.gpu.pipelines_created(), 2);
}

#[test]
fn exact_matching_keeps_blend_modes_apart() {
    let mut fx = Fixture::new(BatchSettings::default());
    let opaque = fx.material(Material::white());
    let glass = fx.material(Material::new([1.0, 1.0, 1.0, 0.5]).with_alpha());

    fx.begin();
    fx.submit(fx.cube, opaque, 0.0);
    fx.submit(fx.cube, glass, 1.0);
    let stats = fx.end().unwrap();

    assert_eq!(stats.pipelines_cached, 2);
    assert_eq!(stats.pipeline_switches, 2);
}

#[test]
fn coarse_matching_shares_pipelines_across_blend_modes() {
    let mut fx = Fixture::new(BatchSettings {
        pipeline_match: PipelineMatch::Coarse,
        ..BatchSettings::default()
    });
    let opaque = fx.material(Material::white());
    let glass = fx.material(Material::new([1.0, 1.0, 1.0, 0.5]).with_alpha());

    fx.begin();
    fx.submit(fx.cube, opaque, 0.0);
    fx.submit(fx.cube, glass, 1.0);
    let stats = fx.end().unwrap();

    // Known false positive: the blend state is not part of the coarse key.
    assert_eq!(stats.pipelines_cached, 1);
    assert_eq!(stats.pipeline_switches, 1);
    let pipeline = fx.batch.pipelines().iter().next().unwrap();
    assert!(!pipeline.spec().alpha_blend());
}

#[test]
fn drawables_return_to_the_pool() {
    let mut fx = Fixture::new(BatchSettings {
        initial_pool_capacity: 2,
        ..BatchSettings::default()
    });
    let white = fx.material(Material::white());

    fx.begin();
    for i in 0..3 {
        fx.submit(fx.cube, white, i as f32);
    }
    assert_eq!(fx.batch.pool().available(), 0);
    fx.end().unwrap();

    assert_eq!(fx.batch.pool().created(), 3);
    assert_eq!(fx.batch.pool().available(), 3);

    fx.begin();
    fx.submit(fx.cube, white, 0.0);
    fx.end().unwrap();
    assert_eq!(fx.batch.pool().created(), 3);
}

#[test]
fn too_many_lights_are_rejected_at_begin() {
    let mut fx = Fixture::new(BatchSettings::default());
    let mut environment = Environment::default();
    for _ in 0..6 {
        environment.add_directional(DirectionalLightData::new(-Vec3::Y, Vec3::ONE, 1.0));
    }

    assert!(matches!(
        fx.batch
            .begin(&mut fx.gpu, &Camera::default(), &environment),
        Err(BatchError::CapacityExceeded {
            resource: Resource::DirectionalLights,
            capacity: 5
        })
    ));
    assert!(!fx.batch.is_collecting());
}

#[test]
fn dispose_releases_every_batch_object() {
    let Fixture {
        mut gpu,
        assets,
        batch,
        ..
    } = Fixture::new(BatchSettings::default());

    batch.dispose(&mut gpu);
    assets.destroy_meshes(&mut gpu);
    assert_eq!(gpu.live_objects(), 0);
}

#[test]
fn dispose_mid_frame_drops_pending_commands() {
    let Fixture {
        mut gpu,
        mut assets,
        mut batch,
        cube,
        ..
    } = Fixture::new(BatchSettings::default());
    let white = assets.materials.insert(Material::white());

    batch
        .begin(&mut gpu, &Camera::default(), &Environment::default())
        .unwrap();
    batch.submit(cube, white, &at(0.0)).unwrap();
    batch.dispose(&mut gpu);
    assets.destroy_meshes(&mut gpu);

    assert!(gpu.commands().is_empty());
    assert_eq!(gpu.live_objects(), 0);
}

#[test]
fn lit_triangle_pair_becomes_one_instanced_draw() {
    let mut fx = Fixture::new(BatchSettings::default());
    let white = fx.material(Material::white());
    let mut environment = Environment::default();
    environment.add_directional(DirectionalLightData::new(-Vec3::Y, Vec3::ONE, 1.0));
    let groups_before = fx.gpu.bind_groups_created();
    let transforms = [Mat4::IDENTITY, at(1.0)];

    fx.batch
        .begin(&mut fx.gpu, &Camera::default(), &environment)
        .unwrap();
    for transform in &transforms {
        fx.batch.submit(fx.tri, white, transform).unwrap();
    }
    let stats = fx.end().unwrap();

    assert_eq!(fx.gpu.bind_groups_created() - groups_before, 1);
    assert_eq!(fx.count(is_pipeline), 1);
    assert_eq!(
        fx.draws(),
        vec![GpuCommand::Draw {
            vertices: 0..3,
            instances: 0..2,
        }]
    );
    assert_eq!(stats.draw_calls, 1);

    let instance_buffer = fx.batch.buffers().instance_buffer();
    let stride = std::mem::size_of::<InstanceRaw>() as u64;
    for (slot, transform) in transforms.iter().enumerate() {
        let bytes = fx
            .gpu
            .read_buffer(instance_buffer, slot as u64 * stride, stride)
            .unwrap();
        assert_eq!(bytes, bytemuck::bytes_of(&InstanceRaw::from_transform(transform)));
    }
}

#[test]
fn prebuilt_drawables_join_submitted_ones() {
    let mut fx = Fixture::new(BatchSettings::default());
    let red = fx.material(Material::rgb(1.0, 0.0, 0.0));
    let drawable = Drawable::new(fx.cube, red, at(2.0));

    fx.begin();
    fx.batch.submit_drawable(&drawable).unwrap();
    fx.submit(fx.cube, red, 3.0);
    let stats = fx.end().unwrap();

    assert_eq!(stats.instancing_joins, 1);
    assert_eq!(fx.draws().len(), 1);
    assert_eq!(fx.instance_x(0), 2.0);
    assert_eq!(fx.instance_x(1), 3.0);
}

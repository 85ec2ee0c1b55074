use std::error::Error;

use glam::{Mat4, Vec3};
use wgpu_modelbatch::renderer::lights::{DirectionalLightData, PointLightData};
use wgpu_modelbatch::renderer::{
    cube_mesh_standard, sphere_mesh, OffscreenTarget, VertexLayoutDescriptor,
};
use wgpu_modelbatch::{
    init_logging, Assets, BatchSettings, Camera, Environment, GpuFacade, Indices, Material, Mesh,
    ModelBatch, WgpuFacade,
};

const WIDTH: u32 = 640;
const HEIGHT: u32 = 360;

fn main() {
    init_logging();

    log::info!("Starting headless model batch demo");

    if let Err(err) = pollster::block_on(run()) {
        log::error!("Demo error: {}", err);
        std::process::exit(1);
    }

    log::info!("Demo complete");
}

async fn run() -> Result<(), Box<dyn Error>> {
    let settings = BatchSettings::load_from_path("modelbatch.json");

    let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor {
        backends: wgpu::Backends::all(),
        ..Default::default()
    });
    let adapter = instance
        .request_adapter(&wgpu::RequestAdapterOptions::default())
        .await?;
    log::info!("Using adapter {:?}", adapter.get_info().name);
    let (device, queue) = adapter
        .request_device(&wgpu::DeviceDescriptor::default())
        .await?;

    let target = OffscreenTarget::new(
        &device,
        WIDTH,
        HEIGHT,
        settings.color_format.to_wgpu(),
        settings.sample_count,
    );

    let mut gpu = WgpuFacade::new(device, queue, target.depth.format);
    let mut assets = Assets::new();

    let (cube_vertices, cube_indices) = cube_mesh_standard();
    let cube = Mesh::upload(
        &mut gpu,
        "Cube",
        &cube_vertices,
        Indices::U16(&cube_indices),
        VertexLayoutDescriptor::standard(),
    )?;
    let (_, cube_range) = assets.add_mesh(cube);

    let (sphere_vertices, sphere_indices) = sphere_mesh(32, 16);
    let sphere = Mesh::upload(
        &mut gpu,
        "Sphere",
        &sphere_vertices,
        Indices::U32(&sphere_indices),
        VertexLayoutDescriptor::normal_mapped(),
    )?;
    let (_, sphere_range) = assets.add_mesh(sphere);

    let flat_normal = gpu.create_solid_texture("FlatNormal", [128, 128, 255, 255])?;
    let red = assets
        .materials
        .insert(Material::rgb(0.8, 0.1, 0.1).with_roughness(0.4));
    let chrome = assets.materials.insert(
        Material::white()
            .with_metallic(1.0)
            .with_roughness(0.2)
            .with_normal_texture(flat_normal),
    );

    let mut environment = Environment::default();
    environment.add_directional(DirectionalLightData::new(
        Vec3::new(-0.4, -1.0, -0.3),
        Vec3::ONE,
        2.0,
    ));
    environment.add_point(PointLightData {
        position: Vec3::new(0.0, 3.0, 2.0),
        color: Vec3::new(1.0, 0.8, 0.6),
        intensity: 4.0,
        range: 10.0,
    });
    let camera = Camera::perspective(
        Vec3::new(0.0, 2.0, 6.0),
        Vec3::ZERO,
        std::f32::consts::FRAC_PI_4,
        WIDTH as f32 / HEIGHT as f32,
        0.1,
        100.0,
    );

    let mut batch = ModelBatch::new(&mut gpu, settings)?;
    batch.begin(&mut gpu, &camera, &environment)?;
    batch.submit(
        cube_range,
        red,
        &Mat4::from_translation(Vec3::new(-1.0, 0.0, 0.0)),
    )?;
    batch.submit(
        cube_range,
        red,
        &Mat4::from_translation(Vec3::new(1.0, 0.0, 0.0)),
    )?;
    batch.submit(
        sphere_range,
        chrome,
        &(Mat4::from_translation(Vec3::new(0.0, 1.5, 0.0)) * Mat4::from_scale(Vec3::splat(0.6))),
    )?;
    let stats = batch.end(&mut gpu, &assets)?;

    let clear = environment.clear_color();
    let mut encoder = gpu
        .device()
        .create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("ModelBatchEncoder"),
        });
    {
        let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
            label: Some("ModelBatchPass"),
            color_attachments: &[Some(target.color_attachment(clear))],
            depth_stencil_attachment: Some(target.depth_attachment()),
            timestamp_writes: None,
            occlusion_query_set: None,
        });
        gpu.replay(&mut pass)?;
    }
    gpu.queue().submit(Some(encoder.finish()));

    log::info!(
        "Frame: {} draw calls, {} instances, {} pipeline switches, {} material slots, {} pipelines cached",
        stats.draw_calls,
        stats.instances,
        stats.pipeline_switches,
        stats.material_slots,
        stats.pipelines_cached
    );

    batch.dispose(&mut gpu);
    assets.destroy_meshes(&mut gpu);
    gpu.destroy_texture(flat_normal);
    Ok(())
}

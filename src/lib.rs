pub mod asset;
pub mod environment;
pub mod gpu;
pub mod renderer;
pub mod settings;

pub use asset::{Assets, GeometryRange, Handle, Indices, Mesh};
pub use environment::Environment;
pub use gpu::{GpuFacade, RecordingGpu, WgpuFacade};
pub use renderer::{BatchError, Camera, FrameStats, Material, ModelBatch};
pub use settings::BatchSettings;

pub fn init_logging() {
    let _ = env_logger::Builder::from_default_env()
        .filter_level(log::LevelFilter::Info)
        .try_init();
}

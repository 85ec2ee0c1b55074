pub mod cache;
pub mod handle;
pub mod mesh;

pub use cache::AssetCache;
pub use handle::Handle;
pub use mesh::{GeometryRange, IndexBuffer, Indices, Mesh};

use crate::gpu::GpuFacade;
use crate::renderer::Material;

/// Everything a drawable can point at.
pub struct Assets {
    pub meshes: AssetCache<Mesh>,
    pub ranges: AssetCache<GeometryRange>,
    pub materials: AssetCache<Material>,
}

impl Assets {
    pub fn new() -> Self {
        Self {
            meshes: AssetCache::new(),
            ranges: AssetCache::new(),
            materials: AssetCache::new(),
        }
    }

    /// Registers `mesh` along with a range covering all of it.
    pub fn add_mesh(&mut self, mesh: Mesh) -> (Handle<Mesh>, Handle<GeometryRange>) {
        let count = mesh.element_count();
        let mesh = self.meshes.insert(mesh);
        let range = self.ranges.insert(GeometryRange::new(mesh, 0, count));
        (mesh, range)
    }

    /// Releases every mesh's GPU buffers.
    pub fn destroy_meshes<G: GpuFacade + ?Sized>(&self, gpu: &mut G) {
        for (_, mesh) in self.meshes.iter() {
            mesh.destroy(gpu);
        }
    }
}

impl Default for Assets {
    fn default() -> Self {
        Self::new()
    }
}

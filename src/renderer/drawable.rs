use glam::Mat4;

use crate::asset::{GeometryRange, Handle};
use crate::renderer::Material;

/// One submitted object: which geometry to draw, with which material, where.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Drawable {
    pub range: Handle<GeometryRange>,
    pub material: Handle<Material>,
    pub transform: Mat4,
}

impl Drawable {
    pub fn new(range: Handle<GeometryRange>, material: Handle<Material>, transform: Mat4) -> Self {
        Self {
            range,
            material,
            transform,
        }
    }

    fn reset(&mut self) {
        self.range = Handle::dangling();
        self.material = Handle::dangling();
        self.transform = Mat4::IDENTITY;
    }
}

impl Default for Drawable {
    fn default() -> Self {
        Self::new(Handle::dangling(), Handle::dangling(), Mat4::IDENTITY)
    }
}

/// Free list of drawable records reused across frames. Never shrinks.
pub struct DrawablePool {
    free: Vec<Drawable>,
    created: usize,
}

impl DrawablePool {
    pub fn new() -> Self {
        Self::with_capacity(0)
    }

    /// Pre-fills the free list with `capacity` records.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            free: vec![Drawable::default(); capacity],
            created: capacity,
        }
    }

    pub fn obtain(&mut self) -> Drawable {
        match self.free.pop() {
            Some(drawable) => drawable,
            None => {
                self.created += 1;
                Drawable::default()
            }
        }
    }

    pub fn free(&mut self, mut drawable: Drawable) {
        drawable.reset();
        self.free.push(drawable);
    }

    pub fn free_all(&mut self, drawables: impl IntoIterator<Item = Drawable>) {
        for drawable in drawables {
            self.free(drawable);
        }
    }

    /// Records ready to hand out without allocating.
    pub fn available(&self) -> usize {
        self.free.len()
    }

    /// Records ever created by this pool.
    pub fn created(&self) -> usize {
        self.created
    }
}

impl Default for DrawablePool {
    fn default() -> Self {
        Self::new()
    }
}

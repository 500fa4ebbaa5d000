//! In-memory scene container
//!
//! Hosts that do not hold a retained scene graph of their own (tests, the
//! demo binary, batch tools) can assemble a [`MemoryScene`] and hand it to
//! the exporter.

use super::{
    CameraView, LightEntity, MaterialDef, MeshGeometry, PluginData, SceneObject, SceneSource,
    WorldAmbient,
};
use std::collections::HashMap;

/// Owned scene state implementing [`SceneSource`]
#[derive(Default)]
pub struct MemoryScene {
    camera: Option<CameraView>,
    world: WorldAmbient,
    lights: Vec<LightEntity>,
    objects: Vec<SceneObject>,
    meshes: HashMap<String, MeshGeometry>,
    plugins: HashMap<String, PluginData>,
    materials: HashMap<String, MaterialDef>,
}

impl MemoryScene {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_camera(&mut self, camera: CameraView) {
        self.camera = Some(camera);
    }

    pub fn set_world(&mut self, world: WorldAmbient) {
        self.world = world;
    }

    pub fn add_light(&mut self, light: LightEntity) {
        self.lights.push(light);
    }

    pub fn add_object(&mut self, object: SceneObject) {
        self.objects.push(object);
    }

    /// Register a mesh data block, keyed by its stable name
    pub fn add_mesh(&mut self, mesh: MeshGeometry) {
        self.meshes.insert(mesh.name.clone(), mesh);
    }

    pub fn add_plugin_data(&mut self, data: PluginData) {
        self.plugins.insert(data.name.clone(), data);
    }

    pub fn add_material(&mut self, material: MaterialDef) {
        self.materials.insert(material.name.clone(), material);
    }
}

impl SceneSource for MemoryScene {
    fn camera(&self) -> Option<&CameraView> {
        self.camera.as_ref()
    }

    fn world(&self) -> &WorldAmbient {
        &self.world
    }

    fn lights(&self) -> &[LightEntity] {
        &self.lights
    }

    fn objects(&self) -> &[SceneObject] {
        &self.objects
    }

    fn mesh_data(&self, name: &str) -> Option<&MeshGeometry> {
        self.meshes.get(name)
    }

    fn plugin_data(&self, name: &str) -> Option<&PluginData> {
        self.plugins.get(name)
    }

    fn material(&self, name: &str) -> Option<&MaterialDef> {
        self.materials.get(name)
    }
}

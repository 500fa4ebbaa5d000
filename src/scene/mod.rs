//! Read-only scene model consumed by the exporter
//!
//! The host application (whatever owns the actual scene graph) exposes
//! its state through [`SceneSource`]: typed accessors for the camera,
//! lights, object instances and named data blocks. The exporter only ever
//! reads through this trait; it never mutates host state.
//!
//! Custom properties attach to any entity as a [`PropertyValue`] map — a
//! small tagged union rather than reflection — and are forwarded to the
//! server as opaque JSON (plugin parameterization).

use glam::Mat4;
use std::collections::BTreeMap;

mod memory;

pub use memory::MemoryScene;

/// Custom property value: bool / int / float / string / vector / map
#[derive(Debug, Clone, PartialEq)]
pub enum PropertyValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    Vector(Vec<f64>),
    Map(BTreeMap<String, PropertyValue>),
}

/// Property collection attached to an entity
pub type PropertyMap = BTreeMap<String, PropertyValue>;

impl PropertyValue {
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            PropertyValue::Bool(b) => serde_json::Value::Bool(*b),
            PropertyValue::Int(i) => serde_json::Value::from(*i),
            PropertyValue::Float(f) => serde_json::Number::from_f64(*f)
                .map(serde_json::Value::Number)
                .unwrap_or(serde_json::Value::Null),
            PropertyValue::Str(s) => serde_json::Value::String(s.clone()),
            PropertyValue::Vector(v) => serde_json::Value::Array(
                v.iter()
                    .map(|f| {
                        serde_json::Number::from_f64(*f)
                            .map(serde_json::Value::Number)
                            .unwrap_or(serde_json::Value::Null)
                    })
                    .collect(),
            ),
            PropertyValue::Map(m) => serde_json::Value::Object(
                m.iter().map(|(k, v)| (k.clone(), v.to_json())).collect(),
            ),
        }
    }
}

impl From<bool> for PropertyValue {
    fn from(v: bool) -> Self {
        PropertyValue::Bool(v)
    }
}

impl From<i64> for PropertyValue {
    fn from(v: i64) -> Self {
        PropertyValue::Int(v)
    }
}

impl From<f64> for PropertyValue {
    fn from(v: f64) -> Self {
        PropertyValue::Float(v)
    }
}

impl From<&str> for PropertyValue {
    fn from(v: &str) -> Self {
        PropertyValue::Str(v.to_string())
    }
}

impl From<String> for PropertyValue {
    fn from(v: String) -> Self {
        PropertyValue::Str(v)
    }
}

impl From<Vec<f64>> for PropertyValue {
    fn from(v: Vec<f64>) -> Self {
        PropertyValue::Vector(v)
    }
}

/// Serialize a property map to the JSON object string the protocol
/// carries
pub fn properties_to_json(map: &PropertyMap) -> String {
    let obj: serde_json::Map<String, serde_json::Value> =
        map.iter().map(|(k, v)| (k.clone(), v.to_json())).collect();
    serde_json::Value::Object(obj).to_string()
}

/// Camera projection as the host describes it
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum CameraProjection {
    /// Horizontal field of view in radians
    Perspective { horizontal_fov: f32 },
    /// View extent in world units
    Orthographic { scale: f32 },
    Panoramic,
}

/// Depth-of-field parameters; absent when DoF is disabled
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DepthOfField {
    /// Distance to the focus plane in world units
    pub focus_distance: f32,
    /// Lens focal length in world units
    pub focal_length: f32,
    /// Aperture f-number
    pub f_stop: f32,
}

/// The active camera
#[derive(Debug, Clone)]
pub struct CameraView {
    pub name: String,
    pub camera_name: String,
    pub projection: CameraProjection,
    pub clip_start: f32,
    pub transform: Mat4,
    pub depth_of_field: Option<DepthOfField>,
    /// Border render region [min_x, min_y, max_x, max_y] in 0..1
    pub border: Option<[f32; 4]>,
}

/// Ambient/global illumination state
#[derive(Debug, Clone)]
pub struct WorldAmbient {
    pub ambient_color: [f32; 3],
    pub ambient_intensity: f32,
    pub background_color: [f32; 4],
}

impl Default for WorldAmbient {
    fn default() -> Self {
        Self {
            ambient_color: [1.0; 3],
            ambient_intensity: 0.1,
            background_color: [0.0, 0.0, 0.0, 1.0],
        }
    }
}

/// Light kind with its type-specific geometric parameters
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum LightKind {
    Point {
        radius: f32,
    },
    Sun {
        /// Angular diameter in degrees
        angular_diameter: f32,
    },
    Spot {
        radius: f32,
        /// Full cone angle in radians
        spot_size: f32,
        /// Penumbra blend fraction in 0..1
        spot_blend: f32,
    },
    Area {
        size_x: f32,
        size_y: f32,
    },
}

/// One light entity
#[derive(Debug, Clone)]
pub struct LightEntity {
    pub name: String,
    pub light_name: String,
    pub kind: LightKind,
    pub color: [f32; 3],
    pub intensity: f32,
    pub visible: bool,
    pub transform: Mat4,
    pub properties: PropertyMap,
}

/// Triangulated mesh data block with a stable name
#[derive(Debug, Clone)]
pub struct MeshGeometry {
    pub name: String,
    pub positions: Vec<[f32; 3]>,
    /// Per-vertex normals; may be empty when the host never computed them
    pub normals: Vec<[f32; 3]>,
    pub triangles: Vec<[u32; 3]>,
    /// Per-triangle smooth-shading flag, parallel to `triangles`
    pub smooth: Vec<bool>,
    /// Per-face-corner RGBA colors, 3 entries per triangle, in triangle
    /// order; absent when the mesh carries no color layer
    pub corner_colors: Option<Vec<[f32; 4]>>,
    pub properties: PropertyMap,
}

impl MeshGeometry {
    /// True when any triangle requests smooth shading.
    ///
    /// Mixed smooth/flat meshes are exported as fully smooth.
    pub fn uses_smooth_shading(&self) -> bool {
        self.smooth.iter().any(|s| *s)
    }
}

/// Plugin-backed data block: a named server-side generator plus its
/// parameters, standing in for raw geometry upload
#[derive(Debug, Clone)]
pub struct PluginData {
    pub name: String,
    pub plugin_type: crate::protocol::PluginType,
    pub plugin_name: String,
    pub parameters: PropertyMap,
}

/// What an object instance references
#[derive(Debug, Clone, PartialEq)]
pub enum DataRef {
    /// A [`MeshGeometry`] data block by name
    Mesh(String),
    /// A [`PluginData`] data block by name
    Plugin(String),
}

/// One visible object instance: a transform plus a data-block reference.
/// Several instances may share one data block.
#[derive(Debug, Clone)]
pub struct SceneObject {
    pub name: String,
    pub transform: Mat4,
    pub data: DataRef,
    pub material: Option<String>,
    pub properties: PropertyMap,
}

/// Shader node feeding a material's output socket.
///
/// Only these node kinds map onto server-side material models; anything
/// else the host wires up is reported as `Unsupported` and skipped at
/// export time.
#[derive(Debug, Clone, PartialEq)]
pub enum SurfaceShader {
    Obj(crate::protocol::ObjMaterial),
    Principled(crate::protocol::PrincipledMaterial),
    CarPaint(crate::protocol::CarPaintMaterial),
    Glass(crate::protocol::GlassMaterial),
    ThinGlass(crate::protocol::ThinGlassMaterial),
    Luminous(crate::protocol::LuminousMaterial),
    Metal(crate::protocol::MetalMaterial),
    Alloy(crate::protocol::AlloyMaterial),
    Unsupported { kind: String },
}

/// Host material: the node connected to the output socket, if any
#[derive(Debug, Clone)]
pub struct MaterialDef {
    pub name: String,
    pub surface: Option<SurfaceShader>,
}

/// Read-only access to the host scene state.
///
/// Enumeration methods return only entities that are visible and
/// renderable for the current scene state; filtering hidden objects is
/// the host's job.
pub trait SceneSource {
    /// The active camera, if the scene has one
    fn camera(&self) -> Option<&CameraView>;

    /// Global ambient light and background
    fn world(&self) -> &WorldAmbient;

    /// All visible lights
    fn lights(&self) -> &[LightEntity];

    /// All visible geometry-bearing object instances
    fn objects(&self) -> &[SceneObject];

    /// Look up a mesh data block by name
    fn mesh_data(&self, name: &str) -> Option<&MeshGeometry>;

    /// Look up a plugin-backed data block by name
    fn plugin_data(&self, name: &str) -> Option<&PluginData>;

    /// Look up a material by name
    fn material(&self, name: &str) -> Option<&MaterialDef>;
}

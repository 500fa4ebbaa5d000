//! Protocol message records
//!
//! Client → server traffic uses a two-frame convention inherited from the
//! original protocol: a small [`ClientMessage`] header announces the
//! action, and actions with a large payload follow it with a second framed
//! record (`CameraSettings`, `MeshData`, ...). Mesh vertex/index arrays
//! and framebuffer pixels travel as raw out-of-band bytes whose sizes are
//! declared in the preceding record.
//!
//! The postcard variant index of [`ClientMessage`] is the on-wire message
//! kind. Variants must never be reordered; new kinds are appended.

use serde::{Deserialize, Serialize};

/// Client action header. Kinds 0..=12 form the core protocol; the
/// remaining kinds carry settings updates split out of the scene-update
/// marker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ClientMessage {
    /// Protocol handshake, answered by [`HelloResult`]
    Hello { version: u32 },
    /// Begin a scene update; `clear` drops all server-side scene data
    UpdateScene { clear: bool },
    /// Select the server-side renderer ("scivis", "pathtracer", ...)
    UpdateRendererType { renderer: String },
    /// Followed by a [`CameraSettings`] frame
    UpdateCamera,
    /// Followed by an [`ObjectUpdate`] frame (and a [`LightSettings`]
    /// frame for light objects)
    UpdateObject,
    /// Followed by a [`MaterialUpdate`] frame
    UpdateMaterial,
    /// Followed by a [`MeshData`] frame and its raw arrays
    UpdateBlenderMesh { name: String },
    /// Followed by a [`PluginInstanceUpdate`] frame; answered by
    /// [`GenerateFunctionResult`]
    UpdatePluginInstance,
    /// Start rendering; server begins streaming [`RenderResult`]s
    StartRendering {
        mode: RenderMode,
        samples: u32,
        reduction_factor: u32,
        update_rate: u32,
    },
    /// Request cooperative cancellation of the running render
    CancelRendering,
    /// Ask for the bound of a named data block; answered by
    /// [`QueryBoundResult`]
    QueryBound { name: String },
    /// Ask for a server state dump; answered by [`ServerStateResult`]
    GetServerState,
    /// Orderly goodbye before closing the socket
    Bye,
    /// Set framebuffer dimensions for subsequent renders
    UpdateFramebuffer { width: u32, height: u32 },
    /// Followed by a [`RenderSettings`] frame
    UpdateRenderSettings,
    /// Followed by a [`WorldSettings`] frame
    UpdateWorldSettings,
}

/// Rendering mode requested by START_RENDERING
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RenderMode {
    /// Full-resolution render of the configured sample budget
    Final,
    /// Progressive preview: starts at `reduction_factor` and refines;
    /// successive restarts only ever lower the factor
    Interactive,
}

/// Handshake response
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HelloResult {
    pub success: bool,
    pub message: String,
}

/// Server response streamed during rendering.
///
/// `Frame.file_size` bytes of encoded image data follow this record on
/// the stream, out-of-band (not length-prefixed). A `file_size` of 0
/// means the server skipped this sample's framebuffer per the update
/// rate. `Done` and `Canceled` are terminal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum RenderResult {
    Frame {
        width: u32,
        height: u32,
        sample: u32,
        reduction_factor: u32,
        file_size: u32,
        memory_usage: f32,
        variance: f32,
    },
    Done {
        memory_usage: f32,
        peak_memory_usage: f32,
        variance: f32,
    },
    Canceled,
}

/// Camera projection kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum Projection {
    #[default]
    Perspective,
    Orthographic,
    Panoramic,
}

/// Full camera state, resent in full on every update
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CameraSettings {
    pub object_name: String,
    pub camera_name: String,
    pub projection: Projection,
    pub aspect: f32,
    pub clip_start: f32,
    /// Vertical field of view in degrees (perspective only)
    pub fov_y: f32,
    /// View height in world units (orthographic only)
    pub height: f32,
    pub position: [f32; 3],
    pub view_dir: [f32; 3],
    pub up_dir: [f32; 3],
    /// 0 when depth of field is disabled
    pub dof_focus_distance: f32,
    /// Aperture radius in world units, 0 when depth of field is disabled
    pub dof_aperture: f32,
    /// Border render region as [min_x, min_y, max_x, max_y] in 0..1
    pub border: Option<[f32; 4]>,
}

impl Default for CameraSettings {
    fn default() -> Self {
        Self {
            object_name: String::new(),
            camera_name: String::new(),
            projection: Projection::Perspective,
            aspect: 1.0,
            clip_start: 1e-4,
            fov_y: 45.0,
            height: 1.0,
            position: [0.0; 3],
            view_dir: [0.0, 0.0, -1.0],
            up_dir: [0.0, 1.0, 0.0],
            dof_focus_distance: 0.0,
            dof_aperture: 0.0,
            border: None,
        }
    }
}

/// Light kind tag
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum LightType {
    #[default]
    Point,
    Sun,
    Spot,
    Area,
}

/// One light source. Only the fields relevant to `light_type` carry
/// meaning; the rest stay at their defaults.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LightSettings {
    pub light_type: LightType,
    pub object_name: String,
    pub light_name: String,
    pub object2world: [f32; 16],
    pub color: [f32; 3],
    pub intensity: f32,
    pub visible: bool,
    pub position: [f32; 3],
    pub direction: [f32; 3],
    /// Source radius for point/spot lights (soft shadows)
    pub radius: f32,
    /// Angular diameter in degrees for sun lights
    pub angular_diameter: f32,
    /// Full cone angle in degrees for spot lights
    pub opening_angle: f32,
    /// Penumbra angle in degrees for spot lights
    pub penumbra_angle: f32,
    /// First rectangle edge for area lights
    pub edge1: [f32; 3],
    /// Second rectangle edge for area lights
    pub edge2: [f32; 3],
}

impl Default for LightSettings {
    fn default() -> Self {
        Self {
            light_type: LightType::Point,
            object_name: String::new(),
            light_name: String::new(),
            object2world: identity_matrix(),
            color: [1.0; 3],
            intensity: 1.0,
            visible: true,
            position: [0.0; 3],
            direction: [0.0, 0.0, -1.0],
            radius: 0.0,
            angular_diameter: 0.0,
            opening_angle: 0.0,
            penumbra_angle: 0.0,
            edge1: [0.0; 3],
            edge2: [0.0; 3],
        }
    }
}

/// Renderer configuration, resent in full on every update
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RenderSettings {
    pub renderer: String,
    pub background_color: [f32; 4],
    pub samples: u32,
    pub max_depth: u32,
    pub ao_samples: u32,
    pub ao_radius: f32,
    pub shadows_enabled: bool,
    pub variance_threshold: f32,
}

impl Default for RenderSettings {
    fn default() -> Self {
        Self {
            renderer: "scivis".to_string(),
            background_color: [0.0, 0.0, 0.0, 1.0],
            samples: 16,
            max_depth: 4,
            ao_samples: 2,
            ao_radius: 1.0,
            shadows_enabled: true,
            variance_threshold: 0.0,
        }
    }
}

/// Global/ambient world state
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorldSettings {
    pub ambient_color: [f32; 3],
    pub ambient_intensity: f32,
    pub background_color: [f32; 4],
}

impl Default for WorldSettings {
    fn default() -> Self {
        Self {
            ambient_color: [1.0; 3],
            ambient_intensity: 0.1,
            background_color: [0.0, 0.0, 0.0, 1.0],
        }
    }
}

/// Mesh metadata preceding the raw geometry arrays.
///
/// The arrays follow out-of-band in fixed order: `num_vertices * 3` f32
/// positions, then (if `MESH_NORMALS`) `num_vertices * 3` f32 normals,
/// then (if `MESH_VERTEX_COLORS`) `num_vertices * 4` f32 colors, then
/// `num_triangles * 3` u32 indices. All little-endian.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct MeshData {
    pub num_vertices: u32,
    pub num_triangles: u32,
    pub flags: u32,
}

impl MeshData {
    /// Per-vertex normals follow the position array
    pub const MESH_NORMALS: u32 = 1 << 0;
    /// Per-vertex RGBA colors follow the normal array
    pub const MESH_VERTEX_COLORS: u32 = 1 << 1;

    pub fn has_normals(&self) -> bool {
        self.flags & Self::MESH_NORMALS != 0
    }

    pub fn has_vertex_colors(&self) -> bool {
        self.flags & Self::MESH_VERTEX_COLORS != 0
    }

    /// Total raw byte count following this record on the stream
    pub fn raw_bytes(&self) -> usize {
        let nv = self.num_vertices as usize;
        let nt = self.num_triangles as usize;
        let mut total = nv * 3 * 4 + nt * 3 * 4;
        if self.has_normals() {
            total += nv * 3 * 4;
        }
        if self.has_vertex_colors() {
            total += nv * 4 * 4;
        }
        total
    }
}

/// Kind of scene object being linked
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ObjectType {
    /// Instance of an uploaded triangle mesh
    Mesh,
    /// Instance of a plugin-generated geometry
    Geometry,
    /// Instance of a plugin-generated volume
    Volume,
    /// Instance of a plugin-generated sub-scene
    Scene,
    /// Light source (a [`LightSettings`] frame follows)
    Light,
}

/// Object instance linking a world transform to a named data block.
///
/// Multiple instances may share one data block; the block itself is
/// uploaded at most once per session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ObjectUpdate {
    pub object_type: ObjectType,
    pub name: String,
    /// Row-major 4x4 object-to-world transform
    pub object2world: [f32; 16],
    /// Name of the data block this instance references
    pub data_link: String,
    /// Name of the material override, empty for none
    pub material_link: String,
    /// Arbitrary host properties as a JSON object
    pub custom_properties: String,
}

impl Default for ObjectUpdate {
    fn default() -> Self {
        Self {
            object_type: ObjectType::Mesh,
            name: String::new(),
            object2world: identity_matrix(),
            data_link: String::new(),
            material_link: String::new(),
            custom_properties: "{}".to_string(),
        }
    }
}

/// Kind of server-side generator behind a plugin data block
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PluginType {
    Geometry,
    Volume,
    Scene,
}

/// Invocation of a named server-side generator plugin.
///
/// Answered synchronously by [`GenerateFunctionResult`] before any
/// further message may be sent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PluginInstanceUpdate {
    pub name: String,
    pub plugin_type: PluginType,
    pub plugin_name: String,
    /// Generator parameters as a JSON object
    pub plugin_parameters: String,
    /// Host custom properties as a JSON object
    pub custom_properties: String,
}

/// Result of a plugin generate call
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct GenerateFunctionResult {
    pub success: bool,
    pub message: String,
}

/// Response to QUERY_BOUND: axis-aligned bounds of a named data block
/// as [min_x, min_y, min_z, max_x, max_y, max_z]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct QueryBoundResult {
    pub success: bool,
    pub message: String,
    pub bound: Option<[f32; 6]>,
}

/// Response to GET_SERVER_STATE: server state dump as a JSON document
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct ServerStateResult {
    pub state: String,
}

/// Material override sent with UPDATE_MATERIAL
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MaterialUpdate {
    pub name: String,
    pub material: Material,
}

/// Material parameter sets.
///
/// Each variant is a flat record matching one server-side material model;
/// which one gets sent is decided by the shader node feeding the host
/// material's output socket.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Material {
    Obj(ObjMaterial),
    Principled(PrincipledMaterial),
    CarPaint(CarPaintMaterial),
    Glass(GlassMaterial),
    ThinGlass(ThinGlassMaterial),
    Luminous(LuminousMaterial),
    Metal(MetalMaterial),
    Alloy(AlloyMaterial),
}

impl Material {
    pub fn kind(&self) -> &'static str {
        match self {
            Material::Obj(_) => "obj",
            Material::Principled(_) => "principled",
            Material::CarPaint(_) => "car_paint",
            Material::Glass(_) => "glass",
            Material::ThinGlass(_) => "thin_glass",
            Material::Luminous(_) => "luminous",
            Material::Metal(_) => "metal",
            Material::Alloy(_) => "alloy",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ObjMaterial {
    pub kd: [f32; 3],
    pub ks: [f32; 3],
    pub ns: f32,
    pub d: f32,
}

impl Default for ObjMaterial {
    fn default() -> Self {
        Self {
            kd: [0.8, 0.8, 0.8],
            ks: [0.0, 0.0, 0.0],
            ns: 10.0,
            d: 1.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PrincipledMaterial {
    pub base_color: [f32; 3],
    pub edge_color: [f32; 3],
    pub metallic: f32,
    pub diffuse: f32,
    pub specular: f32,
    pub ior: f32,
    pub transmission: f32,
    pub transmission_color: [f32; 3],
    pub transmission_depth: f32,
    pub roughness: f32,
    pub anisotropy: f32,
    pub rotation: f32,
    pub thin: bool,
    pub thickness: f32,
    pub backlight: f32,
    pub coat: f32,
    pub coat_ior: f32,
    pub coat_color: [f32; 3],
    pub coat_thickness: f32,
    pub coat_roughness: f32,
    pub sheen: f32,
    pub sheen_color: [f32; 3],
    pub sheen_tint: f32,
    pub sheen_roughness: f32,
    pub opacity: f32,
}

impl Default for PrincipledMaterial {
    fn default() -> Self {
        Self {
            base_color: [0.8, 0.8, 0.8],
            edge_color: [1.0, 1.0, 1.0],
            metallic: 0.0,
            diffuse: 1.0,
            specular: 1.0,
            ior: 1.0,
            transmission: 0.0,
            transmission_color: [1.0, 1.0, 1.0],
            transmission_depth: 1.0,
            roughness: 0.0,
            anisotropy: 0.0,
            rotation: 0.0,
            thin: false,
            thickness: 1.0,
            backlight: 0.0,
            coat: 0.0,
            coat_ior: 1.5,
            coat_color: [1.0, 1.0, 1.0],
            coat_thickness: 1.0,
            coat_roughness: 0.0,
            sheen: 0.0,
            sheen_color: [1.0, 1.0, 1.0],
            sheen_tint: 0.0,
            sheen_roughness: 0.2,
            opacity: 1.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CarPaintMaterial {
    pub base_color: [f32; 3],
    pub roughness: f32,
    pub flake_density: f32,
    pub flake_scale: f32,
    pub flake_spread: f32,
    pub flake_jitter: f32,
    pub flake_roughness: f32,
    pub coat: f32,
    pub coat_ior: f32,
    pub coat_color: [f32; 3],
    pub coat_thickness: f32,
    pub coat_roughness: f32,
    pub flipflop_color: [f32; 3],
    pub flipflop_falloff: f32,
}

impl Default for CarPaintMaterial {
    fn default() -> Self {
        Self {
            base_color: [0.8, 0.0, 0.0],
            roughness: 0.0,
            flake_density: 0.0,
            flake_scale: 100.0,
            flake_spread: 0.3,
            flake_jitter: 0.75,
            flake_roughness: 0.3,
            coat: 1.0,
            coat_ior: 1.5,
            coat_color: [1.0, 1.0, 1.0],
            coat_thickness: 1.0,
            coat_roughness: 0.0,
            flipflop_color: [1.0, 1.0, 1.0],
            flipflop_falloff: 1.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GlassMaterial {
    pub eta: f32,
    pub attenuation_color: [f32; 3],
    pub attenuation_distance: f32,
}

impl Default for GlassMaterial {
    fn default() -> Self {
        Self {
            eta: 1.5,
            attenuation_color: [1.0, 1.0, 1.0],
            attenuation_distance: 1.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ThinGlassMaterial {
    pub eta: f32,
    pub attenuation_color: [f32; 3],
    pub attenuation_distance: f32,
    pub thickness: f32,
}

impl Default for ThinGlassMaterial {
    fn default() -> Self {
        Self {
            eta: 1.5,
            attenuation_color: [1.0, 1.0, 1.0],
            attenuation_distance: 1.0,
            thickness: 1.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LuminousMaterial {
    pub color: [f32; 3],
    pub intensity: f32,
    pub transparency: f32,
}

impl Default for LuminousMaterial {
    fn default() -> Self {
        Self {
            color: [1.0, 1.0, 1.0],
            intensity: 1.0,
            transparency: 1.0,
        }
    }
}

/// Predefined metal kind, selecting tabulated optical constants
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum MetalKind {
    #[default]
    Aluminium,
    Chromium,
    Copper,
    Gold,
    Silver,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetalMaterial {
    pub metal: MetalKind,
    pub roughness: f32,
}

impl Default for MetalMaterial {
    fn default() -> Self {
        Self {
            metal: MetalKind::Aluminium,
            roughness: 0.1,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlloyMaterial {
    pub color: [f32; 3],
    pub edge_color: [f32; 3],
    pub roughness: f32,
}

impl Default for AlloyMaterial {
    fn default() -> Self {
        Self {
            color: [0.9, 0.9, 0.9],
            edge_color: [1.0, 1.0, 1.0],
            roughness: 0.1,
        }
    }
}

/// Row-major identity transform
pub fn identity_matrix() -> [f32; 16] {
    let mut m = [0.0; 16];
    m[0] = 1.0;
    m[5] = 1.0;
    m[10] = 1.0;
    m[15] = 1.0;
    m
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mesh_data_raw_bytes() {
        let plain = MeshData {
            num_vertices: 4,
            num_triangles: 2,
            flags: 0,
        };
        // 4 vertices * 12 bytes + 2 triangles * 12 bytes
        assert_eq!(plain.raw_bytes(), 48 + 24);

        let full = MeshData {
            num_vertices: 4,
            num_triangles: 2,
            flags: MeshData::MESH_NORMALS | MeshData::MESH_VERTEX_COLORS,
        };
        // + 4 normals * 12 bytes + 4 colors * 16 bytes
        assert_eq!(full.raw_bytes(), 48 + 24 + 48 + 64);
    }

    #[test]
    fn test_mesh_flags() {
        let md = MeshData {
            num_vertices: 1,
            num_triangles: 1,
            flags: MeshData::MESH_NORMALS,
        };
        assert!(md.has_normals());
        assert!(!md.has_vertex_colors());
    }

    #[test]
    fn test_light_defaults_are_neutral() {
        let light = LightSettings::default();
        assert_eq!(light.light_type, LightType::Point);
        assert_eq!(light.intensity, 1.0);
        assert_eq!(light.object2world, identity_matrix());
    }

    #[test]
    fn test_material_kind_names() {
        assert_eq!(Material::Obj(ObjMaterial::default()).kind(), "obj");
        assert_eq!(
            Material::Principled(PrincipledMaterial::default()).kind(),
            "principled"
        );
    }
}

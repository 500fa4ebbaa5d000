//! Scene graph encoder
//!
//! Walks a [`SceneSource`] and emits the fixed message sequence the
//! server expects: renderer type, scene-update marker, framebuffer and
//! render settings, camera, world, lights, then per object its data block
//! (unless the session already uploaded it) followed by the instance
//! link. The object stream has no terminator element; the following
//! `StartRendering` message delimits the update.
//!
//! Scene-content problems never abort an export: an object referencing an
//! unknown data block, a material with an unsupported shader graph, or a
//! generator plugin failing server-side each log a warning and skip that
//! one entity. Only channel faults propagate.

use crate::config::RenderConfig;
use crate::error::Result;
use crate::protocol::{
    CameraSettings, ClientMessage, GenerateFunctionResult, LightSettings, LightType, Material,
    MaterialUpdate, MeshData, ObjectType, ObjectUpdate, PluginInstanceUpdate, PluginType,
    Projection, RenderSettings, WorldSettings,
};
use crate::scene::{
    properties_to_json, CameraProjection, CameraView, DataRef, LightEntity, LightKind,
    MeshGeometry, SceneSource, SurfaceShader,
};
use crate::session::Session;
use crate::transport::Transport;
use glam::{Mat4, Vec3};
use std::collections::HashSet;

/// Counters summarizing one export pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExportStats {
    /// Object instance links emitted
    pub objects: usize,
    /// Lights emitted
    pub lights: usize,
    /// Materials emitted
    pub materials: usize,
    /// Mesh data blocks fully uploaded
    pub meshes_sent: usize,
    /// Mesh references satisfied from the de-duplication cache
    pub meshes_reused: usize,
    /// Plugin instances invoked server-side
    pub plugins_sent: usize,
    /// Plugin references satisfied from the cache
    pub plugins_reused: usize,
    /// Entities skipped over recoverable problems
    pub skipped: usize,
}

/// Encoder for one export pass over a scene
pub struct SceneExporter<'a, T: Transport> {
    session: &'a mut Session<T>,
    config: &'a RenderConfig,
}

impl<'a, T: Transport> SceneExporter<'a, T> {
    pub fn new(session: &'a mut Session<T>, config: &'a RenderConfig) -> Self {
        Self { session, config }
    }

    /// Encode the scene into the session's channel.
    ///
    /// On a channel fault the session is aborted (the stream state is
    /// unknown); on success the session returns to ready.
    pub fn export(&mut self, scene: &dyn SceneSource) -> Result<ExportStats> {
        self.session.begin_export()?;

        match self.export_scene(scene) {
            Ok(stats) => {
                self.session.finish_export();
                log::info!(
                    "Scene export done: {} objects, {} lights, {} materials, {} meshes sent, {} reused, {} skipped",
                    stats.objects,
                    stats.lights,
                    stats.materials,
                    stats.meshes_sent,
                    stats.meshes_reused,
                    stats.skipped
                );
                Ok(stats)
            }
            Err(e) => {
                log::error!("Scene export failed: {}", e);
                self.session.abort();
                Err(e)
            }
        }
    }

    fn export_scene(&mut self, scene: &dyn SceneSource) -> Result<ExportStats> {
        let mut stats = ExportStats::default();
        let world = scene.world().clone();

        log::info!("Exporting scene");

        // Renderer selection comes first: the server resets materials
        // when the renderer changes.
        self.session.send_message(&ClientMessage::UpdateRendererType {
            renderer: self.config.renderer.clone(),
        })?;

        self.session
            .send_message(&ClientMessage::UpdateScene { clear: true })?;

        let (width, height) = (self.config.width, self.config.height);
        self.session.send_message(&ClientMessage::UpdateFramebuffer {
            width,
            height,
        })?;
        self.session.set_framebuffer_size(width, height);

        self.session
            .send_message(&ClientMessage::UpdateRenderSettings)?;
        self.session.send_record(&RenderSettings {
            renderer: self.config.renderer.clone(),
            background_color: world.background_color,
            samples: self.config.samples,
            max_depth: self.config.max_depth,
            ao_samples: self.config.ao_samples,
            ao_radius: self.config.ao_radius,
            shadows_enabled: self.config.shadows_enabled,
            variance_threshold: self.config.variance_threshold,
        })?;
        self.session.set_sample_budget(self.config.samples);

        let aspect = width as f32 / height.max(1) as f32;
        match scene.camera() {
            Some(camera) => {
                log::debug!("Exporting camera '{}'", camera.name);
                self.session.send_message(&ClientMessage::UpdateCamera)?;
                self.session.send_record(&camera_settings(camera, aspect))?;
            }
            None => log::warn!("Scene has no active camera"),
        }

        self.session
            .send_message(&ClientMessage::UpdateWorldSettings)?;
        self.session.send_record(&WorldSettings {
            ambient_color: world.ambient_color,
            ambient_intensity: world.ambient_intensity,
            background_color: world.background_color,
        })?;

        for light in scene.lights() {
            log::debug!("Exporting light '{}'", light.name);
            self.session.send_message(&ClientMessage::UpdateObject)?;
            self.session.send_record(&ObjectUpdate {
                object_type: ObjectType::Light,
                name: light.name.clone(),
                object2world: matrix_to_wire(&light.transform),
                data_link: light.light_name.clone(),
                material_link: String::new(),
                custom_properties: properties_to_json(&light.properties),
            })?;
            self.session.send_record(&light_settings(light))?;
            stats.lights += 1;
        }

        let sent_materials = self.export_materials(scene, &mut stats)?;

        for object in scene.objects() {
            self.export_object(scene, object, &sent_materials, &mut stats)?;
        }

        Ok(stats)
    }

    /// Send every material referenced by a visible object, once per pass.
    ///
    /// Materials are cheap full-resend records; unlike mesh data they are
    /// not cached across exports. Returns the names that made it to the
    /// server so object links only reference materials that exist there.
    fn export_materials(
        &mut self,
        scene: &dyn SceneSource,
        stats: &mut ExportStats,
    ) -> Result<HashSet<String>> {
        let mut seen = HashSet::new();
        let mut sent = HashSet::new();

        for object in scene.objects() {
            let name = match &object.material {
                Some(name) => name,
                None => continue,
            };
            if !seen.insert(name.clone()) {
                continue;
            }

            let def = match scene.material(name) {
                Some(def) => def,
                None => {
                    log::warn!(
                        "Object '{}' references unknown material '{}', skipping material",
                        object.name,
                        name
                    );
                    continue;
                }
            };

            let material = match &def.surface {
                Some(SurfaceShader::Obj(m)) => Material::Obj(m.clone()),
                Some(SurfaceShader::Principled(m)) => Material::Principled(m.clone()),
                Some(SurfaceShader::CarPaint(m)) => Material::CarPaint(m.clone()),
                Some(SurfaceShader::Glass(m)) => Material::Glass(m.clone()),
                Some(SurfaceShader::ThinGlass(m)) => Material::ThinGlass(m.clone()),
                Some(SurfaceShader::Luminous(m)) => Material::Luminous(m.clone()),
                Some(SurfaceShader::Metal(m)) => Material::Metal(m.clone()),
                Some(SurfaceShader::Alloy(m)) => Material::Alloy(m.clone()),
                Some(SurfaceShader::Unsupported { kind }) => {
                    log::warn!(
                        "Material '{}' uses unsupported shader node '{}', skipping material",
                        name,
                        kind
                    );
                    continue;
                }
                None => {
                    log::warn!(
                        "Material '{}' has nothing linked to its output, skipping material",
                        name
                    );
                    continue;
                }
            };

            log::debug!("Exporting material '{}' ({})", name, material.kind());
            self.session.send_message(&ClientMessage::UpdateMaterial)?;
            self.session.send_record(&MaterialUpdate {
                name: name.clone(),
                material,
            })?;
            sent.insert(name.clone());
            stats.materials += 1;
        }

        Ok(sent)
    }

    fn export_object(
        &mut self,
        scene: &dyn SceneSource,
        object: &crate::scene::SceneObject,
        sent_materials: &HashSet<String>,
        stats: &mut ExportStats,
    ) -> Result<()> {
        let (object_type, data_link) = match &object.data {
            DataRef::Mesh(name) => {
                let mesh = match scene.mesh_data(name) {
                    Some(mesh) => mesh,
                    None => {
                        log::warn!(
                            "Object '{}' references unknown mesh '{}', skipping object",
                            object.name,
                            name
                        );
                        stats.skipped += 1;
                        return Ok(());
                    }
                };

                if mesh.positions.is_empty() || mesh.triangles.is_empty() {
                    log::warn!(
                        "Mesh '{}' has no geometry, skipping object '{}'",
                        name,
                        object.name
                    );
                    stats.skipped += 1;
                    return Ok(());
                }

                if self.session.was_exported(name) {
                    log::debug!("Mesh '{}' already uploaded, linking only", name);
                    stats.meshes_reused += 1;
                } else {
                    self.send_mesh_data(mesh)?;
                    self.session.mark_exported(name);
                    stats.meshes_sent += 1;
                }

                (ObjectType::Mesh, name.clone())
            }

            DataRef::Plugin(name) => {
                let plugin = match scene.plugin_data(name) {
                    Some(plugin) => plugin,
                    None => {
                        log::warn!(
                            "Object '{}' references unknown plugin data '{}', skipping object",
                            object.name,
                            name
                        );
                        stats.skipped += 1;
                        return Ok(());
                    }
                };

                if self.session.was_exported(name) {
                    log::debug!("Plugin instance '{}' already created, linking only", name);
                    stats.plugins_reused += 1;
                } else {
                    log::debug!(
                        "Invoking plugin '{}' for data block '{}'",
                        plugin.plugin_name,
                        name
                    );
                    self.session
                        .send_message(&ClientMessage::UpdatePluginInstance)?;
                    self.session.send_record(&PluginInstanceUpdate {
                        name: name.clone(),
                        plugin_type: plugin.plugin_type,
                        plugin_name: plugin.plugin_name.clone(),
                        plugin_parameters: properties_to_json(&plugin.parameters),
                        custom_properties: properties_to_json(&object.properties),
                    })?;

                    // The generator runs synchronously server-side; wait
                    // for its verdict before sending anything else.
                    let result: GenerateFunctionResult = self.session.receive_record()?;
                    if !result.success {
                        log::warn!(
                            "Server failed to generate '{}': {}",
                            name,
                            result.message
                        );
                        stats.skipped += 1;
                        return Ok(());
                    }
                    self.session.mark_exported(name);
                    stats.plugins_sent += 1;
                }

                let object_type = match plugin.plugin_type {
                    PluginType::Geometry => ObjectType::Geometry,
                    PluginType::Volume => ObjectType::Volume,
                    PluginType::Scene => ObjectType::Scene,
                };
                (object_type, name.clone())
            }
        };

        let material_link = match &object.material {
            Some(name) if sent_materials.contains(name) => name.clone(),
            _ => String::new(),
        };

        log::debug!("Exporting object '{}'", object.name);
        self.session.send_message(&ClientMessage::UpdateObject)?;
        self.session.send_record(&ObjectUpdate {
            object_type,
            name: object.name.clone(),
            object2world: matrix_to_wire(&object.transform),
            data_link,
            material_link,
            custom_properties: properties_to_json(&object.properties),
        })?;
        stats.objects += 1;

        Ok(())
    }

    /// Upload one mesh data block: metadata frame, then the raw arrays in
    /// fixed order (positions, normals, colors, indices), each announced
    /// by the metadata counts rather than framed.
    fn send_mesh_data(&mut self, mesh: &MeshGeometry) -> Result<()> {
        let nv = mesh.positions.len();
        let nt = mesh.triangles.len();

        let mut flags = 0;
        let send_normals = mesh.uses_smooth_shading() && mesh.normals.len() == nv;
        if send_normals {
            flags |= MeshData::MESH_NORMALS;
        }
        if mesh.corner_colors.is_some() {
            flags |= MeshData::MESH_VERTEX_COLORS;
        }

        log::debug!(
            "Uploading mesh '{}': {} vertices, {} triangles, flags {:#x}",
            mesh.name,
            nv,
            nt,
            flags
        );

        self.session
            .send_message(&ClientMessage::UpdateBlenderMesh {
                name: mesh.name.clone(),
            })?;
        self.session.send_record(&MeshData {
            num_vertices: nv as u32,
            num_triangles: nt as u32,
            flags,
        })?;

        let channel = self.session.channel_mut();
        channel.send_raw(&pack_vec3(&mesh.positions))?;

        if send_normals {
            channel.send_raw(&pack_vec3(&mesh.normals))?;
        }

        if mesh.corner_colors.is_some() {
            let colors = vertex_colors_from_corners(mesh);
            channel.send_raw(&pack_vec4(&colors))?;
        }

        channel.send_raw(&pack_indices(&mesh.triangles))?;

        Ok(())
    }
}

/// Row-major wire layout of an object-to-world matrix
fn matrix_to_wire(m: &Mat4) -> [f32; 16] {
    m.transpose().to_cols_array()
}

/// Vertical field of view from a horizontal one at the given aspect
/// ratio (pinhole model, both angles in radians)
pub fn vertical_fov(horizontal_fov: f32, aspect: f32) -> f32 {
    2.0 * ((horizontal_fov * 0.5).tan() / aspect).atan()
}

fn camera_settings(camera: &CameraView, aspect: f32) -> CameraSettings {
    let mut settings = CameraSettings {
        object_name: camera.name.clone(),
        camera_name: camera.camera_name.clone(),
        aspect,
        clip_start: camera.clip_start,
        position: camera.transform.w_axis.truncate().to_array(),
        view_dir: camera
            .transform
            .transform_vector3(Vec3::NEG_Z)
            .normalize_or_zero()
            .to_array(),
        up_dir: camera
            .transform
            .transform_vector3(Vec3::Y)
            .normalize_or_zero()
            .to_array(),
        border: camera.border,
        ..CameraSettings::default()
    };

    match camera.projection {
        CameraProjection::Perspective { horizontal_fov } => {
            settings.projection = Projection::Perspective;
            settings.fov_y = vertical_fov(horizontal_fov, aspect).to_degrees();
        }
        CameraProjection::Orthographic { scale } => {
            settings.projection = Projection::Orthographic;
            settings.height = scale / aspect;
        }
        CameraProjection::Panoramic => {
            settings.projection = Projection::Panoramic;
        }
    }

    // DoF fields are always present, zero when disabled
    match camera.depth_of_field {
        Some(dof) => {
            settings.dof_focus_distance = dof.focus_distance;
            settings.dof_aperture = if dof.f_stop > 0.0 {
                dof.focal_length / (2.0 * dof.f_stop)
            } else {
                0.0
            };
        }
        None => {
            settings.dof_focus_distance = 0.0;
            settings.dof_aperture = 0.0;
        }
    }

    settings
}

fn light_settings(light: &LightEntity) -> LightSettings {
    let position = light.transform.w_axis.truncate();
    let direction = light
        .transform
        .transform_vector3(Vec3::NEG_Z)
        .normalize_or_zero();

    let mut settings = LightSettings {
        object_name: light.name.clone(),
        light_name: light.light_name.clone(),
        object2world: matrix_to_wire(&light.transform),
        color: light.color,
        intensity: light.intensity,
        visible: light.visible,
        ..LightSettings::default()
    };

    match light.kind {
        LightKind::Point { radius } => {
            settings.light_type = LightType::Point;
            settings.position = position.to_array();
            settings.radius = radius;
        }
        LightKind::Sun { angular_diameter } => {
            settings.light_type = LightType::Sun;
            settings.direction = direction.to_array();
            settings.angular_diameter = angular_diameter;
        }
        LightKind::Spot {
            radius,
            spot_size,
            spot_blend,
        } => {
            settings.light_type = LightType::Spot;
            settings.position = position.to_array();
            settings.direction = direction.to_array();
            settings.radius = radius;
            let opening = spot_size.to_degrees();
            settings.opening_angle = opening;
            settings.penumbra_angle = 0.5 * spot_blend * opening;
        }
        LightKind::Area { size_x, size_y } => {
            settings.light_type = LightType::Area;
            // Rectangle corner plus its two edges, local then world
            let corner = Vec3::new(-0.5 * size_x, -0.5 * size_y, 0.0);
            let world_corner = light.transform.transform_point3(corner);
            let edge1 = light
                .transform
                .transform_point3(corner + Vec3::new(size_x, 0.0, 0.0))
                - world_corner;
            let edge2 = light
                .transform
                .transform_point3(corner + Vec3::new(0.0, size_y, 0.0))
                - world_corner;
            settings.position = world_corner.to_array();
            settings.edge1 = edge1.to_array();
            settings.edge2 = edge2.to_array();
        }
    }

    settings
}

/// Average the per-face-corner color layer into one RGBA color per
/// vertex. Alpha is forced to 1.
fn vertex_colors_from_corners(mesh: &MeshGeometry) -> Vec<[f32; 4]> {
    let nv = mesh.positions.len();
    let corners = match &mesh.corner_colors {
        Some(corners) => corners,
        None => return vec![[0.0, 0.0, 0.0, 1.0]; nv],
    };

    let mut sums = vec![[0.0f32; 3]; nv];
    let mut counts = vec![0u32; nv];

    for (tri_index, triangle) in mesh.triangles.iter().enumerate() {
        for (corner, &vertex) in triangle.iter().enumerate() {
            let color_index = tri_index * 3 + corner;
            if color_index >= corners.len() || vertex as usize >= nv {
                continue;
            }
            let color = corners[color_index];
            let sum = &mut sums[vertex as usize];
            sum[0] += color[0];
            sum[1] += color[1];
            sum[2] += color[2];
            counts[vertex as usize] += 1;
        }
    }

    sums.iter()
        .zip(&counts)
        .map(|(sum, &count)| {
            if count == 0 {
                [0.0, 0.0, 0.0, 1.0]
            } else {
                let n = count as f32;
                [sum[0] / n, sum[1] / n, sum[2] / n, 1.0]
            }
        })
        .collect()
}

fn pack_vec3(values: &[[f32; 3]]) -> Vec<u8> {
    let mut out = Vec::with_capacity(values.len() * 12);
    for v in values {
        for component in v {
            out.extend_from_slice(&component.to_le_bytes());
        }
    }
    out
}

fn pack_vec4(values: &[[f32; 4]]) -> Vec<u8> {
    let mut out = Vec::with_capacity(values.len() * 16);
    for v in values {
        for component in v {
            out.extend_from_slice(&component.to_le_bytes());
        }
    }
    out
}

fn pack_indices(triangles: &[[u32; 3]]) -> Vec<u8> {
    let mut out = Vec::with_capacity(triangles.len() * 12);
    for t in triangles {
        for index in t {
            out.extend_from_slice(&index.to_le_bytes());
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{ObjMaterial, Serializer};
    use crate::scene::{
        DepthOfField, MaterialDef, MemoryScene, PluginData, PropertyMap, PropertyValue,
        SceneObject, WorldAmbient,
    };
    use crate::session::tests::{accepting_mock, server_frame};
    use crate::session::SessionState;
    use crate::transport::MockTransport;
    use std::f32::consts::FRAC_PI_2;

    /// Everything the exporter wrote, in order: decoded client message
    /// headers, decoded object links, opaque payload frames, and raw
    /// out-of-band byte runs.
    #[derive(Debug)]
    enum Sent {
        Msg(ClientMessage),
        Object(ObjectUpdate),
        Payload(Vec<u8>),
        Raw(usize),
    }

    fn walk_stream(written: &[u8]) -> Vec<Sent> {
        let serializer = Serializer::default();
        let mut out = Vec::new();
        let mut offset = 0;

        let read_frame = |offset: &mut usize| -> Vec<u8> {
            let len = u32::from_le_bytes([
                written[*offset],
                written[*offset + 1],
                written[*offset + 2],
                written[*offset + 3],
            ]) as usize;
            let frame = written[*offset + 4..*offset + 4 + len].to_vec();
            *offset += 4 + len;
            frame
        };

        while offset < written.len() {
            let header: ClientMessage = serializer.deserialize(&read_frame(&mut offset)).unwrap();
            let follow_ups: usize = match &header {
                ClientMessage::UpdateCamera
                | ClientMessage::UpdateMaterial
                | ClientMessage::UpdatePluginInstance
                | ClientMessage::UpdateRenderSettings
                | ClientMessage::UpdateWorldSettings => 1,
                ClientMessage::UpdateObject => 0, // handled below
                ClientMessage::UpdateBlenderMesh { .. } => 0, // handled below
                _ => 0,
            };

            match &header {
                ClientMessage::UpdateObject => {
                    let update: ObjectUpdate =
                        serializer.deserialize(&read_frame(&mut offset)).unwrap();
                    let is_light = update.object_type == ObjectType::Light;
                    out.push(Sent::Msg(header));
                    out.push(Sent::Object(update));
                    if is_light {
                        out.push(Sent::Payload(read_frame(&mut offset)));
                    }
                }
                ClientMessage::UpdateBlenderMesh { .. } => {
                    let payload = read_frame(&mut offset);
                    let mesh: MeshData = serializer.deserialize(&payload).unwrap();
                    let raw = mesh.raw_bytes();
                    out.push(Sent::Msg(header));
                    out.push(Sent::Payload(payload));
                    out.push(Sent::Raw(raw));
                    offset += raw;
                }
                _ => {
                    out.push(Sent::Msg(header));
                    for _ in 0..follow_ups {
                        out.push(Sent::Payload(read_frame(&mut offset)));
                    }
                }
            }
        }

        out
    }

    fn message_kinds(sent: &[Sent]) -> Vec<String> {
        sent.iter()
            .filter_map(|s| match s {
                Sent::Msg(m) => Some(format!("{:?}", m)),
                _ => None,
            })
            .collect()
    }

    fn count_mesh_uploads(sent: &[Sent]) -> usize {
        sent.iter()
            .filter(|s| matches!(s, Sent::Msg(ClientMessage::UpdateBlenderMesh { .. })))
            .count()
    }

    fn raw_bytes_total(sent: &[Sent]) -> usize {
        sent.iter()
            .map(|s| match s {
                Sent::Raw(n) => *n,
                _ => 0,
            })
            .sum()
    }

    fn quad_mesh(name: &str) -> MeshGeometry {
        MeshGeometry {
            name: name.to_string(),
            positions: vec![
                [0.0, 0.0, 0.0],
                [1.0, 0.0, 0.0],
                [1.0, 1.0, 0.0],
                [0.0, 1.0, 0.0],
            ],
            normals: vec![[0.0, 0.0, 1.0]; 4],
            triangles: vec![[0, 1, 2], [0, 2, 3]],
            smooth: vec![false, false],
            corner_colors: None,
            properties: PropertyMap::new(),
        }
    }

    fn test_camera() -> CameraView {
        CameraView {
            name: "Camera".to_string(),
            camera_name: "Camera.data".to_string(),
            projection: CameraProjection::Perspective {
                horizontal_fov: FRAC_PI_2,
            },
            clip_start: 0.1,
            transform: Mat4::from_translation(Vec3::new(0.0, -5.0, 2.0)),
            depth_of_field: None,
            border: None,
        }
    }

    fn point_light(name: &str) -> LightEntity {
        LightEntity {
            name: name.to_string(),
            light_name: format!("{}.data", name),
            kind: LightKind::Point { radius: 0.25 },
            color: [1.0, 0.9, 0.8],
            intensity: 100.0,
            visible: true,
            transform: Mat4::from_translation(Vec3::new(2.0, 2.0, 4.0)),
            properties: PropertyMap::new(),
        }
    }

    fn mesh_object(name: &str, mesh: &str) -> SceneObject {
        SceneObject {
            name: name.to_string(),
            transform: Mat4::IDENTITY,
            data: DataRef::Mesh(mesh.to_string()),
            material: None,
            properties: PropertyMap::new(),
        }
    }

    fn basic_scene() -> MemoryScene {
        let mut scene = MemoryScene::new();
        scene.set_camera(test_camera());
        scene.set_world(WorldAmbient::default());
        scene.add_light(point_light("Lamp"));
        scene.add_mesh(quad_mesh("quad"));
        scene.add_object(mesh_object("quad.instance", "quad"));
        scene
    }

    fn export_scene(
        mock: &MockTransport,
        scene: &MemoryScene,
    ) -> (crate::session::Session<MockTransport>, ExportStats) {
        let mut session = crate::session::Session::over(mock.clone()).unwrap();
        mock.clear_written();
        let config = crate::config::AppConfig::localhost_defaults().render;
        let stats = SceneExporter::new(&mut session, &config)
            .export(scene)
            .unwrap();
        (session, stats)
    }

    #[test]
    fn test_export_message_order() {
        let mock = accepting_mock();
        let scene = basic_scene();
        let (session, stats) = export_scene(&mock, &scene);

        assert_eq!(session.state(), SessionState::Ready);
        assert_eq!(stats.objects, 1);
        assert_eq!(stats.lights, 1);
        assert_eq!(stats.meshes_sent, 1);

        let sent = walk_stream(&mock.written());
        let kinds = message_kinds(&sent);

        assert!(kinds[0].starts_with("UpdateRendererType"));
        assert!(kinds[1].starts_with("UpdateScene"));
        assert!(kinds[2].starts_with("UpdateFramebuffer"));
        assert!(kinds[3].starts_with("UpdateRenderSettings"));
        assert!(kinds[4].starts_with("UpdateCamera"));
        assert!(kinds[5].starts_with("UpdateWorldSettings"));
        // light object, then mesh upload, then the instance link
        assert!(kinds[6].starts_with("UpdateObject"));
        assert!(kinds[7].starts_with("UpdateBlenderMesh"));
        assert!(kinds[8].starts_with("UpdateObject"));
    }

    #[test]
    fn test_mesh_deduplication_within_one_export() {
        let mock = accepting_mock();
        let mut scene = basic_scene();
        // Second instance of the same mesh data block
        scene.add_object(mesh_object("quad.instance.001", "quad"));

        let (_session, stats) = export_scene(&mock, &scene);
        assert_eq!(stats.meshes_sent, 1);
        assert_eq!(stats.meshes_reused, 1);
        assert_eq!(stats.objects, 2);

        let sent = walk_stream(&mock.written());
        assert_eq!(count_mesh_uploads(&sent), 1);
    }

    #[test]
    fn test_mesh_deduplication_across_exports() {
        let mock = accepting_mock();
        let scene = basic_scene();

        let mut session = crate::session::Session::over(mock.clone()).unwrap();
        let config = crate::config::AppConfig::localhost_defaults().render;

        let first = SceneExporter::new(&mut session, &config)
            .export(&scene)
            .unwrap();
        assert_eq!(first.meshes_sent, 1);
        let first_raw = raw_bytes_total(&walk_stream(&{
            let w = mock.written();
            mock.clear_written();
            w
        }));
        assert!(first_raw > 0);

        // Same scene again on the same session: the data block is cached,
        // only the link goes out.
        let second = SceneExporter::new(&mut session, &config)
            .export(&scene)
            .unwrap();
        assert_eq!(second.meshes_sent, 0);
        assert_eq!(second.meshes_reused, 1);

        let sent = walk_stream(&mock.written());
        assert_eq!(count_mesh_uploads(&sent), 0);
        assert_eq!(raw_bytes_total(&sent), 0);
    }

    #[test]
    fn test_invalidate_forces_reupload() {
        let mock = accepting_mock();
        let scene = basic_scene();

        let mut session = crate::session::Session::over(mock.clone()).unwrap();
        let config = crate::config::AppConfig::localhost_defaults().render;
        SceneExporter::new(&mut session, &config)
            .export(&scene)
            .unwrap();

        session.invalidate("quad");
        mock.clear_written();

        let stats = SceneExporter::new(&mut session, &config)
            .export(&scene)
            .unwrap();
        assert_eq!(stats.meshes_sent, 1);
    }

    #[test]
    fn test_vertical_fov_derivation() {
        // Square aspect keeps the angle
        let vfov = vertical_fov(FRAC_PI_2, 1.0);
        assert!((vfov - FRAC_PI_2).abs() < 1e-6);

        // Wide aspect narrows the vertical angle
        let hfov = 1.2f32;
        let aspect = 16.0 / 9.0;
        let expected = 2.0 * ((hfov / 2.0).tan() / aspect).atan();
        assert!((vertical_fov(hfov, aspect) - expected).abs() < 1e-6);
        assert!(vertical_fov(hfov, aspect) < hfov);
    }

    #[test]
    fn test_camera_dof_aperture() {
        let mut camera = test_camera();
        camera.depth_of_field = Some(DepthOfField {
            focus_distance: 7.5,
            focal_length: 0.05,
            f_stop: 2.0,
        });

        let settings = camera_settings(&camera, 1.0);
        assert_eq!(settings.dof_focus_distance, 7.5);
        assert!((settings.dof_aperture - 0.0125).abs() < 1e-6);

        // Disabled DoF sends zeros, not absent fields
        let plain = camera_settings(&test_camera(), 1.0);
        assert_eq!(plain.dof_focus_distance, 0.0);
        assert_eq!(plain.dof_aperture, 0.0);
    }

    #[test]
    fn test_spot_penumbra_angle() {
        let light = LightEntity {
            name: "Spot".to_string(),
            light_name: "Spot.data".to_string(),
            kind: LightKind::Spot {
                radius: 0.1,
                spot_size: FRAC_PI_2,
                spot_blend: 0.5,
            },
            color: [1.0; 3],
            intensity: 50.0,
            visible: true,
            transform: Mat4::IDENTITY,
            properties: PropertyMap::new(),
        };

        let settings = light_settings(&light);
        assert_eq!(settings.light_type, LightType::Spot);
        assert!((settings.opening_angle - 90.0).abs() < 1e-4);
        assert!((settings.penumbra_angle - 22.5).abs() < 1e-4);
    }

    #[test]
    fn test_area_light_edges() {
        let light = LightEntity {
            name: "Panel".to_string(),
            light_name: "Panel.data".to_string(),
            kind: LightKind::Area {
                size_x: 2.0,
                size_y: 1.0,
            },
            color: [1.0; 3],
            intensity: 10.0,
            visible: true,
            transform: Mat4::from_translation(Vec3::new(0.0, 0.0, 3.0)),
            properties: PropertyMap::new(),
        };

        let settings = light_settings(&light);
        assert_eq!(settings.position, [-1.0, -0.5, 3.0]);
        assert_eq!(settings.edge1, [2.0, 0.0, 0.0]);
        assert_eq!(settings.edge2, [0.0, 1.0, 0.0]);
    }

    #[test]
    fn test_unresolved_mesh_reference_is_skipped() {
        let mock = accepting_mock();
        let mut scene = basic_scene();
        scene.add_object(mesh_object("ghost", "no-such-mesh"));

        let (_session, stats) = export_scene(&mock, &scene);
        // The broken object is skipped, the valid one still exported
        assert_eq!(stats.objects, 1);
        assert_eq!(stats.skipped, 1);
    }

    #[test]
    fn test_unsupported_material_is_skipped() {
        let mock = accepting_mock();
        let mut scene = basic_scene();
        scene.add_material(MaterialDef {
            name: "weird".to_string(),
            surface: Some(SurfaceShader::Unsupported {
                kind: "NoiseTexture".to_string(),
            }),
        });
        let mut object = mesh_object("quad.instance.001", "quad");
        object.material = Some("weird".to_string());
        scene.add_object(object);

        let (_session, stats) = export_scene(&mock, &scene);
        assert_eq!(stats.materials, 0);
        assert_eq!(stats.objects, 2);

        // The object exports with no material override
        let sent = walk_stream(&mock.written());
        let links: Vec<&ObjectUpdate> = sent
            .iter()
            .filter_map(|s| match s {
                Sent::Object(u) if u.object_type == ObjectType::Mesh => Some(u),
                _ => None,
            })
            .collect();
        assert_eq!(links.len(), 2);
        assert!(links.iter().all(|u| u.material_link.is_empty()));
    }

    #[test]
    fn test_supported_material_is_linked() {
        let mock = accepting_mock();
        let mut scene = basic_scene();
        scene.add_material(MaterialDef {
            name: "matte".to_string(),
            surface: Some(SurfaceShader::Obj(ObjMaterial::default())),
        });
        let mut object = mesh_object("quad.instance.001", "quad");
        object.material = Some("matte".to_string());
        scene.add_object(object);

        let (_session, stats) = export_scene(&mock, &scene);
        assert_eq!(stats.materials, 1);

        let sent = walk_stream(&mock.written());
        let linked = sent
            .iter()
            .any(|s| matches!(s, Sent::Object(u) if u.material_link == "matte"));
        assert!(linked);
    }

    #[test]
    fn test_plugin_generation_failure_skips_entity() {
        let mock = accepting_mock();
        mock.inject_read(&server_frame(&GenerateFunctionResult {
            success: false,
            message: "file not found: /data/galaxy.h5".to_string(),
        }));

        let mut scene = basic_scene();
        let mut parameters = PropertyMap::new();
        parameters.insert(
            "file".to_string(),
            PropertyValue::from("/data/galaxy.h5"),
        );
        scene.add_plugin_data(PluginData {
            name: "galaxy".to_string(),
            plugin_type: PluginType::Volume,
            plugin_name: "volume_hdf5".to_string(),
            parameters,
        });
        scene.add_object(SceneObject {
            name: "galaxy.instance".to_string(),
            transform: Mat4::IDENTITY,
            data: DataRef::Plugin("galaxy".to_string()),
            material: None,
            properties: PropertyMap::new(),
        });

        let (session, stats) = export_scene(&mock, &scene);
        assert_eq!(stats.skipped, 1);
        assert_eq!(stats.plugins_sent, 0);
        // Failed generation must not poison the cache
        assert!(!session.was_exported("galaxy"));
    }

    #[test]
    fn test_plugin_success_links_object() {
        let mock = accepting_mock();
        mock.inject_read(&server_frame(&GenerateFunctionResult {
            success: true,
            message: String::new(),
        }));

        let mut scene = basic_scene();
        scene.add_plugin_data(PluginData {
            name: "stars".to_string(),
            plugin_type: PluginType::Geometry,
            plugin_name: "geometry_stars".to_string(),
            parameters: PropertyMap::new(),
        });
        scene.add_object(SceneObject {
            name: "stars.instance".to_string(),
            transform: Mat4::IDENTITY,
            data: DataRef::Plugin("stars".to_string()),
            material: None,
            properties: PropertyMap::new(),
        });

        let (session, stats) = export_scene(&mock, &scene);
        assert_eq!(stats.plugins_sent, 1);
        assert_eq!(stats.objects, 2);
        assert!(session.was_exported("stars"));
    }

    #[test]
    fn test_smooth_mesh_sends_normals() {
        let mock = accepting_mock();
        let mut scene = MemoryScene::new();
        scene.set_camera(test_camera());

        let mut mesh = quad_mesh("smooth-quad");
        mesh.smooth = vec![true, false]; // mixed counts as smooth
        scene.add_mesh(mesh);
        scene.add_object(mesh_object("smooth.instance", "smooth-quad"));

        let (_session, _stats) = export_scene(&mock, &scene);

        let sent = walk_stream(&mock.written());
        // positions (4*12) + normals (4*12) + indices (2*12)
        assert_eq!(raw_bytes_total(&sent), 48 + 48 + 24);
    }

    #[test]
    fn test_corner_color_averaging() {
        let mut mesh = quad_mesh("colored");
        // Vertex 0 appears in both triangles with different corner colors
        mesh.corner_colors = Some(vec![
            [1.0, 0.0, 0.0, 1.0],
            [0.0, 1.0, 0.0, 1.0],
            [0.0, 0.0, 1.0, 1.0],
            [0.0, 0.0, 0.0, 1.0],
            [1.0, 1.0, 1.0, 1.0],
            [0.5, 0.5, 0.5, 1.0],
        ]);

        let colors = vertex_colors_from_corners(&mesh);
        assert_eq!(colors.len(), 4);
        // Vertex 0: corners (1,0,0) and (0,0,0) average to (0.5,0,0)
        assert!((colors[0][0] - 0.5).abs() < 1e-6);
        assert_eq!(colors[0][3], 1.0);
    }

    #[test]
    fn test_wire_matrix_is_row_major() {
        let m = Mat4::from_translation(Vec3::new(1.0, 2.0, 3.0));
        let wire = matrix_to_wire(&m);
        // Translation lands in the right-most column of each row
        assert_eq!(wire[3], 1.0);
        assert_eq!(wire[7], 2.0);
        assert_eq!(wire[11], 3.0);
        assert_eq!(wire[15], 1.0);
    }
}

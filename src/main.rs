//! renderlink control binary
//!
//! Small command-line client for a running render server:
//!
//! - `renderlink state` prints the server's state dump
//! - `renderlink render` uploads a built-in demo scene, renders it, and
//!   writes the received frames to disk; Ctrl-C cancels cooperatively

use renderlink::config::AppConfig;
use renderlink::error::{Error, Result};
use renderlink::export::SceneExporter;
use renderlink::render::{FrameSink, FrameUpdate, RenderDriver, RenderOptions};
use renderlink::scene::{
    CameraProjection, CameraView, DataRef, LightEntity, LightKind, MemoryScene, MeshGeometry,
    PropertyMap, SceneObject, WorldAmbient,
};
use renderlink::session::Session;
use glam::{Mat4, Vec3};
use std::env;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Parse command line arguments.
///
/// Supports:
/// - `renderlink [command]`
/// - `renderlink --config <path> [command]`
/// - `renderlink -c <path> [command]`
///
/// Command defaults to `render`.
fn parse_args() -> (Option<String>, String, Option<PathBuf>) {
    let args: Vec<String> = env::args().collect();

    let mut config_path = None;
    let mut save_dir = None;
    let mut command = "render".to_string();

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--config" | "-c" if i + 1 < args.len() => {
                config_path = Some(args[i + 1].clone());
                i += 2;
            }
            "--save" | "-s" if i + 1 < args.len() => {
                save_dir = Some(PathBuf::from(&args[i + 1]));
                i += 2;
            }
            arg if !arg.starts_with('-') => {
                command = arg.to_string();
                i += 1;
            }
            _ => {
                i += 1;
            }
        }
    }

    (config_path, command, save_dir)
}

/// Sink that logs progress and optionally writes each received frame to
/// disk, in whatever encoding the server sent.
struct FileSink {
    save_dir: Option<PathBuf>,
    frames: u32,
}

impl FrameSink for FileSink {
    fn on_frame(&mut self, frame: FrameUpdate) {
        self.frames += 1;
        log::info!(
            "Frame: sample {} ({}x{}, {} bytes)",
            frame.sample,
            frame.width,
            frame.height,
            frame.pixels.len()
        );

        if let Some(dir) = &self.save_dir {
            let path = dir.join(format!("frame-{:04}.bin", frame.sample));
            if let Err(e) = std::fs::write(&path, &frame.pixels) {
                log::error!("Failed to write {}: {}", path.display(), e);
            }
        }
    }

    fn on_done(&mut self) {
        log::info!("Rendering done ({} frames received)", self.frames);
    }

    fn on_canceled(&mut self) {
        log::info!("Rendering canceled ({} frames received)", self.frames);
    }

    fn on_status(&mut self, progress: f32, status: &str) {
        log::debug!("[{:3.0}%] {}", progress * 100.0, status);
    }
}

/// Built-in demo scene: a two-triangle quad, one point light, a camera
fn demo_scene() -> MemoryScene {
    let mut scene = MemoryScene::new();

    let eye = Vec3::new(3.0, -3.0, 2.0);
    scene.set_camera(CameraView {
        name: "Camera".to_string(),
        camera_name: "Camera.data".to_string(),
        projection: CameraProjection::Perspective {
            horizontal_fov: 60f32.to_radians(),
        },
        clip_start: 0.01,
        transform: Mat4::look_at_rh(eye, Vec3::ZERO, Vec3::Z).inverse(),
        depth_of_field: None,
        border: None,
    });

    scene.set_world(WorldAmbient {
        ambient_color: [1.0; 3],
        ambient_intensity: 0.2,
        background_color: [0.05, 0.05, 0.08, 1.0],
    });

    scene.add_light(LightEntity {
        name: "Lamp".to_string(),
        light_name: "Lamp.data".to_string(),
        kind: LightKind::Point { radius: 0.1 },
        color: [1.0, 0.95, 0.9],
        intensity: 100.0,
        visible: true,
        transform: Mat4::from_translation(Vec3::new(2.0, -1.0, 4.0)),
        properties: PropertyMap::new(),
    });

    scene.add_mesh(MeshGeometry {
        name: "ground".to_string(),
        positions: vec![
            [-2.0, -2.0, 0.0],
            [2.0, -2.0, 0.0],
            [2.0, 2.0, 0.0],
            [-2.0, 2.0, 0.0],
        ],
        normals: vec![[0.0, 0.0, 1.0]; 4],
        triangles: vec![[0, 1, 2], [0, 2, 3]],
        smooth: vec![false, false],
        corner_colors: None,
        properties: PropertyMap::new(),
    });
    scene.add_object(SceneObject {
        name: "ground.instance".to_string(),
        transform: Mat4::IDENTITY,
        data: DataRef::Mesh("ground".to_string()),
        material: None,
        properties: PropertyMap::new(),
    });

    scene
}

fn run_state(config: &AppConfig) -> Result<()> {
    let mut session = Session::connect(&config.server.host, config.server.port)?;
    let state = session.server_state()?;
    println!("{}", state);
    session.close();
    Ok(())
}

fn run_render(config: &AppConfig, save_dir: Option<PathBuf>) -> Result<()> {
    if let Some(dir) = &save_dir {
        std::fs::create_dir_all(dir)?;
    }

    let mut session = Session::connect(&config.server.host, config.server.port)?;

    let scene = demo_scene();
    let stats = SceneExporter::new(&mut session, &config.render).export(&scene)?;
    log::info!(
        "Exported {} objects, {} lights ({} skipped)",
        stats.objects,
        stats.lights,
        stats.skipped
    );

    // Ctrl-C flips the cooperative cancel flag; the loop then waits for
    // the server's acknowledgment instead of tearing the socket down.
    let cancel = Arc::new(AtomicBool::new(false));
    let flag = Arc::clone(&cancel);
    ctrlc::set_handler(move || {
        log::info!("Stop requested, canceling render");
        flag.store(true, Ordering::Relaxed);
    })
    .map_err(|e| Error::Other(format!("Error setting Ctrl-C handler: {}", e)))?;

    let mut sink = FileSink {
        save_dir,
        frames: 0,
    };
    let options = RenderOptions::final_render(&config.render);
    RenderDriver::new(&mut session, cancel).run(&options, &mut sink)?;

    session.close();
    Ok(())
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let (config_path, command, save_dir) = parse_args();

    let config = match &config_path {
        Some(path) => {
            log::info!("Using config: {}", path);
            AppConfig::from_file(path)?
        }
        None => AppConfig::default(),
    };

    log::info!(
        "renderlink connecting to {}:{} (renderer: {})",
        config.server.host,
        config.server.port,
        config.render.renderer
    );

    match command.as_str() {
        "state" => run_state(&config),
        "render" => run_render(&config, save_dir),
        other => {
            eprintln!("Unknown command '{}'. Commands: state, render", other);
            std::process::exit(2);
        }
    }
}

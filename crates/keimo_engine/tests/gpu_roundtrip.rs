//! End-to-end checks against a real GPU
//!
//! GLFW has to be driven from the main thread, so this target runs with
//! `harness = false` and calls each check in turn from `main`. It needs a
//! Vulkan driver and a display, and only runs when `KEIMO_GPU_TESTS=1`:
//! `KEIMO_GPU_TESTS=1 cargo test -p keimo_engine --test gpu_roundtrip`

use std::path::PathBuf;

use ash::vk;
use keimo_engine::foundation::logging;
use keimo_engine::prelude::*;
use keimo_engine::render::vulkan::{Model, Texture};

const ENABLE_VAR: &str = "KEIMO_GPU_TESTS";

fn shader_dir() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("../../target/shaders")
}

fn hidden_config() -> EngineConfig {
    let dir = shader_dir();
    let shaders = ShaderConfig::new(dir.join("shader.vert.spv"), dir.join("shader.frag.spv"));
    EngineConfig::default()
        .with_window(WindowConfig::default().with_size(320, 240).with_visible(false))
        .with_renderer(RendererConfig::new("keimo gpu tests").with_shaders(shaders))
}

fn test_transfer_round_trip(renderer: &mut Renderer, _window: &GlfwWindow) {
    let payload: Vec<u8> = (0..=255u8).cycle().take(4096).collect();
    let buffer = renderer
        .transfer()
        .upload(&payload, vk::BufferUsageFlags::TRANSFER_SRC)
        .expect("upload");
    let read = renderer
        .transfer()
        .read_back(&buffer, payload.len() as vk::DeviceSize)
        .expect("read back");

    assert_eq!(read, payload);
}

fn test_rebuilds_do_not_leak(renderer: &mut Renderer, window: &GlfwWindow) {
    let size = window.drawable_size();

    let before = renderer.tracker().snapshot();
    for _ in 0..3 {
        renderer.force_rebuild(size).expect("rebuild");
    }

    assert_eq!(renderer.tracker().snapshot(), before);
}

fn test_quad_upload_sizes(renderer: &mut Renderer, _window: &GlfwWindow) {
    let quad = MeshData::quad();
    let model = Model::from_mesh(renderer.transfer(), &quad).expect("model");

    assert_eq!(model.vertex_count(), 4);
    assert_eq!(model.index_count(), 6);
    assert_eq!(model.vertex_buffer().size(), quad.vertex_bytes().len() as vk::DeviceSize);
    assert_eq!(model.index_buffer().size(), quad.index_bytes().len() as vk::DeviceSize);
}

fn test_small_texture_reads_back_level_zero(renderer: &mut Renderer, _window: &GlfwWindow) {
    #[rustfmt::skip]
    let pixels = vec![
        255, 0, 0, 255,     0, 255, 0, 255,
        0, 0, 255, 255,     255, 255, 255, 128,
    ];
    let image = ImageData::new(2, 2, pixels.clone(), "2x2 test pattern").expect("image");
    let texture = Texture::from_image_data(renderer.transfer(), &image).expect("texture");

    assert_eq!(texture.mip_chain().level_count(), 2);
    assert_eq!(renderer.texture().mip_chain().level_count(), 9);

    let level0 = texture.read_back_level(renderer.transfer(), 0).expect("read back level 0");
    assert_eq!(level0, pixels);

    let level1 = texture.read_back_level(renderer.transfer(), 1).expect("read back level 1");
    assert_eq!(level1.len(), 4);
}

type Check = fn(&mut Renderer, &GlfwWindow);

const CHECKS: &[(&str, Check)] = &[
    ("test_transfer_round_trip", test_transfer_round_trip),
    ("test_rebuilds_do_not_leak", test_rebuilds_do_not_leak),
    ("test_quad_upload_sizes", test_quad_upload_sizes),
    ("test_small_texture_reads_back_level_zero", test_small_texture_reads_back_level_zero),
];

fn main() {
    if std::env::var(ENABLE_VAR).as_deref() != Ok("1") {
        println!("gpu_roundtrip: skipped, set {}=1 to run against a real device", ENABLE_VAR);
        return;
    }
    logging::init_with_default_filter("warn");

    let config = hidden_config();
    let mut window = GlfwWindow::new(&config.window).expect("window");
    let mut renderer = Renderer::new(&mut window, &config).expect("renderer");

    for (name, check) in CHECKS {
        print!("test {} ... ", name);
        check(&mut renderer, &window);
        println!("ok");
    }

    // GPU objects go before the surface's window
    drop(renderer);
    drop(window);
    println!("gpu_roundtrip: {} checks passed", CHECKS.len());
}

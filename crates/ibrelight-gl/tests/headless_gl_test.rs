//! Headless GPU integration tests.
//!
//! These need a GPU adapter (real or software fallback). Without one, each test
//! prints a note to stderr and returns early.

use ibrelight_gl::*;

const SOLID_COLOR: &str = r"
struct Uniforms {
    color: vec4<f32>,
}
@group(0) @binding(0) var<uniform> u: Uniforms;

@vertex
fn vs_main(@location(0) position: vec2<f32>) -> @builtin(position) vec4<f32> {
    return vec4<f32>(position, 0.0, 1.0);
}

@fragment
fn fs_main() -> @location(0) vec4<f32> {
    return u.color;
}
";

fn context(width: u32, height: u32) -> Option<Context> {
    match Context::new_headless(width, height) {
        Ok(context) => Some(context),
        Err(e) => {
            eprintln!("Skipping GPU test: no adapter available ({e})");
            None
        }
    }
}

fn solid_color_drawable(context: &Context) -> Drawable {
    let program = context
        .shader_program_builder()
        .add_shader_source(ShaderType::Vertex, SOLID_COLOR)
        .add_shader_source(ShaderType::Fragment, SOLID_COLOR)
        .create_program()
        .expect("solid color program should link");
    context.create_drawable(program).expect("drawable creation failed")
}

#[test]
fn test_texture_reports_requested_state() {
    let Some(context) = context(4, 4) else { return };

    let texture = context
        .build_color_texture_2d(64, 32)
        .set_internal_format(ColorFormat::RGBA8)
        .set_mipmaps_enabled(true)
        .set_linear_filtering_enabled(true)
        .create_texture()
        .expect("RGBA8 texture should be supported everywhere");

    assert_eq!(texture.format(), TextureFormat::Color(ColorFormat::RGBA8));
    assert!(texture.mipmaps_enabled());
    assert!(texture.linear_filtering_enabled());
    assert_eq!(texture.mip_level_count(), 7);
    assert_eq!((texture.width(), texture.height()), (64, 32));
}

#[test]
fn test_clear_and_read_back() {
    let Some(context) = context(4, 4) else { return };

    let fbo = context
        .build_framebuffer_object(16, 8)
        .add_color_attachment(AttachmentSpec::color(ColorFormat::RGBA8))
        .create_framebuffer_object()
        .unwrap();
    fbo.clear_color_buffer(0, [1.0, 0.0, 0.0, 1.0]).unwrap();

    let readback = fbo.read_color_buffer(0).unwrap();
    assert_eq!(readback.data().len(), 16 * 8 * 4);
    assert!(readback.data().chunks(4).all(|px| px == [255, 0, 0, 255]));
}

#[test]
fn test_draw_rectangle_fills_target() {
    let Some(context) = context(4, 4) else { return };

    let fbo = context
        .build_framebuffer_object(32, 32)
        .add_color_attachment(AttachmentSpec::color(ColorFormat::RGBA8))
        .create_framebuffer_object()
        .unwrap();
    fbo.clear_color_buffer(0, [0.0, 0.0, 0.0, 1.0]).unwrap();

    let rectangle = context.create_rectangle().unwrap();
    let mut drawable = solid_color_drawable(&context);
    assert!(drawable.add_vertex_buffer("position", &rectangle).unwrap());
    assert!(!drawable.add_vertex_buffer("normal", &rectangle).unwrap());
    assert!(drawable
        .program_mut()
        .set_uniform("color", glam::Vec4::new(0.0, 1.0, 0.0, 1.0))
        .unwrap());

    drawable.draw(PrimitiveMode::TriangleFan, &fbo).unwrap();
    let readback = fbo.read_color_buffer(0).unwrap();
    assert!(readback.data().chunks(4).all(|px| px == [0, 255, 0, 255]));
}

#[test]
fn test_viewport_limits_draw() {
    let Some(context) = context(4, 4) else { return };

    let fbo = context
        .build_framebuffer_object(8, 8)
        .add_color_attachment(AttachmentSpec::color(ColorFormat::RGBA8))
        .create_framebuffer_object()
        .unwrap();
    fbo.clear_color_buffer(0, [0.0, 0.0, 0.0, 0.0]).unwrap();

    let rectangle = context.create_rectangle().unwrap();
    let mut drawable = solid_color_drawable(&context);
    drawable.add_vertex_buffer("position", &rectangle).unwrap();
    drawable
        .program_mut()
        .set_uniform("color", glam::Vec4::ONE)
        .unwrap();
    drawable
        .draw_viewport(
            PrimitiveMode::TriangleFan,
            &fbo,
            ibrelight_core::PixelRect::new(0, 0, 4, 8),
        )
        .unwrap();

    let readback = fbo.read_color_buffer(0).unwrap();
    for (i, px) in readback.data().chunks(4).enumerate() {
        let column = i % 8;
        let expected: [u8; 4] = if column < 4 { [255; 4] } else { [0; 4] };
        assert_eq!(px, expected, "pixel column {column}");
    }
}

#[test]
fn test_uniforms_are_ordered_between_draws() {
    let Some(context) = context(4, 4) else { return };

    let fbo = context
        .build_framebuffer_object(8, 8)
        .add_color_attachment(AttachmentSpec::color(ColorFormat::RGBA8))
        .create_framebuffer_object()
        .unwrap();
    let rectangle = context.create_rectangle().unwrap();
    let mut drawable = solid_color_drawable(&context);
    drawable.add_vertex_buffer("position", &rectangle).unwrap();

    let halves = [
        (ibrelight_core::PixelRect::new(0, 0, 4, 8), glam::Vec4::new(1.0, 0.0, 0.0, 1.0)),
        (ibrelight_core::PixelRect::new(4, 0, 4, 8), glam::Vec4::new(0.0, 0.0, 1.0, 1.0)),
    ];
    for (rect, color) in halves {
        drawable.program_mut().set_uniform("color", color).unwrap();
        drawable
            .draw_viewport(PrimitiveMode::TriangleFan, &fbo, rect)
            .unwrap();
    }

    let readback = fbo.read_color_buffer(0).unwrap();
    let row = &readback.data()[..8 * 4];
    assert_eq!(&row[..4], &[255, 0, 0, 255]);
    assert_eq!(&row[7 * 4..], &[0, 0, 255, 255]);
}

#[test]
fn test_link_failure_reports_log() {
    let Some(context) = context(4, 4) else { return };

    let result = context
        .shader_program_builder()
        .add_shader_source(ShaderType::Vertex, SOLID_COLOR)
        .create_program();
    assert!(matches!(result, Err(GlError::ProgramLink { .. })));

    let result = context
        .shader_program_builder()
        .add_shader_file(ShaderType::Vertex, "does/not/exist.wgsl")
        .add_shader_source(ShaderType::Fragment, SOLID_COLOR)
        .create_program();
    assert!(matches!(result, Err(GlError::ShaderFileNotFound { .. })));
}

#[test]
fn test_resources_require_current_context() {
    let Some(context) = context(4, 4) else { return };

    context.release_current();
    let result = context.build_color_texture_2d(4, 4).create_texture();
    assert!(matches!(result, Err(GlError::ContextNotCurrent)));

    context.make_current();
    let mut texture = context.build_color_texture_2d(4, 4).create_texture().unwrap();
    texture.close();
    texture.close();
    assert!(texture.is_closed());
}

#[test]
fn test_texture_units_are_bounded() {
    let Some(context) = context(4, 4) else { return };

    let source = r"
@group(1) @binding(0) var albedo: texture_2d<f32>;
@group(1) @binding(1) var albedo_sampler: sampler;

@vertex
fn vs_main(@location(0) position: vec2<f32>) -> @builtin(position) vec4<f32> {
    return vec4<f32>(position, 0.0, 1.0);
}

@fragment
fn fs_main() -> @location(0) vec4<f32> {
    return textureSample(albedo, albedo_sampler, vec2<f32>(0.5));
}
";
    let mut program = context
        .shader_program_builder()
        .add_shader_source(ShaderType::Vertex, source)
        .add_shader_source(ShaderType::Fragment, source)
        .create_program()
        .unwrap();
    let texture = context
        .build_color_texture_2d(2, 2)
        .set_linear_filtering_enabled(true)
        .create_texture()
        .unwrap();

    assert!(program.set_texture("albedo", &texture).unwrap());
    let unit = program.texture_unit("albedo");
    assert!(program.set_texture("albedo", &texture).unwrap());
    assert_eq!(program.texture_unit("albedo"), unit);
    assert!(!program.set_texture("missing", &texture).unwrap());
}

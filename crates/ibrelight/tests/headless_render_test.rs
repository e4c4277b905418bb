//! Headless rendering integration tests.
//!
//! Rendering tests need a GPU adapter (real or software fallback). Without
//! one, they print a note to stderr and return early.

use std::path::PathBuf;
use std::sync::Arc;

use ibrelight::*;

fn project() -> ProjectDescription {
    let mut project = ProjectDescription {
        views: ViewSetData::from_poses([
            Mat4::look_at_rh(Vec3::new(0.0, 0.0, 3.0), Vec3::ZERO, Vec3::Y),
            Mat4::look_at_rh(Vec3::new(0.0, 3.0, 0.1), Vec3::ZERO, Vec3::Y),
        ]),
        lights: vec![LightSpec::default()],
        ..ProjectDescription::default()
    };
    project.settings.shader_directory =
        PathBuf::from(concat!(env!("CARGO_MANIFEST_DIR"), "/../../shaders"));
    project.settings.shadow_map_resolution = 64;
    project.settings.screen_space_depth_resolution = 32;
    project.settings.subdivision_width = 32;
    project.settings.subdivision_height = 32;
    project
}

fn quad() -> MeshData {
    let positions = vec![
        Vec3::new(-1.0, -1.0, 0.0),
        Vec3::new(1.0, -1.0, 0.0),
        Vec3::new(1.0, 1.0, 0.0),
        Vec3::new(-1.0, -1.0, 0.0),
        Vec3::new(1.0, 1.0, 0.0),
        Vec3::new(-1.0, 1.0, 0.0),
    ];
    let tex_coords = positions
        .iter()
        .map(|p| Vec2::new(p.x * 0.5 + 0.5, p.y * 0.5 + 0.5))
        .collect();
    MeshData::new(positions, vec![Vec3::Z; 6]).with_tex_coords(tex_coords)
}

fn skip_without_gpu<T>(result: Result<T>) -> Option<T> {
    match result {
        Ok(value) => Some(value),
        Err(IbrelightError::Gl(e)) if Context::new_headless(1, 1).is_err() => {
            eprintln!("Skipping GPU test: no adapter available ({e})");
            None
        }
        Err(e) => panic!("render failed: {e}"),
    }
}

#[test]
fn test_render_to_image_dimensions() {
    let Some(frame) = skip_without_gpu(render_to_image(&project(), &quad(), 64, 48)) else {
        return;
    };
    assert_eq!((frame.width(), frame.height()), (64, 48));
    assert_eq!(frame.data().len(), 64 * 48 * 4);
}

#[test]
fn test_render_to_file_writes_png() {
    let path = std::env::temp_dir().join(format!("ibrelight-frame-{}.png", std::process::id()));
    if skip_without_gpu(render_to_file(&project(), &quad(), &path, 32, 32)).is_none() {
        return;
    }
    let bytes = std::fs::read(&path).unwrap();
    std::fs::remove_file(&path).ok();
    assert_eq!(&bytes[..8], b"\x89PNG\r\n\x1a\n");
}

#[test]
fn test_render_view_out_of_range() {
    let result = render_view_to_image(&project(), &quad(), 7, 16, 16);
    assert!(matches!(
        result,
        Err(IbrelightError::Core(CoreError::IndexOutOfRange { index: 7, .. }))
    ));
}

#[test]
fn test_render_view_through_second_pose() {
    let Some(frame) = skip_without_gpu(render_view_to_image(&project(), &quad(), 1, 16, 16)) else {
        return;
    };
    assert_eq!(frame.width(), 16);
}

#[test]
fn test_invalid_mesh_is_rejected_before_drawing() {
    let mesh = MeshData::new(vec![Vec3::ZERO; 2], vec![Vec3::Z; 2]);
    let result = render_to_image(&project(), &mesh, 16, 16);
    match result {
        Err(IbrelightError::InvalidMesh(_)) => {}
        Err(IbrelightError::Gl(e)) => eprintln!("Skipping GPU test: no adapter available ({e})"),
        other => panic!("expected an invalid mesh error, got {other:?}"),
    }
}

#[test]
fn test_render_views_to_directory() {
    let project = project();
    let output = std::env::temp_dir().join(format!("ibrelight-views-{}", std::process::id()));
    let fragment = project.settings.shader_path("common/debug_view.wgsl");
    let Some(summary) = skip_without_gpu(render_views_to_directory(
        &project,
        &quad(),
        fragment,
        &output,
        FramebufferSize::new(8, 8),
        Arc::new(NullMonitor),
    )) else {
        return;
    };
    assert_eq!(summary.completed, 1);
    assert!(output.join("view_0000.png").is_file());
    assert!(output.join("view_0001.png").is_file());
    std::fs::remove_dir_all(&output).ok();
}

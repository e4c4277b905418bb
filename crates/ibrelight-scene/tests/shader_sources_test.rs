//! Parses and validates the bundled WGSL sources with the defines the scene
//! components compile them with.

use std::path::PathBuf;

fn shader_dir() -> PathBuf {
    PathBuf::from(concat!(env!("CARGO_MANIFEST_DIR"), "/../../shaders"))
}

fn validate(relative: &str, defines: &str) -> naga::Module {
    let path = shader_dir().join(relative);
    let code = std::fs::read_to_string(&path)
        .unwrap_or_else(|e| panic!("cannot read {}: {e}", path.display()));
    let source = format!("{defines}{code}");
    let module = naga::front::wgsl::parse_str(&source)
        .unwrap_or_else(|e| panic!("{relative}:\n{}", e.emit_to_string(&source)));
    naga::valid::Validator::new(
        naga::valid::ValidationFlags::all(),
        naga::valid::Capabilities::all(),
    )
    .validate(&module)
    .unwrap_or_else(|e| panic!("{relative}:\n{}", e.emit_to_string(&source)));
    module
}

fn has_entry(module: &naga::Module, stage: naga::ShaderStage) -> bool {
    module.entry_points.iter().any(|e| e.stage == stage)
}

#[test]
fn test_depth_shader() {
    let module = validate("common/depth.wgsl", "");
    assert!(has_entry(&module, naga::ShaderStage::Vertex));
    let fragment = module
        .entry_points
        .iter()
        .find(|e| e.stage == naga::ShaderStage::Fragment)
        .unwrap();
    assert!(fragment.function.result.is_none());
}

#[test]
fn test_subject_shader_with_every_define_combination() {
    for shadows in [false, true] {
        for relighting in [false, true] {
            let defines = format!(
                "const RELIGHTING_ENABLED: bool = {relighting};\nconst SHADOWS_ENABLED: bool = {shadows};\n"
            );
            let module = validate("common/subject.wgsl", &defines);
            assert!(has_entry(&module, naga::ShaderStage::Vertex));
            assert!(has_entry(&module, naga::ShaderStage::Fragment));
        }
    }
}

#[test]
fn test_subject_shader_requires_defines() {
    let path = shader_dir().join("common/subject.wgsl");
    let code = std::fs::read_to_string(path).unwrap();
    assert!(naga::front::wgsl::parse_str(&code).is_err());
}

#[test]
fn test_camera_widget_shader() {
    let module = validate("common/camera_widget.wgsl", "");
    assert!(has_entry(&module, naga::ShaderStage::Vertex));
    assert!(has_entry(&module, naga::ShaderStage::Fragment));
}

#[test]
fn test_batch_vertex_shaders_are_vertex_only() {
    for name in ["common/texspace.wgsl", "common/imgspace.wgsl"] {
        let module = validate(name, "");
        assert!(has_entry(&module, naga::ShaderStage::Vertex), "{name}");
        assert!(!has_entry(&module, naga::ShaderStage::Fragment), "{name}");
    }
}

#[test]
fn test_debug_view_shader_is_fragment_only() {
    let module = validate("common/debug_view.wgsl", "");
    assert!(has_entry(&module, naga::ShaderStage::Fragment));
    assert!(!has_entry(&module, naga::ShaderStage::Vertex));
}

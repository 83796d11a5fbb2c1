//! Every generated WGSL program must parse and validate.

use flowlens::shaders::{
    advect_shader, cursor_shader, post_process_shader, sprite_shader, visualize_shader, vorticity_shader,
};
use flowlens::VisualMode;

/// Validates WGSL code using naga.
fn validate_wgsl(code: &str) -> Result<naga::Module, String> {
    let module = naga::front::wgsl::parse_str(code).map_err(|e| format!("WGSL parse error: {}", e.emit_to_string(code)))?;

    let mut validator = naga::valid::Validator::new(
        naga::valid::ValidationFlags::all(),
        naga::valid::Capabilities::all(),
    );
    validator
        .validate(&module)
        .map_err(|e| format!("WGSL validation error: {:?}", e))?;

    Ok(module)
}

fn entry_points(module: &naga::Module) -> Vec<(&str, naga::ShaderStage)> {
    module
        .entry_points
        .iter()
        .map(|ep| (ep.name.as_str(), ep.stage))
        .collect()
}

#[test]
fn test_every_visualize_mode_validates() {
    for mode in VisualMode::ALL {
        let code = visualize_shader(mode);
        let module = validate_wgsl(&code).unwrap_or_else(|e| panic!("{}: {}", mode.label(), e));
        let entries = entry_points(&module);
        assert!(entries.contains(&("vs_main", naga::ShaderStage::Vertex)));
        assert!(entries.contains(&("fs_main", naga::ShaderStage::Fragment)));
    }
}

#[test]
fn test_vorticity_validates() {
    let module = validate_wgsl(&vorticity_shader()).unwrap();
    assert!(entry_points(&module).contains(&("fs_main", naga::ShaderStage::Fragment)));
}

#[test]
fn test_advect_validates() {
    let module = validate_wgsl(&advect_shader()).unwrap();
    let entries = entry_points(&module);
    assert_eq!(entries, vec![("main", naga::ShaderStage::Compute)]);

    let ep = &module.entry_points[0];
    assert_eq!(ep.workgroup_size, [flowlens::shaders::WORKGROUP_SIZE, 1, 1]);
}

#[test]
fn test_sprite_validates() {
    let module = validate_wgsl(&sprite_shader()).unwrap();
    let entries = entry_points(&module);
    assert!(entries.contains(&("vs_main", naga::ShaderStage::Vertex)));
    assert!(entries.contains(&("fs_main", naga::ShaderStage::Fragment)));
}

#[test]
fn test_post_process_validates() {
    validate_wgsl(&post_process_shader()).unwrap();
}

#[test]
fn test_cursor_validates() {
    validate_wgsl(&cursor_shader()).unwrap();
}

#[test]
fn test_visualize_modes_differ() {
    let programs: Vec<String> = VisualMode::ALL.iter().map(|&m| visualize_shader(m)).collect();
    for (i, a) in programs.iter().enumerate() {
        for b in &programs[i + 1..] {
            assert_ne!(a, b);
        }
    }
}

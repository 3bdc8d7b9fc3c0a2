//! Embedded WGSL programs.

/// Effect name of the volume raycasting program in the shader catalog.
pub const VOLUME_RAYCASTING_EFFECT: &str = "VolumeRaycastingEffect";

/// Byte size of the `Params` uniform block below.
pub const PARAMS_SIZE: u64 = 160;

/// Offset of each named parameter inside the `Params` uniform block.
pub const PARAM_OFFSETS: [(&str, u64); 4] = [
    ("WorldViewProjectionMatrix", 0),
    ("InverseViewProjectionMatrix", 64),
    ("CameraPositionWorldSpace", 128),
    ("VolumeDimension", 144),
];

/// Volume raycasting effect. Every `fs_<Technique>` fragment entry point is
/// one technique; a technique uses `vs_<Technique>` when present and
/// `vs_main` otherwise.
///
/// The density volume is an axis-aligned box centred on the world origin,
/// one world unit per voxel.
pub const VOLUME_RAYCASTING_WGSL: &str = r#"
struct Params {
    world_view_projection: mat4x4<f32>,
    inverse_view_projection: mat4x4<f32>,
    camera_position: vec3<f32>,
    _pad0: f32,
    volume_dimension: vec3<f32>,
    _pad1: f32,
};

@group(0) @binding(0) var<uniform> params: Params;
@group(0) @binding(1) var volume: texture_3d<f32>;

const MAX_STEPS: i32 = 1024;
const SOLID_THRESHOLD: f32 = 0.5;

struct VertexInput {
    @location(0) position: vec3<f32>,
    @location(1) color: vec4<f32>,
};

struct VertexOutput {
    @builtin(position) clip_position: vec4<f32>,
    @location(0) ndc: vec2<f32>,
    @location(1) color: vec4<f32>,
};

// Full-screen quad: positions are already in normalized device coordinates.
@vertex
fn vs_main(in: VertexInput) -> VertexOutput {
    var out: VertexOutput;
    out.clip_position = vec4<f32>(in.position.xy, 0.0, 1.0);
    out.ndc = in.position.xy;
    out.color = in.color;
    return out;
}

@vertex
fn vs_VertexColor(in: VertexInput) -> VertexOutput {
    var out: VertexOutput;
    out.clip_position = params.world_view_projection * vec4<f32>(in.position, 1.0);
    out.ndc = out.clip_position.xy / out.clip_position.w;
    out.color = in.color;
    return out;
}

fn unproject(ndc: vec2<f32>, depth: f32) -> vec3<f32> {
    let p = params.inverse_view_projection * vec4<f32>(ndc, depth, 1.0);
    return p.xyz / p.w;
}

fn ray_direction(ndc: vec2<f32>) -> vec3<f32> {
    let far_point = unproject(ndc, 1.0);
    return normalize(far_point - params.camera_position);
}

// Entry and exit distance of a ray through an axis-aligned box.
fn intersect_box(origin: vec3<f32>, dir: vec3<f32>, box_min: vec3<f32>, box_max: vec3<f32>) -> vec2<f32> {
    let inv_dir = 1.0 / dir;
    let t0 = (box_min - origin) * inv_dir;
    let t1 = (box_max - origin) * inv_dir;
    let t_min = min(t0, t1);
    let t_max = max(t0, t1);
    let t_near = max(max(t_min.x, t_min.y), t_min.z);
    let t_far = min(min(t_max.x, t_max.y), t_max.z);
    return vec2<f32>(t_near, t_far);
}

fn density_at(p: vec3<f32>) -> f32 {
    let half_extent = params.volume_dimension * 0.5;
    let voxel = vec3<i32>(floor(p + half_extent));
    let upper = vec3<i32>(params.volume_dimension) - vec3<i32>(1);
    let clamped = clamp(voxel, vec3<i32>(0), max(upper, vec3<i32>(0)));
    return textureLoad(volume, clamped, 0).r;
}

@fragment
fn fs_ColorFromScreenSpacePosition(in: VertexOutput) -> @location(0) vec4<f32> {
    return vec4<f32>(in.ndc * 0.5 + 0.5, 0.0, 1.0);
}

@fragment
fn fs_ColorFromCameraRayDirection(in: VertexOutput) -> @location(0) vec4<f32> {
    let dir = ray_direction(in.ndc);
    return vec4<f32>(abs(dir), 1.0);
}

@fragment
fn fs_FullVolumeRaycasting(in: VertexOutput) -> @location(0) vec4<f32> {
    let origin = params.camera_position;
    let dir = ray_direction(in.ndc);
    let half_extent = params.volume_dimension * 0.5;
    let hit = intersect_box(origin, dir, -half_extent, half_extent);
    let background = vec4<f32>(0.05, 0.05, 0.08, 1.0);

    if (hit.x > hit.y || hit.y < 0.0) {
        return background;
    }

    var t = max(hit.x, 0.0);
    for (var i: i32 = 0; i < MAX_STEPS; i = i + 1) {
        if (t > hit.y) {
            break;
        }
        let p = origin + dir * t;
        if (density_at(p) > SOLID_THRESHOLD) {
            // Shade by depth into the volume and height.
            let depth = 1.0 - clamp((t - hit.x) / max(length(params.volume_dimension), 1.0), 0.0, 1.0);
            let height = clamp((p.y + half_extent.y) / max(params.volume_dimension.y, 1.0), 0.0, 1.0);
            return vec4<f32>(vec3<f32>(0.35, 0.55, 0.25) * depth + vec3<f32>(0.3, 0.2, 0.1) * height, 1.0);
        }
        t = t + 1.0;
    }
    return background;
}

@fragment
fn fs_VertexColor(in: VertexOutput) -> @location(0) vec4<f32> {
    return in.color;
}
"#;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::effect::{EffectMode, PARAMETER_NAMES};
    use crate::shader::ProgramEntryPoints;

    fn parse_and_validate() -> naga::Module {
        let module = naga::front::wgsl::parse_str(VOLUME_RAYCASTING_WGSL)
            .unwrap_or_else(|e| panic!("wgsl parse: {}", e.emit_to_string(VOLUME_RAYCASTING_WGSL)));
        let mut validator = naga::valid::Validator::new(
            naga::valid::ValidationFlags::all(),
            naga::valid::Capabilities::all(),
        );
        validator
            .validate(&module)
            .unwrap_or_else(|e| panic!("wgsl validation: {e:?}"));
        module
    }

    #[test]
    fn program_validates() {
        parse_and_validate();
    }

    #[test]
    fn every_mode_has_a_fragment_entry_point() {
        let module = parse_and_validate();
        for mode in EffectMode::ALL {
            let entry = format!("fs_{}", mode.technique_name());
            assert!(
                module
                    .entry_points
                    .iter()
                    .any(|ep| ep.name == entry && ep.stage == naga::ShaderStage::Fragment),
                "missing {entry}"
            );
        }
    }

    #[test]
    fn technique_scan_matches_modes() {
        let entry_points = ProgramEntryPoints::parse_wgsl(VOLUME_RAYCASTING_WGSL).unwrap();
        let modes: Vec<&str> = EffectMode::ALL.iter().map(|m| m.technique_name()).collect();
        assert_eq!(entry_points.techniques(), modes);
        assert!(entry_points.has_vertex("vs_main"));
        assert!(entry_points.has_vertex("vs_VertexColor"));
    }

    #[test]
    fn parameter_offsets_cover_every_parameter() {
        for name in PARAMETER_NAMES {
            assert!(PARAM_OFFSETS.iter().any(|(n, _)| *n == name), "{name}");
        }
        // 16-byte aligned and inside the block.
        for (_, offset) in PARAM_OFFSETS {
            assert_eq!(offset % 16, 0);
            assert!(offset < PARAMS_SIZE);
        }
    }
}

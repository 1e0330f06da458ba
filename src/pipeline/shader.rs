//! Shader front end.
//!
//! All backends share one front end: WGSL is parsed and validated by naga into
//! a [`ShaderModule`], which each backend then lowers to its own language
//! (SPIR-V for Vulkan, GLSL 4.30 for OpenGL).

use std::fmt;

use crate::error::{GraphicsError, GraphicsResult};

/// A parsed and validated shader module.
pub struct ShaderModule {
    label: String,
    source: String,
    module: naga::Module,
    info: naga::valid::ModuleInfo,
}

/// Front end failure, with diagnostics rendered against the source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShaderError {
    pub message: String,
}

impl fmt::Display for ShaderError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

impl From<ShaderError> for GraphicsError {
    fn from(err: ShaderError) -> Self {
        GraphicsError::ShaderCompilationFailed(err.message)
    }
}

impl ShaderModule {
    /// Parse and validate WGSL source.
    pub fn from_wgsl(label: &str, source: &str) -> Result<Self, ShaderError> {
        let module = naga::front::wgsl::parse_str(source).map_err(|e| ShaderError {
            message: e.emit_to_string(source),
        })?;

        let mut validator = naga::valid::Validator::new(
            naga::valid::ValidationFlags::all(),
            naga::valid::Capabilities::all(),
        );
        let info = validator.validate(&module).map_err(|e| ShaderError {
            message: e.emit_to_string(source),
        })?;

        log::trace!(
            "Parsed shader '{}' ({} entry points)",
            label,
            module.entry_points.len()
        );

        Ok(Self {
            label: label.to_string(),
            source: source.to_string(),
            module,
            info,
        })
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    /// True if the module has an entry point `name` for `stage`.
    pub fn has_entry_point(&self, stage: naga::ShaderStage, name: &str) -> bool {
        self.module
            .entry_points
            .iter()
            .any(|ep| ep.stage == stage && ep.name == name)
    }

    fn check_entry_point(&self, stage: naga::ShaderStage, entry_point: &str) -> GraphicsResult<()> {
        if self.has_entry_point(stage, entry_point) {
            Ok(())
        } else {
            Err(GraphicsError::ShaderCompilationFailed(format!(
                "Entry point '{entry_point}' not found for stage {stage:?} in '{}'",
                self.label
            )))
        }
    }

    /// Lower one entry point to SPIR-V 1.3 words.
    pub fn to_spirv(&self, stage: naga::ShaderStage, entry_point: &str) -> GraphicsResult<Vec<u32>> {
        self.check_entry_point(stage, entry_point)?;

        let options = naga::back::spv::Options {
            lang_version: (1, 3),
            flags: naga::back::spv::WriterFlags::empty(),
            capabilities: None,
            bounds_check_policies: naga::proc::BoundsCheckPolicies::default(),
            binding_map: Default::default(),
            debug_info: None,
            zero_initialize_workgroup_memory:
                naga::back::spv::ZeroInitializeWorkgroupMemoryMode::None,
        };
        let pipeline_options = naga::back::spv::PipelineOptions {
            shader_stage: stage,
            entry_point: entry_point.to_string(),
        };

        naga::back::spv::write_vec(&self.module, &self.info, &options, Some(&pipeline_options))
            .map_err(|e| {
                GraphicsError::ShaderCompilationFailed(format!("SPIR-V generation error: {e}"))
            })
    }

    /// Lower one entry point to desktop GLSL 4.30.
    ///
    /// The uniform block at group 0, binding 0 is mapped to GL uniform buffer
    /// binding 0.
    pub fn to_glsl(&self, stage: naga::ShaderStage, entry_point: &str) -> GraphicsResult<String> {
        self.check_entry_point(stage, entry_point)?;

        let mut binding_map = naga::back::glsl::BindingMap::default();
        binding_map.insert(
            naga::ResourceBinding {
                group: 0,
                binding: 0,
            },
            0,
        );
        let options = naga::back::glsl::Options {
            version: naga::back::glsl::Version::Desktop(430),
            writer_flags: naga::back::glsl::WriterFlags::empty(),
            binding_map,
            ..Default::default()
        };
        let pipeline_options = naga::back::glsl::PipelineOptions {
            shader_stage: stage,
            entry_point: entry_point.to_string(),
            multiview: None,
        };

        let mut output = String::new();
        let mut writer = naga::back::glsl::Writer::new(
            &mut output,
            &self.module,
            &self.info,
            &options,
            &pipeline_options,
            naga::proc::BoundsCheckPolicies::default(),
        )
        .map_err(|e| GraphicsError::ShaderCompilationFailed(format!("GLSL generation error: {e}")))?;
        writer
            .write()
            .map_err(|e| GraphicsError::ShaderCompilationFailed(format!("GLSL generation error: {e}")))?;
        drop(writer);

        Ok(output)
    }
}

impl fmt::Debug for ShaderModule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ShaderModule")
            .field("label", &self.label)
            .field("entry_points", &self.module.entry_points.len())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TRIANGLE: &str = r#"
struct Uniforms {
    projection: vec4<f32>,
}
@group(0) @binding(0) var<uniform> u: Uniforms;

@vertex
fn vs_main(@location(0) position: vec2<f32>) -> @builtin(position) vec4<f32> {
    return vec4<f32>(position * u.projection.xz + u.projection.yw, 0.0, 1.0);
}

@fragment
fn fs_main() -> @location(0) vec4<f32> {
    return vec4<f32>(1.0, 0.0, 0.0, 1.0);
}
"#;

    #[test]
    fn test_parse_and_entry_points() {
        let module = ShaderModule::from_wgsl("triangle", TRIANGLE).unwrap();
        assert!(module.has_entry_point(naga::ShaderStage::Vertex, "vs_main"));
        assert!(module.has_entry_point(naga::ShaderStage::Fragment, "fs_main"));
        assert!(!module.has_entry_point(naga::ShaderStage::Fragment, "vs_main"));
    }

    #[test]
    fn test_parse_error_is_reported() {
        let err = ShaderModule::from_wgsl("broken", "fn vs_main( {").unwrap_err();
        assert!(!err.message.is_empty());
    }

    #[test]
    fn test_validation_error_is_reported() {
        let source = "@fragment fn fs_main() -> @location(0) vec4<f32> { return 1.0; }";
        assert!(ShaderModule::from_wgsl("mismatch", source).is_err());
    }

    #[test]
    fn test_spirv_output() {
        let module = ShaderModule::from_wgsl("triangle", TRIANGLE).unwrap();
        let words = module.to_spirv(naga::ShaderStage::Vertex, "vs_main").unwrap();
        assert_eq!(words[0], 0x0723_0203);
        assert!(module.to_spirv(naga::ShaderStage::Vertex, "missing").is_err());
    }

    #[test]
    fn test_glsl_output() {
        let module = ShaderModule::from_wgsl("triangle", TRIANGLE).unwrap();
        let glsl = module.to_glsl(naga::ShaderStage::Fragment, "fs_main").unwrap();
        assert!(glsl.starts_with("#version 430"));
    }
}

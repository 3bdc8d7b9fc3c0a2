//! Shader resources and shader-language detection.
//!
//! Effect programs are looked up in a [`ShaderCatalog`] by a resource name
//! derived from the effect name and the shader language. The language the
//! backend accepts is detected once by the owner of the graphics context
//! ([`ShaderContext::detect`]) and passed to every effect created afterwards.

use std::collections::BTreeMap;

use crate::backend::GraphicsBackend;
use crate::shaders;

/// Shader languages an effect program can be stored in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ShaderLanguage {
    Wgsl,
    Glsl,
}

impl ShaderLanguage {
    /// Detection order.
    pub const ALL: [ShaderLanguage; 2] = [ShaderLanguage::Wgsl, ShaderLanguage::Glsl];

    /// Resource name extension for programs in this language.
    pub fn extension(&self) -> &'static str {
        match self {
            Self::Wgsl => ".wgsl",
            Self::Glsl => ".glsl",
        }
    }
}

impl std::fmt::Display for ShaderLanguage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Wgsl => write!(f, "WGSL"),
            Self::Glsl => write!(f, "GLSL"),
        }
    }
}

/// Errors from shader resource lookup and language detection.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ShaderError {
    #[error("could not find shader resource \"{name}\"; existing resources are: {}", .available.join(", "))]
    ResourceNotFound {
        name: String,
        available: Vec<String>,
    },
    #[error("could not find a program in a supported shader language for effect \"{effect}\" (tried: {tried})")]
    NoCompatibleLanguage { effect: String, tried: String },
    #[error("could not parse shader program: {message}")]
    Parse { message: String },
}

/// Embedded shader programs, addressed by resource name.
#[derive(Debug, Clone, Default)]
pub struct ShaderCatalog {
    namespace: String,
    resources: BTreeMap<String, Vec<u8>>,
}

impl ShaderCatalog {
    /// An empty catalog whose resource names start with `namespace`.
    pub fn new(namespace: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            resources: BTreeMap::new(),
        }
    }

    /// The catalog of programs shipped with this crate.
    pub fn builtin() -> Self {
        let mut catalog = Self::new("volterra");
        catalog.insert(
            shaders::VOLUME_RAYCASTING_EFFECT,
            ShaderLanguage::Wgsl,
            shaders::VOLUME_RAYCASTING_WGSL.as_bytes().to_vec(),
        );
        catalog
    }

    /// `{namespace}.effects.bytecode.{effect}{extension}`
    pub fn resource_name(&self, effect: &str, language: ShaderLanguage) -> String {
        format!(
            "{}.effects.bytecode.{}{}",
            self.namespace,
            effect,
            language.extension()
        )
    }

    /// Register (or replace) the program of `effect` in `language`.
    pub fn insert(&mut self, effect: &str, language: ShaderLanguage, source: Vec<u8>) {
        let name = self.resource_name(effect, language);
        self.resources.insert(name, source);
    }

    /// Program source of `effect` in `language`.
    pub fn source(&self, effect: &str, language: ShaderLanguage) -> Result<&[u8], ShaderError> {
        let name = self.resource_name(effect, language);
        match self.resources.get(&name) {
            Some(source) => Ok(source),
            None => Err(ShaderError::ResourceNotFound {
                name,
                available: self.names(),
            }),
        }
    }

    /// All resource names, sorted.
    pub fn names(&self) -> Vec<String> {
        self.resources.keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.resources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.resources.is_empty()
    }
}

/// The shader language accepted by one graphics context.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ShaderContext {
    language: ShaderLanguage,
}

impl ShaderContext {
    /// Use a known language without probing the backend.
    pub fn with_language(language: ShaderLanguage) -> Self {
        Self { language }
    }

    /// Probe the backend with `effect` in every known language. The first
    /// program that compiles decides the language; the probe program is
    /// released again.
    pub fn detect<B: GraphicsBackend + ?Sized>(
        backend: &mut B,
        catalog: &ShaderCatalog,
        effect: &str,
    ) -> Result<Self, ShaderError> {
        let _span = tracing::info_span!("detect_shader_language", effect).entered();

        for language in ShaderLanguage::ALL {
            let Ok(source) = catalog.source(effect, language) else {
                tracing::debug!(%language, "no program in catalog");
                continue;
            };
            match backend.compile_effect(language, effect, source) {
                Ok(probe) => {
                    backend.release_effect(probe);
                    tracing::info!(%language, "shader language detected");
                    return Ok(Self { language });
                }
                Err(e) => {
                    tracing::debug!(%language, error = %e, "probe compile failed");
                }
            }
        }

        let tried = ShaderLanguage::ALL
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join(", ");
        Err(ShaderError::NoCompatibleLanguage {
            effect: effect.to_string(),
            tried,
        })
    }

    pub fn language(&self) -> ShaderLanguage {
        self.language
    }
}

/// Entry points of a parsed WGSL program.
///
/// Techniques are the `@fragment` entry points named `fs_<Technique>`, in
/// declaration order. Helpers that merely share the prefix are not entry
/// points and are ignored.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProgramEntryPoints {
    fragment: Vec<String>,
    vertex: Vec<String>,
}

impl ProgramEntryPoints {
    pub fn parse_wgsl(source: &str) -> Result<Self, ShaderError> {
        let module = naga::front::wgsl::parse_str(source).map_err(|e| ShaderError::Parse {
            message: e.emit_to_string(source),
        })?;
        let mut entry_points = Self::default();
        for entry in &module.entry_points {
            match entry.stage {
                naga::ShaderStage::Fragment => entry_points.fragment.push(entry.name.clone()),
                naga::ShaderStage::Vertex => entry_points.vertex.push(entry.name.clone()),
                _ => {}
            }
        }
        Ok(entry_points)
    }

    pub fn techniques(&self) -> Vec<String> {
        self.fragment
            .iter()
            .filter_map(|name| name.strip_prefix("fs_"))
            .filter(|technique| !technique.is_empty())
            .map(str::to_string)
            .collect()
    }

    pub fn has_vertex(&self, name: &str) -> bool {
        self.vertex.iter().any(|v| v == name)
    }

    /// Vertex entry point used by `technique`: `vs_<Technique>` when the
    /// program has one, `vs_main` otherwise.
    pub fn vertex_entry_point(&self, technique: &str) -> String {
        let specific = format!("vs_{technique}");
        if self.has_vertex(&specific) {
            specific
        } else {
            "vs_main".to_string()
        }
    }
}

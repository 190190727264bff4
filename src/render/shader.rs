//! Shader templates, preprocessor defines, and composition.
//!
//! WGSL has no preprocessor, so conditional compilation is resolved here
//! before the source ever reaches naga: `#include "name"` pulls registered
//! library snippets, `#ifdef`/`#ifndef`/`#else`/`#endif` select variant
//! blocks, and integer defines substitute for whole tokens. Any define that
//! a template tests but the program never sets resolves to "not defined",
//! so every gated path defaults to off.

use std::collections::{BTreeMap, HashMap, HashSet};

use super::error::RenderError;
use super::uniforms::UniformLayout;

/// Value of a preprocessor define.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShaderDefine {
    /// Present/absent switch for `#ifdef` blocks. `Flag(false)` is the same
    /// as leaving the define unset.
    Flag(bool),
    /// Integer substituted wherever the define name appears as a token.
    UInt(u32),
}

impl From<bool> for ShaderDefine {
    fn from(v: bool) -> Self {
        ShaderDefine::Flag(v)
    }
}

impl From<u32> for ShaderDefine {
    fn from(v: u32) -> Self {
        ShaderDefine::UInt(v)
    }
}

/// A vertex/fragment template pair plus the defines and uniform layout that
/// specialize it into a compiled variant.
#[derive(Debug, Clone)]
pub struct ShaderProgram {
    label: String,
    vertex_source: String,
    fragment_source: String,
    defines: BTreeMap<String, ShaderDefine>,
    layout: UniformLayout,
}

impl ShaderProgram {
    pub fn new(
        label: impl Into<String>,
        vertex_source: impl Into<String>,
        fragment_source: impl Into<String>,
        layout: UniformLayout,
    ) -> Self {
        Self {
            label: label.into(),
            vertex_source: vertex_source.into(),
            fragment_source: fragment_source.into(),
            defines: BTreeMap::new(),
            layout,
        }
    }

    pub fn set_define(&mut self, name: impl Into<String>, value: impl Into<ShaderDefine>) {
        self.defines.insert(name.into(), value.into());
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn vertex_source(&self) -> &str {
        &self.vertex_source
    }

    pub fn fragment_source(&self) -> &str {
        &self.fragment_source
    }

    pub fn defines(&self) -> &BTreeMap<String, ShaderDefine> {
        &self.defines
    }

    pub fn layout(&self) -> &UniformLayout {
        &self.layout
    }
}

/// Composes final WGSL from templates, resolving includes and defines.
pub struct ShaderComposer {
    includes: HashMap<String, String>,
}

impl ShaderComposer {
    pub fn new() -> Self {
        Self {
            includes: HashMap::new(),
        }
    }

    /// Registers a snippet for `#include "path"` directives.
    pub fn register_include(&mut self, path: &str, source: &str) {
        self.includes.insert(path.to_string(), source.to_string());
    }

    pub fn compose(
        &self,
        label: &str,
        source: &str,
        defines: &BTreeMap<String, ShaderDefine>,
    ) -> Result<String, RenderError> {
        let mut included = HashSet::new();
        let resolved = self.resolve_includes(label, source, &mut included)?;
        preprocess(label, &resolved, defines)
    }

    fn resolve_includes(
        &self,
        label: &str,
        source: &str,
        included: &mut HashSet<String>,
    ) -> Result<String, RenderError> {
        let mut result = String::with_capacity(source.len());
        for line in source.lines() {
            if let Some(path) = parse_include_directive(line.trim()) {
                if included.contains(path) {
                    continue;
                }
                included.insert(path.to_string());
                let snippet = self.includes.get(path).ok_or_else(|| {
                    RenderError::ShaderCompile {
                        label: label.to_string(),
                        message: format!("include not found: \"{path}\""),
                    }
                })?;
                let resolved = self.resolve_includes(label, snippet, included)?;
                result.push_str(&resolved);
                result.push('\n');
            } else {
                result.push_str(line);
                result.push('\n');
            }
        }
        Ok(result)
    }
}

impl Default for ShaderComposer {
    fn default() -> Self {
        Self::new()
    }
}

fn parse_include_directive(line: &str) -> Option<&str> {
    let rest = line.strip_prefix("#include")?.trim();
    rest.strip_prefix('"').and_then(|r| r.strip_suffix('"'))
}

fn is_defined(defines: &BTreeMap<String, ShaderDefine>, name: &str) -> bool {
    match defines.get(name) {
        Some(ShaderDefine::Flag(enabled)) => *enabled,
        Some(ShaderDefine::UInt(_)) => true,
        None => false,
    }
}

/// Applies `#ifdef` conditionals and integer-define substitution.
fn preprocess(
    label: &str,
    source: &str,
    defines: &BTreeMap<String, ShaderDefine>,
) -> Result<String, RenderError> {
    let error = |message: String| RenderError::ShaderCompile {
        label: label.to_string(),
        message,
    };

    // (branch may emit, some branch of this level already emitted)
    let mut stack: Vec<(bool, bool)> = Vec::new();
    let mut out = String::with_capacity(source.len());

    for (line_no, line) in source.lines().enumerate() {
        let trimmed = line.trim();
        if let Some(name) = trimmed.strip_prefix("#ifdef ") {
            let taken = is_defined(defines, name.trim());
            stack.push((taken, taken));
        } else if let Some(name) = trimmed.strip_prefix("#ifndef ") {
            let taken = !is_defined(defines, name.trim());
            stack.push((taken, taken));
        } else if trimmed == "#else" {
            let (_, taken) = stack
                .pop()
                .ok_or_else(|| error(format!("#else without #ifdef on line {}", line_no + 1)))?;
            stack.push((!taken, true));
        } else if trimmed == "#endif" {
            stack
                .pop()
                .ok_or_else(|| error(format!("#endif without #ifdef on line {}", line_no + 1)))?;
        } else if stack.iter().all(|(active, _)| *active) {
            out.push_str(&substitute_defines(line, defines));
            out.push('\n');
        }
    }

    if !stack.is_empty() {
        return Err(error("unterminated #ifdef block".to_string()));
    }
    Ok(out)
}

/// Replaces whole-token occurrences of integer defines with their values.
fn substitute_defines(line: &str, defines: &BTreeMap<String, ShaderDefine>) -> String {
    let mut result = line.to_string();
    for (name, define) in defines {
        let ShaderDefine::UInt(value) = define else {
            continue;
        };
        result = replace_token(&result, name, &value.to_string());
    }
    result
}

fn replace_token(text: &str, token: &str, replacement: &str) -> String {
    let is_word = |c: char| c.is_ascii_alphanumeric() || c == '_';
    let mut result = String::with_capacity(text.len());
    let mut search_start = 0;
    while let Some(found) = text[search_start..].find(token) {
        let start = search_start + found;
        let end = start + token.len();
        let before_ok = !text[..start].chars().next_back().map_or(false, is_word);
        let after_ok = !text[end..].chars().next().map_or(false, is_word);
        result.push_str(&text[search_start..start]);
        result.push_str(if before_ok && after_ok { replacement } else { token });
        search_start = end;
    }
    result.push_str(&text[search_start..]);
    result
}

/// Parses and validates composed WGSL, preserving the compiler diagnostic.
pub fn validate_wgsl(label: &str, source: &str) -> Result<(), RenderError> {
    let module =
        naga::front::wgsl::parse_str(source).map_err(|err| RenderError::ShaderCompile {
            label: label.to_string(),
            message: err.emit_to_string(source),
        })?;
    let mut validator = naga::valid::Validator::new(
        naga::valid::ValidationFlags::all(),
        naga::valid::Capabilities::all(),
    );
    validator
        .validate(&module)
        .map_err(|err| RenderError::ShaderCompile {
            label: label.to_string(),
            message: format!("validation error: {err}"),
        })?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn compose(source: &str, defines: &[(&str, ShaderDefine)]) -> String {
        let composer = ShaderComposer::new();
        let defines = defines
            .iter()
            .map(|(k, v)| (k.to_string(), *v))
            .collect::<BTreeMap<_, _>>();
        composer.compose("test", source, &defines).unwrap()
    }

    #[test]
    fn ifdef_blocks_follow_defines() {
        let source = "#ifdef USE_UV\nuv line\n#else\nplain line\n#endif\n";
        assert_eq!(
            compose(source, &[("USE_UV", ShaderDefine::Flag(true))]),
            "uv line\n"
        );
        assert_eq!(compose(source, &[]), "plain line\n");
        assert_eq!(
            compose(source, &[("USE_UV", ShaderDefine::Flag(false))]),
            "plain line\n"
        );
    }

    #[test]
    fn unknown_defines_default_to_off() {
        let source = "#ifdef NEVER_SET\ngated\n#endif\nalways\n";
        assert_eq!(compose(source, &[]), "always\n");
    }

    #[test]
    fn ifndef_inverts_the_test() {
        let source = "#ifndef USE_UV\nfallback\n#endif\n";
        assert_eq!(compose(source, &[]), "fallback\n");
        assert_eq!(compose(source, &[("USE_UV", ShaderDefine::Flag(true))]), "");
    }

    #[test]
    fn nested_conditionals_compose() {
        let source = "#ifdef A\n#ifdef B\nboth\n#endif\nonly a\n#endif\n";
        assert_eq!(
            compose(
                source,
                &[("A", ShaderDefine::Flag(true)), ("B", ShaderDefine::Flag(true))]
            ),
            "both\nonly a\n"
        );
        assert_eq!(
            compose(source, &[("A", ShaderDefine::Flag(true))]),
            "only a\n"
        );
        assert_eq!(compose(source, &[("B", ShaderDefine::Flag(true))]), "");
    }

    #[test]
    fn unterminated_block_is_an_error() {
        let composer = ShaderComposer::new();
        let result = composer.compose("test", "#ifdef A\nbody\n", &BTreeMap::new());
        assert!(result.is_err());
    }

    #[test]
    fn integer_defines_substitute_whole_tokens_only() {
        let source = "array<PointLight, LIGHT_COUNT>\nlet x = u32(LIGHT_COUNT);\nLIGHT_COUNT_MAX\n";
        let composed = compose(source, &[("LIGHT_COUNT", ShaderDefine::UInt(4))]);
        assert_eq!(
            composed,
            "array<PointLight, 4>\nlet x = u32(4);\nLIGHT_COUNT_MAX\n"
        );
    }

    #[test]
    fn includes_resolve_once() {
        let mut composer = ShaderComposer::new();
        composer.register_include("lib/util", "fn shared() {}\n");
        let source = "#include \"lib/util\"\n#include \"lib/util\"\nfn main_body() {}\n";
        let composed = composer
            .compose("test", source, &BTreeMap::new())
            .unwrap();
        assert_eq!(composed.matches("fn shared").count(), 1);
        assert!(composed.contains("fn main_body"));
    }

    #[test]
    fn missing_include_reports_path() {
        let composer = ShaderComposer::new();
        let err = composer
            .compose("test", "#include \"nope\"\n", &BTreeMap::new())
            .unwrap_err();
        assert!(err.to_string().contains("nope"));
    }

    #[test]
    fn validate_accepts_wellformed_wgsl() {
        let source = "@fragment fn fs_main() -> @location(0) vec4<f32> {\n    return vec4<f32>(1.0);\n}\n";
        assert!(validate_wgsl("ok", source).is_ok());
    }

    #[test]
    fn validate_preserves_the_diagnostic() {
        let err = validate_wgsl("bad", "fn broken( -> {}").unwrap_err();
        let message = err.to_string();
        assert!(message.contains("bad"));
        assert!(message.len() > 20, "diagnostic should carry detail");
    }
}

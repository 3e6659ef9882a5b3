//! Single-file component compilation.
//!
//! `compile_sfc` never fails: any extraction or analysis error produces a
//! fallback module whose template renders the error inline.

#[cfg(feature = "napi")]
use napi_derive::napi;
use serde::{Deserialize, Serialize};
use tracing::{debug, error};

use crate::codegen::generate_module;
use crate::ir::{
    CompilerError, ComponentModule, ComponentRef, StyleIR, ERR_STYLE_SYNTAX,
};
use crate::parse::{
    extract_blocks, kebab_case, normalize_bind_shorthand, rename_component_tags,
    trim_interpolations,
};
use crate::script::{analyze_script, ScriptAnalysis};
use crate::style::{scope_attribute, scope_css, scope_template};

pub const ERROR_BANNER_STYLE: &str = "color: red; border: 1px solid red; padding: 10px;";

// ═══════════════════════════════════════════════════════════════════════════════
// OPTIONS
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CompileOptions {
    /// File extension identifying component sources.
    pub extension: String,
    /// Prefix of the scope attribute, followed by the path digest.
    pub scope_prefix: String,
    /// Module specifier the generated code imports `injectStyle` from.
    pub runtime_module: String,
    pub trim_interpolations: bool,
}

impl Default for CompileOptions {
    fn default() -> Self {
        CompileOptions {
            extension: ".olova".to_string(),
            scope_prefix: "data-v-".to_string(),
            runtime_module: "./olova.js".to_string(),
            trim_interpolations: true,
        }
    }
}

impl CompileOptions {
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompileResult {
    pub module: ComponentModule,
    pub code: String,
    pub errors: Vec<CompilerError>,
}

impl CompileResult {
    pub fn is_ok(&self) -> bool {
        self.errors.is_empty()
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// ENTRY POINTS
// ═══════════════════════════════════════════════════════════════════════════════

/// Compiles one component source.
pub fn compile_sfc(source: &str, file_path: &str, options: &CompileOptions) -> CompileResult {
    let (module, errors) = match compile_module(source, file_path, options) {
        Ok(module) => {
            debug!(
                file = %file_path,
                props = module.props.len(),
                data = module.data.len(),
                methods = module.methods.len(),
                components = module.components.len(),
                "compiled component"
            );
            (module, Vec::new())
        }
        Err(err) => {
            error!(file = %file_path, error = %err, "failed to compile component");
            (fallback_module(file_path, &err.message), vec![err])
        }
    };
    let code = generate_module(&module, options);
    CompileResult {
        module,
        code,
        errors,
    }
}

/// Build-plugin entry point: only sources with the configured extension are
/// handled.
pub fn transform(code: &str, id: &str, options: &CompileOptions) -> Option<CompileResult> {
    if !id.ends_with(&options.extension) {
        return None;
    }
    Some(compile_sfc(code, id, options))
}

fn compile_module(
    source: &str,
    file_path: &str,
    options: &CompileOptions,
) -> Result<ComponentModule, CompilerError> {
    let blocks = extract_blocks(source, file_path)?;

    let analysis = match &blocks.script {
        Some(script) => analyze_script(
            &script.content,
            file_path,
            &options.extension,
            source,
            script.offset,
        )?,
        None => ScriptAnalysis::default(),
    };

    let component_names = analysis.component_names();
    let components: Vec<ComponentRef> = analysis
        .imports
        .iter()
        .filter(|import| import.is_component)
        .flat_map(|import| {
            import.specifiers.iter().map(|name| ComponentRef {
                tag: kebab_case(name),
                name: name.clone(),
                source: import.source.clone(),
            })
        })
        .collect();

    let mut template = rename_component_tags(&blocks.template, &component_names);
    template = normalize_bind_shorthand(&template);
    if options.trim_interpolations {
        template = trim_interpolations(&template);
    }

    let mut style = None;
    if let Some(block) = &blocks.style {
        let attr = scope_attribute(&options.scope_prefix, file_path);
        let raw = block.content.trim().to_string();
        let css = if block.scoped && !raw.is_empty() {
            scope_css(&raw, &attr).map_err(|err| {
                CompilerError::at_offset(
                    ERR_STYLE_SYNTAX,
                    &format!("style parse error: {}", err),
                    file_path,
                    source,
                    block.offset + err.offset(),
                )
            })?
        } else {
            raw.clone()
        };
        if block.scoped {
            template = scope_template(&template, &attr);
        }
        style = Some(StyleIR {
            raw,
            css,
            scoped: block.scoped,
            scope_id: attr,
        });
    }

    Ok(ComponentModule {
        file_path: file_path.to_string(),
        template,
        props: analysis.props,
        data: analysis.data,
        methods: analysis.methods,
        imports: analysis.imports,
        components,
        style,
        error: None,
    })
}

// ═══════════════════════════════════════════════════════════════════════════════
// FALLBACK
// ═══════════════════════════════════════════════════════════════════════════════

/// Makes `message` safe to embed in a template: markup is escaped and braces
/// are replaced so the renderer does not treat them as interpolations.
fn sanitize_message(message: &str) -> String {
    message
        .replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('{', "(")
        .replace('}', ")")
}

pub fn fallback_template(message: &str) -> String {
    format!(
        "<div style=\"{}\">Error processing component: {}</div>",
        ERROR_BANNER_STYLE,
        sanitize_message(message)
    )
}

fn fallback_module(file_path: &str, message: &str) -> ComponentModule {
    ComponentModule {
        file_path: file_path.to_string(),
        template: fallback_template(message),
        error: Some(message.to_string()),
        ..Default::default()
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// NAPI BRIDGE
// ═══════════════════════════════════════════════════════════════════════════════

#[cfg(feature = "napi")]
#[napi]
pub fn transform_native(
    code: String,
    id: String,
    options_json: Option<String>,
) -> napi::Result<Option<serde_json::Value>> {
    let options = match options_json {
        Some(json) => CompileOptions::from_json(&json)
            .map_err(|e| napi::Error::from_reason(e.to_string()))?,
        None => CompileOptions::default(),
    };
    transform(&code, &id, &options)
        .map(|result| serde_json::to_value(result))
        .transpose()
        .map_err(|e| napi::Error::from_reason(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_options_from_json_defaults_missing_fields() {
        let opts = CompileOptions::from_json(r#"{"runtimeModule": "olova"}"#).unwrap();
        assert_eq!(opts.runtime_module, "olova");
        assert_eq!(opts.extension, ".olova");
        assert!(opts.trim_interpolations);
    }

    #[test]
    fn test_transform_ignores_other_files() {
        assert!(transform("<div></div>", "main.js", &CompileOptions::default()).is_none());
        assert!(transform("<div></div>", "App.olova", &CompileOptions::default()).is_some());
    }

    #[test]
    fn test_fallback_template_escapes_braces_and_markup() {
        let t = fallback_template("unexpected `{` in <script>");
        assert_eq!(
            t,
            "<div style=\"color: red; border: 1px solid red; padding: 10px;\">Error processing component: unexpected `(` in &lt;script&gt;</div>"
        );
    }
}

//! JavaScript module emission.
//!
//! Renders a [`ComponentModule`] as the ES module the build plugin serves:
//!
//! ```text
//! <component imports>
//! import { injectStyle } from "./olova.js";
//! const component = { template, props, data, methods, components };
//! injectStyle(`...`);
//! export default component;
//! ```

use crate::compile::CompileOptions;
use crate::ir::ComponentModule;

/// Escapes text for a JS template literal.
pub fn escape_template_literal(text: &str) -> String {
    text.replace('\\', "\\\\")
        .replace('`', "\\`")
        .replace("${", "\\${")
}

fn quote(text: &str) -> String {
    serde_json::to_string(text).unwrap_or_else(|_| format!("\"{}\"", text))
}

pub fn generate_module(module: &ComponentModule, options: &CompileOptions) -> String {
    if module.is_fallback() {
        return generate_fallback(&module.template);
    }

    let mut out = String::new();

    for import in &module.imports {
        out.push_str(import.statement.trim_end());
        if !import.statement.trim_end().ends_with(';') {
            out.push(';');
        }
        out.push('\n');
    }
    out.push_str(&format!(
        "import {{ injectStyle }} from {};\n\n",
        quote(&options.runtime_module)
    ));

    let mut members: Vec<String> = Vec::new();
    members.push(format!(
        "  template: `{}`",
        escape_template_literal(&module.template)
    ));

    if !module.props.is_empty() {
        let props: Vec<String> = module.props.iter().map(|p| quote(p)).collect();
        members.push(format!("  props: [{}]", props.join(", ")));
    }

    if module.data.is_empty() {
        members.push("  data: {}".to_string());
    } else {
        let fields: Vec<String> = module
            .data
            .iter()
            .map(|field| format!("    {}: {}", field.name, field.init))
            .collect();
        members.push(format!("  data: {{\n{}\n  }}", fields.join(",\n")));
    }

    if module.methods.is_empty() {
        members.push("  methods: {}".to_string());
    } else {
        let methods: Vec<String> = module
            .methods
            .iter()
            .map(|m| {
                format!(
                    "    {}: function({}) {{\n      {}\n    }}",
                    m.name, m.params_raw, m.qualified_body
                )
            })
            .collect();
        members.push(format!("  methods: {{\n{}\n  }}", methods.join(",\n")));
    }

    if !module.components.is_empty() {
        let entries: Vec<String> = module
            .components
            .iter()
            .map(|c| format!("    {}: {}", quote(&c.tag), c.name))
            .collect();
        members.push(format!("  components: {{\n{}\n  }}", entries.join(",\n")));
    }

    out.push_str("const component = {\n");
    out.push_str(&members.join(",\n"));
    out.push_str("\n};\n");

    if let Some(style) = &module.style {
        if !style.css.trim().is_empty() {
            out.push_str(&format!(
                "\ninjectStyle(`{}`);\n",
                escape_template_literal(&style.css)
            ));
        }
    }

    out.push_str("\nexport default component;\n");
    out
}

fn generate_fallback(template: &str) -> String {
    format!(
        "export default {{\n  template: `{}`,\n  data: {{}}\n}};\n",
        escape_template_literal(template)
    )
}

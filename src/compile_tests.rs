#[cfg(test)]
mod tests {
    use crate::app::create_app;
    use crate::compile::{compile_sfc, transform, CompileOptions};
    use crate::descriptor::ComponentDescriptor;
    use crate::discovery::{discover_components, LinkError};
    use crate::document::{get_attribute, parent_of, text_content, Document};
    use crate::eval::Value;
    use crate::ir::ERR_BLOCK_REPEATED;
    use crate::style::scope_attribute;
    use std::collections::HashMap;
    use std::fs;
    use std::path::Path;
    use std::rc::Rc;

    const COUNTER: &str = r#"
<script>
import MyWidget from './MyWidget.olova';
props: ["a", "b", "a"];
let count = 0;
function increment() {
  count++;
}
</script>

<div>
  <h1>{ count }</h1>
  <MyWidget :label="count" title="static"/>
  <button onclick="increment()">+</button>
</div>

<style scoped>
h1, .x:hover { color: red; }
</style>
"#;

    const MY_WIDGET: &str = r#"
<script>
props: ["label"];
</script>
<span>{label}</span>
"#;

    fn page() -> Rc<Document> {
        Rc::new(Document::parse(
            "<html><head></head><body><div id=\"app\"></div></body></html>",
        ))
    }

    fn link(source: &str, path: &str, children: &[(&str, Rc<ComponentDescriptor>)]) -> Rc<ComponentDescriptor> {
        let result = compile_sfc(source, path, &CompileOptions::default());
        assert!(result.is_ok(), "{:?}", result.errors);
        let children: HashMap<String, Rc<ComponentDescriptor>> = children
            .iter()
            .map(|(name, d)| (name.to_string(), d.clone()))
            .collect();
        Rc::new(ComponentDescriptor::from_module(&result.module, &children))
    }

    fn write(dir: &Path, name: &str, source: &str) {
        let path = dir.join(name);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        fs::write(path, source).unwrap();
    }

    #[test]
    fn test_compile_component() {
        let result = compile_sfc(COUNTER, "/src/Counter.olova", &CompileOptions::default());
        assert!(result.is_ok(), "{:?}", result.errors);
        let module = &result.module;

        assert_eq!(module.props, vec!["a", "b"]);
        assert_eq!(module.data.len(), 1);
        assert_eq!(module.data[0].name, "count");
        assert_eq!(module.methods[0].qualified_body, "this.count++;");

        assert_eq!(module.components.len(), 1);
        assert_eq!(module.components[0].tag, "my-widget");
        assert_eq!(module.components[0].source, "./MyWidget.olova");

        let attr = scope_attribute("data-v-", "/src/Counter.olova");
        assert!(module.template.contains(&format!("<h1 {}>{{count}}</h1>", attr)));
        assert!(module.template.contains(&format!(
            "<my-widget v-bind:label=\"count\" title=\"static\" {}></my-widget>",
            attr
        )));

        let style = module.style.as_ref().unwrap();
        assert!(style.scoped);
        assert_eq!(
            style.css,
            format!("h1[{a}], .x[{a}]:hover{{ color: red; }}", a = attr)
        );

        assert!(result.code.contains("\"my-widget\": MyWidget"));
        assert!(result.code.contains("injectStyle(`"));
    }

    #[test]
    fn test_unscoped_style_is_left_alone() {
        let source = "<p>{x}</p><style>p { margin: 0 }</style>";
        let module = compile_sfc(source, "Plain.olova", &CompileOptions::default()).module;
        let style = module.style.unwrap();
        assert!(!style.scoped);
        assert_eq!(style.css, "p { margin: 0 }");
        assert_eq!(module.template, "<p>{x}</p>");
    }

    #[test]
    fn test_compile_failure_falls_back() {
        let source = "<script>let a = 1;</script><script>let b = 2;</script><p></p>";
        let result = compile_sfc(source, "Broken.olova", &CompileOptions::default());
        assert_eq!(result.errors.len(), 1);
        assert_eq!(result.errors[0].code, ERR_BLOCK_REPEATED);

        let module = &result.module;
        assert!(module.is_fallback());
        assert!(module
            .template
            .contains("Error processing component: multiple &lt;script&gt; blocks"));
        assert!(result.code.starts_with("export default {"));
    }

    #[test]
    fn test_script_error_message_has_no_interpolation() {
        let source = "<script>let x = {;</script><p></p>";
        let result = compile_sfc(source, "Syntax.olova", &CompileOptions::default());
        assert!(!result.is_ok());
        assert!(!result.module.template.contains('{'));
    }

    #[test]
    fn test_transform_filters_by_extension() {
        let options = CompileOptions::default();
        assert!(transform("export const x = 1;", "/src/main.js", &options).is_none());
        assert!(transform("<p></p>", "/src/App.olova", &options).is_some());

        let custom = CompileOptions::from_json(r#"{"extension": ".ov", "scopePrefix": "s-"}"#).unwrap();
        assert_eq!(custom.runtime_module, "./olova.js");
        let result = transform("<p></p><style scoped>p{}</style>", "A.ov", &custom).unwrap();
        assert!(result.module.style.unwrap().scope_id.starts_with("s-"));
    }

    #[test]
    fn test_discover_and_link() {
        let dir = tempfile::tempdir().unwrap();
        write(
            dir.path(),
            "App.olova",
            "<script>import MyWidget from './widgets/MyWidget.olova';</script><div><MyWidget/></div>",
        );
        write(dir.path(), "widgets/MyWidget.olova", "<span>widget</span>");
        write(dir.path(), "notes.txt", "ignored");

        let library = discover_components(dir.path(), &CompileOptions::default()).unwrap();
        assert_eq!(library.len(), 2);
        assert!(library.failures().is_empty());
        assert!(library.module("widgets/MyWidget.olova").is_some());

        let app = library.descriptor("App.olova").unwrap();
        let widget = app.component("my-widget").unwrap();
        assert_eq!(widget.template, "<span>widget</span>");

        // Linking is memoised.
        let again = library.descriptor(dir.path().join("App.olova")).unwrap();
        assert!(std::rc::Rc::ptr_eq(&app, &again));
    }

    #[test]
    fn test_link_errors() {
        let dir = tempfile::tempdir().unwrap();
        write(
            dir.path(),
            "Lonely.olova",
            "<script>import Nope from './Nope.olova';</script><Nope/>",
        );
        write(
            dir.path(),
            "A.olova",
            "<script>import B from './B.olova';</script><B/>",
        );
        write(
            dir.path(),
            "B.olova",
            "<script>import A from './A.olova';</script><A/>",
        );
        write(dir.path(), "Bad.olova", "<style scoped>p {</style><p></p>");

        let library = discover_components(dir.path(), &CompileOptions::default()).unwrap();
        assert_eq!(library.failures().len(), 1);

        assert!(matches!(
            library.descriptor("Lonely.olova"),
            Err(LinkError::MissingImport { specifier, .. }) if specifier == "./Nope.olova"
        ));
        assert!(matches!(library.descriptor("A.olova"), Err(LinkError::Cycle(_))));
        assert!(matches!(library.descriptor("Ghost.olova"), Err(LinkError::Unknown(_))));
    }

    #[test]
    fn test_compiled_component_runs() {
        let widget = link(MY_WIDGET, "/src/MyWidget.olova", &[]);
        let counter = link(COUNTER, "/src/Counter.olova", &[("MyWidget", widget)]);
        let attr = scope_attribute("data-v-", "/src/Counter.olova");

        let doc = page();
        let app = create_app(counter, &doc);
        app.mount("#app").unwrap();

        let sheet = doc.style_sheet().unwrap();
        assert!(sheet.contains(&format!("h1[{}]", attr)));

        let h1 = doc.query_selector("h1").unwrap().unwrap();
        assert_eq!(text_content(&h1), "0");
        assert_eq!(get_attribute(&h1, &attr).as_deref(), Some(""));
        let span = doc.query_selector("span").unwrap().unwrap();
        assert_eq!(text_content(&span), "0");

        let button = doc.query_selector("button").unwrap().unwrap();
        assert_eq!(app.click(&button).unwrap(), 1);
        assert_eq!(app.data().get("count"), Some(Value::from(1)));

        let h1 = doc.query_selector("h1").unwrap().unwrap();
        assert_eq!(text_content(&h1), "1");
        let span = doc.query_selector("span").unwrap().unwrap();
        assert_eq!(text_content(&span), "1");

        let children = app.root().children();
        assert_eq!(children.len(), 1);
        assert_eq!(children[0].data().get("label"), Some(Value::from(1)));
        assert!(children[0].data().get("title").is_none());
    }

    #[test]
    fn test_compiled_prop_propagation() {
        let child = link(MY_WIDGET, "/src/Child.olova", &[]);
        let parent = link(
            "<script>\nimport Child from './Child.olova';\nlet msg = \"A\";\nlet greeting = \"Hi \" +\n  \"there\";\n</script>\n<div><Child :label=\"msg\"/><p>{ greeting }</p></div>",
            "/src/Parent.olova",
            &[("Child", child)],
        );

        let doc = page();
        let app = create_app(parent, &doc);
        let root = app.mount("#app").unwrap();
        assert_eq!(text_content(&root), "AHi there");

        let child = app.root().children()[0].clone();
        let before = child.root_element().unwrap();

        app.data().set("msg", "B");
        assert_eq!(child.data().get("label"), Some(Value::from("B")));
        assert_eq!(text_content(&root), "BHi there");
        let after = child.root_element().unwrap();
        assert!(!Rc::ptr_eq(&before, &after));
        assert!(parent_of(&before).is_none());
    }
}

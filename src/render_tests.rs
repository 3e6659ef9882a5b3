#[cfg(test)]
mod tests {
    use crate::app::{create_app, MountError};
    use crate::descriptor::ComponentDescriptor;
    use crate::document::{
        children_of, get_attribute, outer_html, parent_of, tag_name, text_content, Document,
    };
    use crate::eval::Value;
    use crate::instance::COMPONENT_ID_ATTR;
    use std::rc::Rc;

    const PAGE: &str = "<html><head></head><body><div id=\"app\"></div></body></html>";

    fn page() -> Rc<Document> {
        Rc::new(Document::parse(PAGE))
    }

    #[test]
    fn test_interpolation_follows_data() {
        let doc = page();
        let app = create_app(
            Rc::new(
                ComponentDescriptor::new("<p>Count: {count}, user {name}</p>")
                    .with_data([("count", Value::from(0)), ("name", Value::from("Ada"))]),
            ),
            &doc,
        );
        let root = app.mount("#app").unwrap();
        assert_eq!(text_content(&root), "Count: 0, user Ada");
        assert_eq!(
            get_attribute(&root, COMPONENT_ID_ATTR).as_deref(),
            Some(app.root().id())
        );

        app.data().set("count", 5);
        assert_eq!(text_content(&root), "Count: 5, user Ada");

        // Keys added after creation are not tracked.
        app.data().set("extra", 1);
        assert_eq!(text_content(&root), "Count: 5, user Ada");
    }

    #[test]
    fn test_unknown_key_renders_empty() {
        let doc = page();
        let app = create_app(Rc::new(ComponentDescriptor::new("<p>[{ghost}]</p>")), &doc);
        let root = app.mount("#app").unwrap();
        assert_eq!(text_content(&root), "[]");
    }

    #[test]
    fn test_attribute_binding() {
        let doc = page();
        let app = create_app(
            Rc::new(
                ComponentDescriptor::new(r#"<a v-bind:href="url" :title="plain">link</a>"#)
                    .with_data([("url", Value::from("/home"))]),
            ),
            &doc,
        );
        let root = app.mount("#app").unwrap();
        assert_eq!(get_attribute(&root, "href").as_deref(), Some("/home"));
        assert_eq!(get_attribute(&root, "title").as_deref(), Some("plain"));
        assert!(get_attribute(&root, "v-bind:href").is_none());
        assert!(get_attribute(&root, ":title").is_none());

        app.data().set("url", "/about");
        assert_eq!(get_attribute(&root, "href").as_deref(), Some("/about"));
    }

    #[test]
    fn test_undefined_key_binds_literal() {
        let doc = page();
        let app = create_app(
            Rc::new(ComponentDescriptor::new(r#"<a :title="hint">x</a>"#).with_props(["hint"])),
            &doc,
        );
        let root = app.mount("#app").unwrap();
        assert_eq!(get_attribute(&root, "title").as_deref(), Some("hint"));

        // No binding was registered for the undefined key.
        app.data().set("hint", "later");
        assert_eq!(get_attribute(&root, "title").as_deref(), Some("hint"));
    }

    #[test]
    fn test_props_flow_to_children() {
        let doc = page();
        let child = Rc::new(
            ComponentDescriptor::new("<span>{label} / {note}</span>").with_props(["label", "note"]),
        );
        let parent = Rc::new(
            ComponentDescriptor::new(
                r#"<div><child-box :label="msg" note="fixed" ignored="x"></child-box></div>"#,
            )
            .with_data([("msg", Value::from("A"))])
            .with_component("child-box", child),
        );
        let app = create_app(parent, &doc);
        let root = app.mount("#app").unwrap();
        assert_eq!(text_content(&root), "A / fixed");

        let children = app.root().children();
        assert_eq!(children.len(), 1);
        let child = &children[0];
        assert!(child.data().get("ignored").is_none());
        let before = child.root_element().unwrap();
        assert_eq!(tag_name(&before).as_deref(), Some("span"));

        app.data().set("msg", "B");
        assert_eq!(text_content(&root), "B / fixed");
        assert_eq!(child.data().get("label"), Some(Value::from("B")));

        let after = child.root_element().unwrap();
        assert!(!Rc::ptr_eq(&before, &after));
        assert!(parent_of(&before).is_none());
        assert!(Rc::ptr_eq(&parent_of(&after).unwrap(), &root));
    }

    #[test]
    fn test_mount_on_missing_selector() {
        let doc = page();
        let before = doc.to_html();
        let app = create_app(Rc::new(ComponentDescriptor::new("<p>x</p>")), &doc);
        let err = app.mount("#missing").unwrap_err();
        assert_eq!(err, MountError::NotFound("#missing".to_string()));
        assert_eq!(err.to_string(), "Element with selector \"#missing\" not found");
        assert_eq!(doc.to_html(), before);
        assert!(matches!(app.mount("div p"), Err(MountError::Selector(_))));
    }

    #[test]
    fn test_mount_replaces_anchor_children() {
        let doc = Rc::new(Document::parse(
            "<html><body><main class=\"root\"><p>loading</p></main></body></html>",
        ));
        let app = create_app(Rc::new(ComponentDescriptor::new("<h1>ready</h1>")), &doc);
        app.mount(".root").unwrap();
        let anchor = doc.query_selector("main").unwrap().unwrap();
        let kids = children_of(&anchor);
        assert_eq!(kids.len(), 1);
        assert_eq!(text_content(&anchor), "ready");
    }

    #[test]
    fn test_click_runs_method_and_rerenders() {
        let doc = page();
        let app = create_app(
            Rc::new(
                ComponentDescriptor::new(
                    r#"<div><p>{count}</p><button onclick="increment()">+</button><i onclick="last = event.type">?</i></div>"#,
                )
                .with_data([("count", Value::from(0)), ("last", Value::from(""))])
                .with_method("increment", Vec::<String>::new(), "this.count++"),
            ),
            &doc,
        );
        app.mount("#app").unwrap();

        let button = doc.query_selector("button").unwrap().unwrap();
        assert_eq!(app.click(&button).unwrap(), 1);
        let p = doc.query_selector("p").unwrap().unwrap();
        assert_eq!(text_content(&p), "1");

        // The old button was replaced by the re-render.
        assert_eq!(app.click(&button).unwrap(), 0);
        let button = doc.query_selector("button").unwrap().unwrap();
        app.click(&button).unwrap();
        let p = doc.query_selector("p").unwrap().unwrap();
        assert_eq!(text_content(&p), "2");

        let italic = doc.query_selector("i").unwrap().unwrap();
        app.click(&italic).unwrap();
        assert_eq!(app.data().get("last"), Some(Value::from("click")));
    }

    #[test]
    fn test_click_bubbles_to_ancestors() {
        let doc = page();
        let app = create_app(
            Rc::new(
                ComponentDescriptor::new(
                    r#"<div onclick="outer++"><span onclick="inner++"><b>hit</b></span></div>"#,
                )
                .with_data([("outer", Value::from(0)), ("inner", Value::from(0))]),
            ),
            &doc,
        );
        app.mount("#app").unwrap();
        let target = doc.query_selector("b").unwrap().unwrap();
        assert_eq!(app.click(&target).unwrap(), 2);
        assert_eq!(app.data().get("outer"), Some(Value::from(1)));
        assert_eq!(app.data().get("inner"), Some(Value::from(1)));
    }

    #[test]
    fn test_failing_click_handler_reports_error() {
        let doc = page();
        let app = create_app(
            Rc::new(ComponentDescriptor::new(r#"<button onclick="missing()">x</button>"#)),
            &doc,
        );
        let root = app.mount("#app").unwrap();
        assert!(app.click(&root).is_err());
    }

    #[test]
    fn test_data_initialization_failure_renders_empty() {
        let doc = page();
        let app = create_app(
            Rc::new(
                ComponentDescriptor::new("<p>value: {x}</p>")
                    .with_initializers([("x", "ghost + 1")]),
            ),
            &doc,
        );
        let root = app.mount("#app").unwrap();
        assert!(app.data().keys().is_empty());
        assert_eq!(text_content(&root), "value: ");
    }

    #[test]
    fn test_nesting_limit() {
        let doc = page();
        let mut descriptor = Rc::new(ComponentDescriptor::new("<div><p>leaf</p></div>"));
        for _ in 0..40 {
            descriptor = Rc::new(
                ComponentDescriptor::new("<div><p>sibling</p><nest></nest></div>")
                    .with_component("nest", descriptor),
            );
        }
        let app = create_app(descriptor, &doc);
        let root = app.mount("#app").unwrap();
        let html = outer_html(&root);

        assert!(html.contains("Error rendering component: component nesting exceeds 32 levels"));
        assert!(!html.contains("leaf"));
        assert_eq!(html.matches("<p>sibling</p>").count(), 33);
    }

    #[test]
    fn test_component_styles_registered_once() {
        let doc = page();
        let css = "span[data-v-1] { color: red; }";
        let item = Rc::new(ComponentDescriptor::new("<span>item</span>").with_style(css));
        let list = Rc::new(
            ComponentDescriptor::new("<ul><item-row></item-row><item-row></item-row></ul>")
                .with_component("item-row", item)
                .with_style("ul { margin: 0; }"),
        );
        let app = create_app(list, &doc);
        app.mount("#app").unwrap();

        assert_eq!(
            doc.style_sheet().as_deref(),
            Some("ul { margin: 0; }\nspan[data-v-1] { color: red; }")
        );
        assert_eq!(doc.to_html().matches("<style>").count(), 1);
        let style = doc.query_selector("style").unwrap().unwrap();
        assert_eq!(tag_name(&parent_of(&style).unwrap()).as_deref(), Some("head"));
    }

    #[test]
    fn test_multiple_roots_are_wrapped() {
        let doc = page();
        let app = create_app(
            Rc::new(ComponentDescriptor::new("<h1>a</h1>\n<p>b</p>")),
            &doc,
        );
        let root = app.mount("#app").unwrap();
        assert_eq!(tag_name(&root).as_deref(), Some("div"));
        assert_eq!(get_attribute(&root, "style").as_deref(), Some("display: contents"));
        assert!(get_attribute(&root, COMPONENT_ID_ATTR).is_some());
        assert_eq!(text_content(&root), "a\nb");
    }

    #[test]
    fn test_dropping_app_releases_instances() {
        let doc = page();
        let child = Rc::new(ComponentDescriptor::new("<em>c</em>"));
        let app = create_app(
            Rc::new(ComponentDescriptor::new("<div><c-x></c-x></div>").with_component("c-x", child)),
            &doc,
        );
        app.mount("#app").unwrap();
        let registry = app.registry().clone();
        assert_eq!(registry.instance_count(), 2);
        drop(app);
        assert_eq!(registry.instance_count(), 0);
        // The rendered markup stays in the document.
        assert!(doc.to_html().contains("<em"));
    }
}

use dotprompt::{
    DataArgument, Dotprompt, DotpromptError, DotpromptOptions, Message, Part, PromptMetadata,
    Role,
};
use serde_json::{Map, Value, json};

fn engine() -> Dotprompt {
    Dotprompt::new(DotpromptOptions::default()).unwrap()
}

fn object(value: Value) -> Map<String, Value> {
    value.as_object().cloned().unwrap()
}

#[tokio::test]
async fn renders_a_single_user_message() {
    let rendered = engine()
        .render(
            "---\nmodel: gemini-pro\n---\nHello {{name}}!",
            &DataArgument::with_input(json!({"name": "World"})),
            None,
        )
        .await
        .unwrap();

    assert_eq!(rendered.metadata.model.as_deref(), Some("gemini-pro"));
    assert_eq!(rendered.messages, vec![Message::text(Role::User, "Hello World!")]);
    assert_eq!(rendered.config()["model"], "gemini-pro");
}

#[tokio::test]
async fn role_blocks_become_separate_messages() {
    let rendered = engine()
        .render(
            r#"{{#role "system"}}You are helpful.{{/role}}{{#role "user"}}Hi{{/role}}"#,
            &DataArgument::default(),
            None,
        )
        .await
        .unwrap();

    assert_eq!(
        rendered.messages,
        vec![
            Message::text(Role::System, "You are helpful."),
            Message::text(Role::User, "Hi"),
        ]
    );
}

#[tokio::test]
async fn media_parts_infer_their_content_type() {
    let rendered = engine()
        .render(
            r#"Describe this: {{media url="https://example.com/img.png"}}"#,
            &DataArgument::default(),
            None,
        )
        .await
        .unwrap();

    assert_eq!(
        rendered.messages[0].content,
        vec![
            Part::text("Describe this: "),
            Part::media("https://example.com/img.png", Some("image/png".to_string())),
        ]
    );
}

#[tokio::test]
async fn history_without_marker_follows_the_system_prompt() {
    let data = DataArgument {
        messages: Some(vec![
            Message::text(Role::User, "What is Rust?"),
            Message::text(Role::Model, "A systems language."),
        ]),
        ..Default::default()
    };
    let rendered = engine()
        .render(
            "{{role \"system\"}}Answer briefly.\n{{role \"user\"}}And Go?",
            &data,
            None,
        )
        .await
        .unwrap();

    let roles: Vec<Role> = rendered.messages.iter().map(|m| m.role).collect();
    assert_eq!(roles, [Role::System, Role::User, Role::Model, Role::User]);
    assert!(rendered.messages[1].is_history());
    assert!(rendered.messages[2].is_history());
    assert!(!rendered.messages[3].is_history());
}

#[tokio::test]
async fn history_marker_places_history_and_continues_as_model() {
    let data = DataArgument {
        messages: Some(vec![Message::text(Role::User, "earlier")]),
        ..Default::default()
    };
    let rendered = engine()
        .render(
            "{{role \"system\"}}Sys{{history}}Continuing",
            &data,
            None,
        )
        .await
        .unwrap();

    assert_eq!(rendered.messages.len(), 3);
    assert_eq!(rendered.messages[0], Message::text(Role::System, "Sys"));
    assert!(rendered.messages[1].is_history());
    assert_eq!(rendered.messages[2], Message::text(Role::Model, "Continuing"));
}

#[tokio::test]
async fn sections_leave_pending_placeholders() {
    let rendered = engine()
        .render(
            "Intro\n{{section \"examples\"}}\nOutro",
            &DataArgument::default(),
            None,
        )
        .await
        .unwrap();

    assert_eq!(
        rendered.messages[0].content,
        vec![
            Part::text("Intro\n"),
            Part::pending_section("examples"),
            Part::text("\nOutro"),
        ]
    );
}

#[tokio::test]
async fn overrides_layer_over_frontmatter() {
    let overrides = PromptMetadata {
        model: Some("override-model".into()),
        config: Some(object(json!({"temperature": 1.0}))),
        ..Default::default()
    };
    let rendered = engine()
        .render(
            "---\nmodel: base\nconfig:\n  temperature: 0.2\n  maxOutputTokens: 64\n---\n{{@metadata.prompt.model}}",
            &DataArgument::default(),
            Some(&overrides),
        )
        .await
        .unwrap();

    assert_eq!(rendered.metadata.model.as_deref(), Some("override-model"));
    assert_eq!(
        Value::Object(rendered.metadata.config.clone().unwrap()),
        json!({"temperature": 1.0, "maxOutputTokens": 64})
    );
    assert_eq!(rendered.messages[0].content, vec![Part::text("override-model")]);
}

#[tokio::test]
async fn extension_fields_and_raw_frontmatter_survive_rendering() {
    let rendered = engine()
        .render(
            "---\nmodel: m\nmyorg.team: search\n---\nHi",
            &DataArgument::default(),
            None,
        )
        .await
        .unwrap();

    let ext = rendered.metadata.ext.clone().unwrap();
    assert_eq!(ext["myorg"]["team"], "search");
    assert_eq!(rendered.metadata.raw.clone().unwrap()["myorg.team"], "search");
}

#[tokio::test]
async fn context_is_reachable_only_through_at_variables() {
    let data = DataArgument {
        input: Some(object(json!({"state": "input-state"}))),
        context: Some(object(json!({"state": "context-state"}))),
        ..Default::default()
    };
    let rendered = engine()
        .render("{{state}} / {{@state}}", &data, None)
        .await
        .unwrap();

    assert_eq!(rendered.messages[0].content, vec![Part::text("input-state / context-state")]);
}

#[tokio::test]
async fn helpers_compose_inside_templates() {
    let data = DataArgument::with_input(json!({"kind": "json", "payload": {"ok": true}}));
    let rendered = engine()
        .render(
            "{{#ifEquals kind \"json\"}}{{json payload}}{{else}}text{{/ifEquals}}",
            &data,
            None,
        )
        .await
        .unwrap();

    assert_eq!(rendered.messages[0].content, vec![Part::text(r#"{"ok":true}"#)]);
}

#[tokio::test]
async fn blank_output_yields_no_messages() {
    let rendered = engine()
        .render("{{#if missing}}never{{/if}}\n  \n", &DataArgument::default(), None)
        .await
        .unwrap();
    assert!(rendered.messages.is_empty());
}

#[tokio::test]
async fn numeric_version_renders() {
    let rendered = engine()
        .render("---\nmodel: m\nversion: 2\n---\nHi", &DataArgument::default(), None)
        .await
        .unwrap();
    assert_eq!(rendered.metadata.version.as_deref(), Some("2"));
    assert_eq!(rendered.config()["version"], "2");
    assert_eq!(rendered.messages, vec![Message::text(Role::User, "Hi")]);
}

#[tokio::test]
async fn unclosed_frontmatter_is_a_parse_error() {
    let err = engine()
        .render("---\nmodel: gemini-pro\nHello", &DataArgument::default(), None)
        .await
        .unwrap_err();
    assert!(matches!(err, DotpromptError::Parse(_)));
}

#[tokio::test]
async fn bad_picoschema_fails_the_render() {
    let err = engine()
        .render(
            "---\ninput:\n  schema:\n    who: Stranger\n---\nHi",
            &DataArgument::default(),
            None,
        )
        .await
        .unwrap_err();
    assert!(matches!(err, DotpromptError::Picoschema(_)));
}

use dotprompt::{
    DataArgument, DirStore, Dotprompt, DotpromptOptions, ListOptions, LoadOptions, Part,
    PromptData, PromptRef, PromptStore, PromptStoreWritable,
};
use std::sync::Arc;
use tempfile::TempDir;

async fn store_with(files: &[(&str, &str)]) -> (TempDir, DirStore) {
    let dir = TempDir::new().unwrap();
    for (path, source) in files {
        let path = dir.path().join(path);
        tokio::fs::create_dir_all(path.parent().unwrap()).await.unwrap();
        tokio::fs::write(&path, source).await.unwrap();
    }
    let store = DirStore::new(dir.path());
    (dir, store)
}

#[tokio::test]
async fn lists_prompts_variants_and_partials_sorted() {
    let (_dir, store) = store_with(&[
        ("greeting.prompt", "Hi"),
        ("greeting.formal.prompt", "Good day"),
        ("alpha.prompt", "A"),
        ("_footer.prompt", "-- bye"),
        ("support/triage.prompt", "Triage"),
        ("support/_sig.prompt", "Support team"),
        (".cache/ignored.prompt", "hidden"),
        ("notes.txt", "not a prompt"),
    ])
    .await;

    let prompts = store.list(ListOptions::default()).await.unwrap();
    assert_eq!(
        prompts.items,
        vec![
            PromptRef::new("alpha"),
            PromptRef::new("greeting"),
            PromptRef::new("greeting").with_variant("formal"),
            PromptRef::new("support/triage"),
        ]
    );
    assert_eq!(prompts.cursor, None);

    let partials = store.list_partials(ListOptions::default()).await.unwrap();
    assert_eq!(
        partials.items,
        vec![PromptRef::new("footer"), PromptRef::new("support/sig")]
    );
}

#[tokio::test]
async fn listing_pages_with_a_cursor() {
    let (_dir, store) = store_with(&[
        ("a.prompt", "a"),
        ("b.prompt", "b"),
        ("c.prompt", "c"),
    ])
    .await;

    let first = store
        .list(ListOptions {
            cursor: None,
            limit: Some(2),
        })
        .await
        .unwrap();
    assert_eq!(first.items.len(), 2);

    let rest = store
        .list(ListOptions {
            cursor: first.cursor,
            limit: Some(2),
        })
        .await
        .unwrap();
    assert_eq!(rest.items, vec![PromptRef::new("c")]);
    assert!(rest.cursor.is_none());
}

#[tokio::test]
async fn missing_root_lists_nothing() {
    let dir = TempDir::new().unwrap();
    let store = DirStore::new(dir.path().join("not-created-yet"));
    assert!(store.list(ListOptions::default()).await.unwrap().items.is_empty());
}

#[tokio::test]
async fn loads_prompts_by_name_and_variant() {
    let (_dir, store) = store_with(&[
        ("greeting.prompt", "Hi"),
        ("greeting.formal.prompt", "Good day"),
    ])
    .await;

    let plain = store.load("greeting", LoadOptions::default()).await.unwrap().unwrap();
    assert_eq!(plain.source, "Hi");

    let formal = store
        .load("greeting", LoadOptions::variant("formal"))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(formal.source, "Good day");
    assert_eq!(formal.reference.variant.as_deref(), Some("formal"));

    assert!(store.load("absent", LoadOptions::default()).await.unwrap().is_none());
    assert!(store.load("../escape", LoadOptions::default()).await.is_err());
}

#[tokio::test]
async fn saves_and_deletes_prompts_and_partials() {
    let dir = TempDir::new().unwrap();
    let store = DirStore::new(dir.path());

    store
        .save(PromptData::new(
            PromptRef::new("team/welcome"),
            "---\nmodel: m\n---\nWelcome {{name}}",
        ))
        .await
        .unwrap();
    store
        .save_partial(PromptData::new(PromptRef::new("team/sig"), "-- the team"))
        .await
        .unwrap();

    assert!(dir.path().join("team/welcome.prompt").exists());
    assert!(dir.path().join("team/_sig.prompt").exists());

    let sig = store
        .load_partial("team/sig", LoadOptions::default())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(sig.source, "-- the team");

    store.delete("team/welcome", LoadOptions::default()).await.unwrap();
    store.delete_partial("team/sig", LoadOptions::default()).await.unwrap();
    assert!(store.list(ListOptions::default()).await.unwrap().items.is_empty());
    assert!(store.delete("team/welcome", LoadOptions::default()).await.is_err());
}

#[tokio::test]
async fn invalid_sources_are_not_saved() {
    let dir = TempDir::new().unwrap();
    let store = DirStore::new(dir.path());

    let unclosed = PromptData::new(PromptRef::new("broken"), "{{#if x}}never closed");
    assert!(store.save(unclosed).await.is_err());

    let bad_yaml = PromptData::new(PromptRef::new("broken"), "---\nmodel: m\n");
    assert!(store.save(bad_yaml).await.is_err());

    assert!(!dir.path().join("broken.prompt").exists());
}

#[tokio::test]
async fn engine_loads_partials_from_the_store() {
    let (_dir, store) = store_with(&[
        ("_header.prompt", "# {{title}}, {{> byline}}"),
        ("_byline.prompt", "by {{author}}"),
    ])
    .await;

    let engine = Dotprompt::new(DotpromptOptions::default().with_store(Arc::new(store))).unwrap();
    let data = DataArgument::with_input(serde_json::json!({"title": "Notes", "author": "Ada"}));
    let rendered = engine.render("{{> header}}. Body", &data, None).await.unwrap();

    assert!(engine.has_partial("header"));
    assert!(engine.has_partial("byline"));
    assert_eq!(
        rendered.messages[0].content,
        vec![Part::text("# Notes, by Ada. Body")]
    );
}

#[tokio::test]
async fn engine_loads_and_renders_stored_prompts() {
    let (_dir, store) = store_with(&[(
        "greeting.formal.prompt",
        "---\nmodel: m\n---\nGood day, {{name}}.",
    )])
    .await;
    let engine = Dotprompt::new(DotpromptOptions::default().with_store(Arc::new(store))).unwrap();

    let prompt = engine
        .load("greeting", LoadOptions::variant("formal"))
        .await
        .unwrap();
    let rendered = prompt
        .render(&DataArgument::with_input(serde_json::json!({"name": "Ada"})), None)
        .await
        .unwrap();
    assert_eq!(rendered.metadata.model.as_deref(), Some("m"));
    assert_eq!(rendered.messages[0].content, vec![Part::text("Good day, Ada.")]);

    let missing = engine.load("greeting", LoadOptions::default()).await;
    assert!(matches!(missing, Err(dotprompt::DotpromptError::Store(_))));

    let storeless = Dotprompt::new(DotpromptOptions::default()).unwrap();
    assert!(storeless.load("greeting", LoadOptions::default()).await.is_err());
}

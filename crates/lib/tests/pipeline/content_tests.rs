//! File-backed documents through front matter extraction and grouping.

use std::path::{Path, PathBuf};

use quire_lib::consts::{GROUP_DOCUMENTS, GROUP_KEY};
use quire_lib::module::{CaseInsensitive, CreateDocuments, ExtractFrontMatter, GroupByMany, OrderBy, ParseYaml};
use quire_lib::{CancellationToken, Config, Content, Engine, EngineConfig, Pipeline, Value};
use tempfile::TempDir;

use super::common::{Concat, text};

const FIRST: &str = "---\ntitle: First\ntags: [rust, Async]\n---\n# Body one\n";
const SECOND: &str = "---\ntitle: Second\ntags:\n  - async\n  - tokio\n---\nBody two\n";
const THIRD: &str = "Just text\n";

fn write_posts(dir: &Path) -> Vec<PathBuf> {
  [("first.md", FIRST), ("second.md", SECOND), ("third.md", THIRD)]
    .into_iter()
    .map(|(name, body)| {
      let path = dir.join(name);
      std::fs::write(&path, body).unwrap();
      path
    })
    .collect()
}

fn read_files(paths: Vec<PathBuf>) -> CreateDocuments {
  CreateDocuments::new(
    Config::from_context(move |ctx| {
      Ok(
        paths
          .iter()
          .map(|path| {
            ctx
              .new_document([("file", Value::from(path.display().to_string()))], Content::from_file(path))
              .with_source(path)
          })
          .collect(),
      )
    })
    .into_context(),
  )
}

fn posts_pipeline(paths: Vec<PathBuf>) -> Pipeline {
  Pipeline::new()
    .input(read_files(paths))
    .process(ExtractFrontMatter::new().handler(ParseYaml::new()))
}

#[tokio::test]
async fn front_matter_is_extracted_from_files() {
  let dir = TempDir::new().unwrap();
  let paths = write_posts(dir.path());

  let mut engine = Engine::new(EngineConfig::default());
  engine.add_pipeline("posts", posts_pipeline(paths.clone())).unwrap();

  let result = engine.run(CancellationToken::new()).await.unwrap();
  let posts = result.documents("posts").unwrap();
  assert_eq!(posts.len(), 3);

  assert_eq!(text(&posts[0], "title").as_deref(), Some("First"));
  assert_eq!(posts[0].read_string().await.unwrap(), "# Body one\n");
  assert_eq!(posts[0].source(), Some(paths[0].as_path()));

  assert_eq!(text(&posts[1], "title").as_deref(), Some("Second"));
  assert_eq!(posts[1].read_string().await.unwrap(), "Body two\n");

  // no delimiter: content and metadata are untouched
  assert_eq!(posts[2].get_raw("title"), None);
  assert_eq!(posts[2].read_string().await.unwrap(), THIRD);
}

#[tokio::test]
async fn dependent_pipeline_groups_posts_by_tag() {
  let dir = TempDir::new().unwrap();
  let paths = write_posts(dir.path());

  let mut engine = Engine::new(EngineConfig::default());
  engine.add_pipeline("posts", posts_pipeline(paths)).unwrap();
  engine
    .add_pipeline(
      "tags",
      Pipeline::new()
        .depends_on("posts")
        .process(Concat("posts"))
        .process(GroupByMany::by_key("tags").with_comparer(CaseInsensitive)),
    )
    .unwrap();

  let result = engine.run(CancellationToken::new()).await.unwrap();
  assert!(result.is_success());

  let tags = result.documents("tags").unwrap();
  let keys: Vec<String> = tags.iter().filter_map(|t| text(t, GROUP_KEY)).collect();
  assert_eq!(keys, ["rust", "Async", "tokio"]);

  let titles = |group: &quire_lib::Document| -> Vec<String> {
    group
      .get_raw(GROUP_DOCUMENTS)
      .and_then(Value::as_documents)
      .unwrap_or_default()
      .iter()
      .filter_map(|d| text(d, "title"))
      .collect()
  };
  assert_eq!(titles(&tags[0]), ["First"]);
  assert_eq!(titles(&tags[1]), ["First", "Second"]);
  assert_eq!(titles(&tags[2]), ["Second"]);
}

#[tokio::test]
async fn groups_can_be_ordered_by_key() {
  let dir = TempDir::new().unwrap();
  let paths = write_posts(dir.path());

  let mut engine = Engine::new(EngineConfig::default());
  engine.add_pipeline("posts", posts_pipeline(paths)).unwrap();
  engine
    .add_pipeline(
      "tags",
      Pipeline::new()
        .depends_on("posts")
        .process(Concat("posts"))
        .process(GroupByMany::by_key("tags"))
        .post_process(OrderBy::by_key(GROUP_KEY).descending()),
    )
    .unwrap();

  let result = engine.run(CancellationToken::new()).await.unwrap();
  let keys: Vec<String> = result
    .documents("tags")
    .unwrap()
    .iter()
    .filter_map(|t| text(t, GROUP_KEY))
    .collect();
  assert_eq!(keys, ["tokio", "rust", "async", "Async"]);
}

#[tokio::test]
async fn missing_file_fails_the_pipeline() {
  let dir = TempDir::new().unwrap();
  let missing = dir.path().join("missing.md");

  let mut engine = Engine::new(EngineConfig::default());
  engine.add_pipeline("posts", posts_pipeline(vec![missing])).unwrap();

  let result = engine.run(CancellationToken::new()).await.unwrap();
  assert_eq!(result.failed(), 1);
}

#[tokio::test]
async fn case_insensitive_grouping_merges_mixed_key_types() {
  let tagged = CreateDocuments::new(
    Config::from_context(|ctx| {
      let tags: [Value; 6] = [
        Value::from(vec!["A", "b"]),
        Value::from(vec!["B"]),
        Value::from("C"),
        Value::from(vec!["c"]),
        Value::from(vec![1]),
        Value::from("1"),
      ];
      Ok(
        tags
          .into_iter()
          .map(|tag| ctx.new_document([("tags", tag)], Content::empty()))
          .collect(),
      )
    })
    .into_context(),
  );

  let mut engine = Engine::new(EngineConfig::default());
  engine
    .add_pipeline(
      "tags",
      Pipeline::new()
        .input(tagged)
        .process(GroupByMany::by_key("tags").with_comparer(CaseInsensitive)),
    )
    .unwrap();

  let result = engine.run(CancellationToken::new()).await.unwrap();
  let groups = result.documents("tags").unwrap();
  let keys: Vec<Value> = groups.iter().filter_map(|g| g.get_raw(GROUP_KEY).cloned()).collect();
  assert_eq!(
    keys,
    vec![Value::from("A"), Value::from("b"), Value::from("C"), Value::Int(1)]
  );
  let sizes: Vec<usize> = groups
    .iter()
    .map(|g| g.get_raw(GROUP_DOCUMENTS).and_then(Value::as_documents).map_or(0, |d| d.len()))
    .collect();
  assert_eq!(sizes, [1, 2, 2, 2]);
}

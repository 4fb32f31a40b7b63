//! Integration tests for `SqliteStore` against an in-memory database.

use chrono::{DateTime, Duration, TimeZone, Utc};
use docmon_core::{
  commit::CommitMode,
  document::NewDocument,
  event::{EventKind, EventQuery},
  schema::{NewSchema, PathDecl, ValueType},
  store::MonitorStore,
  tree::{EventStream, TreeEvent},
};

use crate::{Error, SqliteStore};

async fn store() -> SqliteStore {
  SqliteStore::open_in_memory()
    .await
    .expect("in-memory store")
}

fn at(secs: i64) -> DateTime<Utc> {
  Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap() + Duration::seconds(secs)
}

fn lineup_schema() -> NewSchema {
  NewSchema {
    name:        "lineup".into(),
    description: "TV channel lineup".into(),
    definition:  "<xs:schema/>".into(),
    paths:       vec![
      PathDecl::container("/lineup"),
      PathDecl::container("/lineup/channel")
        .attribute("id", ValueType::Integer)
        .attribute("hd", ValueType::String)
        .identified_by("id"),
      PathDecl::leaf("/lineup/channel/name", ValueType::String),
    ],
  }
}

/// A store with the lineup schema and one registered document, `tv`.
async fn lineup_store() -> SqliteStore {
  let s = store().await;
  s.add_schema(lineup_schema()).await.unwrap();
  s.add_document(NewDocument::new("tv", "lineup", "http://example.com/tv.xml"))
    .await
    .unwrap();
  s
}

fn channel(id: &str, name: &str) -> Vec<TreeEvent> {
  vec![
    TreeEvent::enter("channel", &[("id", id)]),
    TreeEvent::enter("name", &[]),
    TreeEvent::text(name),
    TreeEvent::exit("name"),
    TreeEvent::exit("channel"),
  ]
}

fn lineup(children: Vec<Vec<TreeEvent>>) -> Vec<TreeEvent> {
  let mut events = vec![TreeEvent::enter("lineup", &[])];
  events.extend(children.into_iter().flatten());
  events.push(TreeEvent::exit("lineup"));
  events
}

fn source(children: Vec<Vec<TreeEvent>>) -> EventStream {
  EventStream::from(lineup(children))
}

async fn render(s: &SqliteStore, at: DateTime<Utc>) -> Vec<TreeEvent> {
  s.checkout("tv", at, Vec::new()).await.unwrap()
}

// ─── Schemas ─────────────────────────────────────────────────────────────────

#[tokio::test]
async fn add_and_get_schema() {
  let s = store().await;
  let schema = s.add_schema(lineup_schema()).await.unwrap();
  assert_eq!(schema.name, "lineup");

  let fetched = s.get_schema("lineup").await.unwrap().unwrap();
  assert_eq!(fetched.schema_id, schema.schema_id);
  assert_eq!(fetched.description, "TV channel lineup");
  assert_eq!(fetched.definition, "<xs:schema/>");

  assert!(s.get_schema("missing").await.unwrap().is_none());
  assert_eq!(s.list_schemas().await.unwrap().len(), 1);
}

#[tokio::test]
async fn schema_paths_keep_declarations() {
  let s = store().await;
  s.add_schema(lineup_schema()).await.unwrap();

  let paths = s.schema_paths("lineup").await.unwrap();
  let names: Vec<&str> = paths.iter().map(|p| p.path.as_str()).collect();
  assert_eq!(names, [
    "/lineup",
    "/lineup/channel",
    "/lineup/channel/name"
  ]);
  assert!(paths.windows(2).all(|w| w[0].path_id < w[1].path_id));

  let channel = &paths[1];
  assert_eq!(channel.identity.as_deref(), Some("id"));
  let attrs: Vec<(&str, ValueType)> = channel
    .attributes
    .iter()
    .map(|a| (a.name.as_str(), a.value_type))
    .collect();
  assert_eq!(attrs, [("id", ValueType::Integer), ("hd", ValueType::String)]);
  assert_eq!(paths[0].value_type, None);
  assert_eq!(paths[2].value_type, Some(ValueType::String));
}

#[tokio::test]
async fn duplicate_schema_name_is_rejected() {
  let s = store().await;
  s.add_schema(lineup_schema()).await.unwrap();
  let err = s.add_schema(lineup_schema()).await.unwrap_err();
  assert!(
    matches!(
      err,
      Error::Core(docmon_core::Error::AlreadyExists { kind: "schema", .. })
    ),
    "{err}"
  );
}

#[tokio::test]
async fn invalid_schema_persists_nothing() {
  let s = store().await;
  let mut schema = lineup_schema();
  schema.paths.push(PathDecl::leaf("/orphan/leaf", ValueType::String));
  let err = s.add_schema(schema).await.unwrap_err();
  assert!(
    matches!(err, Error::Core(docmon_core::Error::InvalidSchema(_))),
    "{err}"
  );
  assert!(s.list_schemas().await.unwrap().is_empty());
}

#[tokio::test]
async fn schema_paths_of_unknown_schema() {
  let s = store().await;
  let err = s.schema_paths("nope").await.unwrap_err();
  assert!(
    matches!(err, Error::Core(docmon_core::Error::SchemaNotFound(_))),
    "{err}"
  );
}

// ─── Documents ───────────────────────────────────────────────────────────────

#[tokio::test]
async fn add_and_list_documents() {
  let s = lineup_store().await;
  let doc = s.get_document("tv").await.unwrap().unwrap();
  assert_eq!(doc.schema, "lineup");
  assert_eq!(doc.url, "http://example.com/tv.xml");
  assert_eq!(doc.update_period, 60);
  assert_eq!(doc.snapshot_period, 86_400);
  assert!(doc.last_update.is_none());

  let mut radio = NewDocument::new("radio", "lineup", "http://example.com/fm.xml");
  radio.update_period = 300;
  s.add_document(radio).await.unwrap();

  let names: Vec<String> = s
    .list_documents()
    .await
    .unwrap()
    .into_iter()
    .map(|d| d.name)
    .collect();
  assert_eq!(names, ["radio", "tv"]);
}

#[tokio::test]
async fn document_requires_schema_and_unique_name() {
  let s = lineup_store().await;

  let err = s
    .add_document(NewDocument::new("x", "nope", "http://example.com"))
    .await
    .unwrap_err();
  assert!(
    matches!(err, Error::Core(docmon_core::Error::SchemaNotFound(_))),
    "{err}"
  );

  let err = s
    .add_document(NewDocument::new("tv", "lineup", "http://example.com"))
    .await
    .unwrap_err();
  assert!(
    matches!(
      err,
      Error::Core(docmon_core::Error::AlreadyExists { kind: "document", .. })
    ),
    "{err}"
  );
}

// ─── Commit / checkout ───────────────────────────────────────────────────────

#[tokio::test]
async fn snapshot_round_trip() {
  let s = lineup_store().await;
  let content = vec![channel("5", "Five"), channel("2", "Two")];
  let summary = s
    .commit_at("tv", source(content.clone()), CommitMode::Snapshot, at(0))
    .await
    .unwrap();
  assert_eq!(summary.snapshots, 5);

  assert_eq!(render(&s, at(0)).await, lineup(content));
  let doc = s.get_document("tv").await.unwrap().unwrap();
  assert_eq!(doc.last_update, Some(at(0)));
}

#[tokio::test]
async fn declared_attributes_render_in_declaration_order() {
  let s = lineup_store().await;
  let tagged = vec![
    TreeEvent::enter("channel", &[("hd", "yes"), ("id", "1")]),
    TreeEvent::exit("channel"),
  ];
  s.commit_at("tv", source(vec![tagged]), CommitMode::Snapshot, at(0))
    .await
    .unwrap();

  let out = render(&s, at(0)).await;
  assert_eq!(out[1], TreeEvent::enter("channel", &[("id", "1"), ("hd", "yes")]));
}

#[tokio::test]
async fn incremental_change_touches_only_the_leaf() {
  let s = lineup_store().await;
  s.commit_at("tv", source(vec![channel("1", "A")]), CommitMode::Snapshot, at(0))
    .await
    .unwrap();

  let summary = s
    .commit_at(
      "tv",
      source(vec![channel("1", "B")]),
      CommitMode::Incremental,
      at(60),
    )
    .await
    .unwrap();
  assert_eq!(
    (summary.additions, summary.changes, summary.removals),
    (0, 1, 0)
  );

  let query = EventQuery {
    document: "tv".into(),
    from: Some(at(60)),
    ..Default::default()
  };
  let events = s.history(&query).await.unwrap();
  assert_eq!(events.len(), 1);
  assert_eq!(events[0].path, "/lineup/channel/name");
  assert_eq!(events[0].event.kind, EventKind::Change);
  assert_eq!(events[0].event.parent, "1");
  assert_eq!(events[0].event.value.as_deref(), Some("B"));

  assert_eq!(render(&s, at(30)).await, lineup(vec![channel("1", "A")]));
  assert_eq!(render(&s, at(60)).await, lineup(vec![channel("1", "B")]));
}

#[tokio::test]
async fn recommit_is_idempotent() {
  let s = lineup_store().await;
  let content = vec![channel("1", "One"), channel("2", "Two")];
  s.commit_at("tv", source(content.clone()), CommitMode::Snapshot, at(0))
    .await
    .unwrap();

  for step in 1..=3 {
    let summary = s
      .commit_at(
        "tv",
        source(content.clone()),
        CommitMode::Incremental,
        at(step * 60),
      )
      .await
      .unwrap();
    assert_eq!(summary.total(), 0);
  }
  let all = s
    .history(&EventQuery { document: "tv".into(), ..Default::default() })
    .await
    .unwrap();
  assert_eq!(all.len(), 5);
}

#[tokio::test]
async fn checkout_travels_in_time() {
  let s = lineup_store().await;
  let v1 = vec![channel("1", "One")];
  let v2 = vec![channel("1", "One"), channel("2", "Two")];
  let v3 = vec![channel("2", "Deux")];

  s.commit_at("tv", source(v1.clone()), CommitMode::Snapshot, at(0))
    .await
    .unwrap();
  s.commit_at("tv", source(v2.clone()), CommitMode::Incremental, at(100))
    .await
    .unwrap();
  let last = s
    .commit_at("tv", source(v3.clone()), CommitMode::Incremental, at(200))
    .await
    .unwrap();
  assert_eq!(
    (last.additions, last.changes, last.removals),
    (0, 1, 2)
  );

  assert_eq!(render(&s, at(50)).await, lineup(v1));
  assert_eq!(render(&s, at(100)).await, lineup(v2.clone()));
  assert_eq!(render(&s, at(199)).await, lineup(v2));
  assert_eq!(render(&s, at(200)).await, lineup(v3.clone()));
  assert_eq!(render(&s, at(10_000)).await, lineup(v3));
}

#[tokio::test]
async fn checkout_before_first_snapshot_fails() {
  let s = lineup_store().await;
  s.commit_at("tv", source(vec![channel("1", "One")]), CommitMode::Incremental, at(0))
    .await
    .unwrap();

  let err = s.checkout("tv", at(10), Vec::new()).await.unwrap_err();
  assert!(
    matches!(err, Error::Core(docmon_core::Error::NoSnapshotFound { .. })),
    "{err}"
  );
}

#[tokio::test]
async fn failed_commit_rolls_back() {
  let s = lineup_store().await;
  s.commit_at("tv", source(vec![channel("1", "One")]), CommitMode::Snapshot, at(0))
    .await
    .unwrap();

  // The first channel 2 is appended before the repeat is detected.
  let err = s
    .commit_at(
      "tv",
      source(vec![channel("2", "Two"), channel("2", "Again")]),
      CommitMode::Incremental,
      at(60),
    )
    .await
    .unwrap_err();
  assert!(
    matches!(
      err,
      Error::Core(docmon_core::Error::DuplicateIdentity { ref identity, .. })
        if identity == "2"
    ),
    "{err}"
  );

  let all = s
    .history(&EventQuery { document: "tv".into(), ..Default::default() })
    .await
    .unwrap();
  assert_eq!(all.len(), 3);
  assert!(all.iter().all(|e| e.event.kind == EventKind::Snapshot));

  let doc = s.get_document("tv").await.unwrap().unwrap();
  assert_eq!(doc.last_update, Some(at(0)));
}

#[tokio::test]
async fn missing_identity_is_rejected() {
  let s = lineup_store().await;
  let anonymous = vec![
    TreeEvent::enter("channel", &[("hd", "no")]),
    TreeEvent::exit("channel"),
  ];
  let err = s
    .commit_at("tv", source(vec![anonymous]), CommitMode::Snapshot, at(0))
    .await
    .unwrap_err();
  assert!(
    matches!(err, Error::Core(docmon_core::Error::MissingIdentity { .. })),
    "{err}"
  );
}

#[tokio::test]
async fn empty_typed_identity_is_missing() {
  let s = lineup_store().await;
  let empty = vec![
    TreeEvent::enter("channel", &[("id", "")]),
    TreeEvent::exit("channel"),
  ];
  let err = s
    .commit_at("tv", source(vec![empty]), CommitMode::Snapshot, at(0))
    .await
    .unwrap_err();
  assert!(
    matches!(err, Error::Core(docmon_core::Error::MissingIdentity { .. })),
    "{err}"
  );
}

#[tokio::test]
async fn second_commit_at_the_same_instant_is_rejected() {
  let s = lineup_store().await;
  s.commit_at(
    "tv",
    source(vec![channel("1", "A"), channel("9", "Z")]),
    CommitMode::Incremental,
    at(0),
  )
  .await
  .unwrap();
  let err = s
    .commit_at("tv", source(vec![channel("1", "A")]), CommitMode::Snapshot, at(0))
    .await
    .unwrap_err();
  assert!(
    matches!(
      err,
      Error::Core(docmon_core::Error::TimeOrderingViolation { .. })
    ),
    "{err}"
  );
  assert!(s.checkout("tv", at(0), Vec::<TreeEvent>::new()).await.is_err());
}

#[tokio::test]
async fn concurrent_wall_clock_commits_both_succeed() {
  let s = lineup_store().await;
  let (a, b) = tokio::join!(
    s.commit("tv", source(vec![channel("1", "A")]), CommitMode::Snapshot),
    s.commit("tv", source(vec![channel("1", "B")]), CommitMode::Snapshot),
  );
  let (a, b) = (a.unwrap(), b.unwrap());
  assert_ne!(a.committed_at, b.committed_at);

  let doc = s.get_document("tv").await.unwrap().unwrap();
  assert_eq!(doc.last_update, Some(a.committed_at.max(b.committed_at)));
}

#[tokio::test]
async fn commit_behind_last_update_is_rejected() {
  let s = lineup_store().await;
  s.commit_at("tv", source(vec![]), CommitMode::Snapshot, at(100))
    .await
    .unwrap();
  let err = s
    .commit_at("tv", source(vec![]), CommitMode::Incremental, at(50))
    .await
    .unwrap_err();
  assert!(
    matches!(
      err,
      Error::Core(docmon_core::Error::TimeOrderingViolation { .. })
    ),
    "{err}"
  );
}

#[tokio::test]
async fn wall_clock_commit() {
  let s = lineup_store().await;
  let summary = s
    .commit("tv", source(vec![channel("1", "One")]), CommitMode::Snapshot)
    .await
    .unwrap();
  assert_eq!(summary.snapshots, 3);

  let out = s.checkout("tv", Utc::now(), Vec::new()).await.unwrap();
  assert_eq!(out, lineup(vec![channel("1", "One")]));
}

// ─── History ─────────────────────────────────────────────────────────────────

#[tokio::test]
async fn history_filters_by_path_and_window() {
  let s = lineup_store().await;
  s.commit_at("tv", source(vec![channel("1", "One")]), CommitMode::Snapshot, at(0))
    .await
    .unwrap();
  s.commit_at(
    "tv",
    source(vec![channel("1", "Uno"), channel("2", "Two")]),
    CommitMode::Incremental,
    at(60),
  )
  .await
  .unwrap();

  let channels = s
    .history(&EventQuery {
      document: "tv".into(),
      path: Some("/lineup/channel".into()),
      ..Default::default()
    })
    .await
    .unwrap();
  assert_eq!(channels.len(), 5);
  assert!(channels.iter().all(|e| e.path.starts_with("/lineup/channel")));
  assert!(
    channels
      .windows(2)
      .all(|w| (w[0].event.recorded_at, w[0].event.seq)
        < (w[1].event.recorded_at, w[1].event.seq))
  );

  let names = s
    .history(&EventQuery {
      document: "tv".into(),
      path: Some("/lineup/channel/name".into()),
      from: Some(at(1)),
      to: Some(at(60)),
    })
    .await
    .unwrap();
  let kinds: Vec<EventKind> = names.iter().map(|e| e.event.kind).collect();
  assert_eq!(kinds.len(), 2);
  assert!(kinds.contains(&EventKind::Change));
  assert!(kinds.contains(&EventKind::Addition));

  // A prefix only matches whole segments.
  let none = s
    .history(&EventQuery {
      document: "tv".into(),
      path: Some("/line".into()),
      ..Default::default()
    })
    .await
    .unwrap();
  assert!(none.is_empty());

  let err = s
    .history(&EventQuery { document: "nope".into(), ..Default::default() })
    .await
    .unwrap_err();
  assert!(
    matches!(err, Error::Core(docmon_core::Error::DocumentNotFound(_))),
    "{err}"
  );
}

//! `docmon` — command-line front end for the docmon document store.
//!
//! Reads `docmon.toml` (or the path given with `--config`), opens the SQLite
//! store it names, and runs one subcommand against it.
//!
//! ```text
//! docmon install lineup lineup.xsd
//! docmon add-document tv lineup https://example.com/tv.xml
//! docmon commit tv --snapshot today.xml
//! docmon checkout tv --at 2024-03-01T12:00:00Z
//! ```

mod config;

use std::{
  fs::File,
  io::{self, BufReader, Read as _, Write as _},
  path::PathBuf,
};

use anyhow::Context as _;
use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use docmon_core::{
  commit::{CommitMode, CommitSummary},
  document::NewDocument,
  event::EventQuery,
  path_tree::PathTree,
  schema::NewSchema,
  store::MonitorStore,
  tree::TreeSource,
};
use docmon_store_sqlite::SqliteStore;
use docmon_xml::{XmlSink, XmlSource};
use serde::Serialize;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;

use crate::config::CliConfig;

#[derive(Parser)]
#[command(author, version, about = "Track XML documents over time")]
struct Cli {
  /// Path to the TOML configuration file.
  #[arg(short, long, default_value = "docmon.toml")]
  config: PathBuf,

  /// Print results as JSON instead of text.
  #[arg(long, global = true)]
  json: bool,

  #[command(subcommand)]
  command: Command,
}

#[derive(Subcommand)]
enum Command {
  /// Install a schema from an XSD file.
  Install {
    name:        String,
    xsd:         PathBuf,
    #[arg(short, long, default_value = "")]
    description: String,
  },
  /// Register a document against an installed schema.
  AddDocument {
    name:            String,
    schema:          String,
    url:             String,
    /// Seconds between updates, as a hint for schedulers.
    #[arg(long, default_value_t = 60)]
    update_period:   u32,
    /// Seconds between snapshots, as a hint for schedulers.
    #[arg(long, default_value_t = 86_400)]
    snapshot_period: u32,
  },
  /// Record the current content of a document. Reads stdin for `-`.
  Commit {
    document: String,
    input:    PathBuf,
    /// Record a full snapshot instead of the differences.
    #[arg(long)]
    snapshot: bool,
  },
  /// Print a document as it was at a point in time.
  Checkout {
    document: String,
    /// RFC 3339 timestamp; defaults to now.
    #[arg(long, value_parser = parse_time)]
    at:       Option<DateTime<Utc>>,
  },
  /// List installed schemas.
  Schemas,
  /// List registered documents.
  Documents,
  /// List the paths of a schema.
  Paths {
    schema: String,
    /// Only show this path and the paths below it.
    #[arg(long)]
    prefix: Option<String>,
  },
  /// List the raw events of a document.
  Log {
    document: String,
    /// Only show events at this path and below it.
    #[arg(long)]
    path:     Option<String>,
    #[arg(long, value_parser = parse_time)]
    from:     Option<DateTime<Utc>>,
    #[arg(long, value_parser = parse_time)]
    to:       Option<DateTime<Utc>>,
  },
}

fn parse_time(raw: &str) -> Result<DateTime<Utc>, String> {
  DateTime::parse_from_rfc3339(raw)
    .map(|dt| dt.with_timezone(&Utc))
    .map_err(|e| format!("expected an RFC 3339 timestamp: {e}"))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
  tracing_subscriber::fmt()
    .with_env_filter(
      EnvFilter::builder()
        .with_default_directive(LevelFilter::INFO.into())
        .from_env_lossy(),
    )
    .with_writer(io::stderr)
    .init();

  let cli = Cli::parse();
  let cfg = CliConfig::load(&cli.config)?;

  let store = SqliteStore::open(&cfg.store_path)
    .await
    .with_context(|| format!("failed to open store at {:?}", cfg.store_path))?;

  match cli.command {
    Command::Install {
      name,
      xsd,
      description,
    } => {
      let definition = std::fs::read_to_string(&xsd)
        .with_context(|| format!("failed to read {xsd:?}"))?;
      let paths = docmon_xml::schema::read_paths(&definition)
        .with_context(|| format!("failed to read paths from {xsd:?}"))?;
      let schema = store
        .add_schema(NewSchema {
          name,
          description,
          definition,
          paths,
        })
        .await?;
      print(cli.json, &schema, |s| {
        format!("installed schema {} ({})", s.name, s.schema_id)
      })?;
    }

    Command::AddDocument {
      name,
      schema,
      url,
      update_period,
      snapshot_period,
    } => {
      let document = store
        .add_document(NewDocument {
          name,
          schema,
          url,
          update_period,
          snapshot_period,
        })
        .await?;
      print(cli.json, &document, |d| {
        format!("registered document {} ({})", d.name, d.document_id)
      })?;
    }

    Command::Commit {
      document,
      input,
      snapshot,
    } => {
      let mode = if snapshot {
        CommitMode::Snapshot
      } else {
        CommitMode::Incremental
      };
      let summary = if input.as_os_str() == "-" {
        let mut bytes = vec![];
        io::stdin().read_to_end(&mut bytes)?;
        commit(&store, &document, XmlSource::from_bytes(bytes), mode).await?
      } else {
        let file =
          File::open(&input).with_context(|| format!("failed to open {input:?}"))?;
        commit(&store, &document, XmlSource::new(BufReader::new(file)), mode).await?
      };
      print(cli.json, &summary, |s| {
        format!(
          "{} at {}: {} snapshot, {} added, {} changed, {} removed",
          s.document,
          s.committed_at.to_rfc3339(),
          s.snapshots,
          s.additions,
          s.changes,
          s.removals
        )
      })?;
    }

    Command::Checkout { document, at } => {
      let at = at.unwrap_or_else(Utc::now);
      let sink = XmlSink::new(Vec::new())
        .with_indent(&cfg.prefix, &cfg.indent)
        .declaration()?;
      let sink = store.checkout(&document, at, sink).await?;
      let xml = sink.finish()?;
      io::stdout().write_all(&xml)?;
    }

    Command::Schemas => {
      let schemas = store.list_schemas().await?;
      print(cli.json, &schemas, |list| {
        list
          .iter()
          .map(|s| format!("{}\t{}\t{}", s.name, s.created_at.to_rfc3339(), s.description))
          .collect::<Vec<_>>()
          .join("\n")
      })?;
    }

    Command::Documents => {
      let documents = store.list_documents().await?;
      print(cli.json, &documents, |list| {
        list
          .iter()
          .map(|d| {
            let last = d
              .last_update
              .map_or_else(|| "never".to_string(), |t| t.to_rfc3339());
            format!("{}\t{}\t{}\t{}", d.name, d.schema, last, d.url)
          })
          .collect::<Vec<_>>()
          .join("\n")
      })?;
    }

    Command::Paths { schema, prefix } => {
      let tree = PathTree::new(store.schema_paths(&schema).await?)?;
      let prefix = prefix.unwrap_or_default();
      let paths: Vec<_> = if prefix.is_empty() {
        tree.nodes().map(|n| n.path.clone()).collect()
      } else {
        tree.subtree(&prefix).cloned().collect()
      };
      print(cli.json, &paths, |list| {
        list
          .iter()
          .map(|p| {
            let mut line = p.path.clone();
            if let Some(identity) = &p.identity {
              line.push_str(&format!(" [@{identity}]"));
            }
            if let Some(value_type) = p.value_type {
              line.push_str(&format!(" : {value_type:?}"));
            }
            line
          })
          .collect::<Vec<_>>()
          .join("\n")
      })?;
    }

    Command::Log {
      document,
      path,
      from,
      to,
    } => {
      let events = store
        .history(&EventQuery {
          document,
          path,
          from,
          to,
        })
        .await?;
      print(cli.json, &events, |list| {
        list
          .iter()
          .map(|e| {
            format!(
              "{}\t{:?}\t{}\tparent={:?}\tattrs={:?}\tvalue={:?}",
              e.event.recorded_at.to_rfc3339(),
              e.event.kind,
              e.path,
              e.event.parent,
              e.event.attrs,
              e.event.value.as_deref().unwrap_or(""),
            )
          })
          .collect::<Vec<_>>()
          .join("\n")
      })?;
    }
  }

  Ok(())
}

async fn commit<S>(
  store: &SqliteStore,
  document: &str,
  source: S,
  mode: CommitMode,
) -> anyhow::Result<CommitSummary>
where
  S: TreeSource + Send + 'static,
{
  store
    .commit(document, source, mode)
    .await
    .with_context(|| format!("failed to commit {document:?}"))
}

/// Print `value` as pretty JSON, or as the text produced by `text`.
fn print<T: Serialize>(
  json: bool,
  value: &T,
  text: impl FnOnce(&T) -> String,
) -> anyhow::Result<()> {
  let out = if json {
    serde_json::to_string_pretty(value)?
  } else {
    text(value)
  };
  if !out.is_empty() {
    println!("{out}");
  }
  Ok(())
}

//! airquery CLI - Main entry point for CLI binary
//!
//! Compiles a schema file plus a request file into SQL or a document
//! operation and prints the result.

use airquery::engine::{
    adapter::{CompiledSql, SqlDialect},
    cli::{formatter::CliFormatter, Cli, Commands, ConfigAction, OutputFormat},
    config::{Config, CONFIG_FILE},
    nosql::DocumentCompiler,
    query::{QueryRequest, RequestKind},
    schema::SchemaDescriptor,
};
use anyhow::{anyhow, bail, Context};
use clap::Parser;
use serde::de::DeserializeOwned;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    if let Err(e) = run_cli(cli) {
        CliFormatter::error(&format!("{:#}", e));
        std::process::exit(1);
    }
}

fn run_cli(cli: Cli) -> anyhow::Result<()> {
    let project_dir = cli.get_project_dir();
    let json_output = cli.format == OutputFormat::Json;

    match cli.command {
        Commands::Sql {
            schema,
            request,
            dialect,
            count,
        } => cmd_sql(&project_dir, &schema, &request, dialect.as_deref(), count, json_output)?,
        Commands::Doc { schema, request } => cmd_doc(&project_dir, &schema, &request, json_output)?,
        Commands::Config { action } => cmd_config(action, &project_dir, json_output)?,
    }

    Ok(())
}

fn read_json<T: DeserializeOwned>(path: &Path) -> anyhow::Result<T> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    serde_json::from_str(&content).with_context(|| format!("failed to parse {}", path.display()))
}

fn load_inputs(
    project_dir: &Path,
    schema: &Path,
    request: &Path,
) -> anyhow::Result<(Config, Arc<SchemaDescriptor>, QueryRequest)> {
    let config = Config::load_or_default(project_dir)?;
    let schema: SchemaDescriptor = read_json(schema)?;
    let request: QueryRequest = read_json(request)?;
    tracing::info!(entity = %schema.name, kind = ?request.kind, "compiling request");
    Ok((config, Arc::new(schema), request))
}

fn cmd_sql(
    project_dir: &Path,
    schema: &Path,
    request: &Path,
    dialect: Option<&str>,
    with_count: bool,
    json: bool,
) -> anyhow::Result<()> {
    let (config, schema, request) = load_inputs(project_dir, schema, request)?;
    let dialect = match dialect {
        Some(name) => SqlDialect::parse(name).ok_or_else(|| anyhow!("unknown dialect: {}", name))?,
        None => config.sql.dialect,
    };

    let query = request.compile(schema, &config)?;
    let statement = if request.kind == RequestKind::Count {
        query.count_sql(dialect)?
    } else {
        query.to_sql(dialect)?
    };
    let count = if with_count && request.kind != RequestKind::Count {
        Some(query.count_sql(dialect)?)
    } else {
        None
    };

    if json {
        let mut out = serde_json::json!({
            "dialect": dialect.to_string(),
            "statement": statement,
        });
        if let Some(count) = &count {
            out["count"] = serde_json::to_value(count)?;
        }
        println!("{}", serde_json::to_string_pretty(&out)?);
    } else {
        print_statement(&format!("Statement ({})", dialect), &statement);
        if let Some(count) = &count {
            print_statement("Count", count);
        }
    }
    Ok(())
}

fn print_statement(title: &str, compiled: &CompiledSql) {
    CliFormatter::header(title);
    CliFormatter::code_block(&compiled.sql, "sql");
    let payloads = compiled.params.payloads();
    for (i, payload) in payloads.iter().enumerate() {
        if payloads.len() > 1 {
            CliFormatter::item(&format!("row {}", i + 1));
        }
        CliFormatter::params(payload);
    }
}

fn cmd_doc(project_dir: &Path, schema: &Path, request: &Path, json: bool) -> anyhow::Result<()> {
    let (config, schema, request) = load_inputs(project_dir, schema, request)?;
    let query = request.compile(schema, &config)?;
    let operation = if request.kind == RequestKind::Count {
        DocumentCompiler::new().compile_count(&query)?
    } else {
        query.to_document_operation()?
    };

    let rendered = serde_json::to_string_pretty(&operation)?;
    if json {
        println!("{}", rendered);
    } else {
        CliFormatter::header(&format!("Document operation on {}", operation.collection()));
        CliFormatter::code_block(&rendered, "json");
    }
    Ok(())
}

fn cmd_config(action: ConfigAction, project_dir: &PathBuf, json: bool) -> anyhow::Result<()> {
    match action {
        ConfigAction::Show => {
            let config = Config::load_or_default(project_dir)?;
            if json {
                println!("{}", serde_json::to_string_pretty(&config)?);
            } else {
                CliFormatter::header("Configuration");
                CliFormatter::kv("dialect", &config.sql.dialect.to_string());
                CliFormatter::kv(
                    "default page size",
                    &config.pagination.default_page_size.to_string(),
                );
                CliFormatter::kv(
                    "max page size",
                    &config
                        .pagination
                        .max_page_size
                        .map(|n| n.to_string())
                        .unwrap_or_else(|| "unbounded".to_string()),
                );
                CliFormatter::kv(
                    "order by identifier",
                    &config.pagination.order_by_identifier.to_string(),
                );
                CliFormatter::kv(
                    "allow full-table mutation",
                    &config.safety.allow_full_table_mutation.to_string(),
                );
            }
        }
        ConfigAction::Init { force } => {
            let path = project_dir.join(CONFIG_FILE);
            if path.exists() && !force {
                bail!("{} already exists (use --force to overwrite)", path.display());
            }
            Config::default().save(project_dir)?;
            tracing::info!(path = %path.display(), "wrote default config");
            if json {
                println!(
                    "{}",
                    serde_json::json!({ "success": true, "path": path.display().to_string() })
                );
            } else {
                CliFormatter::success(&format!("Created {}", path.display()));
            }
        }
    }
    Ok(())
}

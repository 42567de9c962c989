//! `uast-cli` command definitions and dispatch.

use std::io::Write;
use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};
use serde::Serialize;

use crate::client::{Client, Router};
use crate::config::load_config;
use crate::error::{Result, UastError};
use crate::query::{QueryEngine, TreeOrder};
use crate::types::{Node, Position, Role};

/// Parse source files with a UAST backend and query the result.
#[derive(Debug, Parser)]
#[command(name = "uast-cli", version, about = "Parse source files into UASTs and query them")]
pub struct Cli {
    /// Endpoint: ADDRESS, lang=addr,lang=addr or a template with %s
    #[arg(short = 'e', long, env = "UAST_ENDPOINT", global = true)]
    pub endpoint: Option<String>,

    /// YAML config file
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Per-request timeout in milliseconds
    #[arg(long, global = true, value_name = "MS")]
    pub timeout: Option<u64>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Parse a file and print its UAST
    Parse {
        /// Source file to parse
        file: PathBuf,
        /// Language of the file
        #[arg(short, long)]
        language: String,
        /// XPath query applied to the resulting UAST
        #[arg(short, long)]
        query: Option<String>,
        /// Print the nodes in traversal order instead of the tree
        #[arg(long, value_enum, conflicts_with = "query")]
        order: Option<OrderArg>,
    },
    /// Print the server version
    Version {
        /// Language whose backend should answer
        #[arg(short, long)]
        language: Option<String>,
    },
    /// List the supported languages
    Languages {
        /// Language whose backend should answer
        #[arg(short, long)]
        language: Option<String>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OrderArg {
    Pre,
    Post,
    Level,
    Position,
}

impl From<OrderArg> for TreeOrder {
    fn from(arg: OrderArg) -> Self {
        match arg {
            OrderArg::Pre => TreeOrder::PreOrder,
            OrderArg::Post => TreeOrder::PostOrder,
            OrderArg::Level => TreeOrder::LevelOrder,
            OrderArg::Position => TreeOrder::PositionOrder,
        }
    }
}

/// One node without its subtree, as printed by traversals.
#[derive(Debug, Serialize)]
struct NodeSummary<'a> {
    internal_type: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    token: Option<&'a str>,
    #[serde(skip_serializing_if = "<[Role]>::is_empty")]
    roles: &'a [Role],
    #[serde(skip_serializing_if = "Option::is_none")]
    start_position: Option<Position>,
    #[serde(skip_serializing_if = "Option::is_none")]
    end_position: Option<Position>,
}

impl<'a> From<&'a Node> for NodeSummary<'a> {
    fn from(node: &'a Node) -> Self {
        Self {
            internal_type: &node.internal_type,
            token: node.token.as_deref(),
            roles: &node.roles,
            start_position: node.start_position,
            end_position: node.end_position,
        }
    }
}

/// Where requests go: one endpoint specification, or the per-language
/// backend map from the config file.
enum Target {
    Single(Client),
    Routed(Router),
}

impl Target {
    async fn client(&self, language: Option<&str>) -> Result<Client> {
        match (self, language) {
            (Self::Single(client), _) => Ok(client.clone()),
            (Self::Routed(router), Some(language)) => router.client(language).await,
            (Self::Routed(_), None) => Err(UastError::NotImplemented(
                "metadata calls on a routed configuration need a language",
            )),
        }
    }

    async fn close(&self) -> Result<()> {
        match self {
            Self::Single(client) => client.close().await,
            Self::Routed(router) => router.close().await,
        }
    }
}

/// Execute `cli`, writing JSON results to `out`.
///
/// An explicit `--endpoint` wins; otherwise a non-empty `backends` map in the
/// config routes per language, and the config endpoint is used last.
pub async fn run(cli: Cli, out: &mut impl Write) -> Result<()> {
    let mut config = load_config(cli.config.as_deref())?;
    if let Some(ms) = cli.timeout {
        config.request_timeout_ms = Some(ms);
    }
    let target = match cli.endpoint {
        Some(endpoint) => Target::Single(Client::new(&endpoint, config.options())?),
        None if !config.backends.is_empty() => Target::Routed(Router::from_config(&config)),
        None => Target::Single(Client::new(&config.endpoint, config.options())?),
    };

    let result = match cli.command {
        Command::Parse {
            file,
            language,
            query,
            order,
        } => {
            let client = target.client(Some(&language)).await?;
            parse(&client, file, language, query, order, out).await
        }
        Command::Version { language } => {
            let client = target.client(language.as_deref()).await?;
            let mut req = client.version_request();
            if let Some(language) = language {
                req = req.language(language);
            }
            req.send().await.and_then(|v| print_json(out, &v))
        }
        Command::Languages { language } => {
            let client = target.client(language.as_deref()).await?;
            let mut req = client.supported_languages_request();
            if let Some(language) = language {
                req = req.language(language);
            }
            req.send().await.and_then(|m| print_json(out, &m))
        }
    };

    if let Err(e) = target.close().await {
        tracing::warn!(error = %e, "failed to close backend connections");
    }
    result
}

async fn parse(
    client: &Client,
    file: PathBuf,
    language: String,
    query: Option<String>,
    order: Option<OrderArg>,
    out: &mut impl Write,
) -> Result<()> {
    let resp = client
        .parse_request()
        .language(language)
        .read_file(&file)
        .send()
        .await?;
    for err in &resp.errors {
        tracing::warn!(file = %file.display(), "{err}");
    }
    let Some(tree) = resp.uast.as_ref() else {
        let messages: Vec<String> = resp.errors.iter().map(ToString::to_string).collect();
        return Err(UastError::Status {
            status: resp.status,
            errors: messages,
        });
    };

    let engine = QueryEngine::new();
    match (query, order) {
        (Some(query), _) => print_json(out, &engine.filter(Some(tree), &query)?),
        (None, Some(order)) => {
            let mut iter = engine.iter(tree, order.into())?;
            let nodes: Vec<NodeSummary<'_>> = iter.nodes().map(NodeSummary::from).collect();
            print_json(out, &nodes)
        }
        (None, None) => print_json(out, tree),
    }
}

fn print_json<T: Serialize + ?Sized>(out: &mut impl Write, value: &T) -> Result<()> {
    serde_json::to_writer_pretty(&mut *out, value)?;
    writeln!(out)?;
    Ok(())
}

use std::path::PathBuf;
use std::str::FromStr;

use anyhow::{bail, Context, Result};
use clap::{ArgAction, Args, Parser, Subcommand, ValueEnum};
use keel_core::Manifest;
use keel_kubehub::KubeClusterClient;
use keel_query::ast::api_group;
use keel_query::{Evaluator, QueryNode, ShortcutRegistry};
use keel_registry::{LocalRegistry, ManifestLoader, NamespaceScoped, RegistryQueryExecutor, RemoteRegistry};
use serde_json::json;
use tracing::{error, info, warn};

mod selector;

#[derive(Parser, Debug)]
#[command(name = "keelctl", version, about = "Keel: query Kubernetes resources with composable shortcuts")]
struct Cli {
    /// Output format
    #[arg(short = 'o', long = "output", value_enum, global = true, default_value_t = Output::Human)]
    output: Output,

    /// Restrict results to one namespace
    #[arg(long = "ns", env = "KEEL_NAMESPACE", global = true)]
    namespace: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
enum Output { Human, Json }

#[derive(Args, Debug)]
struct SourceArgs {
    /// Manifest file or directory (repeatable)
    #[arg(short = 'f', long = "file")]
    files: Vec<PathBuf>,

    /// Query the live cluster instead of files
    #[arg(long = "live", action = ArgAction::SetTrue, conflicts_with = "files")]
    live: bool,

    /// Kubeconfig context for --live (default: current context)
    #[arg(long = "context", env = "KEEL_CONTEXT")]
    context: Option<String>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// List registered shortcuts and their arity
    Shortcuts,
    /// Evaluate a shortcut, e.g. `query Secret db-cred`
    Query {
        name: String,
        args: Vec<String>,
        #[command(flatten)]
        source: SourceArgs,
    },
    /// Evaluate a single leaf query
    Get {
        /// GVK key, e.g. "v1/Secret" or "apps/v1/Deployment"
        gvk: String,
        /// Object name (repeatable)
        #[arg(long = "name")]
        names: Vec<String>,
        /// Label selector term, e.g. "app=web", "!canary", "env in (prod,staging)" (repeatable)
        #[arg(short = 'l', long = "selector")]
        selectors: Vec<String>,
        #[command(flatten)]
        source: SourceArgs,
    },
    /// Discover served resources (incl. CRDs) on the live cluster
    Discover {
        #[arg(long = "context", env = "KEEL_CONTEXT")]
        context: Option<String>,
    },
}

fn init_tracing() {
    let env = std::env::var("KEEL_LOG").unwrap_or_else(|_| "info".to_string());
    let filter = tracing_subscriber::EnvFilter::from_str(&env).unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).with_target(true).with_writer(std::io::stderr).init();
}

fn init_metrics() {
    if let Ok(addr) = std::env::var("KEEL_METRICS_ADDR") {
        if let Ok(sock) = addr.parse::<std::net::SocketAddr>() {
            let builder = metrics_exporter_prometheus::PrometheusBuilder::new();
            match builder.with_http_listener(sock).install() {
                Ok(_) => info!(addr = %addr, "Prometheus metrics exporter listening"),
                Err(e) => warn!(error = %e, "failed to install metrics exporter"),
            }
        } else {
            warn!(addr = %addr, "invalid KEEL_METRICS_ADDR; expected host:port");
        }
    }
}

fn open_registry(source: &SourceArgs) -> Result<Box<dyn RegistryQueryExecutor>> {
    if source.live {
        let client = KubeClusterClient::connect(source.context.as_deref())?;
        return Ok(Box::new(RemoteRegistry::new(client)));
    }
    if source.files.is_empty() {
        bail!("no manifest source: pass -f <path> or --live");
    }
    let loader = ManifestLoader::new();
    let mut loaded = Vec::new();
    for path in &source.files {
        loaded.extend(loader.load_path(path).with_context(|| format!("loading {}", path.display()))?);
    }
    let mut failed = 0usize;
    for src in &loaded {
        for w in &src.source.warnings {
            warn!(path = %src.source.path, "{}", w);
        }
        for e in &src.source.errors {
            error!(path = %src.source.path, "{}", e);
        }
        if !src.source.success { failed += 1; }
    }
    if failed > 0 {
        bail!("{} manifest source(s) failed to load", failed);
    }
    let registry = LocalRegistry::from_loaded(&loaded);
    info!(sources = loaded.len(), manifests = registry.snapshot().len(), "local registry ready");
    Ok(Box::new(registry))
}

/// Shortcut leaves carry no namespace; `--ns` pins them before they reach the registry.
fn scope_registry(registry: Box<dyn RegistryQueryExecutor>, namespace: Option<&str>) -> Box<dyn RegistryQueryExecutor> {
    match namespace {
        Some(ns) => Box::new(NamespaceScoped::new(registry, ns)),
        None => registry,
    }
}

fn build_leaf(gvk: &str, names: &[String], selectors: &[String], namespace: Option<&str>) -> Result<QueryNode> {
    let gvk = keel_kubehub::parse_gvk_key(gvk)?;
    let mut leaf = api_group(&gvk.group).version(&gvk.version).kind(&gvk.kind);
    for n in names {
        leaf = leaf.name(n);
    }
    if let Some(ns) = namespace {
        leaf = leaf.namespace(ns);
    }
    for term in selectors {
        let (key, matcher) = selector::parse_term(term)?;
        leaf = leaf.label_matching(&key, matcher);
    }
    Ok(leaf.build())
}

fn print_manifests(items: &[Manifest], output: Output) -> Result<()> {
    match output {
        Output::Human => {
            println!("{:<24} {:<16} {:<40} SOURCE", "KIND", "NAMESPACE", "NAME");
            for m in items {
                let o = m.object();
                let kind = o.kind().unwrap_or("-");
                let ns = o.namespace().unwrap_or("-");
                let name = o.name().unwrap_or("-");
                let mark = if m.is_synthetic() { " (derived)" } else { "" };
                println!("{:<24} {:<16} {:<40} {}:{}{}", kind, ns, name, m.source().kind, m.source().path, mark);
            }
        }
        Output::Json => {
            let rows: Vec<_> = items
                .iter()
                .map(|m| json!({"source": m.source().as_ref(), "synthetic": m.is_synthetic(), "object": m.object()}))
                .collect();
            println!("{}", serde_json::to_string_pretty(&rows)?);
        }
    }
    Ok(())
}

fn main() -> Result<()> {
    init_tracing();
    init_metrics();
    let cli = Cli::parse();
    let shortcuts = ShortcutRegistry::with_library();

    match cli.command {
        Commands::Shortcuts => match cli.output {
            Output::Human => {
                for def in shortcuts.definitions() {
                    println!("{} • arity {}", def.name(), def.arity());
                }
            }
            Output::Json => {
                let rows: Vec<_> = shortcuts.definitions().map(|d| json!({"name": d.name(), "arity": d.arity()})).collect();
                println!("{}", serde_json::to_string_pretty(&rows)?);
            }
        },
        Commands::Query { name, args, source } => {
            info!(shortcut = %name, args = ?args, "query invoked");
            let registry = scope_registry(open_registry(&source)?, cli.namespace.as_deref());
            let items = Evaluator::new(&*registry, &shortcuts)
                .evaluate_shortcut(&name, &args)
                .with_context(|| format!("evaluating shortcut {}", name))?;
            print_manifests(&items, cli.output)?;
        }
        Commands::Get { gvk, names, selectors, source } => {
            info!(gvk = %gvk, ns = ?cli.namespace, "get invoked");
            let node = build_leaf(&gvk, &names, &selectors, cli.namespace.as_deref())?;
            let registry = open_registry(&source)?;
            let items = Evaluator::new(&*registry, &shortcuts).evaluate(&node).with_context(|| format!("querying {}", gvk))?;
            print_manifests(&items, cli.output)?;
        }
        Commands::Discover { context } => {
            let client = KubeClusterClient::connect(context.as_deref())?;
            let resources = client.resources();
            match cli.output {
                Output::Human => {
                    for r in resources {
                        let scope = if r.namespaced { "namespaced" } else { "cluster" };
                        let gv = if r.group.is_empty() { r.version.clone() } else { format!("{}/{}", r.group, r.version) };
                        println!("{} • {} • {}", gv, r.kind, scope);
                    }
                }
                Output::Json => println!("{}", serde_json::to_string_pretty(&resources)?),
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use keel_core::{ApiGroup, LabelMatcher};

    #[test]
    fn cli_parses_query_with_files() {
        let cli = Cli::try_parse_from(["keelctl", "-o", "json", "query", "Secret", "db-cred", "-f", "a.yaml", "-f", "dir"]).unwrap();
        assert_eq!(cli.output, Output::Json);
        match cli.command {
            Commands::Query { name, args, source } => {
                assert_eq!(name, "Secret");
                assert_eq!(args, vec!["db-cred".to_string()]);
                assert_eq!(source.files.len(), 2);
                assert!(!source.live);
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn live_conflicts_with_files() {
        assert!(Cli::try_parse_from(["keelctl", "get", "v1/Secret", "--live", "-f", "a.yaml"]).is_err());
    }

    #[test]
    fn leaf_from_gvk_names_and_selectors() {
        let node = build_leaf("apps/v1/Deployment", &["web".into()], &["tier!=db".into()], Some("prod")).unwrap();
        let QueryNode::Leaf(opts) = node else { panic!("expected leaf") };
        assert_eq!(opts.api_group, Some(ApiGroup::Named("apps".into())));
        assert_eq!(opts.version.as_deref(), Some("v1"));
        assert_eq!(opts.kind.as_deref(), Some("Deployment"));
        assert_eq!(opts.namespace.as_deref(), Some("prod"));
        assert_eq!(opts.name_filters, vec!["web".to_string()]);
        assert_eq!(opts.label_filters[0], ("tier".to_string(), LabelMatcher::NotEquals("db".into())));
    }

    #[test]
    fn ns_pins_shortcut_leaves() {
        let loaded = ManifestLoader::new().load_str(
            keel_core::SourceKind::Inline,
            "fixture",
            "apiVersion: v1\nkind: Secret\nmetadata:\n  name: db-cred\n  namespace: dev\n---\napiVersion: v1\nkind: Secret\nmetadata:\n  name: db-cred\n  namespace: prod\n",
        );
        let registry = scope_registry(Box::new(LocalRegistry::from_loaded(&[loaded])), Some("prod"));
        let shortcuts = ShortcutRegistry::with_library();
        let items = Evaluator::new(&*registry, &shortcuts).evaluate_shortcut("Secret", &["db-cred".to_string()]).unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].object().namespace(), Some("prod"));
    }

    #[test]
    fn core_gvk_maps_to_core_group() {
        let QueryNode::Leaf(opts) = build_leaf("v1/Secret", &[], &[], None).unwrap() else { panic!("expected leaf") };
        assert_eq!(opts.api_group, Some(ApiGroup::Core));
    }
}

//! Binary entry point for the heapql inspection CLI.
#![forbid(unsafe_code)]

mod ui;

use std::error::Error;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::{Args, Parser, Subcommand, ValueEnum};
use heapql::config::{HeapQlConfig, CONFIG_ENV, LOG_ENV};
use heapql::extract::ExtractorRegistry;
use heapql::query::{CollectionBridge, FieldPath, FunctionLibrary, GraphHandle, RelationalValue};
use heapql::{HeapStore, MemoryHeap, NodeId, NodeKind};
use serde::Serialize;
use tracing::debug;
use tracing_subscriber::{fmt, EnvFilter};

use ui::{Theme, Ui};

#[derive(Parser, Debug)]
#[command(
    name = "heapql",
    version,
    about = "Inspect heap snapshots through the query adapter",
    disable_help_subcommand = true
)]
struct Cli {
    #[arg(
        long,
        global = true,
        env = CONFIG_ENV,
        value_name = "FILE",
        help = "Config file (defaults to <config dir>/heapql/config.toml)"
    )]
    config: Option<PathBuf>,

    #[arg(
        long,
        global = true,
        value_enum,
        default_value_t = OutputFormat::Text,
        help = "Output format for structured responses"
    )]
    format: OutputFormat,

    #[arg(
        long,
        global = true,
        value_enum,
        default_value_t = ThemeArg::Auto,
        help = "Color theme for text output"
    )]
    theme: ThemeArg,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Summarize a snapshot file
    Info {
        #[arg(value_name = "SNAPSHOT")]
        snapshot: PathBuf,
    },
    /// Invoke a library function
    Call(CallCmd),
    /// Resolve a field path from a node
    Path(PathCmd),
    /// List the elements or entries of a collection node
    Elements(ElementsCmd),
    /// List the available functions
    Functions,
}

#[derive(Args, Debug)]
struct CallCmd {
    #[arg(value_name = "SNAPSHOT")]
    snapshot: PathBuf,

    #[arg(value_name = "FUNCTION")]
    function: String,

    /// Arguments: #<id> for nodes, null, true/false, numbers, or text
    #[arg(value_name = "ARG", allow_hyphen_values = true, num_args = 0..)]
    args: Vec<String>,
}

#[derive(Args, Debug)]
struct PathCmd {
    #[arg(value_name = "SNAPSHOT")]
    snapshot: PathBuf,

    /// Starting node as #<id> or 0x<address>
    #[arg(value_name = "NODE")]
    node: String,

    /// Dotted path, e.g. `next.value` or `@retained`
    #[arg(value_name = "PATH")]
    path: String,
}

#[derive(Args, Debug)]
struct ElementsCmd {
    #[arg(value_name = "SNAPSHOT")]
    snapshot: PathBuf,

    /// Collection node as #<id> or 0x<address>
    #[arg(value_name = "NODE")]
    node: String,

    #[arg(long, help = "Stop after this many elements")]
    limit: Option<usize>,
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum OutputFormat {
    Text,
    Json,
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum ThemeArg {
    Auto,
    Light,
    Dark,
    Plain,
}

impl From<ThemeArg> for Theme {
    fn from(value: ThemeArg) -> Self {
        match value {
            ThemeArg::Auto => Theme::Auto,
            ThemeArg::Light => Theme::Light,
            ThemeArg::Dark => Theme::Dark,
            ThemeArg::Plain => Theme::Plain,
        }
    }
}

fn main() {
    if let Err(err) = run() {
        eprintln!("error: {err}");
        std::process::exit(1);
    }
}

fn run() -> Result<(), Box<dyn Error>> {
    let cli = Cli::parse();
    let config = HeapQlConfig::load(cli.config.clone())?;
    init_tracing(&config.log.filter);
    let ui = Ui::new(cli.theme.into());

    match cli.command {
        Command::Info { snapshot } => {
            let heap = MemoryHeap::load(&snapshot)?;
            let report = InfoReport::collect(&snapshot, &heap);
            emit(cli.format, &report, || print_info(&ui, &report))?;
        }
        Command::Call(cmd) => {
            let store = open_store(&cmd.snapshot)?;
            let library = FunctionLibrary::from_config(&config)?;
            let args = cmd
                .args
                .iter()
                .map(|text| parse_arg(&store, text))
                .collect::<Result<Vec<_>, _>>()?;
            debug!(function = %cmd.function, args = args.len(), "cli.call");
            let result = library.invoke(&cmd.function, &args)?;
            let report = CallReport {
                function: cmd.function,
                result,
            };
            emit(cli.format, &report, || ui.value(&report.result))?;
        }
        Command::Path(cmd) => {
            let store = open_store(&cmd.snapshot)?;
            let node = GraphHandle::new(&store, parse_node(&*store, &cmd.node)?);
            let path: FieldPath = cmd.path.parse()?;
            let value = path.resolve(&node)?;
            let report = PathReport {
                node,
                path: path.to_string(),
                value,
            };
            emit(cli.format, &report, || {
                ui.section(
                    "Path",
                    [
                        ("node", report.node.to_string()),
                        ("path", report.path.clone()),
                        ("value", report.value.to_string()),
                    ],
                )
            })?;
        }
        Command::Elements(cmd) => {
            let store = open_store(&cmd.snapshot)?;
            let node = GraphHandle::new(&store, parse_node(&*store, &cmd.node)?);
            let report = collect_elements(node, cmd.limit.unwrap_or(usize::MAX))?;
            emit(cli.format, &report, || print_elements(&ui, &report))?;
        }
        Command::Functions => {
            let rows: Vec<SignatureRow> = FunctionLibrary::signatures()
                .iter()
                .map(|sig| SignatureRow {
                    name: sig.name,
                    params: sig.params.iter().map(|p| p.as_str()).collect(),
                    returns: sig.returns.as_str(),
                })
                .collect();
            emit(cli.format, &rows, || {
                ui.list(
                    "Functions",
                    rows.iter().map(|row| {
                        format!("{}({}) -> {}", row.name, row.params.join(", "), row.returns)
                    }),
                )
            })?;
        }
    }

    Ok(())
}

fn init_tracing(config_filter: &str) {
    let filter = EnvFilter::try_from_env(LOG_ENV)
        .or_else(|_| EnvFilter::try_new(config_filter))
        .unwrap_or_else(|_| EnvFilter::new("warn"));
    let _ = fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

fn open_store(path: &Path) -> Result<Arc<dyn HeapStore>, Box<dyn Error>> {
    let heap = MemoryHeap::load(path)?;
    Ok(Arc::new(heap))
}

fn parse_node(store: &dyn HeapStore, text: &str) -> Result<NodeId, Box<dyn Error>> {
    if let Some(id) = text.strip_prefix('#') {
        let node = NodeId(id.parse()?);
        store.node_kind(node)?;
        return Ok(node);
    }
    if let Some(hex) = text.strip_prefix("0x").or_else(|| text.strip_prefix("0X")) {
        let address = u64::from_str_radix(hex, 16)?;
        return store
            .find_by_address(address)
            .ok_or_else(|| format!("no node at address {text}").into());
    }
    Err(format!("expected #<id> or 0x<address>, got '{text}'").into())
}

fn parse_arg(store: &Arc<dyn HeapStore>, text: &str) -> Result<RelationalValue, Box<dyn Error>> {
    if let Some(id) = text.strip_prefix('#') {
        let handle = GraphHandle::try_new(store, NodeId(id.parse()?))?;
        return Ok(RelationalValue::Handle(handle));
    }
    Ok(match text {
        "null" => RelationalValue::Null,
        "true" => RelationalValue::Boolean(true),
        "false" => RelationalValue::Boolean(false),
        _ => {
            if let Ok(value) = text.parse::<i64>() {
                RelationalValue::Integer(value)
            } else if let (true, Ok(value)) = (
                text.bytes().any(|b| b.is_ascii_digit()),
                text.parse::<f64>(),
            ) {
                RelationalValue::Real(value)
            } else {
                RelationalValue::Text(text.to_owned())
            }
        }
    })
}

#[derive(Serialize)]
struct InfoReport {
    path: String,
    nodes: u64,
    roots: usize,
    classes: usize,
    instances: usize,
    arrays: usize,
    class_loaders: usize,
    extractors: usize,
}

impl InfoReport {
    fn collect(path: &Path, heap: &MemoryHeap) -> Self {
        let counts = heap.kind_counts();
        let count = |kind: NodeKind| counts.get(&kind).copied().unwrap_or(0);
        Self {
            path: path.display().to_string(),
            nodes: heap.node_count(),
            roots: heap.gc_roots().len(),
            classes: count(NodeKind::Class),
            instances: count(NodeKind::Instance),
            arrays: count(NodeKind::Array),
            class_loaders: count(NodeKind::ClassLoader),
            extractors: ExtractorRegistry::builtin().len(),
        }
    }
}

fn print_info(ui: &Ui, report: &InfoReport) {
    ui.section(
        "Snapshot",
        [
            ("path", report.path.clone()),
            ("nodes", report.nodes.to_string()),
            ("roots", report.roots.to_string()),
        ],
    );
    ui.section(
        "Kinds",
        [
            ("classes", report.classes),
            ("instances", report.instances),
            ("arrays", report.arrays),
            ("class loaders", report.class_loaders),
        ],
    );
    ui.section("Extractors", [("registered", report.extractors)]);
}

#[derive(Serialize)]
struct CallReport {
    function: String,
    result: RelationalValue,
}

#[derive(Serialize)]
struct PathReport {
    node: GraphHandle,
    path: String,
    value: RelationalValue,
}

#[derive(Serialize)]
struct SignatureRow {
    name: &'static str,
    params: Vec<&'static str>,
    returns: &'static str,
}

#[derive(Serialize)]
struct EntryRow {
    key: RelationalValue,
    value: RelationalValue,
}

#[derive(Serialize)]
#[serde(tag = "shape", content = "items", rename_all = "snake_case")]
enum Items {
    Sequence(Vec<RelationalValue>),
    Map(Vec<EntryRow>),
}

#[derive(Serialize)]
struct ElementsReport {
    node: GraphHandle,
    size: i64,
    #[serde(flatten)]
    items: Items,
}

fn collect_elements(node: GraphHandle, limit: usize) -> Result<ElementsReport, Box<dyn Error>> {
    let bridge = CollectionBridge::default();
    let size = bridge.size(&node)?;
    let items = if let Some(view) = bridge.as_sequence(&node)? {
        Items::Sequence(view.iter()?.take(limit).collect::<Result<_, _>>()?)
    } else if let Some(view) = bridge.as_map(&node)? {
        let entries = view
            .iter()?
            .take(limit)
            .map(|entry| entry.map(|(key, value)| EntryRow { key, value }))
            .collect::<Result<_, _>>()?;
        Items::Map(entries)
    } else {
        return Err(format!("{node} is not a collection").into());
    };
    Ok(ElementsReport { node, size, items })
}

fn print_elements(ui: &Ui, report: &ElementsReport) {
    ui.section(
        "Collection",
        [
            ("node", report.node.to_string()),
            ("size", report.size.to_string()),
        ],
    );
    match &report.items {
        Items::Sequence(values) => ui.list("Elements", values.iter().map(|v| v.to_string())),
        Items::Map(entries) => ui.list(
            "Entries",
            entries
                .iter()
                .map(|entry| format!("{} => {}", entry.key, entry.value)),
        ),
    }
}

fn emit<T, F>(format: OutputFormat, value: &T, printer: F) -> Result<(), Box<dyn Error>>
where
    T: Serialize,
    F: FnOnce(),
{
    match format {
        OutputFormat::Json => {
            let json = serde_json::to_string_pretty(value)?;
            println!("{json}");
        }
        OutputFormat::Text => printer(),
    }
    Ok(())
}

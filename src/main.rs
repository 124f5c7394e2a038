use clap::Parser;
use pagekit::Mode;
use pagekit::core::config::{self, CliOverrides, ResolvedConfig};
use pagekit::core::item::KeyPath;
use pagekit::core::paging::PagingOptions;
use pagekit::pager::Pager;
use pagekit::source::document::{Condition, OrderBy};
use pagekit::source::memory::MemoryDocumentStore;
use pagekit::source::rest::{ResponseResolver, RestSource};
use pagekit::source::{Adapter, FetchRequest};
use simplelog::{ConfigBuilder, LevelFilter, WriteLogger};
use std::fs::File;
use std::io::{Error, Write};
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Parser)]
#[command(name = "pagekit", about = "Browse paginated REST endpoints and document collections")]
struct Args {
    /// REST endpoint to page through
    #[arg(short, long)]
    url: Option<String>,

    /// Extra query parameter (repeatable)
    #[arg(short, long = "param", value_name = "KEY=VALUE", value_parser = parse_key_val)]
    params: Vec<(String, String)>,

    /// Items requested per page
    #[arg(long)]
    page_size: Option<u32>,

    /// Dotted path to each item's unique key
    #[arg(long)]
    key_path: Option<String>,

    /// Fetch everything in a single request
    #[arg(long)]
    no_paging: bool,

    /// Config file (defaults to ~/.pagekit/config.toml)
    #[arg(long)]
    config: Option<PathBuf>,

    /// JSON fixture loaded into an in-memory document store
    #[arg(long, value_name = "FIXTURE")]
    documents: Option<PathBuf>,

    /// Collection to query (with --documents)
    #[arg(long, requires = "documents")]
    collection: Option<String>,

    /// Field to order documents by
    #[arg(long, requires = "collection")]
    order_by: Option<String>,

    /// Order descending
    #[arg(long, requires = "order_by")]
    desc: bool,

    /// Filter, e.g. `status == "open"` (repeatable)
    #[arg(long = "where", value_name = "FIELD OP JSON", requires = "collection")]
    conditions: Vec<String>,

    /// Reference field to replace with its document (repeatable)
    #[arg(long, requires = "collection")]
    populate: Vec<String>,

    /// How to present the list
    #[arg(short, long, default_value_t, value_enum)]
    mode: Mode,

    /// Shorthand for `--mode print`
    #[arg(long, conflicts_with = "mode")]
    print: bool,

    /// Stop after this many pages (print mode)
    #[arg(long)]
    max_pages: Option<u32>,
}

fn parse_key_val(s: &str) -> Result<(String, String), String> {
    let (key, value) = s
        .split_once('=')
        .ok_or_else(|| format!("expected KEY=VALUE, got `{s}`"))?;
    if key.is_empty() {
        return Err(format!("empty key in `{s}`"));
    }
    Ok((key.to_string(), value.to_string()))
}

fn build_request(args: &Args, resolved: &ResolvedConfig) -> Result<FetchRequest, Error> {
    if let Some(collection) = &args.collection {
        let conditions = args
            .conditions
            .iter()
            .map(|expr| {
                Condition::parse(expr)
                    .ok_or_else(|| Error::other(format!("invalid --where expression: {expr}")))
            })
            .collect::<Result<Vec<_>, _>>()?;
        return Ok(FetchRequest::DocumentQuery {
            collection: collection.clone(),
            conditions,
            order_by: args.order_by.as_ref().map(|field| OrderBy {
                field: field.clone(),
                descending: args.desc,
            }),
            populate: args.populate.clone(),
        });
    }

    let url = resolved
        .url
        .clone()
        .ok_or_else(|| Error::other("no URL given (use --url, PAGEKIT_URL or the config file)"))?;
    Ok(FetchRequest::Rest {
        url,
        params: resolved.params.clone(),
        page_field: resolved.page_field.clone(),
        limit_field: resolved.limit_field.clone(),
        content_type: resolved.content_type.clone(),
    })
}

fn build_adapter(args: &Args, resolved: &ResolvedConfig) -> Result<Adapter, Error> {
    let resolver = ResponseResolver::Fields {
        data_field: resolved.data_field.clone(),
        page_count_field: resolved.page_count_field.clone(),
    };
    let rest = RestSource::new(resolver)
        .with_first_page(resolved.first_page)
        .with_timeout(resolved.timeout);
    let mut adapter = Adapter::new().with_rest(rest);

    if let Some(path) = &args.documents {
        let store = MemoryDocumentStore::load_fixture(path)
            .map_err(|e| Error::other(format!("loading {}: {e}", path.display())))?;
        adapter = adapter.with_documents(Arc::new(store));
    }
    Ok(adapter)
}

/// Fetches pages until exhausted (or `max_pages`), writing one JSON item per line.
async fn print_all(mut pager: Pager, max_pages: Option<u32>) -> std::io::Result<()> {
    let mut out = std::io::stdout().lock();
    let mut printed = 0;

    pager.mount();
    loop {
        pager.settle().await;
        let state = pager.state();
        if let Some(error) = &state.error {
            log::warn!("Fetch failed: {}", error.detail);
            return Err(Error::other(format!("{} ({})", error.message, error.detail)));
        }
        for item in &state.items[printed..] {
            writeln!(out, "{item}")?;
        }
        printed = state.items.len();

        let limit_reached = max_pages.is_some_and(|max| state.page >= max);
        if !state.has_more() || limit_reached {
            break;
        }
        pager.fetch_next();
    }
    log::info!("Printed {printed} items");
    pager.unmount();
    Ok(())
}

#[tokio::main]
async fn main() -> std::io::Result<()> {
    let args = Args::parse();
    dotenv::dotenv().ok();

    // Initialize file logger - writes to pagekit.log in current directory
    let log_config = ConfigBuilder::new()
        .set_time_format_rfc3339()
        .build();

    if let Ok(log_file) = File::create("pagekit.log") {
        let _ = WriteLogger::init(LevelFilter::Debug, log_config, log_file);
    }

    let file_config = match config::load_config(args.config.as_deref()) {
        Ok(config) => config,
        // A file named on the command line must load
        Err(e) if args.config.is_some() => return Err(Error::other(e.to_string())),
        Err(e) => {
            log::warn!("Ignoring config file: {e}");
            Default::default()
        }
    };
    let overrides = CliOverrides {
        url: args.url.clone(),
        page_size: args.page_size,
        key_path: args.key_path.clone(),
        no_paging: args.no_paging,
        params: args.params.clone(),
    };
    let resolved = config::resolve(&file_config, &overrides);

    let request = build_request(&args, &resolved)?;
    let adapter = build_adapter(&args, &resolved)?;
    log::info!("pagekit starting: {} request, page size {}", request.kind(), resolved.page_size);

    let options = PagingOptions {
        paging: resolved.paging,
        key_path: KeyPath::new(&resolved.key_path),
        default_error_message: resolved.error_message.clone(),
        ..Default::default()
    };
    let title = match &request {
        FetchRequest::Rest { url, .. } => url.clone(),
        FetchRequest::DocumentQuery { collection, .. } => collection.clone(),
    };
    let pager = Pager::new(Arc::new(adapter), request)
        .with_page_size(resolved.page_size)
        .with_options(options)
        .with_scroll_threshold(resolved.scroll_threshold);

    let mode = if args.print { Mode::Print } else { args.mode };
    match mode {
        Mode::Print => print_all(pager, args.max_pages).await,
        Mode::Browse => pagekit::tui::run(pager, title),
    }
}

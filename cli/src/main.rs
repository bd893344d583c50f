use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, bail};
use clap::{Args, Parser, Subcommand};
use tracing::debug;

use shelf_core::jobs::{JobOutcome, ScanScheduler};
use shelf_core::log::{LogConfig, LogLevel};
use shelf_core::store::{CategoryFilter, Comic, ComicQuery, ReadFilter, SortKey, SortOrder};
use shelf_core::{CategoryId, ComicId, Library, ScanReport, ShelfConfig};

fn main() {
    let opts = Opts::parse();
    if let Err(err) = run(opts) {
        eprintln!("error: {err:#}");
        std::process::exit(1);
    }
}

fn run(opts: Opts) -> anyhow::Result<()> {
    let config = ShelfConfig::load(opts.config.as_deref())?;
    let level = match opts.verbose.saturating_sub(opts.quiet) {
        0 => LogLevel::WARN,
        1 => LogLevel::INFO,
        2 => LogLevel::DEBUG,
        _ => LogLevel::TRACE,
    };
    shelf_core::log::init(LogConfig::for_shelf(&config).with_console_level(level))?;
    debug!(data_dir = %config.data_dir.display(), "configuration loaded");

    let library = Arc::new(Library::open(&config)?);
    match opts.command {
        Command::Grant { path } => {
            let folder = library.grant_folder(&path)?;
            println!("granted {}", folder.root.display());
        }
        Command::Revoke { path, purge } => {
            let removed = library.revoke_folder(&path, purge)?;
            println!("revoked {} ({removed} comics removed)", path.display());
        }
        Command::Folders => {
            for folder in library.folders()? {
                let scanned = match folder.last_scan_ms {
                    Some(ms) => format!("last scan {ms}"),
                    None => "never scanned".to_string(),
                };
                println!("{}  {scanned}", folder.root.display());
            }
        }
        Command::Scan { path } => scan(&library, path.as_deref())?,
        Command::List(list) => {
            let page = library.query(&list.to_query(config.page_size)?)?;
            if list.json {
                println!("{}", serde_json::to_string_pretty(&page)?);
            } else {
                for comic in &page.items {
                    print_row(comic);
                }
                println!(
                    "page {}/{} ({} comics)",
                    page.page + 1,
                    page.page_count().max(1),
                    page.total
                );
            }
        }
        Command::Show { id } => {
            let comic = library.comic(ComicId(id))?;
            println!("{}", serde_json::to_string_pretty(&comic)?);
            library.mark_seen(comic.id)?;
        }
        Command::Favorite { id } => {
            let favorite = library.toggle_favorite(ComicId(id))?;
            println!("{id}: favorite = {favorite}");
        }
        Command::Read { id, unread } => {
            library.set_read(ComicId(id), !unread)?;
            println!("{id}: read = {}", !unread);
        }
        Command::Category { action } => category(&library, action)?,
        Command::Assign { id, category } => {
            library.assign_category(ComicId(id), category.map(CategoryId))?;
        }
        Command::Render { id, page, out } => render(&library, ComicId(id), page, &out)?,
    }

    if opts.stats {
        eprintln!("{}", serde_json::to_string_pretty(&library.stats().snapshot())?);
    }
    Ok(())
}

fn scan(library: &Arc<Library>, path: Option<&Path>) -> anyhow::Result<()> {
    if let Some(path) = path {
        let report = library.scan_folder(path)?;
        print_report(path, &report);
        return Ok(());
    }

    let folders = library.folders()?;
    if folders.is_empty() {
        bail!("no folders granted; run `shelf grant <dir>` first");
    }

    let scheduler = ScanScheduler::start(Arc::clone(library))?;
    scheduler.enqueue_all()?;
    while !scheduler.wait_idle(Duration::from_secs(1)) {
        debug!(status = ?scheduler.status(), pending = scheduler.pending(), "scanning");
    }

    for folder in folders {
        match scheduler.last_report(&folder.root) {
            Some(JobOutcome::Completed(report)) => print_report(&folder.root, &report),
            Some(JobOutcome::Failed(reason)) => {
                eprintln!("{}: scan failed: {reason}", folder.root.display())
            }
            None => eprintln!("{}: not scanned", folder.root.display()),
        }
    }
    Ok(())
}

fn category(library: &Library, action: CategoryCommand) -> anyhow::Result<()> {
    match action {
        CategoryCommand::Add { name } => {
            let category = library.create_category(&name)?;
            println!("{}  {}", category.id, category.name);
        }
        CategoryCommand::Rename { id, name } => {
            let category = library.rename_category(CategoryId(id), &name)?;
            println!("{}  {}", category.id, category.name);
        }
        CategoryCommand::Rm { id } => library.delete_category(CategoryId(id))?,
        CategoryCommand::List => {
            for category in library.categories()? {
                println!("{:>4}  {} ({})", category.id, category.name, category.comic_count);
            }
        }
    }
    Ok(())
}

fn render(library: &Library, id: ComicId, page: u32, out: &Path) -> anyhow::Result<()> {
    let viewer = library.open_viewer(id)?;
    let decoded = viewer.page(page)?;
    let pixels = decoded.pixels().to_vec();
    let image = image::RgbaImage::from_raw(decoded.width(), decoded.height(), pixels)
        .context("decoded page has an unexpected buffer size")?;
    image.save(out).with_context(|| format!("writing {}", out.display()))?;
    library.record_progress(id, page)?;
    println!("{} page {}/{} -> {}", id, page + 1, viewer.page_count(), out.display());
    Ok(())
}

fn print_report(root: &Path, report: &ScanReport) {
    println!(
        "{}: {} found, {} added, {} updated, {} unchanged, {} removed, {} skipped",
        root.display(),
        report.discovered,
        report.added,
        report.updated,
        report.unchanged,
        report.removed,
        report.skipped
    );
}

fn print_row(comic: &Comic) {
    let mut flags = String::new();
    flags.push(if comic.is_favorite { '*' } else { ' ' });
    flags.push(if comic.is_read { 'r' } else { ' ' });
    flags.push(if comic.is_new { 'n' } else { ' ' });
    let progress = match comic.page_count {
        Some(count) => format!("{}/{count}", comic.last_page + 1),
        None => "-".to_string(),
    };
    println!(
        "{:>5} {flags} {:<40} {:<20} {progress}",
        comic.id,
        comic.title,
        comic.author.as_deref().unwrap_or("")
    );
}

#[derive(Parser)]
#[command(version, about = "Catalogue and read comic archives")]
struct Opts {
    /// Configuration file (defaults to the platform config directory).
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    /// Increase console verbosity (-v, -vv, -vvv). Default WARN.
    #[arg(short = 'v', action = clap::ArgAction::Count, global = true)]
    verbose: u8,
    /// Decrease console verbosity.
    #[arg(short = 'q', action = clap::ArgAction::Count, global = true)]
    quiet: u8,
    /// Print runtime counters (decode latency, cache hits, scans) to stderr when done.
    #[arg(long, global = true)]
    stats: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Grant access to a folder of comics
    Grant { path: PathBuf },
    /// Revoke a granted folder
    Revoke {
        path: PathBuf,
        /// Also remove its comics from the catalogue
        #[arg(long)]
        purge: bool,
    },
    /// List granted folders
    Folders,
    /// Scan one granted folder, or every granted folder in the background
    Scan { path: Option<PathBuf> },
    /// List comics
    List(ListArgs),
    /// Print one comic as JSON and clear its "new" flag
    Show { id: i64 },
    /// Toggle the favorite flag
    Favorite { id: i64 },
    /// Mark a comic read (or unread)
    Read {
        id: i64,
        #[arg(long)]
        unread: bool,
    },
    /// Manage categories
    Category {
        #[command(subcommand)]
        action: CategoryCommand,
    },
    /// Put a comic in a category, or clear it when none is given
    Assign { id: i64, category: Option<i64> },
    /// Decode one page to a PNG file and record it as read progress
    Render { id: i64, page: u32, out: PathBuf },
}

#[derive(Subcommand)]
enum CategoryCommand {
    Add { name: String },
    Rename { id: i64, name: String },
    Rm { id: i64 },
    List,
}

#[derive(Args)]
struct ListArgs {
    /// Only favorites
    #[arg(long)]
    favorites: bool,
    /// Only comics marked read
    #[arg(long, conflicts_with = "unread")]
    read: bool,
    #[arg(long)]
    unread: bool,
    /// Only comics not opened since they were added
    #[arg(long)]
    new: bool,
    /// Only comics in this category
    #[arg(long, conflicts_with = "uncategorized")]
    category: Option<i64>,
    #[arg(long)]
    uncategorized: bool,
    /// Only comics under this granted folder
    #[arg(long)]
    folder: Option<PathBuf>,
    /// Full-text search over title, author, and file name
    #[arg(long, short)]
    search: Option<String>,
    /// title, author, added, or read
    #[arg(long, default_value = "title")]
    sort: String,
    #[arg(long)]
    desc: bool,
    /// Zero-based page number
    #[arg(long, default_value_t = 0)]
    page: u32,
    #[arg(long)]
    page_size: Option<u32>,
    #[arg(long)]
    json: bool,
}

impl ListArgs {
    fn to_query(&self, default_page_size: u32) -> anyhow::Result<ComicQuery> {
        let sort = SortKey::parse(&self.sort)
            .with_context(|| format!("unknown sort key {:?}", self.sort))?;
        let order = if self.desc { SortOrder::Descending } else { SortOrder::Ascending };
        let read = match (self.read, self.unread) {
            (true, _) => ReadFilter::Read,
            (_, true) => ReadFilter::Unread,
            _ => ReadFilter::Any,
        };
        let category = match (self.category, self.uncategorized) {
            (Some(id), _) => CategoryFilter::Is(CategoryId(id)),
            (None, true) => CategoryFilter::Uncategorized,
            (None, false) => CategoryFilter::Any,
        };

        let mut query = ComicQuery::new()
            .favorites_only(self.favorites)
            .read(read)
            .new_only(self.new)
            .category(category)
            .sort(sort, order)
            .page(self.page, self.page_size.unwrap_or(default_page_size));
        if let Some(folder) = &self.folder {
            query = query.folder(std::fs::canonicalize(folder).unwrap_or_else(|_| folder.clone()));
        }
        if let Some(text) = &self.search {
            query = query.search(text.clone());
        }
        Ok(query)
    }
}

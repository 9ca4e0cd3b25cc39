use std::fs;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use anyhow::{Context, anyhow};
use clap::{ArgAction, Parser, Subcommand};
use dynatlas_core::prelude::*;
use globset::{Glob, GlobSetBuilder};
use image::{ImageReader, RgbaImage};
use serde::Deserialize;
use tracing::{error, info, warn};
use walkdir::WalkDir;

#[derive(Parser, Debug)]
#[command(
    name = "dynatlas",
    about = "Pack images into growable runtime atlas pages",
    version,
    author
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
    /// Show progress bars (disable with --no-progress or --quiet)
    #[arg(long, default_value_t = true, action=ArgAction::Set, global=true, help_heading = "Logging/UX")]
    progress: bool,
    /// Increase verbosity (-v, -vv)
    #[arg(short, long, action=ArgAction::Count, global=true, help_heading = "Logging/UX")]
    verbose: u8,
    /// Quiet mode (overrides verbose)
    #[arg(
        short,
        long,
        default_value_t = false,
        global = true,
        help_heading = "Logging/UX"
    )]
    quiet: bool,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Pack images into atlas pages (PNG pages + JSON metadata + snapshot)
    Pack(PackArgs),
    /// Layout-only: reserve regions from image dimensions and export JSON (no PNGs)
    Layout(PackArgs),
    /// Time every algorithm on a folder of images or on synthetic sizes
    Bench(BenchArgs),
    /// Load a saved snapshot and print its statistics
    Inspect(InspectArgs),
}

#[derive(Parser, Debug, Clone)]
struct PackArgs {
    // Input/Output
    /// Input file or directory
    #[arg(help_heading = "Input/Output")]
    input: PathBuf,
    /// Output directory
    #[arg(short, long, default_value = "out", help_heading = "Input/Output")]
    out_dir: PathBuf,
    /// Atlas base name (files will be name.png / name.json / name.atlas.json)
    #[arg(short, long, default_value = "atlas", help_heading = "Input/Output")]
    name: String,
    /// YAML settings file; fields it sets override the flags below
    #[arg(long, help_heading = "Input/Output")]
    config: Option<PathBuf>,
    /// Include patterns (glob). If set, only files matching any pattern are considered
    #[arg(long, help_heading = "Input/Output")]
    include: Vec<String>,
    /// Exclude patterns (glob). Files matching any pattern will be ignored
    #[arg(long, help_heading = "Input/Output")]
    exclude: Vec<String>,

    // Atlas
    /// Algorithm: bestfitmerge | skyline | guillotine | shelf
    #[arg(long, value_parser = ["bestfitmerge", "maxrects", "skyline", "guillotine", "shelf"], default_value = "bestfitmerge", help_heading = "Atlas")]
    algorithm: String,
    /// Side length of a new page
    #[arg(long, default_value_t = 256, help_heading = "Atlas")]
    initial_size: u32,
    /// Maximum page width/height
    #[arg(long, default_value_t = 2048, help_heading = "Atlas")]
    max_size: u32,
    /// Padding around every entry
    #[arg(long, default_value_t = 1, help_heading = "Atlas")]
    padding: u32,
    /// Page growth: double | linear:N
    #[arg(long, default_value = "double", help_heading = "Atlas")]
    growth: String,
    /// Page cap: -1 unlimited, 0 single page, N pages
    #[arg(long, default_value_t = -1, allow_hyphen_values = true, help_heading = "Atlas")]
    max_pages: i32,
    /// Repack fragmented pages before growing or opening a new one
    #[arg(long, default_value_t = false, help_heading = "Atlas")]
    repack_on_add: bool,

    // Batch
    /// Items placed between progress updates
    #[arg(long, default_value_t = 32, help_heading = "Batch")]
    quantum: usize,

    // Export
    /// Print the merged settings (after flags/YAML) and exit
    #[arg(long, default_value_t = false, help_heading = "Export")]
    print_config: bool,
    /// Output format for --print-config: json|yaml
    #[arg(long, default_value = "json", value_parser = ["json", "yaml"], help_heading = "Export")]
    print_config_format: String,
    /// Dry run: place everything and print stats but do not write files
    #[arg(long, default_value_t = false, help_heading = "Export")]
    dry_run: bool,
}

#[derive(Parser, Debug, Clone)]
struct BenchArgs {
    /// Input directory; synthetic sizes are used when omitted
    input: Option<PathBuf>,
    /// Number of synthetic sizes
    #[arg(long, default_value_t = 500)]
    synthetic: usize,
    /// Smallest synthetic side
    #[arg(long, default_value_t = 8)]
    min_side: u32,
    /// Largest synthetic side
    #[arg(long, default_value_t = 96)]
    max_side: u32,
    /// Seed for synthetic sizes
    #[arg(long, default_value_t = 7)]
    seed: u64,
    /// Only bench this algorithm
    #[arg(long)]
    algorithm: Option<String>,
    #[arg(long, default_value_t = 512)]
    initial_size: u32,
    #[arg(long, default_value_t = 2048)]
    max_size: u32,
    #[arg(long, default_value_t = 1)]
    padding: u32,
    /// Remove every third entry and repack, to compare churn behaviour
    #[arg(long, default_value_t = false)]
    churn: bool,
}

#[derive(Parser, Debug, Clone)]
struct InspectArgs {
    /// Snapshot file written by `pack` or `layout` (name.atlas.json)
    snapshot: PathBuf,
    /// Print one line per page
    #[arg(long, default_value_t = false)]
    pages: bool,
    /// Print the stored settings as YAML
    #[arg(long, default_value_t = false)]
    settings: bool,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing_with_level(cli.quiet, cli.verbose);
    match &cli.command {
        Commands::Pack(args) => run_pack(args, cli.progress && !cli.quiet),
        Commands::Layout(args) => run_layout(args),
        Commands::Bench(b) => run_bench(b),
        Commands::Inspect(i) => run_inspect(i),
    }
}

fn run_pack(cli: &PackArgs, show_progress: bool) -> anyhow::Result<()> {
    let settings = build_settings(cli)?;
    if cli.print_config {
        return print_settings(&settings, &cli.print_config_format);
    }

    let paths = gather_paths(&cli.input, &cli.include, &cli.exclude)?;
    let inputs = load_images_with_progress(&cli.input, &paths, show_progress)?;
    info!(count = inputs.len(), "loaded input images");

    let mut atlas = Atlas::in_memory(settings)?;
    let items: Vec<BatchItem> = inputs
        .iter()
        .map(|(key, img)| BatchItem::new(key.clone(), img))
        .collect();
    let report = place_with_progress(&mut atlas, items, cli.quantum, show_progress)?;
    log_failures(&report);
    log_stats(&atlas);

    if cli.dry_run {
        return Ok(());
    }
    fs::create_dir_all(&cli.out_dir)
        .with_context(|| format!("create out_dir {}", cli.out_dir.display()))?;

    let page_names = page_file_names(&cli.name, atlas.page_count());
    for (i, img) in atlas.page_images()?.iter().enumerate() {
        let png_path = cli.out_dir.join(&page_names[i]);
        img.save(&png_path)
            .with_context(|| format!("write {}", png_path.display()))?;
        info!(?png_path, page = i, "wrote page");
    }
    write_metadata(&atlas, &cli.out_dir, &cli.name, &page_names)
}

fn run_layout(cli: &PackArgs) -> anyhow::Result<()> {
    let settings = build_settings(cli)?;
    if cli.print_config {
        return print_settings(&settings, &cli.print_config_format);
    }

    let paths = gather_paths(&cli.input, &cli.include, &cli.exclude)?;
    let mut sizes: Vec<(String, u32, u32)> = Vec::with_capacity(paths.len());
    for p in &paths {
        match image::image_dimensions(p) {
            Ok((w, h)) => sizes.push((image_key(&cli.input, p), w, h)),
            Err(e) => error!(?p, error = %e, "skip image"),
        }
    }
    info!(count = sizes.len(), "read image dimensions");
    sort_largest_first(&mut sizes);

    let mut atlas = Atlas::in_memory(settings)?;
    for (key, w, h) in &sizes {
        if let Err(e) = atlas.reserve(Some(key.as_str()), *w, *h) {
            warn!(key = %key, status = ?e.status(), error = %e, "not placed");
        }
    }
    log_stats(&atlas);

    if cli.dry_run {
        return Ok(());
    }
    fs::create_dir_all(&cli.out_dir)
        .with_context(|| format!("create out_dir {}", cli.out_dir.display()))?;
    let page_names = page_file_names(&cli.name, atlas.page_count());
    write_metadata(&atlas, &cli.out_dir, &cli.name, &page_names)
}

fn run_bench(b: &BenchArgs) -> anyhow::Result<()> {
    let mut sizes = match &b.input {
        Some(dir) => {
            let paths = gather_paths(dir, &[], &[])?;
            paths
                .iter()
                .filter_map(|p| {
                    image::image_dimensions(p)
                        .ok()
                        .map(|(w, h)| (image_key(dir, p), w, h))
                })
                .collect()
        }
        None => synthetic_sizes(b.synthetic, b.min_side, b.max_side, b.seed)?,
    };
    sort_largest_first(&mut sizes);
    info!(count = sizes.len(), "bench inputs");

    let algorithms: Vec<Algorithm> = match &b.algorithm {
        Some(name) => vec![
            name.parse()
                .map_err(|_| anyhow!("unknown algorithm: {}", name))?,
        ],
        None => Algorithm::ALL.to_vec(),
    };

    for algorithm in algorithms {
        let settings = AtlasSettings::builder()
            .algorithm(algorithm)
            .initial_size(b.initial_size)
            .max_size(b.max_size)
            .padding(b.padding)
            .build();
        let mut atlas = Atlas::in_memory(settings)?;
        let start = Instant::now();
        let mut failed = 0usize;
        for (key, w, h) in &sizes {
            if atlas.reserve(Some(key.as_str()), *w, *h).is_err() {
                failed += 1;
            }
        }
        if b.churn {
            let ids: Vec<EntryId> = atlas.entries().iter().map(|e| e.id).collect();
            for id in ids.into_iter().step_by(3) {
                atlas.remove(id)?;
            }
            atlas.repack()?;
        }
        let dur = start.elapsed();
        let stats = atlas.stats();
        println!(
            "{:<13} pages={} entries={} failed={} occupancy={:.2}% time={}",
            algorithm.name(),
            stats.num_pages,
            stats.num_entries,
            failed,
            stats.occupancy * 100.0,
            fmt_dur(dur)
        );
    }
    Ok(())
}

fn run_inspect(i: &InspectArgs) -> anyhow::Result<()> {
    let text = fs::read_to_string(&i.snapshot)
        .with_context(|| format!("read {}", i.snapshot.display()))?;
    let snapshot = AtlasSnapshot::from_json(&text)
        .with_context(|| format!("parse {}", i.snapshot.display()))?;
    let atlas = Atlas::restore(&snapshot, MemorySurface::new(), |_| None)?;
    println!("{}", atlas.stats().summary());
    if i.pages {
        for page in atlas.pages() {
            println!(
                "page {}: {}x{} entries={} fill={:.2}%",
                page.index(),
                page.width(),
                page.height(),
                page.entry_count(),
                page.fill_ratio() * 100.0
            );
        }
    }
    if i.settings {
        print!("{}", serde_yaml::to_string(&snapshot.settings)?);
    }
    Ok(())
}

fn build_settings(cli: &PackArgs) -> anyhow::Result<AtlasSettings> {
    let algorithm: Algorithm = cli
        .algorithm
        .parse()
        .map_err(|_| anyhow!("unknown algorithm: {}", cli.algorithm))?;
    let growth: GrowthStrategy = cli
        .growth
        .parse()
        .map_err(|_| anyhow!("invalid growth '{}': expected double | linear:N", cli.growth))?;
    let mut settings = AtlasSettings::builder()
        .algorithm(algorithm)
        .initial_size(cli.initial_size)
        .max_size(cli.max_size)
        .padding(cli.padding)
        .growth(growth)
        .max_page_count(cli.max_pages)
        .repack_on_add(cli.repack_on_add)
        .build();
    if let Some(path) = &cli.config {
        let file =
            fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
        let y: YamlConfig =
            serde_yaml::from_str(&file).with_context(|| format!("parse {}", path.display()))?;
        settings = y.apply(settings)?;
    }
    settings.validate()?;
    Ok(settings)
}

fn print_settings(settings: &AtlasSettings, format: &str) -> anyhow::Result<()> {
    match format {
        "yaml" => print!("{}", serde_yaml::to_string(settings)?),
        _ => println!("{}", serde_json::to_string_pretty(settings)?),
    }
    Ok(())
}

fn place_with_progress(
    atlas: &mut Atlas,
    items: Vec<BatchItem<'_>>,
    quantum: usize,
    progress: bool,
) -> anyhow::Result<BatchReport> {
    use indicatif::{ProgressBar, ProgressStyle};
    let bar = if progress {
        let b = ProgressBar::new(items.len() as u64);
        b.set_style(ProgressStyle::with_template(
            "{spinner:.green} packing {pos}/{len} [{elapsed_precise}] {wide_msg}",
        )?);
        Some(b)
    } else {
        None
    };
    let cancel = CancelToken::new();
    let report = futures::executor::block_on(atlas.add_batch_async(
        items,
        quantum,
        |p| {
            if let Some(b) = &bar {
                b.set_length(p.total as u64);
                b.set_position(p.processed as u64);
                if let Some(last) = p.completed.last() {
                    b.set_message(last.name.clone());
                }
            }
        },
        &cancel,
    ))?;
    if let Some(b) = &bar {
        b.finish_and_clear();
    }
    info!(
        placed = report.placed(),
        failed = report.failed(),
        commits = report.commits,
        "batch placed"
    );
    Ok(report)
}

fn log_failures(report: &BatchReport) {
    for r in report.results.iter() {
        if let Err(e) = &r.result {
            warn!(key = %r.name, status = ?r.status(), error = %e, "not placed");
        }
    }
}

fn log_stats(atlas: &Atlas) {
    let stats = atlas.stats();
    info!(
        pages = stats.num_pages,
        entries = stats.num_entries,
        used_area = stats.used_area,
        total_area = stats.total_page_area,
        occupancy = format!("{:.2}%", stats.occupancy * 100.0),
        "stats"
    );
}

fn write_metadata(
    atlas: &Atlas,
    out_dir: &Path,
    name: &str,
    page_names: &[String],
) -> anyhow::Result<()> {
    let mut hash = atlas.to_json_hash();
    hash["meta"]["images"] = serde_json::json!(page_names);
    let json_path = out_dir.join(format!("{}.json", name));
    fs::write(&json_path, serde_json::to_string_pretty(&hash)?)
        .with_context(|| format!("write {}", json_path.display()))?;
    info!(?json_path, pages = atlas.page_count(), "metadata written");

    let snap_path = out_dir.join(format!("{}.atlas.json", name));
    fs::write(&snap_path, atlas.snapshot().to_json()?)
        .with_context(|| format!("write {}", snap_path.display()))?;
    info!(?snap_path, entries = atlas.entry_count(), "snapshot written");
    Ok(())
}

fn page_file_names(name: &str, pages: usize) -> Vec<String> {
    if pages == 1 {
        vec![format!("{}.png", name)]
    } else {
        (0..pages).map(|i| format!("{}_{}.png", name, i)).collect()
    }
}

fn sort_largest_first(sizes: &mut [(String, u32, u32)]) {
    sizes.sort_by(|a, b| {
        let area_a = (a.1 as u64) * (a.2 as u64);
        let area_b = (b.1 as u64) * (b.2 as u64);
        area_b.cmp(&area_a).then_with(|| a.0.cmp(&b.0))
    });
}

fn synthetic_sizes(
    count: usize,
    min_side: u32,
    max_side: u32,
    seed: u64,
) -> anyhow::Result<Vec<(String, u32, u32)>> {
    use rand::{Rng, SeedableRng};
    if min_side == 0 || min_side > max_side {
        anyhow::bail!("invalid synthetic side range {}..={}", min_side, max_side);
    }
    let mut rng = rand::rngs::StdRng::seed_from_u64(seed);
    Ok((0..count)
        .map(|i| {
            let w = rng.gen_range(min_side..=max_side);
            let h = rng.gen_range(min_side..=max_side);
            (format!("tex_{}", i), w, h)
        })
        .collect())
}

fn fmt_dur(d: Duration) -> String {
    let ms = d.as_secs_f64() * 1000.0;
    if ms >= 1.0 {
        format!("{:.1}ms", ms)
    } else {
        format!("{}us", d.as_micros())
    }
}

fn gather_paths(
    path: &Path,
    include: &[String],
    exclude: &[String],
) -> anyhow::Result<Vec<PathBuf>> {
    let mut inc_set = None;
    if !include.is_empty() {
        let mut b = GlobSetBuilder::new();
        for pat in include {
            b.add(Glob::new(pat)?);
        }
        inc_set = Some(b.build()?);
    }
    let mut exc_set = None;
    if !exclude.is_empty() {
        let mut b = GlobSetBuilder::new();
        for pat in exclude {
            b.add(Glob::new(pat)?);
        }
        exc_set = Some(b.build()?);
    }
    let mut list: Vec<PathBuf> = Vec::new();
    if path.is_file() {
        if !should_skip(path, inc_set.as_ref(), exc_set.as_ref()) && is_image(path) {
            list.push(path.to_path_buf());
        }
    } else {
        for entry in WalkDir::new(path)
            .sort_by_file_name()
            .into_iter()
            .filter_map(|e| e.ok())
        {
            let p = entry.path();
            if p.is_file() && !should_skip(p, inc_set.as_ref(), exc_set.as_ref()) && is_image(p) {
                list.push(p.to_path_buf());
            }
        }
    }
    Ok(list)
}

fn should_skip(
    p: &Path,
    include: Option<&globset::GlobSet>,
    exclude: Option<&globset::GlobSet>,
) -> bool {
    let s = p.to_string_lossy().replace('\\', "/");
    if let Some(ex) = exclude {
        if ex.is_match(&s) {
            return true;
        }
    }
    if let Some(inc) = include {
        if !inc.is_match(&s) {
            return true;
        }
    }
    false
}

fn is_image(p: &Path) -> bool {
    matches!(
        p.extension()
            .and_then(|e| e.to_str())
            .map(|s| s.to_ascii_lowercase()),
        Some(ext) if matches!(ext.as_str(), "png" | "jpg" | "jpeg" | "bmp" | "tga" | "gif")
    )
}

/// Entry name for an image: its path relative to the input root, with forward slashes.
fn image_key(root: &Path, p: &Path) -> String {
    let rel = if root.is_file() {
        p.file_name().map(Path::new).unwrap_or(p)
    } else {
        p.strip_prefix(root).unwrap_or(p)
    };
    rel.to_string_lossy().replace('\\', "/")
}

fn load_images_with_progress(
    root: &Path,
    paths: &[PathBuf],
    progress: bool,
) -> anyhow::Result<Vec<(String, RgbaImage)>> {
    use indicatif::{ProgressBar, ProgressStyle};
    let bar = if progress {
        let b = ProgressBar::new(paths.len() as u64);
        b.set_style(ProgressStyle::with_template(
            "{spinner:.green} loading {pos}/{len} [{elapsed_precise}] {wide_msg}",
        )?);
        Some(b)
    } else {
        None
    };
    let mut list = Vec::with_capacity(paths.len());
    for p in paths {
        let msg = p.file_name().and_then(|s| s.to_str()).unwrap_or("");
        if let Some(b) = &bar {
            b.set_message(msg.to_string());
        }
        match load_image(p) {
            Ok(img) => list.push((image_key(root, p), img)),
            Err(e) => {
                error!(?p, error = %e, "skip image");
            }
        }
        if let Some(b) = &bar {
            b.inc(1);
        }
    }
    if let Some(b) = &bar {
        b.finish_and_clear();
    }
    Ok(list)
}

fn load_image(p: &Path) -> anyhow::Result<RgbaImage> {
    let img = ImageReader::open(p)?.with_guessed_format()?.decode()?;
    Ok(img.to_rgba8())
}

fn init_tracing_with_level(quiet: bool, verbose: u8) {
    let level = if quiet {
        "error".to_string()
    } else {
        match verbose {
            0 => "info".into(),
            1 => "debug".into(),
            _ => "trace".into(),
        }
    };
    let _ = tracing_subscriber::fmt()
        .with_env_filter(level)
        .with_target(false)
        .try_init();
}

/// Settings file. Every field is optional; set fields override the command-line values.
#[derive(Debug, Default, Deserialize)]
struct YamlConfig {
    initial_size: Option<u32>,
    max_size: Option<u32>,
    padding: Option<u32>,
    algorithm: Option<String>,
    growth: Option<String>,
    max_page_count: Option<i32>,
    repack_on_add: Option<bool>,
    enable_name_index: Option<bool>,
    guillotine_merge_threshold: Option<usize>,
}

impl YamlConfig {
    fn apply(self, mut cfg: AtlasSettings) -> anyhow::Result<AtlasSettings> {
        if let Some(v) = self.initial_size {
            cfg.initial_size = v;
        }
        if let Some(v) = self.max_size {
            cfg.max_size = v;
        }
        if let Some(v) = self.padding {
            cfg.padding = v;
        }
        if let Some(v) = self.algorithm {
            cfg.algorithm = v
                .parse()
                .map_err(|_| anyhow!("unknown algorithm in config: {}", v))?;
        }
        if let Some(v) = self.growth {
            cfg.growth = v
                .parse()
                .map_err(|_| anyhow!("invalid growth in config: {}", v))?;
        }
        if let Some(v) = self.max_page_count {
            cfg.max_page_count = v;
        }
        if let Some(v) = self.repack_on_add {
            cfg.repack_on_add = v;
        }
        if let Some(v) = self.enable_name_index {
            cfg.enable_name_index = v;
        }
        if let Some(v) = self.guillotine_merge_threshold {
            cfg.guillotine_merge_threshold = v;
        }
        Ok(cfg)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn yaml_overrides_only_set_fields() {
        let y: YamlConfig = serde_yaml::from_str("algorithm: shelf\ngrowth: \"linear:64\"\n").unwrap();
        let base = AtlasSettings::builder().padding(3).build();
        let cfg = y.apply(base).unwrap();
        assert_eq!(cfg.algorithm, Algorithm::Shelf);
        assert_eq!(cfg.growth, GrowthStrategy::Linear(64));
        assert_eq!(cfg.padding, 3);
    }

    #[test]
    fn yaml_rejects_unknown_algorithm() {
        let y: YamlConfig = serde_yaml::from_str("algorithm: spiral\n").unwrap();
        assert!(y.apply(AtlasSettings::default()).is_err());
    }

    #[test]
    fn page_names_single_and_multi() {
        assert_eq!(page_file_names("ui", 1), vec!["ui.png".to_string()]);
        assert_eq!(
            page_file_names("ui", 2),
            vec!["ui_0.png".to_string(), "ui_1.png".to_string()]
        );
    }

    #[test]
    fn keys_are_relative_to_input_dir() {
        let root = Path::new("assets");
        assert_eq!(image_key(root, Path::new("assets/ui/button.png")), "ui/button.png");
    }
}

//! # treedigest CLI
//!
//! Walks a directory tree and writes one report line per entry, carrying one
//! or more content digests plus filesystem metadata.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use anyhow::{bail, Context, Result};
use clap::{ArgAction, Parser};
use once_cell::sync::Lazy;

use tdg_config::logging::{init_logging, LogLevel};
use tdg_config::{Settings, REPORT_EXT, REPORT_PREFIX};
use tdg_digest::{validate_digests, DigestKind};
use tdg_pipeline::{Pipeline, PipelineConfig};
use tdg_report::{read_report, AltReportWriter, ParsedEntry, ReportWriter};
use tdg_walk::{root_suffix, unixify_path, ExcludeList, WalkConfig, Walker};

static DIGEST_HELP: Lazy<String> = Lazy::new(|| {
    format!(
        "Digests available: {}",
        tdg_digest::supported_names().join(", ")
    )
});

/// Directory tree digester
#[derive(Parser, Debug)]
#[command(name = "treedigest")]
#[command(version, about, after_help = DIGEST_HELP.as_str())]
struct Cli {
    /// Root directory for processing
    #[arg(value_name = "ROOTPATH")]
    root: PathBuf,

    /// Digests to use
    #[arg(long, value_name = "DIGEST1[,DIGEST2...]")]
    digests: Option<String>,

    /// Alternate single digest report
    #[arg(long, value_name = "DIGEST")]
    altdigest: Option<String>,

    /// Alternate output title
    #[arg(long, value_name = "TITLE")]
    title: Option<String>,

    /// Alternate output timestamp
    #[arg(long, value_name = "TIMESTAMP")]
    tstamp: Option<String>,

    /// Block size in MB
    #[arg(long, value_name = "MBYTES")]
    blocksize: Option<u64>,

    /// Number of buffers
    #[arg(long, value_name = "N")]
    buffers: Option<usize>,

    /// Don't use shared memory
    #[arg(long)]
    noshm: bool,

    /// Case insensitive matching
    #[arg(long)]
    nocase: bool,

    /// More debugging output
    #[arg(long)]
    debug: bool,

    /// Excluded files
    #[arg(long = "xfiles", value_name = "FILE1[,FILE2...]", action = ArgAction::Append)]
    xfiles: Vec<String>,

    /// Excluded directories
    #[arg(long = "xdirs", value_name = "DIR1[,DIR2...]", action = ArgAction::Append)]
    xdirs: Vec<String>,

    /// Digest file to update
    #[arg(long = "update", value_name = "UPDATE")]
    update_file: Option<PathBuf>,
}

fn main() {
    let cli = Cli::parse();
    init_logging(if cli.debug {
        LogLevel::Debug
    } else {
        LogLevel::Info
    });
    if let Err(err) = run(cli) {
        tracing::error!("{err:#}");
        std::process::exit(1);
    }
}

fn run(cli: Cli) -> Result<()> {
    let settings = merge_settings(&cli);
    settings.validate()?;

    let root = cli
        .root
        .canonicalize()
        .with_context(|| format!("root dir {} does not exist", cli.root.display()))?;
    if !root.is_dir() {
        bail!("root dir {} is not a directory", root.display());
    }
    let root_display = unixify_path(&root.to_string_lossy());
    tracing::info!(root = %root_display, "scan root");
    tracing::info!(
        blocksize_mb = settings.blocksize_mb,
        buffers = settings.buffers,
        shm = settings.shm,
        nocase = settings.nocase,
        "pipeline configuration"
    );

    let selected = validate_digests(&settings.digests)?;
    tracing::info!(
        digests = %selected.iter().map(|k| k.name()).collect::<Vec<_>>().join(", "),
        "digests to run"
    );

    let alt_digest = match &cli.altdigest {
        Some(name) => {
            let name = name.trim().to_ascii_lowercase();
            let kind = selected.iter().copied().find(|k| k.name() == name);
            match kind {
                Some(kind) => Some(kind),
                None => bail!("alt digest {name} must be in selected digests"),
            }
        }
        None => None,
    };

    let title = cli
        .title
        .clone()
        .unwrap_or_else(|| format!("{}-{}", REPORT_PREFIX, root_suffix(&root_display)));
    let tstamp = cli
        .tstamp
        .clone()
        .unwrap_or_else(|| chrono::Local::now().format("%Y%m%d_%H%M%S").to_string());
    let outfile = PathBuf::from(format!("{title}.{tstamp}.{REPORT_EXT}"));
    tracing::debug!(main_output = %outfile.display(), "output names");

    let baseline = match &cli.update_file {
        Some(path) => load_baseline(path, &selected)?,
        None => HashMap::new(),
    };

    let interrupt = Arc::new(AtomicBool::new(false));
    {
        let interrupt = Arc::clone(&interrupt);
        ctrlc::set_handler(move || {
            interrupt.store(true, Ordering::Relaxed);
        })
        .context("failed to install interrupt handler")?;
    }

    let mut pipeline = Pipeline::new(PipelineConfig {
        block_size: settings.block_size_bytes(),
        pool_size: settings.buffers,
        shared_buffers: settings.shm,
        digests: selected.clone(),
        interrupt,
        ..PipelineConfig::default()
    })?;

    let mut writer = ReportWriter::create(&outfile, &root_display, &selected)?;
    let mut alt_writer = match alt_digest {
        Some(kind) => {
            let alt_path = PathBuf::from(format!("{title}.{}.{tstamp}.{REPORT_EXT}", kind.name()));
            tracing::info!(alt_output = %alt_path.display(), "alternate report");
            Some(AltReportWriter::create(&alt_path, &root_display, kind)?)
        }
        None => None,
    };

    let start = Instant::now();
    let mut walker = Walker::new(
        WalkConfig {
            root,
            excluded_files: ExcludeList::new(&settings.excluded_files, settings.nocase),
            excluded_dirs: ExcludeList::new(&settings.excluded_dirs, settings.nocase),
            baseline,
            selected,
        },
        &mut pipeline,
        &mut writer,
        alt_writer.as_mut(),
    );
    let walk_outcome = walker.process_tree();
    let totals = walker.counters.totals();
    drop(walker);
    let elapsed = start.elapsed();

    if let Err(err) = walk_outcome {
        pipeline.shutdown();
        if err.is_interrupt() {
            bail!("interrupted: exiting");
        }
        return Err(err.into());
    }

    writer.finish(&totals)?;
    if let Some(alt) = alt_writer.as_mut() {
        alt.finish(&totals)?;
    }
    pipeline.shutdown();

    let secs = elapsed.as_secs_f64().max(1e-6);
    tracing::info!(
        run_time_s = %format!("{:.3}", secs),
        rate_mb_s = %format!("{:.2}", totals.bytes_read as f64 / 1024.0 / 1024.0 / secs),
        files = totals.files,
        dirs = totals.dirs,
        ignored = totals.ignored,
        errors = totals.errors,
        bytes = totals.bytes_read,
        "walk complete"
    );
    println!("Main output: {}", outfile.display());
    Ok(())
}

/// Overlay command-line flags on the loaded settings.
fn merge_settings(cli: &Cli) -> Settings {
    let mut settings = Settings::load().unwrap_or_else(|err| {
        tracing::warn!(%err, "failed to load config file; using defaults");
        Settings::default()
    });
    if let Some(digests) = &cli.digests {
        settings.digests = split_list(digests);
    }
    if let Some(blocksize) = cli.blocksize {
        settings.blocksize_mb = blocksize;
    }
    if let Some(buffers) = cli.buffers {
        settings.buffers = buffers;
    }
    if cli.noshm {
        settings.shm = false;
    }
    if cli.nocase {
        settings.nocase = true;
    }
    for arg in &cli.xfiles {
        settings.excluded_files.extend(split_list(arg));
    }
    for arg in &cli.xdirs {
        settings.excluded_dirs.extend(split_list(arg));
    }
    settings
}

/// Split a comma- or whitespace-separated argument list.
fn split_list(arg: &str) -> Vec<String> {
    arg.split([',', ' ', '\t'])
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

/// Read a prior report for `--update`: its digest set must be a subset of
/// the currently selected digests.
fn load_baseline(
    path: &Path,
    selected: &[DigestKind],
) -> Result<HashMap<String, ParsedEntry>> {
    let report = read_report(path)?;
    if report.entries.is_empty() {
        tracing::warn!("update file had no data");
        return Ok(HashMap::new());
    }
    let selected_names: Vec<&str> = selected.iter().map(|k| k.name()).collect();
    let unknown: Vec<String> = report
        .digest_names()
        .into_iter()
        .filter(|name| !selected_names.contains(&name.as_str()))
        .collect();
    if !unknown.is_empty() {
        bail!(
            "update file digests are not a subset of current digests: {}",
            unknown.join(", ")
        );
    }
    tracing::info!(
        entries = report.entries.len(),
        base_path = %report.base_path,
        "loaded update baseline"
    );
    Ok(report.into_index())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn list_splitting() {
        assert_eq!(split_list("md5,sha1"), vec!["md5", "sha1"]);
        assert_eq!(split_list("md5, sha1  sha256"), vec!["md5", "sha1", "sha256"]);
        assert_eq!(split_list(",,"), Vec::<String>::new());
    }

    #[test]
    fn cli_overrides_settings() {
        let cli = Cli::parse_from([
            "treedigest",
            "/tmp",
            "--digests",
            "md5",
            "--blocksize",
            "4",
            "--buffers",
            "8",
            "--noshm",
            "--nocase",
            "--xfiles",
            "a.tmp,b.tmp",
            "--xfiles",
            "c.tmp",
        ]);
        let settings = merge_settings(&cli);
        assert_eq!(settings.digests, vec!["md5"]);
        assert_eq!(settings.blocksize_mb, 4);
        assert_eq!(settings.buffers, 8);
        assert!(!settings.shm);
        assert!(settings.nocase);
        let files = &settings.excluded_files;
        assert!(files.ends_with(&["a.tmp".into(), "b.tmp".into(), "c.tmp".into()]));
    }

    #[test]
    fn baseline_rejects_superset_digests() {
        use std::io::Write;
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("prior.thd");
        let mut f = std::fs::File::create(&path).unwrap();
        writeln!(
            f,
            "F;{{md5:5d41402abc4b2a76b9719d911017c592,sha512:{}}};61f34f5a;61f34f5b;61f34f5c;81a4;0000;         5;a",
            "0".repeat(128)
        )
        .unwrap();

        let err = load_baseline(&path, &[DigestKind::Md5]).unwrap_err();
        assert!(err.to_string().contains("sha512"));

        let ok = load_baseline(&path, &[DigestKind::Md5, DigestKind::Sha512]).unwrap();
        assert!(ok.contains_key("a"));
    }
}

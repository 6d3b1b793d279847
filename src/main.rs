//! dialect-lift - Batch source dialect conversion
//!
//! Converts a tree of source files in place with external converters,
//! keeping backups so a run can be undone with `restore`.

use anyhow::Result;
use clap::Parser;
use dialect_lift::cli::Command;
use dialect_lift::{
    BackupManager, Cli, CompletedRun, Config, Processor, Reporter, spawn_conversion,
};
use std::path::{Path, PathBuf};
use std::sync::mpsc::RecvTimeoutError;
use std::time::Duration;
use tracing::{Level, error, info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

// CLI Output Module
mod cli_output {
    //! Colour and layout helpers for terminal output

    use crossterm::{
        ExecutableCommand,
        cursor::MoveToColumn,
        style::{Color, Print, Stylize, style},
        terminal::{Clear, ClearType},
    };
    use std::io::{IsTerminal, Stderr, Write, stderr, stdout};

    /// CLI theme colours
    pub struct CliTheme;

    impl CliTheme {
        pub const SUCCESS: Color = Color::Green;
        pub const WARNING: Color = Color::Yellow;
        pub const ERROR: Color = Color::Red;
        pub const HINT: Color = Color::DarkGrey;
        pub const ACCENT: Color = Color::Cyan;
    }

    pub fn print_separator() {
        let _ = stdout().execute(Print(&format!("{}\n", "─".repeat(60))));
    }

    /// Print a centred title
    pub fn print_title(title: &str) {
        let width: usize = 60;
        let padding = width.saturating_sub(title.len()) / 2;
        let left_pad = " ".repeat(padding.saturating_sub(1));

        let _ = stdout().execute(Print(&format!(
            "{}{} {}{}\n",
            left_pad,
            "╔".bold().stylize(),
            title.bold().stylize(),
            "╗".bold().stylize(),
        )));
        let _ = stdout().execute(Print("\n"));
    }

    pub fn print_warning(msg: &str) {
        let _ = stdout().execute(Print(style("⚠ ").with(CliTheme::WARNING).bold()));
        let _ = stdout().execute(Print(format!("{}\n", msg)));
    }

    pub fn print_error(msg: &str) {
        let _ = stdout().execute(Print(style("✗ ").with(CliTheme::ERROR).bold()));
        let _ = stdout().execute(Print(format!("{}\n", msg)));
    }

    pub fn print_hint(msg: &str) {
        let _ = stdout().execute(Print(style("→ ").with(CliTheme::HINT)));
        let _ = stdout().execute(Print(format!("{}\n", msg)));
    }

    /// Print a key-value pair
    pub fn print_key_value(key: &str, value: &str, value_color: Option<Color>) {
        let key_styled = style(key).with(CliTheme::HINT);
        let value_styled = match value_color {
            Some(color) => style(value).with(color),
            None => style(value).bold(),
        };
        let _ = stdout().execute(Print("  "));
        let _ = stdout().execute(Print(key_styled));
        let _ = stdout().execute(Print(": "));
        let _ = stdout().execute(Print(value_styled));
        let _ = stdout().execute(Print("\n"));
    }

    /// Print one counter of the run summary
    pub fn print_stat(key: &str, value: &str, color: Color) {
        let key_styled = style(key).with(CliTheme::HINT);
        let value_styled = style(value).with(color).bold();
        let _ = stdout().execute(Print("  "));
        let _ = stdout().execute(Print(key_styled));
        let _ = stdout().execute(Print(": "));
        let _ = stdout().execute(Print(value_styled));
        let _ = stdout().execute(Print("\n"));
    }

    /// Print one per-file result line
    pub fn print_result(status_icon: &str, status_color: Color, source: &str, msg: &str) {
        let icon_styled = style(status_icon).with(status_color).bold();
        let source_styled = style(source).italic();
        let msg_styled = style(msg).with(CliTheme::HINT);

        let _ = stdout().execute(Print("  "));
        let _ = stdout().execute(Print(icon_styled));
        let _ = stdout().execute(Print(" "));
        let _ = stdout().execute(Print(source_styled));
        let _ = stdout().execute(Print(" "));
        let _ = stdout().execute(Print(msg_styled));
        let _ = stdout().execute(Print("\n"));
    }

    /// Redraw the progress line in place
    pub fn print_progress(percent: u8, label: &str) {
        let filled = usize::from(percent.min(100)) * 30 / 100;
        let bar = format!("{}{}", "█".repeat(filled), "░".repeat(30 - filled));
        let mut out = stdout();
        let _ = out.execute(Print("\r  "));
        let _ = out.execute(Print(style(bar).with(CliTheme::ACCENT)));
        let _ = out.execute(Print(format!(" {:>3}% {:<40.40}", percent, label)));
        let _ = out.flush();
    }

    /// Print a labelled artifact path
    pub fn print_path(label: &str, path: &str) {
        let _ = stdout().execute(Print(style("  📁 ").with(CliTheme::ACCENT)));
        let _ = stdout().execute(Print(style(format!("{}: ", label)).with(CliTheme::HINT)));
        let _ = stdout().execute(Print(format!("{}\n", path)));
    }

    pub fn print_blank() {
        let _ = stdout().execute(Print("\n"));
    }

    /// Console log writer that first wipes a half-drawn progress line
    pub fn console_writer() -> Stderr {
        let mut err = stderr();
        if err.is_terminal() {
            let _ = err.execute(MoveToColumn(0));
            let _ = err.execute(Clear(ClearType::CurrentLine));
        }
        err
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    match &cli.command {
        Command::Convert(args) => run_convert(&cli, &args.root),
        Command::Restore { root } => run_restore(&cli, root),
        Command::InitConfig { path, force } => init_config(path, *force),
    }
}

/// Convert a tree on a worker thread while rendering progress here
fn run_convert(cli: &Cli, root: &Path) -> Result<()> {
    let config = load_config(cli)?;

    let reporter = Reporter::new();
    let log_path = config.log_dir.join(reporter.log_file_name());
    let guard = setup_logging(cli, &log_path)?;

    info!(version = env!("CARGO_PKG_VERSION"), "dialect-lift starting");
    if cli.verbose {
        info!(?config, "Configuration loaded");
    }
    info!(log_file = %log_path.display(), "Log file location");

    let processor = Processor::new(&config)?;
    let job = spawn_conversion(processor, reporter, root.to_path_buf(), config.backup);

    loop {
        match job.events.recv_timeout(Duration::from_millis(100)) {
            Ok(event) => cli_output::print_progress(event.percent, &event.label),
            Err(RecvTimeoutError::Timeout) => continue,
            Err(RecvTimeoutError::Disconnected) => break,
        }
    }
    cli_output::print_blank();

    match job.join() {
        Ok(run) => {
            let report_path = if config.write_report {
                match run.report.save(&config.log_dir) {
                    Ok(path) => Some(path),
                    Err(e) => {
                        warn!(error = %e, "Failed to save run report");
                        None
                    }
                }
            } else {
                None
            };

            print_run(cli, root, &run, &log_path, report_path.as_deref());
            info!(log_file = %log_path.display(), "Conversion complete. Log saved to");
            Ok(())
        }
        Err(e) => {
            error!(error = %e, "Conversion failed");
            eprintln!("Error: {}", e);
            drop(guard);
            std::process::exit(1);
        }
    }
}

fn print_run(cli: &Cli, root: &Path, run: &CompletedRun, log_path: &Path, report: Option<&Path>) {
    use cli_output::*;

    let summary = dialect_lift::summary::summarize(&run.outcomes);
    let relative = |path: &Path| path.strip_prefix(root).unwrap_or(path).display().to_string();

    print_separator();
    print_title("Conversion complete");
    print_separator();

    print_blank();
    print_stat("Total files", &summary.total.to_string(), CliTheme::ACCENT);
    print_stat("Succeeded", &summary.succeeded.to_string(), CliTheme::SUCCESS);
    print_stat("Modified", &summary.modified.to_string(), CliTheme::SUCCESS);
    print_stat("Unchanged", &summary.unchanged.to_string(), CliTheme::WARNING);
    print_stat("Failed", &summary.failed.to_string(), CliTheme::ERROR);
    print_blank();

    if cli.verbose {
        print_separator();
        print_hint("Per-file results");
        print_blank();

        for outcome in &run.outcomes {
            let path = relative(outcome.path());
            match (outcome.succeeded(), outcome.changed()) {
                (true, true) => print_result("✓", CliTheme::SUCCESS, &path, "modified"),
                (true, false) => print_result("=", CliTheme::ACCENT, &path, "unchanged"),
                (false, _) => print_result(
                    "✗",
                    CliTheme::ERROR,
                    &path,
                    outcome.diagnostic().unwrap_or("failed"),
                ),
            }
        }
    }

    if !run.report.warnings.is_empty() {
        print_separator();
        for warning in &run.report.warnings {
            print_warning(&format!("{}: {}", warning.file, warning.warning));
        }
    }

    let failures = dialect_lift::summary::failures(&run.outcomes);
    if !failures.is_empty() {
        print_separator();
        print_error(&format!("Failed files: {}", failures.len()));
        print_blank();
        for outcome in &failures {
            print_key_value(
                &relative(outcome.path()),
                outcome.diagnostic().unwrap_or("failed"),
                Some(CliTheme::ERROR),
            );
        }
    }

    print_separator();
    print_blank();
    print_path("Log file", &log_path.display().to_string());
    if let Some(report) = report {
        print_path("Report", &report.display().to_string());
    }
}

/// Undo a previous run by moving every backup back into place
fn run_restore(cli: &Cli, root: &Path) -> Result<()> {
    use cli_output::*;

    let config = load_config(cli)?;
    let reporter = Reporter::new();
    let log_path = config
        .log_dir
        .join(format!("restore_{}.log", reporter.timestamp()));
    let guard = setup_logging(cli, &log_path)?;

    info!(version = env!("CARGO_PKG_VERSION"), root = %root.display(), "dialect-lift restoring");

    let backups = BackupManager::new(&config.backup_suffix);
    match backups.restore_all(root) {
        Ok(restored) => {
            for path in &restored {
                let shown = path.strip_prefix(root).unwrap_or(path).display().to_string();
                print_result("↺", CliTheme::SUCCESS, &shown, "restored");
            }
            print_separator();
            print_stat("Restored", &restored.len().to_string(), CliTheme::SUCCESS);
            print_blank();
            print_path("Log file", &log_path.display().to_string());
            Ok(())
        }
        Err(e) => {
            error!(error = %e, "Restore failed");
            eprintln!("Error: {}", e);
            drop(guard);
            std::process::exit(1);
        }
    }
}

/// Write the sample configuration to `path`
fn init_config(path: &Path, force: bool) -> Result<()> {
    if path.exists() && !force {
        anyhow::bail!(
            "{} already exists (use --force to overwrite)",
            path.display()
        );
    }

    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, Config::sample_config())?;

    cli_output::print_hint(&format!("Wrote sample configuration to {}", path.display()));
    Ok(())
}

/// Resolve config path - `lift` finds `lift.toml`
fn resolve_config_path(config_path: &Path) -> PathBuf {
    if config_path.exists() || config_path.extension().is_some() {
        return config_path.to_path_buf();
    }

    let with_extension = config_path.with_extension("toml");
    if with_extension.exists() {
        return with_extension;
    }

    config_path.to_path_buf()
}

/// Load configuration from file or CLI arguments
fn load_config(cli: &Cli) -> Result<Config> {
    let config = if let Some(ref config_path) = cli.config {
        let resolved_path = resolve_config_path(config_path);
        let file_config = Config::load_from_file(&resolved_path)?;
        cli.merge_with_config(file_config)
    } else {
        cli.to_config()
    };

    config.validate()?;
    Ok(config)
}

/// Setup logging (file + console)
fn setup_logging(cli: &Cli, log_path: &Path) -> Result<WorkerGuard> {
    let level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };

    let env_filter = EnvFilter::builder()
        .with_default_directive(level.into())
        .from_env_lossy();

    if let Some(parent) = log_path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let file = std::fs::OpenOptions::new()
        .create(true)
        .write(true)
        .truncate(true)
        .open(log_path)?;

    let (non_blocking, guard) = tracing_appender::non_blocking(file);

    let subscriber = tracing_subscriber::registry().with(env_filter);

    if cli.json_log {
        subscriber
            .with(
                fmt::layer()
                    .json()
                    .with_ansi(false)
                    .with_writer(non_blocking),
            )
            .with(fmt::layer().with_writer(cli_output::console_writer))
            .init();
    } else {
        subscriber
            .with(fmt::layer().with_ansi(false).with_writer(non_blocking))
            .with(fmt::layer().with_writer(cli_output::console_writer))
            .init();
    }

    Ok(guard)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tracing_subscriber::fmt::MakeWriter;

    #[test]
    fn test_print_title_handles_long_titles() {
        cli_output::print_title("Conversion");
        cli_output::print_title(&"x".repeat(80));
    }

    #[test]
    fn test_console_writer_accepts_log_lines() {
        let mut writer = cli_output::console_writer();
        writer.write_all(b"").unwrap();
        writer.flush().unwrap();
    }

    #[test]
    fn test_console_writer_serves_as_log_sink() {
        let make = cli_output::console_writer;
        let mut writer = make.make_writer();
        writer.write_all(b"").unwrap();

        let subscriber = tracing_subscriber::registry()
            .with(fmt::layer().with_writer(cli_output::console_writer));
        tracing::subscriber::with_default(subscriber, || {
            cli_output::print_progress(50, "pkg/a.py");
            error!("pkg/a.py failed");
        });
    }
}

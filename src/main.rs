use clap::Parser;
use eyre::Context;
use std::io::Write;
use trace_tables::Trace;
use trace_tables::TraceOptions;
use trace_tables::cache::CacheMode;
use trace_tables::locator::TraceDir;
use trace_tables::subsystems;
use trace_tables::table::MalformedPolicy;

mod cli {
    #[derive(clap_derive::Parser)]
    #[command(version, about)]
    /// Extract per-subsystem tables from trace-cmd traces
    pub struct Cli {
        #[clap(short, long)]
        pub verbose: bool,
        /// Trace directory (defaults to the current directory)
        #[clap(short = 'C', long)]
        pub dir: Option<std::path::PathBuf>,
        /// Skip malformed event lines instead of failing
        #[clap(long)]
        pub lenient: bool,
        /// Neither read nor write cached tables
        #[clap(long, conflicts_with = "refresh")]
        pub no_cache: bool,
        /// Rebuild cached tables
        #[clap(long)]
        pub refresh: bool,
        #[command(subcommand)]
        pub command: Command,
    }

    #[derive(clap_derive::Subcommand)]
    pub enum Command {
        /// Export a subsystem table as CSV
        Csv {
            subsystem: String,
            /// Write here instead of `<dir>/<subsystem>.csv` ("-" for stdout)
            #[clap(short, long)]
            output: Option<String>,
        },
        /// Print an overview of a subsystem table
        Summary { subsystem: String },
        /// Print the header of the binary capture
        Info,
        /// List known subsystems
        Subsystems,
    }
}

fn main() -> eyre::Result<()> {
    color_eyre::install()?;
    let cli = cli::Cli::parse();
    let level = if cli.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();

    let dir = match &cli.dir {
        Some(dir) => TraceDir::new(dir)?,
        None => TraceDir::current()?,
    };
    let options = TraceOptions::default()
        .with_malformed(if cli.lenient {
            MalformedPolicy::Skip
        } else {
            MalformedPolicy::FailFast
        })
        .with_cache(if cli.no_cache {
            CacheMode::Disabled
        } else if cli.refresh {
            CacheMode::Refresh
        } else {
            CacheMode::ReadWrite
        });
    let trace = Trace::new(dir, options);

    let stdout = &mut std::io::stdout().lock();
    match cli.command {
        cli::Command::Csv { subsystem, output } => match output.as_deref() {
            None => {
                let path = trace.export_csv(&subsystem)?;
                log::info!("Wrote \"{}\"", path.display());
            }
            Some(output) => {
                let table = trace.table(&subsystem)?;
                let file: &mut dyn Write = match output {
                    "-" => stdout,
                    path => &mut std::fs::File::create(path)
                        .wrap_err_with(|| format!("Failed to create \"{path}\""))?,
                };
                let mut writer = std::io::BufWriter::new(file);
                trace_tables::export::write_csv(&table, &mut writer)?;
                writer.flush()?;
            }
        },
        cli::Command::Summary { subsystem } => {
            let table = trace.table(&subsystem)?;
            writeln!(stdout, "{}: {} rows", table.subsystem(), table.len())?;
            if let (Some(first), Some(last)) = (table.index().first(), table.index().last()) {
                writeln!(stdout, "time: {first:.6} .. {last:.6}")?;
            }
            for name in table.column_names() {
                match table.series(name)?.range() {
                    Some((lo, hi)) => writeln!(stdout, "  {name}: {lo} .. {hi}")?,
                    None => writeln!(stdout, "  {name}")?,
                }
            }
        }
        cli::Command::Info => {
            let header = trace
                .dir()
                .capture_header()
                .wrap_err("Failed to read capture header")?;
            writeln!(stdout, "version:   {}", header.version)?;
            writeln!(stdout, "endian:    {:?}", header.endian)?;
            writeln!(stdout, "long size: {}", header.long_size)?;
            writeln!(stdout, "page size: {}", header.page_size)?;
        }
        cli::Command::Subsystems => {
            for grammar in subsystems::ALL {
                writeln!(
                    stdout,
                    "{:<14} {} ({} columns)",
                    grammar.subsystem,
                    grammar.marker,
                    grammar.fields.len()
                )?;
            }
        }
    }
    Ok(())
}

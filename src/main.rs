use std::fs;
use std::io::{self, Write};
use std::path::PathBuf;

use anyhow::{bail, Context};
use clap::{Args, Parser, Subcommand};
use log::info;

use seuranta::config::{default_dir, Config, StorePaths};
use seuranta::report::{self, Layout};
use seuranta::retry::on_conflict;
use seuranta::{walltime, CommandScheduler, Dialect, Identity, JobDb, JobRecord, NewJob, Selection};

#[derive(Parser)]
#[command(name = "seuranta")]
#[command(about = "Track batch jobs on a SLURM or Torque cluster", version)]
struct Cli {
    /// Directory holding jobs.db and config.json (default: ~/.seuranta)
    #[arg(long, global = true, env = "SEURANTA_DIR")]
    dir: Option<PathBuf>,

    /// Scheduler dialect, overriding config.json
    #[arg(long, global = true, value_enum)]
    dialect: Option<Dialect>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Args, Clone, Copy)]
struct Output {
    /// Print every field of each record
    #[arg(long, conflicts_with = "json")]
    full: bool,

    /// Print records as JSON
    #[arg(long)]
    json: bool,

    /// Group records by series
    #[arg(long)]
    series: bool,
}

impl Output {
    fn layout(&self) -> Layout {
        match (self.full, self.json) {
            (_, true) => Layout::Json,
            (true, _) => Layout::Full,
            _ => Layout::Summary,
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Update from the scheduler and list tracked and untracked jobs
    Status {
        /// Only jobs not yet complete, aborted or continued
        #[arg(long)]
        active: bool,

        #[command(flatten)]
        output: Output,
    },

    /// Show jobs by id
    Show {
        #[arg(required = true)]
        job_ids: Vec<String>,

        #[command(flatten)]
        output: Output,
    },

    /// List jobs matching a selection
    Select {
        #[arg(long, group = "selection")]
        active: bool,

        /// Job ids `MIN-MAX`, inclusive
        #[arg(long, group = "selection")]
        range: Option<String>,

        /// Modified within `[[[DD:]HH:]MM:]SS`
        #[arg(long, group = "selection")]
        recent: Option<String>,

        /// `FIELD=REGEX`, matched from the start of the value
        #[arg(long, group = "selection")]
        field: Option<String>,

        #[command(flatten)]
        output: Output,
    },

    /// Submit a job script and track it
    Submit {
        script: PathBuf,

        #[arg(long)]
        name: Option<String>,

        /// Directory the job runs in (default: current directory)
        #[arg(long)]
        run_dir: Option<PathBuf>,

        /// The job marks itself complete and may be continued until it does
        #[arg(long)]
        auto: bool,

        #[arg(long)]
        nodes: Option<i64>,

        #[arg(long)]
        procs: Option<i64>,

        /// `[[[DD:]HH:]MM:]SS`
        #[arg(long)]
        walltime: Option<String>,
    },

    /// Resubmit finished auto jobs
    Continue {
        #[arg(required_unless_present = "all")]
        job_ids: Vec<String>,

        /// Every eligible job
        #[arg(long, conflicts_with = "job_ids")]
        all: bool,
    },

    /// Cancel jobs and mark them aborted
    Abort {
        #[arg(required = true)]
        job_ids: Vec<String>,
    },

    /// Cancel jobs and remove them from the database
    Delete {
        #[arg(required = true)]
        job_ids: Vec<String>,

        /// Delete the whole series of each job
        #[arg(long)]
        series: bool,
    },

    /// Mark a job as failed (default: the job this runs inside)
    Error {
        job_id: Option<String>,

        #[arg(long, short = 'm')]
        message: String,
    },

    /// Put aborted or failed auto jobs back to incomplete
    Reset {
        #[arg(required = true)]
        job_ids: Vec<String>,
    },

    /// Mark a job as complete (default: the job this runs inside)
    Complete { job_id: Option<String> },
}

type Tracker = JobDb<CommandScheduler>;

fn main() -> anyhow::Result<()> {
    env_logger::init();
    info!("terve! starting up :)");
    let cli = Cli::parse();

    let dir = match cli.dir {
        Some(dir) => dir,
        None => default_dir()?,
    };
    let paths = StorePaths::new(&dir);
    paths
        .create()
        .with_context(|| format!("creating {}", dir.display()))?;
    let config = Config::load_or_init(&paths.config)
        .with_context(|| format!("reading {}", paths.config.display()))?;

    let identity = Identity::detect();
    let dialect = cli.dialect.unwrap_or(config.software);
    let scheduler = CommandScheduler::new(dialect, config.command_timeout(), &identity.user_name);
    let mut db = JobDb::open(&paths.db, config.busy_timeout(), scheduler, identity)
        .with_context(|| format!("opening {}", paths.db.display()))?;

    let out = &mut io::stdout().lock();
    run(&mut db, &config, cli.command, out)
}

fn run(db: &mut Tracker, config: &Config, command: Commands, out: &mut impl Write) -> anyhow::Result<()> {
    let policy = config.retry;
    match command {
        Commands::Status { active, output } => {
            let reconciled = on_conflict(policy, || db.reconcile()).context("updating from the scheduler")?;
            let selection = if active { Selection::Active } else { Selection::All };
            writeln!(out, "Tracked:")?;
            print_selection(db, &selection, output, out)?;
            if !reconciled.untracked.is_empty() {
                writeln!(out, "\nUntracked:")?;
                report::write_untracked(out, output.layout(), db.untracked())?;
            }
        }
        Commands::Show { job_ids, output } => {
            if output.series {
                let series = job_ids
                    .iter()
                    .map(|id| db.series(id))
                    .collect::<seuranta::Result<Vec<_>>>()?;
                report::write_series(out, output.layout(), &series)?;
            } else {
                let jobs = job_ids
                    .iter()
                    .map(|id| db.get(id))
                    .collect::<seuranta::Result<Vec<_>>>()?;
                report::write_jobs(out, output.layout(), &jobs)?;
            }
        }
        Commands::Select { active, range, recent, field, output } => {
            let selection = if let Some(range) = range {
                parse_range(&range)?
            } else if let Some(recent) = recent {
                Selection::Recent { seconds: walltime::seconds(&recent)? }
            } else if let Some(field) = field {
                let Some((key, pattern)) = field.split_once('=') else {
                    bail!("--field takes FIELD=REGEX, got {field:?}");
                };
                Selection::field(key, pattern)?
            } else if active {
                Selection::Active
            } else {
                Selection::All
            };
            print_selection(db, &selection, output, out)?;
        }
        Commands::Submit { script, name, run_dir, auto, nodes, procs, walltime: limit } => {
            let submit_script = fs::read_to_string(&script)
                .with_context(|| format!("reading {}", script.display()))?;
            let run_dir = match run_dir {
                Some(dir) => dir,
                None => std::env::current_dir()?,
            };
            let job_name = name.unwrap_or_else(|| {
                script
                    .file_stem()
                    .map(|stem| stem.to_string_lossy().into_owned())
                    .unwrap_or_else(|| "job".to_string())
            });
            let job = NewJob {
                job_name,
                run_dir,
                submit_script,
                auto,
                nodes,
                procs,
                walltime: limit.as_deref().map(walltime::seconds).transpose()?,
            };
            let record = db.submit(&job)?;
            writeln!(out, "{}", record.job_id)?;
        }
        Commands::Continue { job_ids, all } => {
            let continued = if all {
                on_conflict(policy, || db.continue_all())?
            } else {
                let mut continued = Vec::new();
                for job_id in job_ids {
                    let new_id = on_conflict(policy, || db.continue_job(&job_id))?;
                    continued.push((job_id, new_id));
                }
                continued
            };
            for (old, new) in continued {
                writeln!(out, "{old} -> {new}")?;
            }
        }
        Commands::Abort { job_ids } => {
            for job_id in job_ids {
                on_conflict(policy, || db.abort_job(&job_id))?;
            }
        }
        Commands::Delete { job_ids, series } => {
            for job_id in job_ids {
                if series {
                    let deleted = on_conflict(policy, || db.delete_series(&job_id))?;
                    writeln!(out, "Deleted {}", deleted.join(" "))?;
                } else {
                    on_conflict(policy, || db.delete_job(&job_id))?;
                }
            }
        }
        Commands::Error { job_id, message } => match job_id {
            Some(job_id) => on_conflict(policy, || db.error_job(&job_id, &message))?,
            None => {
                on_conflict(policy, || db.error_current(&message))?;
            }
        },
        Commands::Reset { job_ids } => {
            for job_id in job_ids {
                on_conflict(policy, || db.reset_job(&job_id))?;
            }
        }
        Commands::Complete { job_id } => match job_id {
            Some(job_id) => on_conflict(policy, || db.complete_job(&job_id))?,
            None => {
                on_conflict(policy, || db.complete_current())?;
            }
        },
    }
    Ok(())
}

fn print_selection(db: &Tracker, selection: &Selection, output: Output, out: &mut impl Write) -> anyhow::Result<()> {
    if output.series {
        let series = db
            .select_series(selection)?
            .iter()
            .map(|ids| ids.iter().map(|id| db.get(id)).collect())
            .collect::<seuranta::Result<Vec<Vec<JobRecord>>>>()?;
        report::write_series(out, output.layout(), &series)?;
    } else {
        let jobs = db
            .select(selection)?
            .iter()
            .map(|id| db.get(id))
            .collect::<seuranta::Result<Vec<_>>>()?;
        report::write_jobs(out, output.layout(), &jobs)?;
    }
    Ok(())
}

fn parse_range(range: &str) -> anyhow::Result<Selection> {
    let bound = |text: &str| {
        text.trim()
            .parse::<i64>()
            .with_context(|| format!("--range takes MIN-MAX job ids, got {range:?}"))
    };
    let (min, max) = match range.split_once('-') {
        Some((min, max)) => (bound(min)?, bound(max)?),
        None => (bound(range)?, bound(range)?),
    };
    Ok(Selection::Range { min, max })
}

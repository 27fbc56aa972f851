// EnrolSift - main.rs
//
// Command-line entry point. Handles:
// 1. CLI argument parsing
// 2. config.toml loading and logging initialisation (debug mode support)
// 3. Dispatch to filtering, option listing and saved configuration commands

use chrono::NaiveDate;
use clap::{Args, Parser, Subcommand, ValueEnum};
use enrolsift::app::repository::{
    ConfigRepository, DeleteOutcome, SavedConfiguration, StoreLayout,
};
use enrolsift::app::session::{self, FilterSession};
use enrolsift::app::store::FileBackend;
use enrolsift::core::date::DateRange;
use enrolsift::core::export;
use enrolsift::core::filter::{Categorical, DateField, FilterState, PresenceField, PresenceMode};
use enrolsift::core::model::{meaningful, Record};
use enrolsift::core::options::FilterOptions;
use enrolsift::platform::config::{self, AppConfig, PlatformPaths};
use enrolsift::util::{self, constants, error::ExportError, error::SiftError};
use serde_json::{json, Map, Value};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

/// EnrolSift - faceted filtering and saved queries for student enrolment records.
///
/// Filters an exported record collection by any combination of facets and
/// manages named filter configurations shared across a team.
#[derive(Parser, Debug)]
#[command(name = "enrolsift", version, about)]
struct Cli {
    /// Config file (default: config.toml in the platform config directory).
    #[arg(short = 'c', long = "config", global = true)]
    config: Option<PathBuf>,

    /// Store document (overrides [store] path).
    #[arg(short = 's', long = "store", global = true)]
    store: Option<PathBuf>,

    /// Enable debug logging (equivalent to RUST_LOG=debug).
    #[arg(short = 'd', long = "debug", global = true)]
    debug: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Filter a record collection and print the matching records.
    Filter(FilterCommand),

    /// List the selectable values of every facet.
    Options {
        /// Exported record collection (JSON).
        #[arg(short = 'r', long = "records")]
        records: PathBuf,

        /// Print JSON instead of text.
        #[arg(long = "json")]
        json: bool,
    },

    /// Manage saved filter configurations.
    #[command(subcommand)]
    Configs(ConfigsCommand),

    /// Manage the team member directory.
    #[command(subcommand)]
    Members(MembersCommand),
}

#[derive(Args, Debug)]
struct FilterCommand {
    /// Exported record collection (JSON).
    #[arg(short = 'r', long = "records")]
    records: PathBuf,

    /// Start from a saved configuration (own or shared) before applying flags.
    #[arg(long = "saved", requires = "owner")]
    saved: Option<String>,

    /// Caller's owner id (needed with --saved).
    #[arg(long = "owner")]
    owner: Option<String>,

    #[command(flatten)]
    facets: FacetArgs,

    /// Output format.
    #[arg(short = 'f', long = "format", value_enum, default_value_t = OutputFormat::Table)]
    format: OutputFormat,

    /// Write output to a file instead of stdout.
    #[arg(short = 'o', long = "output")]
    output: Option<PathBuf>,
}

/// Facet selections. Repeat a flag to select several values.
#[derive(Args, Debug, Default)]
struct FacetArgs {
    /// Free-text search across names, codes, terms and statuses.
    #[arg(long = "search")]
    search: Option<String>,

    #[arg(long = "course")]
    course: Vec<String>,
    #[arg(long = "work-items")]
    work_items: Vec<String>,
    #[arg(long = "student-type")]
    student_type: Vec<String>,
    #[arg(long = "active-status")]
    active_status: Vec<String>,
    #[arg(long = "diploma-month")]
    diploma_month: Vec<String>,
    #[arg(long = "status-value")]
    status_value: Vec<String>,
    #[arg(long = "payment-status")]
    payment_status: Vec<String>,
    #[arg(long = "approved")]
    approved: Vec<String>,
    #[arg(long = "deleted")]
    deleted: Vec<String>,
    #[arg(long = "dual-enrolment")]
    dual_enrolment: Vec<String>,
    #[arg(long = "school-enrolment")]
    school_enrolment: Vec<String>,
    #[arg(long = "pasi-status")]
    pasi_status: Vec<String>,
    #[arg(long = "pasi-work-items")]
    pasi_work_items: Vec<String>,
    #[arg(long = "pasi-term")]
    pasi_term: Vec<String>,

    /// Require the field to be present.
    #[arg(long = "has", value_enum)]
    has: Vec<PresenceArg>,

    /// Require the field to be absent.
    #[arg(long = "missing", value_enum)]
    missing: Vec<PresenceArg>,

    /// Start date range (YYYY-MM-DD, inclusive).
    #[arg(long = "start-from")]
    start_from: Option<NaiveDate>,
    #[arg(long = "start-to")]
    start_to: Option<NaiveDate>,
    #[arg(long = "assigned-from")]
    assigned_from: Option<NaiveDate>,
    #[arg(long = "assigned-to")]
    assigned_to: Option<NaiveDate>,
    #[arg(long = "resuming-from")]
    resuming_from: Option<NaiveDate>,
    #[arg(long = "resuming-to")]
    resuming_to: Option<NaiveDate>,
    #[arg(long = "schedule-end-from")]
    schedule_end_from: Option<NaiveDate>,
    #[arg(long = "schedule-end-to")]
    schedule_end_to: Option<NaiveDate>,

    /// Start month ("09" or "9"), matched against startDateFormatted.
    #[arg(long = "month")]
    month: Vec<String>,

    /// Registration date range.
    #[arg(long = "registered-from")]
    registered_from: Option<NaiveDate>,
    #[arg(long = "registered-to")]
    registered_to: Option<NaiveDate>,

    /// Active students still waiting for a grade.
    #[arg(long = "awaiting-grade")]
    awaiting_grade: bool,
}

#[derive(Subcommand, Debug)]
enum ConfigsCommand {
    /// List the caller's saved configurations.
    List {
        #[arg(long = "owner")]
        owner: String,
    },

    /// List every other team member's configurations.
    Shared {
        #[arg(long = "owner")]
        owner: String,
    },

    /// Save a filter configuration.
    Save {
        #[arg(long = "owner")]
        owner: String,

        #[arg(long = "name")]
        name: String,

        #[command(flatten)]
        facets: FacetArgs,
    },

    /// Print a configuration's filters as JSON.
    Show {
        #[arg(long = "owner")]
        owner: String,

        #[arg(long = "id")]
        id: String,
    },

    /// Delete one of the caller's configurations.
    Delete {
        #[arg(long = "owner")]
        owner: String,

        #[arg(long = "id")]
        id: String,
    },
}

#[derive(Subcommand, Debug)]
enum MembersCommand {
    /// Add or rename a team member.
    Add {
        #[arg(long = "owner")]
        owner: String,

        #[arg(long = "name")]
        name: String,
    },

    /// List team members.
    List,
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
enum OutputFormat {
    Table,
    Json,
    Csv,
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
enum PresenceArg {
    Grade,
    Com1255,
    Inf2020,
    Asn,
}

impl From<PresenceArg> for PresenceField {
    fn from(arg: PresenceArg) -> Self {
        match arg {
            PresenceArg::Grade => PresenceField::Grade,
            PresenceArg::Com1255 => PresenceField::Com1255,
            PresenceArg::Inf2020 => PresenceField::Inf2020,
            PresenceArg::Asn => PresenceField::Asn,
        }
    }
}

impl FacetArgs {
    /// Layer these flags over `base`. Facets without a flag keep their value.
    fn apply(&self, base: FilterState) -> FilterState {
        let mut state = if self.awaiting_grade {
            FilterState::awaiting_grade()
        } else {
            base
        };

        if let Some(ref term) = self.search {
            state = state.with_search(term.clone());
        }

        let selections = [
            (Categorical::Course, &self.course),
            (Categorical::WorkItems, &self.work_items),
            (Categorical::StudentType, &self.student_type),
            (Categorical::ActiveStatus, &self.active_status),
            (Categorical::DiplomaMonth, &self.diploma_month),
            (Categorical::StatusValue, &self.status_value),
            (Categorical::PaymentStatus, &self.payment_status),
            (Categorical::Approved, &self.approved),
            (Categorical::Deleted, &self.deleted),
            (Categorical::DualEnrolment, &self.dual_enrolment),
            (Categorical::SchoolEnrolment, &self.school_enrolment),
            (Categorical::PasiStatus, &self.pasi_status),
            (Categorical::PasiWorkItems, &self.pasi_work_items),
            (Categorical::PasiTerm, &self.pasi_term),
        ];
        for (facet, values) in selections {
            if !values.is_empty() {
                state = state.with_selection(facet, values.iter().cloned());
            }
        }

        for field in &self.has {
            state = state.with_flag((*field).into(), PresenceMode::Has, true);
        }
        for field in &self.missing {
            state = state.with_flag((*field).into(), PresenceMode::Missing, true);
        }

        let ranges = [
            (DateField::StartDate, self.start_from, self.start_to),
            (DateField::AssignmentDate, self.assigned_from, self.assigned_to),
            (DateField::ResumingOnDate, self.resuming_from, self.resuming_to),
            (DateField::ScheduleEndDate, self.schedule_end_from, self.schedule_end_to),
        ];
        for (field, from, to) in ranges {
            if from.is_some() || to.is_some() {
                state = state.with_date_range(field, DateRange::days(from, to));
            }
        }

        if !self.month.is_empty() {
            state = state.with_months(&self.month);
        }

        if self.registered_from.is_some() || self.registered_to.is_some() {
            state = state.with_registration_range(DateRange::days(
                self.registered_from,
                self.registered_to,
            ));
        }

        state
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    // Resolve platform paths and load config before logging so the
    // configured level and file apply from the first line.
    let platform_paths = PlatformPaths::resolve();
    let (app_config, warnings) = match cli.config.as_deref() {
        Some(path) => match config::load_config_file(path) {
            Ok(loaded) => loaded,
            Err(e) => {
                eprintln!("error: {}", SiftError::from(e));
                return ExitCode::FAILURE;
            }
        },
        None => config::load_config(&platform_paths.config_file()),
    };

    util::logging::init(
        cli.debug,
        app_config.log_level.as_deref(),
        app_config.log_file.as_deref(),
    );

    tracing::info!(
        version = constants::APP_VERSION,
        debug = cli.debug,
        "EnrolSift starting"
    );
    for warning in &warnings {
        tracing::warn!("{}", warning);
    }

    let store_path = cli
        .store
        .clone()
        .or_else(|| app_config.store_path.clone())
        .unwrap_or_else(|| platform_paths.store_file());

    match run(cli.command, &app_config, &store_path) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(error = %e, "Command failed");
            eprintln!("error: {e}");
            ExitCode::FAILURE
        }
    }
}

fn run(command: Command, app_config: &AppConfig, store_path: &Path) -> util::error::Result<()> {
    match command {
        Command::Filter(cmd) => run_filter(cmd, app_config, store_path),
        Command::Options { records, json } => {
            let records = session::load_records(&records)?;
            let session = FilterSession::new(records);
            print_options(session.options(), json)
        }
        Command::Configs(cmd) => run_configs(cmd, &open_repository(app_config, store_path)?),
        Command::Members(cmd) => {
            let repo = open_repository(app_config, store_path)?;
            match cmd {
                MembersCommand::Add { owner, name } => {
                    repo.register_member(&owner, &name)?;
                    println!("Registered {owner} as \"{}\"", name.trim());
                }
                MembersCommand::List => {
                    for (id, name) in repo.members()? {
                        println!("{id}\t{name}");
                    }
                }
            }
            Ok(())
        }
    }
}

fn open_repository(
    app_config: &AppConfig,
    store_path: &Path,
) -> util::error::Result<ConfigRepository> {
    let backend = FileBackend::open(store_path)?;
    tracing::debug!(path = %store_path.display(), "Store opened");
    let layout = StoreLayout {
        owner_namespace: app_config.owner_namespace.clone(),
        dataset_key: app_config.dataset_key.clone(),
        owner_directory: app_config.owner_directory.clone(),
    };
    Ok(ConfigRepository::new(Arc::new(backend), layout))
}

fn run_filter(
    cmd: FilterCommand,
    app_config: &AppConfig,
    store_path: &Path,
) -> util::error::Result<()> {
    let records = session::load_records(&cmd.records)?;
    let mut session =
        FilterSession::new(records).with_max_search_chars(app_config.max_search_term_chars);

    let base = match (&cmd.saved, &cmd.owner) {
        (Some(id), Some(owner)) => {
            let repo = open_repository(app_config, store_path)?;
            let config = repo.find(owner, id)?;
            tracing::info!(
                config_id = %config.id,
                name = %config.name,
                "Starting from saved configuration"
            );
            repo.load(&config)
        }
        _ => FilterState::default(),
    };
    session.set_state(cmd.facets.apply(base));

    let filtered = session.filtered();
    tracing::info!(
        total = session.records().len(),
        matched = filtered.len(),
        active_facets = session.active_count(),
        "Filter applied"
    );

    let display_path = cmd
        .output
        .clone()
        .unwrap_or_else(|| PathBuf::from("<stdout>"));
    let writer: Box<dyn Write> = match cmd.output.as_deref() {
        Some(path) => Box::new(std::fs::File::create(path).map_err(|e| ExportError::Io {
            path: path.to_path_buf(),
            source: e,
        })?),
        None => Box::new(std::io::stdout().lock()),
    };

    match cmd.format {
        OutputFormat::Csv => {
            export::export_csv(&filtered, writer, &display_path)?;
        }
        OutputFormat::Json => {
            export::export_json(&filtered, writer, &display_path)?;
        }
        OutputFormat::Table => {
            let active: Vec<String> = session
                .outcome()
                .active_facets
                .iter()
                .map(ToString::to_string)
                .collect();
            write_table(writer, &filtered, session.records().len(), &active).map_err(|e| {
                ExportError::Io {
                    path: display_path.clone(),
                    source: e,
                }
            })?;
        }
    }
    Ok(())
}

fn write_table(
    mut out: impl Write,
    records: &[&Record],
    total: usize,
    active: &[String],
) -> std::io::Result<()> {
    let cell = |v: &Option<String>| meaningful(v.as_deref()).unwrap_or("-").to_string();
    for record in records {
        writeln!(
            out,
            "{:<28} {:<10} {:<12} {:<8} {:<14} {}",
            cell(&record.student_name),
            cell(&record.asn),
            cell(&record.course_code),
            cell(&record.value),
            cell(&record.status),
            cell(&record.active_future_archived),
        )?;
    }
    writeln!(out)?;
    if active.is_empty() {
        writeln!(out, "{} of {total} records (no filters active)", records.len())?;
    } else {
        writeln!(
            out,
            "{} of {total} records, {} active filters: {}",
            records.len(),
            active.len(),
            active.join(", ")
        )?;
    }
    out.flush()
}

fn print_options(options: &FilterOptions, as_json: bool) -> util::error::Result<()> {
    if as_json {
        let mut facets = Map::new();
        for facet in Categorical::all() {
            facets.insert(facet.label().to_string(), json!(options.facet(*facet)));
        }
        let document = json!({
            "facets": Value::Object(facets),
            "months": options.months,
            "aggregates": options.aggregates,
        });
        serde_json::to_writer_pretty(std::io::stdout().lock(), &document).map_err(|e| {
            ExportError::Json {
                path: PathBuf::from("<stdout>"),
                source: e,
            }
        })?;
        println!();
        return Ok(());
    }

    for facet in Categorical::all() {
        let facet_options = options.facet(*facet);
        if facet_options.values.is_empty() {
            continue;
        }
        println!("{}:", facet.label());
        for value in &facet_options.values {
            println!("  {value} ({})", facet_options.count(value));
        }
    }
    if !options.months.values.is_empty() {
        println!("Start month:");
        for month in &options.months.values {
            println!("  {month} ({})", options.months.count(month));
        }
    }
    let a = &options.aggregates;
    println!(
        "Records: {}  with grade: {}  with COM1255: {}  with INF2020: {}  missing ASN: {}",
        a.total_records, a.with_grade, a.with_com1255, a.with_inf2020, a.missing_asn
    );
    Ok(())
}

fn run_configs(cmd: ConfigsCommand, repo: &ConfigRepository) -> util::error::Result<()> {
    match cmd {
        ConfigsCommand::List { owner } => print_configs(&repo.list(&owner)?),
        ConfigsCommand::Shared { owner } => print_configs(&repo.list_shared(&owner)?),
        ConfigsCommand::Save {
            owner,
            name,
            facets,
        } => {
            let state = facets.apply(FilterState::default());
            let id = repo.save(&owner, &name, &state)?;
            println!("Saved \"{}\" as {id} ({} active filters)", name.trim(), state.active_count());
        }
        ConfigsCommand::Show { owner, id } => {
            let config = repo.find(&owner, &id)?;
            let document = serde_json::to_string_pretty(&config).map_err(|e| ExportError::Json {
                path: PathBuf::from("<stdout>"),
                source: e,
            })?;
            println!("{document}");
        }
        ConfigsCommand::Delete { owner, id } => match repo.delete(&owner, &id)? {
            DeleteOutcome::Deleted => println!("Deleted {id}"),
            DeleteOutcome::NotOwned => {
                println!("Nothing deleted: {owner} has no configuration {id}")
            }
        },
    }
    Ok(())
}

fn print_configs(configs: &[SavedConfiguration]) {
    if configs.is_empty() {
        println!("No saved configurations");
        return;
    }
    for config in configs {
        let saved = chrono::DateTime::from_timestamp_millis(config.timestamp)
            .map(|d| d.format("%Y-%m-%d %H:%M").to_string())
            .unwrap_or_default();
        let owner = config.owner_name.as_deref().unwrap_or(&config.owner);
        let active = config.filters.clone().into_state().active_count();
        println!("{}\t{saved}\t{owner}\t{active} filters\t{}", config.id, config.name);
    }
}

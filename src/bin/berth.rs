//! Command-line front end for exploring offer rows and back-to-back chains.
#![forbid(unsafe_code)]

use std::error::Error;
use std::path::PathBuf;

use berth::{
    chain::{connection, ChainBuilder, JsonChainSink, LinkPolicy},
    config::EngineConfig,
    dataset::{NoItineraries, Snapshot},
    filter::{FilterEngine, MemoryFilterStore, Operator},
    import::load_rows,
    index::{fields::FieldKey, StaticStep, ValueSource},
    types::{ProfileKey, RowId},
};
use clap::{ArgAction, Args, Parser, Subcommand, ValueEnum};
use serde::Serialize;
use serde_json::json;
use thiserror::Error;
use tracing::debug;
use tracing_subscriber::{fmt, EnvFilter};

#[derive(Parser, Debug)]
#[command(
    name = "berth",
    version,
    about = "Filter offer rows and explore back-to-back chains",
    disable_help_subcommand = true
)]
struct Cli {
    #[arg(long, global = true, value_name = "FILE", help = "Engine configuration file (TOML)")]
    config: Option<PathBuf>,

    #[arg(long, global = true, value_name = "NAME", help = "Profile owning the session")]
    profile: Option<String>,

    #[arg(
        long,
        global = true,
        value_enum,
        default_value_t = OutputFormat::Text,
        help = "Output format for structured responses"
    )]
    format: OutputFormat,

    #[command(subcommand)]
    command: Command,
}

#[derive(Args, Debug)]
struct RowsArg {
    #[arg(long, value_name = "FILE", help = "Row file (.json or .csv)")]
    rows: PathBuf,
}

#[derive(Args, Debug)]
struct WhereArgs {
    #[arg(
        long = "where",
        value_name = "CLAUSE",
        action = ArgAction::Append,
        help = "Committed predicate, e.g. \"ship in Oasis,Icon\" or \"price less than 900\" (repeatable)"
    )]
    clauses: Vec<String>,

    #[arg(long, help = "Include taxes and fees in price comparisons")]
    include_taxes: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    #[command(about = "List the distinct values of a field among the filtered rows")]
    Values {
        #[command(flatten)]
        rows: RowsArg,

        #[arg(long, value_name = "FIELD", help = "Field key, e.g. ship or sailDate")]
        field: String,

        #[command(flatten)]
        filter: WhereArgs,
    },

    #[command(about = "Print the rows passing the given predicates")]
    Filter {
        #[command(flatten)]
        rows: RowsArg,

        #[command(flatten)]
        filter: WhereArgs,
    },

    #[command(about = "Rank the rows that can follow a chain prefix")]
    Chains {
        #[command(flatten)]
        rows: RowsArg,

        #[arg(long, value_name = "ID", help = "Root row id")]
        root: String,

        #[arg(
            long = "leg",
            value_name = "ID",
            action = ArgAction::Append,
            help = "Row appended after the root (repeatable, in order)"
        )]
        legs: Vec<String>,

        #[arg(long, help = "Allow connections onto a different ship in the same port")]
        side_by_side: bool,

        #[arg(long, value_name = "FILE", help = "Save the chain as a JSON line to FILE")]
        save: Option<PathBuf>,
    },

    #[command(about = "Check whether row B can directly follow row A")]
    Linkable {
        #[command(flatten)]
        rows: RowsArg,

        #[arg(value_name = "A")]
        from: String,

        #[arg(value_name = "B")]
        to: String,

        #[arg(long, help = "Allow connections onto a different ship in the same port")]
        side_by_side: bool,
    },
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
enum OutputFormat {
    Text,
    Json,
}

#[derive(Debug, Error)]
enum CliError {
    #[error("invalid --where clause '{clause}': {reason}")]
    Where { clause: String, reason: String },
    #[error("unknown field '{0}'")]
    UnknownField(String),
    #[error("row '{0}' is not in the row file")]
    UnknownRow(String),
}

#[derive(Debug, PartialEq)]
struct Clause {
    field: FieldKey,
    operator: Operator,
    values: Vec<String>,
}

fn main() {
    install_tracing_subscriber();
    if let Err(err) = run() {
        eprintln!("error: {err}");
        std::process::exit(1);
    }
}

fn install_tracing_subscriber() {
    let filter = EnvFilter::try_from_env("BERTH_LOG")
        .or_else(|_| EnvFilter::try_from_default_env())
        .unwrap_or_else(|_| EnvFilter::new("warn"));
    let _ = fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

fn run() -> Result<(), Box<dyn Error>> {
    let cli = Cli::parse();
    let config = EngineConfig::load(cli.config.clone())?;
    let profile = ProfileKey(
        cli.profile
            .clone()
            .or_else(|| config.default_profile.clone())
            .unwrap_or_else(|| "default".to_owned()),
    );
    debug!(profile = %profile, config = ?config.path(), "cli.start");

    match cli.command {
        Command::Values { rows, field, filter } => {
            let field = FieldKey::parse(&field).ok_or(CliError::UnknownField(field))?;
            let snap = load_snapshot(&rows)?;
            let mut engine = filter_engine(&profile, &config, &filter)?;
            if filter.clauses.is_empty() {
                build_static_index(&mut engine, &snap)?;
            }
            let suggestions = engine.suggestions(&snap, field, &NoItineraries);
            let source = match suggestions.source {
                ValueSource::Static => "static",
                ValueSource::Dynamic => "dynamic",
            };
            let values = suggestions.values.all();
            let report = json!({ "field": field.as_str(), "source": source, "values": values });
            emit(cli.format, &report, || {
                for value in values {
                    println!("{value}");
                }
            })?;
        }
        Command::Filter { rows, filter } => {
            let snap = load_snapshot(&rows)?;
            let engine = filter_engine(&profile, &config, &filter)?;
            let matched = engine.evaluate(&snap, &NoItineraries);
            emit(cli.format, &matched, || {
                for row in &matched {
                    println!(
                        "{}\t{}\t{}\t{}",
                        row.id, row.offer.code, row.sailing.ship_name, row.sailing.sail_date
                    );
                }
                println!("{} of {} rows", matched.len(), snap.len());
            })?;
        }
        Command::Chains {
            rows,
            root,
            legs,
            side_by_side,
            save,
        } => {
            let snap = load_snapshot(&rows)?;
            let mut builder = ChainBuilder::new(profile, &config.options);
            builder.set_allow_side_by_side(&snap, side_by_side)?;
            builder.open(&snap, &RowId(root))?;
            for leg in legs {
                builder.select_option(&snap, &RowId(leg))?;
            }
            let reach = builder.reach(&snap)?;
            let candidates = builder.candidates(&snap)?;
            let chain: Vec<String> = builder.chain().iter().map(|id| id.0.clone()).collect();
            let saved = match save {
                Some(path) => Some(builder.save(&snap, &mut JsonChainSink::new(path))?),
                None => None,
            };
            let report = json!({
                "chain": chain,
                "reach": reach,
                "candidates": candidates.all(),
                "saved": saved.as_ref().map(|s| json!({ "id": s.id, "legs": s.leg_count })),
            });
            emit(cli.format, &report, || {
                println!("chain: {} (reach {reach})", chain.join(" -> "));
                for cand in candidates.all() {
                    println!(
                        "  {}\t{}\t{}\tdepth={}",
                        cand.row_id,
                        cand.offer_code,
                        cand.tier.as_str(),
                        cand.depth
                    );
                }
                if let Some(saved) = &saved {
                    println!("saved {} ({} legs)", saved.id, saved.leg_count);
                }
            })?;
        }
        Command::Linkable {
            rows,
            from,
            to,
            side_by_side,
        } => {
            let snap = load_snapshot(&rows)?;
            let a = snap
                .position(&RowId(from.clone()))
                .ok_or_else(|| CliError::UnknownRow(from.clone()))?;
            let b = snap
                .position(&RowId(to.clone()))
                .ok_or_else(|| CliError::UnknownRow(to.clone()))?;
            let link = connection(snap.meta(a), snap.meta(b), LinkPolicy::new(side_by_side));
            let report = json!({ "from": from, "to": to, "linkable": link.is_some(), "connection": link });
            emit(cli.format, &report, || match link {
                Some(conn) => println!("{from} -> {to}: linkable ({})", conn.as_str()),
                None => println!("{from} -> {to}: not linkable"),
            })?;
        }
    }

    Ok(())
}

fn load_snapshot(arg: &RowsArg) -> Result<Snapshot, Box<dyn Error>> {
    let rows = load_rows(&arg.rows)?;
    Ok(Snapshot::from_rows(rows))
}

fn filter_engine(profile: &ProfileKey, config: &EngineConfig, args: &WhereArgs) -> Result<FilterEngine, Box<dyn Error>> {
    let store = MemoryFilterStore::default();
    let mut engine = FilterEngine::new(profile.clone(), config.options.clone(), Box::new(store));
    engine.enable();
    engine.set_include_taxes(args.include_taxes);
    for raw in &args.clauses {
        let clause = parse_where(raw)?;
        let id = engine.add_predicate(clause.field)?;
        engine.set_operator(id, clause.operator)?;
        engine.set_values(id, &clause.values)?;
        engine.commit(id)?;
    }
    Ok(engine)
}

fn build_static_index(engine: &mut FilterEngine, snap: &Snapshot) -> Result<(), Box<dyn Error>> {
    engine.observe_snapshot(snap);
    while !engine.has_static_index(snap) {
        let report = engine.tick(snap)?;
        if report.static_step != Some(StaticStep::Pending) {
            break;
        }
    }
    Ok(())
}

/// Parses `<field> <operator> <v1>,<v2>,...`. Operators may span two words.
fn parse_where(raw: &str) -> Result<Clause, CliError> {
    let invalid = |reason: &str| CliError::Where {
        clause: raw.to_owned(),
        reason: reason.to_owned(),
    };
    let (field_raw, rest) = split_word(raw);
    let field = FieldKey::parse(field_raw).ok_or_else(|| invalid("unknown field"))?;
    let (first, after_first) = split_word(rest);
    let (second, after_second) = split_word(after_first);
    let (operator, values_raw) = match Operator::parse(&format!("{first}{second}")) {
        Some(op) if !second.is_empty() => (op, after_second),
        _ => (
            Operator::parse(first).ok_or_else(|| invalid("unknown operator"))?,
            after_first,
        ),
    };
    let values = split_list(values_raw, ',');
    if values.is_empty() {
        return Err(invalid("no values"));
    }
    Ok(Clause {
        field,
        operator,
        values,
    })
}

fn split_word(input: &str) -> (&str, &str) {
    let input = input.trim_start();
    match input.find(char::is_whitespace) {
        Some(idx) => (&input[..idx], input[idx..].trim_start()),
        None => (input, ""),
    }
}

fn split_list(input: &str, delim: char) -> Vec<String> {
    input
        .split(delim)
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .map(|s| s.to_string())
        .collect()
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

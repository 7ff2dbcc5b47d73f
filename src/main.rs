use anyhow::Result;
use clap::{arg, crate_name, crate_version, ArgAction, ArgGroup, ArgMatches, Command};
use ftpaudit::{
    error::AuditError,
    logger,
    scan::{Orchestrator, ScanResult},
};
use pad::PadStr;

struct ParsedArgs {
    debug: bool,
    workers: usize,
    targets: Vec<String>,
}

fn split_target_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(String::from)
        .collect()
}

fn read_target_file(path: &str) -> Result<Vec<String>, AuditError> {
    let contents = std::fs::read_to_string(path)
        .map_err(|e| AuditError::TargetFileUnreadable(path.into(), e))?;

    Ok(contents
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .map(String::from)
        .collect())
}

fn parse_args(matches: ArgMatches) -> Result<ParsedArgs, AuditError> {
    let debug = matches.get_flag("debug");

    let workers = *matches.get_one::<usize>("workers").unwrap();
    if workers == 0 {
        return Err(AuditError::InvalidWorkerCount);
    }

    let targets = match matches.get_one::<String>("file") {
        Some(path) => read_target_file(path)?,
        None => split_target_list(matches.get_one::<String>("targets").unwrap()),
    };
    if targets.is_empty() {
        return Err(AuditError::MissingTargets);
    }

    Ok(ParsedArgs {
        debug,
        workers,
        targets,
    })
}

fn print_results(results: &[ScanResult]) {
    let mut out = format!(
        "\n{}{}{}Duration\n",
        "Target".pad_to_width(26),
        "Status".pad_to_width(21),
        "Findings".pad_to_width(10),
    );

    results.iter().for_each(|r| {
        out.push_str(&format!(
            "{}{}{}{:.2}s\n",
            r.target.pad_to_width(26),
            r.status.to_string().pad_to_width(21),
            r.findings.len().to_string().pad_to_width(10),
            r.elapsed.as_secs_f32(),
        ))
    });

    out.push_str("\nScan completed. Check the generated .txt files for results.\n");

    print!("{}", out);
}

fn main() -> Result<()> {
    let arg_matches = Command::new(crate_name!())
        .about(
            "Audits the security posture of FTP services: reachability,\n\
            banner, anonymous access, default credentials and FTPS support.\n\
            For authorized assessments only.",
        )
        .version(crate_version!())
        .arg_required_else_help(true)
        .args([
            // Miscellaneous arguments.
            arg!(-d --debug "Turns on debugging information").action(ArgAction::SetTrue),
            arg!(-w --workers <N> "Hosts scanned in parallel")
                .required(false)
                .value_parser(clap::value_parser!(usize))
                .default_value("5"),
        ])
        .args([
            // Target sources.
            arg!(-f --file <FILE> "File with one address or hostname per line").required(false),
            arg!([targets] "Addresses or hostnames separated by a comma"),
        ])
        .group(ArgGroup::new("input").args(["file", "targets"]).required(true))
        .get_matches();

    // Extract arguments.
    let parsed = parse_args(arg_matches)?;

    // Set debug if desired.
    if parsed.debug {
        logger::init();
    }

    // Scan every target to completion.
    let results = Orchestrator::new(parsed.targets, parsed.workers).start()?;

    // Show the per-host summary.
    print_results(&results);

    Ok(())
}

//! Detour rule file linter CLI
//!
//! Validates redirect rule files before they are deployed next to the proxy.
//!
//! Usage:
//!   detour-lint <directory_or_file> [OPTIONS]

use clap::{Parser, ValueEnum};
use detour_lint::{lint_directory, LintIssue, LintOptions, LintResult, Severity};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

// ANSI color codes
const GREEN: &str = "\x1b[32m";
const RED: &str = "\x1b[31m";
const YELLOW: &str = "\x1b[33m";
const CYAN: &str = "\x1b[36m";
const BOLD: &str = "\x1b[1m";
const DIM: &str = "\x1b[2m";
const RESET: &str = "\x1b[0m";

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Output {
    Text,
    Json,
}

/// Detour rule file linter
#[derive(Parser, Debug)]
#[command(name = "detour-lint")]
#[command(author, version, about = "Validate redirect rule files for the detour proxy")]
struct Args {
    /// Rule file, or directory holding one rule file per site
    #[arg(required = true)]
    path: PathBuf,

    /// Output format
    #[arg(short, long, value_enum, default_value = "text")]
    output: Output,

    /// Only show errors (hide warnings)
    #[arg(short = 'e', long)]
    errors_only: bool,

    /// Also report informational issues
    #[arg(short, long)]
    verbose: bool,

    /// Strict mode - treat warnings as errors
    #[arg(short, long)]
    strict: bool,
}

fn main() -> ExitCode {
    let args = Args::parse();
    let options = LintOptions {
        verbose: args.verbose,
    };

    let mut result = lint_directory(&args.path, &options);
    if args.errors_only {
        result.retain_errors();
    }

    match args.output {
        Output::Json => print_results_json(&result),
        Output::Text => print_results(&result, &args.path),
    }

    if result.fails(args.strict) {
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    }
}

fn print_results_json(result: &LintResult) {
    match serde_json::to_string_pretty(result) {
        Ok(output) => println!("{output}"),
        Err(e) => eprintln!("Failed to serialize results: {e}"),
    }
}

fn print_results(result: &LintResult, root: &Path) {
    println!("{BOLD}{CYAN}Detour Rule Linter{RESET}");
    println!("{DIM}━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━{RESET}");
    println!("{DIM}Scanning:{RESET} {CYAN}{}{RESET}\n", root.display());

    if result.files_checked == 0 && result.issues.is_empty() {
        println!("{YELLOW}Warning:{RESET} No rule files found in {root:?}");
        return;
    }

    let mut issues_by_file: BTreeMap<&Path, Vec<&LintIssue>> = BTreeMap::new();
    for issue in &result.issues {
        issues_by_file.entry(&issue.file).or_default().push(issue);
    }

    for (file, issues) in &issues_by_file {
        print_file(file, issues);
    }

    println!("{DIM}━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━{RESET}");
    println!("  {DIM}Files checked:{RESET} {BOLD}{}{RESET}", result.files_checked);
    println!("  {DIM}Rules checked:{RESET} {BOLD}{}{RESET}", result.rules_checked);
    let error_color = if result.errors > 0 { RED } else { GREEN };
    println!("  {error_color}Errors:{RESET}        {BOLD}{}{RESET}", result.errors);
    let warning_color = if result.warnings > 0 { YELLOW } else { DIM };
    println!("  {warning_color}Warnings:{RESET}      {BOLD}{}{RESET}", result.warnings);
    println!();

    if result.errors == 0 && result.warnings == 0 {
        println!("{GREEN}{BOLD}All checks passed!{RESET}");
    } else if result.errors == 0 {
        println!("{YELLOW}{BOLD}Passed with warnings{RESET}");
    } else {
        println!("{RED}{BOLD}Linting failed with errors{RESET}");
    }
}

fn print_file(file: &Path, issues: &[&LintIssue]) {
    let errors = issues.iter().filter(|i| i.severity == Severity::Error).count();
    let status = if errors > 0 {
        format!("{RED}FAIL{RESET}")
    } else {
        format!("{YELLOW}WARN{RESET}")
    };
    let file_name = file.file_name().unwrap_or_default().to_string_lossy();
    println!("{status} {BOLD}{CYAN}{file_name}{RESET} {DIM}({} issue(s)){RESET}", issues.len());

    for issue in issues {
        let color = severity_color(issue.severity);
        let marker = format!("{color}|{RESET}");
        let location = issue
            .location
            .as_ref()
            .map(|l| format!("{DIM}[{RESET}{CYAN}{l}{RESET}{DIM}]{RESET} "))
            .unwrap_or_default();
        let rule = issue
            .rule_id
            .as_ref()
            .map(|id| format!("{DIM}rule {id}:{RESET} "))
            .unwrap_or_default();

        println!(
            "  {marker} {location}{BOLD}{color}{}{RESET}: {rule}{} {DIM}({color}{}{DIM}){RESET}",
            issue.severity.label(),
            issue.message,
            issue.code
        );
        if let Some(suggestion) = &issue.suggestion {
            println!("  {marker}   {GREEN}-> {suggestion}{RESET}");
        }
    }
    println!();
}

fn severity_color(severity: Severity) -> &'static str {
    match severity {
        Severity::Error => RED,
        Severity::Warning => YELLOW,
        Severity::Info => CYAN,
    }
}

// Copyright 2025 Eric Jingryd (tidynest@proton.me)
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! CLI entry point for pwsh-guard
//!
//! Provides commands for scoring, sanitising, validating and verifying
//! single PowerShell commands, and for evaluating whole datasets.

use clap::{Parser, Subcommand, ValueEnum};
use colored::*;
use pwsh_guard::config::GuardConfig;
use pwsh_guard::eval::{self, report, Evaluator, KnowledgeBase, RecordedGenerator, SanitizingGenerator};
use pwsh_guard::risk::{RiskProfiler, RiskScorer, Sanitizer};
use pwsh_guard::similarity::SimilarityScorer;
use pwsh_guard::structure::{parser_from_config, StructuralParser, StructuralValidator};
use pwsh_guard::verify::{ComplianceVerifier, TestCase};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "pwsh-guard")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Guard configuration file (TOML); defaults apply when omitted
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Use the built-in parser instead of the external PowerShell parser
    #[arg(long, global = true)]
    builtin_parser: bool,

    /// Debug logging on stderr (RUST_LOG takes precedence)
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum GeneratorKind {
    /// Replay the dataset's `generated` field
    Recorded,
    /// Rule-based rewrite of the original command
    Sanitize,
}

#[derive(Subcommand)]
enum Commands {
    /// Show the risk score and matched patterns of a command
    Score {
        #[arg(allow_hyphen_values = true)]
        command: String,
    },

    /// Rewrite triggered patterns of a command
    Sanitize {
        #[arg(allow_hyphen_values = true)]
        command: String,

        /// Apply only the rule for this pattern, without escaping
        #[arg(short, long)]
        pattern: Option<String>,
    },

    /// Structural validation of a command
    Validate {
        #[arg(allow_hyphen_values = true)]
        command: String,
    },

    /// Similarity between a reference and a candidate
    Similarity {
        #[arg(allow_hyphen_values = true)]
        reference: String,
        #[arg(allow_hyphen_values = true)]
        candidate: String,
    },

    /// Verify a rewritten command against its source
    Verify {
        /// Original command
        #[arg(short, long, allow_hyphen_values = true)]
        source: String,

        /// Rewritten command
        #[arg(short = 'C', long, allow_hyphen_values = true)]
        candidate: String,

        /// JSON array of {"input", "expected"} test cases
        #[arg(short, long)]
        tests: Option<PathBuf>,
    },

    /// Evaluate a JSONL dataset and write a CSV report
    Evaluate {
        /// Dataset file (one JSON record per line)
        #[arg(short, long)]
        input: PathBuf,

        /// Output directory
        #[arg(short, long, default_value = "results")]
        output: PathBuf,

        /// Worker threads
        #[arg(short, long, default_value_t = 1)]
        jobs: usize,

        /// Only evaluate the first N records
        #[arg(long)]
        sample: Option<usize>,

        #[arg(short, long, value_enum, default_value_t = GeneratorKind::Recorded)]
        generator: GeneratorKind,

        /// Knowledge base (JSON array) for retrieval-augmented prompts
        #[arg(long)]
        kb: Option<PathBuf>,
    },
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let config = load_config(cli.config.as_deref())?;

    match cli.command {
        Commands::Score { command } => score(&config, &command)?,
        Commands::Sanitize { command, pattern } => sanitize(&config, &command, pattern.as_deref())?,
        Commands::Validate { command } => {
            validate(parser_from_config(&config, cli.builtin_parser)?, &command)
        }
        Commands::Similarity { reference, candidate } => {
            let parser = parser_from_config(&config, cli.builtin_parser)?;
            similarity(&config, parser, &reference, &candidate)
        }
        Commands::Verify {
            source,
            candidate,
            tests,
        } => {
            let parser = parser_from_config(&config, cli.builtin_parser)?;
            verify(&config, parser, &source, &candidate, tests.as_deref())?
        }
        Commands::Evaluate {
            input,
            output,
            jobs,
            sample,
            generator,
            kb,
        } => {
            let parser = parser_from_config(&config, cli.builtin_parser)?;
            evaluate(&config, parser, &input, &output, jobs, sample, generator, kb.as_deref())?
        }
    }

    Ok(())
}

/// Logs go to stderr so stdout stays clean for results
fn init_logging(verbose: bool) {
    let default_filter = if verbose { "pwsh_guard=debug" } else { "pwsh_guard=warn" };
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .init();
}

/// Expands `~` in a user-supplied path
fn expand(path: &Path) -> anyhow::Result<PathBuf> {
    let expanded = shellexpand::tilde(
        path.to_str()
            .ok_or_else(|| anyhow::anyhow!("Invalid path encoding"))?,
    );
    Ok(PathBuf::from(expanded.as_ref()))
}

fn load_config(path: Option<&Path>) -> anyhow::Result<GuardConfig> {
    match path {
        Some(path) => Ok(GuardConfig::load(&expand(path)?)?),
        None => Ok(GuardConfig::default()),
    }
}

/// Print the risk assessment of a command
fn score(config: &GuardConfig, command: &str) -> anyhow::Result<()> {
    let scorer = RiskScorer::new(config)?;
    let assessment = scorer.assess(command);

    let score = format!("{}/{}", assessment.score, config.max_risk);
    let score = match assessment.highest_tier() {
        Some(tier) if tier.is_vulnerability() => score.red().bold(),
        Some(_) => score.yellow().bold(),
        None => score.green().bold(),
    };
    println!("{} Risk score: {}", "→".cyan(), score);
    println!("  critical: {}  high: {}", assessment.critical, assessment.high);

    if assessment.matches.is_empty() {
        println!("{} No patterns matched", "✓".green());
    } else {
        for m in &assessment.matches {
            println!("  {} {}", format!("[{}]", m.tier).magenta(), m.signature);
        }
    }

    Ok(())
}

/// Print a sanitised rewrite of a command
fn sanitize(config: &GuardConfig, command: &str, pattern: Option<&str>) -> anyhow::Result<()> {
    match pattern {
        Some(pattern) => {
            let rewritten = Sanitizer::new().rewrite(command, pattern);
            println!("{}", rewritten);
        }
        None => {
            let profiler = RiskProfiler::new(RiskScorer::new(config)?);
            let (risk, rewritten) = profiler.profile_and_sanitize(command);
            println!("{} Risk score: {}", "→".cyan(), risk);
            println!("{}", rewritten);
        }
    }
    Ok(())
}

/// Print structural findings; exits 1 on failure
fn validate(parser: Arc<dyn StructuralParser>, command: &str) {
    let validator = StructuralValidator::new(parser);
    let report = validator.validate(command);

    println!(
        "{} Parsed with '{}': {} node{}",
        "→".cyan(),
        validator.parser().name(),
        report.node_types.len(),
        if report.node_types.len() == 1 { "" } else { "s" }
    );

    if report.pass {
        println!("{} {}", "✓".green().bold(), "No structural vulnerabilities".bold());
    } else {
        for vulnerability in &report.vulnerabilities {
            println!("  {} {}", "✗".red(), vulnerability);
        }
        std::process::exit(1);
    }
}

fn similarity(config: &GuardConfig, parser: Arc<dyn StructuralParser>, reference: &str, candidate: &str) {
    let scorer = SimilarityScorer::new(parser, config.similarity);
    let breakdown = scorer.breakdown(reference, candidate);

    let score = format!("{:.4}", breakdown.score);
    let score = if breakdown.score < config.drift_threshold {
        score.red().bold()
    } else {
        score.green().bold()
    };
    println!("{} Similarity: {}", "→".cyan(), score);
    println!("  token:      {:.4}", breakdown.token_score);
    println!("  structural: {:.4}", breakdown.structural_score);
    if !breakdown.structure_comparable {
        println!("{}", "⚠ At least one side did not parse".yellow());
    }
}

/// Print the verdict; exits 1 when non-compliant
fn verify(
    config: &GuardConfig,
    parser: Arc<dyn StructuralParser>,
    source: &str,
    candidate: &str,
    tests: Option<&Path>,
) -> anyhow::Result<()> {
    let test_cases: Option<Vec<TestCase>> = match tests {
        Some(path) => {
            let path = expand(path)?;
            let content = fs::read_to_string(&path)
                .map_err(|e| anyhow::anyhow!("Failed to read {}: {}", path.display(), e))?;
            Some(serde_json::from_str(&content)?)
        }
        None => None,
    };

    let verifier = ComplianceVerifier::new(config, parser)?;
    let verdict = verifier.verify(candidate, source, test_cases.as_deref());
    let diagnostics = verdict.diagnostics();

    println!(
        "{} Vulnerable patterns: source {}, candidate {}",
        "→".cyan(),
        diagnostics.source_vulnerabilities,
        diagnostics.candidate_vulnerabilities
    );
    println!("{} Similarity: {:.4}", "→".cyan(), diagnostics.similarity.score);
    if test_cases.is_some() {
        println!("{} Test cases run: {}", "→".cyan(), diagnostics.tests_run);
    }

    if verdict.compliant() {
        println!("\n{} {}", "✓".green().bold(), "Compliant".bold());
    } else {
        println!(
            "\n{} Non-compliant ({} issue{}):",
            "✗".red().bold(),
            verdict.issues().len(),
            if verdict.issues().len() == 1 { "" } else { "s" }
        );
        for issue in verdict.issues() {
            println!("  {} {}", "•".red(), issue);
        }
        std::process::exit(1);
    }

    Ok(())
}

/// Run a dataset evaluation and write the CSV report
#[allow(clippy::too_many_arguments)]
fn evaluate(
    config: &GuardConfig,
    parser: Arc<dyn StructuralParser>,
    input: &Path,
    output: &Path,
    jobs: usize,
    sample: Option<usize>,
    generator: GeneratorKind,
    kb: Option<&Path>,
) -> anyhow::Result<()> {
    let mut records = eval::load_jsonl(&expand(input)?)?;
    if let Some(n) = sample {
        records.truncate(n);
    }

    let verifier = ComplianceVerifier::new(config, parser)?;
    let generator: Box<dyn eval::CommandGenerator> = match generator {
        GeneratorKind::Recorded => Box::new(RecordedGenerator),
        GeneratorKind::Sanitize => Box::new(SanitizingGenerator::new(RiskProfiler::new(
            verifier.scorer().clone(),
        ))),
    };

    let mut evaluator = Evaluator::new(verifier, generator);
    let rag = kb.is_some();
    if let Some(kb) = kb {
        let knowledge_base = KnowledgeBase::load(&expand(kb)?, evaluator.verifier().scorer(), config.retrieval)?;
        println!("{} Knowledge base: {} entries", "→".cyan(), knowledge_base.len());
        evaluator = evaluator.with_knowledge_base(knowledge_base);
    }

    println!("{} Evaluating {} records\n", "→".cyan(), records.len());
    let run = evaluator.run(&records, jobs);

    let compliant = run.rows.iter().filter(|row| row.compliant).count();
    println!(
        "Results for {} (RAG={}): {}/{} compliant",
        evaluator.generator_name().bold(),
        rag,
        compliant,
        run.rows.len()
    );
    println!("  VIR = {:.2}%", run.metrics.vulnerability_introduction_rate);
    println!("  SCR = {:.2}%", run.metrics.security_compliance_rate);
    if run.metrics.functional_samples > 0 {
        println!(
            "  FCR = {:.2}% ({} tested)",
            run.metrics.functional_correctness_rate, run.metrics.functional_samples
        );
    } else {
        println!("  FCR = n/a (no test cases)");
    }

    let output = expand(output)?;
    fs::create_dir_all(&output)?;
    let path = report::output_path(&output, evaluator.generator_name(), rag);
    report::write_csv(&path, &run.rows)?;
    println!("\n{} Saved to {}", "✓".green(), path.display());

    Ok(())
}

// tests/parsing_and_prompt.rs

use std::io::Cursor;

use batchdag::cli::{CliArgs, LogLevel};
use batchdag::config::OptionValue;
use batchdag::dispatch::{ConfirmPrompt, LinePrompt, dependency_clause, parse_answer};
use batchdag::exec::parse_sbatch_job_id;
use batchdag::logging::resolve_level;
use batchdag::plan::split_shell_words;
use batchdag::reuse::{all_completed, parse_sacct_states};
use clap::Parser;
use tracing::Level;

#[test]
fn test_sacct_output_parsing() {
    let states = parse_sacct_states("State\nCOMPLETED\nCOMPLETED\n").unwrap();
    assert_eq!(states, vec!["COMPLETED", "COMPLETED"]);
    assert!(all_completed(&states));

    let states = parse_sacct_states("State\nCOMPLETED\nOUT_OF_MEMORY\n").unwrap();
    assert!(!all_completed(&states));

    // Unknown job: header only.
    let states = parse_sacct_states("State\n").unwrap();
    assert!(states.is_empty());
    assert!(!all_completed(&states));

    assert!(parse_sacct_states("sacct: error: no accounting storage\n").is_err());
}

#[test]
fn test_sbatch_job_id_parsing() {
    assert_eq!(parse_sbatch_job_id("123456\n").as_deref(), Some("123456"));
    assert_eq!(parse_sbatch_job_id("\n789;perlmutter\n").as_deref(), Some("789"));
    assert_eq!(parse_sbatch_job_id("Submitted batch job 42"), None);
    assert_eq!(parse_sbatch_job_id(""), None);
}

#[test]
fn test_answers() {
    for yes in ["", "y", "Y", "ye", "yes", " YES \n"] {
        assert_eq!(parse_answer(yes), Some(true), "{yes:?}");
    }
    for no in ["n", "No", "NO\n"] {
        assert_eq!(parse_answer(no), Some(false), "{no:?}");
    }
    assert_eq!(parse_answer("sure"), None);
}

#[test]
fn test_line_prompt_reprompts_and_treats_eof_as_no() {
    let mut out = Vec::new();
    {
        let mut prompt = LinePrompt::new(Cursor::new("what\n\n"), &mut out);
        assert!(prompt.confirm("Proceed?").unwrap());
    }
    let text = String::from_utf8(out).unwrap();
    assert_eq!(text.matches("Proceed? [Y/n] ").count(), 2);
    assert!(text.contains("Please respond with 'yes' or 'no'"));

    let mut prompt = LinePrompt::new(Cursor::new(""), Vec::new());
    assert!(!prompt.confirm("Proceed?").unwrap());
}

#[test]
fn test_dependency_clause() {
    assert_eq!(dependency_clause(&[]), None);
    assert_eq!(
        dependency_clause(&["11", "12"]).as_deref(),
        Some("--dependency=afterok:11:12")
    );
}

#[test]
fn test_option_rendering() {
    assert_eq!(OptionValue::Int(3000).to_args("lmax"), vec!["--lmax", "3000"]);
    assert_eq!(OptionValue::Bool(true).to_args("fast"), vec!["--fast"]);
    assert!(OptionValue::Bool(false).to_args("fast").is_empty());
    assert_eq!(
        OptionValue::List(vec![OptionValue::Int(90), OptionValue::Float(150.5)]).to_args("freqs"),
        vec!["--freqs", "90", "150.5"]
    );
    assert_eq!(OptionValue::Float(2.0).to_args("alpha"), vec!["--alpha", "2.0"]);
    assert_eq!(
        OptionValue::Str("a b".to_string()).to_args("label"),
        vec!["--label", "a b"]
    );
}

#[test]
fn test_shell_word_splitting() {
    assert_eq!(
        split_shell_words(r#"a 'b c'  "d\"e" f\ g"#).unwrap(),
        vec!["a", "b c", "d\"e", "f g"]
    );
    assert_eq!(split_shell_words("''").unwrap(), vec![""]);
    assert!(split_shell_words("   ").unwrap().is_empty());
    assert_eq!(split_shell_words("a #b c").unwrap(), vec!["a"]);
    assert!(split_shell_words("'open").is_err());
    assert!(split_shell_words("x\\").is_err());
}

#[test]
fn test_log_level_priority() {
    assert_eq!(resolve_level(Some(LogLevel::Debug), Some("error")), Level::DEBUG);
    assert_eq!(resolve_level(None, Some("warning")), Level::WARN);
    assert_eq!(resolve_level(None, Some(" Trace\n")), Level::TRACE);
    assert_eq!(resolve_level(None, Some("loud")), Level::INFO);
    assert_eq!(resolve_level(None, None), Level::INFO);
}

#[test]
fn test_cli_flags() {
    let args = CliArgs::try_parse_from([
        "batchdag",
        "demo",
        "pipeline.toml",
        "--skip",
        "fetch",
        "process",
        "-A",
        "m1234",
        "--qos",
        "none",
        "--dry-run",
        "-y",
    ])
    .unwrap();
    assert_eq!(args.project.as_deref(), Some("demo"));
    assert_eq!(args.skip, vec!["fetch", "process"]);
    assert!(args.dry_run && args.yes);
    let overrides = args.site_overrides();
    assert_eq!(overrides.account.as_deref(), Some("m1234"));
    assert_eq!(overrides.qos.as_deref(), Some("none"));

    assert!(CliArgs::try_parse_from(["batchdag", "--show-site-dir"]).is_ok());
    assert!(CliArgs::try_parse_from(["batchdag", "demo"]).is_err());
    assert!(
        CliArgs::try_parse_from(["batchdag", "demo", "p.toml", "--force-local", "--force-slurm"])
            .is_err()
    );
}

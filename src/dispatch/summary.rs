// src/dispatch/summary.rs

//! Pre-dispatch summary and the yes/no confirmation.

use std::io::{self, BufRead, Write};

use crate::errors::Result;
use crate::reuse::DecisionMap;

/// Human readable REUSE/SKIP/SUBMIT table.
pub fn render_summary(project: &str, decisions: &DecisionMap) -> String {
    let width = decisions.iter().map(|(n, _)| n.len()).max().unwrap_or(0);
    let mut out = format!("SUMMARY FOR SUBMISSION OF PROJECT {project}\n");
    for (name, decision) in decisions.iter() {
        out.push_str(&format!("  {name:<width$}  {decision}\n"));
    }
    out
}

/// Interpret one answer line. `None` means "ask again".
pub fn parse_answer(line: &str) -> Option<bool> {
    match line.trim().to_ascii_lowercase().as_str() {
        "" | "y" | "ye" | "yes" => Some(true),
        "n" | "no" => Some(false),
        _ => None,
    }
}

/// Asks the operator whether to go ahead.
pub trait ConfirmPrompt {
    fn confirm(&mut self, question: &str) -> Result<bool>;
}

/// Always says yes (`--yes`).
#[derive(Debug, Clone, Copy, Default)]
pub struct AssumeYes;

impl ConfirmPrompt for AssumeYes {
    fn confirm(&mut self, _question: &str) -> Result<bool> {
        Ok(true)
    }
}

/// Line-based prompt; yes is the default, end of input means no.
pub struct LinePrompt<R, W> {
    input: R,
    output: W,
}

impl<R: BufRead, W: Write> LinePrompt<R, W> {
    pub fn new(input: R, output: W) -> Self {
        Self { input, output }
    }
}

impl LinePrompt<io::StdinLock<'static>, io::Stdout> {
    pub fn stdio() -> Self {
        Self::new(io::stdin().lock(), io::stdout())
    }
}

impl<R: BufRead, W: Write> ConfirmPrompt for LinePrompt<R, W> {
    fn confirm(&mut self, question: &str) -> Result<bool> {
        loop {
            write!(self.output, "{question} [Y/n] ")?;
            self.output.flush()?;

            let mut line = String::new();
            if self.input.read_line(&mut line)? == 0 {
                writeln!(self.output)?;
                return Ok(false);
            }
            match parse_answer(&line) {
                Some(answer) => return Ok(answer),
                None => writeln!(self.output, "Please respond with 'yes' or 'no' (or 'y' or 'n').")?,
            }
        }
    }
}

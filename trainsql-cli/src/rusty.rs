//! `rustyline` helper wiring: filename completion plus completion/hinting
//! over TrainSQL's reserved keyword list.

use std::borrow::Cow;
use std::sync::Arc;

use rustyline::completion::{Completer, FilenameCompleter, Pair};
use rustyline::error::ReadlineError;
use rustyline::highlight::Highlighter;
use rustyline::hint::Hinter;
use rustyline::validate::{ValidationContext, ValidationResult, Validator};
use rustyline::{Context, Helper, Result};

pub struct CliHelper {
    completer: FilenameCompleter,
    keywords: Arc<Vec<String>>,
}

impl CliHelper {
    pub fn with_keywords(keywords: Arc<Vec<String>>) -> Self {
        Self { completer: FilenameCompleter::new(), keywords }
    }
}

impl Highlighter for CliHelper {
    fn highlight<'l>(&self, line: &'l str, _pos: usize) -> Cow<'l, str> {
        Cow::Borrowed(line)
    }

    fn highlight_prompt<'b, 's: 'b, 'p: 'b>(
        &'s self,
        prompt: &'p str,
        default: bool,
    ) -> Cow<'b, str> {
        let _ = default;
        Cow::Borrowed(prompt)
    }

    fn highlight_hint<'h>(&self, hint: &'h str) -> Cow<'h, str> {
        Cow::Owned("\x1b[1m".to_owned() + hint + "\x1b[m")
    }

    fn highlight_char(&self, line: &str, _pos: usize) -> bool {
        !line.is_empty()
    }
}

impl Hinter for CliHelper {
    type Hint = String;

    fn hint(&self, line: &str, pos: usize, _ctx: &Context<'_>) -> Option<Self::Hint> {
        let last_word = last_word(line);
        if last_word.is_empty() {
            return None;
        }
        let (_, candidates) = complete_keywords(line, pos, &self.keywords);
        candidates.first().map(|pair| pair.replacement[last_word.len()..].to_owned())
    }
}

impl Completer for CliHelper {
    type Candidate = Pair;

    fn complete(
        &self,
        line: &str,
        pos: usize,
        ctx: &Context<'_>,
    ) -> std::result::Result<(usize, Vec<Pair>), ReadlineError> {
        let keyword_candidates = complete_keywords(line, pos, &self.keywords);
        if !keyword_candidates.1.is_empty() {
            return Ok(keyword_candidates);
        }
        self.completer.complete(line, pos, ctx)
    }
}

impl Validator for CliHelper {
    fn validate(&self, ctx: &mut ValidationContext<'_>) -> Result<ValidationResult> {
        let input = ctx.input().trim_end();
        if input.strip_suffix('\\').is_some() {
            Ok(ValidationResult::Incomplete)
        } else {
            Ok(ValidationResult::Valid(None))
        }
    }
}

impl Helper for CliHelper {}

fn last_word(line: &str) -> &str {
    line.split(|c: char| c.is_whitespace() || c == '.').last().unwrap_or(line)
}

fn complete_keywords(line: &str, pos: usize, keywords: &[String]) -> (usize, Vec<Pair>) {
    let hint = last_word(line);
    let results: Vec<Pair> = keywords
        .iter()
        .filter(|keyword| keyword.to_lowercase().starts_with(&hint.to_ascii_lowercase()))
        .map(|keyword| Pair { display: keyword.clone(), replacement: keyword.clone() })
        .collect();
    let start = if pos >= hint.len() { pos - hint.len() } else { 0 };
    (start, results)
}

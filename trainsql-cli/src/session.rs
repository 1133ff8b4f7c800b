//! The CLI-side session wrapper: drives a `trainsql::session::Session`
//! through either an interactive `rustyline` REPL or a batch reader over
//! any `BufRead`, multi-line query accumulation, and the `.cmd`-style
//! control commands the REPL itself understands (as opposed to SQL).

use std::io::BufRead;
use std::sync::Arc;
use std::time::Instant;

use anyhow::{anyhow, Result};
use rustyline::config::Builder;
use rustyline::error::ReadlineError;
use rustyline::history::DefaultHistory;
use rustyline::{CompletionType, Editor};

use trainsql::mvcc::MVCC;
use trainsql::session::Session;
use trainsql::sql::token;
use trainsql::storage::engine::Engine;

use crate::config::Config;
use crate::rusty::CliHelper;

pub struct CliSession<E: Engine> {
    inner: Session<E>,
    settings: Config,
    query: String,
    keywords: Arc<Vec<String>>,
}

impl<E: Engine + 'static> CliSession<E> {
    pub fn new(mvcc: MVCC<E>, settings: Config) -> Self {
        println!("Welcome to trainSQL.");
        println!();
        let keywords = token::keywords().iter().map(|s| s.to_string()).collect();
        Self { inner: Session::new(mvcc), settings, query: String::new(), keywords: Arc::new(keywords) }
    }

    fn prompt(&self) -> String {
        if !self.query.trim().is_empty() {
            "     -> ".to_string()
        } else {
            format!("{}>> ", self.settings.prompt.trim_end())
        }
    }

    pub fn handle_repl(&mut self) {
        let config =
            Builder::new().completion_prompt_limit(5).completion_type(CompletionType::Circular).build();
        let mut rl = Editor::<CliHelper, DefaultHistory>::with_config(config).unwrap();
        rl.set_helper(Some(CliHelper::with_keywords(self.keywords.clone())));
        let history_path = history_path();
        rl.load_history(&history_path).ok();

        'repl: loop {
            match rl.readline(&self.prompt()) {
                Ok(line) => {
                    for query in self.append_query(&line) {
                        let _ = rl.add_history_entry(query.as_str());
                        if query == "exit" || query == "quit" {
                            break 'repl;
                        }
                        self.run_and_print(&query);
                    }
                }
                Err(ReadlineError::Io(err)) => eprintln!("io error: {}", err),
                Err(ReadlineError::Interrupted) => {
                    self.query.clear();
                    println!("^C");
                }
                Err(ReadlineError::Eof) => break,
                Err(_) => {}
            }
        }

        println!("Bye~");
        let _ = rl.save_history(&history_path);
    }

    pub fn handle_reader<R: BufRead>(&mut self, r: R) -> Result<()> {
        let start = Instant::now();
        for line in r.lines() {
            let line = line.map_err(|e| anyhow!("reading input: {}", e))?;
            for query in self.append_query(&line) {
                if query == "exit" || query == "quit" {
                    return Ok(());
                }
                self.run_and_print(&query);
            }
        }

        let remainder = self.query.trim().to_owned();
        if !remainder.is_empty() {
            self.query.clear();
            self.run_and_print(&remainder);
        }

        if self.settings.show_stats {
            println!("{:.3}s", start.elapsed().as_secs_f64());
        }
        Ok(())
    }

    /// Accumulates `line` onto any in-progress multi-line query, splitting
    /// off and returning every statement terminated by `;` (or, for bare
    /// REPL control words, returned immediately on their own).
    fn append_query(&mut self, line: &str) -> Vec<String> {
        let line = line.trim();
        if line.is_empty() {
            return vec![];
        }
        if self.query.is_empty() && (line == "exit" || line == "quit") {
            return vec![line.to_string()];
        }
        if line.starts_with("--") {
            return vec![];
        }

        if !self.query.is_empty() {
            self.query.push(' ');
        }
        self.query.push_str(line);

        let mut statements = Vec::new();
        while let Some(pos) = self.query.find(';') {
            let statement = self.query[..=pos].trim().to_string();
            self.query = self.query[pos + 1..].trim_start().to_string();
            statements.push(statement);
        }
        statements
    }

    fn run_and_print(&mut self, query: &str) {
        let start = Instant::now();
        let result = self.inner.execute(query);
        println!("{}", result);
        if self.settings.show_stats {
            println!("({:.3}s)", start.elapsed().as_secs_f64());
        }
    }
}

fn history_path() -> String {
    format!("{}/.trainsql_history", std::env::var("HOME").unwrap_or_else(|_| ".".to_string()))
}

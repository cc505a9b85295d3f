//! Interactive shell
//!
//! The read-eval-print loop: rustyline line editing with history and tab
//! completion, verb lookup, and the dispatch boundary that turns every
//! command failure into a one-line diagnostic. No error raised by a
//! handler ever unwinds the loop; the shell stays interactive.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use anyhow::Result;
use rustyline::completion::{Completer, Pair};
use rustyline::error::ReadlineError;
use rustyline::highlight::Highlighter;
use rustyline::hint::Hinter;
use rustyline::history::DefaultHistory;
use rustyline::validate::Validator;
use rustyline::{CompletionType, Config as EditorConfig, Context, Editor, Helper};

use crate::cache::ResourceCache;
use crate::commands::{self, Command};
use crate::session::Session;

const PROMPT: &str = "awsh --> ";
const HISTORY_FILE: &str = ".awsh_history";

#[derive(Debug, PartialEq, Eq)]
enum Flow {
    Continue,
    Stop,
}

pub struct Shell {
    session: Session,
    commands: BTreeMap<&'static str, Box<dyn Command>>,
    editor: Editor<ShellHelper, DefaultHistory>,
    history_path: PathBuf,
}

impl Shell {
    pub fn new(session: Session) -> Result<Self> {
        let commands = commands::registry();

        let config = EditorConfig::builder()
            .history_ignore_space(true)
            .history_ignore_dups(true)?
            .completion_type(CompletionType::List)
            .build();
        let mut editor = Editor::with_config(config)?;
        editor.set_helper(Some(ShellHelper {
            cache: session.cache(),
            verbs: commands.keys().map(|v| v.to_string()).collect(),
        }));

        let history_path = dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(HISTORY_FILE);
        if history_path.exists() {
            if let Err(err) = editor.load_history(&history_path) {
                tracing::warn!("failed to load history: {err}");
            }
        }

        Ok(Self {
            session,
            commands,
            editor,
            history_path,
        })
    }

    /// The command loop. Runs until `exit`, `quit`, or EOF; the history
    /// file is rewritten on the way out.
    pub async fn run(&mut self) -> Result<()> {
        loop {
            match self.editor.readline(PROMPT) {
                Ok(line) => {
                    let line = line.trim().to_string();
                    if line.is_empty() {
                        continue;
                    }
                    let _ = self.editor.add_history_entry(&line);
                    if self.handle_line(&line).await == Flow::Stop {
                        break;
                    }
                }
                Err(ReadlineError::Interrupted) => continue,
                Err(ReadlineError::Eof) => break,
                Err(err) => {
                    eprintln!("Input error: {err}");
                    break;
                }
            }
        }
        if let Err(err) = self.editor.save_history(&self.history_path) {
            tracing::warn!("failed to save history: {err}");
        }
        Ok(())
    }

    async fn handle_line(&mut self, line: &str) -> Flow {
        let (verb, rest) = match line.split_once(char::is_whitespace) {
            Some((verb, rest)) => (verb, rest),
            None => (line, ""),
        };
        match verb {
            "exit" | "quit" => return Flow::Stop,
            "help" => self.help(rest.trim()),
            _ => match self.commands.get(verb) {
                Some(command) => {
                    if let Some(diagnostic) =
                        dispatch(&mut self.session, command.as_ref(), rest).await
                    {
                        println!("{diagnostic}");
                    }
                }
                None => println!("Unknown command: {line}"),
            },
        }
        Flow::Continue
    }

    fn help(&self, topic: &str) {
        if topic.is_empty() {
            println!("Available commands:");
            let verbs: Vec<&str> = self.commands.keys().copied().collect();
            println!("    {}", verbs.join(" "));
            println!("    exit help quit");
            println!();
            println!("Use 'help <command>' for per-command usage.");
            println!("Use 'help options' for information on common command options.");
        } else if topic == "options" {
            println!("{COMMON_OPTIONS_HELP}");
        } else if let Some(command) = self.commands.get(topic) {
            println!("{}", command.help());
        } else {
            println!("No help for command: {topic}");
        }
    }
}

/// Tokenize the argument part of a line and run the handler, converting
/// any failure into a one-line diagnostic (plus full detail in debug
/// mode). Returns None on success.
pub(crate) async fn dispatch(
    session: &mut Session,
    command: &dyn Command,
    rest: &str,
) -> Option<String> {
    let argv = match shell_words::split(rest) {
        Ok(argv) => argv,
        Err(err) => return Some(format!("Error parsing options: {err}")),
    };
    match command.run(session, argv).await {
        Ok(()) => None,
        Err(err) => {
            let detail = err.detail();
            if session.debug && !detail.is_empty() {
                println!("{detail}");
            }
            tracing::debug!("command {} failed: {err}", command.name());
            Some(err.to_string())
        }
    }
}

const COMMON_OPTIONS_HELP: &str = "
The std-options are:
    -r region   : explicitly specify a region

The list-options are:

    -a          : all resources
    -f spec     : resources matching the specified filter spec; the spec
                  has the form: key=value
    -l          : long listing
    -O file     : send output to file (in addition to stdout)
    -q tag_spec : resources matching the specified tag_spec; the tag_spec
                  has the form key[=value] or =value
    -t          : list tags
    -x          : extended listing
";

/// Completion helper: verb names for the first word, cached resource ids
/// afterwards (`vol -x vol-1<TAB>`).
struct ShellHelper {
    cache: Arc<Mutex<ResourceCache>>,
    verbs: Vec<String>,
}

impl Completer for ShellHelper {
    type Candidate = Pair;

    fn complete(
        &self,
        line: &str,
        pos: usize,
        _ctx: &Context<'_>,
    ) -> rustyline::Result<(usize, Vec<Pair>)> {
        let start = line[..pos]
            .rfind(char::is_whitespace)
            .map(|i| i + 1)
            .unwrap_or(0);
        let word = &line[start..pos];

        if start == 0 {
            let candidates = self
                .verbs
                .iter()
                .filter(|verb| verb.starts_with(word))
                .map(|verb| Pair {
                    display: verb.clone(),
                    replacement: verb.clone(),
                })
                .collect();
            return Ok((start, candidates));
        }

        // Cached ids belong to the default region; don't offer them when
        // the command targets another one via -r.
        let region_override = line
            .split_whitespace()
            .any(|tok| tok.starts_with('-') && tok[1..].contains('r'));
        if region_override {
            return Ok((pos, Vec::new()));
        }

        let Some((res_type, prefix)) = word.split_once('-') else {
            return Ok((pos, Vec::new()));
        };
        if res_type.is_empty() || res_type.starts_with('-') {
            return Ok((pos, Vec::new()));
        }
        let cache = self.cache.lock().unwrap();
        let candidates = cache
            .lookup(res_type, prefix)
            .into_iter()
            .map(|suffix| {
                let id = format!("{res_type}-{suffix}");
                Pair {
                    display: id.clone(),
                    replacement: id,
                }
            })
            .collect();
        Ok((start, candidates))
    }
}

impl Hinter for ShellHelper {
    type Hint = String;
}

impl Highlighter for ShellHelper {}
impl Validator for ShellHelper {}
impl Helper for ShellHelper {}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aws::AwsCredentials;
    use crate::config::Config;
    use crate::error::CmdError;
    use async_trait::async_trait;

    fn test_session() -> Session {
        let creds = AwsCredentials {
            key_id: "AKIATEST".to_string(),
            secret: "secret".to_string(),
            source_file: None,
            name: None,
        };
        Session::new(creds, "us-east-1".to_string(), false, Config::default())
    }

    struct FailingCommand;

    #[async_trait]
    impl Command for FailingCommand {
        fn name(&self) -> &'static str {
            "boom"
        }
        fn help(&self) -> &'static str {
            "boom"
        }
        async fn run(&self, _session: &mut Session, _argv: Vec<String>) -> Result<(), CmdError> {
            Err(CmdError::Service {
                service: "EC2",
                code: "RequestLimitExceeded".to_string(),
                message: "simulated".to_string(),
                detail: String::new(),
            })
        }
    }

    struct RecordingCommand;

    #[async_trait]
    impl Command for RecordingCommand {
        fn name(&self) -> &'static str {
            "ok"
        }
        fn help(&self) -> &'static str {
            "ok"
        }
        async fn run(&self, _session: &mut Session, argv: Vec<String>) -> Result<(), CmdError> {
            assert_eq!(argv, vec!["-l", "two words"]);
            Ok(())
        }
    }

    #[tokio::test]
    async fn handler_error_becomes_diagnostic_and_loop_survives() {
        let mut session = test_session();
        let diagnostic = dispatch(&mut session, &FailingCommand, "-a").await;
        assert_eq!(
            diagnostic.as_deref(),
            Some("EC2 operation failed with error RequestLimitExceeded: simulated")
        );

        // The session is still usable for the next command.
        let ok = dispatch(&mut session, &RecordingCommand, "-l \"two words\"").await;
        assert_eq!(ok, None);
    }

    #[tokio::test]
    async fn bad_quoting_is_reported_not_fatal() {
        let mut session = test_session();
        let diagnostic = dispatch(&mut session, &RecordingCommand, "\"unterminated").await;
        assert!(diagnostic.unwrap().starts_with("Error parsing options:"));
    }
}

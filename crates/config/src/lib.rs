//! `grass.conf` parsing.
//!
//! The grammar is line-oriented and whitespace-separated:
//!
//! ```text
//! # comment to end of line
//! base <path>            exactly once; relative paths resolve against the
//!                        server's working directory at parse time
//! port <1..65535>        exactly once
//! user <name> <password> zero or more; a repeated name overwrites
//! ```
//!
//! Parsing is a small state machine driven by the whitespace class that
//! terminates each word: a newline where more tokens are expected (or the
//! reverse) is a parse error, as is an unknown directive keyword.

use std::fs;
use std::io;
use std::path::Path;

use thiserror::Error;

use grass_core::paths;

/// Default configuration filename, looked up in the working directory.
pub const CONF_FILENAME: &str = "grass.conf";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot find configuration file {path}")]
    NotFound {
        path: String,
        #[source]
        source: io::Error,
    },

    #[error("config parse error at line {line}: {msg}")]
    Parse { line: usize, msg: String },

    #[error("base directory {0} does not exist or is not a directory")]
    BadBaseDir(String),

    #[error(transparent)]
    Io(#[from] io::Error),
}

/// One configured account. Immutable after parse; the logged-in flag lives
/// with the server's session roster, not here.
#[derive(Debug, Clone)]
pub struct User {
    pub name: String,
    pub password: String,
}

/// Ordered user database with lookup by name.
#[derive(Debug, Clone, Default)]
pub struct UserDirectory {
    users: Vec<User>,
}

impl UserDirectory {
    pub fn find(&self, name: &str) -> Option<usize> {
        self.users.iter().position(|u| u.name == name)
    }

    pub fn get(&self, idx: usize) -> &User {
        &self.users[idx]
    }

    pub fn len(&self) -> usize {
        self.users.len()
    }

    pub fn is_empty(&self) -> bool {
        self.users.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &User> {
        self.users.iter()
    }

    fn upsert(&mut self, name: String, password: String) {
        match self.find(&name) {
            Some(idx) => self.users[idx].password = password,
            None => self.users.push(User { name, password }),
        }
    }
}

/// Immutable server configuration, shared by every session.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Canonical absolute path of the sandbox root.
    pub base_dir: String,
    pub listen_port: u16,
    pub users: UserDirectory,
}

impl ServerConfig {
    /// Load and validate a config file. The base directory must exist.
    pub fn load_from(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let raw = fs::read_to_string(path).map_err(|source| ConfigError::NotFound {
            path: path.display().to_string(),
            source,
        })?;

        let cwd = std::env::current_dir()?;
        let config = Self::parse_str(&raw, &cwd.to_string_lossy())?;

        match fs::metadata(&config.base_dir) {
            Ok(meta) if meta.is_dir() => Ok(config),
            _ => Err(ConfigError::BadBaseDir(config.base_dir)),
        }
    }

    /// Parse config text. Relative `base` paths resolve against `cwd`.
    pub fn parse_str(input: &str, cwd: &str) -> Result<Self, ConfigError> {
        Parser::new(cwd).run(input)
    }
}

// ── State machine ────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    NewLine,
    Comment,
    Base,
    Port,
    User,
    Passw,
}

/// Whitespace class terminating a word. End of input counts as a newline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Sep {
    Space,
    Newline,
}

struct Word {
    text: String,
    sep: Sep,
    line: usize,
}

fn split_words(input: &str) -> Vec<Word> {
    let mut out = Vec::new();
    let mut it = input.chars().peekable();
    let mut line = 1;

    loop {
        while matches!(it.peek(), Some(' ' | '\t' | '\r' | '\n')) {
            if it.next() == Some('\n') {
                line += 1;
            }
        }

        let word_line = line;
        let mut text = String::new();
        while let Some(&c) = it.peek() {
            if matches!(c, ' ' | '\t' | '\r' | '\n') {
                break;
            }
            text.push(c);
            it.next();
        }
        if text.is_empty() {
            break;
        }

        // classify the whole separator run; a run containing a newline (or
        // end of input) terminates the line
        let mut saw_space = false;
        let mut saw_newline = false;
        while matches!(it.peek(), Some(' ' | '\t' | '\r' | '\n')) {
            if it.next() == Some('\n') {
                saw_newline = true;
                line += 1;
            } else {
                saw_space = true;
            }
        }
        let sep = if saw_newline || !saw_space {
            Sep::Newline
        } else {
            Sep::Space
        };

        out.push(Word { text, sep, line: word_line });
    }

    out
}

struct Parser {
    cwd: String,
    state: State,
    base: Option<String>,
    port: Option<u16>,
    users: UserDirectory,
    pending_user: Option<String>,
}

impl Parser {
    fn new(cwd: &str) -> Self {
        Self {
            cwd: cwd.to_owned(),
            state: State::NewLine,
            base: None,
            port: None,
            users: UserDirectory::default(),
            pending_user: None,
        }
    }

    fn run(mut self, input: &str) -> Result<ServerConfig, ConfigError> {
        for word in split_words(input) {
            self.step(word)?;
        }

        let base_dir = self.base.ok_or_else(|| ConfigError::Parse {
            line: 0,
            msg: "missing 'base' directive".to_owned(),
        })?;
        let listen_port = self.port.ok_or_else(|| ConfigError::Parse {
            line: 0,
            msg: "missing 'port' directive".to_owned(),
        })?;

        Ok(ServerConfig {
            base_dir,
            listen_port,
            users: self.users,
        })
    }

    fn step(&mut self, word: Word) -> Result<(), ConfigError> {
        let err = |line: usize, msg: String| ConfigError::Parse { line, msg };

        match self.state {
            State::NewLine => {
                if word.text.starts_with('#') {
                    if word.sep != Sep::Newline {
                        self.state = State::Comment;
                    }
                    return Ok(());
                }
                if word.sep == Sep::Newline {
                    return Err(err(
                        word.line,
                        format!("directive '{}' is missing its value", word.text),
                    ));
                }
                self.state = match word.text.as_str() {
                    "base" => {
                        if self.base.is_some() {
                            return Err(err(word.line, "duplicate 'base' directive".to_owned()));
                        }
                        State::Base
                    }
                    "port" => {
                        if self.port.is_some() {
                            return Err(err(word.line, "duplicate 'port' directive".to_owned()));
                        }
                        State::Port
                    }
                    "user" => State::User,
                    other => {
                        return Err(err(word.line, format!("unknown option '{other}'")));
                    }
                };
            }

            State::Comment => {
                if word.sep == Sep::Newline {
                    self.state = State::NewLine;
                }
            }

            State::Base => {
                if word.sep != Sep::Newline {
                    return Err(err(word.line, "unexpected token after base path".to_owned()));
                }
                let resolved = if word.text.starts_with('/') {
                    paths::canonify(&word.text)
                } else {
                    paths::append_relative(&self.cwd, &word.text)
                };
                match resolved {
                    Ok(canonical) => self.base = Some(canonical),
                    Err(e) => {
                        return Err(err(word.line, format!("invalid base path: {e}")));
                    }
                }
                self.state = State::NewLine;
            }

            State::Port => {
                if word.sep != Sep::Newline {
                    return Err(err(word.line, "unexpected token after port".to_owned()));
                }
                match word.text.parse::<u16>() {
                    Ok(p) if p >= 1 => self.port = Some(p),
                    _ => {
                        return Err(err(
                            word.line,
                            format!("port '{}' is not in 1..=65535", word.text),
                        ));
                    }
                }
                self.state = State::NewLine;
            }

            State::User => {
                if word.sep != Sep::Space {
                    return Err(err(word.line, "user directive is missing a password".to_owned()));
                }
                self.pending_user = Some(word.text);
                self.state = State::Passw;
            }

            State::Passw => {
                if word.sep != Sep::Newline {
                    return Err(err(word.line, "unexpected token after password".to_owned()));
                }
                // Passw is only ever entered from User, which sets this
                let Some(name) = self.pending_user.take() else {
                    return Err(err(word.line, "internal parser error".to_owned()));
                };
                self.users.upsert(name, word.text);
                self.state = State::NewLine;
            }
        }

        Ok(())
    }
}

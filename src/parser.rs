//! Splits one input line into pipeline stage descriptors.
//!
//! The scan is a single left-to-right pass with one active stage. Operators are
//! recognized in this priority order: `\x` escape, `|`, `<`, `>`, `2>`, `&`. Everything
//! else is copied verbatim into the active stage's command text, whitespace included;
//! the dispatcher splits arguments later.

use crate::buffer::GrowableBuffer;
use std::path::PathBuf;
use thiserror::Error;

/// Longest file name accepted after a redirect operator (Linux `PATH_MAX`).
pub const MAX_PATH_LEN: usize = 4096;

/// One stage of a parsed line, before any file or pipe is opened.
#[derive(Debug, Default)]
pub struct StageDescriptor {
    pub text: GrowableBuffer,
    pub input_path: Option<PathBuf>,
    pub output_path: Option<PathBuf>,
    pub error_path: Option<PathBuf>,
    pub background: bool,
    /// A `|` precedes this stage.
    pub pipe_in: bool,
    /// A `|` follows this stage.
    pub pipe_out: bool,
}

impl StageDescriptor {
    /// The stage's command text as an owned string.
    pub fn command_text(&self) -> String {
        self.text.to_string()
    }

    /// Whether any of the stage's standard streams is bound to a file or pipe.
    pub fn uses_redirected_streams(&self) -> bool {
        self.pipe_in
            || self.pipe_out
            || self.input_path.is_some()
            || self.output_path.is_some()
            || self.error_path.is_some()
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ParseError {
    #[error("file name too long ({len} characters, limit is {max})")]
    FileNameTooLong { len: usize, max: usize },
    #[error("missing file name after `{0}`")]
    MissingRedirectTarget(&'static str),
    #[error("trailing `\\` has nothing to escape")]
    TrailingEscape,
    #[error("empty command in pipeline stage {index}")]
    EmptyStage { index: usize },
}

struct LineParser {
    input: Vec<char>,
    pos: usize,
    stages: Vec<StageDescriptor>,
}

impl LineParser {
    fn new(line: &str) -> Self {
        Self {
            input: line.chars().collect(),
            pos: 0,
            stages: vec![StageDescriptor::default()],
        }
    }

    fn parse(mut self) -> Result<Vec<StageDescriptor>, ParseError> {
        while let Some(ch) = self.read_char() {
            match ch {
                '\\' => {
                    let escaped = self.read_char().ok_or(ParseError::TrailingEscape)?;
                    self.active().text.append(escaped);
                }
                '|' => self.push_stage(),
                '<' => {
                    let path = self.file_name("<")?;
                    self.active().input_path = Some(path);
                }
                '>' => {
                    let path = self.file_name(">")?;
                    self.active().output_path = Some(path);
                }
                '2' if self.peek_char() == Some('>') => {
                    self.read_char();
                    let path = self.file_name("2>")?;
                    self.active().error_path = Some(path);
                }
                '&' => self.active().background = true,
                c => self.active().text.append(c),
            }
        }

        for stage in &mut self.stages {
            stage.text.strip();
        }

        if self.stages.len() > 1 {
            if let Some(index) = self.stages.iter().position(|s| s.text.is_empty()) {
                return Err(ParseError::EmptyStage { index });
            }
        }

        Ok(self.stages)
    }

    fn read_char(&mut self) -> Option<char> {
        let ch = self.input.get(self.pos).copied();
        if ch.is_some() {
            self.pos += 1;
        }
        ch
    }

    fn peek_char(&self) -> Option<char> {
        self.input.get(self.pos).copied()
    }

    fn active(&mut self) -> &mut StageDescriptor {
        // `stages` starts with one element and only ever grows.
        let last = self.stages.len() - 1;
        &mut self.stages[last]
    }

    fn push_stage(&mut self) {
        self.active().pipe_out = true;
        self.stages.push(StageDescriptor {
            pipe_in: true,
            ..StageDescriptor::default()
        });
    }

    /// Read the whitespace-delimited token following a redirect operator.
    fn file_name(&mut self, op: &'static str) -> Result<PathBuf, ParseError> {
        while self.peek_char().is_some_and(char::is_whitespace) {
            self.pos += 1;
        }

        let mut name = GrowableBuffer::new();
        while let Some(c) = self.peek_char() {
            if c.is_whitespace() {
                break;
            }
            name.append(c);
            self.pos += 1;
        }

        if name.is_empty() {
            return Err(ParseError::MissingRedirectTarget(op));
        }
        if name.len() > MAX_PATH_LEN {
            return Err(ParseError::FileNameTooLong {
                len: name.len(),
                max: MAX_PATH_LEN,
            });
        }
        Ok(PathBuf::from(name.to_string()))
    }
}

/// Parse a raw input line into stage descriptors, one per `|`-separated segment.
///
/// Every stage's text comes back whitespace-trimmed. An error means nothing on the
/// line may run.
pub fn parse_line(line: &str) -> Result<Vec<StageDescriptor>, ParseError> {
    let stages = LineParser::new(line).parse()?;
    tracing::debug!(stages = stages.len(), "parsed line");
    Ok(stages)
}

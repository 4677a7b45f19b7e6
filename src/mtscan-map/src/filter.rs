//! Regex-based classification of node names.
//!
//! The pattern file drives the "anthropocene" heuristic: a name that
//! matches marks its block as player-built rather than generated.

use std::{
    fs,
    io::{self, BufRead},
    path::Path,
};

use regex::Regex;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum FilterError {
    #[error("{0}")]
    Io(#[from] io::Error),
    #[error("{0}")]
    Pattern(#[from] regex::Error),
}

/// An ordered list of positive and negative name patterns.
#[derive(Debug, Default)]
pub struct NameFilter {
    positive: Vec<Regex>,
    negative: Vec<Regex>,
}

impl NameFilter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads a pattern file.
    ///
    /// Lines starting with `#` and blank lines are ignored. A leading
    /// `!` adds the rest of the line as a negative pattern; everything
    /// else is a positive pattern.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, FilterError> {
        Self::read(io::BufReader::new(fs::File::open(path)?))
    }

    /// Same as [`Self::load`], from any line source.
    pub fn read(input: impl BufRead) -> Result<Self, FilterError> {
        let mut filter = Self::new();

        for line in input.lines() {
            let line = line?;
            if line.is_empty() || line.starts_with('#') {
                continue;
            }

            let line = line.trim_end();
            if line.is_empty() {
                continue;
            }

            filter.add(line)?;
        }

        Ok(filter)
    }

    /// Compiles and appends one pattern.
    pub fn add(&mut self, pattern: &str) -> Result<(), regex::Error> {
        // Patterns apply to the full name, not a substring of it.
        if let Some(negated) = pattern.strip_prefix('!') {
            self.negative.push(Regex::new(&format!("^(?:{negated})$"))?);
        } else {
            self.positive.push(Regex::new(&format!("^(?:{pattern})$"))?);
        }
        Ok(())
    }

    /// Whether `name` matches any positive pattern and no negative one.
    pub fn search(&self, name: &str) -> bool {
        self.positive.iter().any(|re| re.is_match(name))
            && !self.negative.iter().any(|re| re.is_match(name))
    }

    pub fn len(&self) -> usize {
        self.positive.len() + self.negative.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

//! Interactive prompts.

use std::io::{self, BufRead, Write};

use crate::error::{ConfigError, Result};

/// Asks the user questions.
pub trait Prompter: Send {
    /// Asks for a value. An empty answer yields `default` when given.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Prompt` if the terminal cannot be read.
    fn ask(&mut self, question: &str, default: Option<&str>) -> Result<String>;

    /// Asks a yes/no question.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Prompt` if the terminal cannot be read.
    fn confirm(&mut self, question: &str, default: bool) -> Result<bool>;
}

/// [`Prompter`] over stdin, writing questions to stderr.
#[derive(Debug, Default)]
pub struct StdinPrompter;

impl StdinPrompter {
    fn read_line(question: &str) -> Result<String> {
        let mut stderr = io::stderr().lock();
        write!(stderr, "{question}")
            .and_then(|()| stderr.flush())
            .map_err(|e| ConfigError::Prompt {
                message: e.to_string(),
            })?;

        let mut line = String::new();
        let read = io::stdin()
            .lock()
            .read_line(&mut line)
            .map_err(|e| ConfigError::Prompt {
                message: e.to_string(),
            })?;
        if read == 0 {
            return Err(ConfigError::Prompt {
                message: String::from("end of input"),
            }
            .into());
        }
        Ok(line.trim().to_string())
    }
}

impl Prompter for StdinPrompter {
    fn ask(&mut self, question: &str, default: Option<&str>) -> Result<String> {
        let label = match default {
            Some(_) => format!("{question} [press Enter for default]: "),
            None => format!("{question}: "),
        };
        let answer = Self::read_line(&label)?;
        Ok(resolve_answer(answer, default))
    }

    fn confirm(&mut self, question: &str, default: bool) -> Result<bool> {
        let hint = if default { "Y/n" } else { "y/N" };
        let answer = Self::read_line(&format!("{question} [{hint}]: "))?;
        Ok(parse_confirmation(&answer, default))
    }
}

/// Empty answers take the default.
fn resolve_answer(answer: String, default: Option<&str>) -> String {
    match default {
        Some(d) if answer.is_empty() => d.to_string(),
        _ => answer,
    }
}

fn parse_confirmation(answer: &str, default: bool) -> bool {
    match answer.to_ascii_lowercase().as_str() {
        "y" | "yes" => true,
        "n" | "no" => false,
        _ => default,
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::collections::VecDeque;

    /// Prompter replaying canned answers.
    #[derive(Debug, Default)]
    pub struct ScriptedPrompter {
        pub answers: VecDeque<String>,
        pub confirmations: VecDeque<bool>,
        pub asked: Vec<String>,
    }

    impl ScriptedPrompter {
        pub fn new(answers: &[&str], confirmations: &[bool]) -> Self {
            Self {
                answers: answers.iter().map(|a| (*a).to_string()).collect(),
                confirmations: confirmations.iter().copied().collect(),
                asked: Vec::new(),
            }
        }
    }

    impl Prompter for ScriptedPrompter {
        fn ask(&mut self, question: &str, default: Option<&str>) -> Result<String> {
            self.asked.push(question.to_string());
            let answer = self.answers.pop_front().unwrap_or_default();
            Ok(resolve_answer(answer, default))
        }

        fn confirm(&mut self, question: &str, default: bool) -> Result<bool> {
            self.asked.push(question.to_string());
            Ok(self.confirmations.pop_front().unwrap_or(default))
        }
    }

    #[test]
    fn test_empty_answer_takes_default() {
        assert_eq!(resolve_answer(String::new(), Some("abc")), "abc");
        assert_eq!(resolve_answer(String::from("x"), Some("abc")), "x");
        assert_eq!(resolve_answer(String::new(), None), "");
    }

    #[test]
    fn test_confirmation_parsing() {
        assert!(parse_confirmation("Y", false));
        assert!(parse_confirmation("yes", false));
        assert!(!parse_confirmation("n", true));
        assert!(parse_confirmation("", true));
        assert!(!parse_confirmation("maybe", false));
    }
}

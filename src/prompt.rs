//! Interactive confirmation prompts

use crate::error::{Error, Result};
use crossterm::style::Stylize;
use std::io::{self, BufRead, IsTerminal, Write};

/// Asks the operator a yes/no question
pub trait Confirm {
    fn confirm(&self, question: &str) -> Result<bool>;
}

/// Prompts on the controlling terminal, defaulting to no
#[derive(Debug, Default, Clone, Copy)]
pub struct TerminalPrompt;

impl Confirm for TerminalPrompt {
    fn confirm(&self, question: &str) -> Result<bool> {
        if !io::stdin().is_terminal() {
            return Err(Error::validation(
                "confirmation required but stdin is not a terminal; pass --yes to proceed",
            ));
        }

        let mut stdout = io::stdout();
        let io_err = |e: io::Error| Error::resource("/dev/stdin", e);

        write!(stdout, "{} {} ", question.bold(), "[y/N]".dark_grey()).map_err(io_err)?;
        stdout.flush().map_err(io_err)?;

        let mut answer = String::new();
        io::stdin().lock().read_line(&mut answer).map_err(io_err)?;
        Ok(parse_answer(&answer))
    }
}

fn parse_answer(answer: &str) -> bool {
    matches!(answer.trim().to_lowercase().as_str(), "y" | "yes")
}

#[cfg(test)]
pub(crate) mod fake {
    use super::*;
    use std::cell::RefCell;

    /// Answers every question the same way and records the questions
    pub struct FixedAnswer {
        pub answer: bool,
        pub questions: RefCell<Vec<String>>,
    }

    impl FixedAnswer {
        pub fn new(answer: bool) -> Self {
            Self {
                answer,
                questions: RefCell::new(Vec::new()),
            }
        }
    }

    impl Confirm for FixedAnswer {
        fn confirm(&self, question: &str) -> Result<bool> {
            self.questions.borrow_mut().push(question.to_string());
            Ok(self.answer)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_answer() {
        assert!(parse_answer("y\n"));
        assert!(parse_answer("YES"));
        assert!(!parse_answer("\n"));
        assert!(!parse_answer("n"));
        assert!(!parse_answer("yep"));
    }
}

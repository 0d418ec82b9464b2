//! Mock UI implementation for testing.
//!
//! `MockUI` captures every interaction for later assertion.
//!
//! # Example
//!
//! ```
//! use pipewright::ui::{MockUI, UserInterface};
//!
//! let mut ui = MockUI::new();
//! ui.set_confirm_response(false);
//! ui.success("Done!");
//!
//! assert!(!ui.confirm("Overwrite?", true).unwrap());
//! assert_eq!(ui.successes(), ["Done!"]);
//! ```

use std::cell::RefCell;
use std::rc::Rc;

use crate::error::Result;

use super::{OutputMode, SpinnerHandle, UserInterface};

#[derive(Debug, Default)]
pub struct MockUI {
    mode: OutputMode,
    interactive: bool,
    confirm_response: Option<bool>,
    messages: Vec<String>,
    successes: Vec<String>,
    warnings: Vec<String>,
    errors: Vec<String>,
    headers: Vec<String>,
    questions: Vec<String>,
    spinners: Rc<RefCell<Vec<SpinnerEvent>>>,
}

/// What happened to a spinner.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SpinnerEvent {
    Started(String),
    Succeeded(String),
    Failed(String),
    Skipped(String),
}

impl MockUI {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_mode(mode: OutputMode) -> Self {
        Self {
            mode,
            ..Default::default()
        }
    }

    /// Answer for every confirmation. Unset means "use the default".
    pub fn set_confirm_response(&mut self, response: bool) {
        self.confirm_response = Some(response);
    }

    pub fn set_interactive(&mut self, interactive: bool) {
        self.interactive = interactive;
    }

    pub fn messages(&self) -> &[String] {
        &self.messages
    }

    pub fn successes(&self) -> &[String] {
        &self.successes
    }

    pub fn warnings(&self) -> &[String] {
        &self.warnings
    }

    pub fn errors(&self) -> &[String] {
        &self.errors
    }

    pub fn headers(&self) -> &[String] {
        &self.headers
    }

    /// Questions asked through `confirm`.
    pub fn questions(&self) -> &[String] {
        &self.questions
    }

    pub fn spinner_events(&self) -> Vec<SpinnerEvent> {
        self.spinners.borrow().clone()
    }

    /// Whether any captured output line contains `needle`.
    pub fn has_output(&self, needle: &str) -> bool {
        self.messages
            .iter()
            .chain(&self.successes)
            .chain(&self.warnings)
            .chain(&self.errors)
            .any(|line| line.contains(needle))
    }
}

impl UserInterface for MockUI {
    fn output_mode(&self) -> OutputMode {
        self.mode
    }

    fn message(&mut self, msg: &str) {
        self.messages.push(msg.to_string());
    }

    fn success(&mut self, msg: &str) {
        self.successes.push(msg.to_string());
    }

    fn warning(&mut self, msg: &str) {
        self.warnings.push(msg.to_string());
    }

    fn error(&mut self, msg: &str) {
        self.errors.push(msg.to_string());
    }

    fn confirm(&mut self, question: &str, default: bool) -> Result<bool> {
        self.questions.push(question.to_string());
        Ok(self.confirm_response.unwrap_or(default))
    }

    fn start_spinner(&mut self, message: &str) -> Box<dyn SpinnerHandle> {
        self.spinners
            .borrow_mut()
            .push(SpinnerEvent::Started(message.to_string()));
        Box::new(MockSpinner {
            events: Rc::clone(&self.spinners),
        })
    }

    fn show_header(&mut self, title: &str) {
        self.headers.push(title.to_string());
    }

    fn is_interactive(&self) -> bool {
        self.interactive
    }
}

struct MockSpinner {
    events: Rc<RefCell<Vec<SpinnerEvent>>>,
}

impl SpinnerHandle for MockSpinner {
    fn set_message(&mut self, _msg: &str) {}

    fn finish_success(&mut self, msg: &str) {
        self.events
            .borrow_mut()
            .push(SpinnerEvent::Succeeded(msg.to_string()));
    }

    fn finish_error(&mut self, msg: &str) {
        self.events
            .borrow_mut()
            .push(SpinnerEvent::Failed(msg.to_string()));
    }

    fn finish_skipped(&mut self, msg: &str) {
        self.events
            .borrow_mut()
            .push(SpinnerEvent::Skipped(msg.to_string()));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn captures_spinner_lifecycle() {
        let mut ui = MockUI::new();
        let mut spinner = ui.start_spinner("extract");
        spinner.finish_success("extract");
        assert_eq!(
            ui.spinner_events(),
            vec![
                SpinnerEvent::Started("extract".to_string()),
                SpinnerEvent::Succeeded("extract".to_string())
            ]
        );
    }

    #[test]
    fn confirm_records_question() {
        let mut ui = MockUI::new();
        assert!(ui.confirm("Go?", true).unwrap());
        ui.set_confirm_response(false);
        assert!(!ui.confirm("Go?", true).unwrap());
        assert_eq!(ui.questions().len(), 2);
    }
}

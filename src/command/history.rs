//! Bounded undo/redo stacks.

use super::{Command, CommandTarget};
use crate::error::CommandError;
use std::collections::VecDeque;
use tracing::debug;

pub const DEFAULT_MAX_DEPTH: usize = 50;

#[derive(Debug)]
pub struct UndoHistory {
    undo: VecDeque<Command>,
    redo: Vec<Command>,
    max_depth: usize,
}

impl Default for UndoHistory {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_DEPTH)
    }
}

impl UndoHistory {
    pub fn new(max_depth: usize) -> Self {
        Self {
            undo: VecDeque::new(),
            redo: Vec::new(),
            max_depth,
        }
    }

    /// Apply `command` and record it as applied. Clears the redo stack.
    pub fn execute<T: CommandTarget + ?Sized>(
        &mut self,
        command: Command,
        target: &mut T,
    ) -> Result<(), CommandError> {
        let applied = command.apply(target)?;
        self.push_undo(applied);
        self.redo.clear();
        Ok(())
    }

    /// Invert the most recent command. On failure the entry stays on the undo stack.
    pub fn undo<T: CommandTarget + ?Sized>(&mut self, target: &mut T) -> Result<Command, CommandError> {
        let command = self.undo.pop_back().ok_or(CommandError::NothingToUndo)?;
        if let Err(err) = command.inverse().apply(target) {
            self.undo.push_back(command);
            return Err(err);
        }
        debug!(command = %command.description(), "Undid command");
        self.redo.push(command.clone());
        Ok(command)
    }

    /// Re-apply the most recently undone command. On failure the entry stays on the
    /// redo stack.
    pub fn redo<T: CommandTarget + ?Sized>(&mut self, target: &mut T) -> Result<Command, CommandError> {
        let command = self.redo.pop().ok_or(CommandError::NothingToRedo)?;
        if let Err(err) = command.apply(target) {
            self.redo.push(command);
            return Err(err);
        }
        debug!(command = %command.description(), "Redid command");
        self.push_undo(command.clone());
        Ok(command)
    }

    fn push_undo(&mut self, command: Command) {
        self.undo.push_back(command);
        while self.undo.len() > self.max_depth {
            self.undo.pop_front();
        }
    }

    pub fn can_undo(&self) -> bool {
        !self.undo.is_empty()
    }

    pub fn can_redo(&self) -> bool {
        !self.redo.is_empty()
    }

    pub fn peek_undo(&self) -> Option<&Command> {
        self.undo.back()
    }

    pub fn peek_redo(&self) -> Option<&Command> {
        self.redo.last()
    }

    pub fn undo_len(&self) -> usize {
        self.undo.len()
    }

    pub fn redo_len(&self) -> usize {
        self.redo.len()
    }

    pub fn clear(&mut self) {
        self.undo.clear();
        self.redo.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::test_support::MemoryTarget;
    use std::path::PathBuf;

    fn set_take(old: &str, new: &str) -> Command {
        Command::EditField {
            path: PathBuf::from("/t/a.wav"),
            field: "Take".to_string(),
            old_value: Some(old.to_string()),
            new_value: Some(new.to_string()),
        }
    }

    #[test]
    fn test_undo_redo_round_trip() {
        let mut target = MemoryTarget::with_records(&["/t/a.wav"]);
        let mut history = UndoHistory::new(10);

        history.execute(set_take("01", "02"), &mut target).unwrap();
        history.execute(set_take("02", "03"), &mut target).unwrap();
        assert_eq!(target.field("/t/a.wav", "Take").as_deref(), Some("03"));

        history.undo(&mut target).unwrap();
        history.undo(&mut target).unwrap();
        assert_eq!(target.field("/t/a.wav", "Take").as_deref(), Some("01"));
        assert!(!target.records[std::path::Path::new("/t/a.wav")].is_dirty());
        assert!(matches!(history.undo(&mut target), Err(CommandError::NothingToUndo)));

        history.redo(&mut target).unwrap();
        assert_eq!(target.field("/t/a.wav", "Take").as_deref(), Some("02"));
        assert_eq!(history.peek_redo().map(Command::description).as_deref(), Some("Edit Take"));
    }

    #[test]
    fn test_recorded_edit_holds_the_stored_value() {
        let mut target = MemoryTarget::with_records(&["/t/a.wav"]);
        let mut history = UndoHistory::new(10);
        history.execute(set_take("01", " 02 "), &mut target).unwrap();
        assert_eq!(target.field("/t/a.wav", "Take").as_deref(), Some("02"));
        match history.peek_undo() {
            Some(Command::EditField { field, new_value, .. }) => {
                assert_eq!(field, "TAKE");
                assert_eq!(new_value.as_deref(), Some("02"));
            }
            other => panic!("unexpected entry {other:?}"),
        }

        history.undo(&mut target).unwrap();
        assert_eq!(target.field("/t/a.wav", "Take").as_deref(), Some("01"));
        assert!(!target.records[std::path::Path::new("/t/a.wav")].is_dirty());
        history.redo(&mut target).unwrap();
        assert_eq!(target.field("/t/a.wav", "Take").as_deref(), Some("02"));
    }

    #[test]
    fn test_execute_clears_redo() {
        let mut target = MemoryTarget::with_records(&["/t/a.wav"]);
        let mut history = UndoHistory::new(10);
        history.execute(set_take("01", "02"), &mut target).unwrap();
        history.undo(&mut target).unwrap();
        assert!(history.can_redo());
        history.execute(set_take("01", "04"), &mut target).unwrap();
        assert!(!history.can_redo());
        assert!(matches!(history.redo(&mut target), Err(CommandError::NothingToRedo)));
    }

    #[test]
    fn test_overflow_evicts_oldest_and_keeps_redo() {
        let mut target = MemoryTarget::with_records(&["/t/a.wav"]);
        let mut history = UndoHistory::new(2);
        history.execute(set_take("01", "02"), &mut target).unwrap();
        history.execute(set_take("02", "03"), &mut target).unwrap();
        history.execute(set_take("03", "04"), &mut target).unwrap();
        assert_eq!(history.undo_len(), 2);

        history.undo(&mut target).unwrap();
        history.undo(&mut target).unwrap();
        assert!(!history.can_undo());
        assert_eq!(history.redo_len(), 2);
        // The first edit was evicted, so the oldest value is out of reach.
        assert_eq!(target.field("/t/a.wav", "Take").as_deref(), Some("02"));
    }

    #[test]
    fn test_failed_undo_keeps_entry() {
        let mut target = MemoryTarget::with_records(&["/t/a.wav"]);
        let mut history = UndoHistory::new(10);
        history.execute(set_take("01", "02"), &mut target).unwrap();

        // Something outside the history changed the field.
        target
            .records
            .get_mut(std::path::Path::new("/t/a.wav"))
            .unwrap()
            .fields_mut()
            .set("Take", Some("09"))
            .unwrap();

        assert!(matches!(history.undo(&mut target), Err(CommandError::StaleValue { .. })));
        assert!(history.can_undo());
        assert!(!history.can_redo());
    }
}

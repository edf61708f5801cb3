//! Viewing/Editing state machine over a store's snapshot.

use log::debug;

use crate::{
    address::Segment,
    error::{KitError, Result},
    store::DataStore,
};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum EditState {
    #[default]
    Viewing,
    Editing,
}

/// What an edit transition did, reported to the caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Transition {
    Entered,
    Committed,
    /// The segments whose bytes the revert restored.
    Cancelled { reverted: Vec<Segment> },
}

#[derive(Debug, Default)]
pub struct EditSession {
    state: EditState,
}

impl EditSession {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> EditState {
        self.state
    }

    pub fn is_editing(&self) -> bool {
        self.state == EditState::Editing
    }

    fn require(&self, state: EditState, action: &str) -> Result<()> {
        if self.state == state {
            Ok(())
        } else {
            Err(KitError::invariant(format!("cannot {action} while {:?}", self.state)))
        }
    }

    /// Snapshots the store and starts editing.
    pub fn enter(&mut self, store: &mut DataStore) -> Result<Transition> {
        self.require(EditState::Viewing, "enter edit mode")?;
        store.snapshot()?;
        self.state = EditState::Editing;
        debug!("entered edit mode");
        Ok(Transition::Entered)
    }

    /// Keeps every edit made since [`enter`](Self::enter).
    pub fn commit(&mut self, store: &mut DataStore) -> Result<Transition> {
        self.require(EditState::Editing, "commit")?;
        store.commit_snapshot()?;
        self.state = EditState::Viewing;
        debug!("committed edits");
        Ok(Transition::Committed)
    }

    /// Restores the image captured on [`enter`](Self::enter).
    pub fn cancel(&mut self, store: &mut DataStore) -> Result<Transition> {
        self.require(EditState::Editing, "cancel")?;
        let reverted = store.revert_snapshot()?;
        self.state = EditState::Viewing;
        debug!("cancelled edits, {} segments reverted", reverted.len());
        Ok(Transition::Cancelled { reverted })
    }
}

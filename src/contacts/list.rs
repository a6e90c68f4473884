// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use std::sync::{Mutex, MutexGuard};

use tracing::warn;

use crate::{
    cfg::config::Identity,
    contacts::contact::{Contact, Endpoint},
    errors::{DchatError, Result},
};

/// Step by which the slot table grows when full and shrinks when a full step
/// of headroom opens up.
pub const GROW_STEP: usize = 8;

/// Result of a contactlist lookup. The local identity is checked
/// transparently before the slots so a gossip entry naming ourselves is
/// reported distinctly.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Find {
    /// The endpoint is the local participant.
    Local,
    /// The endpoint occupies this slot.
    Slot(usize),
}

/// Outcome of duplicate resolution for a slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution {
    /// The endpoint occurs once; nothing to do.
    Unique,
    /// Converged: this slot must be evicted.
    Evict(usize),
}

/// Dynamic table of contact slots.
///
/// Slot indices are stable for the lifetime of a session: insertion picks the
/// lowest-index empty slot, growth appends, and capacity reduction only ever
/// drops trailing empty slots.
#[derive(Debug, Default)]
pub struct ContactList {
    slots: Vec<Option<Contact>>,
    used: usize,
    next_generation: u64,
}

impl ContactList {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    pub fn used(&self) -> usize {
        self.used
    }

    pub fn get(&self, n: usize) -> Option<&Contact> {
        self.slots.get(n).and_then(Option::as_ref)
    }

    pub fn get_mut(&mut self, n: usize) -> Option<&mut Contact> {
        self.slots.get_mut(n).and_then(Option::as_mut)
    }

    /// True when `generation` still names the current occupant of slot `n`.
    pub fn check_generation(&self, n: usize, generation: u64) -> bool {
        self.get(n).is_some_and(|c| c.generation == generation)
    }

    pub fn iter_occupied(&self) -> impl Iterator<Item = (usize, &Contact)> {
        self.slots
            .iter()
            .enumerate()
            .filter_map(|(i, s)| s.as_ref().map(|c| (i, c)))
    }

    /// Inserts a contact into the lowest-index empty slot, growing the table
    /// by one step when it is full. Returns the slot index and the generation
    /// tag assigned to this occupancy.
    pub fn add(&mut self, mut contact: Contact) -> (usize, u64) {
        if self.used == self.slots.len() {
            let grown = self.slots.len() + GROW_STEP;
            self.slots.resize_with(grown, || None);
        }

        let generation = self.next_generation;
        self.next_generation += 1;
        contact.generation = generation;

        let slot = self
            .slots
            .iter()
            .position(Option::is_none)
            .unwrap_or_else(|| unreachable!("table grown above"));
        self.slots[slot] = Some(contact);
        self.used += 1;
        (slot, generation)
    }

    /// Frees slot `n`: cancels the contact's session (closing its socket via
    /// the reader task), clears the slot and opportunistically shrinks the
    /// table. Index violations are internal contract errors.
    pub fn delete(&mut self, n: usize) -> Result<()> {
        if n >= self.slots.len() {
            return Err(DchatError::Programming(format!(
                "slot index {n} out of bounds (capacity {})",
                self.slots.len()
            )));
        }
        let Some(contact) = self.slots[n].take() else {
            return Err(DchatError::Programming(format!("slot {n} is already empty")));
        };
        contact.cancel.cancel();
        self.used -= 1;
        self.shrink();
        Ok(())
    }

    /// Drops trailing empty slots one step at a time while a full step of
    /// headroom exists and the table stays nonempty. Never relocates a live
    /// slot.
    fn shrink(&mut self) {
        while self.used != 0
            && self.slots.len() >= self.used + GROW_STEP
            && self.slots[self.slots.len() - GROW_STEP..]
                .iter()
                .all(Option::is_none)
        {
            self.slots.truncate(self.slots.len() - GROW_STEP);
        }
    }

    /// Linear scan for `endpoint` beginning at slot `start`, transparently
    /// checking the local identity first. Only identified slots participate.
    pub fn find(&self, endpoint: &Endpoint, start: usize, local: &Identity) -> Option<Find> {
        if start == 0 && Endpoint::from(local) == *endpoint {
            return Some(Find::Local);
        }
        (start..self.slots.len())
            .find(|&i| {
                self.get(i)
                    .is_some_and(|c| c.is_identified() && c.endpoint.as_ref() == Some(endpoint))
            })
            .map(Find::Slot)
    }

    /// Duplicate resolution for the occupant of slot `n`.
    ///
    /// Two peers that open sessions to each other concurrently briefly hold
    /// two slots for the same endpoint. Both sides order the two endpoints by
    /// their `(onion_id, port)` pair: the endpoint with the greater pair keeps
    /// its connecting slot and evicts its accepting one, the lesser endpoint
    /// does the symmetric thing, so the mesh converges without communication.
    /// A contact that resolves to the local identity is evicted outright.
    pub fn duplicate_of(&self, n: usize, local: &Identity) -> Result<Resolution> {
        let contact = self
            .get(n)
            .ok_or_else(|| DchatError::Programming(format!("slot {n} is empty")))?;
        let endpoint = contact.endpoint.as_ref().ok_or_else(|| {
            DchatError::Programming(format!("slot {n} has no identified endpoint"))
        })?;

        let first = match self.find(endpoint, 0, local) {
            Some(Find::Local) => return Ok(Resolution::Evict(n)),
            Some(Find::Slot(i)) => i,
            None => {
                return Err(DchatError::Programming(format!(
                    "identified slot {n} not found in its own table"
                )));
            },
        };
        let Some(Find::Slot(second)) = self.find(endpoint, first + 1, local) else {
            return Ok(Resolution::Unique);
        };

        let first_accepted = self.get(first).is_some_and(|c| c.accepted);
        let second_accepted = self.get(second).is_some_and(|c| c.accepted);
        if first_accepted == second_accepted {
            // Should not happen with one session per direction; converge on
            // the later occurrence.
            warn!(first, second, "duplicate slots share a direction");
            return Ok(Resolution::Evict(second));
        }
        let (connecting, accepting) = if first_accepted {
            (second, first)
        } else {
            (first, second)
        };

        let mine = Endpoint::from(local);
        Ok(match mine.cmp(endpoint) {
            std::cmp::Ordering::Greater => Resolution::Evict(accepting),
            std::cmp::Ordering::Less => Resolution::Evict(connecting),
            std::cmp::Ordering::Equal => {
                warn!(slot = n, "contact is stored twice under the local pair");
                Resolution::Evict(accepting)
            },
        })
    }
}

/// The single shared structure of the client; every task reads and writes
/// slot state through this mutex and releases it before any suspension point.
#[derive(Debug, Default)]
pub struct ContactBook {
    inner: Mutex<ContactList>,
}

impl ContactBook {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn lock(&self) -> MutexGuard<'_, ContactList> {
        self.inner.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}

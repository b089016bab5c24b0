//! SubscriptionRegistry: a generational arena of live-query slots.
//!
//! A [`SubscriptionId`] is a slot index plus the slot's generation at
//! registration. Unregistering bumps the generation, so stale ids never
//! reach a slot's next occupant.
//!
//! Callbacks are checked out while they run and checked back in afterwards.
//! A subscription cancelled in between stays cancelled: check-in only
//! succeeds while the id is still live.

use std::collections::BTreeSet;

use super::tracker::ChangeSet;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriptionId {
    index: u32,
    generation: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubscriptionState {
    /// Registered, nothing delivered yet.
    Pending,
    /// Delivered at least once; waiting for the next matching commit.
    Active,
    /// Terminal.
    Cancelled,
}

struct Entry<C> {
    dependencies: BTreeSet<String>,
    callback: Option<C>,
    delivered: bool,
}

struct Slot<C> {
    generation: u32,
    entry: Option<Entry<C>>,
}

pub struct SubscriptionRegistry<C> {
    slots: Vec<Slot<C>>,
    free: Vec<u32>,
    live: usize,
}

impl<C> SubscriptionRegistry<C> {
    pub fn new() -> Self {
        Self {
            slots: Vec::new(),
            free: Vec::new(),
            live: 0,
        }
    }

    pub fn register(&mut self, dependencies: BTreeSet<String>, callback: C) -> SubscriptionId {
        let entry = Entry {
            dependencies,
            callback: Some(callback),
            delivered: false,
        };
        self.live += 1;
        if let Some(index) = self.free.pop() {
            let slot = &mut self.slots[index as usize];
            slot.entry = Some(entry);
            return SubscriptionId {
                index,
                generation: slot.generation,
            };
        }
        let index = self.slots.len() as u32;
        self.slots.push(Slot {
            generation: 0,
            entry: Some(entry),
        });
        SubscriptionId {
            index,
            generation: 0,
        }
    }

    /// Remove the entry, handing back its callback unless it is out for
    /// delivery. Callers drop the callback after releasing their lock, since
    /// dropping it may drop other subscriptions.
    pub fn unregister(&mut self, id: SubscriptionId) -> Option<C> {
        let slot = self.slot_mut(id)?;
        let entry = slot.entry.take()?;
        slot.generation = slot.generation.wrapping_add(1);
        self.free.push(id.index);
        self.live -= 1;
        entry.callback
    }

    pub fn is_live(&self, id: SubscriptionId) -> bool {
        self.entry(id).is_some()
    }

    pub fn state(&self, id: SubscriptionId) -> SubscriptionState {
        match self.entry(id) {
            None => SubscriptionState::Cancelled,
            Some(entry) if entry.delivered => SubscriptionState::Active,
            Some(_) => SubscriptionState::Pending,
        }
    }

    pub fn dependencies(&self, id: SubscriptionId) -> Option<&BTreeSet<String>> {
        self.entry(id).map(|entry| &entry.dependencies)
    }

    /// Ids whose dependency set meets `changes`, in registration-slot order.
    pub fn overlapping(&self, changes: &ChangeSet) -> Vec<SubscriptionId> {
        self.slots
            .iter()
            .enumerate()
            .filter_map(|(index, slot)| {
                let entry = slot.entry.as_ref()?;
                if entry.dependencies.is_disjoint(changes) {
                    return None;
                }
                Some(SubscriptionId {
                    index: index as u32,
                    generation: slot.generation,
                })
            })
            .collect()
    }

    /// Take the callback out for a delivery. `None` if the id is stale or the
    /// callback is already running.
    pub fn checkout(&mut self, id: SubscriptionId) -> Option<C> {
        self.slot_mut(id)?.entry.as_mut()?.callback.take()
    }

    /// Return a callback after a delivery and mark the entry active.
    ///
    /// Returns the callback back if the subscription was cancelled meanwhile.
    pub fn checkin(&mut self, id: SubscriptionId, callback: C) -> Option<C> {
        match self.slot_mut(id).and_then(|slot| slot.entry.as_mut()) {
            Some(entry) => {
                entry.callback = Some(callback);
                entry.delivered = true;
                None
            }
            None => Some(callback),
        }
    }

    pub fn len(&self) -> usize {
        self.live
    }

    pub fn is_empty(&self) -> bool {
        self.live == 0
    }

    /// Cancel everything, returning the callbacks that were at rest.
    pub fn drain(&mut self) -> Vec<C> {
        let mut callbacks = Vec::with_capacity(self.live);
        for (index, slot) in self.slots.iter_mut().enumerate() {
            if let Some(entry) = slot.entry.take() {
                slot.generation = slot.generation.wrapping_add(1);
                self.free.push(index as u32);
                callbacks.extend(entry.callback);
            }
        }
        self.live = 0;
        callbacks
    }

    fn entry(&self, id: SubscriptionId) -> Option<&Entry<C>> {
        let slot = self.slots.get(id.index as usize)?;
        if slot.generation != id.generation {
            return None;
        }
        slot.entry.as_ref()
    }

    fn slot_mut(&mut self, id: SubscriptionId) -> Option<&mut Slot<C>> {
        let slot = self.slots.get_mut(id.index as usize)?;
        if slot.generation != id.generation || slot.entry.is_none() {
            return None;
        }
        Some(slot)
    }
}

impl<C> Default for SubscriptionRegistry<C> {
    fn default() -> Self {
        Self::new()
    }
}

//! Generation-counted slot arena for callout records.
//!
//! Records live in a `Vec` of slots with a free list for reuse. A slot keeps
//! its index for the life of the wheel, which lets the link table address
//! entries by slot number. Each slot carries a generation counter that is
//! bumped on removal, so a handle to a released record is detectably stale
//! rather than silently aliasing whatever reused the slot.

use core::fmt;

/// A slot index paired with the generation it was issued under.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ArenaIndex {
    index: u32,
    generation: u32,
}

impl ArenaIndex {
    /// The raw slot number.
    #[must_use]
    pub const fn index(self) -> u32 {
        self.index
    }
}

impl fmt::Debug for ArenaIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.index, self.generation)
    }
}

#[derive(Debug)]
enum Slot<T> {
    Occupied { value: T, generation: u32 },
    Vacant { next_free: Option<u32>, generation: u32 },
}

/// Slot arena with generation-validated indices.
#[derive(Debug)]
pub(crate) struct Arena<T> {
    slots: Vec<Slot<T>>,
    free_head: Option<u32>,
    len: usize,
}

impl<T> Arena<T> {
    /// Creates an empty arena.
    pub(crate) const fn new() -> Self {
        Self {
            slots: Vec::new(),
            free_head: None,
            len: 0,
        }
    }

    /// Number of occupied slots.
    pub(crate) const fn len(&self) -> usize {
        self.len
    }

    /// Total number of slots ever allocated, vacant ones included.
    pub(crate) fn slot_count(&self) -> usize {
        self.slots.len()
    }

    /// Inserts `value`, reusing a vacant slot when one exists.
    pub(crate) fn insert(&mut self, value: T) -> ArenaIndex {
        self.len += 1;
        if let Some(index) = self.free_head {
            let slot = &mut self.slots[index as usize];
            let Slot::Vacant {
                next_free,
                generation,
            } = slot
            else {
                unreachable!("free list pointed at occupied slot");
            };
            let generation = *generation;
            self.free_head = *next_free;
            *slot = Slot::Occupied { value, generation };
            ArenaIndex { index, generation }
        } else {
            let index = u32::try_from(self.slots.len()).expect("arena overflow");
            self.slots.push(Slot::Occupied {
                value,
                generation: 0,
            });
            ArenaIndex {
                index,
                generation: 0,
            }
        }
    }

    /// Removes the record at `index`. Returns `None` if the index is stale.
    pub(crate) fn remove(&mut self, index: ArenaIndex) -> Option<T> {
        let slot = self.slots.get_mut(index.index as usize)?;
        match slot {
            Slot::Occupied { generation, .. } if *generation == index.generation => {
                let next_generation = generation.wrapping_add(1);
                let old = core::mem::replace(
                    slot,
                    Slot::Vacant {
                        next_free: self.free_head,
                        generation: next_generation,
                    },
                );
                self.free_head = Some(index.index);
                self.len -= 1;
                match old {
                    Slot::Occupied { value, .. } => Some(value),
                    Slot::Vacant { .. } => unreachable!(),
                }
            }
            _ => None,
        }
    }

    /// Looks up `index`, failing on stale generations.
    pub(crate) fn get(&self, index: ArenaIndex) -> Option<&T> {
        match self.slots.get(index.index as usize)? {
            Slot::Occupied { value, generation } if *generation == index.generation => Some(value),
            _ => None,
        }
    }

    /// Mutable lookup, failing on stale generations.
    pub(crate) fn get_mut(&mut self, index: ArenaIndex) -> Option<&mut T> {
        match self.slots.get_mut(index.index as usize)? {
            Slot::Occupied { value, generation } if *generation == index.generation => Some(value),
            _ => None,
        }
    }

    /// Looks up an occupied slot by raw slot number, returning its full
    /// index alongside the record. Used when an entry is reached through the
    /// link table, which only knows slot numbers.
    pub(crate) fn get_by_slot_mut(&mut self, slot: u32) -> Option<(ArenaIndex, &mut T)> {
        match self.slots.get_mut(slot as usize)? {
            Slot::Occupied { value, generation } => Some((
                ArenaIndex {
                    index: slot,
                    generation: *generation,
                },
                value,
            )),
            Slot::Vacant { .. } => None,
        }
    }

    /// Shared-reference variant of [`Arena::get_by_slot_mut`].
    pub(crate) fn get_by_slot(&self, slot: u32) -> Option<(ArenaIndex, &T)> {
        match self.slots.get(slot as usize)? {
            Slot::Occupied { value, generation } => Some((
                ArenaIndex {
                    index: slot,
                    generation: *generation,
                },
                value,
            )),
            Slot::Vacant { .. } => None,
        }
    }
}

//! Generational Arena
//!
//! Slot storage addressed by `(index, generation)`. A freed slot is reused
//! by the next insert with its generation bumped, so a stale handle never
//! aliases the new occupant.

use serde::{Serialize, Deserialize};

/// Slot address inside an [`Arena`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Index {
    /// Slot position.
    pub index: u32,
    /// Number of times the slot has been freed.
    pub generation: u32,
}

impl Index {
    /// Pack into a single integer: low 32 bits index, high 32 bits generation.
    #[inline]
    pub fn to_raw(self) -> u64 {
        self.index as u64 | ((self.generation as u64) << 32)
    }

    /// Inverse of [`Index::to_raw`].
    #[inline]
    pub fn from_raw(raw: u64) -> Self {
        Self {
            index: raw as u32,
            generation: (raw >> 32) as u32,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
struct Slot<T> {
    generation: u32,
    value: Option<T>,
}

/// Generational arena.
///
/// Deserialization checks the free list and live count against the slots,
/// so a decoded arena upholds the same invariants as a built one.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(try_from = "RawArena<T>", bound(deserialize = "T: Deserialize<'de>"))]
pub struct Arena<T> {
    slots: Vec<Slot<T>>,
    free: Vec<u32>,
    len: usize,
}

/// Arena as it appears on the wire, before validation.
#[derive(Deserialize)]
struct RawArena<T> {
    slots: Vec<Slot<T>>,
    free: Vec<u32>,
    len: usize,
}

impl<T> TryFrom<RawArena<T>> for Arena<T> {
    type Error = String;

    fn try_from(raw: RawArena<T>) -> Result<Self, Self::Error> {
        if raw.slots.len() > u32::MAX as usize {
            return Err(format!("{} slots exceed u32 indices", raw.slots.len()));
        }

        let mut listed = vec![false; raw.slots.len()];
        for &index in &raw.free {
            let slot = raw
                .slots
                .get(index as usize)
                .ok_or_else(|| format!("free slot {} out of range ({} slots)", index, raw.slots.len()))?;
            if slot.value.is_some() {
                return Err(format!("free slot {} is occupied", index));
            }
            if std::mem::replace(&mut listed[index as usize], true) {
                return Err(format!("free slot {} listed twice", index));
            }
        }

        let live = raw.slots.iter().filter(|slot| slot.value.is_some()).count();
        if live != raw.len {
            return Err(format!("live count {} but {} occupied slots", raw.len, live));
        }

        Ok(Self {
            slots: raw.slots,
            free: raw.free,
            len: raw.len,
        })
    }
}

impl<T> Default for Arena<T> {
    fn default() -> Self {
        Self {
            slots: Vec::new(),
            free: Vec::new(),
            len: 0,
        }
    }
}

impl<T> Arena<T> {
    /// Create an empty arena.
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a value, reusing the most recently freed slot if any.
    pub fn insert(&mut self, value: T) -> Index {
        self.len += 1;

        if let Some(index) = self.free.pop() {
            let slot = &mut self.slots[index as usize];
            slot.value = Some(value);
            return Index { index, generation: slot.generation };
        }

        let index = self.slots.len() as u32;
        self.slots.push(Slot { generation: 0, value: Some(value) });
        Index { index, generation: 0 }
    }

    /// Remove the value at `at`. Stale or unknown indices return `None`.
    pub fn remove(&mut self, at: Index) -> Option<T> {
        let slot = self.slots.get_mut(at.index as usize)?;
        if slot.generation != at.generation {
            return None;
        }
        let value = slot.value.take()?;
        slot.generation = slot.generation.wrapping_add(1);
        self.free.push(at.index);
        self.len -= 1;
        Some(value)
    }

    /// Borrow the value at `at`.
    pub fn get(&self, at: Index) -> Option<&T> {
        self.slots
            .get(at.index as usize)
            .filter(|slot| slot.generation == at.generation)
            .and_then(|slot| slot.value.as_ref())
    }

    /// Mutably borrow the value at `at`.
    pub fn get_mut(&mut self, at: Index) -> Option<&mut T> {
        self.slots
            .get_mut(at.index as usize)
            .filter(|slot| slot.generation == at.generation)
            .and_then(|slot| slot.value.as_mut())
    }

    /// Whether `at` points at a live value.
    pub fn contains(&self, at: Index) -> bool {
        self.get(at).is_some()
    }

    /// Number of live values.
    pub fn len(&self) -> usize {
        self.len
    }

    /// Whether the arena holds no live values.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Live values in slot order.
    pub fn iter(&self) -> impl Iterator<Item = (Index, &T)> {
        self.slots.iter().enumerate().filter_map(|(i, slot)| {
            slot.value.as_ref().map(|value| {
                (Index { index: i as u32, generation: slot.generation }, value)
            })
        })
    }

    /// Mutable live values in slot order.
    pub fn iter_mut(&mut self) -> impl Iterator<Item = (Index, &mut T)> {
        self.slots.iter_mut().enumerate().filter_map(|(i, slot)| {
            let generation = slot.generation;
            slot.value.as_mut().map(|value| {
                (Index { index: i as u32, generation }, value)
            })
        })
    }

    /// Live indices in slot order.
    pub fn indices(&self) -> Vec<Index> {
        self.iter().map(|(index, _)| index).collect()
    }
}

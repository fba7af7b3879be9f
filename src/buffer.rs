//! A resizable character accumulator used to build stage command text.
//!
//! Short command texts (the common case) live in an inline array; once an append would
//! overflow it, the buffer moves to heap storage and keeps doubling from there.

use std::fmt;

/// Number of characters the inline storage can hold, terminator slot included.
pub const INLINE_CAPACITY: usize = 28;

enum Storage {
    Inline([char; INLINE_CAPACITY]),
    Heap(Box<[char]>),
}

/// Growable character buffer with an inline fast path.
///
/// One slot is always kept free past the content (`len() < capacity()`), so the
/// buffer can hand out a terminated view without reallocating.
pub struct GrowableBuffer {
    len: usize,
    storage: Storage,
}

impl GrowableBuffer {
    /// Create an empty, inline-backed buffer.
    pub fn new() -> Self {
        Self {
            len: 0,
            storage: Storage::Inline(['\0'; INLINE_CAPACITY]),
        }
    }

    /// Append a single character.
    pub fn append(&mut self, c: char) {
        self.reserve(1);
        let len = self.len;
        self.slots_mut()[len] = c;
        self.len += 1;
    }

    /// Append a run of characters in one go.
    pub fn append_slice(&mut self, chars: &[char]) {
        if chars.is_empty() {
            return;
        }
        self.reserve(chars.len());
        let len = self.len;
        self.slots_mut()[len..len + chars.len()].copy_from_slice(chars);
        self.len += chars.len();
    }

    /// Append every character of `s`.
    pub fn append_str(&mut self, s: &str) {
        let chars: Vec<char> = s.chars().collect();
        self.append_slice(&chars);
    }

    /// Drop the content. Heap storage is released and the buffer starts over inline.
    pub fn clear(&mut self) {
        self.len = 0;
        self.storage = Storage::Inline(['\0'; INLINE_CAPACITY]);
    }

    /// Trim leading and trailing whitespace in place.
    pub fn strip(&mut self) {
        let data = self.data();
        let Some(start) = data.iter().position(|c| !c.is_whitespace()) else {
            self.len = 0;
            return;
        };
        // `start` found a non-whitespace char, so a last one exists too.
        let end = data
            .iter()
            .rposition(|c| !c.is_whitespace())
            .unwrap_or(start);
        let new_len = end - start + 1;
        self.slots_mut().copy_within(start..=end, 0);
        self.len = new_len;
    }

    /// The accumulated characters.
    pub fn data(&self) -> &[char] {
        &self.slots()[..self.len]
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn capacity(&self) -> usize {
        self.slots().len()
    }

    /// Whether the content still lives in the inline array.
    pub fn is_inline(&self) -> bool {
        matches!(self.storage, Storage::Inline(_))
    }

    /// Make room for `extra` more characters plus the reserved slot.
    fn reserve(&mut self, extra: usize) {
        let required = self.len + extra;
        if required < self.capacity() {
            return;
        }
        let new_capacity = required * 2;
        let mut grown = vec!['\0'; new_capacity].into_boxed_slice();
        grown[..self.len].copy_from_slice(self.data());
        // The previous heap allocation, if any, is freed here.
        self.storage = Storage::Heap(grown);
    }

    fn slots(&self) -> &[char] {
        match &self.storage {
            Storage::Inline(slots) => &slots[..],
            Storage::Heap(slots) => &slots[..],
        }
    }

    fn slots_mut(&mut self) -> &mut [char] {
        match &mut self.storage {
            Storage::Inline(slots) => &mut slots[..],
            Storage::Heap(slots) => &mut slots[..],
        }
    }
}

impl Default for GrowableBuffer {
    fn default() -> Self {
        Self::new()
    }
}

impl From<&str> for GrowableBuffer {
    fn from(s: &str) -> Self {
        let mut buffer = Self::new();
        buffer.append_str(s);
        buffer
    }
}

impl fmt::Display for GrowableBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        use fmt::Write;
        for c in self.data() {
            f.write_char(*c)?;
        }
        Ok(())
    }
}

impl fmt::Debug for GrowableBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GrowableBuffer")
            .field("text", &self.to_string())
            .field("len", &self.len)
            .field("capacity", &self.capacity())
            .finish()
    }
}

impl PartialEq for GrowableBuffer {
    fn eq(&self, other: &Self) -> bool {
        self.data() == other.data()
    }
}

impl Eq for GrowableBuffer {}

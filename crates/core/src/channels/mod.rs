/// Fixed-size pool of output channels.
///
/// Allocation always hands out the lowest free index so that channel usage is
/// deterministic for a given sequence of note-on and note-off commands.
#[derive(Debug, Clone)]
pub struct ChannelRegistry {
    occupied: Vec<bool>,
}

impl ChannelRegistry {
    pub fn new(capacity: usize) -> Self {
        Self {
            occupied: vec![false; capacity],
        }
    }

    pub fn capacity(&self) -> usize {
        self.occupied.len()
    }

    /// Marks the lowest free slot occupied and returns it, or `None` when
    /// every slot is taken.
    pub fn allocate(&mut self) -> Option<u8> {
        let index = self.occupied.iter().position(|taken| !taken)?;
        let channel = u8::try_from(index).ok()?;
        self.occupied[index] = true;
        Some(channel)
    }

    /// Releases a slot. Returns `false` and leaves the pool untouched when the
    /// slot was not allocated.
    pub fn free(&mut self, channel: u8) -> bool {
        match self.occupied.get_mut(usize::from(channel)) {
            Some(slot) if *slot => {
                *slot = false;
                true
            }
            _ => {
                tracing::warn!(channel, "ignoring release of a channel that is not allocated");
                false
            }
        }
    }

    pub fn is_allocated(&self, channel: u8) -> bool {
        self.occupied
            .get(usize::from(channel))
            .copied()
            .unwrap_or(false)
    }

    /// Indices of all occupied slots in ascending order.
    pub fn allocated(&self) -> Vec<u8> {
        self.occupied
            .iter()
            .enumerate()
            .filter(|(_, taken)| **taken)
            .filter_map(|(index, _)| u8::try_from(index).ok())
            .collect()
    }

    pub fn in_use(&self) -> usize {
        self.occupied.iter().filter(|taken| **taken).count()
    }
}

impl Default for ChannelRegistry {
    fn default() -> Self {
        Self::new(16)
    }
}

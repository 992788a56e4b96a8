//! Virtual motion sensor cycling through rooms.

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VirtualMotionSensor {
    rooms: Vec<String>,
    every: u64,
}

impl VirtualMotionSensor {
    /// Detect motion every `every` ticks, visiting `rooms` in turn.
    #[must_use]
    pub fn new(rooms: Vec<String>, every: u64) -> Self {
        Self {
            rooms,
            every: every.max(1),
        }
    }

    /// The room where motion is detected at `tick`, if any.
    #[must_use]
    pub fn detect(&self, tick: u64) -> Option<&str> {
        if self.rooms.is_empty() || tick == 0 || tick % self.every != 0 {
            return None;
        }
        let rooms = u64::try_from(self.rooms.len()).ok()?;
        let idx = usize::try_from((tick / self.every - 1) % rooms).ok()?;
        self.rooms.get(idx).map(String::as_str)
    }
}

//! Client input management with sequencing and fire edge detection
//!
//! The window/event layer is outside this crate; the embedder pushes raw key
//! state in through [`InputManager::set_key`] and the tick loop samples one
//! [`InputState`] per frame.

use shared::epoch_micros;

/// Boolean key state driving the vehicle for one simulation tick.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InputState {
    pub sequence: u32,
    pub timestamp: u64,
    pub forward: bool,
    pub reverse: bool,
    pub left: bool,
    pub right: bool,
    pub fire: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Key {
    Forward,
    Reverse,
    Left,
    Right,
    Fire,
}

/// Collects raw key state and stamps sampled inputs with a sequence number
/// and timestamp. Fire is edge-detected so holding the trigger emits one
/// shot per press.
pub struct InputManager {
    next_sequence: u32,
    keys: InputState,
    prev_fire: bool,
}

impl InputManager {
    pub fn new() -> Self {
        Self {
            next_sequence: 1,
            keys: InputState::default(),
            prev_fire: false,
        }
    }

    pub fn set_key(&mut self, key: Key, down: bool) {
        match key {
            Key::Forward => self.keys.forward = down,
            Key::Reverse => self.keys.reverse = down,
            Key::Left => self.keys.left = down,
            Key::Right => self.keys.right = down,
            Key::Fire => self.keys.fire = down,
        }
    }

    /// Samples the current key state. The bool is true on the tick the fire
    /// key transitioned from released to held.
    pub fn sample(&mut self) -> (InputState, bool) {
        let fire_pressed = self.keys.fire && !self.prev_fire;
        self.prev_fire = self.keys.fire;

        let mut input = self.keys.clone();
        input.sequence = self.next_sequence;
        input.timestamp = epoch_micros();
        self.next_sequence += 1;

        (input, fire_pressed)
    }
}

impl Default for InputManager {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sample_stamps_sequence() {
        let mut manager = InputManager::new();
        let (first, _) = manager.sample();
        let (second, _) = manager.sample();
        assert_eq!(first.sequence, 1);
        assert_eq!(second.sequence, 2);
        assert!(second.timestamp >= first.timestamp);
    }

    #[test]
    fn test_key_state_is_sampled() {
        let mut manager = InputManager::new();
        manager.set_key(Key::Forward, true);
        manager.set_key(Key::Left, true);

        let (input, _) = manager.sample();
        assert!(input.forward);
        assert!(input.left);
        assert!(!input.reverse);
        assert!(!input.right);
    }

    #[test]
    fn test_fire_is_edge_detected() {
        let mut manager = InputManager::new();

        manager.set_key(Key::Fire, true);
        let (_, fired) = manager.sample();
        assert!(fired);

        // Held across the next tick: no second shot
        let (_, fired) = manager.sample();
        assert!(!fired);

        manager.set_key(Key::Fire, false);
        manager.sample();
        manager.set_key(Key::Fire, true);
        let (_, fired) = manager.sample();
        assert!(fired);
    }
}

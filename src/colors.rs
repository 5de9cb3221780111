//! Display color allocation for aliases.
//!
//! Each live alias gets a deterministic color via a hash-based probe over a
//! 32-entry palette, preferring entries no live alias currently holds. When
//! the palette is exhausted a procedurally generated HSL color is used.
//! Determinism is a property of the `alias|ip` seed, not of time.

use parking_lot::Mutex;
use std::collections::HashMap;

/// The 32-entry display palette.
pub const PALETTE: [&str; 32] = [
    "#e6194b", "#3cb44b", "#ffe119", "#4363d8", "#f58231", "#911eb4", "#46f0f0", "#f032e6",
    "#bcf60c", "#fabebe", "#008080", "#e6beff", "#9a6324", "#fffac8", "#800000", "#aaffc3",
    "#808000", "#ffd8b1", "#000075", "#a9a9a9", "#2f9e44", "#1971c2", "#e8590c", "#5f3dc4",
    "#c2255c", "#0b7285", "#5c940d", "#d9480f", "#364fc7", "#862e9c", "#087f5b", "#9c36b5",
];

/// FNV-1a over the seed string.
fn seed_hash(seed: &str) -> u64 {
    let mut hash: u64 = 0xcbf29ce484222325;
    for byte in seed.as_bytes() {
        hash ^= u64::from(*byte);
        hash = hash.wrapping_mul(0x100000001b3);
    }
    hash
}

/// Tracks palette usage across live aliases and hands out colors.
#[derive(Debug, Default)]
pub struct ColorAllocator {
    in_use: Mutex<HashMap<String, u32>>,
}

impl ColorAllocator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Assign a color for `alias` connected from `ip`.
    ///
    /// Probes the palette from the seed's home slot, taking the first entry
    /// with no live holder; falls back to the seeded slot itself when every
    /// entry is taken, and finally to a procedural HSL color when even that
    /// collides heavily.
    pub fn assign(&self, alias: &str, ip: &str) -> String {
        let seed = seed_hash(&format!("{alias}|{ip}"));
        let start = (seed % PALETTE.len() as u64) as usize;

        let mut in_use = self.in_use.lock();
        for offset in 0..PALETTE.len() {
            let candidate = PALETTE[(start + offset) % PALETTE.len()];
            if in_use.get(candidate).copied().unwrap_or(0) == 0 {
                *in_use.entry(candidate.to_string()).or_insert(0) += 1;
                return candidate.to_string();
            }
        }

        // Palette exhausted: derive an HSL color from the seed.
        let hue = seed % 360;
        let color = format!("hsl({hue}, 65%, 55%)");
        *in_use.entry(color.clone()).or_insert(0) += 1;
        color
    }

    /// Release a previously assigned color.
    pub fn release(&self, color: &str) {
        let mut in_use = self.in_use.lock();
        if let Some(count) = in_use.get_mut(color) {
            *count = count.saturating_sub(1);
            if *count == 0 {
                in_use.remove(color);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_assignment_is_deterministic_for_seed() {
        let a = ColorAllocator::new();
        let b = ColorAllocator::new();
        assert_eq!(a.assign("Alpha", "10.0.0.1"), b.assign("Alpha", "10.0.0.1"));
    }

    #[test]
    fn test_collisions_probe_to_unused_entries() {
        let allocator = ColorAllocator::new();
        let first = allocator.assign("Alpha", "10.0.0.1");
        let second = allocator.assign("Alpha", "10.0.0.1");
        assert_ne!(first, second);
    }

    #[test]
    fn test_release_makes_entry_reusable() {
        let allocator = ColorAllocator::new();
        let first = allocator.assign("Alpha", "10.0.0.1");
        allocator.release(&first);
        assert_eq!(allocator.assign("Alpha", "10.0.0.1"), first);
    }

    #[test]
    fn test_palette_exhaustion_falls_back_to_hsl() {
        let allocator = ColorAllocator::new();
        for i in 0..32 {
            allocator.assign(&format!("user{i}"), "10.0.0.1");
        }
        let overflow = allocator.assign("user32", "10.0.0.1");
        assert!(overflow.starts_with("hsl("), "got {overflow}");
    }
}

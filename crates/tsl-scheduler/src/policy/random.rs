use rand_chacha::rand_core::{RngCore, SeedableRng};
use rand_chacha::ChaCha8Rng;

use super::Policy;
use crate::table::ThreadTable;

/// Uniform choice among the other ready threads. Deterministic per seed.
pub struct Random {
    rng: ChaCha8Rng,
}

impl Random {
    pub fn new(seed: u64) -> Self {
        Self {
            rng: ChaCha8Rng::seed_from_u64(seed),
        }
    }
}

impl Policy for Random {
    fn name(&self) -> &str {
        "random"
    }

    fn thread_ready(&mut self, _slot: usize) {}

    fn thread_removed(&mut self, _slot: usize) {}

    fn pick_next(&mut self, current: usize, table: &ThreadTable) -> Option<usize> {
        let ready: Vec<usize> = table
            .iter()
            .filter(|(slot, tcb)| *slot != current && tcb.is_ready())
            .map(|(slot, _)| slot)
            .collect();
        if ready.is_empty() {
            return None;
        }
        let index = (self.rng.next_u64() % ready.len() as u64) as usize;
        Some(ready[index])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::policy::tests::table_with;
    use crate::thread::ThreadState::{Ready, Running, Terminated};

    #[test]
    fn test_only_ready_slots() {
        let table = table_with(&[Running, Ready, Terminated, Ready]);
        let mut random = Random::new(42);
        for _ in 0..64 {
            let slot = random.pick_next(0, &table).unwrap();
            assert!(slot == 1 || slot == 3);
        }
        let table = table_with(&[Running, Terminated]);
        assert_eq!(random.pick_next(0, &table), None);
    }

    #[test]
    fn test_deterministic_per_seed() {
        let table = table_with(&[Running, Ready, Ready, Ready, Ready]);
        let picks = |seed| {
            let mut random = Random::new(seed);
            (0..16)
                .map(|_| random.pick_next(0, &table).unwrap())
                .collect::<Vec<_>>()
        };
        assert_eq!(picks(7), picks(7));
        assert!(picks(7).iter().all(|&s| (1..=4).contains(&s)));
    }
}

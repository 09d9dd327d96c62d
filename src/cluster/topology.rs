//! Cluster identifiers and wiring.

use std::collections::BTreeSet;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// First `n` primes in increasing order, by trial division from 2.
///
/// ```
/// assert_eq!(neurovisor::primes(5), vec![2, 3, 5, 7, 11]);
/// ```
pub fn primes(n: usize) -> Vec<u64> {
    Primes::default().take(n).collect()
}

/// Unbounded prime sequence; memory grows with the primes actually drawn.
struct Primes {
    found: Vec<u64>,
    candidate: u64,
}

impl Default for Primes {
    fn default() -> Self {
        Self {
            found: Vec::new(),
            candidate: 2,
        }
    }
}

impl Iterator for Primes {
    type Item = u64;

    fn next(&mut self) -> Option<u64> {
        loop {
            let candidate = self.candidate;
            self.candidate += 1;
            let is_prime = self
                .found
                .iter()
                .take_while(|&&p| p * p <= candidate)
                .all(|&p| candidate % p != 0);
            if is_prime {
                self.found.push(candidate);
                return Some(candidate);
            }
        }
    }
}

/// Worker id for the member of `cluster_id` carrying `token`.
pub fn worker_name(cluster_id: u32, token: u64) -> String {
    format!("cluster-{cluster_id}-neuron-{token}")
}

/// Draws up to `per_worker` peers for each name, from the same list.
///
/// Seeded by `cluster_id`, so a cluster is always wired the same way.
/// No worker is connected to itself; duplicates collapse.
pub(crate) fn wire(cluster_id: u32, names: &[String], per_worker: usize) -> Vec<BTreeSet<String>> {
    let mut rng = StdRng::seed_from_u64(u64::from(cluster_id));
    let n = names.len();

    (0..n)
        .map(|me| {
            let mut peers = BTreeSet::new();
            if n < 2 {
                return peers;
            }
            for _ in 0..per_worker {
                let other = rng.random_range(0..n);
                if other != me {
                    peers.insert(names[other].clone());
                }
            }
            peers
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prime_sequence() {
        assert_eq!(primes(0), Vec::<u64>::new());
        assert_eq!(primes(10), vec![2, 3, 5, 7, 11, 13, 17, 19, 23, 29]);
        assert_eq!(primes(1000).last(), Some(&7919));
    }

    #[test]
    fn wiring_is_seeded_and_loop_free() {
        let names: Vec<String> = primes(50).into_iter().map(|p| worker_name(3, p)).collect();
        let a = wire(3, &names, 20);
        let b = wire(3, &names, 20);
        assert_eq!(a, b);

        for (me, peers) in a.iter().enumerate() {
            assert!(!peers.contains(&names[me]));
            assert!(peers.len() <= 20);
            assert!(!peers.is_empty());
        }
    }

    #[test]
    fn singleton_has_no_peers() {
        let names = vec![worker_name(1, 2)];
        assert!(wire(1, &names, 20)[0].is_empty());
    }
}

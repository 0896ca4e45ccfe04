// Chain Selector — resolving requested hops into concrete remailers
//
// Hops are processed from the exit backward. Wildcards draw uniformly from
// the directory's candidates, minus any remailer inside the distance window
// around the hop being chosen.

use std::collections::{HashSet, VecDeque};

use rand::seq::SliceRandom;
use rand::Rng;
use tracing::debug;

use super::{Chain, ChainConfig, ChainError, HopRef};
use crate::directory::RemailerDirectory;
use crate::packet::HOP_MAX;

/// Builds chains against one directory snapshot
pub struct ChainSelector<'a, D: RemailerDirectory + ?Sized> {
    directory: &'a D,
    config: ChainConfig,
}

impl<'a, D: RemailerDirectory + ?Sized> ChainSelector<'a, D> {
    pub fn new(directory: &'a D, config: ChainConfig) -> Result<Self, ChainError> {
        config.validate()?;
        Ok(Self { directory, config })
    }

    pub fn config(&self) -> &ChainConfig {
        &self.config
    }

    /// Resolve `requested` into a concrete chain.
    ///
    /// An empty candidate set is reported, never retried: the caller decides
    /// whether to relax its criteria.
    pub fn build_chain<R: Rng + ?Sized>(
        &self,
        requested: &[HopRef],
        rng: &mut R,
    ) -> Result<Chain, ChainError> {
        if requested.is_empty() {
            return Err(ChainError::EmptyChain);
        }
        if requested.len() > HOP_MAX {
            return Err(ChainError::ChainTooLong(requested.len()));
        }

        let mut pending = self.resolve_named(requested)?;
        let distance = self.config.distance.min(requested.len());
        let mut chosen: VecDeque<String> = VecDeque::with_capacity(requested.len());

        while let Some(hop) = pending.pop() {
            let address = match hop {
                Some(address) => address,
                None => {
                    let position = pending.len();
                    let mut candidates = if chosen.is_empty() {
                        self.directory.candidates(
                            self.config.min_latency,
                            self.config.max_latency,
                            self.config.min_exit_reliability,
                            true,
                        )
                    } else {
                        self.directory.candidates(
                            self.config.min_latency,
                            self.config.max_latency,
                            self.config.min_reliability,
                            false,
                        )
                    };

                    let window: HashSet<&str> = chosen
                        .iter()
                        .take(distance)
                        .chain(pending.iter().rev().take(distance).flatten())
                        .map(String::as_str)
                        .collect();
                    candidates.retain(|c| !window.contains(c.as_str()));

                    candidates
                        .choose(rng)
                        .cloned()
                        .ok_or(ChainError::NoCandidates { position })?
                }
            };
            chosen.push_front(address);
        }

        debug!("Selected chain of {} hops", chosen.len());
        Chain::new(chosen.into())
    }

    /// Build `copies` chains that all end at the same exit remailer.
    ///
    /// The exit is selected once (if requested as a wildcard) and pinned for
    /// every further copy; intermediate hops are drawn independently.
    pub fn build_copies<R: Rng + ?Sized>(
        &self,
        requested: &[HopRef],
        copies: usize,
        rng: &mut R,
    ) -> Result<Vec<Chain>, ChainError> {
        if copies == 0 {
            return Ok(Vec::new());
        }

        let first = self.build_chain(requested, rng)?;
        let mut pinned = requested.to_vec();
        if let Some(last) = pinned.last_mut() {
            *last = HopRef::Named(first.exit().to_string());
        }

        let mut chains = Vec::with_capacity(copies);
        chains.push(first);
        for _ in 1..copies {
            chains.push(self.build_chain(&pinned, rng)?);
        }
        Ok(chains)
    }

    /// Resolve concrete references up front; wildcards stay `None`
    fn resolve_named(&self, requested: &[HopRef]) -> Result<Vec<Option<String>>, ChainError> {
        let last = requested.len() - 1;
        requested
            .iter()
            .enumerate()
            .map(|(i, hop)| match hop {
                HopRef::Wildcard => Ok(None),
                HopRef::Named(reference) => {
                    let remailer = self.directory.get(reference)?;
                    if i == last && !remailer.is_exit() {
                        return Err(ChainError::NotAnExit(remailer.address));
                    }
                    Ok(Some(remailer.address))
                }
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::parse_hops;
    use crate::directory::tests::remailer;
    use crate::directory::{Directory, DirectoryError, MockRemailerDirectory};
    use proptest::prelude::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn directory(count: usize) -> Directory {
        Directory::new((0..count).map(|i| remailer(&format!("r{}", i), 10, 1000, true))).unwrap()
    }

    fn assert_distance(chain: &Chain, distance: usize) {
        let hops = chain.addresses();
        for i in 0..hops.len() {
            for j in (i + 1)..hops.len().min(i + distance + 1) {
                assert_ne!(hops[i], hops[j], "repeat within distance in {}", chain);
            }
        }
    }

    #[test]
    fn test_all_wildcards() {
        let directory = directory(5);
        let selector = ChainSelector::new(&directory, ChainConfig::default()).unwrap();
        let mut rng = StdRng::seed_from_u64(7);

        let chain = selector
            .build_chain(&parse_hops("*,*,*,*").unwrap(), &mut rng)
            .unwrap();

        assert_eq!(chain.hop_count(), 4);
        assert_distance(&chain, 2);
    }

    #[test]
    fn test_named_hops_resolved() {
        let directory = directory(4);
        let selector = ChainSelector::new(&directory, ChainConfig::default()).unwrap();
        let mut rng = StdRng::seed_from_u64(1);

        let chain = selector
            .build_chain(&parse_hops("r1,*,r3").unwrap(), &mut rng)
            .unwrap();

        assert_eq!(chain.entry(), "r1@mix.example");
        assert_eq!(chain.exit(), "r3@mix.example");
        // Middle hop must avoid both neighbours
        assert_ne!(chain.addresses()[1], "r1@mix.example");
        assert_ne!(chain.addresses()[1], "r3@mix.example");
    }

    #[test]
    fn test_unknown_reference() {
        let directory = directory(3);
        let selector = ChainSelector::new(&directory, ChainConfig::default()).unwrap();

        let err = selector
            .build_chain(&parse_hops("*,nobody").unwrap(), &mut rand::thread_rng())
            .unwrap_err();

        assert_eq!(
            err,
            ChainError::Directory(DirectoryError::NotFound("nobody".to_string()))
        );
    }

    #[test]
    fn test_named_exit_must_be_exit() {
        let directory = Directory::new(vec![
            remailer("middle", 10, 1000, false),
            remailer("exit", 10, 1000, true),
        ])
        .unwrap();
        let selector = ChainSelector::new(&directory, ChainConfig::default()).unwrap();
        let mut rng = rand::thread_rng();

        assert!(matches!(
            selector.build_chain(&parse_hops("exit,middle").unwrap(), &mut rng),
            Err(ChainError::NotAnExit(_))
        ));
        assert!(selector
            .build_chain(&parse_hops("middle,exit").unwrap(), &mut rng)
            .is_ok());
    }

    #[test]
    fn test_empty_and_overlong_requests() {
        let directory = directory(3);
        let selector = ChainSelector::new(&directory, ChainConfig::default()).unwrap();
        let mut rng = rand::thread_rng();

        assert_eq!(
            selector.build_chain(&[], &mut rng),
            Err(ChainError::EmptyChain)
        );
        let overlong = vec![HopRef::Wildcard; HOP_MAX + 1];
        assert_eq!(
            selector.build_chain(&overlong, &mut rng),
            Err(ChainError::ChainTooLong(HOP_MAX + 1))
        );
    }

    #[test]
    fn test_exhausted_candidates_reported() {
        // Two remailers cannot satisfy distance 2 over three wildcard hops
        let directory = directory(2);
        let selector = ChainSelector::new(&directory, ChainConfig::default()).unwrap();

        let err = selector
            .build_chain(&parse_hops("*,*,*").unwrap(), &mut rand::thread_rng())
            .unwrap_err();

        assert_eq!(err, ChainError::NoCandidates { position: 0 });
    }

    #[test]
    fn test_exit_uses_exit_filter() {
        let mut directory = MockRemailerDirectory::new();
        directory
            .expect_candidates()
            .withf(|_, _, rel, exit| *exit && (*rel - 99.0).abs() < f32::EPSILON)
            .times(1)
            .returning(|_, _, _, _| vec!["exit@mix.example".to_string()]);
        directory
            .expect_candidates()
            .withf(|_, _, rel, exit| !*exit && (*rel - 95.0).abs() < f32::EPSILON)
            .times(1)
            .returning(|_, _, _, _| {
                vec![
                    "exit@mix.example".to_string(),
                    "middle@mix.example".to_string(),
                ]
            });

        let config = ChainConfig {
            min_reliability: 95.0,
            min_exit_reliability: 99.0,
            ..Default::default()
        };
        let selector = ChainSelector::new(&directory, config).unwrap();

        let chain = selector
            .build_chain(&parse_hops("*,*").unwrap(), &mut rand::thread_rng())
            .unwrap();

        assert_eq!(
            chain.addresses(),
            ["middle@mix.example".to_string(), "exit@mix.example".to_string()]
        );
    }

    #[test]
    fn test_copies_share_exit() {
        let directory = directory(8);
        let selector = ChainSelector::new(&directory, ChainConfig::default()).unwrap();
        let mut rng = StdRng::seed_from_u64(42);

        let chains = selector
            .build_copies(&parse_hops("*,*,*").unwrap(), 5, &mut rng)
            .unwrap();

        assert_eq!(chains.len(), 5);
        let exit = chains[0].exit();
        for chain in &chains {
            assert_eq!(chain.exit(), exit);
            assert_eq!(chain.hop_count(), 3);
            assert_distance(chain, 2);
        }
        assert!(selector
            .build_copies(&parse_hops("*").unwrap(), 0, &mut rng)
            .unwrap()
            .is_empty());
    }

    proptest! {
        #[test]
        fn prop_distance_never_violated(
            seed in any::<u64>(),
            hops in 1usize..=HOP_MAX,
            distance in 1usize..=3,
            pool in 4usize..=8,
        ) {
            let directory = directory(pool);
            let config = ChainConfig { distance, ..Default::default() };
            let selector = ChainSelector::new(&directory, config).unwrap();
            let mut rng = StdRng::seed_from_u64(seed);

            let requested = vec![HopRef::Wildcard; hops];
            let chain = selector.build_chain(&requested, &mut rng).unwrap();

            prop_assert_eq!(chain.hop_count(), hops);
            assert_distance(&chain, distance.min(hops));
        }
    }
}

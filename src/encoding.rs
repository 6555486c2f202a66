//! Incremental pair-merging state machine at the heart of training.
//!
//! [`Encoding`] owns the token stream as a [`LinkedArray`], the grammar, and a
//! [`HeapMap`] from every adjacent pair to the set of indices where it currently starts.
//! Each call to [`Encoding::reduce`] merges the most frequent pair everywhere it occurs
//! and patches the neighbouring pair sets in place, so no step rescans the stream.

use std::collections::BTreeSet;
use std::ops::Range;

use rayon::prelude::*;
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};

use crate::config::TrainerConfig;
use crate::error::{BytepairError, Result};
use crate::heap_map::HeapMap;
use crate::linked_array::LinkedArray;
use crate::model::{Grammar, Pair, TokenId};

/// Left indices at which a pair currently occurs, lowest first.
pub type Occurrences = BTreeSet<usize>;

type PairQueue = HeapMap<Pair, Occurrences, fn(&Occurrences) -> usize>;
type PairTable = FxHashMap<Pair, Vec<usize>>;

fn occurrence_count(occurrences: &Occurrences) -> usize {
    occurrences.len()
}

/// Summary of one merge performed by [`Encoding::reduce`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MergeRecord {
    /// Pair that was merged.
    pub pair: Pair,
    /// Token minted for the pair.
    pub token: TokenId,
    /// Occurrence count of the pair when it was selected.
    pub frequency: usize,
    /// Number of rewrites actually applied; overlapping runs make this lower than `frequency`.
    pub merges: usize,
}

/// Outcome of a single reduction step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    /// A pair was merged into a new token.
    Merged(MergeRecord),
    /// No pair recurs; further steps have no effect.
    Converged,
}

/// Training state: the token stream, the grammar learned so far, and the pair index.
#[derive(Debug)]
pub struct Encoding {
    grammar: Grammar,
    tokens: LinkedArray<TokenId>,
    queue: PairQueue,
    iterations: usize,
    prime_first_merge: bool,
    last_merge: Option<MergeRecord>,
    converged: bool,
}

impl Encoding {
    /// Seeds the token stream and pair index from `bytes`.
    ///
    /// Every byte becomes the literal token of the same value.  The initial pair scan
    /// runs on Rayon workers when [`TrainerConfig::seeds_in_parallel`] allows it; both
    /// paths produce the same queue.
    pub fn new(bytes: &[u8], cfg: &TrainerConfig) -> Result<Self> {
        let mut tokens = LinkedArray::new();
        tokens.fill(bytes.iter().map(|&byte| TokenId::from(byte)))?;

        let table = if cfg.seeds_in_parallel(bytes.len()) {
            scan_pairs_parallel(bytes)
        } else {
            scan_pairs(bytes, 0..bytes.len().saturating_sub(1))
        };

        let mut entries: Vec<(Pair, Occurrences)> = table
            .into_iter()
            .map(|(pair, indices)| (pair, indices.into_iter().collect()))
            .collect();
        // First-occurrence order keeps tie-breaking independent of the scan strategy.
        entries.sort_unstable_by_key(|(_, occurrences)| occurrences.first().copied());

        let mut queue: PairQueue =
            HeapMap::with_capacity(entries.len(), occurrence_count as fn(&Occurrences) -> usize);
        for (pair, occurrences) in entries {
            queue.push(pair, occurrences)?;
        }

        Ok(Self {
            grammar: Grammar::new(),
            tokens,
            queue,
            iterations: 0,
            prime_first_merge: cfg.prime_first_merge,
            last_merge: None,
            converged: false,
        })
    }

    /// Performs one reduction step.
    ///
    /// Selects the pair with the most occurrences, appends it to the grammar, and rewrites
    /// each occurrence from the lowest index upwards.  Returns [`Step::Converged`] without
    /// touching any state once no pair occurs more than once.  The very first call merges
    /// even a pair seen only once when `prime_first_merge` is configured.
    ///
    /// Errors from this method mean the pair index no longer matches the token stream;
    /// the encoding must be discarded.
    pub fn reduce(&mut self) -> Result<Step> {
        self.iterations += 1;
        if self.converged {
            return Ok(Step::Converged);
        }
        let (pair, frequency) = match self.queue.max() {
            Ok((pair, occurrences)) => (*pair, occurrences.len()),
            Err(BytepairError::EmptyQueue) => {
                self.converged = true;
                return Ok(Step::Converged);
            }
            Err(err) => return Err(err),
        };
        let primed = self.prime_first_merge && self.iterations == 1;
        if frequency <= 1 && !primed {
            self.converged = true;
            return Ok(Step::Converged);
        }

        let token = self.grammar.push(pair)?;
        let mut merges = 0usize;
        while let Some(occurrence) = self.next_occurrence(pair) {
            self.merge_occurrence(pair, token, occurrence)?;
            merges += 1;
        }

        let record = MergeRecord {
            pair,
            token,
            frequency,
            merges,
        };
        self.last_merge = Some(record);
        Ok(Step::Merged(record))
    }

    /// Runs [`Encoding::reduce`] until convergence and returns the number of merges.
    pub fn compress(&mut self) -> Result<usize> {
        let mut merged = 0usize;
        while let Step::Merged(_) = self.reduce()? {
            merged += 1;
        }
        Ok(merged)
    }

    /// Returns true once a step has found no recurring pair.
    #[must_use]
    pub fn is_converged(&self) -> bool {
        self.converged
    }

    /// Number of [`Encoding::reduce`] calls so far, including ones that converged.
    #[must_use]
    pub fn iterations(&self) -> usize {
        self.iterations
    }

    /// Current logical length of the token stream.
    #[must_use]
    pub fn sequence_len(&self) -> usize {
        self.tokens.len()
    }

    /// Current vocabulary size.
    #[must_use]
    pub fn grammar_len(&self) -> usize {
        self.grammar.len()
    }

    /// Number of distinct pairs currently present in the stream.
    #[must_use]
    pub fn queue_len(&self) -> usize {
        self.queue.len()
    }

    /// The most recent merge, if any step has merged yet.
    #[must_use]
    pub fn last_merge(&self) -> Option<MergeRecord> {
        self.last_merge
    }

    /// Occurrence count of the most frequent pair, or zero when no pair remains.
    #[must_use]
    pub fn max_frequency(&self) -> usize {
        self.queue
            .max()
            .map(|(_, occurrences)| occurrences.len())
            .unwrap_or(0)
    }

    /// Occurrence count of `pair`, or zero when it does not occur.
    #[must_use]
    pub fn frequency(&self, pair: Pair) -> usize {
        self.queue.weight_of(&pair).unwrap_or(0)
    }

    /// Read-only view of the learned grammar.
    #[must_use]
    pub fn grammar(&self) -> &Grammar {
        &self.grammar
    }

    /// Read-only view of the token stream.
    #[must_use]
    pub fn tokens(&self) -> &LinkedArray<TokenId> {
        &self.tokens
    }

    /// Collects the current token stream.
    #[must_use]
    pub fn token_stream(&self) -> Vec<TokenId> {
        self.tokens.to_vec()
    }

    /// Consumes the encoding, returning the grammar and the reduced token stream.
    pub fn into_parts(self) -> (Grammar, Vec<TokenId>) {
        let stream = self.tokens.to_vec();
        (self.grammar, stream)
    }

    /// Cross-checks the pair index against the token stream.
    ///
    /// Every adjacent pair in the stream must be recorded exactly once under its left
    /// index, and nothing else may be recorded.  Intended for tests and debugging; it
    /// walks the whole stream.
    pub fn verify(&self) -> Result<()> {
        self.queue.check_invariants()?;
        let mut recorded = 0usize;
        for (pair, occurrences) in self.queue.iter() {
            if occurrences.is_empty() {
                return Err(BytepairError::Internal(format!(
                    "pair {pair} is queued with no occurrences"
                )));
            }
            for &index in occurrences {
                let next = self.tokens.next_index(index)?;
                let found = Pair::new(self.tokens.at(index)?, self.tokens.at(next)?);
                if found != *pair {
                    return Err(BytepairError::Internal(format!(
                        "index {index} is recorded for {pair} but holds {found}"
                    )));
                }
            }
            recorded += occurrences.len();
        }
        let expected = self.tokens.len().saturating_sub(1);
        if recorded != expected {
            return Err(BytepairError::Internal(format!(
                "{recorded} occurrences recorded for a stream with {expected} adjacent pairs"
            )));
        }
        for index in self.tokens.indices() {
            self.token_at(index)?;
        }
        Ok(())
    }

    fn next_occurrence(&self, pair: Pair) -> Option<usize> {
        self.queue
            .view(&pair)
            .ok()
            .and_then(|occurrences| occurrences.first().copied())
    }

    /// Rewrites `pair` at `occurrence` as `token`, fixing the neighbouring pair sets.
    fn merge_occurrence(&mut self, pair: Pair, token: TokenId, occurrence: usize) -> Result<()> {
        let right_index = self.tokens.next_index(occurrence)?;
        let found = Pair::new(self.token_at(occurrence)?, self.token_at(right_index)?);
        if found != pair {
            return Err(BytepairError::Internal(format!(
                "occurrence {occurrence} of {pair} holds {found}"
            )));
        }

        // Retire the pairs that straddle the boundaries of the merged span.
        if let Some(left) = neighbour(self.tokens.prev_index(occurrence))? {
            let left_token = self.token_at(left)?;
            self.decrement(Pair::new(left_token, pair.left), left)?;
        }
        if let Some(after) = neighbour(self.tokens.second_next_index(occurrence))? {
            let after_token = self.token_at(after)?;
            self.decrement(Pair::new(pair.right, after_token), right_index)?;
        }
        self.decrement(pair, occurrence)?;

        self.tokens.merge_at(occurrence, token)?;

        // Neighbours must be looked up again: the merge changed what follows `occurrence`.
        if let Some(left) = neighbour(self.tokens.prev_index(occurrence))? {
            let left_token = self.token_at(left)?;
            self.increment(Pair::new(left_token, token), left)?;
        }
        if let Some(right) = neighbour(self.tokens.next_index(occurrence))? {
            let right_token = self.token_at(right)?;
            self.increment(Pair::new(token, right_token), occurrence)?;
        }
        Ok(())
    }

    fn token_at(&self, index: usize) -> Result<TokenId> {
        let token = self.tokens.at(index)?;
        if !self.grammar.defines(token) {
            return Err(BytepairError::CorruptToken {
                index,
                token,
                grammar_len: self.grammar.len(),
            });
        }
        Ok(token)
    }

    fn increment(&mut self, pair: Pair, index: usize) -> Result<()> {
        if !self.queue.contains(&pair) {
            return self.queue.push(pair, Occurrences::from([index]));
        }
        let inserted = self
            .queue
            .update(&pair, |occurrences| occurrences.insert(index))?;
        if !inserted {
            return Err(BytepairError::Internal(format!(
                "index {index} was already recorded for {pair}"
            )));
        }
        Ok(())
    }

    fn decrement(&mut self, pair: Pair, index: usize) -> Result<()> {
        let (removed, emptied) = self
            .queue
            .update(&pair, |occurrences| {
                (occurrences.remove(&index), occurrences.is_empty())
            })
            .map_err(|_| {
                BytepairError::Internal(format!("cannot decrement {pair}: it is not queued"))
            })?;
        if !removed {
            return Err(BytepairError::Internal(format!(
                "index {index} was not recorded for {pair}"
            )));
        }
        if emptied {
            self.queue.erase(&pair)?;
        }
        Ok(())
    }
}

/// Treats running off either end of the stream as "no neighbour".
fn neighbour(lookup: Result<usize>) -> Result<Option<usize>> {
    match lookup {
        Ok(index) => Ok(Some(index)),
        Err(BytepairError::NoPredecessor(_) | BytepairError::NoSuccessor(_)) => Ok(None),
        Err(err) => Err(err),
    }
}

/// Records every pair whose left index lies in `lefts`.
fn scan_pairs(bytes: &[u8], lefts: Range<usize>) -> PairTable {
    let mut table = PairTable::default();
    for index in lefts {
        let pair = Pair::new(TokenId::from(bytes[index]), TokenId::from(bytes[index + 1]));
        table.entry(pair).or_default().push(index);
    }
    table
}

fn scan_pairs_parallel(bytes: &[u8]) -> PairTable {
    let lefts = bytes.len().saturating_sub(1);
    if lefts == 0 {
        return PairTable::default();
    }
    let partition = lefts.div_ceil(rayon::current_num_threads().max(1)).max(1);
    let starts: Vec<usize> = (0..lefts).step_by(partition).collect();
    starts
        .into_par_iter()
        .map(|start| scan_pairs(bytes, start..(start + partition).min(lefts)))
        .reduce(PairTable::default, |mut acc, local| {
            for (pair, indices) in local {
                acc.entry(pair).or_default().extend(indices);
            }
            acc
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    fn config(prime: bool) -> TrainerConfig {
        TrainerConfig::builder()
            .show_progress(false)
            .prime_first_merge(prime)
            .parallel_seed(false)
            .build()
            .expect("valid config")
    }

    fn encoding(input: &[u8]) -> Encoding {
        Encoding::new(input, &config(true)).expect("seed encoding")
    }

    fn random_bytes(len: usize, alphabet: u8, seed: u64) -> Vec<u8> {
        let mut rng = StdRng::seed_from_u64(seed);
        (0..len).map(|_| rng.gen_range(b'a'..b'a' + alphabet)).collect()
    }

    #[test]
    fn seeding_records_every_adjacent_pair() {
        let enc = encoding(b"abab");
        assert_eq!(enc.frequency(Pair::new(97, 98)), 2);
        assert_eq!(enc.frequency(Pair::new(98, 97)), 1);
        assert_eq!(enc.queue_len(), 2);
        assert_eq!(enc.grammar_len(), 256);
        enc.verify().expect("seeded index is consistent");
    }

    #[test]
    fn aaaa_merges_once_then_converges() {
        let mut enc = encoding(b"aaaa");
        assert_eq!(enc.frequency(Pair::new(97, 97)), 3);

        let step = enc.reduce().expect("first step");
        assert_eq!(
            step,
            Step::Merged(MergeRecord {
                pair: Pair::new(97, 97),
                token: 256,
                frequency: 3,
                merges: 2,
            })
        );
        assert_eq!(enc.token_stream(), vec![256, 256]);
        assert_eq!(enc.tokens().indices().collect::<Vec<_>>(), vec![0, 2]);
        assert_eq!(enc.frequency(Pair::new(256, 256)), 1);
        assert_eq!(enc.frequency(Pair::new(97, 97)), 0);
        assert_eq!(enc.grammar_len(), 257);
        enc.verify().expect("consistent after first merge");

        // (256, 256) occurs once, so nothing recurs any more.
        assert_eq!(enc.reduce().expect("second step"), Step::Converged);
        assert!(enc.is_converged());
        assert_eq!(enc.token_stream(), vec![256, 256]);
        assert_eq!(enc.iterations(), 2);
        assert_eq!(enc.grammar().merges(), &[Pair::new(97, 97)]);
    }

    #[test]
    fn doubled_runs_keep_merging() {
        let mut enc = encoding(b"aaaaaaaa");
        assert_eq!(enc.compress().expect("compress"), 2);
        assert_eq!(enc.token_stream(), vec![257, 257]);
        assert_eq!(
            enc.grammar().merges(),
            &[Pair::new(97, 97), Pair::new(256, 256)]
        );
        assert_eq!(enc.queue_len(), 1);
        enc.verify().expect("consistent");
    }

    #[test]
    fn overlapping_run_merges_leftmost_first() {
        let mut enc = encoding(b"aaa");
        let step = enc.reduce().expect("merge");
        assert!(matches!(
            step,
            Step::Merged(record) if record.frequency == 2 && record.merges == 1
        ));
        assert_eq!(enc.token_stream(), vec![256, 97]);
        assert_eq!(enc.frequency(Pair::new(256, 97)), 1);
        enc.verify().expect("consistent");
    }

    #[test]
    fn non_repeating_input_merges_once_when_primed() {
        let mut enc = encoding(b"abc");
        assert_eq!(enc.max_frequency(), 1);
        let step = enc.reduce().expect("primed step");
        assert!(matches!(step, Step::Merged(record) if record.pair == Pair::new(97, 98)));
        assert_eq!(enc.token_stream(), vec![256, 99]);
        enc.verify().expect("consistent");

        assert_eq!(enc.reduce().expect("second step"), Step::Converged);
        assert_eq!(enc.token_stream(), vec![256, 99]);
        assert_eq!(enc.grammar_len(), 257);
    }

    #[test]
    fn non_repeating_input_converges_immediately_without_priming() {
        let mut enc = Encoding::new(b"abc", &config(false)).expect("seed");
        assert_eq!(enc.reduce().expect("step"), Step::Converged);
        assert_eq!(enc.token_stream(), vec![97, 98, 99]);
        assert_eq!(enc.grammar_len(), 256);
        assert_eq!(enc.last_merge(), None);
    }

    #[test]
    fn empty_and_single_byte_inputs_converge() {
        for input in [&b""[..], &b"z"[..]] {
            let mut enc = encoding(input);
            assert_eq!(enc.compress().expect("compress"), 0);
            assert!(enc.is_converged());
            assert_eq!(
                enc.token_stream(),
                input.iter().map(|&b| TokenId::from(b)).collect::<Vec<_>>()
            );
        }
    }

    #[test]
    fn neighbours_are_rewired_around_merges() {
        let mut enc = encoding(b"xabyab");
        enc.reduce().expect("merge ab");
        assert_eq!(enc.token_stream(), vec![120, 256, 121, 256]);
        assert_eq!(enc.frequency(Pair::new(120, 256)), 1);
        assert_eq!(enc.frequency(Pair::new(256, 121)), 1);
        assert_eq!(enc.frequency(Pair::new(121, 256)), 1);
        assert_eq!(enc.frequency(Pair::new(120, 97)), 0);
        assert_eq!(enc.frequency(Pair::new(98, 121)), 0);
        enc.verify().expect("consistent");
    }

    #[test]
    fn every_step_keeps_index_consistent() {
        let input = random_bytes(2_000, 4, 0x2545_F491_4F6C_DD1D);
        let mut enc = encoding(&input);
        let mut previous_grammar = enc.grammar_len();
        let mut previous_len = enc.sequence_len();
        loop {
            let step = enc.reduce().expect("step");
            enc.verify().expect("consistent after step");
            match step {
                Step::Merged(record) => {
                    assert_eq!(enc.grammar_len(), previous_grammar + 1);
                    assert_eq!(enc.sequence_len(), previous_len - record.merges);
                    assert!(record.merges >= 1);
                }
                Step::Converged => {
                    assert_eq!(enc.grammar_len(), previous_grammar);
                    break;
                }
            }
            previous_grammar = enc.grammar_len();
            previous_len = enc.sequence_len();
            assert!(enc.iterations() <= input.len() + 1, "training must terminate");
        }
        assert!(enc.max_frequency() <= 1);
    }

    #[test]
    fn untouched_indices_keep_their_tokens() {
        let mut enc = encoding(b"abqabrzzzz");
        let before: Vec<(usize, TokenId)> = enc
            .tokens()
            .indices()
            .map(|index| (index, enc.tokens().at(index).unwrap()))
            .collect();
        let Step::Merged(record) = enc.reduce().expect("step") else {
            panic!("expected a merge");
        };
        for (index, token) in before {
            if !enc.tokens().is_live(index) {
                continue;
            }
            let now = enc.tokens().at(index).unwrap();
            if now == record.token {
                continue;
            }
            assert_eq!(now, token, "index {index} changed without being merged");
        }
    }

    #[test]
    fn parallel_seed_matches_sequential() {
        let input = random_bytes(10_000, 6, 0xDEAD_BEEF_CAFE_F00D);
        let sequential = config(true);
        let parallel = TrainerConfig::builder()
            .show_progress(false)
            .parallel_seed(true)
            .parallel_seed_min_len(2)
            .build()
            .expect("valid config");

        let mut a = Encoding::new(&input, &sequential).expect("sequential seed");
        let mut b = Encoding::new(&input, &parallel).expect("parallel seed");
        b.verify().expect("parallel seed is consistent");
        assert_eq!(a.queue_len(), b.queue_len());
        a.compress().expect("compress sequential");
        b.compress().expect("compress parallel");
        assert_eq!(a.grammar(), b.grammar());
        assert_eq!(a.token_stream(), b.token_stream());
    }

    #[test]
    fn corrupted_stream_is_reported() {
        let mut enc = encoding(b"abab");
        enc.tokens.merge_at(0, 999).expect("tamper with stream");
        let err = enc.reduce().expect_err("corruption must be detected");
        assert!(err.is_fatal());
        assert!(matches!(
            err,
            BytepairError::CorruptToken {
                token: 999,
                grammar_len: 257,
                ..
            }
        ));
    }
}

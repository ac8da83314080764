//! Condorcet/Schulze ranked-choice resolution.
//!
//! The resolver consumes the accepted ranked ballots of an election and
//! computes the pairwise-preference matrix and the strongest-path matrix
//! (Floyd-Warshall relaxation, O(C^3) in the candidate count). The result
//! depends only on the ballot-set content, never on submission order.

use crate::*;
use std::collections::HashMap;

/// The outcome of a Schulze resolution
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct SchulzeOutcome {
    /// Candidate order matching the matrix rows/columns
    pub candidates: Vec<CandidateId>,

    /// The unique winner, if one candidate beats every other
    pub winner: Option<CandidateId>,

    /// The maximally-undominated candidates. Equals `[winner]` when a unique
    /// winner exists; otherwise the tie/cycle set reported instead of an
    /// arbitrary pick.
    pub tied: Vec<CandidateId>,

    /// All candidates ordered by strongest-path wins, strongest first
    pub ranking: Vec<CandidateId>,

    /// `pairwise[i][j]` = ballots ranking candidate i strictly above j
    pub pairwise: Vec<Vec<u64>>,

    /// Strongest beat-path strengths
    pub strongest_path: Vec<Vec<u64>>,
}

/// Resolve the Schulze ranking for the given candidates over the ballot set
pub fn resolve(candidates: &[CandidateId], ballots: &[RankedBallot]) -> SchulzeOutcome {
    let count = candidates.len();
    let position_of: HashMap<CandidateId, usize> = candidates
        .iter()
        .enumerate()
        .map(|(i, id)| (*id, i))
        .collect();

    // d[i][j] = ballots preferring i strictly over j. A candidate omitted
    // from a ballot ranks below every listed candidate; candidates within an
    // equal-rank group contribute to neither direction.
    let mut pairwise = vec![vec![0u64; count]; count];
    for ballot in ballots {
        if ballot.status != BallotStatus::Accepted {
            continue;
        }

        let mut group_of: HashMap<usize, usize> = HashMap::new();
        for (group_index, group) in ballot.ranking.iter().enumerate() {
            for candidate_id in group {
                if let Some(&index) = position_of.get(candidate_id) {
                    group_of.insert(index, group_index);
                }
            }
        }

        for i in 0..count {
            let rank_i = group_of.get(&i).copied().unwrap_or(usize::MAX);
            for j in 0..count {
                if i == j {
                    continue;
                }
                let rank_j = group_of.get(&j).copied().unwrap_or(usize::MAX);
                if rank_i < rank_j {
                    pairwise[i][j] += 1;
                }
            }
        }
    }

    // Strongest paths, Floyd-Warshall style
    let mut strongest = vec![vec![0u64; count]; count];
    for i in 0..count {
        for j in 0..count {
            if i != j && pairwise[i][j] > pairwise[j][i] {
                strongest[i][j] = pairwise[i][j];
            }
        }
    }
    for k in 0..count {
        for i in 0..count {
            if i == k {
                continue;
            }
            for j in 0..count {
                if j == i || j == k {
                    continue;
                }
                let through_k = strongest[i][k].min(strongest[k][j]);
                if through_k > strongest[i][j] {
                    strongest[i][j] = through_k;
                }
            }
        }
    }

    let beats = |i: usize, j: usize| strongest[i][j] > strongest[j][i];

    // Undominated: nobody strictly beats them. The strongest-path beat
    // relation is acyclic, so this set is never empty for count > 0.
    let tied: Vec<CandidateId> = (0..count)
        .filter(|&i| (0..count).all(|j| j == i || !beats(j, i)))
        .map(|i| candidates[i])
        .collect();

    let winner = match tied.as_slice() {
        [single] if count > 0 => {
            let index = position_of[single];
            let beats_all = (0..count).all(|j| j == index || beats(index, j));
            if beats_all {
                Some(*single)
            } else {
                None
            }
        }
        _ => None,
    };

    // Total order for reporting: by strongest-path wins, candidate id as the
    // deterministic tiebreaker
    let mut order: Vec<usize> = (0..count).collect();
    let wins: Vec<usize> = (0..count)
        .map(|i| (0..count).filter(|&j| j != i && beats(i, j)).count())
        .collect();
    order.sort_by(|&a, &b| wins[b].cmp(&wins[a]).then(candidates[a].cmp(&candidates[b])));
    let ranking: Vec<CandidateId> = order.into_iter().map(|i| candidates[i]).collect();

    SchulzeOutcome {
        candidates: candidates.to_vec(),
        winner,
        tied,
        ranking,
        pairwise,
        strongest_path: strongest,
    }
}

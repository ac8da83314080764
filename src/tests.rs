use super::*;
use chrono::Utc;
use indexmap::IndexMap;
use uuid::Uuid;

#[test]
fn end_to_end_election() {
    let mut rng = rand::rngs::OsRng {};
    let election_id = Uuid::new_v4();

    // Register the voters and candidates. Voter 5 is a delegate carrying
    // explicit weight 3.
    let registry = MemRegistry::default();
    for voter in 1..=4 {
        registry.add_voter(voter, 1);
    }
    registry.add_voter(5, 3);
    registry.add_candidate(1, "orange");
    registry.add_candidate(2, "purple");
    registry.add_candidate(3, "green");

    let store = BallotStore::new();

    // ----------------
    // Plain first-past-the-post voting

    store.submit_plain_vote(&registry, &registry, 1, 1, 1).unwrap();
    store.submit_plain_vote(&registry, &registry, 2, 2, 1).unwrap();
    store
        .submit_plain_vote(&registry, &registry, 5, 2, VoterRegistry::weight(&registry, 5))
        .unwrap();

    // Voter 1 cannot vote twice
    assert!(matches!(
        store.submit_plain_vote(&registry, &registry, 1, 3, 1),
        Err(Error::DuplicateVote(1))
    ));

    // The leaderboard reflects the weighted counts
    let results = registry.results();
    assert_eq!(results[0].candidate_id, 2);
    assert_eq!(results[0].votes, 4);
    assert_eq!(registry.winners().len(), 1);

    // ----------------
    // Ranked-choice voting, resolved by the Schulze method

    store
        .submit_ranked_ballot(&registry, &registry, election_id, 1, vec![vec![1], vec![2], vec![3]], Utc::now())
        .unwrap();
    store
        .submit_ranked_ballot(&registry, &registry, election_id, 2, vec![vec![1], vec![3], vec![2]], Utc::now())
        .unwrap();
    store
        .submit_ranked_ballot(&registry, &registry, election_id, 3, vec![vec![2], vec![1]], Utc::now())
        .unwrap();

    let outcome = resolve(&[1, 2, 3], &store.ranked_ballots(election_id));
    assert_eq!(outcome.winner, Some(1));
    assert_eq!(outcome.ranking[0], 1);

    // ----------------
    // Encrypted voting under a 2-of-3 trustee threshold

    let dealt = deal_key_shares(2, 3, &mut rng).unwrap();
    let engine = EncryptedTallyEngine::new(
        election_id,
        vec![1, 2, 3],
        dealt.public_key,
        dealt.trustees.clone(),
        2,
    )
    .unwrap();

    let verifier = PermissiveVerifier;
    let choices: [(&[u8], CandidateId); 3] = [(b"cred-1", 1), (b"cred-2", 1), (b"cred-3", 2)];
    for (credential, choice) in &choices {
        let (voter_secret, _) = generate_keypair();
        let ciphertexts = engine.encrypt_ballot(*choice, &mut rng).unwrap();
        let submission = EncryptedBallotSubmission::new(
            election_id,
            ciphertexts,
            b"proof-bytes-long-enough".to_vec(),
            derive_nullifier(credential, &election_id),
            &voter_secret,
        )
        .unwrap();
        store.submit_encrypted_ballot(&verifier, submission).unwrap();
    }

    // A replayed credential produces the same nullifier and is rejected
    {
        let (voter_secret, _) = generate_keypair();
        let ciphertexts = engine.encrypt_ballot(3, &mut rng).unwrap();
        let replay = EncryptedBallotSubmission::new(
            election_id,
            ciphertexts,
            b"proof-bytes-long-enough".to_vec(),
            derive_nullifier(b"cred-1", &election_id),
            &voter_secret,
        )
        .unwrap();
        assert!(matches!(
            store.submit_encrypted_ballot(&verifier, replay),
            Err(Error::DuplicateNullifier(_))
        ));
    }

    // Aggregate homomorphically; no individual ballot is decrypted
    let ballots = store.encrypted_ballots(election_id);
    let tally = engine.aggregate(&ballots).unwrap();
    assert_eq!(tally.ballot_count, 3);

    // Any voter can check their ballot against the published Merkle root
    let leaves: Vec<Vec<u8>> = ballots
        .iter()
        .map(|ballot| serde_cbor::to_vec(ballot).unwrap())
        .collect();
    let tree = MerkleTree::from_leaves(leaves.clone());
    assert_eq!(hex::encode(tree.root()), tally.ballot_merkle_root);
    let proof = tree.proof(0).unwrap();
    assert!(verify_proof(&tree.root(), &leaves[0], &proof));

    // Two of the three trustees decrypt the aggregate
    let mut session = engine.begin_decryption(tally.clone(), None);
    for key_share in &dealt.shares[..2] {
        let shares: Vec<DecryptShare> = tally
            .accumulators
            .iter()
            .map(|accumulator| key_share.decrypt_share(accumulator, &mut rng))
            .collect();
        assert!(session.submit_shares(key_share.trustee_id, shares).unwrap());
    }

    let result = session.finalize().unwrap();
    assert_eq!(
        result.candidate_tallies,
        vec![
            CandidateTally {
                candidate_id: 1,
                votes: 2,
            },
            CandidateTally {
                candidate_id: 2,
                votes: 1,
            },
            CandidateTally {
                candidate_id: 3,
                votes: 0,
            },
        ]
    );
    assert_eq!(result.transparency.threshold, "2-of-3");
    assert_eq!(result.transparency.ballot_merkle_root, tally.ballot_merkle_root);

    // The published result serializes to stable JSON
    let published = serde_json::to_string(&result).unwrap();
    assert!(published.contains(&tally.ballot_merkle_root));

    // ----------------
    // Differentially-private turnout analytics

    let accountant = PrivacyAccountant::with_defaults(election_id);
    let mut buckets = IndexMap::new();
    buckets.insert("district-north".to_string(), 1_200u64);
    buckets.insert("district-south".to_string(), 900u64);

    let answer = accountant
        .query(&buckets, DEFAULT_QUERY_EPSILON, DEFAULT_QUERY_DELTA)
        .unwrap();
    assert_eq!(answer.answer.len(), 2);
    assert_eq!(answer.remaining_budget.epsilon, 1.5);

    // ----------------
    // Risk-limiting audit of the decrypted tallies

    let planner = AuditPlanner::new();
    let reported: Vec<ReportedTally> = result
        .candidate_tallies
        .iter()
        .map(|t| ReportedTally {
            candidate_id: t.candidate_id,
            votes: t.votes * 350,
        })
        .collect();
    let audit = planner
        .plan_audit(
            election_id,
            "ballot_comparison",
            reported,
            DEFAULT_RISK_LIMIT,
            SamplingPlan::single_stratum(2026),
        )
        .unwrap();
    assert_eq!(audit.test, "kaplan-markov");

    // The sample draw is replayable from the published seed
    let draw = audit
        .sampling_plan
        .draw_indices(1_050, audit.initial_sample_size as usize)
        .unwrap();
    assert_eq!(
        draw,
        audit
            .sampling_plan
            .draw_indices(1_050, audit.initial_sample_size as usize)
            .unwrap()
    );

    // Every sampled ballot matches its cast-vote record, so the audit
    // concludes within the initial sample
    let clean = vec![0.0; audit.initial_sample_size as usize];
    let finished = planner.record_round(audit.audit_id, &clean).unwrap();
    assert_eq!(finished.status, AuditStatus::Concluded);
}

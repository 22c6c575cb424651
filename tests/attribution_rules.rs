//! Attribution tests over synced data.
//!
//! Each test syncs a small fixture through the engine and then aggregates
//! March 2019, so the rules are checked against what the store really holds.

mod common;

use common::*;
use github_tracker::models::{AttributionRecord, MonthPeriod};
use github_tracker::services::aggregator::{Aggregator, AttributionFilter};
use github_tracker::services::user_info::user_information;
use tokio_util::sync::CancellationToken;

fn march_2019() -> MonthPeriod {
    MonthPeriod::new(2019, 3).unwrap()
}

async fn sync_and_aggregate(remote: &FakeRemote) -> Vec<AttributionRecord> {
    let (_dir, store, engine) = setup(remote).await;
    engine
        .synchronize(ORG, None, &CancellationToken::new())
        .await
        .unwrap();
    Aggregator::new(store)
        .aggregate(&AttributionFilter::new(vec![ORG.into()], march_2019()))
        .await
        .unwrap()
}

fn record<'a>(records: &'a [AttributionRecord], login: &str) -> Option<&'a AttributionRecord> {
    records.iter().find(|r| r.login == login)
}

#[tokio::test]
async fn test_commit_credit_goes_to_author() {
    let remote = FakeRemote::new();
    remote.put_pull_request(
        pull_request(1, "alice", &march(9, 0)),
        vec![
            commit("a1", "alice", &march(1, 0), 10, 1),
            commit("a2", "carol", &march(2, 0), 4, 4),
            // February commits earn nothing in March
            commit("a0", "alice", "2019-02-20T00:00:00Z", 50, 50),
        ],
        vec![],
        vec![],
    );

    let records = sync_and_aggregate(&remote).await;
    let alice = record(&records, "alice").unwrap();
    assert_eq!((alice.commit_additions, alice.commit_deletions), (10, 1));
    assert_eq!((alice.year, alice.month), (2019, 3));
    assert_eq!(alice.repository, FULL_NAME);
    let carol = record(&records, "carol").unwrap();
    assert_eq!((carol.commit_additions, carol.commit_deletions), (4, 4));
}

#[tokio::test]
async fn test_self_review_earns_nothing() {
    let remote = FakeRemote::new();
    remote.put_pull_request(
        pull_request(1, "alice", &march(9, 0)),
        vec![
            commit("a1", "alice", &march(1, 0), 10, 1),
            commit("c1", "carol", &march(2, 0), 4, 4),
        ],
        vec![
            review(11, "alice", &march(3, 0), "a1"),
            review(12, "carol", &march(3, 0), "c1"),
        ],
        vec![],
    );

    let records = sync_and_aggregate(&remote).await;
    assert_eq!(record(&records, "alice").unwrap().review_additions, 0);
    // carol still earns review credit for alice's commit, not her own
    let carol = record(&records, "carol").unwrap();
    assert_eq!((carol.review_additions, carol.review_deletions), (10, 1));
}

#[tokio::test]
async fn test_duplicate_reviews_on_one_commit_count_once() {
    let remote = FakeRemote::new();
    remote.put_pull_request(
        pull_request(1, "alice", &march(9, 0)),
        vec![commit("a1", "alice", &march(1, 0), 10, 1)],
        vec![
            review(11, "bob", &march(3, 0), "a1"),
            review(12, "bob", &march(4, 0), "a1"),
        ],
        vec![],
    );

    let records = sync_and_aggregate(&remote).await;
    let bob = record(&records, "bob").unwrap();
    assert_eq!((bob.review_additions, bob.review_deletions), (10, 1));
}

#[tokio::test]
async fn test_discarded_commit_still_matches_reviews() {
    let remote = FakeRemote::new();
    remote.put_pull_request(
        pull_request(1, "alice", &march(5, 0)),
        vec![
            commit("A", "alice", &march(1, 0), 10, 1),
            commit("B", "alice", &march(2, 0), 20, 2),
        ],
        vec![review(11, "bob", &march(3, 0), "B")],
        vec![],
    );
    let (_dir, store, engine) = setup(&remote).await;
    let cancel = CancellationToken::new();
    engine.synchronize(ORG, None, &cancel).await.unwrap();

    remote.put_pull_request(
        pull_request(1, "alice", &march(8, 0)),
        vec![
            commit("A", "alice", &march(1, 0), 10, 1),
            commit("C", "alice", &march(6, 0), 30, 3),
        ],
        vec![review(11, "bob", &march(3, 0), "B")],
        vec![],
    );
    engine.synchronize(ORG, None, &cancel).await.unwrap();

    let records = Aggregator::new(store)
        .aggregate(&AttributionFilter::new(vec![ORG.into()], march_2019()))
        .await
        .unwrap();

    // B is discarded: no authorship credit
    let alice = record(&records, "alice").unwrap();
    assert_eq!((alice.commit_additions, alice.commit_deletions), (40, 4));
    // bob's review (Mar 3) covers A and B but not C (Mar 6)
    let bob = record(&records, "bob").unwrap();
    assert_eq!((bob.review_additions, bob.review_deletions), (30, 3));
}

#[tokio::test]
async fn test_self_merge_without_approval_earns_no_merge_credit() {
    let remote = FakeRemote::new();
    remote.put_pull_request(
        merged_by(pull_request(1, "alice", &march(10, 0)), "alice", &march(10, 0)),
        vec![],
        vec![],
        vec![merged_event("alice")],
    );

    let records = sync_and_aggregate(&remote).await;
    for r in &records {
        assert_eq!((r.merge_additions, r.merge_deletions), (0, 0), "{}", r.login);
    }
}

#[tokio::test]
async fn test_merge_by_other_credits_merger_and_author() {
    let remote = FakeRemote::new();
    remote.put_pull_request(
        merged_by(pull_request(1, "alice", &march(10, 0)), "dave", &march(10, 0)),
        vec![],
        vec![],
        vec![reviewed_event("bob"), merged_event("dave")],
    );

    let records = sync_and_aggregate(&remote).await;
    for login in ["alice", "dave"] {
        let r = record(&records, login).unwrap();
        assert_eq!((r.merge_additions, r.merge_deletions), (100, 10));
    }
}

#[tokio::test]
async fn test_approver_gets_full_pull_request_credit() {
    let remote = FakeRemote::new();
    remote.put_pull_request(
        merged_by(pull_request(1, "alice", &march(10, 0)), "dave", &march(10, 0)),
        vec![
            commit("a1", "alice", &march(1, 0), 3, 0),
            commit("a2", "alice", &march(2, 0), 2, 1),
        ],
        vec![
            review(11, "bob", &march(3, 0), "a1"),
            review(12, "bob", &march(4, 0), "a2"),
        ],
        vec![reviewed_event("bob"), merged_event("dave")],
    );

    let records = sync_and_aggregate(&remote).await;
    let bob = record(&records, "bob").unwrap();
    assert_eq!((bob.review_additions, bob.review_deletions), (100, 10));
    assert_eq!(record(&records, "dave").unwrap().review_additions, 0);
}

#[tokio::test]
async fn test_merge_actor_gets_credit_without_approvals() {
    let remote = FakeRemote::new();
    remote.put_pull_request(
        merged_by(pull_request(1, "alice", &march(10, 0)), "dave", &march(10, 0)),
        vec![],
        vec![],
        vec![merged_event("dave")],
    );

    // Merged twice (reverted and re-merged); the last merge event's actor
    // takes the credit.
    remote.put_pull_request(
        merged_by(pull_request(2, "alice", &march(12, 0)), "dave", &march(12, 0)),
        vec![],
        vec![],
        vec![merged_event("erin"), merged_event("frank")],
    );

    let records = sync_and_aggregate(&remote).await;
    let dave = record(&records, "dave").unwrap();
    assert_eq!((dave.review_additions, dave.review_deletions), (100, 10));
    let frank = record(&records, "frank").unwrap();
    assert_eq!((frank.review_additions, frank.review_deletions), (100, 10));
    assert!(record(&records, "erin").is_none());
}

#[tokio::test]
async fn test_closed_unmerged_counts_once() {
    let remote = FakeRemote::new();
    remote.put_pull_request(
        closed_unmerged(pull_request(1, "alice", &march(12, 0)), &march(12, 0)),
        vec![commit("a1", "alice", &march(1, 0), 10, 1)],
        vec![review(11, "bob", &march(3, 0), "a1")],
        vec![reviewed_event("bob")],
    );
    remote.put_pull_request(
        closed_unmerged(pull_request(2, "alice", &march(13, 0)), "2019-02-27T00:00:00Z"),
        vec![],
        vec![],
        vec![],
    );

    let records = sync_and_aggregate(&remote).await;
    let alice = record(&records, "alice").unwrap();
    assert_eq!(alice.closed_unmerged_count, 1);
    assert_eq!((alice.merge_additions, alice.merge_deletions), (0, 0));
}

#[tokio::test]
async fn test_pull_requests_untouched_since_month_start_are_ignored() {
    let remote = FakeRemote::new();
    // Updated in February; its March-dated commit is not examined.
    remote.put_pull_request(
        pull_request(1, "alice", "2019-02-28T23:59:59Z"),
        vec![commit("a1", "alice", &march(1, 0), 10, 1)],
        vec![],
        vec![],
    );

    let records = sync_and_aggregate(&remote).await;
    assert!(records.is_empty());
}

#[tokio::test]
async fn test_filters_and_unknown_organization() {
    let remote = FakeRemote::new();
    remote.put_pull_request(
        merged_by(pull_request(1, "alice", &march(10, 0)), "dave", &march(10, 0)),
        vec![commit("a1", "alice", &march(1, 0), 10, 1)],
        vec![],
        vec![],
    );
    remote.put_pull_request(
        pull_request(2, "carol", &march(11, 0)),
        vec![commit("c1", "carol", &march(2, 0), 7, 7)],
        vec![],
        vec![],
    );
    let (_dir, store, engine) = setup(&remote).await;
    engine
        .synchronize(ORG, None, &CancellationToken::new())
        .await
        .unwrap();
    let aggregator = Aggregator::new(store);
    let base = AttributionFilter::new(vec![ORG.into()], march_2019());

    let only_dave = aggregator
        .aggregate(&base.clone().with_user("dave"))
        .await
        .unwrap();
    assert_eq!(only_dave.len(), 1);
    assert_eq!(only_dave[0].login, "dave");

    let only_pr2 = aggregator
        .aggregate(&base.clone().with_pull_request(2))
        .await
        .unwrap();
    assert_eq!(only_pr2.len(), 1);
    assert_eq!(only_pr2[0].login, "carol");

    let other_repo = aggregator
        .aggregate(&base.clone().with_repository("politeia"))
        .await
        .unwrap();
    assert!(other_repo.is_empty());

    let err = aggregator
        .aggregate(&AttributionFilter::new(vec!["nobody".into()], march_2019()))
        .await
        .unwrap_err();
    assert!(err.is_not_found());
}

#[tokio::test]
async fn test_aggregate_spans_repositories_and_organizations() {
    let remote = FakeRemote::new();
    remote.put_pull_request(
        pull_request(1, "alice", &march(9, 0)),
        vec![commit("a1", "alice", &march(1, 0), 10, 1)],
        vec![],
        vec![],
    );
    remote.put_pull_request_in(
        WALLET,
        pull_request(2, "alice", &march(9, 0)),
        vec![commit("w1", "alice", &march(2, 0), 3, 3)],
        vec![],
        vec![],
    );
    remote.put_pull_request_in(
        "dcrlabs/politeia",
        pull_request(3, "alice", &march(9, 0)),
        vec![commit("p1", "alice", &march(3, 0), 7, 0)],
        vec![],
        vec![],
    );
    let (_dir, store, engine) = setup(&remote).await;
    let cancel = CancellationToken::new();
    engine.synchronize(ORG, None, &cancel).await.unwrap();
    engine.synchronize("dcrlabs", None, &cancel).await.unwrap();
    let aggregator = Aggregator::new(store);

    let records = aggregator
        .aggregate(&AttributionFilter::new(
            vec![ORG.into(), "dcrlabs".into()],
            march_2019(),
        ))
        .await
        .unwrap();
    let per_repo: Vec<(&str, &str, i64)> = records
        .iter()
        .map(|r| (r.organization.as_str(), r.repository.as_str(), r.commit_additions))
        .collect();
    assert_eq!(
        per_repo,
        vec![
            ("dcrlabs", "dcrlabs/politeia", 7),
            (ORG, FULL_NAME, 10),
            (ORG, WALLET, 3),
        ]
    );

    let decred_only = aggregator
        .aggregate(&AttributionFilter::new(vec![ORG.into()], march_2019()))
        .await
        .unwrap();
    assert_eq!(decred_only.len(), 2);
    assert!(decred_only.iter().all(|r| r.organization == ORG));

    let wallet_only = aggregator
        .aggregate(
            &AttributionFilter::new(vec![ORG.into(), "dcrlabs".into()], march_2019())
                .with_repository("dcrwallet"),
        )
        .await
        .unwrap();
    assert_eq!(wallet_only.len(), 1);
    assert_eq!(wallet_only[0].repository, WALLET);
}

#[tokio::test]
async fn test_aggregate_range_covers_each_month() {
    let remote = FakeRemote::new();
    remote.put_pull_request(
        pull_request(1, "alice", &march(10, 0)),
        vec![
            commit("f1", "alice", "2019-02-10T00:00:00Z", 1, 1),
            commit("m1", "alice", &march(1, 0), 2, 2),
        ],
        vec![],
        vec![],
    );
    let (_dir, store, engine) = setup(&remote).await;
    engine
        .synchronize(ORG, None, &CancellationToken::new())
        .await
        .unwrap();
    let aggregator = Aggregator::new(store);

    let from = MonthPeriod::new(2019, 2).unwrap();
    let to = MonthPeriod::new(2019, 4).unwrap();
    let records = aggregator
        .aggregate_range(&AttributionFilter::new(vec![ORG.into()], from), from, to)
        .await
        .unwrap();

    let months: Vec<(u32, i64)> = records.iter().map(|r| (r.month, r.commit_additions)).collect();
    assert_eq!(months, vec![(2, 1), (3, 2)]);

    assert!(aggregator
        .aggregate_range(&AttributionFilter::new(vec![ORG.into()], to), to, from)
        .await
        .is_err());
}

#[tokio::test]
async fn test_user_information_report() {
    let remote = FakeRemote::new();
    remote.put_pull_request(
        merged_by(pull_request(1, "alice", &march(10, 0)), "dave", &march(10, 0)),
        vec![commit("a1", "alice", &march(1, 0), 10, 1)],
        vec![review(11, "bob", &march(3, 0), "a1")],
        vec![reviewed_event("bob"), merged_event("dave")],
    );
    remote.put_pull_request(
        pull_request(2, "bob", &march(11, 0)),
        vec![commit("b1", "bob", &march(4, 0), 3, 3)],
        vec![review(21, "alice", &march(5, 0), "b1")],
        vec![],
    );
    let (_dir, store, engine) = setup(&remote).await;
    engine
        .synchronize(ORG, None, &CancellationToken::new())
        .await
        .unwrap();

    let info = user_information(&store, ORG, "alice", 2019, 3).await.unwrap();
    assert_eq!(info.user, "alice");
    assert_eq!(info.organization, ORG);
    assert_eq!(info.prs.len(), 1);
    assert_eq!(info.prs[0].number, 1);
    assert_eq!(info.prs[0].date, "Sun, 10 Mar 2019 00:00:00 UTC");

    assert_eq!(info.repo_details.len(), 1);
    let detail = &info.repo_details[0];
    assert_eq!(detail.repository, FULL_NAME);
    assert_eq!(detail.prs, vec![info.prs[0].url.clone()]);
    assert_eq!((detail.commit_additions, detail.commit_deletions), (10, 1));
    assert_eq!((detail.merge_additions, detail.merge_deletions), (100, 10));
    assert_eq!((detail.review_additions, detail.review_deletions), (3, 3));

    assert_eq!(info.reviews.len(), 1);
    assert_eq!(info.reviews[0].number, 2);
    assert_eq!(info.reviews[0].state, "APPROVED");

    let json = serde_json::to_value(&info).unwrap();
    assert!(json.get("repodetails").is_some());

    let err = user_information(&store, "nobody", "alice", 2019, 3)
        .await
        .unwrap_err();
    assert!(err.is_not_found());
    assert!(user_information(&store, ORG, "alice", 2019, 13).await.is_err());
}

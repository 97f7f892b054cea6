//! Properties over generated operation sequences.

use proptest::prelude::*;

use consent_kernel::{AllowBasis, Decision, EngineError, Missing};
use consent_kernel_store::Store;
use consent_kernel_testkit::generators::{data_category, identity, ops, Op, Outcome, Scenario, SUBJECTS};
use consent_kernel_testkit::TestFixture;

fn runtime() -> tokio::runtime::Runtime {
    tokio::runtime::Builder::new_multi_thread()
        .worker_threads(1)
        .enable_all()
        .build()
        .unwrap()
}

async fn run<S: Store>(scenario: &Scenario<S>, ops: &[Op]) -> anyhow::Result<Vec<Outcome>> {
    let mut outcomes = Vec::with_capacity(ops.len());
    for op in ops {
        outcomes.push(scenario.apply(op).await?);
    }
    Ok(outcomes)
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn test_audit_chain_verifies_after_any_sequence(ops in ops(40)) {
        let rt = runtime();
        rt.block_on(async {
            let scenario = Scenario::cast(TestFixture::new().await.unwrap()).await.unwrap();
            run(&scenario, &ops).await.unwrap();

            let head = scenario.engine().store().audit_head().await.unwrap().unwrap();
            let verified = scenario.engine().verify_audit_trail().await.unwrap();
            assert_eq!(verified, head.seq);
        });
    }

    #[test]
    fn test_audit_grows_by_exactly_one_per_accepted_call(ops in ops(40)) {
        let rt = runtime();
        rt.block_on(async {
            let scenario = Scenario::cast(TestFixture::new().await.unwrap()).await.unwrap();
            for op in &ops {
                let before = scenario.fixture.audit_len().await.unwrap();
                let outcome = scenario.apply(op).await.unwrap();
                let after = scenario.fixture.audit_len().await.unwrap();

                let expected = match (op, &outcome) {
                    (Op::Advance(_), _) => 0,
                    (_, Outcome::Refused(_)) => 0,
                    _ => 1,
                };
                assert_eq!(after - before, expected, "{:?} -> {:?}", op, outcome);
            }
        });
    }

    #[test]
    fn test_memory_and_sqlite_agree(ops in ops(30)) {
        let rt = runtime();
        rt.block_on(async {
            let memory = Scenario::cast(TestFixture::new().await.unwrap()).await.unwrap();
            let sqlite = Scenario::cast(TestFixture::sqlite().await.unwrap()).await.unwrap();

            let a = run(&memory, &ops).await.unwrap();
            let b = run(&sqlite, &ops).await.unwrap();
            assert_eq!(a, b);

            let ha = memory.engine().store().audit_head().await.unwrap().unwrap();
            let hb = sqlite.engine().store().audit_head().await.unwrap().unwrap();
            assert_eq!(ha.hash, hb.hash);
        });
    }

    #[test]
    fn test_consent_allow_implies_active_grant(ops in ops(40)) {
        let rt = runtime();
        rt.block_on(async {
            let scenario = Scenario::cast(TestFixture::new().await.unwrap()).await.unwrap();
            for op in &ops {
                let outcome = scenario.apply(op).await.unwrap();
                if let (Op::Authorize { subject, actor, category }, Outcome::Decided(Decision::Allow(AllowBasis::Consent))) = (op, &outcome) {
                    let grants = scenario
                        .engine()
                        .consents_for(&scenario.subjects[*subject], &scenario.subjects[*subject])
                        .await
                        .unwrap();
                    let now = scenario.engine().now();
                    let covered = grants.iter().any(|g| {
                        g.key.actor == scenario.actors[*actor]
                            && (g.key.category == *category || g.key.category == consent_kernel::DataCategory::All)
                            && g.is_active_at(now)
                    });
                    assert!(covered, "{:?} allowed without an active grant", op);
                }
            }
        });
    }

    #[test]
    fn test_authorize_on_unregistered_subject_is_not_found(
        stranger in identity(),
        category in data_category(),
    ) {
        prop_assume!(!SUBJECTS.contains(&stranger.as_str()));
        let rt = runtime();
        rt.block_on(async {
            let scenario = Scenario::cast(TestFixture::new().await.unwrap()).await.unwrap();
            let before = scenario.fixture.audit_len().await.unwrap();

            let err = scenario
                .engine()
                .authorize(&scenario.actors[0], &stranger, category, "lookup")
                .await
                .unwrap_err();
            assert!(matches!(err, EngineError::NotFound(Missing::Subject)));
            assert_eq!(scenario.fixture.audit_len().await.unwrap(), before + 1);
        });
    }
}

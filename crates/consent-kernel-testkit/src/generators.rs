//! Proptest generators for property-based testing.
//!
//! Besides strategies for the basic vocabulary, this module generates whole
//! operation sequences ([`Op`]) over a small fixed cast, which
//! [`Scenario::apply`] runs against any engine.

use proptest::prelude::*;

use consent_kernel::{Decision, Engine, EngineError, GrantConsent};
use consent_kernel_core::{DataCategory, Identity, RequestId, Role, SeverityLevel, Timestamp};
use consent_kernel_store::Store;

use crate::fixtures::TestFixture;

/// Generate any data category, `all` included.
pub fn data_category() -> impl Strategy<Value = DataCategory> {
    prop::sample::select(DataCategory::ALL.to_vec())
}

/// Generate a severity level.
pub fn severity() -> impl Strategy<Value = SeverityLevel> {
    prop_oneof![
        Just(SeverityLevel::Critical),
        Just(SeverityLevel::Urgent),
        Just(SeverityLevel::Standard),
    ]
}

/// Generate a grant duration; `None` exercises the fallback chain.
pub fn duration() -> impl Strategy<Value = Option<Timestamp>> {
    prop_oneof![Just(None), (1u64..=200).prop_map(Some), Just(Some(0))]
}

/// Generate an identity handle.
pub fn identity() -> impl Strategy<Value = Identity> {
    "[a-z][a-z0-9-]{0,15}".prop_map(Identity::new)
}

/// The cast every generated scenario runs with.
pub const SUBJECTS: [&str; 2] = ["pt-a", "pt-b"];
pub const ACTORS: [(&str, Role); 5] = [
    ("dr", Role::Doctor),
    ("nurse", Role::Nurse),
    ("tech", Role::Technician),
    ("res", Role::Researcher),
    ("medic", Role::Emergency),
];

/// One engine call, naming cast members by index.
#[derive(Debug, Clone)]
pub enum Op {
    Grant {
        subject: usize,
        actor: usize,
        category: DataCategory,
        duration: Option<Timestamp>,
    },
    Revoke {
        subject: usize,
        actor: usize,
        category: DataCategory,
    },
    Suspend {
        subject: usize,
        actor: usize,
        category: DataCategory,
    },
    Resume {
        subject: usize,
        actor: usize,
        category: DataCategory,
    },
    Authorize {
        subject: usize,
        actor: usize,
        category: DataCategory,
    },
    Request {
        subject: usize,
        actor: usize,
        category: DataCategory,
    },
    /// Approve or deny request number `request`, as the root admin.
    Decide {
        request: u64,
        approve: bool,
    },
    Emergency {
        subject: usize,
        level: SeverityLevel,
    },
    Deactivate {
        actor: usize,
    },
    Advance(Timestamp),
}

fn subject_idx() -> impl Strategy<Value = usize> {
    0..SUBJECTS.len()
}

fn actor_idx() -> impl Strategy<Value = usize> {
    0..ACTORS.len()
}

impl Arbitrary for Op {
    type Parameters = ();
    type Strategy = BoxedStrategy<Self>;

    fn arbitrary_with(_: Self::Parameters) -> Self::Strategy {
        prop_oneof![
            4 => (subject_idx(), actor_idx(), data_category(), duration()).prop_map(
                |(subject, actor, category, duration)| Op::Grant { subject, actor, category, duration }
            ),
            2 => (subject_idx(), actor_idx(), data_category())
                .prop_map(|(subject, actor, category)| Op::Revoke { subject, actor, category }),
            1 => (subject_idx(), actor_idx(), data_category())
                .prop_map(|(subject, actor, category)| Op::Suspend { subject, actor, category }),
            1 => (subject_idx(), actor_idx(), data_category())
                .prop_map(|(subject, actor, category)| Op::Resume { subject, actor, category }),
            5 => (subject_idx(), actor_idx(), data_category())
                .prop_map(|(subject, actor, category)| Op::Authorize { subject, actor, category }),
            2 => (subject_idx(), actor_idx(), data_category())
                .prop_map(|(subject, actor, category)| Op::Request { subject, actor, category }),
            1 => (1u64..=6, any::<bool>()).prop_map(|(request, approve)| Op::Decide { request, approve }),
            1 => (subject_idx(), severity()).prop_map(|(subject, level)| Op::Emergency { subject, level }),
            1 => actor_idx().prop_map(|actor| Op::Deactivate { actor }),
            3 => (1u64..=100).prop_map(Op::Advance),
        ]
        .boxed()
    }
}

/// Generate an operation sequence.
pub fn ops(max_len: usize) -> impl Strategy<Value = Vec<Op>> {
    prop::collection::vec(any::<Op>(), 0..=max_len)
}

/// What one op produced. Domain errors are recorded, not propagated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Done,
    Decided(Decision),
    Refused(consent_kernel::ErrorKind),
}

/// A fixture with the fixed cast registered.
pub struct Scenario<S: Store> {
    pub fixture: TestFixture<S>,
    pub subjects: Vec<Identity>,
    pub actors: Vec<Identity>,
}

impl<S: Store> Scenario<S> {
    /// Register the cast on a fresh fixture.
    pub async fn cast(fixture: TestFixture<S>) -> anyhow::Result<Self> {
        let mut subjects = Vec::with_capacity(SUBJECTS.len());
        for handle in SUBJECTS {
            subjects.push(fixture.subject(handle).await?);
        }
        let mut actors = Vec::with_capacity(ACTORS.len());
        for (handle, role) in ACTORS {
            actors.push(fixture.actor(handle, role).await?);
        }
        Ok(Self {
            fixture,
            subjects,
            actors,
        })
    }

    pub fn engine(&self) -> &Engine<S> {
        &self.fixture.engine
    }

    /// Run one op. Store failures are errors; refusals are outcomes.
    pub async fn apply(&self, op: &Op) -> anyhow::Result<Outcome> {
        let engine = self.engine();
        let result: Result<Outcome, EngineError> = match op {
            Op::Grant {
                subject,
                actor,
                category,
                duration,
            } => {
                let mut params = GrantConsent::new(self.actors[*actor].clone(), *category);
                params.duration = *duration;
                engine
                    .grant_consent(&self.subjects[*subject], params)
                    .await
                    .map(|_| Outcome::Done)
            }
            Op::Revoke {
                subject,
                actor,
                category,
            } => engine
                .revoke_consent(&self.subjects[*subject], &self.actors[*actor], *category, "generated")
                .await
                .map(|_| Outcome::Done),
            Op::Suspend {
                subject,
                actor,
                category,
            } => engine
                .suspend_consent(&self.subjects[*subject], &self.actors[*actor], *category)
                .await
                .map(|_| Outcome::Done),
            Op::Resume {
                subject,
                actor,
                category,
            } => engine
                .resume_consent(&self.subjects[*subject], &self.actors[*actor], *category)
                .await
                .map(|_| Outcome::Done),
            Op::Authorize {
                subject,
                actor,
                category,
            } => engine
                .authorize(&self.actors[*actor], &self.subjects[*subject], *category, "generated")
                .await
                .map(Outcome::Decided),
            Op::Request {
                subject,
                actor,
                category,
            } => engine
                .request_access(&self.actors[*actor], &self.subjects[*subject], *category, "generated")
                .await
                .map(|_| Outcome::Done),
            Op::Decide { request, approve } => {
                let id = RequestId(*request);
                let root = &self.fixture.root;
                let decided = if *approve {
                    engine.approve_access_request(root, id).await
                } else {
                    engine.deny_access_request(root, id, None).await
                };
                decided.map(|_| Outcome::Done)
            }
            Op::Emergency { subject, level } => {
                let medic = &self.actors[ACTORS.len() - 1];
                engine
                    .activate_emergency_access(medic, &self.subjects[*subject], "generated", *level)
                    .await
                    .map(|_| Outcome::Done)
            }
            Op::Deactivate { actor } => {
                let actor = &self.actors[*actor];
                engine
                    .deactivate_actor(&self.fixture.root, actor)
                    .await
                    .map(|_| Outcome::Done)
            }
            Op::Advance(delta) => {
                self.fixture.clock.advance(*delta);
                Ok(Outcome::Done)
            }
        };

        match result {
            Ok(outcome) => Ok(outcome),
            Err(err @ (EngineError::Store(_) | EngineError::Core(_))) => Err(err.into()),
            Err(err) => Ok(Outcome::Refused(err.kind())),
        }
    }
}

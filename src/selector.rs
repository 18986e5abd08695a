//! §4.3 RunnerSelector — a pure function from an observed `Runner` snapshot
//! and a desired replica count to a scale decision. Kept free of any
//! `kube`/cluster dependency so it can be exhaustively unit tested; the
//! Reconciler is a thin I/O shell around it (§9 "Pure selector").
use crate::resource::RunnerPhase;

/// Everything the selector needs to know about one observed `EphemeralRunner`.
/// Built by the Reconciler from the live object; intentionally decoupled
/// from the `kube`-generated type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunnerSnapshot {
    pub name: String,
    pub phase: RunnerPhase,
    pub runner_id: i64,
    pub job_request_id: i64,
    pub patch_id: i64,
}

impl RunnerSnapshot {
    pub fn has_job(&self) -> bool {
        self.job_request_id != 0
    }

    fn classify(&self, current_patch_id: i64) -> Kind {
        if self.has_job() {
            return Kind::RunningJob;
        }
        if self.phase == RunnerPhase::Failed {
            return Kind::Failed;
        }
        if self.patch_id != current_patch_id {
            return Kind::Stale;
        }
        match self.phase {
            RunnerPhase::Succeeded => Kind::Finished,
            RunnerPhase::Pending if self.runner_id == 0 => Kind::Pending,
            _ => Kind::IdleConfigured,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Kind {
    /// `jobRequestId != 0`. Never deletable by scale-down (I4).
    RunningJob,
    /// `phase = Failed`. Never auto-deleted outside teardown (I5).
    Failed,
    /// `phase = Succeeded`, no job. Always deletable, reaped unconditionally.
    Finished,
    /// Carries a `patchId` that no longer matches the RunnerSet's current
    /// template generation. Treated like Finished: excluded from the
    /// effective count and reaped unconditionally (see SPEC_FULL.md §12).
    Stale,
    /// `phase = Pending`, `runnerId = 0`. Deletable via dispatch-service
    /// cancellation of the pending assignment.
    Pending,
    /// `phase = Running`, no job, `runnerId != 0`. Deletable after
    /// dispatch-service deregistration.
    IdleConfigured,
}

/// How a deletable Runner should be removed, i.e. what the Reconciler must
/// do with the DispatchClient before deleting the object.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeletionReason {
    /// No external call needed: the runner already finished or is stale.
    Reap,
    /// Rescind the pending assignment by runner-scale-set + runner name.
    CancelPending,
    /// Deregister the runner by its assigned `runnerId`.
    Deregister,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Deletion {
    pub name: String,
    pub reason: DeletionReason,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Decision {
    /// Number of new `EphemeralRunner` objects to create.
    pub to_create: u32,
    /// Runners to delete, in the order the Reconciler should process them.
    pub to_delete: Vec<Deletion>,
}

/// §4.3: partition `runners` into create/delete/unchanged given `replicas`.
///
/// `current_patch_id` is the RunnerSet's current `spec.patchId`; runners
/// created from a stale template generation are treated as already gone for
/// the purposes of the effective count (see SPEC_FULL.md §12).
pub fn select(runners: &[RunnerSnapshot], replicas: i32, current_patch_id: i64) -> Decision {
    let mut running_job = Vec::new();
    let mut failed = Vec::new();
    let mut finished = Vec::new();
    let mut stale = Vec::new();
    let mut pending = Vec::new();
    let mut idle_configured = Vec::new();

    for r in runners {
        match r.classify(current_patch_id) {
            Kind::RunningJob => running_job.push(r),
            Kind::Failed => failed.push(r),
            Kind::Finished => finished.push(r),
            Kind::Stale => stale.push(r),
            Kind::Pending => pending.push(r),
            Kind::IdleConfigured => idle_configured.push(r),
        }
    }

    for bucket in [&mut finished, &mut stale, &mut pending, &mut idle_configured] {
        bucket.sort_by(|a, b| a.name.cmp(&b.name));
    }

    let effective_count =
        running_job.len() + failed.len() + pending.len() + idle_configured.len();
    let replicas = replicas.max(0) as usize;

    // Finished and stale runners are reaped every pass regardless of target.
    let mut to_delete: Vec<Deletion> = finished
        .iter()
        .map(|r| Deletion {
            name: r.name.clone(),
            reason: DeletionReason::Reap,
        })
        .chain(stale.iter().map(|r| Deletion {
            name: r.name.clone(),
            reason: DeletionReason::Reap,
        }))
        .collect();

    let to_create = replicas.saturating_sub(effective_count) as u32;

    if effective_count > replicas {
        let mut remaining = effective_count - replicas;
        for r in &pending {
            if remaining == 0 {
                break;
            }
            to_delete.push(Deletion {
                name: r.name.clone(),
                reason: DeletionReason::CancelPending,
            });
            remaining -= 1;
        }
        for r in &idle_configured {
            if remaining == 0 {
                break;
            }
            to_delete.push(Deletion {
                name: r.name.clone(),
                reason: DeletionReason::Deregister,
            });
            remaining -= 1;
        }
        // `running_job` and `failed` are never touched here: if `remaining`
        // is still nonzero, the next reconcile pass retries once those
        // states change (I4, I5).
    }

    Decision {
        to_create,
        to_delete,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn runner(name: &str, phase: RunnerPhase, runner_id: i64, job_request_id: i64) -> RunnerSnapshot {
        RunnerSnapshot {
            name: name.to_owned(),
            phase,
            runner_id,
            job_request_id,
            patch_id: 1,
        }
    }

    #[test]
    fn scale_up_from_zero() {
        let decision = select(&[], 5, 1);
        assert_eq!(decision.to_create, 5);
        assert!(decision.to_delete.is_empty());
    }

    #[test]
    fn reap_finished_and_replace() {
        let runners = vec![
            runner("a", RunnerPhase::Running, 1, 0),
            runner("b", RunnerPhase::Running, 2, 0),
            runner("c", RunnerPhase::Running, 3, 0),
            runner("d", RunnerPhase::Running, 4, 0),
            runner("e", RunnerPhase::Succeeded, 5, 0),
        ];
        let decision = select(&runners, 5, 1);
        assert_eq!(decision.to_create, 1, "one replacement for the finished runner");
        assert_eq!(
            decision.to_delete,
            vec![Deletion {
                name: "e".to_owned(),
                reason: DeletionReason::Reap,
            }]
        );
    }

    #[test]
    fn scale_down_respects_running_jobs() {
        let mut runners: Vec<_> = (0..5)
            .map(|i| runner(&format!("r{i}"), RunnerPhase::Running, i + 1, 0))
            .collect();
        runners[0].job_request_id = 1000;
        runners[1].job_request_id = 1001;

        let decision = select(&runners, 1, 1);
        assert_eq!(decision.to_create, 0);
        // Converges towards 2 (the two with jobs), not 1: only 3 deletions
        // scheduled (effective_count=5, replicas=1 -> remove 4, but only
        // r2..r4 are deletable; r0/r1 are protected by I4).
        let deleted: Vec<_> = decision.to_delete.iter().map(|d| d.name.as_str()).collect();
        assert_eq!(deleted.len(), 3);
        assert!(!deleted.contains(&"r0"));
        assert!(!deleted.contains(&"r1"));
    }

    #[test]
    fn failed_runner_blocks_scale_down() {
        let runners = vec![
            {
                let mut r = runner("job", RunnerPhase::Running, 1, 1000);
                r.job_request_id = 1000;
                r
            },
            runner("failed", RunnerPhase::Failed, 2, 0),
        ];
        let decision = select(&runners, 0, 1);
        assert_eq!(decision.to_create, 0);
        // Neither is deletable by scale-down: job is protected by I4, failed by I5.
        assert!(decision.to_delete.is_empty());
    }

    #[test]
    fn deletion_priority_is_pending_then_idle_configured() {
        let runners = vec![
            runner("idle-a", RunnerPhase::Running, 1, 0),
            runner("idle-b", RunnerPhase::Running, 2, 0),
            runner("pending-a", RunnerPhase::Pending, 0, 0),
            runner("pending-b", RunnerPhase::Pending, 0, 0),
        ];
        let decision = select(&runners, 1, 1);
        assert_eq!(decision.to_create, 0);
        let reasons: Vec<_> = decision
            .to_delete
            .iter()
            .map(|d| (d.name.as_str(), d.reason))
            .collect();
        // 3 deletions needed (4 -> 1); both pending go first (sorted by
        // name), then the lexicographically-first idle-configured runner.
        assert_eq!(
            reasons,
            vec![
                ("pending-a", DeletionReason::CancelPending),
                ("pending-b", DeletionReason::CancelPending),
                ("idle-a", DeletionReason::Deregister),
            ]
        );
    }

    #[test]
    fn stale_patch_id_runners_are_reaped_and_excluded_from_effective_count() {
        let mut stale = runner("old", RunnerPhase::Running, 1, 0);
        stale.patch_id = 0;
        let current = runner("current", RunnerPhase::Running, 2, 0);
        let decision = select(&[stale, current], 1, 1);
        assert_eq!(decision.to_create, 0, "current runner alone satisfies replicas=1");
        assert_eq!(
            decision.to_delete,
            vec![Deletion {
                name: "old".to_owned(),
                reason: DeletionReason::Reap,
            }]
        );
    }

    #[test]
    fn stale_runner_with_job_is_still_protected() {
        let mut stale_with_job = runner("old", RunnerPhase::Running, 1, 42);
        stale_with_job.patch_id = 0;
        let decision = select(&[stale_with_job], 0, 1);
        assert!(
            decision.to_delete.is_empty(),
            "a running job is never deleted outside teardown, even on a stale template"
        );
    }

    #[test]
    fn idempotent_on_steady_state() {
        let runners = vec![
            runner("a", RunnerPhase::Running, 1, 0),
            runner("b", RunnerPhase::Running, 2, 0),
        ];
        let decision = select(&runners, 2, 1);
        assert_eq!(decision, Decision::default());
    }

    #[test]
    fn ties_broken_lexicographically() {
        let runners = vec![
            runner("zeta", RunnerPhase::Pending, 0, 0),
            runner("alpha", RunnerPhase::Pending, 0, 0),
            runner("mid", RunnerPhase::Pending, 0, 0),
        ];
        let decision = select(&runners, 0, 1);
        let names: Vec<_> = decision.to_delete.iter().map(|d| d.name.as_str()).collect();
        assert_eq!(names, vec!["alpha", "mid", "zeta"]);
    }
}

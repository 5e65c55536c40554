use chrono::Utc;
use criterion::{black_box, criterion_group, criterion_main, Criterion};

use agencyhub_core::TenantId;
use agencyhub_scheduling::{Job, JobTransition, JobType, RetryPolicy};

fn bench_retry_decision(c: &mut Criterion) {
    let policy = RetryPolicy::default();
    let now = Utc::now();

    c.bench_function("retry_policy_decide", |b| {
        b.iter(|| {
            for attempts in 0..10u32 {
                black_box(policy.decide(black_box(attempts), 5, now));
            }
        })
    });
}

fn bench_claim_and_fail(c: &mut Criterion) {
    let policy = RetryPolicy::default();
    let tenant_id = TenantId::new();
    let now = Utc::now();

    c.bench_function("job_claim_then_retry_transition", |b| {
        b.iter(|| {
            let mut job = Job::new(tenant_id, JobType::PublishArticle, now);
            job.claim(now).unwrap();
            let transition = JobTransition::after_failure(&job, "remote error", &policy, now);
            job.apply(&transition).unwrap();
            black_box(job)
        })
    });
}

criterion_group!(benches, bench_retry_decision, bench_claim_and_fail);
criterion_main!(benches);

use crate::infra::{load_rubrics, InMemoryApplicationRepository, LoggingNotificationPublisher};
use chrono::{DateTime, Duration, Utc};
use clap::Args;
use grant_review::error::AppError;
use grant_review::workflows::grants::{
    Actor, ActorId, ApplicationId, Clock, CriterionScore, DueDiligenceView, GrantReviewService,
    PrimaryAssessment, ReviewPolicy, ReviewSlotView, ReviewSubmission, Role, Rubric, Track,
    ValidatorAction,
};
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

type DemoService = GrantReviewService<InMemoryApplicationRepository, LoggingNotificationPublisher>;

#[derive(Args, Debug, Default)]
pub(crate) struct DemoArgs {
    /// Rubric CSV to score against. Defaults to the bundled rubric.
    #[arg(long)]
    pub(crate) rubric: Option<PathBuf>,
    /// Score entered by reviewer 1 (0-100).
    #[arg(long, default_value_t = 82.0)]
    pub(crate) first_score: f64,
    /// Score entered by reviewer 2 (0-100).
    #[arg(long, default_value_t = 64.0)]
    pub(crate) second_score: f64,
    /// Let the validator miss the approval window so the sweep reassigns the record.
    #[arg(long)]
    pub(crate) expire_validator: bool,
    /// Have the validator query the first assessment before approving a second one.
    #[arg(long)]
    pub(crate) query_first: bool,
}

/// Wall clock that the demo can push forward to cross deadlines.
#[derive(Default)]
struct DemoClock {
    offset: Mutex<Duration>,
}

impl DemoClock {
    fn advance(&self, by: Duration) {
        let mut offset = match self.offset.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        *offset = *offset + by;
    }
}

impl Clock for DemoClock {
    fn now(&self) -> DateTime<Utc> {
        let offset = match self.offset.lock() {
            Ok(guard) => *guard,
            Err(poisoned) => *poisoned.into_inner(),
        };
        Utc::now() + offset
    }
}

pub(crate) fn run_demo(args: DemoArgs) -> Result<(), AppError> {
    let rubrics = load_rubrics(args.rubric.as_deref())?;
    let clock = Arc::new(DemoClock::default());
    let notifier = Arc::new(LoggingNotificationPublisher::default());
    let service = GrantReviewService::new(
        Arc::new(InMemoryApplicationRepository::default()),
        notifier.clone(),
        rubrics,
        ReviewPolicy::default(),
    )
    .with_clock(clock.clone());

    println!("Grant review demo");
    let intake = Actor::new("intake-desk", Role::Admin);
    let id = service
        .register_application(&intake, Track::Foundation)?
        .application
        .id;
    println!("Registered application {id} on the foundation track");

    demo_double_review(&service, id, &args)?;
    demo_due_diligence(&service, &clock, id, &args)?;
    demo_lock(&service, id)?;

    let notices = notifier.sent();
    if notices.is_empty() {
        println!("\nNotifications: none dispatched");
    } else {
        println!("\nNotifications");
        for notice in notices {
            let details: Vec<String> = notice
                .details
                .iter()
                .map(|(key, value)| format!("{key}={value}"))
                .collect();
            println!("- {} [{}]", notice.template, details.join(", "));
        }
    }
    Ok(())
}

fn demo_double_review(
    service: &DemoService,
    id: ApplicationId,
    args: &DemoArgs,
) -> Result<(), AppError> {
    let rubric = service.rubrics().for_track(Track::Foundation);
    let reviewer1 = Actor::new("reviewer-amara", Role::Reviewer1);
    let reviewer2 = Actor::new("reviewer-bongani", Role::Reviewer2);

    println!("\nBlind double review");
    let first = service.submit_review(
        id,
        &reviewer1,
        sheet(rubric, args.first_score, "Strong community evidence, thin budget."),
    )?;
    println!("  Reviewer 1 scored {:.1}; status is now {}", first.score, first.status);

    let blind = service.get_review_status(id, &reviewer2)?;
    println!(
        "  Reviewer 2 sees reviewer 1 as: {}",
        describe_slot(&blind.reviewer1)
    );

    let second = service.submit_review(
        id,
        &reviewer2,
        sheet(rubric, args.second_score, "Delivery plan needs named partners."),
    )?;
    if let Some(outcome) = &second.outcome {
        println!(
            "  Reviewer 2 scored {:.1}; final score {:.1} ({:?}){}",
            second.score,
            outcome.final_score,
            outcome.decision,
            if outcome.overrode_reviewer1 {
                ", overriding reviewer 1"
            } else {
                ""
            }
        );
    }

    let full = service.get_review_status(id, &reviewer1)?;
    println!(
        "  After completion reviewer 1 sees reviewer 2 as: {}",
        describe_slot(&full.reviewer2)
    );

    if let Some(disparity) = service.calculate_score_disparity(id)? {
        println!("  Score disparity: {disparity:.1}");
    }
    Ok(())
}

fn demo_due_diligence(
    service: &DemoService,
    clock: &DemoClock,
    id: ApplicationId,
    args: &DemoArgs,
) -> Result<(), AppError> {
    let oversight = Actor::new("oversight-lindiwe", Role::Oversight);
    let admin = Actor::new("admin-kea", Role::Admin);
    let primary = Actor::new("tech-thandi", Role::TechnicalReviewer);
    let rival = Actor::new("tech-musa", Role::TechnicalReviewer);
    let validator = Actor::new("tech-olu", Role::TechnicalReviewer);
    let backup_validator = Actor::new("tech-zanele", Role::TechnicalReviewer);
    let pool = [validator.id.clone(), backup_validator.id.clone(), rival.id.clone()];

    println!("\nOversight");
    let signal = service.assess_escalation(id, &oversight)?;
    if signal.reasons.is_empty() {
        println!("  No escalation signals");
    }
    for reason in &signal.reasons {
        println!("  Signal: {}", serde_json::to_string(reason).unwrap_or_default());
    }
    if signal.recommend_due_diligence {
        service.recommend_for_due_diligence(
            id,
            &oversight,
            "Reviewer scores diverge; verify delivery capacity on site.",
        )?;
        println!("  Oversight recommended the application for due diligence");
    }

    println!("\nDue diligence");
    let pool_entries = service.due_diligence_pool(&primary)?;
    println!("  Claimable applications: {}", pool_entries.len());

    service.claim_dd_application(id, &primary)?;
    println!("  {} claimed the assessment", primary.id);
    match service.claim_dd_application(id, &rival) {
        Ok(_) => println!("  {} also claimed it (unexpected)", rival.id),
        Err(err) => println!("  {} was turned away: {}", rival.id, err),
    }

    let rubric = service.rubrics().for_track(Track::Foundation);
    let view = service.submit_primary_dd_review(id, &primary, assessment(rubric, 74.0))?;
    print_dd(&view);

    let assigned = service.select_validator_reviewer(id, &primary, &validator.id, &pool)?;
    println!(
        "  {} must validate by {}",
        validator.id,
        assigned
            .due_diligence
            .approval_deadline
            .map(|at| at.to_rfc3339())
            .unwrap_or_default()
    );

    let mut current_validator = validator;
    if args.expire_validator {
        clock.advance(service.policy().dd_approval_window + Duration::hours(1));
        let report = service.sweep_expired_approvals()?;
        println!(
            "  Approval window elapsed; sweep reassigned {} application(s)",
            report.reassigned.len()
        );
        service.select_validator_reviewer(id, &primary, &backup_validator.id, &pool)?;
        println!("  {} selected as replacement validator", backup_validator.id);
        current_validator = backup_validator;
    }

    if args.query_first {
        service.submit_validator_action(
            id,
            &current_validator,
            ValidatorAction::Queried,
            "Budget lines do not match the bank statements.",
        )?;
        println!("  {} queried the assessment; it is back in the pool", current_validator.id);

        service.claim_dd_application(id, &rival)?;
        println!("  {} claimed the queried assessment", rival.id);
        service.submit_primary_dd_review(id, &rival, assessment(rubric, 68.0))?;
        service.select_validator_reviewer(id, &rival, &current_validator.id, &pool)?;
    }

    let approved = service.submit_validator_action(
        id,
        &current_validator,
        ValidatorAction::Approved,
        "Findings verified against source documents.",
    )?;
    println!("  {} approved the assessment", current_validator.id);
    print_dd(&approved);

    for (score, reason) in [
        (70.0, "Site visit confirmed partner commitments."),
        (72.5, "Committee adjusted after budget revision."),
    ] {
        let overridden = service.admin_override_dd_score(id, &admin, score, reason)?;
        println!(
            "  Admin override to {:.1} (original {:.1})",
            score,
            overridden.due_diligence.original_score.unwrap_or_default()
        );
    }
    Ok(())
}

fn demo_lock(service: &DemoService, id: ApplicationId) -> Result<(), AppError> {
    let admin = Actor::new("admin-kea", Role::Admin);
    let reviewer1 = Actor::new("reviewer-amara", Role::Reviewer1);

    println!("\nLocking");
    let lock = service.lock_application(id, &admin, "Funding committee decision pending")?;
    println!("  Locked by {}: {}", lock.locked_by, lock.reason);

    let rubric = service.rubrics().for_track(Track::Foundation);
    match service.revise_review(id, &reviewer1, sheet(rubric, 90.0, "Second look after site visit.")) {
        Ok(_) => println!("  Revision accepted while locked (unexpected)"),
        Err(err) => println!("  Revision refused: {err}"),
    }

    service.unlock_application(id, &admin)?;
    println!("  Unlocked");
    Ok(())
}

/// Distribute `total` across the rubric, filling criteria in order.
fn sheet(rubric: &Rubric, total: f64, notes: &str) -> ReviewSubmission {
    let mut remaining = total;
    let detailed_scores = rubric
        .criteria()
        .map(|(_, criterion)| {
            let score = remaining.min(criterion.max_points).max(0.0);
            remaining -= score;
            CriterionScore::new(criterion.id.clone(), score)
        })
        .collect();
    ReviewSubmission {
        detailed_scores,
        general_notes: notes.to_string(),
    }
}

fn assessment(rubric: &Rubric, score: f64) -> PrimaryAssessment {
    let items = rubric
        .criteria()
        .take(2)
        .map(|(_, criterion)| CriterionScore::new(criterion.id.clone(), criterion.max_points / 2.0))
        .collect();
    PrimaryAssessment {
        score,
        notes: "Verified registration documents and audited statements.".to_string(),
        items,
    }
}

fn describe_slot(view: &ReviewSlotView) -> String {
    match (view.filled, view.redacted, view.score) {
        (false, _, _) => "not yet submitted".to_string(),
        (true, true, _) => "submitted (details hidden)".to_string(),
        (true, false, Some(score)) => format!("scored {score:.1}"),
        (true, false, None) => "submitted".to_string(),
    }
}

fn print_dd(view: &DueDiligenceView) {
    let dd = &view.due_diligence;
    let primary = dd
        .primary_reviewer_id
        .as_ref()
        .map(ActorId::to_string)
        .unwrap_or_else(|| "unassigned".to_string());
    println!(
        "  Status {} | primary {} | score {}",
        dd.status.label(),
        primary,
        view.effective_score
            .map(|score| format!("{score:.1}"))
            .unwrap_or_else(|| "-".to_string())
    );
    if let Some(breakdown) = &view.item_breakdown {
        for category in &breakdown.categories {
            println!("    {}: {:.1}", category.category, category.subtotal);
        }
    }
}

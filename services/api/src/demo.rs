use crate::infra::{
    default_programs, InMemoryAcademicRepository, InMemoryEligibilityStore,
    InMemoryOrderRepository, InMemoryProgramCatalog, LoggingNotifier, SimulatedGateway,
};
use chrono::{Local, NaiveDate};
use clap::Args;
use edutravel::error::AppError;
use edutravel::identity::{Caller, UserId};
use edutravel::workflows::eligibility::{
    summarize, EducationLevel, EligibilityService, NewEducationEntry, NewTestScore,
    ProfilePatch, ScoringTable, TestType,
};
use edutravel::workflows::payments::signature;
use edutravel::workflows::payments::{
    InitializePayment, NewOrder, OrderKind, PaymentReconciliationService, PaymentSettings,
    VerifyPayment, WebhookOutcome,
};
use rust_decimal::Decimal;
use std::collections::BTreeMap;
use std::sync::Arc;

const DEMO_WEBHOOK_SECRET: &str = "demo-webhook-secret";

#[derive(Args, Debug, Default)]
pub(crate) struct DemoArgs {
    /// Evaluation date for test score expiry (YYYY-MM-DD). Defaults to today.
    #[arg(long, value_parser = crate::infra::parse_date)]
    pub(crate) today: Option<NaiveDate>,
    /// Amount in minor units the simulated gateway reports. Defaults to the order amount.
    #[arg(long)]
    pub(crate) settled_minor_units: Option<i64>,
    /// Skip the payment portion of the demo.
    #[arg(long)]
    pub(crate) skip_payment: bool,
}

pub(crate) async fn run_demo(args: DemoArgs) -> Result<(), AppError> {
    let DemoArgs {
        today,
        settled_minor_units,
        skip_payment,
    } = args;

    let today = today.unwrap_or_else(|| Local::now().date_naive());
    let student = UserId::new("demo-student");

    println!("EduTravel demo ({today})");
    run_eligibility_demo(&student, today);

    if !skip_payment {
        run_payment_demo(&student, settled_minor_units).await;
    }

    Ok(())
}

fn run_eligibility_demo(student: &UserId, today: NaiveDate) {
    let service = EligibilityService::new(
        Arc::new(InMemoryAcademicRepository::default()),
        Arc::new(InMemoryProgramCatalog::new(default_programs())),
        Arc::new(InMemoryEligibilityStore::default()),
        ScoringTable::default(),
    );

    println!("\nEligibility");
    let patch = ProfilePatch {
        intended_education_level: Some(EducationLevel::Masters),
        field_of_study: Some("Computer Science".to_string()),
        preferred_countries: Some(vec!["Canada".to_string(), "United Kingdom".to_string()]),
        ..ProfilePatch::default()
    };
    if let Err(err) = service.update_profile(student, patch, today) {
        println!("  Profile update failed: {err}");
        return;
    }

    let degree = NewEducationEntry {
        level: EducationLevel::Undergraduate,
        institution: "University of Ghana".to_string(),
        field_of_study: "Computer Science".to_string(),
        start_date: today - chrono::Duration::days(5 * 365),
        end_date: Some(today - chrono::Duration::days(365)),
        graduated: true,
        grade: Some("First Class".to_string()),
    };
    if let Err(err) = service.add_education_entry(student, degree, today) {
        println!("  Education history rejected: {err}");
        return;
    }

    let ielts = NewTestScore {
        test_type: TestType::Ielts,
        sub_scores: BTreeMap::from([
            ("listening".to_string(), 7.5),
            ("reading".to_string(), 7.0),
            ("writing".to_string(), 6.5),
            ("speaking".to_string(), 7.0),
        ]),
        overall_score: 7.0,
        test_date: Some(today - chrono::Duration::days(120)),
        expiry_date: Some(today + chrono::Duration::days(610)),
    };
    let summary = match service.add_test_score(student, ielts, today) {
        Ok((_, summary)) => summary,
        Err(err) => {
            println!("  Test score rejected: {err}");
            return;
        }
    };
    println!(
        "  Recomputed {} program(s), skipped {}",
        summary.updated.len(),
        summary.skipped.len()
    );

    let results = match service.results(student) {
        Ok(results) => results,
        Err(err) => {
            println!("  Results unavailable: {err}");
            return;
        }
    };
    for result in results {
        let verdict = if result.is_eligible {
            "eligible"
        } else {
            "not eligible"
        };
        println!(
            "  - {}: {}/{} ({verdict}) {}",
            result.program_id,
            result.score,
            result.max_score,
            summarize(&result.breakdown)
        );
    }
}

async fn run_payment_demo(student: &UserId, settled_minor_units: Option<i64>) {
    println!("\nPayment reconciliation");
    let owner = Caller::user(student.as_str());
    let amount = Decimal::new(50_000, 2);
    let settled = settled_minor_units.unwrap_or(50_000);

    let orders = Arc::new(InMemoryOrderRepository::default());
    let notifier = Arc::new(LoggingNotifier::default());
    let service = PaymentReconciliationService::new(
        orders,
        Arc::new(SimulatedGateway::settling(settled, "GHS")),
        notifier.clone(),
        PaymentSettings {
            webhook_secret: Some(DEMO_WEBHOOK_SECRET.to_string()),
            currency: "GHS".to_string(),
        },
    );

    let order = match service.place_order(
        &owner,
        NewOrder {
            kind: OrderKind::Visa,
            amount,
        },
    ) {
        Ok(order) => order,
        Err(err) => {
            println!("  Order rejected: {err}");
            return;
        }
    };
    println!(
        "  Placed {} for a {} ({} {})",
        order.id,
        order.kind.label(),
        order.amount,
        order.currency
    );

    let authorization = match service
        .initialize(
            &owner,
            InitializePayment {
                order_id: order.id.clone(),
                email: "student@example.com".to_string(),
                callback_url: None,
            },
        )
        .await
    {
        Ok(authorization) => authorization,
        Err(err) => {
            println!("  Checkout unavailable: {err}");
            return;
        }
    };
    println!("  Checkout opened at {}", authorization.authorization_url);

    let verification = service
        .verify_for_owner(
            &owner,
            VerifyPayment {
                reference: authorization.reference.clone(),
                order_id: order.id.clone(),
            },
        )
        .await;
    match verification {
        Ok(outcome) => println!(
            "  Verification: {} (order {})",
            outcome.label(),
            outcome.order().status.label()
        ),
        Err(err) => {
            println!("  Verification refused: {}", err.public_message(true));
            return;
        }
    }

    let body = serde_json::json!({
        "event": "charge.success",
        "data": {
            "reference": authorization.reference,
            "amount": settled,
            "metadata": { "orderId": order.id, "orderType": order.kind }
        }
    })
    .to_string();
    let redelivery = match signature::sign(DEMO_WEBHOOK_SECRET.as_bytes(), body.as_bytes()) {
        Ok(signed) => {
            service
                .handle_webhook(body.as_bytes(), Some(signed.as_str()))
                .await
        }
        Err(err) => {
            println!("  Webhook signing failed: {err}");
            return;
        }
    };
    match redelivery {
        Ok(WebhookOutcome::Processed(outcome)) => {
            println!("  Webhook redelivery: {}", outcome.label())
        }
        Ok(WebhookOutcome::Ignored { event }) => println!("  Webhook ignored: {event}"),
        Err(err) => println!("  Webhook refused: {}", err.public_message(true)),
    }

    let deliveries = notifier.deliveries();
    if deliveries.is_empty() {
        println!("  Notifications: none dispatched");
    } else {
        println!("  Notifications:");
        for delivery in deliveries {
            println!("    - {delivery}");
        }
    }
}

use azlens_core::azure::{Pricing, SecurityAlert, SecurityAssessment, Subscription};
use azlens_core::reports::key_vault::{KeyVaultReport, VaultAssessment, summarize_key_vaults};
use azlens_core::reports::security::{
    AlertEntry, AlertsReport, AssessmentEntry, AssessmentsReport, ComplianceEntry, DefenderReport,
    PlanEntry, ScoreEntry, SecureScoreReport, summarize_alerts, summarize_assessments,
    summarize_defender, summarize_secure_score,
};
use azlens_core::{Collector, EndpointFamily, Outcome};
use chrono::Utc;
use futures::future::join_all;
use serde::de::DeserializeOwned;
use serde_json::Value;

use super::{record_entities, record_rows};
use crate::client::Session;

const KEY_VAULT_QUERY: &str = "Resources
| where type =~ 'microsoft.keyvault/vaults'
| project id, name, resourceGroup, location, subscriptionId,
    vaultUri = tostring(properties.vaultUri),
    enableSoftDelete = properties.enableSoftDelete,
    enablePurgeProtection = properties.enablePurgeProtection,
    publicNetworkAccess = tostring(properties.publicNetworkAccess),
    softDeleteRetentionInDays = properties.softDeleteRetentionInDays";

/// Lists one endpoint family in every visible subscription.
///
/// The subscription listing is a prerequisite: if it fails, nothing else is
/// attempted. Each subscription afterwards succeeds or fails on its own.
async fn across_subscriptions<W, T>(
    session: &Session<'_>,
    family: EndpointFamily,
    convert: impl Fn(&Subscription, W) -> T,
) -> Collector<T>
where
    W: DeserializeOwned,
{
    let mut collector = Collector::new();
    let subscriptions = match session.subscriptions().await {
        Ok(subscriptions) => subscriptions,
        Err(err) => {
            tracing::warn!(family = %family, error = %err, "subscription listing failed");
            collector.fail(Some("subscription listing"), &err);
            return collector;
        }
    };

    let paths: Vec<String> = subscriptions
        .iter()
        .map(|subscription| family.subscription_path(&subscription.subscription_id))
        .collect();
    let pages = join_all(
        paths
            .iter()
            .map(|target| session.list_all::<Value>(family, target, &[])),
    )
    .await;

    for (subscription, result) in subscriptions.iter().zip(pages) {
        let scope = format!("subscription '{}'", subscription.label());
        record_entities(&mut collector, family, &scope, result, |wire: W| {
            convert(subscription, wire)
        });
    }
    tracing::debug!(
        family = %family,
        subscriptions = subscriptions.len(),
        entities = collector.items().len(),
        "fan-out finished"
    );
    collector
}

pub(crate) async fn alerts(session: &Session<'_>) -> Outcome<AlertsReport> {
    across_subscriptions(session, EndpointFamily::SecurityAlerts, |sub, alert: SecurityAlert| {
        AlertEntry::from_wire(sub, alert)
    })
    .await
    .finish(|alerts| summarize_alerts(alerts, Utc::now()))
}

pub(crate) async fn assessments(session: &Session<'_>) -> Outcome<AssessmentsReport> {
    across_subscriptions(
        session,
        EndpointFamily::SecurityAssessments,
        |sub, assessment: SecurityAssessment| AssessmentEntry::from_wire(sub, assessment),
    )
    .await
    .finish(summarize_assessments)
}

pub(crate) async fn defender_status(session: &Session<'_>) -> Outcome<DefenderReport> {
    across_subscriptions(session, EndpointFamily::SecurityPricings, |sub, pricing: Pricing| {
        PlanEntry::from_wire(sub, pricing)
    })
    .await
    .finish(summarize_defender)
}

pub(crate) async fn key_vaults(session: &Session<'_>) -> Outcome<KeyVaultReport> {
    let mut collector = Collector::new();
    let rows = session.resource_graph(KEY_VAULT_QUERY).await;
    record_rows(&mut collector, "key vault query", rows, VaultAssessment::from_row);
    collector.finish(summarize_key_vaults)
}

/// Secure scores and regulatory compliance standards of the configured
/// subscription. Either listing may fail without discarding the other.
pub(crate) async fn secure_score(session: &Session<'_>) -> Outcome<SecureScoreReport> {
    let subscription_id = session.subscription_id();
    let score_family = EndpointFamily::SecureScores;
    let compliance_family = EndpointFamily::RegulatoryCompliance;
    let score_path = score_family.subscription_path(subscription_id);
    let compliance_path = compliance_family.subscription_path(subscription_id);
    let (score_values, standard_values) = tokio::join!(
        session.list_all::<Value>(score_family, &score_path, &[]),
        session.list_all::<Value>(compliance_family, &compliance_path, &[]),
    );

    let mut scores = Collector::new();
    record_entities(&mut scores, score_family, "secure scores", score_values, ScoreEntry::from_wire);
    let mut standards = Collector::new();
    record_entities(
        &mut standards,
        compliance_family,
        "regulatory compliance",
        standard_values,
        ComplianceEntry::from_wire,
    );

    let scores = scores.finish(|items| items);
    let standards = standards.finish(|items| items);
    Outcome {
        errors: [scores.errors, standards.errors].concat(),
        succeeded: scores.succeeded + standards.succeeded,
        failed: scores.failed + standards.failed,
        report: summarize_secure_score(scores.report, standards.report),
    }
}

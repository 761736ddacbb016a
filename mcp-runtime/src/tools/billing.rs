//! Inventory, Cost Management and Consumption budgets.

use azlens_core::azure::{CostQueryProperties, CostQueryResponse};
use azlens_core::reports::billing::{
    BudgetEntry, BudgetReport, CostQuery, CostReport, summarize_budgets, summarize_costs,
};
use azlens_core::reports::inventory::{InventoryReport, ResourceEntry, summarize_inventory};
use azlens_core::{AzureError, Collector, EndpointFamily, Outcome};
use reqwest::Method;
use serde_json::Value;

use super::{record_entities, record_rows};
use crate::client::{MAX_LIST_PAGES, Session};

pub(crate) async fn all_resources(session: &Session<'_>, query: &str) -> Outcome<InventoryReport> {
    let mut collector = Collector::new();
    let rows = session.resource_graph(query).await;
    record_rows(&mut collector, "resource query", rows, ResourceEntry::from_row);
    collector.finish(|resources| summarize_inventory(query, resources))
}

async fn query_costs(
    session: &Session<'_>,
    query: &CostQuery,
) -> Result<Vec<CostQueryProperties>, AzureError> {
    let family = EndpointFamily::CostQuery;
    let body = query.body();
    let mut target = family.subscription_path(session.subscription_id());
    let mut pages = Vec::new();
    for _ in 0..MAX_LIST_PAGES {
        let page: CostQueryResponse = session
            .call(Method::POST, family, &target, &[], Some(&body))
            .await?
            .json()?;
        let next = page.properties.next_link.clone().filter(|link| !link.is_empty());
        pages.push(page.properties);
        match next {
            Some(link) => target = link,
            None => return Ok(pages),
        }
    }
    tracing::warn!(pages = MAX_LIST_PAGES, "cost query pagination limit reached; results truncated");
    Ok(pages)
}

pub(crate) async fn cost_analysis(session: &Session<'_>, query: &CostQuery) -> Outcome<CostReport> {
    let mut collector = Collector::new();
    collector.record(Some("cost query"), query_costs(session, query).await);
    collector.finish(|pages| summarize_costs(query, pages.into_iter().flatten().collect()))
}

pub(crate) async fn budgets(session: &Session<'_>) -> Outcome<BudgetReport> {
    let family = EndpointFamily::Budgets;
    let budgets = session
        .list_all::<Value>(family, &family.subscription_path(session.subscription_id()), &[])
        .await;
    let mut collector = Collector::new();
    record_entities(&mut collector, family, "budgets", budgets, BudgetEntry::from_wire);
    collector.finish(summarize_budgets)
}

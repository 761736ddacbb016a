//! Cost Management queries and Consumption budgets.

use std::collections::BTreeMap;

use chrono::{Datelike, NaiveDate};
use serde::Serialize;
use serde_json::{Value, json};

use super::round2;
use crate::azure::{Budget, CostQueryProperties};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Timeframe {
    MonthToDate,
    BillingMonthToDate,
    TheLastMonth,
    TheLastBillingMonth,
    WeekToDate,
    Custom,
}

impl Timeframe {
    pub const ALL: [Timeframe; 6] = [
        Timeframe::MonthToDate,
        Timeframe::BillingMonthToDate,
        Timeframe::TheLastMonth,
        Timeframe::TheLastBillingMonth,
        Timeframe::WeekToDate,
        Timeframe::Custom,
    ];

    pub const fn as_str(self) -> &'static str {
        match self {
            Timeframe::MonthToDate => "MonthToDate",
            Timeframe::BillingMonthToDate => "BillingMonthToDate",
            Timeframe::TheLastMonth => "TheLastMonth",
            Timeframe::TheLastBillingMonth => "TheLastBillingMonth",
            Timeframe::WeekToDate => "WeekToDate",
            Timeframe::Custom => "Custom",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|tf| tf.as_str().eq_ignore_ascii_case(value.trim()))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Granularity {
    Daily,
    Monthly,
    None,
}

impl Granularity {
    pub const fn as_str(self) -> &'static str {
        match self {
            Granularity::Daily => "Daily",
            Granularity::Monthly => "Monthly",
            Granularity::None => "None",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        [Granularity::Daily, Granularity::Monthly, Granularity::None]
            .into_iter()
            .find(|g| g.as_str().eq_ignore_ascii_case(value.trim()))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CostQuery {
    pub timeframe: Timeframe,
    pub granularity: Granularity,
    pub group_by: Option<String>,
    /// Only sent for [`Timeframe::Custom`].
    pub period: Option<(NaiveDate, NaiveDate)>,
}

impl CostQuery {
    /// Custom timeframes default to the first of the current month up to
    /// `today`.
    pub fn new(
        timeframe: Timeframe,
        granularity: Granularity,
        group_by: Option<String>,
        start: Option<NaiveDate>,
        end: Option<NaiveDate>,
        today: NaiveDate,
    ) -> Self {
        let period = (timeframe == Timeframe::Custom).then(|| {
            let first_of_month = today.with_day(1).unwrap_or(today);
            (start.unwrap_or(first_of_month), end.unwrap_or(today))
        });
        Self {
            timeframe,
            granularity,
            group_by: group_by.filter(|g| !g.trim().is_empty()),
            period,
        }
    }

    pub fn body(&self) -> Value {
        let mut dataset = json!({
            "granularity": self.granularity.as_str(),
            "aggregation": {
                "totalCost": { "name": "Cost", "function": "Sum" }
            }
        });
        if let Some(group_by) = &self.group_by {
            dataset["grouping"] = json!([{ "type": "Dimension", "name": group_by }]);
        }
        let mut body = json!({
            "type": "ActualCost",
            "timeframe": self.timeframe.as_str(),
            "dataset": dataset,
        });
        if let Some((from, to)) = self.period {
            body["timePeriod"] = json!({
                "from": format!("{}T00:00:00Z", from.format("%Y-%m-%d")),
                "to": format!("{}T23:59:59Z", to.format("%Y-%m-%d")),
            });
        }
        body
    }
}

const COST_COLUMNS: [&str; 4] = ["Cost", "PreTaxCost", "CostUSD", "totalCost"];

#[derive(Debug, Clone, Serialize)]
pub struct CostReport {
    pub timeframe: Timeframe,
    pub granularity: Granularity,
    pub group_by: Option<String>,
    pub time_period: Option<BTreeMap<String, String>>,
    pub currency: Option<String>,
    pub total_cost: f64,
    pub columns: Vec<String>,
    pub row_count: usize,
    pub rows: Vec<BTreeMap<String, Value>>,
}

pub fn summarize_costs(query: &CostQuery, pages: Vec<CostQueryProperties>) -> CostReport {
    let columns: Vec<String> = pages
        .iter()
        .find(|page| !page.columns.is_empty())
        .map(|page| page.columns.iter().map(|c| c.name.clone()).collect())
        .unwrap_or_default();
    let rows: Vec<BTreeMap<String, Value>> = pages
        .into_iter()
        .flat_map(|page| page.rows)
        .map(|cells| columns.iter().cloned().zip(cells).collect())
        .collect();

    let cost_column = COST_COLUMNS
        .iter()
        .find(|name| columns.iter().any(|c| c == *name))
        .copied();
    let total_cost = cost_column
        .map(|column| {
            rows.iter()
                .filter_map(|row| row.get(column).and_then(Value::as_f64))
                .sum()
        })
        .unwrap_or(0.0);
    let currency = rows
        .iter()
        .find_map(|row| row.get("Currency").and_then(Value::as_str))
        .map(str::to_string);

    CostReport {
        timeframe: query.timeframe,
        granularity: query.granularity,
        group_by: query.group_by.clone(),
        time_period: query.period.map(|(from, to)| {
            BTreeMap::from([
                ("from".to_string(), from.to_string()),
                ("to".to_string(), to.to_string()),
            ])
        }),
        currency,
        total_cost: round2(total_cost),
        columns,
        row_count: rows.len(),
        rows,
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BudgetEntry {
    pub id: String,
    pub name: String,
    pub category: String,
    pub time_grain: String,
    pub amount: f64,
    pub current_spend: f64,
    pub forecast_spend: Option<f64>,
    pub currency: String,
    pub utilization_percentage: f64,
    pub over_budget: bool,
}

impl BudgetEntry {
    pub fn from_wire(budget: Budget) -> Self {
        let props = budget.properties;
        let amount = props.amount.unwrap_or(0.0);
        let (current_spend, currency) = props
            .current_spend
            .map(|spend| (spend.amount.unwrap_or(0.0), spend.unit))
            .unwrap_or((0.0, String::new()));
        let utilization = if amount > 0.0 {
            current_spend * 100.0 / amount
        } else {
            0.0
        };
        Self {
            id: budget.id,
            name: budget.name,
            category: props.category,
            time_grain: props.time_grain,
            amount: round2(amount),
            current_spend: round2(current_spend),
            forecast_spend: props
                .forecast_spend
                .and_then(|spend| spend.amount)
                .map(round2),
            currency,
            utilization_percentage: round2(utilization),
            over_budget: amount > 0.0 && utilization >= 100.0,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct BudgetReport {
    pub total_budgets: usize,
    pub over_budget: usize,
    pub budgets: Vec<BudgetEntry>,
}

pub fn summarize_budgets(mut budgets: Vec<BudgetEntry>) -> BudgetReport {
    budgets.sort_by(|a, b| a.name.cmp(&b.name).then_with(|| a.id.cmp(&b.id)));
    BudgetReport {
        total_budgets: budgets.len(),
        over_budget: budgets.iter().filter(|b| b.over_budget).count(),
        budgets,
    }
}

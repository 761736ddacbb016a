//! MCP resources and prompt templates.

use serde_json::{Map, Value, json};

pub struct ResourceDefinition {
    pub uri: &'static str,
    pub name: &'static str,
    pub description: &'static str,
    /// Tool run with default arguments when the resource is read.
    pub tool: &'static str,
}

pub fn resource_definitions() -> Vec<ResourceDefinition> {
    vec![
        ResourceDefinition {
            uri: "azure-optimization://unused-resources",
            name: "Unused resources",
            description: "Stopped VMs, unattached disks, idle public IPs and orphaned NICs.",
            tool: "get_unused_resources",
        },
        ResourceDefinition {
            uri: "azure-optimization://utilization-summary",
            name: "Utilization summary",
            description: "Unused resources, Advisor, activity and VM metrics in one report.",
            tool: "get_resource_utilization_summary",
        },
        ResourceDefinition {
            uri: "azure-optimization://advisor-recommendations",
            name: "Advisor recommendations",
            description: "Azure Advisor recommendations ranked by impact.",
            tool: "get_azure_advisor_detailed",
        },
        ResourceDefinition {
            uri: "azure-performance://vm-metrics",
            name: "VM metrics",
            description: "CPU, network and disk metrics of running VMs.",
            tool: "get_vm_performance_metrics",
        },
        ResourceDefinition {
            uri: "azure-performance://storage-metrics",
            name: "Storage metrics",
            description: "Capacity, transaction and latency metrics of storage accounts.",
            tool: "get_storage_performance_metrics",
        },
        ResourceDefinition {
            uri: "azure-security://alerts",
            name: "Security alerts",
            description: "Defender for Cloud alerts across subscriptions.",
            tool: "get_security_center_alerts",
        },
        ResourceDefinition {
            uri: "azure-security://assessments",
            name: "Security assessments",
            description: "Defender for Cloud assessments and critical findings.",
            tool: "get_security_assessments",
        },
        ResourceDefinition {
            uri: "azure-security://defender-status",
            name: "Defender status",
            description: "Defender plan coverage per subscription.",
            tool: "get_defender_for_cloud_status",
        },
        ResourceDefinition {
            uri: "azure-security://keyvault-security",
            name: "Key Vault security",
            description: "Soft delete, purge protection and network exposure of vaults.",
            tool: "get_key_vault_security_status",
        },
        ResourceDefinition {
            uri: "azure-security://network-security",
            name: "Network security",
            description: "NSG rule risk, firewall posture and public IP exposure.",
            tool: "get_network_security_analysis",
        },
        ResourceDefinition {
            uri: "azure-security://secure-score",
            name: "Secure score",
            description: "Defender secure score and regulatory compliance standards.",
            tool: "get_secure_score_and_compliance",
        },
        ResourceDefinition {
            uri: "azure-alerts://overview",
            name: "Alerts overview",
            description: "Open Azure Monitor alerts, most severe first.",
            tool: "get_alerts_overview",
        },
        ResourceDefinition {
            uri: "azure-alerts://rules",
            name: "Alert rules",
            description: "Metric alert rules and the ones that notify nobody.",
            tool: "get_alert_rules",
        },
        ResourceDefinition {
            uri: "azure-performance://resource-health",
            name: "Resource health",
            description: "Resources whose availability state is not Available.",
            tool: "get_resource_health_status",
        },
        ResourceDefinition {
            uri: "azure-resources://all",
            name: "All resources",
            description: "Resource inventory of the configured subscription.",
            tool: "get_all_resources",
        },
        ResourceDefinition {
            uri: "azure-billing://budgets",
            name: "Budgets",
            description: "Consumption budgets and their utilization.",
            tool: "get_budgets",
        },
        ResourceDefinition {
            uri: "azure-billing://subscription",
            name: "Subscription",
            description: "State, offer and spending limit of the configured subscription.",
            tool: "get_subscription_details",
        },
    ]
}

pub fn find_resource(uri: &str) -> Option<ResourceDefinition> {
    resource_definitions().into_iter().find(|res| res.uri == uri)
}

pub struct PromptArgument {
    pub name: &'static str,
    pub description: &'static str,
}

pub struct PromptDefinition {
    pub name: &'static str,
    pub description: &'static str,
    pub arguments: Vec<PromptArgument>,
}

pub fn prompt_definitions() -> Vec<PromptDefinition> {
    vec![
        PromptDefinition {
            name: "utilization_summary",
            description: "Summarize resource utilization with concrete efficiency actions.",
            arguments: Vec::new(),
        },
        PromptDefinition {
            name: "unused_resources_cleanup",
            description: "Plan the cleanup of unused or idle resources.",
            arguments: Vec::new(),
        },
        PromptDefinition {
            name: "performance_analysis",
            description: "Look for bottlenecks and over-provisioned resources.",
            arguments: vec![PromptArgument {
                name: "resource_type",
                description: "vm, storage or database",
            }],
        },
        PromptDefinition {
            name: "advisor_insights",
            description: "Prioritize Azure Advisor recommendations.",
            arguments: vec![PromptArgument {
                name: "category",
                description: "Cost, Security, Performance, HighAvailability or OperationalExcellence",
            }],
        },
        PromptDefinition {
            name: "security_assessment",
            description: "Review the security posture of the environment.",
            arguments: vec![PromptArgument {
                name: "focus_area",
                description: "alerts, assessments, defender, keyvault or network",
            }],
        },
        PromptDefinition {
            name: "security_alerts_analysis",
            description: "Triage Defender for Cloud alerts.",
            arguments: Vec::new(),
        },
        PromptDefinition {
            name: "defender_coverage_analysis",
            description: "Find gaps in Defender for Cloud plan coverage.",
            arguments: Vec::new(),
        },
        PromptDefinition {
            name: "network_security_review",
            description: "Review NSG rules, firewalls and public IP exposure.",
            arguments: Vec::new(),
        },
        PromptDefinition {
            name: "keyvault_security_audit",
            description: "Audit Key Vault protection and network settings.",
            arguments: Vec::new(),
        },
        PromptDefinition {
            name: "security_compliance_review",
            description: "Review compliance posture against regulatory standards.",
            arguments: vec![PromptArgument {
                name: "standard",
                description: "Compliance standard such as ISO 27001, SOC 2 or PCI DSS",
            }],
        },
        PromptDefinition {
            name: "compliance_remediation",
            description: "Plan remediation of failing compliance controls.",
            arguments: vec![PromptArgument {
                name: "standard",
                description: "Compliance standard to focus on",
            }],
        },
        PromptDefinition {
            name: "alerts_analysis",
            description: "Analyze open Azure Monitor alerts and their remediation.",
            arguments: vec![PromptArgument {
                name: "severity",
                description: "Sev0 to Sev4",
            }],
        },
        PromptDefinition {
            name: "alert_optimization",
            description: "Improve alert rule coverage and reduce noise.",
            arguments: Vec::new(),
        },
        PromptDefinition {
            name: "performance_troubleshooting",
            description: "Troubleshoot performance with metrics and resource health.",
            arguments: vec![PromptArgument {
                name: "resource_type",
                description: "vm, storage or database",
            }],
        },
        PromptDefinition {
            name: "resource_optimization",
            description: "Rightsizing, consolidation and cleanup opportunities.",
            arguments: Vec::new(),
        },
        PromptDefinition {
            name: "cost_reduction",
            description: "Concrete ways to reduce Azure spend.",
            arguments: Vec::new(),
        },
        PromptDefinition {
            name: "budget_recommendations",
            description: "Suggest budget thresholds from current spending.",
            arguments: Vec::new(),
        },
        PromptDefinition {
            name: "analyze_costs",
            description: "Explain spending patterns and cost anomalies.",
            arguments: vec![
                PromptArgument {
                    name: "timeframe",
                    description: "MonthToDate, TheLastMonth, WeekToDate, ...",
                },
                PromptArgument {
                    name: "group_by",
                    description: "Cost dimension such as ResourceGroup or ServiceName",
                },
            ],
        },
    ]
}

fn prompt_arg<'a>(args: &'a Map<String, Value>, key: &str) -> Option<&'a str> {
    args.get(key)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|value| !value.is_empty())
}

/// Renders a prompt template. `None` for unknown prompt names.
pub fn render_prompt(name: &str, args: &Map<String, Value>) -> Option<String> {
    let text = match name {
        "utilization_summary" => "Use get_resource_utilization_summary to summarize how my Azure \
            resources are used. Point out idle capacity, cost opportunities and the concrete steps \
            that would improve efficiency."
            .to_string(),
        "unused_resources_cleanup" => "Use get_unused_resources to find resources that could be \
            deleted: stopped VMs, unattached disks, unassociated public IPs and orphaned network \
            interfaces. For each one say whether it is safe to remove and what to check first, \
            such as snapshots or retention requirements."
            .to_string(),
        "performance_analysis" => match prompt_arg(args, "resource_type") {
            Some(kind) => format!(
                "Analyze the performance of my Azure {kind} resources with the matching \
                 performance metrics tool. Flag bottlenecks and resources that are over-provisioned."
            ),
            None => "Analyze the performance of my VMs, storage accounts and databases with the \
                performance metrics tools. Flag bottlenecks and resources that are over-provisioned."
                .to_string(),
        },
        "advisor_insights" => match prompt_arg(args, "category") {
            Some(category) => format!(
                "Use get_azure_advisor_detailed with category '{category}' and turn the \
                 recommendations into a prioritized action list."
            ),
            None => "Use get_azure_advisor_detailed and group the recommendations by impact. \
                Produce a prioritized action list."
                .to_string(),
        },
        "security_assessment" => match prompt_arg(args, "focus_area") {
            Some(area) => format!(
                "Assess the security of my Azure environment with a focus on {area}. List the \
                 findings by severity together with remediation steps."
            ),
            None => "Assess the security of my Azure environment: alerts, assessments, Defender \
                coverage, Key Vault configuration and network security. List the findings by \
                severity together with remediation steps."
                .to_string(),
        },
        "security_alerts_analysis" => "Use get_security_center_alerts to triage my security \
            alerts. Start with High and Critical alerts and recent ones, and give remediation \
            guidance per alert type."
            .to_string(),
        "defender_coverage_analysis" => "Use get_defender_for_cloud_status to review Defender for \
            Cloud coverage across my subscriptions. Identify services without protection, say which \
            plans matter most for the workloads I run and what enabling them involves."
            .to_string(),
        "network_security_review" => "Use get_network_security_analysis to review my network \
            security groups, Azure Firewalls and public IP addresses. Point out overly permissive \
            rules and exposed management ports, and give specific fixes."
            .to_string(),
        "keyvault_security_audit" => "Use get_key_vault_security_status to audit my Key Vaults. \
            Check soft delete, purge protection, retention and network access, and list the changes \
            per vault starting with the lowest score."
            .to_string(),
        "security_compliance_review" => match prompt_arg(args, "standard") {
            Some(standard) => format!(
                "Use get_secure_score_and_compliance and get_security_assessments to review my \
                 security posture against '{standard}'. Identify the failing controls and give a \
                 roadmap for reaching and keeping '{standard}' compliance."
            ),
            None => "Use get_secure_score_and_compliance and get_security_assessments to review my \
                compliance across all applicable standards. Identify failing controls and give \
                prioritized recommendations."
                .to_string(),
        },
        "compliance_remediation" => match prompt_arg(args, "standard") {
            Some(standard) => format!(
                "Use get_secure_score_and_compliance and get_security_assessments to find the gaps \
                 in my {standard} compliance. Produce a remediation plan with prioritized actions."
            ),
            None => "Use get_secure_score_and_compliance and get_security_assessments to build a \
                remediation plan that improves my secure score and compliance ratings."
                .to_string(),
        },
        "alerts_analysis" => match prompt_arg(args, "severity") {
            Some(severity) => format!(
                "Use get_alerts_overview and look at the {severity} alerts. Explain the likely root \
                 causes and give step-by-step remediation and prevention guidance."
            ),
            None => "Use get_alerts_overview to analyze my open alerts. Group them by severity and \
                type, identify patterns and give remediation guidance for the most severe ones."
                .to_string(),
        },
        "alert_optimization" => "Use get_alert_rules and get_alerts_overview to review my alerting. \
            Find noisy rules, rules that notify nobody and gaps in monitoring coverage, and suggest \
            improvements."
            .to_string(),
        "performance_troubleshooting" => match prompt_arg(args, "resource_type") {
            Some(kind) => format!(
                "Troubleshoot performance problems in my Azure {kind} resources using the matching \
                 performance metrics tool and get_resource_health_status. Identify bottlenecks and \
                 give specific remediation steps."
            ),
            None => "Troubleshoot performance across my Azure environment using the performance \
                metrics tools, get_resource_health_status and get_alerts_overview. Identify \
                bottlenecks and give specific remediation steps."
                .to_string(),
        },
        "resource_optimization" => "Use get_unused_resources, get_azure_advisor_detailed and the \
            performance metrics tools to find resources that are unused, oversized or could be \
            consolidated. Recommend concrete rightsizing and cleanup actions."
            .to_string(),
        "cost_reduction" => "Use get_cost_analysis, get_unused_resources and \
            get_azure_advisor_detailed to suggest specific ways to reduce my Azure costs, including \
            underutilized resources and reservation or savings plan opportunities."
            .to_string(),
        "budget_recommendations" => "Use get_cost_analysis and get_budgets to compare my spending \
            with my budgets. Suggest realistic budget thresholds and alerts for the main cost areas."
            .to_string(),
        "analyze_costs" => {
            let mut text = "Use get_cost_analysis to analyze my Azure costs".to_string();
            if let Some(timeframe) = prompt_arg(args, "timeframe") {
                text.push_str(&format!(" for the timeframe '{timeframe}'"));
            }
            if let Some(group_by) = prompt_arg(args, "group_by") {
                text.push_str(&format!(", grouped by '{group_by}'"));
            }
            text.push_str(". Explain the spending pattern, point out anomalies and suggest savings.");
            text
        }
        _ => return None,
    };
    Some(text)
}

pub fn prompt_messages(name: &str, args: &Map<String, Value>) -> Option<Value> {
    let definition = prompt_definitions().into_iter().find(|p| p.name == name)?;
    let text = render_prompt(name, args)?;
    Some(json!({
        "description": definition.description,
        "messages": [{
            "role": "user",
            "content": { "type": "text", "text": text }
        }]
    }))
}

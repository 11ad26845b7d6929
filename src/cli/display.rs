//! Display formatting for CLI output
//!
//! SBIO pattern: Pure functions that format data for display

use super::commands::SimulationReport;
use crate::cloud::CloudCall;
use crate::config::DesiredState;

// ============================================================================
// Table formatting helpers
// ============================================================================

/// Format a table with upper-cased headers and space-padded columns
pub fn format_table(headers: &[&str], rows: Vec<Vec<String>>) -> String {
    if rows.is_empty() {
        return "Nothing to show.\n".to_string();
    }

    let mut widths: Vec<usize> = headers.iter().map(|h| h.len()).collect();
    for row in &rows {
        for (width, cell) in widths.iter_mut().zip(row) {
            *width = (*width).max(cell.len());
        }
    }

    let render = |cells: Vec<String>| -> String {
        let line = cells
            .iter()
            .enumerate()
            .map(|(i, cell)| match widths.get(i) {
                Some(width) => format!("{:width$}", cell, width = *width),
                None => cell.clone(),
            })
            .collect::<Vec<_>>()
            .join("   ");
        format!("{}\n", line.trim_end())
    };

    let mut output = render(headers.iter().map(|h| h.to_uppercase()).collect());
    for row in rows {
        output.push_str(&render(row));
    }
    output
}

// ============================================================================
// Desired state display
// ============================================================================

/// Summarize a validated deployment
pub fn format_desired_state(desired: &DesiredState) -> String {
    let lb = &desired.load_balancer;
    let tg = &desired.target_group;
    let hc = &tg.health_check;

    let mut rows = vec![
        vec!["load balancer".to_string(), lb.name.clone()],
        vec!["vpc".to_string(), lb.vpc_id.clone()],
        vec!["security group".to_string(), lb.security_group_name.clone()],
        vec!["cluster".to_string(), lb.cluster_name.clone()],
    ];
    if lb.http_port > 0 {
        rows.push(vec!["http listener".to_string(), lb.http_port.to_string()]);
    }
    if lb.https_port > 0 {
        rows.push(vec![
            "https listener".to_string(),
            format!(
                "{} ({})",
                lb.https_port,
                lb.certificate_arn.as_deref().unwrap_or("no certificate")
            ),
        ]);
    }
    rows.push(vec!["target group".to_string(), tg.name.clone()]);
    rows.push(vec![
        "health check".to_string(),
        format!(
            "{} every {}s, timeout {}s, status {}, healthy {}, unhealthy {}",
            hc.path,
            hc.interval_secs,
            hc.timeout_secs,
            if hc.status_codes.is_empty() {
                "-"
            } else {
                hc.status_codes.as_str()
            },
            hc.healthy_threshold,
            hc.unhealthy_threshold
        ),
    ]);
    rows.push(vec![
        "container".to_string(),
        format!(
            "{}:{}",
            desired.container.container_name, desired.container.container_port
        ),
    ]);

    format_table(&["setting", "value"], rows)
}

// ============================================================================
// Simulation display
// ============================================================================

/// Format the mutating calls of a run
pub fn format_calls(calls: &[CloudCall]) -> String {
    if calls.is_empty() {
        return "No changes.\n".to_string();
    }
    let rows = calls
        .iter()
        .enumerate()
        .map(|(i, call)| {
            vec![
                (i + 1).to_string(),
                call.operation().to_string(),
                call.resource().to_string(),
                call.detail(),
            ]
        })
        .collect();
    format_table(&["#", "operation", "resource", "detail"], rows)
}

pub fn format_simulation(result: &SimulationReport) -> String {
    let binding = &result.report.binding;
    let mut output = format_calls(&result.calls);
    output.push('\n');
    output.push_str(&format!(
        "Bound {}:{} to {}\n",
        binding.container_name, binding.container_port, binding.target_group_arn
    ));
    output.push_str(&format!("Health check: {}\n", result.report.health_check));
    output
}

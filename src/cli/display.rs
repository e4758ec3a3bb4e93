//! Display formatting for CLI output
//!
//! SBIO: Pure display logic (no I/O - returns formatted strings)

use crate::cluster::JoinCredentials;
use crate::deploy::DeploymentReport;

/// Format a table with headers and rows
pub fn format_table(headers: &[&str], rows: Vec<Vec<String>>) -> String {
    if rows.is_empty() {
        return "No services deployed.\n".to_string();
    }

    let mut widths: Vec<usize> = headers.iter().map(|h| h.len()).collect();
    for row in &rows {
        for (i, cell) in row.iter().enumerate() {
            if i < widths.len() {
                widths[i] = widths[i].max(cell.len());
            }
        }
    }

    let mut output = String::new();
    let mut push_row = |cells: Vec<String>| {
        let line: Vec<String> = cells
            .iter()
            .enumerate()
            .map(|(i, cell)| match widths.get(i) {
                Some(w) => format!("{:width$}", cell, width = *w),
                None => cell.clone(),
            })
            .collect();
        output.push_str(line.join("   ").trim_end());
        output.push('\n');
    };

    push_row(headers.iter().map(|h| h.to_uppercase()).collect());
    for row in rows {
        push_row(row);
    }

    output
}

/// Details a worker node needs to join this master
pub fn format_join_credentials(join: &JoinCredentials) -> String {
    format!(
        "Master node setup complete. Use the following details for worker nodes:\n\
         Master URL: {}\n\
         Node Token: {}\n",
        join.url, join.token
    )
}

/// Where every service can be reached after a run
pub fn format_report(report: &DeploymentReport) -> String {
    let mut output = String::new();

    if let Some(join) = &report.join {
        output.push_str(&format_join_credentials(join));
        output.push('\n');
    }

    let rows = report
        .endpoints
        .iter()
        .map(|e| vec![e.service.clone(), e.scope.to_string(), e.url.clone()])
        .collect();
    output.push_str(&format_table(&["service", "scope", "url"], rows));
    output
}

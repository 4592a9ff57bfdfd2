use crate::api::ManagerStats;

/// Renders a stats snapshot in Prometheus text exposition format.
///
/// The caller owns serving this over whatever surface it likes; the core
/// only produces the text.
pub fn render_stats(stats: &ManagerStats, namespace: &str) -> String {
    let ns = if namespace.is_empty() {
        "tenq"
    } else {
        namespace
    };

    let mut out = String::new();
    out.push_str(&format!(
        "# HELP {ns}_tenants Currently provisioned tenants\n# TYPE {ns}_tenants gauge\n{ns}_tenants {}\n",
        stats.tenants
    ));
    out.push_str(&format!(
        "# HELP {ns}_submitted_total Total tasks accepted\n# TYPE {ns}_submitted_total counter\n{ns}_submitted_total {}\n",
        stats.submitted
    ));
    out.push_str(&format!(
        "# HELP {ns}_processed_total Total tasks handed to consumers\n# TYPE {ns}_processed_total counter\n{ns}_processed_total {}\n",
        stats.processed
    ));
    out.push_str(&format!(
        "# HELP {ns}_rejected_unknown_tenant_total Submissions rejected for unknown tenants\n# TYPE {ns}_rejected_unknown_tenant_total counter\n{ns}_rejected_unknown_tenant_total {}\n",
        stats.rejected_unknown_tenant
    ));
    out.push_str(&format!(
        "# HELP {ns}_backlog_len_estimate Approximate tasks waiting in tenant backlogs\n# TYPE {ns}_backlog_len_estimate gauge\n{ns}_backlog_len_estimate {}\n",
        stats.backlog_len_estimate
    ));

    out
}

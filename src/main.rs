//! Posture command line entry point
//!
//! Usage: `posture <state.json> [report-only|interactive|automatic] [baseline]`
//!
//! Audits the tenant and sites described by a JSON state file and prints the
//! compliance report as JSON. Interactive mode has no prompt here and declines
//! every action that needs confirmation.
//!
//! Exit codes: 0 fully compliant, 1 non-compliant or unreachable scopes,
//! 2 remediation rolled back, 3 fatal error.

use std::path::Path;
use std::sync::Arc;

use posture::remediation::DenyAll;
use posture::utils::init_tracing;
use posture::{
    ComplianceReport, Engine, EngineConfig, InMemorySource, RemediationMode, RunRequest,
    BUILTIN_BASELINE,
};

const EXIT_COMPLIANT: i32 = 0;
const EXIT_NON_COMPLIANT: i32 = 1;
const EXIT_REMEDIATION_FAILED: i32 = 2;
const EXIT_FATAL: i32 = 3;

#[tokio::main]
async fn main() {
    let code = match run().await {
        Ok(code) => code,
        Err(e) => {
            eprintln!("[posture] FATAL ERROR: {:#}", e);
            EXIT_FATAL
        }
    };
    std::process::exit(code);
}

async fn run() -> anyhow::Result<i32> {
    let args: Vec<String> = std::env::args().skip(1).collect();
    let Some(state_path) = args.first() else {
        eprintln!("usage: posture <state.json> [report-only|interactive|automatic] [baseline]");
        return Ok(EXIT_FATAL);
    };

    let mode = match args.get(1) {
        Some(raw) => RemediationMode::from_str(raw)
            .ok_or_else(|| anyhow::anyhow!("unknown remediation mode '{}'", raw))?,
        None => RemediationMode::ReportOnly,
    };
    let baseline = args.get(2).map(String::as_str).unwrap_or(BUILTIN_BASELINE);

    let config = EngineConfig::from_env()?;
    init_tracing(&config.log)?;

    let source = Arc::new(InMemorySource::from_state_file(Path::new(state_path))?);
    let scopes = source.scopes();

    let mut request = RunRequest::new(baseline, mode)
        .with_concurrency(config.concurrency_limit)
        .with_sites(scopes.iter().filter(|s| !s.is_tenant()).map(|s| s.id.clone()));
    if let Some(tenant) = scopes.iter().find(|s| s.is_tenant()) {
        request = request.with_tenant(tenant.id.clone());
    }
    if let Some(deadline) = config.deadline {
        request = request.with_deadline(deadline);
    }

    let engine = Engine::from_config(&config, source)?.with_confirm(Arc::new(DenyAll));
    let report = engine.run(&request).await?;

    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(exit_code(&report))
}

fn exit_code(report: &ComplianceReport) -> i32 {
    if report.has_failed_remediation() {
        EXIT_REMEDIATION_FAILED
    } else if report.is_fully_compliant() {
        EXIT_COMPLIANT
    } else {
        EXIT_NON_COMPLIANT
    }
}

//! Turns non-compliant findings into ordered remediation actions

use crate::models::{
    Baseline, ComplianceFinding, RemediationAction, RemediationMode, RemediationTransaction,
    RiskLevel, Scope,
};

pub struct RemediationPlanner<'a> {
    baseline: &'a Baseline,
    include_low_risk: bool,
}

impl<'a> RemediationPlanner<'a> {
    pub fn new(baseline: &'a Baseline) -> Self {
        Self {
            baseline,
            include_low_risk: false,
        }
    }

    /// Let automatic mode also fix Low-risk findings
    pub fn include_low_risk(mut self, include: bool) -> Self {
        self.include_low_risk = include;
        self
    }

    fn wants(&self, finding: &ComplianceFinding, mode: RemediationMode) -> bool {
        match mode {
            RemediationMode::ReportOnly => false,
            RemediationMode::Interactive => true,
            RemediationMode::Automatic => {
                finding.risk_level >= RiskLevel::Medium
                    || (self.include_low_risk && finding.risk_level == RiskLevel::Low)
            }
        }
    }

    /// Actions ordered tenant first, then by scope id, then by baseline declaration order.
    ///
    /// Findings for settings the baseline marks as manual-only, or that the
    /// baseline does not declare, are never planned.
    pub fn plan(&self, findings: &[ComplianceFinding], mode: RemediationMode) -> Vec<RemediationAction> {
        let mut planned: Vec<(usize, RemediationAction)> = findings
            .iter()
            .filter(|f| !f.compliant && self.wants(f, mode))
            .filter_map(|f| {
                let position = self.baseline.position(f.scope.kind, &f.setting_key)?;
                let entry = self.baseline.entry(f.scope.kind, &f.setting_key)?;
                if !entry.remediable {
                    return None;
                }

                Some((
                    position,
                    RemediationAction {
                        scope: f.scope.clone(),
                        setting_key: f.setting_key.clone(),
                        target_value: entry.expected.clone(),
                        previous_value: f.current_value.clone(),
                        risk_level: f.risk_level,
                        requires_confirmation: mode == RemediationMode::Interactive,
                        depends_on: entry.depends_on.clone(),
                        applied: false,
                    },
                ))
            })
            .collect();

        planned.sort_by(|(pa, a), (pb, b)| {
            a.scope
                .kind
                .cmp(&b.scope.kind)
                .then_with(|| a.scope.id.cmp(&b.scope.id))
                .then(pa.cmp(pb))
        });

        planned.into_iter().map(|(_, action)| action).collect()
    }

    /// Plan and group into one transaction per scope, keeping action order
    pub fn plan_transactions(
        &self,
        findings: &[ComplianceFinding],
        mode: RemediationMode,
    ) -> Vec<RemediationTransaction> {
        group_by_scope(self.plan(findings, mode))
    }
}

/// Split an ordered action list into per-scope transactions
pub fn group_by_scope(actions: Vec<RemediationAction>) -> Vec<RemediationTransaction> {
    let mut groups: Vec<(Scope, Vec<RemediationAction>)> = Vec::new();
    for action in actions {
        match groups.iter_mut().find(|(scope, _)| *scope == action.scope) {
            Some((_, group)) => group.push(action),
            None => groups.push((action.scope.clone(), vec![action])),
        }
    }

    groups
        .into_iter()
        .filter_map(|(scope, actions)| RemediationTransaction::new(scope, actions))
        .collect()
}

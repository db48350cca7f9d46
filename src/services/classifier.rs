//! 结果分类 - 业务能力层
//!
//! 纯函数：把导航、面板、流水线三个阶段的结果映射成唯一的 `ExtractionOutcome`。
//! 相同输入永远得到相同输出。

use tracing::error;

use crate::models::{Classification, ExtractionOutcome, FieldProvenance, Identifier};
use crate::services::navigation::NavOutcome;
use crate::services::panel_locator::{LocatorError, PanelHandle};
use crate::services::pipeline::PipelineReport;

/// 一次尝试走到哪一步、每一步得到了什么
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PhaseReport {
    pub navigation: Option<NavOutcome>,
    pub panel: Option<Result<PanelHandle, LocatorError>>,
    pub pipeline: Option<PipelineReport>,
    /// 阶段之外的说明（例如浏览器错误）
    pub note: Option<String>,
}

pub fn classify(requested: &Identifier, report: &PhaseReport) -> Classification {
    let outcome_only = |outcome: ExtractionOutcome, available: bool, diagnostic: String| Classification {
        outcome,
        display_name: None,
        about: None,
        avatar_path: None,
        available,
        provenance: FieldProvenance::default(),
        diagnostic: Some(diagnostic),
    };
    let with_note = |text: &str| match &report.note {
        Some(note) => format!("{}: {}", text, note),
        None => text.to_string(),
    };

    match report.navigation {
        Some(NavOutcome::InvalidIdentifier) => {
            return outcome_only(ExtractionOutcome::NotRegistered, false, "号码未在服务上注册".to_string())
        }
        Some(NavOutcome::Loaded) => {}
        Some(NavOutcome::Timeout) => {
            return outcome_only(ExtractionOutcome::TransientError, false, with_note("导航重试次数用尽仍超时"))
        }
        Some(NavOutcome::StillAuthenticating) => {
            return outcome_only(ExtractionOutcome::TransientError, false, with_note("登录尚未完成"))
        }
        None => return outcome_only(ExtractionOutcome::TransientError, false, with_note("导航未完成")),
    }

    let handle = match &report.panel {
        None => return outcome_only(ExtractionOutcome::TransientError, false, with_note("面板阶段未完成")),
        Some(Err(LocatorError::OpenFailed)) => {
            return outcome_only(ExtractionOutcome::NavigationTimeout, false, "所有策略都未能打开详情面板".to_string())
        }
        Some(Err(LocatorError::VerificationMismatch { observed, .. })) => {
            return mismatch(requested, observed.as_deref(), &outcome_only);
        }
        Some(Ok(handle)) => handle,
    };
    if handle.identifier() != requested {
        return mismatch(requested, Some(handle.identifier().as_str()), &outcome_only);
    }

    let Some(pipeline) = &report.pipeline else {
        return outcome_only(ExtractionOutcome::TransientError, true, with_note("提取阶段未完成"));
    };
    if let Some(observed) = &pipeline.mismatch {
        return mismatch(requested, observed.as_deref(), &outcome_only);
    }
    if let Some(fault) = &pipeline.fault {
        return outcome_only(ExtractionOutcome::TransientError, true, format!("提取中浏览器失去响应: {}", fault));
    }

    let outcome = match pipeline.fields.count() {
        3 => ExtractionOutcome::Success,
        1 | 2 => ExtractionOutcome::PartialSuccess,
        _ if pipeline.visibility_restricted => {
            return outcome_only(ExtractionOutcome::Blocked, true, "对方限制了资料可见性".to_string())
        }
        _ => {
            return outcome_only(ExtractionOutcome::ExtractionExhausted, true, "所有层级都没有读到资料".to_string())
        }
    };

    let missing: Vec<&str> = [
        ("名称", pipeline.fields.name.is_none()),
        ("签名", pipeline.fields.about.is_none()),
        ("头像", pipeline.fields.avatar.is_none()),
    ]
    .into_iter()
    .filter_map(|(label, missing)| missing.then_some(label))
    .collect();

    Classification {
        outcome,
        display_name: pipeline.fields.name.clone(),
        about: pipeline.fields.about.clone(),
        avatar_path: pipeline.fields.avatar.clone(),
        available: true,
        provenance: pipeline.provenance,
        diagnostic: (!missing.is_empty()).then(|| format!("缺少: {}", missing.join("、"))),
    }
}

fn mismatch(
    requested: &Identifier,
    observed: Option<&str>,
    outcome_only: &dyn Fn(ExtractionOutcome, bool, String) -> Classification,
) -> Classification {
    error!("❌ 号码核验不符: 请求 {}，面板显示 {:?}，丢弃全部字段", requested, observed);
    outcome_only(
        ExtractionOutcome::VerificationMismatch,
        false,
        format!("面板号码与请求不符 (面板显示: {})", observed.unwrap_or("无法读取")),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logger::capture::CapturedLogs;
    use crate::models::Tier;
    use crate::services::panel_locator::OpenStrategy;
    use crate::services::tiers::ProfileFields;
    use std::path::PathBuf;

    fn id() -> Identifier {
        Identifier::from_digits("917415337302")
    }

    fn verified() -> Option<Result<PanelHandle, LocatorError>> {
        Some(Ok(PanelHandle::verified(id(), OpenStrategy::NamedHeader)))
    }

    fn pipeline(name: Option<&str>, about: Option<&str>, avatar: Option<&str>) -> PipelineReport {
        let tier = |v: Option<&str>| v.map(|_| Tier::StructuredElement);
        PipelineReport {
            fields: ProfileFields {
                name: name.map(str::to_string),
                about: about.map(str::to_string),
                avatar: avatar.map(PathBuf::from),
            },
            provenance: FieldProvenance {
                name: tier(name),
                about: tier(about),
                avatar: tier(avatar),
            },
            ..PipelineReport::default()
        }
    }

    fn loaded(panel: Option<Result<PanelHandle, LocatorError>>, pipeline: Option<PipelineReport>) -> PhaseReport {
        PhaseReport {
            navigation: Some(NavOutcome::Loaded),
            panel,
            pipeline,
            note: None,
        }
    }

    #[test]
    fn invalid_identifier_is_not_registered_with_empty_fields() {
        let report = PhaseReport {
            navigation: Some(NavOutcome::InvalidIdentifier),
            ..PhaseReport::default()
        };
        let c = classify(&id(), &report);
        assert_eq!(c.outcome, ExtractionOutcome::NotRegistered);
        assert!(!c.available);
        assert!(c.display_name.is_none() && c.about.is_none() && c.avatar_path.is_none());
    }

    #[test]
    fn mismatch_is_surfaced_with_no_fields() {
        let (logs, _guard) = CapturedLogs::errors_only();
        let report = loaded(
            Some(Err(LocatorError::VerificationMismatch {
                requested: id(),
                observed: Some("+44 7700 900123".to_string()),
            })),
            Some(pipeline(Some("Other"), Some("x"), None)),
        );
        let c = classify(&id(), &report);
        assert_eq!(c.outcome, ExtractionOutcome::VerificationMismatch);
        assert!(c.display_name.is_none());
        assert!(c.provenance.is_empty());
        let logged = logs.contents();
        assert!(logged.contains("ERROR"));
        assert!(logged.contains("号码核验不符"));
        assert!(logged.contains("+44 7700 900123"));
    }

    #[test]
    fn mismatch_found_during_extraction_discards_fields() {
        let mut p = pipeline(Some("Other"), None, None);
        p.mismatch = Some(Some("+44 7700 900123".to_string()));
        let c = classify(&id(), &loaded(verified(), Some(p)));
        assert_eq!(c.outcome, ExtractionOutcome::VerificationMismatch);
        assert!(c.display_name.is_none());
        assert!(!c.available);
    }

    #[test]
    fn handle_for_another_identifier_is_a_mismatch() {
        let other = PanelHandle::verified(Identifier::from_digits("447700900123"), OpenStrategy::NamedHeader);
        let report = loaded(Some(Ok(other)), Some(pipeline(Some("Other"), None, None)));
        assert_eq!(classify(&id(), &report).outcome, ExtractionOutcome::VerificationMismatch);
    }

    #[test]
    fn field_count_decides_success_partial_exhausted() {
        let all = loaded(verified(), Some(pipeline(Some("P"), Some("A"), Some("a.jpg"))));
        let c = classify(&id(), &all);
        assert_eq!(c.outcome, ExtractionOutcome::Success);
        assert_eq!(c.display_name.as_deref(), Some("P"));
        assert!(c.diagnostic.is_none());

        let some = loaded(verified(), Some(pipeline(Some("P"), None, None)));
        let c = classify(&id(), &some);
        assert_eq!(c.outcome, ExtractionOutcome::PartialSuccess);
        assert_eq!(c.diagnostic.as_deref(), Some("缺少: 签名、头像"));

        let none = loaded(verified(), Some(pipeline(None, None, None)));
        let c = classify(&id(), &none);
        assert_eq!(c.outcome, ExtractionOutcome::ExtractionExhausted);
        assert!(c.available);
    }

    #[test]
    fn restricted_visibility_with_nothing_found_is_blocked() {
        let mut p = pipeline(None, None, None);
        p.visibility_restricted = true;
        assert_eq!(classify(&id(), &loaded(verified(), Some(p))).outcome, ExtractionOutcome::Blocked);
    }

    #[test]
    fn navigation_and_panel_failures() {
        let timeout = PhaseReport {
            navigation: Some(NavOutcome::Timeout),
            ..PhaseReport::default()
        };
        assert_eq!(classify(&id(), &timeout).outcome, ExtractionOutcome::TransientError);

        let open_failed = loaded(Some(Err(LocatorError::OpenFailed)), None);
        assert_eq!(classify(&id(), &open_failed).outcome, ExtractionOutcome::NavigationTimeout);

        let mut faulted = pipeline(Some("P"), None, None);
        faulted.fault = Some("浏览器无响应".to_string());
        assert_eq!(
            classify(&id(), &loaded(verified(), Some(faulted))).outcome,
            ExtractionOutcome::TransientError
        );
    }

    #[test]
    fn classification_is_deterministic() {
        let report = loaded(verified(), Some(pipeline(Some("P"), None, Some("a.jpg"))));
        assert_eq!(classify(&id(), &report), classify(&id(), &report));
    }
}

use std::borrow::Cow;

use serde::{Deserialize, Serialize};

use crate::types::ProfileViewBasic;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ModerationCauseKind {
    Blocking,
    BlockedBy,
    BlockOther,
    Label,
    Muted,
    MuteWord,
    Hidden,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum CauseSource {
    User,
    List { uri: String },
    Labeler { did: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModerationCause {
    #[serde(rename = "type")]
    pub kind: ModerationCauseKind,
    pub source: CauseSource,
    pub priority: u8,
}

impl ModerationCause {
    pub fn new(kind: ModerationCauseKind, source: CauseSource, priority: u8) -> Self {
        Self { kind, source, priority }
    }

    fn is_blocked_by(&self) -> bool {
        self.kind == ModerationCauseKind::BlockedBy
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ModerationUi {
    pub filters: Vec<ModerationCause>,
    pub blurs: Vec<ModerationCause>,
    pub alerts: Vec<ModerationCause>,
    pub informs: Vec<ModerationCause>,
    pub no_override: bool,
}

impl ModerationUi {
    pub fn filter(&self) -> bool {
        !self.filters.is_empty()
    }

    pub fn blur(&self) -> bool {
        !self.blurs.is_empty()
    }

    fn causes(&self) -> impl Iterator<Item = &ModerationCause> {
        self.blurs
            .iter()
            .chain(&self.alerts)
            .chain(&self.informs)
            .chain(&self.filters)
    }

    pub fn for_author(author: &ProfileViewBasic) -> Self {
        let mut ui = ModerationUi::default();
        let Some(viewer) = author.viewer.as_ref() else {
            return ui;
        };
        let mut hide = |cause: ModerationCause, no_override: bool| {
            ui.filters.push(cause.clone());
            ui.blurs.push(cause);
            ui.no_override |= no_override;
        };
        if viewer.blocking.is_some() {
            hide(ModerationCause::new(ModerationCauseKind::Blocking, CauseSource::User, 3), true);
        } else if let Some(list) = viewer.blocking_by_list.as_ref() {
            let uri = list_uri(list);
            hide(ModerationCause::new(ModerationCauseKind::Blocking, CauseSource::List { uri }, 3), true);
        }
        if viewer.blocked_by {
            hide(ModerationCause::new(ModerationCauseKind::BlockedBy, CauseSource::User, 4), true);
        }
        if viewer.muted {
            let source = match viewer.muted_by_list.as_ref() {
                Some(list) => CauseSource::List { uri: list_uri(list) },
                None => CauseSource::User,
            };
            hide(ModerationCause::new(ModerationCauseKind::Muted, source, 6), false);
        }
        ui
    }
}

fn list_uri(list: &serde_json::Value) -> String {
    list.get("uri")
        .and_then(serde_json::Value::as_str)
        .unwrap_or_default()
        .to_string()
}

/// Drops `blocked-by` causes so content from actors who block the viewer is
/// shown. Returns the input itself when it carries no such cause.
pub fn filter_blocked_by_causes(ui: &ModerationUi) -> Cow<'_, ModerationUi> {
    if !ui.causes().any(ModerationCause::is_blocked_by) {
        return Cow::Borrowed(ui);
    }
    let keep = |causes: &[ModerationCause]| -> Vec<ModerationCause> {
        causes.iter().filter(|c| !c.is_blocked_by()).cloned().collect()
    };
    let blurs = keep(&ui.blurs);
    Cow::Owned(ModerationUi {
        filters: keep(&ui.filters),
        alerts: keep(&ui.alerts),
        informs: keep(&ui.informs),
        no_override: !blurs.is_empty() && ui.no_override,
        blurs,
    })
}

pub fn is_blocked_or_blocking(profile: &ProfileViewBasic) -> bool {
    profile
        .viewer
        .as_ref()
        .is_some_and(|v| v.blocked_by || v.blocking.is_some())
}

pub fn is_blocking_user(profile: &ProfileViewBasic) -> bool {
    profile
        .viewer
        .as_ref()
        .is_some_and(|v| v.blocking.is_some() || v.blocking_by_list.is_some())
}

pub fn is_blocked_by_user(profile: &ProfileViewBasic) -> bool {
    profile.viewer.as_ref().is_some_and(|v| v.blocked_by)
}

pub fn is_muted(profile: &ProfileViewBasic) -> bool {
    profile
        .viewer
        .as_ref()
        .is_some_and(|v| v.muted || v.muted_by_list.is_some())
}

//! The heartbeat schedule document and its parser.
//!
//! The document is plain text: `key: value` lines grouped into blocks
//! separated by blank lines.  A block carrying both `id` and `cron` is a
//! schedule definition; any other block contributes scheduler config.
//! `#`-prefixed lines are comments.
//!
//! ```text
//! enabled: true
//! max_per_day: 6
//! quiet_start: 22:30
//!
//! id: morning-checkin
//! cron: 0 0 9 * * *
//! channel: telegram:DM
//! prompt: Good morning! Anything on your plate today?
//! ```
//!
//! Malformed blocks are skipped with a warning; the rest of the document
//! still loads.

use std::path::Path;
use std::str::FromStr;

use tracing::warn;

use switchboard_core::ChannelSpec;

/// One parsed schedule definition.  Immutable once loaded; the document is
/// re-read only when the user's heartbeat is (re)started.
#[derive(Debug, Clone)]
pub struct Schedule {
    /// Unique within the user's document.
    pub id: String,
    /// Five- or six-field cron expression, validated at parse time.
    pub cron: String,
    pub channel: ChannelSpec,
    /// Passed verbatim to the reasoning engine on firing.
    pub prompt: String,
}

/// Everything a heartbeat document can carry: optional config overrides
/// plus the schedule definitions.
#[derive(Debug, Clone, Default)]
pub struct HeartbeatDoc {
    pub enabled: Option<bool>,
    pub max_per_day: Option<u32>,
    pub quiet_start: Option<String>,
    pub quiet_end: Option<String>,
    pub schedules: Vec<Schedule>,
}

/// Parse a heartbeat document from disk.  A missing file yields the empty
/// document — a user without schedules simply has no heartbeat.
pub fn parse_heartbeat_doc(path: &Path) -> HeartbeatDoc {
    match std::fs::read_to_string(path) {
        Ok(raw) => parse_heartbeat_text(&raw),
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => HeartbeatDoc::default(),
        Err(err) => {
            warn!(path = %path.display(), error = %err, "heartbeat document unreadable");
            HeartbeatDoc::default()
        }
    }
}

pub fn parse_heartbeat_text(raw: &str) -> HeartbeatDoc {
    let mut doc = HeartbeatDoc::default();

    for block in raw.split("\n\n") {
        let pairs: Vec<(&str, &str)> = block
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty() && !line.starts_with('#'))
            .filter_map(|line| {
                let (key, value) = line.split_once(':')?;
                Some((key.trim(), value.trim()))
            })
            .collect();
        if pairs.is_empty() {
            continue;
        }

        let get = |key: &str| {
            pairs
                .iter()
                .find(|(k, _)| *k == key)
                .map(|(_, v)| v.to_string())
        };

        if get("id").is_some() || get("cron").is_some() {
            match parse_schedule_block(&get) {
                Ok(schedule) => doc.schedules.push(schedule),
                Err(reason) => {
                    warn!(%reason, "skipping malformed schedule block");
                }
            }
            continue;
        }

        // Config block.  Unknown keys are ignored so the format can grow.
        if let Some(value) = get("enabled") {
            doc.enabled = value.parse().ok();
        }
        if let Some(value) = get("max_per_day") {
            doc.max_per_day = value.parse().ok();
        }
        doc.quiet_start = get("quiet_start").or(doc.quiet_start);
        doc.quiet_end = get("quiet_end").or(doc.quiet_end);
    }

    doc
}

fn parse_schedule_block(get: &dyn Fn(&str) -> Option<String>) -> Result<Schedule, String> {
    let id = get("id").ok_or("missing id")?;
    let cron_expr = get("cron").ok_or_else(|| format!("schedule `{id}`: missing cron"))?;
    let channel_raw = get("channel").ok_or_else(|| format!("schedule `{id}`: missing channel"))?;
    let prompt = get("prompt").ok_or_else(|| format!("schedule `{id}`: missing prompt"))?;

    // The cron crate wants six or seven fields; accept the common five-field
    // form by prepending a seconds column.
    let normalized = normalize_cron(&cron_expr);
    cron::Schedule::from_str(&normalized)
        .map_err(|err| format!("schedule `{id}`: bad cron `{cron_expr}`: {err}"))?;

    let channel = ChannelSpec::parse(&channel_raw)
        .ok_or_else(|| format!("schedule `{id}`: bad channel spec `{channel_raw}`"))?;

    Ok(Schedule {
        id,
        cron: normalized,
        channel,
        prompt,
    })
}

/// Prepend a `0` seconds field to five-field expressions so standard
/// crontab syntax works as-is.
pub(crate) fn normalize_cron(expr: &str) -> String {
    let fields = expr.split_whitespace().count();
    if fields == 5 {
        format!("0 {expr}")
    } else {
        expr.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_config_and_schedules() {
        let doc = parse_heartbeat_text(
            "enabled: true\nmax_per_day: 6\nquiet_start: 23:00\nquiet_end: 07:00\n\
             \n\
             id: morning\ncron: 0 9 * * *\nchannel: telegram:DM\nprompt: Good morning!\n\
             \n\
             id: standup\ncron: 0 0 10 * * Mon-Fri\nchannel: slack:C042\nprompt: Standup nudge\n",
        );
        assert_eq!(doc.enabled, Some(true));
        assert_eq!(doc.max_per_day, Some(6));
        assert_eq!(doc.quiet_start.as_deref(), Some("23:00"));
        assert_eq!(doc.schedules.len(), 2);
        assert_eq!(doc.schedules[0].id, "morning");
        assert!(doc.schedules[0].channel.is_dm());
        assert_eq!(doc.schedules[1].channel.target, "C042");
    }

    #[test]
    fn five_field_cron_is_accepted() {
        let doc = parse_heartbeat_text(
            "id: daily\ncron: 30 8 * * *\nchannel: telegram:DM\nprompt: hi\n",
        );
        assert_eq!(doc.schedules.len(), 1);
        assert_eq!(doc.schedules[0].cron, "0 30 8 * * *");
    }

    #[test]
    fn malformed_block_does_not_sink_siblings() {
        let doc = parse_heartbeat_text(
            "id: broken\ncron: not a cron\nchannel: telegram:DM\nprompt: x\n\
             \n\
             id: fine\ncron: 0 12 * * *\nchannel: telegram:DM\nprompt: lunch?\n",
        );
        assert_eq!(doc.schedules.len(), 1);
        assert_eq!(doc.schedules[0].id, "fine");
    }

    #[test]
    fn schedule_missing_prompt_is_skipped() {
        let doc = parse_heartbeat_text("id: nope\ncron: 0 12 * * *\nchannel: telegram:DM\n");
        assert!(doc.schedules.is_empty());
    }

    #[test]
    fn bad_channel_spec_is_skipped() {
        let doc = parse_heartbeat_text("id: nope\ncron: 0 12 * * *\nchannel: telegram\nprompt: x\n");
        assert!(doc.schedules.is_empty());
    }

    #[test]
    fn comments_and_blank_lines_are_ignored() {
        let doc = parse_heartbeat_text(
            "# scheduler config\nenabled: true\n\n# the one schedule\nid: a\ncron: 0 9 * * *\nchannel: x:DM\nprompt: hello\n",
        );
        assert_eq!(doc.enabled, Some(true));
        assert_eq!(doc.schedules.len(), 1);
    }

    #[test]
    fn prompt_may_contain_colons() {
        let doc = parse_heartbeat_text(
            "id: a\ncron: 0 9 * * *\nchannel: x:DM\nprompt: remember: drink water\n",
        );
        assert_eq!(doc.schedules[0].prompt, "remember: drink water");
    }

    #[test]
    fn missing_file_yields_empty_doc() {
        let dir = tempfile::TempDir::new().unwrap();
        let doc = parse_heartbeat_doc(&dir.path().join("absent.txt"));
        assert!(doc.schedules.is_empty());
        assert!(doc.enabled.is_none());
    }
}

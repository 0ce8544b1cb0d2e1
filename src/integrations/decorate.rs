//! Text decoration shared by the chat platforms
//!
//! Formatted updates are plain text split into `TODAY`, `TOMORROW` and
//! `BLOCKER` sections. The team lead is only pinged when the blocker section
//! says something other than "none".

use chrono::NaiveDate;

/// Section headings recognised in formatted output, in display order
pub const SECTION_MARKERS: [&str; 3] = ["TODAY", "TOMORROW", "BLOCKER"];

/// Blocker contents that mean "nothing to report"
const EMPTY_BLOCKER_WORDS: &[&str] = &["none", "n/a", "na", "nil", "nothing", "no blockers"];

/// Someone to mention: a platform user id, a display name, or both
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Person {
    pub id: Option<String>,
    pub name: Option<String>,
}

impl Person {
    /// Build from optional config values; `None` when both are blank
    pub fn from_parts(id: Option<&str>, name: Option<&str>) -> Option<Self> {
        let id = id.map(str::trim).filter(|s| !s.is_empty()).map(String::from);
        let name = name.map(str::trim).filter(|s| !s.is_empty()).map(String::from);
        if id.is_none() && name.is_none() {
            None
        } else {
            Some(Self { id, name })
        }
    }

    /// Slack mention syntax, falling back to a plain `@name`
    pub fn slack_mention(&self) -> Option<String> {
        match (&self.id, &self.name) {
            (Some(id), _) => Some(format!("<@{}>", id)),
            (None, Some(name)) => Some(format!("@{}", name)),
            (None, None) => None,
        }
    }

    /// Display name used for Teams `<at>` tags
    pub fn display_name(&self) -> Option<&str> {
        self.name.as_deref().or(self.id.as_deref())
    }
}

/// People referenced when decorating an update
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Mentions {
    pub user: Option<Person>,
    pub lead: Option<Person>,
}

/// One heading plus the text under it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Section {
    /// Marker that opened the section; `None` for text before the first heading
    pub marker: Option<&'static str>,
    /// The heading line as written
    pub heading: Option<String>,
    pub body: String,
}

/// Human-readable date used in message headers, e.g. "Friday, March 15"
pub fn display_date(date: NaiveDate) -> String {
    date.format("%A, %B %-d").to_string()
}

/// Recognise a heading line and return its marker plus any inline content
///
/// "*BLOCKERS:* none" yields `("BLOCKER", "none")`. A heading without a colon
/// has no inline content.
fn heading_marker(line: &str) -> Option<(&'static str, &str)> {
    let stripped = line.trim_start_matches(|c: char| c.is_whitespace() || "*_#>`".contains(c));
    let marker = SECTION_MARKERS
        .iter()
        .copied()
        .find(|marker| stripped.starts_with(marker))?;

    let rest = &stripped[marker.len()..];
    // "TODAYS" or "BLOCKERS" still count; "TODAYISH" does not
    let next = rest.chars().next();
    if matches!(next, Some(c) if c.is_ascii_alphanumeric() && c != 'S') {
        return None;
    }

    let inline = match rest.split_once(':') {
        Some((_, after)) => {
            after.trim_start_matches(|c: char| c.is_whitespace() || "*_".contains(c))
        }
        None => "",
    };
    Some((marker, inline))
}

/// Split formatted text on its section headings
pub fn split_sections(text: &str) -> Vec<Section> {
    let mut sections = Vec::new();
    let mut current = Section {
        marker: None,
        heading: None,
        body: String::new(),
    };

    for line in text.lines() {
        if let Some((marker, inline)) = heading_marker(line) {
            if current.heading.is_some() || !current.body.trim().is_empty() {
                sections.push(current);
            }
            let heading = match line.find(':') {
                Some(idx) if !inline.is_empty() => line[..=idx].trim().to_string(),
                _ => line.trim().to_string(),
            };
            current = Section {
                marker: Some(marker),
                heading: Some(heading),
                body: inline.trim().to_string(),
            };
            continue;
        }
        if !current.body.is_empty() {
            current.body.push('\n');
        }
        current.body.push_str(line);
    }

    if current.heading.is_some() || !current.body.trim().is_empty() {
        sections.push(current);
    }
    sections
}

/// Text between the `BLOCKER` heading and the next heading, if there is one
pub fn blocker_section(text: &str) -> Option<String> {
    split_sections(text)
        .into_iter()
        .find(|s| s.marker == Some("BLOCKER"))
        .map(|s| s.body)
}

fn is_meaningful(line: &str) -> bool {
    let cleaned = line
        .trim()
        .trim_start_matches(|c: char| c.is_whitespace() || "-*•·_`>".contains(c))
        .trim_end_matches(|c: char| c.is_whitespace() || "*_`.!".contains(c))
        .trim();
    if cleaned.is_empty() {
        return false;
    }
    let lower = cleaned.to_lowercase();
    !EMPTY_BLOCKER_WORDS.contains(&lower.as_str())
}

/// Whether the update reports an actual blocker
pub fn has_real_blockers(text: &str) -> bool {
    blocker_section(text)
        .map(|body| body.lines().any(is_meaningful))
        .unwrap_or(false)
}

/// Prefix the Slack text with the user mention and date; ping the lead on blockers
pub fn decorate_slack(text: &str, mentions: &Mentions, date: NaiveDate) -> String {
    let mut out = String::new();
    if let Some(mention) = mentions.user.as_ref().and_then(Person::slack_mention) {
        out.push_str(&mention);
        out.push(' ');
    }
    out.push_str(&format!("*{}*\n\n", display_date(date)));
    out.push_str(text.trim_end());

    if has_real_blockers(text) {
        if let Some(lead) = mentions.lead.as_ref().and_then(Person::slack_mention) {
            out.push_str(&format!("\n\ncc {} for the blockers above", lead));
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    const WITH_NONE: &str =
        "*TODAY:*\n- Fixed login bug\n*TOMORROW:*\n- Write tests\n*BLOCKERS:*\n- None";
    const WITH_BLOCKER: &str =
        "*TODAY:*\n- Fixed login bug\n*TOMORROW:*\n- Write tests\n*BLOCKERS:*\n- Waiting on API keys from infra";

    fn mentions() -> Mentions {
        Mentions {
            user: Person::from_parts(Some("U123"), Some("Dana")),
            lead: Person::from_parts(Some("ULEAD"), Some("Sam")),
        }
    }

    fn date() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 3, 15).unwrap()
    }

    #[test]
    fn test_none_blocker_is_not_real() {
        assert!(!has_real_blockers(WITH_NONE));
        assert!(!has_real_blockers("BLOCKERS: N/A"));
        assert!(!has_real_blockers("BLOCKER:\n\n  -  \n"));
        assert!(!has_real_blockers("TODAY: coding"));
    }

    #[test]
    fn test_real_blocker_detected() {
        assert!(has_real_blockers(WITH_BLOCKER));
        assert!(has_real_blockers("BLOCKERS: staging is down"));
    }

    #[test]
    fn test_blocker_slice_stops_at_next_heading() {
        let text = "BLOCKERS:\n- none\nTODAY:\n- real work here";
        assert!(!has_real_blockers(text));
        assert_eq!(blocker_section(text).unwrap().trim(), "- none");
    }

    #[test]
    fn test_slack_decoration_without_blockers() {
        let out = decorate_slack(WITH_NONE, &mentions(), date());
        assert!(out.starts_with("<@U123> *Friday, March 15*\n\n"));
        assert!(!out.contains("ULEAD"));
    }

    #[test]
    fn test_slack_decoration_mentions_lead_once() {
        let out = decorate_slack(WITH_BLOCKER, &mentions(), date());
        assert_eq!(out.matches("<@ULEAD>").count(), 1);
        assert!(out.ends_with("cc <@ULEAD> for the blockers above"));
    }

    #[test]
    fn test_person_mention_fallbacks() {
        assert!(Person::from_parts(Some(" "), None).is_none());
        let by_name = Person::from_parts(None, Some("Sam")).unwrap();
        assert_eq!(by_name.slack_mention().as_deref(), Some("@Sam"));
        assert_eq!(by_name.display_name(), Some("Sam"));
    }

    #[test]
    fn test_split_sections() {
        let sections =
            split_sections("Intro line\nTODAY: shipped it\nTOMORROW:\n- more\n- even more");
        assert_eq!(sections.len(), 3);
        assert_eq!(sections[0].marker, None);
        assert_eq!(sections[0].body, "Intro line");
        assert_eq!(sections[1].marker, Some("TODAY"));
        assert_eq!(sections[1].heading.as_deref(), Some("TODAY:"));
        assert_eq!(sections[1].body, "shipped it");
        assert_eq!(sections[2].marker, Some("TOMORROW"));
        assert_eq!(sections[2].body, "- more\n- even more");
    }

    #[test]
    fn test_heading_requires_word_boundary() {
        assert!(heading_marker("TODAYISH stuff").is_none());
        assert!(heading_marker("*TODAY'S PLAN:*").is_some());
        assert_eq!(heading_marker("BLOCKERS: none"), Some(("BLOCKER", "none")));
    }
}

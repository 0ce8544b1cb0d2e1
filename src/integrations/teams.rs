//! Microsoft Teams delivery via incoming webhook
//!
//! The formatted text is split on its section headings into Adaptive Card text
//! blocks. Mentions use `<at>` tags backed by `msteams.entities`.

use super::decorate::{display_date, has_real_blockers, split_sections, Mentions, Person};
use super::ChatPublisher;
use crate::config::PlatformConfig;
use crate::RelayError;
use async_trait::async_trait;
use chrono::NaiveDate;
use reqwest::Client;
use serde_json::{json, Value};
use std::time::Duration;
use thiserror::Error;
use tracing::info;

const ADAPTIVE_CARD_CONTENT_TYPE: &str = "application/vnd.microsoft.card.adaptive";
const ADAPTIVE_CARD_SCHEMA: &str = "http://adaptivecards.io/schemas/adaptive-card.json";
const ADAPTIVE_CARD_VERSION: &str = "1.4";

const REQUEST_TIMEOUT: Duration = Duration::from_secs(15);

#[derive(Error, Debug)]
pub enum TeamsError {
    #[error("Teams webhook returned HTTP {status}: {body}")]
    Webhook { status: u16, body: String },
    #[error("Teams configuration error: {0}")]
    Config(String),
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),
}

impl From<TeamsError> for RelayError {
    fn from(err: TeamsError) -> Self {
        RelayError::Integration(err.to_string())
    }
}

/// `<at>` tag plus its entity, or plain text when the person has no id
fn mention(person: &Person, entities: &mut Vec<Value>) -> Option<String> {
    let name = person.display_name()?;
    match person.id.as_deref() {
        Some(id) => {
            let tag = format!("<at>{}</at>", name);
            entities.push(json!({
                "type": "mention",
                "text": tag,
                "mentioned": { "id": id, "name": name }
            }));
            Some(tag)
        }
        None => Some(name.to_string()),
    }
}

fn text_block(text: &str) -> Value {
    json!({ "type": "TextBlock", "text": text, "wrap": true })
}

/// Build the webhook payload for one update
pub fn build_adaptive_card(text: &str, mentions: &Mentions, date: NaiveDate) -> Value {
    let mut body = Vec::new();
    let mut entities = Vec::new();

    let who = mentions
        .user
        .as_ref()
        .and_then(|user| mention(user, &mut entities));
    let title = match who {
        Some(who) => format!("{} - {}", who, display_date(date)),
        None => display_date(date),
    };
    body.push(json!({
        "type": "TextBlock",
        "text": title,
        "weight": "Bolder",
        "size": "Medium",
        "wrap": true
    }));

    for section in split_sections(text) {
        if let Some(heading) = section.heading.as_deref() {
            body.push(json!({
                "type": "TextBlock",
                "text": heading.trim_matches(|c: char| c == '*' || c == '_' || c.is_whitespace()),
                "weight": "Bolder",
                "spacing": "Medium",
                "wrap": true
            }));
        }
        let content = section.body.trim();
        if !content.is_empty() {
            body.push(text_block(content));
        }
    }

    if has_real_blockers(text) {
        if let Some(lead) = mentions
            .lead
            .as_ref()
            .and_then(|lead| mention(lead, &mut entities))
        {
            body.push(text_block(&format!("cc {} for the blockers above", lead)));
        }
    }

    json!({
        "type": "message",
        "attachments": [{
            "contentType": ADAPTIVE_CARD_CONTENT_TYPE,
            "contentUrl": null,
            "content": {
                "$schema": ADAPTIVE_CARD_SCHEMA,
                "type": "AdaptiveCard",
                "version": ADAPTIVE_CARD_VERSION,
                "body": body,
                "msteams": {
                    "width": "Full",
                    "entities": entities
                }
            }
        }]
    })
}

/// Teams webhook client
pub struct TeamsClient {
    http: Client,
}

impl TeamsClient {
    pub fn new() -> crate::Result<Self> {
        let http = Client::builder().timeout(REQUEST_TIMEOUT).build()?;
        Ok(Self { http })
    }

    pub fn with_client(http: Client) -> Self {
        Self { http }
    }

    pub async fn post_card(&self, url: &str, card: &Value) -> Result<(), TeamsError> {
        let response = self.http.post(url).json(card).send().await?;

        let status = response.status();
        if status.is_success() {
            return Ok(());
        }
        let body = response.text().await.unwrap_or_default();
        Err(TeamsError::Webhook {
            status: status.as_u16(),
            body,
        })
    }
}

#[async_trait]
impl ChatPublisher for TeamsClient {
    async fn publish(
        &self,
        config: &PlatformConfig,
        text: &str,
        date: NaiveDate,
    ) -> crate::Result<()> {
        let url = config
            .teams_webhook()
            .map_err(|e| TeamsError::Config(e.to_string()))?;
        let card = build_adaptive_card(text, &config.mentions(), date);
        self.post_card(&url, &card).await?;
        info!(date = %date, "Teams update posted");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const WITH_BLOCKER: &str =
        "*TODAY:*\n- Shipped search\n*TOMORROW:*\n- Pagination\n*BLOCKERS:*\n- Staging is down";
    const NO_BLOCKER: &str = "*TODAY:*\n- Shipped search\n*BLOCKERS:* none";

    fn date() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 3, 15).unwrap()
    }

    fn mentions() -> Mentions {
        Mentions {
            user: Person::from_parts(Some("29:user"), Some("Dana")),
            lead: Person::from_parts(Some("29:lead"), Some("Sam")),
        }
    }

    fn card_content(card: &Value) -> &Value {
        &card["attachments"][0]["content"]
    }

    fn texts(card: &Value) -> Vec<String> {
        card_content(card)["body"]
            .as_array()
            .unwrap()
            .iter()
            .map(|b| b["text"].as_str().unwrap().to_string())
            .collect()
    }

    #[test]
    fn test_card_envelope() {
        let card = build_adaptive_card(NO_BLOCKER, &Mentions::default(), date());
        assert_eq!(card["type"], "message");
        assert_eq!(card["attachments"][0]["contentType"], ADAPTIVE_CARD_CONTENT_TYPE);
        assert_eq!(card_content(&card)["version"], "1.4");
        assert_eq!(texts(&card)[0], "Friday, March 15");
    }

    #[test]
    fn test_sections_become_blocks() {
        let card = build_adaptive_card(WITH_BLOCKER, &Mentions::default(), date());
        let texts = texts(&card);
        assert!(texts.contains(&"TODAY:".to_string()));
        assert!(texts.contains(&"- Shipped search".to_string()));
        assert!(texts.contains(&"BLOCKERS:".to_string()));
    }

    #[test]
    fn test_lead_mentioned_only_for_real_blockers() {
        let card = build_adaptive_card(WITH_BLOCKER, &mentions(), date());
        let entities = card_content(&card)["msteams"]["entities"].as_array().unwrap();
        assert_eq!(entities.len(), 2);
        assert_eq!(entities[1]["mentioned"]["id"], "29:lead");
        assert!(texts(&card).last().unwrap().contains("<at>Sam</at>"));

        let card = build_adaptive_card(NO_BLOCKER, &mentions(), date());
        let entities = card_content(&card)["msteams"]["entities"].as_array().unwrap();
        assert_eq!(entities.len(), 1);
        assert!(texts(&card)[0].starts_with("<at>Dana</at>"));
    }

    #[test]
    fn test_name_only_person_has_no_entity() {
        let mentions = Mentions {
            user: Person::from_parts(None, Some("Dana")),
            lead: None,
        };
        let card = build_adaptive_card(NO_BLOCKER, &mentions, date());
        assert!(card_content(&card)["msteams"]["entities"]
            .as_array()
            .unwrap()
            .is_empty());
        assert!(texts(&card)[0].starts_with("Dana - "));
    }
}

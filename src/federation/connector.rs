//! Remote display-name connector
//!
//! Asks another grid's user authority for the display names of users
//! homed there. Requests are form-encoded `AgentIDs[]` lists; replies are
//! a flat XML document of `uuidN`/`nameN` pairs.

use async_trait::async_trait;
use quick_xml::events::Event;
use quick_xml::reader::Reader;
use std::collections::HashMap;
use std::sync::Arc;
use uuid::Uuid;

use crate::error::AppError;

/// Path appended to an authority URL
pub const DISPLAY_NAMES_PATH: &str = "get_display_names";

/// Anything that can answer "what are these users called"
#[async_trait]
pub trait DisplayNameSource: Send + Sync {
    /// Fetch names for `user_ids` from the authority at `authority`
    ///
    /// The result may hold fewer entries than were asked for.
    async fn get_display_names(
        &self,
        authority: &str,
        user_ids: &[Uuid],
    ) -> Result<HashMap<Uuid, String>, AppError>;
}

/// HTTP display-name connector
#[derive(Clone)]
pub struct DisplayNameConnector {
    http_client: Arc<reqwest::Client>,
}

impl DisplayNameConnector {
    pub fn new(http_client: Arc<reqwest::Client>) -> Self {
        Self { http_client }
    }
}

/// Build the form body `AgentIDs[]=<uuid>&AgentIDs[]=<uuid>...`
pub fn encode_request(user_ids: &[Uuid]) -> String {
    let key = urlencoding::encode("AgentIDs[]");
    user_ids
        .iter()
        .map(|id| format!("{}={}", key, id))
        .collect::<Vec<_>>()
        .join("&")
}

#[async_trait]
impl DisplayNameSource for DisplayNameConnector {
    async fn get_display_names(
        &self,
        authority: &str,
        user_ids: &[Uuid],
    ) -> Result<HashMap<Uuid, String>, AppError> {
        if user_ids.is_empty() {
            return Ok(HashMap::new());
        }

        let endpoint = format!("{}{}", authority, DISPLAY_NAMES_PATH);

        let response = self
            .http_client
            .post(&endpoint)
            .header("Content-Type", "application/x-www-form-urlencoded")
            .body(encode_request(user_ids))
            .send()
            .await
            .map_err(|e| {
                AppError::Federation(format!("Failed to reach {}: {}", endpoint, e))
            })?;

        if !response.status().is_success() {
            return Err(AppError::Federation(format!(
                "Authority {} rejected display-name request: HTTP {}",
                endpoint,
                response.status()
            )));
        }

        let body = response.text().await?;
        let names = parse_reply(&body)?;

        tracing::debug!(
            authority,
            requested = user_ids.len(),
            returned = names.len(),
            "Fetched remote display names"
        );

        Ok(names)
    }
}

/// Read a display-name reply into a UUID to name map
///
/// A reply without `success=true` yields an empty map. Pairs are read
/// from index 0 upward and stop at the first index missing either half.
/// Pairs whose UUID does not parse are skipped.
pub fn parse_reply(xml: &str) -> Result<HashMap<Uuid, String>, AppError> {
    let fields = read_reply_fields(xml)?;

    if fields.get("success").map(|s| s.trim()) != Some("true") {
        tracing::debug!("Display-name reply did not report success");
        return Ok(HashMap::new());
    }

    let mut names = HashMap::new();
    for index in 0.. {
        let (Some(raw_id), Some(name)) = (
            fields.get(&format!("uuid{}", index)),
            fields.get(&format!("name{}", index)),
        ) else {
            break;
        };

        match Uuid::parse_str(raw_id.trim()) {
            Ok(id) => {
                names.insert(id, name.clone());
            }
            Err(_) => tracing::debug!(raw_id = %raw_id, "Skipping reply entry with bad UUID"),
        }
    }

    Ok(names)
}

/// Collect the text of each child of the document root by element name
fn read_reply_fields(xml: &str) -> Result<HashMap<String, String>, AppError> {
    let malformed = |e: &dyn std::fmt::Display| {
        AppError::Federation(format!("Malformed display-name reply: {}", e))
    };

    let mut reader = Reader::from_str(xml);
    reader.trim_text(true);

    let mut fields = HashMap::new();
    let mut depth = 0usize;
    let mut current: Option<String> = None;

    loop {
        match reader.read_event().map_err(|e| malformed(&e))? {
            Event::Start(element) => {
                depth += 1;
                if depth == 2 {
                    let name = String::from_utf8_lossy(element.name().as_ref()).into_owned();
                    fields.entry(name.clone()).or_insert_with(String::new);
                    current = Some(name);
                }
            }
            Event::Empty(element) if depth == 1 => {
                let name = String::from_utf8_lossy(element.name().as_ref()).into_owned();
                fields.entry(name).or_insert_with(String::new);
            }
            Event::Text(text) if depth == 2 => {
                if let Some(name) = &current {
                    let value = text.unescape().map_err(|e| malformed(&e))?;
                    if let Some(slot) = fields.get_mut(name) {
                        slot.push_str(&value);
                    }
                }
            }
            Event::CData(data) if depth == 2 => {
                if let Some(name) = &current {
                    let value = String::from_utf8_lossy(&data.into_inner()).into_owned();
                    if let Some(slot) = fields.get_mut(name) {
                        slot.push_str(&value);
                    }
                }
            }
            Event::End(_) => {
                if depth == 2 {
                    current = None;
                }
                depth = depth.saturating_sub(1);
            }
            Event::Eof => break,
            _ => {}
        }
    }

    Ok(fields)
}

#[cfg(test)]
mod tests {
    use super::*;

    const ADA: &str = "11111111-1111-1111-1111-111111111111";
    const GRACE: &str = "22222222-2222-2222-2222-222222222222";

    #[test]
    fn request_body_repeats_agent_ids() {
        let ids = [Uuid::parse_str(ADA).unwrap(), Uuid::parse_str(GRACE).unwrap()];
        assert_eq!(
            encode_request(&ids),
            format!("AgentIDs%5B%5D={}&AgentIDs%5B%5D={}", ADA, GRACE)
        );
    }

    #[test]
    fn parses_successful_reply() {
        let xml = format!(
            r#"<?xml version="1.0"?>
            <ServerResponse>
              <uuid0>{ADA}</uuid0><name0>Ada Lovelace</name0>
              <uuid1>{GRACE}</uuid1><name1>Grace &amp; Co</name1>
              <success>true</success>
            </ServerResponse>"#
        );

        let names = parse_reply(&xml).unwrap();
        assert_eq!(names.len(), 2);
        assert_eq!(names[&Uuid::parse_str(ADA).unwrap()], "Ada Lovelace");
        assert_eq!(names[&Uuid::parse_str(GRACE).unwrap()], "Grace & Co");
    }

    #[test]
    fn unsuccessful_reply_is_empty() {
        let xml = format!(
            "<ServerResponse><uuid0>{ADA}</uuid0><name0>Ada</name0><success>false</success></ServerResponse>"
        );
        assert!(parse_reply(&xml).unwrap().is_empty());

        let xml = format!("<ServerResponse><uuid0>{ADA}</uuid0><name0>Ada</name0></ServerResponse>");
        assert!(parse_reply(&xml).unwrap().is_empty());
    }

    #[test]
    fn pairs_stop_at_first_gap() {
        let xml = format!(
            "<ServerResponse><success>true</success>\
             <uuid0>{ADA}</uuid0><name0>Ada</name0>\
             <uuid2>{GRACE}</uuid2><name2>Grace</name2></ServerResponse>"
        );

        let names = parse_reply(&xml).unwrap();
        assert_eq!(names.len(), 1);
        assert!(names.contains_key(&Uuid::parse_str(ADA).unwrap()));
    }

    #[test]
    fn bad_uuid_is_skipped_but_later_pairs_are_read() {
        let xml = format!(
            "<ServerResponse><success>true</success>\
             <uuid0>not-a-uuid</uuid0><name0>Nobody</name0>\
             <uuid1>{GRACE}</uuid1><name1>Grace</name1></ServerResponse>"
        );

        let names = parse_reply(&xml).unwrap();
        assert_eq!(names.len(), 1);
        assert_eq!(names[&Uuid::parse_str(GRACE).unwrap()], "Grace");
    }

    #[test]
    fn empty_name_element_counts_as_present() {
        let xml = format!(
            "<ServerResponse><success>true</success><uuid0>{ADA}</uuid0><name0/></ServerResponse>"
        );

        let names = parse_reply(&xml).unwrap();
        assert_eq!(names[&Uuid::parse_str(ADA).unwrap()], "");
    }

    #[test]
    fn malformed_xml_is_an_error() {
        let result = parse_reply("<ServerResponse><success>true</wrong></ServerResponse>");
        assert!(matches!(result, Err(AppError::Federation(_))));
    }
}

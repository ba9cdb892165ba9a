// src/ingest/types.rs
use serde::Deserialize;

/// One report as it flows through the filter, the cache buffer, and the
/// persister. Flattened from the nested upstream shape at decode time.
#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    pub contribution_id: i64,
    /// Unix seconds; the age-cutoff key.
    pub update_ts: i64,
    /// Unix seconds; the canonical report time.
    pub create_ts: i64,
    pub title: String,
    pub text: String,
    pub url: String,
    pub photo_url: Option<String>,
    /// 0/0 is the feed's sentinel for "no usable location".
    pub longitude: f64,
    pub latitude: f64,
    pub author_id: String,
}

/// One page of the upstream feed. A missing `result` key decodes as an
/// empty page, which the cycle driver treats as "no more pages".
#[derive(Debug, Deserialize)]
pub struct FeedPage {
    #[serde(default)]
    pub result: Vec<FeedRecord>,
}

/// Raw upstream record. Only the fields the ingester consumes are decoded.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeedRecord {
    pub contribution_id: i64,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub url: String,
    pub date: FeedDates,
    pub location: FeedLocation,
    #[serde(default)]
    pub files: FeedFiles,
    pub user: FeedUser,
}

#[derive(Debug, Clone, Deserialize)]
pub struct FeedDates {
    pub update: FeedSeconds,
    pub create: FeedSeconds,
}

#[derive(Debug, Clone, Deserialize)]
pub struct FeedSeconds {
    pub sec: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct FeedLocation {
    pub geospatial: FeedGeo,
}

#[derive(Debug, Clone, Deserialize)]
pub struct FeedGeo {
    pub longitude: f64,
    pub latitude: f64,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct FeedFiles {
    #[serde(default)]
    pub photo: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct FeedUser {
    pub creator: FeedCreator,
}

#[derive(Debug, Clone, Deserialize)]
pub struct FeedCreator {
    pub id: FeedId,
}

/// The feed is inconsistent about id types; accept both.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum FeedId {
    Num(i64),
    Text(String),
}

impl FeedId {
    fn into_string(self) -> String {
        match self {
            FeedId::Num(n) => n.to_string(),
            FeedId::Text(s) => s,
        }
    }
}

impl From<FeedRecord> for Record {
    fn from(raw: FeedRecord) -> Self {
        Record {
            contribution_id: raw.contribution_id,
            update_ts: raw.date.update.sec,
            create_ts: raw.date.create.sec,
            title: raw.title,
            text: raw.text,
            url: raw.url,
            photo_url: raw.files.photo,
            longitude: raw.location.geospatial.longitude,
            latitude: raw.location.geospatial.latitude,
            author_id: raw.user.creator.id.into_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nested_page_decodes_into_flat_records() {
        let body = r#"{
            "result": [{
                "contributionId": 42,
                "title": "Flooding",
                "text": "Water rising near the bridge",
                "url": "https://example.com/report/42",
                "date": { "update": { "sec": 1700000100 }, "create": { "sec": 1700000000 } },
                "location": { "geospatial": { "longitude": 106.8, "latitude": -6.2 } },
                "files": { "photo": "https://example.com/photo/42.jpg" },
                "user": { "creator": { "id": 7 } }
            }]
        }"#;
        let page: FeedPage = serde_json::from_str(body).unwrap();
        let record = Record::from(page.result.into_iter().next().unwrap());
        assert_eq!(record.contribution_id, 42);
        assert_eq!(record.update_ts, 1_700_000_100);
        assert_eq!(record.create_ts, 1_700_000_000);
        assert_eq!(record.author_id, "7");
        assert_eq!(
            record.photo_url.as_deref(),
            Some("https://example.com/photo/42.jpg")
        );
    }

    #[test]
    fn string_author_ids_are_accepted_too() {
        let raw = r#"{
            "contributionId": 1,
            "date": { "update": { "sec": 1 }, "create": { "sec": 1 } },
            "location": { "geospatial": { "longitude": 0.0, "latitude": 0.0 } },
            "user": { "creator": { "id": "abc-123" } }
        }"#;
        let record = Record::from(serde_json::from_str::<FeedRecord>(raw).unwrap());
        assert_eq!(record.author_id, "abc-123");
        assert_eq!(record.photo_url, None);
        assert!(record.title.is_empty());
    }

    #[test]
    fn missing_result_key_decodes_as_empty_page() {
        let page: FeedPage = serde_json::from_str(r#"{"status": "ok"}"#).unwrap();
        assert!(page.result.is_empty());
    }
}

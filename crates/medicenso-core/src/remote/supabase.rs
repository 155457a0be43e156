//! Supabase (PostgREST) remote store client.

use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::{RequestBuilder, Response, StatusCode};
use serde::{Deserialize, Serialize};

use super::{RemoteError, RemoteResult, RemoteStore};
use crate::config::RemoteConfig;
use crate::models::{FieldDefinition, FieldType, FieldValue, Report, UserId};
use crate::util::compact_text;

const REPORTS_TABLE: &str = "reports";
const FIELDS_TABLE: &str = "field_definitions";
const UPSERT_PREFERENCE: &str = "resolution=merge-duplicates,return=minimal";

/// Remote store backed by the Supabase REST interface.
#[derive(Clone)]
pub struct SupabaseRemoteStore {
    rest_url: String,
    config: RemoteConfig,
    client: reqwest::Client,
}

impl SupabaseRemoteStore {
    pub fn new(config: RemoteConfig, request_timeout: Duration) -> RemoteResult<Self> {
        let config = config.normalized()?;
        let client = reqwest::Client::builder()
            .timeout(request_timeout)
            .build()?;

        Ok(Self {
            rest_url: format!("{}/rest/v1", config.supabase_url),
            config,
            client,
        })
    }

    fn table_url(&self, table: &str) -> String {
        format!("{}/{table}", self.rest_url)
    }

    fn authorized(&self, request: RequestBuilder) -> RequestBuilder {
        request
            .header("apikey", &self.config.anon_key)
            .bearer_auth(self.config.bearer_token())
            .header(reqwest::header::ACCEPT, "application/json")
    }

    fn get(&self, table: &str) -> RequestBuilder {
        self.authorized(self.client.get(self.table_url(table)))
    }

    fn upsert(&self, table: &str) -> RequestBuilder {
        self.authorized(self.client.post(self.table_url(table)))
            .header("Prefer", UPSERT_PREFERENCE)
    }

    fn patch(&self, table: &str) -> RequestBuilder {
        self.authorized(self.client.patch(self.table_url(table)))
            .header("Prefer", "return=minimal")
    }

    fn delete(&self, table: &str) -> RequestBuilder {
        self.authorized(self.client.delete(self.table_url(table)))
    }
}

async fn check(response: Response) -> RemoteResult<Response> {
    if response.status().is_success() {
        return Ok(response);
    }

    let status = response.status();
    let body = response.text().await.unwrap_or_default();
    Err(RemoteError::Api(parse_api_error(status, &body)))
}

fn eq(value: &str) -> String {
    format!("eq.{value}")
}

#[async_trait]
impl RemoteStore for SupabaseRemoteStore {
    async fn fetch_reports(&self, user: &UserId) -> RemoteResult<Vec<Report>> {
        let response = self
            .get(REPORTS_TABLE)
            .query(&[
                ("select", "*".to_string()),
                ("user_id", eq(user.as_str())),
                ("order", "timestamp.desc".to_string()),
            ])
            .send()
            .await?;
        let rows = check(response).await?.json::<Vec<ReportRow>>().await?;
        Ok(rows.into_iter().map(Report::from).collect())
    }

    async fn fetch_report(&self, id: &str) -> RemoteResult<Option<Report>> {
        let response = self
            .get(REPORTS_TABLE)
            .query(&[
                ("select", "*".to_string()),
                ("id", eq(id)),
                ("limit", "1".to_string()),
            ])
            .send()
            .await?;
        let rows = check(response).await?.json::<Vec<ReportRow>>().await?;
        Ok(rows.into_iter().next().map(Report::from))
    }

    async fn insert_reports(&self, reports: &[Report]) -> RemoteResult<()> {
        if reports.is_empty() {
            return Ok(());
        }
        let rows: Vec<ReportRow> = reports.iter().map(ReportRow::from).collect();
        let response = self.upsert(REPORTS_TABLE).json(&rows).send().await?;
        check(response).await?;
        Ok(())
    }

    async fn update_report(&self, report: &Report) -> RemoteResult<()> {
        let response = self
            .patch(REPORTS_TABLE)
            .query(&[("id", eq(&report.id))])
            .json(&ReportPatch::from(report))
            .send()
            .await?;
        check(response).await?;
        Ok(())
    }

    async fn delete_report(&self, id: &str) -> RemoteResult<()> {
        let response = self
            .delete(REPORTS_TABLE)
            .query(&[("id", eq(id))])
            .send()
            .await?;
        check(response).await?;
        Ok(())
    }

    async fn fetch_field_definitions(&self, user: &UserId) -> RemoteResult<Vec<FieldDefinition>> {
        let response = self
            .get(FIELDS_TABLE)
            .query(&[
                ("select", "*".to_string()),
                ("user_id", eq(user.as_str())),
                ("order", "order.asc".to_string()),
            ])
            .send()
            .await?;
        let rows = check(response).await?.json::<Vec<FieldRow>>().await?;
        Ok(rows.into_iter().map(FieldDefinition::from).collect())
    }

    async fn insert_field_definitions(
        &self,
        user: &UserId,
        fields: &[FieldDefinition],
    ) -> RemoteResult<()> {
        if fields.is_empty() {
            return Ok(());
        }
        let rows: Vec<FieldRow> = fields
            .iter()
            .map(|field| FieldRow::new(user, field))
            .collect();
        let response = self
            .upsert(FIELDS_TABLE)
            .query(&[("on_conflict", "user_id,id")])
            .json(&rows)
            .send()
            .await?;
        check(response).await?;
        Ok(())
    }

    async fn delete_field_definitions(&self, user: &UserId) -> RemoteResult<()> {
        let response = self
            .delete(FIELDS_TABLE)
            .query(&[("user_id", eq(user.as_str()))])
            .send()
            .await?;
        check(response).await?;
        Ok(())
    }
}

/// Row of the `reports` table.
#[derive(Debug, Serialize, Deserialize)]
struct ReportRow {
    id: String,
    #[serde(default)]
    user_id: Option<String>,
    location: String,
    #[serde(default)]
    notes: Option<String>,
    timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    last_modified: Option<DateTime<Utc>>,
    #[serde(default)]
    data: Option<BTreeMap<String, FieldValue>>,
}

impl From<&Report> for ReportRow {
    fn from(report: &Report) -> Self {
        Self {
            id: report.id.clone(),
            user_id: report.user_id.clone(),
            location: report.location.clone(),
            notes: Some(report.notes.clone()),
            timestamp: report.timestamp,
            last_modified: report.last_modified,
            data: Some(report.data.clone()),
        }
    }
}

impl From<ReportRow> for Report {
    fn from(row: ReportRow) -> Self {
        Self {
            id: row.id,
            location: row.location,
            timestamp: row.timestamp,
            last_modified: row.last_modified,
            notes: row.notes.unwrap_or_default(),
            data: row.data.unwrap_or_default(),
            user_id: row.user_id,
        }
    }
}

/// Columns written by an update; ownership and creation time never change.
#[derive(Debug, Serialize)]
struct ReportPatch<'a> {
    location: &'a str,
    notes: &'a str,
    data: &'a BTreeMap<String, FieldValue>,
    #[serde(skip_serializing_if = "Option::is_none")]
    last_modified: Option<DateTime<Utc>>,
}

impl<'a> From<&'a Report> for ReportPatch<'a> {
    fn from(report: &'a Report) -> Self {
        Self {
            location: &report.location,
            notes: &report.notes,
            data: &report.data,
            last_modified: report.last_modified,
        }
    }
}

/// Row of the `field_definitions` table.
#[derive(Debug, Serialize, Deserialize)]
struct FieldRow {
    id: String,
    #[serde(default)]
    user_id: Option<String>,
    label: String,
    #[serde(rename = "type")]
    value_type: FieldType,
    is_active: bool,
    order: i32,
}

impl FieldRow {
    fn new(user: &UserId, field: &FieldDefinition) -> Self {
        Self {
            id: field.id.clone(),
            user_id: Some(user.as_str().to_string()),
            label: field.label.clone(),
            value_type: field.value_type,
            is_active: field.is_active,
            order: field.order,
        }
    }
}

impl From<FieldRow> for FieldDefinition {
    fn from(row: FieldRow) -> Self {
        Self {
            id: row.id,
            label: row.label,
            value_type: row.value_type,
            is_active: row.is_active,
            order: row.order,
        }
    }
}

#[derive(Debug, Deserialize)]
struct PostgrestErrorBody {
    message: Option<String>,
    error: Option<String>,
    details: Option<String>,
}

fn parse_api_error(status: StatusCode, body: &str) -> String {
    if let Ok(payload) = serde_json::from_str::<PostgrestErrorBody>(body) {
        if let Some(message) = payload.message.or(payload.error) {
            return match payload.details.filter(|details| !details.trim().is_empty()) {
                Some(details) => format!(
                    "{}: {} ({})",
                    message.trim(),
                    compact_text(&details),
                    status.as_u16()
                ),
                None => format!("{} ({})", message.trim(), status.as_u16()),
            };
        }
    }

    let trimmed = compact_text(body);
    if trimmed.is_empty() {
        format!("HTTP {}", status.as_u16())
    } else {
        format!("{} ({})", trimmed, status.as_u16())
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::sync::oneshot;

    use super::*;
    use crate::ids;

    /// Serve exactly one HTTP response and hand back the raw request head.
    async fn one_shot_server(
        status_line: &str,
        body: &str,
    ) -> (String, oneshot::Receiver<String>) {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind test server");
        let address = listener.local_addr().expect("local address");
        let response = format!(
            "HTTP/1.1 {status_line}\r\ncontent-type: application/json\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{}",
            body.len(),
            body
        );
        let (sender, receiver) = oneshot::channel();

        tokio::spawn(async move {
            if let Ok((mut socket, _)) = listener.accept().await {
                let mut request_buffer = [0_u8; 8192];
                let read = socket.read(&mut request_buffer).await.unwrap_or(0);
                let _ = sender.send(String::from_utf8_lossy(&request_buffer[..read]).to_string());
                let _ = socket.write_all(response.as_bytes()).await;
            }
        });

        (format!("http://{address}"), receiver)
    }

    fn store_for(url: &str) -> SupabaseRemoteStore {
        let config = RemoteConfig::new(url, "anon-key", Some("session-token".to_string())).unwrap();
        SupabaseRemoteStore::new(config, Duration::from_secs(5)).unwrap()
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn fetch_reports_sends_filter_and_auth_headers() {
        let id = ids::mint_id();
        let body = format!(
            r#"[{{"id":"{id}","user_id":"u1","location":"Block 4","notes":null,"timestamp":"2024-05-01T10:00:00Z","data":{{"{}":12}}}}]"#,
            ids::TOTAL_POPULATION_FIELD_ID
        );
        let (url, request) = one_shot_server("200 OK", &body).await;
        let store = store_for(&url);
        let user: UserId = "u1".parse().unwrap();

        let reports = store.fetch_reports(&user).await.unwrap();

        assert_eq!(reports.len(), 1);
        assert_eq!(reports[0].id, id);
        assert_eq!(reports[0].notes, "");
        assert_eq!(
            reports[0].value(ids::TOTAL_POPULATION_FIELD_ID),
            Some(&FieldValue::Number(12.0))
        );

        let request = request.await.unwrap().to_ascii_lowercase();
        assert!(request.starts_with("get /rest/v1/reports?"));
        assert!(request.contains("user_id=eq.u1"));
        assert!(request.contains("order=timestamp.desc"));
        assert!(request.contains("apikey: anon-key"));
        assert!(request.contains("authorization: bearer session-token"));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn insert_reports_requests_upsert() {
        let (url, request) = one_shot_server("201 Created", "").await;
        let store = store_for(&url);
        let report = Report {
            id: ids::mint_id(),
            location: "A".to_string(),
            timestamp: Utc::now(),
            last_modified: None,
            notes: String::new(),
            data: BTreeMap::new(),
            user_id: Some("u1".to_string()),
        };

        store.insert_reports(&[report]).await.unwrap();

        let request = request.await.unwrap().to_ascii_lowercase();
        assert!(request.starts_with("post /rest/v1/reports "));
        assert!(request.contains("prefer: resolution=merge-duplicates"));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn api_errors_surface_postgrest_message() {
        let (url, _) = one_shot_server(
            "409 Conflict",
            r#"{"code":"23505","message":"duplicate key value","details":"Key (id) exists"}"#,
        )
        .await;
        let store = store_for(&url);

        let error = store.delete_report(&ids::mint_id()).await.unwrap_err();
        match error {
            RemoteError::Api(message) => {
                assert_eq!(message, "duplicate key value: Key (id) exists (409)");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn fetch_field_definitions_maps_rows() {
        let body = r#"[{"id":"a1b2c3d4-e5f6-4a5b-b6c7-d8e9f0a1b2c3","user_id":"u1","label":"Total de población","type":"number","is_active":true,"order":3}]"#;
        let (url, request) = one_shot_server("200 OK", body).await;
        let store = store_for(&url);
        let user: UserId = "u1".parse().unwrap();

        let fields = store.fetch_field_definitions(&user).await.unwrap();

        assert_eq!(fields.len(), 1);
        assert_eq!(fields[0].id, ids::TOTAL_POPULATION_FIELD_ID);
        assert_eq!(fields[0].value_type, FieldType::Number);
        assert_eq!(fields[0].order, 3);
        let request = request.await.unwrap();
        assert!(request.contains("order=order.asc"));
    }

    #[test]
    fn parse_api_error_falls_back_to_body_or_status() {
        assert_eq!(
            parse_api_error(StatusCode::BAD_GATEWAY, "   "),
            "HTTP 502"
        );
        assert_eq!(
            parse_api_error(StatusCode::BAD_REQUEST, "bad things"),
            "bad things (400)"
        );
    }

    #[test]
    fn new_rejects_invalid_configuration() {
        let config = RemoteConfig {
            supabase_url: "ftp://example.com".to_string(),
            anon_key: "anon".to_string(),
            access_token: None,
        };
        assert!(SupabaseRemoteStore::new(config, Duration::from_secs(1)).is_err());
    }
}

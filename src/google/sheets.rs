use anyhow::Result;
use async_trait::async_trait;
use reqwest::{RequestBuilder, Url};
use serde_json::json;
use tracing::debug;

use super::model::{cell_text, ValueRange};
use super::{join_segments, GoogleHttp};
use crate::catalog::RowStore;

/// Spreadsheet values API as a row store.
#[derive(Debug, Clone)]
pub struct SheetsClient {
    api: GoogleHttp,
}

impl SheetsClient {
    pub fn new(api: GoogleHttp) -> Self {
        Self { api }
    }

    fn values_url(&self, sheet_id: &str, range: &str) -> Result<Url> {
        join_segments(
            &self.api.endpoints().sheets,
            &["v4", "spreadsheets", sheet_id, "values", range],
        )
    }

    fn read_request(&self, sheet_id: &str, range: &str) -> Result<RequestBuilder> {
        Ok(self.api.get(self.values_url(sheet_id, range)?))
    }

    fn write_request(&self, sheet_id: &str, range: &str, value: &str) -> Result<RequestBuilder> {
        let body = json!({ "range": range, "values": [[value]] });
        Ok(self
            .api
            .put(self.values_url(sheet_id, range)?)
            .query(&[("valueInputOption", "RAW")])
            .json(&body))
    }
}

#[async_trait]
impl RowStore for SheetsClient {
    async fn read_range(&self, store_id: &str, range: &str) -> Result<Vec<Vec<String>>> {
        let values: ValueRange = self
            .api
            .send_json(self.read_request(store_id, range)?, "sheet read")
            .await?;
        debug!(range, rows = values.values.len(), "sheet range read");
        Ok(values
            .values
            .iter()
            .map(|row| row.iter().map(cell_text).collect())
            .collect())
    }

    async fn write_cell(&self, store_id: &str, range: &str, value: &str) -> Result<()> {
        self.api
            .send(self.write_request(store_id, range, value)?, "sheet write")
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client() -> SheetsClient {
        SheetsClient::new(GoogleHttp::new("token".into()).unwrap())
    }

    #[test]
    fn read_request_targets_range() {
        let req = client()
            .read_request("sheet-1", "Themen!A2:J420")
            .unwrap()
            .build()
            .unwrap();
        assert_eq!(req.method(), reqwest::Method::GET);
        assert_eq!(req.url().path(), "/v4/spreadsheets/sheet-1/values/Themen!A2:J420");
    }

    #[test]
    fn write_request_is_single_raw_cell() {
        let req = client()
            .write_request("sheet-1", "Themen!H8", "abc")
            .unwrap()
            .build()
            .unwrap();
        assert_eq!(req.method(), reqwest::Method::PUT);
        assert_eq!(req.url().query(), Some("valueInputOption=RAW"));
        let body: serde_json::Value =
            serde_json::from_slice(req.body().and_then(|b| b.as_bytes()).unwrap()).unwrap();
        assert_eq!(body["range"], "Themen!H8");
        assert_eq!(body["values"][0][0], "abc");
        assert_eq!(body["values"].as_array().unwrap().len(), 1);
    }
}

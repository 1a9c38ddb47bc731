use std::time::Duration;

use anyhow::{Context, Result};
use reqwest::{Client, Url};
use tracing::debug;

use crate::{api::records::IngressPayload, daemon::storage::record_event::ActivityRecord};

use super::sink::RecordSink;

/// Sink posting every record to the ingress API of a remote record service.
pub struct HttpSink {
    client: Client,
    endpoint: Url,
}

impl HttpSink {
    pub fn new(endpoint: &str, timeout: Duration) -> Result<Self> {
        let endpoint = Url::parse(endpoint).with_context(|| format!("Invalid api url {endpoint}"))?;
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self { client, endpoint })
    }
}

impl RecordSink for HttpSink {
    async fn save(&mut self, record: &ActivityRecord) -> Result<()> {
        let response = self
            .client
            .post(self.endpoint.clone())
            .json(&IngressPayload::from(record))
            .send()
            .await?
            .error_for_status()?;
        debug!("Record accepted with status {}", response.status());
        Ok(())
    }

    async fn finalize(&mut self) -> Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::HttpSink;

    #[test]
    fn rejects_malformed_endpoints() {
        assert!(HttpSink::new("not a url", Duration::from_secs(1)).is_err());
        assert!(HttpSink::new("http://localhost:3000/api/records", Duration::from_secs(1)).is_ok());
    }
}
